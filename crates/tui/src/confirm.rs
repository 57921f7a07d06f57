use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
    Frame,
};

/// Yes/No prompt guarding a destructive edit. `payload` identifies what the
/// answer applies to.
pub struct ConfirmDialog<T> {
    pub message: String,
    pub selected: bool, // true = Yes
    pub payload: T,
}

impl<T> ConfirmDialog<T> {
    pub fn new(message: impl Into<String>, payload: T) -> Self {
        Self { message: message.into(), selected: false, payload }
    }

    pub fn toggle(&mut self) {
        self.selected = !self.selected;
    }

    pub fn render(&self, f: &mut Frame) {
        let width = (self.message.chars().count() as u16 + 6).clamp(30, 60);
        let area = centered_rect(width, 7, f.area());
        f.render_widget(Clear, area);

        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Yellow))
            .title(" Confirm ");
        let inner = block.inner(area);
        f.render_widget(block, area);

        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(1),
                Constraint::Length(2), // message
                Constraint::Length(1), // buttons
            ])
            .split(inner);

        let message = Paragraph::new(self.message.as_str())
            .style(Style::default().fg(Color::White))
            .alignment(Alignment::Center)
            .wrap(Wrap { trim: true });
        f.render_widget(message, rows[1]);

        let button = |label: &'static str, active: bool, bg: Color| {
            let style = if active {
                Style::default().fg(Color::Black).bg(bg).add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(Color::DarkGray)
            };
            Span::styled(label, style)
        };
        let buttons = Line::from(vec![
            button(" [Yes] ", self.selected, Color::Green),
            Span::raw("    "),
            button(" [No] ", !self.selected, Color::Red),
        ]);
        f.render_widget(Paragraph::new(buttons).alignment(Alignment::Center), rows[2]);
    }
}

/// A `width` x `height` rect centered in `area`, clipped to it.
pub(crate) fn centered_rect(width: u16, height: u16, area: Rect) -> Rect {
    let w = width.min(area.width);
    let h = height.min(area.height);
    Rect::new(area.x + (area.width - w) / 2, area.y + (area.height - h) / 2, w, h)
}
