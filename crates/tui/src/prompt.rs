use ratatui::{
    layout::{Constraint, Direction, Layout},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph},
    Frame,
};

use glance_core::action::ActionKind;

use crate::confirm::centered_rect;

/// Input line for a new action: a kind picked from [`ActionKind::ALL`] and
/// the payload typed for it.
pub struct ActionPrompt {
    pub kind_index: usize,
    pub value: String,
}

impl ActionPrompt {
    pub fn new() -> Self {
        Self { kind_index: 0, value: String::new() }
    }

    pub fn kind(&self) -> ActionKind {
        ActionKind::ALL[self.kind_index % ActionKind::ALL.len()]
    }

    pub fn next_kind(&mut self) {
        self.kind_index = (self.kind_index + 1) % ActionKind::ALL.len();
    }

    pub fn prev_kind(&mut self) {
        let n = ActionKind::ALL.len();
        self.kind_index = (self.kind_index + n - 1) % n;
    }

    fn hint(&self) -> &'static str {
        match self.kind() {
            ActionKind::PressKey => "key name, e.g. e or enter",
            ActionKind::TypeText => "text to type",
            ActionKind::Wait => "milliseconds",
            ActionKind::ClickAtAnchor => "no value needed",
            ActionKind::ClickAtFixedPoint => "x, y",
        }
    }

    pub fn render(&self, f: &mut Frame) {
        let area = centered_rect(50, 8, f.area());
        f.render_widget(Clear, area);

        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan))
            .title(" New action ");
        let inner = block.inner(area);
        f.render_widget(block, area);

        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(1), // kind
                Constraint::Length(1),
                Constraint::Length(1), // value
                Constraint::Length(1), // hint
                Constraint::Length(1),
                Constraint::Length(1), // keys
            ])
            .split(inner);

        let kind = Line::from(vec![
            Span::raw(" < "),
            Span::styled(self.kind().label(), Style::default().fg(Color::White).add_modifier(Modifier::BOLD)),
            Span::raw(" > "),
        ]);
        f.render_widget(Paragraph::new(kind), rows[0]);

        let value = Line::from(vec![
            Span::styled(" > ", Style::default().fg(Color::Yellow)),
            Span::raw(self.value.as_str()),
            Span::styled("_", Style::default().fg(Color::DarkGray)),
        ]);
        f.render_widget(Paragraph::new(value), rows[2]);
        f.render_widget(
            Paragraph::new(Span::styled(format!("   {}", self.hint()), Style::default().fg(Color::DarkGray))),
            rows[3],
        );

        let keys = Line::from(vec![
            Span::styled(" up/down", Style::default().fg(Color::Yellow)),
            Span::raw(" type  "),
            Span::styled("enter", Style::default().fg(Color::Yellow)),
            Span::raw(" add  "),
            Span::styled("esc", Style::default().fg(Color::Yellow)),
            Span::raw(" cancel"),
        ]);
        f.render_widget(Paragraph::new(keys), rows[5]);
    }
}

impl Default for ActionPrompt {
    fn default() -> Self {
        Self::new()
    }
}
