use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Wrap},
    Frame,
};

use glance_core::logger::{self, Level, LogLine};
use glance_core::scheduler::{RuleStatus, SchedulerState};

use crate::app::{App, Focus};

fn key(k: &'static str) -> Span<'static> {
    Span::styled(k, Style::default().fg(Color::Yellow))
}

pub fn draw(f: &mut Frame, app: &App) {
    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
        .split(f.area());

    let left = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1), // banner
            Constraint::Min(0),    // rules
            Constraint::Length(3), // library
        ])
        .split(columns[0]);
    draw_banner(f, app, left[0]);
    draw_rules(f, app, left[1]);
    draw_library(f, app, left[2]);

    // Actions take the whole right side while logs are hidden
    if app.log_visible {
        let right = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(10), Constraint::Min(0)])
            .split(columns[1]);
        draw_actions(f, app, right[0]);
        draw_logs(f, app, right[1]);
    } else {
        draw_actions(f, app, columns[1]);
    }

    if let Some(prompt) = &app.prompt {
        prompt.render(f);
    }
    if let Some(dialog) = &app.confirm {
        dialog.render(f);
    }
}

fn draw_banner(f: &mut Frame, app: &App, area: Rect) {
    let (label, bg) = match app.state() {
        SchedulerState::Running => ("RUNNING (Press S to stop)", Color::Green),
        SchedulerState::Stopping => ("STOPPING...", Color::Yellow),
        SchedulerState::Idle => ("IDLE (Press S to start)", Color::Red),
    };
    let width = area.width as usize;
    let pad_left = width.saturating_sub(label.len()) / 2;
    let text = format!("{:<width$}", format!("{}{}", " ".repeat(pad_left), label), width = width);
    let banner = Paragraph::new(Line::from(Span::styled(
        text,
        Style::default().fg(Color::Black).bg(bg).add_modifier(Modifier::BOLD),
    )));
    f.render_widget(banner, area);
}

fn border_color(app: &App, focus: Focus) -> Color {
    if app.focus == focus {
        Color::Cyan
    } else {
        Color::DarkGray
    }
}

fn draw_rules(f: &mut Frame, app: &App, area: Rect) {
    let status = app.status();
    let mut lines = vec![
        Line::from(vec![
            Span::raw(" "),
            key("j"),
            Span::raw("/"),
            key("k"),
            Span::raw(" select, "),
            key("x"),
            Span::raw(" delete, "),
            key("w"),
            Span::raw(" save, "),
            key("tab"),
            Span::raw(" actions"),
        ]),
        Line::from(""),
    ];

    if app.views.is_empty() {
        lines.push(Line::from(Span::styled(
            "  no rules yet: pick one from the library and press a",
            Style::default().fg(Color::DarkGray),
        )));
    }

    for (i, view) in app.views.iter().enumerate() {
        let prefix = if i == app.selected { "> " } else { "  " };
        let tag_color = if view.disabled { Color::Red } else { Color::Cyan };
        let mut spans = vec![
            Span::raw(prefix),
            Span::styled(format!("[{}]", view.tag), Style::default().fg(tag_color)),
            Span::raw(" "),
            Span::styled(view.name.clone(), Style::default().fg(Color::White).add_modifier(Modifier::BOLD)),
        ];
        if let Some(s) = status.get(i) {
            spans.extend(status_spans(s));
        }
        lines.push(Line::from(spans));
    }

    let rules = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::LEFT | Borders::RIGHT | Borders::BOTTOM)
            .title(" Rules ")
            .border_style(Style::default().fg(border_color(app, Focus::Rules))),
    );
    f.render_widget(rules, area);
}

fn status_spans(status: &RuleStatus) -> Vec<Span<'static>> {
    let mut spans = Vec::new();
    if status.fired > 0 {
        let when = status
            .last_fired
            .map(|t| t.format(" %H:%M:%S").to_string())
            .unwrap_or_default();
        spans.push(Span::styled(
            format!("  x{}{}", status.fired, when),
            Style::default().fg(Color::Green),
        ));
    }
    if let Some(e) = &status.error {
        spans.push(Span::styled(format!("  err: {}", e), Style::default().fg(Color::Red)));
    }
    spans
}

fn draw_actions(f: &mut Frame, app: &App, area: Rect) {
    let mut lines = Vec::new();
    match app.views.get(app.selected) {
        Some(view) if view.actions.is_empty() => {
            lines.push(Line::from(Span::styled("  (no actions)", Style::default().fg(Color::DarkGray))));
        }
        Some(view) => {
            for (i, action) in view.actions.iter().enumerate() {
                let active = app.focus == Focus::Actions && i == app.action_cursor;
                let prefix = if active { "> " } else { "  " };
                lines.push(Line::from(vec![
                    Span::raw(prefix),
                    Span::styled(format!("{}. ", i + 1), Style::default().fg(Color::DarkGray)),
                    Span::raw(action.clone()),
                ]));
            }
        }
        None => {}
    }

    let actions = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::ALL)
            .title(Line::from(vec![
                Span::raw(" Actions "),
                key("J"),
                Span::raw("/"),
                key("K"),
                Span::raw(" reorder, "),
                key("n"),
                Span::raw(" new "),
            ]))
            .border_style(Style::default().fg(border_color(app, Focus::Actions))),
    );
    f.render_widget(actions, area);
}

fn draw_library(f: &mut Frame, app: &App, area: Rect) {
    let line = match app.library_entry() {
        Some(entry) => Line::from(vec![
            Span::raw(" "),
            key("["),
            Span::raw(" "),
            Span::styled(entry.name.clone(), Style::default().fg(Color::White).add_modifier(Modifier::BOLD)),
            Span::styled(
                format!(" ({}/{}) ", app.library_index + 1, app.library.len()),
                Style::default().fg(Color::DarkGray),
            ),
            key("]"),
            Span::raw("  "),
            key("a"),
            Span::raw(" add to chain"),
        ]),
        None => Line::from(Span::styled(" library is empty", Style::default().fg(Color::DarkGray))),
    };
    let library = Paragraph::new(line).block(
        Block::default()
            .borders(Borders::ALL)
            .title(" Library ")
            .border_style(Style::default().fg(Color::DarkGray)),
    );
    f.render_widget(library, area);
}

fn draw_logs(f: &mut Frame, app: &App, area: Rect) {
    let visible_height = area.height.saturating_sub(2) as usize;
    let total = app.log_messages.len();
    let scroll = app.log_scroll.min(total.saturating_sub(visible_height));
    let start = total.saturating_sub(visible_height + scroll);
    let end = total.saturating_sub(scroll);
    let lines: Vec<Line> = app.log_messages.range(start..end).map(log_line).collect();

    let panel = Paragraph::new(lines)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(" Logs ")
                .border_style(Style::default().fg(Color::Yellow)),
        )
        .wrap(Wrap { trim: false });
    f.render_widget(panel, area);
}

fn log_line(line: &LogLine) -> Line<'_> {
    let color = match line.color {
        logger::COLOR_GRAY => Color::DarkGray,
        logger::COLOR_BLUE => Color::LightBlue,
        logger::COLOR_GREEN => Color::Green,
        _ => Color::White,
    };

    let mut spans = vec![
        Span::styled(line.timestamp.as_str(), Style::default().fg(Color::DarkGray)),
        Span::raw(" "),
    ];
    match line.level {
        Level::Error => spans.push(Span::styled("error ", Style::default().fg(Color::Red))),
        Level::Warn => spans.push(Span::styled("warn ", Style::default().fg(Color::Yellow))),
        Level::Info => {}
    }
    if !line.prefix.is_empty() {
        spans.push(Span::styled(
            line.prefix.as_str(),
            Style::default().fg(color).add_modifier(Modifier::BOLD),
        ));
        spans.push(Span::raw(" "));
    }
    spans.push(Span::styled(line.message.as_str(), Style::default().fg(color)));
    Line::from(spans)
}
