use std::io;
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, MouseEventKind};
use ratatui::{backend::CrosstermBackend, Terminal};

use crate::ui;
use crate::App;

pub fn run(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>, app: &mut App) -> anyhow::Result<()> {
    loop {
        if app.should_quit {
            return Ok(());
        }

        app.update();
        terminal.draw(|f| ui::draw(f, app))?;

        // 100ms poll keeps status and logs fresh while idle
        if !event::poll(Duration::from_millis(100))? {
            continue;
        }
        match event::read()? {
            Event::Key(key) if key.kind == KeyEventKind::Press => {
                if app.confirm.is_some() {
                    handle_confirm_key(app, key);
                } else if app.prompt.is_some() {
                    handle_prompt_key(app, key);
                } else {
                    handle_key(app, key);
                }
            }
            Event::Mouse(mouse) => match mouse.kind {
                MouseEventKind::ScrollUp => app.scroll_log_up(3),
                MouseEventKind::ScrollDown => app.scroll_log_down(3),
                _ => {}
            },
            _ => {}
        }
    }
}

fn handle_confirm_key(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Left | KeyCode::Right | KeyCode::Tab | KeyCode::Char('h') | KeyCode::Char('l') => {
            if let Some(dialog) = app.confirm.as_mut() {
                dialog.toggle();
            }
        }
        KeyCode::Char('y') | KeyCode::Char('Y') => {
            if let Some(dialog) = app.confirm.as_mut() {
                dialog.selected = true;
            }
            app.resolve_confirm();
        }
        KeyCode::Enter => app.resolve_confirm(),
        KeyCode::Esc | KeyCode::Char('n') | KeyCode::Char('N') => app.cancel_confirm(),
        _ => {}
    }
}

fn handle_prompt_key(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Up => {
            if let Some(p) = app.prompt.as_mut() {
                p.prev_kind();
            }
        }
        KeyCode::Down | KeyCode::Tab => {
            if let Some(p) = app.prompt.as_mut() {
                p.next_kind();
            }
        }
        KeyCode::Char(c) => app.prompt_input(c),
        KeyCode::Backspace => app.prompt_backspace(),
        KeyCode::Enter => app.commit_action(),
        KeyCode::Esc => app.cancel_prompt(),
        _ => {}
    }
}

fn handle_key(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('q') | KeyCode::Char('Q') => app.quit(),
        KeyCode::Up | KeyCode::Char('k') => app.move_up(),
        KeyCode::Down | KeyCode::Char('j') => app.move_down(),
        KeyCode::Char('K') => app.move_action_up(),
        KeyCode::Char('J') => app.move_action_down(),
        KeyCode::Tab => app.toggle_focus(),
        KeyCode::Char('x') | KeyCode::Delete => app.delete(),
        KeyCode::Char('n') => app.begin_add_action(),
        KeyCode::Char('[') => app.prev_library(),
        KeyCode::Char(']') => app.next_library(),
        KeyCode::Char('a') => app.add_from_library(),
        KeyCode::Char('s') | KeyCode::Char('S') => app.start_stop(),
        KeyCode::Char('w') => app.save_chain(),
        KeyCode::Char('l') | KeyCode::Char('L') => app.toggle_log(),
        KeyCode::PageUp => app.scroll_log_up(10),
        KeyCode::PageDown => app.scroll_log_down(10),
        _ => {}
    }
}
