use std::io;
use std::path::PathBuf;
use std::sync::mpsc;

use anyhow::Result;
use crossterm::{
    event::{DisableMouseCapture, EnableMouseCapture},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};

use glance_core::logger::{self, LogLine};
use glance_core::platform::create_platform;
use glance_core::scheduler::Scheduler;
use glance_core::settings::Settings;
use glance_core::store;

fn main() -> Result<()> {
    let force_stub = std::env::args().any(|a| a == "--stub");
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));

    logger::init(&cwd.join("logs"));

    // First run writes the defaults out so they can be edited
    let settings_path = cwd.join("settings.json");
    let settings = Settings::load(&settings_path);
    if !settings_path.exists() {
        settings.save(&settings_path);
    }

    let (capture, input) = create_platform(force_stub);

    let defaults = settings.match_defaults();
    let chain_path = cwd.join(&settings.chain_file);
    let chain = store::load_chain(&chain_path, &defaults)?;
    let library = store::load_library(&cwd.join(&settings.rules_dir));
    logger::info(&format!("{} rule(s) in chain, {} in library", chain.len(), library.len()));

    let scheduler = Scheduler::new(chain, capture, input, settings.scheduler());

    let (log_tx, log_rx) = mpsc::channel::<LogLine>();
    logger::set_ui_sender(log_tx);
    logger::info("glance started");

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = glance_tui::App::new(scheduler, library, defaults, chain_path, log_rx);
    let result = glance_tui::event::run(&mut terminal, &mut app);

    // Never leave a worker behind, even when the loop bailed out with an error
    if !app.should_quit {
        app.quit();
    }

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, DisableMouseCapture)?;
    terminal.show_cursor()?;

    result
}
