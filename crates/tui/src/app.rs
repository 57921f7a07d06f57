use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::mpsc;

use glance_core::action::Action;
use glance_core::detector::MatchDefaults;
use glance_core::logger::{self, LogLine};
use glance_core::rule::RuleChain;
use glance_core::scheduler::{RuleStatus, Scheduler, SchedulerState};
use glance_core::store::{self, LibraryEntry};

use crate::confirm::ConfirmDialog;
use crate::prompt::ActionPrompt;

/// Log lines kept for the log panel; older ones are dropped.
pub const LOG_CAP: usize = 5000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    Rules,
    Actions,
}

/// What the rule list shows. Refreshed whenever the chain is back in our
/// hands, so it stays drawable while the worker owns the chain.
#[derive(Debug, Clone)]
pub struct RuleView {
    pub name: String,
    pub tag: &'static str,
    pub disabled: bool,
    pub actions: Vec<String>,
}

pub struct App {
    pub scheduler: Scheduler,
    pub views: Vec<RuleView>,
    pub selected: usize,
    pub action_cursor: usize,
    pub focus: Focus,
    pub library: Vec<LibraryEntry>,
    pub library_index: usize,
    pub defaults: MatchDefaults,
    pub chain_path: PathBuf,
    pub confirm: Option<ConfirmDialog<usize>>,
    pub prompt: Option<ActionPrompt>,
    pub log_visible: bool,
    pub log_messages: VecDeque<LogLine>,
    pub log_scroll: usize, // scroll offset from bottom (0 = latest)
    pub log_rx: mpsc::Receiver<LogLine>,
    pub should_quit: bool,
}

impl App {
    pub fn new(
        scheduler: Scheduler,
        library: Vec<LibraryEntry>,
        defaults: MatchDefaults,
        chain_path: PathBuf,
        log_rx: mpsc::Receiver<LogLine>,
    ) -> Self {
        let mut app = Self {
            scheduler,
            views: Vec::new(),
            selected: 0,
            action_cursor: 0,
            focus: Focus::Rules,
            library,
            library_index: 0,
            defaults,
            chain_path,
            confirm: None,
            prompt: None,
            log_visible: true,
            log_messages: VecDeque::new(),
            log_scroll: 0,
            log_rx,
            should_quit: false,
        };
        app.refresh_views();
        app.sync_selection();
        app
    }

    pub fn state(&self) -> SchedulerState {
        self.scheduler.state()
    }

    pub fn status(&self) -> Vec<RuleStatus> {
        self.scheduler.status()
    }

    pub fn refresh_views(&mut self) {
        let Some(chain) = self.scheduler.rules() else { return };
        self.views = chain
            .iter()
            .map(|r| RuleView {
                name: r.name.clone(),
                tag: r.tag(),
                disabled: r.detector.is_disabled(),
                actions: r.actions.iter().map(|a| a.to_string()).collect(),
            })
            .collect();
        self.selected = self.selected.min(self.views.len().saturating_sub(1));
        self.clamp_action_cursor();
    }

    fn clamp_action_cursor(&mut self) {
        let n = self.views.get(self.selected).map_or(0, |v| v.actions.len());
        self.action_cursor = self.action_cursor.min(n.saturating_sub(1));
    }

    /// Mirror the cursor into the chain's selection when the chain is ours.
    fn sync_selection(&mut self) {
        let selected = (!self.views.is_empty()).then_some(self.selected);
        if let Ok(chain) = self.scheduler.rules_mut() {
            chain.select(selected);
        }
    }

    /// Run an edit against the chain. Rejected (and logged) while running.
    fn edit<T>(&mut self, f: impl FnOnce(&mut RuleChain) -> T) -> Option<T> {
        let result = match self.scheduler.rules_mut() {
            Ok(chain) => Some(f(chain)),
            Err(e) => {
                logger::warn(&e.to_string());
                None
            }
        };
        if result.is_some() {
            self.refresh_views();
        }
        result
    }

    /// Per-frame housekeeping: logs, and taking the chain back after a stop.
    pub fn update(&mut self) {
        self.drain_logs();
        match self.scheduler.reap() {
            Ok(true) => {
                self.refresh_views();
                self.sync_selection();
            }
            Ok(false) => {}
            Err(e) => logger::error(&e.to_string()),
        }
    }

    pub fn drain_logs(&mut self) {
        while let Ok(line) = self.log_rx.try_recv() {
            if self.log_messages.len() == LOG_CAP {
                self.log_messages.pop_front();
            }
            self.log_messages.push_back(line);
        }
    }

    pub fn scroll_log_up(&mut self, n: usize) {
        self.log_scroll = self.log_scroll.saturating_add(n);
    }

    pub fn scroll_log_down(&mut self, n: usize) {
        self.log_scroll = self.log_scroll.saturating_sub(n);
    }

    pub fn toggle_focus(&mut self) {
        self.focus = match self.focus {
            Focus::Rules => Focus::Actions,
            Focus::Actions => Focus::Rules,
        };
        self.clamp_action_cursor();
    }

    pub fn move_up(&mut self) {
        match self.focus {
            Focus::Rules => {
                if self.selected > 0 {
                    self.selected -= 1;
                    self.action_cursor = 0;
                    self.sync_selection();
                }
            }
            Focus::Actions => self.action_cursor = self.action_cursor.saturating_sub(1),
        }
    }

    pub fn move_down(&mut self) {
        match self.focus {
            Focus::Rules => {
                if self.selected + 1 < self.views.len() {
                    self.selected += 1;
                    self.action_cursor = 0;
                    self.sync_selection();
                }
            }
            Focus::Actions => {
                let n = self.views.get(self.selected).map_or(0, |v| v.actions.len());
                if self.action_cursor + 1 < n {
                    self.action_cursor += 1;
                }
            }
        }
    }

    /// Swap the action under the cursor with the one above it.
    pub fn move_action_up(&mut self) {
        let (rule, action) = (self.selected, self.action_cursor);
        let moved = self.edit(|chain| chain.get_mut(rule).is_some_and(|r| r.actions.move_up(action)));
        if moved == Some(true) {
            self.action_cursor -= 1;
        }
    }

    /// Swap the action under the cursor with the one below it.
    pub fn move_action_down(&mut self) {
        let (rule, action) = (self.selected, self.action_cursor);
        let moved = self.edit(|chain| chain.get_mut(rule).is_some_and(|r| r.actions.move_down(action)));
        if moved == Some(true) {
            self.action_cursor += 1;
        }
    }

    /// Delete the focused action right away, or ask before deleting a rule.
    pub fn delete(&mut self) {
        match self.focus {
            Focus::Actions => {
                let (rule, action) = (self.selected, self.action_cursor);
                let removed = self.edit(|chain| chain.get_mut(rule).and_then(|r| r.actions.remove(action)));
                if let Some(Some(a)) = removed {
                    logger::info(&format!("removed action {}", a));
                }
            }
            Focus::Rules => {
                if let Some(view) = self.views.get(self.selected) {
                    let message = format!("Delete rule '{}'?", view.name);
                    self.confirm = Some(ConfirmDialog::new(message, self.selected));
                }
            }
        }
    }

    /// Close the open dialog, deleting its rule if Yes was chosen.
    pub fn resolve_confirm(&mut self) {
        let Some(dialog) = self.confirm.take() else { return };
        if !dialog.selected {
            return;
        }
        let index = dialog.payload;
        let removed = self.edit(|chain| {
            chain.select(Some(index));
            chain.remove(index)
        });
        if let Some(Some(rule)) = removed {
            logger::info(&format!("removed rule {}", rule.name));
            self.sync_selection();
        }
    }

    pub fn cancel_confirm(&mut self) {
        self.confirm = None;
    }

    /// Open the new-action prompt for the selected rule.
    pub fn begin_add_action(&mut self) {
        if self.views.get(self.selected).is_none() {
            logger::warn("no rule selected");
            return;
        }
        self.prompt = Some(ActionPrompt::new());
    }

    pub fn prompt_input(&mut self, c: char) {
        if let Some(p) = self.prompt.as_mut() {
            p.value.push(c);
        }
    }

    pub fn prompt_backspace(&mut self) {
        if let Some(p) = self.prompt.as_mut() {
            p.value.pop();
        }
    }

    pub fn cancel_prompt(&mut self) {
        self.prompt = None;
    }

    /// Append the prompted action to the selected rule. A value that does not
    /// parse keeps the prompt open for correction.
    pub fn commit_action(&mut self) {
        let Some(prompt) = self.prompt.as_ref() else { return };
        let action = match Action::from_parts(prompt.kind(), &prompt.value) {
            Ok(action) => action,
            Err(e) => {
                logger::error(&e.to_string());
                return;
            }
        };
        self.prompt = None;

        let rule = self.selected;
        let label = action.to_string();
        let added = self.edit(|chain| chain.get_mut(rule).map(|r| r.actions.push(action)));
        if let Some(Some(())) = added {
            self.focus = Focus::Actions;
            self.action_cursor = self.views.get(rule).map_or(0, |v| v.actions.len().saturating_sub(1));
            logger::info(&format!("added action {}", label));
        }
    }

    pub fn library_entry(&self) -> Option<&LibraryEntry> {
        self.library.get(self.library_index)
    }

    pub fn next_library(&mut self) {
        if !self.library.is_empty() {
            self.library_index = (self.library_index + 1) % self.library.len();
        }
    }

    pub fn prev_library(&mut self) {
        if !self.library.is_empty() {
            self.library_index = (self.library_index + self.library.len() - 1) % self.library.len();
        }
    }

    /// Append the library entry currently shown as a new rule.
    pub fn add_from_library(&mut self) {
        let Some(entry) = self.library_entry().cloned() else {
            logger::warn("rule library is empty");
            return;
        };
        let rule = match entry.to_rule(&self.defaults) {
            Ok(rule) => rule,
            Err(e) => {
                logger::error(&e.to_string());
                return;
            }
        };
        if self.edit(|chain| chain.add(rule)).is_some() {
            self.selected = self.views.len().saturating_sub(1);
            self.sync_selection();
            logger::info(&format!("added rule {}", entry.name));
        }
    }

    pub fn start_stop(&mut self) {
        match self.scheduler.state() {
            SchedulerState::Idle => {
                if let Err(e) = self.scheduler.start() {
                    logger::warn(&e.to_string());
                }
            }
            SchedulerState::Running => self.scheduler.stop(),
            SchedulerState::Stopping => {}
        }
    }

    pub fn save_chain(&mut self) {
        let Some(chain) = self.scheduler.rules() else {
            logger::warn("stop the scheduler before saving");
            return;
        };
        match store::save_chain(&self.chain_path, chain) {
            Ok(()) => logger::info(&format!("saved {} rule(s) to {}", chain.len(), self.chain_path.display())),
            Err(e) => logger::error(&e.to_string()),
        }
    }

    pub fn toggle_log(&mut self) {
        self.log_visible = !self.log_visible;
    }

    pub fn quit(&mut self) {
        self.scheduler.stop();
        if let Err(e) = self.scheduler.join() {
            logger::error(&e.to_string());
        }
        self.should_quit = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glance_core::action::{ActionKind, ActionList};
    use glance_core::detector::{DetectionSpec, PixelSpec};
    use glance_core::platform::stub::{StubInput, StubScreen};
    use glance_core::record::{NumOrText, RuleRecord};
    use glance_core::rule::Rule;
    use glance_core::scheduler::SchedulerConfig;
    use glance_core::types::{Point, Rgb};

    fn rule(name: &str, keys: &[&str]) -> Rule {
        let spec = DetectionSpec::Pixel(PixelSpec::new(Point::new(0, 0), Rgb::new(255, 255, 255)));
        let actions: ActionList = keys.iter().map(|k| Action::PressKey(k.to_string())).collect();
        Rule::new(name, spec, actions, &MatchDefaults::default()).unwrap()
    }

    fn app(rules: Vec<Rule>) -> App {
        let mut chain = RuleChain::new();
        for r in rules {
            chain.add(r);
        }
        let (input, _log) = StubInput::new();
        let scheduler = Scheduler::new(
            chain,
            Box::new(StubScreen::blank(4, 4)),
            Box::new(input),
            SchedulerConfig { tick_interval_ms: 10, ..SchedulerConfig::default() },
        );
        let (_tx, rx) = mpsc::channel();
        App::new(scheduler, Vec::new(), MatchDefaults::default(), PathBuf::from("chain.json"), rx)
    }

    #[test]
    fn test_rule_delete_needs_confirmation() {
        let mut a = app(vec![rule("a", &[]), rule("b", &[])]);
        a.move_down();
        a.delete();
        assert_eq!(a.views.len(), 2);

        let dialog = a.confirm.as_mut().unwrap();
        assert!(!dialog.selected);
        dialog.toggle();
        a.resolve_confirm();
        assert!(a.confirm.is_none());
        let names: Vec<&str> = a.views.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, ["a"]);
        assert_eq!(a.selected, 0);
    }

    #[test]
    fn test_declined_confirmation_keeps_rule() {
        let mut a = app(vec![rule("a", &[])]);
        a.delete();
        a.resolve_confirm();
        assert_eq!(a.views.len(), 1);
    }

    #[test]
    fn test_action_reorder_follows_cursor() {
        let mut a = app(vec![rule("r", &["1", "2", "3"])]);
        a.toggle_focus();
        a.move_down();
        a.move_action_down();
        assert_eq!(a.action_cursor, 2);
        assert_eq!(a.views[0].actions, ["Press Key [1]", "Press Key [3]", "Press Key [2]"]);

        a.move_action_up();
        a.move_action_up();
        assert_eq!(a.action_cursor, 0);
        assert_eq!(a.views[0].actions, ["Press Key [2]", "Press Key [1]", "Press Key [3]"]);

        a.delete();
        assert_eq!(a.views[0].actions, ["Press Key [1]", "Press Key [3]"]);
    }

    #[test]
    fn test_edits_ignored_while_running() {
        let mut a = app(vec![rule("r", &["1", "2"])]);
        a.start_stop();
        assert_eq!(a.state(), SchedulerState::Running);

        a.toggle_focus();
        a.move_action_down();
        assert_eq!(a.views[0].actions, ["Press Key [1]", "Press Key [2]"]);

        a.quit();
        assert_eq!(a.state(), SchedulerState::Idle);
        assert!(a.should_quit);
    }

    #[test]
    fn test_add_action_through_prompt() {
        let mut a = app(vec![rule("r", &["1"])]);
        a.begin_add_action();
        let prompt = a.prompt.as_mut().unwrap();
        prompt.prev_kind();
        assert_eq!(prompt.kind(), ActionKind::ClickAtFixedPoint);
        prompt.next_kind();
        prompt.next_kind();
        prompt.next_kind();
        assert_eq!(prompt.kind(), ActionKind::Wait);

        for c in "2x0".chars() {
            a.prompt_input(c);
        }
        a.commit_action();
        assert!(a.prompt.is_some(), "bad wait value was accepted");
        assert_eq!(a.views[0].actions.len(), 1);

        a.prompt_backspace();
        a.prompt_backspace();
        a.prompt_input('0');
        a.commit_action();
        assert!(a.prompt.is_none());
        assert_eq!(a.views[0].actions, ["Press Key [1]", "Wait (ms) [20]"]);
        assert_eq!(a.focus, Focus::Actions);
        assert_eq!(a.action_cursor, 1);
        assert_eq!(a.scheduler.rules().unwrap().get(0).unwrap().actions.get(1), Some(&Action::Wait(20)));
    }

    #[test]
    fn test_add_action_needs_a_rule() {
        let mut a = app(Vec::new());
        a.begin_add_action();
        assert!(a.prompt.is_none());
    }

    #[test]
    fn test_log_panel_is_capped() {
        let mut chain = RuleChain::new();
        chain.add(rule("r", &[]));
        let (input, _log) = StubInput::new();
        let scheduler =
            Scheduler::new(chain, Box::new(StubScreen::blank(4, 4)), Box::new(input), SchedulerConfig::default());
        let (tx, rx) = mpsc::channel();
        let mut a = App::new(scheduler, Vec::new(), MatchDefaults::default(), PathBuf::from("chain.json"), rx);

        for i in 0..LOG_CAP + 10 {
            tx.send(LogLine {
                level: logger::Level::Info,
                prefix: String::new(),
                color: 0,
                timestamp: String::new(),
                message: i.to_string(),
            })
            .unwrap();
        }
        a.drain_logs();
        assert_eq!(a.log_messages.len(), LOG_CAP);
        assert_eq!(a.log_messages.front().unwrap().message, "10");
        assert_eq!(a.log_messages.back().unwrap().message, (LOG_CAP + 9).to_string());
    }

    #[test]
    fn test_library_cycles_and_adds() {
        let mut a = app(Vec::new());
        a.library = vec![
            LibraryEntry {
                name: "first".into(),
                record: RuleRecord::Pixel {
                    x: NumOrText::Num(1),
                    y: NumOrText::Num(1),
                    rgb: "0, 0, 0".into(),
                    tolerance: None,
                },
            },
            LibraryEntry {
                name: "second".into(),
                record: RuleRecord::Image {
                    image_path: "missing.png".into(),
                    threshold: None,
                    method: None,
                    grayscale: None,
                    debug_mode: None,
                },
            },
        ];
        a.prev_library();
        assert_eq!(a.library_entry().unwrap().name, "second");
        a.add_from_library();
        a.next_library();
        a.add_from_library();

        let tags: Vec<&str> = a.views.iter().map(|v| v.tag).collect();
        assert_eq!(tags, ["IMG", "PXL"]);
        assert!(a.views[0].disabled);
        assert_eq!(a.selected, 1);
        assert_eq!(a.scheduler.rules().unwrap().selected(), Some(1));
    }
}
