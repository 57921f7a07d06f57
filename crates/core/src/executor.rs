use std::sync::OnceLock;

use regex::Regex;

use crate::action::{Action, ActionList};
use crate::error::{ActionError, ActionResult};
use crate::logger;
use crate::platform::{InputInjector, MouseButton};
use crate::sleep::sleep_ms;
use crate::types::Point;

/// Outcome of every step of one action list, in order.
#[derive(Debug, Default)]
pub struct ActionReport {
    pub results: Vec<ActionResult>,
}

impl ActionReport {
    pub fn is_ok(&self) -> bool {
        self.results.iter().all(Result::is_ok)
    }

    pub fn failures(&self) -> impl Iterator<Item = (usize, &ActionError)> {
        self.results
            .iter()
            .enumerate()
            .filter_map(|(i, r)| r.as_ref().err().map(|e| (i, e)))
    }
}

/// Parse "x, y" (two integers, spaces optional).
pub fn parse_point(payload: &str) -> Result<Point, ActionError> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"^\s*(-?\d+)\s*,\s*(-?\d+)\s*$").expect("static pattern")
    });
    let bad = || ActionError::BadPayload { payload: payload.to_string() };
    let caps = re.captures(payload).ok_or_else(bad)?;
    let x = caps[1].parse().map_err(|_| bad())?;
    let y = caps[2].parse().map_err(|_| bad())?;
    Ok(Point::new(x, y))
}

/// Runs action lists against an input injector, one step at a time.
pub struct ActionExecutor<'a> {
    injector: &'a mut dyn InputInjector,
    type_delay_ms: u64,
}

impl<'a> ActionExecutor<'a> {
    pub fn new(injector: &'a mut dyn InputInjector, type_delay_ms: u64) -> Self {
        Self { injector, type_delay_ms }
    }

    /// Run every action in order. A failed step is logged and the next one
    /// still runs; nothing already done is undone.
    pub fn execute(&mut self, actions: &ActionList, anchor: Point) -> ActionReport {
        let mut report = ActionReport::default();
        for action in actions {
            let result = self.step(action, anchor);
            if let Err(e) = &result {
                logger::warn_p("rule", &format!("{} failed: {}", action, e));
            }
            report.results.push(result);
        }
        report
    }

    fn step(&mut self, action: &Action, anchor: Point) -> ActionResult {
        match action {
            Action::PressKey(key) => self.injector.press_key(key)?,
            Action::TypeText(text) => {
                let mut buf = [0u8; 4];
                for ch in text.chars() {
                    self.injector.type_text(ch.encode_utf8(&mut buf))?;
                    sleep_ms(self.type_delay_ms);
                }
            }
            Action::Wait(ms) => sleep_ms(*ms),
            Action::ClickAtAnchor => self.click_at(anchor)?,
            Action::ClickAtFixedPoint(payload) => {
                let at = parse_point(payload)?;
                self.click_at(at)?;
            }
        }
        Ok(())
    }

    fn click_at(&mut self, at: Point) -> ActionResult {
        self.injector.move_to(at)?;
        self.injector.click(MouseButton::Left)?;
        Ok(())
    }
}
