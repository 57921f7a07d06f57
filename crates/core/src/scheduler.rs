//! The rule-chain poll loop.
//!
//! [`TickRunner`] owns everything one pass over the chain needs and performs
//! a single tick synchronously. [`Scheduler`] moves the runner onto a worker
//! thread on start and gets it back through the join handle, so the chain is
//! only editable while no worker holds it.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chrono::{DateTime, Local};

use crate::detector::Detect;
use crate::error::SchedulerError;
use crate::executor::ActionExecutor;
use crate::logger;
use crate::platform::{self, CaptureProvider, InputInjector, LiveProbe};
use crate::rule::{Rule, RuleChain};
use crate::sleep::sleep_ms;
use crate::types::CaptureRect;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Running,
    Stopping,
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub tick_interval_ms: u64,
    pub cooldown_ms: u64,
    pub type_delay_ms: u64,
    pub search_region: Option<CaptureRect>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 100,
            cooldown_ms: 500,
            type_delay_ms: 50,
            search_region: None,
        }
    }
}

/// Per-rule activity, written by the worker and read by the controller.
#[derive(Debug, Clone, Default)]
pub struct RuleStatus {
    pub name: String,
    pub fired: u64,
    pub last_fired: Option<DateTime<Local>>,
    pub error: Option<String>,
}

impl RuleStatus {
    fn for_rule(rule: &Rule) -> Self {
        Self { name: rule.name.clone(), ..Self::default() }
    }
}

pub type StatusList = Arc<Mutex<Vec<RuleStatus>>>;

#[derive(Debug, Default)]
pub struct TickReport {
    /// Indices of the rules that fired, in firing order.
    pub fired: Vec<usize>,
    pub detect_errors: Vec<(usize, String)>,
    pub capture_error: Option<String>,
    /// (rule index, action index, error)
    pub action_failures: Vec<(usize, usize, String)>,
    /// The pass stopped early because a stop was requested.
    pub interrupted: bool,
}

/// One rule chain plus the capture and input backends it runs against.
pub struct TickRunner {
    pub chain: RuleChain,
    capture: Box<dyn CaptureProvider>,
    input: Box<dyn InputInjector>,
    config: SchedulerConfig,
    status: StatusList,
}

impl TickRunner {
    pub fn new(
        chain: RuleChain,
        capture: Box<dyn CaptureProvider>,
        input: Box<dyn InputInjector>,
        config: SchedulerConfig,
    ) -> Self {
        let status = Arc::new(Mutex::new(chain.iter().map(RuleStatus::for_rule).collect()));
        Self { chain, capture, input, config, status }
    }

    pub fn status(&self) -> StatusList {
        Arc::clone(&self.status)
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    fn reset_status(&self) {
        *self.status.lock().unwrap() = self.chain.iter().map(RuleStatus::for_rule).collect();
    }

    /// One full pass over the chain.
    pub fn tick(&mut self) -> TickReport {
        self.tick_while(|| true)
    }

    /// One pass over the chain, asking `keep_going` before each rule. A rule
    /// whose actions already started always finishes, cooldown included.
    pub fn tick_while(&mut self, keep_going: impl Fn() -> bool) -> TickReport {
        let mut report = TickReport::default();

        let snapshot = if self.chain.has_image_rules() {
            match platform::snapshot(self.capture.as_ref(), self.config.search_region) {
                Ok(snap) => Some(snap),
                Err(e) => {
                    logger::warn_p("sched", &format!("capture failed: {}", e));
                    report.capture_error = Some(e.to_string());
                    None
                }
            }
        } else {
            None
        };
        let probe = LiveProbe(self.capture.as_ref());

        for (i, rule) in self.chain.iter().enumerate() {
            if !keep_going() {
                report.interrupted = true;
                break;
            }
            // Image rules miss the tick when the snapshot failed.
            if rule.spec.is_image() && snapshot.is_none() {
                continue;
            }

            let hit = match rule.detector.evaluate(snapshot.as_ref(), &probe) {
                Ok(Some(hit)) => hit,
                Ok(None) => continue,
                Err(e) => {
                    logger::warn_p("rule", &format!("{}: {}", rule.name, e));
                    report.detect_errors.push((i, e.to_string()));
                    set_status(&self.status, i, |s| s.error = Some(e.to_string()));
                    continue;
                }
            };

            logger::info_p(
                "rule",
                &format!("{} fired at {} ({:.2})", rule.name, hit.point, hit.confidence),
            );
            let result = ActionExecutor::new(self.input.as_mut(), self.config.type_delay_ms)
                .execute(&rule.actions, hit.point);

            let mut last_error = None;
            for (a, e) in result.failures() {
                report.action_failures.push((i, a, e.to_string()));
                last_error = Some(e.to_string());
            }
            set_status(&self.status, i, |s| {
                s.fired += 1;
                s.last_fired = Some(Local::now());
                s.error = last_error;
            });
            report.fired.push(i);

            sleep_ms(self.config.cooldown_ms);
        }
        report
    }
}

fn set_status(status: &StatusList, index: usize, update: impl FnOnce(&mut RuleStatus)) {
    if let Some(s) = status.lock().unwrap().get_mut(index) {
        update(s);
    }
}

/// Sets the shared state back to Idle when the worker exits, however it exits.
struct IdleOnDrop(Arc<Mutex<SchedulerState>>);

impl Drop for IdleOnDrop {
    fn drop(&mut self) {
        if let Ok(mut state) = self.0.lock() {
            *state = SchedulerState::Idle;
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Worker loop. Runs on a background thread until the state leaves Running,
/// then hands the runner back.
fn run_worker(mut runner: TickRunner, state: Arc<Mutex<SchedulerState>>) -> TickRunner {
    let _idle = IdleOnDrop(Arc::clone(&state));
    let running = || *state.lock().unwrap() == SchedulerState::Running;
    logger::info_p("sched", &format!("started with {} rule(s)", runner.chain.len()));

    while running() {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| runner.tick_while(&running)));
        if let Err(payload) = outcome {
            logger::error_p("sched", &format!("tick panicked: {}", panic_message(payload.as_ref())));
        }

        // Tick interval, in short slices so a stop is seen quickly
        let deadline = Instant::now() + Duration::from_millis(runner.config.tick_interval_ms);
        while running() {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            thread::sleep((deadline - now).min(Duration::from_millis(10)));
        }
    }

    logger::info_p("sched", "stopped");
    runner
}

/// Controller-side handle on the poll loop.
pub struct Scheduler {
    state: Arc<Mutex<SchedulerState>>,
    status: StatusList,
    idle: Option<TickRunner>,
    worker: Option<JoinHandle<TickRunner>>,
}

impl Scheduler {
    pub fn new(
        chain: RuleChain,
        capture: Box<dyn CaptureProvider>,
        input: Box<dyn InputInjector>,
        config: SchedulerConfig,
    ) -> Self {
        let runner = TickRunner::new(chain, capture, input, config);
        Self {
            state: Arc::new(Mutex::new(SchedulerState::Idle)),
            status: runner.status(),
            idle: Some(runner),
            worker: None,
        }
    }

    pub fn state(&self) -> SchedulerState {
        *self.state.lock().unwrap()
    }

    /// True from `start` until the worker has been joined.
    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    /// The chain, unless a worker currently owns it.
    pub fn rules(&self) -> Option<&RuleChain> {
        self.idle.as_ref().map(|r| &r.chain)
    }

    /// The chain for editing. Rejected while running.
    pub fn rules_mut(&mut self) -> Result<&mut RuleChain, SchedulerError> {
        self.reap()?;
        if self.worker.is_some() {
            return Err(SchedulerError::Running);
        }
        self.idle
            .as_mut()
            .map(|r| &mut r.chain)
            .ok_or(SchedulerError::WorkerPanicked)
    }

    pub fn status(&self) -> Vec<RuleStatus> {
        self.status.lock().unwrap().clone()
    }

    pub fn start(&mut self) -> Result<(), SchedulerError> {
        self.reap()?;
        if self.worker.is_some() {
            return Err(SchedulerError::AlreadyRunning);
        }
        let runner = self.idle.take().ok_or(SchedulerError::WorkerPanicked)?;
        if runner.chain.is_empty() {
            self.idle = Some(runner);
            return Err(SchedulerError::NoRules);
        }
        runner.reset_status();

        *self.state.lock().unwrap() = SchedulerState::Running;
        let state = Arc::clone(&self.state);
        self.worker = Some(thread::spawn(move || run_worker(runner, state)));
        Ok(())
    }

    /// Ask the worker to stop. It finishes the rule in flight first.
    pub fn stop(&self) {
        let mut state = self.state.lock().unwrap();
        if *state == SchedulerState::Running {
            *state = SchedulerState::Stopping;
            logger::info_p("sched", "stopping...");
        }
    }

    /// Block until the worker exits and take the chain back.
    pub fn join(&mut self) -> Result<(), SchedulerError> {
        let Some(handle) = self.worker.take() else {
            return Ok(());
        };
        match handle.join() {
            Ok(runner) => {
                self.idle = Some(runner);
                Ok(())
            }
            Err(_) => {
                *self.state.lock().unwrap() = SchedulerState::Idle;
                Err(SchedulerError::WorkerPanicked)
            }
        }
    }

    /// Join the worker if it has exited. Returns true when it was reaped.
    pub fn reap(&mut self) -> Result<bool, SchedulerError> {
        let done = match &self.worker {
            Some(handle) => handle.is_finished() || self.state() == SchedulerState::Idle,
            None => false,
        };
        if done {
            self.join()?;
        }
        Ok(done)
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.stop();
        self.join().ok();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, Rgba, RgbaImage};

    use crate::action::{Action, ActionList};
    use crate::detector::{DetectionSpec, Detector, ImageSpec, MatchDefaults, PixelSpec};
    use crate::error::{CaptureError, InputError};
    use crate::platform::stub::{events, InputEvent, InputLog, StubInput, StubScreen};
    use crate::platform::MouseButton;
    use crate::types::{Capture, Point, Rgb};

    fn config(cooldown_ms: u64) -> SchedulerConfig {
        SchedulerConfig {
            tick_interval_ms: 20,
            cooldown_ms,
            type_delay_ms: 0,
            search_region: None,
        }
    }

    /// Rule matching the black pixel at (0, 0) of a blank stub screen.
    fn black_rule(name: &str, actions: Vec<Action>) -> Rule {
        let spec = DetectionSpec::Pixel(PixelSpec::new(Point::new(0, 0), Rgb::new(0, 0, 0)));
        Rule::new(name, spec, actions.into_iter().collect(), &MatchDefaults::default()).unwrap()
    }

    fn white_rule(name: &str) -> Rule {
        let spec = DetectionSpec::Pixel(PixelSpec::new(Point::new(0, 0), Rgb::new(255, 255, 255)));
        Rule::new(name, spec, ActionList::new(), &MatchDefaults::default()).unwrap()
    }

    fn chain(rules: Vec<Rule>) -> RuleChain {
        let mut c = RuleChain::new();
        for r in rules {
            c.add(r);
        }
        c
    }

    fn runner(rules: Vec<Rule>, screen: StubScreen, cooldown_ms: u64) -> (TickRunner, InputLog) {
        let (input, log) = StubInput::new();
        let r = TickRunner::new(chain(rules), Box::new(screen), Box::new(input), config(cooldown_ms));
        (r, log)
    }

    fn key(k: &str) -> Action {
        Action::PressKey(k.to_string())
    }

    fn wait_until(timeout: Duration, cond: impl Fn() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        cond()
    }

    #[test]
    fn test_rules_fire_in_order_with_cooldown_between() {
        let (mut r, log) = runner(
            vec![black_rule("one", vec![key("a")]), black_rule("two", vec![key("b")])],
            StubScreen::blank(10, 10),
            80,
        );
        let report = r.tick();
        assert_eq!(report.fired, vec![0, 1]);

        let recorded = log.lock().unwrap().clone();
        assert_eq!(recorded.len(), 2);
        assert_eq!(recorded[0].event, InputEvent::Key("a".into()));
        assert_eq!(recorded[1].event, InputEvent::Key("b".into()));
        assert!(recorded[1].at - recorded[0].at >= Duration::from_millis(80));

        let status = r.status().lock().unwrap().clone();
        assert_eq!(status[0].fired, 1);
        assert!(status[1].last_fired.is_some());
    }

    #[test]
    fn test_pixel_only_chain_skips_region_capture() {
        let screen = StubScreen::blank(10, 10);
        let (mut r, _log) = runner(vec![white_rule("w"), white_rule("w2")], screen.clone(), 0);
        let report = r.tick();
        assert!(report.fired.is_empty());
        // One 1x1 probe per pixel rule, no region snapshot
        assert_eq!(screen.grab_count(), 2);
    }

    #[test]
    fn test_anchor_click_uses_image_center() {
        let templ = RgbaImage::from_fn(6, 6, |x, y| Rgba([(x * 40) as u8, (y * 40) as u8, 90, 255]));
        let screen = StubScreen::blank(50, 50);
        screen.paint(&templ, 20, 10);

        let detector = Detector::with_reference(
            &ImageSpec::new("grad.png"),
            &DynamicImage::ImageRgba8(templ),
            &MatchDefaults::default(),
        )
        .unwrap();
        let rule = Rule {
            name: "img".into(),
            spec: DetectionSpec::Image(ImageSpec::new("grad.png")),
            detector,
            actions: vec![Action::ClickAtAnchor].into_iter().collect(),
        };
        let (mut r, log) = runner(vec![rule], screen, 0);
        assert_eq!(r.tick().fired, vec![0]);
        assert_eq!(
            events(&log),
            vec![InputEvent::Move(Point::new(23, 13)), InputEvent::Click(MouseButton::Left)]
        );
    }

    /// Serves single pixels but fails every region capture.
    struct NoRegions(StubScreen);

    impl CaptureProvider for NoRegions {
        fn screen(&self) -> CaptureRect {
            self.0.screen()
        }

        fn grab(&self, rect: CaptureRect) -> Result<Capture, CaptureError> {
            if rect.w > 1 || rect.h > 1 {
                return Err(CaptureError::Failed("display asleep".into()));
            }
            self.0.grab(rect)
        }
    }

    #[test]
    fn test_capture_failure_only_affects_image_rules() {
        let detector = Detector::with_reference(
            &ImageSpec::new("x.png"),
            &DynamicImage::ImageRgba8(RgbaImage::from_pixel(2, 2, Rgba([0, 0, 0, 255]))),
            &MatchDefaults::default(),
        )
        .unwrap();
        let image_rule = Rule {
            name: "img".into(),
            spec: DetectionSpec::Image(ImageSpec::new("x.png")),
            detector,
            actions: vec![key("i")].into_iter().collect(),
        };
        let (input, log) = StubInput::new();
        let mut r = TickRunner::new(
            chain(vec![image_rule, black_rule("px", vec![key("p")])]),
            Box::new(NoRegions(StubScreen::blank(10, 10))),
            Box::new(input),
            config(0),
        );
        let report = r.tick();
        assert!(report.capture_error.is_some());
        assert_eq!(report.fired, vec![1]);
        assert_eq!(events(&log), vec![InputEvent::Key("p".into())]);
    }

    #[test]
    fn test_action_failure_recorded_in_status() {
        let (input, log) = StubInput::new();
        let input = input.reject_key("bad");
        let mut r = TickRunner::new(
            chain(vec![black_rule("r", vec![key("bad"), key("good")])]),
            Box::new(StubScreen::blank(4, 4)),
            Box::new(input),
            config(0),
        );
        let report = r.tick();
        assert_eq!(report.action_failures.len(), 1);
        assert_eq!(report.action_failures[0].1, 0);
        assert_eq!(events(&log), vec![InputEvent::Key("good".into())]);
        assert!(r.status().lock().unwrap()[0].error.is_some());
    }

    #[test]
    fn test_start_with_no_rules_rejected() {
        let (input, _log) = StubInput::new();
        let mut s = Scheduler::new(
            RuleChain::new(),
            Box::new(StubScreen::blank(4, 4)),
            Box::new(input),
            config(0),
        );
        assert_eq!(s.start(), Err(SchedulerError::NoRules));
        assert_eq!(s.state(), SchedulerState::Idle);
        assert!(!s.is_running());
        assert!(s.rules_mut().is_ok());
    }

    #[test]
    fn test_edits_rejected_while_running() {
        let (input, _log) = StubInput::new();
        let mut s = Scheduler::new(
            chain(vec![white_rule("never")]),
            Box::new(StubScreen::blank(4, 4)),
            Box::new(input),
            config(0),
        );
        s.start().unwrap();
        assert_eq!(s.state(), SchedulerState::Running);
        assert_eq!(s.start(), Err(SchedulerError::AlreadyRunning));
        assert!(matches!(s.rules_mut(), Err(SchedulerError::Running)));
        assert!(s.rules().is_none());

        s.stop();
        s.join().unwrap();
        assert_eq!(s.state(), SchedulerState::Idle);
        let rules = s.rules_mut().unwrap();
        rules.remove(0);
        assert!(rules.is_empty());
    }

    #[test]
    fn test_stop_lets_running_chain_finish() {
        let (input, log) = StubInput::new();
        let mut s = Scheduler::new(
            chain(vec![
                black_rule("first", vec![key("a"), Action::Wait(150), key("b")]),
                black_rule("second", vec![key("c")]),
            ]),
            Box::new(StubScreen::blank(4, 4)),
            Box::new(input),
            config(30),
        );
        s.start().unwrap();
        assert!(wait_until(Duration::from_secs(2), || !events(&log).is_empty()));
        s.stop();
        assert_eq!(s.state(), SchedulerState::Stopping);
        s.join().unwrap();

        assert_eq!(
            events(&log),
            vec![InputEvent::Key("a".into()), InputEvent::Key("b".into())]
        );
        assert_eq!(s.state(), SchedulerState::Idle);
        assert_eq!(s.status()[0].fired, 1);
        assert_eq!(s.status()[1].fired, 0);
    }

    /// Panics on every key press.
    struct Exploding(Arc<Mutex<u32>>);

    impl InputInjector for Exploding {
        fn move_to(&mut self, _at: Point) -> Result<(), InputError> {
            Ok(())
        }

        fn click(&mut self, _button: MouseButton) -> Result<(), InputError> {
            Ok(())
        }

        fn press_key(&mut self, _key: &str) -> Result<(), InputError> {
            *self.0.lock().unwrap() += 1;
            panic!("driver crashed");
        }

        fn type_text(&mut self, _text: &str) -> Result<(), InputError> {
            Ok(())
        }
    }

    #[test]
    fn test_panicking_tick_does_not_kill_the_loop() {
        let presses = Arc::new(Mutex::new(0));
        let mut s = Scheduler::new(
            chain(vec![black_rule("boom", vec![key("x")])]),
            Box::new(StubScreen::blank(4, 4)),
            Box::new(Exploding(Arc::clone(&presses))),
            config(0),
        );
        s.start().unwrap();
        assert!(wait_until(Duration::from_secs(2), || *presses.lock().unwrap() >= 3));
        assert_eq!(s.state(), SchedulerState::Running);
        s.stop();
        assert!(s.join().is_ok());
        assert_eq!(s.state(), SchedulerState::Idle);
        assert!(s.rules().is_some());
    }
}
