use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use image::{imageops, Rgba, RgbaImage};

use super::{CaptureProvider, InputInjector, MouseButton};
use crate::error::{CaptureError, InputError};
use crate::logger;
use crate::types::*;

/// In-memory screen. The scene is shared, so a test (or a demo driver) can
/// repaint it while the scheduler is polling.
#[derive(Clone)]
pub struct StubScreen {
    scene: Arc<Mutex<RgbaImage>>,
    grabs: Arc<Mutex<u64>>,
}

impl StubScreen {
    pub fn new(scene: RgbaImage) -> Self {
        Self {
            scene: Arc::new(Mutex::new(scene)),
            grabs: Arc::new(Mutex::new(0)),
        }
    }

    pub fn blank(width: u32, height: u32) -> Self {
        Self::new(RgbaImage::from_pixel(width, height, Rgba([0, 0, 0, 255])))
    }

    /// Replace the whole scene.
    pub fn set_scene(&self, scene: RgbaImage) {
        *self.scene.lock().unwrap() = scene;
    }

    /// Draw `patch` with its top-left corner at (x, y).
    pub fn paint(&self, patch: &RgbaImage, x: i64, y: i64) {
        imageops::replace(&mut *self.scene.lock().unwrap(), patch, x, y);
    }

    pub fn set_pixel(&self, at: Point, color: Rgb) {
        let mut scene = self.scene.lock().unwrap();
        if at.x >= 0 && at.y >= 0 && (at.x as u32) < scene.width() && (at.y as u32) < scene.height() {
            scene.put_pixel(at.x as u32, at.y as u32, Rgba([color.r, color.g, color.b, 255]));
        }
    }

    /// Number of grab calls served so far.
    pub fn grab_count(&self) -> u64 {
        *self.grabs.lock().unwrap()
    }
}

impl CaptureProvider for StubScreen {
    fn screen(&self) -> CaptureRect {
        let scene = self.scene.lock().unwrap();
        CaptureRect::new(0, 0, scene.width() as i32, scene.height() as i32)
    }

    fn grab(&self, rect: CaptureRect) -> Result<Capture, CaptureError> {
        *self.grabs.lock().unwrap() += 1;
        let scene = self.scene.lock().unwrap();
        let bounds = CaptureRect::new(0, 0, scene.width() as i32, scene.height() as i32);
        let clipped = bounds
            .clip(&rect)
            .ok_or(CaptureError::Failed(format!("{:?} is off screen", rect)))?;
        let crop = imageops::crop_imm(
            &*scene,
            clipped.l as u32,
            clipped.t as u32,
            clipped.w as u32,
            clipped.h as u32,
        )
        .to_image();
        Ok(Capture::from_rgba(&crop))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputEvent {
    Move(Point),
    Click(MouseButton),
    Key(String),
    Text(String),
}

#[derive(Debug, Clone)]
pub struct RecordedInput {
    pub at: Instant,
    pub event: InputEvent,
}

pub type InputLog = Arc<Mutex<Vec<RecordedInput>>>;

/// Input injector that logs and records every call instead of touching
/// the real devices.
pub struct StubInput {
    events: InputLog,
    rejected: HashSet<String>,
}

impl StubInput {
    pub fn new() -> (Self, InputLog) {
        let events: InputLog = Arc::new(Mutex::new(Vec::new()));
        let input = Self { events: Arc::clone(&events), rejected: HashSet::new() };
        (input, events)
    }

    /// Make `press_key(key)` fail, for exercising error paths.
    pub fn reject_key(mut self, key: &str) -> Self {
        self.rejected.insert(key.to_string());
        self
    }

    fn record(&self, event: InputEvent) {
        self.events.lock().unwrap().push(RecordedInput { at: Instant::now(), event });
    }
}

impl InputInjector for StubInput {
    fn move_to(&mut self, at: Point) -> Result<(), InputError> {
        logger::info_p("stub", &format!("move_to{}", at));
        self.record(InputEvent::Move(at));
        Ok(())
    }

    fn click(&mut self, button: MouseButton) -> Result<(), InputError> {
        logger::info_p("stub", &format!("click({:?})", button));
        self.record(InputEvent::Click(button));
        Ok(())
    }

    fn press_key(&mut self, key: &str) -> Result<(), InputError> {
        if self.rejected.contains(key) {
            return Err(InputError::UnknownKey(key.to_string()));
        }
        logger::info_p("stub", &format!("press_key(\"{}\")", key));
        self.record(InputEvent::Key(key.to_string()));
        Ok(())
    }

    fn type_text(&mut self, text: &str) -> Result<(), InputError> {
        logger::info_p("stub", &format!("type_text(\"{}\")", text));
        self.record(InputEvent::Text(text.to_string()));
        Ok(())
    }
}

/// Events recorded so far, without timestamps.
pub fn events(log: &InputLog) -> Vec<InputEvent> {
    log.lock().unwrap().iter().map(|r| r.event.clone()).collect()
}
