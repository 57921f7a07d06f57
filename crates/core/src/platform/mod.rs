pub mod stub;

#[cfg(target_os = "macos")]
pub mod darwin;

#[cfg(target_os = "windows")]
pub mod windows;

use crate::error::{CaptureError, InputError};
use crate::logger;
use crate::types::*;

/// Screen snapshots of absolute regions.
pub trait CaptureProvider: Send {
    /// Bounds of the whole capturable screen.
    fn screen(&self) -> CaptureRect;
    fn grab(&self, rect: CaptureRect) -> Result<Capture, CaptureError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

/// Side-effecting pointer and keyboard operations.
pub trait InputInjector: Send {
    fn move_to(&mut self, at: Point) -> Result<(), InputError>;
    fn click(&mut self, button: MouseButton) -> Result<(), InputError>;
    /// One keydown + keyup of a key symbol such as "e", "enter" or "f5".
    fn press_key(&mut self, key: &str) -> Result<(), InputError>;
    fn type_text(&mut self, text: &str) -> Result<(), InputError>;
}

/// Reads single pixels on demand.
pub trait PixelSource {
    fn pixel_at(&self, at: Point) -> Result<Rgb, CaptureError>;
}

impl PixelSource for Snapshot {
    fn pixel_at(&self, at: Point) -> Result<Rgb, CaptureError> {
        Snapshot::pixel_at(self, at)
    }
}

/// Pixel reads through a dedicated 1x1 capture each time.
pub struct LiveProbe<'a>(pub &'a dyn CaptureProvider);

impl PixelSource for LiveProbe<'_> {
    fn pixel_at(&self, at: Point) -> Result<Rgb, CaptureError> {
        let cap = self.0.grab(CaptureRect::pixel(at))?;
        cap.pixel(0, 0).ok_or(CaptureError::OutOfFrame { x: at.x, y: at.y })
    }
}

/// Capture `rect` (or the whole screen) and wrap it as a snapshot.
pub fn snapshot(
    capture: &dyn CaptureProvider,
    rect: Option<CaptureRect>,
) -> Result<Snapshot, CaptureError> {
    let rect = rect.unwrap_or_else(|| capture.screen());
    if rect.w <= 0 || rect.h <= 0 {
        return Err(CaptureError::EmptyRegion { w: rect.w, h: rect.h });
    }
    let cap = capture.grab(rect)?;
    Ok(Snapshot::new(cap, rect))
}

pub type Backend = (Box<dyn CaptureProvider>, Box<dyn InputInjector>);

/// Create the capture + input backend for the current OS.
pub fn create_platform(force_stub: bool) -> Backend {
    logger::register_prefix("sched", logger::COLOR_GREEN);
    logger::register_prefix("rule", logger::COLOR_BLUE);
    if force_stub {
        return stub_backend();
    }
    #[cfg(target_os = "macos")]
    {
        logger::register_prefix("darwin", logger::COLOR_GRAY);
        return (Box::new(darwin::DarwinScreen::new()), Box::new(darwin::DarwinInput::new()));
    }
    #[cfg(target_os = "windows")]
    {
        logger::register_prefix("win32", logger::COLOR_GRAY);
        return (Box::new(self::windows::GdiScreen::new()), Box::new(self::windows::SendInputInjector::new()));
    }
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    {
        stub_backend()
    }
}

fn stub_backend() -> Backend {
    logger::register_prefix("stub", logger::COLOR_GRAY);
    let (input, _events) = stub::StubInput::new();
    (Box::new(stub::StubScreen::blank(1920, 1080)), Box::new(input))
}
