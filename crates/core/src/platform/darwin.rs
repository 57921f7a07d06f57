use std::process::{Command as ProcessCommand, Stdio};
use std::thread;
use std::time::Duration;

use core_graphics::display::CGDisplay;
use core_graphics::event::*;
use core_graphics::event_source::*;
use core_graphics::geometry::*;
use core_graphics::window::*;

use super::{CaptureProvider, InputInjector, MouseButton};
use crate::error::{CaptureError, InputError};
use crate::logger;
use crate::types::*;

// AppleScript key codes for special keys
fn applescript_key_code(key: &str) -> Option<u16> {
    match key {
        "enter" | "return" => Some(36),
        "escape" | "esc" => Some(53),
        "delete" | "backspace" => Some(51),
        "tab" => Some(48),
        "space" => Some(49),
        "up" => Some(126),
        "down" => Some(125),
        "left" => Some(123),
        "right" => Some(124),
        "home" => Some(115),
        "end" => Some(119),
        "pageup" => Some(116),
        "pagedown" => Some(121),
        "f1" => Some(122),
        "f2" => Some(120),
        "f3" => Some(99),
        "f4" => Some(118),
        "f5" => Some(96),
        "f6" => Some(97),
        "f7" => Some(98),
        "f8" => Some(100),
        "f9" => Some(101),
        "f10" => Some(109),
        "f11" => Some(103),
        "f12" => Some(111),
        _ => None,
    }
}

fn escape_applescript(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

fn run_osascript(script: &str) -> Result<(), InputError> {
    let status = ProcessCommand::new("osascript")
        .arg("-e")
        .arg(script)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map_err(|e| InputError::Failed(format!("osascript: {}", e)))?;
    if status.success() {
        Ok(())
    } else {
        Err(InputError::Failed(format!("osascript exited with {}", status)))
    }
}

/// Main display capture through the window server.
pub struct DarwinScreen;

impl DarwinScreen {
    pub fn new() -> Self {
        DarwinScreen
    }
}

impl CaptureProvider for DarwinScreen {
    fn screen(&self) -> CaptureRect {
        let b = CGDisplay::main().bounds();
        CaptureRect::new(
            b.origin.x as i32,
            b.origin.y as i32,
            b.size.width as i32,
            b.size.height as i32,
        )
    }

    fn grab(&self, rect: CaptureRect) -> Result<Capture, CaptureError> {
        if rect.w <= 0 || rect.h <= 0 {
            return Err(CaptureError::EmptyRegion { w: rect.w, h: rect.h });
        }
        let cg_rect = CGRect::new(
            &CGPoint::new(rect.l as f64, rect.t as f64),
            &CGSize::new(rect.w as f64, rect.h as f64),
        );

        // Nominal resolution keeps one pixel per point on Retina displays,
        // so capture coordinates line up with pointer coordinates.
        let image_option = kCGWindowImageBoundsIgnoreFraming | kCGWindowImageNominalResolution;
        let image = create_image(cg_rect, kCGWindowListOptionOnScreenOnly, kCGNullWindowID, image_option)
            .ok_or_else(|| {
                CaptureError::Failed("CGWindowListCreateImage returned nothing (screen recording permission?)".into())
            })?;

        let bpr = image.bytes_per_row() as u32;
        let cf_data = image.data();
        Ok(Capture {
            data: cf_data.bytes().to_vec(),
            width: image.width() as u32,
            height: image.height() as u32,
            bytes_per_row: bpr,
        })
    }
}

/// Global pointer events through CGEvent, keys through System Events.
pub struct DarwinInput {
    cursor: Option<CGPoint>,
}

impl DarwinInput {
    pub fn new() -> Self {
        Self { cursor: None }
    }

    fn source() -> Result<CGEventSource, InputError> {
        CGEventSource::new(CGEventSourceStateID::HIDSystemState)
            .map_err(|_| InputError::Failed("failed to create CGEventSource".into()))
    }

    fn post_mouse(
        &self,
        kind: CGEventType,
        point: CGPoint,
        button: CGMouseButton,
    ) -> Result<(), InputError> {
        let event = CGEvent::new_mouse_event(Self::source()?, kind, point, button)
            .map_err(|_| InputError::Failed(format!("failed to create mouse event {:?}", kind as u32)))?;
        event.post(CGEventTapLocation::HID);
        Ok(())
    }
}

impl InputInjector for DarwinInput {
    fn move_to(&mut self, at: Point) -> Result<(), InputError> {
        let point = CGPoint::new(at.x as f64, at.y as f64);
        self.post_mouse(CGEventType::MouseMoved, point, CGMouseButton::Left)?;
        self.cursor = Some(point);
        Ok(())
    }

    fn click(&mut self, button: MouseButton) -> Result<(), InputError> {
        let point = self
            .cursor
            .ok_or_else(|| InputError::Failed("click before any move_to".into()))?;
        let (down, up, cg_button) = match button {
            MouseButton::Left => (CGEventType::LeftMouseDown, CGEventType::LeftMouseUp, CGMouseButton::Left),
            MouseButton::Right => (CGEventType::RightMouseDown, CGEventType::RightMouseUp, CGMouseButton::Right),
            MouseButton::Middle => (CGEventType::OtherMouseDown, CGEventType::OtherMouseUp, CGMouseButton::Center),
        };

        self.post_mouse(down, point, cg_button)?;
        thread::sleep(Duration::from_millis(15));
        self.post_mouse(up, point, cg_button)?;
        thread::sleep(Duration::from_millis(15));
        Ok(())
    }

    fn press_key(&mut self, key: &str) -> Result<(), InputError> {
        // Parse modifiers (cmd+a, shift+up, etc)
        let parts: Vec<&str> = key.split('+').map(str::trim).collect();
        let main_key = parts.last().copied().unwrap_or(key);
        let mut modifiers = Vec::new();

        for part in &parts[..parts.len().saturating_sub(1)] {
            match part.to_lowercase().as_str() {
                "cmd" | "command" => modifiers.push("command down"),
                "shift" => modifiers.push("shift down"),
                "ctrl" | "control" => modifiers.push("control down"),
                "alt" | "option" => modifiers.push("option down"),
                other => return Err(InputError::UnknownKey(other.to_string())),
            }
        }

        let mut chars = main_key.chars();
        let main_key_lower = match (chars.next(), chars.next()) {
            (Some(ch), None) => {
                if ch.is_ascii_uppercase() && !modifiers.contains(&"shift down") {
                    modifiers.push("shift down");
                }
                ch.to_lowercase().to_string()
            }
            _ => main_key.to_lowercase(),
        };

        let key_part = if let Some(code) = applescript_key_code(&main_key_lower) {
            format!("key code {}", code)
        } else if main_key_lower.chars().count() == 1 {
            format!("keystroke \"{}\"", escape_applescript(&main_key_lower))
        } else {
            return Err(InputError::UnknownKey(main_key.to_string()));
        };

        let modifier_str = if modifiers.is_empty() {
            String::new()
        } else {
            format!(" using {{{}}}", modifiers.join(", "))
        };

        logger::info_p("darwin", &format!("{}{}", key_part, modifier_str));
        run_osascript(&format!(
            "tell application \"System Events\" to {}{}",
            key_part, modifier_str
        ))
    }

    fn type_text(&mut self, text: &str) -> Result<(), InputError> {
        run_osascript(&format!(
            "tell application \"System Events\" to keystroke \"{}\"",
            escape_applescript(text)
        ))
    }
}
