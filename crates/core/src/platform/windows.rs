use std::mem;
use std::thread;
use std::time::Duration;

use ::windows::Win32::Foundation::HWND;
use ::windows::Win32::Graphics::Gdi::{
    BitBlt, CreateCompatibleBitmap, CreateCompatibleDC, DeleteDC, DeleteObject, GetDC, GetDIBits,
    ReleaseDC, SelectObject, BITMAPINFO, BITMAPINFOHEADER, BI_RGB, DIB_RGB_COLORS, SRCCOPY,
};
use ::windows::Win32::UI::Input::KeyboardAndMouse::*;
use ::windows::Win32::UI::WindowsAndMessaging::{GetSystemMetrics, SM_CXSCREEN, SM_CYSCREEN};

use super::{CaptureProvider, InputInjector, MouseButton};
use crate::error::{CaptureError, InputError};
use crate::logger;
use crate::types::*;

/// Primary screen capture through a GDI memory bitmap.
pub struct GdiScreen;

impl GdiScreen {
    pub fn new() -> Self {
        GdiScreen
    }
}

impl CaptureProvider for GdiScreen {
    fn screen(&self) -> CaptureRect {
        let (w, h) = unsafe { (GetSystemMetrics(SM_CXSCREEN), GetSystemMetrics(SM_CYSCREEN)) };
        CaptureRect::new(0, 0, w, h)
    }

    fn grab(&self, rect: CaptureRect) -> Result<Capture, CaptureError> {
        if rect.w <= 0 || rect.h <= 0 {
            return Err(CaptureError::EmptyRegion { w: rect.w, h: rect.h });
        }
        let mut data = vec![0u8; rect.w as usize * rect.h as usize * 4];

        unsafe {
            let screen_dc = GetDC(HWND::default());
            let mem_dc = CreateCompatibleDC(screen_dc);
            let bitmap = CreateCompatibleBitmap(screen_dc, rect.w, rect.h);
            let old = SelectObject(mem_dc, bitmap);

            let blit = BitBlt(mem_dc, 0, 0, rect.w, rect.h, screen_dc, rect.l, rect.t, SRCCOPY);

            // Negative height: top-down rows, 32-bit BGRA
            let mut info = BITMAPINFO {
                bmiHeader: BITMAPINFOHEADER {
                    biSize: mem::size_of::<BITMAPINFOHEADER>() as u32,
                    biWidth: rect.w,
                    biHeight: -rect.h,
                    biPlanes: 1,
                    biBitCount: 32,
                    biCompression: BI_RGB.0,
                    ..Default::default()
                },
                ..Default::default()
            };
            let lines = GetDIBits(
                mem_dc,
                bitmap,
                0,
                rect.h as u32,
                Some(data.as_mut_ptr().cast()),
                &mut info,
                DIB_RGB_COLORS,
            );

            SelectObject(mem_dc, old);
            let _ = DeleteObject(bitmap);
            let _ = DeleteDC(mem_dc);
            ReleaseDC(HWND::default(), screen_dc);

            if let Err(e) = blit {
                return Err(CaptureError::Failed(format!("BitBlt: {}", e)));
            }
            if lines != rect.h {
                return Err(CaptureError::Failed(format!("GetDIBits copied {} of {} rows", lines, rect.h)));
            }
        }

        Ok(Capture {
            data,
            width: rect.w as u32,
            height: rect.h as u32,
            bytes_per_row: rect.w as u32 * 4,
        })
    }
}

fn key_to_vk(name: &str) -> Option<VIRTUAL_KEY> {
    let lower = name.to_lowercase();
    let mut chars = lower.chars();
    if let (Some(ch), None) = (chars.next(), chars.next()) {
        if ch.is_ascii_alphanumeric() {
            return Some(VIRTUAL_KEY(ch.to_ascii_uppercase() as u16));
        }
    }
    match lower.as_str() {
        "f1" => Some(VK_F1),
        "f2" => Some(VK_F2),
        "f3" => Some(VK_F3),
        "f4" => Some(VK_F4),
        "f5" => Some(VK_F5),
        "f6" => Some(VK_F6),
        "f7" => Some(VK_F7),
        "f8" => Some(VK_F8),
        "f9" => Some(VK_F9),
        "f10" => Some(VK_F10),
        "f11" => Some(VK_F11),
        "f12" => Some(VK_F12),
        "ctrl" | "control" => Some(VK_CONTROL),
        "alt" => Some(VK_MENU),
        "shift" => Some(VK_SHIFT),
        "win" => Some(VK_LWIN),
        "enter" | "return" => Some(VK_RETURN),
        "tab" => Some(VK_TAB),
        "escape" | "esc" => Some(VK_ESCAPE),
        "space" => Some(VK_SPACE),
        "backspace" => Some(VK_BACK),
        "delete" | "del" => Some(VK_DELETE),
        "insert" => Some(VK_INSERT),
        "home" => Some(VK_HOME),
        "end" => Some(VK_END),
        "pageup" => Some(VK_PRIOR),
        "pagedown" => Some(VK_NEXT),
        "up" => Some(VK_UP),
        "down" => Some(VK_DOWN),
        "left" => Some(VK_LEFT),
        "right" => Some(VK_RIGHT),
        _ => None,
    }
}

fn is_extended_key(vk: VIRTUAL_KEY) -> bool {
    matches!(
        vk,
        VK_UP | VK_DOWN | VK_LEFT | VK_RIGHT | VK_INSERT | VK_DELETE | VK_HOME | VK_END | VK_PRIOR | VK_NEXT
    )
}

fn key_input(vk: VIRTUAL_KEY, scan: u16, flags: KEYBD_EVENT_FLAGS) -> INPUT {
    INPUT {
        r#type: INPUT_KEYBOARD,
        Anonymous: INPUT_0 {
            ki: KEYBDINPUT {
                wVk: vk,
                wScan: scan,
                dwFlags: flags,
                time: 0,
                dwExtraInfo: 0,
            },
        },
    }
}

fn mouse_input(dx: i32, dy: i32, flags: MOUSE_EVENT_FLAGS) -> INPUT {
    INPUT {
        r#type: INPUT_MOUSE,
        Anonymous: INPUT_0 {
            mi: MOUSEINPUT {
                dx,
                dy,
                dwFlags: flags,
                ..Default::default()
            },
        },
    }
}

fn send(inputs: &[INPUT]) -> Result<(), InputError> {
    let sent = unsafe { SendInput(inputs, mem::size_of::<INPUT>() as i32) };
    if sent as usize == inputs.len() {
        Ok(())
    } else {
        Err(InputError::Failed(format!("SendInput accepted {} of {} events", sent, inputs.len())))
    }
}

/// Hardware-level input through SendInput. Moves the real cursor.
pub struct SendInputInjector;

impl SendInputInjector {
    pub fn new() -> Self {
        SendInputInjector
    }
}

impl InputInjector for SendInputInjector {
    fn move_to(&mut self, at: Point) -> Result<(), InputError> {
        let (w, h) = unsafe { (GetSystemMetrics(SM_CXSCREEN), GetSystemMetrics(SM_CYSCREEN)) };
        if w <= 0 || h <= 0 {
            return Err(InputError::Failed("screen metrics unavailable".into()));
        }
        // MOUSEEVENTF_ABSOLUTE wants 0..65535
        let nx = (at.x as i64 * 65535 / w as i64) as i32;
        let ny = (at.y as i64 * 65535 / h as i64) as i32;
        send(&[mouse_input(nx, ny, MOUSEEVENTF_MOVE | MOUSEEVENTF_ABSOLUTE)])
    }

    fn click(&mut self, button: MouseButton) -> Result<(), InputError> {
        let (down, up) = match button {
            MouseButton::Left => (MOUSEEVENTF_LEFTDOWN, MOUSEEVENTF_LEFTUP),
            MouseButton::Right => (MOUSEEVENTF_RIGHTDOWN, MOUSEEVENTF_RIGHTUP),
            MouseButton::Middle => (MOUSEEVENTF_MIDDLEDOWN, MOUSEEVENTF_MIDDLEUP),
        };
        send(&[mouse_input(0, 0, down)])?;
        thread::sleep(Duration::from_millis(30));
        send(&[mouse_input(0, 0, up)])
    }

    fn press_key(&mut self, key: &str) -> Result<(), InputError> {
        // Modifier combos like ctrl+shift+s
        let parts: Vec<&str> = key.split('+').map(str::trim).collect();
        let mut vks = Vec::with_capacity(parts.len());
        for part in &parts {
            vks.push(key_to_vk(part).ok_or_else(|| InputError::UnknownKey(part.to_string()))?);
        }
        logger::info_p("win32", &format!("press {}", key));

        let mut inputs = Vec::with_capacity(vks.len() * 2);
        for &vk in &vks {
            let ext = if is_extended_key(vk) { KEYEVENTF_EXTENDEDKEY } else { KEYBD_EVENT_FLAGS(0) };
            inputs.push(key_input(vk, 0, ext));
        }
        for &vk in vks.iter().rev() {
            let ext = if is_extended_key(vk) { KEYEVENTF_EXTENDEDKEY } else { KEYBD_EVENT_FLAGS(0) };
            inputs.push(key_input(vk, 0, ext | KEYEVENTF_KEYUP));
        }
        send(&inputs)
    }

    fn type_text(&mut self, text: &str) -> Result<(), InputError> {
        let mut inputs = Vec::new();
        for unit in text.encode_utf16() {
            inputs.push(key_input(VIRTUAL_KEY(0), unit, KEYEVENTF_UNICODE));
            inputs.push(key_input(VIRTUAL_KEY(0), unit, KEYEVENTF_UNICODE | KEYEVENTF_KEYUP));
        }
        if inputs.is_empty() {
            return Ok(());
        }
        send(&inputs)
    }
}
