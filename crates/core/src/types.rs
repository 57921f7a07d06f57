use std::cell::OnceCell;

use image::{Rgba, RgbaImage};
use serde::{Deserialize, Serialize};

use crate::error::CaptureError;
use crate::matcher::{ColorMode, Plane};

/// Absolute screen coordinate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn offset(self, dx: i32, dy: i32) -> Self {
        Self { x: self.x + dx, y: self.y + dy }
    }
}

impl std::fmt::Display for Point {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

/// Largest possible Euclidean distance between two RGB colors.
pub const MAX_RGB_DISTANCE: f64 = 441.672_955_930_063_7;

impl Rgb {
    pub fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub fn distance(self, other: Rgb) -> f64 {
        let dr = self.r as f64 - other.r as f64;
        let dg = self.g as f64 - other.g as f64;
        let db = self.b as f64 - other.b as f64;
        (dr * dr + dg * dg + db * db).sqrt()
    }
}

impl std::fmt::Display for Rgb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}, {}, {}", self.r, self.g, self.b)
    }
}

/// Screen region in absolute pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureRect {
    #[serde(rename = "left")]
    pub l: i32,
    #[serde(rename = "top")]
    pub t: i32,
    #[serde(rename = "width")]
    pub w: i32,
    #[serde(rename = "height")]
    pub h: i32,
}

impl CaptureRect {
    pub fn new(l: i32, t: i32, w: i32, h: i32) -> Self {
        Self { l, t, w, h }
    }

    /// 1x1 region around a single pixel.
    pub fn pixel(at: Point) -> Self {
        Self { l: at.x, t: at.y, w: 1, h: 1 }
    }

    pub fn origin(&self) -> Point {
        Point::new(self.l, self.t)
    }

    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.l && p.y >= self.t && p.x < self.l + self.w && p.y < self.t + self.h
    }

    /// Intersection with `other`, or None when they do not overlap.
    pub fn clip(&self, other: &CaptureRect) -> Option<CaptureRect> {
        let l = self.l.max(other.l);
        let t = self.t.max(other.t);
        let r = (self.l + self.w).min(other.l + other.w);
        let b = (self.t + self.h).min(other.t + other.h);
        if r <= l || b <= t {
            return None;
        }
        Some(CaptureRect { l, t, w: r - l, h: b - t })
    }
}

/// Raw screenshot pixel data (BGRA)
#[derive(Debug, Clone)]
pub struct Capture {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub bytes_per_row: u32,
}

impl Capture {
    pub fn from_rgba(img: &RgbaImage) -> Self {
        let mut data = Vec::with_capacity((img.width() * img.height() * 4) as usize);
        for p in img.pixels() {
            data.extend_from_slice(&[p[2], p[1], p[0], p[3]]);
        }
        Self {
            data,
            width: img.width(),
            height: img.height(),
            bytes_per_row: img.width() * 4,
        }
    }

    pub fn to_rgba(&self) -> RgbaImage {
        RgbaImage::from_fn(self.width, self.height, |x, y| {
            let i = self.index(x, y);
            // Short buffer: missing pixels come out black
            match self.data.get(i..i + 3) {
                Some(px) => Rgba([px[2], px[1], px[0], 255]),
                None => Rgba([0, 0, 0, 255]),
            }
        })
    }

    fn index(&self, x: u32, y: u32) -> usize {
        (y * self.bytes_per_row + x * 4) as usize
    }

    /// Color at a position relative to the capture's top-left corner.
    pub fn pixel(&self, x: u32, y: u32) -> Option<Rgb> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = self.index(x, y);
        let px = self.data.get(i..i + 3)?;
        Some(Rgb::new(px[2], px[1], px[0]))
    }
}

/// One captured frame plus the screen region it was taken from.
///
/// Converted planes are cached per color mode, so every detector evaluated
/// against the same snapshot shares a single conversion.
#[derive(Debug)]
pub struct Snapshot {
    pub capture: Capture,
    pub rect: CaptureRect,
    gray: OnceCell<Plane>,
    color: OnceCell<Plane>,
}

impl Snapshot {
    pub fn new(capture: Capture, rect: CaptureRect) -> Self {
        Self {
            capture,
            rect,
            gray: OnceCell::new(),
            color: OnceCell::new(),
        }
    }

    pub fn origin(&self) -> Point {
        self.rect.origin()
    }

    pub fn plane(&self, mode: ColorMode) -> &Plane {
        let cell = match mode {
            ColorMode::Grayscale => &self.gray,
            ColorMode::Color => &self.color,
        };
        cell.get_or_init(|| Plane::from_capture(&self.capture, mode))
    }

    /// Color at an absolute screen coordinate.
    pub fn pixel_at(&self, at: Point) -> Result<Rgb, CaptureError> {
        let x = at.x - self.rect.l;
        let y = at.y - self.rect.t;
        if x < 0 || y < 0 {
            return Err(CaptureError::OutOfFrame { x: at.x, y: at.y });
        }
        self.capture
            .pixel(x as u32, y as u32)
            .ok_or(CaptureError::OutOfFrame { x: at.x, y: at.y })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_keeps_bgra_order() {
        let img = RgbaImage::from_pixel(2, 1, Rgba([10, 20, 30, 255]));
        let cap = Capture::from_rgba(&img);
        assert_eq!(&cap.data[0..4], &[30, 20, 10, 255]);
        assert_eq!(cap.pixel(1, 0), Some(Rgb::new(10, 20, 30)));
        assert_eq!(cap.pixel(2, 0), None);
    }

    #[test]
    fn test_short_capture_converts_with_black_fill() {
        let img = RgbaImage::from_pixel(3, 2, Rgba([10, 20, 30, 255]));
        let mut cap = Capture::from_rgba(&img);
        cap.data.truncate(4 * 4);

        let rgba = cap.to_rgba();
        assert_eq!(rgba.dimensions(), (3, 2));
        assert_eq!(rgba.get_pixel(0, 1), &Rgba([10, 20, 30, 255]));
        assert_eq!(rgba.get_pixel(1, 1), &Rgba([0, 0, 0, 255]));
        assert_eq!(rgba.get_pixel(2, 1), &Rgba([0, 0, 0, 255]));
    }

    #[test]
    fn test_snapshot_pixel_uses_absolute_coordinates() {
        let mut img = RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 255]));
        img.put_pixel(1, 2, Rgba([200, 100, 50, 255]));
        let snap = Snapshot::new(Capture::from_rgba(&img), CaptureRect::new(100, 50, 4, 4));
        assert_eq!(snap.pixel_at(Point::new(101, 52)).unwrap(), Rgb::new(200, 100, 50));
        assert!(snap.pixel_at(Point::new(99, 52)).is_err());
        assert!(snap.pixel_at(Point::new(104, 52)).is_err());
    }

    #[test]
    fn test_clip() {
        let screen = CaptureRect::new(0, 0, 100, 100);
        assert_eq!(
            CaptureRect::new(90, -5, 20, 20).clip(&screen),
            Some(CaptureRect::new(90, 0, 10, 15))
        );
        assert_eq!(CaptureRect::new(200, 0, 5, 5).clip(&screen), None);
    }
}
