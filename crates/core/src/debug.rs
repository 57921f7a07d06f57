//! Annotated snapshots for debugging image rules.

use std::path::{Path, PathBuf};

use chrono::Local;
use image::{ImageError, Rgba, RgbaImage};

use crate::types::{CaptureRect, Snapshot};

pub const COLOR_MATCH: Rgba<u8> = Rgba([0, 255, 0, 255]); // Green
pub const COLOR_ANCHOR: Rgba<u8> = Rgba([255, 0, 0, 255]); // Red

/// Write `snapshot` with the matched window outlined and its center marked.
/// `found` is relative to the snapshot. Returns the file written.
pub fn dump_match(
    dir: &Path,
    snapshot: &Snapshot,
    found: CaptureRect,
    label: &str,
    score: f32,
) -> Result<PathBuf, ImageError> {
    std::fs::create_dir_all(dir).map_err(ImageError::IoError)?;

    let mut img = snapshot.capture.to_rgba();
    draw_rect(&mut img, found, 2, COLOR_MATCH);
    draw_dot(&mut img, found.l + found.w / 2, found.t + found.h / 2, 2, COLOR_ANCHOR);

    let stem: String = label
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    let name = format!(
        "{}_{}_{:.3}.png",
        Local::now().format("%Y%m%d-%H%M%S%.3f"),
        stem,
        score
    );
    let path = dir.join(name);
    img.save(&path)?;
    Ok(path)
}

fn put(img: &mut RgbaImage, x: i32, y: i32, color: Rgba<u8>) {
    if x >= 0 && y >= 0 && (x as u32) < img.width() && (y as u32) < img.height() {
        img.put_pixel(x as u32, y as u32, color);
    }
}

/// Outline with the given thickness, drawn inward from the rect's edge.
pub fn draw_rect(img: &mut RgbaImage, rect: CaptureRect, thickness: i32, color: Rgba<u8>) {
    for t in 0..thickness {
        for x in rect.l..rect.l + rect.w {
            put(img, x, rect.t + t, color);
            put(img, x, rect.t + rect.h - 1 - t, color);
        }
        for y in rect.t..rect.t + rect.h {
            put(img, rect.l + t, y, color);
            put(img, rect.l + rect.w - 1 - t, y, color);
        }
    }
}

pub fn draw_dot(img: &mut RgbaImage, cx: i32, cy: i32, radius: i32, color: Rgba<u8>) {
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            if dx * dx + dy * dy <= radius * radius {
                put(img, cx + dx, cy + dy, color);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Capture;

    #[test]
    fn test_draw_rect() {
        let mut img = RgbaImage::from_pixel(20, 20, Rgba([0, 0, 0, 255]));
        draw_rect(&mut img, CaptureRect::new(5, 5, 6, 4), 1, COLOR_MATCH);
        assert_eq!(*img.get_pixel(5, 5), COLOR_MATCH);
        assert_eq!(*img.get_pixel(10, 8), COLOR_MATCH);
        assert_eq!(*img.get_pixel(7, 6), Rgba([0, 0, 0, 255]));
    }

    #[test]
    fn test_drawing_clips_at_edges() {
        let mut img = RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 255]));
        draw_rect(&mut img, CaptureRect::new(-3, -3, 10, 10), 2, COLOR_MATCH);
        draw_dot(&mut img, 0, 0, 3, COLOR_ANCHOR);
        assert_eq!(*img.get_pixel(0, 0), COLOR_ANCHOR);
    }

    #[test]
    fn test_dump_creates_directory_and_png() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("nested").join("debug");
        let img = RgbaImage::from_pixel(30, 20, Rgba([40, 40, 40, 255]));
        let snap = Snapshot::new(Capture::from_rgba(&img), CaptureRect::new(0, 0, 30, 20));

        let path = dump_match(&target, &snap, CaptureRect::new(2, 3, 8, 8), "ok button.png", 0.93).unwrap();
        assert!(path.starts_with(&target));
        assert!(path.to_string_lossy().ends_with("_ok_button_png_0.930.png"));

        let back = image::open(&path).unwrap().to_rgba8();
        assert_eq!(*back.get_pixel(2, 3), COLOR_MATCH);
        assert_eq!(*back.get_pixel(6, 7), COLOR_ANCHOR);
    }
}
