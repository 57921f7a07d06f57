//! One detection condition, resolved and ready to evaluate.
//!
//! A [`DetectionSpec`] is what the user configured. A [`Detector`] is that
//! spec with every unset option filled from [`MatchDefaults`] and, for image
//! specs, the reference image loaded and converted once.

use std::path::{Path, PathBuf};

use image::DynamicImage;

use crate::debug;
use crate::error::{DetectError, MatchResult, RecordError};
use crate::logger;
use crate::matcher::{self, ColorMode, MatchMethod, Plane};
use crate::platform::PixelSource;
use crate::types::*;

#[derive(Debug, Clone, PartialEq)]
pub struct PixelSpec {
    pub at: Point,
    pub color: Rgb,
    pub tolerance: Option<f64>,
}

impl PixelSpec {
    pub fn new(at: Point, color: Rgb) -> Self {
        Self { at, color, tolerance: None }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImageSpec {
    pub reference: PathBuf,
    pub method: Option<MatchMethod>,
    pub threshold: Option<f32>,
    pub color_mode: Option<ColorMode>,
    pub debug: Option<bool>,
}

impl ImageSpec {
    pub fn new(reference: impl Into<PathBuf>) -> Self {
        Self {
            reference: reference.into(),
            method: None,
            threshold: None,
            color_mode: None,
            debug: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DetectionSpec {
    Pixel(PixelSpec),
    Image(ImageSpec),
}

impl DetectionSpec {
    pub fn validate(&self) -> Result<(), RecordError> {
        match self {
            DetectionSpec::Pixel(p) => {
                if p.at.x < 0 || p.at.y < 0 {
                    return Err(RecordError::NegativeCoordinate { x: p.at.x, y: p.at.y });
                }
                if let Some(t) = p.tolerance {
                    if t.is_nan() || t < 0.0 {
                        return Err(RecordError::BadNumber { field: "tolerance", value: t.to_string() });
                    }
                }
            }
            DetectionSpec::Image(img) => {
                if img.reference.as_os_str().is_empty() {
                    return Err(RecordError::EmptyPath);
                }
                if let Some(t) = img.threshold {
                    if !(0.0..=1.0).contains(&t) {
                        return Err(RecordError::ThresholdRange(t));
                    }
                }
            }
        }
        Ok(())
    }

    pub fn is_image(&self) -> bool {
        matches!(self, DetectionSpec::Image(_))
    }
}

/// Values used for every option a spec leaves unset.
#[derive(Debug, Clone)]
pub struct MatchDefaults {
    pub threshold: f32,
    pub method: MatchMethod,
    pub color_mode: ColorMode,
    pub debug: bool,
    pub pixel_tolerance: f64,
    pub debug_dir: Option<PathBuf>,
}

impl Default for MatchDefaults {
    fn default() -> Self {
        Self {
            threshold: 0.8,
            method: MatchMethod::CCoeffNormed,
            color_mode: ColorMode::Color,
            debug: false,
            pixel_tolerance: 20.0,
            debug_dir: None,
        }
    }
}

/// A detection hit: the anchor in absolute screen coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hit {
    pub point: Point,
    pub confidence: f32,
}

/// Anything that can be asked "does your condition hold right now".
pub trait Detect {
    /// `snapshot` is shared by every detector of one evaluation pass;
    /// `pixels` serves pixel conditions.
    fn evaluate(&self, snapshot: Option<&Snapshot>, pixels: &dyn PixelSource) -> MatchResult;

    fn label(&self) -> String;
}

#[derive(Debug)]
struct PixelCheck {
    at: Point,
    color: Rgb,
    tolerance: f64,
}

#[derive(Debug)]
struct ImageCheck {
    path: PathBuf,
    reference: Option<Plane>,
    method: MatchMethod,
    threshold: f32,
    color_mode: ColorMode,
    debug_dir: Option<PathBuf>,
}

#[derive(Debug)]
enum Check {
    Pixel(PixelCheck),
    Image(ImageCheck),
}

#[derive(Debug)]
pub struct Detector {
    check: Check,
}

impl Detector {
    /// Resolve `spec` against `defaults`. An image that fails to load is
    /// logged here, once, and the detector never matches afterwards.
    pub fn new(spec: &DetectionSpec, defaults: &MatchDefaults) -> Result<Self, RecordError> {
        spec.validate()?;
        let check = match spec {
            DetectionSpec::Pixel(p) => Check::Pixel(PixelCheck {
                at: p.at,
                color: p.color,
                tolerance: p.tolerance.unwrap_or(defaults.pixel_tolerance),
            }),
            DetectionSpec::Image(img) => {
                let loaded = match image::open(&img.reference) {
                    Ok(decoded) => Some(decoded),
                    Err(e) => {
                        logger::error(&format!(
                            "failed to load {}: {}, rule disabled",
                            img.reference.display(),
                            e
                        ));
                        None
                    }
                };
                Check::Image(Self::image_check(img, loaded.as_ref(), defaults))
            }
        };
        Ok(Self { check })
    }

    /// Image detector around an already decoded reference.
    pub fn with_reference(
        spec: &ImageSpec,
        reference: &DynamicImage,
        defaults: &MatchDefaults,
    ) -> Result<Self, RecordError> {
        DetectionSpec::Image(spec.clone()).validate()?;
        Ok(Self { check: Check::Image(Self::image_check(spec, Some(reference), defaults)) })
    }

    fn image_check(
        spec: &ImageSpec,
        reference: Option<&DynamicImage>,
        defaults: &MatchDefaults,
    ) -> ImageCheck {
        let color_mode = spec.color_mode.unwrap_or(defaults.color_mode);
        let debug = spec.debug.unwrap_or(defaults.debug);
        ImageCheck {
            path: spec.reference.clone(),
            reference: reference.map(|r| Plane::from_image(r, color_mode)),
            method: spec.method.unwrap_or(defaults.method),
            threshold: spec.threshold.unwrap_or(defaults.threshold),
            color_mode,
            debug_dir: if debug { defaults.debug_dir.clone() } else { None },
        }
    }

    pub fn is_image(&self) -> bool {
        matches!(self.check, Check::Image(_))
    }

    /// True for an image detector whose reference could not be loaded.
    pub fn is_disabled(&self) -> bool {
        matches!(&self.check, Check::Image(img) if img.reference.is_none())
    }

    /// Every place the reference appears in `snapshot`, best first.
    /// Pixel and disabled detectors find nothing.
    pub fn find_all(&self, snapshot: &Snapshot) -> Vec<Hit> {
        let Check::Image(img) = &self.check else {
            return Vec::new();
        };
        let Some(reference) = &img.reference else {
            return Vec::new();
        };
        let plane = snapshot.plane(img.color_mode);
        matcher::match_all(plane, reference, img.method, img.threshold)
            .into_iter()
            .map(|m| Hit {
                point: anchor(snapshot.origin(), m.x, m.y, reference),
                confidence: m.score,
            })
            .collect()
    }

    fn eval_pixel(&self, p: &PixelCheck, pixels: &dyn PixelSource) -> MatchResult {
        let seen = pixels.pixel_at(p.at)?;
        let distance = seen.distance(p.color);
        if distance < p.tolerance {
            Ok(Some(Hit {
                point: p.at,
                confidence: (1.0 - distance / MAX_RGB_DISTANCE) as f32,
            }))
        } else {
            Ok(None)
        }
    }

    fn eval_image(&self, img: &ImageCheck, snapshot: Option<&Snapshot>) -> MatchResult {
        let snapshot = snapshot.ok_or(DetectError::NoSnapshot)?;
        let Some(reference) = &img.reference else {
            return Ok(None);
        };
        let plane = snapshot.plane(img.color_mode);
        let Some(best) = matcher::match_template(plane, reference, img.method) else {
            return Ok(None);
        };
        if best.score < img.threshold {
            return Ok(None);
        }

        let point = anchor(snapshot.origin(), best.x, best.y, reference);
        if let Some(dir) = &img.debug_dir {
            let found = CaptureRect::new(
                best.x as i32,
                best.y as i32,
                reference.width() as i32,
                reference.height() as i32,
            );
            match debug::dump_match(dir, snapshot, found, &file_label(&img.path), best.score) {
                Ok(path) => logger::info(&format!("debug image: {}", path.display())),
                Err(e) => logger::warn(&format!("debug image not written: {}", e)),
            }
        }
        Ok(Some(Hit { point, confidence: best.score }))
    }
}

/// Center of the matched window in screen coordinates (integer halves).
fn anchor(origin: Point, x: u32, y: u32, reference: &Plane) -> Point {
    origin.offset(
        (x + reference.width() / 2) as i32,
        (y + reference.height() / 2) as i32,
    )
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

impl Detect for Detector {
    fn evaluate(&self, snapshot: Option<&Snapshot>, pixels: &dyn PixelSource) -> MatchResult {
        match &self.check {
            Check::Pixel(p) => self.eval_pixel(p, pixels),
            Check::Image(img) => self.eval_image(img, snapshot),
        }
    }

    fn label(&self) -> String {
        match &self.check {
            Check::Pixel(p) => format!("pixel {} = {}", p.at, p.color),
            Check::Image(img) => file_label(&img.path),
        }
    }
}
