//! Sliding-window template matching.
//!
//! Both the snapshot and the reference are first converted to a [`Plane`]
//! with the same [`ColorMode`]. The scan is exhaustive: every window position
//! gets a raw score under the selected [`MatchMethod`]. Window sums come from
//! summed-area tables; the cross term is a per-window sum for small scans and
//! an FFT correlation for screen-sized ones. Rows are scored in parallel.
//!
//! Scores are reported so that higher is always better. For the
//! squared-difference family the reported score is `1 - raw_minimum`.

use std::str::FromStr;

use image::{DynamicImage, RgbaImage};
use rayon::prelude::*;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::correlate;
use crate::error::RecordError;
use crate::types::Capture;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchMethod {
    SqDiff,
    SqDiffNormed,
    CCorr,
    CCorrNormed,
    CCoeff,
    #[default]
    CCoeffNormed,
}

impl MatchMethod {
    pub const ALL: [MatchMethod; 6] = [
        MatchMethod::SqDiff,
        MatchMethod::SqDiffNormed,
        MatchMethod::CCorr,
        MatchMethod::CCorrNormed,
        MatchMethod::CCoeff,
        MatchMethod::CCoeffNormed,
    ];

    pub fn name(self) -> &'static str {
        match self {
            MatchMethod::SqDiff => "sqdiff",
            MatchMethod::SqDiffNormed => "sqdiff_normed",
            MatchMethod::CCorr => "ccorr",
            MatchMethod::CCorrNormed => "ccorr_normed",
            MatchMethod::CCoeff => "ccoeff",
            MatchMethod::CCoeffNormed => "ccoeff_normed",
        }
    }

    /// Classic integer codes (0 = sqdiff ... 5 = ccoeff_normed) found in
    /// rule files written for OpenCV-based tooling.
    pub fn from_code(code: i64) -> Option<Self> {
        usize::try_from(code).ok().and_then(|i| Self::ALL.get(i).copied())
    }

    /// Raw metric is lower-is-better.
    pub fn is_sqdiff(self) -> bool {
        matches!(self, MatchMethod::SqDiff | MatchMethod::SqDiffNormed)
    }

    fn is_normed(self) -> bool {
        matches!(
            self,
            MatchMethod::SqDiffNormed | MatchMethod::CCorrNormed | MatchMethod::CCoeffNormed
        )
    }

    fn score(self, raw: f64) -> f32 {
        if self.is_sqdiff() {
            (1.0 - raw) as f32
        } else {
            raw as f32
        }
    }
}

impl std::fmt::Display for MatchMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for MatchMethod {
    type Err = RecordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_lowercase().replace(['-', ' '], "_");
        let key = key.strip_prefix("tm_").unwrap_or(key.as_str());
        Self::ALL
            .iter()
            .copied()
            .find(|m| m.name() == key)
            .ok_or_else(|| RecordError::UnknownMethod(s.to_string()))
    }
}

impl Serialize for MatchMethod {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for MatchMethod {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Code(i64),
            Name(String),
        }

        match Repr::deserialize(d)? {
            Repr::Code(c) => MatchMethod::from_code(c)
                .ok_or_else(|| D::Error::custom(format!("unknown match method code {}", c))),
            Repr::Name(n) => n.parse().map_err(D::Error::custom),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorMode {
    #[default]
    Color,
    Grayscale,
}

impl ColorMode {
    pub fn channels(self) -> usize {
        match self {
            ColorMode::Color => 3,
            ColorMode::Grayscale => 1,
        }
    }

    pub fn from_grayscale(grayscale: bool) -> Self {
        if grayscale {
            ColorMode::Grayscale
        } else {
            ColorMode::Color
        }
    }
}

/// BT.601 luma.
fn luma(r: u8, g: u8, b: u8) -> f32 {
    0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32
}

/// Image converted for matching: interleaved RGB or single-channel luma,
/// values on the 0..255 scale, alpha dropped.
#[derive(Debug, Clone)]
pub struct Plane {
    width: u32,
    height: u32,
    channels: usize,
    data: Vec<f32>,
}

impl Plane {
    fn with_capacity(width: u32, height: u32, mode: ColorMode) -> Self {
        let channels = mode.channels();
        Self {
            width,
            height,
            channels,
            data: Vec::with_capacity(width as usize * height as usize * channels),
        }
    }

    fn push(&mut self, r: u8, g: u8, b: u8) {
        if self.channels == 1 {
            self.data.push(luma(r, g, b));
        } else {
            self.data.extend_from_slice(&[r as f32, g as f32, b as f32]);
        }
    }

    pub fn from_capture(capture: &Capture, mode: ColorMode) -> Self {
        let mut plane = Self::with_capacity(capture.width, capture.height, mode);
        for y in 0..capture.height {
            let start = (y * capture.bytes_per_row) as usize;
            let end = start + capture.width as usize * 4;
            match capture.data.get(start..end) {
                Some(row) => {
                    for px in row.chunks_exact(4) {
                        plane.push(px[2], px[1], px[0]);
                    }
                }
                // Short buffer: pad the missing rows with black.
                None => {
                    for _ in 0..capture.width {
                        plane.push(0, 0, 0);
                    }
                }
            }
        }
        plane
    }

    pub fn from_rgba(img: &RgbaImage, mode: ColorMode) -> Self {
        let mut plane = Self::with_capacity(img.width(), img.height(), mode);
        for p in img.pixels() {
            plane.push(p[0], p[1], p[2]);
        }
        plane
    }

    pub fn from_image(img: &DynamicImage, mode: ColorMode) -> Self {
        Self::from_rgba(&img.to_rgba8(), mode)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> usize {
        self.channels
    }
}

/// Best-aligned window: score (higher is better) and its top-left corner.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchOutcome {
    pub score: f32,
    pub x: u32,
    pub y: u32,
}

/// Summed-area tables for per-channel sums and the sum of squares.
struct Integral {
    stride: usize,
    sums: Vec<Vec<f64>>,
    squares: Vec<f64>,
}

impl Integral {
    fn new(plane: &Plane) -> Self {
        let w = plane.width as usize;
        let h = plane.height as usize;
        let c = plane.channels;
        let stride = w + 1;
        let mut sums = vec![vec![0.0; stride * (h + 1)]; c];
        let mut squares = vec![0.0; stride * (h + 1)];

        for y in 0..h {
            let mut row_sq = 0.0;
            let mut row_sum = vec![0.0; c];
            for x in 0..w {
                let base = (y * w + x) * c;
                for ch in 0..c {
                    let v = plane.data[base + ch] as f64;
                    row_sum[ch] += v;
                    row_sq += v * v;
                }
                let at = (y + 1) * stride + x + 1;
                let above = y * stride + x + 1;
                for ch in 0..c {
                    sums[ch][at] = sums[ch][above] + row_sum[ch];
                }
                squares[at] = squares[above] + row_sq;
            }
        }

        Self { stride, sums, squares }
    }

    fn rect(&self, table: &[f64], x: usize, y: usize, w: usize, h: usize) -> f64 {
        let s = self.stride;
        table[(y + h) * s + x + w] - table[y * s + x + w] - table[(y + h) * s + x] + table[y * s + x]
    }

    fn window_squares(&self, x: usize, y: usize, w: usize, h: usize) -> f64 {
        self.rect(&self.squares, x, y, w, h)
    }

    /// Σ (I - mean_c)² over the window, summed across channels.
    fn window_variance(&self, x: usize, y: usize, w: usize, h: usize, n: f64) -> f64 {
        let mut centered = self.window_squares(x, y, w, h);
        for table in &self.sums {
            let s = self.rect(table, x, y, w, h);
            centered -= s * s / n;
        }
        centered.max(0.0)
    }
}

/// Degenerate-denominator rule used by the normalized methods.
fn normalize(num: f64, denom: f64, sqdiff: bool) -> f64 {
    if num.abs() < denom {
        num / denom
    } else if num.abs() < denom * 1.125 {
        if num > 0.0 {
            1.0
        } else {
            -1.0
        }
    } else if sqdiff {
        1.0
    } else {
        0.0
    }
}

/// Multiply-adds above which the cross terms go through the FFT instead of
/// the per-window sum.
const SPECTRAL_WORK: u64 = 1 << 23;

/// Raw scores for every window position, row-major.
struct ScoreMap {
    width: usize,
    raw: Vec<f64>,
}

fn score_map(image: &Plane, templ: &Plane, method: MatchMethod) -> Option<ScoreMap> {
    if templ.width == 0
        || templ.height == 0
        || templ.width > image.width
        || templ.height > image.height
        || templ.channels != image.channels
    {
        return None;
    }

    let c = image.channels;
    let (iw, ih) = (image.width as usize, image.height as usize);
    let (tw, th) = (templ.width as usize, templ.height as usize);
    let (rw, rh) = (iw - tw + 1, ih - th + 1);
    let n = (tw * th) as f64;

    let mut t_sum = vec![0.0f64; c];
    let mut t_sq = 0.0f64;
    for (i, v) in templ.data.iter().enumerate() {
        let v = *v as f64;
        t_sum[i % c] += v;
        t_sq += v * v;
    }

    let weights: Vec<f64> = match method {
        MatchMethod::CCoeff | MatchMethod::CCoeffNormed => templ
            .data
            .iter()
            .enumerate()
            .map(|(i, v)| *v as f64 - t_sum[i % c] / n)
            .collect(),
        _ => templ.data.iter().map(|v| *v as f64).collect(),
    };
    let t_var: f64 = match method {
        MatchMethod::CCoeffNormed => weights.iter().map(|v| v * v).sum(),
        _ => 0.0,
    };

    let sat = Integral::new(image);
    let row_len = tw * c;
    let spectral = (rw * rh) as u64 * (row_len * th) as u64 >= SPECTRAL_WORK;
    let crosses = spectral.then(|| correlate::cross_terms(&image.data, (iw, ih), &weights, (tw, th), c));

    let direct = |x: usize, y: usize| {
        let mut cross = 0.0f64;
        for ty in 0..th {
            let start = ((y + ty) * iw + x) * c;
            let img_row = &image.data[start..start + row_len];
            let t_row = &weights[ty * row_len..(ty + 1) * row_len];
            for (a, b) in img_row.iter().zip(t_row) {
                cross += *a as f64 * b;
            }
        }
        cross
    };

    let mut raw = vec![0.0f64; rw * rh];
    raw.par_chunks_mut(rw).enumerate().for_each(|(y, out)| {
        for (x, slot) in out.iter_mut().enumerate() {
            let cross = match &crosses {
                Some(all) => all[y * rw + x],
                None => direct(x, y),
            };

            *slot = match method {
                MatchMethod::CCorr | MatchMethod::CCoeff => cross,
                MatchMethod::CCorrNormed => {
                    let w_sq = sat.window_squares(x, y, tw, th);
                    normalize(cross, (t_sq * w_sq).sqrt(), false)
                }
                MatchMethod::CCoeffNormed => {
                    let w_var = sat.window_variance(x, y, tw, th, n);
                    normalize(cross, (t_var * w_var).sqrt(), false)
                }
                MatchMethod::SqDiff | MatchMethod::SqDiffNormed => {
                    let w_sq = sat.window_squares(x, y, tw, th);
                    let diff = (w_sq - 2.0 * cross + t_sq).max(0.0);
                    if method.is_normed() {
                        normalize(diff, (t_sq * w_sq).sqrt(), true)
                    } else {
                        diff
                    }
                }
            };
        }
    });

    Some(ScoreMap { width: rw, raw })
}

/// Best window for `templ` inside `image`, or None when the reference cannot
/// fit inside the search area.
pub fn match_template(image: &Plane, templ: &Plane, method: MatchMethod) -> Option<MatchOutcome> {
    let map = score_map(image, templ, method)?;

    let mut best_idx = 0;
    for (i, v) in map.raw.iter().enumerate() {
        let better = if method.is_sqdiff() {
            *v < map.raw[best_idx]
        } else {
            *v > map.raw[best_idx]
        };
        if better {
            best_idx = i;
        }
    }

    Some(MatchOutcome {
        score: method.score(map.raw[best_idx]),
        x: (best_idx % map.width) as u32,
        y: (best_idx / map.width) as u32,
    })
}

/// Every window scoring at least `threshold`, best first. A candidate closer
/// than half the reference size to a better one is dropped.
pub fn match_all(
    image: &Plane,
    templ: &Plane,
    method: MatchMethod,
    threshold: f32,
) -> Vec<MatchOutcome> {
    let Some(map) = score_map(image, templ, method) else {
        return Vec::new();
    };

    let mut hits: Vec<MatchOutcome> = map
        .raw
        .iter()
        .enumerate()
        .map(|(i, v)| MatchOutcome {
            score: method.score(*v),
            x: (i % map.width) as u32,
            y: (i / map.width) as u32,
        })
        .filter(|m| m.score >= threshold)
        .collect();
    hits.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut kept: Vec<MatchOutcome> = Vec::new();
    for hit in hits {
        let close = kept.iter().any(|k| {
            k.x.abs_diff(hit.x) * 2 < templ.width && k.y.abs_diff(hit.y) * 2 < templ.height
        });
        if !close {
            kept.push(hit);
        }
    }
    kept
}
