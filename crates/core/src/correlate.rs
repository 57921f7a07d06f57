//! Cross terms of the template scan computed in the frequency domain.
//!
//! A circular correlation over the full image size is exact for every valid
//! window position, so no padding is needed: a window starting at `x` never
//! reads past `x + tw - 1 < iw`.

use std::sync::Arc;

use rayon::prelude::*;
use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};

type Spectrum = Vec<Complex<f64>>;

/// Row and column transforms for one image size.
struct Plan {
    width: usize,
    height: usize,
    rows: Arc<dyn Fft<f64>>,
    cols: Arc<dyn Fft<f64>>,
    rows_inv: Arc<dyn Fft<f64>>,
    cols_inv: Arc<dyn Fft<f64>>,
}

impl Plan {
    fn new(width: usize, height: usize) -> Self {
        let mut planner = FftPlanner::new();
        Self {
            width,
            height,
            rows: planner.plan_fft_forward(width),
            cols: planner.plan_fft_forward(height),
            rows_inv: planner.plan_fft_inverse(width),
            cols_inv: planner.plan_fft_inverse(height),
        }
    }

    /// Forward 2-D transform. The result is column-major (`width` runs of
    /// `height` values), which is all the pointwise product needs.
    fn forward(&self, mut buf: Spectrum) -> Spectrum {
        run(&mut buf, self.width, &self.rows);
        let mut cols = transpose(&buf, self.width, self.height);
        run(&mut cols, self.height, &self.cols);
        cols
    }

    /// Inverse of [`Plan::forward`], back to row-major and unscaled.
    fn inverse(&self, mut cols: Spectrum) -> Spectrum {
        run(&mut cols, self.height, &self.cols_inv);
        let mut buf = transpose(&cols, self.height, self.width);
        run(&mut buf, self.width, &self.rows_inv);
        buf
    }
}

fn run(buf: &mut [Complex<f64>], len: usize, fft: &Arc<dyn Fft<f64>>) {
    buf.par_chunks_mut(len).for_each(|line| fft.process(line));
}

/// `src` is `h` rows of `w` values; the result is `w` rows of `h` values.
fn transpose(src: &[Complex<f64>], w: usize, h: usize) -> Spectrum {
    let mut out = vec![Complex::new(0.0, 0.0); w * h];
    out.par_chunks_mut(h).enumerate().for_each(|(x, col)| {
        for (y, v) in col.iter_mut().enumerate() {
            *v = src[y * w + x];
        }
    });
    out
}

/// Σ image(x + i, y + j) · weights(i, j) for every window position, summed
/// over interleaved channels. `data` is `iw`×`ih`×`channels`, `weights` is
/// `tw`×`th`×`channels`; the result is row-major, `(iw - tw + 1)` wide.
pub(crate) fn cross_terms(
    data: &[f32],
    (iw, ih): (usize, usize),
    weights: &[f64],
    (tw, th): (usize, usize),
    channels: usize,
) -> Vec<f64> {
    let plan = Plan::new(iw, ih);
    let mut acc = vec![Complex::new(0.0, 0.0); iw * ih];

    for ch in 0..channels {
        let image: Spectrum = data
            .iter()
            .skip(ch)
            .step_by(channels)
            .map(|v| Complex::new(*v as f64, 0.0))
            .collect();
        let mut templ = vec![Complex::new(0.0, 0.0); iw * ih];
        for ty in 0..th {
            for tx in 0..tw {
                templ[ty * iw + tx] = Complex::new(weights[(ty * tw + tx) * channels + ch], 0.0);
            }
        }

        let a = plan.forward(image);
        let b = plan.forward(templ);
        acc.par_iter_mut()
            .zip(a.par_iter().zip(b.par_iter()))
            .for_each(|(s, (a, b))| *s += a * b.conj());
    }

    let full = plan.inverse(acc);
    let scale = 1.0 / (iw * ih) as f64;
    let (rw, rh) = (iw - tw + 1, ih - th + 1);
    let mut out = Vec::with_capacity(rw * rh);
    for y in 0..rh {
        out.extend(full[y * iw..y * iw + rw].iter().map(|z| z.re * scale));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn direct(data: &[f32], iw: usize, weights: &[f64], tw: usize, th: usize, x: usize, y: usize) -> f64 {
        let mut sum = 0.0;
        for j in 0..th {
            for i in 0..tw {
                sum += data[(y + j) * iw + x + i] as f64 * weights[j * tw + i];
            }
        }
        sum
    }

    #[test]
    fn test_matches_direct_sum() {
        let (iw, ih, tw, th) = (13, 7, 4, 3);
        let data: Vec<f32> = (0..iw * ih).map(|i| ((i * 37) % 251) as f32).collect();
        let weights: Vec<f64> = (0..tw * th).map(|i| i as f64 - 5.5).collect();

        let out = cross_terms(&data, (iw, ih), &weights, (tw, th), 1);
        let rw = iw - tw + 1;
        assert_eq!(out.len(), rw * (ih - th + 1));
        for (i, v) in out.iter().enumerate() {
            let expected = direct(&data, iw, &weights, tw, th, i % rw, i / rw);
            assert!((v - expected).abs() < 1e-6, "window {}: {} vs {}", i, v, expected);
        }
    }

    #[test]
    fn test_channels_are_summed() {
        // Two identical channels give twice the single-channel cross term
        let mono: Vec<f32> = (0..30).map(|i| (i * 7 % 11) as f32).collect();
        let stereo: Vec<f32> = mono.iter().flat_map(|v| [*v, *v]).collect();
        let w_mono = vec![1.0, -2.0, 0.5, 3.0];
        let w_stereo: Vec<f64> = w_mono.iter().flat_map(|v| [*v, *v]).collect();

        let one = cross_terms(&mono, (6, 5), &w_mono, (2, 2), 1);
        let two = cross_terms(&stereo, (6, 5), &w_stereo, (2, 2), 2);
        for (a, b) in one.iter().zip(&two) {
            assert!((2.0 * a - b).abs() < 1e-6);
        }
    }
}
