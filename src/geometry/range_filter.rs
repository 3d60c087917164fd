//! Range-image denoising applied before building point fields.
//!
//! Both filters treat values below [`MIN_RANGE`] or at/above `zfar` as missing
//! and write 0 for pixels they reject. Rows are processed in parallel.

use image::Luma;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::point_field::{RangeImage, MIN_RANGE};

/// Parameters for [`erode_range`] and [`bilateral_filter_range`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RangeFilterConfig {
    pub enabled: bool,
    pub radius: u32,
    pub zfar: f32,
    /// Neighbour depth difference (m) counted as inconsistent by erosion.
    pub erode_diff_thres: f32,
    /// Fraction of inconsistent neighbours above which a pixel is dropped.
    pub erode_ratio_thres: f32,
    pub sigma_d: f32,
    pub sigma_r: f32,
}

impl Default for RangeFilterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            radius: 2,
            zfar: 100.0,
            erode_diff_thres: 0.001,
            erode_ratio_thres: 0.8,
            sigma_d: 2.0,
            sigma_r: 100_000.0,
        }
    }
}

#[inline]
fn is_measured(z: f32, zfar: f32) -> bool {
    z >= MIN_RANGE && z < zfar
}

/// Iterate the `(2r+1)²` window around `(u, v)`, clipped to the image.
fn window(
    range: &RangeImage,
    u: u32,
    v: u32,
    radius: u32,
) -> impl Iterator<Item = (u32, u32, f32)> + '_ {
    let (w, h) = range.dimensions();
    let u0 = u.saturating_sub(radius);
    let v0 = v.saturating_sub(radius);
    let u1 = (u + radius).min(w.saturating_sub(1));
    let v1 = (v + radius).min(h.saturating_sub(1));
    (v0..=v1).flat_map(move |y| (u0..=u1).map(move |x| (x, y, range.get_pixel(x, y).0[0])))
}

fn map_rows<F>(range: &RangeImage, f: F) -> RangeImage
where
    F: Fn(u32, u32, f32) -> f32 + Sync,
{
    let (w, h) = range.dimensions();
    let data: Vec<f32> = (0..h)
        .into_par_iter()
        .flat_map_iter(|v| {
            let f = &f;
            (0..w).map(move |u| f(u, v, range.get_pixel(u, v).0[0]))
        })
        .collect();
    RangeImage::from_raw(w, h, data).unwrap_or_else(|| RangeImage::new(w, h))
}

/// Drop pixels whose neighbourhood is mostly missing or inconsistent.
///
/// A neighbour is "bad" when it is missing, beyond `zfar`, or differs from the
/// centre by more than `erode_diff_thres`. The pixel is zeroed when the bad
/// fraction of the window exceeds `erode_ratio_thres`.
pub fn erode_range(range: &RangeImage, cfg: &RangeFilterConfig) -> RangeImage {
    map_rows(range, |u, v, z| {
        if !is_measured(z, cfg.zfar) {
            return 0.0;
        }
        let mut bad = 0usize;
        let mut total = 0usize;
        for (_, _, nz) in window(range, u, v, cfg.radius) {
            total += 1;
            if !is_measured(nz, cfg.zfar) || (nz - z).abs() > cfg.erode_diff_thres {
                bad += 1;
            }
        }
        if bad as f32 / total as f32 > cfg.erode_ratio_thres {
            0.0
        } else {
            z
        }
    })
}

/// Edge-preserving smoothing of measured pixels.
///
/// Neighbours are restricted to measured values within 1 cm of the local mean,
/// then weighted by a spatial Gaussian (`sigma_d`, pixels) and a range
/// Gaussian (`sigma_r`, metres).
pub fn bilateral_filter_range(range: &RangeImage, cfg: &RangeFilterConfig) -> RangeImage {
    const MEAN_BAND: f32 = 0.01;

    map_rows(range, |u, v, z| {
        if !is_measured(z, cfg.zfar) {
            return 0.0;
        }

        let mut sum = 0.0f32;
        let mut n = 0usize;
        for (_, _, nz) in window(range, u, v, cfg.radius) {
            if is_measured(nz, cfg.zfar) {
                sum += nz;
                n += 1;
            }
        }
        if n == 0 {
            return 0.0;
        }
        let mean = sum / n as f32;

        let two_sd2 = 2.0 * cfg.sigma_d * cfg.sigma_d;
        let two_sr2 = 2.0 * cfg.sigma_r * cfg.sigma_r;
        let mut acc = 0.0f32;
        let mut weight_sum = 0.0f32;
        for (x, y, nz) in window(range, u, v, cfg.radius) {
            if !is_measured(nz, cfg.zfar) || (nz - mean).abs() >= MEAN_BAND {
                continue;
            }
            let du = x as f32 - u as f32;
            let dv = y as f32 - v as f32;
            let w = (-(du * du + dv * dv) / two_sd2 - (z - nz) * (z - nz) / two_sr2).exp();
            acc += w * nz;
            weight_sum += w;
        }
        if weight_sum > 0.0 {
            acc / weight_sum
        } else {
            0.0
        }
    })
}

/// Erode then smooth, as done before every registration/tracking step.
pub fn denoise_range(range: &RangeImage, cfg: &RangeFilterConfig) -> RangeImage {
    let eroded = erode_range(range, cfg);
    bilateral_filter_range(&eroded, cfg)
}

/// All-zero range image, used for geometry-free sources.
pub fn zero_range(width: u32, height: u32) -> RangeImage {
    RangeImage::from_pixel(width, height, Luma([0.0]))
}
