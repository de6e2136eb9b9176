//! Lighting normalization: luminance, global histogram equalization, back to RGB.
//!
//! Detection and encoding both run on the normalized grid, so the same
//! person photographed under different lighting lands closer in signature space.

use crate::types::PixelGrid;
use image::{GrayImage, Rgb};
use thiserror::Error;

// ITU-R BT.601 luma weights.
const LUMA_R: f32 = 0.299;
const LUMA_G: f32 = 0.587;
const LUMA_B: f32 = 0.114;

#[derive(Error, Debug, PartialEq)]
pub enum NormalizeError {
    #[error("image has zero width or height")]
    EmptyImage,
}

/// Normalize a grid for detection and encoding.
///
/// Best effort: on failure the original grid is returned unchanged.
pub fn normalize(grid: &PixelGrid) -> PixelGrid {
    match try_normalize(grid) {
        Ok(normalized) => normalized,
        Err(err) => {
            tracing::warn!(error = %err, "normalization failed; using original image");
            grid.clone()
        }
    }
}

/// Luminance → histogram equalization → 3 identical channels.
pub fn try_normalize(grid: &PixelGrid) -> Result<PixelGrid, NormalizeError> {
    if grid.width() == 0 || grid.height() == 0 {
        return Err(NormalizeError::EmptyImage);
    }

    let mut gray = luminance(grid);
    equalize_histogram(&mut gray);

    Ok(PixelGrid::from_fn(grid.width(), grid.height(), |x, y| {
        let v = gray.get_pixel(x, y)[0];
        Rgb([v, v, v])
    }))
}

/// Single-channel luminance plane of an RGB grid.
pub fn luminance(grid: &PixelGrid) -> GrayImage {
    GrayImage::from_fn(grid.width(), grid.height(), |x, y| {
        let [r, g, b] = grid.get_pixel(x, y).0;
        let luma = LUMA_R * r as f32 + LUMA_G * g as f32 + LUMA_B * b as f32;
        image::Luma([luma.round().clamp(0.0, 255.0) as u8])
    })
}

/// Global histogram equalization in-place.
///
/// Maps each level through the normalized CDF with the darkest occupied bin
/// pinned to 0. A single-level image is left unchanged.
pub fn equalize_histogram(gray: &mut GrayImage) {
    let total = gray.as_raw().len();
    if total == 0 {
        return;
    }

    let mut hist = [0usize; 256];
    for &p in gray.as_raw() {
        hist[p as usize] += 1;
    }

    let Some(first) = hist.iter().position(|&count| count > 0) else {
        return;
    };
    let cdf_min = hist[first];
    if cdf_min == total {
        return;
    }

    let scale = 255.0 / (total - cdf_min) as f32;
    let mut lut = [0u8; 256];
    let mut cumulative = 0usize;
    for i in (first + 1)..256 {
        cumulative += hist[i];
        lut[i] = (cumulative as f32 * scale).round().clamp(0.0, 255.0) as u8;
    }

    for p in gray.iter_mut() {
        *p = lut[*p as usize];
    }
}
