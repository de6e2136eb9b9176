//! SeetaFace funnel-cascade detector: the fast detection tier.
//!
//! Runs on the luminance plane, upsampled so faces smaller than the cascade's
//! 20 px minimum window are still found. Produces boxes without landmarks.

use crate::detector::DetectorError;
use crate::locator::FaceDetect;
use crate::normalizer::luminance;
use crate::types::{FaceRegion, PixelGrid};
use image::imageops::{self, FilterType};
use std::convert::Infallible;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

const CASCADE_MIN_FACE_SIZE: u32 = 20;
const CASCADE_SCORE_THRESHOLD: f64 = 2.0;
const CASCADE_PYRAMID_SCALE: f32 = 0.8;
const CASCADE_WINDOW_STEP: u32 = 4;
/// Fewest doubling passes the fast tier runs.
pub const MIN_UPSAMPLE_TIMES: u32 = 2;
const MAX_UPSAMPLE_TIMES: u32 = 6;
/// Longest side of the working grid after upsampling. Larger inputs are
/// downscaled first so the doublings still fit.
const MAX_UPSAMPLED_SIDE: u32 = 4096;

/// Face detector backed by the `rustface` crate (SeetaFace engine).
pub struct CascadeDetector {
    model: rustface::Model,
    upsample_times: u32,
}

impl CascadeDetector {
    /// Load the SeetaFace model from the given path.
    pub fn load(model_path: &str, upsample_times: u32) -> Result<Self, DetectorError> {
        if !Path::new(model_path).exists() {
            return Err(DetectorError::ModelNotFound(model_path.to_string()));
        }

        let file = File::open(model_path)
            .map_err(|e| DetectorError::ModelUnreadable(format!("{model_path}: {e}")))?;
        let model = rustface::read_model(BufReader::new(file))
            .map_err(|e| DetectorError::ModelUnreadable(format!("{model_path}: {e}")))?;

        if upsample_times < MIN_UPSAMPLE_TIMES {
            tracing::warn!(
                requested = upsample_times,
                using = MIN_UPSAMPLE_TIMES,
                "too few upsampling passes requested; raising to the minimum"
            );
        }
        let upsample_times = upsample_times.clamp(MIN_UPSAMPLE_TIMES, MAX_UPSAMPLE_TIMES);

        tracing::info!(path = model_path, upsample_times, "loaded SeetaFace cascade");

        Ok(Self {
            model,
            upsample_times,
        })
    }
}

impl FaceDetect for CascadeDetector {
    type Error = Infallible;

    fn name(&self) -> &'static str {
        "seetaface"
    }

    fn detect(&mut self, grid: &PixelGrid) -> Result<Vec<FaceRegion>, Infallible> {
        let (width, height) = grid.dimensions();
        if width == 0 || height == 0 {
            return Ok(Vec::new());
        }

        let plan = Upsampling::plan(width, height, self.upsample_times);
        let mut gray = luminance(grid);
        if plan.base != (width, height) {
            gray = imageops::resize(&gray, plan.base.0, plan.base.1, FilterType::Triangle);
        }
        for _ in 0..plan.doublings {
            gray = imageops::resize(&gray, gray.width() * 2, gray.height() * 2, FilterType::Triangle);
        }
        tracing::trace!(base = ?plan.base, working = ?plan.working_size(), "cascade grid prepared");

        let mut detector = rustface::create_detector_with_model(self.model.clone());
        detector.set_min_face_size(CASCADE_MIN_FACE_SIZE);
        detector.set_score_thresh(CASCADE_SCORE_THRESHOLD);
        detector.set_pyramid_scale_factor(CASCADE_PYRAMID_SCALE);
        detector.set_slide_window_step(CASCADE_WINDOW_STEP, CASCADE_WINDOW_STEP);

        let faces = detector.detect(&rustface::ImageData::new(
            gray.as_raw(),
            gray.width(),
            gray.height(),
        ));

        let scale_x = gray.width() as f32 / width as f32;
        let scale_y = gray.height() as f32 / height as f32;
        let mut regions: Vec<FaceRegion> = faces
            .iter()
            .filter_map(|face| {
                let bbox = face.bbox();
                let x1 = bbox.x() as f32 / scale_x;
                let y1 = bbox.y() as f32 / scale_y;
                let x2 = (bbox.x() as f32 + bbox.width() as f32) / scale_x;
                let y2 = (bbox.y() as f32 + bbox.height() as f32) / scale_y;
                FaceRegion::clamped(x1, y1, x2, y2, width, height, face.score() as f32)
            })
            .collect();
        regions.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

        Ok(regions)
    }
}

/// How the luminance plane is resized before the cascade runs: an optional
/// downscale to `base`, then `doublings` passes of 2x.
#[derive(Debug, PartialEq, Eq)]
struct Upsampling {
    base: (u32, u32),
    doublings: u32,
}

impl Upsampling {
    fn plan(width: u32, height: u32, times: u32) -> Self {
        let doublings = times.clamp(MIN_UPSAMPLE_TIMES, MAX_UPSAMPLE_TIMES);
        let limit = MAX_UPSAMPLED_SIDE >> doublings;
        let longest = width.max(height);
        if longest <= limit {
            return Self {
                base: (width, height),
                doublings,
            };
        }
        let ratio = limit as f32 / longest as f32;
        let shrink = |side: u32| ((side as f32 * ratio).round() as u32).clamp(1, limit);
        Self {
            base: (shrink(width), shrink(height)),
            doublings,
        }
    }

    fn working_size(&self) -> (u32, u32) {
        (self.base.0 << self.doublings, self.base.1 << self.doublings)
    }
}
