//! SCRFD face detector via ONNX Runtime: the precise detection tier.
//!
//! Implements the SCRFD (Sample and Computation Redistribution for Efficient Face
//! Detection) model with 3-stride anchor-free decoding and NMS post-processing.

use crate::locator::FaceDetect;
use crate::types::{FaceRegion, PixelGrid};
use image::imageops::{self, FilterType};
use ndarray::Array4;
use ort::session::Session;
use ort::value::{DynValue, TensorRef};
use std::path::Path;
use thiserror::Error;

const SCRFD_INPUT_SIZE: usize = 640;
const SCRFD_MEAN: f32 = 127.5;
const SCRFD_STD: f32 = 128.0;
const SCRFD_CONFIDENCE_THRESHOLD: f32 = 0.5;
const SCRFD_NMS_THRESHOLD: f32 = 0.4;
const SCRFD_STRIDES: [usize; 3] = [8, 16, 32];
const SCRFD_ANCHORS_PER_CELL: usize = 2;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("model file not found: {0} — download from insightface and place in the model directory")]
    ModelNotFound(String),
    #[error("model file could not be read: {0}")]
    ModelUnreadable(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Metadata for coordinate de-mapping after letterbox resize.
struct LetterboxInfo {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
}

/// Output tensor indices for one stride: (score_idx, bbox_idx, kps_idx).
type StrideOutputIndices = (usize, usize, usize);

/// A decoded detection in original-image coordinates, before clamping.
#[derive(Debug, Clone)]
struct Candidate {
    x1: f32,
    y1: f32,
    x2: f32,
    y2: f32,
    score: f32,
    landmarks: Option<[(f32, f32); 5]>,
}

/// SCRFD-based face detector.
pub struct ScrfdDetector {
    session: Session,
    /// Per-stride output indices [(score, bbox, kps)] for strides [8, 16, 32].
    /// Discovered by name at load time; falls back to positional ordering.
    stride_indices: [StrideOutputIndices; 3],
}

impl ScrfdDetector {
    /// Load the SCRFD ONNX model from the given path.
    pub fn load(model_path: &str) -> Result<Self, DetectorError> {
        if !Path::new(model_path).exists() {
            return Err(DetectorError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        let output_names: Vec<String> = session.outputs().iter().map(|o| o.name().to_string()).collect();
        let num_outputs = output_names.len();

        tracing::info!(
            path = model_path,
            outputs = ?output_names,
            "loaded SCRFD model"
        );

        if num_outputs < 9 {
            return Err(DetectorError::InferenceFailed(format!(
                "SCRFD model requires 9 outputs (3 strides × score/bbox/kps), got {num_outputs}"
            )));
        }

        let stride_indices = discover_output_indices(&output_names);
        tracing::debug!(?stride_indices, "SCRFD output tensor mapping");

        Ok(Self {
            session,
            stride_indices,
        })
    }

    /// Detect faces in an RGB grid, returning regions sorted by confidence.
    pub fn detect(&mut self, grid: &PixelGrid) -> Result<Vec<FaceRegion>, DetectorError> {
        if grid.width() == 0 || grid.height() == 0 {
            return Ok(Vec::new());
        }

        let (input, letterbox) = preprocess(grid);

        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let mut candidates = Vec::new();
        for (slot, &stride) in SCRFD_STRIDES.iter().enumerate() {
            let (score_idx, bbox_idx, kps_idx) = self.stride_indices[slot];
            let scores = stride_tensor(&outputs[score_idx], "scores", stride)?;
            let bboxes = stride_tensor(&outputs[bbox_idx], "bboxes", stride)?;
            let kps = stride_tensor(&outputs[kps_idx], "kps", stride)?;
            candidates.extend(decode_stride(scores, bboxes, kps, stride, &letterbox, SCRFD_CONFIDENCE_THRESHOLD));
        }

        let (width, height) = grid.dimensions();
        let kept = nms(candidates, SCRFD_NMS_THRESHOLD);
        tracing::debug!(faces = kept.len(), "SCRFD detections after NMS");
        Ok(kept
            .into_iter()
            .filter_map(|c| {
                FaceRegion::clamped(c.x1, c.y1, c.x2, c.y2, width, height, c.score)
                    .map(|region| region.with_landmarks(c.landmarks))
            })
            .collect())
    }
}

impl FaceDetect for ScrfdDetector {
    type Error = DetectorError;

    fn name(&self) -> &'static str {
        "scrfd"
    }

    fn detect(&mut self, grid: &PixelGrid) -> Result<Vec<FaceRegion>, DetectorError> {
        ScrfdDetector::detect(self, grid)
    }
}

fn stride_tensor<'a>(value: &'a DynValue, what: &str, stride: usize) -> Result<&'a [f32], DetectorError> {
    value
        .try_extract_tensor::<f32>()
        .map(|(_, data)| data)
        .map_err(|e| DetectorError::InferenceFailed(format!("{what} stride {stride}: {e}")))
}

fn letterbox_for(width: u32, height: u32) -> (u32, u32, LetterboxInfo) {
    let input = SCRFD_INPUT_SIZE as f32;
    let scale = (input / width as f32).min(input / height as f32);
    let new_w = ((width as f32 * scale).round() as u32).clamp(1, SCRFD_INPUT_SIZE as u32);
    let new_h = ((height as f32 * scale).round() as u32).clamp(1, SCRFD_INPUT_SIZE as u32);
    let pad_x = (input - new_w as f32) / 2.0;
    let pad_y = (input - new_h as f32) / 2.0;
    (new_w, new_h, LetterboxInfo { scale, pad_x, pad_y })
}

/// Letterbox an RGB grid into a normalized 640×640 NCHW tensor.
///
/// Padding stays at 0.0, the normalized value of `SCRFD_MEAN`.
fn preprocess(grid: &PixelGrid) -> (Array4<f32>, LetterboxInfo) {
    let (new_w, new_h, letterbox) = letterbox_for(grid.width(), grid.height());
    let resized = imageops::resize(grid, new_w, new_h, FilterType::Triangle);

    let size = SCRFD_INPUT_SIZE;
    let pad_x_start = letterbox.pad_x.floor() as usize;
    let pad_y_start = letterbox.pad_y.floor() as usize;
    let mut tensor = Array4::<f32>::zeros((1, 3, size, size));

    for (x, y, pixel) in resized.enumerate_pixels() {
        let tx = x as usize + pad_x_start;
        let ty = y as usize + pad_y_start;
        if tx >= size || ty >= size {
            continue;
        }
        for c in 0..3 {
            tensor[[0, c, ty, tx]] = (pixel[c] as f32 - SCRFD_MEAN) / SCRFD_STD;
        }
    }

    (tensor, letterbox)
}

/// Discover output tensor ordering by name.
///
/// SCRFD exports name their tensors either "score_8", "bbox_16", ... or with
/// generic numbers. Falls back to the standard positional ordering:
///   [0-2] = scores (strides 8, 16, 32)
///   [3-5] = bboxes (strides 8, 16, 32)
///   [6-8] = kps    (strides 8, 16, 32)
fn discover_output_indices(names: &[String]) -> [StrideOutputIndices; 3] {
    let find = |prefix: &str, stride: usize| -> Option<usize> {
        let target = format!("{prefix}_{stride}");
        names.iter().position(|n| n == &target)
    };

    let mut named = [(0, 0, 0); 3];
    for (slot, &stride) in SCRFD_STRIDES.iter().enumerate() {
        match (find("score", stride), find("bbox", stride), find("kps", stride)) {
            (Some(s), Some(b), Some(k)) => named[slot] = (s, b, k),
            _ => {
                tracing::info!(
                    ?names,
                    "SCRFD: output names not recognized, using positional mapping"
                );
                return [(0, 3, 6), (1, 4, 7), (2, 5, 8)];
            }
        }
    }
    named
}

/// Decode detections for a single stride level into original-image coordinates.
fn decode_stride(
    scores: &[f32],
    bboxes: &[f32],
    kps: &[f32],
    stride: usize,
    letterbox: &LetterboxInfo,
    threshold: f32,
) -> Vec<Candidate> {
    let grid_w = SCRFD_INPUT_SIZE / stride;
    let grid_h = SCRFD_INPUT_SIZE / stride;
    let num_anchors = grid_h * grid_w * SCRFD_ANCHORS_PER_CELL;
    let s = stride as f32;
    let unmap = |x: f32, y: f32| {
        (
            (x - letterbox.pad_x) / letterbox.scale,
            (y - letterbox.pad_y) / letterbox.scale,
        )
    };

    let mut detections = Vec::new();

    for idx in 0..num_anchors {
        let score = scores.get(idx).copied().unwrap_or(0.0);
        if score <= threshold {
            continue;
        }

        let anchor_idx = idx / SCRFD_ANCHORS_PER_CELL;
        let anchor_cx = (anchor_idx % grid_w) as f32 * s;
        let anchor_cy = (anchor_idx / grid_w) as f32 * s;

        // bbox: [left, top, right, bottom] distances from the anchor, in stride units
        let Some(offsets) = bboxes.get(idx * 4..idx * 4 + 4) else {
            continue;
        };
        let (x1, y1) = unmap(anchor_cx - offsets[0] * s, anchor_cy - offsets[1] * s);
        let (x2, y2) = unmap(anchor_cx + offsets[2] * s, anchor_cy + offsets[3] * s);

        let landmarks = kps.get(idx * 10..idx * 10 + 10).map(|points| {
            std::array::from_fn(|i| {
                unmap(anchor_cx + points[i * 2] * s, anchor_cy + points[i * 2 + 1] * s)
            })
        });

        detections.push(Candidate {
            x1,
            y1,
            x2,
            y2,
            score,
            landmarks,
        });
    }

    detections
}

/// Greedy suppression: keep the best-scoring candidate, drop anything overlapping a kept one.
fn nms(mut candidates: Vec<Candidate>, iou_threshold: f32) -> Vec<Candidate> {
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
    candidates.into_iter().fold(Vec::new(), |mut kept: Vec<Candidate>, candidate| {
        if kept.iter().all(|k| iou(k, &candidate) <= iou_threshold) {
            kept.push(candidate);
        }
        kept
    })
}

fn area(c: &Candidate) -> f32 {
    (c.x2 - c.x1).max(0.0) * (c.y2 - c.y1).max(0.0)
}

fn iou(a: &Candidate, b: &Candidate) -> f32 {
    let overlap_w = (a.x2.min(b.x2) - a.x1.max(b.x1)).max(0.0);
    let overlap_h = (a.y2.min(b.y2) - a.y1.max(b.y1)).max(0.0);
    let overlap = overlap_w * overlap_h;
    let union = area(a) + area(b) - overlap;
    if union <= 0.0 {
        return 0.0;
    }
    overlap / union
}
