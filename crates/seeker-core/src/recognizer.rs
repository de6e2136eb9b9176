//! ArcFace face recognizer via ONNX Runtime.
//!
//! Aligns each face region to the 112×112 template and turns it into a
//! unit-length 512-value signature with the w600k_r50 model.

use crate::alignment::{self, ALIGNED_SIZE};
use crate::encoder::FaceEncode;
use crate::types::{FaceRegion, FaceSignature, PixelGrid};
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

/// Pixel values map to [-1, 1].
const ARCFACE_MEAN: f32 = 127.5;
const ARCFACE_STD: f32 = 127.5;
pub const ARCFACE_SIGNATURE_DIM: usize = 512;
pub const ARCFACE_MODEL_VERSION: &str = "w600k_r50";

#[derive(Error, Debug)]
pub enum RecognizerError {
    #[error("model file not found: {0} — download from insightface and place in the model directory")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("face region is empty")]
    EmptyRegion,
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// ArcFace-based face recognizer.
pub struct ArcFaceRecognizer {
    session: Session,
}

impl ArcFaceRecognizer {
    /// Load the ArcFace ONNX model from the given path.
    pub fn load(model_path: &str) -> Result<Self, RecognizerError> {
        if !Path::new(model_path).exists() {
            return Err(RecognizerError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = model_path,
            inputs = ?session.inputs().iter().map(|i| i.name()).collect::<Vec<_>>(),
            "loaded ArcFace model"
        );

        Ok(Self { session })
    }

    /// Extract a signature for one face region of an RGB grid.
    pub fn extract(&mut self, grid: &PixelGrid, face: &FaceRegion) -> Result<FaceSignature, RecognizerError> {
        if face.width() == 0 || face.height() == 0 {
            return Err(RecognizerError::EmptyRegion);
        }

        let aligned = alignment::align_face(grid, face);
        let input = preprocess(&aligned);

        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, values) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| RecognizerError::InferenceFailed(format!("signature output: {e}")))?;

        match values.len() {
            ARCFACE_SIGNATURE_DIM => Ok(FaceSignature {
                values: l2_normalize(values.to_vec()),
                scheme: Some(ARCFACE_MODEL_VERSION.to_string()),
            }),
            n => Err(RecognizerError::InferenceFailed(format!(
                "model produced {n} values, expected {ARCFACE_SIGNATURE_DIM}"
            ))),
        }
    }
}

impl FaceEncode for ArcFaceRecognizer {
    type Error = RecognizerError;

    fn scheme(&self) -> &str {
        ARCFACE_MODEL_VERSION
    }

    fn encode_face(&mut self, grid: &PixelGrid, region: &FaceRegion) -> Result<FaceSignature, RecognizerError> {
        self.extract(grid, region)
    }
}

/// Scale to unit length so Euclidean distance ranges over [0, 2].
fn l2_normalize(mut values: Vec<f32>) -> Vec<f32> {
    let norm = values.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        values.iter_mut().for_each(|v| *v /= norm);
    }
    values
}

/// 112×112 aligned crop → `[1, 3, 112, 112]` tensor in RGB channel order.
fn preprocess(aligned: &PixelGrid) -> Array4<f32> {
    let size = ALIGNED_SIZE as usize;
    Array4::from_shape_fn((1, 3, size, size), |(_, c, y, x)| {
        match aligned.get_pixel_checked(x as u32, y as u32) {
            Some(pixel) => (pixel[c] as f32 - ARCFACE_MEAN) / ARCFACE_STD,
            None => 0.0,
        }
    })
}
