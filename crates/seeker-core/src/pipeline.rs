//! Normalize → locate → encode, as one unit of work per image.

use crate::cascade::CascadeDetector;
use crate::detector::{DetectorError, ScrfdDetector};
use crate::encoder::{self, FaceEncode};
use crate::locator::{DetectionTier, FaceDetect, FaceLocator, Location};
use crate::normalizer;
use crate::recognizer::{ArcFaceRecognizer, RecognizerError};
use crate::types::{FaceSignature, PixelGrid};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const CASCADE_MODEL_FILE: &str = "seeta_fd_frontal_v1.0.bin";
pub const SCRFD_MODEL_FILE: &str = "det_10g.onnx";
pub const ARCFACE_MODEL_FILE: &str = "w600k_r50.onnx";

/// Outcome of running one image through the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum Extraction {
    Signatures {
        tier: DetectionTier,
        signatures: Vec<FaceSignature>,
    },
    /// Neither detection tier found a face.
    NoFace,
    /// Faces were located but none could be encoded.
    EncodingUnavailable { regions: usize },
}

impl Extraction {
    pub fn signatures(&self) -> &[FaceSignature] {
        match self {
            Extraction::Signatures { signatures, .. } => signatures,
            _ => &[],
        }
    }

    pub fn into_signatures(self) -> Vec<FaceSignature> {
        match self {
            Extraction::Signatures { signatures, .. } => signatures,
            _ => Vec::new(),
        }
    }
}

/// Anything that turns a decoded image into face signatures.
pub trait Extract {
    fn extract(&mut self, grid: &PixelGrid) -> Extraction;
}

pub struct SignaturePipeline<F, P, E> {
    locator: FaceLocator<F, P>,
    encoder: E,
}

impl<F: FaceDetect, P: FaceDetect, E: FaceEncode> SignaturePipeline<F, P, E> {
    pub fn new(fast: F, precise: P, encoder: E) -> Self {
        Self {
            locator: FaceLocator::new(fast, precise),
            encoder,
        }
    }

    /// Normalize and locate only; used by diagnostics.
    pub fn locate(&mut self, grid: &PixelGrid) -> Location {
        let normalized = normalizer::normalize(grid);
        self.locator.locate(&normalized)
    }
}

impl<F: FaceDetect, P: FaceDetect, E: FaceEncode> Extract for SignaturePipeline<F, P, E> {
    fn extract(&mut self, grid: &PixelGrid) -> Extraction {
        let normalized = normalizer::normalize(grid);

        let (tier, regions) = match self.locator.locate(&normalized) {
            Location::Found { tier, regions } => (tier, regions),
            Location::Empty => return Extraction::NoFace,
        };

        let signatures = encoder::encode(&mut self.encoder, &normalized, &regions);
        if signatures.is_empty() {
            tracing::warn!(regions = regions.len(), "face detected but no signatures produced");
            return Extraction::EncodingUnavailable {
                regions: regions.len(),
            };
        }

        tracing::debug!(?tier, regions = regions.len(), signatures = signatures.len(), "extracted signatures");
        Extraction::Signatures { tier, signatures }
    }
}

/// The production pipeline: SeetaFace → SCRFD fallback → ArcFace.
pub type FacePipeline = SignaturePipeline<CascadeDetector, ScrfdDetector, ArcFaceRecognizer>;

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("detector: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer: {0}")]
    Recognizer(#[from] RecognizerError),
}

/// Locations of the three model files.
#[derive(Debug, Clone)]
pub struct ModelPaths {
    pub cascade: PathBuf,
    pub scrfd: PathBuf,
    pub arcface: PathBuf,
}

impl ModelPaths {
    /// Standard file names inside one model directory.
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            cascade: dir.join(CASCADE_MODEL_FILE),
            scrfd: dir.join(SCRFD_MODEL_FILE),
            arcface: dir.join(ARCFACE_MODEL_FILE),
        }
    }
}

impl FacePipeline {
    /// Load all three models. Fails fast if any of them is missing.
    pub fn load(paths: &ModelPaths, upsample_times: u32) -> Result<Self, LoadError> {
        let fast = CascadeDetector::load(&paths.cascade.to_string_lossy(), upsample_times)?;
        let precise = ScrfdDetector::load(&paths.scrfd.to_string_lossy())?;
        let encoder = ArcFaceRecognizer::load(&paths.arcface.to_string_lossy())?;
        Ok(Self::new(fast, precise, encoder))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::types::FaceRegion;
    use image::Rgb;

    /// Finds one face covering the whole grid when its top-left pixel is bright.
    pub(crate) struct BrightCornerDetector;

    impl FaceDetect for BrightCornerDetector {
        type Error = String;

        fn name(&self) -> &'static str {
            "bright-corner"
        }

        fn detect(&mut self, grid: &PixelGrid) -> Result<Vec<FaceRegion>, String> {
            if grid.width() == 0 || grid.get_pixel(0, 0)[0] < 128 {
                return Ok(Vec::new());
            }
            Ok(FaceRegion::clamped(0.0, 0.0, grid.width() as f32, grid.height() as f32, grid.width(), grid.height(), 1.0)
                .into_iter()
                .collect())
        }
    }

    pub(crate) struct NeverDetector;

    impl FaceDetect for NeverDetector {
        type Error = String;

        fn name(&self) -> &'static str {
            "never"
        }

        fn detect(&mut self, _grid: &PixelGrid) -> Result<Vec<FaceRegion>, String> {
            Ok(Vec::new())
        }
    }

    /// Signature = per-channel means of the region.
    pub(crate) struct MeanEncoder;

    impl FaceEncode for MeanEncoder {
        type Error = String;

        fn scheme(&self) -> &str {
            "mean"
        }

        fn encode_face(&mut self, grid: &PixelGrid, region: &FaceRegion) -> Result<FaceSignature, String> {
            let mut sums = [0.0f32; 3];
            let mut n = 0.0f32;
            for y in region.top..region.bottom {
                for x in region.left..region.right {
                    let p = grid.get_pixel(x, y);
                    for c in 0..3 {
                        sums[c] += p[c] as f32 / 255.0;
                    }
                    n += 1.0;
                }
            }
            Ok(FaceSignature {
                values: sums.iter().map(|s| s / n).collect(),
                scheme: Some("mean".into()),
            })
        }
    }

    pub(crate) struct FailingEncoder;

    impl FaceEncode for FailingEncoder {
        type Error = String;

        fn scheme(&self) -> &str {
            "failing"
        }

        fn encode_face(&mut self, _grid: &PixelGrid, _region: &FaceRegion) -> Result<FaceSignature, String> {
            Err("model produced no output".into())
        }
    }

    fn face_image() -> PixelGrid {
        PixelGrid::from_fn(8, 8, |x, y| {
            let v = (x * 12 + y * 6) as u8 + 60;
            Rgb([v, v / 2, 255 - v])
        })
    }

    #[test]
    fn test_no_face_outcome() {
        let mut pipeline = SignaturePipeline::new(NeverDetector, NeverDetector, MeanEncoder);
        assert_eq!(pipeline.extract(&face_image()), Extraction::NoFace);
    }

    #[test]
    fn test_precise_tier_used_after_fast_miss() {
        let mut pipeline = SignaturePipeline::new(NeverDetector, BrightCornerDetector, MeanEncoder);
        let mut grid = face_image();
        grid.put_pixel(0, 0, Rgb([255, 255, 255]));
        match pipeline.extract(&grid) {
            Extraction::Signatures { tier, signatures } => {
                assert_eq!(tier, DetectionTier::Precise);
                assert_eq!(signatures.len(), 1);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_encoding_unavailable_outcome() {
        let mut pipeline = SignaturePipeline::new(BrightCornerDetector, NeverDetector, FailingEncoder);
        let mut grid = face_image();
        grid.put_pixel(0, 0, Rgb([255, 255, 255]));
        assert_eq!(pipeline.extract(&grid), Extraction::EncodingUnavailable { regions: 1 });
        assert!(pipeline.extract(&grid).signatures().is_empty());
    }

    #[test]
    fn test_encoder_sees_normalized_grid() {
        let mut pipeline = SignaturePipeline::new(BrightCornerDetector, NeverDetector, MeanEncoder);
        let mut grid = face_image();
        grid.put_pixel(0, 0, Rgb([255, 255, 255]));
        let sigs = pipeline.extract(&grid).into_signatures();
        // Normalized grids carry three identical channels.
        assert_eq!(sigs[0].values[0], sigs[0].values[1]);
        assert_eq!(sigs[0].values[1], sigs[0].values[2]);
    }

    #[test]
    fn test_extraction_is_idempotent() {
        let mut pipeline = SignaturePipeline::new(BrightCornerDetector, NeverDetector, MeanEncoder);
        let mut grid = face_image();
        grid.put_pixel(0, 0, Rgb([255, 255, 255]));
        let first = pipeline.extract(&grid).into_signatures();
        let second = pipeline.extract(&grid).into_signatures();
        assert_eq!(first.len(), second.len());
        for (a, b) in first.iter().zip(second.iter()) {
            assert!(a.distance(b) < 1e-6);
        }
    }

    #[test]
    fn test_model_paths_in_dir() {
        let paths = ModelPaths::in_dir(Path::new("/models"));
        assert_eq!(paths.scrfd, PathBuf::from("/models/det_10g.onnx"));
        assert_eq!(paths.arcface, PathBuf::from("/models/w600k_r50.onnx"));
        assert_eq!(paths.cascade, PathBuf::from("/models/seeta_fd_frontal_v1.0.bin"));
    }

    #[test]
    fn test_load_missing_models_fails_fast() {
        let paths = ModelPaths::in_dir(Path::new("/nonexistent"));
        assert!(matches!(
            FacePipeline::load(&paths, 2),
            Err(LoadError::Detector(DetectorError::ModelNotFound(_)))
        ));
    }
}
