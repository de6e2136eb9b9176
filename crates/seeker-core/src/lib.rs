//! seeker-core — Face matching engine for missing-person records.
//!
//! Normalizes images, locates faces with a fast SeetaFace cascade and an
//! SCRFD fallback, encodes them with ArcFace via ONNX Runtime, and scores a
//! query against every stored record.

pub mod alignment;
pub mod cache;
pub mod cascade;
pub mod codec;
pub mod detector;
pub mod encoder;
pub mod locator;
pub mod matcher;
pub mod normalizer;
pub mod pipeline;
pub mod recognizer;
pub mod scanner;
pub mod scorer;
pub mod types;

use std::path::PathBuf;

pub use cache::{MemoryCache, SignatureCache};
pub use codec::DecodeError;
pub use locator::{DetectionTier, FaceDetect, FaceLocator, Location};
pub use matcher::{Disposition, MatchEngine, MatchError, MatchReport};
pub use pipeline::{Extract, Extraction, FacePipeline, ModelPaths};
pub use scanner::{CorpusScanner, CorpusStore, MemoryCorpus, StoreError};
pub use scorer::{EuclideanScorer, Scorer, DEFAULT_MATCH_THRESHOLD};
pub use types::{CorpusRecord, FaceRegion, FaceSignature, MatchResult, PixelGrid, RecordMetadata};

/// Default model directory: `$XDG_DATA_HOME/seeker/models`, falling back to
/// `~/.local/share/seeker/models`.
pub fn default_model_dir() -> PathBuf {
    data_dir().join("models")
}

/// Per-user data directory for seeker (`$XDG_DATA_HOME/seeker`).
pub fn data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("seeker")
}
