//! Region → signature encoding.

use crate::types::{FaceRegion, FaceSignature, PixelGrid};
use std::fmt::Display;

/// Pluggable signature model.
pub trait FaceEncode {
    type Error: Display;

    /// Identifier of the encoding scheme; signatures are only comparable within one scheme.
    fn scheme(&self) -> &str;

    /// Encode one face region of `grid`.
    fn encode_face(&mut self, grid: &PixelGrid, region: &FaceRegion) -> Result<FaceSignature, Self::Error>;
}

/// Encode every region in order. Regions the model cannot encode are dropped,
/// so the output may be shorter than `regions`.
pub fn encode<E: FaceEncode>(encoder: &mut E, grid: &PixelGrid, regions: &[FaceRegion]) -> Vec<FaceSignature> {
    regions
        .iter()
        .filter_map(|region| match encoder.encode_face(grid, region) {
            Ok(signature) => Some(signature),
            Err(err) => {
                tracing::warn!(
                    scheme = encoder.scheme(),
                    error = %err,
                    top = region.top,
                    left = region.left,
                    "could not encode face region; dropping it"
                );
                None
            }
        })
        .collect()
}
