//! Two-tier face location: a fast detector first, a precise one only when the fast one finds nothing.

use crate::types::{FaceRegion, PixelGrid};
use std::fmt::Display;

/// Pluggable face detection backend.
pub trait FaceDetect {
    type Error: Display;

    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    /// Detect faces in an RGB grid. Zero regions is a normal result.
    fn detect(&mut self, grid: &PixelGrid) -> Result<Vec<FaceRegion>, Self::Error>;
}

/// Which detector produced a location.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionTier {
    Fast,
    Precise,
}

/// Outcome of [`FaceLocator::locate`].
#[derive(Debug, Clone, PartialEq)]
pub enum Location {
    Found {
        tier: DetectionTier,
        regions: Vec<FaceRegion>,
    },
    /// Neither tier found a face.
    Empty,
}

impl Location {
    pub fn regions(&self) -> &[FaceRegion] {
        match self {
            Location::Found { regions, .. } => regions,
            Location::Empty => &[],
        }
    }

    pub fn into_regions(self) -> Vec<FaceRegion> {
        match self {
            Location::Found { regions, .. } => regions,
            Location::Empty => Vec::new(),
        }
    }
}

pub struct FaceLocator<F, P> {
    fast: F,
    precise: P,
}

impl<F: FaceDetect, P: FaceDetect> FaceLocator<F, P> {
    pub fn new(fast: F, precise: P) -> Self {
        Self { fast, precise }
    }

    /// Locate faces, paying for the precise detector only when the fast one comes up empty.
    ///
    /// A detector that fails at runtime counts as finding nothing for its tier.
    pub fn locate(&mut self, grid: &PixelGrid) -> Location {
        let fast = run_tier(&mut self.fast, grid);
        if !fast.is_empty() {
            tracing::debug!(faces = fast.len(), detector = self.fast.name(), "fast tier found faces");
            return Location::Found {
                tier: DetectionTier::Fast,
                regions: fast,
            };
        }

        tracing::warn!(
            fast = self.fast.name(),
            precise = self.precise.name(),
            "no face found by fast detector; retrying with precise detector"
        );

        let precise = run_tier(&mut self.precise, grid);
        if precise.is_empty() {
            tracing::warn!("no face detected after both attempts");
            return Location::Empty;
        }

        tracing::debug!(faces = precise.len(), detector = self.precise.name(), "precise tier found faces");
        Location::Found {
            tier: DetectionTier::Precise,
            regions: precise,
        }
    }
}

fn run_tier<D: FaceDetect>(detector: &mut D, grid: &PixelGrid) -> Vec<FaceRegion> {
    match detector.detect(grid) {
        Ok(regions) => regions,
        Err(err) => {
            tracing::warn!(detector = detector.name(), error = %err, "detector failed; treating as no face");
            Vec::new()
        }
    }
}
