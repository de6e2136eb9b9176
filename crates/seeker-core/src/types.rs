use serde::{Deserialize, Serialize};

/// Decoded RGB image, 8 bits per channel.
pub type PixelGrid = image::RgbImage;

/// Rectangle around a detected face, in pixel coordinates of the grid it was found in.
///
/// `right` and `bottom` are exclusive and never exceed the grid's width and height.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceRegion {
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
    pub left: u32,
    pub confidence: f32,
    /// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: Option<[(f32, f32); 5]>,
}

impl FaceRegion {
    /// Build a region from floating-point corners, clamping it into a `width` × `height` grid.
    ///
    /// Returns `None` when nothing of the box is left inside the grid.
    pub fn clamped(
        x1: f32,
        y1: f32,
        x2: f32,
        y2: f32,
        width: u32,
        height: u32,
        confidence: f32,
    ) -> Option<Self> {
        let clamp = |v: f32, max: u32| v.round().clamp(0.0, max as f32) as u32;
        let left = clamp(x1.min(x2), width);
        let right = clamp(x1.max(x2), width);
        let top = clamp(y1.min(y2), height);
        let bottom = clamp(y1.max(y2), height);

        if right <= left || bottom <= top {
            return None;
        }

        Some(Self {
            top,
            right,
            bottom,
            left,
            confidence,
            landmarks: None,
        })
    }

    pub fn with_landmarks(mut self, landmarks: Option<[(f32, f32); 5]>) -> Self {
        self.landmarks = landmarks;
        self
    }

    pub fn width(&self) -> u32 {
        self.right - self.left
    }

    pub fn height(&self) -> u32 {
        self.bottom - self.top
    }
}

/// Face signature vector (512-dimensional for ArcFace).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceSignature {
    pub values: Vec<f32>,
    /// Encoding scheme that produced this signature (e.g., "w600k_r50").
    /// Signatures are only comparable within one scheme.
    pub scheme: Option<String>,
}

impl FaceSignature {
    pub fn new(values: Vec<f32>) -> Self {
        Self {
            values,
            scheme: None,
        }
    }

    /// Both signatures come from the same encoder (untagged signatures are assumed compatible).
    pub fn comparable(&self, other: &FaceSignature) -> bool {
        match (&self.scheme, &other.scheme) {
            (Some(a), Some(b)) => a == b && self.values.len() == other.values.len(),
            _ => self.values.len() == other.values.len(),
        }
    }

    /// Euclidean distance between two signatures of equal length.
    pub fn distance(&self, other: &FaceSignature) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }
}

fn unknown_name() -> String {
    "Unknown".to_string()
}

/// Descriptive fields of a missing-person record.
///
/// Every field is optional in storage; absent values resolve to an empty
/// string (`name` resolves to `"Unknown"`) when the record is read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordMetadata {
    #[serde(default = "unknown_name")]
    pub name: String,
    #[serde(default)]
    pub age: String,
    #[serde(default)]
    pub gender: String,
    #[serde(default)]
    pub last_seen_location: String,
    #[serde(default)]
    pub date_missing: String,
    #[serde(default)]
    pub contact_number: String,
    #[serde(default)]
    pub description: String,
}

impl Default for RecordMetadata {
    fn default() -> Self {
        Self {
            name: unknown_name(),
            age: String::new(),
            gender: String::new(),
            last_seen_location: String::new(),
            date_missing: String::new(),
            contact_number: String::new(),
            description: String::new(),
        }
    }
}

impl RecordMetadata {
    /// Resolve nullable storage columns into a record with defaults applied.
    pub fn from_optional(
        name: Option<String>,
        age: Option<String>,
        gender: Option<String>,
        last_seen_location: Option<String>,
        date_missing: Option<String>,
        contact_number: Option<String>,
        description: Option<String>,
    ) -> Self {
        Self {
            name: name.filter(|n| !n.is_empty()).unwrap_or_else(unknown_name),
            age: age.unwrap_or_default(),
            gender: gender.unwrap_or_default(),
            last_seen_location: last_seen_location.unwrap_or_default(),
            date_missing: date_missing.unwrap_or_default(),
            contact_number: contact_number.unwrap_or_default(),
            description: description.unwrap_or_default(),
        }
    }
}

/// A stored record as seen by the scanner and the listing interface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorpusRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(flatten)]
    pub metadata: RecordMetadata,
    /// Base64 image, optionally prefixed with `data:<mime>;base64,`.
    #[serde(default)]
    pub image: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

impl CorpusRecord {
    pub fn new(metadata: RecordMetadata, image: impl Into<String>) -> Self {
        Self {
            id: None,
            metadata,
            image: image.into(),
            created_at: None,
        }
    }
}

/// One passing (query face, corpus face) pair for a corpus record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchResult {
    #[serde(flatten)]
    pub metadata: RecordMetadata,
    pub image: String,
    /// `1 - distance`, rounded to two decimals. Not clamped.
    #[serde(rename = "match_score")]
    pub match_score: f32,
}

impl MatchResult {
    pub fn for_record(record: &CorpusRecord, match_score: f32) -> Self {
        Self {
            metadata: record.metadata.clone(),
            image: record.image.clone(),
            match_score,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_zero_for_identical() {
        let a = FaceSignature::new(vec![0.1, 0.2, 0.3]);
        assert!(a.distance(&a.clone()).abs() < 1e-6);
    }

    #[test]
    fn test_distance_symmetric() {
        let a = FaceSignature::new(vec![0.3, -0.7, 1.2, 0.0]);
        let b = FaceSignature::new(vec![-0.4, 0.25, 0.9, 2.0]);
        assert_eq!(a.distance(&b), b.distance(&a));
    }

    #[test]
    fn test_distance_known_value() {
        let a = FaceSignature::new(vec![0.0, 0.0]);
        let b = FaceSignature::new(vec![3.0, 4.0]);
        assert!((a.distance(&b) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_region_clamped_to_grid() {
        let region = FaceRegion::clamped(-10.0, -5.0, 120.0, 90.0, 100, 80, 0.9).unwrap();
        assert_eq!(
            (region.top, region.right, region.bottom, region.left),
            (0, 100, 80, 0)
        );
        assert_eq!(region.width(), 100);
        assert_eq!(region.height(), 80);
    }

    #[test]
    fn test_region_outside_grid_rejected() {
        assert!(FaceRegion::clamped(200.0, 200.0, 260.0, 260.0, 100, 100, 0.9).is_none());
    }

    #[test]
    fn test_metadata_defaults_when_absent() {
        let record: CorpusRecord = serde_json::from_str(r#"{"image":"abc"}"#).unwrap();
        assert_eq!(record.metadata.name, "Unknown");
        assert_eq!(record.metadata.age, "");
        assert_eq!(record.metadata.contact_number, "");
        assert_eq!(record.image, "abc");
    }

    #[test]
    fn test_metadata_from_optional_columns() {
        let meta = RecordMetadata::from_optional(
            None,
            Some("12".into()),
            None,
            Some("Central station".into()),
            None,
            None,
            None,
        );
        assert_eq!(meta.name, "Unknown");
        assert_eq!(meta.age, "12");
        assert_eq!(meta.last_seen_location, "Central station");
        assert_eq!(meta.gender, "");
    }

    #[test]
    fn test_match_result_wire_shape() {
        let mut record = CorpusRecord::new(RecordMetadata::default(), "data:image/png;base64,AA==");
        record.metadata.last_seen_location = "Harbor".into();
        let json = serde_json::to_value(MatchResult::for_record(&record, 0.7)).unwrap();

        assert_eq!(json["name"], "Unknown");
        assert_eq!(json["lastSeenLocation"], "Harbor");
        assert_eq!(json["dateMissing"], "");
        assert_eq!(json["image"], "data:image/png;base64,AA==");
        assert!((json["match_score"].as_f64().unwrap() - 0.7).abs() < 1e-6);
    }
}
