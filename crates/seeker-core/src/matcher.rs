//! Query orchestration: encode the query, scan the corpus, score every record.

use crate::codec::{self, DecodeError};
use crate::pipeline::{Extract, Extraction};
use crate::scanner::{CorpusScanner, CorpusStore, ScannedRecord, StoreError};
use crate::scorer::{EuclideanScorer, Scorer, DEFAULT_MATCH_THRESHOLD};
use crate::types::{FaceSignature, MatchResult, PixelGrid};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MatchError {
    #[error("invalid query image: {0}")]
    InputInvalid(#[from] DecodeError),
    #[error("no face detected in query image")]
    NoFaceDetected,
    #[error(transparent)]
    StoreUnavailable(#[from] StoreError),
}

/// Categorical outcome of a match request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    Matched,
    NoMatch,
    InputInvalid,
    NoFaceDetected,
    StoreUnavailable,
}

impl MatchError {
    pub fn disposition(&self) -> Disposition {
        match self {
            MatchError::InputInvalid(_) => Disposition::InputInvalid,
            MatchError::NoFaceDetected => Disposition::NoFaceDetected,
            MatchError::StoreUnavailable(_) => Disposition::StoreUnavailable,
        }
    }
}

/// Successful match outcome. An empty `matches` list is still a success.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MatchReport {
    pub matches: Vec<MatchResult>,
    /// Faces found in the query image.
    pub query_faces: usize,
    /// Corpus records whose image was decoded and examined.
    pub scanned: usize,
    /// Corpus records skipped because their image could not be decoded.
    pub skipped: usize,
    /// The scan stopped at its deadline; `matches` holds what was found until then.
    pub truncated: bool,
}

impl MatchReport {
    pub fn disposition(&self) -> Disposition {
        if self.matches.is_empty() {
            Disposition::NoMatch
        } else {
            Disposition::Matched
        }
    }
}

/// Score the query against every scanned record, one result per passing pair.
pub fn match_signatures<Sc: Scorer>(
    scorer: &Sc,
    query: &[FaceSignature],
    scanned: &[ScannedRecord],
    threshold: f32,
) -> Vec<MatchResult> {
    scanned
        .iter()
        .flat_map(|entry| {
            scorer
                .score(query, &entry.signatures, threshold)
                .into_iter()
                .map(move |score| MatchResult::for_record(&entry.record, score))
        })
        .collect()
}

/// Owns a pool of extractors and the corpus scanner; runs match queries end to end.
///
/// The first extractor encodes the query; all of them share the corpus scan.
pub struct MatchEngine<X, S> {
    workers: Vec<X>,
    scanner: CorpusScanner<S>,
    scorer: EuclideanScorer,
    threshold: f32,
}

impl<X: Extract + Send, S: CorpusStore> MatchEngine<X, S> {
    pub fn new(primary: X, scanner: CorpusScanner<S>) -> Self {
        Self {
            workers: vec![primary],
            scanner,
            scorer: EuclideanScorer,
            threshold: DEFAULT_MATCH_THRESHOLD,
        }
    }

    /// Add extractors to the scan pool.
    pub fn with_workers(mut self, extra: impl IntoIterator<Item = X>) -> Self {
        self.workers.extend(extra);
        self
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn pool_size(&self) -> usize {
        self.workers.len()
    }

    /// Decode raw uploaded bytes, then match.
    pub fn match_image(&mut self, bytes: &[u8]) -> Result<MatchReport, MatchError> {
        let grid = codec::decode_image(bytes)?;
        self.match_query(&grid)
    }

    /// Match a decoded query image against the whole corpus.
    ///
    /// Fails with `NoFaceDetected` before touching the store when the query has no usable face.
    pub fn match_query(&mut self, query: &PixelGrid) -> Result<MatchReport, MatchError> {
        let query_signatures = match self.inspect(query) {
            Extraction::Signatures { signatures, .. } => signatures,
            Extraction::NoFace | Extraction::EncodingUnavailable { .. } => {
                return Err(MatchError::NoFaceDetected);
            }
        };

        let scan = self.scanner.scan_parallel(&mut self.workers).map_err(|err| {
            tracing::error!(error = %err, "corpus store unavailable");
            err
        })?;

        let matches = match_signatures(&self.scorer, &query_signatures, &scan.records, self.threshold);

        tracing::info!(
            query_faces = query_signatures.len(),
            scanned = scan.records.len(),
            skipped = scan.skipped,
            truncated = scan.truncated,
            matches = matches.len(),
            "match query complete"
        );

        Ok(MatchReport {
            matches,
            query_faces: query_signatures.len(),
            scanned: scan.records.len(),
            skipped: scan.skipped,
            truncated: scan.truncated,
        })
    }

    /// Run only the query-side pipeline.
    pub fn inspect(&mut self, grid: &PixelGrid) -> Extraction {
        // `new` always seeds the pool with the primary extractor.
        match self.workers.first_mut() {
            Some(primary) => primary.extract(grid),
            None => Extraction::NoFace,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::tests::{record, stored_image, PixelExtractor};
    use crate::scanner::MemoryCorpus;
    use crate::types::CorpusRecord;
    use image::{ImageFormat, Rgb};
    use std::io::Cursor;
    use std::sync::atomic::Ordering;

    struct DownStore;

    impl CorpusStore for DownStore {
        fn records(&self) -> Result<Vec<CorpusRecord>, StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
    }

    /// Query grid with faces encoded the same way as `stored_image`; (0, 0) is still a face.
    fn query(faces: &[(u8, u8)]) -> PixelGrid {
        let mut grid = PixelGrid::new(faces.len().max(1) as u32, 1);
        for (x, &(r, g)) in faces.iter().enumerate() {
            grid.put_pixel(x as u32, 0, Rgb([r, g, 1]));
        }
        grid
    }

    fn engine(records: Vec<CorpusRecord>) -> MatchEngine<PixelExtractor, MemoryCorpus> {
        MatchEngine::new(PixelExtractor::new(), CorpusScanner::new(MemoryCorpus { records }))
    }

    #[test]
    fn test_no_face_query_never_scans() {
        let mut engine = MatchEngine::new(PixelExtractor::new(), CorpusScanner::new(DownStore));
        let calls = engine.workers[0].calls.clone();

        let result = engine.match_query(&query(&[]));
        assert!(matches!(result, Err(MatchError::NoFaceDetected)));
        // Only the query was extracted; a scan would have hit the failing store.
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(result.unwrap_err().disposition(), Disposition::NoFaceDetected);
    }

    #[test]
    fn test_single_match_scores_point_seven() {
        // Query face (0, 0); stored face (30, 0) → distance 0.30.
        let mut engine = engine(vec![
            record("match", stored_image(&[(30, 0)])),
            record("far", stored_image(&[(90, 90)])),
        ]);

        let report = engine.match_query(&query(&[(0, 0)])).unwrap();
        assert_eq!(report.disposition(), Disposition::Matched);
        assert_eq!(report.matches.len(), 1);
        assert_eq!(report.matches[0].metadata.name, "match");
        assert!((report.matches[0].match_score - 0.70).abs() < 1e-6);
    }

    #[test]
    fn test_empty_corpus_is_no_match() {
        let mut engine = engine(Vec::new());
        let report = engine.match_query(&query(&[(10, 10)])).unwrap();
        assert_eq!(report.disposition(), Disposition::NoMatch);
        assert!(report.matches.is_empty());
        assert_eq!(report.scanned, 0);
    }

    #[test]
    fn test_two_face_record_one_matching_pair() {
        // Stored faces at distance 0.2 and 0.8 from the query face.
        let mut engine = engine(vec![record("group photo", stored_image(&[(20, 0), (80, 0)]))]);
        let report = engine.match_query(&query(&[(0, 0)])).unwrap();
        assert_eq!(report.matches.len(), 1);
        assert!((report.matches[0].match_score - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_multiple_passing_pairs_yield_duplicates() {
        let mut engine = engine(vec![record("twins", stored_image(&[(10, 0), (0, 10)]))]);
        let report = engine.match_query(&query(&[(0, 0)])).unwrap();
        assert_eq!(report.matches.len(), 2);
        assert!(report.matches.iter().all(|m| m.metadata.name == "twins"));
    }

    #[test]
    fn test_store_unavailable_is_distinct_failure() {
        let mut engine = MatchEngine::new(PixelExtractor::new(), CorpusScanner::new(DownStore));
        let err = engine.match_query(&query(&[(5, 5)])).unwrap_err();
        assert!(matches!(err, MatchError::StoreUnavailable(_)));
        assert_eq!(err.disposition(), Disposition::StoreUnavailable);
    }

    #[test]
    fn test_corrupt_record_counted_not_fatal() {
        let mut engine = engine(vec![
            record("broken", "data:image/jpeg;base64,@@@@".into()),
            record("ok", stored_image(&[(1, 0)])),
        ]);
        let report = engine.match_query(&query(&[(0, 0)])).unwrap();
        assert_eq!(report.skipped, 1);
        assert_eq!(report.scanned, 1);
        assert_eq!(report.matches.len(), 1);
    }

    #[test]
    fn test_threshold_is_configurable() {
        let mut engine = engine(vec![record("r", stored_image(&[(60, 0)]))]).with_threshold(0.7);
        let report = engine.match_query(&query(&[(0, 0)])).unwrap();
        assert_eq!(report.matches.len(), 1);
        assert!((report.matches[0].match_score - 0.4).abs() < 1e-6);
    }

    #[test]
    fn test_worker_pool_scan_finds_same_matches() {
        let records: Vec<CorpusRecord> = (0..9u8)
            .map(|i| record(&format!("r{i}"), stored_image(&[(i * 10, 0)])))
            .collect();
        let mut single = engine(records.clone());
        let mut pooled = engine(records).with_workers(vec![PixelExtractor::new(), PixelExtractor::new()]);
        assert_eq!(pooled.pool_size(), 3);

        let a = single.match_query(&query(&[(0, 0)])).unwrap();
        let b = pooled.match_query(&query(&[(0, 0)])).unwrap();
        let names = |r: &MatchReport| -> Vec<String> { r.matches.iter().map(|m| m.metadata.name.clone()).collect() };
        assert_eq!(names(&a), names(&b));
        assert_eq!(a.matches.len(), 5);
    }

    #[test]
    fn test_match_image_rejects_undecodable_bytes() {
        let mut engine = engine(Vec::new());
        let err = engine.match_image(b"definitely not an image").unwrap_err();
        assert_eq!(err.disposition(), Disposition::InputInvalid);
        assert!(matches!(engine.match_image(&[]), Err(MatchError::InputInvalid(DecodeError::Empty))));
    }

    #[test]
    fn test_match_image_decodes_upload() {
        let mut bytes = Cursor::new(Vec::new());
        query(&[(0, 0)]).write_to(&mut bytes, ImageFormat::Png).unwrap();
        let mut engine = engine(vec![record("r", stored_image(&[(0, 0)]))]);
        let report = engine.match_image(bytes.get_ref()).unwrap();
        assert_eq!(report.matches.len(), 1);
        assert!((report.matches[0].match_score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_report_serializes_disposition_fields() {
        let report = MatchReport::default();
        assert_eq!(report.disposition(), Disposition::NoMatch);
        let json = serde_json::to_value(Disposition::NoFaceDetected).unwrap();
        assert_eq!(json, "no_face_detected");
    }
}
