//! Corpus scanning: decode every stored record and extract its face signatures.

use crate::cache::{cache_key, SignatureCache};
use crate::codec;
use crate::pipeline::Extract;
use crate::types::{CorpusRecord, FaceSignature};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("record store unavailable: {0}")]
    Unavailable(String),
}

/// Read access to the stored records.
pub trait CorpusStore {
    /// Every record currently in the store. Failing to read the store at all is an error;
    /// individual malformed records are returned as-is and dealt with by the scanner.
    fn records(&self) -> Result<Vec<CorpusRecord>, StoreError>;
}

impl<T: CorpusStore + ?Sized> CorpusStore for Arc<T> {
    fn records(&self) -> Result<Vec<CorpusRecord>, StoreError> {
        (**self).records()
    }
}

/// A fixed in-memory corpus.
#[derive(Debug, Clone, Default)]
pub struct MemoryCorpus {
    pub records: Vec<CorpusRecord>,
}

impl CorpusStore for MemoryCorpus {
    fn records(&self) -> Result<Vec<CorpusRecord>, StoreError> {
        Ok(self.records.clone())
    }
}

/// A record and the signatures found in its image (possibly none).
#[derive(Debug, Clone)]
pub struct ScannedRecord {
    pub record: CorpusRecord,
    pub signatures: Vec<FaceSignature>,
}

#[derive(Debug, Clone, Default)]
pub struct ScanReport {
    /// Decodable records, in store order.
    pub records: Vec<ScannedRecord>,
    /// Records skipped because their stored image could not be decoded.
    pub skipped: usize,
    /// The scan deadline passed before every record was visited.
    pub truncated: bool,
}

enum RecordOutcome {
    Scanned(ScannedRecord),
    Malformed,
}

pub struct CorpusScanner<S> {
    store: S,
    cache: Option<Arc<dyn SignatureCache>>,
    deadline: Option<Duration>,
}

impl<S: CorpusStore> CorpusScanner<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            cache: None,
            deadline: None,
        }
    }

    /// Reuse signatures for stored images seen in earlier scans.
    pub fn with_cache(mut self, cache: Arc<dyn SignatureCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Stop visiting new records once a scan has run this long.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Scan the corpus with a single extractor on the calling thread.
    pub fn scan<X: Extract>(&self, extractor: &mut X) -> Result<ScanReport, StoreError> {
        let records = self.store.records()?;
        let started = Instant::now();
        let cache = self.cache.as_deref();

        let mut report = ScanReport::default();
        for (index, record) in records.iter().enumerate() {
            if self.expired(started) {
                tracing::warn!(visited = index, total = records.len(), "scan deadline reached; returning partial results");
                report.truncated = true;
                break;
            }
            match scan_record(record, extractor, cache) {
                RecordOutcome::Scanned(scanned) => report.records.push(scanned),
                RecordOutcome::Malformed => report.skipped += 1,
            }
        }

        tracing::debug!(
            total = records.len(),
            scanned = report.records.len(),
            skipped = report.skipped,
            "corpus scan complete"
        );
        Ok(report)
    }

    /// Scan the corpus across a pool of extractors, one worker thread each.
    ///
    /// Records are handed out through a shared cursor; results come back in store order.
    pub fn scan_parallel<X: Extract + Send>(&self, workers: &mut [X]) -> Result<ScanReport, StoreError> {
        if workers.len() <= 1 {
            return match workers.first_mut() {
                Some(extractor) => self.scan(extractor),
                None => Ok(ScanReport::default()),
            };
        }

        let records = self.store.records()?;
        let started = Instant::now();
        let cache = self.cache.as_deref();
        let cursor = AtomicUsize::new(0);
        let truncated = AtomicBool::new(false);
        let deadline = self.deadline;

        let per_worker: Vec<(Vec<(usize, ScannedRecord)>, usize)> = std::thread::scope(|scope| {
            let handles: Vec<_> = workers
                .iter_mut()
                .map(|extractor| {
                    let records = &records;
                    let cursor = &cursor;
                    let truncated = &truncated;
                    scope.spawn(move || {
                        let mut scanned = Vec::new();
                        let mut skipped = 0usize;
                        loop {
                            let index = cursor.fetch_add(1, Ordering::Relaxed);
                            let Some(record) = records.get(index) else {
                                break;
                            };
                            if deadline.is_some_and(|d| started.elapsed() >= d) {
                                truncated.store(true, Ordering::Relaxed);
                                break;
                            }
                            match scan_record(record, extractor, cache) {
                                RecordOutcome::Scanned(s) => scanned.push((index, s)),
                                RecordOutcome::Malformed => skipped += 1,
                            }
                        }
                        (scanned, skipped)
                    })
                })
                .collect();

            handles
                .into_iter()
                .map(|handle| match handle.join() {
                    Ok(result) => result,
                    Err(panic) => std::panic::resume_unwind(panic),
                })
                .collect()
        });

        let mut indexed = Vec::new();
        let mut report = ScanReport::default();
        for (scanned, skipped) in per_worker {
            indexed.extend(scanned);
            report.skipped += skipped;
        }
        indexed.sort_by_key(|(index, _)| *index);
        report.records = indexed.into_iter().map(|(_, s)| s).collect();
        report.truncated = truncated.load(Ordering::Relaxed);

        if report.truncated {
            tracing::warn!(total = records.len(), "scan deadline reached; returning partial results");
        }
        tracing::debug!(
            total = records.len(),
            workers = workers.len(),
            scanned = report.records.len(),
            skipped = report.skipped,
            "parallel corpus scan complete"
        );
        Ok(report)
    }

    fn expired(&self, started: Instant) -> bool {
        self.deadline.is_some_and(|d| started.elapsed() >= d)
    }
}

fn scan_record<X: Extract>(
    record: &CorpusRecord,
    extractor: &mut X,
    cache: Option<&dyn SignatureCache>,
) -> RecordOutcome {
    let key = cache.map(|_| cache_key(&record.image));
    if let (Some(cache), Some(key)) = (cache, key.as_ref()) {
        if let Some(signatures) = cache.get(key) {
            return RecordOutcome::Scanned(ScannedRecord {
                record: record.clone(),
                signatures,
            });
        }
    }

    let grid = match codec::decode_stored_image(&record.image) {
        Ok(grid) => grid,
        Err(err) => {
            tracing::warn!(
                id = record.id.as_deref().unwrap_or("-"),
                name = %record.metadata.name,
                error = %err,
                "skipping corpus record with undecodable image"
            );
            return RecordOutcome::Malformed;
        }
    };

    let signatures = extractor.extract(&grid).into_signatures();
    if let (Some(cache), Some(key)) = (cache, key) {
        cache.put(key, signatures.clone());
    }

    RecordOutcome::Scanned(ScannedRecord {
        record: record.clone(),
        signatures,
    })
}
