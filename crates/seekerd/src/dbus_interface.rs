use crate::engine::{EngineError, EngineHandle};
use crate::store::{NewRecord, RecordStore, RecordStoreError};
use seeker_core::{codec, MatchError, MatchReport};
use std::sync::Arc;
use zbus::interface;

pub const BUS_NAME: &str = "org.seeker.Seeker1";
pub const OBJECT_PATH: &str = "/org/seeker/Seeker1";

/// D-Bus interface for the Seeker daemon.
///
/// Bus name: org.seeker.Seeker1
/// Object path: /org/seeker/Seeker1
pub struct SeekerService {
    engine: EngineHandle,
    store: Arc<RecordStore>,
}

impl SeekerService {
    pub fn new(engine: EngineHandle, store: Arc<RecordStore>) -> Self {
        Self { engine, store }
    }
}

#[interface(name = "org.seeker.Seeker1")]
impl SeekerService {
    /// Match an uploaded photo against every stored record.
    async fn match_image(&self, image: Vec<u8>) -> zbus::fdo::Result<String> {
        tracing::info!(bytes = image.len(), "match requested");
        let report = self.engine.match_image(image).await.map_err(engine_error)?;
        Ok(match_response(&report).to_string())
    }

    /// List every stored record, newest first.
    async fn list_records(&self) -> zbus::fdo::Result<String> {
        let records = self.store.list().map_err(store_error)?;
        tracing::debug!(count = records.len(), "list_records");
        to_json(&records)
    }

    async fn get_record(&self, id: &str) -> zbus::fdo::Result<String> {
        match self.store.get(id).map_err(store_error)? {
            Some(record) => to_json(&record),
            None => Err(zbus::fdo::Error::InvalidArgs(format!("no record with id {id}"))),
        }
    }

    /// Add a record from JSON metadata and raw image bytes (may be empty). Returns the new id.
    async fn add_record(&self, metadata: &str, image: Vec<u8>) -> zbus::fdo::Result<String> {
        let mut record: NewRecord = serde_json::from_str(metadata)
            .map_err(|e| zbus::fdo::Error::InvalidArgs(format!("invalid record JSON: {e}")))?;
        if !image.is_empty() {
            codec::decode_image(&image).map_err(|e| zbus::fdo::Error::InvalidArgs(e.to_string()))?;
            record.image = Some(codec::encode_stored_image(&image));
        }
        self.store.insert(&record).map_err(store_error)
    }

    async fn remove_record(&self, id: &str) -> zbus::fdo::Result<bool> {
        tracing::info!(id, "remove_record requested");
        self.store.remove(id).map_err(store_error)
    }

    /// Return daemon status information.
    async fn status(&self) -> zbus::fdo::Result<String> {
        let info = self.engine.info();
        let records = self.store.count().map_err(store_error)?;
        Ok(serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "models_loaded": true,
            "records": records,
            "scan_workers": info.scan_workers,
            "match_threshold": info.match_threshold,
            "signature_cache": info.signature_cache,
            "scan_timeout_secs": info.scan_timeout_secs,
        })
        .to_string())
    }
}

fn match_response(report: &MatchReport) -> serde_json::Value {
    let message = match report.matches.len() {
        0 => "no matching records".to_string(),
        1 => "1 match found".to_string(),
        n => format!("{n} matches found"),
    };
    serde_json::json!({
        "success": true,
        "disposition": report.disposition(),
        "message": message,
        "matches": report.matches,
        "scanned": report.scanned,
        "skipped": report.skipped,
        "truncated": report.truncated,
    })
}

fn to_json<T: serde::Serialize>(value: &T) -> zbus::fdo::Result<String> {
    serde_json::to_string(value).map_err(|e| zbus::fdo::Error::Failed(e.to_string()))
}

/// Client-side problems become `InvalidArgs`; everything else is `Failed`.
fn engine_error(err: EngineError) -> zbus::fdo::Error {
    match err {
        EngineError::Match(err @ (MatchError::InputInvalid(_) | MatchError::NoFaceDetected)) => {
            zbus::fdo::Error::InvalidArgs(err.to_string())
        }
        EngineError::Match(err @ MatchError::StoreUnavailable(_)) => {
            tracing::error!(error = %err, "match aborted");
            zbus::fdo::Error::Failed(err.to_string())
        }
        other => zbus::fdo::Error::Failed(other.to_string()),
    }
}

fn store_error(err: RecordStoreError) -> zbus::fdo::Error {
    match err {
        RecordStoreError::MissingField(_) => zbus::fdo::Error::InvalidArgs(err.to_string()),
        other => {
            tracing::error!(error = %other, "record store failure");
            zbus::fdo::Error::Failed(other.to_string())
        }
    }
}
