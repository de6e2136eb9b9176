use crate::config::Config;
use crate::store::RecordStore;
use seeker_core::pipeline::LoadError;
use seeker_core::{CorpusScanner, FacePipeline, MatchEngine, MatchError, MatchReport, MemoryCache, SignatureCache};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

/// Upper bound on cached corpus images.
const SIGNATURE_CACHE_CAPACITY: usize = 10_000;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("model load failed: {0}")]
    Load(#[from] LoadError),
    #[error(transparent)]
    Match(#[from] MatchError),
    #[error("failed to spawn engine thread: {0}")]
    Spawn(std::io::Error),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Static facts about the running engine, reported by `Status`.
#[derive(Debug, Clone)]
pub struct EngineInfo {
    pub scan_workers: usize,
    pub match_threshold: f32,
    pub signature_cache: bool,
    pub scan_timeout_secs: u64,
}

/// Messages sent from D-Bus handlers to the engine thread.
enum EngineRequest {
    Match {
        image: Vec<u8>,
        reply: oneshot::Sender<Result<MatchReport, MatchError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
    info: EngineInfo,
}

impl EngineHandle {
    /// Match an uploaded image against every stored record.
    pub async fn match_image(&self, image: Vec<u8>) -> Result<MatchReport, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Match {
                image,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        Ok(reply_rx.await.map_err(|_| EngineError::ChannelClosed)??)
    }

    pub fn info(&self) -> &EngineInfo {
        &self.info
    }
}

/// Spawn the engine on a dedicated OS thread.
///
/// Loads one pipeline per scan worker before returning, so a missing model
/// fails startup rather than the first query.
pub fn spawn_engine(config: &Config, store: Arc<RecordStore>) -> Result<EngineHandle, EngineError> {
    let paths = config.model_paths();
    let workers = config.scan_workers.max(1);

    let primary = FacePipeline::load(&paths, config.upsample_times)?;
    let extra = (1..workers)
        .map(|_| FacePipeline::load(&paths, config.upsample_times))
        .collect::<Result<Vec<_>, _>>()?;
    tracing::info!(
        dir = %config.model_dir.display(),
        workers,
        upsample_times = config.upsample_times,
        "face models loaded"
    );

    let mut scanner = CorpusScanner::new(store);
    if config.signature_cache {
        let cache: Arc<dyn SignatureCache> = Arc::new(MemoryCache::new(SIGNATURE_CACHE_CAPACITY));
        scanner = scanner.with_cache(cache);
    }
    if let Some(deadline) = config.scan_deadline() {
        scanner = scanner.with_deadline(deadline);
    }

    let mut engine = MatchEngine::new(primary, scanner)
        .with_workers(extra)
        .with_threshold(config.match_threshold);

    let info = EngineInfo {
        scan_workers: engine.pool_size(),
        match_threshold: engine.threshold(),
        signature_cache: config.signature_cache,
        scan_timeout_secs: config.scan_timeout_secs,
    };

    let (tx, mut rx) = mpsc::channel::<EngineRequest>(4);

    std::thread::Builder::new()
        .name("seeker-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Match { image, reply } => {
                        let result = engine.match_image(&image);
                        if let Err(err) = &result {
                            tracing::info!(disposition = ?err.disposition(), error = %err, "match request rejected");
                        }
                        let _ = reply.send(result);
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })
        .map_err(EngineError::Spawn)?;

    Ok(EngineHandle { tx, info })
}
