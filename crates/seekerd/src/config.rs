use serde::Deserialize;
use seeker_core::cascade::MIN_UPSAMPLE_TIMES;
use seeker_core::pipeline::ModelPaths;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Which message bus the daemon registers on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusKind {
    Session,
    System,
}

impl BusKind {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "session" => Some(BusKind::Session),
            "system" => Some(BusKind::System),
            _ => None,
        }
    }
}

/// Optional settings file. Every key may be omitted.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    model_dir: Option<PathBuf>,
    db_path: Option<PathBuf>,
    match_threshold: Option<f32>,
    scan_workers: Option<usize>,
    scan_timeout_secs: Option<u64>,
    upsample_times: Option<u32>,
    signature_cache: Option<bool>,
    bus: Option<BusKind>,
}

/// Daemon configuration: `SEEKER_CONFIG` TOML file, then `SEEKER_*` environment overrides.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory containing the detector and recognizer model files.
    pub model_dir: PathBuf,
    /// Path to the SQLite record database.
    pub db_path: PathBuf,
    /// Euclidean distance below which a face pair is a match.
    pub match_threshold: f32,
    /// Extractor instances used to scan the corpus in parallel.
    pub scan_workers: usize,
    /// Per-query scan deadline in seconds; 0 disables it.
    pub scan_timeout_secs: u64,
    /// Upsampling passes for the fast detection tier; at least 2.
    pub upsample_times: u32,
    /// Keep corpus signatures in memory between queries.
    pub signature_cache: bool,
    pub bus: BusKind,
}

impl Config {
    /// Load the file named by `SEEKER_CONFIG` (if any), then apply environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let file = match std::env::var("SEEKER_CONFIG") {
            Ok(path) => read_file(Path::new(&path))?,
            Err(_) => FileConfig::default(),
        };
        Ok(Self::resolve(file, |key| std::env::var(key).ok()))
    }

    fn resolve(file: FileConfig, env: impl Fn(&str) -> Option<String>) -> Self {
        let data_dir = seeker_core::data_dir();

        let model_dir = env("SEEKER_MODEL_DIR")
            .map(PathBuf::from)
            .or(file.model_dir)
            .unwrap_or_else(seeker_core::default_model_dir);

        let db_path = env("SEEKER_DB_PATH")
            .map(PathBuf::from)
            .or(file.db_path)
            .unwrap_or_else(|| data_dir.join("records.db"));

        Self {
            model_dir,
            db_path,
            match_threshold: env_parse(&env, "SEEKER_MATCH_THRESHOLD")
                .or(file.match_threshold)
                .unwrap_or(seeker_core::DEFAULT_MATCH_THRESHOLD),
            scan_workers: env_parse(&env, "SEEKER_SCAN_WORKERS")
                .or(file.scan_workers)
                .unwrap_or(2)
                .max(1),
            scan_timeout_secs: env_parse(&env, "SEEKER_SCAN_TIMEOUT_SECS")
                .or(file.scan_timeout_secs)
                .unwrap_or(0),
            upsample_times: env_parse(&env, "SEEKER_UPSAMPLE_TIMES")
                .or(file.upsample_times)
                .filter(|&times| {
                    let enough = times >= MIN_UPSAMPLE_TIMES;
                    if !enough {
                        tracing::warn!(
                            times,
                            minimum = MIN_UPSAMPLE_TIMES,
                            "rejecting upsample_times below the minimum"
                        );
                    }
                    enough
                })
                .unwrap_or(MIN_UPSAMPLE_TIMES),
            signature_cache: env("SEEKER_SIGNATURE_CACHE")
                .map(|v| v != "0" && !v.eq_ignore_ascii_case("false"))
                .or(file.signature_cache)
                .unwrap_or(true),
            bus: env("SEEKER_BUS")
                .and_then(|v| BusKind::parse(&v))
                .or(file.bus)
                .unwrap_or(BusKind::Session),
        }
    }

    pub fn model_paths(&self) -> ModelPaths {
        ModelPaths::in_dir(&self.model_dir)
    }

    pub fn scan_deadline(&self) -> Option<Duration> {
        (self.scan_timeout_secs > 0).then(|| Duration::from_secs(self.scan_timeout_secs))
    }
}

fn read_file(path: &Path) -> Result<FileConfig, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn env_parse<T: std::str::FromStr>(env: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let value = env(key)?;
    match value.trim().parse() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            tracing::warn!(key, value = %value, "ignoring unparseable environment override");
            None
        }
    }
}
