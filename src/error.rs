use std::path::PathBuf;

use thiserror::Error;

/// Why a config file could not be used. Never leaves `SourceConfig::load`,
/// which substitutes the default config instead.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// The upstream client could not be constructed.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid upstream base url {url}: {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    #[error("could not build HTTP client: {0}")]
    Http(#[from] reqwest::Error),
}

/// A single source could not be fetched or decoded.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("source {source_id} returned HTTP {status}")]
    Status {
        source_id: String,
        status: reqwest::StatusCode,
    },

    #[error("source {source_id} timed out")]
    Timeout { source_id: String },

    #[error("request for source {source_id} failed: {error}")]
    Transport {
        source_id: String,
        #[source]
        error: reqwest::Error,
    },

    #[error("could not decode listing for source {source_id}: {detail}")]
    Decode { source_id: String, detail: String },
}

impl FetchError {
    pub fn from_reqwest(source_id: &str, error: reqwest::Error) -> Self {
        let source_id = source_id.to_string();
        if error.is_timeout() {
            FetchError::Timeout { source_id }
        } else if error.is_decode() {
            FetchError::Decode {
                source_id,
                detail: error.to_string(),
            }
        } else {
            FetchError::Transport { source_id, error }
        }
    }
}

/// The persisted pack could not be read or written.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("pack document {0} does not exist")]
    NotFound(PathBuf),

    #[error("pack document {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("could not encode pack: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A refresh that could not complete. Per-source fetch failures never end up
/// here; only the store can abort a build.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("failed to read previous pack: {0}")]
    Load(#[source] StoreError),

    #[error("failed to persist pack: {0}")]
    Persist(#[source] StoreError),
}
