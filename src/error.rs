//! Error types for the paging engine

use std::path::PathBuf;

/// Failure producing pixels for a single render request.
///
/// Recovered locally by the dispatcher: the request is dropped and the cache
/// is left untouched. A later pass may ask for the same tile again.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DecodeFailure {
    #[error("cannot allocate {width}x{height} raster")]
    Allocation { width: u32, height: u32 },

    #[error("render region is empty or outside the page")]
    InvalidRegion,

    #[error("page {page}: {detail}")]
    Page { page: usize, detail: String },

    #[error("decoder: {0}")]
    Backend(String),
}

impl DecodeFailure {
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }
}

/// Terminal failure opening a document. No tiles are requested afterwards.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DocumentOpenFailure {
    #[error("document is password protected")]
    AuthRequired,

    #[error("document is corrupt: {0}")]
    Corrupt(String),

    #[error("document not found: {0}")]
    NotFound(PathBuf),
}

/// Errors while loading or validating [`crate::EngineConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("reading config: {0}")]
    Io(#[from] std::io::Error),

    #[error("parsing config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Errors surfaced by [`crate::PagingEngine`] construction.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Open(#[from] DocumentOpenFailure),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("document has no pages")]
    NoPages,

    #[error("cannot spawn render worker: {0}")]
    Spawn(#[from] std::io::Error),
}
