//! Errors surfaced by the simulation harness.

use metro_core::NetworkError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimError {
    #[error("Failed to read layout: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse layout: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Layout references unknown station {0}")]
    UnknownStation(i64),

    #[error("Layout references unknown line {0}")]
    UnknownLine(i64),

    #[error("Layout references unknown make {0:?}")]
    UnknownMake(String),

    #[error("Failed to build route network: {0}")]
    Network(#[from] NetworkError),

    #[error("Layout has no stations")]
    EmptyLayout,
}
