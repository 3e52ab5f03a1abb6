//! Error type for setup paths.
//!
//! Per-step work never fails: degenerate inputs are skipped or clamped and
//! logged instead. Only mesh ingestion, parameter validation and config I/O
//! return errors.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PbfError {
    #[error("Failed to read or write file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Triangle {triangle} references vertex {index}, mesh has {vertex_count} vertices")]
    MeshIndexOutOfRange {
        triangle: usize,
        index: u32,
        vertex_count: usize,
    },
    #[error("Invalid parameter `{name}`: {reason}")]
    InvalidParam { name: &'static str, reason: String },
}

pub type Result<T> = std::result::Result<T, PbfError>;
