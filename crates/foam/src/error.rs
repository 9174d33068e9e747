//! Error types for the foam pipeline.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while configuring or running a simulation.
///
/// A missing snapshot file is *not* represented here: the loader reports it
/// as `Ok(None)` and the driver treats it as the end of the input sequence.
#[derive(Debug, Error)]
pub enum FoamError {
    /// Parameter bundle rejected before any frame was processed.
    #[error("invalid parameters: {0}")]
    InvalidParams(String),

    /// A snapshot or descriptor file existed but could not be understood.
    #[error("malformed input {path}: {reason}")]
    MalformedInput { path: PathBuf, reason: String },

    /// I/O failure on a file that was expected to be readable or writable.
    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

pub type Result<T> = std::result::Result<T, FoamError>;
