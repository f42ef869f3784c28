//! Slurm REST error type.
//!
//! `NotFound` and `NoContent` render as the stock HTTP status phrases;
//! adapters treat those two as benign outcomes.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SlurmError {
    #[error("Not Found")]
    NotFound,

    #[error("No Content")]
    NoContent,

    #[error("slurm api ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("slurm transport: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("invalid slurm server url: {0}")]
    InvalidUrl(String),

    #[error("decode slurm response: {0}")]
    Decode(String),
}

impl SlurmError {
    /// Not-found and no-content are normal in a system where jobs finish
    /// and nodes come and go; callers treat them as success.
    pub fn is_benign(&self) -> bool {
        matches!(self, SlurmError::NotFound | SlurmError::NoContent)
    }
}
