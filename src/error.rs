//! Error kinds shared by the whole crate.
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum Error {
    /// The forward and the backward totals disagreed even after rebanding.
    #[error("alpha/beta mismatch")]
    AlphaBetaMismatch,
    #[error("poor z-score: {z:.3} < {min:.3}")]
    PoorZScore { z: f64, min: f64 },
    #[error("template too small")]
    TemplateTooSmall,
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Other(e.to_string())
    }
}
