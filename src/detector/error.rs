use thiserror::Error;

use crate::browser::error::PageError;

#[derive(Debug, Error)]
pub enum DetectionError {
    /// The page itself became unusable mid-pass
    #[error(transparent)]
    Page(#[from] PageError),

    #[error("Invalid configuration: {0}")]
    Config(String),
}
