//! Error types shared across MediaWolf crates.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MediaWolfError {
    /// Config file could not be read, parsed, or written.
    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, MediaWolfError>;
