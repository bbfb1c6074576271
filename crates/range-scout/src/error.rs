//! Error types for range-scout configuration.
//!
//! Missing data during extraction is never an error; these variants only
//! describe malformed configuration, which is rejected at startup.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScoutError {
    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),

    #[error("Invalid format mode: {0}")]
    InvalidFormatMode(String),

    #[error("Unknown extraction strategy: {0}")]
    UnknownStrategy(String),

    #[error("Duplicate extraction strategy: {0}")]
    DuplicateStrategy(String),

    #[error("Invalid property table: {0}")]
    InvalidPropertyTable(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, ScoutError>;
