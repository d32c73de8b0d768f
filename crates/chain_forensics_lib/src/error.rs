use serde::Serialize;
use thiserror::Error;

use crate::utils::ConversionError;

/// Coarse classification used by callers to pick a user-facing message
/// without looking at the error text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    InvalidInput,
    RepositoryUnavailable,
    Configuration,
    Data,
    Other,
}

#[derive(Error, Debug)]
pub enum ForensicError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Repository unavailable: {0}")]
    RepositoryUnavailable(String),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Data error: {0}")]
    DataError(String),
    #[error("conversion error: {0}")]
    ConversionError(#[from] ConversionError),
    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("json error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("csv error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("Other error: {0}")]
    OtherError(String),
}

impl ForensicError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ForensicError::InvalidInput(_) => ErrorKind::InvalidInput,
            ForensicError::RepositoryUnavailable(_) => ErrorKind::RepositoryUnavailable,
            ForensicError::ConfigError(_) => ErrorKind::Configuration,
            ForensicError::DataError(_)
            | ForensicError::ConversionError(_)
            | ForensicError::JsonError(_)
            | ForensicError::CsvError(_) => ErrorKind::Data,
            ForensicError::IoError(_) | ForensicError::OtherError(_) => ErrorKind::Other,
        }
    }
}

impl From<sqlx::Error> for ForensicError {
    fn from(err: sqlx::Error) -> Self {
        ForensicError::RepositoryUnavailable(err.to_string())
    }
}

impl From<sqlx::migrate::MigrateError> for ForensicError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        ForensicError::RepositoryUnavailable(format!("migration failed: {}", err))
    }
}

impl From<toml::de::Error> for ForensicError {
    fn from(err: toml::de::Error) -> Self {
        ForensicError::ConfigError(err.to_string())
    }
}

#[macro_export]
macro_rules! err_custom_create {
    ($($t:tt)*) => {
        $crate::error::ForensicError::OtherError(format!($($t)*))
    };
}

#[macro_export]
macro_rules! err_invalid_input {
    ($($t:tt)*) => {
        $crate::error::ForensicError::InvalidInput(format!($($t)*))
    };
}

/// Closure for `map_err` converting any error with a `From` impl and logging
/// the call site.
#[macro_export]
macro_rules! err_from {
    () => {
        |e| {
            let err = $crate::error::ForensicError::from(e);
            log::debug!("{}:{} {}", file!(), line!(), err);
            err
        }
    };
}
