use std::path::PathBuf;

use reqwest::StatusCode;
use thiserror::Error;

/// Failure while fetching weather for a single city.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Weather request for '{city}' failed with status {status}: {body}")]
    Status {
        city: String,
        status: StatusCode,
        body: String,
    },

    #[error("Failed to reach weather API for '{city}'")]
    Transport {
        city: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Failed to parse weather response for '{city}'")]
    Decode {
        city: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Weather response for '{city}' is missing '{field}'")]
    MissingField { city: String, field: &'static str },

    #[error("Failed to build HTTP client")]
    Client(#[source] reqwest::Error),
}

impl FetchError {
    pub fn city(&self) -> Option<&str> {
        match self {
            FetchError::Status { city, .. }
            | FetchError::Transport { city, .. }
            | FetchError::Decode { city, .. }
            | FetchError::MissingField { city, .. } => Some(city),
            FetchError::Client(_) => None,
        }
    }

    /// Status-code failures are recovered by skipping the city; everything
    /// else is subject to [`TransportErrorPolicy`](crate::TransportErrorPolicy).
    pub fn is_soft(&self) -> bool {
        matches!(self, FetchError::Status { .. })
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Transport { .. } => true,
            FetchError::Status { status, .. } => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            }
            FetchError::Decode { .. }
            | FetchError::MissingField { .. }
            | FetchError::Client(_) => false,
        }
    }
}

/// Failure while writing the CSV file.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Failed to create output directory '{0}'")]
    CreateDir(PathBuf, #[source] std::io::Error),

    #[error("Failed to create temporary file in '{0}'")]
    TempFile(PathBuf, #[source] std::io::Error),

    #[error("Failed to write CSV data for '{0}'")]
    Csv(PathBuf, #[source] csv::Error),

    #[error("Failed to flush CSV data for '{0}'")]
    Flush(PathBuf, #[source] std::io::Error),

    #[error("Failed to move CSV file into place at '{0}'")]
    Persist(PathBuf, #[source] std::io::Error),

    #[error("Failed to read CSV file '{0}'")]
    Read(PathBuf, #[source] csv::Error),
}

/// Failure of a whole fetch-then-export run.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("Fetching weather data aborted")]
    Fetch(#[from] FetchError),

    #[error("Exporting weather data failed")]
    Export(#[from] ExportError),
}
