//! Error taxonomy for fetching, adding and persisting cities.

use std::path::PathBuf;

use thiserror::Error;

/// A single request against the weather API failed.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The server answered with its `{cod, message}` error envelope.
    #[error("Weather API error {cod}: {message}")]
    Api { cod: String, message: String },

    /// Non-success status with a body that is not the error envelope, e.g. a
    /// proxy's HTML error page.
    #[error("{endpoint} request failed with HTTP {status} (body: {body})")]
    Status {
        endpoint: &'static str,
        status: u16,
        body: String,
    },

    /// Neither the expected shape nor the error envelope matched.
    #[error("Failed to decode {endpoint} response: {source} (body: {body})")]
    Decode {
        endpoint: &'static str,
        #[source]
        source: serde_json::Error,
        body: String,
    },
}

impl FetchError {
    /// User-facing message for front ends.
    pub fn user_message(&self) -> String {
        match self {
            Self::Network(_) => "Network error. Check your connection.".to_string(),
            Self::Api { message, .. } => format!("Weather service error: {message}"),
            Self::Status { status, .. } => {
                format!("The weather service is unavailable right now (HTTP {status}).")
            }
            Self::Decode { .. } => "Unexpected response from the weather service".to_string(),
        }
    }
}

/// Local key-value persistence failed.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum AddCityError {
    /// Geocoding returned nothing, or its best match is a different name.
    #[error("City not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("Failed to persist city: {0}")]
    Store(#[from] StoreError),
}
