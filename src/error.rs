//! Error types for the forecast engine
//!
//! `FetchError` covers everything that can go wrong inside a single city's
//! fetch chain (or a single icon fetch). The aggregator swallows these at its
//! boundary; they only ever downgrade one city to "absent".
//! `ForecastError` covers construction-time failures of the engine itself.

use thiserror::Error;

type BoxedCause = Box<dyn std::error::Error + Send + Sync>;

/// Failure of a single fetch/decode chain
#[derive(Error, Debug)]
pub enum FetchError {
    /// The request never produced a response (connect, DNS, timeout)
    #[error("Transport error: {message}")]
    Transport { message: String },

    /// A response arrived but was not a well-formed HTTP exchange
    #[error("Protocol error: {message}")]
    Protocol { message: String },

    /// HTTP status outside 200..=299
    #[error("Request failed with status {status}")]
    RequestFailed { status: u16 },

    /// 2xx response with an empty body
    #[error("Response body is missing: {context}")]
    DataMissing { context: String },

    /// Body present but structurally invalid for the expected document
    #[error("Failed to decode {what}: {source}")]
    Decoding {
        what: &'static str,
        #[source]
        source: BoxedCause,
    },

    /// Request URL could not be constructed
    #[error("Invalid URL: {message}")]
    InvalidUrl { message: String },

    /// Unexpected failure of an internal dependency (panicked task, dropped worker)
    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Fieldless classification of a [`FetchError`], used for logs and reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Transport,
    Protocol,
    RequestFailed(u16),
    DataMissing,
    Decoding,
    InvalidUrl,
    Internal,
}

impl FetchError {
    pub fn transport<S: Into<String>>(message: S) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    pub fn protocol<S: Into<String>>(message: S) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    pub fn data_missing<S: Into<String>>(context: S) -> Self {
        Self::DataMissing {
            context: context.into(),
        }
    }

    pub fn decoding<E>(what: &'static str, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Decoding {
            what,
            source: Box::new(source),
        }
    }

    pub fn invalid_url<S: Into<String>>(message: S) -> Self {
        Self::InvalidUrl {
            message: message.into(),
        }
    }

    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            FetchError::Transport { .. } => ErrorKind::Transport,
            FetchError::Protocol { .. } => ErrorKind::Protocol,
            FetchError::RequestFailed { status } => ErrorKind::RequestFailed(*status),
            FetchError::DataMissing { .. } => ErrorKind::DataMissing,
            FetchError::Decoding { .. } => ErrorKind::Decoding,
            FetchError::InvalidUrl { .. } => ErrorKind::InvalidUrl,
            FetchError::Internal { .. } => ErrorKind::Internal,
        }
    }

    /// Get a user-friendly error message
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            FetchError::Transport { .. } => {
                "Unable to reach the weather service. Please check your internet connection."
                    .to_string()
            }
            FetchError::Protocol { .. } => "The weather service sent an invalid response.".to_string(),
            FetchError::RequestFailed { status } => {
                format!("The weather service rejected the request ({status}).")
            }
            FetchError::DataMissing { .. } => "The weather service returned no data.".to_string(),
            FetchError::Decoding { what, .. } => format!("Could not read the {what}."),
            FetchError::InvalidUrl { .. } => "Could not build a request for this location.".to_string(),
            FetchError::Internal { .. } => "Something went wrong while loading the forecast.".to_string(),
        }
    }
}

/// Errors raised while assembling the engine
#[derive(Error, Debug)]
pub enum ForecastError {
    /// Configuration-related errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// HTTP client could not be built
    #[error("HTTP client error: {source}")]
    Client {
        #[from]
        source: reqwest::Error,
    },
}

impl ForecastError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}
