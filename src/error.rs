//! Error types for the downbeat detection pipeline

use std::fmt;
use std::path::PathBuf;

/// Custom error type for downbeat detection
#[derive(Debug, Clone)]
pub enum DownbeatError {
    /// E001: A signal-processing capability is missing or failed to initialise
    CapabilityUnavailable { capability: String, reason: String },
    /// E002: No candidate audio path exists
    FileNotFound { tried: Vec<PathBuf> },
    /// E003: Activation extraction or tracking failed
    Processing(String),
    /// E004: The result record could not be written
    Serialization(String),
    /// E005: Configuration validation failed
    ConfigValidation(String),
    /// E006: Audio could not be decoded
    Decode(String),
}

impl DownbeatError {
    /// Message written into the `error` field of a failure record.
    ///
    /// Processing and decode failures carry the backend's message verbatim;
    /// the other variants read the same as their `Display` form minus the code.
    pub fn record_message(&self) -> String {
        match self {
            DownbeatError::CapabilityUnavailable { capability, reason } => {
                format!("{} not available: {}", capability, reason)
            }
            DownbeatError::FileNotFound { tried } => {
                let tried: Vec<String> = tried.iter().map(|p| p.display().to_string()).collect();
                format!("Audio file not found. Tried: {}", tried.join(", "))
            }
            DownbeatError::Processing(msg)
            | DownbeatError::Decode(msg)
            | DownbeatError::Serialization(msg)
            | DownbeatError::ConfigValidation(msg) => msg.clone(),
        }
    }

    /// Short code used in logs
    pub fn code(&self) -> &'static str {
        match self {
            DownbeatError::CapabilityUnavailable { .. } => "E001",
            DownbeatError::FileNotFound { .. } => "E002",
            DownbeatError::Processing(_) => "E003",
            DownbeatError::Serialization(_) => "E004",
            DownbeatError::ConfigValidation(_) => "E005",
            DownbeatError::Decode(_) => "E006",
        }
    }
}

impl fmt::Display for DownbeatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DownbeatError::CapabilityUnavailable { capability, reason } => {
                write!(f, "E001: Capability unavailable - {}: {}", capability, reason)
            }
            DownbeatError::FileNotFound { tried } => {
                write!(f, "E002: Audio file not found ({} candidates tried)", tried.len())
            }
            DownbeatError::Processing(msg) => {
                write!(f, "E003: Processing error - {}", msg)
            }
            DownbeatError::Serialization(msg) => {
                write!(f, "E004: Result serialization error - {}", msg)
            }
            DownbeatError::ConfigValidation(msg) => {
                write!(f, "E005: Configuration validation failed - {}", msg)
            }
            DownbeatError::Decode(msg) => {
                write!(f, "E006: Audio decode error - {}", msg)
            }
        }
    }
}

impl std::error::Error for DownbeatError {}

impl From<std::io::Error> for DownbeatError {
    fn from(err: std::io::Error) -> Self {
        DownbeatError::Serialization(format!("File I/O error: {}", err))
    }
}

impl From<serde_json::Error> for DownbeatError {
    fn from(err: serde_json::Error) -> Self {
        DownbeatError::Serialization(format!("JSON serialization error: {}", err))
    }
}

impl From<hound::Error> for DownbeatError {
    fn from(err: hound::Error) -> Self {
        DownbeatError::Decode(err.to_string())
    }
}

// Backends that talk to external runtimes report through anyhow
impl From<anyhow::Error> for DownbeatError {
    fn from(err: anyhow::Error) -> Self {
        DownbeatError::Processing(format!("{:#}", err))
    }
}

/// Result type alias for downbeat operations
pub type Result<T> = std::result::Result<T, DownbeatError>;
