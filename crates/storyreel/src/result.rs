//! Result and error types for the export pipeline.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for export operations
pub type ExportResult<T> = Result<T, ExportError>;

/// Errors that can occur while exporting stories
#[derive(Debug, Error)]
pub enum ExportError {
    /// Browser could not be started at all
    #[error("Failed to launch browser: {message}")]
    BrowserLaunch {
        /// Error message
        message: String,
    },

    /// Browsing context or page could not be created
    #[error("Page error: {message}")]
    Page {
        /// Error message
        message: String,
    },

    /// Navigation to the render URL failed or timed out
    #[error("Navigation to {url} failed: {message}")]
    Navigation {
        /// URL that failed
        url: String,
        /// Error message
        message: String,
    },

    /// The render target reported an unknown story
    #[error("Story not found by render target: {url}")]
    StoryNotFound {
        /// Render URL that was loaded
        url: String,
    },

    /// Screenshot failed or timed out
    #[error("Screenshot failed: {message}")]
    Screenshot {
        /// Error message
        message: String,
    },

    /// Native recording failed
    #[error("Recording failed: {message}")]
    Recording {
        /// Error message
        message: String,
    },

    /// Raw recording never appeared on disk
    #[error("Recording {path} did not appear within {ms}ms")]
    RecordingMissing {
        /// Expected container path
        path: PathBuf,
        /// Time waited in milliseconds
        ms: u64,
    },

    /// External encoder failed
    #[error("Transcode failed: {message}")]
    Transcode {
        /// Error message, including the encoder's stderr
        message: String,
    },

    /// Frame decoding or GIF encoding failed
    #[error("Image processing failed: {message}")]
    ImageProcessing {
        /// Error message
        message: String,
    },

    /// A placed file is empty or has the wrong format signature
    #[error("Output {path} failed verification: {message}")]
    InvalidOutput {
        /// Output path
        path: PathBuf,
        /// Error message
        message: String,
    },

    /// Invalid configuration or catalog
    #[error("Invalid configuration: {message}")]
    Config {
        /// Error message
        message: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),
}

impl ExportError {
    /// Create a configuration error
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Whether this error aborts the whole batch.
    ///
    /// Only a browser that cannot be launched is fatal; every other error
    /// is scoped to the capture unit that raised it.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::BrowserLaunch { .. })
    }
}
