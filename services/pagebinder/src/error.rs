//! Error types for pagebinder.

use thiserror::Error;

/// Errors from the headless page renderer.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("browser launch failed: {0}")]
    LaunchFailed(String),

    #[error("navigation timed out: {url}")]
    NavigationTimeout { url: String },

    #[error("navigation failed: {url}: {message}")]
    Navigation { url: String, message: String },

    #[error("image collection script failed: {0}")]
    Script(String),
}

/// Errors while downloading or normalizing a single image candidate.
///
/// These are never fatal to a pipeline run; the candidate is dropped.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected status {0}")]
    Status(u16),

    #[error("image decode failed: {0}")]
    Image(#[from] image::ImageError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors while building or persisting the output PDF.
#[derive(Debug, Error)]
pub enum AssembleError {
    #[error("pdf write failed: {0}")]
    Pdf(#[from] lopdf::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("assembly task failed: {0}")]
    Task(String),
}

/// Validation failures for the admin-management commands.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("only the original admin may manage admins")]
    NotOriginalAdmin,

    #[error("missing user id argument")]
    MissingArgument,

    #[error("user id is not numeric: {0}")]
    NotNumeric(String),

    #[error("directory error: {0}")]
    Directory(#[from] anyhow::Error),
}
