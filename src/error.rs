//! Error taxonomy for the upload and compilation workflows.

use thiserror::Error;

/// Errors raised while ingesting an incoming photo or image document.
#[derive(Debug, Error)]
pub enum IngestError {
    /// The item is neither a photo nor an image document we accept.
    #[error("only JPEG/PNG images are accepted")]
    UnsupportedMediaKind,

    /// The transport or filesystem failed while staging the item's bytes.
    #[error("failed to stage upload: {0}")]
    Staging(anyhow::Error),
}

/// Errors raised by the compilation workflow. The first two are precondition
/// violations and leave the session untouched; the last two abort an attempt
/// whose session has already been torn down.
#[derive(Debug, Error)]
pub enum CompileError {
    /// The user has no staged photos to compile.
    #[error("no photos uploaded")]
    NoPhotos,

    /// The requested document name is empty after trimming.
    #[error("name cannot be empty")]
    EmptyName,

    /// The rendering engine could not produce the document.
    #[error("failed to render PDF: {0}")]
    Render(anyhow::Error),

    /// The transport could not deliver the finished document.
    #[error("failed to deliver PDF: {0}")]
    Delivery(anyhow::Error),
}
