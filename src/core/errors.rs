//! Error types for the backend driver and the local inference pipeline.
//!
//! All failures are reported to the immediate caller as values of
//! [`DriverError`]; none of them terminates the process. Cancellation is not
//! an error: a cancelled `analyze` returns `Ok(false)` with empty results.

use std::path::PathBuf;
use thiserror::Error;

use crate::core::types::PixelLayout;

/// Convenient result alias for driver operations.
pub type DriverResult<T> = Result<T, DriverError>;

/// Errors surfaced by the driver facade, loader, bridge, and pipeline.
#[derive(Error, Debug)]
pub enum DriverError {
    /// Loading a backend module failed. The driver stays unloaded; any
    /// previously loaded backend was already unloaded before the attempt.
    #[error("backend load failed: {0}")]
    LoadFailure(#[from] LoadError),

    /// A contract operation was invoked with no backend loaded.
    #[error("no backend is loaded")]
    NotLoaded,

    /// Unload was refused; the loaded backend is left untouched.
    #[error("unload refused: {reason}")]
    UnloadRefused {
        /// Why the unload could not proceed.
        reason: &'static str,
    },

    /// No conversion rule exists for the requested pixel-layout pair.
    #[error("no pixel conversion from {from:?} to {to:?}")]
    ConversionUnsupported {
        /// Layout of the caller-supplied buffer.
        from: PixelLayout,
        /// Layout the backend expects.
        to: PixelLayout,
    },

    /// A model or dictionary file was absent at first use.
    #[error("missing model resource: {path}")]
    ResourceMissing {
        /// The path that was expected to exist.
        path: PathBuf,
    },

    /// An optional contract operation the backend does not implement.
    #[error("backend does not implement operation: {operation}")]
    Unsupported {
        /// Name of the unimplemented operation.
        operation: &'static str,
    },

    /// Invalid caller-supplied input.
    #[error("invalid input: {message}")]
    InvalidInput {
        /// What was wrong with the input.
        message: String,
    },

    /// Error while decoding an image file.
    #[error("image load")]
    ImageLoad(#[from] image::ImageError),

    /// Error from the forward-pass engine.
    #[error("inference")]
    Inference(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// IO error.
    #[error("io")]
    Io(#[from] std::io::Error),
}

/// Detailed cause of a failed backend load.
#[derive(Error, Debug)]
pub enum LoadError {
    /// The requested name is not among the installed backends.
    #[error("backend '{name}' is not installed")]
    UnknownBackend {
        /// The name that was requested.
        name: String,
    },

    /// The module file could not be opened.
    #[error("failed to open module {path}: {message}")]
    OpenFailed {
        /// Path of the module file.
        path: PathBuf,
        /// Loader-provided failure description.
        message: String,
    },

    /// A required entry point was absent from the module.
    #[error("module is missing required symbol '{symbol}'")]
    MissingSymbol {
        /// Name of the missing entry point.
        symbol: &'static str,
    },

    /// The backend reports an ABI version newer than this driver.
    #[error("backend ABI version {found:#08x} is newer than driver version {supported:#08x}")]
    IncompatibleAbi {
        /// Version reported by the module.
        found: i32,
        /// Version compiled into the driver.
        supported: i32,
    },

    /// The instantiate entry point returned null.
    #[error("backend instantiation returned null")]
    InstantiationFailed,
}

impl DriverError {
    /// Wraps an arbitrary engine error as an inference failure.
    pub fn inference<E>(source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        DriverError::Inference(Box::new(source))
    }
}
