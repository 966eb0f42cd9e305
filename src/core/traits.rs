//! The capability contract every recognition backend implements.
//!
//! Hardware listing, pixel-layout preference, language handling, `analyze`,
//! and result retrieval are mandatory. Everything else is optional: the
//! default bodies do nothing observable, report failure, and emit a
//! diagnostic naming the unimplemented operation, so a minimal backend only
//! has to provide the mandatory set.

use std::path::Path;

use crate::core::errors::{DriverError, DriverResult};
use crate::core::types::{HardwareAssignment, HardwareClass, PixelLayout, RawImage, TextBox};

/// Default body for an optional operation: log and report failure.
fn unsupported<T>(operation: &'static str) -> DriverResult<T> {
    tracing::warn!("backend does not implement operation: {operation}");
    Err(DriverError::Unsupported { operation })
}

/// Operations a recognition backend may implement.
///
/// Implementations must be shareable across threads: `analyze` blocks the
/// calling thread while `cancel` arrives from another one.
pub trait OcrBackend: Send + Sync {
    /// Hardware classes this backend can use, most specialized first.
    fn hardware_support(&self) -> Vec<HardwareClass>;

    /// Requests a set of hardware bindings for later use.
    fn set_hardware(&self, assignments: &[HardwareAssignment]) -> DriverResult<()> {
        let _ = assignments;
        unsupported("set_hardware")
    }

    /// Caps the number of worker threads the backend may use.
    fn set_max_threads(&self, count: u32) -> DriverResult<()> {
        let _ = count;
        unsupported("set_max_threads")
    }

    /// Image file formats accepted by [`OcrBackend::set_image_file`].
    fn file_formats(&self) -> Vec<String> {
        tracing::warn!("backend does not implement operation: file_formats");
        Vec::new()
    }

    /// Loads the input image from a file.
    fn set_image_file(&self, path: &Path) -> DriverResult<()> {
        let _ = path;
        unsupported("set_image_file")
    }

    /// The one raw pixel layout this backend ingests directly, or `None`
    /// for file-only backends.
    fn pixel_layout(&self) -> Option<PixelLayout>;

    /// Sets the input image from a raw buffer in the preferred layout.
    fn set_image_buffer(&self, image: &RawImage<'_>) -> DriverResult<()> {
        let _ = image;
        unsupported("set_image_buffer")
    }

    /// Keys of the authentication parameters this backend requires.
    fn auth_keys(&self) -> Vec<String> {
        tracing::warn!("backend does not implement operation: auth_keys");
        Vec::new()
    }

    /// Supplies authentication parameters matching [`OcrBackend::auth_keys`].
    fn set_auth(&self, params: &[String]) -> DriverResult<()> {
        let _ = params;
        unsupported("set_auth")
    }

    /// Languages this backend can recognize.
    fn languages(&self) -> Vec<String>;

    /// Selects the recognition language; fails if unsupported.
    fn set_language(&self, language: &str) -> DriverResult<()>;

    /// Sets a backend-specific tuning value.
    fn set_value(&self, key: &str, value: &str) -> DriverResult<()> {
        let _ = (key, value);
        unsupported("set_value")
    }

    /// Reads a backend-specific tuning value.
    fn value(&self, key: &str) -> Option<String> {
        let _ = key;
        tracing::warn!("backend does not implement operation: value");
        None
    }

    /// Runs the full recognition pipeline synchronously.
    ///
    /// Returns `Ok(true)` iff any text was found. Cancellation is a normal
    /// early exit: empty results and `Ok(false)`.
    fn analyze(&self) -> DriverResult<bool>;

    /// Requests early termination of an in-flight [`OcrBackend::analyze`].
    ///
    /// Returns whether this call performed the transition; `false` when
    /// cancellation was already requested or no analyze is in flight.
    fn cancel(&self) -> bool {
        tracing::warn!("backend does not implement operation: cancel");
        false
    }

    /// All detected text boxes, in reading order.
    fn text_boxes(&self) -> Vec<TextBox>;

    /// Character-level boxes for the text box at `index`; empty when the
    /// index is out of range.
    fn char_boxes(&self, index: usize) -> Vec<TextBox> {
        let _ = index;
        tracing::warn!("backend does not implement operation: char_boxes");
        Vec::new()
    }

    /// Aggregate recognized text for the whole image.
    fn all_text(&self) -> String;

    /// Recognized text for the box at `index`; empty when out of range.
    fn box_text(&self, index: usize) -> String;
}
