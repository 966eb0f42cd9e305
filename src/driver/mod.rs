//! Driver facade: composes the loader with the pixel bridge and exposes the
//! backend contract to the application.
//!
//! Every operation invoked with no backend loaded returns
//! [`DriverError::NotLoaded`] instead of faulting. `analyze` marks the
//! backend running for its whole duration; `cancel` can be called from
//! another thread while it blocks.

pub mod loader;

use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::{PoisonError, RwLock};

use tracing::warn;

use crate::core::errors::{DriverError, DriverResult};
use crate::core::traits::OcrBackend;
use crate::core::types::{HardwareAssignment, HardwareClass, PixelLayout, RawImage, TextBox};
use crate::pipeline::LocalBackend;
use crate::processors::pixel_bridge;

use loader::BackendLoader;

/// Application-facing OCR driver.
///
/// Shareable across threads: a long-running `analyze` on one thread leaves
/// `cancel`, the setters, and the result getters usable from others.
pub struct OcrDriver {
    loader: RwLock<BackendLoader>,
}

impl OcrDriver {
    /// Driver over the default backend installation root.
    pub fn new() -> Self {
        OcrDriver {
            loader: RwLock::new(BackendLoader::new()),
        }
    }

    /// Driver over an explicit backend installation root.
    pub fn with_install_root(install_root: PathBuf) -> Self {
        OcrDriver {
            loader: RwLock::new(BackendLoader::with_install_root(install_root)),
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, BackendLoader> {
        self.loader.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, BackendLoader> {
        self.loader.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn with_backend<T>(&self, f: impl FnOnce(&dyn OcrBackend) -> T) -> DriverResult<T> {
        let loader = self.read();
        let handle = loader.handle().ok_or(DriverError::NotLoaded)?;
        Ok(f(handle.backend()))
    }

    /// Names of installable backends.
    pub fn list_backends(&self) -> Vec<String> {
        self.read().list_backends()
    }

    /// Loads the named backend, replacing any loaded one.
    pub fn load(&self, name: &str) -> DriverResult<()> {
        if self.is_running() {
            return Err(DriverError::UnloadRefused {
                reason: "analyze is running",
            });
        }
        self.write().load(name)
    }

    /// Loads the built-in local inference backend.
    pub fn load_default(&self) -> DriverResult<()> {
        self.load_backend(Box::new(LocalBackend::new()))
    }

    /// Binds an already constructed backend, replacing any loaded one.
    pub fn load_backend(&self, backend: Box<dyn OcrBackend>) -> DriverResult<()> {
        if self.is_running() {
            return Err(DriverError::UnloadRefused {
                reason: "analyze is running",
            });
        }
        self.write().load_backend(backend)
    }

    /// Unloads the current backend, if any.
    pub fn unload(&self) -> DriverResult<()> {
        if self.is_running() {
            return Err(DriverError::UnloadRefused {
                reason: "analyze is running",
            });
        }
        self.write().unload()
    }

    /// Whether a backend is loaded.
    pub fn is_loaded(&self) -> bool {
        self.read().handle().is_some()
    }

    /// Whether an `analyze` is currently in flight.
    pub fn is_running(&self) -> bool {
        self.read()
            .handle()
            .map(|handle| handle.is_running())
            .unwrap_or(false)
    }

    /// Hardware classes the loaded backend supports.
    pub fn hardware_support(&self) -> DriverResult<Vec<HardwareClass>> {
        self.with_backend(|backend| backend.hardware_support())
    }

    /// Requests hardware bindings.
    pub fn set_hardware(&self, assignments: &[HardwareAssignment]) -> DriverResult<()> {
        self.with_backend(|backend| backend.set_hardware(assignments))?
    }

    /// Caps the backend's worker count.
    pub fn set_max_threads(&self, count: u32) -> DriverResult<()> {
        self.with_backend(|backend| backend.set_max_threads(count))?
    }

    /// Image file formats the backend accepts.
    pub fn file_formats(&self) -> DriverResult<Vec<String>> {
        self.with_backend(|backend| backend.file_formats())
    }

    /// Loads the input image from a file.
    pub fn set_image_file(&self, path: &Path) -> DriverResult<()> {
        if !path.exists() {
            warn!("image file {} does not exist", path.display());
            return Err(DriverError::InvalidInput {
                message: format!("file {} does not exist", path.display()),
            });
        }
        self.with_backend(|backend| backend.set_image_file(path))?
    }

    /// The loaded backend's preferred raw pixel layout.
    pub fn pixel_layout(&self) -> DriverResult<Option<PixelLayout>> {
        self.with_backend(|backend| backend.pixel_layout())
    }

    /// Sets the input image from a raw buffer in any recognized layout.
    ///
    /// The buffer is bridged to the backend's preferred layout: forwarded
    /// untouched when the layouts match, converted through the fixed table
    /// otherwise. Backends without a layout preference only accept files.
    pub fn set_image_buffer(&self, raw: &RawImage<'_>) -> DriverResult<()> {
        let loader = self.read();
        let handle = loader.handle().ok_or(DriverError::NotLoaded)?;
        let backend = handle.backend();

        let Some(preferred) = backend.pixel_layout() else {
            warn!("backend has no pixel layout preference, use set_image_file");
            return Err(DriverError::Unsupported {
                operation: "set_image_buffer",
            });
        };

        let converted = pixel_bridge::convert(raw, preferred)?;
        let bridged = RawImage {
            width: raw.width,
            height: raw.height,
            stride: match &converted {
                std::borrow::Cow::Borrowed(_) => raw.stride,
                std::borrow::Cow::Owned(_) => raw.width as usize * preferred.channels(),
            },
            layout: preferred,
            data: converted.as_ref(),
        };
        backend.set_image_buffer(&bridged)
    }

    /// Keys of the authentication parameters the backend requires.
    pub fn auth_keys(&self) -> DriverResult<Vec<String>> {
        self.with_backend(|backend| backend.auth_keys())
    }

    /// Supplies authentication parameters.
    pub fn set_auth(&self, params: &[String]) -> DriverResult<()> {
        self.with_backend(|backend| backend.set_auth(params))?
    }

    /// Languages the backend can recognize.
    pub fn languages(&self) -> DriverResult<Vec<String>> {
        self.with_backend(|backend| backend.languages())
    }

    /// Selects the recognition language.
    pub fn set_language(&self, language: &str) -> DriverResult<()> {
        self.with_backend(|backend| backend.set_language(language))?
    }

    /// Sets a backend-specific tuning value.
    pub fn set_value(&self, key: &str, value: &str) -> DriverResult<()> {
        self.with_backend(|backend| backend.set_value(key, value))?
    }

    /// Reads a backend-specific tuning value.
    pub fn value(&self, key: &str) -> DriverResult<Option<String>> {
        self.with_backend(|backend| backend.value(key))
    }

    /// Runs the backend's pipeline synchronously.
    ///
    /// Returns `Ok(true)` iff any text was found. The backend counts as
    /// running until this returns.
    pub fn analyze(&self) -> DriverResult<bool> {
        let loader = self.read();
        let handle = loader.handle().ok_or(DriverError::NotLoaded)?;

        let running = handle.running_flag().clone();
        running.store(true, Ordering::SeqCst);
        let outcome = handle.backend().analyze();
        running.store(false, Ordering::SeqCst);
        outcome
    }

    /// Requests early termination of an in-flight `analyze`.
    ///
    /// Returns whether this call performed the transition; `false` when no
    /// analyze is running or cancellation was already requested.
    pub fn cancel(&self) -> DriverResult<bool> {
        let loader = self.read();
        let handle = loader.handle().ok_or(DriverError::NotLoaded)?;
        if !handle.is_running() {
            warn!("cancel requested with no analyze in flight");
            return Ok(false);
        }
        Ok(handle.backend().cancel())
    }

    /// All detected text boxes, in reading order.
    pub fn text_boxes(&self) -> DriverResult<Vec<TextBox>> {
        self.with_backend(|backend| backend.text_boxes())
    }

    /// Character-level boxes for one text box.
    pub fn char_boxes(&self, index: usize) -> DriverResult<Vec<TextBox>> {
        self.with_backend(|backend| backend.char_boxes(index))
    }

    /// Aggregate recognized text for the whole image.
    pub fn all_text(&self) -> DriverResult<String> {
        self.with_backend(|backend| backend.all_text())
    }

    /// Recognized text for one text box.
    pub fn box_text(&self, index: usize) -> DriverResult<String> {
        self.with_backend(|backend| backend.box_text(index))
    }
}

impl Default for OcrDriver {
    fn default() -> Self {
        Self::new()
    }
}
