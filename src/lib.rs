//! # OCR Driver
//!
//! A pluggable OCR driver: applications recognize text in images through
//! interchangeable backends loaded as dynamic modules, with a built-in
//! backend that runs a two-stage (detect-then-recognize) neural pipeline
//! locally.
//!
//! ## Components
//!
//! - **Driver facade** ([`driver::OcrDriver`]): composes the loader with the
//!   pixel bridge and exposes the backend contract to the application,
//!   translating "no backend loaded" into failures instead of crashes.
//! - **Loader** ([`driver::loader::BackendLoader`]): discovers installed
//!   backends, opens and closes their dynamic modules, gates on the ABI
//!   version, and refuses to unload a running backend.
//! - **Capability contract** ([`core::OcrBackend`]): the operation set every
//!   backend implements, with default "unsupported" behavior for the
//!   optional operations.
//! - **Local backend** ([`pipeline::LocalBackend`]): detect → order → crop →
//!   recognize → filter over ONNX models, with CTC decoding, character-box
//!   reconstruction, cooperative cancellation, and a bounded recognition
//!   worker pool.
//! - **Pixel bridge** ([`processors::pixel_bridge`]): single-step raw pixel
//!   layout conversion between callers and backends.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ocr_driver::prelude::*;
//! use std::path::Path;
//!
//! # fn main() -> Result<(), ocr_driver::core::DriverError> {
//! let driver = OcrDriver::new();
//! driver.load_default()?;
//! driver.set_language("en")?;
//! driver.set_image_file(Path::new("document.png"))?;
//!
//! if driver.analyze()? {
//!     for (index, text_box) in driver.text_boxes()?.iter().enumerate() {
//!         println!("{:?}: {}", text_box.points, driver.box_text(index)?);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod core;
pub mod driver;
pub mod inference;
pub mod pipeline;
pub mod processors;

/// Prelude module for convenient imports.
///
/// ```rust
/// use ocr_driver::prelude::*;
/// ```
pub mod prelude {
    pub use crate::core::{
        DriverError, DriverResult, HardwareAssignment, HardwareClass, OcrBackend, PixelLayout,
        RawImage, TextBox,
    };
    pub use crate::driver::OcrDriver;
    pub use crate::pipeline::LocalBackend;
}
