//! Core types, constants, errors, and the backend capability contract.

pub mod constants;
pub mod errors;
pub mod traits;
pub mod types;

pub use errors::{DriverError, DriverResult, LoadError};
pub use traits::OcrBackend;
pub use types::{HardwareAssignment, HardwareClass, PixelLayout, RawImage, TextBox};
