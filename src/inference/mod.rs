//! Forward-pass engine abstraction.
//!
//! The pipeline treats the neural network engine as a black box: it hands a
//! `(1, C, H, W)` float tensor to a [`Network`] and gets a tensor back. The
//! shipped implementation is [`OrtEngine`]; tests substitute stubs.

pub mod ort_engine;

use std::path::Path;

use ndarray::{ArrayD, ArrayView4};

use crate::core::errors::DriverResult;

pub use ort_engine::OrtEngine;

/// Device a network is bound to when it is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Device {
    /// General-purpose processor.
    Cpu,
    /// Accelerator device with the given index.
    Accelerator(u32),
}

/// A loaded network able to run forward passes.
pub trait Network: Send + Sync {
    /// Runs one forward pass.
    ///
    /// `use_accelerator` asks for the accelerator dispatch path when the
    /// network was built for one; networks bound to the CPU ignore it.
    fn forward(&self, input: ArrayView4<'_, f32>, use_accelerator: bool)
        -> DriverResult<ArrayD<f32>>;
}

/// Factory for loaded networks plus accelerator discovery.
pub trait InferenceEngine: Send + Sync {
    /// Number of accelerator devices actually available.
    fn accelerator_count(&self) -> usize;

    /// Loads the model at `path` bound to `device`.
    fn load_network(&self, path: &Path, device: Device) -> DriverResult<Box<dyn Network>>;
}
