//! ONNX Runtime implementation of the forward-pass engine.

use std::path::Path;
use std::sync::Mutex;

use ndarray::{ArrayD, ArrayView4, IxDyn};
use ort::execution_providers::{CUDAExecutionProvider, ExecutionProvider};
use ort::logging::LogLevel;
use ort::session::Session;
use ort::value::TensorRef;

use crate::core::errors::{DriverError, DriverResult};
use crate::inference::{Device, InferenceEngine, Network};

/// Engine backed by ONNX Runtime sessions.
///
/// The accelerator path uses the CUDA execution provider. A network bound to
/// an accelerator also keeps a CPU session so callers can route individual
/// forward passes to either device.
#[derive(Debug, Default)]
pub struct OrtEngine;

impl OrtEngine {
    /// Creates a new engine.
    pub fn new() -> Self {
        OrtEngine
    }

    fn build_session(path: &Path, device: Device) -> DriverResult<Session> {
        let builder = Session::builder()
            .and_then(|b| b.with_log_level(LogLevel::Error))
            .map_err(DriverError::inference)?;
        let builder = match device {
            Device::Cpu => builder,
            Device::Accelerator(index) => builder
                .with_execution_providers([CUDAExecutionProvider::default()
                    .with_device_id(index as i32)
                    .build()])
                .map_err(DriverError::inference)?,
        };
        builder.commit_from_file(path).map_err(DriverError::inference)
    }
}

impl InferenceEngine for OrtEngine {
    fn accelerator_count(&self) -> usize {
        match CUDAExecutionProvider::default().is_available() {
            Ok(true) => 1,
            _ => 0,
        }
    }

    fn load_network(&self, path: &Path, device: Device) -> DriverResult<Box<dyn Network>> {
        let cpu = Self::build_session(path, Device::Cpu)?;
        let accelerated = match device {
            Device::Cpu => None,
            Device::Accelerator(_) => Some(Mutex::new(Self::build_session(path, device)?)),
        };
        Ok(Box::new(OrtNetwork {
            cpu: Mutex::new(cpu),
            accelerated,
        }))
    }
}

/// One loaded ONNX model, with an optional accelerator-bound session.
struct OrtNetwork {
    cpu: Mutex<Session>,
    accelerated: Option<Mutex<Session>>,
}

impl OrtNetwork {
    fn run(session: &Mutex<Session>, input: ArrayView4<'_, f32>) -> DriverResult<ArrayD<f32>> {
        let mut guard = session.lock().map_err(|_| DriverError::InvalidInput {
            message: "inference session lock poisoned".to_string(),
        })?;

        let input_name = guard
            .inputs
            .first()
            .map(|i| i.name.clone())
            .ok_or_else(|| DriverError::InvalidInput {
                message: "model declares no inputs".to_string(),
            })?;
        let output_name = guard
            .outputs
            .first()
            .map(|o| o.name.clone())
            .ok_or_else(|| DriverError::InvalidInput {
                message: "model declares no outputs".to_string(),
            })?;

        let tensor = TensorRef::from_array_view(input).map_err(DriverError::inference)?;
        let outputs = guard
            .run(ort::inputs![input_name.as_str() => tensor])
            .map_err(DriverError::inference)?;

        let (shape, data) = outputs[output_name.as_str()]
            .try_extract_tensor::<f32>()
            .map_err(DriverError::inference)?;
        let dims: Vec<usize> = shape.iter().map(|&d| d.max(0) as usize).collect();
        ArrayD::from_shape_vec(IxDyn(&dims), data.to_vec()).map_err(DriverError::inference)
    }
}

impl Network for OrtNetwork {
    fn forward(
        &self,
        input: ArrayView4<'_, f32>,
        use_accelerator: bool,
    ) -> DriverResult<ArrayD<f32>> {
        match (&self.accelerated, use_accelerator) {
            (Some(session), true) => Self::run(session, input),
            _ => Self::run(&self.cpu, input),
        }
    }
}
