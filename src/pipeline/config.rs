//! Pipeline configuration owned by the local backend.

use serde::{Deserialize, Serialize};

use crate::core::constants::{DET_DB_BOX_THRESH, DET_DB_THRESH, DET_UNCLIP_RATIO};
use crate::core::types::HardwareAssignment;

/// Detection post-processing tuning.
///
/// These three values strongly influence which candidate boxes survive and
/// therefore what the recognition stage sees.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DetectionParams {
    /// Threshold for binarizing the probability map.
    pub thresh: f32,
    /// Independent confidence threshold for keeping an extracted box.
    pub box_thresh: f32,
    /// Boundary-expansion ratio applied to extracted boxes.
    pub unclip_ratio: f32,
}

impl Default for DetectionParams {
    fn default() -> Self {
        DetectionParams {
            thresh: DET_DB_THRESH,
            box_thresh: DET_DB_BOX_THRESH,
            unclip_ratio: DET_UNCLIP_RATIO,
        }
    }
}

/// Mutable pipeline configuration.
///
/// Mutated only through the backend's setters; every mutation that affects
/// network state sets the dirty flag so the next `analyze` rebuilds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Selected recognition language.
    pub language: String,
    /// Requested hardware bindings, in caller preference order.
    pub hardware: Vec<HardwareAssignment>,
    /// Maximum recognition worker count; clamped to available parallelism
    /// at build time, minimum 1.
    pub max_threads: u32,
    /// Detection tuning, adjustable through the key/value interface.
    pub detection: DetectionParams,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            language: "zh-Hans_en".to_string(),
            hardware: Vec::new(),
            max_threads: 1,
            detection: DetectionParams::default(),
        }
    }
}
