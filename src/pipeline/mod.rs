//! Local inference backend: the detect → order → crop → recognize → filter
//! pipeline behind the backend capability contract.
//!
//! State machine per instance: Idle → (analyze) → Running → Idle. One
//! `analyze` runs at a time (the pipeline state lock serializes callers);
//! `cancel` flips a shared atomic read at the checkpoints the stages expose.

pub mod config;
mod detection;
pub mod dict;
mod recognition;
pub mod resources;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use image::RgbImage;
use tracing::debug;

use crate::core::constants::DEFAULT_MODEL_ROOT;
use crate::core::errors::{DriverError, DriverResult};
use crate::core::traits::OcrBackend;
use crate::core::types::{HardwareAssignment, HardwareClass, PixelLayout, RawImage, TextBox};
use crate::inference::{Device, InferenceEngine, Network, OrtEngine};
use crate::processors::{crop_quad, normalize_quad, sort_reading_order};

use config::PipelineConfig;
use recognition::RecognizedLine;

/// Key/value names accepted by [`OcrBackend::set_value`].
const KEY_DET_THRESH: &str = "det.thresh";
const KEY_DET_BOX_THRESH: &str = "det.box_thresh";
const KEY_DET_UNCLIP_RATIO: &str = "det.unclip_ratio";

/// Lazily built network state, torn down whenever the config goes dirty.
struct NetworkState {
    detection: Box<dyn Network>,
    recognition: Box<dyn Network>,
    recognition_on_accelerator: bool,
    dictionary: Vec<String>,
}

/// Index-aligned recognition results for the last `analyze`.
#[derive(Default)]
struct ResultStore {
    text_boxes: Vec<TextBox>,
    char_boxes: Vec<Vec<TextBox>>,
    texts: Vec<String>,
    aggregate: String,
}

/// Everything `analyze` mutates, behind one lock.
struct PipelineState {
    config: PipelineConfig,
    networks: Option<NetworkState>,
    image: Option<RgbImage>,
    results: ResultStore,
}

/// The local two-stage recognition backend.
pub struct LocalBackend {
    engine: Box<dyn InferenceEngine>,
    model_root: Option<PathBuf>,
    state: Mutex<PipelineState>,
    dirty: AtomicBool,
    cancel: AtomicBool,
    analyzing: AtomicBool,
}

impl LocalBackend {
    /// Creates a backend with the ONNX Runtime engine and the model root
    /// resolved from the environment.
    pub fn new() -> Self {
        Self::with_engine(Box::new(OrtEngine::new()), resources::resolve_model_root())
    }

    /// Creates a backend over an explicit engine and model root.
    pub fn with_engine(engine: Box<dyn InferenceEngine>, model_root: Option<PathBuf>) -> Self {
        LocalBackend {
            engine,
            model_root,
            state: Mutex::new(PipelineState {
                config: PipelineConfig::default(),
                networks: None,
                image: None,
                results: ResultStore::default(),
            }),
            dirty: AtomicBool::new(false),
            cancel: AtomicBool::new(false),
            analyzing: AtomicBool::new(false),
        }
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, PipelineState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::SeqCst);
    }

    /// Rebuilds networks and dictionary for the current config.
    fn build_networks(&self, config: &PipelineConfig) -> DriverResult<NetworkState> {
        let Some(root) = self.model_root.as_ref() else {
            return Err(DriverError::ResourceMissing {
                path: PathBuf::from(DEFAULT_MODEL_ROOT),
            });
        };

        // Assignments referencing devices that do not exist are dropped.
        let available = self.engine.accelerator_count();
        let mut usable: Vec<u32> = config
            .hardware
            .iter()
            .filter(|a| a.class.is_accelerator() && (a.index as usize) < available)
            .map(|a| a.index)
            .collect();
        usable.sort_unstable();
        usable.dedup();

        let det_path = root.join("det.onnx");
        if !det_path.is_file() {
            return Err(DriverError::ResourceMissing { path: det_path });
        }
        // Detection is fast enough on the CPU; accelerator init time is
        // spent on recognition only.
        let detection = self.engine.load_network(&det_path, Device::Cpu)?;

        let rec_path = root.join(format!("rec_{}.onnx", config.language));
        if !rec_path.is_file() {
            return Err(DriverError::ResourceMissing { path: rec_path });
        }
        let rec_device = usable
            .first()
            .map(|&i| Device::Accelerator(i))
            .unwrap_or(Device::Cpu);
        let recognition = self.engine.load_network(&rec_path, rec_device)?;

        let dictionary = dict::load_dictionary(&root.join(format!("{}.txt", config.language)))?;

        debug!(
            "networks built: language={}, recognition device={:?}",
            config.language, rec_device
        );
        Ok(NetworkState {
            detection,
            recognition,
            recognition_on_accelerator: matches!(rec_device, Device::Accelerator(_)),
            dictionary,
        })
    }

    fn effective_thread_budget(config: &PipelineConfig) -> usize {
        let hardware = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        (config.max_threads.max(1) as usize).min(hardware)
    }

    fn run_pipeline(&self, state: &mut PipelineState) -> DriverResult<bool> {
        state.results = ResultStore::default();

        if self.dirty.swap(false, Ordering::SeqCst) {
            state.networks = None;
        }
        if state.networks.is_none() {
            state.networks = Some(self.build_networks(&state.config)?);
        }
        let Some(networks) = state.networks.as_ref() else {
            return Err(DriverError::InvalidInput {
                message: "network state unavailable".to_string(),
            });
        };
        let Some(image) = state.image.as_ref() else {
            return Err(DriverError::InvalidInput {
                message: "no input image set".to_string(),
            });
        };

        let mut boxes = detection::run_detection(
            networks.detection.as_ref(),
            image,
            &state.config.detection,
            &self.cancel,
        )?;

        sort_reading_order(&mut boxes);
        for text_box in &mut boxes {
            normalize_quad(text_box);
        }
        if self.cancel.load(Ordering::Relaxed) {
            boxes.clear();
        }

        let crops: Vec<RgbImage> = boxes.iter().map(|b| crop_quad(image, b)).collect();

        let slots: Vec<Option<RecognizedLine>> = if crops.is_empty() {
            Vec::new()
        } else {
            recognition::run_recognition(
                networks.recognition.as_ref(),
                &crops,
                &boxes,
                &networks.dictionary,
                Self::effective_thread_budget(&state.config),
                networks.recognition_on_accelerator,
                &self.cancel,
            )?
        };

        // A cancellation observed anywhere discards everything accumulated
        // for this call.
        if self.cancel.load(Ordering::SeqCst) {
            state.results = ResultStore::default();
            return Ok(false);
        }

        let mut aggregate = String::new();
        let mut texts = Vec::with_capacity(slots.len());
        let mut char_boxes = Vec::with_capacity(slots.len());
        for slot in slots {
            match slot {
                Some(line) => {
                    aggregate.push_str(&line.text);
                    texts.push(line.text);
                    char_boxes.push(line.char_boxes);
                }
                None => {
                    texts.push(String::new());
                    char_boxes.push(Vec::new());
                }
            }
            aggregate.push('\n');
        }

        // Drop boxes that recognized to nothing, keeping the three
        // sequences index-aligned.
        let mut kept_boxes = Vec::new();
        let mut kept_chars = Vec::new();
        let mut kept_texts = Vec::new();
        for ((text_box, chars), text) in boxes.into_iter().zip(char_boxes).zip(texts) {
            if !text.is_empty() {
                kept_boxes.push(text_box);
                kept_chars.push(chars);
                kept_texts.push(text);
            }
        }

        let found = !kept_boxes.is_empty();
        state.results = ResultStore {
            text_boxes: kept_boxes,
            char_boxes: kept_chars,
            texts: kept_texts,
            aggregate,
        };
        Ok(found)
    }
}

impl Default for LocalBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl OcrBackend for LocalBackend {
    fn hardware_support(&self) -> Vec<HardwareClass> {
        vec![HardwareClass::GpuNvidia, HardwareClass::CpuAny]
    }

    fn set_hardware(&self, assignments: &[HardwareAssignment]) -> DriverResult<()> {
        self.lock_state().config.hardware = assignments.to_vec();
        self.mark_dirty();
        Ok(())
    }

    fn set_max_threads(&self, count: u32) -> DriverResult<()> {
        self.lock_state().config.max_threads = count;
        self.mark_dirty();
        Ok(())
    }

    fn file_formats(&self) -> Vec<String> {
        ["BMP", "JPEG", "PNG", "PBM", "PGM", "PPM"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    fn set_image_file(&self, path: &Path) -> DriverResult<()> {
        let image = image::open(path)?.to_rgb8();
        self.lock_state().image = Some(image);
        Ok(())
    }

    fn pixel_layout(&self) -> Option<PixelLayout> {
        Some(PixelLayout::Rgb)
    }

    fn set_image_buffer(&self, raw: &RawImage<'_>) -> DriverResult<()> {
        if raw.layout != PixelLayout::Rgb {
            return Err(DriverError::InvalidInput {
                message: format!("expected Rgb buffer, got {:?}", raw.layout),
            });
        }
        raw.validate()
            .map_err(|message| DriverError::InvalidInput { message })?;

        let mut image = RgbImage::new(raw.width, raw.height);
        let row_len = raw.width as usize * 3;
        for y in 0..raw.height as usize {
            let src = &raw.data[y * raw.stride..y * raw.stride + row_len];
            for x in 0..raw.width as usize {
                let px = [src[x * 3], src[x * 3 + 1], src[x * 3 + 2]];
                image.put_pixel(x as u32, y as u32, image::Rgb(px));
            }
        }
        self.lock_state().image = Some(image);
        Ok(())
    }

    fn languages(&self) -> Vec<String> {
        ["zh-Hans_en", "zh-Hant_en", "en"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    fn set_language(&self, language: &str) -> DriverResult<()> {
        if !self.languages().iter().any(|l| l == language) {
            return Err(DriverError::InvalidInput {
                message: format!("unsupported language '{language}'"),
            });
        }
        self.lock_state().config.language = language.to_string();
        self.mark_dirty();
        Ok(())
    }

    fn set_value(&self, key: &str, value: &str) -> DriverResult<()> {
        let parsed: f32 = value.parse().map_err(|_| DriverError::InvalidInput {
            message: format!("value '{value}' for key '{key}' is not a number"),
        })?;
        let mut state = self.lock_state();
        match key {
            KEY_DET_THRESH => state.config.detection.thresh = parsed,
            KEY_DET_BOX_THRESH => state.config.detection.box_thresh = parsed,
            KEY_DET_UNCLIP_RATIO => state.config.detection.unclip_ratio = parsed,
            _ => {
                return Err(DriverError::InvalidInput {
                    message: format!("unknown key '{key}'"),
                });
            }
        }
        Ok(())
    }

    fn value(&self, key: &str) -> Option<String> {
        let state = self.lock_state();
        match key {
            KEY_DET_THRESH => Some(state.config.detection.thresh.to_string()),
            KEY_DET_BOX_THRESH => Some(state.config.detection.box_thresh.to_string()),
            KEY_DET_UNCLIP_RATIO => Some(state.config.detection.unclip_ratio.to_string()),
            _ => None,
        }
    }

    fn analyze(&self) -> DriverResult<bool> {
        let mut state = self.lock_state();
        self.analyzing.store(true, Ordering::SeqCst);
        let outcome = self.run_pipeline(&mut state);
        self.analyzing.store(false, Ordering::SeqCst);
        self.cancel.store(false, Ordering::SeqCst);
        outcome
    }

    fn cancel(&self) -> bool {
        if !self.analyzing.load(Ordering::SeqCst) {
            return false;
        }
        !self.cancel.swap(true, Ordering::SeqCst)
    }

    fn text_boxes(&self) -> Vec<TextBox> {
        self.lock_state().results.text_boxes.clone()
    }

    fn char_boxes(&self, index: usize) -> Vec<TextBox> {
        self.lock_state()
            .results
            .char_boxes
            .get(index)
            .cloned()
            .unwrap_or_default()
    }

    fn all_text(&self) -> String {
        self.lock_state().results.aggregate.clone()
    }

    fn box_text(&self, index: usize) -> String {
        self.lock_state()
            .results
            .texts
            .get(index)
            .cloned()
            .unwrap_or_default()
    }
}
