//! Recognition stage: per-crop resize, forward pass, CTC decode, and
//! character-box reconstruction, fanned out over a bounded worker pool.

use std::sync::atomic::{AtomicBool, Ordering};

use image::imageops::FilterType;
use image::{Rgb, RgbImage};
use ndarray::{Array4, ArrayView2};
use rayon::prelude::*;
use tracing::error;

use crate::core::constants::{REC_DOWNSAMPLE, REC_IMAGE_HEIGHT, REC_PAD_FILL};
use crate::core::errors::{DriverError, DriverResult};
use crate::core::types::TextBox;
use crate::inference::Network;

/// Decoded output for one cropped text line.
#[derive(Debug, Clone)]
pub(crate) struct RecognizedLine {
    /// Concatenated symbols.
    pub text: String,
    /// One box per decoded symbol, in source-image space.
    pub char_boxes: Vec<TextBox>,
}

/// Resizes a crop to the fixed recognition height and pads it to the
/// rounded-up width with the neutral fill.
///
/// Returns the `(1, 3, H, W)` input tensor and the effective resize ratio
/// (padded width over crop width) used for geometry reconstruction.
fn prepare_input(crop: &RgbImage) -> (Array4<f32>, f32) {
    let (crop_w, crop_h) = crop.dimensions();
    let aspect = crop_w as f32 / crop_h.max(1) as f32;
    let scaled = REC_IMAGE_HEIGHT as f32 * aspect;
    let resized_w = (scaled.floor() as u32).max(1);
    let target_w = (scaled.ceil() as u32).max(1);

    let resized = image::imageops::resize(crop, resized_w, REC_IMAGE_HEIGHT, FilterType::Triangle);
    let mut padded = RgbImage::from_pixel(
        target_w,
        REC_IMAGE_HEIGHT,
        Rgb([REC_PAD_FILL, REC_PAD_FILL, REC_PAD_FILL]),
    );
    image::imageops::replace(&mut padded, &resized, 0, 0);

    let mut tensor = Array4::zeros((1, 3, REC_IMAGE_HEIGHT as usize, target_w as usize));
    for (x, y, pixel) in padded.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, c, y as usize, x as usize]] = (pixel[c] as f32 - 127.5) / 127.5;
        }
    }

    let ratio = target_w as f32 / crop_w.max(1) as f32;
    (tensor, ratio)
}

/// Greedy CTC decode of a `(timesteps, symbols)` probability sequence.
///
/// Each timestep contributes its maximum-probability index; consecutive
/// identical indices collapse into one emission, and index 0 (the reserved
/// blank) is never emitted. Returns `(dictionary index, run length)` per
/// emission, where the run length counts the consecutive timesteps of the
/// run including its first.
pub(crate) fn ctc_greedy_decode(probs: ArrayView2<'_, f32>) -> Vec<(usize, usize)> {
    let mut emissions = Vec::new();
    let mut previous: Option<usize> = None;
    let mut run = 0usize;

    for row in probs.outer_iter() {
        let index = row
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(i, _)| i)
            .unwrap_or(0);

        if previous == Some(index) {
            run += 1;
        } else {
            if let Some(prev) = previous {
                if prev != 0 {
                    emissions.push((prev, run));
                }
            }
            previous = Some(index);
            run = 1;
        }
    }
    if let Some(prev) = previous {
        if prev != 0 {
            emissions.push((prev, run));
        }
    }
    emissions
}

/// Walks the run-length sequence into one box per decoded symbol.
///
/// Boxes start at the text box's top-left corner and share its height; each
/// symbol's horizontal span is its run length scaled by the recognition
/// network's temporal downsampling factor over the effective resize ratio.
fn run_lengths_to_boxes(runs: &[usize], text_box: &TextBox, ratio: f32) -> Vec<TextBox> {
    let (base_x, top) = text_box.points[0];
    let bottom = top + text_box.height();

    let mut boxes = Vec::with_capacity(runs.len());
    let mut cursor = base_x;
    for &run in runs {
        let span = run as f32 * REC_DOWNSAMPLE / ratio;
        boxes.push(TextBox {
            points: [
                (cursor, top),
                (cursor + span, top),
                (cursor + span, bottom),
                (cursor, bottom),
            ],
            angle: 0.0,
        });
        cursor += span;
    }
    boxes
}

/// Recognizes a single crop.
fn recognize_crop(
    net: &dyn Network,
    crop: &RgbImage,
    text_box: &TextBox,
    dictionary: &[String],
    use_accelerator: bool,
) -> DriverResult<RecognizedLine> {
    let (input, ratio) = prepare_input(crop);
    let output = net.forward(input.view(), use_accelerator)?;

    let shape = output.shape().to_vec();
    let (steps, symbols) = match shape.as_slice() {
        [.., t, c] => (*t, *c),
        _ => {
            return Err(DriverError::InvalidInput {
                message: format!("unexpected recognition output shape {shape:?}"),
            });
        }
    };
    let flat: Vec<f32> = output.iter().copied().take(steps * symbols).collect();
    let probs = ndarray::Array2::from_shape_vec((steps, symbols), flat)
        .map_err(DriverError::inference)?;

    let emissions = ctc_greedy_decode(probs.view());
    let mut text = String::new();
    let mut runs = Vec::with_capacity(emissions.len());
    for (index, run) in emissions {
        if let Some(symbol) = dictionary.get(index) {
            text.push_str(symbol);
            runs.push(run);
        }
    }

    let char_boxes = run_lengths_to_boxes(&runs, text_box, ratio);
    Ok(RecognizedLine { text, char_boxes })
}

/// Runs recognition over all crops on a pool sized to `budget` workers.
///
/// Results land in slots addressed by detection index, so output order
/// matches detection order regardless of completion order. At most one
/// worker per call dispatches on the accelerator; the rest take the CPU
/// path. A worker observing cancellation leaves its slot empty while its
/// siblings continue.
pub(crate) fn run_recognition(
    net: &dyn Network,
    crops: &[RgbImage],
    boxes: &[TextBox],
    dictionary: &[String],
    budget: usize,
    accelerator_bound: bool,
    cancel: &AtomicBool,
) -> DriverResult<Vec<Option<RecognizedLine>>> {
    let budget = budget.max(1);
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(budget)
        .build()
        .map_err(DriverError::inference)?;

    let slots = pool.install(|| {
        crops
            .par_iter()
            .zip(boxes.par_iter())
            .enumerate()
            .map(|(index, (crop, text_box))| {
                if cancel.load(Ordering::Relaxed) {
                    return None;
                }
                let use_accelerator = accelerator_bound && (budget == 1 || index % budget == 1);
                match recognize_crop(net, crop, text_box, dictionary, use_accelerator) {
                    Ok(line) => Some(line),
                    Err(err) => {
                        error!("recognition failed for box {index}: {err}");
                        None
                    }
                }
            })
            .collect()
    });

    Ok(slots)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn probs_from_indices(indices: &[usize], symbols: usize) -> Array2<f32> {
        let mut probs = Array2::zeros((indices.len(), symbols));
        for (t, &idx) in indices.iter().enumerate() {
            probs[[t, idx]] = 1.0;
        }
        probs
    }

    #[test]
    fn repeated_indices_collapse_to_one_emission() {
        // Five identical nonzero timesteps then a change.
        let probs = probs_from_indices(&[2, 2, 2, 2, 2, 1], 4);
        let emissions = ctc_greedy_decode(probs.view());
        assert_eq!(emissions, vec![(2, 5), (1, 1)]);
    }

    #[test]
    fn blanks_are_never_emitted() {
        let probs = probs_from_indices(&[0, 0, 1, 0, 0], 4);
        let emissions = ctc_greedy_decode(probs.view());
        assert_eq!(emissions, vec![(1, 1)]);
    }

    #[test]
    fn blank_separates_repeated_symbols() {
        let probs = probs_from_indices(&[1, 0, 1], 4);
        let emissions = ctc_greedy_decode(probs.view());
        assert_eq!(emissions, vec![(1, 1), (1, 1)]);
    }

    #[test]
    fn all_blank_sequence_is_empty() {
        let probs = probs_from_indices(&[0, 0, 0], 4);
        assert!(ctc_greedy_decode(probs.view()).is_empty());
    }

    #[test]
    fn run_lengths_allocate_proportional_spans() {
        let text_box = TextBox::from_rect(10.0, 20.0, 110.0, 40.0);
        let boxes = run_lengths_to_boxes(&[2, 1], &text_box, 2.0);
        assert_eq!(boxes.len(), 2);

        // First symbol: 2 * 4 / 2 = 4 wide, starting at the box corner.
        assert_eq!(boxes[0].points[0], (10.0, 20.0));
        assert_eq!(boxes[0].points[1].0, 14.0);
        assert_eq!(boxes[0].height(), 20.0);

        // Second symbol starts where the first ended.
        assert_eq!(boxes[1].points[0].0, 14.0);
        assert_eq!(boxes[1].points[1].0, 16.0);
    }

    #[test]
    fn prepare_input_pads_to_rounded_width() {
        let crop = RgbImage::from_pixel(100, 40, Rgb([0, 0, 0]));
        let (tensor, ratio) = prepare_input(&crop);
        // 32 * 100/40 = 80 exactly.
        assert_eq!(tensor.shape(), &[1, 3, 32, 80]);
        assert!((ratio - 0.8).abs() < 1e-6);

        let crop = RgbImage::from_pixel(101, 40, Rgb([0, 0, 0]));
        let (tensor, _) = prepare_input(&crop);
        // 32 * 101/40 = 80.8 rounds up to 81.
        assert_eq!(tensor.shape(), &[1, 3, 32, 81]);
    }
}
