//! Detection stage: resize, forward pass, binarization, box extraction.

use std::sync::atomic::{AtomicBool, Ordering};

use image::imageops::FilterType;
use image::{GrayImage, RgbImage};
use imageproc::distance_transform::Norm;
use imageproc::morphology::dilate;
use ndarray::{Array2, Array4};

use crate::core::constants::{
    DET_LIMIT_SIDE_MAX, DET_LIMIT_SIDE_MIN, DET_MEAN, DET_STD_INV, DET_STRIDE,
};
use crate::core::errors::{DriverError, DriverResult};
use crate::core::types::TextBox;
use crate::inference::Network;
use crate::pipeline::config::DetectionParams;
use crate::processors::boxes_from_bitmap;

/// Input dimensions chosen for the detection network, with the scale
/// factors needed to map box coordinates back to source space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct ResizePlan {
    pub width: u32,
    pub height: u32,
    pub ratio_w: f32,
    pub ratio_h: f32,
}

/// Plans the detection resize for a source image.
///
/// The longer side is capped at [`DET_LIMIT_SIDE_MAX`], the shorter side is
/// floored at [`DET_LIMIT_SIDE_MIN`], and both results are rounded to the
/// nearest multiple of [`DET_STRIDE`] as the network architecture requires.
/// Width and height ratios are recorded independently.
pub(crate) fn plan_resize(width: u32, height: u32) -> ResizePlan {
    let (w, h) = (width as f32, height as f32);

    let shrink = if w.max(h) > DET_LIMIT_SIDE_MAX as f32 {
        DET_LIMIT_SIDE_MAX as f32 / w.max(h)
    } else {
        1.0
    };
    let mut resize_w = w * shrink;
    let mut resize_h = h * shrink;

    let grow = if resize_w.min(resize_h) < DET_LIMIT_SIDE_MIN as f32 {
        DET_LIMIT_SIDE_MIN as f32 / resize_w.min(resize_h)
    } else {
        1.0
    };
    resize_w *= grow;
    resize_h *= grow;

    let stride = DET_STRIDE as f32;
    let width_out = ((resize_w / stride).round().max(1.0) * stride) as u32;
    let height_out = ((resize_h / stride).round().max(1.0) * stride) as u32;

    ResizePlan {
        width: width_out,
        height: height_out,
        ratio_w: width_out as f32 / w,
        ratio_h: height_out as f32 / h,
    }
}

/// Converts an RGB image into a normalized `(1, 3, H, W)` tensor.
fn to_input_tensor(img: &RgbImage) -> Array4<f32> {
    let (width, height) = img.dimensions();
    let mut tensor = Array4::zeros((1, 3, height as usize, width as usize));
    for (x, y, pixel) in img.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, c, y as usize, x as usize]] =
                (pixel[c] as f32 - DET_MEAN[c]) * DET_STD_INV[c];
        }
    }
    tensor
}

/// Pulls the probability map out of the detection output tensor.
fn probability_map(output: ndarray::ArrayD<f32>) -> DriverResult<Array2<f32>> {
    let shape = output.shape().to_vec();
    let (h, w) = match shape.as_slice() {
        [.., h, w] => (*h, *w),
        _ => {
            return Err(DriverError::InvalidInput {
                message: format!("unexpected detection output shape {shape:?}"),
            });
        }
    };
    let flat: Vec<f32> = output.iter().copied().take(h * w).collect();
    Array2::from_shape_vec((h, w), flat).map_err(DriverError::inference)
}

/// Runs detection over `image` and returns candidate boxes in source-image
/// space, unordered.
///
/// Cancellation is checked after the resize decision, the forward pass,
/// binarization, and extraction; a positive check abandons the stage and
/// returns no boxes.
pub(crate) fn run_detection(
    net: &dyn Network,
    image: &RgbImage,
    params: &DetectionParams,
    cancel: &AtomicBool,
) -> DriverResult<Vec<TextBox>> {
    let (src_w, src_h) = image.dimensions();
    let plan = plan_resize(src_w, src_h);
    if cancel.load(Ordering::Relaxed) {
        return Ok(Vec::new());
    }

    let resized = image::imageops::resize(image, plan.width, plan.height, FilterType::Triangle);
    let input = to_input_tensor(&resized);

    // Detection stays on the general-purpose processor; the accelerator is
    // reserved for the recognition network.
    let output = net.forward(input.view(), false)?;
    if cancel.load(Ordering::Relaxed) {
        return Ok(Vec::new());
    }

    let prob = probability_map(output)?;
    let (map_h, map_w) = (prob.shape()[0], prob.shape()[1]);
    let mut bitmap = GrayImage::new(map_w as u32, map_h as u32);
    for y in 0..map_h {
        for x in 0..map_w {
            if prob[[y, x]] > params.thresh {
                bitmap.put_pixel(x as u32, y as u32, image::Luma([255]));
            }
        }
    }
    if cancel.load(Ordering::Relaxed) {
        return Ok(Vec::new());
    }

    // Small fixed dilation merges fragmented regions of one text line.
    let mask = dilate(&bitmap, Norm::LInf, 1);

    let extracted = boxes_from_bitmap(&prob, &mask, params.box_thresh, params.unclip_ratio);
    if cancel.load(Ordering::Relaxed) {
        return Ok(Vec::new());
    }

    // Back to source-image space using the two independent scale factors.
    let boxes = extracted
        .into_iter()
        .map(|b| {
            let mut out = b;
            for point in &mut out.points {
                point.0 = (point.0 / plan.ratio_w).clamp(0.0, src_w as f32 - 1.0);
                point.1 = (point.1 / plan.ratio_h).clamp(0.0, src_h as f32 - 1.0);
            }
            out
        })
        .collect();
    Ok(boxes)
}
