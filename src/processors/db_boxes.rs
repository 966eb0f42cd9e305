//! Candidate-box extraction from a binarized detection map.
//!
//! Input contract: a probability map and a binarized (already dilated) mask
//! of the same dimensions, both in network-input space. Output contract:
//! axis-aligned quadrilaterals in network-input space, one per connected
//! region whose mean probability clears the confidence threshold, each
//! expanded by the unclip ratio and clamped to the map bounds. Callers
//! rescale the coordinates to source-image space themselves.

use image::{GrayImage, Luma};
use imageproc::region_labelling::{connected_components, Connectivity};
use ndarray::Array2;

use crate::core::types::TextBox;

/// Regions with a side shorter than this many map pixels are noise.
const MIN_BOX_SIZE: f32 = 3.0;

/// Upper bound on regions considered in one map.
const MAX_CANDIDATES: usize = 1000;

/// Axis-aligned accumulator for one labelled region.
#[derive(Debug, Clone)]
struct Region {
    x_min: u32,
    y_min: u32,
    x_max: u32,
    y_max: u32,
    pixels: u32,
    prob_sum: f32,
}

/// Extracts candidate text quadrilaterals from `mask`, scoring each region
/// against `prob`.
///
/// `box_thresh` is the independent confidence threshold on the region's mean
/// probability; `unclip_ratio` controls how far each box is grown beyond the
/// shrunk region the network predicts.
pub fn boxes_from_bitmap(
    prob: &Array2<f32>,
    mask: &GrayImage,
    box_thresh: f32,
    unclip_ratio: f32,
) -> Vec<TextBox> {
    let (width, height) = mask.dimensions();
    if width == 0 || height == 0 {
        return Vec::new();
    }

    let labelled = connected_components(mask, Connectivity::Eight, Luma([0u8]));

    let mut regions: Vec<Option<Region>> = Vec::new();
    for y in 0..height {
        for x in 0..width {
            let label = labelled.get_pixel(x, y)[0] as usize;
            if label == 0 {
                continue;
            }
            if label > regions.len() {
                regions.resize(label, None);
            }
            let p = prob[[y as usize, x as usize]];
            let slot = &mut regions[label - 1];
            match slot {
                Some(region) => {
                    region.x_min = region.x_min.min(x);
                    region.y_min = region.y_min.min(y);
                    region.x_max = region.x_max.max(x);
                    region.y_max = region.y_max.max(y);
                    region.pixels += 1;
                    region.prob_sum += p;
                }
                None => {
                    *slot = Some(Region {
                        x_min: x,
                        y_min: y,
                        x_max: x,
                        y_max: y,
                        pixels: 1,
                        prob_sum: p,
                    });
                }
            }
        }
    }

    let mut boxes = Vec::new();
    for region in regions.into_iter().flatten().take(MAX_CANDIDATES) {
        let w = (region.x_max - region.x_min + 1) as f32;
        let h = (region.y_max - region.y_min + 1) as f32;
        if w < MIN_BOX_SIZE || h < MIN_BOX_SIZE {
            continue;
        }

        let score = region.prob_sum / region.pixels as f32;
        if score < box_thresh {
            continue;
        }

        // Grow the shrunk region back out: offset = area * ratio / perimeter.
        let offset = w * h * unclip_ratio / (2.0 * (w + h));
        let x_min = (region.x_min as f32 - offset).max(0.0);
        let y_min = (region.y_min as f32 - offset).max(0.0);
        let x_max = (region.x_max as f32 + offset).min(width as f32 - 1.0);
        let y_max = (region.y_max as f32 + offset).min(height as f32 - 1.0);

        boxes.push(TextBox::from_rect(x_min, y_min, x_max, y_max));
    }

    boxes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture(width: u32, height: u32, blocks: &[(u32, u32, u32, u32, f32)]) -> (Array2<f32>, GrayImage) {
        let mut prob = Array2::zeros((height as usize, width as usize));
        let mut mask = GrayImage::new(width, height);
        for &(x0, y0, x1, y1, p) in blocks {
            for y in y0..=y1 {
                for x in x0..=x1 {
                    prob[[y as usize, x as usize]] = p;
                    mask.put_pixel(x, y, Luma([255]));
                }
            }
        }
        (prob, mask)
    }

    #[test]
    fn extracts_one_box_per_region() {
        let (prob, mask) = fixture(64, 64, &[(4, 4, 20, 10, 0.9), (4, 30, 20, 36, 0.9)]);
        let boxes = boxes_from_bitmap(&prob, &mask, 0.5, 1.6);
        assert_eq!(boxes.len(), 2);

        // Expansion keeps the region inside the box.
        assert!(boxes[0].left() <= 4.0 && boxes[0].right() >= 20.0);
        assert!(boxes[0].top() <= 4.0 && boxes[0].bottom() >= 10.0);
    }

    #[test]
    fn low_confidence_regions_are_dropped() {
        let (prob, mask) = fixture(64, 64, &[(4, 4, 20, 10, 0.3)]);
        let boxes = boxes_from_bitmap(&prob, &mask, 0.5, 1.6);
        assert!(boxes.is_empty());
    }

    #[test]
    fn tiny_regions_are_noise() {
        let (prob, mask) = fixture(64, 64, &[(4, 4, 5, 5, 0.9)]);
        let boxes = boxes_from_bitmap(&prob, &mask, 0.5, 1.6);
        assert!(boxes.is_empty());
    }

    #[test]
    fn boxes_stay_inside_the_map() {
        let (prob, mask) = fixture(32, 32, &[(0, 0, 31, 8, 1.0)]);
        let boxes = boxes_from_bitmap(&prob, &mask, 0.5, 3.0);
        assert_eq!(boxes.len(), 1);
        assert!(boxes[0].left() >= 0.0);
        assert!(boxes[0].top() >= 0.0);
        assert!(boxes[0].right() <= 31.0);
        assert!(boxes[0].bottom() <= 31.0);
    }

    #[test]
    fn empty_mask_yields_no_boxes() {
        let prob = Array2::zeros((16, 16));
        let mask = GrayImage::new(16, 16);
        assert!(boxes_from_bitmap(&prob, &mask, 0.5, 1.6).is_empty());
    }
}
