//! Quadrilateral cropping into upright sub-images.
//!
//! Input contract: a source image and four corner points in top-left,
//! top-right, bottom-right, bottom-left order. Output contract: an upright
//! image whose width/height match the quadrilateral's longer edge pair,
//! resampled bilinearly. Out-of-bounds samples read as black.

use image::{Rgb, RgbImage};

use crate::core::types::TextBox;

fn distance(a: (f32, f32), b: (f32, f32)) -> f32 {
    ((a.0 - b.0).powi(2) + (a.1 - b.1).powi(2)).sqrt()
}

/// Bilinear sample with zero fill outside the image.
fn sample(img: &RgbImage, x: f32, y: f32) -> Rgb<u8> {
    let (w, h) = img.dimensions();
    if x < 0.0 || y < 0.0 || x > (w - 1) as f32 || y > (h - 1) as f32 {
        return Rgb([0, 0, 0]);
    }
    let x0 = x.floor() as u32;
    let y0 = y.floor() as u32;
    let x1 = (x0 + 1).min(w - 1);
    let y1 = (y0 + 1).min(h - 1);
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let mut out = [0u8; 3];
    for c in 0..3 {
        let top = img.get_pixel(x0, y0)[c] as f32 * (1.0 - fx) + img.get_pixel(x1, y0)[c] as f32 * fx;
        let bottom =
            img.get_pixel(x0, y1)[c] as f32 * (1.0 - fx) + img.get_pixel(x1, y1)[c] as f32 * fx;
        out[c] = (top * (1.0 - fy) + bottom * fy).round().clamp(0.0, 255.0) as u8;
    }
    Rgb(out)
}

/// Crops the quadrilateral out of `src` into an independent upright image.
pub fn crop_quad(src: &RgbImage, quad: &TextBox) -> RgbImage {
    let [tl, tr, br, bl] = quad.points;

    let dst_w = distance(tl, tr).max(distance(bl, br)).round().max(1.0) as u32;
    let dst_h = distance(tl, bl).max(distance(tr, br)).round().max(1.0) as u32;

    let mut out = RgbImage::new(dst_w, dst_h);
    let w_div = (dst_w.max(2) - 1) as f32;
    let h_div = (dst_h.max(2) - 1) as f32;

    for y in 0..dst_h {
        let v = y as f32 / h_div;
        // Edge points on the left and right sides at this row.
        let left = (tl.0 + (bl.0 - tl.0) * v, tl.1 + (bl.1 - tl.1) * v);
        let right = (tr.0 + (br.0 - tr.0) * v, tr.1 + (br.1 - tr.1) * v);
        for x in 0..dst_w {
            let u = x as f32 / w_div;
            let sx = left.0 + (right.0 - left.0) * u;
            let sy = left.1 + (right.1 - left.1) * u;
            out.put_pixel(x, y, sample(src, sx, sy));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient_image(w: u32, h: u32) -> RgbImage {
        RgbImage::from_fn(w, h, |x, y| Rgb([x as u8, y as u8, 0]))
    }

    #[test]
    fn axis_aligned_crop_matches_subimage() {
        let src = gradient_image(64, 64);
        let quad = TextBox::from_rect(10.0, 20.0, 30.0, 28.0);
        let out = crop_quad(&src, &quad);
        assert_eq!(out.dimensions(), (20, 8));
        assert_eq!(out.get_pixel(0, 0), &Rgb([10, 20, 0]));
        assert_eq!(out.get_pixel(19, 7), &Rgb([30, 28, 0]));
    }

    #[test]
    fn degenerate_quad_still_produces_an_image() {
        let src = gradient_image(8, 8);
        let quad = TextBox::from_rect(3.0, 3.0, 3.0, 3.0);
        let out = crop_quad(&src, &quad);
        assert_eq!(out.dimensions(), (1, 1));
    }

    #[test]
    fn out_of_bounds_samples_read_black() {
        let src = gradient_image(8, 8);
        let quad = TextBox::from_rect(-4.0, -4.0, 3.0, 3.0);
        let out = crop_quad(&src, &quad);
        assert_eq!(out.get_pixel(0, 0), &Rgb([0, 0, 0]));
    }
}
