//! Reading-order sorting and quadrilateral normalization for detected boxes.
//!
//! Boxes are grouped into horizontal bands: two boxes share a band when the
//! vertical overlap of their spans exceeds two thirds of the shorter box's
//! height. Bands order top to bottom; within a band boxes order left to
//! right. This matches left-to-right scripts only; right-to-left ordering is
//! a known gap.

use std::cmp::Ordering;

use crate::core::types::TextBox;

/// Fraction of the shorter box's height that the vertical overlap must
/// exceed for two boxes to share a band.
const SAME_BAND_OVERLAP: f32 = 2.0 / 3.0;

fn cmp_f32(a: f32, b: f32) -> Ordering {
    a.partial_cmp(&b).unwrap_or(Ordering::Equal)
}

/// Compares two boxes in reading order.
///
/// Same-band boxes order left to right (detector jitter keeps their top
/// edges from being reliable); different-band boxes order by ascending top
/// edge. Remaining comparisons fall through to the other axis so the sort
/// is deterministic.
pub fn reading_order(a: &TextBox, b: &TextBox) -> Ordering {
    let overlap = a.bottom().min(b.bottom()) - a.top().max(b.top());
    let shorter = a.height().min(b.height());

    if overlap > shorter * SAME_BAND_OVERLAP {
        cmp_f32(a.left(), b.left()).then_with(|| cmp_f32(a.top(), b.top()))
    } else {
        cmp_f32(a.top(), b.top()).then_with(|| cmp_f32(a.left(), b.left()))
    }
}

/// Sorts boxes into reading order in place.
pub fn sort_reading_order(boxes: &mut [TextBox]) {
    boxes.sort_by(reading_order);
}

/// Squares up a quadrilateral against small detector jitter.
///
/// Both top corners take the smaller y, both bottom corners the larger y,
/// both left corners the smaller x, both right corners the larger x. True
/// rotation is lost; the angle is recorded as zero.
pub fn normalize_quad(quad: &mut TextBox) {
    let [tl, tr, br, bl] = quad.points;

    let top = tl.1.min(tr.1);
    let bottom = br.1.max(bl.1);
    let left = tl.0.min(bl.0);
    let right = tr.0.max(br.0);

    quad.points = [(left, top), (right, top), (right, bottom), (left, bottom)];
    quad.angle = 0.0;
}
