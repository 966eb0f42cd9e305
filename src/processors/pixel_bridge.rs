//! Pixel-layout bridge between caller buffers and backend expectations.
//!
//! The bridge recognizes five raw layouts and a fixed table of single-step
//! conversions between them. Identity forwards the caller's buffer
//! unchanged, zero-copy. Pairs without a table entry fail with
//! [`DriverError::ConversionUnsupported`]; the bridge never chains two
//! conversions and never guesses.

use std::borrow::Cow;

use crate::core::errors::{DriverError, DriverResult};
use crate::core::types::{PixelLayout, RawImage};

/// Per-pixel conversion kernel: reads one source pixel, appends the target
/// pixel bytes.
type PixelFn = fn(&[u8], &mut Vec<u8>);

/// BT.601 luma from RGB-ordered channels.
#[inline]
fn luma(r: u8, g: u8, b: u8) -> u8 {
    ((299 * r as u32 + 587 * g as u32 + 114 * b as u32) / 1000) as u8
}

/// Looks up the fixed conversion table for an ordered layout pair.
///
/// Identity pairs are intentionally absent: they are handled before the
/// table is consulted and never cost a copy.
fn conversion(from: PixelLayout, to: PixelLayout) -> Option<PixelFn> {
    use PixelLayout::*;
    let f: PixelFn = match (from, to) {
        // Gray to color: replicate the single channel.
        (Gray, Rgb) | (Gray, Bgr) => |p, out| out.extend_from_slice(&[p[0], p[0], p[0]]),
        (Gray, Rgba) | (Gray, Bgra) => |p, out| out.extend_from_slice(&[p[0], p[0], p[0], 255]),

        // Three-channel to gray.
        (Rgb, Gray) => |p, out| out.push(luma(p[0], p[1], p[2])),
        (Bgr, Gray) => |p, out| out.push(luma(p[2], p[1], p[0])),

        // Three-channel order swap.
        (Rgb, Bgr) | (Bgr, Rgb) => |p, out| out.extend_from_slice(&[p[2], p[1], p[0]]),

        // Three-channel to four-channel.
        (Rgb, Rgba) | (Bgr, Bgra) => |p, out| out.extend_from_slice(&[p[0], p[1], p[2], 255]),
        (Rgb, Bgra) | (Bgr, Rgba) => |p, out| out.extend_from_slice(&[p[2], p[1], p[0], 255]),

        // Four-channel to gray.
        (Rgba, Gray) => |p, out| out.push(luma(p[0], p[1], p[2])),
        (Bgra, Gray) => |p, out| out.push(luma(p[2], p[1], p[0])),

        // Four-channel to three-channel.
        (Rgba, Rgb) | (Bgra, Bgr) => |p, out| out.extend_from_slice(&[p[0], p[1], p[2]]),
        (Rgba, Bgr) | (Bgra, Rgb) => |p, out| out.extend_from_slice(&[p[2], p[1], p[0]]),

        // Four-channel order swap.
        (Rgba, Bgra) | (Bgra, Rgba) => |p, out| out.extend_from_slice(&[p[2], p[1], p[0], p[3]]),

        _ => return None,
    };
    Some(f)
}

/// Whether the bridge can turn `from`-layout pixels into `to`-layout pixels.
pub fn supports(from: PixelLayout, to: PixelLayout) -> bool {
    from == to || conversion(from, to).is_some()
}

/// Converts a raw buffer into `target` layout.
///
/// Returns the caller's bytes untouched when the layouts already match;
/// otherwise a tightly packed buffer (`stride == width * channels`) produced
/// by exactly one table lookup. Fails with `ConversionUnsupported` when the
/// pair has no table entry.
pub fn convert<'a>(src: &RawImage<'a>, target: PixelLayout) -> DriverResult<Cow<'a, [u8]>> {
    src.validate()
        .map_err(|message| DriverError::InvalidInput { message })?;

    if src.layout == target {
        return Ok(Cow::Borrowed(src.data));
    }

    let Some(kernel) = conversion(src.layout, target) else {
        return Err(DriverError::ConversionUnsupported {
            from: src.layout,
            to: target,
        });
    };

    let in_ch = src.layout.channels();
    let out_len = src.width as usize * src.height as usize * target.channels();
    let mut out = Vec::with_capacity(out_len);
    for row in 0..src.height as usize {
        let base = row * src.stride;
        for col in 0..src.width as usize {
            let px = &src.data[base + col * in_ch..base + (col + 1) * in_ch];
            kernel(px, &mut out);
        }
    }
    Ok(Cow::Owned(out))
}
