//! Core domain types shared by the driver, the bridge, and the pipeline.

use serde::{Deserialize, Serialize};

/// A detected text region: four corner points plus a rotation angle.
///
/// Points are stored in reading order after normalization: top-left,
/// top-right, bottom-right, bottom-left. `angle` is in degrees and stays
/// `0.0` when rotation is not computed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextBox {
    /// Corner points as `(x, y)` pairs in source-image space.
    pub points: [(f32, f32); 4],
    /// Rotation angle in degrees; `0.0` when unavailable.
    pub angle: f32,
}

impl TextBox {
    /// Builds an axis-aligned box from its bounding coordinates.
    pub fn from_rect(x_min: f32, y_min: f32, x_max: f32, y_max: f32) -> Self {
        TextBox {
            points: [
                (x_min, y_min),
                (x_max, y_min),
                (x_max, y_max),
                (x_min, y_max),
            ],
            angle: 0.0,
        }
    }

    /// Smallest y among the four corners (top edge).
    pub fn top(&self) -> f32 {
        self.points
            .iter()
            .map(|p| p.1)
            .fold(f32::INFINITY, f32::min)
    }

    /// Largest y among the four corners (bottom edge).
    pub fn bottom(&self) -> f32 {
        self.points
            .iter()
            .map(|p| p.1)
            .fold(f32::NEG_INFINITY, f32::max)
    }

    /// Smallest x among the four corners (left edge).
    pub fn left(&self) -> f32 {
        self.points
            .iter()
            .map(|p| p.0)
            .fold(f32::INFINITY, f32::min)
    }

    /// Largest x among the four corners (right edge).
    pub fn right(&self) -> f32 {
        self.points
            .iter()
            .map(|p| p.0)
            .fold(f32::NEG_INFINITY, f32::max)
    }

    /// Vertical extent of the box.
    pub fn height(&self) -> f32 {
        self.bottom() - self.top()
    }
}

/// Hardware classes a backend may advertise, most specialized first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HardwareClass {
    /// Online backend requiring network access.
    Network,
    /// Any general-purpose processor.
    CpuAny,
    /// AArch64 processors.
    CpuAarch64,
    /// Any accelerator device.
    GpuAny,
    /// Vulkan-capable accelerator.
    GpuVulkan,
    /// NVIDIA accelerator.
    GpuNvidia,
    /// AMD accelerator.
    GpuAmd,
}

impl HardwareClass {
    /// Whether this class names an accelerator rather than a CPU.
    pub fn is_accelerator(self) -> bool {
        matches!(
            self,
            HardwareClass::GpuAny
                | HardwareClass::GpuVulkan
                | HardwareClass::GpuNvidia
                | HardwareClass::GpuAmd
        )
    }
}

/// A requested hardware binding: device class plus device index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardwareAssignment {
    /// Class of the device.
    pub class: HardwareClass,
    /// Index of the device within its class.
    pub index: u32,
}

/// Raw pixel layouts recognized by the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PixelLayout {
    /// 8-bit single-channel gray.
    Gray,
    /// 8-bit three-channel, red first.
    Rgb,
    /// 8-bit three-channel, blue first.
    Bgr,
    /// 8-bit four-channel, red first.
    Rgba,
    /// 8-bit four-channel, blue first.
    Bgra,
}

impl PixelLayout {
    /// Bytes per pixel in this layout.
    pub fn channels(self) -> usize {
        match self {
            PixelLayout::Gray => 1,
            PixelLayout::Rgb | PixelLayout::Bgr => 3,
            PixelLayout::Rgba | PixelLayout::Bgra => 4,
        }
    }
}

/// Borrowed view of a caller-supplied raw pixel buffer.
#[derive(Debug, Clone, Copy)]
pub struct RawImage<'a> {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Bytes per row, at least `width * layout.channels()`.
    pub stride: usize,
    /// Channel layout of `data`.
    pub layout: PixelLayout,
    /// Pixel bytes, at least `stride * height` long.
    pub data: &'a [u8],
}

impl<'a> RawImage<'a> {
    /// Checks stride and buffer length against the declared dimensions.
    pub fn validate(&self) -> Result<(), String> {
        let min_stride = self.width as usize * self.layout.channels();
        if self.stride < min_stride {
            return Err(format!(
                "stride {} is smaller than row size {}",
                self.stride, min_stride
            ));
        }
        let needed = self.stride * self.height as usize;
        if self.data.len() < needed {
            return Err(format!(
                "buffer holds {} bytes, {} required",
                self.data.len(),
                needed
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_box_edges() {
        let b = TextBox::from_rect(2.0, 3.0, 10.0, 8.0);
        assert_eq!(b.left(), 2.0);
        assert_eq!(b.top(), 3.0);
        assert_eq!(b.right(), 10.0);
        assert_eq!(b.bottom(), 8.0);
        assert_eq!(b.height(), 5.0);
        assert_eq!(b.angle, 0.0);
    }

    #[test]
    fn raw_image_validation() {
        let data = vec![0u8; 4 * 2 * 3];
        let img = RawImage {
            width: 4,
            height: 2,
            stride: 12,
            layout: PixelLayout::Rgb,
            data: &data,
        };
        assert!(img.validate().is_ok());

        let narrow = RawImage { stride: 8, ..img };
        assert!(narrow.validate().is_err());

        let short = RawImage {
            data: &data[..10],
            ..img
        };
        assert!(short.validate().is_err());
    }

    #[test]
    fn accelerator_classes() {
        assert!(HardwareClass::GpuVulkan.is_accelerator());
        assert!(HardwareClass::GpuNvidia.is_accelerator());
        assert!(!HardwareClass::CpuAny.is_accelerator());
        assert!(!HardwareClass::Network.is_accelerator());
    }
}
