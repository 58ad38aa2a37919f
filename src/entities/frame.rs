//! Rendered frame: RGBA8 pixel buffer plus its position in the stream.
//!
//! A frame is produced by the compositor, handed to the driver, forwarded to a
//! sink and then dropped. Nothing else keeps a reference to its pixels.

use image::{Rgba, RgbaImage};

#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    index: u64,
    timestamp: f64,
    image: RgbaImage,
}

impl Frame {
    /// Create a frame filled with `fill`.
    pub fn new(index: u64, timestamp: f64, width: u32, height: u32, fill: Rgba<u8>) -> Self {
        Self {
            index,
            timestamp,
            image: RgbaImage::from_pixel(width, height, fill),
        }
    }

    pub fn from_image(index: u64, timestamp: f64, image: RgbaImage) -> Self {
        Self {
            index,
            timestamp,
            image,
        }
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    /// Scene time in seconds.
    pub fn timestamp(&self) -> f64 {
        self.timestamp
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn resolution(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn image_mut(&mut self) -> &mut RgbaImage {
        &mut self.image
    }

    pub fn into_image(self) -> RgbaImage {
        self.image
    }

    /// Raw RGBA bytes, row-major.
    pub fn pixels(&self) -> &[u8] {
        self.image.as_raw()
    }

    /// Drop alpha, for encoders that take packed RGB24.
    pub fn to_rgb24(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity((self.width() * self.height() * 3) as usize);
        for px in self.image.as_raw().chunks_exact(4) {
            out.extend_from_slice(&px[..3]);
        }
        out
    }

    /// Memory size in bytes
    pub fn mem(&self) -> usize {
        self.image.as_raw().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Test: Frame creation with fill colour
    /// Validates: Dimensions, position and pixel contents
    #[test]
    fn test_frame_creation() {
        let frame = Frame::new(3, 0.125, 8, 4, Rgba([1, 2, 3, 255]));

        assert_eq!(frame.index(), 3);
        assert_eq!(frame.timestamp(), 0.125);
        assert_eq!(frame.resolution(), (8, 4));
        assert_eq!(frame.mem(), 8 * 4 * 4);
        assert_eq!(&frame.pixels()[..4], &[1, 2, 3, 255]);
    }

    /// Test: RGBA → RGB24 conversion
    /// Validates: Alpha is stripped, channel order preserved
    #[test]
    fn test_to_rgb24() {
        let frame = Frame::new(0, 0.0, 2, 1, Rgba([10, 20, 30, 40]));
        assert_eq!(frame.to_rgb24(), vec![10, 20, 30, 10, 20, 30]);
    }
}
