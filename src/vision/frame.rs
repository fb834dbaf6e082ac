//! Pixel data handed to the recognition engine

use image::DynamicImage;

/// A decoded image as tightly packed RGB8 rows
#[derive(Debug, Clone)]
pub struct PixelBuffer {
    /// Raw RGB pixel data, row-major
    pub data: Vec<u8>,
    /// Image width in pixels
    pub width: u32,
    /// Image height in pixels
    pub height: u32,
}

impl PixelBuffer {
    /// Create a new pixel buffer from raw RGB data
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            data,
            width,
            height,
        }
    }

    /// Convert any decoded image (grayscale, RGBA, 16-bit, ...) to RGB8
    pub fn from_image(image: DynamicImage) -> Self {
        let rgb = image.into_rgb8();
        let (width, height) = rgb.dimensions();
        Self::new(rgb.into_raw(), width, height)
    }

    /// Get dimensions as (width, height)
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// True when there are no pixels or the data does not cover the declared size
    pub fn is_empty(&self) -> bool {
        self.width == 0
            || self.height == 0
            || self.data.len() < (self.width as usize * self.height as usize * 3)
    }
}
