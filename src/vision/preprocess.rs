//! Image preprocessing for OCR models
//!
//! Handles image resizing, normalization, and tensor conversion for PaddleOCR models.

use ndarray::{s, Array3, Array4};

use super::detection::TextBox;
use super::frame::PixelBuffer;

/// Preprocessing configuration
#[derive(Debug, Clone)]
pub struct PreprocessConfig {
    /// Longest side allowed into the detection model; larger images are scaled down
    pub det_limit_side_len: u32,
    /// Target height for recognition model
    pub rec_target_height: u32,
    /// Maximum width for recognition
    pub rec_max_width: u32,
    /// Mean values for normalization [R, G, B]
    pub mean: [f32; 3],
    /// Std values for normalization [R, G, B]
    pub std: [f32; 3],
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            det_limit_side_len: 960,
            rec_target_height: 48,
            rec_max_width: 640,
            // (pixel / 255.0 - 0.5) / 0.5 maps [0, 255] -> [-1, 1]
            mean: [0.5, 0.5, 0.5],
            std: [0.5, 0.5, 0.5],
        }
    }
}

/// Convert an RGB pixel buffer to an HWC f32 array in 0-1
pub fn rgb_to_f32(pixels: &PixelBuffer) -> Array3<f32> {
    let width = pixels.width as usize;
    let height = pixels.height as usize;
    let mut rgb = Array3::<f32>::zeros((height, width, 3));

    for y in 0..height {
        for x in 0..width {
            let idx = (y * width + x) * 3;
            if idx + 2 < pixels.data.len() {
                rgb[[y, x, 0]] = pixels.data[idx] as f32 / 255.0;
                rgb[[y, x, 1]] = pixels.data[idx + 1] as f32 / 255.0;
                rgb[[y, x, 2]] = pixels.data[idx + 2] as f32 / 255.0;
            }
        }
    }

    rgb
}

/// Normalize image with mean and std
pub fn normalize(image: &Array3<f32>, mean: &[f32; 3], std: &[f32; 3]) -> Array3<f32> {
    let mut normalized = image.clone();
    for (c, (m, sd)) in mean.iter().zip(std.iter()).enumerate() {
        normalized
            .slice_mut(s![.., .., c])
            .mapv_inplace(|v| (v - m) / sd);
    }
    normalized
}

/// Convert HWC image to NCHW tensor (batch size 1)
pub fn hwc_to_nchw(image: &Array3<f32>) -> Array4<f32> {
    let (h, w, c) = image.dim();
    let mut tensor = Array4::<f32>::zeros((1, c, h, w));

    for y in 0..h {
        for x in 0..w {
            for ch in 0..c {
                tensor[[0, ch, y, x]] = image[[y, x, ch]];
            }
        }
    }

    tensor
}

/// Bilinear resize to exactly `new_h` x `new_w`
pub fn resize_bilinear(image: &Array3<f32>, new_h: usize, new_w: usize) -> Array3<f32> {
    let (h, w, c) = image.dim();
    let mut resized = Array3::<f32>::zeros((new_h, new_w, c));
    if h == 0 || w == 0 || new_h == 0 || new_w == 0 {
        return resized;
    }

    let scale_y = h as f32 / new_h as f32;
    let scale_x = w as f32 / new_w as f32;

    for y in 0..new_h {
        for x in 0..new_w {
            // Sample at pixel centers
            let src_y = ((y as f32 + 0.5) * scale_y - 0.5).clamp(0.0, (h - 1) as f32);
            let src_x = ((x as f32 + 0.5) * scale_x - 0.5).clamp(0.0, (w - 1) as f32);

            let y0 = src_y.floor() as usize;
            let y1 = (y0 + 1).min(h - 1);
            let x0 = src_x.floor() as usize;
            let x1 = (x0 + 1).min(w - 1);

            let fy = src_y - y0 as f32;
            let fx = src_x - x0 as f32;

            for ch in 0..c {
                let v00 = image[[y0, x0, ch]];
                let v01 = image[[y0, x1, ch]];
                let v10 = image[[y1, x0, ch]];
                let v11 = image[[y1, x1, ch]];

                let v0 = v00 * (1.0 - fx) + v01 * fx;
                let v1 = v10 * (1.0 - fx) + v11 * fx;
                resized[[y, x, ch]] = v0 * (1.0 - fy) + v1 * fy;
            }
        }
    }

    resized
}

/// Resize for the detection model.
///
/// Images whose longer side exceeds `limit_side_len` are scaled down; both
/// sides are then rounded to a multiple of 32 (minimum 32), which the DB
/// network requires.
pub fn resize_for_detection(image: &Array3<f32>, limit_side_len: u32) -> Array3<f32> {
    let (h, w, _) = image.dim();
    let longest = h.max(w) as f32;

    let ratio = if longest > limit_side_len as f32 {
        limit_side_len as f32 / longest
    } else {
        1.0
    };

    let new_h = round_to_32(h as f32 * ratio);
    let new_w = round_to_32(w as f32 * ratio);

    resize_bilinear(image, new_h, new_w)
}

fn round_to_32(v: f32) -> usize {
    (((v / 32.0).round() as usize) * 32).max(32)
}

/// Resize image for recognition model (fixed height, variable width)
pub fn resize_for_recognition(
    image: &Array3<f32>,
    target_height: u32,
    max_width: u32,
) -> Array3<f32> {
    let (h, w, _) = image.dim();
    let scale = target_height as f32 / h.max(1) as f32;
    let new_w = ((w as f32 * scale).ceil() as u32).clamp(1, max_width) as usize;

    resize_bilinear(image, target_height as usize, new_w)
}

/// Crop the axis-aligned region covered by a detected box
pub fn crop_box(image: &Array3<f32>, text_box: &TextBox) -> Array3<f32> {
    let (img_h, img_w, c) = image.dim();
    if img_h == 0 || img_w == 0 {
        return Array3::<f32>::zeros((1, 1, c));
    }

    let x1 = (text_box.x0.max(0.0) as usize).min(img_w - 1);
    let y1 = (text_box.y0.max(0.0) as usize).min(img_h - 1);
    let x2 = (text_box.x1.ceil().max(0.0) as usize).min(img_w);
    let y2 = (text_box.y1.ceil().max(0.0) as usize).min(img_h);

    if x2 <= x1 || y2 <= y1 {
        return Array3::<f32>::zeros((1, 1, c));
    }

    image.slice(s![y1..y2, x1..x2, ..]).to_owned()
}

/// Full preprocessing pipeline for detection
pub fn preprocess_for_detection(image: &Array3<f32>, config: &PreprocessConfig) -> Array4<f32> {
    let resized = resize_for_detection(image, config.det_limit_side_len);
    let normalized = normalize(&resized, &config.mean, &config.std);
    hwc_to_nchw(&normalized)
}

/// Full preprocessing pipeline for recognition
pub fn preprocess_for_recognition(image: &Array3<f32>, config: &PreprocessConfig) -> Array4<f32> {
    let resized = resize_for_recognition(image, config.rec_target_height, config.rec_max_width);
    let normalized = normalize(&resized, &config.mean, &config.std);
    hwc_to_nchw(&normalized)
}
