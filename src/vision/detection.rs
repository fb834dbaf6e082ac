//! Text detection postprocessing
//!
//! Turns the DB (differentiable binarization) probability map into text boxes
//! in source-image coordinates.

use image::{GrayImage, Luma};
use imageproc::region_labelling::{connected_components, Connectivity};
use ndarray::ArrayView2;
use tracing::debug;

/// Boxes whose top edges differ by less than this many pixels are treated as one line
const SAME_LINE_TOLERANCE: f32 = 10.0;

/// Axis-aligned text box in source-image pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextBox {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
    /// Mean detection probability inside the region
    pub score: f32,
}

impl TextBox {
    pub fn width(&self) -> f32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f32 {
        self.y1 - self.y0
    }

    /// Bounding box as (x, y, width, height)
    pub fn bounds(&self) -> (u32, u32, u32, u32) {
        (
            self.x0 as u32,
            self.y0 as u32,
            self.width().max(0.0) as u32,
            self.height().max(0.0) as u32,
        )
    }
}

/// DB postprocessing parameters
#[derive(Debug, Clone)]
pub struct DbPostProcess {
    /// Pixel probability threshold for the binary map
    pub threshold: f32,
    /// Minimum mean probability for a region to count as text
    pub box_threshold: f32,
    /// Expansion ratio compensating for the shrunk DB kernels
    pub unclip_ratio: f32,
    /// Regions with a shorter side than this (map pixels) are dropped
    pub min_size: f32,
    /// Upper bound on regions examined per image
    pub max_candidates: usize,
}

impl Default for DbPostProcess {
    fn default() -> Self {
        Self {
            threshold: 0.3,
            box_threshold: 0.6,
            unclip_ratio: 1.5,
            min_size: 3.0,
            max_candidates: 1000,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Region {
    min_x: u32,
    min_y: u32,
    max_x: u32,
    max_y: u32,
    prob_sum: f32,
    pixels: u32,
}

impl DbPostProcess {
    /// Extract boxes from a `[H, W]` probability map, scaled to `dest_width` x `dest_height`.
    ///
    /// Boxes come back sorted top-to-bottom, then left-to-right within a line.
    pub fn boxes_from_map(
        &self,
        pred: ArrayView2<'_, f32>,
        dest_width: u32,
        dest_height: u32,
    ) -> Vec<TextBox> {
        let (map_h, map_w) = pred.dim();
        if map_h == 0 || map_w == 0 {
            return Vec::new();
        }

        let bitmap = GrayImage::from_fn(map_w as u32, map_h as u32, |x, y| {
            if pred[[y as usize, x as usize]] > self.threshold {
                Luma([255u8])
            } else {
                Luma([0u8])
            }
        });

        let labels = connected_components(&bitmap, Connectivity::Eight, Luma([0u8]));

        let mut regions: Vec<Option<Region>> = Vec::new();
        for (x, y, label) in labels.enumerate_pixels() {
            let label = label[0] as usize;
            if label == 0 {
                continue;
            }
            if regions.len() < label {
                regions.resize(label, None);
            }

            let prob = pred[[y as usize, x as usize]];
            let region = regions[label - 1].get_or_insert(Region {
                min_x: x,
                min_y: y,
                max_x: x,
                max_y: y,
                prob_sum: 0.0,
                pixels: 0,
            });
            region.min_x = region.min_x.min(x);
            region.min_y = region.min_y.min(y);
            region.max_x = region.max_x.max(x);
            region.max_y = region.max_y.max(y);
            region.prob_sum += prob;
            region.pixels += 1;
        }

        let width_scale = dest_width as f32 / map_w as f32;
        let height_scale = dest_height as f32 / map_h as f32;

        let mut boxes: Vec<TextBox> = regions
            .into_iter()
            .flatten()
            .take(self.max_candidates)
            .filter_map(|region| self.region_to_box(&region, map_w as f32, map_h as f32))
            .map(|b| TextBox {
                x0: (b.x0 * width_scale).round().clamp(0.0, dest_width as f32),
                y0: (b.y0 * height_scale).round().clamp(0.0, dest_height as f32),
                x1: (b.x1 * width_scale).round().clamp(0.0, dest_width as f32),
                y1: (b.y1 * height_scale).round().clamp(0.0, dest_height as f32),
                score: b.score,
            })
            .collect();

        sort_boxes(&mut boxes);
        debug!("DB postprocess: {} boxes", boxes.len());
        boxes
    }

    /// Score, filter and unclip one labelled region (map coordinates)
    fn region_to_box(&self, region: &Region, map_w: f32, map_h: f32) -> Option<TextBox> {
        let w = (region.max_x - region.min_x + 1) as f32;
        let h = (region.max_y - region.min_y + 1) as f32;
        if w.min(h) < self.min_size {
            return None;
        }

        let score = region.prob_sum / region.pixels.max(1) as f32;
        if score < self.box_threshold {
            return None;
        }

        let delta = unclip_distance(w, h, self.unclip_ratio);
        let x0 = (region.min_x as f32 - delta).max(0.0);
        let y0 = (region.min_y as f32 - delta).max(0.0);
        let x1 = (region.max_x as f32 + 1.0 + delta).min(map_w);
        let y1 = (region.max_y as f32 + 1.0 + delta).min(map_h);

        if (x1 - x0).min(y1 - y0) < self.min_size + 2.0 {
            return None;
        }

        Some(TextBox {
            x0,
            y0,
            x1,
            y1,
            score,
        })
    }
}

/// Offset distance for expanding a `w` x `h` box: area * ratio / perimeter
pub fn unclip_distance(w: f32, h: f32, ratio: f32) -> f32 {
    let perimeter = 2.0 * (w + h);
    if perimeter <= f32::EPSILON {
        return 0.0;
    }
    w * h * ratio / perimeter
}

/// Order boxes top-to-bottom, then left-to-right for boxes on the same line
pub fn sort_boxes(boxes: &mut [TextBox]) {
    boxes.sort_by(|a, b| {
        a.y0.total_cmp(&b.y0).then(a.x0.total_cmp(&b.x0))
    });

    // A single bubble pass per position, matching the reference PaddleOCR ordering
    for i in 0..boxes.len().saturating_sub(1) {
        for j in (0..=i).rev() {
            let (upper, lower) = (boxes[j], boxes[j + 1]);
            if (lower.y0 - upper.y0).abs() < SAME_LINE_TOLERANCE && lower.x0 < upper.x0 {
                boxes.swap(j, j + 1);
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn boxed(x0: f32, y0: f32) -> TextBox {
        TextBox {
            x0,
            y0,
            x1: x0 + 20.0,
            y1: y0 + 10.0,
            score: 0.9,
        }
    }

    #[test]
    fn test_empty_map_has_no_boxes() {
        let pred = Array2::<f32>::zeros((32, 32));
        let boxes = DbPostProcess::default().boxes_from_map(pred.view(), 10, 10);
        assert!(boxes.is_empty());
    }

    #[test]
    fn test_single_region_is_detected_and_scaled() {
        let mut pred = Array2::<f32>::zeros((64, 64));
        for y in 20..30 {
            for x in 10..50 {
                pred[[y, x]] = 0.9;
            }
        }

        let boxes = DbPostProcess::default().boxes_from_map(pred.view(), 128, 128);
        assert_eq!(boxes.len(), 1);

        let b = boxes[0];
        assert!((b.score - 0.9).abs() < 1e-4);
        // Expanded beyond the kernel and scaled by 2
        assert!(b.x0 < 20.0 && b.x1 > 100.0);
        assert!(b.y0 < 40.0 && b.y1 > 60.0);
        assert!(b.x1 <= 128.0 && b.y1 <= 128.0);
    }

    #[test]
    fn test_low_score_and_tiny_regions_are_dropped() {
        let mut pred = Array2::<f32>::zeros((64, 64));
        // Above the pixel threshold but below the box threshold
        for y in 5..15 {
            for x in 5..40 {
                pred[[y, x]] = 0.4;
            }
        }
        // Strong but only one pixel high
        for x in 10..40 {
            pred[[50, x]] = 0.95;
        }

        let boxes = DbPostProcess::default().boxes_from_map(pred.view(), 64, 64);
        assert!(boxes.is_empty());
    }

    #[test]
    fn test_separate_regions_yield_separate_boxes() {
        let mut pred = Array2::<f32>::zeros((64, 96));
        for y in 10..20 {
            for x in 5..30 {
                pred[[y, x]] = 0.8;
            }
            for x in 60..90 {
                pred[[y, x]] = 0.8;
            }
        }

        let boxes = DbPostProcess::default().boxes_from_map(pred.view(), 96, 64);
        assert_eq!(boxes.len(), 2);
        assert!(boxes[0].x0 < boxes[1].x0);
    }

    #[test]
    fn test_unclip_distance() {
        assert!((unclip_distance(40.0, 10.0, 1.5) - 6.0).abs() < 1e-6);
        assert_eq!(unclip_distance(0.0, 0.0, 1.5), 0.0);
    }

    #[test]
    fn test_sort_boxes_reading_order() {
        let mut boxes = vec![boxed(100.0, 52.0), boxed(5.0, 50.0), boxed(50.0, 5.0)];
        sort_boxes(&mut boxes);

        assert_eq!(boxes[0].y0, 5.0);
        assert_eq!(boxes[1].x0, 5.0);
        assert_eq!(boxes[2].x0, 100.0);
    }

    #[test]
    fn test_sort_boxes_same_line_slight_offset() {
        // The right-hand box sits 3px higher but is on the same line
        let mut boxes = vec![boxed(10.0, 20.0), boxed(80.0, 17.0)];
        sort_boxes(&mut boxes);

        assert_eq!(boxes[0].x0, 10.0);
        assert_eq!(boxes[1].x0, 80.0);
    }
}
