//! Saliency & Impact Scoring
//!
//! Decides which colors matter in an image. Every sampled pixel gets an
//! impact score from three cues:
//! 1. Saturation - vivid colors beat greys
//! 2. Edginess - Sobel magnitude on the luminance channel
//! 3. Center bias - pixels near the middle of the frame beat the margins
//!
//! `score = (1 + 2*saturation) * (1 + edginess) * (1 + 1.5*saliency)`
//!
//! Scores and pixel counts accumulate per quantized color into an
//! `ImpactHistogram`, which feeds candidate selection in `palette`.

use image::{GrayImage, Luma, RgbaImage};
use imageproc::gradients::{horizontal_sobel, vertical_sobel};
use std::cmp::Ordering;
use std::collections::HashMap;
use crate::color::Color;
use crate::settings::PaletteSettings;

// ============================================================================
// EDGE MAP
// ============================================================================

/// Rec. 601 luminance as an 8-bit grayscale image.
///
/// Rounded to whole levels because imageproc's Sobel takes `GrayImage`;
/// edge magnitudes move by at most a fraction of a level.
pub fn luminance_image(img: &RgbaImage) -> GrayImage {
    GrayImage::from_fn(img.width(), img.height(), |x, y| {
        let luma = Color::from_rgba(img.get_pixel(x, y)).luminance();
        Luma([luma.round().clamp(0.0, 255.0) as u8])
    })
}

/// Per-pixel edge intensity in [0, 1], row-major.
///
/// Sobel magnitude on the 0-1 luminance scale divided by `normalizer` and
/// clamped. The 1-pixel border has no full 3x3 neighborhood and stays 0.
pub fn edge_map(img: &RgbaImage, normalizer: f32) -> Vec<f32> {
    let (width, height) = img.dimensions();
    let mut edges = vec![0.0f32; (width as usize) * (height as usize)];

    if width < 3 || height < 3 {
        return edges;
    }

    let gray = luminance_image(img);
    let gx = horizontal_sobel(&gray);
    let gy = vertical_sobel(&gray);

    for y in 1..height - 1 {
        for x in 1..width - 1 {
            let sx = gx.get_pixel(x, y)[0] as f32 / 255.0;
            let sy = gy.get_pixel(x, y)[0] as f32 / 255.0;
            let magnitude = (sx * sx + sy * sy).sqrt();
            edges[(y * width + x) as usize] = (magnitude / normalizer).min(1.0);
        }
    }

    edges
}

// ============================================================================
// SCORING
// ============================================================================

/// `1 - distance_to_center / distance_center_to_corner`, in [0, 1].
///
/// The center is measured between pixel indices, so all four corner pixels
/// weigh 0.
pub fn center_weight(x: u32, y: u32, width: u32, height: u32) -> f32 {
    let cx = width.saturating_sub(1) as f32 / 2.0;
    let cy = height.saturating_sub(1) as f32 / 2.0;
    let max_dist = (cx * cx + cy * cy).sqrt();
    if max_dist == 0.0 {
        return 1.0;
    }

    let dx = x as f32 - cx;
    let dy = y as f32 - cy;
    (1.0 - (dx * dx + dy * dy).sqrt() / max_dist).clamp(0.0, 1.0)
}

pub fn impact_score(saturation: f32, edginess: f32, saliency: f32) -> f32 {
    (1.0 + 2.0 * saturation) * (1.0 + edginess) * (1.0 + 1.5 * saliency)
}

/// Snap each channel to the nearest of `levels` evenly spaced buckets.
///
/// Rounds rather than floors so pure black and pure white survive.
pub fn quantize_color(color: Color, levels: u32) -> Color {
    let step = 256.0 / levels.max(1) as f32;
    let snap = |c: u8| ((c as f32 / step).round() * step).min(255.0) as u8;
    Color::new(snap(color.r), snap(color.g), snap(color.b))
}

// ============================================================================
// HISTOGRAM
// ============================================================================

/// Accumulated impact for one quantized color
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ImpactEntry {
    pub score: f64,
    pub count: u32,
}

#[derive(Debug, Clone, Default)]
pub struct ImpactHistogram {
    entries: HashMap<Color, ImpactEntry>,
}

impl ImpactHistogram {
    pub fn add(&mut self, color: Color, score: f32) {
        let entry = self.entries.entry(color).or_default();
        entry.score += score as f64;
        entry.count += 1;
    }

    pub fn get(&self, color: Color) -> Option<ImpactEntry> {
        self.entries.get(&color).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries by descending score; ties by count, then by color for determinism
    pub fn ranked(&self) -> Vec<(Color, ImpactEntry)> {
        let mut items: Vec<_> = self.entries.iter().map(|(c, e)| (*c, *e)).collect();
        items.sort_by(|a, b| {
            b.1.score
                .partial_cmp(&a.1.score)
                .unwrap_or(Ordering::Equal)
                .then(b.1.count.cmp(&a.1.count))
                .then(a.0.cmp(&b.0))
        });
        items
    }
}

/// Score sampled pixels and accumulate them per quantized color
pub fn build_impact_histogram(img: &RgbaImage, settings: &PaletteSettings) -> ImpactHistogram {
    let (width, height) = img.dimensions();
    let edges = edge_map(img, settings.sobel_normalizer);
    let mut histogram = ImpactHistogram::default();

    let pixel_count = (width as usize) * (height as usize);
    for idx in (0..pixel_count).step_by(settings.sample_stride.max(1)) {
        let x = (idx % width as usize) as u32;
        let y = (idx / width as usize) as u32;
        let color = Color::from_rgba(img.get_pixel(x, y));

        let score = impact_score(
            color.saturation(),
            edges[idx],
            center_weight(x, y, width, height),
        );
        histogram.add(quantize_color(color, settings.quantize_levels), score);
    }

    histogram
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgba};

    #[test]
    fn test_edge_map_uniform_is_zero() {
        let img: RgbaImage = ImageBuffer::from_pixel(10, 10, Rgba([90, 40, 200, 255]));
        let edges = edge_map(&img, 4.0);
        assert_eq!(edges.len(), 100);
        assert!(edges.iter().all(|&e| e == 0.0));
    }

    #[test]
    fn test_edge_map_detects_step() {
        // Left half black, right half white
        let img: RgbaImage = ImageBuffer::from_fn(8, 8, |x, _| {
            if x < 4 { Rgba([0, 0, 0, 255]) } else { Rgba([255, 255, 255, 255]) }
        });
        let edges = edge_map(&img, 4.0);

        // Border row/column stays zero
        assert_eq!(edges[3], 0.0);
        assert_eq!(edges[8 * 3], 0.0);
        // Pixels straddling the step light up, flat interior does not
        assert!(edges[8 * 3 + 3] > 0.5);
        assert!(edges[8 * 3 + 4] > 0.5);
        assert_eq!(edges[8 * 3 + 1], 0.0);
        assert!(edges.iter().all(|&e| (0.0..=1.0).contains(&e)));
    }

    #[test]
    fn test_edge_map_tiny_image() {
        let img: RgbaImage = ImageBuffer::from_pixel(2, 5, Rgba([255, 0, 0, 255]));
        assert_eq!(edge_map(&img, 4.0), vec![0.0; 10]);
    }

    #[test]
    fn test_center_weight() {
        assert!((center_weight(5, 5, 11, 11) - 1.0).abs() < 1e-6);
        let mid_edge = center_weight(0, 5, 11, 11);
        assert!(mid_edge > 0.0 && mid_edge < 1.0);
        assert_eq!(center_weight(0, 0, 0, 0), 1.0);
        assert_eq!(center_weight(0, 0, 1, 1), 1.0);
    }

    #[test]
    fn test_center_weight_symmetric() {
        let (w, h) = (10, 7);
        for (x, y) in [(0, 0), (w - 1, 0), (0, h - 1), (w - 1, h - 1)] {
            assert!(center_weight(x, y, w, h).abs() < 1e-6);
        }
        for y in 0..h {
            for x in 0..w {
                let a = center_weight(x, y, w, h);
                let b = center_weight(w - 1 - x, h - 1 - y, w, h);
                assert!((a - b).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn test_impact_score_formula() {
        assert_eq!(impact_score(0.0, 0.0, 0.0), 1.0);
        assert!((impact_score(1.0, 1.0, 1.0) - 3.0 * 2.0 * 2.5).abs() < 1e-6);
        assert!(impact_score(1.0, 0.0, 0.0) > impact_score(0.0, 0.0, 0.0));
    }

    #[test]
    fn test_quantize_color_keeps_extremes() {
        assert_eq!(quantize_color(Color::BLACK, 32), Color::BLACK);
        assert_eq!(quantize_color(Color::WHITE, 32), Color::WHITE);
        assert_eq!(quantize_color(Color::new(3, 4, 13), 32), Color::new(0, 8, 16));
        // Noise within a bucket collapses
        assert_eq!(
            quantize_color(Color::new(96, 96, 96), 32),
            quantize_color(Color::new(98, 94, 95), 32)
        );
    }

    #[test]
    fn test_histogram_counts_sampled_pixels() {
        let img: RgbaImage = ImageBuffer::from_fn(8, 4, |x, _| {
            if x < 4 { Rgba([0, 0, 0, 255]) } else { Rgba([255, 0, 0, 255]) }
        });

        let settings = PaletteSettings { sample_stride: 1, ..Default::default() };
        let hist = build_impact_histogram(&img, &settings);
        assert_eq!(hist.len(), 2);
        assert_eq!(hist.get(Color::BLACK).unwrap().count, 16);
        assert_eq!(hist.get(Color::new(255, 0, 0)).unwrap().count, 16);

        // Saturated red outranks black with equal coverage
        let ranked = hist.ranked();
        assert_eq!(ranked[0].0, Color::new(255, 0, 0));

        let strided = build_impact_histogram(&img, &PaletteSettings::default());
        let total: u32 = strided.ranked().iter().map(|(_, e)| e.count).sum();
        assert_eq!(total, 8);
    }
}
