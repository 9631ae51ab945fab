//! Background color detection
//!
//! Two passes:
//! 1. Corners - if all four corners are perceptually the same color
//!    (pairwise Delta E76 within the threshold), their RGB average wins.
//! 2. Border histogram - otherwise the most frequent exact RGB value along
//!    the 1-pixel frame of the image.

use image::RgbaImage;
use std::collections::HashMap;
use crate::color::{delta_e, Color};

/// Detect the background color of an image.
///
/// Returns `None` only for an empty image.
pub fn detect_background(img: &RgbaImage, corner_threshold: f32) -> Option<Color> {
    let (width, height) = img.dimensions();
    if width == 0 || height == 0 {
        return None;
    }

    let corners = [
        Color::from_rgba(img.get_pixel(0, 0)),
        Color::from_rgba(img.get_pixel(width - 1, 0)),
        Color::from_rgba(img.get_pixel(0, height - 1)),
        Color::from_rgba(img.get_pixel(width - 1, height - 1)),
    ];

    if corners_agree(&corners, corner_threshold) {
        return Some(average_color(&corners));
    }

    Some(most_common_border_color(img))
}

fn corners_agree(corners: &[Color; 4], threshold: f32) -> bool {
    let labs = corners.map(Color::to_lab);
    for i in 0..labs.len() {
        for j in (i + 1)..labs.len() {
            if delta_e(labs[i], labs[j]) > threshold {
                return false;
            }
        }
    }
    true
}

fn average_color(colors: &[Color]) -> Color {
    let n = colors.len().max(1) as f32;
    let channel = |f: fn(&Color) -> u8| {
        (colors.iter().map(|c| f(c) as f32).sum::<f32>() / n).round() as u8
    };
    Color::new(channel(|c| c.r), channel(|c| c.g), channel(|c| c.b))
}

/// Every pixel on the top and bottom rows plus the left and right columns
/// without their corners, in scan order
fn border_pixels(img: &RgbaImage) -> Vec<Color> {
    let (width, height) = img.dimensions();
    let mut colors = Vec::new();

    // Top edge
    for x in 0..width {
        colors.push(Color::from_rgba(img.get_pixel(x, 0)));
    }

    // Bottom edge
    if height > 1 {
        for x in 0..width {
            colors.push(Color::from_rgba(img.get_pixel(x, height - 1)));
        }
    }

    // Left and right edges
    for y in 1..height.saturating_sub(1) {
        colors.push(Color::from_rgba(img.get_pixel(0, y)));
        if width > 1 {
            colors.push(Color::from_rgba(img.get_pixel(width - 1, y)));
        }
    }

    colors
}

/// Most frequent border color; on equal counts the color that reached the
/// count first in scan order wins
fn most_common_border_color(img: &RgbaImage) -> Color {
    let mut color_counts: HashMap<Color, usize> = HashMap::new();
    let mut best = (Color::default(), 0usize);

    for color in border_pixels(img) {
        let count = color_counts.entry(color).or_insert(0);
        *count += 1;
        if *count > best.1 {
            best = (color, *count);
        }
    }

    best.0
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgba};

    #[test]
    fn test_uniform_corners_average() {
        let mut img: RgbaImage = ImageBuffer::from_pixel(6, 6, Rgba([200, 30, 30, 255]));
        img.put_pixel(0, 0, Rgba([202, 32, 30, 255]));
        img.put_pixel(2, 2, Rgba([0, 0, 255, 255]));
        assert_eq!(detect_background(&img, 15.0), Some(Color::new(201, 31, 30)));
    }

    #[test]
    fn test_border_histogram_fallback() {
        // White frame with one black corner: corners disagree, white dominates border
        let mut img: RgbaImage = ImageBuffer::from_pixel(5, 5, Rgba([255, 255, 255, 255]));
        img.put_pixel(0, 0, Rgba([0, 0, 0, 255]));
        for y in 1..4 {
            for x in 1..4 {
                img.put_pixel(x, y, Rgba([0, 0, 0, 255]));
            }
        }
        assert_eq!(detect_background(&img, 15.0), Some(Color::WHITE));
    }

    #[test]
    fn test_border_pixel_count() {
        let img: RgbaImage = ImageBuffer::from_pixel(4, 3, Rgba([1, 2, 3, 255]));
        // 4 top + 4 bottom + 1 left + 1 right
        assert_eq!(border_pixels(&img).len(), 10);

        let column: RgbaImage = ImageBuffer::from_pixel(1, 3, Rgba([1, 2, 3, 255]));
        assert_eq!(border_pixels(&column).len(), 3);
    }

    #[test]
    fn test_single_pixel_and_empty() {
        let img: RgbaImage = ImageBuffer::from_pixel(1, 1, Rgba([9, 8, 7, 255]));
        assert_eq!(detect_background(&img, 15.0), Some(Color::new(9, 8, 7)));

        let empty: RgbaImage = ImageBuffer::new(0, 0);
        assert_eq!(detect_background(&empty, 15.0), None);
    }
}
