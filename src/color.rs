//! Color types and color space conversions
//!
//! sRGB (0-255) -> linear RGB -> CIE XYZ -> CIELAB (D65), plus the two
//! distance measures used across the pipeline:
//! - squared RGB distance for raster assignment and filament matching
//! - Delta E76 for palette diversity and background matching
//!
//! The two are not interchangeable; each caller picks the one its stage needs.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use crate::error::{Result, ColorStackError};

// ============================================================================
// COLOR
// ============================================================================

/// An 8-bit sRGB color. Serialized as a `#rrggbb` hex string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const BLACK: Color = Color::new(0, 0, 0);
    pub const WHITE: Color = Color::new(255, 255, 255);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Color of an RGBA pixel, alpha ignored
    pub fn from_rgba(pixel: &image::Rgba<u8>) -> Self {
        Self::new(pixel[0], pixel[1], pixel[2])
    }

    pub fn to_rgba(self, alpha: u8) -> image::Rgba<u8> {
        image::Rgba([self.r, self.g, self.b, alpha])
    }

    /// Lowercase `#rrggbb`
    pub fn to_hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }

    /// Parse `rrggbb` or `#rrggbb`, case-insensitive
    pub fn from_hex(hex: &str) -> Result<Self> {
        let digits = hex.trim().trim_start_matches('#');
        if digits.len() != 6 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ColorStackError::InvalidHex(hex.to_string()));
        }

        let channel = |i: usize| {
            u8::from_str_radix(&digits[i..i + 2], 16)
                .map_err(|_| ColorStackError::InvalidHex(hex.to_string()))
        };

        Ok(Self::new(channel(0)?, channel(2)?, channel(4)?))
    }

    /// Perceived brightness on the 0-255 scale (Rec. 601 weights)
    pub fn luminance(self) -> f32 {
        0.299 * self.r as f32 + 0.587 * self.g as f32 + 0.114 * self.b as f32
    }

    /// HSV-style saturation in [0, 1]; 0 for black
    pub fn saturation(self) -> f32 {
        let max = self.r.max(self.g).max(self.b) as f32 / 255.0;
        let min = self.r.min(self.g).min(self.b) as f32 / 255.0;
        if max == 0.0 {
            0.0
        } else {
            (max - min) / max
        }
    }

    pub fn to_lab(self) -> Lab {
        rgb_to_lab(self)
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for Color {
    type Err = ColorStackError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_hex(s)
    }
}

impl TryFrom<String> for Color {
    type Error = ColorStackError;

    fn try_from(value: String) -> Result<Self> {
        Self::from_hex(&value)
    }
}

impl From<Color> for String {
    fn from(color: Color) -> Self {
        color.to_hex()
    }
}

/// Squared Euclidean distance in RGB space (0..=195075)
pub fn rgb_distance_sq(c1: Color, c2: Color) -> u32 {
    let dr = c1.r as i32 - c2.r as i32;
    let dg = c1.g as i32 - c2.g as i32;
    let db = c1.b as i32 - c2.b as i32;
    (dr * dr + dg * dg + db * db) as u32
}

// ============================================================================
// COLOR SPACE CONVERSIONS (sRGB -> linear -> XYZ -> LAB)
// ============================================================================

/// CIELAB coordinates
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Lab {
    pub l: f32,
    pub a: f32,
    pub b: f32,
}

/// D65 reference white
const XN: f32 = 0.95047;
const YN: f32 = 1.00000;
const ZN: f32 = 1.08883;

/// Gamma-decode one normalized sRGB channel (0.0-1.0)
pub fn srgb_to_linear(c: f32) -> f32 {
    if c <= 0.04045 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

/// Linear RGB to CIE XYZ (sRGB primaries, D65)
pub fn linear_to_xyz(rgb: [f32; 3]) -> [f32; 3] {
    let [rl, gl, bl] = rgb;
    [
        rl * 0.4124564 + gl * 0.3575761 + bl * 0.1804375,
        rl * 0.2126729 + gl * 0.7151522 + bl * 0.0721750,
        rl * 0.0193339 + gl * 0.1191920 + bl * 0.9503041,
    ]
}

/// CIE XYZ to CIELAB relative to the D65 white point
pub fn xyz_to_lab(xyz: [f32; 3]) -> Lab {
    fn f(t: f32) -> f32 {
        if t > 0.008856 {
            t.cbrt()
        } else {
            7.787 * t + 16.0 / 116.0
        }
    }

    let fx = f(xyz[0] / XN);
    let fy = f(xyz[1] / YN);
    let fz = f(xyz[2] / ZN);

    Lab {
        l: (116.0 * fy - 16.0).max(0.0),
        a: 500.0 * (fx - fy),
        b: 200.0 * (fy - fz),
    }
}

/// Convert sRGB (0-255) to LAB color space
pub fn rgb_to_lab(color: Color) -> Lab {
    let linear = [
        srgb_to_linear(color.r as f32 / 255.0),
        srgb_to_linear(color.g as f32 / 255.0),
        srgb_to_linear(color.b as f32 / 255.0),
    ];
    xyz_to_lab(linear_to_xyz(linear))
}

/// Calculate Delta E76 color difference in LAB space
pub fn delta_e(lab1: Lab, lab2: Lab) -> f32 {
    let dl = lab1.l - lab2.l;
    let da = lab1.a - lab2.a;
    let db = lab1.b - lab2.b;
    (dl * dl + da * da + db * db).sqrt()
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use palette::{IntoColor, Lab as RefLab, Srgb};

    #[test]
    fn test_srgb_to_linear_segments() {
        assert!((srgb_to_linear(0.0)).abs() < 1e-7);
        assert!((srgb_to_linear(0.04) - 0.04 / 12.92).abs() < 1e-7);
        assert!((srgb_to_linear(1.0) - 1.0).abs() < 1e-6);
        // Continuous across the threshold
        let below = srgb_to_linear(0.04045);
        let above = srgb_to_linear(0.04046);
        assert!((above - below).abs() < 1e-4);
    }

    #[test]
    fn test_white_maps_to_reference_white() {
        let xyz = linear_to_xyz([1.0, 1.0, 1.0]);
        assert!((xyz[0] - XN).abs() < 1e-3);
        assert!((xyz[1] - YN).abs() < 1e-3);
        assert!((xyz[2] - ZN).abs() < 1e-3);

        let lab = rgb_to_lab(Color::WHITE);
        assert!((lab.l - 100.0).abs() < 0.1);
        assert!(lab.a.abs() < 0.1);
        assert!(lab.b.abs() < 0.1);
    }

    #[test]
    fn test_black_is_origin() {
        let lab = rgb_to_lab(Color::BLACK);
        assert!(lab.l.abs() < 1e-4);
        assert!(lab.a.abs() < 1e-4);
        assert!(lab.b.abs() < 1e-4);
    }

    #[test]
    fn test_lab_matches_reference_implementation() {
        let test_colors = [
            (255, 0, 0), (0, 255, 0), (0, 0, 255),
            (128, 128, 128), (17, 6, 2), (200, 150, 40), (3, 3, 3),
        ];

        for (r, g, b) in test_colors {
            let ours = rgb_to_lab(Color::new(r, g, b));
            let reference: RefLab = Srgb::new(r, g, b).into_format::<f32>().into_color();
            assert!((ours.l - reference.l).abs() < 0.5, "L mismatch for ({}, {}, {})", r, g, b);
            assert!((ours.a - reference.a).abs() < 0.5, "a mismatch for ({}, {}, {})", r, g, b);
            assert!((ours.b - reference.b).abs() < 0.5, "b mismatch for ({}, {}, {})", r, g, b);
        }
    }

    #[test]
    fn test_delta_e_properties() {
        let red = rgb_to_lab(Color::new(255, 0, 0));
        let blue = rgb_to_lab(Color::new(0, 0, 255));
        assert!(delta_e(red, red) < 0.001);
        assert!((delta_e(red, blue) - delta_e(blue, red)).abs() < 1e-5);
        assert!(delta_e(Color::BLACK.to_lab(), Color::WHITE.to_lab()) > 99.0);
    }

    #[test]
    fn test_rgb_distance_sq() {
        assert_eq!(rgb_distance_sq(Color::BLACK, Color::BLACK), 0);
        assert_eq!(rgb_distance_sq(Color::BLACK, Color::WHITE), 3 * 255 * 255);
        assert_eq!(rgb_distance_sq(Color::new(10, 20, 30), Color::new(13, 16, 30)), 25);
    }

    #[test]
    fn test_hex_roundtrip() {
        let color = Color::new(0x1a, 0xff, 0x03);
        assert_eq!(color.to_hex(), "#1aff03");
        assert_eq!(Color::from_hex("#1AFF03").unwrap(), color);
        assert_eq!(Color::from_hex("1aff03").unwrap(), color);
        assert!(Color::from_hex("#12345").is_err());
        assert!(Color::from_hex("#12345g").is_err());
    }

    #[test]
    fn test_serde_as_hex_string() {
        let json = serde_json::to_string(&Color::new(255, 128, 0)).unwrap();
        assert_eq!(json, "\"#ff8000\"");
        let parsed: Color = serde_json::from_str("\"#00ff00\"").unwrap();
        assert_eq!(parsed, Color::new(0, 255, 0));
        assert!(serde_json::from_str::<Color>("\"nope\"").is_err());
    }

    #[test]
    fn test_saturation() {
        assert_eq!(Color::BLACK.saturation(), 0.0);
        assert_eq!(Color::new(128, 128, 128).saturation(), 0.0);
        assert!((Color::new(255, 0, 0).saturation() - 1.0).abs() < 1e-6);
        assert!((Color::new(200, 100, 100).saturation() - 0.5).abs() < 1e-6);
    }
}
