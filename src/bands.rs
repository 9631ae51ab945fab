//! Band Quantizer
//!
//! Assigns every pixel to its nearest structural palette color by squared
//! RGB distance. The resulting `BandRaster` is the single source of truth for
//! both the 2D layer preview and the 3D mesh heights.
//!
//! Only the structural palette decides bands. Render colors are applied at
//! preview time and never change which band a pixel belongs to.

use image::{ImageBuffer, Rgba, RgbaImage};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use crate::color::{rgb_distance_sq, Color};
use crate::error::{Result, ColorStackError};
use crate::settings::{validate_palette_len, PreviewMode, PreviewSettings};

/// One band index per pixel, row-major, origin top-left
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawBandRaster")]
pub struct BandRaster {
    width: u32,
    height: u32,
    bands: Vec<u8>,
}

#[derive(Deserialize)]
struct RawBandRaster {
    width: u32,
    height: u32,
    bands: Vec<u8>,
}

impl TryFrom<RawBandRaster> for BandRaster {
    type Error = ColorStackError;

    fn try_from(raw: RawBandRaster) -> Result<Self> {
        Self::new(raw.width, raw.height, raw.bands)
    }
}

impl BandRaster {
    pub fn new(width: u32, height: u32, bands: Vec<u8>) -> Result<Self> {
        if bands.len() != (width as usize) * (height as usize) {
            return Err(ColorStackError::DimensionMismatch {
                len: bands.len(),
                width,
                height,
            });
        }
        Ok(Self { width, height, bands })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn bands(&self) -> &[u8] {
        &self.bands
    }

    /// Band at pixel (x, y)
    pub fn get(&self, x: u32, y: u32) -> u8 {
        self.bands[(y as usize) * (self.width as usize) + x as usize]
    }

    /// Highest band index in use, `None` for an empty raster
    pub fn max_band(&self) -> Option<u8> {
        self.bands.iter().copied().max()
    }

    /// Pixels per band for a palette of `band_count` colors
    pub fn counts(&self, band_count: usize) -> Vec<usize> {
        let mut counts = vec![0usize; band_count];
        for &band in &self.bands {
            if let Some(count) = counts.get_mut(band as usize) {
                *count += 1;
            }
        }
        counts
    }
}

/// Index of the nearest palette color; ties go to the lowest index
pub fn nearest_band(color: Color, palette: &[Color]) -> u8 {
    let mut best_idx = 0;
    let mut best_dist = u32::MAX;

    for (i, &entry) in palette.iter().enumerate() {
        let d = rgb_distance_sq(color, entry);
        if d < best_dist {
            best_dist = d;
            best_idx = i;
        }
    }

    best_idx as u8
}

/// Quantize an image against the structural palette.
///
/// The palette holds at most `MAX_BANDS` colors so every index fits a `u8`.
pub fn assign_bands(img: &RgbaImage, palette: &[Color]) -> Result<BandRaster> {
    if palette.is_empty() {
        return Err(ColorStackError::InvalidParameter(
            "cannot assign bands against an empty palette".to_string(),
        ));
    }
    validate_palette_len(palette.len())?;

    let bands: Vec<u8> = img
        .as_raw()
        .par_chunks_exact(4)
        .map(|px| nearest_band(Color::new(px[0], px[1], px[2]), palette))
        .collect();

    BandRaster::new(img.width(), img.height(), bands)
}

// ============================================================================
// PREVIEW COMPOSITING
// ============================================================================

/// Composite the raster with render colors up to a layer.
///
/// Cumulative: each pixel shows the color of `min(band, layer)`, i.e. the top
/// of what has been printed so far. Isolated: only pixels of exactly `layer`
/// are painted, everything else is transparent.
pub fn render_preview(
    raster: &BandRaster,
    render_palette: &[Color],
    settings: &PreviewSettings,
) -> Result<RgbaImage> {
    let top = render_palette.len().checked_sub(1).ok_or_else(|| {
        ColorStackError::InvalidParameter("render palette is empty".to_string())
    })?;
    if let Some(max) = raster.max_band() {
        if max as usize > top {
            return Err(ColorStackError::InvalidParameter(format!(
                "raster uses band {} but render palette has {} colors",
                max,
                render_palette.len()
            )));
        }
    }

    let layer = settings.current_layer.unwrap_or(top).min(top);
    let transparent = Rgba([0, 0, 0, 0]);

    let preview = ImageBuffer::from_fn(raster.width(), raster.height(), |x, y| {
        let band = raster.get(x, y) as usize;
        match settings.mode {
            PreviewMode::Cumulative => render_palette[band.min(layer)].to_rgba(255),
            PreviewMode::Isolated if band == layer => render_palette[band].to_rgba(255),
            PreviewMode::Isolated => transparent,
        }
    });

    Ok(preview)
}

// ============================================================================
// TESTS
// ============================================================================
