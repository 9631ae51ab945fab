//! Image -> palette -> band raster -> mesh
//!
//! The three request-level operations behind the worker boundary:
//! - `generate_palette` - select the structural palette for an image
//! - `process_image` - band raster + composited preview for a palette state
//! - `export_mesh` - binary STL for a band raster and current physical settings
//!
//! Each call is pure: inputs are borrowed, nothing is cached here. Callers
//! keep the palette state and raster and hand them back in.

use image::RgbaImage;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use crate::bands::{assign_bands, render_preview, BandRaster};
use crate::color::Color;
use crate::error::{Result, ColorStackError};
use crate::filament::{match_filaments, Filament};
use crate::mesh::build_heightfield;
use crate::palette::select_palette;
use crate::settings::{
    validate_band_count, validate_palette_len, LayerSettings, MeshSettings, PaletteSettings,
    PreviewSettings,
};

// ============================================================================
// PALETTE STATE
// ============================================================================

/// Structural and render palettes, always the same length.
///
/// The structural palette decides which band each pixel belongs to. The
/// render palette decides what each band looks like. Changing render colors
/// never requires recomputing a band raster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawPaletteState")]
pub struct PaletteState {
    structural: Vec<Color>,
    render: Vec<Color>,
}

#[derive(Deserialize)]
struct RawPaletteState {
    structural: Vec<Color>,
    render: Vec<Color>,
}

impl TryFrom<RawPaletteState> for PaletteState {
    type Error = ColorStackError;

    fn try_from(raw: RawPaletteState) -> Result<Self> {
        validate_palette_len(raw.structural.len())?;
        let mut state = Self::new(raw.structural);
        state.set_render(raw.render)?;
        Ok(state)
    }
}

impl PaletteState {
    pub fn new(structural: Vec<Color>) -> Self {
        let render = structural.clone();
        Self { structural, render }
    }

    pub fn structural(&self) -> &[Color] {
        &self.structural
    }

    pub fn render(&self) -> &[Color] {
        &self.render
    }

    pub fn len(&self) -> usize {
        self.structural.len()
    }

    pub fn is_empty(&self) -> bool {
        self.structural.is_empty()
    }

    pub fn structural_hex(&self) -> Vec<String> {
        self.structural.iter().map(|c| c.to_hex()).collect()
    }

    pub fn render_hex(&self) -> Vec<String> {
        self.render.iter().map(|c| c.to_hex()).collect()
    }

    /// Replace the render colors; must match the structural length
    pub fn set_render(&mut self, render: Vec<Color>) -> Result<()> {
        if render.len() != self.structural.len() {
            return Err(ColorStackError::InvalidParameter(format!(
                "render palette has {} colors, structural palette has {}",
                render.len(),
                self.structural.len()
            )));
        }
        self.render = render;
        Ok(())
    }

    /// Render with the closest owned filaments
    pub fn apply_filaments(&mut self, inventory: &[Filament]) {
        self.render = match_filaments(&self.structural, inventory);
    }

    /// Render with the structural colors again
    pub fn reset_render(&mut self) {
        self.render = self.structural.clone();
    }

    /// Exchange two bands in both palettes
    pub fn swap_bands(&mut self, a: usize, b: usize) -> Result<()> {
        self.check_index(a)?;
        self.check_index(b)?;
        self.structural.swap(a, b);
        self.render.swap(a, b);
        Ok(())
    }

    /// Move one band to a new position in both palettes
    pub fn move_band(&mut self, from: usize, to: usize) -> Result<()> {
        self.check_index(from)?;
        self.check_index(to)?;
        let color = self.structural.remove(from);
        self.structural.insert(to, color);
        let color = self.render.remove(from);
        self.render.insert(to, color);
        Ok(())
    }

    /// Reverse the print order of both palettes
    pub fn invert(&mut self) {
        self.structural.reverse();
        self.render.reverse();
    }

    fn check_index(&self, index: usize) -> Result<()> {
        if index >= self.structural.len() {
            return Err(ColorStackError::InvalidParameter(format!(
                "band {} out of range for {} bands",
                index,
                self.structural.len()
            )));
        }
        Ok(())
    }
}

// ============================================================================
// OPERATIONS
// ============================================================================

/// Wrap a caller-supplied RGBA buffer, checking its length
pub fn image_from_rgba(pixels: Vec<u8>, width: u32, height: u32) -> Result<RgbaImage> {
    if width == 0 || height == 0 {
        return Err(ColorStackError::ZeroDimension);
    }
    let len = pixels.len();
    if len != (width as usize) * (height as usize) * 4 {
        return Err(ColorStackError::DimensionMismatch { len, width, height });
    }
    RgbaImage::from_raw(width, height, pixels)
        .ok_or(ColorStackError::DimensionMismatch { len, width, height })
}

/// Select the structural palette for an image
pub fn generate_palette(
    img: &RgbaImage,
    band_count: usize,
    settings: &PaletteSettings,
) -> Result<PaletteState> {
    validate_band_count(band_count)?;
    let structural = select_palette(img, band_count, settings)?;
    info!(
        requested = band_count,
        selected = structural.len(),
        "Generated palette"
    );
    Ok(PaletteState::new(structural))
}

/// Band raster and composited preview
#[derive(Debug, Clone)]
pub struct ProcessedImage {
    pub raster: BandRaster,
    pub preview: RgbaImage,
}

/// Quantize against the structural palette and composite with render colors
pub fn process_image(
    img: &RgbaImage,
    state: &PaletteState,
    preview: &PreviewSettings,
) -> Result<ProcessedImage> {
    let raster = assign_bands(img, state.structural())?;
    let preview = render_preview(&raster, state.render(), preview)?;
    debug!(counts = ?raster.counts(state.len()), "Assigned bands");
    Ok(ProcessedImage { raster, preview })
}

/// Binary STL for a band raster with the current physical settings
pub fn export_mesh(
    raster: &BandRaster,
    band_count: usize,
    layers: &LayerSettings,
    mesh: &MeshSettings,
) -> Result<Vec<u8>> {
    validate_palette_len(band_count)?;
    layers.validate()?;
    mesh.validate()?;

    let heights = layers.band_heights(band_count);
    let depth_mm = mesh.resolve_depth(raster.width(), raster.height());
    let solid = build_heightfield(raster, &heights, mesh.width_mm, depth_mm)?;
    let bytes = solid.to_stl_bytes()?;

    info!(
        triangles = solid.triangle_count(),
        bytes = bytes.len(),
        width_mm = mesh.width_mm,
        depth_mm,
        "Exported mesh"
    );
    Ok(bytes)
}

// ============================================================================
// TESTS
// ============================================================================
