//! Pipeline settings
//!
//! All user-facing parameters plus the empirically chosen constants of the
//! palette selector. Every struct deserializes with `#[serde(default)]` so a
//! partial JSON file only overrides what it names.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use crate::error::{Result, ColorStackError};

/// Fewest bands a palette request may ask for
pub const MIN_BANDS: usize = 2;
/// Most bands a palette request may ask for
pub const MAX_BANDS: usize = 24;

// ============================================================================
// PALETTE SELECTION
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PaletteSettings {
    /// Buckets per channel when merging near-duplicate colors (default: 32)
    pub quantize_levels: u32,
    /// Score every Nth pixel (default: 4)
    pub sample_stride: usize,
    /// Candidates kept per requested band before diversity selection (default: 4)
    pub oversample_factor: usize,
    /// Upper bound on candidates regardless of band count (default: 64)
    pub max_candidates: usize,
    /// Divides the Sobel magnitude to land edginess in [0, 1] (default: 4.0)
    pub sobel_normalizer: f32,
    /// Delta E76 under which all four corners count as one background (default: 15.0)
    pub background_delta_e: f32,
    /// Squared RGB distance a replacement color must keep from every used color (default: 10000)
    pub distinct_rgb_threshold: u32,
    /// Random pixel draws before falling back to a random color (default: 100)
    pub uniqueness_attempts: u32,
    /// Seed for the replacement sampler; `None` draws from OS entropy
    pub seed: Option<u64>,
}

impl Default for PaletteSettings {
    fn default() -> Self {
        Self {
            quantize_levels: 32,
            sample_stride: 4,
            oversample_factor: 4,
            max_candidates: 64,
            sobel_normalizer: 4.0,
            background_delta_e: 15.0,
            distinct_rgb_threshold: 10_000,
            uniqueness_attempts: 100,
            seed: None,
        }
    }
}

impl PaletteSettings {
    pub fn validate(&self) -> Result<()> {
        if !(2..=256).contains(&self.quantize_levels) {
            return Err(ColorStackError::InvalidParameter(format!(
                "quantize_levels must be between 2 and 256, got {}",
                self.quantize_levels
            )));
        }
        if self.sample_stride == 0 {
            return Err(ColorStackError::InvalidParameter(
                "sample_stride must be at least 1".to_string(),
            ));
        }
        if self.oversample_factor == 0 || self.max_candidates == 0 {
            return Err(ColorStackError::InvalidParameter(
                "oversample_factor and max_candidates must be at least 1".to_string(),
            ));
        }
        if !(self.sobel_normalizer.is_finite() && self.sobel_normalizer > 0.0) {
            return Err(ColorStackError::InvalidParameter(format!(
                "sobel_normalizer must be positive, got {}",
                self.sobel_normalizer
            )));
        }
        Ok(())
    }
}

// ============================================================================
// LAYERS
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LayerSettings {
    /// Printer layer height in mm (default: 0.2)
    pub layer_height_mm: f32,
    /// Layers in the base band (default: 3)
    pub base_layers: u32,
    /// Layers added by every band above the base (default: 2)
    pub band_layers: u32,
}

impl Default for LayerSettings {
    fn default() -> Self {
        Self {
            layer_height_mm: 0.2,
            base_layers: 3,
            band_layers: 2,
        }
    }
}

impl LayerSettings {
    /// Top height of each band in mm.
    ///
    /// Band 0 sits at `base_layers * layer_height`, every later band adds
    /// `band_layers * layer_height` on top of the previous one.
    pub fn band_heights(&self, band_count: usize) -> Vec<f32> {
        let base = self.base_layers as f32 * self.layer_height_mm;
        let step = self.band_layers as f32 * self.layer_height_mm;
        (0..band_count).map(|band| base + band as f32 * step).collect()
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.layer_height_mm.is_finite() && self.layer_height_mm > 0.0) {
            return Err(ColorStackError::InvalidParameter(format!(
                "layer_height_mm must be positive, got {}",
                self.layer_height_mm
            )));
        }
        Ok(())
    }
}

// ============================================================================
// MESH
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshSettings {
    /// Physical X size in mm (default: 100)
    pub width_mm: f32,
    /// Physical Y size in mm; `None` keeps the image aspect ratio
    pub depth_mm: Option<f32>,
}

impl Default for MeshSettings {
    fn default() -> Self {
        Self {
            width_mm: 100.0,
            depth_mm: None,
        }
    }
}

impl MeshSettings {
    /// Resolve the Y size for an image of the given pixel dimensions
    pub fn resolve_depth(&self, width_px: u32, height_px: u32) -> f32 {
        match self.depth_mm {
            Some(depth) => depth,
            None if width_px > 0 => self.width_mm * height_px as f32 / width_px as f32,
            None => self.width_mm,
        }
    }

    pub fn validate(&self) -> Result<()> {
        let valid = |v: f32| v.is_finite() && v > 0.0;
        if !valid(self.width_mm) {
            return Err(ColorStackError::InvalidParameter(format!(
                "width_mm must be positive, got {}",
                self.width_mm
            )));
        }
        if let Some(depth) = self.depth_mm {
            if !valid(depth) {
                return Err(ColorStackError::InvalidParameter(format!(
                    "depth_mm must be positive, got {}",
                    depth
                )));
            }
        }
        Ok(())
    }
}

// ============================================================================
// PREVIEW
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PreviewMode {
    /// Everything printed up to the current layer
    #[default]
    Cumulative,
    /// Only the current layer's pixels
    Isolated,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PreviewSettings {
    /// Layer to composite up to; `None` shows the finished print
    pub current_layer: Option<usize>,
    pub mode: PreviewMode,
}

// ============================================================================
// PIPELINE
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    /// Requested palette size (default: 4)
    pub band_count: usize,
    pub palette: PaletteSettings,
    pub layers: LayerSettings,
    pub mesh: MeshSettings,
    pub preview: PreviewSettings,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            band_count: 4,
            palette: PaletteSettings::default(),
            layers: LayerSettings::default(),
            mesh: MeshSettings::default(),
            preview: PreviewSettings::default(),
        }
    }
}

impl PipelineSettings {
    /// Load settings from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let settings: Self = serde_json::from_str(&content)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        validate_band_count(self.band_count)?;
        self.palette.validate()?;
        self.layers.validate()?;
        self.mesh.validate()
    }
}

pub fn validate_band_count(band_count: usize) -> Result<()> {
    if !(MIN_BANDS..=MAX_BANDS).contains(&band_count) {
        return Err(ColorStackError::BandCount {
            requested: band_count,
            min: MIN_BANDS,
            max: MAX_BANDS,
        });
    }
    Ok(())
}

/// Bands a palette or height table may hold once it exists.
///
/// Looser than `validate_band_count` at the bottom end: a selected palette
/// may come back with a single color.
pub fn validate_palette_len(len: usize) -> Result<()> {
    if !(1..=MAX_BANDS).contains(&len) {
        return Err(ColorStackError::BandCount {
            requested: len,
            min: 1,
            max: MAX_BANDS,
        });
    }
    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================
