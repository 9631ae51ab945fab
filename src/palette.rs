//! Palette Selector
//!
//! Picks a small set of perceptually distinct, visually important colors:
//!
//! 1. Quantize + score pixels into an impact histogram (`saliency`)
//! 2. Keep the top `min(oversample * N, max_candidates)` colors by impact
//! 3. Farthest-point selection in CIELAB, seeded with the highest-impact color
//! 4. Order by descending luminance
//! 5. Move the color closest to the detected background to index 0
//! 6. Sort bands 1..N by ascending pixel count (thin features print last)
//! 7. Replace any duplicate entries with distinct image colors
//!
//! Index 0 is the base (first printed) layer.

use image::RgbaImage;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::cmp::Ordering;
use std::collections::HashSet;
use tracing::{debug, warn};
use crate::background::detect_background;
use crate::bands::assign_bands;
use crate::color::{delta_e, rgb_distance_sq, Color, Lab};
use crate::error::{Result, ColorStackError};
use crate::saliency::build_impact_histogram;
use crate::settings::PaletteSettings;

/// Select up to `band_count` colors from an image.
///
/// Returns fewer colors when the image does not have enough distinct
/// candidates. Never returns an empty palette for a non-empty image.
pub fn select_palette(
    img: &RgbaImage,
    band_count: usize,
    settings: &PaletteSettings,
) -> Result<Vec<Color>> {
    let (width, height) = img.dimensions();
    if width == 0 || height == 0 {
        return Err(ColorStackError::ZeroDimension);
    }
    if band_count == 0 {
        return Err(ColorStackError::InvalidParameter(
            "band count must be at least 1".to_string(),
        ));
    }
    settings.validate()?;

    let candidates = oversample_candidates(img, band_count, settings);
    debug!(
        candidates = candidates.len(),
        band_count, "Collected palette candidates"
    );

    let mut palette = if candidates.len() <= band_count {
        candidates
    } else {
        let labs: Vec<Lab> = candidates.iter().map(|c| c.to_lab()).collect();
        farthest_point_select(&labs, band_count)
            .into_iter()
            .map(|i| candidates[i])
            .collect()
    };

    sort_by_luminance(&mut palette);

    if let Some(background) = detect_background(img, settings.background_delta_e) {
        debug!(background = %background, "Detected background color");
        move_closest_to_front(&mut palette, background);
    }

    reorder_thin_features(img, &mut palette)?;

    let mut rng = match settings.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    enforce_unique(&mut palette, img, settings, &mut rng);

    Ok(palette)
}

/// Highest-impact quantized colors, best first
fn oversample_candidates(
    img: &RgbaImage,
    band_count: usize,
    settings: &PaletteSettings,
) -> Vec<Color> {
    let histogram = build_impact_histogram(img, settings);
    let keep = band_count
        .saturating_mul(settings.oversample_factor)
        .min(settings.max_candidates)
        .max(band_count.min(settings.max_candidates));

    histogram
        .ranked()
        .into_iter()
        .take(keep)
        .map(|(color, _)| color)
        .collect()
}

// ============================================================================
// FARTHEST-POINT SELECTION
// ============================================================================

/// Greedy max-min diversity selection.
///
/// Starts from candidate 0, then repeatedly takes the candidate whose nearest
/// already-chosen color is farthest away (Delta E76). Ties go to the earlier
/// candidate. Returns candidate indices in selection order, so a run with
/// `k` is always a prefix of a run with `k + 1`.
pub fn farthest_point_select(candidates: &[Lab], k: usize) -> Vec<usize> {
    if candidates.is_empty() || k == 0 {
        return Vec::new();
    }

    let mut chosen = vec![0usize];
    let mut taken = vec![false; candidates.len()];
    taken[0] = true;

    let mut min_dist: Vec<f32> = candidates
        .iter()
        .map(|&lab| delta_e(lab, candidates[0]))
        .collect();

    while chosen.len() < k.min(candidates.len()) {
        let mut best_idx = None;
        let mut best_dist = f32::NEG_INFINITY;

        for (i, &d) in min_dist.iter().enumerate() {
            if !taken[i] && d > best_dist {
                best_dist = d;
                best_idx = Some(i);
            }
        }

        let Some(next) = best_idx else { break };
        taken[next] = true;
        chosen.push(next);

        for (i, d) in min_dist.iter_mut().enumerate() {
            *d = d.min(delta_e(candidates[i], candidates[next]));
        }
    }

    chosen
}

// ============================================================================
// ORDERING
// ============================================================================

/// Brightest first; stable for equal luminance
fn sort_by_luminance(palette: &mut [Color]) {
    palette.sort_by(|a, b| {
        b.luminance()
            .partial_cmp(&a.luminance())
            .unwrap_or(Ordering::Equal)
    });
}

/// Move the entry nearest to `background` (Delta E76) to index 0
pub fn move_closest_to_front(palette: &mut Vec<Color>, background: Color) {
    let target = background.to_lab();
    let closest = palette
        .iter()
        .enumerate()
        .map(|(i, c)| (i, delta_e(c.to_lab(), target)))
        .fold(None, |best: Option<(usize, f32)>, (i, d)| match best {
            Some((_, best_d)) if best_d <= d => best,
            _ => Some((i, d)),
        });

    if let Some((idx, _)) = closest {
        let base = palette.remove(idx);
        palette.insert(0, base);
    }
}

/// Sort bands 1..N by ascending pixel count, keeping band 0 in place
fn reorder_thin_features(img: &RgbaImage, palette: &mut [Color]) -> Result<()> {
    if palette.len() < 3 {
        return Ok(());
    }

    let counts = assign_bands(img, palette)?.counts(palette.len());
    let mut upper: Vec<(Color, usize)> = palette[1..]
        .iter()
        .copied()
        .zip(counts[1..].iter().copied())
        .collect();
    upper.sort_by_key(|&(_, count)| count);

    for (slot, (color, _)) in palette[1..].iter_mut().zip(upper) {
        *slot = color;
    }
    Ok(())
}

// ============================================================================
// UNIQUENESS
// ============================================================================

/// Replace repeated entries so no two palette colors are identical.
///
/// A duplicate is swapped for a random image pixel whose squared RGB distance
/// to every color already used exceeds the threshold. After the configured
/// number of misses a random RGB triple is used instead.
fn enforce_unique<R: Rng>(
    palette: &mut [Color],
    img: &RgbaImage,
    settings: &PaletteSettings,
    rng: &mut R,
) {
    let (width, height) = img.dimensions();
    let mut used: HashSet<Color> = HashSet::new();

    for i in 0..palette.len() {
        if used.insert(palette[i]) {
            continue;
        }

        let distinct = |c: Color, used: &HashSet<Color>| {
            used.iter()
                .all(|&u| rgb_distance_sq(c, u) > settings.distinct_rgb_threshold)
        };

        let mut replacement = None;
        for _ in 0..settings.uniqueness_attempts {
            let x = rng.gen_range(0..width);
            let y = rng.gen_range(0..height);
            let candidate = Color::from_rgba(img.get_pixel(x, y));
            if distinct(candidate, &used) {
                replacement = Some(candidate);
                break;
            }
        }

        let color = match replacement {
            Some(color) => color,
            None => {
                warn!(
                    index = i,
                    "No distinct image color found, falling back to a random color"
                );
                loop {
                    let candidate = Color::new(rng.gen(), rng.gen(), rng.gen());
                    if !used.contains(&candidate) {
                        break candidate;
                    }
                }
            }
        };

        debug!(index = i, from = %palette[i], to = %color, "Replaced duplicate palette entry");
        palette[i] = color;
        used.insert(color);
    }
}

// ============================================================================
// TESTS
// ============================================================================
