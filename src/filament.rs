//! Filament Matcher
//!
//! Maps each structural palette color onto a color the user actually owns.
//! All (palette, inventory) pairs are sorted by squared RGB distance and
//! committed greedily, so every palette slot and every spool is used at most
//! once while spools last. This approximates, but does not guarantee, the
//! minimum-cost assignment.
//!
//! The result is a render palette only. The structural palette and any band
//! raster derived from it are never touched.

use serde::{Deserialize, Serialize};
use crate::color::{rgb_distance_sq, Color};

/// One spool in the caller's inventory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filament {
    pub id: String,
    pub name: String,
    /// PLA, PETG, ...
    pub material: String,
    pub color: Color,
}

/// Inventory index chosen for each palette slot, in palette order.
///
/// Empty inventory yields an empty assignment.
pub fn assign_filaments(palette: &[Color], inventory: &[Filament]) -> Vec<usize> {
    if inventory.is_empty() {
        return Vec::new();
    }

    let mut pairs: Vec<(u32, usize, usize)> = Vec::with_capacity(palette.len() * inventory.len());
    for (pi, &color) in palette.iter().enumerate() {
        for (fi, filament) in inventory.iter().enumerate() {
            pairs.push((rgb_distance_sq(color, filament.color), pi, fi));
        }
    }
    // Stable: equal distances keep palette-major order
    pairs.sort_by_key(|&(dist, _, _)| dist);

    let mut assigned: Vec<Option<usize>> = vec![None; palette.len()];
    let mut used = vec![false; inventory.len()];

    for (_, pi, fi) in pairs {
        if assigned[pi].is_some() || used[fi] {
            continue;
        }
        assigned[pi] = Some(fi);
        used[fi] = true;
    }

    // Slots left over once the inventory ran out
    assigned
        .into_iter()
        .map(|slot| {
            slot.unwrap_or_else(|| match used.iter().position(|&u| !u) {
                Some(fi) => {
                    used[fi] = true;
                    fi
                }
                None => 0,
            })
        })
        .collect()
}

/// Render palette built from the inventory.
///
/// Returns the structural palette unchanged when the inventory is empty.
pub fn match_filaments(palette: &[Color], inventory: &[Filament]) -> Vec<Color> {
    if inventory.is_empty() {
        return palette.to_vec();
    }

    assign_filaments(palette, inventory)
        .into_iter()
        .map(|fi| inventory[fi].color)
        .collect()
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn spool(id: &str, hex: &str) -> Filament {
        Filament {
            id: id.to_string(),
            name: format!("Spool {}", id),
            material: "PLA".to_string(),
            color: Color::from_hex(hex).unwrap(),
        }
    }

    #[test]
    fn test_empty_inventory_returns_palette() {
        let palette = vec![Color::BLACK, Color::WHITE];
        assert_eq!(match_filaments(&palette, &[]), palette);
        assert!(assign_filaments(&palette, &[]).is_empty());
    }

    #[test]
    fn test_each_color_gets_closest_spool() {
        let palette = [Color::new(250, 5, 5), Color::new(5, 5, 250), Color::new(240, 240, 240)];
        let inventory = [
            spool("w", "#ffffff"),
            spool("r", "#ff0000"),
            spool("b", "#0000ff"),
            spool("k", "#000000"),
        ];
        let render = match_filaments(&palette, &inventory);
        assert_eq!(
            render,
            vec![Color::new(255, 0, 0), Color::new(0, 0, 255), Color::WHITE]
        );
    }

    #[test]
    fn test_greedy_global_order() {
        // Both palette colors prefer the dark spool; the closer pair wins it
        let palette = [Color::new(60, 60, 60), Color::new(10, 10, 10)];
        let inventory = [spool("k", "#000000"), spool("g", "#808080")];
        assert_eq!(assign_filaments(&palette, &inventory), vec![1, 0]);
    }

    #[test]
    fn test_injective_when_inventory_large_enough() {
        let palette: Vec<Color> = (0..6).map(|i| Color::new(i * 40, 100, 255 - i * 40)).collect();
        let inventory: Vec<Filament> = (0..8)
            .map(|i| spool(&i.to_string(), &Color::new(i * 30, 90, 200).to_hex()))
            .collect();
        let assignment = assign_filaments(&palette, &inventory);
        let distinct: HashSet<usize> = assignment.iter().copied().collect();
        assert_eq!(distinct.len(), palette.len());
    }

    #[test]
    fn test_small_inventory_uses_all_before_repeating() {
        let palette: Vec<Color> = (0..5).map(|i| Color::new(i * 50, i * 50, i * 50)).collect();
        let inventory = [spool("a", "#000000"), spool("b", "#ffffff"), spool("c", "#777777")];
        let assignment = assign_filaments(&palette, &inventory);
        assert_eq!(assignment.len(), 5);
        let distinct: HashSet<usize> = assignment.iter().copied().collect();
        assert_eq!(distinct.len(), inventory.len());
        // Exhausted inventory repeats spool 0
        assert_eq!(assignment.iter().filter(|&&fi| fi == 0).count(), 3);
    }

    #[test]
    fn test_structural_palette_untouched() {
        let palette = vec![Color::new(1, 2, 3), Color::new(200, 100, 50)];
        let before = palette.clone();
        let _ = match_filaments(&palette, &[spool("x", "#123456")]);
        assert_eq!(palette, before);
    }
}
