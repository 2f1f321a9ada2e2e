// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Compression strategy selection.

use pagewerk_core::config::SelectorThresholds;
use pagewerk_core::types::{CompressionMethod, StructuralProfile};
use tracing::debug;

/// Method to try first for a document of this shape and size.
pub fn primary_method(
    profile: &StructuralProfile,
    byte_size: u64,
    thresholds: &SelectorThresholds,
) -> CompressionMethod {
    if profile.has_raster_images {
        if byte_size > thresholds.extreme_above_bytes {
            CompressionMethod::Extreme
        } else if byte_size > thresholds.aggressive_above_bytes {
            CompressionMethod::Aggressive
        } else {
            CompressionMethod::Balanced
        }
    } else if profile.has_text {
        CompressionMethod::Light
    } else {
        CompressionMethod::Balanced
    }
}

/// Every method exactly once, starting with `primary`.
///
/// The rest follow by distance from the primary on the light..extreme
/// scale; on a tie the less destructive method goes first.
pub fn fallback_order(primary: CompressionMethod) -> Vec<CompressionMethod> {
    let mut order = CompressionMethod::ALL.to_vec();
    order.sort_by_key(|method| (method.rank().abs_diff(primary.rank()), method.rank()));
    order
}

/// Ordered list of candidate methods for a document.
pub fn select(
    profile: &StructuralProfile,
    byte_size: u64,
    thresholds: &SelectorThresholds,
) -> Vec<CompressionMethod> {
    let primary = primary_method(profile, byte_size, thresholds);
    let order = fallback_order(primary);
    debug!(?profile, byte_size, %primary, ?order, "Compression strategy selected");
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use pagewerk_core::config::MIB;
    use CompressionMethod::*;

    fn profile(has_text: bool, has_raster_images: bool) -> StructuralProfile {
        StructuralProfile {
            page_count: 3,
            has_text,
            has_raster_images,
            byte_size: 0,
        }
    }

    #[test]
    fn selection_table() {
        let t = SelectorThresholds::default();
        assert_eq!(primary_method(&profile(false, true), 120 * MIB, &t), Extreme);
        assert_eq!(primary_method(&profile(true, true), 20 * MIB, &t), Aggressive);
        assert_eq!(primary_method(&profile(false, true), 2 * MIB, &t), Balanced);
        assert_eq!(primary_method(&profile(true, false), 80 * MIB, &t), Light);
        assert_eq!(primary_method(&profile(false, false), MIB, &t), Balanced);
    }

    #[test]
    fn thresholds_are_strict() {
        let t = SelectorThresholds::default();
        assert_eq!(primary_method(&profile(false, true), 50 * MIB, &t), Aggressive);
        assert_eq!(primary_method(&profile(false, true), 10 * MIB, &t), Balanced);
    }

    #[test]
    fn large_raster_document_walks_down_from_extreme() {
        let order = select(&profile(false, true), 120 * MIB, &SelectorThresholds::default());
        assert_eq!(order, vec![Extreme, Aggressive, Balanced, Light]);
    }

    #[test]
    fn text_document_walks_up_from_light() {
        assert_eq!(fallback_order(Light), vec![Light, Balanced, Aggressive, Extreme]);
    }

    #[test]
    fn middle_primaries_prefer_gentler_neighbour() {
        assert_eq!(fallback_order(Balanced), vec![Balanced, Light, Aggressive, Extreme]);
        assert_eq!(fallback_order(Aggressive), vec![Aggressive, Balanced, Extreme, Light]);
    }

    #[test]
    fn custom_thresholds_apply() {
        let t = SelectorThresholds {
            extreme_above_bytes: 4 * MIB,
            aggressive_above_bytes: MIB,
        };
        assert_eq!(primary_method(&profile(false, true), 5 * MIB, &t), Extreme);
    }
}
