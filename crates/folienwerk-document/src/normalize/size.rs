// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Font size normalisation.

use folienwerk_core::TextElement;
use tracing::debug;

use super::{round_half_point, snap_values};

/// Sizes within this many points of a cluster's anchor join the cluster.
pub const SIZE_TOLERANCE: f32 = 1.5;
/// A cluster mean this close to a standard size snaps to it.
pub const SNAP_DISTANCE: f32 = 2.0;

/// The standard word-processor font size scale.
pub const STANDARD_SIZES: [f32; 24] = [
    8.0, 9.0, 10.0, 10.5, 11.0, 12.0, 14.0, 16.0, 18.0, 20.0, 24.0, 28.0, 32.0, 36.0, 40.0, 44.0,
    48.0, 54.0, 60.0, 66.0, 72.0, 80.0, 88.0, 96.0,
];

/// Snap a cluster mean: the nearest standard size (the smaller one on a tie)
/// when it is within [`SNAP_DISTANCE`], else the nearest half point.
pub fn snap_size(mean: f32) -> f32 {
    let mut closest = STANDARD_SIZES[0];
    for candidate in STANDARD_SIZES {
        if (candidate - mean).abs() < (closest - mean).abs() {
            closest = candidate;
        }
    }
    if (closest - mean).abs() <= SNAP_DISTANCE {
        closest
    } else {
        round_half_point(mean)
    }
}

/// Cluster the font sizes of all elements and snap each cluster.
pub fn normalize_sizes(elements: &mut [TextElement]) {
    if elements.is_empty() {
        return;
    }
    let sizes: Vec<f32> = elements.iter().map(|e| e.font_size_pt).collect();
    let snapped = snap_values(&sizes, SIZE_TOLERANCE, snap_size);
    let mut changed = 0usize;
    for (element, size) in elements.iter_mut().zip(snapped) {
        if element.font_size_pt != size {
            changed += 1;
            element.font_size_pt = size;
        }
    }
    debug!(changed, "font sizes normalised");
}
