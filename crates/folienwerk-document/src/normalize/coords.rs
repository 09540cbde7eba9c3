// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Box edge normalisation: snaps nearly aligned edges onto a shared value so
// text on a slide lines up.

use folienwerk_core::{PointF, TextElement};
use tracing::debug;

use super::{round_half_point, snap_values};

/// Edges within this many points of a cluster's anchor join the cluster.
pub const EDGE_TOLERANCE: f32 = 3.0;

/// Cluster each of the four box edges independently across all elements and
/// snap every cluster to the half point nearest its mean.
///
/// The origin moves with the box: by the shift of `x0` horizontally and of
/// `y1` vertically. This approximates baseline alignment; the baseline is
/// not exactly `y1`. An axis whose snapped edges would cross keeps its
/// original edges.
pub fn normalize_coordinates(elements: &mut [TextElement]) {
    if elements.is_empty() {
        return;
    }

    let edge = |pick: fn(&TextElement) -> f32| -> Vec<f32> {
        let values: Vec<f32> = elements.iter().map(pick).collect();
        snap_values(&values, EDGE_TOLERANCE, round_half_point)
    };
    let x0s = edge(|e| e.bbox.x0);
    let y0s = edge(|e| e.bbox.y0);
    let x1s = edge(|e| e.bbox.x1);
    let y1s = edge(|e| e.bbox.y1);

    let mut kept_axes = 0usize;
    for (i, element) in elements.iter_mut().enumerate() {
        let old = element.bbox;
        let mut bbox = old;
        if x1s[i] > x0s[i] {
            bbox.x0 = x0s[i];
            bbox.x1 = x1s[i];
        } else {
            kept_axes += 1;
        }
        if y1s[i] > y0s[i] {
            bbox.y0 = y0s[i];
            bbox.y1 = y1s[i];
        } else {
            kept_axes += 1;
        }

        let dx = bbox.x0 - old.x0;
        let dy = bbox.y1 - old.y1;
        element.bbox = bbox;
        element.origin = PointF::new(element.origin.x + dx, element.origin.y + dy);
    }
    debug!(kept_axes, "box edges normalised");
}
