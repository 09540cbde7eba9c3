// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Normalisation passes over extracted text elements: font sizes, box edges,
// and box extents.

pub mod content_fit;
pub mod coords;
pub mod size;

use folienwerk_core::{NormalizeOptions, TextElement};
use tracing::{debug, instrument};

pub use content_fit::fit_boxes_to_content;
pub use coords::normalize_coordinates;
pub use size::{STANDARD_SIZES, normalize_sizes};

/// Run the enabled passes in order: sizes, coordinates, content fit.
#[instrument(skip_all, fields(elements = elements.len()))]
pub fn normalize(elements: &mut [TextElement], options: &NormalizeOptions) {
    if options.sizes {
        normalize_sizes(elements);
    }
    if options.coordinates {
        normalize_coordinates(elements);
    }
    if options.content_fit {
        fit_boxes_to_content(elements);
    }
    debug!("normalisation complete");
}

/// Greedy anchor clustering.
///
/// Walks the indices of `values` in ascending value order. A cluster starts
/// at the smallest unassigned value (its anchor) and takes every following
/// value less than `tolerance` above the anchor. Returns clusters of indices
/// into `values`, in ascending order.
pub(crate) fn cluster_indices(values: &[f32], tolerance: f32) -> Vec<Vec<usize>> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));

    let mut clusters: Vec<Vec<usize>> = Vec::new();
    let mut anchor = f32::NAN;
    for index in order {
        let value = values[index];
        match clusters.last_mut() {
            Some(current) if value - anchor < tolerance => current.push(index),
            _ => {
                anchor = value;
                clusters.push(vec![index]);
            }
        }
    }
    clusters
}

/// Map every value to the snapped mean of its cluster. One greedy pass: the
/// snapped values are not clustered again, so neighbouring clusters whose
/// targets land within `tolerance` of each other stay apart.
pub(crate) fn snap_values(
    values: &[f32],
    tolerance: f32,
    snap: impl Fn(f32) -> f32,
) -> Vec<f32> {
    let mut snapped = values.to_vec();
    for cluster in cluster_indices(values, tolerance) {
        let mean = cluster.iter().map(|&i| values[i]).sum::<f32>() / cluster.len() as f32;
        let target = snap(mean);
        for i in cluster {
            snapped[i] = target;
        }
    }
    snapped
}

/// Round to the nearest half point, ties to even.
pub(crate) fn round_half_point(value: f32) -> f32 {
    (value * 2.0).round_ties_even() / 2.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anchor_not_mean_bounds_a_cluster() {
        // 11.4 is within 1.5 of the anchor 10; 11.6 is not.
        let clusters = cluster_indices(&[11.4, 10.0, 11.6, 10.5], 1.5);
        assert_eq!(clusters, vec![vec![1, 3, 0], vec![2]]);
    }

    #[test]
    fn values_a_tolerance_apart_never_share_a_cluster() {
        let values = [3.0, 4.5, 6.0, 7.49];
        let clusters = cluster_indices(&values, 1.5);
        assert_eq!(clusters, vec![vec![0], vec![1], vec![2, 3]]);
    }

    #[test]
    fn empty_input_has_no_clusters() {
        assert!(cluster_indices(&[], 3.0).is_empty());
    }

    #[test]
    fn half_point_rounding_ties_to_even() {
        assert_eq!(round_half_point(10.25), 10.0);
        assert_eq!(round_half_point(10.75), 11.0);
        assert_eq!(round_half_point(10.3), 10.5);
    }

    #[test]
    fn snapped_clusters_are_not_merged_again() {
        // {0, 2.9} snaps to 1.5, within 3.0 of 4.0, but the pass runs once.
        let snapped = snap_values(&[0.0, 2.9, 4.0], 3.0, round_half_point);
        assert_eq!(snapped, vec![1.5, 1.5, 4.0]);
    }
}
