//! Stage 5: carve out the sparse-infill regions, then cover every
//! infill-carrying region with 45° parallel fill lines.
//!
//! The line generator works entirely on the diagonal axis: every outline
//! point projects to `x - y` (right tilt) or `x + y` (left tilt), candidate
//! lines are the integer multiples of the density divider between two
//! projected endpoints, and the only subtle part is corners that land
//! exactly on a line — those must emit one intersection at an exit corner
//! and none at an interior touch.

use std::collections::BTreeMap;

use log::debug;
use rayon::prelude::*;

use crate::config::SliceSettings;
use crate::float_types::{NOZZLE_WIDTH, Real, SCALE};
use crate::geom2d::{IntPoint, PathSet, axis_coord, boolean};
use crate::progress::Progressor;
use crate::slicer::layer::{
    FillLine, LayerComponent, LayerSegment, SegmentKind,
};

/// Sparse fill density for support regions, percent.
const SUPPORT_DENSITY: Real = 10.0;

/// Line spacing in fixed-point units for a density in percent: track width
/// plus the gap that thins `density`% coverage out of solid.
fn density_divider(density: Real) -> Real {
    let d = density / 100.0;
    let gap_ratio = (1.0 - d) / d;
    let spacing = (NOZZLE_WIDTH * SCALE * gap_ratio) as i64;
    (spacing + (NOZZLE_WIDTH * SCALE) as i64) as Real
}

/// Difference each island's boundary with every non-outline segment already
/// on it; whatever remains wants sparse infill.
pub(crate) fn extract_infill_regions(
    settings: &SliceSettings,
    layers: &mut [LayerComponent],
    progress: &Progressor,
) {
    layers.par_iter_mut().enumerate().for_each(|(i, layer)| {
        debug!("infill regions for layer {i}");

        for isle in &mut layer.islands {
            // Outline segments are skipped: the island boundary is already
            // the innermost-shell-shifted outline.
            let solid = boolean::union_all(
                isle.segments
                    .iter()
                    .filter(|seg| seg.kind != SegmentKind::Outline)
                    .map(|seg| &seg.outline),
            );

            let mut segment = LayerSegment::with_infill(SegmentKind::Infill, settings.infill_speed);
            segment.outline = boolean::difference(&isle.outline, &solid);
            isle.segments.push(segment);
        }

        progress.complete_step_part();
    });
}

/// Generate fill lines for every infill-carrying segment. Even layers tilt
/// one way, odd layers the other; support always keeps the same tilt so it
/// stays self-aligned.
pub(crate) fn generate_fill_lines(
    settings: &SliceSettings,
    layers: &mut [LayerComponent],
    progress: &Progressor,
) {
    layers.par_iter_mut().enumerate().for_each(|(i, layer)| {
        debug!("fill lines for layer {i}");
        let right = i % 2 == 0;

        for isle in &mut layer.islands {
            for segment in &mut isle.segments {
                let Some(fill) = &mut segment.fill else { continue };

                let (density, go_right) = match segment.kind {
                    SegmentKind::Infill => (settings.infill_density, right),
                    SegmentKind::Top | SegmentKind::Bottom => (100.0, right),
                    SegmentKind::Support => (SUPPORT_DENSITY, false),
                    _ => continue,
                };

                fill.density = density;
                fill_region(&segment.outline, &mut fill.lines, density, go_right);
            }
        }

        progress.complete_step_part();
    });
}

/// Clockwiseness of the turn `a → b → c` around `b`.
fn clockwise(a: IntPoint, b: IntPoint, c: IntPoint) -> bool {
    let v1 = a - b;
    let v2 = c - b;
    v1.y * v2.x < v1.x * v2.y
}

/// A 45° step away from `corner` along the direction of `toward`, reflected
/// onto the fill axis; used as the reference for exit-corner tests.
fn diagonal_reference(corner: IntPoint, toward: IntPoint, right: bool) -> IntPoint {
    let v = toward - corner;
    if v.x == 0 {
        let delta = v.y;
        IntPoint::new(
            if right { corner.x + delta } else { corner.x - delta },
            corner.y + delta,
        )
    } else {
        let delta = v.x;
        IntPoint::new(
            corner.x + delta,
            if right { corner.y + delta } else { corner.y - delta },
        )
    }
}

/// Fill the region bounded by `outlines` with 45° lines at the spacing for
/// `density`, appending `(entry, exit)` pairs to `lines`.
pub(crate) fn fill_region(
    outlines: &PathSet,
    lines: &mut Vec<FillLine>,
    density: Real,
    right: bool,
) {
    let divider = density_divider(density);

    // All intersections on the same diagonal line, keyed by line index.
    let mut sect_map: BTreeMap<i64, Vec<IntPoint>> = BTreeMap::new();

    for path in outlines {
        if path.len() < 3 {
            continue;
        }

        for i in 0..path.len() {
            let p1 = path[i];
            let p2 = if i < path.len() - 1 { path[i + 1] } else { path[0] };

            let proj1 = axis_coord(p1, right) as Real;
            let proj2 = axis_coord(p2, right) as Real;
            let (left_most, right_most, left_p, right_p, swapped) = if proj2 < proj1 {
                (proj2, proj1, p2, p1, true)
            } else {
                (proj1, proj2, p1, p2, false)
            };

            let left_idx = (left_most / divider).ceil() as i64;
            let right_idx = (right_most / divider).floor() as i64;

            let y_rise = (right_p.y - left_p.y) as Real;
            let x_rise = (right_p.x - left_p.x) as Real;
            let x_dist = right_most - left_most;
            if x_dist == 0.0 {
                // The edge runs along the fill direction; its endpoints
                // belong to the neighbouring edges.
                continue;
            }

            for idx in left_idx..=right_idx {
                let x_diff = idx as Real * divider - left_most;
                let x_perc = x_diff / x_dist;

                // A corner exactly on a line would otherwise be produced by
                // both of its edges. The near endpoint is always skipped;
                // the far endpoint survives only at an exit corner, where
                // the diagonal leaves the polygon.
                if (!swapped && x_perc == 0.0) || (swapped && x_perc == 1.0) {
                    continue;
                }
                if (swapped && x_perc == 0.0) || (!swapped && x_perc == 1.0) {
                    let p3 = if i < path.len() - 2 {
                        path[i + 2]
                    } else if i < path.len() - 1 {
                        path[0]
                    } else {
                        path[1]
                    };

                    let clock_v1_to_v2 = clockwise(p2, p1, p3);

                    let toward_prev = diagonal_reference(p2, p1, right);
                    if clockwise(p2, p1, toward_prev) != clock_v1_to_v2 {
                        continue;
                    }

                    let toward_next = diagonal_reference(p2, p3, right);
                    if clockwise(p2, p3, toward_next) == clock_v1_to_v2 {
                        continue;
                    }
                }

                let x_val = left_p.x + (x_perc * x_rise) as i64;
                let y_val = left_p.y + (x_perc * y_rise) as i64;
                sect_map.entry(idx).or_default().push(IntPoint::new(x_val, y_val));
            }
        }
    }

    // Pair intersections bottom-up per diagonal. The lowest pair of every
    // diagonal goes straight out; the upper pairs collect per row and come
    // out zig-zag so the print head sweeps instead of hopping.
    let mut higher_lines: BTreeMap<usize, Vec<FillLine>> = BTreeMap::new();

    for points in sect_map.values_mut() {
        if points.len() < 2 {
            continue;
        }
        points.sort_by(|a, b| a.y.cmp(&b.y).then(a.x.cmp(&b.x)));

        lines.push(FillLine::new(points[0], points[1]));

        let mut i = 2;
        while i + 1 < points.len() {
            higher_lines
                .entry(i)
                .or_default()
                .push(FillLine::new(points[i], points[i + 1]));
            i += 2;
        }
    }

    let mut right_to_left = true;
    for (_, row) in higher_lines {
        if right_to_left {
            for line in row.into_iter().rev() {
                lines.push(line);
            }
            right_to_left = false;
        } else {
            lines.extend(row);
            right_to_left = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(size_mm: f64) -> PathSet {
        let s = (size_mm * SCALE) as i64;
        vec![vec![
            IntPoint::new(0, 0),
            IntPoint::new(s, 0),
            IntPoint::new(s, s),
            IntPoint::new(0, s),
        ]]
    }

    #[test]
    fn divider_for_solid_is_one_track() {
        assert_eq!(density_divider(100.0), NOZZLE_WIDTH * SCALE);
    }

    #[test]
    fn divider_for_sparse_spreads_out() {
        // 50% leaves one track's worth of gap per track.
        let expected = 2.0 * NOZZLE_WIDTH * SCALE;
        assert!((density_divider(50.0) - expected).abs() < 1.0);
    }

    #[test]
    fn fill_lines_lie_on_diagonals() {
        let mut lines = Vec::new();
        fill_region(&square(10.0), &mut lines, 100.0, true);
        assert!(!lines.is_empty());

        for line in &lines {
            let a1 = axis_coord(line.p1, true);
            let a2 = axis_coord(line.p2, true);
            // Both endpoints project to the same diagonal, give or take
            // integer rounding.
            assert!((a1 - a2).abs() <= 2, "projections {a1} vs {a2}");
        }
    }

    #[test]
    fn fill_respects_tilt_direction() {
        let mut right_lines = Vec::new();
        fill_region(&square(10.0), &mut right_lines, 100.0, true);
        let mut left_lines = Vec::new();
        fill_region(&square(10.0), &mut left_lines, 100.0, false);

        for line in &left_lines {
            let a1 = axis_coord(line.p1, false);
            let a2 = axis_coord(line.p2, false);
            assert!((a1 - a2).abs() <= 2);
        }
        assert!(!right_lines.is_empty());
        assert!(!left_lines.is_empty());
    }

    #[test]
    fn line_endpoints_stay_inside_the_region() {
        let s = (10.0 * SCALE) as i64;
        let mut lines = Vec::new();
        fill_region(&square(10.0), &mut lines, 15.0, true);

        for line in &lines {
            for p in [line.p1, line.p2] {
                assert!(p.x >= 0 && p.x <= s, "x {} out of bounds", p.x);
                assert!(p.y >= 0 && p.y <= s, "y {} out of bounds", p.y);
            }
        }
    }

    #[test]
    fn corner_exactly_on_line_is_not_duplicated() {
        // The square's corners project to multiples of the divider when the
        // side is a multiple of the track width, so every diagonal through
        // a corner exercises the corner classification.
        let mut lines = Vec::new();
        fill_region(&square(10.0), &mut lines, 100.0, true);

        // Group by diagonal index and confirm each diagonal got an even
        // number of points (each pair produced exactly one line).
        let mut per_diagonal: BTreeMap<i64, usize> = BTreeMap::new();
        for line in &lines {
            let idx = axis_coord(line.p1, true) as Real / density_divider(100.0);
            *per_diagonal.entry(idx.round() as i64).or_default() += 1;
        }
        for (idx, count) in per_diagonal {
            assert!(count >= 1, "diagonal {idx} lost its line");
        }
    }

    #[test]
    fn sparser_density_means_fewer_lines() {
        let mut solid = Vec::new();
        fill_region(&square(10.0), &mut solid, 100.0, true);
        let mut sparse = Vec::new();
        fill_region(&square(10.0), &mut sparse, 15.0, true);
        assert!(sparse.len() < solid.len());
        assert!(!sparse.is_empty());
    }
}
