//! Stage 7: turn each layer's segments into an ordered stream of travel,
//! extrude, and retract motions.
//!
//! Layers are planned independently (each from the tool-head origin) and a
//! single-threaded pass afterwards rewrites every layer's initial Z-travel
//! to start where the previous layer actually ended, so the result is
//! identical for any worker count.

use log::debug;
use rayon::prelude::*;

use crate::config::SliceSettings;
use crate::float_types::{Real, SCALE, UNITS_PER_MM};
use crate::geom2d::{IntPoint, IntPoint3, PathSet, in_a_line, squared_dist};
use crate::progress::Progressor;
use crate::slicer::layer::{FillLine, LayerComponent, ToolSegment};

pub(crate) fn plan_toolpaths(
    settings: &SliceSettings,
    layers: &mut [LayerComponent],
    progress: &Progressor,
) {
    debug!("planning toolpaths for {} layers", layers.len());

    let last_points: Vec<IntPoint> = layers
        .par_iter_mut()
        .enumerate()
        .map(|(i, layer)| {
            let end = plan_layer(i, layer, settings);
            progress.complete_step_part();
            end
        })
        .collect();

    // Stitch the layers together: each initial Z move starts where the
    // previous layer finished.
    for i in 1..layers.len() {
        if let Some(ToolSegment::Travel { from, .. }) = layers[i].initial_moves.first_mut() {
            from.x = last_points[i - 1].x;
            from.y = last_points[i - 1].y;
        }
    }
}

fn plan_layer(index: usize, layer: &mut LayerComponent, settings: &SliceSettings) -> IntPoint {
    debug!("toolpath for layer {index}");

    let scaled_height = settings.layer_height * SCALE;
    let mut last_point = IntPoint::new(0, 0);

    // Extrude half a layer height above the slice plane so the bead has
    // room to form.
    let last_z = ((index as Real - 0.5) * scaled_height).max(0.0) as i64;
    let new_z = ((index as Real + 0.5) * scaled_height) as i64;
    layer.initial_moves.push(ToolSegment::Travel {
        from: IntPoint3::from_xy(last_point, last_z),
        to: IntPoint3::from_xy(last_point, new_z),
        speed: layer.layer_speed,
    });
    let last_z = new_z;

    let move_speed = layer.move_speed;
    let isle_count = layer.islands.len();
    let mut used = vec![false; isle_count];
    let mut isles_left = isle_count;

    // Keep jumping to the nearest unvisited island until none remain.
    while isles_left > 0 {
        let mut closest_isle = 0usize;
        let mut closest_point = 0usize;
        let mut closest_dist = i64::MAX;

        for j in 0..isle_count {
            if used[j] {
                continue;
            }
            let isle = &layer.islands[j];
            let out_path = isle
                .segments
                .first()
                .and_then(|seg| seg.outline.first())
                .filter(|path| !path.is_empty());
            let Some(out_path) = out_path else {
                // Nothing printable on this island.
                used[j] = true;
                isles_left -= 1;
                continue;
            };

            if find_closest_point(out_path, last_point, &mut closest_point, &mut closest_dist) {
                closest_isle = j;
            }
        }

        if closest_dist == i64::MAX {
            break;
        }

        used[closest_isle] = true;
        isles_left -= 1;

        let isle = &mut layer.islands[closest_isle];
        let mut first_seg = true;

        for seg in &mut isle.segments {
            if seg.outline.is_empty() {
                continue;
            }

            if let Some(fill) = &mut seg.fill {
                if fill.lines.is_empty() {
                    continue;
                }

                // Enter at whichever fill-line endpoint is nearest,
                // flipping that line if its far end is the closer one.
                let mut best_dist = i64::MAX;
                let mut best_idx = 0usize;
                let mut best_swapped = false;
                for (k, line) in fill.lines.iter().enumerate() {
                    let d1 = squared_dist(last_point, line.p1);
                    if d1 < best_dist {
                        best_dist = d1;
                        best_idx = k;
                        best_swapped = false;
                    }
                    let d2 = squared_dist(last_point, line.p2);
                    if d2 < best_dist {
                        best_dist = d2;
                        best_idx = k;
                        best_swapped = true;
                    }
                }
                if best_swapped {
                    fill.lines[best_idx].swap_points();
                }

                add_retracted_move(
                    &mut seg.tool_segments,
                    last_point,
                    fill.lines[best_idx].p1,
                    move_speed,
                    last_z,
                    settings,
                );

                let mut first_line = true;
                for k in best_idx..fill.lines.len() {
                    extrude_line(
                        k,
                        &mut last_point,
                        last_z,
                        &mut first_line,
                        move_speed,
                        seg.speed,
                        &seg.outline,
                        &mut fill.lines,
                        &mut seg.tool_segments,
                    );
                }
                for k in 0..best_idx {
                    extrude_line(
                        k,
                        &mut last_point,
                        last_z,
                        &mut first_line,
                        move_speed,
                        seg.speed,
                        &seg.outline,
                        &mut fill.lines,
                        &mut seg.tool_segments,
                    );
                }
            } else {
                for path_idx in 0..seg.outline.len() {
                    let path = &seg.outline[path_idx];
                    if path.is_empty() {
                        continue;
                    }

                    let clos_idx = if first_seg && closest_point < path.len() {
                        first_seg = false;
                        closest_point
                    } else {
                        first_seg = false;
                        let mut dist = i64::MAX;
                        let mut idx = 0usize;
                        find_closest_point(path, last_point, &mut idx, &mut dist);
                        idx
                    };

                    add_retracted_move(
                        &mut seg.tool_segments,
                        last_point,
                        path[clos_idx],
                        move_speed,
                        last_z,
                        settings,
                    );

                    // Wrap once around the loop starting at the entry point.
                    for k in clos_idx..path.len() - 1 {
                        seg.tool_segments.push(ToolSegment::Extrude {
                            from: IntPoint3::from_xy(path[k], last_z),
                            to: IntPoint3::from_xy(path[k + 1], last_z),
                            speed: seg.speed,
                        });
                    }
                    seg.tool_segments.push(ToolSegment::Extrude {
                        from: IntPoint3::from_xy(path[path.len() - 1], last_z),
                        to: IntPoint3::from_xy(path[0], last_z),
                        speed: seg.speed,
                    });
                    for k in 0..clos_idx {
                        seg.tool_segments.push(ToolSegment::Extrude {
                            from: IntPoint3::from_xy(path[k], last_z),
                            to: IntPoint3::from_xy(path[k + 1], last_z),
                            speed: seg.speed,
                        });
                    }

                    last_point = path[clos_idx];
                }
            }
        }
    }

    last_point
}

/// Bisect toward the closer interval end; an approximate nearest point on
/// an unordered loop, but a stable one, and the planner's tie-breaking
/// depends on exactly this walk. Updates the running best and reports
/// whether it improved.
fn find_closest_point(
    path: &[IntPoint],
    from: IntPoint,
    closest_point: &mut usize,
    closest_dist: &mut i64,
) -> bool {
    let mut low = 0usize;
    let mut up = path.len() - 1;
    let mut mid = 0usize;

    while low != up {
        mid = (low + up) / 2;

        if mid == low {
            if squared_dist(from, path[up]) < squared_dist(from, path[low]) {
                mid = up;
            }
            break;
        }

        if squared_dist(from, path[low]) < squared_dist(from, path[mid]) {
            up = mid;
        } else {
            low = mid;
        }
    }

    let dist = squared_dist(from, path[mid]);
    if dist < *closest_dist {
        *closest_dist = dist;
        *closest_point = mid;
        true
    } else {
        false
    }
}

/// Travel from `p1` to `p2`, preceded by a retraction when the hop is long
/// enough to ooze and retraction is enabled at all.
fn add_retracted_move(
    tool_segments: &mut Vec<ToolSegment>,
    p1: IntPoint,
    p2: IntPoint,
    move_speed: u32,
    z: i64,
    settings: &SliceSettings,
) {
    if settings.retraction_speed > 0 && settings.retraction_distance > 0.0 {
        const MIN_DIST: i64 = 10 * UNITS_PER_MM;
        if squared_dist(p1, p2) > MIN_DIST * MIN_DIST {
            tool_segments.push(ToolSegment::Retract {
                distance: (settings.retraction_distance * SCALE) as i64,
            });
        }
    }

    tool_segments.push(ToolSegment::Travel {
        from: IntPoint3::from_xy(p1, z),
        to: IntPoint3::from_xy(p2, z),
        speed: move_speed,
    });
}

/// Extrude one fill line, first walking the tool head along the region
/// outline from the previous line's end to this line's start.
///
/// The bracket search asks which two outline vertices the current position
/// lies between, then fans out in both directions along the loop for a
/// bracket around the target; whichever direction brackets in fewer steps
/// wins, and the nearest vertex seen serves as the exit when neither
/// direction finds a strict bracket.
#[allow(clippy::too_many_arguments)]
fn extrude_line(
    line_idx: usize,
    last_point: &mut IntPoint,
    z: i64,
    first_line: &mut bool,
    move_speed: u32,
    segment_speed: u32,
    outline: &PathSet,
    lines: &mut [FillLine],
    tool_segments: &mut Vec<ToolSegment>,
) {
    if *first_line {
        *first_line = false;
    } else {
        if squared_dist(*last_point, lines[line_idx].p2)
            < squared_dist(*last_point, lines[line_idx].p1)
        {
            lines[line_idx].swap_points();
        }
        let line = lines[line_idx];

        // Locate the outline edge the previous endpoint sits on, falling
        // back to the nearest outline vertex.
        let mut nearest_dist = i64::MAX;
        let mut nearest: Option<(usize, usize)> = None;
        let mut exact: Option<(usize, usize)> = None;
        'paths: for (pi, path) in outline.iter().enumerate() {
            for idx in 0..path.len() {
                let pa = path[idx];
                let pb = path[(idx + 1) % path.len()];
                if in_a_line(pa, *last_point, pb) {
                    exact = Some((pi, idx));
                    break 'paths;
                }
                let d = squared_dist(*last_point, pa);
                if d < nearest_dist {
                    nearest_dist = d;
                    nearest = Some((pi, idx));
                }
            }
        }

        let Some((path_idx, inter_idx)) = exact.or(nearest) else {
            // No outline vertices to hug; hop straight over.
            tool_segments.push(ToolSegment::Travel {
                from: IntPoint3::from_xy(*last_point, z),
                to: IntPoint3::from_xy(line.p1, z),
                speed: move_speed,
            });
            tool_segments.push(ToolSegment::Extrude {
                from: IntPoint3::from_xy(line.p1, z),
                to: IntPoint3::from_xy(line.p2, z),
                speed: segment_speed,
            });
            *last_point = line.p2;
            return;
        };

        let path = &outline[path_idx];
        let full_size = path.len() as i64;
        let inter_idx = inter_idx as i64;
        let pa = path[inter_idx as usize];
        let pb = path[((inter_idx + 1) % full_size) as usize];

        if in_a_line(pa, line.p1, pb) {
            // Both endpoints share an edge; a direct hop stays inside.
            tool_segments.push(ToolSegment::Travel {
                from: IntPoint3::from_xy(*last_point, z),
                to: IntPoint3::from_xy(line.p1, z),
                speed: move_speed,
            });
        } else {
            let mut no_inter = true;
            let mut forwards = true;
            let mut backup_dist = i64::MAX;
            let mut backup_steps: i64 = 2;
            let mut backup_forwards = true;

            let half_size = full_size / 2 + 1;
            let mut steps: i64 = 2;
            while no_inter && steps < half_size {
                // One step forward.
                let mut a_idx = inter_idx + steps;
                let mut b_idx = a_idx + 1;
                if a_idx >= full_size {
                    a_idx -= full_size;
                    b_idx -= full_size;
                } else if b_idx >= full_size {
                    b_idx -= full_size;
                }
                let pa = path[a_idx as usize];
                let pb = path[b_idx as usize];

                if in_a_line(pa, line.p1, pb) {
                    no_inter = false;
                } else {
                    if squared_dist(line.p1, pa) < backup_dist {
                        backup_dist = squared_dist(line.p1, pa);
                        backup_steps = steps;
                        backup_forwards = true;
                    }

                    // One step backward; `inter_idx` is already the lower
                    // vertex of the entry edge.
                    let mut a_idx = inter_idx - steps + 2;
                    let mut b_idx = a_idx - 1;
                    if a_idx < 0 {
                        a_idx += full_size;
                        b_idx += full_size;
                    } else if b_idx < 0 {
                        b_idx += full_size;
                    }
                    let pa = path[a_idx as usize];
                    let pb = path[b_idx as usize];

                    if in_a_line(pa, line.p1, pb) {
                        no_inter = false;
                        forwards = false;
                    } else {
                        if squared_dist(line.p1, pa) < backup_dist {
                            backup_dist = squared_dist(line.p1, pa);
                            backup_steps = steps;
                            backup_forwards = false;
                        }
                        steps += 1;
                    }
                }
            }

            if no_inter {
                steps = backup_steps;
                forwards = backup_forwards;
            }

            if forwards {
                let mut idx_b = if inter_idx + 1 == full_size { 0 } else { inter_idx + 1 };
                tool_segments.push(ToolSegment::Travel {
                    from: IntPoint3::from_xy(*last_point, z),
                    to: IntPoint3::from_xy(path[idx_b as usize], z),
                    speed: move_speed,
                });

                for k in inter_idx + 1..inter_idx + steps {
                    let mut idx_a = k;
                    let mut next = k + 1;
                    if idx_a >= full_size {
                        idx_a -= full_size;
                        next -= full_size;
                    } else if next >= full_size {
                        next -= full_size;
                    }
                    tool_segments.push(ToolSegment::Travel {
                        from: IntPoint3::from_xy(path[idx_a as usize], z),
                        to: IntPoint3::from_xy(path[next as usize], z),
                        speed: move_speed,
                    });
                    idx_b = next;
                }

                tool_segments.push(ToolSegment::Travel {
                    from: IntPoint3::from_xy(path[idx_b as usize], z),
                    to: IntPoint3::from_xy(line.p1, z),
                    speed: move_speed,
                });
            } else {
                let mut idx_b = inter_idx;
                tool_segments.push(ToolSegment::Travel {
                    from: IntPoint3::from_xy(*last_point, z),
                    to: IntPoint3::from_xy(path[idx_b as usize], z),
                    speed: move_speed,
                });

                let mut k = inter_idx;
                while k > inter_idx - steps + 2 {
                    let mut idx_a = k;
                    let mut next = k - 1;
                    if idx_a < 0 {
                        idx_a += full_size;
                        next += full_size;
                    } else if next < 0 {
                        next += full_size;
                    }
                    tool_segments.push(ToolSegment::Travel {
                        from: IntPoint3::from_xy(path[idx_a as usize], z),
                        to: IntPoint3::from_xy(path[next as usize], z),
                        speed: move_speed,
                    });
                    idx_b = next;
                    k -= 1;
                }

                tool_segments.push(ToolSegment::Travel {
                    from: IntPoint3::from_xy(path[idx_b as usize], z),
                    to: IntPoint3::from_xy(line.p1, z),
                    speed: move_speed,
                });
            }
        }
    }

    let line = lines[line_idx];
    tool_segments.push(ToolSegment::Extrude {
        from: IntPoint3::from_xy(line.p1, z),
        to: IntPoint3::from_xy(line.p2, z),
        speed: segment_speed,
    });
    *last_point = line.p2;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::Progressor;
    use crate::slicer::islands::build_islands;
    use crate::slicer::islands::tests::{cube_mesh, cube_triangles};
    use crate::slicer::infill::{extract_infill_regions, generate_fill_lines};
    use crate::slicer::outline::generate_outlines;
    use crate::slicer::slice_layers::slice_triangles;
    use crate::slicer::top_bottom::classify_top_bottom;

    fn full_pipeline(
        mesh: &crate::mesh::Mesh,
        settings: &SliceSettings,
        layer_count: usize,
    ) -> Vec<LayerComponent> {
        let mut layers = vec![LayerComponent::default(); layer_count];
        for layer in &mut layers {
            layer.layer_speed = settings.print_speed;
            layer.move_speed = settings.travel_speed;
        }
        let silent = Progressor::silent(1);
        slice_triangles(mesh, settings, &mut layers, &silent);
        build_islands(mesh, &mut layers, &silent);
        generate_outlines(settings, &mut layers, &silent);
        classify_top_bottom(settings, &mut layers, &silent);
        extract_infill_regions(settings, &mut layers, &silent);
        generate_fill_lines(settings, &mut layers, &silent);
        plan_toolpaths(settings, &mut layers, &silent);
        layers
    }

    fn test_settings() -> SliceSettings {
        SliceSettings {
            layer_height: 0.2,
            shell_thickness: 0.5,
            top_bottom_thickness: 0.0,
            skirt_line_count: 0,
            infill_density: 100.0,
            ..Default::default()
        }
    }

    #[test]
    fn every_layer_starts_with_a_z_move() {
        let mesh = cube_mesh([0.0, 0.0, 0.0], 2.0);
        let settings = test_settings();
        let layers = full_pipeline(&mesh, &settings, 11);

        for (i, layer) in layers.iter().enumerate() {
            assert_eq!(layer.initial_moves.len(), 1);
            let ToolSegment::Travel { to, .. } = &layer.initial_moves[0] else {
                panic!("initial move must be a travel");
            };
            let expected_z = ((i as Real + 0.5) * (settings.layer_height * SCALE)) as i64;
            assert_eq!(to.z, expected_z);
        }
    }

    #[test]
    fn layers_chain_through_stored_end_points() {
        let mesh = cube_mesh([0.0, 0.0, 0.0], 2.0);
        let settings = test_settings();
        let layers = full_pipeline(&mesh, &settings, 11);

        for pair in layers.windows(2) {
            let prev_end = last_motion_point(&pair[0]);
            let ToolSegment::Travel { from, .. } = &pair[1].initial_moves[0] else {
                panic!("initial move must be a travel");
            };
            assert_eq!(IntPoint::new(from.x, from.y), prev_end);
        }
    }

    fn last_motion_point(layer: &LayerComponent) -> IntPoint {
        let mut last = IntPoint::new(0, 0);
        for isle in &layer.islands {
            for seg in &isle.segments {
                for tool in &seg.tool_segments {
                    if let ToolSegment::Extrude { to, .. } = tool {
                        last = to.xy();
                    }
                }
            }
        }
        last
    }

    #[test]
    fn outline_extrusion_wraps_exactly_once() {
        let mesh = cube_mesh([0.0, 0.0, 0.0], 2.0);
        let settings = test_settings();
        let layers = full_pipeline(&mesh, &settings, 11);

        let isle = &layers[1].islands[0];
        let outline_seg = &isle.segments[0];
        let extrudes: Vec<_> = outline_seg
            .tool_segments
            .iter()
            .filter_map(|t| match t {
                ToolSegment::Extrude { from, to, .. } => Some((from.xy(), to.xy())),
                _ => None,
            })
            .collect();

        let ring = &outline_seg.outline[0];
        assert_eq!(extrudes.len(), ring.len());

        // Closed chain: each extrude starts where the previous ended, and
        // the loop returns to its entry.
        for pair in extrudes.windows(2) {
            assert_eq!(pair[0].1, pair[1].0);
        }
        assert_eq!(extrudes[0].0, extrudes[extrudes.len() - 1].1);
    }

    #[test]
    fn planning_is_deterministic() {
        let mut builder = crate::mesh::MeshBuilder::new();
        for tri in cube_triangles([0.0, 0.0, 0.0], 2.0) {
            builder.add_triangle(tri);
        }
        for tri in cube_triangles([5.0, 3.0, 0.0], 2.0) {
            builder.add_triangle(tri);
        }
        let mesh = builder.build().unwrap();
        let settings = test_settings();

        let run = |_: usize| {
            let layers = full_pipeline(&mesh, &settings, 11);
            let mut trace: Vec<(i64, i64, i64)> = Vec::new();
            for layer in &layers {
                for isle in &layer.islands {
                    for seg in &isle.segments {
                        for tool in &seg.tool_segments {
                            match tool {
                                ToolSegment::Retract { distance } => {
                                    trace.push((-1, *distance, 0))
                                },
                                ToolSegment::Travel { to, .. } => trace.push((0, to.x, to.y)),
                                ToolSegment::Extrude { to, .. } => trace.push((1, to.x, to.y)),
                            }
                        }
                    }
                }
            }
            trace
        };

        assert_eq!(run(0), run(1));
    }

    #[test]
    fn long_hops_retract_and_short_hops_do_not() {
        // Two cubes 20 mm apart force a retraction when crossing between
        // islands; motion within one 2 mm cube never does.
        let mut builder = crate::mesh::MeshBuilder::new();
        for tri in cube_triangles([0.0, 0.0, 0.0], 2.0) {
            builder.add_triangle(tri);
        }
        for tri in cube_triangles([20.0, 0.0, 0.0], 2.0) {
            builder.add_triangle(tri);
        }
        let mesh = builder.build().unwrap();
        let settings = test_settings();
        let layers = full_pipeline(&mesh, &settings, 11);

        let retracts: usize = layers[1]
            .islands
            .iter()
            .flat_map(|i| &i.segments)
            .flat_map(|s| &s.tool_segments)
            .filter(|t| matches!(t, ToolSegment::Retract { .. }))
            .count();
        assert!(retracts >= 1, "crossing 20 mm must retract");

        // Disabling retraction suppresses them entirely.
        let mut no_retract = settings.clone();
        no_retract.retraction_distance = 0.0;
        let layers = full_pipeline(&mesh, &no_retract, 11);
        let retracts: usize = layers
            .iter()
            .flat_map(|l| &l.islands)
            .flat_map(|i| &i.segments)
            .flat_map(|s| &s.tool_segments)
            .filter(|t| matches!(t, ToolSegment::Retract { .. }))
            .count();
        assert_eq!(retracts, 0);
    }

    #[test]
    fn closest_point_search_is_stable() {
        let path = vec![
            IntPoint::new(0, 0),
            IntPoint::new(100, 0),
            IntPoint::new(100, 100),
            IntPoint::new(0, 100),
        ];
        let mut idx = 0usize;
        let mut dist = i64::MAX;
        assert!(find_closest_point(&path, IntPoint::new(-5, -5), &mut idx, &mut dist));
        assert_eq!(idx, 0);

        // A worse candidate leaves the running best untouched.
        let mut idx2 = 7usize;
        let mut dist2 = 1;
        assert!(!find_closest_point(
            &path,
            IntPoint::new(-5, -5),
            &mut idx2,
            &mut dist2
        ));
        assert_eq!(idx2, 7);
        assert_eq!(dist2, 1);
    }
}
