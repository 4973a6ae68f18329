//! Stage 2: chain slice segments into closed polygons via triangle
//! adjacency, close whatever gaps remain, simplify, and nest the loops
//! into islands with holes.

use log::{debug, warn};
use rayon::prelude::*;

use crate::float_types::SCALE;
use crate::geom2d::{IntPath, boolean, in_a_line, squared_dist};
use crate::mesh::Mesh;
use crate::progress::Progressor;
use crate::slicer::layer::{LayerComponent, LayerIsland};

/// Two chain ends this close (squared) snap together during gap closing.
fn gap_close_threshold() -> i64 {
    let d = 0.05 * SCALE;
    (d * d) as i64
}

/// Successive path points closer than this (squared) collapse into one.
fn min_point_spacing() -> i64 {
    let d = 0.075 * SCALE;
    (d * d) as i64
}

pub(crate) fn build_islands(mesh: &Mesh, layers: &mut [LayerComponent], progress: &Progressor) {
    debug!("building islands for {} layers", layers.len());

    layers.par_iter_mut().enumerate().for_each(|(i, layer)| {
        build_layer_islands(mesh, i, layer);
        progress.complete_step_part();
    });
}

fn build_layer_islands(mesh: &Mesh, index: usize, layer: &mut LayerComponent) {
    debug!("islands for layer {index}");

    if layer.slice_segments.len() < 2 {
        layer.slice_segments = Vec::new();
        layer.face_to_segment = Default::default();
        return;
    }

    let (mut closed, open) = chain_segments(mesh, layer);

    // The segment list has served its purpose; drop it before the
    // allocation-heavy boolean work below.
    layer.slice_segments = Vec::new();
    layer.face_to_segment = Default::default();

    if !open.is_empty() {
        debug!(
            "layer {index}: {} open chains, {} closed",
            open.len(),
            closed.len()
        );
    }

    let unclosable = gap_close(&mut closed, open);
    if !unclosable.is_empty() {
        warn!(
            "layer {index}: force-closing {} chains outside the gap threshold",
            unclosable.len()
        );
        force_close(&mut closed, unclosable);
    }

    simplify_paths(&mut closed);

    layer.islands = boolean::nest_islands(&closed)
        .into_iter()
        .map(|outline| LayerIsland {
            outline,
            segments: Vec::new(),
        })
        .collect();
}

/// Walk segments into chains using the vertex→triangle adjacency: from the
/// current segment's triangle, any triangle sharing one of its vertices and
/// holding an unused segment on this layer is a candidate; the first whose
/// endpoint meets the chain end is accepted. A chain closes when the
/// accepted segment's far end meets the chain start.
fn chain_segments(mesh: &Mesh, layer: &mut LayerComponent) -> (Vec<IntPath>, Vec<IntPath>) {
    let segs = &mut layer.slice_segments;
    let face_map = &layer.face_to_segment;

    let mut closed: Vec<IntPath> = Vec::new();
    let mut open_paths: Vec<IntPath> = Vec::new();

    for start_idx in 0..segs.len() {
        if segs[start_idx].used_in_polygon {
            continue;
        }
        segs[start_idx].used_in_polygon = true;

        let start_p1 = segs[start_idx].p1;
        let mut path: IntPath = vec![segs[start_idx].p1, segs[start_idx].p2];
        let mut point_to_connect = segs[start_idx].p2;
        let mut connect_from = start_idx;
        let mut open = true;

        while open {
            let mut connected = false;
            let triangle = mesh.triangles()[segs[connect_from].triangle];

            'vertices: for &v in &triangle {
                for &touch_triangle in mesh.triangles_of_vertex(v) {
                    let Some(&touch_idx) = face_map.get(&(touch_triangle as usize)) else {
                        continue;
                    };
                    if touch_idx == connect_from || segs[touch_idx].used_in_polygon {
                        continue;
                    }

                    if point_to_connect == segs[touch_idx].p1 {
                        connected = true;
                    } else if point_to_connect == segs[touch_idx].p2 {
                        segs[touch_idx].swap_points();
                        connected = true;
                    }

                    if connected {
                        segs[touch_idx].used_in_polygon = true;

                        if segs[touch_idx].p2 == start_p1 {
                            open = false;
                        } else {
                            path.push(segs[touch_idx].p2);
                            point_to_connect = segs[touch_idx].p2;
                            connect_from = touch_idx;
                        }
                        break 'vertices;
                    }
                }
            }

            if !connected {
                break;
            }
        }

        if open {
            if !path.is_empty() {
                open_paths.push(path);
            }
        } else {
            closed.push(path);
        }
    }

    (closed, open_paths)
}

/// Concatenate open chains whose ends fall within the gap threshold,
/// preferring the nearest candidate each round. Chains that close up move
/// into `closed`; the rest are returned for force closing.
fn gap_close(closed: &mut Vec<IntPath>, mut open_paths: Vec<IntPath>) -> Vec<IntPath> {
    let min_diff = gap_close_threshold();
    let mut to_force: Vec<IntPath> = Vec::new();

    for a in 0..open_paths.len() {
        if open_paths[a].is_empty() {
            continue;
        }
        let mut path = std::mem::take(&mut open_paths[a]);

        loop {
            let head = path[0];
            let tail = path[path.len() - 1];
            if squared_dist(head, tail) <= min_diff {
                closed.push(path);
                break;
            }

            let mut best_diff = min_diff * 3;
            let mut best: Option<(usize, bool)> = None;
            for (b, candidate) in open_paths.iter().enumerate().skip(a + 1) {
                if candidate.is_empty() {
                    continue;
                }
                let to_head = squared_dist(tail, candidate[0]);
                if to_head < best_diff {
                    best_diff = to_head;
                    best = Some((b, false));
                } else {
                    let to_tail = squared_dist(tail, candidate[candidate.len() - 1]);
                    if to_tail < best_diff {
                        best_diff = to_tail;
                        best = Some((b, true));
                    }
                }
            }

            match best {
                None => {
                    to_force.push(path);
                    break;
                },
                Some((b, reversed)) => {
                    let mut other = std::mem::take(&mut open_paths[b]);
                    if reversed {
                        other.reverse();
                    }
                    other.extend(path);
                    path = other;
                },
            }
        }
    }

    to_force
}

/// Same pairing as [`gap_close`] but with no distance cap: each chain
/// absorbs whichever remaining chain ends nearer than its own head-to-tail
/// gap, until none do, then counts as closed.
fn force_close(closed: &mut Vec<IntPath>, mut chains: Vec<IntPath>) {
    for a in 0..chains.len() {
        if chains[a].is_empty() {
            continue;
        }
        let mut path = std::mem::take(&mut chains[a]);

        loop {
            let tail = path[path.len() - 1];
            let mut best_diff = squared_dist(path[0], tail);
            let mut best: Option<(usize, bool)> = None;

            for (b, candidate) in chains.iter().enumerate().skip(a + 1) {
                if candidate.is_empty() {
                    continue;
                }
                let to_head = squared_dist(tail, candidate[0]);
                if to_head < best_diff {
                    best_diff = to_head;
                    best = Some((b, false));
                } else {
                    let to_tail = squared_dist(tail, candidate[candidate.len() - 1]);
                    if to_tail < best_diff {
                        best_diff = to_tail;
                        best = Some((b, true));
                    }
                }
            }

            match best {
                None => break,
                Some((b, reversed)) => {
                    let mut other = std::mem::take(&mut chains[b]);
                    if reversed {
                        other.reverse();
                    }
                    other.extend(path);
                    path = other;
                },
            }
        }

        closed.push(path);
    }
}

/// Drop points that sit nearly on top of their successor or form a
/// practically straight corner. Direction and ordering are preserved;
/// re-running this on its own output changes nothing.
pub(crate) fn simplify_paths(paths: &mut [IntPath]) {
    let min_diff = min_point_spacing();

    for path in paths.iter_mut() {
        if path.len() < 3 {
            continue;
        }

        let mut opti: IntPath = Vec::with_capacity(path.len());
        let mut j = 0usize;
        loop {
            let p1 = path[j];

            if j == path.len() - 1 {
                // The last point closes against the front; check it without
                // revisiting the first point.
                let p2 = path[0];
                if squared_dist(p1, p2) >= min_diff && !in_a_line(p1, p2, path[1]) {
                    opti.push(p2);
                }
                break;
            }

            let mut k = j + 1;
            let mut p2 = path[k];

            // Skip past all the very close points.
            while k < path.len() - 1 && squared_dist(p1, p2) < min_diff {
                k += 1;
                p2 = path[k];
            }

            // Skip past points almost in line with their neighbours.
            let mut in_line = true;
            while k < path.len() - 1 && in_line {
                let p3 = path[k + 1];
                if in_a_line(p1, p2, p3) {
                    k += 1;
                    p2 = path[k];
                } else {
                    in_line = false;
                }
            }

            j = if k >= path.len() { path.len() - 1 } else { k };
            opti.push(p2);
        }

        *path = opti;
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::SliceSettings;
    use crate::geom2d::IntPoint;
    use crate::mesh::MeshBuilder;
    use crate::slicer::slice_layers::slice_triangles;

    /// The twelve triangles of an axis-aligned cube, outward winding.
    pub(crate) fn cube_triangles(origin: [f32; 3], size: f32) -> Vec<[[f32; 3]; 3]> {
        let [ox, oy, oz] = origin;
        let v = |x: f32, y: f32, z: f32| [ox + x * size, oy + y * size, oz + z * size];
        let corners = [
            v(0.0, 0.0, 0.0),
            v(1.0, 0.0, 0.0),
            v(1.0, 1.0, 0.0),
            v(0.0, 1.0, 0.0),
            v(0.0, 0.0, 1.0),
            v(1.0, 0.0, 1.0),
            v(1.0, 1.0, 1.0),
            v(0.0, 1.0, 1.0),
        ];
        let faces: [[usize; 3]; 12] = [
            [0, 2, 1],
            [0, 3, 2], // bottom
            [4, 5, 6],
            [4, 6, 7], // top
            [0, 1, 5],
            [0, 5, 4], // front
            [1, 2, 6],
            [1, 6, 5], // right
            [2, 3, 7],
            [2, 7, 6], // back
            [3, 0, 4],
            [3, 4, 7], // left
        ];
        faces
            .iter()
            .map(|f| [corners[f[0]], corners[f[1]], corners[f[2]]])
            .collect()
    }

    pub(crate) fn cube_mesh(origin: [f32; 3], size: f32) -> crate::mesh::Mesh {
        let mut builder = MeshBuilder::new();
        for tri in cube_triangles(origin, size) {
            builder.add_triangle(tri);
        }
        builder.build().unwrap()
    }

    fn sliced_layers(mesh: &crate::mesh::Mesh, layer_count: usize) -> Vec<LayerComponent> {
        let settings = SliceSettings::default();
        let mut layers = vec![LayerComponent::default(); layer_count];
        slice_triangles(mesh, &settings, &mut layers, &Progressor::silent(1));
        layers
    }

    #[test]
    fn cube_layer_chains_into_one_island() {
        let mesh = cube_mesh([0.0, 0.0, 0.0], 1.0);
        let mut layers = sliced_layers(&mesh, 6);
        build_islands(&mesh, &mut layers, &Progressor::silent(1));

        // Mid layers cut only the four side walls: one square island each.
        for layer in &layers[1..5] {
            assert_eq!(layer.islands.len(), 1);
            assert_eq!(layer.islands[0].outline.len(), 1);
            assert!(layer.slice_segments.is_empty());
            assert!(layer.face_to_segment.is_empty());
        }
    }

    #[test]
    fn open_mesh_still_closes() {
        // A cube with the top face removed still yields closed loops on
        // interior layers because every wall edge remains traversable.
        let mut builder = MeshBuilder::new();
        for (t, tri) in cube_triangles([0.0, 0.0, 0.0], 1.0).into_iter().enumerate() {
            if t == 2 || t == 3 {
                continue; // drop the top face
            }
            builder.add_triangle(tri);
        }
        let mesh = builder.build().unwrap();

        let mut layers = sliced_layers(&mesh, 5);
        build_islands(&mesh, &mut layers, &Progressor::silent(1));

        for layer in &layers[1..4] {
            assert_eq!(layer.islands.len(), 1);
        }
    }

    #[test]
    fn two_disjoint_cubes_make_two_islands() {
        let mut builder = MeshBuilder::new();
        for tri in cube_triangles([0.0, 0.0, 0.0], 1.0) {
            builder.add_triangle(tri);
        }
        for tri in cube_triangles([3.0, 0.0, 0.0], 1.0) {
            builder.add_triangle(tri);
        }
        let mesh = builder.build().unwrap();

        let mut layers = sliced_layers(&mesh, 6);
        build_islands(&mesh, &mut layers, &Progressor::silent(1));
        for layer in &layers[1..5] {
            assert_eq!(layer.islands.len(), 2);
        }
    }

    /// Same loop, any rotation.
    fn cyclically_equal(a: &[IntPoint], b: &[IntPoint]) -> bool {
        if a.len() != b.len() {
            return false;
        }
        (0..a.len()).any(|shift| (0..a.len()).all(|i| a[i] == b[(i + shift) % b.len()]))
    }

    #[test]
    fn simplify_collapses_near_duplicates_and_is_stable() {
        let step = (0.075 * SCALE) as i64;
        let mut paths = vec![vec![
            IntPoint::new(0, 0),
            IntPoint::new(100, 0), // closer than the spacing floor
            IntPoint::new(10 * step, 0),
            IntPoint::new(10 * step, 10 * step),
            IntPoint::new(0, 10 * step),
        ]];
        simplify_paths(&mut paths);
        assert_eq!(paths[0].len(), 4);

        // A second pass may rotate the closed loop but must not alter it.
        let once = paths[0].clone();
        simplify_paths(&mut paths);
        assert!(cyclically_equal(&once, &paths[0]));
    }
}
