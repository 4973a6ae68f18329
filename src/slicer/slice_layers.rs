//! Stage 1: intersect every triangle with every layer plane, producing
//! tagged 2D line segments.

use log::debug;
use rayon::prelude::*;

use crate::config::SliceSettings;
use crate::float_types::SCALE;
use crate::geom2d::IntPoint;
use crate::mesh::Mesh;
use crate::progress::Progressor;
use crate::slicer::layer::{LayerComponent, SliceSegment};

/// Slice all triangles into per-layer segment lists. Each worker owns its
/// layer exclusively; nothing is written across layers.
pub(crate) fn slice_triangles(
    mesh: &Mesh,
    settings: &SliceSettings,
    layers: &mut [LayerComponent],
    progress: &Progressor,
) {
    debug!("slicing {} triangles into {} layers", mesh.triangle_count(), layers.len());

    layers.par_iter_mut().enumerate().for_each(|(i, layer)| {
        slice_layer(mesh, settings, i, layer);
        progress.complete_step_part();
    });
}

fn slice_layer(mesh: &Mesh, settings: &SliceSettings, index: usize, layer: &mut LayerComponent) {
    let z_point = index as f64 * settings.layer_height;

    for t in 0..mesh.triangle_count() {
        let z = mesh.triangle_axis(t, 2);
        let min_z = z[0].min(z[1]).min(z[2]);
        let max_z = z[0].max(z[1]).max(z[2]);

        // A coplanar triangle is skipped outright; its two non-coplanar
        // neighbours produce the segment instead.
        if min_z == max_z || z_point > max_z || z_point < min_z {
            continue;
        }

        // The plane crosses two sides of the triangle. Vertex `a` is where
        // those two sides meet; `b` and `c` are the far ends.
        let (a, b, c) = classify_crossing(&z, z_point);

        let x = mesh.triangle_axis(t, 0);
        let y = mesh.triangle_axis(t, 1);

        // Interpolate x and y against the z rise on both crossed sides.
        let z_to_x1 = if z[a] != z[b] { (x[a] - x[b]) / (z[a] - z[b]) } else { 0.0 };
        let z_to_y1 = if z[a] != z[b] { (y[a] - y[b]) / (z[a] - z[b]) } else { 0.0 };
        let z_to_x2 = if z[a] != z[c] { (x[a] - x[c]) / (z[a] - z[c]) } else { 0.0 };
        let z_to_y2 = if z[a] != z[c] { (y[a] - y[c]) / (z[a] - z[c]) } else { 0.0 };

        let z_rise1 = z_point - z[b];
        let z_rise2 = z_point - z[c];

        let p1 = IntPoint::new(
            ((x[b] + z_to_x1 * z_rise1) * SCALE) as i64,
            ((y[b] + z_to_y1 * z_rise1) * SCALE) as i64,
        );
        let p2 = IntPoint::new(
            ((x[c] + z_to_x2 * z_rise2) * SCALE) as i64,
            ((y[c] + z_to_y2 * z_rise2) * SCALE) as i64,
        );

        if p1 != p2 {
            layer.face_to_segment.insert(t, layer.slice_segments.len());
            layer.slice_segments.push(SliceSegment::new(p1, p2, t));
        }
    }
}

/// Pick the apex vertex `a` (meeting point of the two crossed sides) and
/// the far vertices `b`, `c`. Handles vertices lying exactly on the plane:
/// with one vertex on the plane that vertex is the apex, with two on the
/// plane the third is.
fn classify_crossing(z: &[f64; 3], z_point: f64) -> (usize, usize, usize) {
    if z_point == z[0] {
        if z_point == z[1] {
            return (2, 0, 1);
        }
        if z_point == z[2] {
            return (1, 2, 0);
        }
    } else if z_point == z[1] && z_point == z[2] {
        return (0, 1, 2);
    }

    // Exactly one vertex on the plane with the other two straddling it:
    // anchor on a straddling vertex so one endpoint lands exactly on the
    // on-plane vertex and the other on the properly crossed far edge.
    let straddles = |i: usize, j: usize| (z[i] - z_point) * (z[j] - z_point) < 0.0;
    if z_point == z[0] && straddles(1, 2) {
        return (1, 2, 0);
    }
    if z_point == z[1] && straddles(0, 2) {
        return (0, 2, 1);
    }
    if z_point == z[2] && straddles(0, 1) {
        return (0, 1, 2);
    }

    let between =
        |lo: f64, hi: f64| (z_point <= lo && z_point >= hi) || (z_point >= lo && z_point <= hi);
    let one_two = between(z[0], z[1]);
    let one_three = between(z[0], z[2]);
    let two_three = between(z[1], z[2]);

    if one_two && one_three {
        (0, 1, 2)
    } else if one_two && two_three {
        (1, 2, 0)
    } else {
        (2, 0, 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::MeshBuilder;

    fn settings() -> SliceSettings {
        SliceSettings {
            layer_height: 0.2,
            ..Default::default()
        }
    }

    #[test]
    fn plain_crossing_produces_one_segment() {
        let mut builder = MeshBuilder::new();
        // Rises from z=0 to z=1; the z=0.2 plane crosses two sides.
        builder.add_triangle([[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]]);
        let mesh = builder.build().unwrap();

        let mut layers = vec![LayerComponent::default(); 2];
        slice_triangles(&mesh, &settings(), &mut layers, &Progressor::silent(1));

        assert_eq!(layers[1].slice_segments.len(), 1);
        assert_eq!(layers[1].face_to_segment.get(&0), Some(&0));
    }

    #[test]
    fn coplanar_triangle_is_skipped() {
        let mut builder = MeshBuilder::new();
        builder.add_triangle([[0.0, 0.0, 0.2], [1.0, 0.0, 0.2], [0.0, 1.0, 0.2]]);
        let mesh = builder.build().unwrap();

        let mut layers = vec![LayerComponent::default(); 2];
        slice_triangles(&mesh, &settings(), &mut layers, &Progressor::silent(1));

        assert!(layers[1].slice_segments.is_empty());
        assert!(layers[1].face_to_segment.is_empty());
    }

    #[test]
    fn vertex_exactly_on_plane_is_an_endpoint() {
        let mut builder = MeshBuilder::new();
        // One vertex exactly at z=0.2, the other two straddling it.
        builder.add_triangle([[0.5, 0.5, 0.2], [0.0, 0.0, 0.0], [1.0, 0.0, 0.4]]);
        let mesh = builder.build().unwrap();

        let mut layers = vec![LayerComponent::default(); 3];
        slice_triangles(&mesh, &settings(), &mut layers, &Progressor::silent(1));

        let segs = &layers[1].slice_segments;
        assert_eq!(segs.len(), 1);
        let on_plane = IntPoint::new(50_000, 50_000);
        assert!(segs[0].p1 == on_plane || segs[0].p2 == on_plane);
    }

    #[test]
    fn degenerate_intersection_is_dropped() {
        let mut builder = MeshBuilder::new();
        // Only one vertex touches the z=0.2 plane from below; the
        // intersection is a single point, not a segment.
        builder.add_triangle([[0.5, 0.5, 0.2], [0.0, 0.0, 0.0], [1.0, 0.0, 0.1]]);
        let mesh = builder.build().unwrap();

        let mut layers = vec![LayerComponent::default(); 2];
        slice_triangles(&mesh, &settings(), &mut layers, &Progressor::silent(1));

        assert!(layers[1].slice_segments.is_empty());
    }
}
