//! Boolean operations on integer path sets.
//!
//! The engine underneath is `geo`'s `BooleanOps`, which works on `f64`
//! multipolygons. Every `i64` layer coordinate is exactly representable as
//! `f64` (beds are many orders of magnitude below 2^53), so the promotion is
//! lossless and the only rounding happens once, on the way back to integers.

use geo::orient::Direction;
use geo::{BooleanOps, Coord, LineString, MultiPolygon, Orient, Polygon};

use crate::float_types::Real;
use crate::geom2d::{IntPath, IntPoint, PathSet, point_in_path, signed_area};

fn ring_coords(path: &[IntPoint]) -> Vec<Coord<Real>> {
    path.iter()
        .map(|p| Coord {
            x: p.x as Real,
            y: p.y as Real,
        })
        .collect()
}

fn ring_to_path(ring: &LineString<Real>) -> IntPath {
    let mut path: IntPath = ring
        .coords()
        .map(|c| IntPoint::new(c.x.round() as i64, c.y.round() as i64))
        .collect();

    // geo keeps rings explicitly closed; our paths close implicitly.
    if path.len() > 1 && path.first() == path.last() {
        path.pop();
    }
    path
}

fn oriented(path: &[IntPoint], ccw: bool) -> Vec<Coord<Real>> {
    if (signed_area(path) >= 0) == ccw {
        ring_coords(path)
    } else {
        let mut coords = ring_coords(path);
        coords.reverse();
        coords
    }
}

/// Assemble a flat path set into a `geo` multipolygon. Counter-clockwise
/// paths become exteriors, clockwise paths become holes of the smallest
/// exterior that contains them; a hole with no container counts as filled
/// area (non-zero winding) and is kept as an exterior.
pub fn to_multipolygon(paths: &PathSet) -> MultiPolygon<Real> {
    let mut exteriors: Vec<&[IntPoint]> = Vec::new();
    let mut holes: Vec<&[IntPoint]> = Vec::new();

    for path in paths {
        if path.len() < 3 {
            continue;
        }
        let area = signed_area(path);
        if area == 0 {
            continue;
        }
        if area > 0 {
            exteriors.push(path.as_slice());
        } else {
            holes.push(path.as_slice());
        }
    }

    let mut interiors: Vec<Vec<LineString<Real>>> = vec![Vec::new(); exteriors.len()];
    for hole in holes {
        let rep = hole[0];
        let mut parent: Option<usize> = None;
        let mut parent_area = u128::MAX;
        for (idx, ext) in exteriors.iter().enumerate() {
            if point_in_path(rep, ext) {
                let area = signed_area(ext).unsigned_abs();
                if area < parent_area {
                    parent_area = area;
                    parent = Some(idx);
                }
            }
        }

        match parent {
            Some(idx) => {
                interiors[idx].push(LineString::new(oriented(hole, false)));
            },
            None => {
                exteriors.push(hole);
                interiors.push(Vec::new());
            },
        }
    }

    let polygons = exteriors
        .iter()
        .zip(interiors)
        .map(|(ext, ints)| Polygon::new(LineString::new(oriented(ext, true)), ints))
        .collect();

    MultiPolygon(polygons)
}

/// Convert a multipolygon back to an integer path set: per polygon the
/// exterior first (counter-clockwise) followed by its holes (clockwise),
/// degenerate rings dropped.
pub fn from_multipolygon(mp: &MultiPolygon<Real>) -> PathSet {
    let oriented = mp.clone().orient(Direction::Default);

    let mut out = PathSet::new();
    for poly in &oriented {
        let exterior = ring_to_path(poly.exterior());
        if exterior.len() < 3 {
            continue;
        }
        out.push(exterior);
        for hole in poly.interiors() {
            let hole_path = ring_to_path(hole);
            if hole_path.len() >= 3 {
                out.push(hole_path);
            }
        }
    }
    out
}

/// Union of two path sets.
pub fn union(a: &PathSet, b: &PathSet) -> PathSet {
    if a.is_empty() {
        return from_multipolygon(&to_multipolygon(b));
    }
    if b.is_empty() {
        return from_multipolygon(&to_multipolygon(a));
    }
    from_multipolygon(&to_multipolygon(a).union(&to_multipolygon(b)))
}

/// Intersection of two path sets.
pub fn intersection(a: &PathSet, b: &PathSet) -> PathSet {
    if a.is_empty() || b.is_empty() {
        return PathSet::new();
    }
    from_multipolygon(&to_multipolygon(a).intersection(&to_multipolygon(b)))
}

/// `a` minus `b`.
pub fn difference(a: &PathSet, b: &PathSet) -> PathSet {
    if a.is_empty() {
        return PathSet::new();
    }
    if b.is_empty() {
        return from_multipolygon(&to_multipolygon(a));
    }
    from_multipolygon(&to_multipolygon(a).difference(&to_multipolygon(b)))
}

/// Union a sequence of path sets into one region.
pub fn union_all<'a, I>(sets: I) -> PathSet
where
    I: IntoIterator<Item = &'a PathSet>,
{
    let mut acc = PathSet::new();
    for set in sets {
        acc = union(&acc, set);
    }
    acc
}

/// One connected region with its holes, ready to become a layer island.
/// Index 0 is the outer contour, the rest are holes.
pub type IslandPaths = PathSet;

/// Nest a soup of closed loops into islands.
///
/// Loops from a sliced layer may touch but never cross, so containment
/// depth decides the topology: even depth is solid, odd depth is a hole in
/// its containing solid, and a solid inside a hole starts a fresh island.
/// A final union pass merges solids that share edges or overlap, which is
/// what collapses two touching squares into one rectangle.
pub fn nest_islands(closed: &[IntPath]) -> Vec<IslandPaths> {
    let loops: Vec<&[IntPoint]> = closed
        .iter()
        .filter(|p| p.len() >= 3)
        .map(|p| p.as_slice())
        .collect();
    if loops.is_empty() {
        return Vec::new();
    }

    let depths: Vec<usize> = loops
        .iter()
        .enumerate()
        .map(|(i, lp)| {
            let rep = lp[0];
            loops
                .iter()
                .enumerate()
                .filter(|&(j, other)| j != i && point_in_path(rep, other))
                .count()
        })
        .collect();

    // Assemble even-depth loops as exteriors and hang their odd-depth
    // children off them.
    let mut polygons: Vec<Polygon<Real>> = Vec::new();
    for (i, lp) in loops.iter().enumerate() {
        if depths[i] % 2 != 0 {
            continue;
        }

        let mut interiors = Vec::new();
        for (j, hole) in loops.iter().enumerate() {
            if depths[j] != depths[i] + 1 {
                continue;
            }
            if point_in_path(hole[0], lp) {
                interiors.push(LineString::new(oriented(hole, false)));
            }
        }

        polygons.push(Polygon::new(LineString::new(oriented(lp, true)), interiors));
    }

    if polygons.is_empty() {
        return Vec::new();
    }

    // Merge touching solids pairwise, then split the result back into one
    // path set per connected region.
    let mut acc = MultiPolygon(vec![polygons[0].clone()]);
    for poly in polygons.iter().skip(1) {
        acc = acc.union(&MultiPolygon(vec![poly.clone()]));
    }
    let oriented_acc = acc.orient(Direction::Default);

    let mut islands = Vec::new();
    for poly in &oriented_acc {
        let island = from_multipolygon(&MultiPolygon(vec![poly.clone()]));
        if !island.is_empty() {
            islands.push(island);
        }
    }
    islands
}
