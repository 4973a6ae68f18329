//! Polygon offsetting (insetting shells, growing skirts) via `geo-buf`.
//!
//! Positive distances grow the region, negative distances shrink it.
//! Corners stay sharp (no arc insertion), which is what extruded shell
//! centerlines want. A shrink that consumes the whole region yields an
//! empty set, which callers treat as "nothing left to print".

use geo_buf::buffer_multi_polygon;

use crate::float_types::Real;
use crate::geom2d::{PathSet, boolean};

/// Offset every region in `paths` by `delta` fixed-point units.
pub fn offset(paths: &PathSet, delta: i64) -> PathSet {
    if paths.is_empty() {
        return PathSet::new();
    }

    let mp = boolean::to_multipolygon(paths);
    if mp.0.is_empty() {
        return PathSet::new();
    }

    let buffered = buffer_multi_polygon(&mp, delta as Real);
    boolean::from_multipolygon(&buffered)
}
