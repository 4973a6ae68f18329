//! Stage 6: priming rings around everything on the first layer.

use log::debug;

use crate::config::SliceSettings;
use crate::float_types::{NOZZLE_WIDTH, SCALE};
use crate::geom2d::{IntPoint, IntPoint3, boolean, offset::offset};
use crate::slicer::layer::{LayerComponent, LayerSegment, SegmentKind, ToolSegment};

/// Build the skirt on layer 0: the union of all first-layer outlines,
/// pushed out by the skirt clearance, then one ring per configured line,
/// each a nozzle width further out. The rings carry their own tool
/// segments, starting from the tool-head origin.
pub(crate) fn generate_skirt(settings: &SliceSettings, layers: &mut [LayerComponent]) {
    if settings.skirt_line_count == 0 {
        debug!("skirt disabled");
        return;
    }
    let Some(first) = layers.first_mut() else {
        return;
    };

    let base = boolean::union_all(first.islands.iter().map(|isle| &isle.outline));
    if base.is_empty() {
        return;
    }

    let clearance = (settings.skirt_distance * SCALE) as i64;
    let nozzle = (NOZZLE_WIDTH * SCALE) as i64;
    let z = (0.5 * settings.layer_height * SCALE) as i64;

    let mut segment = LayerSegment::new(SegmentKind::Skirt, settings.first_line_speed);
    let mut ring = offset(&base, clearance);
    let mut last_point = IntPoint::new(0, 0);

    for _ in 0..settings.skirt_line_count {
        ring = offset(&ring, nozzle);

        for path in &ring {
            if path.len() < 3 {
                continue;
            }

            segment.tool_segments.push(ToolSegment::Travel {
                from: IntPoint3::from_xy(last_point, z),
                to: IntPoint3::from_xy(path[0], z),
                speed: first.move_speed,
            });

            for k in 0..path.len() {
                let from = path[k];
                let to = path[(k + 1) % path.len()];
                segment.tool_segments.push(ToolSegment::Extrude {
                    from: IntPoint3::from_xy(from, z),
                    to: IntPoint3::from_xy(to, z),
                    speed: segment.speed,
                });
            }
            last_point = path[0];
        }

        segment.outline.extend(ring.iter().cloned());
    }

    if !segment.tool_segments.is_empty() {
        first.skirt = Some(segment);
    }
}
