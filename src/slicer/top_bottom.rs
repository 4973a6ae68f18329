//! Stage 4: decide which parts of each island are solid top or bottom
//! skin by differencing against the unioned outlines of the neighbouring
//! layers.

use log::debug;

use crate::config::SliceSettings;
use crate::float_types::{NOZZLE_WIDTH, SCALE};
use crate::geom2d::{PathSet, boolean, offset::offset};
use crate::progress::Progressor;
use crate::slicer::layer::{LayerComponent, LayerSegment, SegmentKind};

/// Per-island classification result for one layer.
type LayerRegions = Vec<Option<PathSet>>;

pub(crate) fn classify_top_bottom(
    settings: &SliceSettings,
    layers: &mut [LayerComponent],
    progress: &Progressor,
) {
    let solid_layers = settings.solid_layer_count();
    if solid_layers == 0 {
        debug!("no solid skin configured, skipping top/bottom stage");
        return;
    }

    // The two directions are independent; classify them concurrently and
    // append sequentially afterwards so each island's segment order stays
    // deterministic (top before bottom).
    let snapshot: &[LayerComponent] = layers;
    let (tops, bottoms) = rayon::join(
        || classify_direction(snapshot, solid_layers, Direction::Top, progress),
        || classify_direction(snapshot, solid_layers, Direction::Bottom, progress),
    );

    for (i, layer) in layers.iter_mut().enumerate() {
        if let Some(regions) = &tops[i] {
            append_segments(layer, regions, SegmentKind::Top, settings, i, false);
        }
        if let Some(regions) = &bottoms[i] {
            append_segments(layer, regions, SegmentKind::Bottom, settings, i, true);
        }
    }
}

#[derive(Clone, Copy, PartialEq)]
enum Direction {
    Top,
    Bottom,
}

fn classify_direction(
    layers: &[LayerComponent],
    solid_layers: usize,
    direction: Direction,
    progress: &Progressor,
) -> Vec<Option<LayerRegions>> {
    let layer_count = layers.len();
    let noise_margin = (NOZZLE_WIDTH * SCALE / 10.0) as i64;
    let mut results: Vec<Option<LayerRegions>> = vec![None; layer_count];

    // The outermost layers in this direction are solid in their entirety.
    let full_range: Vec<usize> = match direction {
        Direction::Top => (layer_count.saturating_sub(solid_layers)..layer_count).collect(),
        Direction::Bottom => (0..solid_layers.min(layer_count)).collect(),
    };
    for i in full_range {
        let regions = layers[i]
            .islands
            .iter()
            .map(|isle| Some(isle.outline.clone()))
            .collect();
        results[i] = Some(regions);
        progress.complete_step_part();
    }

    // Interior layers: difference each island against the intersection of
    // the next `solid_layers` outlines in this direction.
    let interior: Vec<usize> = match direction {
        Direction::Top => {
            if layer_count > solid_layers {
                (1..layer_count - solid_layers).collect()
            } else {
                Vec::new()
            }
        },
        Direction::Bottom => {
            if layer_count >= 2 {
                (solid_layers.max(1)..layer_count - 1).collect()
            } else {
                Vec::new()
            }
        },
    };

    for i in interior {
        debug!(
            "{}: layer {i}",
            if direction == Direction::Top { "top" } else { "bottom" }
        );

        let neighbours: Vec<usize> = match direction {
            Direction::Top => (i + 1..(i + solid_layers + 1).min(layer_count)).collect(),
            Direction::Bottom => (i.saturating_sub(solid_layers)..i).rev().collect(),
        };

        let mut stack_intersection = PathSet::new();
        for j in neighbours {
            let combined =
                boolean::union_all(layers[j].islands.iter().map(|isle| &isle.outline));

            if stack_intersection.is_empty() {
                stack_intersection = combined;
                continue;
            }
            stack_intersection = boolean::intersection(&stack_intersection, &combined);
        }

        // Grow the intersection a little to keep slicing noise from
        // punching pinholes in the difference.
        stack_intersection = offset(&stack_intersection, noise_margin);

        let regions = layers[i]
            .islands
            .iter()
            .map(|isle| {
                let region = boolean::difference(&isle.outline, &stack_intersection);
                if region.is_empty() { None } else { Some(region) }
            })
            .collect();
        results[i] = Some(regions);
        progress.complete_step_part();
    }

    results
}

fn append_segments(
    layer: &mut LayerComponent,
    regions: &LayerRegions,
    kind: SegmentKind,
    settings: &SliceSettings,
    layer_index: usize,
    is_bottom: bool,
) {
    let solid_layers = settings.solid_layer_count();
    let rests_on_bed = is_bottom && layer_index < solid_layers;

    for (isle, region) in layer.islands.iter_mut().zip(regions) {
        let Some(region) = region else { continue };

        let mut segment = if rests_on_bed {
            // Bed-supported skin prints at plain infill speed.
            LayerSegment::with_infill(kind, settings.infill_speed)
        } else {
            // Everything else is probably a bridge: slower is riskier than
            // extra flow, so print at travel speed with doubled extrusion.
            let mut seg = LayerSegment::with_infill(kind, settings.travel_speed);
            if let Some(fill) = &mut seg.fill {
                fill.multiplier = 2.0;
            }
            seg
        };
        segment.outline = region.clone();
        isle.segments.push(segment);
    }
}
