//! Stage 3: inset each island outline into concentric printed shells and
//! leave behind the boundary the infill stages trim against.

use log::debug;
use rayon::prelude::*;

use crate::config::SliceSettings;
use crate::float_types::{NOZZLE_WIDTH, SCALE};
use crate::geom2d::offset::offset;
use crate::progress::Progressor;
use crate::slicer::layer::{LayerComponent, LayerSegment, SegmentKind};

pub(crate) fn generate_outlines(
    settings: &SliceSettings,
    layers: &mut [LayerComponent],
    progress: &Progressor,
) {
    let shell_count = settings.shell_count();
    if shell_count < 1 {
        debug!("no shells configured, skipping outline stage");
        return;
    }

    let half_nozzle = -((NOZZLE_WIDTH * SCALE / 2.0) as i64);
    let nozzle = (NOZZLE_WIDTH * SCALE) as i64;

    layers.par_iter_mut().enumerate().for_each(|(i, layer)| {
        debug!("outlines for layer {i}");

        for isle in &mut layer.islands {
            if isle.outline.is_empty() {
                continue;
            }

            // The outermost shell sits half an extrusion inside the sliced
            // outline so the printed part keeps its dimensions.
            let mut shell = offset(&isle.outline, half_nozzle);

            for j in 0..shell_count {
                let mut segment = LayerSegment::new(SegmentKind::Outline, layer.layer_speed);
                segment.outline = shell.clone();
                isle.segments.push(segment);

                let dist = half_nozzle - nozzle * (j as i64 + 1);
                shell = offset(&isle.outline, dist);
            }

            // The infill boundary is the next inset grown back out one
            // extrusion width, landing on the innermost shell centerline.
            isle.outline = offset(&shell, nozzle);
        }

        progress.complete_step_part();
    });
}
