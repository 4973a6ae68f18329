//! The slicing pipeline: mesh in, ordered per-layer tool motions out.
//!
//! Stage order matters. Islands must exist before shells; shells rewrite
//! the island boundary the skin classifier cuts from; top and bottom skins
//! must land before the sparse-infill difference or the interior would be
//! counted as skin; fill lines need every region finalized; the planner
//! runs last and the emitter consumes its output.

pub mod layer;

pub(crate) mod infill;
pub(crate) mod islands;
pub(crate) mod outline;
pub(crate) mod skirt;
pub(crate) mod slice_layers;
pub(crate) mod toolpath;
pub(crate) mod top_bottom;

use log::info;

use crate::config::SliceSettings;
use crate::errors::SlicerError;
use crate::mesh::Mesh;
use crate::progress::Progressor;
use layer::{LayerComponent, SlicedModel};

/// Number of progress steps [`slice_mesh`] reports.
pub const PIPELINE_STEPS: u32 = 8;

/// Layers needed to cover the mesh: one per layer-height step, rounded up,
/// plus the final partial layer.
fn layer_count_for(mesh: &Mesh, settings: &SliceSettings) -> usize {
    (mesh.max().z / settings.layer_height).ceil() as usize + 1
}

/// Run the whole pipeline and return the planned model.
pub fn slice_mesh(
    mesh: &Mesh,
    settings: &SliceSettings,
    progress: &Progressor,
) -> Result<SlicedModel, SlicerError> {
    settings.validate()?;
    mesh.validate()?;

    let layer_count = layer_count_for(mesh, settings);
    info!(
        "slicing {} triangles into {layer_count} layers",
        mesh.triangle_count()
    );

    let mut layers: Vec<LayerComponent> =
        std::iter::repeat_with(|| LayerComponent::new(settings.print_speed, settings.travel_speed))
            .take(layer_count)
            .collect();
    let parts = layer_count as u32;

    progress.start_next_step(parts);
    slice_layers::slice_triangles(mesh, settings, &mut layers, progress);

    progress.start_next_step(parts);
    islands::build_islands(mesh, &mut layers, progress);

    progress.start_next_step(parts);
    outline::generate_outlines(settings, &mut layers, progress);

    progress.start_next_step(parts * 2);
    top_bottom::classify_top_bottom(settings, &mut layers, progress);

    progress.start_next_step(parts);
    infill::extract_infill_regions(settings, &mut layers, progress);

    progress.start_next_step(1);
    skirt::generate_skirt(settings, &mut layers);
    progress.complete_step_part();

    progress.start_next_step(parts);
    infill::generate_fill_lines(settings, &mut layers, progress);

    progress.start_next_step(parts);
    toolpath::plan_toolpaths(settings, &mut layers, progress);

    info!("slicing done: {layer_count} layers");
    Ok(SlicedModel { layers })
}

/// Slice and write the G-code file in one call.
pub fn slice_to_file<P: AsRef<std::path::Path>>(
    mesh: &Mesh,
    settings: &SliceSettings,
    path: P,
    progress: &Progressor,
) -> Result<(), SlicerError> {
    let model = slice_mesh(mesh, settings, progress)?;
    crate::gcode::write_gcode_file(&model, settings, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slicer::islands::tests::cube_mesh;

    #[test]
    fn layer_count_follows_ceil_rule() {
        let mesh = cube_mesh([0.0, 0.0, 0.0], 1.0);
        let settings = SliceSettings {
            layer_height: 0.2,
            ..Default::default()
        };
        // ceil(1.0 / 0.2) + 1
        assert_eq!(layer_count_for(&mesh, &settings), 6);
    }

    #[test]
    fn invalid_settings_abort_before_slicing() {
        let mesh = cube_mesh([0.0, 0.0, 0.0], 1.0);
        let settings = SliceSettings {
            layer_height: -1.0,
            ..Default::default()
        };
        assert!(slice_mesh(&mesh, &settings, &Progressor::silent(PIPELINE_STEPS)).is_err());
    }
}
