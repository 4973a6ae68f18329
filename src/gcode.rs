//! Text G-code rendering of a sliced model.
//!
//! The writer is stateful: axis words are only emitted when they change,
//! feed rates are tracked separately for travels and extrusions, and a
//! retraction stays "open" until the next extrusion restores the E
//! position. The output is a complete file or nothing.

use std::fmt::Write as _;
use std::path::Path;

use log::info;

use crate::config::SliceSettings;
use crate::errors::SlicerError;
use crate::float_types::{
    EXTRUSION_CALIBRATION, FILAMENT_WIDTH, NOZZLE_WIDTH, Real, SCALE,
};
use crate::slicer::layer::{LayerSegment, SegmentKind, SlicedModel, ToolSegment};

/// Filament length consumed by a move of `distance` fixed-point units: the
/// deposited volume relative to filament cross-section, through the
/// calibration divisor.
fn extrusion_distance(distance: i64, settings: &SliceSettings) -> Real {
    if settings.layer_height == 0.0 {
        return 0.0;
    }
    let volume = (distance as Real / SCALE) * settings.layer_height / NOZZLE_WIDTH;
    let filament_to_tip = FILAMENT_WIDTH / NOZZLE_WIDTH;
    volume / filament_to_tip / EXTRUSION_CALIBRATION
}

fn kind_label(kind: SegmentKind) -> &'static str {
    match kind {
        SegmentKind::Outline => "Outline",
        SegmentKind::Infill => "Infill",
        SegmentKind::Top => "Top",
        SegmentKind::Bottom => "Bottom",
        SegmentKind::Support => "Support",
        SegmentKind::Skirt => "Skirt",
        SegmentKind::Raft => "Raft",
    }
}

struct GCodeWriter<'a> {
    out: String,
    settings: &'a SliceSettings,
    current_e: Real,
    prev_x: Real,
    prev_y: Real,
    prev_z: Real,
    prev_travel_feed: u32,
    prev_extrude_feed: u32,
    retracted: bool,
}

impl<'a> GCodeWriter<'a> {
    fn new(settings: &'a SliceSettings) -> Self {
        Self {
            out: String::new(),
            settings,
            current_e: 0.0,
            prev_x: 0.0,
            prev_y: 0.0,
            prev_z: 0.0,
            prev_travel_feed: 0,
            prev_extrude_feed: 0,
            retracted: false,
        }
    }

    fn line(&mut self, s: &str) {
        self.out.push_str(s);
        self.out.push('\n');
    }

    fn preamble(&mut self, layer_count: usize) {
        let _ = writeln!(self.out, ";Layer count: {layer_count}");
        self.line("G21");
        self.line("G90");
        self.line("G28 X0 Y0 Z0");
        if let Some(temp) = self.settings.print_temperature {
            let _ = writeln!(self.out, "M109 T0 S{temp}");
        }
        self.line("G92 E0");
        self.line("G1 F600");
    }

    fn postamble(&mut self) {
        self.line("M104 S0");
        self.line("G91");
        self.line("G1 E-5 F4800");
        self.line("G1 Z+0.5 X-15 Y-15 F4800");
        self.line("G28 X0 Y0");
    }

    /// Append the X/Y/Z words that differ from the previous position.
    fn changed_axes(&mut self, x: Real, y: Real, z: Real) {
        if x != self.prev_x {
            self.prev_x = x;
            let _ = write!(self.out, " X{x:.3}");
        }
        if y != self.prev_y {
            self.prev_y = y;
            let _ = write!(self.out, " Y{y:.3}");
        }
        if z != self.prev_z {
            self.prev_z = z;
            let _ = write!(self.out, " Z{z:.3}");
        }
    }

    fn tool_segment(&mut self, segment: &ToolSegment, speed: u32) {
        match segment {
            ToolSegment::Retract { distance } => {
                let e = self.current_e - (*distance as Real / SCALE);
                let _ = write!(self.out, "G1 E{e:.3}");
                if self.settings.retraction_speed != self.prev_extrude_feed {
                    self.prev_extrude_feed = self.settings.retraction_speed;
                    let _ = write!(self.out, " F{}", self.prev_extrude_feed);
                }
                self.out.push('\n');
                self.retracted = true;
            },
            ToolSegment::Travel { from, to, speed } => {
                if from == to {
                    return;
                }
                self.out.push_str("G0");
                self.changed_axes(
                    to.x as Real / SCALE,
                    to.y as Real / SCALE,
                    to.z as Real / SCALE,
                );
                if *speed != self.prev_travel_feed {
                    self.prev_travel_feed = *speed;
                    let _ = write!(self.out, " F{speed}");
                }
                self.out.push('\n');
            },
            ToolSegment::Extrude { from, to, .. } => {
                if from == to {
                    return;
                }

                // Restore the filament position before extruding again.
                if self.retracted {
                    let _ = writeln!(self.out, "G1 E{:.3}", self.current_e);
                    self.retracted = false;
                }

                self.out.push_str("G1");
                self.changed_axes(
                    to.x as Real / SCALE,
                    to.y as Real / SCALE,
                    to.z as Real / SCALE,
                );

                self.current_e += extrusion_distance(segment.move_distance(), self.settings);
                let _ = write!(self.out, " E{:.3}", self.current_e);

                if speed != self.prev_extrude_feed {
                    self.prev_extrude_feed = speed;
                    let _ = write!(self.out, " F{speed}");
                }
                self.out.push('\n');
            },
        }
    }

    fn layer_segment(&mut self, segment: &LayerSegment) {
        let _ = writeln!(self.out, ";Segment: {}", kind_label(segment.kind));
        for tool in &segment.tool_segments {
            let speed = match tool {
                ToolSegment::Extrude { speed, .. } => *speed,
                _ => segment.speed,
            };
            self.tool_segment(tool, speed);
        }
    }
}

/// Render the full G-code document for a sliced model.
pub fn render_gcode(model: &SlicedModel, settings: &SliceSettings) -> String {
    let mut w = GCodeWriter::new(settings);
    w.preamble(model.layer_count());

    for (i, layer) in model.layers.iter().enumerate() {
        let _ = writeln!(w.out, ";Layer: {i}");

        for tool in &layer.initial_moves {
            w.tool_segment(tool, layer.layer_speed);
        }

        if let Some(skirt) = &layer.skirt {
            w.layer_segment(skirt);
        }

        for isle in &layer.islands {
            w.line(";Island");
            for segment in &isle.segments {
                w.layer_segment(segment);
            }
        }
    }

    w.postamble();
    w.out
}

/// Render and write to disk. A failed write removes the partial file so
/// the job leaves either a complete document or nothing.
pub fn write_gcode_file<P: AsRef<Path>>(
    model: &SlicedModel,
    settings: &SliceSettings,
    path: P,
) -> Result<(), SlicerError> {
    let path = path.as_ref();
    let document = render_gcode(model, settings);

    if let Err(e) = std::fs::write(path, document) {
        let _ = std::fs::remove_file(path);
        return Err(e.into());
    }

    info!("wrote {}", path.display());
    Ok(())
}
