//! Per-layer data model: slice segments, islands, printable segments, and
//! the tool-head motions they expand into.

use hashbrown::HashMap;

use crate::float_types::Real;
use crate::geom2d::{IntPoint, IntPoint3, PathSet};

/// A slice-plane line segment still tagged with the triangle that produced
/// it. Lives only between the layer slicer and the island builder.
#[derive(Debug, Clone)]
pub struct SliceSegment {
    pub p1: IntPoint,
    pub p2: IntPoint,
    pub triangle: usize,
    pub used_in_polygon: bool,
}

impl SliceSegment {
    pub fn new(p1: IntPoint, p2: IntPoint, triangle: usize) -> Self {
        Self {
            p1,
            p2,
            triangle,
            used_in_polygon: false,
        }
    }

    pub fn swap_points(&mut self) {
        std::mem::swap(&mut self.p1, &mut self.p2);
    }
}

/// One straight infill line inside a segment region.
#[derive(Debug, Clone, Copy)]
pub struct FillLine {
    pub p1: IntPoint,
    pub p2: IntPoint,
}

impl FillLine {
    pub fn new(p1: IntPoint, p2: IntPoint) -> Self {
        Self { p1, p2 }
    }

    pub fn swap_points(&mut self) {
        std::mem::swap(&mut self.p1, &mut self.p2);
    }
}

/// One tool-head motion, consumed in order by the G-code emitter.
#[derive(Debug, Clone)]
pub enum ToolSegment {
    /// Pull filament back before a long travel; paired with an un-retract
    /// when extrusion resumes.
    Retract { distance: i64 },
    /// Move without extruding.
    Travel {
        from: IntPoint3,
        to: IntPoint3,
        speed: u32,
    },
    /// Move while extruding.
    Extrude {
        from: IntPoint3,
        to: IntPoint3,
        speed: u32,
    },
}

impl ToolSegment {
    /// Straight-line length of a moving segment, zero for a retraction.
    pub fn move_distance(&self) -> i64 {
        match self {
            ToolSegment::Retract { .. } => 0,
            ToolSegment::Travel { from, to, .. } | ToolSegment::Extrude { from, to, .. } => {
                let dx = (to.x - from.x) as Real;
                let dy = (to.y - from.y) as Real;
                let dz = (to.z - from.z) as Real;
                (dx * dx + dy * dy + dz * dz).sqrt() as i64
            },
        }
    }
}

/// What a printable segment is for; decides speeds and fill density.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentKind {
    Outline,
    Infill,
    Top,
    Bottom,
    Support,
    Skirt,
    Raft,
}

impl SegmentKind {
    /// Whether this kind carries straight fill lines rather than extruding
    /// its region boundary.
    pub fn carries_infill(self) -> bool {
        matches!(
            self,
            SegmentKind::Infill | SegmentKind::Top | SegmentKind::Bottom | SegmentKind::Support
        )
    }
}

/// Fill-line payload of the infill-carrying segment kinds.
#[derive(Debug, Clone)]
pub struct InfillData {
    /// Density in percent; 100 is solid.
    pub density: Real,
    /// Extrusion multiplier, >1 for bridging skins.
    pub multiplier: Real,
    pub lines: Vec<FillLine>,
}

impl InfillData {
    pub fn new() -> Self {
        Self {
            density: 100.0,
            multiplier: 1.0,
            lines: Vec::new(),
        }
    }
}

impl Default for InfillData {
    fn default() -> Self {
        Self::new()
    }
}

/// One printable region of an island, plus the motions planned for it.
#[derive(Debug, Clone)]
pub struct LayerSegment {
    pub kind: SegmentKind,
    /// Region boundary, exterior first per region.
    pub outline: PathSet,
    pub speed: u32,
    pub fill: Option<InfillData>,
    pub tool_segments: Vec<ToolSegment>,
}

impl LayerSegment {
    pub fn new(kind: SegmentKind, speed: u32) -> Self {
        Self {
            kind,
            outline: PathSet::new(),
            speed,
            fill: None,
            tool_segments: Vec::new(),
        }
    }

    pub fn with_infill(kind: SegmentKind, speed: u32) -> Self {
        Self {
            kind,
            outline: PathSet::new(),
            speed,
            fill: Some(InfillData::new()),
            tool_segments: Vec::new(),
        }
    }
}

/// A maximal connected solid region on one layer, possibly with holes.
#[derive(Debug, Clone, Default)]
pub struct LayerIsland {
    /// Outer contour first, holes after.
    pub outline: PathSet,
    /// Append-only; the planner relies on outline segments preceding the
    /// fill-carrying kinds.
    pub segments: Vec<LayerSegment>,
}

/// Everything belonging to one layer.
#[derive(Debug, Clone, Default)]
pub struct LayerComponent {
    /// Transient slicer output, cleared by the island builder.
    pub slice_segments: Vec<SliceSegment>,
    /// Triangle id → index into `slice_segments`; a triangle contributes at
    /// most one segment per layer. Transient alongside it.
    pub face_to_segment: HashMap<usize, usize>,
    pub islands: Vec<LayerIsland>,
    pub layer_speed: u32,
    pub move_speed: u32,
    /// Z-change travels prepended before any island of this layer.
    pub initial_moves: Vec<ToolSegment>,
    /// Priming loops; populated on layer 0 only.
    pub skirt: Option<LayerSegment>,
}

impl LayerComponent {
    pub fn new(layer_speed: u32, move_speed: u32) -> Self {
        Self {
            layer_speed,
            move_speed,
            ..Default::default()
        }
    }
}

/// The finished slicing product: one component per layer, in order.
#[derive(Debug)]
pub struct SlicedModel {
    pub layers: Vec<LayerComponent>,
}

impl SlicedModel {
    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }
}
