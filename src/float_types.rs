// Our Real scalar type for mesh-space coordinates:
pub type Real = f64;

/// A small epsilon for geometric comparisons in mesh space.
pub const EPSILON: Real = 1e-9;

// Pi
/// Archimedes' constant (π)
pub const PI: Real = core::f64::consts::PI;

// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
// Fixed-point layer geometry
// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

/// Fixed-point units per millimetre. All 2D geometry downstream of the layer
/// slicer is carried in integer multiples of this scale; the float round-trip
/// is confined to the boolean/offset wrappers in [`crate::geom2d`].
pub const UNITS_PER_MM: i64 = 100_000;

/// [`UNITS_PER_MM`] as a [`Real`], for scaling float mesh coordinates.
pub const SCALE: Real = UNITS_PER_MM as Real;

// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
// Extruder geometry
// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

/// Extruder tip diameter in millimetres; one extrusion track is this wide.
pub const NOZZLE_WIDTH: Real = 0.5;

/// Input filament diameter in millimetres.
pub const FILAMENT_WIDTH: Real = 2.8;

/// Empirical divisor applied to every computed extrusion length. Carried
/// from the machine this pipeline was calibrated against; changing it
/// rescales all E values uniformly.
pub const EXTRUSION_CALIBRATION: Real = 5.0;
