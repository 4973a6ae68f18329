//! A fused-filament slicer: closed triangle meshes in, per-layer toolpaths
//! and G-code out.
//!
//! The pipeline intersects every triangle with the layer planes, chains the
//! resulting segments into islands with holes, insets concentric shells,
//! classifies solid top/bottom skins against the neighbouring layers,
//! carves out sparse-infill regions and covers them with 45° fill lines,
//! rings the first layer with a priming skirt, and finally orders
//! everything into travel/extrude/retract motions a printer can run.
//!
//! # Example
//!
//! ```no_run
//! use lamina::{Progressor, SliceSettings, io::stl, slice_to_file};
//!
//! # fn main() -> Result<(), lamina::SlicerError> {
//! let mesh = stl::load_stl("model.stl")?;
//! let settings = SliceSettings::default();
//! let progress = Progressor::new(
//!     lamina::PIPELINE_STEPS,
//!     Box::new(|pct| eprintln!("{pct:.0}%")),
//! );
//! slice_to_file(&mesh, &settings, "model.gcode", &progress)?;
//! # Ok(())
//! # }
//! ```
//!
//! All layer-plane geometry is carried in fixed-point integer coordinates
//! ([`float_types::UNITS_PER_MM`] units per millimetre); the float-backed
//! boolean and offset engines are wrapped behind [`geom2d`] and round
//! deterministically. Every stage past the mesh index runs parallel over
//! layers via rayon, and each worker writes only to its own layers.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod config;
pub mod errors;
pub mod float_types;
pub mod gcode;
pub mod geom2d;
pub mod io;
pub mod mesh;
pub mod progress;
pub mod slicer;

pub use config::SliceSettings;
pub use errors::SlicerError;
pub use mesh::{Mesh, MeshBuilder};
pub use progress::{ProgressCallback, Progressor};
pub use slicer::layer::SlicedModel;
pub use slicer::{PIPELINE_STEPS, slice_mesh, slice_to_file};
