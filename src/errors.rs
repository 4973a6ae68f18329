use thiserror::Error;

/// All the ways slicing can fail before or during the pipeline.
///
/// Geometric degeneracies (coplanar triangles, zero-length slice segments,
/// empty offsets) are deliberately *not* represented here; those are skipped
/// in place and the pipeline continues. An error from this enum aborts the
/// whole job and no partial output is produced.
#[derive(Debug, Error)]
pub enum SlicerError {
    /// A triangle references a vertex index outside the welded vertex array.
    #[error("vertex index {index} out of bounds for vertex count {bound}")]
    VertexIndexOutOfBounds { index: usize, bound: usize },

    /// The vertex→triangle adjacency references a triangle that does not exist.
    #[error("triangle index {index} out of bounds for triangle count {bound}")]
    TriangleIndexOutOfBounds { index: usize, bound: usize },

    /// The mesh has no triangles at all.
    #[error("mesh has no triangles")]
    EmptyMesh,

    /// A configuration value is outside its usable range.
    #[error("invalid setting {name}: {reason}")]
    InvalidSetting { name: &'static str, reason: String },

    /// The model file could not be parsed as STL.
    #[error("STL parse error: {0}")]
    StlParse(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
