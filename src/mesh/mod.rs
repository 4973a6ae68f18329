//! The welded triangle mesh the whole pipeline reads from.
//!
//! Construction goes through [`MeshBuilder`], which welds exactly-coincident
//! vertices as triangles stream in and derives the vertex→triangle adjacency
//! and bounding box once at [`MeshBuilder::build`]. After that the mesh is
//! immutable: no operation can truncate vertex storage out from under the
//! adjacency lists.

use hashbrown::HashMap;
use nalgebra::Point3;

use crate::errors::SlicerError;
use crate::float_types::Real;

/// An indexed triangle surface with per-vertex adjacency.
#[derive(Debug, Clone)]
pub struct Mesh {
    /// Welded vertex positions, xyz triples.
    positions: Vec<f32>,
    /// Vertex indices, one triple per triangle.
    triangles: Vec<[u32; 3]>,
    /// For each vertex, the triangles that use it.
    vertex_triangles: Vec<Vec<u32>>,
    min: Point3<Real>,
    max: Point3<Real>,
}

impl Mesh {
    pub fn vertex_count(&self) -> usize {
        self.positions.len() / 3
    }

    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    pub fn triangles(&self) -> &[[u32; 3]] {
        &self.triangles
    }

    /// Triangles sharing vertex `vertex`.
    pub fn triangles_of_vertex(&self, vertex: u32) -> &[u32] {
        &self.vertex_triangles[vertex as usize]
    }

    /// One coordinate (0 = x, 1 = y, 2 = z) of the three corners of a
    /// triangle.
    pub fn triangle_axis(&self, triangle: usize, axis: usize) -> [Real; 3] {
        let tri = self.triangles[triangle];
        [
            self.positions[tri[0] as usize * 3 + axis] as Real,
            self.positions[tri[1] as usize * 3 + axis] as Real,
            self.positions[tri[2] as usize * 3 + axis] as Real,
        ]
    }

    pub fn min(&self) -> Point3<Real> {
        self.min
    }

    pub fn max(&self) -> Point3<Real> {
        self.max
    }

    /// Check the structural invariants the pipeline indexes by: every
    /// triangle's vertex indices are in range and every adjacency entry
    /// names a real triangle. Violations are caller-side defects and abort
    /// the job.
    pub fn validate(&self) -> Result<(), SlicerError> {
        if self.triangles.is_empty() {
            return Err(SlicerError::EmptyMesh);
        }

        let vertex_count = self.vertex_count();
        for tri in &self.triangles {
            for &idx in tri {
                if idx as usize >= vertex_count {
                    return Err(SlicerError::VertexIndexOutOfBounds {
                        index: idx as usize,
                        bound: vertex_count,
                    });
                }
            }
        }

        let triangle_count = self.triangle_count();
        for adjacency in &self.vertex_triangles {
            for &tri in adjacency {
                if tri as usize >= triangle_count {
                    return Err(SlicerError::TriangleIndexOutOfBounds {
                        index: tri as usize,
                        bound: triangle_count,
                    });
                }
            }
        }

        Ok(())
    }
}

/// Streams triangles in, welds vertices, and produces an immutable [`Mesh`].
#[derive(Default)]
pub struct MeshBuilder {
    positions: Vec<f32>,
    triangles: Vec<[u32; 3]>,
    /// Weld table keyed on the raw bit patterns of a position; only
    /// exactly-equal vertices merge.
    weld: HashMap<[u32; 3], u32>,
}

impl MeshBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(triangles: usize) -> Self {
        Self {
            positions: Vec::with_capacity(triangles * 3),
            triangles: Vec::with_capacity(triangles),
            weld: HashMap::with_capacity(triangles * 3),
        }
    }

    fn weld_vertex(&mut self, position: [f32; 3]) -> u32 {
        let key = [
            position[0].to_bits(),
            position[1].to_bits(),
            position[2].to_bits(),
        ];
        if let Some(&idx) = self.weld.get(&key) {
            return idx;
        }
        let idx = (self.positions.len() / 3) as u32;
        self.positions.extend_from_slice(&position);
        self.weld.insert(key, idx);
        idx
    }

    pub fn add_triangle(&mut self, corners: [[f32; 3]; 3]) {
        let tri = [
            self.weld_vertex(corners[0]),
            self.weld_vertex(corners[1]),
            self.weld_vertex(corners[2]),
        ];
        self.triangles.push(tri);
    }

    pub fn build(self) -> Result<Mesh, SlicerError> {
        if self.triangles.is_empty() {
            return Err(SlicerError::EmptyMesh);
        }

        let vertex_count = self.positions.len() / 3;
        let mut vertex_triangles: Vec<Vec<u32>> = vec![Vec::new(); vertex_count];
        for (t, tri) in self.triangles.iter().enumerate() {
            for &v in tri {
                let list = &mut vertex_triangles[v as usize];
                // A degenerate triangle repeats a vertex; record it once.
                if list.last() != Some(&(t as u32)) {
                    list.push(t as u32);
                }
            }
        }

        let mut min = Point3::new(Real::MAX, Real::MAX, Real::MAX);
        let mut max = Point3::new(Real::MIN, Real::MIN, Real::MIN);
        for chunk in self.positions.chunks_exact(3) {
            let (x, y, z) = (chunk[0] as Real, chunk[1] as Real, chunk[2] as Real);
            min.x = min.x.min(x);
            min.y = min.y.min(y);
            min.z = min.z.min(z);
            max.x = max.x.max(x);
            max.y = max.y.max(y);
            max.z = max.z.max(z);
        }

        Ok(Mesh {
            positions: self.positions,
            triangles: self.triangles,
            vertex_triangles,
            min,
            max,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn welding_merges_identical_vertices() {
        let mut builder = MeshBuilder::new();
        builder.add_triangle([[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]]);
        builder.add_triangle([[1.0, 0.0, 0.0], [1.0, 1.0, 0.0], [0.0, 1.0, 0.0]]);
        let mesh = builder.build().unwrap();

        // Two triangles sharing an edge: 4 unique vertices, not 6.
        assert_eq!(mesh.vertex_count(), 4);
        assert_eq!(mesh.triangle_count(), 2);
        assert!(mesh.validate().is_ok());
    }

    #[test]
    fn adjacency_lists_triangles_per_vertex() {
        let mut builder = MeshBuilder::new();
        builder.add_triangle([[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]]);
        builder.add_triangle([[1.0, 0.0, 0.0], [1.0, 1.0, 0.0], [0.0, 1.0, 0.0]]);
        let mesh = builder.build().unwrap();

        // The shared-edge vertices touch both triangles.
        let shared = mesh
            .vertex_triangles
            .iter()
            .filter(|list| list.len() == 2)
            .count();
        assert_eq!(shared, 2);
    }

    #[test]
    fn bounding_box_covers_extrema() {
        let mut builder = MeshBuilder::new();
        builder.add_triangle([[-1.0, 0.0, 0.5], [2.0, -3.0, 0.0], [0.0, 1.0, 4.0]]);
        let mesh = builder.build().unwrap();
        assert_eq!(mesh.min(), Point3::new(-1.0, -3.0, 0.0));
        assert_eq!(mesh.max(), Point3::new(2.0, 1.0, 4.0));
    }

    #[test]
    fn empty_builder_is_an_error() {
        assert!(matches!(
            MeshBuilder::new().build(),
            Err(SlicerError::EmptyMesh)
        ));
    }
}
