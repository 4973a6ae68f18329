//! STL import using `stl_io`, both binary and ASCII variants.

use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;

use log::{debug, info};

use crate::errors::SlicerError;
use crate::mesh::{Mesh, MeshBuilder};

/// Read an STL model from any seekable reader and weld it into a [`Mesh`].
pub fn read_stl<R: Read + Seek>(reader: &mut R) -> Result<Mesh, SlicerError> {
    let stl = stl_io::read_stl(reader).map_err(|e| SlicerError::StlParse(e.to_string()))?;

    let mut builder = MeshBuilder::with_capacity(stl.faces.len());
    for face in &stl.faces {
        let corner = |i: usize| {
            let v = stl.vertices[face.vertices[i]];
            [v[0], v[1], v[2]]
        };
        builder.add_triangle([corner(0), corner(1), corner(2)]);
    }

    let mesh = builder.build()?;
    debug!(
        "welded {} STL facets into {} vertices",
        stl.faces.len(),
        mesh.vertex_count()
    );
    Ok(mesh)
}

/// Load an STL file from disk.
pub fn load_stl<P: AsRef<Path>>(path: P) -> Result<Mesh, SlicerError> {
    let path = path.as_ref();
    info!("loading {}", path.display());
    let mut reader = BufReader::new(File::open(path)?);
    read_stl(&mut reader)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn ascii_tetrahedron() -> String {
        // Four faces over four shared vertices.
        let v = [
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [0.0, 0.0, 1.0],
        ];
        let faces = [[0, 2, 1], [0, 1, 3], [0, 3, 2], [1, 2, 3]];

        let mut out = String::from("solid tet\n");
        for face in faces {
            out.push_str("  facet normal 0 0 0\n    outer loop\n");
            for idx in face {
                let p = v[idx];
                out.push_str(&format!("      vertex {} {} {}\n", p[0], p[1], p[2]));
            }
            out.push_str("    endloop\n  endfacet\n");
        }
        out.push_str("endsolid tet\n");
        out
    }

    #[test]
    fn reads_and_welds_ascii_stl() {
        let data = ascii_tetrahedron();
        let mesh = read_stl(&mut Cursor::new(data.into_bytes())).unwrap();
        assert_eq!(mesh.triangle_count(), 4);
        assert_eq!(mesh.vertex_count(), 4);
        assert!(mesh.validate().is_ok());
    }

    #[test]
    fn rejects_garbage() {
        let mut cursor = Cursor::new(b"not an stl file at all".to_vec());
        assert!(read_stl(&mut cursor).is_err());
    }
}
