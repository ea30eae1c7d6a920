use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use glam::DVec3;

use crate::core::mesh::Mesh;

#[remain::sorted]
#[derive(thiserror::Error, Debug)]
pub enum Err {
    #[error("bad face index {token:?} in {path:?} line {line}")]
    BadFaceIndex {
        path: PathBuf,
        line: usize,
        token: String,
    },
    #[error("bad vertex in {path:?} line {line}")]
    BadVertex { path: PathBuf, line: usize },
    #[error("face index {index} out of range in {path:?} line {line} ({count} vertices)")]
    FaceIndexOutOfRange {
        path: PathBuf,
        line: usize,
        index: usize,
        count: usize,
    },
    #[error("failed to open {path:?}: {source}")]
    OpenError {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to read {path:?}: {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to write {path:?}: {source}")]
    WriteError {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Reads a triangle mesh from a Wavefront OBJ file.
///
/// Only `v` and `f` directives contribute. Vertices keep their file order,
/// duplicates included; face tokens use their leading position index (any
/// `/texture/normal` suffix is ignored); 1-based indices become 0-based.
/// Faces with more than three vertices are fan-triangulated. Every other
/// directive is skipped.
pub fn load_obj<P: AsRef<Path>>(path: P) -> Result<Mesh, Err> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| Err::OpenError {
        path: path.to_path_buf(),
        source,
    })?;
    let reader = BufReader::new(file);

    let mut vertices: Vec<DVec3> = Vec::new();
    let mut triangles: Vec<[usize; 3]> = Vec::new();

    for (line_no, line) in reader.lines().enumerate() {
        let line = line.map_err(|source| Err::ReadError {
            path: path.to_path_buf(),
            source,
        })?;
        let line = line.trim_end_matches('\r');
        let line_no = line_no + 1;

        if let Some(rest) = line.strip_prefix("v ") {
            let vertex = parse_vertex(rest).ok_or_else(|| Err::BadVertex {
                path: path.to_path_buf(),
                line: line_no,
            })?;
            vertices.push(vertex);
        } else if let Some(rest) = line.strip_prefix("f ") {
            let mut indices = Vec::new();
            for token in rest.split_whitespace() {
                let lead = token.split('/').next().unwrap_or(token);
                let index: usize = lead.parse().map_err(|_| Err::BadFaceIndex {
                    path: path.to_path_buf(),
                    line: line_no,
                    token: token.to_owned(),
                })?;
                let in_range = index >= 1 && index <= vertices.len();
                let index = in_range.then(|| index - 1).ok_or_else(|| {
                    Err::FaceIndexOutOfRange {
                        path: path.to_path_buf(),
                        line: line_no,
                        index,
                        count: vertices.len(),
                    }
                })?;
                indices.push(index);
            }
            // Fan-triangulate anything beyond a triangle.
            for i in 1..indices.len().saturating_sub(1) {
                triangles.push([indices[0], indices[i], indices[i + 1]]);
            }
        }
    }

    Ok(Mesh::from_parts(vertices, triangles))
}

fn parse_vertex(rest: &str) -> Option<DVec3> {
    let mut coords = rest.split_whitespace().map(|w| w.parse::<f64>().ok());
    let x = coords.next()??;
    let y = coords.next()??;
    let z = coords.next()??;
    Some(DVec3::new(x, y, z))
}

/// Writes a mesh as Wavefront OBJ: all vertices, then all faces with
/// 1-based indices, one entity per line.
pub fn write_obj<P: AsRef<Path>>(path: P, mesh: &Mesh) -> Result<(), Err> {
    let path = path.as_ref();
    let write_err = |source| Err::WriteError {
        path: path.to_path_buf(),
        source,
    };

    let file = File::create(path).map_err(write_err)?;
    let mut out = BufWriter::new(file);

    for v in &mesh.vertices {
        writeln!(out, "v {} {} {}", v.x, v.y, v.z).map_err(write_err)?;
    }
    for tri in &mesh.triangles {
        writeln!(out, "f {} {} {}", tri[0] + 1, tri[1] + 1, tri[2] + 1).map_err(write_err)?;
    }

    out.flush().map_err(write_err)
}
