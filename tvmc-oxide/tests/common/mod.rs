//! Shared fixtures: synthetic subsequence directories written to disk in
//! the on-disk layout the decoder consumes.
#![allow(dead_code)]

use std::fs;
use std::path::Path;

use tvmc_oxide::decode::{
    B_MATRIX_FILE, DELTA_TRAJECTORIES_FILE, REFERENCE_MESH_FILE, T_MATRIX_FILE,
};

/// Unit tetrahedron, four vertices, four faces.
pub const TETRAHEDRON_OBJ: &str = "\
v 0 0 0
v 1 0 0
v 0 1 0
v 0 0 1
f 1 2 3
f 1 2 4
f 1 3 4
f 2 3 4
";

pub fn delta_trajectory_bytes(rows: i32, cols: i32, values: &[f64]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(8 + values.len() * 8);
    bytes.extend_from_slice(&rows.to_le_bytes());
    bytes.extend_from_slice(&cols.to_le_bytes());
    for v in values {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Writes the four sequence artifacts into `dir`.
pub fn write_subsequence(
    dir: &Path,
    obj: &str,
    d_hat: (i32, i32, &[f64]),
    b_matrix: &str,
    t_matrix: &str,
) {
    fs::create_dir_all(dir).unwrap();
    fs::write(dir.join(REFERENCE_MESH_FILE), obj).unwrap();
    fs::write(
        dir.join(DELTA_TRAJECTORIES_FILE),
        delta_trajectory_bytes(d_hat.0, d_hat.1, d_hat.2),
    )
    .unwrap();
    fs::write(dir.join(B_MATRIX_FILE), b_matrix).unwrap();
    fs::write(dir.join(T_MATRIX_FILE), t_matrix).unwrap();
}

/// A tetrahedron subsequence whose motion is pure per-frame translation:
/// all delta trajectories are zero (two of the six rows are anchors), so
/// the decoded frames are `V_ref` plus the translation row.
pub fn write_translation_subsequence(dir: &Path, t_matrix_row: &str) {
    let frames = t_matrix_row.split_whitespace().count() / 3;
    let b_row = vec!["0"; frames * 3].join(" ");
    write_subsequence(
        dir,
        TETRAHEDRON_OBJ,
        (6, 1, &[0.0; 6]),
        &b_row,
        t_matrix_row,
    );
}
