pub mod laplacian;
pub mod solver;

use std::path::{Path, PathBuf};

use faer::Mat;
use glam::DVec3;

use crate::core::mesh::Mesh;
use crate::core::shared::ConfigType;
use crate::core::sparse::CsrMatrix;
use crate::io;

/// Artifact file names inside a subsequence directory.
pub const REFERENCE_MESH_FILE: &str = "decoded_decimated_reference_mesh_subdivided.obj";
pub const DELTA_TRAJECTORIES_FILE: &str = "delta_trajectories.bin";
pub const B_MATRIX_FILE: &str = "B_matrix.txt";
pub const T_MATRIX_FILE: &str = "T_matrix.txt";

#[remain::sorted]
#[derive(thiserror::Error, Debug)]
pub enum Err {
    #[error("bad shape for {which}: got {got}, expected {expected}")]
    BadShape {
        which: &'static str,
        got: String,
        expected: String,
    },
    #[error("sequence directory path is empty")]
    EmptyPath,
    #[error(transparent)]
    IoError(#[from] io::Err),
    #[error("sequence has not been decoded yet")]
    NotReady,
    #[error("frame index {frame} out of range ({frames} frames)")]
    OutOfRange { frame: usize, frames: usize },
    #[error("failed to create output directory {path:?}: {source}")]
    OutputDirError {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error(transparent)]
    SolverError(#[from] solver::Err),
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Iteration cap for the least-squares solve of each latent column.
    pub max_solver_iterations: usize,
    /// Relative normal-equation residual at which a column counts as
    /// converged.
    pub solver_tolerance: f64,
}

impl ConfigType for Config {
    fn default() -> Self {
        Self {
            max_solver_iterations: 500,
            solver_tolerance: 1e-6,
        }
    }
}

/// Decoder for one subsequence of a TVM stream.
///
/// Owns the subsequence's reference mesh and matrices, runs the
/// reconstruction pipeline, and serves per-frame vertex positions from a
/// cache of decoded displacements. States progress `Empty -> Loaded ->
/// Decoded`; [`Decoder::clear`] returns to `Empty` from anywhere.
#[derive(Debug)]
pub struct Decoder {
    name: String,
    cfg: Config,

    mesh: Mesh,
    d_hat: Mat<f64>,
    b_matrix: Mat<f64>,
    t_matrix: Mat<f64>,
    s_hat: Mat<f64>,
    t_hat: Mat<f64>,
    l_star: Option<CsrMatrix>,
    anchor_indices: Vec<usize>,

    frames: Vec<Vec<DVec3>>,
    reference_vertex_buffer: Vec<f64>,
    triangle_indices_flat: Vec<u32>,

    total_frames: usize,
    vertices_per_frame: usize,
    is_loaded: bool,
    is_decoded: bool,
}

impl Decoder {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_config(name, Config::default())
    }

    pub fn with_config(name: impl Into<String>, cfg: Config) -> Self {
        Self {
            name: name.into(),
            cfg,
            mesh: Mesh::new(),
            d_hat: Mat::new(),
            b_matrix: Mat::new(),
            t_matrix: Mat::new(),
            s_hat: Mat::new(),
            t_hat: Mat::new(),
            l_star: None,
            anchor_indices: Vec::new(),
            frames: Vec::new(),
            reference_vertex_buffer: Vec::new(),
            triangle_indices_flat: Vec::new(),
            total_frames: 0,
            vertices_per_frame: 0,
            is_loaded: false,
            is_decoded: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_loaded(&self) -> bool {
        self.is_loaded
    }

    pub fn is_decoded(&self) -> bool {
        self.is_decoded
    }

    pub fn frame_count(&self) -> usize {
        self.total_frames
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices_per_frame
    }

    pub fn mesh(&self) -> &Mesh {
        &self.mesh
    }

    /// Reference vertices as a flat `[x, y, z, x, y, z, ...]` buffer of
    /// length `3 * vertex_count`.
    pub fn reference_vertices(&self) -> &[f64] {
        &self.reference_vertex_buffer
    }

    pub fn triangle_indices_flat(&self) -> &[u32] {
        &self.triangle_indices_flat
    }

    /// The per-vertex latent coefficient matrix `S_hat`, empty before
    /// decoding.
    pub fn s_hat(&self) -> &Mat<f64> {
        &self.s_hat
    }

    /// The compressed stacked operator `[L; A]`, present once decoded.
    pub fn stacked_operator(&self) -> Option<&CsrMatrix> {
        self.l_star.as_ref()
    }

    /// The inferred anchor vertex indices, empty before decoding.
    pub fn anchor_indices(&self) -> &[usize] {
        &self.anchor_indices
    }

    /// Loads the four sequence artifacts from `dir` and derives the
    /// adjacency structure. Transitions `Empty -> Loaded`; on any failure
    /// the decoder is cleared back to `Empty`.
    pub fn load(&mut self, dir: &Path) -> Result<(), Err> {
        if dir.as_os_str().is_empty() {
            return Result::Err(Err::EmptyPath);
        }

        tracing::info!(decoder = %self.name, ?dir, "loading sequence");
        let result = self.load_inner(dir);
        if let Result::Err(err) = &result {
            tracing::error!(decoder = %self.name, %err, "load failed");
            self.clear();
        }
        result
    }

    fn load_inner(&mut self, dir: &Path) -> Result<(), Err> {
        let mut mesh = io::obj::load_obj(dir.join(REFERENCE_MESH_FILE))
            .map_err(io::Err::ObjError)?;
        mesh.compute_adjacency();
        tracing::info!(
            vertices = mesh.vertex_count(),
            triangles = mesh.triangle_count(),
            "loaded reference mesh"
        );

        let d_hat = io::matrix::load_delta_trajectories(dir.join(DELTA_TRAJECTORIES_FILE))
            .map_err(io::Err::MatrixError)?;
        tracing::info!(rows = d_hat.nrows(), cols = d_hat.ncols(), "loaded delta trajectories");

        let b_matrix =
            io::matrix::load_txt(dir.join(B_MATRIX_FILE)).map_err(io::Err::MatrixError)?;
        let t_matrix =
            io::matrix::load_txt(dir.join(T_MATRIX_FILE)).map_err(io::Err::MatrixError)?;
        tracing::info!(
            b_rows = b_matrix.nrows(),
            b_cols = b_matrix.ncols(),
            t_rows = t_matrix.nrows(),
            t_cols = t_matrix.ncols(),
            "loaded basis and translation matrices"
        );

        self.triangle_indices_flat = mesh.triangle_indices_flat();
        self.total_frames = b_matrix.ncols() / 3;
        self.vertices_per_frame = mesh.vertex_count();
        self.mesh = mesh;
        self.d_hat = d_hat;
        self.b_matrix = b_matrix;
        self.t_matrix = t_matrix;
        self.is_loaded = true;
        Ok(())
    }

    /// Runs the reconstruction pipeline and caches every frame's
    /// displacements. Requires `Loaded`; a second call on a `Decoded`
    /// decoder is a no-op. Shape and solver failures clear the decoder
    /// back to `Empty`.
    pub fn decode(&mut self) -> Result<(), Err> {
        if !self.is_loaded {
            return Result::Err(Err::NotReady);
        }
        if self.is_decoded {
            return Ok(());
        }

        let result = self.decode_inner();
        if let Result::Err(err) = &result {
            tracing::error!(decoder = %self.name, %err, "decode failed");
            self.clear();
        }
        result
    }

    fn decode_inner(&mut self) -> Result<(), Err> {
        let n = self.mesh.vertex_count();
        let rows = self.d_hat.nrows();
        if rows < n {
            return Result::Err(Err::BadShape {
                which: "delta trajectories",
                got: format!("{rows} rows"),
                expected: format!("at least {n} rows"),
            });
        }
        let anchor_count = rows - n;
        self.anchor_indices = laplacian::anchor_indices(n, anchor_count);
        tracing::info!(n, anchor_count, "inferred anchors");

        let l_star = laplacian::build_laplacian(&self.mesh, &self.anchor_indices);

        // The right-hand side is the regular rows followed by the anchor
        // rows, which is exactly the layout d_hat arrives in.
        self.s_hat = solver::solve_least_squares(
            &l_star,
            &self.d_hat,
            self.cfg.max_solver_iterations,
            self.cfg.solver_tolerance,
        )?;
        self.l_star = Some(l_star);

        let k = self.d_hat.ncols();
        if self.b_matrix.nrows() != k {
            return Result::Err(Err::BadShape {
                which: "basis matrix",
                got: format!("{} rows", self.b_matrix.nrows()),
                expected: format!("{k} rows"),
            });
        }

        let mut t_hat = &self.s_hat * &self.b_matrix;
        apply_translation_offset(&mut t_hat, &self.t_matrix)?;

        self.total_frames = self.b_matrix.ncols() / 3;
        self.vertices_per_frame = n;
        self.frames = (0..self.total_frames)
            .map(|t| {
                (0..n)
                    .map(|v| {
                        DVec3::new(
                            t_hat[(v, 3 * t)],
                            t_hat[(v, 3 * t + 1)],
                            t_hat[(v, 3 * t + 2)],
                        )
                    })
                    .collect()
            })
            .collect();
        self.t_hat = t_hat;

        self.reference_vertex_buffer = self
            .mesh
            .vertices
            .iter()
            .flat_map(|v| [v.x, v.y, v.z])
            .collect();

        self.is_decoded = true;
        tracing::info!(
            decoder = %self.name,
            frames = self.total_frames,
            vertices = self.vertices_per_frame,
            "decoded and cached all frames"
        );
        Ok(())
    }

    /// The deformed vertex set of frame `t`: `V_ref[i] + disp_t[i]`. Pure
    /// read; requires `Decoded` and `t < frame_count`.
    pub fn frame_vertices(&self, t: usize) -> Result<Vec<DVec3>, Err> {
        if !self.is_decoded {
            return Result::Err(Err::NotReady);
        }
        let displacements = self.frames.get(t).ok_or(Err::OutOfRange {
            frame: t,
            frames: self.total_frames,
        })?;

        Ok(self
            .mesh
            .vertices
            .iter()
            .zip(displacements)
            .map(|(v, d)| *v + *d)
            .collect())
    }

    /// Writes every decoded frame as `mesh_frame_<t>.obj` under `out_dir`
    /// (created if missing) and returns the written paths.
    pub fn write_frame_objs(&self, out_dir: &Path) -> Result<Vec<PathBuf>, Err> {
        if !self.is_decoded {
            return Result::Err(Err::NotReady);
        }
        std::fs::create_dir_all(out_dir).map_err(|source| Err::OutputDirError {
            path: out_dir.to_path_buf(),
            source,
        })?;

        let mut paths = Vec::with_capacity(self.total_frames);
        for t in 0..self.total_frames {
            let mut frame_mesh = self.mesh.clone();
            frame_mesh.vertices = self.frame_vertices(t)?;
            let path = out_dir.join(format!("mesh_frame_{t}.obj"));
            io::obj::write_obj(&path, &frame_mesh).map_err(io::Err::ObjError)?;
            paths.push(path);
        }
        tracing::info!(decoder = %self.name, count = paths.len(), "wrote frame objs");
        Ok(paths)
    }

    /// Releases every owned buffer and returns to `Empty`. Idempotent.
    pub fn clear(&mut self) {
        tracing::debug!(decoder = %self.name, "clearing decoder state");
        self.mesh = Mesh::new();
        self.d_hat = Mat::new();
        self.b_matrix = Mat::new();
        self.t_matrix = Mat::new();
        self.s_hat = Mat::new();
        self.t_hat = Mat::new();
        self.l_star = None;
        self.anchor_indices = Vec::new();
        self.frames = Vec::new();
        self.reference_vertex_buffer = Vec::new();
        self.triangle_indices_flat = Vec::new();
        self.total_frames = 0;
        self.vertices_per_frame = 0;
        self.is_loaded = false;
        self.is_decoded = false;
    }
}

/// Adds the per-frame rigid translation `translations[0, 3t..3t+3)` to the
/// corresponding column block of `displacements`, broadcast over rows.
pub(crate) fn apply_translation_offset(
    displacements: &mut Mat<f64>,
    translations: &Mat<f64>,
) -> Result<(), Err> {
    if translations.nrows() != 1 {
        return Result::Err(Err::BadShape {
            which: "translation matrix",
            got: format!("{} rows", translations.nrows()),
            expected: "1 row".to_owned(),
        });
    }
    if translations.ncols() != displacements.ncols() {
        return Result::Err(Err::BadShape {
            which: "translation matrix",
            got: format!("{} columns", translations.ncols()),
            expected: format!("{} columns", displacements.ncols()),
        });
    }
    if displacements.ncols() % 3 != 0 {
        return Result::Err(Err::BadShape {
            which: "displacement matrix",
            got: format!("{} columns", displacements.ncols()),
            expected: "a multiple of 3".to_owned(),
        });
    }

    for col in 0..displacements.ncols() {
        let offset = translations[(0, col)];
        for row in 0..displacements.nrows() {
            displacements[(row, col)] += offset;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use faer::mat;

    #[test]
    fn translation_offset_is_broadcast_per_frame() {
        let mut disp = Mat::<f64>::zeros(2, 6);
        let t = mat![[1.0, 2.0, 3.0, -1.0, 0.0, 0.5]];
        apply_translation_offset(&mut disp, &t).unwrap();

        for row in 0..2 {
            assert_eq!(disp[(row, 0)], 1.0);
            assert_eq!(disp[(row, 2)], 3.0);
            assert_eq!(disp[(row, 3)], -1.0);
            assert_eq!(disp[(row, 5)], 0.5);
        }
    }

    #[test]
    fn translation_offset_rejects_multi_row_translations() {
        let mut disp = Mat::<f64>::zeros(2, 3);
        let t = Mat::<f64>::zeros(2, 3);
        assert!(matches!(
            apply_translation_offset(&mut disp, &t),
            Result::Err(Err::BadShape { which: "translation matrix", .. })
        ));
    }

    #[test]
    fn translation_offset_rejects_column_mismatch() {
        let mut disp = Mat::<f64>::zeros(2, 6);
        let t = Mat::<f64>::zeros(1, 3);
        assert!(matches!(
            apply_translation_offset(&mut disp, &t),
            Result::Err(Err::BadShape { .. })
        ));
    }

    #[test]
    fn translation_offset_rejects_non_frame_columns() {
        let mut disp = Mat::<f64>::zeros(2, 4);
        let t = Mat::<f64>::zeros(1, 4);
        assert!(matches!(
            apply_translation_offset(&mut disp, &t),
            Result::Err(Err::BadShape { which: "displacement matrix", .. })
        ));
    }

    #[test]
    fn decoder_starts_empty() {
        let decoder = Decoder::new("unit");
        assert!(!decoder.is_loaded());
        assert!(!decoder.is_decoded());
        assert_eq!(decoder.frame_count(), 0);
        assert!(matches!(
            decoder.frame_vertices(0),
            Result::Err(Err::NotReady)
        ));
    }

    #[test]
    fn decode_before_load_is_not_ready() {
        let mut decoder = Decoder::new("unit");
        assert!(matches!(decoder.decode(), Result::Err(Err::NotReady)));
    }

    #[test]
    fn clear_is_idempotent() {
        let mut decoder = Decoder::new("unit");
        decoder.clear();
        decoder.clear();
        assert!(!decoder.is_loaded());
    }

    #[test]
    fn load_rejects_empty_path() {
        let mut decoder = Decoder::new("unit");
        assert!(matches!(
            decoder.load(Path::new("")),
            Result::Err(Err::EmptyPath)
        ));
    }
}
