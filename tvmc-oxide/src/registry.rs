use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::decode::Decoder;
use crate::playback::PlaybackManager;

/// Host-callable surface: a decoder registry keyed by name plus the
/// playback manager, each behind its own lock.
///
/// This is the boundary the legacy extern interface maps onto, so the
/// methods collapse load/decode/shape/solver failures into booleans and
/// zero counts; the underlying errors are logged before they are
/// collapsed, and the core APIs below this layer keep them typed. Output
/// vertex buffers are caller-allocated and written as tightly packed
/// `(x, y, z)` f32 triples — `3 * vertex_count` elements per frame —
/// never past the buffer's end; internal math stays in f64.
#[derive(Default)]
pub struct Registry {
    decoders: Mutex<HashMap<String, RegisteredDecoder>>,
    playback: Mutex<Option<PlaybackManager>>,
}

struct RegisteredDecoder {
    decoder: Arc<RwLock<Decoder>>,
    output_dir: Option<PathBuf>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates and registers a decoder under `name`. An existing decoder
    /// of the same name is cleared and replaced. `out_dir` is where
    /// [`Registry::write_frame_objs`] emits per-frame meshes.
    pub fn create_decoder(&self, name: &str, out_dir: Option<&Path>, logging: bool) -> bool {
        if logging {
            enable_logging();
        }
        let mut decoders = self.decoders.lock();
        if let Some(existing) = decoders.remove(name) {
            tracing::info!(name, "replacing existing decoder");
            existing.decoder.write().clear();
        }
        decoders.insert(
            name.to_owned(),
            RegisteredDecoder {
                decoder: Arc::new(RwLock::new(Decoder::new(name))),
                output_dir: out_dir.map(Path::to_path_buf),
            },
        );
        true
    }

    /// Loads and decodes a full subsequence directory into the named
    /// decoder. Returns `false` on any failure (the decoder is back in
    /// its empty state then) or when the name is unknown.
    pub fn load_sequence(&self, name: &str, dir: &Path) -> bool {
        let Some(decoder) = self.decoder(name) else {
            tracing::error!(name, "load_sequence on unknown decoder");
            return false;
        };
        let mut decoder = decoder.write();
        decoder.load(dir).and_then(|_| decoder.decode()).is_ok()
    }

    pub fn total_frames(&self, name: &str) -> usize {
        self.decoder(name).map_or(0, |d| d.read().frame_count())
    }

    pub fn vertex_count(&self, name: &str) -> usize {
        self.decoder(name).map_or(0, |d| d.read().vertex_count())
    }

    pub fn triangle_index_count(&self, name: &str) -> usize {
        self.decoder(name)
            .map_or(0, |d| d.read().triangle_indices_flat().len())
    }

    /// Copies the flat triangle index buffer into `out`, up to its
    /// length. Returns the number of indices written.
    pub fn triangle_indices(&self, name: &str, out: &mut [i32]) -> usize {
        let Some(decoder) = self.decoder(name) else {
            return 0;
        };
        let decoder = decoder.read();
        let indices = decoder.triangle_indices_flat();
        let count = indices.len().min(out.len());
        for (dst, &src) in out.iter_mut().zip(indices) {
            *dst = src as i32;
        }
        count
    }

    /// Writes the reference vertices into `out` as packed f32 triples.
    /// Returns the number of f32 elements written (`3 * vertex_count`
    /// when `out` is large enough).
    pub fn reference_vertices(&self, name: &str, out: &mut [f32]) -> usize {
        let Some(decoder) = self.decoder(name) else {
            return 0;
        };
        let decoder = decoder.read();
        write_f64_buffer(decoder.reference_vertices(), out)
    }

    /// Writes frame `t`'s deformed vertices into `out` as packed f32
    /// triples. Returns the number of f32 elements written; 0 when the
    /// decoder is missing, not decoded, or `t` is out of range.
    pub fn frame_deformed_vertices(&self, name: &str, t: usize, out: &mut [f32]) -> usize {
        let Some(decoder) = self.decoder(name) else {
            return 0;
        };
        let decoder = decoder.read();
        match decoder.frame_vertices(t) {
            Ok(vertices) => write_vertices(&vertices, out),
            Err(err) => {
                tracing::warn!(name, frame = t, %err, "frame_deformed_vertices failed");
                0
            }
        }
    }

    /// Writes every frame of the named decoder as OBJ into its output
    /// directory. Empty on failure or when no output directory was given.
    pub fn write_frame_objs(&self, name: &str) -> Vec<PathBuf> {
        let entry = {
            let decoders = self.decoders.lock();
            decoders
                .get(name)
                .map(|e| (Arc::clone(&e.decoder), e.output_dir.clone()))
        };
        let Some((decoder, Some(out_dir))) = entry else {
            tracing::error!(name, "write_frame_objs without decoder or output dir");
            return Vec::new();
        };
        let result = decoder.read().write_frame_objs(&out_dir);
        match result {
            Ok(paths) => paths,
            Err(err) => {
                tracing::error!(name, %err, "write_frame_objs failed");
                Vec::new()
            }
        }
    }

    /// Clears and drops every decoder whose name is not protected.
    pub fn clean_decoders(&self, protected: &[&str]) {
        let mut decoders = self.decoders.lock();
        decoders.retain(|name, entry| {
            let keep = protected.contains(&name.as_str());
            if !keep {
                tracing::info!(name, "cleaning decoder");
                entry.decoder.write().clear();
            }
            keep
        });
    }

    pub fn decoder_names(&self) -> Vec<String> {
        self.decoders.lock().keys().cloned().collect()
    }

    /// Creates the playback manager. Re-initialization replaces the
    /// previous manager with a warning.
    pub fn initialize_playback_manager(
        &self,
        root: &Path,
        mem_load: usize,
        decode_load: usize,
        logging: bool,
    ) -> bool {
        if logging {
            enable_logging();
        }
        match PlaybackManager::new(root, mem_load, decode_load) {
            Ok(manager) => {
                let mut playback = self.playback.lock();
                if playback.is_some() {
                    tracing::warn!("playback manager re-initialized");
                }
                *playback = Some(manager);
                true
            }
            Err(err) => {
                tracing::error!(%err, "failed to initialize playback manager");
                false
            }
        }
    }

    pub fn is_playback_manager_loaded(&self) -> bool {
        self.playback.lock().is_some()
    }

    pub fn advance_sub_sequence(&self) -> bool {
        self.playback.lock().as_ref().is_some_and(|m| m.advance())
    }

    pub fn load_sub_sequence(&self, index: usize) -> bool {
        let playback = self.playback.lock();
        let Some(manager) = playback.as_ref() else {
            return false;
        };
        match manager.load_sub_sequence(index) {
            Ok(()) => true,
            Err(err) => {
                tracing::error!(index, %err, "load_sub_sequence failed");
                false
            }
        }
    }

    pub fn decode_sub_sequence(&self, index: usize) -> bool {
        let playback = self.playback.lock();
        let Some(manager) = playback.as_ref() else {
            return false;
        };
        match manager.decode_sub_sequence(index) {
            Ok(()) => true,
            Err(err) => {
                tracing::error!(index, %err, "decode_sub_sequence failed");
                false
            }
        }
    }

    /// Writes frame `t` of the current subsequence into `out` as packed
    /// f32 triples; 0 elements written signals "not ready yet".
    pub fn fetch_frame(&self, t: usize, out: &mut [f32]) -> usize {
        let playback = self.playback.lock();
        let Some(manager) = playback.as_ref() else {
            return 0;
        };
        match manager.fetch_frame(t) {
            Some(vertices) => write_vertices(&vertices, out),
            None => 0,
        }
    }

    pub fn sub_sequence_count(&self) -> usize {
        self.playback
            .lock()
            .as_ref()
            .map_or(0, |m| m.sub_sequence_count())
    }

    pub fn current_decoder_total_frames(&self) -> usize {
        self.with_current_decoder(|d| d.frame_count())
    }

    pub fn current_decoder_vertex_count(&self) -> usize {
        self.with_current_decoder(|d| d.vertex_count())
    }

    fn with_current_decoder<T: Default>(&self, f: impl FnOnce(&Decoder) -> T) -> T {
        let playback = self.playback.lock();
        playback
            .as_ref()
            .and_then(|m| m.current_decoder())
            .map(|d| f(&d.read()))
            .unwrap_or_default()
    }

    fn decoder(&self, name: &str) -> Option<Arc<RwLock<Decoder>>> {
        self.decoders
            .lock()
            .get(name)
            .map(|e| Arc::clone(&e.decoder))
    }
}

fn write_vertices(vertices: &[glam::DVec3], out: &mut [f32]) -> usize {
    let count = (vertices.len() * 3).min(out.len());
    for (i, slot) in out.iter_mut().enumerate().take(count) {
        let v = vertices[i / 3];
        *slot = [v.x, v.y, v.z][i % 3] as f32;
    }
    count
}

fn write_f64_buffer(values: &[f64], out: &mut [f32]) -> usize {
    let count = values.len().min(out.len());
    for (dst, &src) in out.iter_mut().zip(values) {
        *dst = src as f32;
    }
    count
}

/// Installs the global fmt subscriber once; later calls are no-ops.
fn enable_logging() {
    let _ = tracing_subscriber::fmt().with_target(false).try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_names_collapse_to_zero() {
        let registry = Registry::new();
        assert_eq!(registry.total_frames("nope"), 0);
        assert_eq!(registry.vertex_count("nope"), 0);
        assert!(!registry.load_sequence("nope", Path::new("anywhere")));
        let mut buf = [0.0f32; 3];
        assert_eq!(registry.reference_vertices("nope", &mut buf), 0);
    }

    #[test]
    fn create_decoder_replaces_existing() {
        let registry = Registry::new();
        assert!(registry.create_decoder("a", None, false));
        assert!(registry.create_decoder("a", None, false));
        assert_eq!(registry.decoder_names(), vec!["a".to_owned()]);
    }

    #[test]
    fn clean_decoders_honors_protected_names() {
        let registry = Registry::new();
        registry.create_decoder("keep", None, false);
        registry.create_decoder("drop", None, false);
        registry.clean_decoders(&["keep"]);

        let names = registry.decoder_names();
        assert_eq!(names, vec!["keep".to_owned()]);
    }

    #[test]
    fn playback_calls_without_manager_are_safe() {
        let registry = Registry::new();
        assert!(!registry.is_playback_manager_loaded());
        assert!(!registry.advance_sub_sequence());
        assert!(!registry.load_sub_sequence(1));
        assert_eq!(registry.sub_sequence_count(), 0);
        assert_eq!(registry.current_decoder_total_frames(), 0);
        let mut buf = [0.0f32; 3];
        assert_eq!(registry.fetch_frame(0, &mut buf), 0);
    }
}
