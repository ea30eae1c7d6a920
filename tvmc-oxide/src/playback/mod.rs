use std::path::{Path, PathBuf};
use std::sync::Arc;

use glam::DVec3;
use parking_lot::{Mutex, RwLock};

use crate::decode::{self, Decoder};

#[remain::sorted]
#[derive(thiserror::Error, Debug)]
pub enum Err {
    #[error(transparent)]
    DecodeError(#[from] decode::Err),
    #[error("sequence root {path:?} contains no subsequence directories")]
    EmptySequence { path: PathBuf },
    #[error("failed to scan sequence root {path:?}: {source}")]
    ScanError {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("subsequence {index} is not loaded")]
    SubSequenceNotLoaded { index: usize },
    #[error("subsequence {index} out of range (1..={count})")]
    SubSequenceOutOfRange { index: usize, count: usize },
}

struct ActiveDecoder {
    index: usize,
    decoder: Arc<RwLock<Decoder>>,
}

struct PlaybackState {
    current: usize,
    active: Vec<ActiveDecoder>,
}

/// Streams a sequence split into `subsequence_DDD` directories.
///
/// Keeps at most `pre_load` subsequence decoders resident, starting at the
/// playback cursor; `advance` moves the cursor with wrap-around and evicts
/// decoders that fell out of the forward window. The manager spawns no
/// threads of its own: a host I/O worker calls [`PlaybackManager::load_sub_sequence`],
/// a decode worker calls [`PlaybackManager::decode_sub_sequence`], and the
/// consumer calls [`PlaybackManager::fetch_frame`], all sharing one
/// instance. Every public operation runs under a single non-recursive
/// mutex for its full duration.
pub struct PlaybackManager {
    root: PathBuf,
    sub_sequence_count: usize,
    pre_load: usize,
    decode_load: usize,
    sub_sequence_length: usize,
    state: Mutex<PlaybackState>,
}

impl PlaybackManager {
    /// Scans `root`, then eagerly loads the first `mem_load` subsequences
    /// and decodes the first `decode_load` of them. `decode_load` is
    /// clamped to `mem_load`. A subsequence that fails to load is logged
    /// and skipped; an empty root is an error.
    pub fn new(root: &Path, mem_load: usize, decode_load: usize) -> Result<Self, Err> {
        let sub_sequence_count = count_subdirectories(root)?;
        if sub_sequence_count == 0 {
            return Result::Err(Err::EmptySequence {
                path: root.to_path_buf(),
            });
        }
        tracing::info!(?root, sub_sequence_count, "sequence root scanned");

        let decode_load = if decode_load > mem_load {
            tracing::warn!(
                decode_load,
                mem_load,
                "decode load exceeds memory load, clamping"
            );
            mem_load
        } else {
            decode_load
        };

        let manager = Self {
            root: root.to_path_buf(),
            sub_sequence_count,
            pre_load: mem_load,
            decode_load,
            sub_sequence_length: 0,
            state: Mutex::new(PlaybackState {
                current: 1,
                active: Vec::new(),
            }),
        };

        for i in 1..=mem_load.min(sub_sequence_count) {
            if let Result::Err(err) = manager.load_sub_sequence(i) {
                tracing::error!(index = i, %err, "failed to preload subsequence");
                continue;
            }
            if i <= manager.decode_load {
                if let Result::Err(err) = manager.decode_sub_sequence(i) {
                    tracing::error!(index = i, %err, "failed to predecode subsequence");
                }
            }
        }

        let sub_sequence_length = {
            let state = manager.state.lock();
            state
                .active
                .first()
                .map(|entry| entry.decoder.read().frame_count())
                .unwrap_or(0)
        };
        if sub_sequence_length == 0 {
            tracing::warn!("no subsequence preloaded successfully, length unknown");
        }

        Ok(Self {
            sub_sequence_length,
            ..manager
        })
    }

    pub fn sub_sequence_count(&self) -> usize {
        self.sub_sequence_count
    }

    /// Frame count of a subsequence; all subsequences are assumed
    /// equal-length.
    pub fn sub_sequence_length(&self) -> usize {
        self.sub_sequence_length
    }

    pub fn pre_load(&self) -> usize {
        self.pre_load
    }

    pub fn current_sub_sequence(&self) -> usize {
        self.state.lock().current
    }

    /// Indices of the currently resident decoders, in load order.
    pub fn active_indices(&self) -> Vec<usize> {
        self.state.lock().active.iter().map(|e| e.index).collect()
    }

    /// Moves the play cursor to the next subsequence, wrapping past the
    /// end. Returns `false` without moving when the next subsequence is
    /// not resident or not yet decoded; that is a transient condition and
    /// the caller retries after its workers catch up. On success, evicts
    /// every decoder outside the forward window
    /// `{current, ..., current + pre_load - 1}` (modulo the sequence).
    pub fn advance(&self) -> bool {
        let mut state = self.state.lock();
        if state.active.is_empty() {
            tracing::error!("advance called with no active decoders");
            return false;
        }

        let next = wrap_index(state.current + 1, self.sub_sequence_count);
        match state.active.iter().find(|e| e.index == next) {
            None => {
                tracing::debug!(next, "next subsequence not loaded yet");
                return false;
            }
            Some(entry) => {
                if !entry.decoder.read().is_decoded() {
                    tracing::debug!(next, "next subsequence not decoded yet");
                    return false;
                }
            }
        }

        state.current = next;
        let window: Vec<usize> = (0..self.pre_load)
            .map(|offset| (next - 1 + offset) % self.sub_sequence_count + 1)
            .collect();
        state.active.retain(|entry| {
            let keep = window.contains(&entry.index);
            if !keep {
                tracing::info!(index = entry.index, "evicting subsequence decoder");
            }
            keep
        });

        tracing::info!(current = next, "advanced subsequence");
        true
    }

    /// Loads subsequence `i` (1-based) into the active set. No-op when it
    /// is already resident; range-checked. The decoder joins the active
    /// set only after its load succeeds, so a failed load leaves the
    /// manager unchanged.
    pub fn load_sub_sequence(&self, index: usize) -> Result<(), Err> {
        let mut state = self.state.lock();
        self.check_range(index)?;
        if state.active.iter().any(|e| e.index == index) {
            tracing::debug!(index, "subsequence already loaded");
            return Ok(());
        }

        let dir = self.root.join(sub_sequence_dir_name(index));
        tracing::info!(index, ?dir, "loading subsequence");
        let mut decoder = Decoder::new(index.to_string());
        decoder.load(&dir)?;
        state.active.push(ActiveDecoder {
            index,
            decoder: Arc::new(RwLock::new(decoder)),
        });
        Ok(())
    }

    /// Decodes subsequence `i` if it is resident. No-op when already
    /// decoded; range-checked; `SubSequenceNotLoaded` when `i` has not
    /// been loaded first.
    pub fn decode_sub_sequence(&self, index: usize) -> Result<(), Err> {
        let state = self.state.lock();
        self.check_range(index)?;
        let entry = state
            .active
            .iter()
            .find(|e| e.index == index)
            .ok_or(Err::SubSequenceNotLoaded { index })?;

        let decoder = Arc::clone(&entry.decoder);
        tracing::info!(index, "decoding subsequence");
        decoder.write().decode()?;
        Ok(())
    }

    /// The deformed vertices of frame `t` of the current subsequence, or
    /// `None` when the current decoder is absent, not yet decoded, or `t`
    /// is out of range — the caller backs off and retries.
    pub fn fetch_frame(&self, t: usize) -> Option<Vec<DVec3>> {
        let state = self.state.lock();
        let entry = state.active.iter().find(|e| e.index == state.current)?;
        let decoder = entry.decoder.read();
        if !decoder.is_decoded() {
            tracing::debug!(current = state.current, "fetch_frame before decode");
            return None;
        }
        match decoder.frame_vertices(t) {
            Ok(vertices) => Some(vertices),
            Result::Err(err) => {
                tracing::warn!(frame = t, %err, "fetch_frame failed");
                None
            }
        }
    }

    /// Shared handle to the current subsequence's decoder, when resident.
    pub fn current_decoder(&self) -> Option<Arc<RwLock<Decoder>>> {
        let state = self.state.lock();
        state
            .active
            .iter()
            .find(|e| e.index == state.current)
            .map(|e| Arc::clone(&e.decoder))
    }

    fn check_range(&self, index: usize) -> Result<(), Err> {
        if index == 0 || index > self.sub_sequence_count {
            return Result::Err(Err::SubSequenceOutOfRange {
                index,
                count: self.sub_sequence_count,
            });
        }
        Ok(())
    }
}

/// `subsequence_DDD` with a zero-padded 3-digit 1-based index.
pub fn sub_sequence_dir_name(index: usize) -> String {
    format!("subsequence_{index:03}")
}

fn wrap_index(index: usize, count: usize) -> usize {
    if index > count {
        index - count
    } else {
        index
    }
}

fn count_subdirectories(root: &Path) -> Result<usize, Err> {
    let entries = std::fs::read_dir(root).map_err(|source| Err::ScanError {
        path: root.to_path_buf(),
        source,
    })?;

    let mut count = 0;
    for entry in entries {
        let entry = entry.map_err(|source| Err::ScanError {
            path: root.to_path_buf(),
            source,
        })?;
        if entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
            count += 1;
        }
    }
    Ok(count)
}
