// lib.rs

/// Contains the interface between the on-disk sequence artifacts (OBJ,
/// text matrices, binary delta trajectories) and the native objects.
pub mod io;

/// Defines the subsequence decoder and its reconstruction kernels.
pub mod decode;

/// Streams a sequence of subsequences under a bounded preload window.
pub mod playback;

/// Contains the shared definitions and native objects.
pub mod core;

/// Host-callable decoder registry and playback-manager surface.
pub mod registry;

/// Contains the most commonly used traits, types, and objects.
pub mod prelude {
    pub use crate::core::mesh::Mesh;
    pub use crate::core::shared::ConfigType;
    pub use crate::decode::{self, Decoder};
    pub use crate::playback::PlaybackManager;
    pub use crate::registry::Registry;
}
