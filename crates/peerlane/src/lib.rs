//! Peer-to-peer transport core for actor messaging.
//!
//! peerlane moves actor messages between two systems: it encodes envelopes
//! into a compact binary frame, learns which actor paths and manifests are
//! sent most often and replaces them with small integer codes, and tracks
//! the identity of every peer across restarts and quarantine.
//!
//! # Crate Structure
//!
//! - [`primitives`]: addresses, atomic snapshots, lane queues, restart windows
//! - [`compress`]: heavy-hitter detection and per-peer compression tables
//! - [`codec`]: the envelope wire format, encoder and decoder
//! - [`association`]: association lifecycle, control messages, settings

/// Re-export shared primitives.
pub mod primitives {
    pub use peerlane_core::*;
}

/// Re-export compression types.
pub mod compress {
    pub use peerlane_compress::*;
}

/// Re-export codec types.
pub mod codec {
    pub use peerlane_codec::*;
}

/// Re-export association types.
pub mod association {
    pub use peerlane_association::*;
}
