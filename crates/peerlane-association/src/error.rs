use std::path::PathBuf;

use peerlane_codec::CodecError;
use peerlane_core::Address;

use crate::lanes::LaneId;

/// Errors that can occur while operating an association.
#[derive(Debug, thiserror::Error)]
pub enum AssociationError {
    /// The peer incarnation is quarantined and must not be talked to.
    #[error("{remote} with uid {uid} is quarantined")]
    Quarantined { remote: Address, uid: u64 },

    /// A handshake arrived for a different address than the association's.
    #[error("handshake from {actual} on association with {expected}")]
    AddressMismatch { expected: Address, actual: Address },

    /// A control message could not be queued.
    #[error("{lane} queue to {remote} is full")]
    QueueFull { remote: Address, lane: LaneId },

    /// An inbound envelope on the control path is not a control message.
    #[error("not a control message (serializer {serializer_id}, manifest {manifest:?})")]
    NotControl {
        serializer_id: i32,
        manifest: Option<String>,
    },

    /// A control payload could not be (de)serialized.
    #[error("invalid control message: {0}")]
    Control(#[from] serde_json::Error),

    /// A control frame could not be decoded.
    #[error(transparent)]
    Codec(#[from] CodecError),
}

pub type Result<T> = std::result::Result<T, AssociationError>;

/// Errors that can occur while loading or validating settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    /// A setting has a value outside its allowed range.
    #[error("invalid setting {key}: {reason}")]
    Invalid { key: &'static str, reason: String },

    /// The settings document is not valid JSON for this schema.
    #[error("failed to parse settings: {0}")]
    Json(#[from] serde_json::Error),

    /// The settings file could not be read.
    #[error("failed to read settings from {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
