//! Control messages exchanged on the control lane.
//!
//! Control messages travel inside ordinary envelopes, marked by
//! [`CONTROL_SERIALIZER_ID`] and [`CONTROL_MANIFEST`]. The payload is the JSON
//! form of [`ControlMessage`], internally tagged by `"type"`:
//!
//! ```text
//! {"type":"handshake_req","from":{...},"to":{...}}
//! {"type":"actor_ref_compression_advertisement_ack","from":{...},"version":1}
//! {"type":"flush"}
//! ```

use bytes::Bytes;
use peerlane_codec::{InboundEnvelope, OutboundEnvelope, SerializedMessage};
use peerlane_compress::{ActorRefPath, ClassManifest, CompressionTable};
use peerlane_core::{Address, UniqueAddress};
use serde::{Deserialize, Serialize};

use crate::error::{AssociationError, Result};

/// Serializer id carried by control envelopes.
pub const CONTROL_SERIALIZER_ID: i32 = 17;

/// Manifest carried by control envelopes.
pub const CONTROL_MANIFEST: &str = "c";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlMessage {
    /// Sent by the initiating side until a response arrives.
    HandshakeReq { from: UniqueAddress, to: Address },
    HandshakeRsp { from: UniqueAddress },
    /// `from` has quarantined the incarnation `to`.
    Quarantined {
        from: UniqueAddress,
        to: UniqueAddress,
    },
    ActorRefCompressionAdvertisement {
        from: UniqueAddress,
        table: CompressionTable<ActorRefPath>,
    },
    ActorRefCompressionAdvertisementAck { from: UniqueAddress, version: u8 },
    ClassManifestCompressionAdvertisement {
        from: UniqueAddress,
        table: CompressionTable<ClassManifest>,
    },
    ClassManifestCompressionAdvertisementAck { from: UniqueAddress, version: u8 },
    ActorSystemTerminating { from: UniqueAddress },
    ActorSystemTerminatingAck { from: UniqueAddress },
    /// Request to acknowledge once everything sent before it was received.
    Flush,
    FlushAck,
}

impl ControlMessage {
    /// Short name used in logs and CLI output.
    pub fn kind(&self) -> &'static str {
        match self {
            ControlMessage::HandshakeReq { .. } => "handshake_req",
            ControlMessage::HandshakeRsp { .. } => "handshake_rsp",
            ControlMessage::Quarantined { .. } => "quarantined",
            ControlMessage::ActorRefCompressionAdvertisement { .. } => {
                "actor_ref_compression_advertisement"
            }
            ControlMessage::ActorRefCompressionAdvertisementAck { .. } => {
                "actor_ref_compression_advertisement_ack"
            }
            ControlMessage::ClassManifestCompressionAdvertisement { .. } => {
                "class_manifest_compression_advertisement"
            }
            ControlMessage::ClassManifestCompressionAdvertisementAck { .. } => {
                "class_manifest_compression_advertisement_ack"
            }
            ControlMessage::ActorSystemTerminating { .. } => "actor_system_terminating",
            ControlMessage::ActorSystemTerminatingAck { .. } => "actor_system_terminating_ack",
            ControlMessage::Flush => "flush",
            ControlMessage::FlushAck => "flush_ack",
        }
    }

    /// The sending incarnation, for messages that name it.
    pub fn from(&self) -> Option<&UniqueAddress> {
        match self {
            ControlMessage::HandshakeReq { from, .. }
            | ControlMessage::HandshakeRsp { from }
            | ControlMessage::Quarantined { from, .. }
            | ControlMessage::ActorRefCompressionAdvertisement { from, .. }
            | ControlMessage::ActorRefCompressionAdvertisementAck { from, .. }
            | ControlMessage::ClassManifestCompressionAdvertisement { from, .. }
            | ControlMessage::ClassManifestCompressionAdvertisementAck { from, .. }
            | ControlMessage::ActorSystemTerminating { from }
            | ControlMessage::ActorSystemTerminatingAck { from } => Some(from),
            ControlMessage::Flush | ControlMessage::FlushAck => None,
        }
    }

    pub fn to_message(&self) -> Result<SerializedMessage> {
        let payload = serde_json::to_vec(self)?;
        Ok(SerializedMessage::new(
            CONTROL_SERIALIZER_ID,
            CONTROL_MANIFEST,
            Bytes::from(payload),
        ))
    }

    /// Wrap the message in an envelope for the control lane.
    pub fn to_envelope(&self) -> Result<OutboundEnvelope> {
        Ok(OutboundEnvelope::new(None, self.to_message()?))
    }

    /// Whether an inbound envelope carries a control message.
    pub fn is_control(envelope: &InboundEnvelope) -> bool {
        envelope.serializer_id == CONTROL_SERIALIZER_ID
            && envelope.manifest.value().map(String::as_str) == Some(CONTROL_MANIFEST)
    }

    pub fn from_envelope(envelope: &InboundEnvelope) -> Result<Self> {
        if !Self::is_control(envelope) {
            return Err(AssociationError::NotControl {
                serializer_id: envelope.serializer_id,
                manifest: envelope.manifest.value().cloned(),
            });
        }
        Ok(serde_json::from_slice(&envelope.payload)?)
    }
}
