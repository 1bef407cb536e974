use bytes::Bytes;
use peerlane_compress::{ActorRefPath, ClassManifest};

use crate::metadata::RemoteMetadata;

/// A message already turned into bytes by its serializer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerializedMessage {
    pub serializer_id: i32,
    pub manifest: ClassManifest,
    pub payload: Bytes,
}

impl SerializedMessage {
    pub fn new(serializer_id: i32, manifest: impl Into<ClassManifest>, payload: impl Into<Bytes>) -> Self {
        Self {
            serializer_id,
            manifest: manifest.into(),
            payload: payload.into(),
        }
    }
}

/// A message on its way to a remote system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundEnvelope {
    pub recipient: Option<ActorRefPath>,
    pub sender: Option<ActorRefPath>,
    pub message: SerializedMessage,
    pub metadata: Option<RemoteMetadata>,
}

impl OutboundEnvelope {
    pub fn new(recipient: Option<ActorRefPath>, message: SerializedMessage) -> Self {
        Self {
            recipient,
            sender: None,
            message,
            metadata: None,
        }
    }

    pub fn with_sender(mut self, sender: ActorRefPath) -> Self {
        self.sender = Some(sender);
        self
    }

    pub fn with_metadata(mut self, metadata: RemoteMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }
}
