use std::num::NonZeroUsize;

use bytes::BytesMut;
use peerlane_compress::OutboundCompressions;
use tracing::warn;

use crate::codec::{encode_envelope, CodecConfig, EnvelopeHeader, TableRefs};
use crate::envelope::OutboundEnvelope;
use crate::error::Result;
use crate::metadata::RemoteInstruments;
use crate::pool::EnvelopeBufferPool;

const INITIAL_BUFFER_CAPACITY: usize = 4 * 1024;

/// Encodes outbound envelopes for one local system.
#[derive(Debug)]
pub struct EnvelopeEncoder {
    local_uid: u64,
    config: CodecConfig,
    instruments: RemoteInstruments,
    pool: EnvelopeBufferPool,
}

impl EnvelopeEncoder {
    pub fn new(local_uid: u64, config: CodecConfig) -> Self {
        let pooled = NonZeroUsize::new(config.buffer_pool_size).unwrap_or(NonZeroUsize::MIN);
        let capacity = config.maximum_frame_size.min(INITIAL_BUFFER_CAPACITY);
        Self {
            local_uid,
            pool: EnvelopeBufferPool::new(pooled, capacity),
            instruments: RemoteInstruments::new(),
            config,
        }
    }

    pub fn with_instruments(mut self, instruments: RemoteInstruments) -> Self {
        self.instruments = instruments;
        self
    }

    pub fn local_uid(&self) -> u64 {
        self.local_uid
    }

    pub fn config(&self) -> &CodecConfig {
        &self.config
    }

    pub fn pool(&self) -> &EnvelopeBufferPool {
        &self.pool
    }

    /// Encode `envelope` with the tables the peer has advertised.
    ///
    /// The returned buffer comes from the pool; hand it back with
    /// [`EnvelopeEncoder::release`] once it has been written out.
    pub fn encode(
        &self,
        envelope: &OutboundEnvelope,
        compressions: &OutboundCompressions,
    ) -> Result<BytesMut> {
        let actor_refs = compressions.actor_ref_table();
        let manifests = compressions.manifest_table();
        let metadata = envelope
            .metadata
            .clone()
            .or_else(|| self.instruments.collect(envelope));

        let header = EnvelopeHeader {
            version: self.config.protocol_version,
            origin_uid: self.local_uid,
            serializer_id: envelope.message.serializer_id,
            sender: envelope.sender.clone(),
            recipient: envelope.recipient.clone(),
            manifest: envelope.message.manifest.clone(),
            metadata,
        };

        let mut buffer = self.pool.acquire();
        let tables = TableRefs {
            actor_refs: &actor_refs,
            manifests: &manifests,
        };
        match encode_envelope(
            &header,
            &envelope.message.payload,
            tables,
            self.config.maximum_frame_size,
            &mut buffer,
        ) {
            Ok(()) => Ok(buffer),
            Err(err) => {
                warn!(
                    recipient = ?envelope.recipient,
                    error = %err,
                    "failed to encode envelope"
                );
                self.pool.release(buffer);
                Err(err)
            }
        }
    }

    /// Return an encoded buffer to the pool.
    pub fn release(&self, buffer: BytesMut) {
        self.pool.release(buffer);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use bytes::Bytes;
    use peerlane_compress::{ActorRefPath, CompressionTable};

    use super::*;
    use crate::codec::{decode_envelope, FieldRef, PROTOCOL_VERSION};
    use crate::decoder::InboundEnvelope;
    use crate::envelope::SerializedMessage;
    use crate::error::CodecError;
    use crate::metadata::RemoteInstrument;

    struct Tracing {
        serialized: AtomicUsize,
    }

    impl RemoteInstrument for Tracing {
        fn identifier(&self) -> u8 {
            9
        }

        fn serialize(&self, _envelope: &OutboundEnvelope) -> Option<Bytes> {
            self.serialized.fetch_add(1, Ordering::SeqCst);
            Some(Bytes::from_static(b"trace"))
        }

        fn deserialize(&self, _envelope: &InboundEnvelope, _data: &Bytes) {}
    }

    fn envelope() -> OutboundEnvelope {
        OutboundEnvelope::new(
            Some(ActorRefPath::from("/user/a")),
            SerializedMessage::new(4, "Ping", Bytes::from_static(b"hello")),
        )
    }

    #[test]
    fn encodes_with_applied_tables() {
        let encoder = EnvelopeEncoder::new(11, CodecConfig::default());
        let compressions = OutboundCompressions::new();
        compressions.apply_manifest_table(CompressionTable::new(11, 2, vec!["Ping".to_string()]));

        let frame = encoder.encode(&envelope(), &compressions).unwrap().freeze();
        let decoded = decode_envelope(&frame, PROTOCOL_VERSION).unwrap();
        assert_eq!(decoded.origin_uid, 11);
        assert_eq!(decoded.serializer_id, 4);
        assert_eq!(decoded.manifest, FieldRef::Compressed(0));
        assert_eq!(decoded.manifest_table_version, 2);
        assert_eq!(decoded.recipient.as_literal(), Some("/user/a"));
        assert_eq!(decoded.payload.as_ref(), b"hello");
    }

    #[test]
    fn instruments_fill_metadata() {
        let instrument = Arc::new(Tracing {
            serialized: AtomicUsize::new(0),
        });
        let encoder = EnvelopeEncoder::new(1, CodecConfig::default())
            .with_instruments(RemoteInstruments::new().with(instrument.clone()));

        let frame = encoder
            .encode(&envelope(), &OutboundCompressions::new())
            .unwrap()
            .freeze();
        let decoded = decode_envelope(&frame, PROTOCOL_VERSION).unwrap();
        let metadata = decoded.metadata.unwrap();
        assert_eq!(metadata.get(9).map(|b| b.as_ref()), Some(&b"trace"[..]));
        assert_eq!(instrument.serialized.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failed_encode_returns_buffer_to_pool() {
        let config = CodecConfig {
            maximum_frame_size: 32,
            ..CodecConfig::default()
        };
        let encoder = EnvelopeEncoder::new(1, config);
        let err = encoder
            .encode(&envelope(), &OutboundCompressions::new())
            .unwrap_err();
        assert!(matches!(err, CodecError::FrameTooLarge { max: 32, .. }));
        assert_eq!(encoder.pool().available(), 1);
    }

    #[test]
    fn released_buffers_are_reused() {
        let encoder = EnvelopeEncoder::new(1, CodecConfig::default());
        let buffer = encoder.encode(&envelope(), &OutboundCompressions::new()).unwrap();
        encoder.release(buffer);
        assert_eq!(encoder.pool().available(), 1);
        let _again = encoder.encode(&envelope(), &OutboundCompressions::new()).unwrap();
        assert_eq!(encoder.pool().available(), 0);
    }
}
