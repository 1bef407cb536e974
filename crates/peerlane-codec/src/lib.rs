//! Envelope wire codec for peerlane.
//!
//! Every envelope starts with a fixed 28-byte little-endian header:
//! - protocol version, flags, and the actor-ref / manifest table versions
//! - the origin system's unique id and the payload serializer id
//! - three tags (sender, recipient, manifest), each either a compression
//!   code or the frame offset of a length-prefixed UTF-8 literal
//!
//! An optional metadata block, the literals and the payload follow.
//! [`EnvelopeEncoder`] and [`EnvelopeDecoder`] tie the codec to the
//! per-peer compression tables.

pub mod codec;
pub mod decoder;
pub mod encoder;
pub mod envelope;
pub mod error;
pub mod metadata;
pub mod pool;

pub use codec::{
    decode_envelope, encode_envelope, CodecConfig, DecodedEnvelope, EnvelopeHeader, FieldRef,
    TableRefs, DEFAULT_MAX_FRAME_SIZE, FLAG_METADATA_PRESENT, HEADER_SIZE, PROTOCOL_VERSION,
    TAG_TYPE_MASK, TAG_VALUE_MASK,
};
pub use decoder::{EnvelopeDecoder, InboundEnvelope, Resolved};
pub use encoder::EnvelopeEncoder;
pub use envelope::{OutboundEnvelope, SerializedMessage};
pub use error::{CodecError, Result};
pub use metadata::{MetadataEntry, RemoteInstrument, RemoteInstruments, RemoteMetadata};
pub use pool::EnvelopeBufferPool;
