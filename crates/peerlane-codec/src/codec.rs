use bytes::{Buf, BufMut, Bytes, BytesMut};
use peerlane_compress::{ActorRefPath, ClassManifest, Compressible, CompressionTable};

use crate::error::{CodecError, Result};
use crate::metadata::RemoteMetadata;

/// Protocol version written by this implementation.
pub const PROTOCOL_VERSION: u8 = 0;

/// Size of the fixed header; literals and metadata start here.
pub const HEADER_SIZE: usize = 28;

/// Default maximum frame size: 256 KiB.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 256 * 1024;

/// Set in a tag when it carries a compression code instead of an offset.
pub const TAG_TYPE_MASK: u32 = 0xFF00_0000;

/// Bits of a compressed tag holding the code.
pub const TAG_VALUE_MASK: u32 = 0x0000_FFFF;

/// Flag bit: a metadata block follows the fixed header.
pub const FLAG_METADATA_PRESENT: u8 = 0x01;

const FLAGS_OFFSET: usize = 1;
const ACTOR_REF_TABLE_VERSION_OFFSET: usize = 2;
const MANIFEST_TABLE_VERSION_OFFSET: usize = 3;
const UID_OFFSET: usize = 4;
const SERIALIZER_OFFSET: usize = 12;
const SENDER_TAG_OFFSET: usize = 16;
const RECIPIENT_TAG_OFFSET: usize = 20;
const MANIFEST_TAG_OFFSET: usize = 24;

const MAX_LITERAL_LEN: usize = u16::MAX as usize;

/// Fields of an envelope to encode.
///
/// Absent sender/recipient and an empty manifest are written as empty
/// literals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvelopeHeader {
    pub version: u8,
    pub origin_uid: u64,
    pub serializer_id: i32,
    pub sender: Option<ActorRefPath>,
    pub recipient: Option<ActorRefPath>,
    pub manifest: ClassManifest,
    pub metadata: Option<RemoteMetadata>,
}

/// Outbound tables consulted while encoding one envelope. Their versions
/// are written to the header.
#[derive(Debug, Clone, Copy)]
pub struct TableRefs<'a> {
    pub actor_refs: &'a CompressionTable<ActorRefPath>,
    pub manifests: &'a CompressionTable<ClassManifest>,
}

/// A compressible field as found on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldRef {
    Literal(String),
    /// Code to be resolved against the origin's inbound tables.
    Compressed(u32),
    /// Written as an empty literal.
    Absent,
}

impl FieldRef {
    pub fn as_literal(&self) -> Option<&str> {
        match self {
            FieldRef::Literal(text) => Some(text),
            _ => None,
        }
    }

    pub fn is_compressed(&self) -> bool {
        matches!(self, FieldRef::Compressed(_))
    }
}

/// A decoded frame with compressed fields still unresolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedEnvelope {
    pub version: u8,
    pub flags: u8,
    pub actor_ref_table_version: u8,
    pub manifest_table_version: u8,
    pub origin_uid: u64,
    pub serializer_id: i32,
    pub sender: FieldRef,
    pub recipient: FieldRef,
    pub manifest: FieldRef,
    pub metadata: Option<RemoteMetadata>,
    pub payload: Bytes,
}

impl DecodedEnvelope {
    /// The header, if no field was compressed.
    pub fn literal_header(&self) -> Option<EnvelopeHeader> {
        fn path(field: &FieldRef) -> Option<Option<ActorRefPath>> {
            match field {
                FieldRef::Literal(text) => Some(Some(ActorRefPath::from(text.as_str()))),
                FieldRef::Absent => Some(None),
                FieldRef::Compressed(_) => None,
            }
        }

        let manifest = match &self.manifest {
            FieldRef::Literal(text) => text.clone(),
            FieldRef::Absent => String::new(),
            FieldRef::Compressed(_) => return None,
        };

        Some(EnvelopeHeader {
            version: self.version,
            origin_uid: self.origin_uid,
            serializer_id: self.serializer_id,
            sender: path(&self.sender)?,
            recipient: path(&self.recipient)?,
            manifest,
            metadata: self.metadata.clone(),
        })
    }
}

/// Configuration for the envelope codec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecConfig {
    /// Version written into outbound frames.
    pub protocol_version: u8,
    /// Inbound frames with a higher version are rejected.
    pub highest_supported_version: u8,
    /// Maximum encoded frame size in bytes. Default: 256 KiB.
    pub maximum_frame_size: usize,
    /// Encode buffers kept for reuse.
    pub buffer_pool_size: usize,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION,
            highest_supported_version: PROTOCOL_VERSION,
            maximum_frame_size: DEFAULT_MAX_FRAME_SIZE,
            buffer_pool_size: 16,
        }
    }
}

enum Slot<'a> {
    Code(u32),
    Literal(&'a str),
}

fn slot<'a, T: Compressible>(value: Option<&'a T>, table: &CompressionTable<T>) -> Slot<'a> {
    match value {
        Some(value) => match table.compress(value) {
            Some(code) => Slot::Code(code),
            None => Slot::Literal(value.as_literal()),
        },
        None => Slot::Literal(""),
    }
}

fn assign_tag(field: &'static str, slot: &Slot<'_>, cursor: &mut usize) -> Result<u32> {
    match slot {
        Slot::Code(code) => Ok(TAG_TYPE_MASK | (code & TAG_VALUE_MASK)),
        Slot::Literal(text) => {
            if text.len() > MAX_LITERAL_LEN {
                return Err(CodecError::LiteralTooLong {
                    field,
                    len: text.len(),
                });
            }
            let offset = *cursor;
            let tag = u32::try_from(offset)
                .ok()
                .filter(|tag| tag & TAG_TYPE_MASK == 0)
                .ok_or(CodecError::FrameTooLarge {
                    size: offset,
                    max: TAG_TYPE_MASK as usize,
                })?;
            *cursor += 2 + text.len();
            Ok(tag)
        }
    }
}

/// Encode an envelope into the wire format.
///
/// Wire format (little-endian):
/// ```text
/// ┌─────┬───────┬────────┬────────┬─────────┬────────────┬────────┬───────────┬──────────┐
/// │ ver │ flags │ ref ver│ man ver│ uid (8B)│ serializer │ sender │ recipient │ manifest │
/// │ 1B  │ 1B    │ 1B     │ 1B     │         │ (4B)       │ tag 4B │ tag 4B    │ tag 4B   │
/// └─────┴───────┴────────┴────────┴─────────┴────────────┴────────┴───────────┴──────────┘
///  [metadata block] [u16 len + UTF-8 literal]* [payload ...]
/// ```
///
/// Values present in the outbound tables are written as
/// `TAG_TYPE_MASK | code`; everything else as a literal whose absolute frame
/// offset goes into the tag.
pub fn encode_envelope(
    header: &EnvelopeHeader,
    payload: &[u8],
    tables: TableRefs<'_>,
    max_frame_size: usize,
    dst: &mut BytesMut,
) -> Result<()> {
    let sender = slot(header.sender.as_ref(), tables.actor_refs);
    let recipient = slot(header.recipient.as_ref(), tables.actor_refs);
    let manifest = slot(Some(&header.manifest), tables.manifests);
    let metadata = header.metadata.as_ref().filter(|metadata| !metadata.is_empty());

    let mut cursor = HEADER_SIZE + metadata.map_or(0, RemoteMetadata::encoded_len);
    let sender_tag = assign_tag("sender", &sender, &mut cursor)?;
    let recipient_tag = assign_tag("recipient", &recipient, &mut cursor)?;
    let manifest_tag = assign_tag("manifest", &manifest, &mut cursor)?;

    let size = cursor + payload.len();
    if size > max_frame_size {
        return Err(CodecError::FrameTooLarge {
            size,
            max: max_frame_size,
        });
    }

    let flags = if metadata.is_some() {
        FLAG_METADATA_PRESENT
    } else {
        0
    };

    dst.reserve(size);
    dst.put_u8(header.version);
    dst.put_u8(flags);
    dst.put_u8(tables.actor_refs.version());
    dst.put_u8(tables.manifests.version());
    dst.put_u64_le(header.origin_uid);
    dst.put_i32_le(header.serializer_id);
    dst.put_u32_le(sender_tag);
    dst.put_u32_le(recipient_tag);
    dst.put_u32_le(manifest_tag);

    if let Some(metadata) = metadata {
        metadata.write_to(dst)?;
    }
    for field in [&sender, &recipient, &manifest] {
        if let Slot::Literal(text) = field {
            dst.put_u16_le(text.len() as u16);
            dst.put_slice(text.as_bytes());
        }
    }
    dst.put_slice(payload);
    Ok(())
}

/// Decode a complete frame.
///
/// The version byte is checked before anything else is read. Compressed
/// fields are returned as [`FieldRef::Compressed`] for later resolution.
pub fn decode_envelope(frame: &Bytes, highest_version: u8) -> Result<DecodedEnvelope> {
    let Some(&version) = frame.first() else {
        return Err(CodecError::FrameTooShort {
            len: 0,
            needed: HEADER_SIZE,
        });
    };
    if version > highest_version {
        return Err(CodecError::UnsupportedVersion {
            version,
            highest: highest_version,
        });
    }
    if frame.len() < HEADER_SIZE {
        return Err(CodecError::FrameTooShort {
            len: frame.len(),
            needed: HEADER_SIZE,
        });
    }

    let flags = frame[FLAGS_OFFSET];
    let actor_ref_table_version = frame[ACTOR_REF_TABLE_VERSION_OFFSET];
    let manifest_table_version = frame[MANIFEST_TABLE_VERSION_OFFSET];
    let origin_uid = (&frame[UID_OFFSET..SERIALIZER_OFFSET]).get_u64_le();
    let serializer_id = (&frame[SERIALIZER_OFFSET..SENDER_TAG_OFFSET]).get_i32_le();
    let sender_tag = (&frame[SENDER_TAG_OFFSET..RECIPIENT_TAG_OFFSET]).get_u32_le();
    let recipient_tag = (&frame[RECIPIENT_TAG_OFFSET..MANIFEST_TAG_OFFSET]).get_u32_le();
    let manifest_tag = (&frame[MANIFEST_TAG_OFFSET..HEADER_SIZE]).get_u32_le();

    let mut literals_start = HEADER_SIZE;
    let metadata = if flags & FLAG_METADATA_PRESENT != 0 {
        let block_start = HEADER_SIZE + 4;
        if frame.len() < block_start {
            return Err(CodecError::MalformedMetadata {
                reason: "truncated block length",
            });
        }
        let block_len = (&frame[HEADER_SIZE..block_start]).get_u32_le() as usize;
        let block_end = block_start
            .checked_add(block_len)
            .filter(|end| *end <= frame.len())
            .ok_or(CodecError::MalformedMetadata {
                reason: "block extends past frame",
            })?;
        literals_start = block_end;
        Some(RemoteMetadata::read_block(frame.slice(block_start..block_end))?)
    } else {
        None
    };

    let mut payload_start = literals_start;
    let sender = read_field("sender", frame, sender_tag, literals_start, &mut payload_start)?;
    let recipient = read_field(
        "recipient",
        frame,
        recipient_tag,
        literals_start,
        &mut payload_start,
    )?;
    let manifest = read_field(
        "manifest",
        frame,
        manifest_tag,
        literals_start,
        &mut payload_start,
    )?;

    Ok(DecodedEnvelope {
        version,
        flags,
        actor_ref_table_version,
        manifest_table_version,
        origin_uid,
        serializer_id,
        sender,
        recipient,
        manifest,
        metadata,
        payload: frame.slice(payload_start..),
    })
}

fn read_field(
    field: &'static str,
    frame: &[u8],
    tag: u32,
    literals_start: usize,
    payload_start: &mut usize,
) -> Result<FieldRef> {
    if tag & TAG_TYPE_MASK != 0 {
        return Ok(FieldRef::Compressed(tag & TAG_VALUE_MASK));
    }

    let offset = tag as usize;
    let malformed = CodecError::MalformedLiteral { field, offset };
    if offset < literals_start || offset + 2 > frame.len() {
        return Err(malformed);
    }
    let len = (&frame[offset..offset + 2]).get_u16_le() as usize;
    let start = offset + 2;
    let end = start + len;
    if end > frame.len() {
        return Err(malformed);
    }

    let text = std::str::from_utf8(&frame[start..end])
        .map_err(|_| CodecError::InvalidUtf8 { field, offset })?;
    *payload_start = (*payload_start).max(end);

    if text.is_empty() {
        Ok(FieldRef::Absent)
    } else {
        Ok(FieldRef::Literal(text.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_tables() -> (CompressionTable<ActorRefPath>, CompressionTable<ClassManifest>) {
        (CompressionTable::empty(0, 0), CompressionTable::empty(0, 0))
    }

    fn header() -> EnvelopeHeader {
        EnvelopeHeader {
            version: PROTOCOL_VERSION,
            origin_uid: 0x0102_0304_0506_0708,
            serializer_id: -7,
            sender: Some(ActorRefPath::from("/user/sender")),
            recipient: Some(ActorRefPath::from("/user/a")),
            manifest: "OrderPlaced".to_string(),
            metadata: None,
        }
    }

    fn encode(header: &EnvelopeHeader, payload: &[u8], tables: TableRefs<'_>) -> Bytes {
        let mut buf = BytesMut::new();
        encode_envelope(header, payload, tables, DEFAULT_MAX_FRAME_SIZE, &mut buf).unwrap();
        buf.freeze()
    }

    #[test]
    fn test_literal_roundtrip() {
        let (refs, manifests) = empty_tables();
        let tables = TableRefs {
            actor_refs: &refs,
            manifests: &manifests,
        };
        let header = header();
        let frame = encode(&header, b"payload", tables);

        let decoded = decode_envelope(&frame, PROTOCOL_VERSION).unwrap();
        assert_eq!(decoded.literal_header(), Some(header));
        assert_eq!(decoded.payload.as_ref(), b"payload");
        assert_eq!(decoded.flags, 0);
    }

    #[test]
    fn test_fixed_layout() {
        let refs = CompressionTable::<ActorRefPath>::empty(0, 5);
        let manifests = CompressionTable::<ClassManifest>::empty(0, 6);
        let frame = encode(
            &header(),
            b"",
            TableRefs {
                actor_refs: &refs,
                manifests: &manifests,
            },
        );

        assert_eq!(frame[0], PROTOCOL_VERSION);
        assert_eq!(frame[2], 5);
        assert_eq!(frame[3], 6);
        assert_eq!(&frame[4..12], &0x0102_0304_0506_0708u64.to_le_bytes());
        assert_eq!(&frame[12..16], &(-7i32).to_le_bytes());
        // First literal starts right after the fixed header.
        assert_eq!(&frame[16..20], &(HEADER_SIZE as u32).to_le_bytes());
        assert_eq!(&frame[28..30], &12u16.to_le_bytes());
        assert_eq!(&frame[30..42], b"/user/sender");
    }

    #[test]
    fn test_compressed_recipient_tag() {
        let refs = CompressionTable::new(1, 1, vec![ActorRefPath::from("/user/a")]);
        let manifests = CompressionTable::<ClassManifest>::empty(1, 0);
        let frame = encode(
            &header(),
            b"x",
            TableRefs {
                actor_refs: &refs,
                manifests: &manifests,
            },
        );

        let tag = (&frame[RECIPIENT_TAG_OFFSET..MANIFEST_TAG_OFFSET]).get_u32_le();
        assert_eq!(tag, TAG_TYPE_MASK);

        let decoded = decode_envelope(&frame, PROTOCOL_VERSION).unwrap();
        assert_eq!(decoded.recipient, FieldRef::Compressed(0));
        assert_eq!(decoded.actor_ref_table_version, 1);
        assert_eq!(decoded.sender.as_literal(), Some("/user/sender"));
        assert!(decoded.literal_header().is_none());
        assert_eq!(decoded.payload.as_ref(), b"x");
    }

    #[test]
    fn test_absent_fields_decode_as_absent() {
        let (refs, manifests) = empty_tables();
        let header = EnvelopeHeader {
            sender: None,
            recipient: None,
            manifest: String::new(),
            ..header()
        };
        let frame = encode(
            &header,
            b"p",
            TableRefs {
                actor_refs: &refs,
                manifests: &manifests,
            },
        );
        let decoded = decode_envelope(&frame, PROTOCOL_VERSION).unwrap();
        assert_eq!(decoded.sender, FieldRef::Absent);
        assert_eq!(decoded.recipient, FieldRef::Absent);
        assert_eq!(decoded.manifest, FieldRef::Absent);
        assert_eq!(decoded.payload.as_ref(), b"p");
    }

    #[test]
    fn test_metadata_sets_flag_and_roundtrips() {
        let (refs, manifests) = empty_tables();
        let mut metadata = RemoteMetadata::new();
        metadata.insert(3, Bytes::from_static(b"span"));
        let header = EnvelopeHeader {
            metadata: Some(metadata.clone()),
            ..header()
        };
        let frame = encode(
            &header,
            b"body",
            TableRefs {
                actor_refs: &refs,
                manifests: &manifests,
            },
        );

        let decoded = decode_envelope(&frame, PROTOCOL_VERSION).unwrap();
        assert_eq!(decoded.flags & FLAG_METADATA_PRESENT, FLAG_METADATA_PRESENT);
        assert_eq!(decoded.metadata, Some(metadata));
        assert_eq!(decoded.literal_header(), Some(header));
        assert_eq!(decoded.payload.as_ref(), b"body");
    }

    #[test]
    fn test_newer_version_rejected_first() {
        let frame = Bytes::from_static(&[3]);
        assert_eq!(
            decode_envelope(&frame, 2),
            Err(CodecError::UnsupportedVersion {
                version: 3,
                highest: 2
            })
        );
    }

    #[test]
    fn test_short_frames_rejected() {
        assert!(matches!(
            decode_envelope(&Bytes::new(), 0),
            Err(CodecError::FrameTooShort { len: 0, .. })
        ));
        assert!(matches!(
            decode_envelope(&Bytes::from_static(&[0; 27]), 0),
            Err(CodecError::FrameTooShort { len: 27, .. })
        ));
    }

    #[test]
    fn test_literal_past_end_rejected() {
        let (refs, manifests) = empty_tables();
        let frame = encode(
            &header(),
            b"",
            TableRefs {
                actor_refs: &refs,
                manifests: &manifests,
            },
        );
        let mut corrupted = BytesMut::from(&frame[..]);
        corrupted[SENDER_TAG_OFFSET..RECIPIENT_TAG_OFFSET]
            .copy_from_slice(&(frame.len() as u32 - 1).to_le_bytes());
        assert!(matches!(
            decode_envelope(&corrupted.freeze(), 0),
            Err(CodecError::MalformedLiteral { field: "sender", .. })
        ));

        let mut inside_header = BytesMut::from(&frame[..]);
        inside_header[SENDER_TAG_OFFSET..RECIPIENT_TAG_OFFSET].copy_from_slice(&4u32.to_le_bytes());
        assert!(matches!(
            decode_envelope(&inside_header.freeze(), 0),
            Err(CodecError::MalformedLiteral { field: "sender", .. })
        ));
    }

    #[test]
    fn test_invalid_utf8_rejected() {
        let (refs, manifests) = empty_tables();
        let frame = encode(
            &header(),
            b"",
            TableRefs {
                actor_refs: &refs,
                manifests: &manifests,
            },
        );
        let mut corrupted = BytesMut::from(&frame[..]);
        corrupted[HEADER_SIZE + 2] = 0xFF;
        assert!(matches!(
            decode_envelope(&corrupted.freeze(), 0),
            Err(CodecError::InvalidUtf8 { field: "sender", .. })
        ));
    }

    #[test]
    fn test_encode_limits() {
        let (refs, manifests) = empty_tables();
        let tables = TableRefs {
            actor_refs: &refs,
            manifests: &manifests,
        };
        let mut buf = BytesMut::new();

        let long = EnvelopeHeader {
            manifest: "m".repeat(70_000),
            ..header()
        };
        assert_eq!(
            encode_envelope(&long, b"", tables, usize::MAX, &mut buf),
            Err(CodecError::LiteralTooLong {
                field: "manifest",
                len: 70_000
            })
        );

        assert!(matches!(
            encode_envelope(&header(), &[0u8; 2048], tables, 1024, &mut buf),
            Err(CodecError::FrameTooLarge { max: 1024, .. })
        ));
        assert!(buf.is_empty());
    }
}
