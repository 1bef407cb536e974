use std::fmt;
use std::sync::Arc;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tracing::debug;

use crate::decoder::InboundEnvelope;
use crate::envelope::OutboundEnvelope;
use crate::error::{CodecError, Result};

/// Per-entry overhead: instrument id (1) + length (4).
const ENTRY_HEADER_SIZE: usize = 5;

/// One instrument's bytes in the metadata block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataEntry {
    pub instrument_id: u8,
    pub data: Bytes,
}

/// Optional per-envelope metadata, one entry per instrument.
///
/// Wire format: `u32` block length, then `[u8 id][u32 len][len bytes]`
/// entries filling the block exactly.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteMetadata {
    entries: Vec<MetadataEntry>,
}

impl RemoteMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the entry for `instrument_id`.
    pub fn insert(&mut self, instrument_id: u8, data: impl Into<Bytes>) {
        let data = data.into();
        match self
            .entries
            .iter_mut()
            .find(|entry| entry.instrument_id == instrument_id)
        {
            Some(entry) => entry.data = data,
            None => self.entries.push(MetadataEntry {
                instrument_id,
                data,
            }),
        }
    }

    pub fn get(&self, instrument_id: u8) -> Option<&Bytes> {
        self.entries
            .iter()
            .find(|entry| entry.instrument_id == instrument_id)
            .map(|entry| &entry.data)
    }

    pub fn entries(&self) -> &[MetadataEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Size of the entries, excluding the block length prefix.
    pub fn block_len(&self) -> usize {
        self.entries
            .iter()
            .map(|entry| ENTRY_HEADER_SIZE + entry.data.len())
            .sum()
    }

    /// Size on the wire, including the block length prefix.
    pub fn encoded_len(&self) -> usize {
        4 + self.block_len()
    }

    pub(crate) fn write_to(&self, dst: &mut BytesMut) -> Result<()> {
        let block_len = u32::try_from(self.block_len())
            .map_err(|_| CodecError::MalformedMetadata { reason: "block exceeds u32 length" })?;
        dst.put_u32_le(block_len);
        for entry in &self.entries {
            dst.put_u8(entry.instrument_id);
            dst.put_u32_le(entry.data.len() as u32);
            dst.put_slice(&entry.data);
        }
        Ok(())
    }

    /// Parse a block (without its length prefix).
    pub(crate) fn read_block(block: Bytes) -> Result<Self> {
        let mut rest = block;
        let mut entries = Vec::new();
        while rest.has_remaining() {
            if rest.remaining() < ENTRY_HEADER_SIZE {
                return Err(CodecError::MalformedMetadata {
                    reason: "truncated entry header",
                });
            }
            let instrument_id = rest.get_u8();
            let len = rest.get_u32_le() as usize;
            if rest.remaining() < len {
                return Err(CodecError::MalformedMetadata {
                    reason: "entry extends past block",
                });
            }
            entries.push(MetadataEntry {
                instrument_id,
                data: rest.split_to(len),
            });
        }
        Ok(Self { entries })
    }
}

/// Extension point for attaching instrumentation data to envelopes.
pub trait RemoteInstrument: Send + Sync {
    /// Identifier written in front of this instrument's entry.
    fn identifier(&self) -> u8;

    /// Bytes to attach to an outbound envelope, if any.
    fn serialize(&self, envelope: &OutboundEnvelope) -> Option<Bytes>;

    /// Receive this instrument's entry from an inbound envelope.
    fn deserialize(&self, envelope: &InboundEnvelope, data: &Bytes);
}

/// The set of installed instruments.
#[derive(Clone, Default)]
pub struct RemoteInstruments {
    instruments: Vec<Arc<dyn RemoteInstrument>>,
}

impl RemoteInstruments {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `instrument`, replacing one with the same identifier.
    pub fn with(mut self, instrument: Arc<dyn RemoteInstrument>) -> Self {
        let id = instrument.identifier();
        self.instruments.retain(|existing| existing.identifier() != id);
        self.instruments.push(instrument);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.instruments.is_empty()
    }

    pub fn len(&self) -> usize {
        self.instruments.len()
    }

    /// Gather metadata for an outbound envelope. `None` when no instrument
    /// had anything to say.
    pub fn collect(&self, envelope: &OutboundEnvelope) -> Option<RemoteMetadata> {
        let mut metadata = RemoteMetadata::new();
        for instrument in &self.instruments {
            if let Some(data) = instrument.serialize(envelope) {
                metadata.insert(instrument.identifier(), data);
            }
        }
        (!metadata.is_empty()).then_some(metadata)
    }

    /// Hand each metadata entry of `envelope` to its instrument.
    pub fn dispatch(&self, envelope: &InboundEnvelope) {
        let Some(metadata) = &envelope.metadata else {
            return;
        };
        for entry in metadata.entries() {
            match self
                .instruments
                .iter()
                .find(|instrument| instrument.identifier() == entry.instrument_id)
            {
                Some(instrument) => instrument.deserialize(envelope, &entry.data),
                None => debug!(
                    instrument_id = entry.instrument_id,
                    "no instrument installed for metadata entry"
                ),
            }
        }
    }
}

impl fmt::Debug for RemoteInstruments {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ids: Vec<u8> = self.instruments.iter().map(|i| i.identifier()).collect();
        f.debug_struct("RemoteInstruments")
            .field("identifiers", &ids)
            .finish()
    }
}
