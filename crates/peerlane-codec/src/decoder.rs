use std::time::Duration;

use bytes::Bytes;
use peerlane_compress::{
    ActorRefPath, AdvertisementOutcome, ClassManifest, Compressible, CompressionError,
    CompressionSettings, InboundCompressions, InboundContext,
};
use peerlane_core::Address;
use tracing::warn;

use crate::codec::{decode_envelope, FieldRef};
use crate::error::{CodecError, Result};
use crate::metadata::{RemoteInstruments, RemoteMetadata};

/// A compressible field after resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved<T> {
    Value(T),
    /// The sender wrote no value.
    Absent,
    /// A code was sent but cannot be resolved for this frame.
    Unavailable,
}

impl<T> Resolved<T> {
    pub fn value(&self) -> Option<&T> {
        match self {
            Resolved::Value(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, Resolved::Unavailable)
    }
}

/// A fully decoded inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundEnvelope {
    pub origin_uid: u64,
    /// Remote address of the origin, when its association is known.
    pub association: Option<Address>,
    pub recipient: Resolved<ActorRefPath>,
    pub sender: Resolved<ActorRefPath>,
    pub serializer_id: i32,
    pub manifest: Resolved<ClassManifest>,
    pub metadata: Option<RemoteMetadata>,
    pub payload: Bytes,
}

/// Decodes inbound frames and owns the inbound compression state.
///
/// One decoder serves one inbound stream; its `&mut self` methods are the
/// serialization point for the compression tables it owns.
#[derive(Debug)]
pub struct EnvelopeDecoder {
    highest_version: u8,
    compressions: InboundCompressions,
    instruments: RemoteInstruments,
    sample_mask: u64,
    message_count: u64,
    schedule: AdvertisementSchedule,
}

/// When each table kind's advertisement tick is next due, in
/// [`peerlane_core::monotonic_nanos`]. Unset until the first call arms it.
#[derive(Debug, Default)]
struct AdvertisementSchedule {
    actor_refs: Option<u64>,
    manifests: Option<u64>,
}

impl EnvelopeDecoder {
    pub fn new(highest_version: u8, settings: CompressionSettings) -> Self {
        let interval = u64::from(settings.hit_sample_interval.max(1));
        Self {
            highest_version,
            sample_mask: interval.next_power_of_two() - 1,
            compressions: InboundCompressions::new(settings),
            instruments: RemoteInstruments::new(),
            message_count: 0,
            schedule: AdvertisementSchedule::default(),
        }
    }

    pub fn with_instruments(mut self, instruments: RemoteInstruments) -> Self {
        self.instruments = instruments;
        self
    }

    pub fn compressions(&self) -> &InboundCompressions {
        &self.compressions
    }

    /// Decode a user frame and resolve its compressed fields.
    ///
    /// Frames from a quarantined origin are rejected with
    /// [`CodecError::QuarantinedOrigin`]. Every `hit-sample-interval`-th
    /// frame from an origin with a known association feeds the heavy-hitter
    /// detectors.
    pub fn decode<C>(&mut self, frame: &Bytes, context: &C) -> Result<InboundEnvelope>
    where
        C: InboundContext + ?Sized,
    {
        self.decode_frame(frame, context, false)
    }

    /// Decode a frame from the control stream.
    ///
    /// Control frames from a quarantined origin still come through so that
    /// handshakes and quarantine notices reach the association layer. They
    /// never feed the detectors.
    pub fn decode_control<C>(&mut self, frame: &Bytes, context: &C) -> Result<InboundEnvelope>
    where
        C: InboundContext + ?Sized,
    {
        self.decode_frame(frame, context, true)
    }

    fn decode_frame<C>(&mut self, frame: &Bytes, context: &C, control: bool) -> Result<InboundEnvelope>
    where
        C: InboundContext + ?Sized,
    {
        let decoded = decode_envelope(frame, self.highest_version)?;
        let origin_uid = decoded.origin_uid;
        let status = context.association_status(origin_uid);
        let quarantined = status.as_ref().is_some_and(|status| status.quarantined);
        if quarantined && !control {
            warn!(origin_uid, "dropping frame from quarantined origin");
            return Err(CodecError::QuarantinedOrigin { origin_uid });
        }
        let association = status.map(|status| status.remote);

        let compressions = &self.compressions;
        let ref_version = decoded.actor_ref_table_version;
        let recipient = resolve(decoded.recipient, origin_uid, ref_version, |v, code| {
            compressions.decompress_actor_ref(origin_uid, v, code)
        })?;
        let sender = resolve(decoded.sender, origin_uid, ref_version, |v, code| {
            compressions.decompress_actor_ref(origin_uid, v, code)
        })?;
        let manifest = resolve(
            decoded.manifest,
            origin_uid,
            decoded.manifest_table_version,
            |v, code| compressions.decompress_manifest(origin_uid, v, code),
        )?;

        let envelope = InboundEnvelope {
            origin_uid,
            association,
            recipient,
            sender,
            serializer_id: decoded.serializer_id,
            manifest,
            metadata: decoded.metadata,
            payload: decoded.payload,
        };

        self.message_count = self.message_count.wrapping_add(1);
        if !quarantined && self.message_count & self.sample_mask == 0 {
            self.record_hits(&envelope);
        }
        self.instruments.dispatch(&envelope);
        Ok(envelope)
    }

    fn record_hits(&mut self, envelope: &InboundEnvelope) {
        let Some(remote) = &envelope.association else {
            return;
        };
        let origin_uid = envelope.origin_uid;
        if let Some(recipient) = envelope.recipient.value() {
            self.compressions.hit_actor_ref(origin_uid, remote, recipient, 1);
        }
        if let Some(sender) = envelope.sender.value() {
            self.compressions.hit_actor_ref(origin_uid, remote, sender, 1);
        }
        if let Some(manifest) = envelope.manifest.value() {
            self.compressions.hit_manifest(origin_uid, remote, manifest, 1);
        }
    }

    pub fn run_next_actor_ref_advertisement<C>(&mut self, context: &C) -> Vec<(u64, AdvertisementOutcome)>
    where
        C: InboundContext + ?Sized,
    {
        self.compressions.run_next_actor_ref_advertisement(context)
    }

    pub fn run_next_manifest_advertisement<C>(&mut self, context: &C) -> Vec<(u64, AdvertisementOutcome)>
    where
        C: InboundContext + ?Sized,
    {
        self.compressions.run_next_manifest_advertisement(context)
    }

    /// Run each advertisement tick whose `advertisement-interval` has
    /// elapsed at `now_nanos`. The first call only arms the intervals.
    pub fn run_due_advertisements<C>(
        &mut self,
        now_nanos: u64,
        context: &C,
    ) -> Vec<(&'static str, u64, AdvertisementOutcome)>
    where
        C: InboundContext + ?Sized,
    {
        let settings = self.compressions.settings();
        let refs_interval = settings.actor_refs.advertisement_interval;
        let manifests_interval = settings.manifests.advertisement_interval;

        let mut outcomes = Vec::new();
        if is_due(&mut self.schedule.actor_refs, now_nanos, refs_interval) {
            outcomes.extend(
                self.run_next_actor_ref_advertisement(context)
                    .into_iter()
                    .map(|(uid, outcome)| (ActorRefPath::KIND, uid, outcome)),
            );
        }
        if is_due(&mut self.schedule.manifests, now_nanos, manifests_interval) {
            outcomes.extend(
                self.run_next_manifest_advertisement(context)
                    .into_iter()
                    .map(|(uid, outcome)| (ClassManifest::KIND, uid, outcome)),
            );
        }
        outcomes
    }

    pub fn confirm_actor_ref_advertisement(&mut self, origin_uid: u64, version: u8) -> bool {
        self.compressions
            .confirm_actor_ref_advertisement(origin_uid, version)
    }

    pub fn confirm_manifest_advertisement(&mut self, origin_uid: u64, version: u8) -> bool {
        self.compressions
            .confirm_manifest_advertisement(origin_uid, version)
    }

    /// Drop compression state for an origin whose association is gone.
    pub fn close(&mut self, origin_uid: u64) -> bool {
        self.compressions.close(origin_uid)
    }

    pub fn current_origin_uids(&self) -> Vec<u64> {
        self.compressions.current_origin_uids()
    }
}

fn is_due(next: &mut Option<u64>, now_nanos: u64, interval: Duration) -> bool {
    let interval = u64::try_from(interval.as_nanos()).unwrap_or(u64::MAX);
    match *next {
        Some(at) if now_nanos < at => false,
        armed => {
            *next = Some(now_nanos.saturating_add(interval));
            armed.is_some()
        }
    }
}

fn resolve<T, F>(field: FieldRef, origin_uid: u64, version: u8, lookup: F) -> Result<Resolved<T>>
where
    T: Compressible,
    F: FnOnce(u8, u32) -> peerlane_compress::Result<Option<T>>,
{
    match field {
        FieldRef::Literal(text) => Ok(Resolved::Value(T::from_literal(&text))),
        FieldRef::Absent => Ok(Resolved::Absent),
        FieldRef::Compressed(code) => match lookup(version, code) {
            Ok(Some(value)) => Ok(Resolved::Value(value)),
            Ok(None) => Ok(Resolved::Unavailable),
            Err(err @ CompressionError::UnknownCompressedId { .. }) => {
                warn!(origin_uid, error = %err, "dropping unresolvable compressed field");
                Ok(Resolved::Unavailable)
            }
            Err(err) => Err(err.into()),
        },
    }
}
