use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use dashmap::DashMap;
use peerlane_codec::{EnvelopeDecoder, EnvelopeEncoder};
use peerlane_compress::{
    ActorRefPath, AssociationStatus, ClassManifest, Compressible, CompressionTable, InboundContext,
};
use peerlane_core::{monotonic_nanos, Address, RestartCounter, RestartDecision, UniqueAddress};
use tracing::{debug, info, warn};

use crate::association::{Association, HandshakeOutcome};
use crate::control::ControlMessage;
use crate::error::{AssociationError, Result};
use crate::settings::Settings;

/// What handling one control message did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlOutcome {
    HandshakeCompleted {
        peer: UniqueAddress,
        outcome: HandshakeOutcome,
    },
    /// The peer quarantined this system.
    QuarantinedByPeer { by: UniqueAddress },
    /// An advertised table now drives outbound compression.
    TableApplied { kind: &'static str, version: u8 },
    /// An ack for one of our advertisements; `confirmed` is false when it no
    /// longer matched the advertisement in progress.
    TableConfirmed {
        kind: &'static str,
        version: u8,
        confirmed: bool,
    },
    TerminationAcknowledged { by: UniqueAddress },
    FlushAcknowledged { origin_uid: u64 },
    /// A reply was queued and nothing else changed.
    Replied { kind: &'static str },
    Ignored { reason: &'static str },
}

/// All associations of the local system.
///
/// Associations are created on first use of a remote address and indexed by
/// uid once their handshake completes. The registry is the
/// [`InboundContext`] of the decoder: it reports association status and
/// carries compression advertisements to the control lane.
pub struct AssociationRegistry {
    local: UniqueAddress,
    settings: Settings,
    by_address: DashMap<Address, Arc<Association>>,
    by_uid: DashMap<u64, Arc<Association>>,
    inbound_restart_counter: RestartCounter,
}

impl AssociationRegistry {
    pub fn new(local: UniqueAddress, settings: Settings) -> Self {
        let inbound_restart_counter = RestartCounter::new(
            settings.restart.inbound_max_restarts,
            settings.restart.inbound_restart_timeout,
        );
        Self {
            local,
            settings,
            by_address: DashMap::new(),
            by_uid: DashMap::new(),
            inbound_restart_counter,
        }
    }

    pub fn local(&self) -> &UniqueAddress {
        &self.local
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// An encoder for outbound frames of this system.
    pub fn new_encoder(&self) -> EnvelopeEncoder {
        EnvelopeEncoder::new(self.local.uid, self.settings.codec_config())
    }

    /// A decoder for one inbound stream of this system.
    pub fn new_decoder(&self) -> EnvelopeDecoder {
        EnvelopeDecoder::new(
            self.settings.protocol.highest_supported_version,
            self.settings.compression.clone(),
        )
    }

    /// The association with `remote`, created on first use.
    pub fn association(&self, remote: &Address) -> Arc<Association> {
        if let Some(existing) = self.by_address.get(remote) {
            return Arc::clone(existing.value());
        }
        let entry = self.by_address.entry(remote.clone()).or_insert_with(|| {
            debug!(remote = %remote, "creating association");
            Arc::new(Association::new(
                self.local.clone(),
                remote.clone(),
                &self.settings,
            ))
        });
        Arc::clone(entry.value())
    }

    pub fn association_by_uid(&self, uid: u64) -> Option<Arc<Association>> {
        self.by_uid.get(&uid).map(|entry| Arc::clone(entry.value()))
    }

    /// Index the association with `peer.address` under `peer.uid`.
    pub fn set_uid(&self, peer: &UniqueAddress) -> Arc<Association> {
        let association = self.association(&peer.address);
        self.by_uid.insert(peer.uid, Arc::clone(&association));
        association
    }

    pub fn associations(&self) -> Vec<Arc<Association>> {
        let mut all: Vec<_> = self
            .by_address
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        all.sort_by(|a, b| a.remote().cmp(b.remote()));
        all
    }

    pub fn len(&self) -> usize {
        self.by_address.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_address.is_empty()
    }

    /// [`Self::remove_unused_quarantined_after`] with the configured
    /// `association.remove-quarantined-association-after`.
    pub fn remove_unused_quarantined(&self) -> Vec<u64> {
        let after = self.settings.association.remove_quarantined_association_after;
        self.remove_unused_quarantined_after(after)
    }

    /// Remove associations that have been quarantined and unused for longer
    /// than `after`. Returns the uids that no longer resolve; the caller
    /// closes their inbound compression state.
    pub fn remove_unused_quarantined_after(&self, after: Duration) -> Vec<u64> {
        let now = monotonic_nanos();
        let removable: Vec<Arc<Association>> = self
            .by_address
            .iter()
            .filter(|entry| entry.value().is_removable(now, after))
            .map(|entry| Arc::clone(entry.value()))
            .collect();

        let mut removed = Vec::new();
        for association in removable {
            self.by_address.remove_if(association.remote(), |_, current| {
                Arc::ptr_eq(current, &association)
            });
            self.by_uid.retain(|uid, current| {
                if Arc::ptr_eq(current, &association) {
                    removed.push(*uid);
                    false
                } else {
                    true
                }
            });
            info!(remote = %association.remote(), "removed unused quarantined association");
        }
        removed.sort_unstable();
        removed
    }

    /// Remove associations whose handshake did not complete within the
    /// configured `association.handshake-timeout`. Returns their addresses.
    pub fn remove_expired_handshakes(&self) -> Vec<Address> {
        self.remove_expired_handshakes_after(self.settings.association.handshake_timeout)
    }

    /// Remove associations whose handshake did not complete within
    /// `timeout`. Returns their addresses, sorted.
    ///
    /// None of them was ever indexed by uid, so no inbound compression state
    /// refers to them.
    pub fn remove_expired_handshakes_after(&self, timeout: Duration) -> Vec<Address> {
        let now = monotonic_nanos();
        let expired: Vec<Arc<Association>> = self
            .by_address
            .iter()
            .filter(|entry| entry.value().is_handshake_expired(now, timeout))
            .map(|entry| Arc::clone(entry.value()))
            .collect();

        let mut removed = Vec::new();
        for association in expired {
            let gone = self
                .by_address
                .remove_if(association.remote(), |_, current| {
                    Arc::ptr_eq(current, &association)
                })
                .is_some();
            if gone {
                warn!(
                    remote = %association.remote(),
                    timeout = ?timeout,
                    "handshake timed out, association removed"
                );
                removed.push(association.remote().clone());
            }
        }
        removed.sort();
        removed
    }

    /// Decide whether a failed inbound stream may be restarted.
    pub fn inbound_stream_failed(&self, error: &dyn fmt::Display) -> RestartDecision {
        let decision = self.inbound_restart_counter.decide();
        match decision {
            RestartDecision::Restart => warn!(%error, "inbound stream failed, restarting"),
            RestartDecision::GiveUp => warn!(
                %error,
                max_restarts = self.inbound_restart_counter.max_restarts(),
                "inbound stream failed too often, giving up"
            ),
        }
        decision
    }

    /// Decode a frame from the control stream and handle the message in it.
    pub fn receive_control_frame(
        &self,
        frame: &Bytes,
        decoder: &mut EnvelopeDecoder,
    ) -> Result<ControlOutcome> {
        let envelope = decoder.decode_control(frame, self)?;
        let message = ControlMessage::from_envelope(&envelope)?;
        self.handle_control(envelope.origin_uid, message, decoder)
    }

    /// Handle a control message received from `origin_uid`.
    pub fn handle_control(
        &self,
        origin_uid: u64,
        message: ControlMessage,
        decoder: &mut EnvelopeDecoder,
    ) -> Result<ControlOutcome> {
        debug!(origin_uid, kind = message.kind(), "control message received");
        match message {
            ControlMessage::HandshakeReq { from, to } => {
                if to != self.local.address {
                    warn!(from = %from, to = %to, "handshake addressed to another system");
                    return Ok(ControlOutcome::Ignored {
                        reason: "handshake addressed to another system",
                    });
                }
                let outcome = self.complete_handshake(&from)?;
                close_replaced_incarnation(&outcome, decoder);
                self.association(&from.address)
                    .send_control(&ControlMessage::HandshakeRsp {
                        from: self.local.clone(),
                    })?;
                Ok(ControlOutcome::HandshakeCompleted {
                    peer: from,
                    outcome,
                })
            }
            ControlMessage::HandshakeRsp { from } => {
                let outcome = self.complete_handshake(&from)?;
                close_replaced_incarnation(&outcome, decoder);
                Ok(ControlOutcome::HandshakeCompleted {
                    peer: from,
                    outcome,
                })
            }
            ControlMessage::Quarantined { from, to } => {
                if to == self.local {
                    warn!(by = %from, "this system was quarantined by the remote system");
                    Ok(ControlOutcome::QuarantinedByPeer { by: from })
                } else {
                    Ok(ControlOutcome::Ignored {
                        reason: "quarantine notice for another incarnation",
                    })
                }
            }
            ControlMessage::ActorRefCompressionAdvertisement { from, table } => {
                self.accept_advertisement(
                    &from,
                    table,
                    |association, table| association.apply_actor_ref_table(table),
                    |version| ControlMessage::ActorRefCompressionAdvertisementAck {
                        from: self.local.clone(),
                        version,
                    },
                )
            }
            ControlMessage::ClassManifestCompressionAdvertisement { from, table } => {
                self.accept_advertisement(
                    &from,
                    table,
                    |association, table| association.apply_manifest_table(table),
                    |version| ControlMessage::ClassManifestCompressionAdvertisementAck {
                        from: self.local.clone(),
                        version,
                    },
                )
            }
            ControlMessage::ActorRefCompressionAdvertisementAck { from, version } => {
                let confirmed = decoder.confirm_actor_ref_advertisement(from.uid, version);
                Ok(ControlOutcome::TableConfirmed {
                    kind: ActorRefPath::KIND,
                    version,
                    confirmed,
                })
            }
            ControlMessage::ClassManifestCompressionAdvertisementAck { from, version } => {
                let confirmed = decoder.confirm_manifest_advertisement(from.uid, version);
                Ok(ControlOutcome::TableConfirmed {
                    kind: ClassManifest::KIND,
                    version,
                    confirmed,
                })
            }
            ControlMessage::ActorSystemTerminating { from } => {
                info!(remote = %from, "remote system is terminating");
                let reply = ControlMessage::ActorSystemTerminatingAck {
                    from: self.local.clone(),
                };
                self.association(&from.address).send_control(&reply)?;
                Ok(ControlOutcome::Replied {
                    kind: reply.kind(),
                })
            }
            ControlMessage::ActorSystemTerminatingAck { from } => {
                Ok(ControlOutcome::TerminationAcknowledged { by: from })
            }
            ControlMessage::Flush => match self.association_by_uid(origin_uid) {
                Some(association) => {
                    association.send_control(&ControlMessage::FlushAck)?;
                    Ok(ControlOutcome::Replied {
                        kind: ControlMessage::FlushAck.kind(),
                    })
                }
                None => Ok(ControlOutcome::Ignored {
                    reason: "flush from an origin without association",
                }),
            },
            ControlMessage::FlushAck => Ok(ControlOutcome::FlushAcknowledged { origin_uid }),
        }
    }

    fn complete_handshake(&self, peer: &UniqueAddress) -> Result<HandshakeOutcome> {
        let association = self.association(&peer.address);
        match association.complete_handshake(peer.clone()) {
            Ok(outcome) => {
                if let HandshakeOutcome::NewIncarnation { previous } = &outcome {
                    self.by_uid.remove_if(&previous.uid, |_, current| {
                        Arc::ptr_eq(current, &association)
                    });
                }
                self.by_uid.insert(peer.uid, association);
                Ok(outcome)
            }
            Err(err @ AssociationError::Quarantined { .. }) => {
                // Tell the quarantined incarnation; it cannot get past the
                // handshake anyway.
                association.send_control(&ControlMessage::Quarantined {
                    from: self.local.clone(),
                    to: peer.clone(),
                })?;
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    fn accept_advertisement<T, A, K>(
        &self,
        from: &UniqueAddress,
        table: CompressionTable<T>,
        apply: A,
        ack: K,
    ) -> Result<ControlOutcome>
    where
        T: Compressible,
        A: FnOnce(&Association, CompressionTable<T>),
        K: FnOnce(u8) -> ControlMessage,
    {
        if table.origin_uid() != self.local.uid {
            debug!(
                kind = T::KIND,
                from = %from,
                table_origin = table.origin_uid(),
                "ignoring table advertised to another incarnation"
            );
            return Ok(ControlOutcome::Ignored {
                reason: "table advertised to another incarnation",
            });
        }

        let association = self.association(&from.address);
        if association.associated_with().as_ref() != Some(from) {
            debug!(
                kind = T::KIND,
                from = %from,
                "ignoring table from an incarnation that is not associated"
            );
            return Ok(ControlOutcome::Ignored {
                reason: "advertisement from an incarnation that is not associated",
            });
        }

        let version = table.version();
        apply(&association, table);
        association.send_control(&ack(version))?;
        Ok(ControlOutcome::TableApplied {
            kind: T::KIND,
            version,
        })
    }

    fn send_advertisement(&self, remote: &Address, message: ControlMessage) {
        if let Err(err) = self.association(remote).send_control(&message) {
            warn!(remote = %remote, kind = message.kind(), error = %err, "failed to send advertisement");
        }
    }
}

/// Inbound compression of an incarnation replaced by a restart is never
/// used again.
fn close_replaced_incarnation(outcome: &HandshakeOutcome, decoder: &mut EnvelopeDecoder) {
    if let HandshakeOutcome::NewIncarnation { previous } = outcome {
        decoder.close(previous.uid);
    }
}

impl InboundContext for AssociationRegistry {
    fn association_status(&self, origin_uid: u64) -> Option<AssociationStatus> {
        if let Some(association) = self.association_by_uid(origin_uid) {
            return Some(AssociationStatus {
                remote: association.remote().clone(),
                ordinary_stream_active: association.is_ordinary_stream_active(),
                quarantined: association.state().is_quarantined(origin_uid),
            });
        }
        // Replaced incarnations leave the uid index but stay in the
        // quarantine history of their association.
        self.by_address
            .iter()
            .find(|entry| entry.value().state().is_quarantined(origin_uid))
            .map(|entry| AssociationStatus {
                remote: entry.key().clone(),
                ordinary_stream_active: false,
                quarantined: true,
            })
    }

    fn send_actor_ref_advertisement(&self, remote: &Address, table: CompressionTable<ActorRefPath>) {
        self.send_advertisement(
            remote,
            ControlMessage::ActorRefCompressionAdvertisement {
                from: self.local.clone(),
                table,
            },
        );
    }

    fn send_manifest_advertisement(&self, remote: &Address, table: CompressionTable<ClassManifest>) {
        self.send_advertisement(
            remote,
            ControlMessage::ClassManifestCompressionAdvertisement {
                from: self.local.clone(),
                table,
            },
        );
    }
}

impl fmt::Debug for AssociationRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssociationRegistry")
            .field("local", &self.local)
            .field("associations", &self.by_address.len())
            .field("uids", &self.by_uid.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lanes::LaneId;

    fn local() -> UniqueAddress {
        UniqueAddress::new(Address::new("sys", "10.0.0.1", 2552), 1)
    }

    fn peer(uid: u64) -> UniqueAddress {
        UniqueAddress::new(Address::new("sys", "10.0.0.2", 2552), uid)
    }

    fn registry() -> AssociationRegistry {
        AssociationRegistry::new(local(), Settings::default())
    }

    fn next_control(association: &Association) -> Option<ControlMessage> {
        let envelope = association.lanes().poll(LaneId::Control)?;
        Some(serde_json::from_slice(&envelope.message.payload).unwrap())
    }

    fn handshake(registry: &AssociationRegistry, decoder: &mut EnvelopeDecoder, uid: u64) {
        let outcome = registry
            .handle_control(
                uid,
                ControlMessage::HandshakeReq {
                    from: peer(uid),
                    to: local().address,
                },
                decoder,
            )
            .unwrap();
        assert!(matches!(outcome, ControlOutcome::HandshakeCompleted { .. }));
    }

    #[test]
    fn association_is_created_once_per_address() {
        let registry = registry();
        let a = registry.association(&peer(2).address);
        let b = registry.association(&peer(2).address);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 1);
        assert!(registry.association_by_uid(2).is_none());
    }

    #[test]
    fn handshake_request_completes_and_replies() {
        let registry = registry();
        let mut decoder = registry.new_decoder();
        handshake(&registry, &mut decoder, 2);

        let association = registry.association_by_uid(2).unwrap();
        assert_eq!(association.associated_with(), Some(peer(2)));
        assert_eq!(
            next_control(&association),
            Some(ControlMessage::HandshakeRsp { from: local() })
        );
    }

    #[test]
    fn handshake_for_other_system_is_ignored() {
        let registry = registry();
        let mut decoder = registry.new_decoder();
        let outcome = registry
            .handle_control(
                2,
                ControlMessage::HandshakeReq {
                    from: peer(2),
                    to: Address::new("other", "10.0.0.1", 2552),
                },
                &mut decoder,
            )
            .unwrap();
        assert!(matches!(outcome, ControlOutcome::Ignored { .. }));
        assert!(registry.association_by_uid(2).is_none());
    }

    #[test]
    fn quarantined_incarnation_is_told_so() {
        let registry = registry();
        let mut decoder = registry.new_decoder();
        handshake(&registry, &mut decoder, 2);
        let association = registry.association_by_uid(2).unwrap();
        next_control(&association);
        association.quarantine("test", Some(2));
        next_control(&association);

        let err = registry
            .handle_control(
                2,
                ControlMessage::HandshakeRsp { from: peer(2) },
                &mut decoder,
            )
            .unwrap_err();
        assert!(matches!(err, AssociationError::Quarantined { uid: 2, .. }));
        assert_eq!(
            next_control(&association),
            Some(ControlMessage::Quarantined {
                from: local(),
                to: peer(2)
            })
        );
    }

    #[test]
    fn advertisement_is_applied_and_acked() {
        let registry = registry();
        let mut decoder = registry.new_decoder();
        handshake(&registry, &mut decoder, 2);
        let association = registry.association_by_uid(2).unwrap();
        next_control(&association);

        let table = CompressionTable::new(1, 1, vec![ActorRefPath::from("/user/a")]);
        let outcome = registry
            .handle_control(
                2,
                ControlMessage::ActorRefCompressionAdvertisement {
                    from: peer(2),
                    table,
                },
                &mut decoder,
            )
            .unwrap();
        assert_eq!(
            outcome,
            ControlOutcome::TableApplied {
                kind: "actor-ref",
                version: 1
            }
        );
        assert_eq!(
            association
                .outbound_compressions()
                .actor_ref_table()
                .compress(&ActorRefPath::from("/user/a")),
            Some(0)
        );
        assert_eq!(
            next_control(&association),
            Some(ControlMessage::ActorRefCompressionAdvertisementAck {
                from: local(),
                version: 1
            })
        );
    }

    #[test]
    fn advertisement_for_another_incarnation_is_ignored() {
        let registry = registry();
        let mut decoder = registry.new_decoder();
        handshake(&registry, &mut decoder, 2);
        let association = registry.association_by_uid(2).unwrap();
        next_control(&association);

        // Addressed to a previous incarnation of this system.
        let stale_origin = CompressionTable::new(99, 1, vec!["Msg".to_string()]);
        let outcome = registry
            .handle_control(
                2,
                ControlMessage::ClassManifestCompressionAdvertisement {
                    from: peer(2),
                    table: stale_origin,
                },
                &mut decoder,
            )
            .unwrap();
        assert!(matches!(outcome, ControlOutcome::Ignored { .. }));

        // Sent by an incarnation we are not associated with.
        let table = CompressionTable::new(1, 1, vec!["Msg".to_string()]);
        let outcome = registry
            .handle_control(
                3,
                ControlMessage::ClassManifestCompressionAdvertisement {
                    from: peer(3),
                    table,
                },
                &mut decoder,
            )
            .unwrap();
        assert!(matches!(outcome, ControlOutcome::Ignored { .. }));
        assert_eq!(association.outbound_compressions().manifest_table().version(), 0);
        assert!(next_control(&association).is_none());
    }

    #[test]
    fn ack_without_advertisement_is_not_confirmed() {
        let registry = registry();
        let mut decoder = registry.new_decoder();
        let outcome = registry
            .handle_control(
                2,
                ControlMessage::ActorRefCompressionAdvertisementAck {
                    from: peer(2),
                    version: 1,
                },
                &mut decoder,
            )
            .unwrap();
        assert_eq!(
            outcome,
            ControlOutcome::TableConfirmed {
                kind: "actor-ref",
                version: 1,
                confirmed: false
            }
        );
    }

    #[test]
    fn terminating_and_flush_are_answered() {
        let registry = registry();
        let mut decoder = registry.new_decoder();
        handshake(&registry, &mut decoder, 2);
        let association = registry.association_by_uid(2).unwrap();
        next_control(&association);

        registry
            .handle_control(
                2,
                ControlMessage::ActorSystemTerminating { from: peer(2) },
                &mut decoder,
            )
            .unwrap();
        assert_eq!(
            next_control(&association),
            Some(ControlMessage::ActorSystemTerminatingAck { from: local() })
        );

        registry
            .handle_control(2, ControlMessage::Flush, &mut decoder)
            .unwrap();
        assert_eq!(next_control(&association), Some(ControlMessage::FlushAck));

        let outcome = registry
            .handle_control(9, ControlMessage::Flush, &mut decoder)
            .unwrap();
        assert!(matches!(outcome, ControlOutcome::Ignored { .. }));
        assert_eq!(
            registry
                .handle_control(2, ControlMessage::FlushAck, &mut decoder)
                .unwrap(),
            ControlOutcome::FlushAcknowledged { origin_uid: 2 }
        );
    }

    #[test]
    fn quarantine_notice_for_this_system() {
        let registry = registry();
        let mut decoder = registry.new_decoder();
        let outcome = registry
            .handle_control(
                2,
                ControlMessage::Quarantined {
                    from: peer(2),
                    to: local(),
                },
                &mut decoder,
            )
            .unwrap();
        assert_eq!(outcome, ControlOutcome::QuarantinedByPeer { by: peer(2) });

        let outcome = registry
            .handle_control(
                2,
                ControlMessage::Quarantined {
                    from: peer(2),
                    to: UniqueAddress::new(local().address, 77),
                },
                &mut decoder,
            )
            .unwrap();
        assert!(matches!(outcome, ControlOutcome::Ignored { .. }));
    }

    #[test]
    fn status_reflects_ordinary_stream() {
        let registry = registry();
        let mut decoder = registry.new_decoder();
        assert!(registry.association_status(2).is_none());

        handshake(&registry, &mut decoder, 2);
        let status = registry.association_status(2).unwrap();
        assert_eq!(status.remote, peer(2).address);
        assert!(!status.ordinary_stream_active);

        registry
            .association_by_uid(2)
            .unwrap()
            .set_ordinary_stream_active(true);
        assert!(registry.association_status(2).unwrap().ordinary_stream_active);
    }

    #[test]
    fn only_quarantined_idle_associations_are_removed() {
        let registry = registry();
        let mut decoder = registry.new_decoder();
        handshake(&registry, &mut decoder, 2);
        registry.association(&Address::new("sys", "10.0.0.3", 2552));

        // Nothing is quarantined yet.
        std::thread::sleep(Duration::from_millis(5));
        assert!(registry
            .remove_unused_quarantined_after(Duration::from_millis(1))
            .is_empty());

        registry
            .association_by_uid(2)
            .unwrap()
            .quarantine("test", None);
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(
            registry.remove_unused_quarantined_after(Duration::from_millis(1)),
            vec![2]
        );
        assert!(registry.association_by_uid(2).is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn quarantined_removal_uses_configured_delay() {
        let mut settings = Settings::default();
        settings.association.remove_quarantined_association_after = Duration::from_millis(1);
        let short = AssociationRegistry::new(local(), settings);
        let mut decoder = short.new_decoder();
        handshake(&short, &mut decoder, 2);
        short.association_by_uid(2).unwrap().quarantine("test", None);

        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(short.remove_unused_quarantined(), vec![2]);
        assert!(short.is_empty());

        // The default delay is an hour.
        let default = registry();
        let mut decoder = default.new_decoder();
        handshake(&default, &mut decoder, 2);
        default.association_by_uid(2).unwrap().quarantine("test", None);
        assert!(default.remove_unused_quarantined().is_empty());
    }

    #[test]
    fn pending_handshakes_expire_after_configured_timeout() {
        let silent = Address::new("sys", "10.0.0.3", 2552);

        let mut settings = Settings::default();
        settings.association.handshake_timeout = Duration::from_millis(1);
        let short = AssociationRegistry::new(local(), settings);
        let mut decoder = short.new_decoder();
        handshake(&short, &mut decoder, 2);
        short.association(&silent);

        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(short.remove_expired_handshakes(), vec![silent.clone()]);
        assert_eq!(short.len(), 1);
        assert!(short.association_by_uid(2).is_some());
        assert!(short.remove_expired_handshakes().is_empty());

        // The default timeout is twenty seconds.
        let default = registry();
        default.association(&silent);
        std::thread::sleep(Duration::from_millis(5));
        assert!(default.remove_expired_handshakes().is_empty());
        assert_eq!(
            default.remove_expired_handshakes_after(Duration::from_millis(1)),
            vec![silent]
        );
    }

    #[test]
    fn new_incarnation_drops_the_previous_uid() {
        let registry = registry();
        let mut decoder = registry.new_decoder();
        handshake(&registry, &mut decoder, 2);
        handshake(&registry, &mut decoder, 3);

        assert!(registry.association_by_uid(2).is_none());
        assert!(registry.association_status(2).is_none());
        let association = registry.association_by_uid(3).unwrap();
        assert_eq!(association.associated_with(), Some(peer(3)));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn status_reports_quarantine_of_current_and_replaced_incarnations() {
        let registry = registry();
        let mut decoder = registry.new_decoder();
        handshake(&registry, &mut decoder, 2);
        assert!(!registry.association_status(2).unwrap().quarantined);

        registry
            .association_by_uid(2)
            .unwrap()
            .quarantine("test", Some(2));
        assert!(registry.association_status(2).unwrap().quarantined);

        handshake(&registry, &mut decoder, 3);
        let replaced = registry.association_status(2).unwrap();
        assert!(replaced.quarantined);
        assert_eq!(replaced.remote, peer(2).address);
        assert!(!registry.association_status(3).unwrap().quarantined);
        assert!(registry.association_status(4).is_none());
    }

    #[test]
    fn inbound_restarts_are_bounded() {
        let mut settings = Settings::default();
        settings.restart.inbound_max_restarts = 1;
        let registry = AssociationRegistry::new(local(), settings);
        assert_eq!(registry.inbound_stream_failed(&"boom"), RestartDecision::Restart);
        assert_eq!(registry.inbound_stream_failed(&"boom"), RestartDecision::GiveUp);
    }
}
