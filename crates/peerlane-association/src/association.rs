use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use peerlane_codec::OutboundEnvelope;
use peerlane_compress::{ActorRefPath, ClassManifest, CompressionTable, OutboundCompressions};
use peerlane_core::{
    monotonic_nanos, noop_wakeup, Address, KillSwitch, RestartCounter, RestartDecision, Snapshot,
    UniqueAddress, Wakeup,
};
use tracing::{debug, info, warn};

use crate::control::ControlMessage;
use crate::error::{AssociationError, Result};
use crate::lanes::{DropReason, Dropped, LaneId, OutboundLanes};
use crate::settings::Settings;
use crate::state::AssociationState;

/// Result of [`Association::complete_handshake`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeOutcome {
    /// The peer incarnation was already associated.
    AlreadyCompleted,
    /// The first incarnation seen on this association.
    Completed,
    /// The remote system restarted; `previous` is the replaced incarnation.
    NewIncarnation { previous: UniqueAddress },
}

/// Outbound side of the connection to one remote address.
///
/// The association outlives incarnations of the remote system: a restart on
/// the same address installs a new [`AssociationState`] while the quarantine
/// history is kept.
pub struct Association {
    local: UniqueAddress,
    remote: Address,
    state: Snapshot<AssociationState>,
    lanes: OutboundLanes,
    outbound_compressions: OutboundCompressions,
    restart_counter: RestartCounter,
    ordinary_stream_active: AtomicBool,
    dropped: AtomicU64,
    created: u64,
}

impl Association {
    pub fn new(local: UniqueAddress, remote: Address, settings: &Settings) -> Self {
        Self::with_wakeups(local, remote, settings, |_| noop_wakeup())
    }

    /// Create an association whose lane consumers are woken through
    /// `wakeup`.
    pub fn with_wakeups<F>(
        local: UniqueAddress,
        remote: Address,
        settings: &Settings,
        wakeup: F,
    ) -> Self
    where
        F: FnMut(LaneId) -> Wakeup,
    {
        Self {
            local,
            remote,
            state: Snapshot::new(AssociationState::new()),
            lanes: OutboundLanes::new(&settings.lanes, wakeup),
            outbound_compressions: OutboundCompressions::new(),
            restart_counter: RestartCounter::new(
                settings.restart.outbound_max_restarts,
                settings.restart.outbound_restart_timeout,
            ),
            ordinary_stream_active: AtomicBool::new(false),
            dropped: AtomicU64::new(0),
            created: monotonic_nanos(),
        }
    }

    pub fn local(&self) -> &UniqueAddress {
        &self.local
    }

    pub fn remote(&self) -> &Address {
        &self.remote
    }

    pub fn state(&self) -> Arc<AssociationState> {
        self.state.load()
    }

    /// Install `new` if the state is still `current`.
    pub fn swap_state(&self, current: &Arc<AssociationState>, new: AssociationState) -> bool {
        self.state.compare_and_set(current, Arc::new(new))
    }

    /// The remote incarnation, once a handshake completed.
    pub fn associated_with(&self) -> Option<UniqueAddress> {
        self.state().unique_remote_address()
    }

    pub fn is_quarantined(&self) -> bool {
        self.state().is_current_quarantined()
    }

    pub fn lanes(&self) -> &OutboundLanes {
        &self.lanes
    }

    pub fn outbound_compressions(&self) -> &OutboundCompressions {
        &self.outbound_compressions
    }

    pub fn is_ordinary_stream_active(&self) -> bool {
        self.ordinary_stream_active.load(Ordering::Acquire)
    }

    /// Marks whether the ordinary outbound stream is running. Compression
    /// advertisements are only sent while it is.
    pub fn set_ordinary_stream_active(&self, active: bool) {
        self.ordinary_stream_active.store(active, Ordering::Release);
    }

    /// Envelopes dropped since the association was created.
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Queue a user envelope. Never blocks; a full lane or a quarantined
    /// remote hands the envelope back.
    pub fn send(&self, envelope: OutboundEnvelope) -> std::result::Result<(), Dropped> {
        let state = self.state();
        if state.is_current_quarantined() {
            return Err(self.drop_envelope(DropReason::Quarantined, envelope));
        }

        let lane = self.lanes.lane_for(&envelope);
        match self.lanes.offer(lane, envelope) {
            Ok(()) => {
                state.touch();
                Ok(())
            }
            Err(envelope) => Err(self.drop_envelope(DropReason::QueueFull(lane), envelope)),
        }
    }

    fn drop_envelope(&self, reason: DropReason, envelope: OutboundEnvelope) -> Dropped {
        self.dropped.fetch_add(1, Ordering::Relaxed);
        warn!(
            remote = %self.remote,
            recipient = ?envelope.recipient,
            %reason,
            "dropping outbound message"
        );
        Dropped { reason, envelope }
    }

    /// Queue a control message on the control lane. Allowed while
    /// quarantined.
    pub fn send_control(&self, message: &ControlMessage) -> Result<()> {
        let envelope = message.to_envelope()?;
        match self.lanes.offer(LaneId::Control, envelope) {
            Ok(()) => {
                debug!(remote = %self.remote, kind = message.kind(), "queued control message");
                Ok(())
            }
            Err(_) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(
                    remote = %self.remote,
                    kind = message.kind(),
                    "control queue full, dropping control message"
                );
                Err(AssociationError::QueueFull {
                    remote: self.remote.clone(),
                    lane: LaneId::Control,
                })
            }
        }
    }

    /// Record a completed handshake with `peer`.
    ///
    /// Outbound compression is cleared before the new incarnation becomes
    /// visible, so nothing is encoded for it with tables the previous
    /// incarnation advertised.
    pub fn complete_handshake(&self, peer: UniqueAddress) -> Result<HandshakeOutcome> {
        if peer.address != self.remote {
            return Err(AssociationError::AddressMismatch {
                expected: self.remote.clone(),
                actual: peer.address,
            });
        }

        loop {
            let current = self.state();
            if current.is_quarantined(peer.uid) {
                warn!(peer = %peer, "refusing handshake with quarantined incarnation");
                return Err(AssociationError::Quarantined {
                    remote: self.remote.clone(),
                    uid: peer.uid,
                });
            }

            match current.unique_remote_address() {
                Some(existing) if existing.uid == peer.uid => {
                    return Ok(HandshakeOutcome::AlreadyCompleted);
                }
                Some(previous) => {
                    self.outbound_compressions.clear();
                    if self.swap_state(&current, current.new_incarnation(peer.clone())) {
                        // A table may have been applied between the clear
                        // and the swap.
                        self.outbound_compressions.clear();
                        info!(
                            remote = %self.remote,
                            previous_uid = previous.uid,
                            uid = peer.uid,
                            "association with new incarnation"
                        );
                        return Ok(HandshakeOutcome::NewIncarnation { previous });
                    }
                }
                None => {
                    self.outbound_compressions.clear();
                    if current.complete_unique_remote_address(peer.clone()) {
                        self.outbound_compressions.clear();
                        info!(remote = %self.remote, uid = peer.uid, "association established");
                        return Ok(HandshakeOutcome::Completed);
                    }
                }
            }
        }
    }

    /// Quarantine the current remote incarnation.
    ///
    /// With `uid` given, only that incarnation is quarantined; a request for
    /// an older or unknown incarnation is ignored. Returns whether a new
    /// quarantine was recorded. The quarantine stands even when the notice
    /// to the remote cannot be queued.
    pub fn quarantine(&self, reason: &str, uid: Option<u64>) -> bool {
        loop {
            let current = self.state();
            let Some(peer) = current.unique_remote_address() else {
                warn!(
                    remote = %self.remote,
                    reason,
                    "quarantine requested before the handshake completed, ignoring"
                );
                return false;
            };
            if uid.is_some_and(|uid| uid != peer.uid) {
                debug!(
                    remote = %self.remote,
                    requested_uid = ?uid,
                    current_uid = peer.uid,
                    "quarantine of a different incarnation ignored"
                );
                return false;
            }
            if current.is_quarantined(peer.uid) {
                return false;
            }
            let Some(quarantined) = current.new_quarantined() else {
                return false;
            };
            if self.swap_state(&current, quarantined) {
                warn!(
                    remote = %self.remote,
                    uid = peer.uid,
                    reason,
                    "association quarantined"
                );
                self.outbound_compressions.clear();
                let notice = ControlMessage::Quarantined {
                    from: self.local.clone(),
                    to: peer,
                };
                if let Err(err) = self.send_control(&notice) {
                    warn!(
                        remote = %self.remote,
                        error = %err,
                        "quarantine recorded but the notice was not queued"
                    );
                }
                return true;
            }
        }
    }

    pub fn apply_actor_ref_table(&self, table: CompressionTable<ActorRefPath>) {
        self.outbound_compressions.apply_actor_ref_table(table);
    }

    pub fn apply_manifest_table(&self, table: CompressionTable<ClassManifest>) {
        self.outbound_compressions.apply_manifest_table(table);
    }

    /// Replace the kill switch that stops the idle control stream.
    pub fn set_control_idle_kill_switch(&self, kill_switch: Option<Arc<KillSwitch>>) {
        loop {
            let current = self.state();
            let next = current.with_control_idle_kill_switch(kill_switch.clone());
            if self.swap_state(&current, next) {
                return;
            }
        }
    }

    /// Decide whether a failed outbound stream may be restarted.
    pub fn outbound_stream_failed(&self, lane: LaneId, error: &dyn fmt::Display) -> RestartDecision {
        let decision = self.restart_counter.decide();
        match decision {
            RestartDecision::Restart => warn!(
                remote = %self.remote,
                %lane,
                %error,
                restarts = self.restart_counter.count(),
                "outbound stream failed, restarting"
            ),
            RestartDecision::GiveUp => warn!(
                remote = %self.remote,
                %lane,
                %error,
                max_restarts = self.restart_counter.max_restarts(),
                "outbound stream failed too often, giving up"
            ),
        }
        decision
    }

    /// Quarantined and unused for longer than `after`, measured at
    /// `now_nanos` ([`peerlane_core::monotonic_nanos`]).
    pub fn is_removable(&self, now_nanos: u64, after: Duration) -> bool {
        let state = self.state();
        if !state.is_current_quarantined() {
            return false;
        }
        let idle = now_nanos.saturating_sub(state.last_used());
        u128::from(idle) > after.as_nanos()
    }

    /// The handshake has not completed within `timeout` of the association
    /// being created, measured at `now_nanos`.
    pub fn is_handshake_expired(&self, now_nanos: u64, timeout: Duration) -> bool {
        if self.associated_with().is_some() {
            return false;
        }
        let waited = now_nanos.saturating_sub(self.created);
        u128::from(waited) > timeout.as_nanos()
    }
}

impl fmt::Debug for Association {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Association")
            .field("local", &self.local)
            .field("remote", &self.remote)
            .field("state", &self.state())
            .field("lanes", &self.lanes)
            .finish()
    }
}
