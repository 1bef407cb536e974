use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use peerlane_core::{monotonic_nanos, KillSwitch, Snapshot, UniqueAddress};
use tracing::debug;

/// Callback run once when the remote address of an incarnation becomes known.
pub type AddressListener = Arc<dyn Fn(&UniqueAddress) + Send + Sync>;

/// When an incarnation was quarantined, in [`monotonic_nanos`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuarantinedTimestamp {
    pub nanos: u64,
}

/// One-shot latch for the remote address.
///
/// Listeners registered while pending are drained by whichever CAS moves
/// the latch to `Completed`.
#[derive(Clone)]
enum AddressLatch {
    Pending(Vec<AddressListener>),
    Completed(UniqueAddress),
}

/// The state of an association for one incarnation of the remote system.
///
/// Values are immutable apart from the `last_used` timestamp and the address
/// latch; transitions build a new state which the owning association
/// installs by compare-and-set. States derived within one incarnation share
/// the latch.
pub struct AssociationState {
    incarnation: u32,
    last_used: AtomicU64,
    quarantined: Arc<HashMap<u64, QuarantinedTimestamp>>,
    unique_remote_address: Arc<Snapshot<AddressLatch>>,
    control_idle_kill_switch: Option<Arc<KillSwitch>>,
}

impl AssociationState {
    /// Initial state: incarnation 1, nothing quarantined, address unknown.
    pub fn new() -> Self {
        Self {
            incarnation: 1,
            last_used: AtomicU64::new(monotonic_nanos()),
            quarantined: Arc::new(HashMap::new()),
            unique_remote_address: Arc::new(Snapshot::new(AddressLatch::Pending(Vec::new()))),
            control_idle_kill_switch: None,
        }
    }

    pub fn incarnation(&self) -> u32 {
        self.incarnation
    }

    pub fn last_used(&self) -> u64 {
        self.last_used.load(Ordering::Relaxed)
    }

    /// Record traffic.
    pub fn touch(&self) {
        self.last_used.store(monotonic_nanos(), Ordering::Relaxed);
    }

    pub fn quarantined(&self) -> &HashMap<u64, QuarantinedTimestamp> {
        &self.quarantined
    }

    pub fn is_quarantined(&self, uid: u64) -> bool {
        self.quarantined.contains_key(&uid)
    }

    /// Whether the current incarnation is quarantined.
    pub fn is_current_quarantined(&self) -> bool {
        self.unique_remote_address()
            .is_some_and(|peer| self.is_quarantined(peer.uid))
    }

    /// The remote incarnation, once the handshake completed.
    pub fn unique_remote_address(&self) -> Option<UniqueAddress> {
        match &*self.unique_remote_address.load() {
            AddressLatch::Completed(peer) => Some(peer.clone()),
            AddressLatch::Pending(_) => None,
        }
    }

    /// Complete the address latch and run the pending listeners.
    ///
    /// Returns `false` if the latch was already completed; the first value
    /// wins and listeners never run twice.
    pub fn complete_unique_remote_address(&self, peer: UniqueAddress) -> bool {
        loop {
            let current = self.unique_remote_address.load();
            let listeners = match &*current {
                AddressLatch::Completed(_) => return false,
                AddressLatch::Pending(listeners) => listeners.clone(),
            };
            let completed = Arc::new(AddressLatch::Completed(peer.clone()));
            if self.unique_remote_address.compare_and_set(&current, completed) {
                debug!(
                    peer = %peer,
                    listeners = listeners.len(),
                    "remote address completed"
                );
                for listener in listeners.iter() {
                    listener(&peer);
                }
                return true;
            }
        }
    }

    /// Run `listener` once the remote address is known; immediately if it
    /// already is.
    pub fn add_unique_remote_address_listener(&self, listener: AddressListener) {
        loop {
            let current = self.unique_remote_address.load();
            match &*current {
                AddressLatch::Completed(peer) => {
                    listener(peer);
                    return;
                }
                AddressLatch::Pending(listeners) => {
                    let mut next = Vec::with_capacity(listeners.len() + 1);
                    next.extend(listeners.iter().cloned());
                    next.push(Arc::clone(&listener));
                    if self
                        .unique_remote_address
                        .compare_and_set(&current, Arc::new(AddressLatch::Pending(next)))
                    {
                        return;
                    }
                }
            }
        }
    }

    /// State for a new incarnation of the remote system, already associated
    /// with `remote`. The quarantine history and kill switch carry over.
    pub fn new_incarnation(&self, remote: UniqueAddress) -> Self {
        Self {
            incarnation: self.incarnation.wrapping_add(1),
            last_used: AtomicU64::new(monotonic_nanos()),
            quarantined: Arc::clone(&self.quarantined),
            unique_remote_address: Arc::new(Snapshot::new(AddressLatch::Completed(remote))),
            control_idle_kill_switch: self.control_idle_kill_switch.clone(),
        }
    }

    /// State with the current remote incarnation quarantined.
    ///
    /// `None` if the remote address is not known yet.
    pub fn new_quarantined(&self) -> Option<Self> {
        let peer = self.unique_remote_address()?;
        let now = monotonic_nanos();
        let mut quarantined = HashMap::clone(&self.quarantined);
        quarantined.insert(peer.uid, QuarantinedTimestamp { nanos: now });
        Some(Self {
            incarnation: self.incarnation,
            last_used: AtomicU64::new(now),
            quarantined: Arc::new(quarantined),
            unique_remote_address: Arc::clone(&self.unique_remote_address),
            control_idle_kill_switch: self.control_idle_kill_switch.clone(),
        })
    }

    pub fn control_idle_kill_switch(&self) -> Option<&Arc<KillSwitch>> {
        self.control_idle_kill_switch.as_ref()
    }

    pub fn with_control_idle_kill_switch(&self, kill_switch: Option<Arc<KillSwitch>>) -> Self {
        Self {
            incarnation: self.incarnation,
            last_used: AtomicU64::new(self.last_used()),
            quarantined: Arc::clone(&self.quarantined),
            unique_remote_address: Arc::clone(&self.unique_remote_address),
            control_idle_kill_switch: kill_switch,
        }
    }
}

impl Default for AssociationState {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for AssociationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssociationState")
            .field("incarnation", &self.incarnation)
            .field("unique_remote_address", &self.unique_remote_address())
            .field("quarantined", &self.quarantined.keys().collect::<Vec<_>>())
            .field("last_used", &self.last_used())
            .finish()
    }
}
