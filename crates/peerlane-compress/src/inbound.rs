use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use peerlane_core::{Address, Snapshot};
use tracing::{debug, trace, warn};

use crate::detector::HeavyHitterDetector;
use crate::error::{CompressionError, Result};
use crate::settings::{CompressionSettings, TableSettings};
use crate::table::{next_version, CompressionTable, DecompressionTable, DISABLED_VERSION};
use crate::value::{ActorRefPath, ClassManifest, Compressible};

/// Implicit confirmations tried by one `decompress` call before the tables
/// are declared inconsistent.
const MAX_DECOMPRESS_ATTEMPTS: u32 = 2;

/// What the receiving side needs to know about the association of an
/// origin system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssociationStatus {
    pub remote: Address,
    /// Whether the ordinary-message stream to the peer is running.
    pub ordinary_stream_active: bool,
    /// The origin incarnation is quarantined: nothing it sends is delivered
    /// and no tables are advertised to it.
    pub quarantined: bool,
}

/// Link from the receiving side back to the association layer.
pub trait InboundContext {
    /// Status of the association whose handshake produced `origin_uid`, if
    /// any.
    fn association_status(&self, origin_uid: u64) -> Option<AssociationStatus>;

    /// Send an actor-ref table to `remote` over the control lane.
    fn send_actor_ref_advertisement(&self, remote: &Address, table: CompressionTable<ActorRefPath>);

    /// Send a manifest table to `remote` over the control lane.
    fn send_manifest_advertisement(&self, remote: &Address, table: CompressionTable<ClassManifest>);
}

/// Why an advertisement tick did nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The handshake with the origin has not completed.
    NoAssociation,
    /// The ordinary stream to the origin is not running.
    StreamInactive,
    /// No traffic since the last advertisement.
    NoTraffic,
    /// The origin incarnation is quarantined.
    Quarantined,
}

/// Result of one advertisement tick for one origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvertisementOutcome {
    Skipped(SkipReason),
    Advertised { version: u8, entries: usize },
    Resent { version: u8, attempt: u32 },
    GaveUp { version: u8 },
}

/// Table generations for one origin and field kind.
#[derive(Debug, Clone)]
pub struct Tables<T> {
    /// Newest first.
    old: VecDeque<Arc<DecompressionTable<T>>>,
    active: Arc<DecompressionTable<T>>,
    next: Arc<DecompressionTable<T>>,
    advertisement_in_progress: Option<CompressionTable<T>>,
    keep_old_tables: usize,
}

impl<T: Compressible> Tables<T> {
    /// Empty active table at version 0, next generation at version 1.
    pub fn initial(origin_uid: u64, keep_old_tables: usize) -> Self {
        Self {
            old: VecDeque::with_capacity(keep_old_tables + 1),
            active: Arc::new(DecompressionTable::empty(origin_uid, 0)),
            next: Arc::new(DecompressionTable::empty(origin_uid, next_version(0))),
            advertisement_in_progress: None,
            keep_old_tables,
        }
    }

    pub fn active(&self) -> &DecompressionTable<T> {
        &self.active
    }

    pub fn next(&self) -> &DecompressionTable<T> {
        &self.next
    }

    pub fn advertisement_in_progress(&self) -> Option<&CompressionTable<T>> {
        self.advertisement_in_progress.as_ref()
    }

    /// Versions of retained old generations, newest first.
    pub fn old_versions(&self) -> Vec<u8> {
        self.old.iter().map(|table| table.version()).collect()
    }

    /// Active or retained generation for `version`.
    pub fn select_table(&self, version: u8) -> Option<&DecompressionTable<T>> {
        if self.active.version() == version {
            return Some(&self.active);
        }
        self.old
            .iter()
            .find(|table| table.version() == version)
            .map(|table| table.as_ref())
    }

    /// Promote `next` to active, retiring the current active table and
    /// clearing the advertisement marker.
    pub fn start_using_next_table(&self) -> Self {
        let mut old = self.old.clone();
        old.push_front(Arc::clone(&self.active));
        old.truncate(self.keep_old_tables);

        let origin_uid = self.next.origin_uid();
        let following = next_version(self.next.version());
        Self {
            old,
            active: Arc::clone(&self.next),
            next: Arc::new(DecompressionTable::empty(origin_uid, following)),
            advertisement_in_progress: None,
            keep_old_tables: self.keep_old_tables,
        }
    }

    fn with_advertisement(&self, table: &CompressionTable<T>) -> Self {
        Self {
            old: self.old.clone(),
            active: Arc::clone(&self.active),
            next: Arc::new(table.invert()),
            advertisement_in_progress: Some(table.clone()),
            keep_old_tables: self.keep_old_tables,
        }
    }
}

/// Receiving-side compression state for one origin system and field kind.
///
/// Mutating operations take `&mut self` and must be serialized by the
/// owner. `decompress` only needs `&self`: it may implicitly confirm an
/// advertised table, which is published through the tables snapshot.
pub struct InboundCompression<T: Compressible> {
    origin_uid: u64,
    tables: Snapshot<Tables<T>>,
    detector: HeavyHitterDetector<T>,
    alive: AtomicBool,
    resend_count: u32,
    max_resend_count: u32,
}

impl<T: Compressible> InboundCompression<T> {
    pub fn new(
        origin_uid: u64,
        max_entries: usize,
        keep_old_tables: usize,
        max_resend_count: u32,
    ) -> Self {
        Self::with_detector(
            origin_uid,
            HeavyHitterDetector::new(max_entries),
            keep_old_tables,
            max_resend_count,
        )
    }

    pub fn with_detector(
        origin_uid: u64,
        detector: HeavyHitterDetector<T>,
        keep_old_tables: usize,
        max_resend_count: u32,
    ) -> Self {
        Self {
            origin_uid,
            tables: Snapshot::new(Tables::initial(origin_uid, keep_old_tables)),
            detector,
            alive: AtomicBool::new(false),
            resend_count: 0,
            max_resend_count,
        }
    }

    pub fn origin_uid(&self) -> u64 {
        self.origin_uid
    }

    pub fn tables(&self) -> Arc<Tables<T>> {
        self.tables.load()
    }

    /// Whether traffic was seen since the last advertisement.
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    pub fn resend_count(&self) -> u32 {
        self.resend_count
    }

    /// Resolve `code` sent with table `version`.
    ///
    /// `Ok(None)` means the value is not available for this frame: either
    /// compression is disabled or no retained generation matches `version`.
    pub fn decompress(&self, version: u8, code: u32) -> Result<Option<T>> {
        self.decompress_attempt(version, code, 0)
    }

    fn decompress_attempt(&self, version: u8, code: u32, attempt: u32) -> Result<Option<T>> {
        if version == DISABLED_VERSION {
            return Ok(None);
        }

        let tables = self.tables.load();
        if let Some(table) = tables.select_table(version) {
            return match table.get(code) {
                Some(value) => Ok(Some(value.clone())),
                None => Err(CompressionError::UnknownCompressedId {
                    kind: T::KIND,
                    origin_uid: self.origin_uid,
                    version,
                    code,
                }),
            };
        }

        let advertised = tables
            .advertisement_in_progress
            .as_ref()
            .map(CompressionTable::version);
        if advertised == Some(version) {
            if attempt >= MAX_DECOMPRESS_ATTEMPTS {
                return Err(CompressionError::InconsistentTables {
                    kind: T::KIND,
                    origin_uid: self.origin_uid,
                    version,
                    attempts: attempt + 1,
                });
            }
            debug!(
                kind = T::KIND,
                origin_uid = self.origin_uid,
                version,
                "peer started using advertised table, confirming implicitly"
            );
            self.activate_next(version);
            return self.decompress_attempt(version, code, attempt + 1);
        }

        warn!(
            kind = T::KIND,
            origin_uid = self.origin_uid,
            version,
            active = tables.active.version(),
            old = ?tables.old_versions(),
            "no table generation for incoming version"
        );
        Ok(None)
    }

    /// Count an inbound occurrence of `value` from `remote`.
    pub fn increment(&mut self, remote: &Address, value: &T, n: u64) {
        let heavy = self.detector.increment(value, n);
        trace!(kind = T::KIND, %remote, ?value, heavy, "compression hit");
        self.alive.store(true, Ordering::Release);
    }

    /// One tick of the advertisement schedule.
    pub fn run_next_table_advertisement<C>(&mut self, context: &C) -> AdvertisementOutcome
    where
        C: InboundContext + ?Sized,
    {
        let tables = self.tables.load();
        match &tables.advertisement_in_progress {
            None => self.advertise_next_table(&tables, context),
            Some(in_progress) => self.resend_or_give_up(in_progress.clone(), context),
        }
    }

    fn advertise_next_table<C>(&mut self, tables: &Tables<T>, context: &C) -> AdvertisementOutcome
    where
        C: InboundContext + ?Sized,
    {
        let Some(status) = context.association_status(self.origin_uid) else {
            trace!(
                kind = T::KIND,
                origin_uid = self.origin_uid,
                "no association yet, skipping advertisement"
            );
            return AdvertisementOutcome::Skipped(SkipReason::NoAssociation);
        };
        if status.quarantined {
            return AdvertisementOutcome::Skipped(SkipReason::Quarantined);
        }
        if !status.ordinary_stream_active {
            return AdvertisementOutcome::Skipped(SkipReason::StreamInactive);
        }
        if !self.is_alive() {
            trace!(
                kind = T::KIND,
                origin_uid = self.origin_uid,
                "no traffic since last advertisement"
            );
            return AdvertisementOutcome::Skipped(SkipReason::NoTraffic);
        }

        let version = tables.next.version();
        let table = CompressionTable::new(self.origin_uid, version, self.detector.ranked_values());
        self.tables.update(|current| current.with_advertisement(&table));
        self.alive.store(false, Ordering::Release);
        self.resend_count = 0;

        let entries = table.len();
        debug!(
            kind = T::KIND,
            origin_uid = self.origin_uid,
            remote = %status.remote,
            version,
            entries,
            "advertising compression table"
        );
        T::send_advertisement(context, &status.remote, table);
        AdvertisementOutcome::Advertised { version, entries }
    }

    fn resend_or_give_up<C>(
        &mut self,
        in_progress: CompressionTable<T>,
        context: &C,
    ) -> AdvertisementOutcome
    where
        C: InboundContext + ?Sized,
    {
        let version = in_progress.version();
        self.resend_count += 1;

        if self.resend_count > self.max_resend_count {
            debug!(
                kind = T::KIND,
                origin_uid = self.origin_uid,
                version,
                resends = self.max_resend_count,
                "advertisement not acknowledged, giving up"
            );
            self.confirm_advertisement(version, true);
            return AdvertisementOutcome::GaveUp { version };
        }

        let Some(status) = context.association_status(self.origin_uid) else {
            return AdvertisementOutcome::Skipped(SkipReason::NoAssociation);
        };
        if status.quarantined {
            return AdvertisementOutcome::Skipped(SkipReason::Quarantined);
        }
        debug!(
            kind = T::KIND,
            origin_uid = self.origin_uid,
            remote = %status.remote,
            version,
            attempt = self.resend_count,
            "resending compression advertisement"
        );
        T::send_advertisement(context, &status.remote, in_progress);
        AdvertisementOutcome::Resent {
            version,
            attempt: self.resend_count,
        }
    }

    /// Acknowledge the advertisement at `version`, making it the active
    /// table. Giving up activates it as well. Returns `false` for an ack that
    /// does not match the advertisement in progress.
    pub fn confirm_advertisement(&mut self, version: u8, gave_up: bool) -> bool {
        let activated = self.activate_next(version);
        if activated {
            self.resend_count = 0;
            debug!(
                kind = T::KIND,
                origin_uid = self.origin_uid,
                version,
                gave_up,
                "compression table activated"
            );
        }
        activated
    }

    fn activate_next(&self, version: u8) -> bool {
        loop {
            let current = self.tables.load();
            match &current.advertisement_in_progress {
                Some(in_progress) if in_progress.version() == version => {
                    let next = Arc::new(current.start_using_next_table());
                    if self.tables.compare_and_set(&current, next) {
                        return true;
                    }
                }
                Some(in_progress) => {
                    debug!(
                        kind = T::KIND,
                        origin_uid = self.origin_uid,
                        version,
                        in_progress = in_progress.version(),
                        "ignoring confirmation for a different table version"
                    );
                    return false;
                }
                None => {
                    trace!(
                        kind = T::KIND,
                        origin_uid = self.origin_uid,
                        version,
                        "no advertisement in progress"
                    );
                    return false;
                }
            }
        }
    }
}

impl<T: Compressible> fmt::Debug for InboundCompression<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tables = self.tables.load();
        f.debug_struct("InboundCompression")
            .field("kind", &T::KIND)
            .field("origin_uid", &self.origin_uid)
            .field("active", &tables.active.version())
            .field("next", &tables.next.version())
            .field(
                "in_progress",
                &tables.advertisement_in_progress.as_ref().map(|t| t.version()),
            )
            .field("alive", &self.is_alive())
            .field("resend_count", &self.resend_count)
            .finish()
    }
}

/// Receiving-side compression state for every origin system.
///
/// Entries are created on the first recorded hit for an origin and dropped
/// with [`InboundCompressions::close`] when its association goes away.
#[derive(Debug)]
pub struct InboundCompressions {
    settings: CompressionSettings,
    actor_refs: HashMap<u64, InboundCompression<ActorRefPath>>,
    manifests: HashMap<u64, InboundCompression<ClassManifest>>,
}

impl InboundCompressions {
    pub fn new(settings: CompressionSettings) -> Self {
        Self {
            settings,
            actor_refs: HashMap::new(),
            manifests: HashMap::new(),
        }
    }

    pub fn settings(&self) -> &CompressionSettings {
        &self.settings
    }

    pub fn hit_actor_ref(&mut self, origin_uid: u64, remote: &Address, value: &ActorRefPath, n: u64) {
        hit(
            &mut self.actor_refs,
            &self.settings.actor_refs,
            &self.settings,
            origin_uid,
            remote,
            value,
            n,
        );
    }

    pub fn hit_manifest(&mut self, origin_uid: u64, remote: &Address, value: &ClassManifest, n: u64) {
        hit(
            &mut self.manifests,
            &self.settings.manifests,
            &self.settings,
            origin_uid,
            remote,
            value,
            n,
        );
    }

    pub fn decompress_actor_ref(
        &self,
        origin_uid: u64,
        version: u8,
        code: u32,
    ) -> Result<Option<ActorRefPath>> {
        decompress(&self.actor_refs, &self.settings.actor_refs, origin_uid, version, code)
    }

    pub fn decompress_manifest(
        &self,
        origin_uid: u64,
        version: u8,
        code: u32,
    ) -> Result<Option<ClassManifest>> {
        decompress(&self.manifests, &self.settings.manifests, origin_uid, version, code)
    }

    pub fn confirm_actor_ref_advertisement(&mut self, origin_uid: u64, version: u8) -> bool {
        self.actor_refs
            .get_mut(&origin_uid)
            .is_some_and(|compression| compression.confirm_advertisement(version, false))
    }

    pub fn confirm_manifest_advertisement(&mut self, origin_uid: u64, version: u8) -> bool {
        self.manifests
            .get_mut(&origin_uid)
            .is_some_and(|compression| compression.confirm_advertisement(version, false))
    }

    /// Advertisement tick for the actor-ref tables of every origin.
    pub fn run_next_actor_ref_advertisement<C>(&mut self, context: &C) -> Vec<(u64, AdvertisementOutcome)>
    where
        C: InboundContext + ?Sized,
    {
        run_all(&mut self.actor_refs, context)
    }

    /// Advertisement tick for the manifest tables of every origin.
    pub fn run_next_manifest_advertisement<C>(&mut self, context: &C) -> Vec<(u64, AdvertisementOutcome)>
    where
        C: InboundContext + ?Sized,
    {
        run_all(&mut self.manifests, context)
    }

    /// Drop all state for `origin_uid`. Returns `true` if there was any.
    pub fn close(&mut self, origin_uid: u64) -> bool {
        let had_refs = self.actor_refs.remove(&origin_uid).is_some();
        let had_manifests = self.manifests.remove(&origin_uid).is_some();
        if had_refs || had_manifests {
            debug!(origin_uid, "closed inbound compression state");
        }
        had_refs || had_manifests
    }

    /// Origins with compression state, ascending.
    pub fn current_origin_uids(&self) -> Vec<u64> {
        let mut uids: Vec<u64> = self
            .actor_refs
            .keys()
            .chain(self.manifests.keys())
            .copied()
            .collect();
        uids.sort_unstable();
        uids.dedup();
        uids
    }

    pub fn actor_ref_compression(&self, origin_uid: u64) -> Option<&InboundCompression<ActorRefPath>> {
        self.actor_refs.get(&origin_uid)
    }

    pub fn manifest_compression(&self, origin_uid: u64) -> Option<&InboundCompression<ClassManifest>> {
        self.manifests.get(&origin_uid)
    }
}

fn hit<T: Compressible>(
    compressions: &mut HashMap<u64, InboundCompression<T>>,
    table: &TableSettings,
    settings: &CompressionSettings,
    origin_uid: u64,
    remote: &Address,
    value: &T,
    n: u64,
) {
    if !table.is_enabled() {
        return;
    }
    compressions
        .entry(origin_uid)
        .or_insert_with(|| {
            debug!(kind = T::KIND, origin_uid, %remote, "creating inbound compression state");
            InboundCompression::new(
                origin_uid,
                table.max,
                settings.keep_old_tables,
                settings.max_resend_count,
            )
        })
        .increment(remote, value, n);
}

fn decompress<T: Compressible>(
    compressions: &HashMap<u64, InboundCompression<T>>,
    table: &TableSettings,
    origin_uid: u64,
    version: u8,
    code: u32,
) -> Result<Option<T>> {
    if !table.is_enabled() || version == DISABLED_VERSION {
        return Ok(None);
    }
    match compressions.get(&origin_uid) {
        Some(compression) => compression.decompress(version, code),
        None => {
            debug!(
                kind = T::KIND,
                origin_uid,
                version,
                code,
                "compressed value from origin without compression state"
            );
            Ok(None)
        }
    }
}

fn run_all<T, C>(
    compressions: &mut HashMap<u64, InboundCompression<T>>,
    context: &C,
) -> Vec<(u64, AdvertisementOutcome)>
where
    T: Compressible,
    C: InboundContext + ?Sized,
{
    let mut outcomes: Vec<_> = compressions
        .iter_mut()
        .map(|(uid, compression)| (*uid, compression.run_next_table_advertisement(context)))
        .collect();
    outcomes.sort_unstable_by_key(|(uid, _)| *uid);
    outcomes
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;

    struct TestContext {
        status: Option<AssociationStatus>,
        actor_refs: RefCell<Vec<CompressionTable<ActorRefPath>>>,
        manifests: RefCell<Vec<CompressionTable<ClassManifest>>>,
    }

    impl TestContext {
        fn associated() -> Self {
            Self {
                status: Some(AssociationStatus {
                    remote: remote(),
                    ordinary_stream_active: true,
                    quarantined: false,
                }),
                actor_refs: RefCell::new(Vec::new()),
                manifests: RefCell::new(Vec::new()),
            }
        }

        fn unassociated() -> Self {
            Self {
                status: None,
                ..Self::associated()
            }
        }
    }

    impl InboundContext for TestContext {
        fn association_status(&self, _origin_uid: u64) -> Option<AssociationStatus> {
            self.status.clone()
        }

        fn send_actor_ref_advertisement(&self, _remote: &Address, table: CompressionTable<ActorRefPath>) {
            self.actor_refs.borrow_mut().push(table);
        }

        fn send_manifest_advertisement(&self, _remote: &Address, table: CompressionTable<ClassManifest>) {
            self.manifests.borrow_mut().push(table);
        }
    }

    fn remote() -> Address {
        Address::new("remote", "10.0.0.2", 25520)
    }

    fn path(value: &str) -> ActorRefPath {
        ActorRefPath::from(value)
    }

    fn compression() -> InboundCompression<ActorRefPath> {
        InboundCompression::new(42, 16, 3, 3)
    }

    fn rotate(compression: &mut InboundCompression<ActorRefPath>, context: &TestContext) -> u8 {
        compression.increment(&remote(), &path("/user/a"), 1);
        let AdvertisementOutcome::Advertised { version, .. } =
            compression.run_next_table_advertisement(context)
        else {
            panic!("expected an advertisement");
        };
        assert!(compression.confirm_advertisement(version, false));
        version
    }

    #[test]
    fn no_advertisement_without_association_stream_or_traffic() {
        let mut compression = compression();
        compression.increment(&remote(), &path("/user/a"), 1);
        assert_eq!(
            compression.run_next_table_advertisement(&TestContext::unassociated()),
            AdvertisementOutcome::Skipped(SkipReason::NoAssociation)
        );

        let mut inactive = TestContext::associated();
        if let Some(status) = inactive.status.as_mut() {
            status.ordinary_stream_active = false;
        }
        assert_eq!(
            compression.run_next_table_advertisement(&inactive),
            AdvertisementOutcome::Skipped(SkipReason::StreamInactive)
        );

        let mut quiet = InboundCompression::<ActorRefPath>::new(42, 16, 3, 3);
        assert_eq!(
            quiet.run_next_table_advertisement(&TestContext::associated()),
            AdvertisementOutcome::Skipped(SkipReason::NoTraffic)
        );
    }

    #[test]
    fn quarantined_origin_gets_no_advertisements() {
        let mut quarantined = TestContext::associated();
        if let Some(status) = quarantined.status.as_mut() {
            status.quarantined = true;
        }

        let mut compression = compression();
        compression.increment(&remote(), &path("/user/a"), 1);
        assert_eq!(
            compression.run_next_table_advertisement(&quarantined),
            AdvertisementOutcome::Skipped(SkipReason::Quarantined)
        );

        // An advertisement already in flight is not resent either.
        assert!(matches!(
            compression.run_next_table_advertisement(&TestContext::associated()),
            AdvertisementOutcome::Advertised { .. }
        ));
        assert_eq!(
            compression.run_next_table_advertisement(&quarantined),
            AdvertisementOutcome::Skipped(SkipReason::Quarantined)
        );
        assert!(quarantined.actor_refs.borrow().is_empty());
    }

    #[test]
    fn advertisement_prepares_next_table_and_resets_liveness() {
        let context = TestContext::associated();
        let mut compression = compression();
        compression.increment(&remote(), &path("/user/a"), 5);
        compression.increment(&remote(), &path("/user/b"), 1);

        assert_eq!(
            compression.run_next_table_advertisement(&context),
            AdvertisementOutcome::Advertised { version: 1, entries: 2 }
        );
        assert!(!compression.is_alive());

        let sent = context.actor_refs.borrow();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].version(), 1);
        assert_eq!(sent[0].origin_uid(), 42);
        assert_eq!(sent[0].compress(&path("/user/a")), Some(0));

        let tables = compression.tables();
        assert_eq!(tables.active().version(), 0);
        assert_eq!(tables.next().version(), 1);
        assert_eq!(tables.next().get(0), Some(&path("/user/a")));
    }

    #[test]
    fn explicit_confirmation_activates_table() {
        let context = TestContext::associated();
        let mut compression = compression();
        let version = rotate(&mut compression, &context);

        let tables = compression.tables();
        assert_eq!(tables.active().version(), version);
        assert_eq!(tables.next().version(), version + 1);
        assert!(tables.advertisement_in_progress().is_none());
        assert_eq!(tables.old_versions(), vec![0]);
        assert_eq!(compression.decompress(version, 0).unwrap(), Some(path("/user/a")));
    }

    #[test]
    fn first_frame_with_advertised_version_confirms_implicitly() {
        let context = TestContext::associated();
        let mut compression = compression();
        compression.increment(&remote(), &path("/user/a"), 1);
        compression.run_next_table_advertisement(&context);

        assert_eq!(compression.decompress(1, 0).unwrap(), Some(path("/user/a")));
        assert_eq!(compression.tables().active().version(), 1);
        assert!(compression.tables().advertisement_in_progress().is_none());

        // The late explicit ack is now a no-op.
        assert!(!compression.confirm_advertisement(1, false));
    }

    #[test]
    fn mismatched_ack_is_ignored() {
        let context = TestContext::associated();
        let mut compression = compression();
        compression.increment(&remote(), &path("/user/a"), 1);
        compression.run_next_table_advertisement(&context);

        assert!(!compression.confirm_advertisement(7, false));
        let tables = compression.tables();
        assert_eq!(tables.active().version(), 0);
        assert_eq!(
            tables.advertisement_in_progress().map(CompressionTable::version),
            Some(1)
        );
    }

    #[test]
    fn gives_up_after_max_resends() {
        let context = TestContext::associated();
        let mut compression = compression();
        compression.increment(&remote(), &path("/user/a"), 1);
        compression.run_next_table_advertisement(&context);

        for attempt in 1..=3 {
            assert_eq!(
                compression.run_next_table_advertisement(&context),
                AdvertisementOutcome::Resent { version: 1, attempt }
            );
        }
        assert_eq!(
            compression.run_next_table_advertisement(&context),
            AdvertisementOutcome::GaveUp { version: 1 }
        );
        assert_eq!(context.actor_refs.borrow().len(), 4);

        let tables = compression.tables();
        assert!(tables.advertisement_in_progress().is_none());
        assert_eq!(tables.active().version(), 1);
        assert_eq!(compression.resend_count(), 0);
    }

    #[test]
    fn retains_only_keep_old_tables_generations() {
        let context = TestContext::associated();
        let mut compression = compression();
        for _ in 0..4 {
            rotate(&mut compression, &context);
        }

        let tables = compression.tables();
        assert_eq!(tables.active().version(), 4);
        assert_eq!(tables.old_versions(), vec![3, 2, 1]);

        assert_eq!(compression.decompress(1, 0).unwrap(), Some(path("/user/a")));
        assert_eq!(compression.decompress(0, 0).unwrap(), None);
    }

    #[test]
    fn unknown_code_in_known_generation_is_an_error() {
        let context = TestContext::associated();
        let mut compression = compression();
        let version = rotate(&mut compression, &context);

        assert_eq!(
            compression.decompress(version, 9),
            Err(CompressionError::UnknownCompressedId {
                kind: "actor-ref",
                origin_uid: 42,
                version,
                code: 9,
            })
        );
    }

    #[test]
    fn disabled_version_is_never_resolved() {
        let compression = compression();
        assert_eq!(compression.decompress(DISABLED_VERSION, 0).unwrap(), None);
    }

    #[test]
    fn versions_wrap_after_127() {
        let mut tables = Tables::<ActorRefPath>::initial(1, 3);
        for _ in 0..127 {
            tables = tables.start_using_next_table();
        }
        assert_eq!(tables.active().version(), 127);
        assert_eq!(tables.next().version(), 0);
        tables = tables.start_using_next_table();
        assert_eq!(tables.active().version(), 0);
        assert_eq!(tables.old_versions(), vec![127, 126, 125]);
    }

    #[test]
    fn registry_creates_state_lazily_and_closes_it() {
        let mut compressions = InboundCompressions::new(CompressionSettings::default());
        assert!(compressions.current_origin_uids().is_empty());

        compressions.hit_actor_ref(7, &remote(), &path("/user/a"), 1);
        compressions.hit_manifest(9, &remote(), &"Ping".to_string(), 1);
        assert_eq!(compressions.current_origin_uids(), vec![7, 9]);

        let context = TestContext::associated();
        let outcomes = compressions.run_next_actor_ref_advertisement(&context);
        assert_eq!(
            outcomes,
            vec![(7, AdvertisementOutcome::Advertised { version: 1, entries: 1 })]
        );
        compressions.run_next_manifest_advertisement(&context);
        assert_eq!(context.manifests.borrow().len(), 1);

        assert!(compressions.confirm_actor_ref_advertisement(7, 1));
        assert_eq!(
            compressions.decompress_actor_ref(7, 1, 0).unwrap(),
            Some(path("/user/a"))
        );

        assert!(compressions.close(7));
        assert!(!compressions.close(7));
        assert_eq!(compressions.decompress_actor_ref(7, 1, 0).unwrap(), None);
        assert_eq!(compressions.current_origin_uids(), vec![9]);
    }

    #[test]
    fn disabled_kind_ignores_hits() {
        let mut settings = CompressionSettings::default();
        settings.manifests.max = 0;
        let mut compressions = InboundCompressions::new(settings);

        compressions.hit_manifest(7, &remote(), &"Ping".to_string(), 10);
        assert!(compressions.manifest_compression(7).is_none());
        assert_eq!(compressions.decompress_manifest(7, 1, 0).unwrap(), None);
    }
}
