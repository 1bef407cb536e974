use std::sync::Arc;

use peerlane_core::Snapshot;
use tracing::debug;

use crate::table::CompressionTable;
use crate::value::{ActorRefPath, ClassManifest, Compressible};

/// Tables a peer advertised to us, used when encoding envelopes for it.
///
/// Readers on the encode path load a snapshot per envelope; advertisements
/// and resets replace the snapshot.
#[derive(Debug)]
pub struct OutboundCompressions {
    actor_refs: Snapshot<CompressionTable<ActorRefPath>>,
    manifests: Snapshot<CompressionTable<ClassManifest>>,
}

impl OutboundCompressions {
    /// Empty tables at version 0: everything is written as literals.
    pub fn new() -> Self {
        Self {
            actor_refs: Snapshot::new(CompressionTable::empty(0, 0)),
            manifests: Snapshot::new(CompressionTable::empty(0, 0)),
        }
    }

    /// Tables tagged with the disabled version.
    pub fn disabled() -> Self {
        Self {
            actor_refs: Snapshot::new(CompressionTable::disabled()),
            manifests: Snapshot::new(CompressionTable::disabled()),
        }
    }

    pub fn actor_ref_table(&self) -> Arc<CompressionTable<ActorRefPath>> {
        self.actor_refs.load()
    }

    pub fn manifest_table(&self) -> Arc<CompressionTable<ClassManifest>> {
        self.manifests.load()
    }

    pub fn apply_actor_ref_table(&self, table: CompressionTable<ActorRefPath>) {
        apply(&self.actor_refs, table);
    }

    pub fn apply_manifest_table(&self, table: CompressionTable<ClassManifest>) {
        apply(&self.manifests, table);
    }

    /// Forget every advertised table, e.g. when the peer restarted.
    pub fn clear(&self) {
        self.actor_refs.store(CompressionTable::empty(0, 0));
        self.manifests.store(CompressionTable::empty(0, 0));
    }
}

impl Default for OutboundCompressions {
    fn default() -> Self {
        Self::new()
    }
}

fn apply<T: Compressible>(slot: &Snapshot<CompressionTable<T>>, table: CompressionTable<T>) {
    debug!(
        kind = T::KIND,
        version = table.version(),
        entries = table.len(),
        "applying outbound compression table"
    );
    slot.store(table);
}
