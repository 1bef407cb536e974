use std::time::Duration;

use peerlane_core::duration::serde_duration;
use serde::{Deserialize, Serialize};

/// Limits for one compressible field kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct TableSettings {
    /// Maximum number of entries in an advertised table. Zero disables
    /// compression for the field kind.
    pub max: usize,
    /// How often the scheduler should run the advertisement tick.
    #[serde(with = "serde_duration")]
    pub advertisement_interval: Duration,
}

impl TableSettings {
    pub fn is_enabled(&self) -> bool {
        self.max > 0
    }
}

impl Default for TableSettings {
    fn default() -> Self {
        Self {
            max: 256,
            advertisement_interval: Duration::from_secs(60),
        }
    }
}

/// Compression settings shared by both field kinds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct CompressionSettings {
    pub actor_refs: TableSettings,
    pub manifests: TableSettings,
    /// Table generations retained after rotation.
    pub keep_old_tables: usize,
    /// Resends of an unacknowledged advertisement before giving up.
    pub max_resend_count: u32,
    /// Every n-th inbound message feeds the heavy-hitter detectors. Must be
    /// a power of two.
    pub hit_sample_interval: u32,
}

impl Default for CompressionSettings {
    fn default() -> Self {
        Self {
            actor_refs: TableSettings::default(),
            manifests: TableSettings::default(),
            keep_old_tables: 3,
            max_resend_count: 3,
            hit_sample_interval: 256,
        }
    }
}
