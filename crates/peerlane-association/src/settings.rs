use std::path::Path;
use std::time::Duration;

use peerlane_codec::{CodecConfig, DEFAULT_MAX_FRAME_SIZE, PROTOCOL_VERSION};
use peerlane_compress::{CompressionSettings, TableSettings, MAX_VERSION};
use peerlane_core::duration::serde_duration;
use peerlane_core::{Address, UniqueAddress};
use serde::{Deserialize, Serialize};

use crate::error::SettingsError;

const MIN_FRAME_SIZE: usize = 1024;
const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;
const MAX_TABLE_ENTRIES: usize = 65_535;

/// Top-level transport settings.
///
/// Every field has a default, so an empty JSON object is a valid document.
/// Call [`Settings::validate`] (or load through [`Settings::from_json`] /
/// [`Settings::from_path`], which validate) before use.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct Settings {
    pub canonical: CanonicalSettings,
    pub protocol: ProtocolSettings,
    pub lanes: LaneSettings,
    pub restart: RestartSettings,
    pub compression: CompressionSettings,
    pub association: AssociationSettings,
}

/// The address this system advertises to peers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct CanonicalSettings {
    pub system_name: String,
    pub hostname: String,
    /// Kept wider than `u16` so an out-of-range port is reported by
    /// validation with the key name.
    pub port: u32,
}

impl Default for CanonicalSettings {
    fn default() -> Self {
        Self {
            system_name: "peerlane".to_string(),
            hostname: "localhost".to_string(),
            port: 25520,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct ProtocolSettings {
    pub version: u8,
    pub highest_supported_version: u8,
    pub maximum_frame_size: usize,
    pub buffer_pool_size: usize,
}

impl Default for ProtocolSettings {
    fn default() -> Self {
        Self {
            version: PROTOCOL_VERSION,
            highest_supported_version: PROTOCOL_VERSION,
            maximum_frame_size: DEFAULT_MAX_FRAME_SIZE,
            buffer_pool_size: 16,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct LaneSettings {
    pub outbound_lanes: usize,
    pub outbound_message_queue_size: usize,
    pub outbound_control_queue_size: usize,
    pub outbound_large_message_queue_size: usize,
    /// Recipient path patterns routed to the large-message lane. `*` matches
    /// one path element, a trailing `**` matches the rest of the path.
    pub large_message_destinations: Vec<String>,
}

impl Default for LaneSettings {
    fn default() -> Self {
        Self {
            outbound_lanes: 1,
            outbound_message_queue_size: 3072,
            outbound_control_queue_size: 20_000,
            outbound_large_message_queue_size: 256,
            large_message_destinations: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct RestartSettings {
    pub inbound_max_restarts: u32,
    #[serde(with = "serde_duration")]
    pub inbound_restart_timeout: Duration,
    pub outbound_max_restarts: u32,
    #[serde(with = "serde_duration")]
    pub outbound_restart_timeout: Duration,
}

impl Default for RestartSettings {
    fn default() -> Self {
        Self {
            inbound_max_restarts: 5,
            inbound_restart_timeout: Duration::from_secs(5),
            outbound_max_restarts: 5,
            outbound_restart_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct AssociationSettings {
    #[serde(with = "serde_duration")]
    pub handshake_timeout: Duration,
    #[serde(with = "serde_duration")]
    pub remove_quarantined_association_after: Duration,
}

impl Default for AssociationSettings {
    fn default() -> Self {
        Self {
            handshake_timeout: Duration::from_secs(20),
            remove_quarantined_association_after: Duration::from_secs(3600),
        }
    }
}

impl Settings {
    /// Parse and validate a JSON settings document.
    pub fn from_json(json: &str) -> Result<Self, SettingsError> {
        let settings: Settings = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Read, parse and validate a JSON settings file.
    pub fn from_path(path: &Path) -> Result<Self, SettingsError> {
        let json = std::fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json)
    }

    /// Check every value against its allowed range.
    pub fn validate(&self) -> Result<(), SettingsError> {
        let canonical = &self.canonical;
        ensure(
            !canonical.system_name.is_empty(),
            "canonical.system-name",
            "must not be empty",
        )?;
        ensure(
            !canonical.hostname.is_empty(),
            "canonical.hostname",
            "must not be empty",
        )?;
        ensure(
            canonical.port <= u32::from(u16::MAX),
            "canonical.port",
            format!("{} is not in 0..=65535", canonical.port),
        )?;

        let protocol = &self.protocol;
        ensure(
            protocol.highest_supported_version < MAX_VERSION,
            "protocol.highest-supported-version",
            format!("must be below {MAX_VERSION}"),
        )?;
        ensure(
            protocol.version <= protocol.highest_supported_version,
            "protocol.version",
            format!(
                "{} exceeds highest-supported-version {}",
                protocol.version, protocol.highest_supported_version
            ),
        )?;
        ensure(
            (MIN_FRAME_SIZE..=MAX_FRAME_SIZE).contains(&protocol.maximum_frame_size),
            "protocol.maximum-frame-size",
            format!("{} is not in 1 KiB..=16 MiB", protocol.maximum_frame_size),
        )?;
        ensure(
            protocol.buffer_pool_size >= 1,
            "protocol.buffer-pool-size",
            "must be at least 1",
        )?;

        let lanes = &self.lanes;
        ensure(lanes.outbound_lanes >= 1, "lanes.outbound-lanes", "must be at least 1")?;
        ensure(
            lanes.outbound_message_queue_size >= 1,
            "lanes.outbound-message-queue-size",
            "must be at least 1",
        )?;
        ensure(
            lanes.outbound_control_queue_size >= 1,
            "lanes.outbound-control-queue-size",
            "must be at least 1",
        )?;
        ensure(
            lanes.outbound_large_message_queue_size >= 1,
            "lanes.outbound-large-message-queue-size",
            "must be at least 1",
        )?;
        if let Some(pattern) = lanes
            .large_message_destinations
            .iter()
            .find(|pattern| !pattern.starts_with('/'))
        {
            return Err(SettingsError::Invalid {
                key: "lanes.large-message-destinations",
                reason: format!("pattern {pattern:?} must start with '/'"),
            });
        }

        let restart = &self.restart;
        ensure(
            restart.inbound_max_restarts >= 1,
            "restart.inbound-max-restarts",
            "must be at least 1",
        )?;
        ensure(
            !restart.inbound_restart_timeout.is_zero(),
            "restart.inbound-restart-timeout",
            "must be greater than zero",
        )?;
        ensure(
            restart.outbound_max_restarts >= 1,
            "restart.outbound-max-restarts",
            "must be at least 1",
        )?;
        ensure(
            !restart.outbound_restart_timeout.is_zero(),
            "restart.outbound-restart-timeout",
            "must be greater than zero",
        )?;

        let compression = &self.compression;
        validate_table(
            &compression.actor_refs,
            "compression.actor-refs.max",
            "compression.actor-refs.advertisement-interval",
        )?;
        validate_table(
            &compression.manifests,
            "compression.manifests.max",
            "compression.manifests.advertisement-interval",
        )?;
        ensure(
            compression.keep_old_tables >= 1,
            "compression.keep-old-tables",
            "must be at least 1",
        )?;
        ensure(
            compression.max_resend_count >= 1,
            "compression.max-resend-count",
            "must be at least 1",
        )?;
        ensure(
            compression.hit_sample_interval.is_power_of_two(),
            "compression.hit-sample-interval",
            format!("{} is not a power of two", compression.hit_sample_interval),
        )?;

        let association = &self.association;
        ensure(
            !association.handshake_timeout.is_zero(),
            "association.handshake-timeout",
            "must be greater than zero",
        )?;
        ensure(
            !association.remove_quarantined_association_after.is_zero(),
            "association.remove-quarantined-association-after",
            "must be greater than zero",
        )?;

        Ok(())
    }

    /// The canonical address of this system.
    ///
    /// Only meaningful on validated settings; an out-of-range port saturates.
    pub fn canonical_address(&self) -> Address {
        let port = u16::try_from(self.canonical.port).unwrap_or(u16::MAX);
        Address::new(
            self.canonical.system_name.clone(),
            self.canonical.hostname.clone(),
            port,
        )
    }

    /// The canonical address combined with this incarnation's uid.
    pub fn unique_address(&self, uid: u64) -> UniqueAddress {
        UniqueAddress::new(self.canonical_address(), uid)
    }

    /// Codec settings derived from the protocol section.
    pub fn codec_config(&self) -> CodecConfig {
        CodecConfig {
            protocol_version: self.protocol.version,
            highest_supported_version: self.protocol.highest_supported_version,
            maximum_frame_size: self.protocol.maximum_frame_size,
            buffer_pool_size: self.protocol.buffer_pool_size,
        }
    }
}

fn validate_table(
    table: &TableSettings,
    max_key: &'static str,
    interval_key: &'static str,
) -> Result<(), SettingsError> {
    ensure(
        table.max <= MAX_TABLE_ENTRIES,
        max_key,
        format!("{} exceeds {MAX_TABLE_ENTRIES}", table.max),
    )?;
    ensure(
        !table.advertisement_interval.is_zero(),
        interval_key,
        "must be greater than zero",
    )
}

fn ensure(
    condition: bool,
    key: &'static str,
    reason: impl Into<String>,
) -> Result<(), SettingsError> {
    if condition {
        Ok(())
    } else {
        Err(SettingsError::Invalid {
            key,
            reason: reason.into(),
        })
    }
}
