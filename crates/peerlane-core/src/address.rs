use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AddressError;

/// Protocol scheme used in rendered addresses.
pub const DEFAULT_PROTOCOL: &str = "peerlane";

/// Location of a remote actor system: `protocol://system@host:port`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address {
    pub protocol: String,
    pub system: String,
    pub host: String,
    pub port: u16,
}

impl Address {
    /// Create an address using the default protocol scheme.
    pub fn new(system: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            protocol: DEFAULT_PROTOCOL.to_string(),
            system: system.into(),
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}://{}@{}:{}",
            self.protocol, self.system, self.host, self.port
        )
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| AddressError::Invalid {
            input: input.to_string(),
            reason: reason.to_string(),
        };

        let (protocol, rest) = input
            .split_once("://")
            .ok_or_else(|| invalid("missing '://'"))?;
        let (system, host_port) = rest
            .split_once('@')
            .ok_or_else(|| invalid("missing '@' between system and host"))?;
        let (host, port) = host_port
            .rsplit_once(':')
            .ok_or_else(|| invalid("missing ':' before port"))?;

        if protocol.is_empty() || system.is_empty() || host.is_empty() {
            return Err(invalid("protocol, system and host must not be empty"));
        }

        let port = port.parse::<u16>().map_err(|_| AddressError::InvalidPort {
            input: input.to_string(),
            port: port.to_string(),
        })?;

        Ok(Self {
            protocol: protocol.to_string(),
            system: system.to_string(),
            host: host.to_string(),
            port,
        })
    }
}

/// One incarnation of a remote actor system.
///
/// The `uid` is chosen randomly by the remote system at startup, so a restart
/// on the same host and port yields a different `UniqueAddress`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UniqueAddress {
    pub address: Address,
    pub uid: u64,
}

impl UniqueAddress {
    pub fn new(address: Address, uid: u64) -> Self {
        Self { address, uid }
    }
}

impl fmt::Display for UniqueAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.address, self.uid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_and_parse_roundtrip() {
        let addr = Address::new("sys", "10.0.0.1", 25520);
        let rendered = addr.to_string();
        assert_eq!(rendered, "peerlane://sys@10.0.0.1:25520");
        assert_eq!(rendered.parse::<Address>().unwrap(), addr);
    }

    #[test]
    fn parse_rejects_missing_parts() {
        assert!(matches!(
            "sys@host:1".parse::<Address>(),
            Err(AddressError::Invalid { .. })
        ));
        assert!(matches!(
            "peerlane://host:1".parse::<Address>(),
            Err(AddressError::Invalid { .. })
        ));
        assert!(matches!(
            "peerlane://sys@:1".parse::<Address>(),
            Err(AddressError::Invalid { .. })
        ));
    }

    #[test]
    fn parse_rejects_out_of_range_port() {
        let err = "peerlane://sys@host:70000".parse::<Address>().unwrap_err();
        assert!(matches!(err, AddressError::InvalidPort { port, .. } if port == "70000"));
    }

    #[test]
    fn unique_address_display_includes_uid() {
        let unique = UniqueAddress::new(Address::new("sys", "host", 1), 42);
        assert_eq!(unique.to_string(), "peerlane://sys@host:1#42");
    }

    #[test]
    fn serde_roundtrip() {
        let unique = UniqueAddress::new(Address::new("sys", "host", 2552), 7);
        let json = serde_json::to_string(&unique).unwrap();
        let back: UniqueAddress = serde_json::from_str(&json).unwrap();
        assert_eq!(back, unique);
    }
}
