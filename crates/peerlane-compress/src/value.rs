use std::fmt;
use std::hash::Hash;

use peerlane_core::Address;
use serde::{Deserialize, Serialize};

use crate::inbound::InboundContext;
use crate::table::CompressionTable;

/// A value that can be replaced by a code in an envelope header.
pub trait Compressible: Clone + Eq + Hash + fmt::Debug + Send + Sync + 'static {
    /// Field name used in logs and errors.
    const KIND: &'static str;

    /// Blank values are never counted or compressed.
    fn is_blank(&self) -> bool;

    /// Build a value from a decoded literal.
    fn from_literal(literal: &str) -> Self;

    /// Literal form written to the wire.
    fn as_literal(&self) -> &str;

    /// Hand `table` to the peer at `remote` through `context`.
    fn send_advertisement<C>(context: &C, remote: &Address, table: CompressionTable<Self>)
    where
        C: InboundContext + ?Sized;
}

/// Path of an actor, e.g. `/user/orders/worker-1`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActorRefPath(String);

impl ActorRefPath {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Non-empty path segments.
    pub fn elements(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|segment| !segment.is_empty())
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for ActorRefPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ActorRefPath {
    fn from(path: &str) -> Self {
        Self::new(path)
    }
}

impl From<String> for ActorRefPath {
    fn from(path: String) -> Self {
        Self(path)
    }
}

impl Compressible for ActorRefPath {
    const KIND: &'static str = "actor-ref";

    fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }

    fn from_literal(literal: &str) -> Self {
        Self::new(literal)
    }

    fn as_literal(&self) -> &str {
        &self.0
    }

    fn send_advertisement<C>(context: &C, remote: &Address, table: CompressionTable<Self>)
    where
        C: InboundContext + ?Sized,
    {
        context.send_actor_ref_advertisement(remote, table);
    }
}

/// Serializer-specific type hint carried next to the payload.
pub type ClassManifest = String;

impl Compressible for ClassManifest {
    const KIND: &'static str = "manifest";

    fn is_blank(&self) -> bool {
        self.trim().is_empty()
    }

    fn from_literal(literal: &str) -> Self {
        literal.to_string()
    }

    fn as_literal(&self) -> &str {
        self
    }

    fn send_advertisement<C>(context: &C, remote: &Address, table: CompressionTable<Self>)
    where
        C: InboundContext + ?Sized,
    {
        context.send_manifest_advertisement(remote, table);
    }
}
