use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::value::Compressible;

/// Version byte meaning "compression disabled, codes cannot be resolved".
pub const DISABLED_VERSION: u8 = 0xFF;

/// Highest table version; the next version after it is 0.
pub const MAX_VERSION: u8 = 127;

/// Version following `version`, wrapping 127 -> 0.
pub fn next_version(version: u8) -> u8 {
    if version >= MAX_VERSION {
        0
    } else {
        version + 1
    }
}

/// Immutable value-to-code mapping used when encoding.
///
/// Codes are dense, `0..len`, assigned in rank order. `origin_uid` is the
/// system that will encode with the table, i.e. the peer the table was
/// advertised to.
#[derive(Clone)]
pub struct CompressionTable<T> {
    origin_uid: u64,
    version: u8,
    values: Vec<T>,
    dictionary: HashMap<T, u32>,
}

impl<T: Compressible> CompressionTable<T> {
    /// Build a table from values in rank order. Blank and duplicate values
    /// are skipped; codes beyond `u16::MAX` cannot be written to the wire
    /// and are dropped.
    pub fn new(origin_uid: u64, version: u8, ranked: impl IntoIterator<Item = T>) -> Self {
        let mut values = Vec::new();
        let mut dictionary = HashMap::new();
        for value in ranked {
            if value.is_blank() || dictionary.contains_key(&value) {
                continue;
            }
            if values.len() > usize::from(u16::MAX) {
                break;
            }
            dictionary.insert(value.clone(), values.len() as u32);
            values.push(value);
        }

        Self {
            origin_uid,
            version,
            values,
            dictionary,
        }
    }

    pub fn empty(origin_uid: u64, version: u8) -> Self {
        Self {
            origin_uid,
            version,
            values: Vec::new(),
            dictionary: HashMap::new(),
        }
    }

    /// Table that never compresses, tagged with [`DISABLED_VERSION`].
    pub fn disabled() -> Self {
        Self::empty(0, DISABLED_VERSION)
    }

    pub fn origin_uid(&self) -> u64 {
        self.origin_uid
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Values in code order.
    pub fn values(&self) -> &[T] {
        &self.values
    }

    /// Code for `value`, if the table has one. Blank values never have one.
    pub fn compress(&self, value: &T) -> Option<u32> {
        if value.is_blank() {
            return None;
        }
        self.dictionary.get(value).copied()
    }

    /// Decoding side of this table.
    pub fn invert(&self) -> DecompressionTable<T> {
        DecompressionTable {
            origin_uid: self.origin_uid,
            version: self.version,
            values: self.values.clone(),
        }
    }
}

// The dictionary is derived from `values`.
impl<T: PartialEq> PartialEq for CompressionTable<T> {
    fn eq(&self, other: &Self) -> bool {
        self.origin_uid == other.origin_uid
            && self.version == other.version
            && self.values == other.values
    }
}

impl<T: Eq> Eq for CompressionTable<T> {}

impl<T: fmt::Debug> fmt::Debug for CompressionTable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompressionTable")
            .field("origin_uid", &self.origin_uid)
            .field("version", &self.version)
            .field("values", &self.values)
            .finish()
    }
}

#[derive(Serialize)]
struct WireTableRef<'a, T> {
    origin_uid: u64,
    version: u8,
    values: &'a [T],
}

#[derive(Deserialize)]
struct WireTable<T> {
    origin_uid: u64,
    version: u8,
    values: Vec<T>,
}

impl<T: Serialize> Serialize for CompressionTable<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        WireTableRef {
            origin_uid: self.origin_uid,
            version: self.version,
            values: &self.values,
        }
        .serialize(serializer)
    }
}

impl<'de, T> Deserialize<'de> for CompressionTable<T>
where
    T: Compressible + Deserialize<'de>,
{
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let wire = WireTable::<T>::deserialize(deserializer)?;
        Ok(Self::new(wire.origin_uid, wire.version, wire.values))
    }
}

/// Code-to-value mapping used when decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecompressionTable<T> {
    origin_uid: u64,
    version: u8,
    values: Vec<T>,
}

impl<T> DecompressionTable<T> {
    pub fn empty(origin_uid: u64, version: u8) -> Self {
        Self {
            origin_uid,
            version,
            values: Vec::new(),
        }
    }

    pub fn disabled() -> Self {
        Self::empty(0, DISABLED_VERSION)
    }

    pub fn origin_uid(&self) -> u64 {
        self.origin_uid
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn is_disabled(&self) -> bool {
        self.version == DISABLED_VERSION
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, code: u32) -> Option<&T> {
        usize::try_from(code).ok().and_then(|i| self.values.get(i))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ActorRefPath;

    fn paths(values: &[&str]) -> Vec<ActorRefPath> {
        values.iter().map(|v| ActorRefPath::from(*v)).collect()
    }

    #[test]
    fn versions_wrap_at_127() {
        assert_eq!(next_version(0), 1);
        assert_eq!(next_version(126), 127);
        assert_eq!(next_version(127), 0);
    }

    #[test]
    fn codes_follow_rank_and_skip_blanks_and_duplicates() {
        let table = CompressionTable::new(9, 1, paths(&["/user/a", "", "/user/b", "/user/a"]));
        assert_eq!(table.len(), 2);
        assert_eq!(table.compress(&ActorRefPath::from("/user/a")), Some(0));
        assert_eq!(table.compress(&ActorRefPath::from("/user/b")), Some(1));
        assert_eq!(table.compress(&ActorRefPath::from("/user/c")), None);
        assert_eq!(table.compress(&ActorRefPath::from("")), None);
    }

    #[test]
    fn invert_resolves_every_code() {
        let table = CompressionTable::new(9, 4, paths(&["/user/a", "/user/b"]));
        let inverse = table.invert();
        assert_eq!(inverse.version(), 4);
        assert_eq!(inverse.origin_uid(), 9);
        for value in table.values() {
            let code = table.compress(value).unwrap();
            assert_eq!(inverse.get(code), Some(value));
        }
        assert_eq!(inverse.get(2), None);
    }

    #[test]
    fn serializes_as_origin_version_values() {
        let table = CompressionTable::new(9, 3, vec!["Ping".to_string(), "Pong".to_string()]);
        let json = serde_json::to_value(&table).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"origin_uid": 9, "version": 3, "values": ["Ping", "Pong"]})
        );
        let back: CompressionTable<String> = serde_json::from_value(json).unwrap();
        assert_eq!(back, table);
    }

    #[test]
    fn disabled_tables_never_compress() {
        let table = CompressionTable::<String>::disabled();
        assert_eq!(table.version(), DISABLED_VERSION);
        assert_eq!(table.compress(&"Ping".to_string()), None);
        assert!(DecompressionTable::<String>::disabled().is_disabled());
    }
}
