/// Errors raised while resolving compressed envelope fields.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompressionError {
    /// A known table generation has no entry for the code. The two peers
    /// disagree about the table contents.
    #[error("unknown compressed {kind} id {code} in table version {version} from origin {origin_uid}")]
    UnknownCompressedId {
        kind: &'static str,
        origin_uid: u64,
        version: u8,
        code: u32,
    },

    /// Implicit confirmation did not make the advertised table resolvable.
    /// This is an internal consistency failure, not a peer error.
    #[error("inconsistent {kind} tables for origin {origin_uid} at version {version} after {attempts} attempts")]
    InconsistentTables {
        kind: &'static str,
        origin_uid: u64,
        version: u8,
        attempts: u32,
    },
}

pub type Result<T> = std::result::Result<T, CompressionError>;
