/// Errors that can occur while parsing an actor system address.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressError {
    /// The address string does not have the `protocol://system@host:port` shape.
    #[error("invalid address '{input}': {reason}")]
    Invalid { input: String, reason: String },

    /// The port component is not a number in 0..=65535.
    #[error("invalid port '{port}' in address '{input}'")]
    InvalidPort { input: String, port: String },
}

/// Errors that can occur while parsing a human-readable duration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DurationError {
    /// The duration string is empty.
    #[error("duration must not be empty")]
    Empty,

    /// The numeric part could not be parsed.
    #[error("invalid duration value: {0}")]
    InvalidValue(String),

    /// Zero-length durations are never meaningful for timers and windows.
    #[error("duration must be greater than zero")]
    Zero,
}
