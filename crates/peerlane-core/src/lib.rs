//! Shared primitives for the peerlane transport core.
//!
//! This is the lowest layer of peerlane. Everything else builds on the
//! types provided here:
//! - [`Address`] / [`UniqueAddress`] identify a remote actor system and one
//!   incarnation of it
//! - [`Snapshot`] is an atomically replaceable immutable value, updated with
//!   compare-and-swap retry loops instead of locks
//! - [`OutboundQueue`] is the bounded, non-blocking boundary between message
//!   senders and the outbound pipeline
//! - [`RestartCounter`] bounds pipeline restarts within a rolling window

pub mod address;
pub mod clock;
pub mod duration;
pub mod error;
pub mod kill_switch;
pub mod queue;
pub mod restart;
pub mod snapshot;

pub use address::{Address, UniqueAddress, DEFAULT_PROTOCOL};
pub use clock::monotonic_nanos;
pub use duration::{format_duration, parse_duration};
pub use error::{AddressError, DurationError};
pub use kill_switch::KillSwitch;
pub use queue::{noop_wakeup, OutboundQueue, Wakeup};
pub use restart::{RestartCounter, RestartDecision};
pub use snapshot::Snapshot;

#[cfg(feature = "async")]
pub use queue::notify_wakeup;
