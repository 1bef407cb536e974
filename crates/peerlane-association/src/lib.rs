//! Per-peer association lifecycle for peerlane.
//!
//! An [`Association`] tracks one remote address across incarnations of the
//! remote system: the handshake latch, the quarantine history, the outbound
//! lanes and the compression tables the peer advertised. The
//! [`AssociationRegistry`] owns all associations of the local system,
//! dispatches [`ControlMessage`]s and implements the compression layer's
//! [`peerlane_compress::InboundContext`].

pub mod association;
pub mod control;
pub mod error;
pub mod lanes;
pub mod registry;
pub mod settings;
pub mod state;

pub use association::{Association, HandshakeOutcome};
pub use control::{ControlMessage, CONTROL_MANIFEST, CONTROL_SERIALIZER_ID};
pub use error::{AssociationError, Result, SettingsError};
pub use lanes::{DropReason, Dropped, LaneId, LargeMessageDestinations, OutboundLanes};
pub use registry::{AssociationRegistry, ControlOutcome};
pub use settings::{
    AssociationSettings, CanonicalSettings, LaneSettings, ProtocolSettings, RestartSettings,
    Settings,
};
pub use state::{AddressListener, AssociationState, QuarantinedTimestamp};
