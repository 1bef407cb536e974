//! Adaptive compression of actor paths and class manifests.
//!
//! Each side of an association counts the values it receives per peer with a
//! count-min sketch, keeps the heaviest hitters, and periodically advertises
//! a [`CompressionTable`] to that peer over the control channel. Once the
//! peer adopts the table it sends small integer codes instead of literals,
//! and the receiver resolves them through its retained table generations.
//!
//! - [`InboundCompressions`] owns the receiving side for every peer
//! - [`OutboundCompressions`] holds the tables a peer advertised to us
//! - [`InboundContext`] is how the receiving side reaches the association
//!   layer to send advertisements

pub mod detector;
pub mod error;
pub mod inbound;
pub mod outbound;
pub mod settings;
pub mod sketch;
pub mod table;
pub mod top_heavy_hitters;
pub mod value;

pub use detector::HeavyHitterDetector;
pub use error::{CompressionError, Result};
pub use inbound::{
    AdvertisementOutcome, AssociationStatus, InboundCompression, InboundCompressions,
    InboundContext, SkipReason, Tables,
};
pub use outbound::OutboundCompressions;
pub use settings::{CompressionSettings, TableSettings};
pub use sketch::CountMinSketch;
pub use table::{next_version, CompressionTable, DecompressionTable, DISABLED_VERSION, MAX_VERSION};
pub use top_heavy_hitters::TopHeavyHitters;
pub use value::{ActorRefPath, ClassManifest, Compressible};
