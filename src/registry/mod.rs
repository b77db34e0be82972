//! Stream registry: the authoritative map of live sessions
//!
//! The registry tracks every active stream, its single streamer, its viewer
//! map, and the engine handles each record owns. It enforces the capacity and
//! uniqueness invariants (one live stream per id, at most four concurrently
//! watched streams per viewer id) and drives the ordered teardown pipeline
//! when a stream closes.
//!
//! Transport/producer/consumer lifecycle lives in [`ledger`] as a second impl
//! surface over the same records: the handles are owned by the streamer and
//! viewer records, but the protocol around creating, connecting, and closing
//! them is involved enough to keep separate.

pub mod config;
pub mod error;
pub mod ledger;
pub mod record;
pub mod store;

pub use config::RegistryConfig;
pub use error::RegistryError;
pub use record::{StreamEntry, StreamSummary, Streamer, Viewer};
pub use store::{StreamRegistry, ViewerAdmission};
