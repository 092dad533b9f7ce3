//! Tracking event pipeline.
//!
//! ```text
//! recipient client → /pixel | /redirect → EventStore::record → tracking.csv → list_events
//! ```

pub mod event;
pub mod pixel;
pub mod store;

pub use event::{EventKind, TrackingEvent};
pub use pixel::TRANSPARENT_PNG;
pub use store::EventStore;
