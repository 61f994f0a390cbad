//! fr-core: shared types, IDs, errors, configuration, and event system.
//!
//! This crate is the foundational dependency for all other fr-* crates,
//! providing typed identifiers, the normalized media clock, a unified error
//! type, media-domain enums, recorder configuration, and a broadcast event bus
//! for segment lifecycle notifications.

pub mod config;
pub mod error;
pub mod events;
pub mod ids;
pub mod media;
pub mod time;

// Re-export the most commonly used items at the crate root.
pub use error::{Error, Result};
pub use ids::*;
pub use media::*;
pub use time::{normalize, MediaTime};
