//! fr-media: fragmented MP4 serialization for recorded segments.
//!
//! # Modules
//!
//! - [`fmp4`] - Fragmented MP4 (ISO BMFF) serialization: multi-track init
//!   segments and multi-track media fragments

pub mod fmp4;

// Re-export commonly used items at the crate root.
pub use fmp4::{write_init_segment, write_media_segment, SampleInfo, TrackConfig, TrackFragment};
