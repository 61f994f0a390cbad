//! Fragmented MP4 (fMP4) serialization.
//!
//! This module generates ISO BMFF structures for recorded segments:
//! - Init segment (ftyp + moov describing every track)
//! - Media fragments (moof with one traf per track + a single mdat)

pub(crate) mod boxes;
mod writer;

pub use writer::{write_init_segment, write_media_segment, SampleInfo, TrackConfig, TrackFragment};
