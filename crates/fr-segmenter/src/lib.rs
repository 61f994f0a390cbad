//! fr-segmenter: multi-track segmentation and timing synchronization.
//!
//! Samples arrive independently on each configured track. Every track keeps
//! one sample of lookahead so the previous sample's duration is known, and
//! the [`Segmenter`] groups the emitted samples into self-contained segments
//! that always start on a sync sample of the video track (or of any track
//! while no video has been seen), re-anchoring each new segment on the oldest
//! sample still pending across all tracks.
//!
//! # Modules
//!
//! - [`sample`] - the unit of media flowing through a track
//! - [`track`] - track description and the one-sample lookahead buffer
//! - [`segment`] - the open segment accumulator and the [`SegmentWriter`] collaborator
//! - [`session`] - the [`Segmenter`] boundary and re-anchor algorithm
//! - [`shared`] - a mutex-serialized front end for concurrent producers

pub mod sample;
pub mod segment;
pub mod session;
pub mod shared;
pub mod track;

pub use sample::Sample;
pub use segment::{Segment, SegmentWriter, TrackRun};
pub use session::{Segmenter, SegmenterConfig, SessionStats, VideoPresence, DEFAULT_MAX_LOOKBACK};
pub use shared::{SharedSegmenter, TrackHandle};
pub use track::{Track, TrackBuffer};
