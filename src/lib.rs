//! fmp4rec - multi-track fragmented MP4 recorder
//!
//! Feeds samples from a trace through the [`fr_segmenter`] session and
//! persists every segment as its own fMP4 file.

pub mod record;
pub mod sink;
pub mod trace;

pub use record::{record, record_with, RecordSummary};
pub use sink::FileSegmentWriter;
pub use trace::{TraceReader, TraceRecord};
