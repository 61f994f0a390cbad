//! The unit of media flowing through a track.

use bytes::Bytes;
use chrono::{DateTime, Utc};

/// One decoded-frame-level sample. The payload is opaque to the segmenter.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub payload: Bytes,
    /// Decoding timestamp in the track's native ticks.
    pub dts: i64,
    /// Presentation minus decoding time, in native ticks.
    pub pts_offset: i32,
    /// Wall-clock time the sample was captured.
    pub ntp: DateTime<Utc>,
    /// Whether the sample can be decoded without any previous sample.
    pub is_sync: bool,
    /// Ticks until the next sample of the same track.
    ///
    /// Unset until the sample leaves its [`TrackBuffer`](crate::TrackBuffer).
    pub duration: Option<u32>,
}

impl Sample {
    pub fn new(payload: impl Into<Bytes>, dts: i64, ntp: DateTime<Utc>, is_sync: bool) -> Self {
        Self {
            payload: payload.into(),
            dts,
            pts_offset: 0,
            ntp,
            is_sync,
            duration: None,
        }
    }

    #[must_use]
    pub fn with_pts_offset(mut self, pts_offset: i32) -> Self {
        self.pts_offset = pts_offset;
        self
    }

    pub fn size(&self) -> usize {
        self.payload.len()
    }
}
