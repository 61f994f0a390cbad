//! The open segment accumulator and its persistence collaborator.
//!
//! A [`Segment`] is created by the session, initialized once, receives any
//! number of sample writes and is closed exactly once. Every step is
//! forwarded to a [`SegmentWriter`], which owns the bytes; the segment only
//! keeps the timing state the session needs.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use fr_core::{Error, MediaTime, Result, TrackId};

use crate::sample::Sample;
use crate::track::Track;

/// Container-serialization collaborator.
///
/// Calls for one segment always arrive as `initialize`, then zero or more
/// `write_sample`, then `close`; nothing follows `close`. Any error is fatal
/// for the session.
pub trait SegmentWriter {
    fn initialize(&mut self, segment: &Segment) -> Result<()>;

    /// Persist `sample` for `track`. `segment` already accounts for it.
    fn write_sample(&mut self, segment: &Segment, track: &Track, sample: Sample) -> Result<()>;

    /// Finalize `segment`; [`Segment::last_time`] is set.
    fn close(&mut self, segment: &Segment) -> Result<()>;
}

/// Write state of one track inside a segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackRun {
    /// Normalized time of the run's first sample.
    pub base_time: MediaTime,
    /// Normalized time at which the run's last sample ends.
    pub end_time: MediaTime,
    pub samples: usize,
    pub bytes: u64,
}

/// One fragment of the recording.
#[derive(Debug, Clone)]
pub struct Segment {
    sequence: u64,
    start: MediaTime,
    start_ntp: DateTime<Utc>,
    last: Option<MediaTime>,
    runs: BTreeMap<TrackId, TrackRun>,
}

impl Segment {
    pub(crate) fn new(sequence: u64, start: MediaTime, start_ntp: DateTime<Utc>) -> Self {
        Self {
            sequence,
            start,
            start_ntp,
            last: None,
            runs: BTreeMap::new(),
        }
    }

    /// 1-based position of the segment within its session.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn start(&self) -> MediaTime {
        self.start
    }

    /// Wall-clock anchor of [`Segment::start`].
    pub fn start_ntp(&self) -> DateTime<Utc> {
        self.start_ntp
    }

    /// Time recorded at close; `None` while open.
    pub fn last_time(&self) -> Option<MediaTime> {
        self.last
    }

    pub fn is_closed(&self) -> bool {
        self.last.is_some()
    }

    /// Closed length of the segment, `None` while open.
    pub fn duration(&self) -> Option<MediaTime> {
        self.last.map(|last| last - self.start)
    }

    pub fn run(&self, track: TrackId) -> Option<&TrackRun> {
        self.runs.get(&track)
    }

    /// Runs in track id order.
    pub fn runs(&self) -> impl Iterator<Item = (TrackId, &TrackRun)> {
        self.runs.iter().map(|(id, run)| (*id, run))
    }

    pub fn sample_count(&self) -> usize {
        self.runs.values().map(|r| r.samples).sum()
    }

    /// Latest end time over all runs.
    pub fn end_time(&self) -> Option<MediaTime> {
        self.runs.values().map(|r| r.end_time).max()
    }

    pub(crate) fn initialize<W: SegmentWriter>(&self, writer: &mut W) -> Result<()> {
        writer
            .initialize(self)
            .map_err(|e| Error::persistence(self.sequence, e))
    }

    /// Record `sample` (normalized time `time`) and forward it to the writer.
    pub(crate) fn write<W: SegmentWriter>(
        &mut self,
        writer: &mut W,
        track: &Track,
        sample: Sample,
        time: MediaTime,
    ) -> Result<()> {
        let end_time = time + track.normalize(i64::from(sample.duration.unwrap_or(0)));
        let size = sample.size() as u64;

        let run = self.runs.entry(track.id).or_insert(TrackRun {
            base_time: time,
            end_time,
            samples: 0,
            bytes: 0,
        });
        run.end_time = run.end_time.max(end_time);
        run.samples += 1;
        run.bytes += size;

        writer
            .write_sample(self, track, sample)
            .map_err(|e| Error::persistence(self.sequence, e))
    }

    /// Close the segment at `last` and hand the finished segment back.
    pub(crate) fn close<W: SegmentWriter>(mut self, writer: &mut W, last: MediaTime) -> Result<Segment> {
        self.last = Some(last);
        writer
            .close(&self)
            .map_err(|e| Error::persistence(self.sequence, e))?;
        Ok(self)
    }
}
