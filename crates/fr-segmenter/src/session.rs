//! The segmentation session.
//!
//! [`Segmenter::write`] runs the whole boundary decision for one inbound
//! sample: emit the track's previous sample through its lookahead buffer,
//! write it into the open segment (dropping it when it predates the segment
//! start), then decide whether the sample now pending on that track starts a
//! new segment, and if so where the new segment is anchored.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use fr_core::config::RecorderConfig;
use fr_core::events::{EventBus, EventPayload};
use fr_core::{Error, MediaTime, Result, SessionId, TrackId};

use crate::sample::Sample;
use crate::segment::{Segment, SegmentWriter};
use crate::track::{Track, TrackBuffer};

/// Default bound on how far behind the triggering sample a new segment may start.
pub const DEFAULT_MAX_LOOKBACK: Duration = Duration::from_secs(1);

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Parameters of one session, fixed at construction.
#[derive(Debug, Clone)]
pub struct SegmenterConfig {
    pub segment_duration: Duration,
    pub max_lookback: Duration,
    /// Tracks in the order used to break ties between equally old samples.
    pub tracks: Vec<Track>,
}

impl SegmenterConfig {
    pub fn new(segment_duration: Duration, tracks: Vec<Track>) -> Self {
        Self {
            segment_duration,
            max_lookback: DEFAULT_MAX_LOOKBACK,
            tracks,
        }
    }

    #[must_use]
    pub fn with_max_lookback(mut self, max_lookback: Duration) -> Self {
        self.max_lookback = max_lookback;
        self
    }

    /// Build from a recorder configuration, validating it first.
    pub fn from_recorder(config: &RecorderConfig) -> Result<Self> {
        for warning in config.validate()? {
            tracing::warn!("{warning}");
        }
        Ok(Self {
            segment_duration: config.segment_duration(),
            max_lookback: config.max_lookback(),
            tracks: config.tracks.iter().map(Track::from).collect(),
        })
    }

    fn check(&self) -> Result<()> {
        if self.segment_duration.is_zero() {
            return Err(Error::Validation("segment duration must be positive".into()));
        }
        if self.max_lookback.is_zero() {
            return Err(Error::Validation("max lookback must be positive".into()));
        }
        if self.tracks.is_empty() {
            return Err(Error::Validation("at least one track is required".into()));
        }
        let mut seen = HashSet::new();
        for track in &self.tracks {
            if track.clock_rate == 0 {
                return Err(Error::Validation(format!(
                    "track {} has a zero clock rate",
                    track.id
                )));
            }
            if !seen.insert(track.id) {
                return Err(Error::Validation(format!("duplicate track id {}", track.id)));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Session state
// ---------------------------------------------------------------------------

/// Whether the session has observed a video sample.
///
/// The only transition is `Absent -> Present`, taken on the first video
/// sample. Once present, only video tracks may trigger segment splits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum VideoPresence {
    #[default]
    Absent,
    Present,
}

impl VideoPresence {
    fn observe(&mut self, track: &Track) {
        if track.is_video() {
            *self = VideoPresence::Present;
        }
    }

    /// Whether `track` may trigger a split under this presence state.
    fn allows_split(self, track: &Track) -> bool {
        track.is_video() || self == VideoPresence::Absent
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Active,
    Failed,
    Finished,
}

/// Counters describing a session so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub samples_written: u64,
    pub samples_discarded: u64,
    pub segments_closed: u64,
}

struct TrackSlot {
    track: Track,
    buffer: TrackBuffer,
}

/// Groups the samples of all tracks of one recording into segments.
///
/// Not internally synchronized: every `write`, for any track, must run
/// exclusively. [`SharedSegmenter`](crate::SharedSegmenter) provides that for
/// concurrent producers.
pub struct Segmenter<W> {
    id: SessionId,
    segment_duration: MediaTime,
    max_lookback: MediaTime,
    slots: Vec<TrackSlot>,
    index: HashMap<TrackId, usize>,
    video: VideoPresence,
    current: Option<Segment>,
    next_sequence: u64,
    state: State,
    stats: SessionStats,
    writer: W,
    events: Option<Arc<EventBus>>,
}

impl<W: SegmentWriter> Segmenter<W> {
    pub fn new(config: SegmenterConfig, writer: W) -> Result<Self> {
        config.check()?;

        let index = config
            .tracks
            .iter()
            .enumerate()
            .map(|(i, t)| (t.id, i))
            .collect();
        let slots = config
            .tracks
            .into_iter()
            .map(|track| TrackSlot {
                track,
                buffer: TrackBuffer::new(),
            })
            .collect();

        Ok(Self {
            id: SessionId::new(),
            segment_duration: config.segment_duration.into(),
            max_lookback: config.max_lookback.into(),
            slots,
            index,
            video: VideoPresence::Absent,
            current: None,
            next_sequence: 1,
            state: State::Active,
            stats: SessionStats::default(),
            writer,
            events: None,
        })
    }

    /// Publish segment lifecycle events to `bus`.
    #[must_use]
    pub fn with_events(mut self, bus: Arc<EventBus>) -> Self {
        self.events = Some(bus);
        self
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn video_presence(&self) -> VideoPresence {
        self.video
    }

    /// The open segment, if any.
    pub fn current_segment(&self) -> Option<&Segment> {
        self.current.as_ref()
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    pub fn has_track(&self, track: TrackId) -> bool {
        self.index.contains_key(&track)
    }

    pub fn writer(&self) -> &W {
        &self.writer
    }

    pub fn into_writer(self) -> W {
        self.writer
    }

    /// Offer the next sample of `track`.
    ///
    /// Late samples are dropped with a warning and still return `Ok`. A
    /// persistence failure is returned as is and leaves the session refusing
    /// further writes with [`Error::Poisoned`].
    pub fn write(&mut self, track: TrackId, sample: Sample) -> Result<()> {
        self.ensure_active()?;
        let slot = *self.index.get(&track).ok_or(Error::UnknownTrack(track))?;

        let result = self.process(slot, sample);
        if matches!(result, Err(ref e) if e.is_fatal()) {
            self.state = State::Failed;
        }
        result
    }

    /// Close the open segment at the end of the data written to it.
    ///
    /// Samples still pending in the lookahead buffers have no duration and
    /// are dropped. The session accepts no writes afterwards.
    pub fn finish(&mut self) -> Result<()> {
        match self.state {
            State::Finished => return Ok(()),
            State::Failed => return Err(Error::Poisoned),
            State::Active => {}
        }
        self.state = State::Finished;

        let pending = self
            .slots
            .iter_mut()
            .filter_map(|slot| slot.buffer.take_pending())
            .count();
        if pending > 0 {
            tracing::debug!(session = %self.id, pending, "dropping unterminated lookahead samples");
        }

        if let Some(segment) = self.current.as_ref() {
            let last = segment.end_time().unwrap_or_else(|| segment.start());
            if let Err(e) = self.close_segment(last) {
                self.state = State::Failed;
                return Err(e);
            }
        }
        Ok(())
    }

    fn ensure_active(&self) -> Result<()> {
        match self.state {
            State::Active => Ok(()),
            State::Failed | State::Finished => Err(Error::Poisoned),
        }
    }

    fn process(&mut self, slot: usize, sample: Sample) -> Result<()> {
        let track = self.slots[slot].track;
        self.video.observe(&track);

        // The first sample of a track only fills the lookahead slot.
        let Some(emitted) = self.slots[slot].buffer.push(sample) else {
            return Ok(());
        };
        let time = track.normalize(emitted.dts);

        match self.current.as_ref().map(|s| (s.sequence(), s.start())) {
            None => self.open_segment(time, emitted.ntp)?,
            // A negative base time cannot be expressed in the container.
            Some((sequence, start)) if (time - start).is_negative() => {
                tracing::warn!(
                    track_id = %track.id,
                    dts = emitted.dts,
                    segment = sequence,
                    "sample of track {} received too late, discarding",
                    track.id
                );
                self.stats.samples_discarded += 1;
                self.publish(EventPayload::SampleDiscarded {
                    track_id: track.id,
                    dts: emitted.dts,
                });
                return Ok(());
            }
            Some(_) => {}
        }

        if let Some(segment) = self.current.as_mut() {
            segment.write(&mut self.writer, &track, emitted, time)?;
            self.stats.samples_written += 1;
        }

        self.maybe_split(slot)
    }

    /// Split when the pending sample of `slot` is an allowed boundary.
    fn maybe_split(&mut self, slot: usize) -> Result<()> {
        let track = self.slots[slot].track;
        let Some(next) = self.slots[slot].buffer.peek_pending() else {
            return Ok(());
        };
        let Some(segment) = self.current.as_ref() else {
            return Ok(());
        };

        let next_time = track.normalize(next.dts);
        let next_ntp = next.ntp;
        let eligible = self.video.allows_split(&track)
            && next.is_sync
            && next_time - segment.start() >= self.segment_duration;
        if !eligible {
            return Ok(());
        }

        self.close_segment(next_time)?;

        // Start from the oldest pending sample so no track lands before the
        // new start, unless that reaches too far back.
        let (mut start, mut start_ntp) = self.oldest_pending().unwrap_or((next_time, next_ntp));
        if next_time - start > self.max_lookback {
            tracing::debug!(
                track_id = %track.id,
                oldest = %start,
                next = %next_time,
                "oldest pending sample exceeds lookback, anchoring on trigger"
            );
            start = next_time;
            start_ntp = next_ntp;
        }

        self.open_segment(start, start_ntp)
    }

    /// Minimum normalized time over all pending samples; ties keep the first
    /// track in configuration order.
    fn oldest_pending(&self) -> Option<(MediaTime, DateTime<Utc>)> {
        let mut oldest: Option<(MediaTime, DateTime<Utc>)> = None;
        for slot in &self.slots {
            if let Some(sample) = slot.buffer.peek_pending() {
                let time = slot.track.normalize(sample.dts);
                if oldest.map_or(true, |(t, _)| time < t) {
                    oldest = Some((time, sample.ntp));
                }
            }
        }
        oldest
    }

    fn open_segment(&mut self, start: MediaTime, start_ntp: DateTime<Utc>) -> Result<()> {
        let segment = Segment::new(self.next_sequence, start, start_ntp);
        self.next_sequence += 1;

        segment.initialize(&mut self.writer)?;
        tracing::debug!(
            session = %self.id,
            segment = segment.sequence(),
            start = %start,
            "opened segment"
        );
        self.publish(EventPayload::SegmentOpened {
            sequence: segment.sequence(),
            start,
            start_ntp,
        });
        self.current = Some(segment);
        Ok(())
    }

    fn close_segment(&mut self, last: MediaTime) -> Result<()> {
        let Some(segment) = self.current.take() else {
            return Ok(());
        };
        let closed = segment.close(&mut self.writer, last)?;
        self.stats.segments_closed += 1;

        let duration = closed.duration().unwrap_or(MediaTime::ZERO);
        tracing::debug!(
            session = %self.id,
            segment = closed.sequence(),
            duration = %duration,
            samples = closed.sample_count(),
            "closed segment"
        );
        self.publish(EventPayload::SegmentClosed {
            sequence: closed.sequence(),
            start: closed.start(),
            duration,
            samples: closed.sample_count(),
        });
        Ok(())
    }

    fn publish(&self, payload: EventPayload) {
        if let Some(bus) = &self.events {
            tracing::trace!(session = %self.id, "publishing: {payload}");
            bus.broadcast(self.id, payload);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    /// Records the dts of every write, grouped by segment sequence.
    #[derive(Default)]
    struct DtsLog {
        opened: Vec<(u64, MediaTime)>,
        written: Vec<(u64, TrackId, i64)>,
        closed: Vec<(u64, MediaTime)>,
        fail_on_open: Option<u64>,
    }

    impl SegmentWriter for DtsLog {
        fn initialize(&mut self, segment: &Segment) -> Result<()> {
            if self.fail_on_open == Some(segment.sequence()) {
                return Err(Error::Io {
                    source: std::io::Error::other("cannot create file"),
                });
            }
            self.opened.push((segment.sequence(), segment.start()));
            Ok(())
        }

        fn write_sample(&mut self, segment: &Segment, track: &Track, sample: Sample) -> Result<()> {
            self.written.push((segment.sequence(), track.id, sample.dts));
            Ok(())
        }

        fn close(&mut self, segment: &Segment) -> Result<()> {
            self.closed.push((segment.sequence(), segment.last_time().unwrap()));
            Ok(())
        }
    }

    fn sample(dts: i64, is_sync: bool) -> Sample {
        Sample::new(vec![0u8; 8], dts, Utc::now(), is_sync)
    }

    fn audio_only(segment_secs: u64) -> Segmenter<DtsLog> {
        let config =
            SegmenterConfig::new(Duration::from_secs(segment_secs), vec![Track::audio(1, 1000)]);
        Segmenter::new(config, DtsLog::default()).unwrap()
    }

    #[test]
    fn first_sample_only_buffers() {
        let mut seg = audio_only(2);
        seg.write(TrackId(1), sample(0, true)).unwrap();
        assert!(seg.current_segment().is_none());
        assert!(seg.writer().opened.is_empty());
    }

    #[test]
    fn first_emitted_sample_opens_segment() {
        let mut seg = audio_only(2);
        seg.write(TrackId(1), sample(500, true)).unwrap();
        seg.write(TrackId(1), sample(600, true)).unwrap();
        assert_eq!(seg.writer().opened, vec![(1, MediaTime::from_millis(500))]);
        assert_eq!(seg.writer().written, vec![(1, TrackId(1), 500)]);
    }

    #[test]
    fn audio_only_session_splits_on_audio() {
        let mut seg = audio_only(1);
        for dts in (0..=2500).step_by(500) {
            seg.write(TrackId(1), sample(dts, true)).unwrap();
        }
        // Pending 1000 triggers the first split, pending 2000 the second.
        assert_eq!(
            seg.writer().closed,
            vec![(1, MediaTime::from_secs(1)), (2, MediaTime::from_secs(2))]
        );
        assert_eq!(
            seg.writer().opened,
            vec![
                (1, MediaTime::ZERO),
                (2, MediaTime::from_secs(1)),
                (3, MediaTime::from_secs(2))
            ]
        );
        assert_eq!(seg.stats().segments_closed, 2);
    }

    #[test]
    fn non_sync_pending_sample_does_not_split() {
        let mut seg = audio_only(1);
        seg.write(TrackId(1), sample(0, true)).unwrap();
        seg.write(TrackId(1), sample(1000, false)).unwrap();
        seg.write(TrackId(1), sample(1500, false)).unwrap();
        assert!(seg.writer().closed.is_empty());
        seg.write(TrackId(1), sample(2000, true)).unwrap();
        assert_eq!(seg.writer().closed, vec![(1, MediaTime::from_secs(2))]);
    }

    #[test]
    fn unknown_track_is_rejected() {
        let mut seg = audio_only(1);
        let err = seg.write(TrackId(5), sample(0, true)).unwrap_err();
        assert_matches!(err, Error::UnknownTrack(TrackId(5)));
        // Not fatal.
        seg.write(TrackId(1), sample(0, true)).unwrap();
    }

    #[test]
    fn video_presence_is_monotone() {
        let config = SegmenterConfig::new(
            Duration::from_secs(1),
            vec![Track::video(1, 90_000), Track::audio(2, 48_000)],
        );
        let mut seg = Segmenter::new(config, DtsLog::default()).unwrap();
        assert_eq!(seg.video_presence(), VideoPresence::Absent);
        seg.write(TrackId(2), sample(0, true)).unwrap();
        assert_eq!(seg.video_presence(), VideoPresence::Absent);
        seg.write(TrackId(1), sample(0, true)).unwrap();
        assert_eq!(seg.video_presence(), VideoPresence::Present);
        seg.write(TrackId(2), sample(960, true)).unwrap();
        assert_eq!(seg.video_presence(), VideoPresence::Present);
    }

    #[test]
    fn persistence_failure_poisons_session() {
        let config = SegmenterConfig::new(Duration::from_secs(1), vec![Track::audio(1, 1000)]);
        let writer = DtsLog {
            fail_on_open: Some(2),
            ..Default::default()
        };
        let mut seg = Segmenter::new(config, writer).unwrap();
        seg.write(TrackId(1), sample(0, true)).unwrap();
        // Emitting 0 opens segment 1; pending 1000 splits and segment 2 fails to open.
        let err = seg.write(TrackId(1), sample(1000, true)).unwrap_err();
        assert_matches!(err, Error::Persistence { segment: 2, .. });
        assert!(err.is_fatal());

        let err = seg.write(TrackId(1), sample(1500, true)).unwrap_err();
        assert_matches!(err, Error::Poisoned);
        assert_matches!(seg.finish(), Err(Error::Poisoned));
    }

    #[test]
    fn finish_closes_at_end_of_written_data() {
        let mut seg = audio_only(10);
        seg.write(TrackId(1), sample(0, true)).unwrap();
        seg.write(TrackId(1), sample(400, true)).unwrap();
        seg.write(TrackId(1), sample(800, true)).unwrap();
        seg.finish().unwrap();

        // Written: 0 and 400 (each 400 ms long); 800 was still pending.
        assert_eq!(seg.writer().closed, vec![(1, MediaTime::from_millis(800))]);
        assert_eq!(seg.writer().written.len(), 2);
        assert!(seg.current_segment().is_none());

        assert_matches!(seg.write(TrackId(1), sample(900, true)), Err(Error::Poisoned));
        // Idempotent.
        seg.finish().unwrap();
    }

    #[test]
    fn extreme_timestamp_is_discarded_without_overflow() {
        // On a 1 Hz clock this dts normalizes to the bottom of the range.
        let config = SegmenterConfig::new(Duration::from_secs(10), vec![Track::audio(1, 1)]);
        let mut seg = Segmenter::new(config, DtsLog::default()).unwrap();

        seg.write(TrackId(1), sample(5, true)).unwrap();
        seg.write(TrackId(1), sample(6, true)).unwrap();
        seg.write(TrackId(1), sample(-(1 << 62), true)).unwrap();
        seg.write(TrackId(1), sample(7, true)).unwrap();

        assert_eq!(seg.stats().samples_discarded, 1);
        let dts: Vec<i64> = seg.writer().written.iter().map(|w| w.2).collect();
        assert_eq!(dts, vec![5, 6]);
        assert!(seg.writer().closed.is_empty());

        seg.finish().unwrap();
        assert_eq!(seg.writer().closed, vec![(1, MediaTime::from_secs(6))]);
    }

    #[test]
    fn finish_without_segment_is_noop() {
        let mut seg = audio_only(1);
        seg.write(TrackId(1), sample(0, true)).unwrap();
        seg.finish().unwrap();
        assert!(seg.writer().opened.is_empty());
        assert!(seg.writer().closed.is_empty());
    }

    #[test]
    fn invalid_config_rejected() {
        let empty = SegmenterConfig::new(Duration::from_secs(1), vec![]);
        assert_matches!(Segmenter::new(empty, DtsLog::default()).err(), Some(Error::Validation(_)));

        let zero = SegmenterConfig::new(Duration::ZERO, vec![Track::audio(1, 1000)]);
        assert_matches!(Segmenter::new(zero, DtsLog::default()).err(), Some(Error::Validation(_)));

        let dup = SegmenterConfig::new(
            Duration::from_secs(1),
            vec![Track::audio(1, 1000), Track::video(1, 90_000)],
        );
        assert_matches!(Segmenter::new(dup, DtsLog::default()).err(), Some(Error::Validation(_)));

        let rate = SegmenterConfig::new(Duration::from_secs(1), vec![Track::audio(1, 0)]);
        assert_matches!(Segmenter::new(rate, DtsLog::default()).err(), Some(Error::Validation(_)));
    }

    #[test]
    fn events_are_published() {
        let bus = Arc::new(EventBus::new(16));
        let mut rx = bus.subscribe();
        let mut seg = audio_only(1).with_events(bus.clone());

        seg.write(TrackId(1), sample(0, true)).unwrap();
        seg.write(TrackId(1), sample(1000, true)).unwrap();

        let opened = rx.try_recv().unwrap();
        assert_eq!(opened.session, seg.id());
        assert_matches!(opened.payload, EventPayload::SegmentOpened { sequence: 1, .. });
        assert_matches!(
            rx.try_recv().unwrap().payload,
            EventPayload::SegmentClosed { sequence: 1, samples: 1, .. }
        );
        assert_matches!(
            rx.try_recv().unwrap().payload,
            EventPayload::SegmentOpened { sequence: 2, .. }
        );
    }
}
