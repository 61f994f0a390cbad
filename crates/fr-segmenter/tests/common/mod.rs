//! Shared helpers for segmenter integration tests.
//!
//! [`RecordingWriter`] logs every collaborator call so tests can assert on
//! the exact sequence of initialize / write_sample / close the session issued.

#![allow(dead_code)]

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use fr_core::{MediaTime, Result, TrackId};
use fr_segmenter::{Sample, Segment, SegmentWriter, Track};
use parking_lot::Mutex;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

/// One call made by the session to its writer.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Initialize {
        sequence: u64,
        start: MediaTime,
        start_ntp: DateTime<Utc>,
    },
    Write {
        sequence: u64,
        track: TrackId,
        dts: i64,
        duration: Option<u32>,
    },
    Close {
        sequence: u64,
        last: MediaTime,
    },
}

#[derive(Debug, Default)]
pub struct RecordingWriter {
    pub calls: Vec<Call>,
}

impl RecordingWriter {
    /// `(sequence, start)` of every initialized segment.
    pub fn opened(&self) -> Vec<(u64, MediaTime)> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                Call::Initialize { sequence, start, .. } => Some((*sequence, *start)),
                _ => None,
            })
            .collect()
    }

    pub fn closed(&self) -> Vec<(u64, MediaTime)> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                Call::Close { sequence, last } => Some((*sequence, *last)),
                _ => None,
            })
            .collect()
    }

    pub fn start_ntp(&self, sequence: u64) -> Option<DateTime<Utc>> {
        self.calls.iter().find_map(|c| match c {
            Call::Initialize {
                sequence: s,
                start_ntp,
                ..
            } if *s == sequence => Some(*start_ntp),
            _ => None,
        })
    }

    /// `(sequence, dts, duration)` of every write for `track`.
    pub fn writes(&self, track: u32) -> Vec<(u64, i64, Option<u32>)> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                Call::Write {
                    sequence,
                    track: t,
                    dts,
                    duration,
                } if t.get() == track => Some((*sequence, *dts, *duration)),
                _ => None,
            })
            .collect()
    }

    /// Panic unless every segment saw initialize, then writes, then close,
    /// with nothing after close.
    pub fn assert_call_order(&self) {
        #[derive(PartialEq)]
        enum Phase {
            Open,
            Closed,
        }
        let mut phases: HashMap<u64, Phase> = HashMap::new();
        for call in &self.calls {
            match call {
                Call::Initialize { sequence, .. } => {
                    assert!(
                        phases.insert(*sequence, Phase::Open).is_none(),
                        "segment {sequence} initialized twice"
                    );
                }
                Call::Write { sequence, .. } => {
                    assert!(
                        phases.get(sequence) == Some(&Phase::Open),
                        "write outside open segment {sequence}"
                    );
                }
                Call::Close { sequence, .. } => {
                    assert!(
                        phases.insert(*sequence, Phase::Closed) == Some(Phase::Open),
                        "close of segment {sequence} that was not open"
                    );
                }
            }
        }
    }
}

impl SegmentWriter for RecordingWriter {
    fn initialize(&mut self, segment: &Segment) -> Result<()> {
        self.calls.push(Call::Initialize {
            sequence: segment.sequence(),
            start: segment.start(),
            start_ntp: segment.start_ntp(),
        });
        Ok(())
    }

    fn write_sample(&mut self, segment: &Segment, track: &Track, sample: Sample) -> Result<()> {
        self.calls.push(Call::Write {
            sequence: segment.sequence(),
            track: track.id,
            dts: sample.dts,
            duration: sample.duration,
        });
        Ok(())
    }

    fn close(&mut self, segment: &Segment) -> Result<()> {
        self.calls.push(Call::Close {
            sequence: segment.sequence(),
            last: segment.last_time().expect("closed segment has a last time"),
        });
        Ok(())
    }
}

/// Wall-clock anchor `ms` milliseconds after a fixed epoch.
pub fn ntp(ms: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + ChronoDuration::milliseconds(ms)
}

pub fn sample(dts: i64, is_sync: bool, ntp_ms: i64) -> Sample {
    Sample::new(vec![0u8; 16], dts, ntp(ntp_ms), is_sync)
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("fr_segmenter=debug")
        .with_test_writer()
        .try_init();
}

/// One captured log event: its level and the `track_id` field, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct LoggedEvent {
    pub level: Level,
    pub track_id: Option<String>,
}

/// Layer that keeps every event it sees, for asserting on log output.
#[derive(Clone, Default)]
pub struct CaptureLayer {
    events: Arc<Mutex<Vec<LoggedEvent>>>,
}

impl CaptureLayer {
    pub fn events(&self) -> Vec<LoggedEvent> {
        self.events.lock().clone()
    }

    pub fn warnings(&self) -> Vec<LoggedEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.level == Level::WARN)
            .collect()
    }
}

struct TrackIdVisitor(Option<String>);

impl Visit for TrackIdVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "track_id" {
            self.0 = Some(format!("{value:?}"));
        }
    }
}

impl<S: Subscriber> Layer<S> for CaptureLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = TrackIdVisitor(None);
        event.record(&mut visitor);
        self.events.lock().push(LoggedEvent {
            level: *event.metadata().level(),
            track_id: visitor.0,
        });
    }
}

/// Run `f` with a thread-local subscriber capturing every event.
pub fn capture_logs<R>(f: impl FnOnce() -> R) -> (R, CaptureLayer) {
    use tracing_subscriber::layer::SubscriberExt;

    let layer = CaptureLayer::default();
    let subscriber = tracing_subscriber::registry().with(layer.clone());
    let result = tracing::subscriber::with_default(subscriber, f);
    (result, layer)
}
