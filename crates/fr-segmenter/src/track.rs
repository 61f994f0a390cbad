//! Track description and the one-sample lookahead buffer.

use fr_core::config::TrackSettings;
use fr_core::{normalize, MediaTime, TrackId, TrackKind};

use crate::sample::Sample;

/// Static description of a track, fixed for the lifetime of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Track {
    pub id: TrackId,
    /// Ticks per second of the track's timestamps.
    pub clock_rate: u32,
    pub kind: TrackKind,
}

impl Track {
    pub fn video(id: u32, clock_rate: u32) -> Self {
        Self {
            id: TrackId(id),
            clock_rate,
            kind: TrackKind::Video,
        }
    }

    pub fn audio(id: u32, clock_rate: u32) -> Self {
        Self {
            id: TrackId(id),
            clock_rate,
            kind: TrackKind::Audio,
        }
    }

    pub fn is_video(&self) -> bool {
        self.kind == TrackKind::Video
    }

    /// Normalized time of a timestamp in this track's clock.
    pub fn normalize(&self, dts: i64) -> MediaTime {
        normalize(dts, self.clock_rate)
    }
}

impl From<&TrackSettings> for Track {
    fn from(settings: &TrackSettings) -> Self {
        Self {
            id: settings.id,
            clock_rate: settings.clock_rate,
            kind: settings.codec.kind(),
        }
    }
}

/// Holds at most one pending sample of a track.
///
/// Each push swaps the new sample in and hands back the previous one, whose
/// duration is now known from the timestamp of its successor.
#[derive(Debug, Default)]
pub struct TrackBuffer {
    pending: Option<Sample>,
}

impl TrackBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffer `sample` and emit the previously pending sample, if any.
    ///
    /// The emitted sample's duration is set to the tick delta to `sample`.
    /// Deltas that do not fit a `u32` (non-monotonic or huge gaps) are clamped.
    pub fn push(&mut self, sample: Sample) -> Option<Sample> {
        let next_dts = sample.dts;
        let mut emitted = self.pending.replace(sample)?;

        let delta = next_dts.saturating_sub(emitted.dts);
        let duration = u32::try_from(delta).unwrap_or_else(|_| {
            tracing::debug!(
                dts = emitted.dts,
                next_dts,
                "sample duration out of range, clamping"
            );
            if delta < 0 {
                0
            } else {
                u32::MAX
            }
        });
        emitted.duration = Some(duration);
        Some(emitted)
    }

    /// The buffered lookahead sample.
    pub fn peek_pending(&self) -> Option<&Sample> {
        self.pending.as_ref()
    }

    /// Remove the pending sample without emitting it.
    pub fn take_pending(&mut self) -> Option<Sample> {
        self.pending.take()
    }
}
