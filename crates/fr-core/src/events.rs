//! Segment lifecycle events.
//!
//! A recording session may publish every segment it opens or closes and
//! every sample it discards. Delivery is a
//! `tokio::sync::broadcast` channel, so a slow listener never blocks the
//! session; a short history covers listeners that attach late.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::ids::{SessionId, TrackId};
use crate::time::MediaTime;

/// Events kept for late subscribers unless configured otherwise.
pub const DEFAULT_HISTORY: usize = 100;

const DEFAULT_CAPACITY: usize = 256;

// ---------------------------------------------------------------------------
// EventPayload
// ---------------------------------------------------------------------------

/// Payload describing what happened.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    SegmentOpened {
        sequence: u64,
        start: MediaTime,
        start_ntp: DateTime<Utc>,
    },
    SegmentClosed {
        sequence: u64,
        start: MediaTime,
        duration: MediaTime,
        samples: usize,
    },
    /// A sample older than the open segment's start was dropped.
    SampleDiscarded {
        track_id: TrackId,
        dts: i64,
    },
}

impl fmt::Display for EventPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SegmentOpened { sequence, start, .. } => {
                write!(f, "segment {sequence} opened at {start}")
            }
            Self::SegmentClosed {
                sequence,
                duration,
                samples,
                ..
            } => write!(f, "segment {sequence} closed after {duration} ({samples} samples)"),
            Self::SampleDiscarded { track_id, dts } => {
                write!(f, "late sample of track {track_id} at dts {dts} discarded")
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Event
// ---------------------------------------------------------------------------

/// A timestamped event ready for broadcast.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Unique event identifier.
    pub id: Uuid,
    /// When the event occurred.
    pub timestamp: DateTime<Utc>,
    /// Session that produced the event.
    pub session: SessionId,
    /// What happened.
    pub payload: EventPayload,
}

impl Event {
    /// Create a new event with a fresh UUID and the current timestamp.
    pub fn new(session: SessionId, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            session,
            payload,
        }
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Fan-out of segment lifecycle events to any number of listeners.
///
/// Listeners that subscribe late can still inspect the last
/// [`EventBus::history_len`] events through [`EventBus::recent_events`].
pub struct EventBus {
    sender: broadcast::Sender<Event>,
    history: RwLock<VecDeque<Event>>,
    history_len: usize,
}

impl EventBus {
    /// `capacity` bounds how far a subscriber may lag before it starts
    /// missing events; history keeps [`DEFAULT_HISTORY`] events.
    pub fn new(capacity: usize) -> Self {
        Self::with_history(capacity, DEFAULT_HISTORY)
    }

    pub fn with_history(capacity: usize, history_len: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            history: RwLock::new(VecDeque::with_capacity(history_len)),
            history_len,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    pub fn history_len(&self) -> usize {
        self.history_len
    }

    /// Publish `payload` on behalf of `session`.
    pub fn broadcast(&self, session: SessionId, payload: EventPayload) {
        let event = Event::new(session, payload);

        if self.history_len > 0 {
            let mut history = self.history.write();
            while history.len() >= self.history_len {
                history.pop_front();
            }
            history.push_back(event.clone());
        }

        // Sending only fails when nobody listens.
        let _ = self.sender.send(event);
    }

    /// Up to `n` of the latest events, newest first.
    pub fn recent_events(&self, n: usize) -> Vec<Event> {
        self.history.read().iter().rev().take(n).cloned().collect()
    }

    /// Up to `n` of the latest events published by `session`, newest first.
    pub fn recent_for(&self, session: SessionId, n: usize) -> Vec<Event> {
        self.history
            .read()
            .iter()
            .rev()
            .filter(|e| e.session == session)
            .take(n)
            .cloned()
            .collect()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
