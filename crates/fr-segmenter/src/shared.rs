//! Mutex-serialized front end for concurrent producers.
//!
//! The boundary decision reads every track's lookahead buffer and the open
//! segment at once, so the whole session sits behind one lock. Each producer
//! holds a [`TrackHandle`] bound to its track; per-track order is the order in
//! which that producer calls [`TrackHandle::write`].

use std::sync::Arc;

use parking_lot::Mutex;

use fr_core::{Error, Result, TrackId};

use crate::sample::Sample;
use crate::segment::SegmentWriter;
use crate::session::Segmenter;

/// A [`Segmenter`] shared between producer threads.
pub struct SharedSegmenter<W> {
    inner: Arc<Mutex<Segmenter<W>>>,
}

impl<W> Clone for SharedSegmenter<W> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<W: SegmentWriter> SharedSegmenter<W> {
    pub fn new(segmenter: Segmenter<W>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(segmenter)),
        }
    }

    /// A write handle for `track`.
    pub fn track(&self, track: TrackId) -> Result<TrackHandle<W>> {
        if !self.inner.lock().has_track(track) {
            return Err(Error::UnknownTrack(track));
        }
        Ok(TrackHandle {
            track,
            inner: Arc::clone(&self.inner),
        })
    }

    pub fn write(&self, track: TrackId, sample: Sample) -> Result<()> {
        self.inner.lock().write(track, sample)
    }

    pub fn finish(&self) -> Result<()> {
        self.inner.lock().finish()
    }

    /// Run `f` with the session locked.
    pub fn with<R>(&self, f: impl FnOnce(&Segmenter<W>) -> R) -> R {
        f(&self.inner.lock())
    }

    /// Recover the session once every handle is dropped.
    pub fn into_inner(self) -> Option<Segmenter<W>> {
        Arc::try_unwrap(self.inner).ok().map(Mutex::into_inner)
    }
}

/// Write access to one track of a [`SharedSegmenter`].
pub struct TrackHandle<W> {
    track: TrackId,
    inner: Arc<Mutex<Segmenter<W>>>,
}

impl<W> Clone for TrackHandle<W> {
    fn clone(&self) -> Self {
        Self {
            track: self.track,
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<W: SegmentWriter> TrackHandle<W> {
    pub fn id(&self) -> TrackId {
        self.track
    }

    pub fn write(&self, sample: Sample) -> Result<()> {
        self.inner.lock().write(self.track, sample)
    }
}
