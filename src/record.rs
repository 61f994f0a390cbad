//! Drive a recording session over a sample trace.

use std::io::BufRead;

use serde::Serialize;

use fr_core::config::RecorderConfig;
use fr_core::{Error, Result};
use fr_segmenter::{SegmentWriter, Segmenter, SegmenterConfig};

use crate::sink::FileSegmentWriter;
use crate::trace::TraceReader;

/// Outcome of a completed recording.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RecordSummary {
    /// Samples written into segments.
    pub samples: u64,
    /// Segments closed, including the final one.
    pub segments: u64,
    /// Samples dropped for arriving before their segment's start.
    pub discarded: u64,
}

/// Record `trace` into fMP4 files under `config.output_dir`.
pub fn record<R: BufRead>(config: &RecorderConfig, trace: R) -> Result<RecordSummary> {
    let writer = FileSegmentWriter::from_config(config)?;
    let (summary, writer) = record_with(config, trace, writer)?;
    tracing::info!(
        output_dir = %writer.output_dir().display(),
        files = writer.segments().len(),
        "recording complete"
    );
    Ok(summary)
}

/// Record `trace` through an arbitrary writer, returning it afterwards.
///
/// The session is finished even when the trace fails midway so the open
/// segment is closed; the trace error is returned.
pub fn record_with<R: BufRead, W: SegmentWriter>(
    config: &RecorderConfig,
    trace: R,
    writer: W,
) -> Result<(RecordSummary, W)> {
    let mut segmenter = Segmenter::new(SegmenterConfig::from_recorder(config)?, writer)?;
    tracing::info!(session = %segmenter.id(), tracks = config.tracks.len(), "recording started");

    if let Err(e) = feed(&mut segmenter, trace) {
        if !e.is_fatal() {
            if let Err(finish) = segmenter.finish() {
                tracing::warn!("failed to close final segment: {finish}");
            }
        }
        return Err(e);
    }
    segmenter.finish()?;

    let stats = segmenter.stats();
    let summary = RecordSummary {
        samples: stats.samples_written,
        segments: stats.segments_closed,
        discarded: stats.samples_discarded,
    };
    tracing::info!(
        samples = summary.samples,
        segments = summary.segments,
        discarded = summary.discarded,
        "session finished"
    );
    Ok((summary, segmenter.into_writer()))
}

fn feed<R: BufRead, W: SegmentWriter>(segmenter: &mut Segmenter<W>, trace: R) -> Result<()> {
    for entry in TraceReader::new(trace) {
        let (line, track, sample) = entry?;
        segmenter.write(track, sample).map_err(|e| match e {
            Error::UnknownTrack(id) => Error::trace(line, format!("track {id} is not configured")),
            other => other,
        })?;
    }
    Ok(())
}
