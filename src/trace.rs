//! JSON-lines sample traces.
//!
//! Each non-empty line describes one sample:
//!
//! ```text
//! {"track":1,"dts":0,"sync":true,"size":1200,"pts_offset":0,"ntp":"2024-01-01T00:00:00Z"}
//! ```
//!
//! The payload is either `size` zero bytes or the decoded `payload_hex`.
//! Lines starting with `#` are comments.

use std::io::{BufRead, Lines};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use fr_core::{Error, Result, TrackId};
use fr_segmenter::Sample;

/// One line of a trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceRecord {
    pub track: TrackId,
    pub dts: i64,
    #[serde(default)]
    pub sync: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload_hex: Option<String>,
    #[serde(default)]
    pub pts_offset: i32,
    pub ntp: DateTime<Utc>,
}

impl TraceRecord {
    /// Parse the record on 1-based line `line`.
    pub fn parse(line: usize, text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| Error::trace(line, e.to_string()))
    }

    /// Build the sample this record describes.
    pub fn into_sample(self, line: usize) -> Result<(TrackId, Sample)> {
        let payload = match (self.payload_hex, self.size) {
            (Some(_), Some(_)) => {
                return Err(Error::trace(line, "size and payload_hex are mutually exclusive"))
            }
            (Some(hex_str), None) => {
                hex::decode(hex_str.trim()).map_err(|e| Error::trace(line, format!("payload_hex: {e}")))?
            }
            (None, size) => vec![0u8; size.unwrap_or(0)],
        };
        let sample = Sample::new(payload, self.dts, self.ntp, self.sync).with_pts_offset(self.pts_offset);
        Ok((self.track, sample))
    }
}

/// Iterator over the samples of a trace, with their line numbers.
pub struct TraceReader<R> {
    lines: Lines<R>,
    line: usize,
}

impl<R: BufRead> TraceReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            line: 0,
        }
    }
}

impl<R: BufRead> Iterator for TraceReader<R> {
    type Item = Result<(usize, TrackId, Sample)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let text = match self.lines.next()? {
                Ok(text) => text,
                Err(e) => return Some(Err(e.into())),
            };
            self.line += 1;

            let trimmed = text.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            let line = self.line;
            return Some(
                TraceRecord::parse(line, trimmed)
                    .and_then(|record| record.into_sample(line))
                    .map(|(track, sample)| (line, track, sample)),
            );
        }
    }
}
