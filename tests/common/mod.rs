//! Shared fixtures for recorder integration tests.

#![allow(dead_code)]

use std::path::Path;

use chrono::{DateTime, Duration, SecondsFormat, TimeZone, Utc};
use fr_core::config::{RecorderConfig, TrackSettings};
use fr_core::{Codec, TrackId};

pub fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

/// Video (track 1) and audio (track 2), both on a 1 kHz clock.
pub fn av_config(output_dir: &Path, segment_duration_ms: u64) -> RecorderConfig {
    RecorderConfig {
        output_dir: output_dir.to_path_buf(),
        segment_duration_ms,
        max_lookback_ms: 1000,
        tracks: vec![
            TrackSettings {
                id: TrackId(1),
                codec: Codec::H264,
                clock_rate: 1000,
                width: 640,
                height: 360,
                sample_rate: 0,
                channels: 0,
                codec_private: Some("01640028ffe1".into()),
            },
            TrackSettings {
                id: TrackId(2),
                codec: Codec::Aac,
                clock_rate: 1000,
                width: 0,
                height: 0,
                sample_rate: 48_000,
                channels: 2,
                codec_private: None,
            },
        ],
    }
}

/// One trace line at `ms` milliseconds on `track`.
pub fn line(track: u32, ms: i64, sync: bool, size: usize) -> String {
    line_with_ntp(track, ms, sync, size, ms)
}

/// Like [`line`], with the wall-clock anchor set independently of `dts`.
pub fn line_with_ntp(track: u32, ms: i64, sync: bool, size: usize, ntp_ms: i64) -> String {
    let ntp = (epoch() + Duration::milliseconds(ntp_ms)).to_rfc3339_opts(SecondsFormat::Millis, true);
    serde_json::json!({
        "track": track,
        "dts": ms,
        "sync": sync,
        "size": size,
        "ntp": ntp,
    })
    .to_string()
}

/// Interleaved 10 Hz video (keyframe every second) and audio up to `end_ms`.
pub fn av_trace(end_ms: i64) -> String {
    let mut out = String::new();
    for ms in (0..=end_ms).step_by(100) {
        out.push_str(&line(1, ms, ms % 1000 == 0, 100));
        out.push('\n');
        out.push_str(&line(2, ms, true, 10));
        out.push('\n');
    }
    out
}

/// Base decode time of every `tfdt` box in `data`, in file order.
pub fn tfdt_values(data: &[u8]) -> Vec<u64> {
    let mut values = Vec::new();
    let mut i = 0;
    while i + 16 <= data.len() {
        if &data[i..i + 4] == b"tfdt" {
            let v = u64::from_be_bytes(data[i + 8..i + 16].try_into().unwrap());
            values.push(v);
            i += 16;
        } else {
            i += 1;
        }
    }
    values
}

pub fn contains_box(data: &[u8], fourcc: &[u8; 4]) -> bool {
    data.windows(4).any(|w| w == fourcc)
}
