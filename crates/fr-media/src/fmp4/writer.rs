//! High-level fMP4 writer functions.
//!
//! Provides `write_init_segment` and `write_media_segment` for producing
//! multi-track fragmented MP4 data: one init segment describing every track,
//! then one or more fragments each carrying a run of samples per track.

use bytes::{BufMut, Bytes, BytesMut};
use fr_core::Codec;
use serde::{Deserialize, Serialize};

use super::boxes::{self, TrunSample};

/// Configuration for a track in an fMP4 init segment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackConfig {
    /// Track ID (1-based).
    pub track_id: u32,
    /// Media timescale (ticks per second).
    pub timescale: u32,
    /// Codec used by this track.
    pub codec: Codec,
    /// Video width in pixels (0 for audio tracks).
    pub width: u32,
    /// Video height in pixels (0 for audio tracks).
    pub height: u32,
    /// Audio sample rate in Hz (0 for video tracks).
    pub sample_rate: u32,
    /// Audio channel count (0 for video tracks).
    pub channels: u16,
    /// Codec-specific configuration data (avcC, hvcC, esds or dOps bytes).
    pub codec_private: Vec<u8>,
}

/// Information about a single sample (frame/packet) in a media fragment.
#[derive(Debug, Clone)]
pub struct SampleInfo {
    /// Raw sample data.
    pub data: Bytes,
    /// Sample duration in timescale units.
    pub duration: u32,
    /// Whether this sample is a sync sample.
    pub is_keyframe: bool,
    /// Composition time offset (signed, for B-frames).
    pub composition_offset: i32,
}

/// The samples of one track inside a fragment.
#[derive(Debug, Clone)]
pub struct TrackFragment {
    pub track_id: u32,
    /// Decode time of the first sample, in the track's timescale.
    pub base_decode_time: u64,
    pub samples: Vec<SampleInfo>,
}

impl TrackFragment {
    fn data_size(&self) -> u64 {
        self.samples.iter().map(|s| s.data.len() as u64).sum()
    }
}

/// Generate an fMP4 initialization segment (ftyp + moov) for all `tracks`.
///
/// The init segment describes the track structure and codec configuration.
/// It must precede any media fragment.
pub fn write_init_segment(tracks: &[TrackConfig]) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(512 + tracks.len() * 512);
    boxes::write_ftyp(&mut buf);

    let next_track_id = tracks.iter().map(|t| t.track_id).max().unwrap_or(0) + 1;

    let moov = boxes::begin_box(&mut buf, b"moov");
    boxes::write_mvhd(&mut buf, next_track_id);
    for track in tracks {
        boxes::write_trak(&mut buf, track);
    }
    boxes::write_mvex(&mut buf, tracks.iter().map(|t| t.track_id));
    boxes::end_box(&mut buf, moov);

    buf.to_vec()
}

/// Generate an fMP4 media fragment (moof + mdat).
///
/// The moof holds one traf per entry of `fragments`, in order; the mdat holds
/// the sample data of all tracks concatenated in the same order. Each trun's
/// data offset points at its track's first byte inside the mdat.
///
/// # Arguments
/// * `seq` - Fragment sequence number (1-based, incrementing).
/// * `fragments` - Per-track sample runs.
pub fn write_media_segment(seq: u32, fragments: &[TrackFragment]) -> Vec<u8> {
    let total_data_size: u64 = fragments.iter().map(TrackFragment::data_size).sum();
    let mdat_hdr_size = boxes::mdat_header_size(total_data_size);

    let mut buf = BytesMut::with_capacity(
        256 + fragments.iter().map(|f| 64 + f.samples.len() * 16).sum::<usize>()
            + total_data_size as usize,
    );

    let moof = boxes::begin_box(&mut buf, b"moof");
    boxes::write_mfhd(&mut buf, seq);

    let mut offset_positions = Vec::with_capacity(fragments.len());
    for fragment in fragments {
        let traf = boxes::begin_box(&mut buf, b"traf");
        boxes::write_tfhd(&mut buf, fragment.track_id);
        boxes::write_tfdt(&mut buf, fragment.base_decode_time);

        let trun_samples: Vec<TrunSample> = fragment
            .samples
            .iter()
            .map(|s| TrunSample {
                duration: s.duration,
                size: s.data.len() as u32,
                flags: if s.is_keyframe {
                    boxes::SYNC_SAMPLE_FLAGS
                } else {
                    boxes::NON_SYNC_SAMPLE_FLAGS
                },
                composition_time_offset: s.composition_offset,
            })
            .collect();
        offset_positions.push(boxes::write_trun(&mut buf, &trun_samples));

        boxes::end_box(&mut buf, traf);
    }
    boxes::end_box(&mut buf, moof);

    // Data offsets are relative to the start of the moof (default-base-is-moof).
    let moof_size = buf.len() - moof;
    let mut data_offset = (moof_size + mdat_hdr_size) as i32;
    for (pos, fragment) in offset_positions.into_iter().zip(fragments) {
        buf[pos..pos + 4].copy_from_slice(&data_offset.to_be_bytes());
        data_offset += fragment.data_size() as i32;
    }

    boxes::write_mdat_header(&mut buf, total_data_size);
    for sample in fragments.iter().flat_map(|f| &f.samples) {
        buf.put_slice(&sample.data);
    }

    buf.to_vec()
}
