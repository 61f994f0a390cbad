//! ISO BMFF box serialization primitives.
//!
//! Boxes are written in place into a shared [`BytesMut`]: the size field is
//! reserved when a box is opened and patched when it is closed, so nested
//! containers never need to be assembled from intermediate buffers.

use bytes::{BufMut, BytesMut};
use fr_core::Codec;

use super::writer::TrackConfig;

/// Movie-level timescale used in `mvhd`.
pub(crate) const MOVIE_TIMESCALE: u32 = 1000;

/// `trun` sample flags for a sync sample (sample_depends_on = 2).
pub(crate) const SYNC_SAMPLE_FLAGS: u32 = 0x0200_0000;
/// `trun` sample flags for a non-sync sample (depends_on = 1, is_non_sync).
pub(crate) const NON_SYNC_SAMPLE_FLAGS: u32 = 0x0101_0000;

const IDENTITY_MATRIX: [u32; 9] = [0x0001_0000, 0, 0, 0, 0x0001_0000, 0, 0, 0, 0x4000_0000];

// ---------------------------------------------------------------------------
// Low-level helpers
// ---------------------------------------------------------------------------

/// Open a box and return its start offset; close it with [`end_box`].
pub(crate) fn begin_box(buf: &mut BytesMut, box_type: &[u8; 4]) -> usize {
    let start = buf.len();
    buf.put_u32(0); // size placeholder
    buf.put_slice(box_type);
    start
}

/// Open a full box (box header + version + 24-bit flags).
pub(crate) fn begin_full_box(buf: &mut BytesMut, box_type: &[u8; 4], version: u8, flags: u32) -> usize {
    let start = begin_box(buf, box_type);
    buf.put_u32((u32::from(version) << 24) | (flags & 0x00FF_FFFF));
    start
}

/// Patch the size of the box opened at `start`.
pub(crate) fn end_box(buf: &mut BytesMut, start: usize) {
    let size = (buf.len() - start) as u32;
    buf[start..start + 4].copy_from_slice(&size.to_be_bytes());
}

fn put_matrix(buf: &mut BytesMut) {
    for v in IDENTITY_MATRIX {
        buf.put_u32(v);
    }
}

// ---------------------------------------------------------------------------
// Init segment boxes
// ---------------------------------------------------------------------------

/// `ftyp`: major brand "iso5", compatible brands iso5/iso6/mp41.
pub(crate) fn write_ftyp(buf: &mut BytesMut) {
    let start = begin_box(buf, b"ftyp");
    buf.put_slice(b"iso5");
    buf.put_u32(0x200);
    buf.put_slice(b"iso5");
    buf.put_slice(b"iso6");
    buf.put_slice(b"mp41");
    end_box(buf, start);
}

/// `mvhd`, version 1 with zero duration (duration lives in the fragments).
pub(crate) fn write_mvhd(buf: &mut BytesMut, next_track_id: u32) {
    let start = begin_full_box(buf, b"mvhd", 1, 0);
    buf.put_u64(0); // creation_time
    buf.put_u64(0); // modification_time
    buf.put_u32(MOVIE_TIMESCALE);
    buf.put_u64(0); // duration
    buf.put_u32(0x0001_0000); // rate 1.0
    buf.put_u16(0x0100); // volume 1.0
    buf.put_bytes(0, 10); // reserved
    put_matrix(buf);
    buf.put_bytes(0, 24); // pre_defined
    buf.put_u32(next_track_id);
    end_box(buf, start);
}

fn write_tkhd(buf: &mut BytesMut, track: &TrackConfig) {
    // flags = enabled | in_movie | in_preview
    let start = begin_full_box(buf, b"tkhd", 1, 7);
    buf.put_u64(0);
    buf.put_u64(0);
    buf.put_u32(track.track_id);
    buf.put_u32(0); // reserved
    buf.put_u64(0); // duration
    buf.put_bytes(0, 8); // reserved
    buf.put_u16(0); // layer
    buf.put_u16(0); // alternate_group
    buf.put_u16(if track.codec.is_video() { 0 } else { 0x0100 });
    buf.put_u16(0);
    put_matrix(buf);
    if track.codec.is_video() {
        buf.put_u32(track.width << 16);
        buf.put_u32(track.height << 16);
    } else {
        buf.put_u32(0);
        buf.put_u32(0);
    }
    end_box(buf, start);
}

fn write_mdhd(buf: &mut BytesMut, timescale: u32) {
    let start = begin_full_box(buf, b"mdhd", 1, 0);
    buf.put_u64(0);
    buf.put_u64(0);
    buf.put_u32(timescale);
    buf.put_u64(0);
    buf.put_u16(0x55C4); // language "und"
    buf.put_u16(0);
    end_box(buf, start);
}

fn write_hdlr(buf: &mut BytesMut, is_video: bool) {
    let (handler, name): (&[u8; 4], &[u8]) = if is_video {
        (b"vide", b"VideoHandler")
    } else {
        (b"soun", b"SoundHandler")
    };
    let start = begin_full_box(buf, b"hdlr", 0, 0);
    buf.put_u32(0); // pre_defined
    buf.put_slice(handler);
    buf.put_bytes(0, 12);
    buf.put_slice(name);
    buf.put_u8(0);
    end_box(buf, start);
}

fn write_dinf(buf: &mut BytesMut) {
    let dinf = begin_box(buf, b"dinf");
    let dref = begin_full_box(buf, b"dref", 0, 0);
    buf.put_u32(1); // entry count
    let url = begin_full_box(buf, b"url ", 0, 1); // self-contained
    end_box(buf, url);
    end_box(buf, dref);
    end_box(buf, dinf);
}

fn write_media_header(buf: &mut BytesMut, is_video: bool) {
    if is_video {
        let start = begin_full_box(buf, b"vmhd", 0, 1);
        buf.put_u16(0); // graphicsmode
        buf.put_bytes(0, 6); // opcolor
        end_box(buf, start);
    } else {
        let start = begin_full_box(buf, b"smhd", 0, 0);
        buf.put_u16(0); // balance
        buf.put_u16(0);
        end_box(buf, start);
    }
}

fn write_visual_sample_entry(buf: &mut BytesMut, track: &TrackConfig) {
    let (entry_type, config_type): (&[u8; 4], &[u8; 4]) = match track.codec {
        Codec::H265 => (b"hvc1", b"hvcC"),
        _ => (b"avc1", b"avcC"),
    };
    let start = begin_box(buf, entry_type);
    buf.put_bytes(0, 6);
    buf.put_u16(1); // data reference index
    buf.put_bytes(0, 16);
    buf.put_u16(track.width as u16);
    buf.put_u16(track.height as u16);
    buf.put_u32(0x0048_0000); // 72 dpi
    buf.put_u32(0x0048_0000);
    buf.put_u32(0);
    buf.put_u16(1); // frame count
    buf.put_bytes(0, 32); // compressor name
    buf.put_u16(0x0018); // depth
    buf.put_i16(-1);
    if !track.codec_private.is_empty() {
        let config = begin_box(buf, config_type);
        buf.put_slice(&track.codec_private);
        end_box(buf, config);
    }
    end_box(buf, start);
}

fn write_audio_sample_entry(buf: &mut BytesMut, track: &TrackConfig) {
    let (entry_type, config_type): (&[u8; 4], &[u8; 4]) = match track.codec {
        Codec::Opus => (b"Opus", b"dOps"),
        _ => (b"mp4a", b"esds"),
    };
    let start = begin_box(buf, entry_type);
    buf.put_bytes(0, 6);
    buf.put_u16(1);
    buf.put_bytes(0, 8);
    buf.put_u16(track.channels);
    buf.put_u16(16); // sample size
    buf.put_u16(0);
    buf.put_u16(0);
    buf.put_u32(track.sample_rate << 16);
    if !track.codec_private.is_empty() {
        let config = begin_box(buf, config_type);
        buf.put_slice(&track.codec_private);
        end_box(buf, config);
    }
    end_box(buf, start);
}

fn write_stbl(buf: &mut BytesMut, track: &TrackConfig) {
    let stbl = begin_box(buf, b"stbl");

    let stsd = begin_full_box(buf, b"stsd", 0, 0);
    buf.put_u32(1);
    if track.codec.is_video() {
        write_visual_sample_entry(buf, track);
    } else {
        write_audio_sample_entry(buf, track);
    }
    end_box(buf, stsd);

    // Sample tables stay empty; samples live in the fragments.
    for table in [b"stts", b"stsc", b"stco"] {
        let start = begin_full_box(buf, table, 0, 0);
        buf.put_u32(0);
        end_box(buf, start);
    }
    let stsz = begin_full_box(buf, b"stsz", 0, 0);
    buf.put_u32(0); // sample size
    buf.put_u32(0); // sample count
    end_box(buf, stsz);

    end_box(buf, stbl);
}

/// `trak` for one track; the hierarchy is tkhd + mdia(mdhd, hdlr, minf).
pub(crate) fn write_trak(buf: &mut BytesMut, track: &TrackConfig) {
    let is_video = track.codec.is_video();
    let trak = begin_box(buf, b"trak");
    write_tkhd(buf, track);

    let mdia = begin_box(buf, b"mdia");
    write_mdhd(buf, track.timescale);
    write_hdlr(buf, is_video);

    let minf = begin_box(buf, b"minf");
    write_media_header(buf, is_video);
    write_dinf(buf);
    write_stbl(buf, track);
    end_box(buf, minf);

    end_box(buf, mdia);
    end_box(buf, trak);
}

/// `mvex` with one `trex` per track.
pub(crate) fn write_mvex(buf: &mut BytesMut, track_ids: impl Iterator<Item = u32>) {
    let mvex = begin_box(buf, b"mvex");
    for track_id in track_ids {
        let trex = begin_full_box(buf, b"trex", 0, 0);
        buf.put_u32(track_id);
        buf.put_u32(1); // default sample description index
        buf.put_u32(0); // default sample duration
        buf.put_u32(0); // default sample size
        buf.put_u32(0); // default sample flags
        end_box(buf, trex);
    }
    end_box(buf, mvex);
}

// ---------------------------------------------------------------------------
// Fragment boxes
// ---------------------------------------------------------------------------

pub(crate) fn write_mfhd(buf: &mut BytesMut, sequence_number: u32) {
    let start = begin_full_box(buf, b"mfhd", 0, 0);
    buf.put_u32(sequence_number);
    end_box(buf, start);
}

/// `tfhd` with default-base-is-moof (0x020000).
pub(crate) fn write_tfhd(buf: &mut BytesMut, track_id: u32) {
    let start = begin_full_box(buf, b"tfhd", 0, 0x02_0000);
    buf.put_u32(track_id);
    end_box(buf, start);
}

/// `tfdt`, version 1 for a 64-bit base media decode time.
pub(crate) fn write_tfdt(buf: &mut BytesMut, base_media_decode_time: u64) {
    let start = begin_full_box(buf, b"tfdt", 1, 0);
    buf.put_u64(base_media_decode_time);
    end_box(buf, start);
}

/// A single sample's entry in `trun`.
pub(crate) struct TrunSample {
    pub duration: u32,
    pub size: u32,
    pub flags: u32,
    pub composition_time_offset: i32,
}

/// `trun` flags: data-offset, duration, size, flags and composition offset present.
const TRUN_FLAGS: u32 = 0x000001 | 0x000100 | 0x000200 | 0x000400 | 0x000800;

/// Write a `trun` with a zero data offset and return the offset of that
/// field so the caller can patch it once the moof size is known.
pub(crate) fn write_trun(buf: &mut BytesMut, samples: &[TrunSample]) -> usize {
    // version 1: signed composition offsets
    let start = begin_full_box(buf, b"trun", 1, TRUN_FLAGS);
    buf.put_u32(samples.len() as u32);
    let data_offset_pos = buf.len();
    buf.put_i32(0);
    for s in samples {
        buf.put_u32(s.duration);
        buf.put_u32(s.size);
        buf.put_u32(s.flags);
        buf.put_i32(s.composition_time_offset);
    }
    end_box(buf, start);
    data_offset_pos
}

/// Size of the `mdat` header for a payload of `data_size` bytes.
pub(crate) fn mdat_header_size(data_size: u64) -> usize {
    if data_size + 8 > u64::from(u32::MAX) {
        16
    } else {
        8
    }
}

/// Write the `mdat` header; the caller appends the payload.
pub(crate) fn write_mdat_header(buf: &mut BytesMut, data_size: u64) {
    if mdat_header_size(data_size) == 16 {
        buf.put_u32(1); // extended size marker
        buf.put_slice(b"mdat");
        buf.put_u64(data_size + 16);
    } else {
        buf.put_u32((data_size + 8) as u32);
        buf.put_slice(b"mdat");
    }
}
