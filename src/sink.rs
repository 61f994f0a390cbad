//! File persistence for recorded segments.
//!
//! [`FileSegmentWriter`] turns every segment into one self-contained fMP4
//! file: the multi-track init segment followed by a single fragment holding
//! one run per track. Files are named after the segment's wall-clock start.

use std::collections::{BTreeMap, HashMap};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use fr_core::config::{RecorderConfig, TrackSettings};
use fr_core::{Error, Result, TrackId};
use fr_media::fmp4::{write_init_segment, write_media_segment, SampleInfo, TrackConfig, TrackFragment};
use fr_segmenter::{Sample, Segment, SegmentWriter, Track};

/// File name pattern for a segment starting at a given wall-clock time.
const FILE_NAME_FORMAT: &str = "%Y-%m-%d_%H-%M-%S-%6f";

/// Alternative names tried before giving up on a taken segment name.
const MAX_NAME_ATTEMPTS: u32 = 1000;

struct OpenFile {
    path: PathBuf,
    file: BufWriter<File>,
    runs: BTreeMap<TrackId, Vec<SampleInfo>>,
}

/// Writes each segment to `<output_dir>/<start>.mp4`.
pub struct FileSegmentWriter {
    output_dir: PathBuf,
    init_segment: Vec<u8>,
    timescales: HashMap<TrackId, u32>,
    current: Option<OpenFile>,
    written: Vec<PathBuf>,
}

impl FileSegmentWriter {
    /// Create the output directory and prepare the init segment for `tracks`.
    pub fn new(output_dir: impl Into<PathBuf>, tracks: &[TrackSettings]) -> Result<Self> {
        let output_dir = output_dir.into();
        std::fs::create_dir_all(&output_dir)?;

        let configs = tracks
            .iter()
            .map(track_config)
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            output_dir,
            init_segment: write_init_segment(&configs),
            timescales: tracks.iter().map(|t| (t.id, t.clock_rate)).collect(),
            current: None,
            written: Vec::new(),
        })
    }

    pub fn from_config(config: &RecorderConfig) -> Result<Self> {
        Self::new(&config.output_dir, &config.tracks)
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Paths of every segment file closed so far, in order.
    pub fn segments(&self) -> &[PathBuf] {
        &self.written
    }

    /// Create the file for `segment` without touching existing files.
    ///
    /// The start-time name is tried first, then `-<sequence>`, then
    /// `-<sequence>-<n>`.
    fn create_segment_file(&self, segment: &Segment) -> Result<(PathBuf, File)> {
        let name = segment.start_ntp().format(FILE_NAME_FORMAT).to_string();
        let sequence = segment.sequence();

        let candidates = std::iter::once(format!("{name}.mp4"))
            .chain(std::iter::once(format!("{name}-{sequence}.mp4")))
            .chain((2..MAX_NAME_ATTEMPTS).map(|n| format!("{name}-{sequence}-{n}.mp4")));

        for candidate in candidates {
            let path = self.output_dir.join(candidate);
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => return Ok((path, file)),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(Error::from(std::io::Error::new(
            ErrorKind::AlreadyExists,
            format!("no free file name for segment {sequence} ({name})"),
        )))
    }
}

fn track_config(track: &TrackSettings) -> Result<TrackConfig> {
    let codec_private = track
        .codec_private_bytes()
        .map_err(|e| Error::Validation(format!("track {}: codec_private: {e}", track.id)))?;
    Ok(TrackConfig {
        track_id: track.id.get(),
        timescale: track.clock_rate,
        codec: track.codec,
        width: track.width,
        height: track.height,
        sample_rate: track.sample_rate,
        channels: track.channels,
        codec_private,
    })
}

fn no_open_file(sequence: u64) -> Error {
    Error::from(std::io::Error::other(format!(
        "segment {sequence} has no open file"
    )))
}

impl SegmentWriter for FileSegmentWriter {
    fn initialize(&mut self, segment: &Segment) -> Result<()> {
        let (path, file) = self.create_segment_file(segment)?;
        let mut file = BufWriter::new(file);
        file.write_all(&self.init_segment)?;

        tracing::debug!(segment = segment.sequence(), path = %path.display(), "created segment file");
        self.current = Some(OpenFile {
            path,
            file,
            runs: BTreeMap::new(),
        });
        Ok(())
    }

    fn write_sample(&mut self, segment: &Segment, track: &Track, sample: Sample) -> Result<()> {
        let open = self
            .current
            .as_mut()
            .ok_or_else(|| no_open_file(segment.sequence()))?;
        open.runs.entry(track.id).or_default().push(SampleInfo {
            data: sample.payload,
            duration: sample.duration.unwrap_or(0),
            is_keyframe: sample.is_sync,
            composition_offset: sample.pts_offset,
        });
        Ok(())
    }

    fn close(&mut self, segment: &Segment) -> Result<()> {
        let mut open = self
            .current
            .take()
            .ok_or_else(|| no_open_file(segment.sequence()))?;

        let fragments: Vec<TrackFragment> = open
            .runs
            .into_iter()
            .filter_map(|(id, samples)| {
                let run = segment.run(id)?;
                let timescale = self.timescales.get(&id).copied()?;
                // Never negative: samples before the segment start are dropped upstream.
                let base = (run.base_time - segment.start()).to_ticks(timescale).max(0);
                Some(TrackFragment {
                    track_id: id.get(),
                    base_decode_time: base as u64,
                    samples,
                })
            })
            .collect();

        if !fragments.is_empty() {
            let sequence = u32::try_from(segment.sequence()).unwrap_or(u32::MAX);
            open.file.write_all(&write_media_segment(sequence, &fragments))?;
        }
        open.file.flush()?;

        tracing::info!(
            segment = segment.sequence(),
            path = %open.path.display(),
            duration = %segment.duration().unwrap_or_default(),
            samples = segment.sample_count(),
            "wrote segment"
        );
        self.written.push(open.path);
        Ok(())
    }
}
