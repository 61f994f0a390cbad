//! Recorder configuration types.
//!
//! The top-level [`RecorderConfig`] is deserialized from TOML and carries the
//! segmentation policy plus the list of tracks the session will receive.
//! Scalar settings default sensibly; only `[[tracks]]` must be provided for a
//! usable recorder.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Result;
use crate::ids::TrackId;
use crate::media::Codec;
use crate::Error;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Root recorder configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    /// Directory receiving one file per closed segment.
    pub output_dir: PathBuf,
    /// Target segment duration in milliseconds.
    #[serde(default = "default_segment_duration_ms")]
    pub segment_duration_ms: u64,
    /// How far behind the triggering sample a new segment may be anchored.
    #[serde(default = "default_max_lookback_ms")]
    pub max_lookback_ms: u64,
    pub tracks: Vec<TrackSettings>,
}

fn default_segment_duration_ms() -> u64 {
    4000
}

fn default_max_lookback_ms() -> u64 {
    1000
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("./recordings"),
            segment_duration_ms: default_segment_duration_ms(),
            max_lookback_ms: default_max_lookback_ms(),
            tracks: Vec::new(),
        }
    }
}

impl RecorderConfig {
    /// Deserialize a `RecorderConfig` from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str).map_err(|e| Error::Validation(format!("config parse error: {e}")))
    }

    /// Load configuration from a file. A missing file is an error.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Load configuration from a file path, falling back to defaults if the
    /// path is `None` or the file does not exist.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };

        match std::fs::read_to_string(path) {
            Ok(contents) => Self::from_toml(&contents).unwrap_or_else(|e| {
                tracing::warn!("Failed to parse config file {}: {e}", path.display());
                Self::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No config file at {}; using defaults", path.display());
                Self::default()
            }
            Err(e) => {
                tracing::warn!("Failed to read config file {}: {e}", path.display());
                Self::default()
            }
        }
    }

    pub fn segment_duration(&self) -> Duration {
        Duration::from_millis(self.segment_duration_ms)
    }

    pub fn max_lookback(&self) -> Duration {
        Duration::from_millis(self.max_lookback_ms)
    }

    /// Check the configuration.
    ///
    /// Problems that make a session impossible are returned as
    /// [`Error::Validation`]; non-fatal issues come back as warnings.
    pub fn validate(&self) -> Result<Vec<String>> {
        if self.segment_duration_ms == 0 {
            return Err(Error::Validation("segment_duration_ms must be positive".into()));
        }
        if self.max_lookback_ms == 0 {
            return Err(Error::Validation("max_lookback_ms must be positive".into()));
        }
        if self.tracks.is_empty() {
            return Err(Error::Validation("at least one track is required".into()));
        }

        let mut seen = HashSet::new();
        for (i, track) in self.tracks.iter().enumerate() {
            if track.id.get() == 0 {
                return Err(Error::Validation(format!("tracks[{i}].id must be at least 1")));
            }
            if !seen.insert(track.id) {
                return Err(Error::Validation(format!("duplicate track id {}", track.id)));
            }
            if track.clock_rate == 0 {
                return Err(Error::Validation(format!(
                    "tracks[{i}].clock_rate must be positive"
                )));
            }
            track
                .codec_private_bytes()
                .map_err(|e| Error::Validation(format!("tracks[{i}].codec_private: {e}")))?;
        }

        let mut warnings = Vec::new();

        if !self.tracks.iter().any(|t| t.codec.is_video()) {
            warnings.push("no video track; any track may trigger segment splits".into());
        }

        if self.segment_duration_ms < self.max_lookback_ms {
            warnings.push(format!(
                "segment_duration_ms ({}) is shorter than max_lookback_ms ({})",
                self.segment_duration_ms, self.max_lookback_ms
            ));
        }

        for (i, track) in self.tracks.iter().enumerate() {
            if track.codec.is_video() && (track.width == 0 || track.height == 0) {
                warnings.push(format!("tracks[{i}] is video but has no dimensions"));
            }
            if !track.codec.is_video() && track.sample_rate == 0 {
                warnings.push(format!("tracks[{i}] is audio but sample_rate is 0"));
            }
        }

        Ok(warnings)
    }
}

// ---------------------------------------------------------------------------
// Track settings
// ---------------------------------------------------------------------------

/// One track of the recording.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackSettings {
    pub id: TrackId,
    pub codec: Codec,
    /// Tick rate of the track's timestamps (also the container timescale).
    pub clock_rate: u32,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
    #[serde(default)]
    pub sample_rate: u32,
    #[serde(default)]
    pub channels: u16,
    /// Codec configuration record (avcC, hvcC, esds or dOps payload) as hex.
    #[serde(default)]
    pub codec_private: Option<String>,
}

impl TrackSettings {
    /// Decode the hex codec configuration; empty when absent.
    pub fn codec_private_bytes(&self) -> std::result::Result<Vec<u8>, hex::FromHexError> {
        match &self.codec_private {
            Some(s) => hex::decode(s.trim()),
            None => Ok(Vec::new()),
        }
    }
}
