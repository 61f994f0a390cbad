//! Media-domain enums for codecs and track kinds.
//!
//! All enums serialize in lowercase (via `serde(rename_all = "lowercase")`) and
//! implement `Display` manually for consistent string representation.

use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// TrackKind
// ---------------------------------------------------------------------------

/// Broad classification of a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Video,
    Audio,
}

impl fmt::Display for TrackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Video => write!(f, "video"),
            Self::Audio => write!(f, "audio"),
        }
    }
}

// ---------------------------------------------------------------------------
// Codec
// ---------------------------------------------------------------------------

/// Codecs a track can carry in the recorded container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Codec {
    H264,
    H265,
    Aac,
    Opus,
}

impl Codec {
    /// Track kind implied by the codec.
    pub fn kind(self) -> TrackKind {
        match self {
            Self::H264 | Self::H265 => TrackKind::Video,
            Self::Aac | Self::Opus => TrackKind::Audio,
        }
    }

    pub fn is_video(self) -> bool {
        self.kind() == TrackKind::Video
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::H264 => write!(f, "h264"),
            Self::H265 => write!(f, "h265"),
            Self::Aac => write!(f, "aac"),
            Self::Opus => write!(f, "opus"),
        }
    }
}
