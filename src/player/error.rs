//! Typed failures of the playback pipeline

use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlaybackError {
    /// The fetch tool ran but produced no audio for the track
    #[error("no playable source found for \"{track}\"")]
    Resolution { track: String },

    #[error("failed to start {tool}: {source}")]
    ProcessStart {
        tool: String,
        #[source]
        source: io::Error,
    },

    #[error("audio device unavailable: {0}")]
    AudioDevice(String),

    /// Cached file exists but did not probe as playable. Recovered by refetching.
    #[error("cached file {path} is not playable: {reason}")]
    CacheValidation { path: PathBuf, reason: String },

    #[error("teardown failed: {0}")]
    Teardown(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl PlaybackError {
    pub fn process_start(tool: impl Into<String>, source: io::Error) -> Self {
        PlaybackError::ProcessStart {
            tool: tool.into(),
            source,
        }
    }

    /// Whether the caller should fall back instead of aborting the play
    pub fn is_soft(&self) -> bool {
        matches!(self, PlaybackError::CacheValidation { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_cache_validation_is_soft() {
        let soft = PlaybackError::CacheValidation {
            path: PathBuf::from("/tmp/x.m4a"),
            reason: "no audio stream".into(),
        };
        assert!(soft.is_soft());
        assert!(!PlaybackError::AudioDevice("gone".into()).is_soft());
    }

    #[test]
    fn process_start_names_the_tool() {
        let err = PlaybackError::process_start(
            "yt-dlp",
            io::Error::new(io::ErrorKind::NotFound, "not found"),
        );
        assert_eq!(err.to_string(), "failed to start yt-dlp: not found");
    }
}
