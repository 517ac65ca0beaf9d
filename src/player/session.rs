//! One playing track: a pipeline plus the sink consuming it

use crate::model::Track;

use super::byte_counter::PositionHandle;
use super::error::PlaybackError;
use super::pipeline::{PipelineConfig, StreamPipeline};
use super::process::ToolLogSender;
use super::sink::AudioSink;

/// What the controller needs from a live track
pub trait Session: Send + Sync {
    fn play(&self);
    fn pause(&self);
    fn is_playing(&self) -> bool;
    fn position(&self) -> PositionHandle;
    /// Idempotent. `is_skip` marks the track as not fully played.
    fn close(&mut self, is_skip: bool) -> Result<(), PlaybackError>;
}

/// Creates sessions. Blocking: spawns processes and opens the audio device.
pub trait SessionFactory: Send + Sync {
    fn start(&self, track: &Track) -> Result<Box<dyn Session>, PlaybackError>;
}

pub struct PlaybackSession {
    pipeline: StreamPipeline,
    sink: AudioSink,
    position: PositionHandle,
}

impl PlaybackSession {
    pub fn start(
        track: &Track,
        config: &PipelineConfig,
        log_tx: Option<ToolLogSender>,
    ) -> Result<Self, PlaybackError> {
        let (pcm, mut pipeline) = StreamPipeline::start(track, config, log_tx)?;
        let position = pcm.handle();
        let sink = match AudioSink::new(pcm) {
            Ok(sink) => sink,
            Err(e) => {
                if let Err(close_err) = pipeline.close(true) {
                    tracing::warn!(track_id = %track.id, error = %close_err, "Cleanup after audio failure");
                }
                return Err(e);
            }
        };
        sink.play();
        Ok(Self {
            pipeline,
            sink,
            position,
        })
    }
}

impl Session for PlaybackSession {
    fn play(&self) {
        self.sink.play();
    }

    fn pause(&self) {
        self.sink.pause();
    }

    fn is_playing(&self) -> bool {
        self.sink.is_playing()
    }

    fn position(&self) -> PositionHandle {
        self.position.clone()
    }

    fn close(&mut self, is_skip: bool) -> Result<(), PlaybackError> {
        self.sink.close();
        self.pipeline.close(is_skip)
    }
}

/// Real factory: yt-dlp + ffmpeg + rodio
pub struct YtSessionFactory {
    config: PipelineConfig,
    log_tx: Option<ToolLogSender>,
}

impl YtSessionFactory {
    pub fn new(config: PipelineConfig, log_tx: Option<ToolLogSender>) -> Self {
        Self { config, log_tx }
    }
}

impl SessionFactory for YtSessionFactory {
    fn start(&self, track: &Track) -> Result<Box<dyn Session>, PlaybackError> {
        let session = PlaybackSession::start(track, &self.config, self.log_tx.clone())?;
        Ok(Box::new(session))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::model::track::track;
    use crate::player::pipeline::test_tools::config;

    #[test]
    fn fetch_start_failure_never_opens_audio() {
        let work = tempfile::tempdir().unwrap();
        let mut cfg = config(work.path(), "yt_ok", "probe_ok", true);
        cfg.tools.yt_dlp = work.path().join("missing-yt-dlp");

        let factory = YtSessionFactory::new(cfg, None);
        let before = crate::player::sink::live_players();
        let err = factory.start(&track("a", 100)).err().unwrap();
        assert!(matches!(err, PlaybackError::ProcessStart { .. }));
        assert_eq!(crate::player::sink::live_players(), before);
    }
}
