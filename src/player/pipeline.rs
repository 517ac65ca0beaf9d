//! Fetch and transcode pipeline: yt-dlp | (tee to cache) | ffmpeg -> raw PCM

use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::config::{AppConfig, FetchAuth, ToolPaths};
use crate::model::Track;

use super::byte_counter::{ByteCounter, CHANNELS, SAMPLE_RATE};
use super::error::PlaybackError;
use super::process::{
    group_command, spawn_stderr_logger, terminate_process_tree, ToolLogKind, ToolLogLine, ToolLogSender,
};
use super::resolve::SearchRequest;

pub const CACHE_SUBDIR: &str = "yt-audio";
pub const CACHE_EXT: &str = "m4a";
pub const FETCH_LOG: &str = "ytstderr.log";
pub const TRANSCODE_LOG: &str = "ffstderr.log";

/// Set once the user has been told ffprobe is missing
static PROBE_MISSING_REPORTED: AtomicBool = AtomicBool::new(false);

const TEE_JOIN_TIMEOUT: Duration = Duration::from_secs(2);
const TEE_POLL: Duration = Duration::from_millis(10);
const TEE_BUF_SIZE: usize = 64 * 1024;

pub type PcmStream = ByteCounter<ChildStdout>;

#[derive(Clone, Debug)]
pub struct PipelineConfig {
    pub tools: ToolPaths,
    pub cache_dir: PathBuf,
    pub cache_enabled: bool,
    pub debug_dir: PathBuf,
    pub auth: FetchAuth,
}

impl From<&AppConfig> for PipelineConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            tools: config.tools.clone(),
            cache_dir: config.cache_dir.join(CACHE_SUBDIR),
            cache_enabled: !config.disable_cache,
            debug_dir: config.debug_dir.clone(),
            auth: config.yt_dlp_args.clone(),
        }
    }
}

impl PipelineConfig {
    pub fn cache_path(&self, track_id: &str) -> PathBuf {
        self.cache_dir.join(format!("{}.{}", track_id, CACHE_EXT))
    }
}

/// Subprocesses and files backing one track. Dropping without `close` tears
/// down as a skip.
pub struct StreamPipeline {
    track_id: String,
    fetch: Option<Child>,
    transcoder: Option<Child>,
    tee: Option<JoinHandle<io::Result<u64>>>,
    cache_path: PathBuf,
    created_cache: bool,
    replayed: bool,
    closed: bool,
}

impl StreamPipeline {
    /// Spawn the processes for `track` and return the PCM stream. A valid cache
    /// file is replayed instead of fetching.
    pub fn start(
        track: &Track,
        config: &PipelineConfig,
        log_tx: Option<ToolLogSender>,
    ) -> Result<(PcmStream, StreamPipeline), PlaybackError> {
        if let Err(e) = fs::create_dir_all(&config.debug_dir) {
            tracing::warn!(dir = %config.debug_dir.display(), error = %e, "Could not create debug dir");
        }

        let cache_path = config.cache_path(&track.id);
        if cache_path.is_file() {
            match probe_audio(&config.tools.ffprobe, &cache_path) {
                Ok(()) => {
                    tracing::info!(track_id = %track.id, path = %cache_path.display(), "Replaying cached audio");
                    return Self::replay(track, config, cache_path);
                }
                Err(e) => {
                    tracing::warn!(track_id = %track.id, error = %e, "Cached audio rejected, fetching again");
                    if let PlaybackError::ProcessStart { .. } = e {
                        report_missing_probe(&config.tools.ffprobe, log_tx.as_ref());
                    }
                }
            }
        }

        Self::fetch(track, config, cache_path, log_tx)
    }

    fn replay(
        track: &Track,
        config: &PipelineConfig,
        cache_path: PathBuf,
    ) -> Result<(PcmStream, StreamPipeline), PlaybackError> {
        let file = File::open(&cache_path)?;
        let mut transcoder = spawn_transcoder(config, Stdio::from(file))?;
        let stdout = match take_transcoder_io(&mut transcoder, config) {
            Ok(stdout) => stdout,
            Err(e) => {
                let _ = terminate_process_tree(&mut transcoder);
                return Err(e);
            }
        };

        let pipeline = StreamPipeline {
            track_id: track.id.clone(),
            fetch: None,
            transcoder: Some(transcoder),
            tee: None,
            cache_path,
            created_cache: false,
            replayed: true,
            closed: false,
        };
        Ok((ByteCounter::new(stdout), pipeline))
    }

    fn fetch(
        track: &Track,
        config: &PipelineConfig,
        cache_path: PathBuf,
        log_tx: Option<ToolLogSender>,
    ) -> Result<(PcmStream, StreamPipeline), PlaybackError> {
        let request = SearchRequest::for_track(track);
        let mut fetch = group_command(&config.tools.yt_dlp)
            .args(request.args(&config.auth))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| PlaybackError::process_start(config.tools.yt_dlp.display().to_string(), e))?;

        tracing::info!(
            track_id = %track.id,
            pid = fetch.id(),
            query = %request.query,
            cache = config.cache_enabled,
            "Started fetch"
        );

        if let Some(stderr) = fetch.stderr.take() {
            spawn_stderr_logger("yt-dlp", stderr, &config.debug_dir.join(FETCH_LOG), log_tx);
        }

        let Some(fetch_out) = fetch.stdout.take() else {
            abort_start(&mut [&mut fetch], None);
            return Err(io::Error::other("fetch stdout was not captured").into());
        };

        if !config.cache_enabled {
            let mut transcoder = match spawn_transcoder(config, Stdio::from(fetch_out)) {
                Ok(child) => child,
                Err(e) => {
                    abort_start(&mut [&mut fetch], None);
                    return Err(e);
                }
            };
            let stdout = match take_transcoder_io(&mut transcoder, config) {
                Ok(stdout) => stdout,
                Err(e) => {
                    abort_start(&mut [&mut transcoder, &mut fetch], None);
                    return Err(e);
                }
            };
            let pipeline = StreamPipeline {
                track_id: track.id.clone(),
                fetch: Some(fetch),
                transcoder: Some(transcoder),
                tee: None,
                cache_path,
                created_cache: false,
                replayed: false,
                closed: false,
            };
            return Ok((ByteCounter::new(stdout), pipeline));
        }

        let cache_file = match create_cache_file(&cache_path) {
            Ok(f) => f,
            Err(e) => {
                abort_start(&mut [&mut fetch], None);
                return Err(e.into());
            }
        };
        let mut transcoder = match spawn_transcoder(config, Stdio::piped()) {
            Ok(child) => child,
            Err(e) => {
                drop(cache_file);
                abort_start(&mut [&mut fetch], Some(&cache_path));
                return Err(e);
            }
        };
        let stdin = transcoder.stdin.take();
        let (stdin, stdout) = match (stdin, take_transcoder_io(&mut transcoder, config)) {
            (Some(stdin), Ok(stdout)) => (stdin, stdout),
            (_, result) => {
                drop(cache_file);
                abort_start(&mut [&mut transcoder, &mut fetch], Some(&cache_path));
                return Err(result
                    .err()
                    .unwrap_or_else(|| io::Error::other("transcoder stdin was not captured").into()));
            }
        };

        let pipeline = StreamPipeline {
            track_id: track.id.clone(),
            fetch: Some(fetch),
            transcoder: Some(transcoder),
            tee: Some(spawn_tee(fetch_out, cache_file, stdin)),
            cache_path,
            created_cache: true,
            replayed: false,
            closed: false,
        };
        Ok((ByteCounter::new(stdout), pipeline))
    }

    pub fn cache_path(&self) -> &Path {
        &self.cache_path
    }

    pub fn created_cache(&self) -> bool {
        self.created_cache
    }

    pub fn is_replay(&self) -> bool {
        self.replayed
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Tear everything down: transcoder first, then fetch, then the tee. With
    /// `is_skip` a cache file written by this pipeline is removed since it is
    /// probably incomplete. Safe to call more than once.
    pub fn close(&mut self, is_skip: bool) -> Result<(), PlaybackError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let mut first_err: Option<PlaybackError> = None;

        for (tool, child) in [("ffmpeg", self.transcoder.take()), ("yt-dlp", self.fetch.take())] {
            let Some(mut child) = child else { continue };
            if let Err(e) = terminate_process_tree(&mut child) {
                tracing::warn!(track_id = %self.track_id, tool, error = %e, "Failed to terminate");
                first_err.get_or_insert(PlaybackError::Teardown(format!("{}: {}", tool, e)));
            }
        }

        if let Some(tee) = self.tee.take() {
            let deadline = Instant::now() + TEE_JOIN_TIMEOUT;
            while !tee.is_finished() && Instant::now() < deadline {
                thread::sleep(TEE_POLL);
            }
            if tee.is_finished() {
                match tee.join() {
                    Ok(Ok(bytes)) => tracing::debug!(track_id = %self.track_id, bytes, "Cache tee finished"),
                    Ok(Err(e)) => tracing::debug!(track_id = %self.track_id, error = %e, "Cache tee stopped"),
                    Err(_) => tracing::warn!(track_id = %self.track_id, "Cache tee panicked"),
                }
            } else {
                tracing::warn!(track_id = %self.track_id, "Cache tee did not stop in time, detaching");
            }
        }

        if is_skip && self.created_cache {
            match fs::remove_file(&self.cache_path) {
                Ok(()) => tracing::debug!(path = %self.cache_path.display(), "Removed partial cache"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!(path = %self.cache_path.display(), error = %e, "Failed to remove partial cache");
                    first_err.get_or_insert(PlaybackError::Io(e));
                }
            }
        }

        tracing::debug!(track_id = %self.track_id, is_skip, "Pipeline closed");
        first_err.map_or(Ok(()), Err)
    }
}

impl Drop for StreamPipeline {
    fn drop(&mut self) {
        if !self.closed {
            tracing::debug!(track_id = %self.track_id, "Pipeline dropped without close");
            let _ = self.close(true);
        }
    }
}

/// Best-effort cleanup when a start fails halfway
fn abort_start(children: &mut [&mut Child], cache_file: Option<&Path>) {
    for child in children.iter_mut() {
        if let Err(e) = terminate_process_tree(child) {
            tracing::warn!(pid = child.id(), error = %e, "Failed to terminate after aborted start");
        }
    }
    if let Some(path) = cache_file {
        let _ = fs::remove_file(path);
    }
}

fn create_cache_file(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    File::create(path)
}

fn spawn_transcoder(config: &PipelineConfig, stdin: Stdio) -> Result<Child, PlaybackError> {
    let ffmpeg = &config.tools.ffmpeg;
    group_command(ffmpeg)
        .args(["-i", "pipe:0", "-f", "s16le", "-acodec", "pcm_s16le", "-ac"])
        .arg(CHANNELS.to_string())
        .arg("-ar")
        .arg(SAMPLE_RATE.to_string())
        .arg("pipe:1")
        .stdin(stdin)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| PlaybackError::process_start(ffmpeg.display().to_string(), e))
}

fn take_transcoder_io(transcoder: &mut Child, config: &PipelineConfig) -> Result<ChildStdout, PlaybackError> {
    if let Some(stderr) = transcoder.stderr.take() {
        spawn_stderr_logger("ffmpeg", stderr, &config.debug_dir.join(TRANSCODE_LOG), None);
    }
    transcoder
        .stdout
        .take()
        .ok_or_else(|| io::Error::other("transcoder stdout was not captured").into())
}

/// Copy fetched bytes into the cache file and the transcoder. Ends on fetch
/// EOF or the first write error, e.g. a broken pipe after the transcoder is
/// killed. Both outputs are closed when the thread ends.
fn spawn_tee(
    mut source: ChildStdout,
    mut cache: File,
    mut sink: ChildStdin,
) -> JoinHandle<io::Result<u64>> {
    thread::spawn(move || {
        let mut buf = vec![0u8; TEE_BUF_SIZE];
        let mut total = 0u64;
        loop {
            let n = match source.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            cache.write_all(&buf[..n])?;
            sink.write_all(&buf[..n])?;
            total += n as u64;
        }
        cache.flush()?;
        Ok(total)
    })
}

/// Tell the UI once per process that cached audio cannot be checked
fn report_missing_probe(ffprobe: &Path, log_tx: Option<&ToolLogSender>) {
    let Some(tx) = log_tx else {
        return;
    };
    if PROBE_MISSING_REPORTED.swap(true, Ordering::SeqCst) {
        return;
    }
    let _ = tx.send(ToolLogLine {
        tool: "ffprobe".to_string(),
        kind: ToolLogKind::Error,
        text: format!("{} is missing, cached audio will not be replayed", ffprobe.display()),
    });
}

/// Ask ffprobe whether `path` holds at least one decodable audio stream.
/// A probe that cannot be started is a `ProcessStart` error.
pub fn probe_audio(ffprobe: &Path, path: &Path) -> Result<(), PlaybackError> {
    let invalid = |reason: String| PlaybackError::CacheValidation {
        path: path.to_path_buf(),
        reason,
    };

    let output = Command::new(ffprobe)
        .args(["-v", "error", "-select_streams", "a:0", "-show_entries", "stream=codec_name", "-of", "json"])
        .arg(path)
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .output()
        .map_err(|e| PlaybackError::process_start("ffprobe", e))?;

    if !output.status.success() {
        return Err(invalid(format!("probe exited with {}", output.status)));
    }

    let report: serde_json::Value = serde_json::from_slice(&output.stdout)
        .map_err(|e| invalid(format!("unreadable probe output: {}", e)))?;
    let has_audio = report
        .get("streams")
        .and_then(serde_json::Value::as_array)
        .is_some_and(|streams| !streams.is_empty());
    if has_audio {
        Ok(())
    } else {
        Err(invalid("no audio stream".to_string()))
    }
}


#[cfg(all(test, unix))]
mod tests {
    use super::test_tools::config;
    use super::*;
    use crate::model::track::track;

    fn drain(stream: &mut PcmStream) -> Vec<u8> {
        let mut out = Vec::new();
        stream.read_to_end(&mut out).unwrap();
        out
    }

    #[test]
    fn fetch_tees_into_cache_and_keeps_it_on_natural_end() {
        let work = tempfile::tempdir().unwrap();
        let cfg = config(work.path(), "yt_ok", "probe_ok", true);
        let (mut pcm, mut pipeline) = StreamPipeline::start(&track("a", 180), &cfg, None).unwrap();

        assert_eq!(drain(&mut pcm), b"AUDIODATA");
        assert!(pipeline.created_cache());
        pipeline.close(false).unwrap();

        assert_eq!(fs::read(cfg.cache_path("a")).unwrap(), b"AUDIODATA");
        assert_eq!(pcm.handle().total_bytes(), 9);
    }

    #[test]
    fn skip_removes_cache_created_by_session() {
        let work = tempfile::tempdir().unwrap();
        let cfg = config(work.path(), "yt_slow", "probe_ok", true);
        let (mut pcm, mut pipeline) = StreamPipeline::start(&track("b", 180), &cfg, None).unwrap();

        let mut head = [0u8; 4];
        pcm.read_exact(&mut head).unwrap();
        assert_eq!(&head, b"HEAD");
        assert!(cfg.cache_path("b").exists());

        pipeline.close(true).unwrap();
        assert!(!cfg.cache_path("b").exists());
        assert!(pipeline.is_closed());
        pipeline.close(true).unwrap();
    }

    #[test]
    fn valid_cache_is_replayed_and_never_deleted() {
        let work = tempfile::tempdir().unwrap();
        let cfg = config(work.path(), "yt_fail", "probe_ok", true);
        fs::create_dir_all(&cfg.cache_dir).unwrap();
        fs::write(cfg.cache_path("c"), b"CACHED").unwrap();

        let (mut pcm, mut pipeline) = StreamPipeline::start(&track("c", 180), &cfg, None).unwrap();
        assert!(pipeline.is_replay());
        assert_eq!(drain(&mut pcm), b"CACHED");

        pipeline.close(true).unwrap();
        assert_eq!(fs::read(cfg.cache_path("c")).unwrap(), b"CACHED");
    }

    #[test]
    fn invalid_cache_falls_back_to_fetch() {
        let work = tempfile::tempdir().unwrap();
        let cfg = config(work.path(), "yt_ok", "probe_empty", true);
        fs::create_dir_all(&cfg.cache_dir).unwrap();
        fs::write(cfg.cache_path("d"), b"garbage").unwrap();

        let (mut pcm, mut pipeline) = StreamPipeline::start(&track("d", 180), &cfg, None).unwrap();
        assert!(!pipeline.is_replay());
        assert_eq!(drain(&mut pcm), b"AUDIODATA");
        pipeline.close(false).unwrap();
        assert_eq!(fs::read(cfg.cache_path("d")).unwrap(), b"AUDIODATA");
    }

    #[test]
    fn disabled_cache_writes_nothing() {
        let work = tempfile::tempdir().unwrap();
        let cfg = config(work.path(), "yt_ok", "probe_ok", false);
        let (mut pcm, mut pipeline) = StreamPipeline::start(&track("e", 180), &cfg, None).unwrap();

        assert_eq!(drain(&mut pcm), b"AUDIODATA");
        assert!(!pipeline.created_cache());
        pipeline.close(true).unwrap();
        assert!(!cfg.cache_path("e").exists());
    }

    #[test]
    fn fetch_stderr_is_logged_and_forwarded() {
        let work = tempfile::tempdir().unwrap();
        let cfg = config(work.path(), "yt_ok", "probe_ok", false);
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let (mut pcm, mut pipeline) = StreamPipeline::start(&track("f", 180), &cfg, Some(tx)).unwrap();
        drain(&mut pcm);
        pipeline.close(false).unwrap();

        let line = rx.blocking_recv().unwrap();
        assert_eq!(line.kind, crate::player::process::ToolLogKind::Download);
        let log = fs::read_to_string(cfg.debug_dir.join(FETCH_LOG)).unwrap();
        assert!(log.contains("[download] 100%"));
    }

    #[test]
    fn missing_fetch_tool_is_a_start_error() {
        let work = tempfile::tempdir().unwrap();
        let mut cfg = config(work.path(), "yt_ok", "probe_ok", true);
        cfg.tools.yt_dlp = work.path().join("does-not-exist");

        let err = StreamPipeline::start(&track("g", 180), &cfg, None).err().unwrap();
        assert!(matches!(err, PlaybackError::ProcessStart { .. }));
        assert!(!cfg.cache_path("g").exists());
    }

    #[test]
    fn missing_transcoder_cleans_up_cache_file() {
        let work = tempfile::tempdir().unwrap();
        let mut cfg = config(work.path(), "yt_slow", "probe_ok", true);
        cfg.tools.ffmpeg = work.path().join("no-ffmpeg");

        let err = StreamPipeline::start(&track("h", 180), &cfg, None).err().unwrap();
        assert!(matches!(err, PlaybackError::ProcessStart { .. }));
        assert!(!cfg.cache_path("h").exists());
    }

    #[test]
    fn probe_requires_audio_streams() {
        let work = tempfile::tempdir().unwrap();
        let file = work.path().join("x.m4a");
        fs::write(&file, b"x").unwrap();
        let stubs = super::test_tools::stubs();

        assert!(probe_audio(&stubs.tool("probe_ok"), &file).is_ok());
        let err = probe_audio(&stubs.tool("probe_empty"), &file).unwrap_err();
        assert!(err.is_soft());
        let err = probe_audio(&work.path().join("none"), &file).unwrap_err();
        assert!(matches!(err, PlaybackError::ProcessStart { .. }));
    }

    #[test]
    fn missing_probe_is_reported_once_and_fetch_still_runs() {
        let work = tempfile::tempdir().unwrap();
        let mut cfg = config(work.path(), "yt_ok", "probe_ok", true);
        cfg.tools.ffprobe = work.path().join("no-ffprobe");
        fs::create_dir_all(&cfg.cache_dir).unwrap();
        fs::write(cfg.cache_path("p"), b"CACHED").unwrap();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

        for _ in 0..2 {
            let (mut pcm, mut pipeline) =
                StreamPipeline::start(&track("p", 180), &cfg, Some(tx.clone())).unwrap();
            assert!(!pipeline.is_replay());
            assert_eq!(drain(&mut pcm), b"AUDIODATA");
            pipeline.close(false).unwrap();
        }
        drop(tx);

        let mut probe_lines = Vec::new();
        while let Some(line) = rx.blocking_recv() {
            if line.tool == "ffprobe" {
                probe_lines.push(line);
            }
        }
        assert_eq!(probe_lines.len(), 1);
        assert_eq!(probe_lines[0].kind, ToolLogKind::Error);
        assert!(probe_lines[0].text.contains("no-ffprobe"));
    }
}
