//! Audio output: one process-wide rodio stream, one `Sink` per session

use std::io::{self, Read};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender, TryRecvError};
use std::sync::{Arc, OnceLock};
use std::thread;
use std::time::Duration;

use rodio::{OutputStream, OutputStreamHandle, Sink, Source};

use super::byte_counter::{BYTES_PER_SAMPLE, CHANNELS, SAMPLE_RATE};
use super::error::PlaybackError;

const PUMP_CHUNK_BYTES: usize = 4096;
const FRAME_BYTES: usize = CHANNELS as usize * BYTES_PER_SAMPLE as usize;
/// Chunks buffered between the pump and the audio callback
const PCM_QUEUE_CHUNKS: usize = 4;

/// Opened on first use. A failure is kept too, so a missing device is
/// reported the same way for the rest of the process.
static OUTPUT: OnceLock<Result<OutputStreamHandle, String>> = OnceLock::new();
static LIVE_PLAYERS: AtomicUsize = AtomicUsize::new(0);

fn output_handle() -> Result<OutputStreamHandle, PlaybackError> {
    OUTPUT
        .get_or_init(open_output)
        .clone()
        .map_err(PlaybackError::AudioDevice)
}

/// `OutputStream` is not `Send`, so it lives on its own thread for the rest
/// of the process and only the handle is shared.
fn open_output() -> Result<OutputStreamHandle, String> {
    let (tx, rx) = mpsc::channel();
    thread::Builder::new()
        .name("audio-output".to_string())
        .spawn(move || match OutputStream::try_default() {
            Ok((stream, handle)) => {
                let _ = tx.send(Ok(handle));
                let _stream = stream;
                loop {
                    thread::park();
                }
            }
            Err(e) => {
                let _ = tx.send(Err(e.to_string()));
            }
        })
        .map_err(|e| e.to_string())?;

    let result = rx.recv().map_err(|e| e.to_string())?;
    match &result {
        Ok(_) => tracing::info!("Audio output opened"),
        Err(e) => tracing::error!(error = %e, "Audio output unavailable, playback disabled"),
    }
    result
}

/// Number of sinks created and not yet closed
pub fn live_players() -> usize {
    LIVE_PLAYERS.load(Ordering::SeqCst)
}

pub struct AudioSink {
    sink: Sink,
    stop: Arc<AtomicBool>,
    closed: bool,
}

impl AudioSink {
    /// Create a paused player fed from `pcm` by a pump thread
    pub fn new<R>(pcm: R) -> Result<Self, PlaybackError>
    where
        R: Read + Send + 'static,
    {
        let handle = output_handle()?;
        let sink = Sink::try_new(&handle).map_err(|e| PlaybackError::AudioDevice(e.to_string()))?;
        sink.pause();

        let (tx, rx) = mpsc::sync_channel(PCM_QUEUE_CHUNKS);
        let stop = Arc::new(AtomicBool::new(false));
        let pump_stop = stop.clone();
        thread::Builder::new()
            .name("pcm-pump".to_string())
            .spawn(move || pump(pcm, tx, pump_stop))?;

        sink.append(PcmSource::new(rx));
        LIVE_PLAYERS.fetch_add(1, Ordering::SeqCst);
        Ok(Self {
            sink,
            stop,
            closed: false,
        })
    }

    pub fn play(&self) {
        if !self.closed {
            self.sink.play();
        }
    }

    pub fn pause(&self) {
        self.sink.pause();
    }

    pub fn is_playing(&self) -> bool {
        !self.closed && !self.sink.is_paused()
    }

    /// Stop output and the pump. The pump exits on its next read or send.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.stop.store(true, Ordering::SeqCst);
        self.sink.stop();
        LIVE_PLAYERS.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Drop for AudioSink {
    fn drop(&mut self) {
        self.close();
    }
}

fn pump<R: Read>(mut pcm: R, tx: SyncSender<Vec<i16>>, stop: Arc<AtomicBool>) {
    let mut buf = [0u8; PUMP_CHUNK_BYTES];
    let mut carry = Vec::with_capacity(FRAME_BYTES);
    while !stop.load(Ordering::SeqCst) {
        let n = match pcm.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                tracing::debug!(error = %e, "PCM read failed");
                break;
            }
        };
        let samples = decode_frames(&mut carry, &buf[..n]);
        if !samples.is_empty() && tx.send(samples).is_err() {
            break;
        }
    }
    tracing::trace!("PCM pump stopped");
}

/// Decode whole s16le frames from `carry` + `data`, keeping any trailing
/// partial frame in `carry` for the next call
fn decode_frames(carry: &mut Vec<u8>, data: &[u8]) -> Vec<i16> {
    carry.extend_from_slice(data);
    let whole = carry.len() - carry.len() % FRAME_BYTES;
    let samples = carry[..whole]
        .chunks_exact(2)
        .map(|b| i16::from_le_bytes([b[0], b[1]]))
        .collect();
    carry.drain(..whole);
    samples
}

/// Pulls decoded chunks from the pump. Plays silence while the pump is behind
/// and ends once the pump is gone.
struct PcmSource {
    rx: Receiver<Vec<i16>>,
    current: Vec<i16>,
    pos: usize,
    pending_silence: u16,
}

impl PcmSource {
    fn new(rx: Receiver<Vec<i16>>) -> Self {
        Self {
            rx,
            current: Vec::new(),
            pos: 0,
            pending_silence: 0,
        }
    }
}

impl Iterator for PcmSource {
    type Item = i16;

    fn next(&mut self) -> Option<i16> {
        if self.pending_silence > 0 {
            self.pending_silence -= 1;
            return Some(0);
        }
        if self.pos >= self.current.len() {
            match self.rx.try_recv() {
                Ok(chunk) => {
                    self.current = chunk;
                    self.pos = 0;
                }
                Err(TryRecvError::Empty) => {
                    // whole frame of silence keeps channels aligned
                    self.pending_silence = CHANNELS - 1;
                    return Some(0);
                }
                Err(TryRecvError::Disconnected) => return None,
            }
        }
        let sample = self.current.get(self.pos).copied();
        self.pos += 1;
        sample
    }
}

impl Source for PcmSource {
    fn current_frame_len(&self) -> Option<usize> {
        None
    }

    fn channels(&self) -> u16 {
        CHANNELS
    }

    fn sample_rate(&self) -> u32 {
        SAMPLE_RATE
    }

    fn total_duration(&self) -> Option<Duration> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_frames_are_carried() {
        let mut carry = Vec::new();
        // one full frame (L=1, R=-1) plus half of the next
        let first = decode_frames(&mut carry, &[1, 0, 0xff, 0xff, 2, 0]);
        assert_eq!(first, vec![1, -1]);
        assert_eq!(carry, vec![2, 0]);

        let second = decode_frames(&mut carry, &[3, 0]);
        assert_eq!(second, vec![2, 3]);
        assert!(carry.is_empty());
    }

    #[test]
    fn underrun_plays_whole_silent_frames_then_ends() {
        let (tx, rx) = mpsc::sync_channel(2);
        let mut source = PcmSource::new(rx);

        assert_eq!(source.next(), Some(0));
        assert_eq!(source.next(), Some(0));

        tx.send(vec![5, 6]).unwrap();
        assert_eq!(source.next(), Some(5));
        assert_eq!(source.next(), Some(6));

        drop(tx);
        assert_eq!(source.next(), None);
    }

    #[test]
    fn pump_stops_at_eof_and_closes_channel() {
        let (tx, rx) = mpsc::sync_channel(8);
        let data: Vec<u8> = vec![0, 1, 0, 2, 0, 3, 0, 4];
        pump(io::Cursor::new(data), tx, Arc::new(AtomicBool::new(false)));

        assert_eq!(rx.recv().unwrap(), vec![256, 512, 768, 1024]);
        assert!(rx.recv().is_err());
    }

    #[test]
    fn pump_honours_stop_flag() {
        let (tx, rx) = mpsc::sync_channel(8);
        pump(io::Cursor::new(vec![0u8; 64]), tx, Arc::new(AtomicBool::new(true)));
        assert!(rx.recv().is_err());
    }
}
