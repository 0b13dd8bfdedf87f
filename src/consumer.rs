use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU32, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::{
    error::{TreadleError, TreadleResult},
    frame::Frame,
    source::FrameSource,
};

const STATE_STOPPED: u8 = 0;
const STATE_STARTING: u8 = 1;
const STATE_RUNNING: u8 = 2;
const STATE_STOPPING: u8 = 3;

/// Where delivered frames go. Sink failures are logged and playback
/// continues; the pull loop never aborts on a bad delivery.
pub trait FrameSink: Send {
    fn deliver(&mut self, frame: &Frame) -> TreadleResult<()>;
}

/// Discards every frame; useful for benchmarks and as a muted target.
pub struct NullSink;

impl FrameSink for NullSink {
    fn deliver(&mut self, _frame: &Frame) -> TreadleResult<()> {
        Ok(())
    }
}

/// Hands frames to an embedding application over a channel.
pub struct ChannelSink {
    tx: crossbeam_channel::Sender<Frame>,
}

impl ChannelSink {
    pub fn new(tx: crossbeam_channel::Sender<Frame>) -> Self {
        Self { tx }
    }
}

impl FrameSink for ChannelSink {
    fn deliver(&mut self, frame: &Frame) -> TreadleResult<()> {
        self.tx
            .send(frame.clone())
            .map_err(|_| TreadleError::connection("frame channel receiver dropped"))
    }
}

/// Writes numbered PNGs into a directory.
pub struct PngSequenceSink {
    dir: PathBuf,
    next_index: u64,
}

impl PngSequenceSink {
    pub fn create(dir: impl Into<PathBuf>) -> TreadleResult<Self> {
        use anyhow::Context as _;
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("create output dir '{}'", dir.display()))?;
        Ok(Self { dir, next_index: 0 })
    }
}

impl FrameSink for PngSequenceSink {
    fn deliver(&mut self, frame: &Frame) -> TreadleResult<()> {
        use anyhow::Context as _;
        let path = self.dir.join(format!("frame_{:06}.png", self.next_index));
        image::save_buffer_with_format(
            &path,
            frame.data(),
            frame.width,
            frame.height,
            image::ColorType::Rgba8,
            image::ImageFormat::Png,
        )
        .with_context(|| format!("write png '{}'", path.display()))?;
        self.next_index += 1;
        Ok(())
    }
}

#[derive(Clone, Copy, Debug)]
pub struct ConsumerOpts {
    /// Pacing mode: `>0` paced to the source frame rate, `0` as fast as
    /// possible delivering everything, `<0` best-effort — paced, but frames
    /// that miss their slot are pulled and dropped instead of delivered.
    pub real_time: i32,
    /// Initial audio gate; `<= 0` strips audio from delivered frames
    /// without touching the video clock.
    pub volume: f32,
}

impl Default for ConsumerOpts {
    fn default() -> Self {
        Self {
            real_time: 1,
            volume: 1.0,
        }
    }
}

#[derive(Debug)]
struct Shared {
    state: AtomicU8,
    volume_bits: AtomicU32,
    period_nanos: AtomicU64,
    last_delivery: Mutex<Option<Instant>>,
}

impl Shared {
    fn volume(&self) -> f32 {
        f32::from_bits(self.volume_bits.load(Ordering::Relaxed))
    }
}

/// Cloneable read-only view usable from any thread while the consumer runs:
/// control code polls this concurrently with the pull loop.
#[derive(Clone, Debug)]
pub struct ConsumerMonitor {
    shared: Arc<Shared>,
    started_at: Instant,
}

impl ConsumerMonitor {
    pub fn is_stopped(&self) -> bool {
        self.shared.state.load(Ordering::Acquire) == STATE_STOPPED
    }

    /// Report a stall when no frame has been delivered for more than
    /// `max_late_frames` frame periods. Nothing recovers automatically; a
    /// blocked upstream read keeps the loop blocked.
    pub fn check_stall(&self, max_late_frames: u32) -> TreadleResult<()> {
        if self.is_stopped() {
            return Ok(());
        }
        let period = Duration::from_nanos(self.shared.period_nanos.load(Ordering::Relaxed));
        if period.is_zero() {
            return Ok(());
        }
        let since = match *self.shared.last_delivery.lock() {
            Some(at) => at.elapsed(),
            None => self.started_at.elapsed(),
        };
        let limit = period * max_late_frames.max(1);
        if since > limit {
            return Err(TreadleError::stall(format!(
                "no frame delivered for {since:?} (limit {limit:?})"
            )));
        }
        Ok(())
    }
}

/// The sink end of the pipeline: pulls frames from its connected upstream on
/// a dedicated thread and hands them to a `FrameSink`.
///
/// Reconnecting while running is not supported; switch the *content* inside
/// the tractor/playlist instead and leave the connection alone.
pub struct Consumer {
    shared: Arc<Shared>,
    opts: ConsumerOpts,
    upstream: Option<Arc<dyn FrameSource>>,
    sink: Option<Box<dyn FrameSink>>,
    thread: Option<JoinHandle<Box<dyn FrameSink>>>,
    started_at: Instant,
}

impl std::fmt::Debug for Consumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Consumer")
            .field("opts", &self.opts)
            .field("connected", &self.upstream.is_some())
            .field("running", &!self.is_stopped())
            .finish_non_exhaustive()
    }
}

impl Consumer {
    pub fn new(sink: Box<dyn FrameSink>, opts: ConsumerOpts) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: AtomicU8::new(STATE_STOPPED),
                volume_bits: AtomicU32::new(opts.volume.to_bits()),
                period_nanos: AtomicU64::new(0),
                last_delivery: Mutex::new(None),
            }),
            opts,
            upstream: None,
            sink: Some(sink),
            thread: None,
            started_at: Instant::now(),
        }
    }

    /// Replace the upstream. Only legal while stopped, and the source must
    /// be valid — a failed open cannot be wired into a running pipeline.
    pub fn connect(&mut self, source: Arc<dyn FrameSource>) -> TreadleResult<()> {
        if !self.is_stopped() {
            return Err(TreadleError::connection(
                "consumer connect is only legal while stopped",
            ));
        }
        if !source.is_valid() {
            return Err(TreadleError::connection(
                "cannot connect an invalid source",
            ));
        }
        self.upstream = Some(source);
        Ok(())
    }

    pub fn is_stopped(&self) -> bool {
        self.shared.state.load(Ordering::Acquire) == STATE_STOPPED
    }

    pub fn monitor(&self) -> ConsumerMonitor {
        ConsumerMonitor {
            shared: self.shared.clone(),
            started_at: self.started_at,
        }
    }

    pub fn volume(&self) -> f32 {
        self.shared.volume()
    }

    /// Audio gate, adjustable from any thread while running. `<= 0` mutes:
    /// audio is stripped from delivered frames, the video clock keeps going.
    pub fn set_volume(&self, volume: f32) {
        self.shared
            .volume_bits
            .store(volume.to_bits(), Ordering::Relaxed);
    }

    /// Spawn the pull loop. Legal only while stopped with an upstream
    /// connected.
    pub fn start(&mut self) -> TreadleResult<()> {
        if !self.is_stopped() {
            return Err(TreadleError::connection("consumer is already running"));
        }
        let Some(source) = self.upstream.clone() else {
            return Err(TreadleError::connection(
                "consumer has no upstream connected",
            ));
        };
        let sink = self
            .sink
            .take()
            .ok_or_else(|| TreadleError::connection("consumer sink is gone"))?;

        let profile = source.profile();
        let period = Duration::from_secs_f64(profile.fps.frame_duration_secs());
        self.shared
            .period_nanos
            .store(period.as_nanos() as u64, Ordering::Relaxed);
        self.started_at = Instant::now();
        *self.shared.last_delivery.lock() = None;

        self.shared.state.store(STATE_STARTING, Ordering::Release);
        let shared = self.shared.clone();
        let real_time = self.opts.real_time;

        let handle = match thread::Builder::new()
            .name("treadle-consumer".to_string())
            .spawn(move || pull_loop(shared, source, sink, period, real_time))
        {
            Ok(handle) => handle,
            Err(e) => {
                self.shared.state.store(STATE_STOPPED, Ordering::Release);
                return Err(TreadleError::Other(e.into()));
            }
        };
        self.thread = Some(handle);

        info!(
            fps = profile.fps.as_f64(),
            real_time, "consumer started"
        );
        Ok(())
    }

    /// Signal the loop and block until it has exited. Stopping is
    /// cooperative, checked once per frame boundary, so this can block for
    /// up to one frame period (longer if the upstream is stalled).
    pub fn stop(&mut self) {
        if self.is_stopped() {
            return;
        }
        self.shared.state.store(STATE_STOPPING, Ordering::Release);
        if let Some(handle) = self.thread.take() {
            match handle.join() {
                Ok(sink) => self.sink = Some(sink),
                Err(_) => warn!("consumer thread panicked; sink lost"),
            }
        }
        self.shared.state.store(STATE_STOPPED, Ordering::Release);
        debug!("consumer stopped");
    }
}

impl Drop for Consumer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn pull_loop(
    shared: Arc<Shared>,
    source: Arc<dyn FrameSource>,
    mut sink: Box<dyn FrameSink>,
    period: Duration,
    real_time: i32,
) -> Box<dyn FrameSink> {
    shared.state.store(STATE_RUNNING, Ordering::Release);
    let mut next_deadline = Instant::now();
    let mut delivered = 0u64;
    let mut dropped = 0u64;

    loop {
        if shared.state.load(Ordering::Acquire) == STATE_STOPPING {
            break;
        }

        if real_time > 0 {
            let now = Instant::now();
            if now < next_deadline {
                thread::sleep(next_deadline - now);
            }
        }

        let mut frame = source.pull();

        let deliver = if real_time < 0 {
            // Best effort: a frame that missed its slot is dropped and the
            // clock resyncs instead of chasing the backlog.
            let now = Instant::now();
            if now > next_deadline + period {
                next_deadline = now + period;
                false
            } else {
                next_deadline += period;
                true
            }
        } else {
            next_deadline += period;
            true
        };

        if deliver {
            if shared.volume() <= 0.0 {
                frame = frame.without_audio();
            }
            if let Err(e) = sink.deliver(&frame) {
                warn!(position = frame.meta.position, error = %e, "sink delivery failed");
            }
            *shared.last_delivery.lock() = Some(Instant::now());
            delivered += 1;
        } else {
            dropped += 1;
        }
    }

    debug!(delivered, dropped, "pull loop exited");
    sink
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Fps, Profile};
    use crate::producer::Producer;

    fn profile() -> Profile {
        Profile::new(4, 4, Fps::new(200, 1).unwrap()).unwrap()
    }

    #[test]
    fn connect_rejects_invalid_source() {
        let mut consumer = Consumer::new(Box::new(NullSink), ConsumerOpts::default());
        let bad = Producer::open(profile(), "/no/such/file.png");
        let err = consumer.connect(Arc::new(bad)).unwrap_err();
        assert!(matches!(err, TreadleError::Connection(_)));
    }

    #[test]
    fn start_without_upstream_is_a_connection_error() {
        let mut consumer = Consumer::new(Box::new(NullSink), ConsumerOpts::default());
        assert!(matches!(
            consumer.start().unwrap_err(),
            TreadleError::Connection(_)
        ));
    }

    #[test]
    fn lifecycle_runs_and_stops() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let mut consumer = Consumer::new(
            Box::new(ChannelSink::new(tx)),
            ConsumerOpts {
                real_time: 0,
                volume: 1.0,
            },
        );
        let src = Producer::open(profile(), "color:112233");
        consumer.connect(Arc::new(src)).unwrap();
        assert!(consumer.is_stopped());

        consumer.start().unwrap();
        let monitor = consumer.monitor();
        // Free-running at a tiny profile: frames arrive promptly.
        let first = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(first.meta.position, 0);
        assert!(!monitor.is_stopped());

        consumer.stop();
        assert!(consumer.is_stopped());
        assert!(monitor.is_stopped());

        // Restartable after stop: the sink survives the round trip.
        consumer.start().unwrap();
        let _ = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        consumer.stop();
    }

    #[test]
    fn connect_while_running_is_rejected() {
        let mut consumer = Consumer::new(Box::new(NullSink), ConsumerOpts {
            real_time: 0,
            volume: 1.0,
        });
        let src = Producer::open(profile(), "color:112233");
        consumer.connect(Arc::new(src.clone())).unwrap();
        consumer.start().unwrap();
        let err = consumer.connect(Arc::new(src)).unwrap_err();
        assert!(matches!(err, TreadleError::Connection(_)));
        consumer.stop();
    }

    #[test]
    fn muting_strips_audio_only() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let mut consumer = Consumer::new(
            Box::new(ChannelSink::new(tx)),
            ConsumerOpts {
                real_time: 0,
                volume: 0.0,
            },
        );
        let src = Producer::open(profile(), "noise:1");
        consumer.connect(Arc::new(src)).unwrap();
        consumer.start().unwrap();
        let frame = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        consumer.stop();
        assert!(frame.audio.is_none());
    }

    #[test]
    fn stall_check_passes_while_frames_flow() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let mut consumer = Consumer::new(
            Box::new(ChannelSink::new(tx)),
            ConsumerOpts {
                real_time: 0,
                volume: 1.0,
            },
        );
        let src = Producer::open(profile(), "color:112233");
        consumer.connect(Arc::new(src)).unwrap();
        consumer.start().unwrap();
        let _ = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        // Generous limit: the loop is free-running, far faster than this.
        assert!(consumer.monitor().check_stall(1000).is_ok());
        consumer.stop();
        assert!(consumer.monitor().check_stall(1).is_ok());
    }
}
