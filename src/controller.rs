use std::sync::Arc;

use crossbeam_channel::Sender;
use tracing::warn;

use crate::{
    consumer::Consumer,
    core::Speed,
    engine::Engine,
    error::TreadleResult,
    geometry::GeometryAnim,
    playlist::Playlist,
    tractor::{ControlCommand, EofPolicy, Track, Tractor},
};

/// Driver-facing orchestration over a built pipeline.
///
/// Every mutating verb becomes a message into the tractor's control queue
/// and lands on the next frame boundary, so the consumer keeps pulling while
/// the pipeline reconfigures. Failures a driver must know about (opening a
/// missing resource, a malformed animation) surface immediately instead.
#[derive(Debug)]
pub struct PlaybackController {
    engine: Engine,
    tractor: Tractor,
    consumer: Consumer,
    commands: Sender<ControlCommand>,
    content_track: usize,
}

impl PlaybackController {
    /// Wire a consumer to a tractor and take control of both. The consumer
    /// must be stopped; the connection itself can fail (invalid tractor).
    pub fn new(engine: Engine, tractor: Tractor, mut consumer: Consumer) -> TreadleResult<Self> {
        consumer.connect(Arc::new(tractor.clone()))?;
        let commands = tractor.commands();
        Ok(Self {
            engine,
            tractor,
            consumer,
            commands,
            content_track: 0,
        })
    }

    /// The canonical single-source pipeline, the way a player driver builds
    /// it: open, probe, reopen with the derived profile, wrap in a playlist
    /// on track 0 so the content can be switched live.
    pub fn single_playlist(
        engine: Engine,
        resource: &str,
        consumer: Consumer,
    ) -> TreadleResult<Self> {
        let first = engine.try_open(resource)?;
        let profile = engine.profile_from_producer(&first)?;
        let engine = engine.refined(profile);
        let producer = engine.try_open(resource)?;

        let playlist = Playlist::new(profile);
        playlist.lock().append(producer)?;

        let tractor = Tractor::new(profile);
        tractor.add_track(Track::Playlist(playlist))?;

        Self::new(engine, tractor, consumer)
    }

    /// Which track `switch_content` targets; must be a playlist track.
    pub fn set_content_track(&mut self, track: usize) {
        self.content_track = track;
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn tractor(&self) -> &Tractor {
        &self.tractor
    }

    pub fn start(&mut self) -> TreadleResult<()> {
        self.consumer.start()
    }

    pub fn stop(&mut self) {
        self.consumer.stop();
    }

    pub fn seek(&self, position: u64) {
        self.send(ControlCommand::Seek(position));
    }

    pub fn set_speed(&self, speed: Speed) {
        self.send(ControlCommand::SetSpeed(speed));
    }

    pub fn set_eof_policy(&self, eof: EofPolicy) {
        self.send(ControlCommand::SetEofPolicy(eof));
    }

    /// Open the replacement resource now (failures surface here), then queue
    /// the playlist's append-before-remove switch for the next frame
    /// boundary.
    pub fn switch_content(&self, resource: &str) -> TreadleResult<()> {
        let producer = self.engine.try_open(resource)?;
        self.send(ControlCommand::SwitchContent {
            track: self.content_track,
            producer,
        });
        Ok(())
    }

    /// Parse the animation text now (malformed input surfaces here), then
    /// queue the geometry swap.
    pub fn set_transition_geometry(&self, transition: usize, animation: &str) -> TreadleResult<()> {
        let geometry = GeometryAnim::parse(animation, self.engine.profile())?;
        self.send(ControlCommand::SetTransitionGeometry {
            transition,
            geometry,
        });
        Ok(())
    }

    pub fn set_volume(&self, volume: f32) {
        self.consumer.set_volume(volume);
    }

    pub fn is_stopped(&self) -> bool {
        self.consumer.is_stopped()
    }

    pub fn position(&self) -> u64 {
        self.tractor.position()
    }

    pub fn playtime(&self) -> u64 {
        self.tractor.playtime()
    }

    pub fn speed(&self) -> Speed {
        self.tractor.speed()
    }

    pub fn monitor(&self) -> crate::consumer::ConsumerMonitor {
        self.consumer.monitor()
    }

    fn send(&self, cmd: ControlCommand) {
        // The tractor handle we hold keeps the receiver alive, so this only
        // fails if the state is torn down mid-send.
        if self.commands.send(cmd).is_err() {
            warn!("control command dropped: tractor is gone");
        }
    }
}
