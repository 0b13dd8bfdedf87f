use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender, unbounded};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::{
    core::{Profile, Speed},
    error::{TreadleError, TreadleResult},
    frame::Frame,
    geometry::GeometryAnim,
    playlist::Playlist,
    producer::Producer,
    source::FrameSource,
    transition::Transition,
};

/// What happens when the position would leave [0, playtime).
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EofPolicy {
    /// Hold the last frame and drop the speed to 0.
    Pause,
    /// Wrap back to position 0 (or the end, when playing in reverse).
    Loop,
}

/// A track slot: either a single producer or a playlist feeding the slot.
#[derive(Clone, Debug)]
pub enum Track {
    Producer(Producer),
    Playlist(Playlist),
}

impl Track {
    fn profile(&self) -> Profile {
        match self {
            Track::Producer(p) => p.profile(),
            Track::Playlist(pl) => pl.profile(),
        }
    }

    fn length(&self) -> Option<u64> {
        match self {
            Track::Producer(p) => p.length(),
            Track::Playlist(pl) => Some(pl.total_length()),
        }
    }

    fn is_valid(&self) -> bool {
        match self {
            Track::Producer(p) => p.is_valid(),
            Track::Playlist(pl) => !pl.is_empty(),
        }
    }

    fn frame_at(&self, position: u64) -> Frame {
        match self {
            Track::Producer(p) => {
                p.seek(position);
                p.get_frame()
            }
            Track::Playlist(pl) => pl.frame_at(position),
        }
    }
}

/// Control operations applied between pull-loop frame boundaries.
///
/// Geometry updates are last-writer-wins: a frame pulled while a sequence of
/// commands is still being sent may see a partially-updated parameter set.
#[derive(Debug)]
pub enum ControlCommand {
    Seek(u64),
    SetSpeed(Speed),
    /// Replace the playing content of a playlist track (append-then-remove).
    SwitchContent {
        track: usize,
        producer: Producer,
    },
    SetTransitionGeometry {
        transition: usize,
        geometry: GeometryAnim,
    },
    SetEofPolicy(EofPolicy),
}

#[derive(Debug)]
struct TractorState {
    profile: Profile,
    tracks: Vec<Track>,
    transitions: Vec<Transition>,
    position: u64,
    speed: Speed,
    carry: i64,
    eof: EofPolicy,
    commands_rx: Receiver<ControlCommand>,
}

/// The multi-track composition: ordered tracks and transitions exposed as a
/// single virtual frame stream with seek, speed, and end-of-stream policy.
///
/// Handles are cheap clones sharing one state; every operation locks it, so
/// a control thread can never race the pull loop's position advance.
#[derive(Clone, Debug)]
pub struct Tractor {
    inner: Arc<Mutex<TractorState>>,
    commands_tx: Sender<ControlCommand>,
}

impl Tractor {
    pub fn new(profile: Profile) -> Self {
        let (commands_tx, commands_rx) = unbounded();
        Self {
            inner: Arc::new(Mutex::new(TractorState {
                profile,
                tracks: Vec::new(),
                transitions: Vec::new(),
                position: 0,
                speed: Speed::STOP,
                carry: 0,
                eof: EofPolicy::Pause,
                commands_rx,
            })),
            commands_tx,
        }
    }

    /// Queue endpoint for control operations; commands are drained at the
    /// next frame boundary inside `get_frame`.
    pub fn commands(&self) -> Sender<ControlCommand> {
        self.commands_tx.clone()
    }

    /// Add a track at the next index (indices stay contiguous from 0).
    pub fn add_track(&self, track: Track) -> TreadleResult<usize> {
        let mut state = self.inner.lock();
        if track.profile() != state.profile {
            return Err(TreadleError::validation(
                "track profile does not match tractor profile",
            ));
        }
        state.tracks.push(track);
        Ok(state.tracks.len() - 1)
    }

    /// Attach a transition. Both referenced tracks must already exist.
    pub fn add_transition(&self, transition: Transition) -> TreadleResult<()> {
        let mut state = self.inner.lock();
        let count = state.tracks.len();
        if transition.a_track() >= count || transition.b_track() >= count {
            return Err(TreadleError::connection(format!(
                "transition references track {}/{} but tractor has {count} tracks",
                transition.a_track(),
                transition.b_track()
            )));
        }
        if transition.a_track() == transition.b_track() {
            return Err(TreadleError::connection(
                "transition a-track and b-track must differ",
            ));
        }
        state.transitions.push(transition);
        Ok(())
    }

    pub fn track_count(&self) -> usize {
        self.inner.lock().tracks.len()
    }

    pub fn position(&self) -> u64 {
        self.inner.lock().position
    }

    /// Playtime in frames, derived from the longest bounded track; 0 when
    /// every track is unbounded (end-of-stream policy never triggers then).
    pub fn playtime(&self) -> u64 {
        self.inner.lock().playtime()
    }

    pub fn speed(&self) -> Speed {
        self.inner.lock().speed
    }

    /// Change rate without touching the position. The fractional step
    /// remainder resets: it was accumulated in the old denominator.
    pub fn set_speed(&self, speed: Speed) {
        let mut state = self.inner.lock();
        state.speed = speed;
        state.carry = 0;
        debug!(speed = speed.as_f64(), "tractor speed set");
    }

    pub fn eof_policy(&self) -> EofPolicy {
        self.inner.lock().eof
    }

    pub fn set_eof_policy(&self, eof: EofPolicy) {
        self.inner.lock().eof = eof;
    }

    pub fn seek(&self, position: u64) {
        let mut state = self.inner.lock();
        state.seek(position);
    }

    /// Pull one composed frame at the current position, then advance by the
    /// current speed. Pending control commands are applied first, so they
    /// land exactly on a frame boundary.
    pub fn get_frame(&self) -> Frame {
        let mut state = self.inner.lock();

        while let Ok(cmd) = state.commands_rx.try_recv() {
            state.apply(cmd);
        }

        let position = state.position;
        let mut composed = if state.transitions.is_empty() {
            match state.tracks.first() {
                None => Frame::blank(state.profile, position),
                Some(track) => track.frame_at(position),
            }
        } else {
            // Transitions are validated against existing tracks, so the
            // track list is non-empty here. Track 0 is the background; other
            // tracks only appear through a transition.
            let frames: Vec<Frame> = state
                .tracks
                .iter()
                .map(|t| t.frame_at(position))
                .collect();
            let mut composed = frames[0].clone();
            for tr in &state.transitions {
                tr.apply(&mut composed, &frames[tr.b_track()], position);
            }
            composed
        };

        composed.meta.position = position;
        composed.meta.speed = state.speed.as_f64();

        state.advance();
        composed
    }
}

impl TractorState {
    fn playtime(&self) -> u64 {
        self.tracks.iter().filter_map(Track::length).max().unwrap_or(0)
    }

    fn seek(&mut self, position: u64) {
        let playtime = self.playtime();
        self.position = if playtime > 0 {
            position.min(playtime - 1)
        } else {
            position
        };
        self.carry = 0;
    }

    fn advance(&mut self) {
        if self.speed.is_stopped() {
            return;
        }

        let (steps, carry) = self.speed.advance(self.carry);
        self.carry = carry;

        let playtime = self.playtime();
        let next = i128::from(self.position) + i128::from(steps);

        if playtime == 0 {
            // Unbounded composition: never ends, just refuses to go negative.
            self.position = next.max(0) as u64;
            return;
        }

        let playtime_i = i128::from(playtime);
        if (0..playtime_i).contains(&next) {
            self.position = next as u64;
            return;
        }

        match self.eof {
            EofPolicy::Loop => {
                let wrapped = next.rem_euclid(playtime_i) as u64;
                debug!(from = self.position, to = wrapped, "position wrapped");
                self.position = wrapped;
            }
            EofPolicy::Pause => {
                debug!(position = self.position, "end of stream, pausing");
                self.position = if next < 0 { 0 } else { playtime - 1 };
                self.speed = Speed::STOP;
                self.carry = 0;
            }
        }
    }

    fn apply(&mut self, cmd: ControlCommand) {
        match cmd {
            ControlCommand::Seek(position) => self.seek(position),
            ControlCommand::SetSpeed(speed) => {
                self.speed = speed;
                self.carry = 0;
            }
            ControlCommand::SetEofPolicy(eof) => self.eof = eof,
            ControlCommand::SwitchContent { track, producer } => {
                match self.tracks.get(track) {
                    Some(Track::Playlist(pl)) => {
                        let result = pl.lock().switch_content(producer);
                        if let Err(e) = result {
                            warn!(track, error = %e, "switch content failed");
                        }
                    }
                    Some(Track::Producer(_)) => {
                        warn!(track, "switch content requires a playlist track");
                    }
                    None => warn!(track, "switch content on nonexistent track"),
                }
            }
            ControlCommand::SetTransitionGeometry {
                transition,
                geometry,
            } => match self.transitions.get_mut(transition) {
                Some(tr) => tr.set_geometry(geometry),
                None => warn!(transition, "geometry update on nonexistent transition"),
            },
        }
    }
}

impl FrameSource for Tractor {
    fn profile(&self) -> Profile {
        self.inner.lock().profile
    }

    fn pull(&self) -> Frame {
        self.get_frame()
    }

    fn position(&self) -> u64 {
        Tractor::position(self)
    }

    fn is_valid(&self) -> bool {
        let state = self.inner.lock();
        !state.tracks.is_empty() && state.tracks.iter().all(Track::is_valid)
    }
}
