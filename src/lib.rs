#![forbid(unsafe_code)]

pub mod anim;
pub mod composite;
pub mod consumer;
pub mod controller;
pub mod core;
pub mod engine;
pub mod error;
pub mod frame;
pub mod geometry;
pub mod playlist;
pub mod producer;
pub mod source;
pub mod tractor;
pub mod transition;

pub use anim::{InterpMode, Keyframe, Keyframes, Lerp};
pub use consumer::{
    ChannelSink, Consumer, ConsumerMonitor, ConsumerOpts, FrameSink, NullSink, PngSequenceSink,
};
pub use controller::PlaybackController;
pub use crate::core::{Fps, Profile, Rgba8Premul, Speed};
pub use engine::Engine;
pub use error::{TreadleError, TreadleResult};
pub use frame::{AudioBlock, Frame, FrameMeta, MIX_SAMPLE_RATE};
pub use geometry::GeometryAnim;
pub use playlist::{Playlist, PlaylistGuard};
pub use producer::{Producer, SourceInfo};
pub use source::FrameSource;
pub use tractor::{ControlCommand, EofPolicy, Track, Tractor};
pub use transition::{Transition, TransitionKind, parse_transition_kind};
