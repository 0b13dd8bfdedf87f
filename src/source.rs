use crate::{core::Profile, frame::Frame};

/// Anything a consumer can drain: a single producer or a whole tractor.
///
/// Implementations are shared handles; `pull` takes `&self` and serializes
/// internally, so the consumer thread and control code can hold the same
/// source. `pull` never fails — sources substitute blank frames for anything
/// they cannot provide, preserving the real-time output guarantee.
pub trait FrameSource: Send + Sync {
    fn profile(&self) -> Profile;

    /// Produce the frame at the current position and advance.
    fn pull(&self) -> Frame;

    fn position(&self) -> u64;

    fn is_valid(&self) -> bool;
}
