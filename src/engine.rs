use tracing::info;

use crate::{
    core::Profile,
    error::TreadleResult,
    producer::Producer,
};

/// Explicit engine context: owns the active profile and opens producers
/// against it. Constructed and torn down by the driver; nothing here is
/// process-global.
#[derive(Clone, Debug)]
pub struct Engine {
    profile: Profile,
}

impl Engine {
    pub fn new(profile: Profile) -> Self {
        Self { profile }
    }

    pub fn with_default_profile() -> Self {
        Self::new(Profile::default())
    }

    pub fn profile(&self) -> Profile {
        self.profile
    }

    /// Open a resource against the engine profile; unreadable resources
    /// yield an invalid handle (see `Producer::is_valid`).
    pub fn open(&self, resource: &str) -> Producer {
        Producer::open(self.profile, resource)
    }

    pub fn try_open(&self, resource: &str) -> TreadleResult<Producer> {
        Producer::try_open(self.profile, resource)
    }

    /// Derive a refined profile from a producer's native parameters.
    ///
    /// Reopening is deliberately a separate, explicit step: profile
    /// parameters must be fixed before anything downstream composes, so
    /// auto-sizing callers probe once, derive, then open again.
    pub fn profile_from_producer(&self, producer: &Producer) -> TreadleResult<Profile> {
        let Some(info) = producer.probe() else {
            return Ok(self.profile);
        };
        let profile = Profile::new(info.width, info.height, info.fps)?;
        info!(
            width = profile.width,
            height = profile.height,
            fps = profile.fps.as_f64(),
            "derived profile from producer"
        );
        Ok(profile)
    }

    /// Context with the refined profile; the original engine is untouched.
    pub fn refined(&self, profile: Profile) -> Self {
        Self { profile }
    }
}
