use crate::{
    composite::blit_scaled_over,
    error::{TreadleError, TreadleResult},
    frame::Frame,
    geometry::GeometryAnim,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransitionKind {
    Composite,
}

pub fn parse_transition_kind(kind: &str) -> TreadleResult<TransitionKind> {
    match kind.trim().to_ascii_lowercase().as_str() {
        "" => Err(TreadleError::validation("transition kind must be non-empty")),
        "composite" => Ok(TransitionKind::Composite),
        other => Err(TreadleError::validation(format!(
            "unknown transition kind '{other}'"
        ))),
    }
}

/// A binary operator between two tracks of a tractor: the b-track frame is
/// scaled into the geometry rect sampled at the current position, then
/// blended over the running a-side composite.
#[derive(Clone, Debug)]
pub struct Transition {
    a_track: usize,
    b_track: usize,
    kind: TransitionKind,
    geometry: GeometryAnim,
}

impl Transition {
    pub fn composite(a_track: usize, b_track: usize, geometry: GeometryAnim) -> Self {
        Self {
            a_track,
            b_track,
            kind: TransitionKind::Composite,
            geometry,
        }
    }

    pub fn a_track(&self) -> usize {
        self.a_track
    }

    pub fn b_track(&self) -> usize {
        self.b_track
    }

    pub fn kind(&self) -> TransitionKind {
        self.kind
    }

    pub fn geometry(&self) -> &GeometryAnim {
        &self.geometry
    }

    pub fn set_geometry(&mut self, geometry: GeometryAnim) {
        self.geometry = geometry;
    }

    /// Blend the b-track frame into the running composite at `position`.
    /// Audio follows the a-side; the b-side's audio is only adopted when the
    /// a-side has none.
    pub fn apply(&self, composed: &mut Frame, b_frame: &Frame, position: u64) {
        match self.kind {
            TransitionKind::Composite => {
                let rect = self.geometry.sample(position);
                blit_scaled_over(composed, b_frame, rect, 1.0);
                if composed.audio.is_none() {
                    composed.audio = b_frame.audio.clone();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Fps, Profile, Rgba8Premul};

    fn profile() -> Profile {
        Profile::new(10, 10, Fps::new(25, 1).unwrap()).unwrap()
    }

    #[test]
    fn kind_parsing_is_strict() {
        assert_eq!(
            parse_transition_kind("Composite").unwrap(),
            TransitionKind::Composite
        );
        assert!(parse_transition_kind("").is_err());
        assert!(parse_transition_kind("luma").is_err());
    }

    #[test]
    fn apply_scales_b_into_the_sampled_rect() {
        let red = Rgba8Premul::from_straight_rgba(255, 0, 0, 255);
        let blue = Rgba8Premul::from_straight_rgba(0, 0, 255, 255);

        let geometry = GeometryAnim::parse("0=0%,0%:20%x20%", profile()).unwrap();
        let tr = Transition::composite(0, 1, geometry);

        let mut composed = Frame::solid(profile(), red, 0);
        let b = Frame::solid(profile(), blue, 0);
        tr.apply(&mut composed, &b, 0);

        assert_eq!(composed.pixel(0, 0), blue);
        assert_eq!(composed.pixel(1, 1), blue);
        assert_eq!(composed.pixel(5, 5), red);
    }

    #[test]
    fn audio_follows_the_a_side() {
        use crate::frame::{AudioBlock, MIX_SAMPLE_RATE};

        let geometry = GeometryAnim::full_frame(profile());
        let tr = Transition::composite(0, 1, geometry);

        let mut composed = Frame::solid(profile(), Rgba8Premul::transparent(), 0);
        let b = Frame::solid(profile(), Rgba8Premul::transparent(), 0)
            .with_audio(AudioBlock::silence(MIX_SAMPLE_RATE, 100));
        tr.apply(&mut composed, &b, 0);
        assert!(composed.audio.is_some());
    }
}
