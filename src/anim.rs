use crate::{
    core::Rect,
    error::{TreadleError, TreadleResult},
};

pub trait Lerp: Sized {
    fn lerp(a: &Self, b: &Self, t: f64) -> Self;
}

impl Lerp for f64 {
    fn lerp(a: &Self, b: &Self, t: f64) -> Self {
        a + (b - a) * t
    }
}

impl Lerp for Rect {
    fn lerp(a: &Self, b: &Self, t: f64) -> Self {
        Rect {
            x0: a.x0 + (b.x0 - a.x0) * t,
            y0: a.y0 + (b.y0 - a.y0) * t,
            x1: a.x1 + (b.x1 - a.x1) * t,
            y1: a.y1 + (b.y1 - a.y1) * t,
        }
    }
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Keyframe<T> {
    pub frame: u64,
    pub value: T,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum InterpMode {
    Hold,
    Linear,
}

/// Sparse keyframes over a frame axis: interpolated between consecutive keys,
/// held constant before the first and after the last.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Keyframes<T> {
    pub keys: Vec<Keyframe<T>>, // sorted by frame
    pub mode: InterpMode,
}

impl<T> Keyframes<T>
where
    T: Lerp + Clone,
{
    pub fn constant(value: T) -> Self {
        Self {
            keys: vec![Keyframe { frame: 0, value }],
            mode: InterpMode::Hold,
        }
    }

    pub fn validate(&self) -> TreadleResult<()> {
        if self.keys.is_empty() {
            return Err(TreadleError::validation(
                "Keyframes must have at least one key",
            ));
        }
        if !self.keys.windows(2).all(|w| w[0].frame <= w[1].frame) {
            return Err(TreadleError::validation(
                "Keyframes keys must be sorted by frame",
            ));
        }
        Ok(())
    }

    pub fn sample(&self, frame: u64) -> TreadleResult<T> {
        if self.keys.is_empty() {
            return Err(TreadleError::validation("Keyframes has no keys"));
        }

        let idx = self.keys.partition_point(|k| k.frame <= frame);

        if idx == 0 {
            return Ok(self.keys[0].value.clone());
        }
        if idx >= self.keys.len() {
            return Ok(self.keys[self.keys.len() - 1].value.clone());
        }

        let a = &self.keys[idx - 1];
        let b = &self.keys[idx];
        let denom = b.frame.saturating_sub(a.frame);
        if denom == 0 {
            return Ok(a.value.clone());
        }

        let t = ((frame - a.frame) as f64) / (denom as f64);
        match self.mode {
            InterpMode::Hold => Ok(a.value.clone()),
            InterpMode::Linear => Ok(T::lerp(&a.value, &b.value, t)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(pairs: &[(u64, f64)], mode: InterpMode) -> Keyframes<f64> {
        Keyframes {
            keys: pairs
                .iter()
                .map(|&(frame, value)| Keyframe { frame, value })
                .collect(),
            mode,
        }
    }

    #[test]
    fn hold_is_constant_between_keys() {
        let anim = keys(&[(0, 1.0), (10, 3.0)], InterpMode::Hold);
        assert_eq!(anim.sample(5).unwrap(), 1.0);
        assert_eq!(anim.sample(10).unwrap(), 3.0);
    }

    #[test]
    fn linear_interpolates() {
        let anim = keys(&[(0, 0.0), (10, 10.0)], InterpMode::Linear);
        assert_eq!(anim.sample(5).unwrap(), 5.0);
    }

    #[test]
    fn ends_are_held() {
        let anim = keys(&[(10, 2.0), (20, 4.0)], InterpMode::Linear);
        assert_eq!(anim.sample(0).unwrap(), 2.0);
        assert_eq!(anim.sample(99).unwrap(), 4.0);
    }

    #[test]
    fn validate_rejects_unsorted_and_empty() {
        let anim = keys(&[(10, 2.0), (5, 4.0)], InterpMode::Linear);
        assert!(anim.validate().is_err());
        let empty: Keyframes<f64> = Keyframes {
            keys: vec![],
            mode: InterpMode::Linear,
        };
        assert!(empty.validate().is_err());
    }

    #[test]
    fn rect_lerp_moves_all_edges() {
        let a = Rect::new(0.0, 0.0, 10.0, 10.0);
        let b = Rect::new(10.0, 20.0, 30.0, 40.0);
        let mid = Rect::lerp(&a, &b, 0.5);
        assert_eq!(mid, Rect::new(5.0, 10.0, 20.0, 25.0));
    }
}
