use crate::error::{TreadleError, TreadleResult};

pub use kurbo::{Point, Rect, Size};

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Fps {
    pub num: u32,
    pub den: u32, // must be > 0
}

impl Fps {
    pub fn new(num: u32, den: u32) -> TreadleResult<Self> {
        if num == 0 {
            return Err(TreadleError::validation("Fps num must be > 0"));
        }
        if den == 0 {
            return Err(TreadleError::validation("Fps den must be > 0"));
        }
        Ok(Self { num, den })
    }

    pub fn as_f64(self) -> f64 {
        f64::from(self.num) / f64::from(self.den)
    }

    pub fn frame_duration_secs(self) -> f64 {
        f64::from(self.den) / f64::from(self.num)
    }

    pub fn frames_to_secs(self, frames: u64) -> f64 {
        (frames as f64) * self.frame_duration_secs()
    }

    pub fn secs_to_frames_floor(self, secs: f64) -> u64 {
        (secs * self.as_f64()).floor().max(0.0) as u64
    }
}

/// Playback rate as a signed rational: 0 = paused, 1 = normal forward,
/// negative = reverse, num/den = fractional slow motion or shuttle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Speed {
    pub num: i64,
    pub den: u32, // must be > 0
}

impl Speed {
    pub const STOP: Self = Self { num: 0, den: 1 };
    pub const FORWARD: Self = Self { num: 1, den: 1 };

    pub fn new(num: i64, den: u32) -> TreadleResult<Self> {
        if den == 0 {
            return Err(TreadleError::validation("Speed den must be > 0"));
        }
        Ok(Self { num, den })
    }

    pub fn from_int(num: i64) -> Self {
        Self { num, den: 1 }
    }

    pub fn is_stopped(self) -> bool {
        self.num == 0
    }

    pub fn is_reverse(self) -> bool {
        self.num < 0
    }

    pub fn as_f64(self) -> f64 {
        self.num as f64 / f64::from(self.den)
    }

    /// Fold this speed into a fractional-step accumulator.
    ///
    /// Returns the whole frame steps to take now (truncated toward zero) and
    /// the numerator remainder to carry into the next call, so fractional
    /// speeds average out exactly over many calls.
    pub fn advance(self, carry_num: i64) -> (i64, i64) {
        let den = i64::from(self.den);
        let total = carry_num + self.num;
        (total / den, total % den)
    }
}

/// Fixed output parameters every producer and composition agrees on before
/// frames start flowing: dimensions and frame rate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Profile {
    pub width: u32,
    pub height: u32,
    pub fps: Fps,
}

impl Profile {
    pub fn new(width: u32, height: u32, fps: Fps) -> TreadleResult<Self> {
        if width == 0 || height == 0 {
            return Err(TreadleError::validation(
                "Profile width/height must be > 0",
            ));
        }
        Ok(Self { width, height, fps })
    }

    pub fn display_aspect(self) -> f64 {
        f64::from(self.width) / f64::from(self.height)
    }

    pub fn frame_bytes(self) -> usize {
        self.width as usize * self.height as usize * 4
    }
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            fps: Fps { num: 30, den: 1 },
        }
    }
}

/// Premultiplied RGBA8 (r,g,b already multiplied by a).
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Rgba8Premul {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba8Premul {
    pub fn transparent() -> Self {
        Self {
            r: 0,
            g: 0,
            b: 0,
            a: 0,
        }
    }

    pub fn from_straight_rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        fn premul(c: u8, a: u8) -> u8 {
            let c = u16::from(c);
            let a = u16::from(a);
            (((c * a) + 127) / 255) as u8
        }

        Self {
            r: premul(r, a),
            g: premul(g, a),
            b: premul(b, a),
            a,
        }
    }
}
