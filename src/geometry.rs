use std::fmt;

use crate::{
    anim::{InterpMode, Keyframe, Keyframes},
    core::{Profile, Rect},
    error::{TreadleError, TreadleResult},
};

/// A keyframed rectangle over the frame axis, in profile pixel units.
///
/// Text form: semicolon-separated keyframes `frame=x,y:wxh`, where each of
/// x/y/w/h is numeric (pixels) or suffixed with `%` (percent of the profile
/// width for x/w, height for y/h). Interpolation is linear between
/// consecutive keyframes and held before the first / after the last.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct GeometryAnim {
    keys: Keyframes<Rect>,
}

impl GeometryAnim {
    pub fn from_keyframes(mut keys: Vec<Keyframe<Rect>>) -> TreadleResult<Self> {
        keys.sort_by_key(|k| k.frame);
        let keys = Keyframes {
            keys,
            mode: InterpMode::Linear,
        };
        keys.validate()?;
        Ok(Self { keys })
    }

    /// Full-frame rectangle at every position.
    pub fn full_frame(profile: Profile) -> Self {
        Self {
            keys: Keyframes::constant(Rect::new(
                0.0,
                0.0,
                f64::from(profile.width),
                f64::from(profile.height),
            )),
        }
    }

    /// Parse the text form against a profile. Every malformed keyframe is an
    /// error with its position in the list; nothing is silently dropped.
    pub fn parse(text: &str, profile: Profile) -> TreadleResult<Self> {
        let mut keys = Vec::new();
        for (index, raw) in text.split(';').enumerate() {
            let item = raw.trim();
            if item.is_empty() {
                // Trailing separators are tolerated, interior blanks are not.
                if raw.is_empty() && index > 0 && text.ends_with(';') {
                    continue;
                }
                return Err(TreadleError::parse(format!(
                    "geometry keyframe {index}: empty item"
                )));
            }
            let key = parse_item(item, profile)
                .map_err(|e| TreadleError::parse(format!("geometry keyframe {index}: {e}")))?;
            keys.push(key);
        }
        if keys.is_empty() {
            return Err(TreadleError::parse("geometry has no keyframes"));
        }
        Self::from_keyframes(keys)
    }

    pub fn sample(&self, frame: u64) -> Rect {
        // Keys are validated non-empty at construction.
        self.keys.sample(frame).unwrap_or_else(|_| Rect::ZERO)
    }

    pub fn keyframes(&self) -> &[Keyframe<Rect>] {
        &self.keys.keys
    }
}

/// Serializes in pixel units; re-parsing yields identical interpolation.
impl fmt::Display for GeometryAnim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, key) in self.keys.keys.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            let r = key.value;
            write!(
                f,
                "{}={},{}:{}x{}",
                key.frame,
                r.x0,
                r.y0,
                r.width(),
                r.height()
            )?;
        }
        Ok(())
    }
}

fn parse_item(item: &str, profile: Profile) -> Result<Keyframe<Rect>, String> {
    let (frame_str, rect_str) = item
        .split_once('=')
        .ok_or_else(|| format!("missing '=' in '{item}'"))?;
    let frame: u64 = frame_str
        .trim()
        .parse()
        .map_err(|_| format!("bad frame number '{}'", frame_str.trim()))?;

    let (pos_str, size_str) = rect_str
        .split_once(':')
        .ok_or_else(|| format!("missing ':' between position and size in '{rect_str}'"))?;
    let (x_str, y_str) = pos_str
        .split_once(',')
        .ok_or_else(|| format!("missing ',' in position '{pos_str}'"))?;
    let (w_str, h_str) = size_str
        .split_once('x')
        .ok_or_else(|| format!("missing 'x' in size '{size_str}'"))?;

    let x = parse_coord(x_str, profile.width)?;
    let y = parse_coord(y_str, profile.height)?;
    let w = parse_coord(w_str, profile.width)?;
    let h = parse_coord(h_str, profile.height)?;
    if w < 0.0 || h < 0.0 {
        return Err(format!("negative size '{size_str}'"));
    }

    Ok(Keyframe {
        frame,
        value: Rect::new(x, y, x + w, y + h),
    })
}

fn parse_coord(raw: &str, normal: u32) -> Result<f64, String> {
    let s = raw.trim();
    let (num_str, percent) = match s.strip_suffix('%') {
        Some(rest) => (rest, true),
        None => (s, false),
    };
    let v: f64 = num_str
        .trim()
        .parse()
        .map_err(|_| format!("bad number '{s}'"))?;
    if !v.is_finite() {
        return Err(format!("non-finite value '{s}'"));
    }
    Ok(if percent {
        v * f64::from(normal) / 100.0
    } else {
        v
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Fps;

    fn profile() -> Profile {
        Profile::new(200, 100, Fps::new(25, 1).unwrap()).unwrap()
    }

    #[test]
    fn parses_percent_and_pixel_coords() {
        let g = GeometryAnim::parse("0=0%,0%:100%x100%", profile()).unwrap();
        assert_eq!(g.sample(0), Rect::new(0.0, 0.0, 200.0, 100.0));

        let g = GeometryAnim::parse("0=10,20:40x30", profile()).unwrap();
        assert_eq!(g.sample(5), Rect::new(10.0, 20.0, 50.0, 50.0));
    }

    #[test]
    fn interpolates_between_keyframes_and_holds_ends() {
        let g = GeometryAnim::parse("0=0,0:10x10; 10=100,0:10x10", profile()).unwrap();
        assert_eq!(g.sample(5).x0, 50.0);
        assert_eq!(g.sample(0).x0, 0.0);
        assert_eq!(g.sample(50).x0, 100.0);
    }

    #[test]
    fn rejects_malformed_items() {
        let p = profile();
        for bad in [
            "nonsense",
            "0=1,2",
            "0=1:2x3",
            "0=a,b:cxd",
            "0=1,2:3x-4",
            "x=1,2:3x4",
            "0=1,2:3x4;;5=1,2:3x4",
        ] {
            let err = GeometryAnim::parse(bad, p).unwrap_err();
            assert!(
                matches!(err, TreadleError::Parse(_)),
                "'{bad}' should be a parse failure, got {err}"
            );
        }
    }

    #[test]
    fn tolerates_trailing_separator() {
        assert!(GeometryAnim::parse("0=0,0:10x10;", profile()).is_ok());
    }

    #[test]
    fn display_roundtrip_preserves_interpolation() {
        let g = GeometryAnim::parse("0=0%,0%:100%x100%; 30=80%,10%:20%x20%", profile()).unwrap();
        let reparsed = GeometryAnim::parse(&g.to_string(), profile()).unwrap();
        for frame in [0, 1, 7, 15, 29, 30, 31, 100] {
            assert_eq!(g.sample(frame), reparsed.sample(frame), "frame {frame}");
        }
    }

    #[test]
    fn unsorted_input_is_sorted_by_frame() {
        let g = GeometryAnim::parse("10=0,0:10x10; 0=100,0:10x10", profile()).unwrap();
        assert_eq!(g.keyframes()[0].frame, 0);
        assert_eq!(g.sample(0).x0, 100.0);
    }
}
