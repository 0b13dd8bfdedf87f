use std::sync::Arc;

use parking_lot::Mutex;
use tracing::warn;

use crate::{
    composite::blit_scaled_over,
    core::{Profile, Rect, Rgba8Premul},
    error::{TreadleError, TreadleResult},
    frame::{AudioBlock, Frame, FrameMeta, MIX_SAMPLE_RATE},
};

/// Seconds of material a still image contributes by default.
const STILL_DURATION_SECS: f64 = 5.0;

/// What a probe reports about a source before composition parameters are
/// fixed: native dimensions, rate, and bounded length if any.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SourceInfo {
    pub width: u32,
    pub height: u32,
    pub fps: crate::core::Fps,
    pub length: Option<u64>,
}

#[derive(Debug)]
enum Source {
    Invalid,
    Color(Rgba8Premul),
    Noise { seed: u64 },
    Still { native_width: u32, native_height: u32, rgba8_premul: Arc<Vec<u8>>, length: u64 },
}

#[derive(Debug)]
struct ProducerState {
    resource: String,
    profile: Profile,
    source: Source,
    position: u64,
}

/// One playable media source. Handles are cheap clones sharing position and
/// decoded data, so a producer can sit in a playlist while the driver still
/// holds it (for probing and reopening with a refined profile).
///
/// `is_valid()` is the canonical validity check; an invalid handle answers
/// every operation with blank frames instead of erroring.
#[derive(Clone, Debug)]
pub struct Producer {
    inner: Arc<Mutex<ProducerState>>,
}

impl Producer {
    /// Open a resource. Never fails across this boundary: an unreadable
    /// resource yields an invalid handle the caller must branch on.
    pub fn open(profile: Profile, resource: &str) -> Self {
        match Self::try_open(profile, resource) {
            Ok(p) => p,
            Err(e) => {
                warn!(resource, error = %e, "producer open failed, handle is invalid");
                Self {
                    inner: Arc::new(Mutex::new(ProducerState {
                        resource: resource.to_string(),
                        profile,
                        source: Source::Invalid,
                        position: 0,
                    })),
                }
            }
        }
    }

    /// Like `open`, but surfaces the failure for drivers that terminate on
    /// unopenable resources instead of branching on `is_valid`.
    pub fn try_open(profile: Profile, resource: &str) -> TreadleResult<Self> {
        let source = open_source(profile, resource)?;
        Ok(Self {
            inner: Arc::new(Mutex::new(ProducerState {
                resource: resource.to_string(),
                profile,
                source,
                position: 0,
            })),
        })
    }

    pub fn is_valid(&self) -> bool {
        !matches!(self.inner.lock().source, Source::Invalid)
    }

    pub fn resource(&self) -> String {
        self.inner.lock().resource.clone()
    }

    pub fn profile(&self) -> Profile {
        self.inner.lock().profile
    }

    /// Bounded length in frames; `None` for unbounded synthetic/live sources.
    pub fn length(&self) -> Option<u64> {
        match &self.inner.lock().source {
            Source::Invalid => Some(0),
            Source::Color(_) | Source::Noise { .. } => None,
            Source::Still { length, .. } => Some(*length),
        }
    }

    pub fn position(&self) -> u64 {
        self.inner.lock().position
    }

    /// Report native source parameters so a caller can derive a refined
    /// profile and reopen. `None` for invalid handles.
    pub fn probe(&self) -> Option<SourceInfo> {
        let state = self.inner.lock();
        match &state.source {
            Source::Invalid => None,
            Source::Color(_) | Source::Noise { .. } => Some(SourceInfo {
                width: state.profile.width,
                height: state.profile.height,
                fps: state.profile.fps,
                length: None,
            }),
            Source::Still {
                native_width,
                native_height,
                length,
                ..
            } => Some(SourceInfo {
                width: *native_width,
                height: *native_height,
                fps: state.profile.fps,
                length: Some(*length),
            }),
        }
    }

    /// Move the play head. Clamped into the source bounds; no-op on invalid
    /// handles.
    pub fn seek(&self, position: u64) {
        let mut state = self.inner.lock();
        let clamped = match &state.source {
            Source::Invalid => 0,
            Source::Color(_) | Source::Noise { .. } => position,
            Source::Still { length, .. } => position.min(length.saturating_sub(1)),
        };
        state.position = clamped;
    }

    /// Return the frame at the current position and advance by one. Invalid
    /// handles return blank frames forever.
    pub fn get_frame(&self) -> Frame {
        let mut state = self.inner.lock();
        let position = state.position;
        let frame = match &state.source {
            Source::Invalid => Frame::blank(state.profile, position),
            Source::Color(color) => Frame::solid(state.profile, *color, position),
            Source::Noise { seed } => noise_frame(state.profile, *seed, position),
            Source::Still { rgba8_premul, .. } => Frame::from_rgba8_premul(
                state.profile.width,
                state.profile.height,
                rgba8_premul.as_ref().clone(),
                FrameMeta {
                    position,
                    speed: 1.0,
                    ..FrameMeta::default()
                },
            ),
        };

        // Past the end of bounded material the play head holds on the last
        // frame rather than running off it.
        let next = position + 1;
        state.position = match &state.source {
            Source::Still { length, .. } => next.min(length.saturating_sub(1)),
            _ => next,
        };

        frame
    }
}

impl crate::source::FrameSource for Producer {
    fn profile(&self) -> Profile {
        Producer::profile(self)
    }

    fn pull(&self) -> Frame {
        self.get_frame()
    }

    fn position(&self) -> u64 {
        Producer::position(self)
    }

    fn is_valid(&self) -> bool {
        Producer::is_valid(self)
    }
}

fn open_source(profile: Profile, resource: &str) -> TreadleResult<Source> {
    if let Some(hex) = resource.strip_prefix("color:") {
        let color = parse_color(hex)?;
        return Ok(Source::Color(color));
    }

    if let Some(rest) = resource.strip_prefix("noise:") {
        let seed = if rest.is_empty() {
            0
        } else {
            rest.parse::<u64>()
                .map_err(|_| TreadleError::parse(format!("bad noise seed '{rest}'")))?
        };
        return Ok(Source::Noise { seed });
    }

    open_still(profile, resource)
}

fn open_still(profile: Profile, path: &str) -> TreadleResult<Source> {
    use anyhow::Context as _;

    let bytes = std::fs::read(path)
        .with_context(|| format!("read image '{path}'"))
        .map_err(|e| TreadleError::open(format!("{e:#}")))?;
    let dyn_img = image::load_from_memory(&bytes)
        .with_context(|| format!("decode image '{path}'"))
        .map_err(|e| TreadleError::open(format!("{e:#}")))?;
    let rgba = dyn_img.to_rgba8();
    let (native_width, native_height) = rgba.dimensions();

    let mut native = rgba.into_raw();
    premultiply_rgba8_in_place(&mut native);

    // Pre-stretch to the profile once; every get_frame then shares the data.
    let native_frame = Frame::from_rgba8_premul(
        native_width,
        native_height,
        native,
        FrameMeta::default(),
    );
    let mut scaled = Frame::blank(profile, 0);
    blit_scaled_over(
        &mut scaled,
        &native_frame,
        Rect::new(0.0, 0.0, f64::from(profile.width), f64::from(profile.height)),
        1.0,
    );

    let length = (profile.fps.as_f64() * STILL_DURATION_SECS).round().max(1.0) as u64;
    Ok(Source::Still {
        native_width,
        native_height,
        rgba8_premul: Arc::new(scaled.data().to_vec()),
        length,
    })
}

fn parse_color(hex: &str) -> TreadleResult<Rgba8Premul> {
    let hex = hex.trim();
    if !hex.is_ascii() || (hex.len() != 6 && hex.len() != 8) {
        return Err(TreadleError::parse(format!(
            "color must be RRGGBB or RRGGBBAA, got '{hex}'"
        )));
    }
    let byte = |i: usize| -> TreadleResult<u8> {
        u8::from_str_radix(&hex[i..i + 2], 16)
            .map_err(|_| TreadleError::parse(format!("bad hex color '{hex}'")))
    };
    let r = byte(0)?;
    let g = byte(2)?;
    let b = byte(4)?;
    let a = if hex.len() == 8 { byte(6)? } else { 255 };
    Ok(Rgba8Premul::from_straight_rgba(r, g, b, a))
}

fn noise_frame(profile: Profile, seed: u64, position: u64) -> Frame {
    let mut data = Vec::with_capacity(profile.frame_bytes());
    let mut state = mix64(seed ^ mix64(position.wrapping_add(1)));
    for _ in 0..(profile.width as usize * profile.height as usize) {
        state = mix64(state);
        let v = (state & 0xff) as u8;
        data.extend_from_slice(&[v, v, v, 255]);
    }

    let samples_per_frame =
        (f64::from(MIX_SAMPLE_RATE) * profile.fps.frame_duration_secs()).round() as usize;
    let mut pcm = Vec::with_capacity(samples_per_frame * 2);
    let mut astate = mix64(seed ^ mix64(position.wrapping_add(0x5eed)));
    for _ in 0..samples_per_frame * 2 {
        astate = mix64(astate);
        let v = ((astate & 0xffff) as f64 / 65535.0) * 2.0 - 1.0;
        pcm.push((v * 0.05) as f32);
    }

    Frame::from_rgba8_premul(
        profile.width,
        profile.height,
        data,
        FrameMeta {
            position,
            speed: 1.0,
            ..FrameMeta::default()
        },
    )
    .with_audio(AudioBlock {
        sample_rate: MIX_SAMPLE_RATE,
        channels: 2,
        interleaved_f32: pcm,
    })
}

fn premultiply_rgba8_in_place(rgba: &mut [u8]) {
    for px in rgba.chunks_exact_mut(4) {
        let a = px[3] as u16;
        if a == 0 {
            px[0] = 0;
            px[1] = 0;
            px[2] = 0;
            continue;
        }
        px[0] = ((px[0] as u16 * a + 127) / 255) as u8;
        px[1] = ((px[1] as u16 * a + 127) / 255) as u8;
        px[2] = ((px[2] as u16 * a + 127) / 255) as u8;
    }
}

fn mix64(mut z: u64) -> u64 {
    // SplitMix64 mixing function.
    z = z.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Fps;

    fn profile() -> Profile {
        Profile::new(8, 4, Fps::new(25, 1).unwrap()).unwrap()
    }

    #[test]
    fn open_nonexistent_file_yields_invalid_handle() {
        let p = Producer::open(profile(), "/no/such/file.png");
        assert!(!p.is_valid());
        assert_eq!(p.length(), Some(0));
        assert!(p.probe().is_none());

        let f = p.get_frame();
        assert!(f.meta.blank);
    }

    #[test]
    fn try_open_surfaces_the_failure() {
        let err = Producer::try_open(profile(), "/no/such/file.png").unwrap_err();
        assert!(matches!(err, TreadleError::Open(_)));
    }

    #[test]
    fn color_producer_is_unbounded_and_solid() {
        let p = Producer::open(profile(), "color:ff0000");
        assert!(p.is_valid());
        assert_eq!(p.length(), None);

        let f = p.get_frame();
        assert_eq!(f.pixel(0, 0), Rgba8Premul::from_straight_rgba(255, 0, 0, 255));
        assert_eq!(p.position(), 1);
    }

    #[test]
    fn bad_color_hex_is_invalid() {
        assert!(!Producer::open(profile(), "color:zzz").is_valid());
    }

    #[test]
    fn get_frame_advances_and_seek_moves() {
        let p = Producer::open(profile(), "color:00ff00");
        let _ = p.get_frame();
        let _ = p.get_frame();
        assert_eq!(p.position(), 2);
        p.seek(40);
        assert_eq!(p.position(), 40);
        assert_eq!(p.get_frame().meta.position, 40);
    }

    #[test]
    fn noise_is_deterministic_per_position() {
        let p = Producer::open(profile(), "noise:7");
        let a = p.get_frame();
        p.seek(0);
        let b = p.get_frame();
        assert_eq!(a.data(), b.data());
        assert!(a.audio.is_some());

        let c = p.get_frame();
        assert_ne!(a.data(), c.data());
    }

    #[test]
    fn clones_share_the_play_head() {
        let p = Producer::open(profile(), "color:000000");
        let q = p.clone();
        let _ = p.get_frame();
        assert_eq!(q.position(), 1);
    }
}
