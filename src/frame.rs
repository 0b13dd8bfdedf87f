use std::collections::BTreeMap;
use std::sync::Arc;

use crate::core::{Profile, Rgba8Premul};

pub const MIX_SAMPLE_RATE: u32 = 48_000;

/// Interleaved f32 stereo PCM attached to a frame.
#[derive(Clone, Debug, PartialEq)]
pub struct AudioBlock {
    pub sample_rate: u32,
    pub channels: u16,
    pub interleaved_f32: Vec<f32>,
}

impl AudioBlock {
    pub fn silence(sample_rate: u32, samples_per_channel: usize) -> Self {
        Self {
            sample_rate,
            channels: 2,
            interleaved_f32: vec![0.0; samples_per_channel * 2],
        }
    }

    pub fn samples_per_channel(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.interleaved_f32.len() / self.channels as usize
    }
}

/// Typed per-frame metadata.
///
/// `extras` is the escape hatch for engine-specific keys; every key in use
/// must be documented here:
/// - `deinterlace`: "1" when the renderer should deinterlace this frame.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FrameMeta {
    /// Logical position this frame was produced at.
    pub position: u64,
    /// Playback speed in effect when the frame was pulled.
    pub speed: f64,
    /// Substitute frame: the source could not provide real image data.
    pub blank: bool,
    pub extras: BTreeMap<String, String>,
}

/// An immutable snapshot at a logical position: premultiplied RGBA8 pixels,
/// optional audio, and metadata. Clones share the pixel payload.
#[derive(Clone, Debug)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    data: Arc<Vec<u8>>,
    pub audio: Option<Arc<AudioBlock>>,
    pub meta: FrameMeta,
}

impl Frame {
    pub fn from_rgba8_premul(width: u32, height: u32, data: Vec<u8>, meta: FrameMeta) -> Self {
        debug_assert_eq!(data.len(), width as usize * height as usize * 4);
        Self {
            width,
            height,
            data: Arc::new(data),
            audio: None,
            meta,
        }
    }

    /// Uniform fill, the workhorse of synthetic sources.
    pub fn solid(profile: Profile, color: Rgba8Premul, position: u64) -> Self {
        let mut data = Vec::with_capacity(profile.frame_bytes());
        for _ in 0..(profile.width as usize * profile.height as usize) {
            data.extend_from_slice(&[color.r, color.g, color.b, color.a]);
        }
        Self::from_rgba8_premul(
            profile.width,
            profile.height,
            data,
            FrameMeta {
                position,
                ..FrameMeta::default()
            },
        )
    }

    /// Substitute frame for invalid or failing sources: opaque black with the
    /// blank flag set, so downstream stages can branch without erroring.
    pub fn blank(profile: Profile, position: u64) -> Self {
        let mut frame = Self::solid(
            profile,
            Rgba8Premul {
                r: 0,
                g: 0,
                b: 0,
                a: 255,
            },
            position,
        );
        frame.meta.blank = true;
        frame
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn with_audio(mut self, audio: AudioBlock) -> Self {
        self.audio = Some(Arc::new(audio));
        self
    }

    pub fn without_audio(mut self) -> Self {
        self.audio = None;
        self
    }

    pub fn pixel(&self, x: u32, y: u32) -> Rgba8Premul {
        let idx = (y as usize * self.width as usize + x as usize) * 4;
        let px = &self.data[idx..idx + 4];
        Rgba8Premul {
            r: px[0],
            g: px[1],
            b: px[2],
            a: px[3],
        }
    }

    /// Copy-on-write access for compositing stages.
    pub(crate) fn data_mut(&mut self) -> &mut Vec<u8> {
        Arc::make_mut(&mut self.data)
    }

    /// Shared pixel payload, for stages that read one frame while mutating
    /// another that might alias it.
    pub(crate) fn data_arc(&self) -> Arc<Vec<u8>> {
        self.data.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Fps;

    fn tiny_profile() -> Profile {
        Profile::new(4, 2, Fps::new(25, 1).unwrap()).unwrap()
    }

    #[test]
    fn solid_fills_every_pixel() {
        let c = Rgba8Premul::from_straight_rgba(10, 20, 30, 255);
        let f = Frame::solid(tiny_profile(), c, 7);
        assert_eq!(f.data().len(), 4 * 2 * 4);
        assert_eq!(f.pixel(0, 0), c);
        assert_eq!(f.pixel(3, 1), c);
        assert_eq!(f.meta.position, 7);
        assert!(!f.meta.blank);
    }

    #[test]
    fn blank_is_flagged_and_opaque() {
        let f = Frame::blank(tiny_profile(), 0);
        assert!(f.meta.blank);
        assert_eq!(f.pixel(1, 1).a, 255);
    }

    #[test]
    fn clones_share_pixels_until_mutation() {
        let f = Frame::solid(tiny_profile(), Rgba8Premul::transparent(), 0);
        let mut g = f.clone();
        assert!(Arc::ptr_eq(&f.data, &g.data));
        g.data_mut()[0] = 255;
        assert!(!Arc::ptr_eq(&f.data, &g.data));
        assert_eq!(f.data()[0], 0);
    }

    #[test]
    fn audio_gating_strips_samples_only() {
        let f = Frame::solid(tiny_profile(), Rgba8Premul::transparent(), 3)
            .with_audio(AudioBlock::silence(MIX_SAMPLE_RATE, 1920));
        assert_eq!(f.audio.as_ref().unwrap().samples_per_channel(), 1920);
        let muted = f.without_audio();
        assert!(muted.audio.is_none());
        assert_eq!(muted.meta.position, 3);
    }
}
