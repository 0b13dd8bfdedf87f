use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};
use tracing::warn;

use crate::{
    core::Profile,
    error::{TreadleError, TreadleResult},
    frame::Frame,
    producer::Producer,
};

/// Frames an unbounded synthetic source contributes when appended without
/// explicit clip bounds.
const DEFAULT_CLIP_SECS: f64 = 5.0;

#[derive(Debug)]
struct Entry {
    producer: Producer,
    clip_in: u64,
    clip_out: u64, // inclusive
}

impl Entry {
    fn length(&self) -> u64 {
        self.clip_out - self.clip_in + 1
    }
}

#[derive(Debug)]
struct PlaylistState {
    profile: Profile,
    entries: Vec<Entry>,
}

/// Ordered producers with clip bounds, treated as one continuous source.
///
/// Handles are cheap clones sharing the entry list. All mutation goes through
/// the scoped guard returned by `lock()`, so the drain loop and a control
/// thread can never interleave mid-mutation. Switching the playing content
/// live is `lock()` + `switch_content()`: append-before-remove, so the drain
/// loop never observes an empty playlist.
#[derive(Clone, Debug)]
pub struct Playlist {
    inner: Arc<Mutex<PlaylistState>>,
}

impl Playlist {
    pub fn new(profile: Profile) -> Self {
        Self {
            inner: Arc::new(Mutex::new(PlaylistState {
                profile,
                entries: Vec::new(),
            })),
        }
    }

    /// Scoped acquisition: mutations are only possible through the guard.
    pub fn lock(&self) -> PlaylistGuard<'_> {
        PlaylistGuard {
            state: self.inner.lock(),
        }
    }

    pub fn profile(&self) -> Profile {
        self.inner.lock().profile
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total virtual length in frames across all entries.
    pub fn total_length(&self) -> u64 {
        self.inner.lock().entries.iter().map(Entry::length).sum()
    }

    /// Map a virtual position through the entry lengths and pull that frame.
    /// Past the end the last entry's final frame is held; an empty playlist
    /// yields a blank frame, never an error.
    pub fn frame_at(&self, position: u64) -> Frame {
        let state = self.inner.lock();

        let mut remaining = position;
        for entry in &state.entries {
            let len = entry.length();
            if remaining < len {
                entry.producer.seek(entry.clip_in + remaining);
                return entry.producer.get_frame();
            }
            remaining -= len;
        }

        match state.entries.last() {
            Some(last) => {
                last.producer.seek(last.clip_out);
                last.producer.get_frame()
            }
            None => {
                warn!(position, "frame pulled from empty playlist");
                Frame::blank(state.profile, position)
            }
        }
    }
}

pub struct PlaylistGuard<'a> {
    state: MutexGuard<'a, PlaylistState>,
}

impl PlaylistGuard<'_> {
    pub fn len(&self) -> usize {
        self.state.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.entries.is_empty()
    }

    /// Append a producer over its natural bounds (or a default clip for
    /// unbounded sources). Invalid handles are rejected so a bad open can
    /// never reach the drain loop.
    pub fn append(&mut self, producer: Producer) -> TreadleResult<()> {
        let clip_out = match producer.length() {
            Some(len) if len > 0 => len - 1,
            Some(_) => {
                return Err(TreadleError::connection(format!(
                    "cannot append invalid producer '{}'",
                    producer.resource()
                )));
            }
            None => {
                let fps = self.state.profile.fps;
                ((fps.as_f64() * DEFAULT_CLIP_SECS).round() as u64).max(1) - 1
            }
        };
        self.append_in_out(producer, 0, clip_out)
    }

    /// Append a producer with explicit inclusive clip bounds.
    pub fn append_in_out(
        &mut self,
        producer: Producer,
        clip_in: u64,
        clip_out: u64,
    ) -> TreadleResult<()> {
        if !producer.is_valid() {
            return Err(TreadleError::connection(format!(
                "cannot append invalid producer '{}'",
                producer.resource()
            )));
        }
        if clip_out < clip_in {
            return Err(TreadleError::validation("clip out must be >= clip in"));
        }
        if let Some(len) = producer.length()
            && clip_out >= len
        {
            return Err(TreadleError::validation(format!(
                "clip out {clip_out} exceeds producer length {len}"
            )));
        }
        self.state.entries.push(Entry {
            producer,
            clip_in,
            clip_out,
        });
        Ok(())
    }

    pub fn remove(&mut self, index: usize) -> TreadleResult<Producer> {
        if index >= self.state.entries.len() {
            return Err(TreadleError::validation(format!(
                "playlist remove index {index} out of range ({} entries)",
                self.state.entries.len()
            )));
        }
        Ok(self.state.entries.remove(index).producer)
    }

    /// The live switch dance: append the replacement, then retire the head.
    /// Ordering is load-bearing: at no point is the playlist empty. Returns
    /// the retired producer, or `None` when nothing was playing yet.
    pub fn switch_content(&mut self, producer: Producer) -> TreadleResult<Option<Producer>> {
        self.append(producer)?;
        if self.state.entries.len() > 1 {
            self.remove(0).map(Some)
        } else {
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Fps, Rgba8Premul};

    fn profile() -> Profile {
        Profile::new(4, 4, Fps::new(10, 1).unwrap()).unwrap()
    }

    fn color(hex: &str) -> Producer {
        Producer::open(profile(), &format!("color:{hex}"))
    }

    #[test]
    fn append_and_total_length() {
        let pl = Playlist::new(profile());
        {
            let mut guard = pl.lock();
            guard.append(color("ff0000")).unwrap();
            guard.append_in_out(color("00ff00"), 0, 9).unwrap();
        }
        assert_eq!(pl.len(), 2);
        // 5s default at 10fps plus an explicit 10-frame clip.
        assert_eq!(pl.total_length(), 60);
    }

    #[test]
    fn append_rejects_invalid_producer() {
        let pl = Playlist::new(profile());
        let bad = Producer::open(profile(), "/missing.png");
        let err = pl.lock().append(bad).unwrap_err();
        assert!(matches!(err, TreadleError::Connection(_)));
    }

    #[test]
    fn frame_at_maps_through_entries() {
        let pl = Playlist::new(profile());
        {
            let mut guard = pl.lock();
            guard.append_in_out(color("ff0000"), 0, 4).unwrap();
            guard.append_in_out(color("0000ff"), 0, 4).unwrap();
        }
        let red = Rgba8Premul::from_straight_rgba(255, 0, 0, 255);
        let blue = Rgba8Premul::from_straight_rgba(0, 0, 255, 255);
        assert_eq!(pl.frame_at(0).pixel(0, 0), red);
        assert_eq!(pl.frame_at(4).pixel(0, 0), red);
        assert_eq!(pl.frame_at(5).pixel(0, 0), blue);
        // Held past the end.
        assert_eq!(pl.frame_at(99).pixel(0, 0), blue);
    }

    #[test]
    fn empty_playlist_yields_blank_not_error() {
        let pl = Playlist::new(profile());
        assert!(pl.frame_at(3).meta.blank);
    }

    #[test]
    fn switch_content_never_empties_the_list() {
        let pl = Playlist::new(profile());
        pl.lock().append(color("ff0000")).unwrap();

        let retired = pl.lock().switch_content(color("00ff00")).unwrap();
        assert_eq!(retired.unwrap().resource(), "color:ff0000");
        assert_eq!(pl.len(), 1);

        let green = Rgba8Premul::from_straight_rgba(0, 255, 0, 255);
        assert_eq!(pl.frame_at(0).pixel(0, 0), green);
    }

    #[test]
    fn remove_out_of_range_is_validation_error() {
        let pl = Playlist::new(profile());
        let err = pl.lock().remove(0).unwrap_err();
        assert!(matches!(err, TreadleError::Validation(_)));
    }
}
