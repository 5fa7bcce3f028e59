// Host-independent view of a media element and a drawing surface.
// Browser adapters live in dom.rs; tests use the in-memory fakes below.
// See DESIGN.md: Media seams

use crate::types::*;

/// The subset of an HTML media element the synchronizers drive.
pub trait MediaElement {
    fn current_time(&self) -> MediaTime;
    fn set_current_time(&mut self, time: MediaTime);
    fn is_paused(&self) -> bool;
    /// Start playback. Asynchronous rejection (autoplay policy) is absorbed by the implementation.
    fn request_play(&mut self);
    fn pause(&mut self);
    fn playback_rate(&self) -> PlaybackRate;
    fn set_playback_rate(&mut self, rate: PlaybackRate);
    /// Intrinsic size once metadata is available.
    fn intrinsic_size(&self) -> Option<PixelSize>;
    /// Finite duration once metadata is available.
    fn duration(&self) -> Option<MediaTime>;
    /// Displayed bounding box in CSS pixels.
    fn display_size(&self) -> CssSize;
    /// Assign a new source, or detach from the current one with `None`.
    fn set_source(&mut self, src: Option<&str>);
    fn set_visible(&mut self, visible: bool);
}

/// An element whose displayed size follows the primary video box.
pub trait LayerElement {
    fn set_display_size(&mut self, size: CssSize);
}

/// Canvas-like drawing surface with a backing buffer separate from its CSS size.
pub trait DrawingSurface: LayerElement {
    fn backing_size(&self) -> PixelSize;
    /// Reallocates the buffer on most hosts; callers avoid redundant writes.
    fn set_backing_width(&mut self, width: u32);
    fn set_backing_height(&mut self, height: u32);
    /// Replace the context transform with a uniform scale.
    fn set_scale_transform(&mut self, scale: f64);
    fn clear(&mut self);
    fn fill_circle(&mut self, x: f64, y: f64, radius: f64, color: &str);
}

/// Result of waiting for a media element to become ready.
#[derive(Debug, Clone, PartialEq)]
pub enum ReadyOutcome {
    Ready,
    Failed(String),
    TimedOut,
}

/// Result of waiting for a seek to be acknowledged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettleOutcome {
    Settled,
    /// Non-fatal: the caller continues best-effort.
    TimedOut,
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory fakes that record every write.

    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    pub enum MediaCall {
        SetTime(f64),
        Play,
        Pause,
        SetRate(f64),
        SetSource(Option<String>),
        SetVisible(bool),
    }

    #[derive(Debug, Clone)]
    pub struct FakeMedia {
        pub time: f64,
        pub paused: bool,
        pub rate: f64,
        pub intrinsic: Option<PixelSize>,
        pub duration: Option<f64>,
        pub display: CssSize,
        pub source: Option<String>,
        pub visible: bool,
        /// Autoplay policy: when false, play requests are rejected and the element stays paused.
        pub allow_play: bool,
        pub calls: Vec<MediaCall>,
    }

    impl FakeMedia {
        pub fn new() -> Self {
            FakeMedia {
                time: 0.0,
                paused: true,
                rate: 1.0,
                intrinsic: Some(PixelSize::new(1280, 720)),
                duration: Some(10.0),
                display: CssSize::new(640.0, 360.0),
                source: None,
                visible: true,
                allow_play: true,
                calls: Vec::new(),
            }
        }

        pub fn playing_at(time: f64) -> Self {
            FakeMedia {
                time,
                paused: false,
                ..FakeMedia::new()
            }
        }

        pub fn take_calls(&mut self) -> Vec<MediaCall> {
            std::mem::take(&mut self.calls)
        }
    }

    impl MediaElement for FakeMedia {
        fn current_time(&self) -> MediaTime {
            MediaTime::from_secs(self.time)
        }

        fn set_current_time(&mut self, time: MediaTime) {
            self.time = time.as_secs();
            self.calls.push(MediaCall::SetTime(time.as_secs()));
        }

        fn is_paused(&self) -> bool {
            self.paused
        }

        fn request_play(&mut self) {
            self.calls.push(MediaCall::Play);
            if self.allow_play {
                self.paused = false;
            }
        }

        fn pause(&mut self) {
            self.paused = true;
            self.calls.push(MediaCall::Pause);
        }

        fn playback_rate(&self) -> PlaybackRate {
            PlaybackRate::new(self.rate)
        }

        fn set_playback_rate(&mut self, rate: PlaybackRate) {
            self.rate = rate.as_f64();
            self.calls.push(MediaCall::SetRate(rate.as_f64()));
        }

        fn intrinsic_size(&self) -> Option<PixelSize> {
            self.intrinsic
        }

        fn duration(&self) -> Option<MediaTime> {
            self.duration.map(MediaTime::from_secs)
        }

        fn display_size(&self) -> CssSize {
            self.display
        }

        fn set_source(&mut self, src: Option<&str>) {
            self.source = src.map(str::to_string);
            self.calls.push(MediaCall::SetSource(self.source.clone()));
        }

        fn set_visible(&mut self, visible: bool) {
            self.visible = visible;
            self.calls.push(MediaCall::SetVisible(visible));
        }
    }

    impl LayerElement for FakeMedia {
        fn set_display_size(&mut self, size: CssSize) {
            self.display = size;
        }
    }

    #[derive(Debug, Clone, Default)]
    pub struct FakeSurface {
        pub display: CssSize,
        pub backing: PixelSize,
        pub scale: f64,
        /// Number of backing-buffer writes (each one reallocates on real canvases).
        pub reallocations: u32,
        pub circles: Vec<(f64, f64, f64, String)>,
        pub clears: u32,
    }

    impl LayerElement for FakeSurface {
        fn set_display_size(&mut self, size: CssSize) {
            self.display = size;
        }
    }

    impl DrawingSurface for FakeSurface {
        fn backing_size(&self) -> PixelSize {
            self.backing
        }

        fn set_backing_width(&mut self, width: u32) {
            self.backing.width = width;
            self.reallocations += 1;
        }

        fn set_backing_height(&mut self, height: u32) {
            self.backing.height = height;
            self.reallocations += 1;
        }

        fn set_scale_transform(&mut self, scale: f64) {
            self.scale = scale;
        }

        fn clear(&mut self) {
            self.circles.clear();
            self.clears += 1;
        }

        fn fill_circle(&mut self, x: f64, y: f64, radius: f64, color: &str) {
            self.circles.push((x, y, radius, color.to_string()));
        }
    }
}
