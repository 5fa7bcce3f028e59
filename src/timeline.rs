// Frame/time conversion, seek slider mapping, and the time label.
// Series arrays are 1-based per frame: frame 1 is t = 0.

use crate::error::ViewerError;
use crate::types::{FrameIndex, MediaTime};

/// Frame rate assumed when a series record does not carry one.
pub const DEFAULT_FPS: f64 = 30.0;

/// Converts between frame indices and elapsed seconds at a fixed frame rate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameClock {
    fps: f64,
}

impl FrameClock {
    pub fn new(fps: f64) -> Result<Self, ViewerError> {
        if fps.is_finite() && fps > 0.0 {
            Ok(FrameClock { fps })
        } else {
            Err(ViewerError::InvalidFrameRate(fps))
        }
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }

    /// `t = (frame - 1) / fps`
    pub fn time_of_frame(&self, frame: FrameIndex) -> MediaTime {
        MediaTime::from_secs(f64::from(frame.as_u32() - 1) / self.fps)
    }

    /// `frame = round(t * fps) + 1`, never before the first frame.
    pub fn frame_at(&self, time: MediaTime) -> FrameIndex {
        let index = (time.as_secs() * self.fps).round();
        if index.is_finite() && index > 0.0 {
            FrameIndex::new((index.min(f64::from(u32::MAX - 1)) as u32) + 1)
        } else {
            FrameIndex::FIRST
        }
    }
}

impl Default for FrameClock {
    fn default() -> Self {
        FrameClock { fps: DEFAULT_FPS }
    }
}

/// Range-input seek bar with an integer scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeekBar {
    max: u32,
}

impl SeekBar {
    pub const DEFAULT_MAX: u32 = 1000;

    pub fn new(max: u32) -> Self {
        SeekBar { max: max.max(1) }
    }

    pub fn max(&self) -> u32 {
        self.max
    }

    /// Slider value for a position; 0 while the duration is unknown.
    pub fn value_for(&self, position: MediaTime, duration: Option<MediaTime>) -> u32 {
        match usable_duration(duration) {
            Some(d) => {
                let ratio = (position.as_secs() / d).clamp(0.0, 1.0);
                (ratio * f64::from(self.max)).round() as u32
            }
            None => 0,
        }
    }

    /// Position for a slider value, or `None` while the duration is unknown.
    pub fn position_for(&self, value: u32, duration: Option<MediaTime>) -> Option<MediaTime> {
        let d = usable_duration(duration)?;
        let ratio = f64::from(value.min(self.max)) / f64::from(self.max);
        Some(MediaTime::from_secs(ratio * d))
    }
}

impl Default for SeekBar {
    fn default() -> Self {
        SeekBar::new(SeekBar::DEFAULT_MAX)
    }
}

fn usable_duration(duration: Option<MediaTime>) -> Option<f64> {
    duration
        .map(|d| d.as_secs())
        .filter(|d| d.is_finite() && *d > 0.0)
}

/// `"t = 3.00s"`, or empty while the duration is unknown.
pub fn time_label(position: MediaTime, duration: Option<MediaTime>) -> String {
    match usable_duration(duration) {
        Some(_) => format!("t = {:.2}s", position.as_secs()),
        None => String::new(),
    }
}
