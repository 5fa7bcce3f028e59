// Strong typing over bare floats. Newtypes for media time, frame indices, rates, and pixel units.
// See DESIGN.md: Types

use serde::{Deserialize, Serialize};

use crate::error::ViewerError;

/// Media position in seconds, as reported by a media element.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize, Default)]
pub struct MediaTime(f64);

impl MediaTime {
    pub const ZERO: MediaTime = MediaTime(0.0);

    /// Non-finite input (NaN from an unloaded element) collapses to zero.
    pub fn from_secs(secs: f64) -> Self {
        if secs.is_finite() {
            MediaTime(secs)
        } else {
            MediaTime::ZERO
        }
    }

    pub fn as_secs(&self) -> f64 {
        self.0
    }

    /// Absolute distance between two positions, in seconds.
    pub fn distance(&self, other: MediaTime) -> f64 {
        (self.0 - other.0).abs()
    }
}

/// Frame index, 1-based like the per-frame series arrays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FrameIndex(u32);

impl FrameIndex {
    pub const FIRST: FrameIndex = FrameIndex(1);

    /// Frame 0 does not exist; it is lifted to the first frame.
    pub fn new(index: u32) -> Self {
        FrameIndex(index.max(1))
    }

    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl Default for FrameIndex {
    fn default() -> Self {
        FrameIndex::FIRST
    }
}

/// Playback rate multiplier (1.0 = normal speed).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlaybackRate(f64);

impl PlaybackRate {
    pub const NORMAL: PlaybackRate = PlaybackRate(1.0);

    pub fn new(rate: f64) -> Self {
        if rate.is_finite() && rate > 0.0 {
            PlaybackRate(rate)
        } else {
            PlaybackRate::NORMAL
        }
    }

    pub fn as_f64(&self) -> f64 {
        self.0
    }

    pub fn differs_from(&self, other: PlaybackRate) -> bool {
        (self.0 - other.0).abs() > f64::EPSILON
    }
}

impl Default for PlaybackRate {
    fn default() -> Self {
        PlaybackRate::NORMAL
    }
}

/// Displayed (CSS pixel) size of an element.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct CssSize {
    pub width: f64,
    pub height: f64,
}

impl CssSize {
    pub fn new(width: f64, height: f64) -> Self {
        CssSize {
            width: sanitize_len(width),
            height: sanitize_len(height),
        }
    }
}

fn sanitize_len(v: f64) -> f64 {
    if v.is_finite() && v > 0.0 {
        v
    } else {
        0.0
    }
}

/// Whole-pixel size: intrinsic video size or a surface's backing resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PixelSize {
    pub width: u32,
    pub height: u32,
}

impl PixelSize {
    pub fn new(width: u32, height: u32) -> Self {
        PixelSize { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Device pixel ratio. Missing or nonsensical values fall back to 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DevicePixelRatio(f64);

impl DevicePixelRatio {
    pub fn new(ratio: f64) -> Self {
        if ratio.is_finite() && ratio > 0.0 {
            DevicePixelRatio(ratio)
        } else {
            DevicePixelRatio(1.0)
        }
    }

    pub fn as_f64(&self) -> f64 {
        self.0
    }
}

impl Default for DevicePixelRatio {
    fn default() -> Self {
        DevicePixelRatio(1.0)
    }
}

/// Token identifying one overlay/report switch. Strictly increasing per controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct RequestToken(u64);

impl RequestToken {
    pub fn new(raw: u64) -> Self {
        RequestToken(raw)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }

    pub fn next(&self) -> Self {
        RequestToken(self.0.wrapping_add(1))
    }
}

impl std::fmt::Display for RequestToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Which tick source drives the reconciliation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TickSource {
    /// Per decoded video frame of the primary (`requestVideoFrameCallback`).
    VideoFrame,
    /// Periodic position updates (`timeupdate`).
    TimeUpdate,
}

/// CSS blend mode applied to the overlay video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BlendMode {
    Normal,
    Screen,
    Multiply,
    Overlay,
    Lighten,
    Darken,
    Difference,
}

impl BlendMode {
    pub fn as_css(&self) -> &'static str {
        match self {
            BlendMode::Normal => "normal",
            BlendMode::Screen => "screen",
            BlendMode::Multiply => "multiply",
            BlendMode::Overlay => "overlay",
            BlendMode::Lighten => "lighten",
            BlendMode::Darken => "darken",
            BlendMode::Difference => "difference",
        }
    }

    /// Unknown or empty values map to `Normal`, like an unset select box.
    pub fn from_css(value: &str) -> Self {
        match value.trim() {
            "screen" => BlendMode::Screen,
            "multiply" => BlendMode::Multiply,
            "overlay" => BlendMode::Overlay,
            "lighten" => BlendMode::Lighten,
            "darken" => BlendMode::Darken,
            "difference" => BlendMode::Difference,
            _ => BlendMode::Normal,
        }
    }
}

impl Default for BlendMode {
    fn default() -> Self {
        BlendMode::Screen
    }
}

/// Overlay opacity from a 0-100 slider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpacityPercent(u8);

impl OpacityPercent {
    pub fn new(percent: f64) -> Self {
        if percent.is_finite() {
            OpacityPercent(percent.round().clamp(0.0, 100.0) as u8)
        } else {
            OpacityPercent::default()
        }
    }

    /// CSS `opacity` value (0.0 to 1.0).
    pub fn as_css(&self) -> f64 {
        f64::from(self.0) / 100.0
    }
}

impl Default for OpacityPercent {
    fn default() -> Self {
        OpacityPercent(70)
    }
}

/// Viewer configuration passed from JS.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewerConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub sync: SyncSettings,
    #[serde(default)]
    pub overlay: OverlaySettings,
    #[serde(default)]
    pub keypoints: KeypointSettings,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        ViewerConfig {
            base_url: default_base_url(),
            sync: SyncSettings::default(),
            overlay: OverlaySettings::default(),
            keypoints: KeypointSettings::default(),
        }
    }
}

impl ViewerConfig {
    /// Parse and validate a JSON config string.
    pub fn from_json(json: &str) -> Result<Self, ViewerError> {
        let config: ViewerConfig = serde_json::from_str(json)
            .map_err(|e| ViewerError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ViewerError> {
        let sync = &self.sync;
        if !sync.tolerance_secs.is_finite() || sync.tolerance_secs < 0.0 {
            return Err(ViewerError::InvalidConfig(format!(
                "sync.tolerance_secs must be a non-negative number, got {}",
                sync.tolerance_secs
            )));
        }
        if sync.seek_settle_timeout_ms == 0 || sync.metadata_timeout_ms == 0 {
            return Err(ViewerError::InvalidConfig(
                "sync timeouts must be greater than zero".to_string(),
            ));
        }
        if self.overlay.opacity_percent.as_css() > 1.0 {
            return Err(ViewerError::InvalidConfig(
                "overlay.opacity_percent must be within 0..=100".to_string(),
            ));
        }
        if !self.keypoints.radius.is_finite() || self.keypoints.radius <= 0.0 {
            return Err(ViewerError::InvalidConfig(
                "keypoints.radius must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_base_url() -> String {
    "reports".to_string()
}

/// Synchronization tuning. Empirical values, not precision guarantees.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Overlay drift allowed before it is re-seeked (seconds).
    #[serde(default = "default_tolerance")]
    pub tolerance_secs: f64,
    /// Use the per-frame callback when the browser has one.
    #[serde(default = "default_true")]
    pub prefer_frame_callback: bool,
    /// Upper bound on waiting for a `seeked` acknowledgment (milliseconds).
    #[serde(default = "default_seek_settle_timeout")]
    pub seek_settle_timeout_ms: u32,
    /// Upper bound on waiting for overlay metadata (milliseconds).
    #[serde(default = "default_metadata_timeout")]
    pub metadata_timeout_ms: u32,
}

impl Default for SyncSettings {
    fn default() -> Self {
        SyncSettings {
            tolerance_secs: default_tolerance(),
            prefer_frame_callback: true,
            seek_settle_timeout_ms: default_seek_settle_timeout(),
            metadata_timeout_ms: default_metadata_timeout(),
        }
    }
}

fn default_tolerance() -> f64 {
    0.05
}

fn default_true() -> bool {
    true
}

fn default_seek_settle_timeout() -> u32 {
    1_200
}

fn default_metadata_timeout() -> u32 {
    10_000
}

/// Overlay presentation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverlaySettings {
    #[serde(default)]
    pub opacity_percent: OpacityPercent,
    #[serde(default)]
    pub blend: BlendMode,
    /// Overlay selected automatically when a report opens; `null` for none.
    #[serde(default = "default_overlay_kind")]
    pub default_kind: Option<String>,
}

impl Default for OverlaySettings {
    fn default() -> Self {
        OverlaySettings {
            opacity_percent: OpacityPercent::default(),
            blend: BlendMode::default(),
            default_kind: default_overlay_kind(),
        }
    }
}

fn default_overlay_kind() -> Option<String> {
    Some("skeleton".to_string())
}

/// Keypoint marker appearance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeypointSettings {
    #[serde(default = "default_radius")]
    pub radius: f64,
    #[serde(default = "default_color")]
    pub color: String,
}

impl Default for KeypointSettings {
    fn default() -> Self {
        KeypointSettings {
            radius: default_radius(),
            color: default_color(),
        }
    }
}

fn default_radius() -> f64 {
    3.0
}

fn default_color() -> String {
    "lime".to_string()
}

/// A keypoint in intrinsic video pixel space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Keypoint {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub score: Option<f64>,
}

impl Keypoint {
    pub fn new(x: f64, y: f64) -> Self {
        Keypoint { x, y, score: None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_time_rejects_nan() {
        assert_eq!(MediaTime::from_secs(f64::NAN), MediaTime::ZERO);
        assert!((MediaTime::from_secs(1.5).distance(MediaTime::from_secs(1.0)) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn dpr_falls_back_to_one() {
        assert_eq!(DevicePixelRatio::new(0.0).as_f64(), 1.0);
        assert_eq!(DevicePixelRatio::new(f64::NAN).as_f64(), 1.0);
        assert_eq!(DevicePixelRatio::new(2.0).as_f64(), 2.0);
    }

    #[test]
    fn opacity_clamps_and_scales() {
        assert_eq!(OpacityPercent::new(150.0).as_css(), 1.0);
        assert_eq!(OpacityPercent::new(-3.0).as_css(), 0.0);
        assert!((OpacityPercent::default().as_css() - 0.7).abs() < 1e-12);
    }

    #[test]
    fn blend_mode_parsing() {
        assert_eq!(BlendMode::from_css("multiply"), BlendMode::Multiply);
        assert_eq!(BlendMode::from_css(""), BlendMode::Normal);
        assert_eq!(BlendMode::default().as_css(), "screen");
    }

    #[test]
    fn config_defaults_fill_missing_sections() {
        let config: ViewerConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.base_url, "reports");
        assert_eq!(config.sync.tolerance_secs, 0.05);
        assert_eq!(config.sync.seek_settle_timeout_ms, 1_200);
        assert!(config.sync.prefer_frame_callback);
        assert_eq!(config.overlay.blend, BlendMode::Screen);
        assert_eq!(config.keypoints.radius, 3.0);
    }

    #[test]
    fn skeleton_overlay_is_preselected_unless_disabled() {
        let config = ViewerConfig::from_json("{}").unwrap();
        assert_eq!(config.overlay.default_kind.as_deref(), Some("skeleton"));

        let partial = ViewerConfig::from_json(r#"{"overlay":{"blend":"normal"}}"#).unwrap();
        assert_eq!(partial.overlay.default_kind.as_deref(), Some("skeleton"));

        let none = ViewerConfig::from_json(r#"{"overlay":{"default_kind":null}}"#).unwrap();
        assert_eq!(none.overlay.default_kind, None);
    }

    #[test]
    fn config_validation_rejects_bad_values() {
        assert!(ViewerConfig::from_json(r#"{"sync":{"tolerance_secs":-1.0}}"#).is_err());
        assert!(ViewerConfig::from_json(r#"{"sync":{"seek_settle_timeout_ms":0}}"#).is_err());
        assert!(ViewerConfig::from_json(r#"{"overlay":{"opacity_percent":150}}"#).is_err());
        assert!(ViewerConfig::from_json("not json").is_err());
        assert!(ViewerConfig::from_json(r#"{"overlay":{"blend":"multiply"}}"#).is_ok());
    }

    #[test]
    fn frame_index_is_one_based() {
        assert_eq!(FrameIndex::new(0), FrameIndex::FIRST);
        assert_eq!(FrameIndex::new(91).as_u32(), 91);
    }
}
