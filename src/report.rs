// Report resources: path convention, index entries, summary and series records.
// Records are read as-is; no shape normalization happens here.
// See DESIGN.md: Report resources

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Standard overlay videos rendered for every report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlayKind {
    Skeleton,
    HandTrace,
    HeadStability,
    CenterShift,
    ShoulderHipRotation,
}

impl OverlayKind {
    pub const ALL: [OverlayKind; 5] = [
        OverlayKind::Skeleton,
        OverlayKind::HandTrace,
        OverlayKind::HeadStability,
        OverlayKind::CenterShift,
        OverlayKind::ShoulderHipRotation,
    ];

    /// Selection key, also used for summary overrides.
    pub fn key(&self) -> &'static str {
        match self {
            OverlayKind::Skeleton => "skeleton",
            OverlayKind::HandTrace => "hand_trace",
            OverlayKind::HeadStability => "head_stability",
            OverlayKind::CenterShift => "center_shift",
            OverlayKind::ShoulderHipRotation => "shoulder_hip_rotation",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        let key = key.trim().trim_end_matches(".mp4");
        OverlayKind::ALL.into_iter().find(|k| k.key() == key)
    }

    pub fn file_name(&self) -> String {
        format!("{}.mp4", self.key())
    }

    pub fn label(&self) -> &'static str {
        match self {
            OverlayKind::Skeleton => "Skeleton",
            OverlayKind::HandTrace => "Hand trace",
            OverlayKind::HeadStability => "Head stability",
            OverlayKind::CenterShift => "Center of mass shift",
            OverlayKind::ShoulderHipRotation => "Shoulder/hip rotation",
        }
    }
}

pub const PRIMARY_VIDEO_FILE: &str = "report_video.mp4";
pub const SUMMARY_FILE: &str = "summary.json";
pub const SERIES_FILE: &str = "series.json";
pub const INDEX_FILE: &str = "index.json";

/// Identifies one report of one player.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReportRef {
    pub player_id: String,
    pub report_id: String,
}

impl ReportRef {
    pub fn new(player_id: impl Into<String>, report_id: impl Into<String>) -> Self {
        ReportRef {
            player_id: player_id.into(),
            report_id: report_id.into(),
        }
    }
}

/// `<base>/<playerId>/<reportId>/{summary.json, series.json, assets/*}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportPaths {
    root: String,
}

impl ReportPaths {
    pub fn new(base: &str, report: &ReportRef) -> Self {
        let base = base.trim_end_matches('/');
        let root = if base.is_empty() {
            format!("{}/{}", report.player_id, report.report_id)
        } else {
            format!("{}/{}/{}", base, report.player_id, report.report_id)
        };
        ReportPaths { root }
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn summary_url(&self) -> String {
        format!("{}/{}", self.root, SUMMARY_FILE)
    }

    pub fn series_url(&self) -> String {
        format!("{}/{}", self.root, SERIES_FILE)
    }

    pub fn asset_url(&self, file_name: &str) -> String {
        format!("{}/assets/{}", self.root, file_name.trim_start_matches('/'))
    }

    pub fn primary_video_url(&self) -> String {
        self.asset_url(PRIMARY_VIDEO_FILE)
    }

    pub fn overlay_url(&self, kind: OverlayKind) -> String {
        self.asset_url(&kind.file_name())
    }

    /// Resolve a summary override: absolute URLs and rooted paths pass through,
    /// anything else is relative to the report directory.
    pub fn resolve(&self, path: &str) -> String {
        let path = path.trim();
        if path.starts_with('/') || path.contains("://") {
            path.to_string()
        } else {
            format!("{}/{}", self.root, path.trim_start_matches("./"))
        }
    }
}

/// Index listing: `<base>/index.json`.
pub fn index_url(base: &str) -> String {
    let base = base.trim_end_matches('/');
    if base.is_empty() {
        INDEX_FILE.to_string()
    } else {
        format!("{}/{}", base, INDEX_FILE)
    }
}

/// One row of the report index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportIndexEntry {
    pub player_id: String,
    pub report_id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
}

impl ReportIndexEntry {
    pub fn report_ref(&self) -> ReportRef {
        ReportRef::new(self.player_id.clone(), self.report_id.clone())
    }

    /// Title if present, otherwise the report id.
    pub fn display_title(&self) -> &str {
        self.title
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or(&self.report_id)
    }
}

/// Asset path overrides carried by a summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct AssetOverrides {
    #[serde(default)]
    pub video: Option<String>,
    #[serde(default)]
    pub overlays: BTreeMap<String, String>,
}

/// Per-report summary: scalar metrics plus optional asset overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ReportSummary {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub assets: AssetOverrides,
    #[serde(flatten)]
    pub metrics: BTreeMap<String, Value>,
}

impl ReportSummary {
    pub fn metric(&self, name: &str) -> Option<f64> {
        self.metrics.get(name).and_then(Value::as_f64)
    }
}

/// Per-frame motion data keyed by metric name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ReportSeries {
    #[serde(default)]
    pub fps: Option<f64>,
    #[serde(flatten)]
    pub fields: BTreeMap<String, Value>,
}

impl ReportSeries {
    /// Values for one metric, `None` per frame where a value is missing.
    /// An absent or non-array field means there is nothing to chart.
    pub fn series(&self, name: &str) -> Option<Vec<Option<f64>>> {
        let values = self.fields.get(name)?.as_array()?;
        if values.is_empty() {
            return None;
        }
        Some(values.iter().map(Value::as_f64).collect())
    }

    /// Names of every array-valued field.
    pub fn metric_names(&self) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|(_, v)| v.is_array())
            .map(|(k, _)| k.as_str())
            .collect()
    }

    /// Length of the longest array.
    pub fn frame_count(&self) -> usize {
        self.fields
            .values()
            .filter_map(Value::as_array)
            .map(Vec::len)
            .max()
            .unwrap_or(0)
    }
}
