// One session per open report. Replaces a process-wide state object.
// See DESIGN.md: Viewer session

use log::{info, warn};

use crate::error::ViewerError;
use crate::report::*;
use crate::timeline::{FrameClock, DEFAULT_FPS};
use crate::types::{FrameIndex, MediaTime};

/// A selectable overlay for the open report.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct OverlayOption {
    pub kind: OverlayKind,
    pub label: &'static str,
    pub url: String,
}

/// Everything the viewer knows about the report currently on screen.
#[derive(Debug, Clone)]
pub struct ViewerSession {
    report: ReportRef,
    paths: ReportPaths,
    summary: ReportSummary,
    series: ReportSeries,
    clock: FrameClock,
    primary_url: String,
    overlays: Vec<OverlayOption>,
    selected: Option<OverlayKind>,
}

impl ViewerSession {
    pub fn open(
        base_url: &str,
        report: ReportRef,
        summary: ReportSummary,
        series: ReportSeries,
    ) -> Self {
        let paths = ReportPaths::new(base_url, &report);

        let clock = match series.fps.map(FrameClock::new) {
            Some(Ok(clock)) => clock,
            Some(Err(err)) => {
                warn!("{}; using {} fps", err, DEFAULT_FPS);
                FrameClock::default()
            }
            None => FrameClock::default(),
        };

        let primary_url = summary
            .assets
            .video
            .as_deref()
            .map(|p| paths.resolve(p))
            .unwrap_or_else(|| paths.primary_video_url());

        let overlays = OverlayKind::ALL
            .into_iter()
            .map(|kind| OverlayOption {
                kind,
                label: kind.label(),
                url: summary
                    .assets
                    .overlays
                    .get(kind.key())
                    .map(|p| paths.resolve(p))
                    .unwrap_or_else(|| paths.overlay_url(kind)),
            })
            .collect();

        info!(
            "session opened for {}/{} at {} fps",
            report.player_id,
            report.report_id,
            clock.fps()
        );

        ViewerSession {
            report,
            paths,
            summary,
            series,
            clock,
            primary_url,
            overlays,
            selected: None,
        }
    }

    pub fn report(&self) -> &ReportRef {
        &self.report
    }

    pub fn paths(&self) -> &ReportPaths {
        &self.paths
    }

    pub fn summary(&self) -> &ReportSummary {
        &self.summary
    }

    pub fn series(&self) -> &ReportSeries {
        &self.series
    }

    pub fn clock(&self) -> FrameClock {
        self.clock
    }

    pub fn primary_url(&self) -> &str {
        &self.primary_url
    }

    pub fn overlays(&self) -> &[OverlayOption] {
        &self.overlays
    }

    pub fn selected_overlay(&self) -> Option<OverlayKind> {
        self.selected
    }

    /// Select an overlay by key; an empty key clears the selection.
    /// Returns the URL to load, or `None` for no overlay.
    pub fn select_overlay(&mut self, key: &str) -> Result<Option<&str>, ViewerError> {
        if key.trim().is_empty() {
            self.selected = None;
            return Ok(None);
        }
        let kind = OverlayKind::from_key(key)
            .ok_or_else(|| ViewerError::InvalidConfig(format!("unknown overlay '{}'", key)))?;
        self.selected = Some(kind);
        Ok(self.overlay_url(kind))
    }

    /// Forget the selection, e.g. after the selected overlay failed to load.
    pub fn clear_selection(&mut self) {
        self.selected = None;
    }

    pub fn overlay_url(&self, kind: OverlayKind) -> Option<&str> {
        self.overlays
            .iter()
            .find(|o| o.kind == kind)
            .map(|o| o.url.as_str())
    }

    /// Frame under the playback cursor, for chart highlighting.
    pub fn cursor_frame(&self, position: MediaTime) -> FrameIndex {
        self.clock.frame_at(position)
    }

    pub fn time_of_frame(&self, frame: FrameIndex) -> MediaTime {
        self.clock.time_of_frame(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(summary: ReportSummary, series: ReportSeries) -> ViewerSession {
        ViewerSession::open("reports", ReportRef::new("0001", "r1"), summary, series)
    }

    #[test]
    fn conventional_assets_by_default() {
        let s = session(ReportSummary::default(), ReportSeries::default());
        assert_eq!(s.primary_url(), "reports/0001/r1/assets/report_video.mp4");
        assert_eq!(s.overlays().len(), 5);
        assert_eq!(
            s.overlay_url(OverlayKind::HandTrace),
            Some("reports/0001/r1/assets/hand_trace.mp4")
        );
        assert_eq!(s.clock().fps(), DEFAULT_FPS);
    }

    #[test]
    fn summary_overrides_win() {
        let summary: ReportSummary = serde_json::from_str(
            r#"{"assets": {"video": "raw/cut.mp4", "overlays": {"skeleton": "/cdn/sk.mp4"}}}"#,
        )
        .unwrap();
        let s = session(summary, ReportSeries::default());
        assert_eq!(s.primary_url(), "reports/0001/r1/raw/cut.mp4");
        assert_eq!(s.overlay_url(OverlayKind::Skeleton), Some("/cdn/sk.mp4"));
    }

    #[test]
    fn series_fps_drives_the_clock() {
        let series: ReportSeries = serde_json::from_str(r#"{"fps": 60}"#).unwrap();
        let s = session(ReportSummary::default(), series);
        assert_eq!(s.cursor_frame(MediaTime::from_secs(1.0)), FrameIndex::new(61));
        assert_eq!(s.time_of_frame(FrameIndex::new(61)).as_secs(), 1.0);
    }

    #[test]
    fn invalid_fps_falls_back() {
        let series: ReportSeries = serde_json::from_str(r#"{"fps": 0}"#).unwrap();
        let s = session(ReportSummary::default(), series);
        assert_eq!(s.clock().fps(), DEFAULT_FPS);
    }

    #[test]
    fn overlay_selection() {
        let mut s = session(ReportSummary::default(), ReportSeries::default());
        assert_eq!(
            s.select_overlay("center_shift").unwrap(),
            Some("reports/0001/r1/assets/center_shift.mp4")
        );
        assert_eq!(s.selected_overlay(), Some(OverlayKind::CenterShift));
        assert_eq!(s.select_overlay("").unwrap(), None);
        assert_eq!(s.selected_overlay(), None);
        assert!(s.select_overlay("bogus").is_err());
    }

    #[test]
    fn clearing_keeps_the_options() {
        let mut s = session(ReportSummary::default(), ReportSeries::default());
        s.select_overlay("skeleton").unwrap();
        s.clear_selection();
        assert_eq!(s.selected_overlay(), None);
        assert_eq!(s.overlays().len(), 5);
    }
}
