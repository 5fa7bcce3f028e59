// Dual-media synchronization: the primary is the only source of truth for time, rate, and play state.
// Rule: the overlay never drives the primary, and nothing touches the overlay before its metadata loads.
// See DESIGN.md: Dual-Media Sync Controller

use log::{debug, info, warn};

use crate::error::ViewerError;
use crate::media::MediaElement;
use crate::types::*;

/// Overlay lifecycle. `Absent` is a normal steady state.
#[derive(Debug, Clone, PartialEq)]
pub enum OverlayState {
    Absent,
    /// Source assigned, waiting for metadata. No reconciliation yet.
    Loading { token: RequestToken, asset: String },
    Ready { token: RequestToken, asset: String },
}

impl OverlayState {
    pub fn asset(&self) -> Option<&str> {
        match self {
            OverlayState::Absent => None,
            OverlayState::Loading { asset, .. } | OverlayState::Ready { asset, .. } => Some(asset),
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, OverlayState::Ready { .. })
    }
}

/// Play-state correction issued to the overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayCommand {
    Play,
    Pause,
}

/// Corrections applied during one reconciliation pass. At most one per property.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SyncActions {
    pub seeked_to: Option<MediaTime>,
    pub play_state: Option<PlayCommand>,
    pub rate: Option<PlaybackRate>,
}

impl SyncActions {
    pub fn is_empty(&self) -> bool {
        self.seeked_to.is_none() && self.play_state.is_none() && self.rate.is_none()
    }
}

/// Running counters, mostly for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
pub struct SyncStats {
    pub ticks: u64,
    pub time_corrections: u64,
    pub play_corrections: u64,
    pub rate_corrections: u64,
    pub stale_discarded: u64,
}

/// User-facing notice for an overlay that failed to load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlayNotice {
    pub asset: String,
    pub reason: String,
}

impl std::fmt::Display for OverlayNotice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Overlay '{}' could not be loaded ({}). Showing the main video only.",
            self.asset, self.reason
        )
    }
}

/// Keeps an overlay media element locked to a primary one.
pub struct SyncController<M: MediaElement> {
    primary: M,
    overlay: M,
    tolerance_secs: f64,
    state: OverlayState,
    token: RequestToken,
    stats: SyncStats,
}

impl<M: MediaElement> SyncController<M> {
    /// Takes ownership of both elements; the overlay starts detached and hidden.
    pub fn new(primary: M, mut overlay: M, settings: &SyncSettings) -> Self {
        overlay.set_source(None);
        overlay.set_visible(false);
        SyncController {
            primary,
            overlay,
            tolerance_secs: settings.tolerance_secs,
            state: OverlayState::Absent,
            token: RequestToken::default(),
            stats: SyncStats::default(),
        }
    }

    pub fn primary(&self) -> &M {
        &self.primary
    }

    pub fn primary_mut(&mut self) -> &mut M {
        &mut self.primary
    }

    pub fn overlay(&self) -> &M {
        &self.overlay
    }

    pub fn overlay_mut(&mut self) -> &mut M {
        &mut self.overlay
    }

    pub fn overlay_state(&self) -> &OverlayState {
        &self.state
    }

    pub fn current_token(&self) -> RequestToken {
        self.token
    }

    pub fn stats(&self) -> SyncStats {
        self.stats
    }

    pub fn tolerance_secs(&self) -> f64 {
        self.tolerance_secs
    }

    /// Current playback position of the primary.
    pub fn position(&self) -> MediaTime {
        self.primary.current_time()
    }

    /// Release both elements, e.g. when the viewer detaches.
    pub fn into_parts(self) -> (M, M) {
        (self.primary, self.overlay)
    }

    /// Swap the overlay asset. Every call invalidates earlier requests.
    /// Returns the token the metadata completion must present, or `None` when the overlay is now absent.
    pub fn select_overlay(&mut self, asset: Option<&str>) -> Option<RequestToken> {
        self.token = self.token.next();
        let asset = asset.map(str::trim).filter(|a| !a.is_empty());

        match asset {
            None => {
                self.detach_overlay();
                info!("overlay cleared ({})", self.token);
                None
            }
            Some(asset) => {
                self.overlay.pause();
                self.overlay.set_source(Some(asset));
                self.overlay.set_visible(true);
                self.state = OverlayState::Loading {
                    token: self.token,
                    asset: asset.to_string(),
                };
                info!("overlay '{}' loading ({})", asset, self.token);
                Some(self.token)
            }
        }
    }

    /// Switch the primary to a new report's video. The overlay is reset to absent.
    pub fn open_primary(&mut self, src: &str) -> RequestToken {
        self.token = self.token.next();
        self.detach_overlay();
        self.primary.set_source(Some(src));
        self.primary.set_visible(true);
        info!("primary '{}' opened ({})", src, self.token);
        self.token
    }

    /// Overlay metadata arrived for `token`: mark it ready and align it with the primary.
    pub fn overlay_ready(&mut self, token: RequestToken) -> Result<SyncActions, ViewerError> {
        let pending = match &self.state {
            OverlayState::Loading { token: pending, asset } if *pending == token => {
                Some(asset.clone())
            }
            _ => None,
        };
        let Some(asset) = pending else {
            return Err(self.stale(token));
        };
        self.state = OverlayState::Ready { token, asset };
        debug!("overlay ready ({})", token);
        let target = self.primary.current_time();
        Ok(self.reconcile(target))
    }

    /// Overlay failed to load for `token`: fall back to absent and describe why.
    pub fn overlay_failed(
        &mut self,
        token: RequestToken,
        reason: &str,
    ) -> Result<OverlayNotice, ViewerError> {
        let pending = match &self.state {
            OverlayState::Loading { token: pending, asset }
            | OverlayState::Ready { token: pending, asset }
                if *pending == token =>
            {
                Some(asset.clone())
            }
            _ => None,
        };
        let Some(asset) = pending else {
            return Err(self.stale(token));
        };
        warn!("overlay '{}' failed: {}", asset, reason);
        self.detach_overlay();
        Ok(OverlayNotice {
            asset,
            reason: reason.to_string(),
        })
    }

    /// Primary started playing.
    pub fn on_primary_play(&mut self) {
        if self.state.is_ready() {
            self.overlay.request_play();
        }
    }

    /// Primary paused.
    pub fn on_primary_pause(&mut self) {
        if self.state.is_ready() {
            self.overlay.pause();
        }
    }

    /// Primary rate changed, from our controls or the native UI.
    pub fn on_primary_rate_change(&mut self) -> Option<PlaybackRate> {
        if !self.state.is_ready() {
            return None;
        }
        let rate = self.primary.playback_rate();
        if rate.differs_from(self.overlay.playback_rate()) {
            self.overlay.set_playback_rate(rate);
            Some(rate)
        } else {
            None
        }
    }

    /// External seek command. Clamped to the primary's known duration.
    pub fn seek(&mut self, time: MediaTime) -> MediaTime {
        let mut time = MediaTime::from_secs(time.as_secs().max(0.0));
        if let Some(duration) = self.primary.duration() {
            if time > duration {
                time = duration;
            }
        }
        self.primary.set_current_time(time);
        if self.state.is_ready() {
            self.overlay.set_current_time(time);
        }
        time
    }

    /// External rate command, propagated to the overlay.
    pub fn set_playback_rate(&mut self, rate: PlaybackRate) -> PlaybackRate {
        if rate.differs_from(self.primary.playback_rate()) {
            self.primary.set_playback_rate(rate);
        }
        self.on_primary_rate_change();
        rate
    }

    /// One reconciliation pass against the primary's current time.
    /// A no-op unless the overlay is loaded.
    pub fn tick(&mut self) -> SyncActions {
        let target = self.primary.current_time();
        self.tick_at(target)
    }

    /// One reconciliation pass against `presented`, the media time of the frame
    /// the primary actually put on screen.
    pub fn tick_at(&mut self, presented: MediaTime) -> SyncActions {
        self.stats.ticks += 1;
        if !self.state.is_ready() {
            return SyncActions::default();
        }
        self.reconcile(presented)
    }

    fn reconcile(&mut self, target: MediaTime) -> SyncActions {
        let mut actions = SyncActions::default();

        if self.overlay.current_time().distance(target) > self.tolerance_secs {
            self.overlay.set_current_time(target);
            actions.seeked_to = Some(target);
            self.stats.time_corrections += 1;
        }

        let primary_paused = self.primary.is_paused();
        if self.overlay.is_paused() != primary_paused {
            let command = if primary_paused {
                self.overlay.pause();
                PlayCommand::Pause
            } else {
                self.overlay.request_play();
                PlayCommand::Play
            };
            actions.play_state = Some(command);
            self.stats.play_corrections += 1;
        }

        let rate = self.primary.playback_rate();
        if rate.differs_from(self.overlay.playback_rate()) {
            self.overlay.set_playback_rate(rate);
            actions.rate = Some(rate);
            self.stats.rate_corrections += 1;
        }

        actions
    }

    fn detach_overlay(&mut self) {
        if self.state != OverlayState::Absent {
            self.overlay.pause();
        }
        self.overlay.set_source(None);
        self.overlay.set_visible(false);
        self.state = OverlayState::Absent;
    }

    fn stale(&mut self, token: RequestToken) -> ViewerError {
        self.stats.stale_discarded += 1;
        debug!("discarding completion for {} (current {})", token, self.token);
        ViewerError::StaleRequest {
            token,
            current: self.token,
        }
    }
}
