// The JS-facing viewer: owns the session, the sync controller, and every listener it registers.
// All mutation happens on the event loop; borrows of the shared state never span an await.
// See DESIGN.md: Viewer facade

use std::cell::RefCell;
use std::rc::Rc;

use log::{debug, error, info, warn};
use wasm_bindgen::closure::Closure;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::future_to_promise;
use web_sys::{Event, EventTarget, HtmlCanvasElement, HtmlVideoElement};

use crate::dom::{self, CanvasSurface, WebVideo};
use crate::error::ViewerError;
use crate::geometry::{self, VideoScale};
use crate::media::{MediaElement, ReadyOutcome, SettleOutcome};
use crate::report::{
    index_url, ReportIndexEntry, ReportPaths, ReportRef, ReportSeries, ReportSummary,
};
use crate::session::ViewerSession;
use crate::sync::{OverlayNotice, SyncController};
use crate::ticks::{self, TickLoop};
use crate::timeline::{self, FrameClock, SeekBar};
use crate::types::*;

/// Mutable state shared with event handlers and async tasks.
#[derive(Default)]
struct ViewerState {
    sync: Option<SyncController<WebVideo>>,
    surface: Option<CanvasSurface>,
    session: Option<ViewerSession>,
    /// Guards report loads; bumped on every `open_report`.
    report_request: RequestToken,
    keypoints: Vec<Keypoint>,
    keypoints_dirty: bool,
    notices: Vec<String>,
}

impl ViewerState {
    fn sync_mut(&mut self) -> Result<&mut SyncController<WebVideo>, ViewerError> {
        self.sync
            .as_mut()
            .ok_or_else(|| ViewerError::Js("viewer is not attached".to_string()))
    }

    fn notify(&mut self, message: String) {
        self.notices.push(message);
    }

    fn clock(&self) -> FrameClock {
        self.session
            .as_ref()
            .map(ViewerSession::clock)
            .unwrap_or_default()
    }

    /// Queue a notice for a primary video that failed to load, unless a newer
    /// report has replaced it in the meantime.
    fn primary_failed(&mut self, token: RequestToken, asset: &str, reason: String) {
        if self.report_request != token {
            debug!("primary failure for report load {} ignored", token);
            return;
        }
        let err = ViewerError::MediaLoad {
            asset: asset.to_string(),
            reason,
        };
        warn!("{}", err);
        self.notify(err.to_string());
    }

    /// The overlay fell back to absent, so nothing is selected any more.
    fn overlay_dropped(&mut self, notice: OverlayNotice) {
        if let Some(session) = self.session.as_mut() {
            session.clear_selection();
        }
        self.notify(notice.to_string());
    }

    /// Index entries as JSON. A failed fetch becomes a notice and an empty list.
    fn index_loaded(
        &mut self,
        result: Result<Vec<ReportIndexEntry>, ViewerError>,
    ) -> Result<String, ViewerError> {
        let entries = result.unwrap_or_else(|err| {
            error!("{}", err);
            self.notify(err.to_string());
            Vec::new()
        });
        info!("report index lists {} reports", entries.len());
        Ok(serde_json::to_string(&entries)?)
    }

    /// Resize overlay and canvas to the primary's box at the current DPR.
    fn sync_geometry(&mut self) {
        let ViewerState {
            sync: Some(sync),
            surface: Some(surface),
            keypoints_dirty,
            ..
        } = self
        else {
            return;
        };
        let display = sync.primary().display_size();
        let change = geometry::sync_layers(
            display,
            dom::device_pixel_ratio(),
            Some(sync.overlay_mut()),
            surface,
        );
        if change.backing_resized {
            // A resized canvas is blank; repaint on the next tick.
            *keypoints_dirty = true;
        }
    }

    /// One reconciliation tick. The only place the canvas is drawn.
    fn on_tick(&mut self, presented: MediaTime, settings: &KeypointSettings) {
        let ViewerState {
            sync: Some(sync),
            surface,
            keypoints,
            keypoints_dirty,
            ..
        } = self
        else {
            return;
        };
        sync.tick_at(presented);

        if *keypoints_dirty {
            if let Some(surface) = surface {
                let primary = sync.primary();
                let scale = VideoScale::new(primary.display_size(), primary.intrinsic_size());
                geometry::draw_keypoints(surface, scale, keypoints, settings);
            }
            *keypoints_dirty = false;
        }
    }
}

type SharedState = Rc<RefCell<ViewerState>>;

/// Run `f` on the state unless it is already borrowed (re-entrant dispatch).
fn with_state(state: &SharedState, f: impl FnOnce(&mut ViewerState)) {
    match state.try_borrow_mut() {
        Ok(mut guard) => f(&mut guard),
        Err(_) => debug!("viewer state busy; event skipped"),
    }
}

/// An event listener removed again on drop.
struct Listener {
    target: EventTarget,
    event: &'static str,
    closure: Closure<dyn FnMut(Event)>,
}

impl Listener {
    fn add(
        target: &EventTarget,
        event: &'static str,
        handler: impl FnMut(Event) + 'static,
    ) -> Result<Self, ViewerError> {
        let closure = Closure::wrap(Box::new(handler) as Box<dyn FnMut(Event)>);
        target
            .add_event_listener_with_callback(event, closure.as_ref().unchecked_ref())
            .map_err(dom::js_error)?;
        Ok(Listener {
            target: target.clone(),
            event,
            closure,
        })
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        let _ = self
            .target
            .remove_event_listener_with_callback(self.event, self.closure.as_ref().unchecked_ref());
    }
}

/// Everything wired by `attach`; dropping it unwires.
struct Attachment {
    _listeners: Vec<Listener>,
    ticks: TickLoop,
}

/// Main viewer interface exposed to JavaScript.
#[wasm_bindgen]
pub struct Viewer {
    config: Rc<ViewerConfig>,
    state: SharedState,
    attachment: Option<Attachment>,
}

#[wasm_bindgen]
impl Viewer {
    #[wasm_bindgen(constructor)]
    pub fn new(config_json: &str) -> Result<Viewer, JsValue> {
        let config = ViewerConfig::from_json(config_json)?;
        Ok(Viewer {
            config: Rc::new(config),
            state: Rc::new(RefCell::new(ViewerState::default())),
            attachment: None,
        })
    }

    /// Pair the viewer with its primary video, overlay video, and canvas.
    /// Re-attaching detaches the previous pairing first.
    pub fn attach(
        &mut self,
        primary: HtmlVideoElement,
        overlay: HtmlVideoElement,
        canvas: HtmlCanvasElement,
    ) -> Result<(), JsValue> {
        self.detach();

        let surface = CanvasSurface::new(canvas)?;
        let overlay = WebVideo::new(overlay, "overlay");
        overlay.set_opacity(self.config.overlay.opacity_percent);
        overlay.set_blend_mode(self.config.overlay.blend);
        let sync = SyncController::new(
            WebVideo::new(primary.clone(), "primary"),
            overlay,
            &self.config.sync,
        );
        {
            let mut state = self.state.borrow_mut();
            state.sync = Some(sync);
            state.surface = Some(surface);
            state.sync_geometry();
        }

        let window = dom::window()?;
        let document = window
            .document()
            .ok_or_else(|| ViewerError::Js("no document".to_string()))?;

        let listeners = vec![
            self.listen(&primary, "loadedmetadata", ViewerState::sync_geometry)?,
            self.listen(&window, "resize", ViewerState::sync_geometry)?,
            self.listen(&document, "fullscreenchange", ViewerState::sync_geometry)?,
            self.listen(&primary, "play", |s| {
                if let Some(sync) = s.sync.as_mut() {
                    sync.on_primary_play();
                }
            })?,
            self.listen(&primary, "pause", |s| {
                if let Some(sync) = s.sync.as_mut() {
                    sync.on_primary_pause();
                }
            })?,
            self.listen(&primary, "ratechange", |s| {
                if let Some(sync) = s.sync.as_mut() {
                    sync.on_primary_rate_change();
                }
            })?,
            // Seeks while paused present no new frame callback; repaint on arrival.
            self.listen(&primary, "seeked", |s| s.keypoints_dirty = true)?,
        ];

        let source = ticks::choose_tick_source(&primary, self.config.sync.prefer_frame_callback);
        let tick_state = Rc::clone(&self.state);
        let keypoint_settings = self.config.keypoints.clone();
        let ticks = TickLoop::new(primary, source, move |media_time| {
            with_state(&tick_state, |s| s.on_tick(media_time, &keypoint_settings));
        });
        ticks.start();
        info!("viewer attached ({:?} ticks)", source);

        self.attachment = Some(Attachment {
            _listeners: listeners,
            ticks,
        });
        Ok(())
    }

    /// Remove every listener, stop ticking, and release the elements.
    pub fn detach(&mut self) {
        let Some(attachment) = self.attachment.take() else {
            return;
        };
        drop(attachment);
        let mut state = self.state.borrow_mut();
        if let Some(mut sync) = state.sync.take() {
            sync.select_overlay(None);
        }
        state.surface = None;
        info!("viewer detached");
    }

    pub fn is_attached(&self) -> bool {
        self.attachment.is_some()
    }

    /// Load a report's summary and series, then switch both videos to it.
    /// Fetch failures become notices; the report still opens with what is available.
    pub fn open_report(&self, player_id: String, report_id: String) -> js_sys::Promise {
        let state = Rc::clone(&self.state);
        let config = Rc::clone(&self.config);
        future_to_promise(async move {
            let token = {
                let mut s = state.borrow_mut();
                s.report_request = s.report_request.next();
                s.report_request
            };
            let report = ReportRef::new(player_id, report_id);
            let paths = ReportPaths::new(&config.base_url, &report);

            let summary = dom::fetch_json::<ReportSummary>(&paths.summary_url()).await;
            let series = dom::fetch_json::<ReportSeries>(&paths.series_url()).await;

            let (default_overlay, primary_url, primary) = {
                let mut guard = state.borrow_mut();
                let s = &mut *guard;
                if s.report_request != token {
                    debug!("report load {} superseded by {}", token, s.report_request);
                    return Ok(JsValue::FALSE);
                }

                let summary = summary.unwrap_or_else(|err| {
                    error!("{}", err);
                    s.notify(err.to_string());
                    ReportSummary::default()
                });
                let series = series.unwrap_or_else(|err| {
                    error!("{}", err);
                    s.notify(err.to_string());
                    ReportSeries::default()
                });

                let mut session = ViewerSession::open(&config.base_url, report, summary, series);
                let primary_url = session.primary_url().to_string();
                let default_overlay = match config.overlay.default_kind.as_deref() {
                    Some(key) => match session.select_overlay(key) {
                        Ok(url) => url.map(str::to_string),
                        Err(err) => {
                            warn!("default overlay skipped: {}", err);
                            None
                        }
                    },
                    None => None,
                };
                s.session = Some(session);
                s.keypoints.clear();
                s.keypoints_dirty = true;
                let sync = s.sync_mut()?;
                sync.open_primary(&primary_url);
                (default_overlay, primary_url, sync.primary().clone())
            };

            let timeout_ms = config.sync.metadata_timeout_ms;
            let failure = match dom::wait_for_metadata(&primary, timeout_ms).await {
                ReadyOutcome::Ready => None,
                ReadyOutcome::Failed(reason) => Some(reason),
                ReadyOutcome::TimedOut => Some("timed out waiting for metadata".to_string()),
            };
            if let Some(reason) = failure {
                state.borrow_mut().primary_failed(token, &primary_url, reason);
            }

            if let Some(url) = default_overlay {
                load_overlay(&state, Some(url), timeout_ms).await?;
            }
            Ok(JsValue::TRUE)
        })
    }

    /// Fetch the report index (`<base>/index.json`) and resolve its entries as JSON.
    /// A failed fetch queues a notice and resolves `"[]"`.
    pub fn load_index(&self) -> js_sys::Promise {
        let state = Rc::clone(&self.state);
        let url = index_url(&self.config.base_url);
        future_to_promise(async move {
            let result = dom::fetch_json::<Vec<ReportIndexEntry>>(&url).await;
            let json = state.borrow_mut().index_loaded(result)?;
            Ok(JsValue::from_str(&json))
        })
    }

    /// Select an overlay by key (`"skeleton"`, `"hand_trace"`, ...); empty for none.
    /// Resolves once the overlay is ready or has fallen back to absent.
    pub fn select_overlay(&self, key: String) -> js_sys::Promise {
        let state = Rc::clone(&self.state);
        let timeout_ms = self.config.sync.metadata_timeout_ms;
        future_to_promise(async move {
            let url = {
                let mut s = state.borrow_mut();
                let session = s
                    .session
                    .as_mut()
                    .ok_or_else(|| ViewerError::Js("no report is open".to_string()))?;
                session.select_overlay(&key)?.map(str::to_string)
            };
            load_overlay(&state, url, timeout_ms).await?;
            Ok(JsValue::UNDEFINED)
        })
    }

    /// Key of the overlay currently selected, if any.
    pub fn selected_overlay(&self) -> Option<String> {
        let s = self.state.borrow();
        s.session
            .as_ref()
            .and_then(ViewerSession::selected_overlay)
            .map(|kind| kind.key().to_string())
    }

    /// Seek both videos to `seconds`. Returns the applied position.
    pub fn seek(&self, seconds: f64) -> Result<f64, JsValue> {
        let mut s = self.state.borrow_mut();
        let applied = s.sync_mut()?.seek(MediaTime::from_secs(seconds));
        s.keypoints_dirty = true;
        Ok(applied.as_secs())
    }

    /// Seek from a range input with the default 0..=1000 scale.
    pub fn seek_to_value(&self, value: u32) -> Result<Option<f64>, JsValue> {
        let duration = {
            let mut s = self.state.borrow_mut();
            s.sync_mut()?.primary().duration()
        };
        match SeekBar::default().position_for(value, duration) {
            Some(position) => self.seek(position.as_secs()).map(Some),
            None => Ok(None),
        }
    }

    /// Seek to a 1-based frame (e.g. a chart click) and wait for the seek to settle.
    /// Resolves `true` if it settled, `false` if the wait timed out; sync proceeds either way.
    pub fn seek_to_frame(&self, frame: u32) -> js_sys::Promise {
        let state = Rc::clone(&self.state);
        let timeout_ms = self.config.sync.seek_settle_timeout_ms;
        future_to_promise(async move {
            let primary = {
                let mut s = state.borrow_mut();
                let time = s.clock().time_of_frame(FrameIndex::new(frame));
                let sync = s.sync_mut()?;
                sync.seek(time);
                sync.primary().clone()
            };

            let outcome = dom::wait_for_seek_settle(&primary, timeout_ms).await;
            if outcome == SettleOutcome::TimedOut {
                warn!("seek to frame {} did not settle; syncing anyway", frame);
            }

            with_state(&state, |s| {
                if let Some(sync) = s.sync.as_mut() {
                    sync.tick();
                }
                s.keypoints_dirty = true;
            });
            Ok(JsValue::from_bool(outcome == SettleOutcome::Settled))
        })
    }

    pub fn set_playback_rate(&self, rate: f64) -> Result<(), JsValue> {
        let mut s = self.state.borrow_mut();
        s.sync_mut()?.set_playback_rate(PlaybackRate::new(rate));
        Ok(())
    }

    /// Overlay opacity from a 0-100 slider.
    pub fn set_overlay_opacity(&self, percent: f64) -> Result<(), JsValue> {
        let mut s = self.state.borrow_mut();
        s.sync_mut()?
            .overlay()
            .set_opacity(OpacityPercent::new(percent));
        Ok(())
    }

    pub fn set_overlay_blend(&self, mode: &str) -> Result<(), JsValue> {
        let mut s = self.state.borrow_mut();
        s.sync_mut()?.overlay().set_blend_mode(BlendMode::from_css(mode));
        Ok(())
    }

    /// Hand over keypoints (`[{x, y, score?}]` in video pixels). Drawn on the next tick.
    pub fn set_keypoints(&self, keypoints_json: &str) -> Result<(), JsValue> {
        let keypoints: Vec<Keypoint> =
            serde_json::from_str(keypoints_json).map_err(ViewerError::from)?;
        let mut s = self.state.borrow_mut();
        s.keypoints = keypoints;
        s.keypoints_dirty = true;
        Ok(())
    }

    /// Re-run layer geometry, for layout changes the viewer cannot observe.
    pub fn sync_geometry(&self) {
        self.state.borrow_mut().sync_geometry();
    }

    /// Current primary position in seconds (0 when detached).
    pub fn position(&self) -> f64 {
        let s = self.state.borrow();
        s.sync
            .as_ref()
            .map_or(0.0, |sync| sync.position().as_secs())
    }

    /// Frame under the playback cursor, for chart highlighting.
    pub fn cursor_frame(&self) -> u32 {
        let s = self.state.borrow();
        let position = s.sync.as_ref().map(|sync| sync.position()).unwrap_or_default();
        s.clock().frame_at(position).as_u32()
    }

    /// Range-input value (0..=1000) for the current position.
    pub fn seek_value(&self) -> u32 {
        let s = self.state.borrow();
        s.sync.as_ref().map_or(0, |sync| {
            SeekBar::default().value_for(sync.position(), sync.primary().duration())
        })
    }

    pub fn time_label(&self) -> String {
        let s = self.state.borrow();
        s.sync.as_ref().map_or_else(String::new, |sync| {
            timeline::time_label(sync.position(), sync.primary().duration())
        })
    }

    /// JSON array for one metric (nulls for gaps), or `null` when there is nothing to chart.
    pub fn series(&self, name: &str) -> Result<String, JsValue> {
        let s = self.state.borrow();
        let values = s.session.as_ref().and_then(|session| session.series().series(name));
        Ok(serde_json::to_string(&values).map_err(ViewerError::from)?)
    }

    /// JSON list of `{kind, label, url}` for the open report.
    pub fn overlay_options(&self) -> Result<String, JsValue> {
        let s = self.state.borrow();
        let options = s.session.as_ref().map(ViewerSession::overlays).unwrap_or(&[]);
        Ok(serde_json::to_string(options).map_err(ViewerError::from)?)
    }

    /// Oldest pending user-facing notice, if any.
    pub fn last_notice(&self) -> Option<String> {
        let mut s = self.state.borrow_mut();
        if s.notices.is_empty() {
            None
        } else {
            Some(s.notices.remove(0))
        }
    }

    /// `"video_frame"` or `"time_update"`; empty while detached.
    pub fn tick_source(&self) -> String {
        match self.attachment.as_ref().map(|a| a.ticks.source()) {
            Some(TickSource::VideoFrame) => "video_frame".to_string(),
            Some(TickSource::TimeUpdate) => "time_update".to_string(),
            None => String::new(),
        }
    }

    /// Diagnostic counters as JSON.
    pub fn sync_stats(&self) -> Result<String, JsValue> {
        let s = self.state.borrow();
        let stats = s.sync.as_ref().map(SyncController::stats).unwrap_or_default();
        Ok(serde_json::to_string(&stats).map_err(ViewerError::from)?)
    }
}

impl Viewer {
    fn listen(
        &self,
        target: &EventTarget,
        event: &'static str,
        f: impl Fn(&mut ViewerState) + 'static,
    ) -> Result<Listener, ViewerError> {
        let state = Rc::clone(&self.state);
        Listener::add(target, event, move |_event| with_state(&state, &f))
    }
}

impl Drop for Viewer {
    fn drop(&mut self) {
        self.detach();
    }
}

/// Swap the overlay source and wait for its metadata.
/// A completion that lost a race with a newer switch is dropped.
async fn load_overlay(
    state: &SharedState,
    url: Option<String>,
    timeout_ms: u32,
) -> Result<(), ViewerError> {
    let (token, overlay) = {
        let mut s = state.borrow_mut();
        let sync = s.sync_mut()?;
        match sync.select_overlay(url.as_deref()) {
            Some(token) => (token, sync.overlay().clone()),
            None => return Ok(()),
        }
    };

    let outcome = dom::wait_for_metadata(&overlay, timeout_ms).await;

    let mut s = state.borrow_mut();
    let Some(sync) = s.sync.as_mut() else {
        debug!("viewer detached while overlay {} was loading", token);
        return Ok(());
    };
    let result = match outcome {
        ReadyOutcome::Ready => sync.overlay_ready(token).map(|_| None),
        ReadyOutcome::Failed(reason) => sync.overlay_failed(token, &reason).map(Some),
        ReadyOutcome::TimedOut => sync
            .overlay_failed(token, "timed out waiting for metadata")
            .map(Some),
    };
    match result {
        Ok(Some(notice)) => {
            s.overlay_dropped(notice);
            Ok(())
        }
        Ok(None) => Ok(()),
        Err(err) if err.is_stale() => Ok(()),
        Err(err) => Err(err),
    }
}
