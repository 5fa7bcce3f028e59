// Browser adapters: <video> and <canvas> behind the media/surface traits,
// readiness waits modeled as futures with a bounded timeout, and JSON fetch.
// Compiles on every target; only does useful work under wasm32.
// See DESIGN.md: Browser adapters

use log::{debug, warn};
use serde::de::DeserializeOwned;
use wasm_bindgen::closure::Closure;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::{spawn_local, JsFuture};
use web_sys::{
    CanvasRenderingContext2d, Event, EventTarget, HtmlCanvasElement, HtmlElement,
    HtmlMediaElement, HtmlVideoElement, Response, Window,
};

use crate::error::ViewerError;
use crate::media::*;
use crate::types::*;

const HAVE_METADATA: u16 = 1;

pub(crate) fn js_error(err: JsValue) -> ViewerError {
    let message = err
        .as_string()
        .or_else(|| {
            err.dyn_ref::<js_sys::Error>()
                .map(|e| String::from(e.message()))
        })
        .unwrap_or_else(|| format!("{:?}", err));
    ViewerError::Js(message)
}

pub(crate) fn window() -> Result<Window, ViewerError> {
    web_sys::window().ok_or_else(|| ViewerError::Js("no global window".to_string()))
}

/// Current device pixel ratio, 1 when unavailable.
pub fn device_pixel_ratio() -> DevicePixelRatio {
    DevicePixelRatio::new(web_sys::window().map_or(1.0, |w| w.device_pixel_ratio()))
}

fn set_css_size(element: &HtmlElement, size: CssSize) {
    let style = element.style();
    let result = style
        .set_property("width", &format!("{}px", size.width))
        .and_then(|_| style.set_property("height", &format!("{}px", size.height)));
    if let Err(err) = result {
        warn!("failed to size layer: {}", js_error(err));
    }
}

/// A `<video>` element driven through [`MediaElement`].
#[derive(Debug, Clone)]
pub struct WebVideo {
    element: HtmlVideoElement,
    name: &'static str,
}

impl WebVideo {
    pub fn new(element: HtmlVideoElement, name: &'static str) -> Self {
        WebVideo { element, name }
    }

    pub fn element(&self) -> &HtmlVideoElement {
        &self.element
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn has_metadata(&self) -> bool {
        self.element.ready_state() >= HAVE_METADATA
    }

    /// Reason for the element's current error, if any.
    pub fn error_reason(&self) -> String {
        media_error_reason(&self.element)
    }

    pub fn set_opacity(&self, opacity: OpacityPercent) {
        if let Err(err) = self
            .element
            .style()
            .set_property("opacity", &opacity.as_css().to_string())
        {
            warn!("{}: failed to set opacity: {}", self.name, js_error(err));
        }
    }

    pub fn set_blend_mode(&self, blend: BlendMode) {
        if let Err(err) = self
            .element
            .style()
            .set_property("mix-blend-mode", blend.as_css())
        {
            warn!("{}: failed to set blend mode: {}", self.name, js_error(err));
        }
    }
}

impl MediaElement for WebVideo {
    fn current_time(&self) -> MediaTime {
        MediaTime::from_secs(self.element.current_time())
    }

    fn set_current_time(&mut self, time: MediaTime) {
        self.element.set_current_time(time.as_secs());
    }

    fn is_paused(&self) -> bool {
        self.element.paused()
    }

    fn request_play(&mut self) {
        let name = self.name;
        match self.element.play() {
            Ok(promise) => spawn_local(async move {
                if let Err(err) = JsFuture::from(promise).await {
                    warn!("{}: play() rejected: {}", name, js_error(err));
                }
            }),
            Err(err) => warn!("{}: play() threw: {}", name, js_error(err)),
        }
    }

    fn pause(&mut self) {
        if let Err(err) = self.element.pause() {
            warn!("{}: pause() threw: {}", self.name, js_error(err));
        }
    }

    fn playback_rate(&self) -> PlaybackRate {
        PlaybackRate::new(self.element.playback_rate())
    }

    fn set_playback_rate(&mut self, rate: PlaybackRate) {
        self.element.set_playback_rate(rate.as_f64());
    }

    fn intrinsic_size(&self) -> Option<PixelSize> {
        let size = PixelSize::new(self.element.video_width(), self.element.video_height());
        if self.has_metadata() && !size.is_empty() {
            Some(size)
        } else {
            None
        }
    }

    fn duration(&self) -> Option<MediaTime> {
        let d = self.element.duration();
        if d.is_finite() && d > 0.0 {
            Some(MediaTime::from_secs(d))
        } else {
            None
        }
    }

    fn display_size(&self) -> CssSize {
        let rect = self.element.get_bounding_client_rect();
        CssSize::new(rect.width(), rect.height())
    }

    fn set_source(&mut self, src: Option<&str>) {
        match src {
            Some(src) => self.element.set_src(src),
            None => {
                if let Err(err) = self.element.remove_attribute("src") {
                    warn!("{}: failed to detach source: {}", self.name, js_error(err));
                }
                // Drop the old resource without firing a load for an empty URL.
                self.element.load();
            }
        }
    }

    fn set_visible(&mut self, visible: bool) {
        let value = if visible { "" } else { "none" };
        if let Err(err) = self.element.style().set_property("display", value) {
            warn!("{}: failed to toggle display: {}", self.name, js_error(err));
        }
    }
}

impl LayerElement for WebVideo {
    fn set_display_size(&mut self, size: CssSize) {
        set_css_size(&self.element, size);
    }
}

/// A `<canvas>` with its 2D context.
#[derive(Debug, Clone)]
pub struct CanvasSurface {
    canvas: HtmlCanvasElement,
    context: CanvasRenderingContext2d,
}

impl CanvasSurface {
    pub fn new(canvas: HtmlCanvasElement) -> Result<Self, ViewerError> {
        let context = canvas
            .get_context("2d")
            .map_err(js_error)?
            .ok_or_else(|| ViewerError::Js("canvas has no 2d context".to_string()))?
            .dyn_into::<CanvasRenderingContext2d>()
            .map_err(|_| ViewerError::Js("unexpected 2d context type".to_string()))?;
        Ok(CanvasSurface { canvas, context })
    }

    pub fn canvas(&self) -> &HtmlCanvasElement {
        &self.canvas
    }
}

impl LayerElement for CanvasSurface {
    fn set_display_size(&mut self, size: CssSize) {
        set_css_size(&self.canvas, size);
    }
}

impl DrawingSurface for CanvasSurface {
    fn backing_size(&self) -> PixelSize {
        PixelSize::new(self.canvas.width(), self.canvas.height())
    }

    fn set_backing_width(&mut self, width: u32) {
        self.canvas.set_width(width);
    }

    fn set_backing_height(&mut self, height: u32) {
        self.canvas.set_height(height);
    }

    fn set_scale_transform(&mut self, scale: f64) {
        if let Err(err) = self.context.set_transform(scale, 0.0, 0.0, scale, 0.0, 0.0) {
            warn!("failed to reset canvas transform: {}", js_error(err));
        }
    }

    fn clear(&mut self) {
        // Clear in backing pixels; the scale transform may be below 1.
        self.context.save();
        if let Err(err) = self.context.set_transform(1.0, 0.0, 0.0, 1.0, 0.0, 0.0) {
            warn!("failed to reset canvas transform: {}", js_error(err));
        }
        self.context.clear_rect(
            0.0,
            0.0,
            f64::from(self.canvas.width()),
            f64::from(self.canvas.height()),
        );
        self.context.restore();
    }

    fn fill_circle(&mut self, x: f64, y: f64, radius: f64, color: &str) {
        self.context.set_fill_style_str(color);
        self.context.begin_path();
        if self
            .context
            .arc(x, y, radius, 0.0, std::f64::consts::TAU)
            .is_ok()
        {
            self.context.fill();
        }
    }
}

fn media_error_reason(element: &HtmlMediaElement) -> String {
    match element.error() {
        Some(err) => {
            let kind = match err.code() {
                1 => "aborted",
                2 => "network error",
                3 => "decode error",
                4 => "source not supported",
                _ => "unknown error",
            };
            let message = err.message();
            if message.is_empty() {
                kind.to_string()
            } else {
                format!("{}: {}", kind, message)
            }
        }
        None => "unknown error".to_string(),
    }
}

const TAG_OK: &str = "ok";
const TAG_FAILED: &str = "failed";
const TAG_TIMEOUT: &str = "timeout";

/// Resolve with the tag of whichever listed event fires first, or `TAG_TIMEOUT`.
/// Listeners and the timer are removed before returning.
async fn race_events(
    target: &EventTarget,
    events: &[(&'static str, &'static str)],
    timeout_ms: u32,
) -> Result<&'static str, ViewerError> {
    let window = window()?;

    let mut resolve_slot: Option<js_sys::Function> = None;
    let promise = js_sys::Promise::new(&mut |resolve, _reject| {
        resolve_slot = Some(resolve);
    });
    let resolve =
        resolve_slot.ok_or_else(|| ViewerError::Js("promise executor did not run".to_string()))?;

    let mut listeners = Vec::with_capacity(events.len());
    for &(event, tag) in events {
        let resolve = resolve.clone();
        let listener = Closure::wrap(Box::new(move |_event: Event| {
            let _ = resolve.call1(&JsValue::NULL, &JsValue::from_str(tag));
        }) as Box<dyn FnMut(Event)>);
        target
            .add_event_listener_with_callback(event, listener.as_ref().unchecked_ref())
            .map_err(js_error)?;
        listeners.push((event, listener));
    }

    let on_timeout = Closure::wrap(Box::new(move || {
        let _ = resolve.call1(&JsValue::NULL, &JsValue::from_str(TAG_TIMEOUT));
    }) as Box<dyn FnMut()>);
    let timer = window
        .set_timeout_with_callback_and_timeout_and_arguments_0(
            on_timeout.as_ref().unchecked_ref(),
            i32::try_from(timeout_ms).unwrap_or(i32::MAX),
        )
        .map_err(js_error)?;

    let outcome = JsFuture::from(promise).await;

    window.clear_timeout_with_handle(timer);
    for (event, listener) in &listeners {
        let _ = target.remove_event_listener_with_callback(event, listener.as_ref().unchecked_ref());
    }

    let tag = outcome.map_err(js_error)?.as_string();
    Ok(match tag.as_deref() {
        Some(TAG_OK) => TAG_OK,
        Some(TAG_FAILED) => TAG_FAILED,
        _ => TAG_TIMEOUT,
    })
}

/// Wait until the element has metadata, fails to load, or the timeout passes.
pub async fn wait_for_metadata(video: &WebVideo, timeout_ms: u32) -> ReadyOutcome {
    if video.has_metadata() {
        return ReadyOutcome::Ready;
    }
    let events = [("loadedmetadata", TAG_OK), ("error", TAG_FAILED)];
    match race_events(video.element(), &events, timeout_ms).await {
        Ok(TAG_OK) => ReadyOutcome::Ready,
        Ok(TAG_FAILED) => ReadyOutcome::Failed(video.error_reason()),
        Ok(_) => ReadyOutcome::TimedOut,
        Err(err) => ReadyOutcome::Failed(err.to_string()),
    }
}

/// Wait for a pending seek to be acknowledged. Timing out is not an error.
pub async fn wait_for_seek_settle(video: &WebVideo, timeout_ms: u32) -> SettleOutcome {
    if !video.element().seeking() {
        return SettleOutcome::Settled;
    }
    match race_events(video.element(), &[("seeked", TAG_OK)], timeout_ms).await {
        Ok(TAG_OK) => SettleOutcome::Settled,
        Ok(_) => {
            debug!("{}: seek did not settle within {} ms", video.name(), timeout_ms);
            SettleOutcome::TimedOut
        }
        Err(err) => {
            debug!("{}: seek wait failed: {}", video.name(), err);
            SettleOutcome::TimedOut
        }
    }
}

/// GET a JSON resource and deserialize it.
pub async fn fetch_json<T: DeserializeOwned>(url: &str) -> Result<T, ViewerError> {
    let fetch_err = |message: String| ViewerError::Fetch {
        url: url.to_string(),
        message,
    };

    let response = JsFuture::from(window()?.fetch_with_str(url))
        .await
        .map_err(|e| fetch_err(js_error(e).to_string()))?;
    let response: Response = response
        .dyn_into()
        .map_err(|_| fetch_err("not a Response".to_string()))?;
    if !response.ok() {
        return Err(fetch_err(format!("HTTP {}", response.status())));
    }

    let text = JsFuture::from(response.text().map_err(|e| fetch_err(js_error(e).to_string()))?)
        .await
        .map_err(|e| fetch_err(js_error(e).to_string()))?
        .as_string()
        .ok_or_else(|| fetch_err("body is not text".to_string()))?;

    serde_json::from_str(&text).map_err(|e| fetch_err(e.to_string()))
}
