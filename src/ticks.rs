// Tick sources for the reconciliation pass.
// Preferred: one callback per presented frame of the primary (`requestVideoFrameCallback`).
// Fallback: the element's recurring `timeupdate` event.
// See DESIGN.md: Tick sources

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use log::{debug, warn};
use wasm_bindgen::closure::Closure;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{Event, HtmlVideoElement};

use crate::dom::js_error;
use crate::types::{MediaTime, TickSource};

// `requestVideoFrameCallback` is not in web-sys; bind it on a subtype view of the element.
#[wasm_bindgen]
extern "C" {
    #[wasm_bindgen(extends = HtmlVideoElement, js_name = "HTMLVideoElement")]
    type FrameCallbackVideo;

    #[wasm_bindgen(method, js_name = "requestVideoFrameCallback")]
    fn request_video_frame_callback(this: &FrameCallbackVideo, callback: &js_sys::Function) -> u32;

    #[wasm_bindgen(method, js_name = "cancelVideoFrameCallback")]
    fn cancel_video_frame_callback(this: &FrameCallbackVideo, handle: u32);
}

fn frame_video(video: &HtmlVideoElement) -> &FrameCallbackVideo {
    video.unchecked_ref::<FrameCallbackVideo>()
}

/// Whether the browser exposes per-frame video callbacks.
pub fn supports_frame_callback(video: &HtmlVideoElement) -> bool {
    js_sys::Reflect::has(video, &JsValue::from_str("requestVideoFrameCallback")).unwrap_or(false)
}

/// Pick the tick source for this browser and preference.
pub fn choose_tick_source(video: &HtmlVideoElement, prefer_frame_callback: bool) -> TickSource {
    if prefer_frame_callback && supports_frame_callback(video) {
        TickSource::VideoFrame
    } else {
        TickSource::TimeUpdate
    }
}

type FrameClosure = Closure<dyn FnMut(f64, JsValue)>;
type TimeUpdateClosure = Closure<dyn FnMut(Event)>;

/// A running tick source. Stops and releases its JS closure on drop.
pub struct TickLoop {
    inner: Rc<TickInner>,
}

struct TickInner {
    video: HtmlVideoElement,
    source: TickSource,
    /// Receives the presented media time on every tick.
    callback: RefCell<Box<dyn FnMut(MediaTime)>>,
    frame_closure: RefCell<Option<FrameClosure>>,
    time_update_closure: RefCell<Option<TimeUpdateClosure>>,
    running: Cell<bool>,
    handle: Cell<u32>,
    ticks: Cell<u64>,
}

impl TickLoop {
    /// Creates a loop that is not yet running.
    pub fn new(
        video: HtmlVideoElement,
        source: TickSource,
        callback: impl FnMut(MediaTime) + 'static,
    ) -> Self {
        TickLoop {
            inner: Rc::new(TickInner {
                video,
                source,
                callback: RefCell::new(Box::new(callback)),
                frame_closure: RefCell::new(None),
                time_update_closure: RefCell::new(None),
                running: Cell::new(false),
                handle: Cell::new(0),
                ticks: Cell::new(0),
            }),
        }
    }

    pub fn source(&self) -> TickSource {
        self.inner.source
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.get()
    }

    pub fn ticks(&self) -> u64 {
        self.inner.ticks.get()
    }

    /// Starts ticking. No-op if already running.
    pub fn start(&self) {
        if self.inner.running.get() {
            return;
        }
        self.inner.running.set(true);
        debug!("tick loop started ({:?})", self.inner.source);

        match self.inner.source {
            TickSource::VideoFrame => self.start_frame_callbacks(),
            TickSource::TimeUpdate => self.start_time_updates(),
        }
    }

    fn start_frame_callbacks(&self) {
        let inner = Rc::clone(&self.inner);
        let closure = Closure::wrap(Box::new(move |_now: f64, metadata: JsValue| {
            if !inner.running.get() {
                return;
            }
            let media_time = js_sys::Reflect::get(&metadata, &JsValue::from_str("mediaTime"))
                .ok()
                .and_then(|v| v.as_f64())
                .unwrap_or_else(|| inner.video.current_time());
            inner.tick(MediaTime::from_secs(media_time));

            // The callback is one-shot; re-arm for the next presented frame.
            if inner.running.get() {
                if let Some(ref closure) = *inner.frame_closure.borrow() {
                    let handle = frame_video(&inner.video)
                        .request_video_frame_callback(closure.as_ref().unchecked_ref());
                    inner.handle.set(handle);
                }
            }
        }) as Box<dyn FnMut(f64, JsValue)>);

        let handle = frame_video(&self.inner.video)
            .request_video_frame_callback(closure.as_ref().unchecked_ref());
        self.inner.handle.set(handle);
        *self.inner.frame_closure.borrow_mut() = Some(closure);
    }

    fn start_time_updates(&self) {
        let inner = Rc::clone(&self.inner);
        let closure = Closure::wrap(Box::new(move |_event: Event| {
            if inner.running.get() {
                inner.tick(MediaTime::from_secs(inner.video.current_time()));
            }
        }) as Box<dyn FnMut(Event)>);

        if let Err(err) = self
            .inner
            .video
            .add_event_listener_with_callback("timeupdate", closure.as_ref().unchecked_ref())
        {
            warn!("failed to listen for timeupdate: {}", js_error(err));
            self.inner.running.set(false);
            return;
        }
        *self.inner.time_update_closure.borrow_mut() = Some(closure);
    }

    /// Stops ticking. Can be restarted.
    pub fn stop(&self) {
        if !self.inner.running.get() {
            return;
        }
        self.inner.running.set(false);
        match self.inner.source {
            TickSource::VideoFrame => {
                frame_video(&self.inner.video).cancel_video_frame_callback(self.inner.handle.get());
            }
            TickSource::TimeUpdate => {
                if let Some(ref closure) = *self.inner.time_update_closure.borrow() {
                    let _ = self.inner.video.remove_event_listener_with_callback(
                        "timeupdate",
                        closure.as_ref().unchecked_ref(),
                    );
                }
            }
        }
        debug!("tick loop stopped after {} ticks", self.inner.ticks.get());
    }
}

impl TickInner {
    fn tick(&self, media_time: MediaTime) {
        self.ticks.set(self.ticks.get() + 1);
        // Scoped so the callback borrow never overlaps a closure borrow.
        self.callback.borrow_mut()(media_time);
    }
}

impl Drop for TickLoop {
    fn drop(&mut self) {
        self.stop();
        // Break the Rc cycle through the JS closures.
        self.inner.frame_closure.borrow_mut().take();
        self.inner.time_update_closure.borrow_mut().take();
    }
}

impl std::fmt::Debug for TickLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TickLoop")
            .field("source", &self.inner.source)
            .field("running", &self.inner.running.get())
            .field("ticks", &self.inner.ticks.get())
            .finish()
    }
}
