// Browser tests for the DOM adapters. Run with `wasm-pack test --headless --chrome`.
#![cfg(target_arch = "wasm32")]

use std::cell::Cell;
use std::rc::Rc;

use swing_viewer_core::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::JsFuture;
use wasm_bindgen_test::*;
use web_sys::{CanvasRenderingContext2d, Event, HtmlCanvasElement, HtmlVideoElement};

wasm_bindgen_test_configure!(run_in_browser);

fn create<T: JsCast>(tag: &str) -> T {
    web_sys::window()
        .unwrap()
        .document()
        .unwrap()
        .create_element(tag)
        .unwrap()
        .dyn_into::<T>()
        .unwrap()
}

#[wasm_bindgen_test]
fn canvas_backing_follows_device_pixels() {
    let mut surface = CanvasSurface::new(create::<HtmlCanvasElement>("canvas")).unwrap();
    let change = sync_layers(
        CssSize::new(640.0, 360.0),
        DevicePixelRatio::new(2.0),
        None,
        &mut surface,
    );
    assert!(change.backing_resized);
    assert_eq!(surface.backing_size(), PixelSize::new(1280, 720));
    assert_eq!(surface.canvas().style().get_property_value("width").unwrap(), "640px");

    let again = sync_layers(
        CssSize::new(640.0, 360.0),
        DevicePixelRatio::new(2.0),
        None,
        &mut surface,
    );
    assert!(!again.backing_resized);
}

fn alpha_at(canvas: &HtmlCanvasElement, x: f64, y: f64) -> u8 {
    let context = canvas
        .get_context("2d")
        .unwrap()
        .unwrap()
        .dyn_into::<CanvasRenderingContext2d>()
        .unwrap();
    context.get_image_data(x, y, 1.0, 1.0).unwrap().data().0[3]
}

#[wasm_bindgen_test]
fn clear_covers_the_whole_buffer_below_unit_dpr() {
    let mut surface = CanvasSurface::new(create::<HtmlCanvasElement>("canvas")).unwrap();
    sync_layers(
        CssSize::new(800.0, 400.0),
        DevicePixelRatio::new(0.5),
        None,
        &mut surface,
    );
    assert_eq!(surface.backing_size(), PixelSize::new(400, 200));

    // Bottom-right corner in CSS pixels lands at (395, 195) in the buffer.
    surface.fill_circle(790.0, 390.0, 6.0, "red");
    assert_ne!(alpha_at(surface.canvas(), 395.0, 195.0), 0);

    surface.clear();
    assert_eq!(alpha_at(surface.canvas(), 395.0, 195.0), 0);

    // The scale transform survives the clear.
    surface.fill_circle(790.0, 390.0, 6.0, "red");
    assert_ne!(alpha_at(surface.canvas(), 395.0, 195.0), 0);
}

#[wasm_bindgen_test]
fn video_without_source_has_no_metadata() {
    let mut video = WebVideo::new(create::<HtmlVideoElement>("video"), "overlay");
    assert!(!video.has_metadata());
    assert_eq!(video.intrinsic_size(), None);
    assert_eq!(video.duration(), None);

    video.set_visible(false);
    assert_eq!(
        video.element().style().get_property_value("display").unwrap(),
        "none"
    );
    video.set_visible(true);
    assert_eq!(video.element().style().get_property_value("display").unwrap(), "");
}

#[wasm_bindgen_test]
async fn metadata_wait_is_bounded() {
    let video = WebVideo::new(create::<HtmlVideoElement>("video"), "overlay");
    assert_eq!(wait_for_metadata(&video, 50).await, ReadyOutcome::TimedOut);
}

#[wasm_bindgen_test]
async fn idle_video_is_already_settled() {
    let video = WebVideo::new(create::<HtmlVideoElement>("video"), "primary");
    assert_eq!(wait_for_seek_settle(&video, 50).await, SettleOutcome::Settled);
}

#[wasm_bindgen_test]
fn timeupdate_when_frame_callbacks_are_declined() {
    let video = create::<HtmlVideoElement>("video");
    assert_eq!(choose_tick_source(&video, false), TickSource::TimeUpdate);
}

#[wasm_bindgen_test]
fn time_update_ticks_until_stopped() {
    let video = create::<HtmlVideoElement>("video");
    let seen = Rc::new(Cell::new(0u32));
    let counter = Rc::clone(&seen);
    let ticks = TickLoop::new(video.clone(), TickSource::TimeUpdate, move |_time| {
        counter.set(counter.get() + 1);
    });
    let fire = || {
        video
            .dispatch_event(&Event::new("timeupdate").unwrap())
            .unwrap();
    };

    fire();
    assert_eq!(ticks.ticks(), 0);

    ticks.start();
    assert!(ticks.is_running());
    fire();
    fire();
    assert_eq!(ticks.ticks(), 2);
    assert_eq!(seen.get(), 2);

    ticks.stop();
    assert!(!ticks.is_running());
    fire();
    assert_eq!(ticks.ticks(), 2);

    ticks.start();
    fire();
    assert_eq!(ticks.ticks(), 3);

    drop(ticks);
    fire();
    assert_eq!(seen.get(), 3);
}

#[wasm_bindgen_test]
async fn missing_index_resolves_empty_with_a_notice() {
    let viewer = Viewer::new(r#"{"base_url":"no-such-reports"}"#).unwrap();
    let entries = JsFuture::from(viewer.load_index()).await.unwrap();
    assert_eq!(entries.as_string().as_deref(), Some("[]"));
    let notice = viewer.last_notice().unwrap();
    assert!(notice.contains("no-such-reports/index.json"));
}

#[wasm_bindgen_test]
async fn unloadable_overlay_leaves_nothing_selected() {
    let mut viewer = Viewer::new(
        r#"{"base_url":"no-such-reports","sync":{"metadata_timeout_ms":3000}}"#,
    )
    .unwrap();
    viewer
        .attach(
            create::<HtmlVideoElement>("video"),
            create::<HtmlVideoElement>("video"),
            create::<HtmlCanvasElement>("canvas"),
        )
        .unwrap();

    // Opens with defaults even though nothing can be fetched; the skeleton
    // overlay is preselected and then dropped when its asset fails.
    JsFuture::from(viewer.open_report("0001".to_string(), "r1".to_string()))
        .await
        .unwrap();
    assert_eq!(viewer.selected_overlay(), None);

    let mut notices = Vec::new();
    while let Some(notice) = viewer.last_notice() {
        notices.push(notice);
    }
    assert!(notices.iter().any(|n| n.contains("summary.json")));
    assert!(notices.iter().any(|n| n.contains("report_video.mp4")));
    assert!(notices.iter().any(|n| n.contains("skeleton.mp4")));
}

#[wasm_bindgen_test]
fn viewer_attaches_and_detaches() {
    let mut viewer = Viewer::new("{}").unwrap();
    viewer
        .attach(
            create::<HtmlVideoElement>("video"),
            create::<HtmlVideoElement>("video"),
            create::<HtmlCanvasElement>("canvas"),
        )
        .unwrap();
    assert!(viewer.is_attached());
    assert!(!viewer.tick_source().is_empty());
    assert_eq!(viewer.seek(-5.0).unwrap(), 0.0);

    viewer.detach();
    assert!(!viewer.is_attached());
    assert!(viewer.seek(1.0).is_err());
}
