// swing_viewer_core: Rust/WASM core of the swing-report video viewer.
// Keeps an overlay video and a keypoint canvas locked to the primary video. JS supplies elements and UI.

mod dom;
mod error;
mod geometry;
mod media;
mod report;
mod session;
mod sync;
mod ticks;
mod timeline;
mod types;
mod viewer;

use wasm_bindgen::prelude::*;

pub use dom::{
    device_pixel_ratio, fetch_json, wait_for_metadata, wait_for_seek_settle, CanvasSurface,
    WebVideo,
};
pub use error::ViewerError;
pub use geometry::{backing_size, draw_keypoints, sync_layers, GeometryChange, VideoScale};
pub use media::{DrawingSurface, LayerElement, MediaElement, ReadyOutcome, SettleOutcome};
pub use report::*;
pub use session::{OverlayOption, ViewerSession};
pub use sync::{OverlayNotice, OverlayState, PlayCommand, SyncActions, SyncController, SyncStats};
pub use ticks::{choose_tick_source, supports_frame_callback, TickLoop};
pub use timeline::{time_label, FrameClock, SeekBar, DEFAULT_FPS};
pub use types::*;
pub use viewer::Viewer;

/// Install the panic hook and console logger.
#[wasm_bindgen(start)]
pub fn init() {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();

    let level = if cfg!(debug_assertions) {
        log::Level::Debug
    } else {
        log::Level::Info
    };
    wasm_logger::init(wasm_logger::Config::new(level));
}
