// Layer geometry: keep overlay video and drawing surface congruent with the primary video box.
// Rule: the backing buffer is only touched when its size actually changes.
// See DESIGN.md: Layer Geometry Synchronizer

use crate::media::{DrawingSurface, LayerElement};
use crate::types::*;

/// Backing resolution for a displayed size at a device pixel ratio.
/// Each axis is `round(display * dpr)`, never below 1.
pub fn backing_size(display: CssSize, dpr: DevicePixelRatio) -> PixelSize {
    PixelSize {
        width: backing_len(display.width, dpr.as_f64()),
        height: backing_len(display.height, dpr.as_f64()),
    }
}

fn backing_len(css: f64, dpr: f64) -> u32 {
    let px = (css * dpr).round();
    if px.is_finite() && px >= 1.0 {
        px.min(f64::from(u32::MAX)) as u32
    } else {
        1
    }
}

/// What a geometry pass changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GeometryChange {
    pub backing_resized: bool,
}

/// Size the overlay element and the surface to `display`, with the surface
/// backed at `dpr` and its transform reset so drawing uses CSS pixels.
pub fn sync_layers<S: DrawingSurface + ?Sized>(
    display: CssSize,
    dpr: DevicePixelRatio,
    overlay: Option<&mut dyn LayerElement>,
    surface: &mut S,
) -> GeometryChange {
    if let Some(overlay) = overlay {
        overlay.set_display_size(display);
    }
    surface.set_display_size(display);

    let target = backing_size(display, dpr);
    let current = surface.backing_size();
    let mut change = GeometryChange::default();

    if current.width != target.width {
        surface.set_backing_width(target.width);
        change.backing_resized = true;
    }
    if current.height != target.height {
        surface.set_backing_height(target.height);
        change.backing_resized = true;
    }

    surface.set_scale_transform(dpr.as_f64());
    change
}

/// Per-axis mapping from intrinsic video pixels to displayed CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoScale {
    pub sx: f64,
    pub sy: f64,
}

impl VideoScale {
    /// `displayed / intrinsic` per axis, 1 where the intrinsic size is zero or unknown.
    pub fn new(displayed: CssSize, intrinsic: Option<PixelSize>) -> Self {
        let intrinsic = intrinsic.unwrap_or_default();
        VideoScale {
            sx: axis_scale(displayed.width, intrinsic.width),
            sy: axis_scale(displayed.height, intrinsic.height),
        }
    }

    pub fn identity() -> Self {
        VideoScale { sx: 1.0, sy: 1.0 }
    }

    pub fn map(&self, x: f64, y: f64) -> (f64, f64) {
        (x * self.sx, y * self.sy)
    }
}

fn axis_scale(displayed: f64, intrinsic: u32) -> f64 {
    if intrinsic == 0 {
        1.0
    } else {
        displayed / f64::from(intrinsic)
    }
}

/// Clear the surface and draw keypoints as filled circles in CSS pixel space.
/// Returns the number of points drawn; non-finite points are skipped.
pub fn draw_keypoints<S: DrawingSurface + ?Sized>(
    surface: &mut S,
    scale: VideoScale,
    points: &[Keypoint],
    settings: &KeypointSettings,
) -> usize {
    surface.clear();
    let mut drawn = 0;
    for point in points {
        let (x, y) = scale.map(point.x, point.y);
        if !x.is_finite() || !y.is_finite() {
            continue;
        }
        surface.fill_circle(x, y, settings.radius, &settings.color);
        drawn += 1;
    }
    drawn
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::testing::{FakeMedia, FakeSurface};
    use proptest::prelude::*;

    #[test]
    fn end_to_end_hidpi_mapping() {
        let mut overlay = FakeMedia::new();
        let mut surface = FakeSurface::default();
        let display = CssSize::new(640.0, 360.0);

        let change = sync_layers(
            display,
            DevicePixelRatio::new(2.0),
            Some(&mut overlay),
            &mut surface,
        );

        assert!(change.backing_resized);
        assert_eq!(surface.backing, PixelSize::new(1280, 720));
        assert_eq!(surface.display, display);
        assert_eq!(overlay.display, display);
        assert_eq!(surface.scale, 2.0);

        let scale = VideoScale::new(display, Some(PixelSize::new(1280, 720)));
        assert_eq!(scale.map(640.0, 360.0), (320.0, 180.0));
    }

    #[test]
    fn zero_area_display_keeps_one_pixel() {
        let mut surface = FakeSurface::default();
        sync_layers(
            CssSize::new(0.0, 0.0),
            DevicePixelRatio::new(3.0),
            None,
            &mut surface,
        );
        assert_eq!(surface.backing, PixelSize::new(1, 1));
    }

    #[test]
    fn repeated_sync_does_not_reallocate() {
        let mut surface = FakeSurface::default();
        let display = CssSize::new(333.3, 187.5);
        let dpr = DevicePixelRatio::new(1.5);

        sync_layers(display, dpr, None, &mut surface);
        let after_first = surface.reallocations;
        let change = sync_layers(display, dpr, None, &mut surface);

        assert!(!change.backing_resized);
        assert_eq!(surface.reallocations, after_first);
    }

    #[test]
    fn only_changed_axis_is_written() {
        let mut surface = FakeSurface::default();
        let dpr = DevicePixelRatio::new(1.0);
        sync_layers(CssSize::new(100.0, 50.0), dpr, None, &mut surface);
        let before = surface.reallocations;

        sync_layers(CssSize::new(100.0, 80.0), dpr, None, &mut surface);
        assert_eq!(surface.reallocations, before + 1);
        assert_eq!(surface.backing, PixelSize::new(100, 80));
    }

    #[test]
    fn unknown_intrinsic_size_maps_one_to_one() {
        let scale = VideoScale::new(CssSize::new(640.0, 360.0), None);
        assert_eq!(scale, VideoScale::identity());
        let scale = VideoScale::new(CssSize::new(640.0, 360.0), Some(PixelSize::new(0, 720)));
        assert_eq!(scale.sx, 1.0);
        assert_eq!(scale.sy, 0.5);
    }

    #[test]
    fn keypoints_are_scaled_and_filtered() {
        let mut surface = FakeSurface::default();
        let scale = VideoScale { sx: 0.5, sy: 0.5 };
        let points = [
            Keypoint::new(100.0, 200.0),
            Keypoint::new(f64::NAN, 10.0),
            Keypoint::new(2.0, 4.0),
        ];

        let drawn = draw_keypoints(&mut surface, scale, &points, &KeypointSettings::default());

        assert_eq!(drawn, 2);
        assert_eq!(surface.clears, 1);
        assert_eq!(surface.circles[0], (50.0, 100.0, 3.0, "lime".to_string()));
        assert_eq!(surface.circles[1].0, 1.0);
    }

    mod property_tests {
        use super::*;

        proptest! {
            /// Backing resolution is the rounded product of display size and DPR, floored at 1.
            #[test]
            fn backing_is_rounded_product(
                w in 0.0f64..4000.0,
                h in 0.0f64..4000.0,
                dpr in 0.25f64..4.0,
            ) {
                let mut surface = FakeSurface::default();
                let display = CssSize::new(w, h);
                sync_layers(display, DevicePixelRatio::new(dpr), None, &mut surface);

                let expected_w = ((w * dpr).round() as u32).max(1);
                let expected_h = ((h * dpr).round() as u32).max(1);
                prop_assert_eq!(surface.backing, PixelSize::new(expected_w, expected_h));
                prop_assert_eq!(surface.scale, dpr);
            }

            /// A second pass with the same inputs never touches the backing buffer.
            #[test]
            fn geometry_sync_is_idempotent(
                w in 0.0f64..4000.0,
                h in 0.0f64..4000.0,
                dpr in 0.25f64..4.0,
            ) {
                let mut surface = FakeSurface::default();
                let display = CssSize::new(w, h);
                let dpr = DevicePixelRatio::new(dpr);
                sync_layers(display, dpr, None, &mut surface);
                let snapshot = (surface.backing, surface.reallocations);

                let change = sync_layers(display, dpr, None, &mut surface);
                prop_assert!(!change.backing_resized);
                prop_assert_eq!((surface.backing, surface.reallocations), snapshot);
            }
        }
    }
}
