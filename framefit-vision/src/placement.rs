//! Overlay placement: landmarks → center, size and rotation on the surface.

use crate::landmarks::LandmarkSet;
use crate::motion::MotionPhase;
use crate::overlay::OverlayAsset;

/// Tuning constants for placement
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlacementConfig {
    /// Pixels the anchor is pushed down so the frame sits on the eyes, not the brows
    pub anchor_offset_px: f32,
    /// Multiplier on the measured eye-corner span (> 1)
    pub width_margin: f32,
    /// Ticks per radian of idle motion; larger is slower
    pub motion_speed: f32,
    /// Peak idle offset in pixels, clamped to 1% of surface height
    pub motion_amplitude: f32,
}

impl Default for PlacementConfig {
    fn default() -> Self {
        Self {
            anchor_offset_px: 12.0,
            width_margin: 1.05,
            motion_speed: 100.0,
            motion_amplitude: 0.2,
        }
    }
}

/// Where and how to draw the overlay for one frame, in surface pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlacementTransform {
    pub center_x: f32,
    pub center_y: f32,
    /// Degrees in (-90, 90]
    pub angle_deg: f32,
    pub width: f32,
    pub height: f32,
}

/// Fold any angle in degrees into (-90, 90].
///
/// Angles that differ by 180° give the same output, so an overlay never
/// renders upside down: 95° becomes -85°, 180° becomes 0°.
pub fn normalize_angle(deg: f32) -> f32 {
    let r = deg.rem_euclid(180.0);
    if r > 90.0 {
        r - 180.0
    } else {
        r
    }
}

/// Signed shortest difference `to - from` on the 180° orientation circle,
/// in (-90, 90]
pub fn orientation_delta(from: f32, to: f32) -> f32 {
    normalize_angle(to - from)
}

/// Rotation of the eye-corner vector in degrees, normalized
pub fn eye_angle(landmarks: &LandmarkSet) -> f32 {
    let left = landmarks.left_eye_outer();
    let right = landmarks.right_eye_outer();
    let dy = (right.y - left.y) as f64;
    let dx = (right.x - left.x) as f64;
    normalize_angle(dy.atan2(dx).to_degrees() as f32)
}

/// Compute the overlay transform for one frame.
///
/// Returns `None` when there is no face, no loaded asset, or a degenerate
/// surface or asset. The motion phase advances by one tick on every call.
pub fn compute_placement(
    landmarks: Option<&LandmarkSet>,
    asset: Option<&OverlayAsset>,
    surface: (u32, u32),
    phase: &mut MotionPhase,
    cfg: &PlacementConfig,
) -> Option<PlacementTransform> {
    let bob = phase.offset(cfg.motion_amplitude.min(surface.1 as f32 * 0.01));
    phase.advance(cfg.motion_speed);

    let landmarks = landmarks?;
    let aspect = asset?.aspect_ratio()?;
    if surface.0 == 0 || surface.1 == 0 {
        return None;
    }
    let (w, h) = (surface.0 as f32, surface.1 as f32);

    let anchor = landmarks.between_eyes();
    let left = landmarks.left_eye_outer();
    let right = landmarks.right_eye_outer();

    let eye_span = (right.x - left.x).abs() * w;
    let width = eye_span * cfg.width_margin;

    let placement = PlacementTransform {
        center_x: anchor.x * w,
        center_y: anchor.y * h + cfg.anchor_offset_px + bob,
        angle_deg: eye_angle(landmarks),
        width,
        height: width / aspect,
    };
    log::trace!("placement: {:?}", placement);
    Some(placement)
}

/// Exponential smoothing of consecutive transforms.
///
/// Rotation is blended along the shorter way round the 180° circle so the
/// ±90° wrap never produces a half-turn sweep.
#[derive(Debug, Clone)]
pub struct PlacementSmoother {
    alpha: f32,
    last: Option<PlacementTransform>,
}

impl PlacementSmoother {
    /// `alpha` in (0, 1]; 1 disables smoothing. Out-of-range values are clamped.
    pub fn new(alpha: f32) -> Self {
        let alpha = if alpha.is_finite() {
            alpha.clamp(f32::EPSILON, 1.0)
        } else {
            1.0
        };
        Self { alpha, last: None }
    }

    pub fn apply(&mut self, current: Option<PlacementTransform>) -> Option<PlacementTransform> {
        let Some(cur) = current else {
            self.reset();
            return None;
        };
        let blended = match self.last {
            Some(prev) => {
                let a = self.alpha;
                let lerp = |p: f32, c: f32| a * c + (1.0 - a) * p;
                PlacementTransform {
                    center_x: lerp(prev.center_x, cur.center_x),
                    center_y: lerp(prev.center_y, cur.center_y),
                    angle_deg: normalize_angle(
                        prev.angle_deg + a * orientation_delta(prev.angle_deg, cur.angle_deg),
                    ),
                    width: lerp(prev.width, cur.width),
                    height: lerp(prev.height, cur.height),
                }
            }
            None => cur,
        };
        self.last = Some(blended);
        Some(blended)
    }

    pub fn reset(&mut self) {
        self.last = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmarks::LandmarkPoint;
    use image::RgbaImage;
    use proptest::prelude::*;

    fn eyes(left: (f32, f32), right: (f32, f32)) -> LandmarkSet {
        LandmarkSet::from_anchors(
            LandmarkPoint::new(0.5, 0.5),
            LandmarkPoint::new(left.0, left.1),
            LandmarkPoint::new(right.0, right.1),
        )
    }

    fn asset(w: u32, h: u32) -> OverlayAsset {
        OverlayAsset::new(RgbaImage::new(w, h))
    }

    #[test]
    fn test_normalize_angle() {
        assert_eq!(normalize_angle(0.0), 0.0);
        assert_eq!(normalize_angle(90.0), 90.0);
        assert_eq!(normalize_angle(-90.0), 90.0);
        assert_eq!(normalize_angle(95.0), -85.0);
        assert_eq!(normalize_angle(180.0), 0.0);
        assert_eq!(normalize_angle(-180.0), 0.0);
        assert!((normalize_angle(-135.0) - 45.0).abs() < 1e-4);
    }

    #[test]
    fn test_wrap_is_continuous() {
        let a = normalize_angle(89.0);
        let b = normalize_angle(90.0);
        let c = normalize_angle(91.0);
        assert!(orientation_delta(a, b).abs() <= 1.0 + 1e-4);
        assert!(orientation_delta(b, c).abs() <= 1.0 + 1e-4);
        assert!(orientation_delta(a, c).abs() <= 2.0 + 1e-4);
    }

    #[test]
    fn test_vertical_eyes_is_ninety() {
        assert_eq!(eye_angle(&eyes((0.5, 0.4), (0.5, 0.6))), 90.0);
    }

    #[test]
    fn test_absent_inputs() {
        let cfg = PlacementConfig::default();
        let mut phase = MotionPhase::new();
        let lm = eyes((0.4, 0.5), (0.6, 0.5));
        let a = asset(200, 100);

        assert!(compute_placement(None, Some(&a), (1920, 1080), &mut phase, &cfg).is_none());
        assert!(compute_placement(Some(&lm), None, (1920, 1080), &mut phase, &cfg).is_none());
        assert!(
            compute_placement(Some(&lm), Some(&asset(0, 0)), (1920, 1080), &mut phase, &cfg)
                .is_none()
        );
        assert!(compute_placement(Some(&lm), Some(&a), (0, 0), &mut phase, &cfg).is_none());
        // every call ticks, placed or not
        let expected = MotionPhase::from_ticks(4, cfg.motion_speed);
        assert!((phase.radians() - expected.radians()).abs() < 1e-12);
    }

    #[test]
    fn test_motion_only_moves_center_y() {
        let cfg = PlacementConfig {
            motion_amplitude: 5.0,
            ..Default::default()
        };
        let lm = eyes((0.4, 0.45), (0.6, 0.55));
        let a = asset(300, 100);
        let mut phase = MotionPhase::new();
        let first = compute_placement(Some(&lm), Some(&a), (1920, 1080), &mut phase, &cfg).unwrap();
        for _ in 0..150 {
            phase.advance(cfg.motion_speed);
        }
        let later = compute_placement(Some(&lm), Some(&a), (1920, 1080), &mut phase, &cfg).unwrap();
        assert_eq!(first.center_x, later.center_x);
        assert_eq!(first.width, later.width);
        assert_eq!(first.angle_deg, later.angle_deg);
        assert_ne!(first.center_y, later.center_y);
        assert!((later.center_y - first.center_y).abs() <= 5.0 + 1e-3);
    }

    #[test]
    fn test_amplitude_clamped_to_surface() {
        let cfg = PlacementConfig {
            motion_amplitude: 1000.0,
            ..Default::default()
        };
        let lm = eyes((0.4, 0.5), (0.6, 0.5));
        let a = asset(200, 100);
        let mut phase = MotionPhase::from_ticks(157, cfg.motion_speed); // sin ≈ 1
        let t = compute_placement(Some(&lm), Some(&a), (640, 480), &mut phase, &cfg).unwrap();
        assert!(t.center_y - (240.0 + cfg.anchor_offset_px) <= 4.8 + 1e-3);
    }

    #[test]
    fn test_smoother_first_value_passes_through() {
        let mut s = PlacementSmoother::new(0.5);
        let t = PlacementTransform {
            center_x: 10.0,
            center_y: 20.0,
            angle_deg: 0.0,
            width: 100.0,
            height: 50.0,
        };
        assert_eq!(s.apply(Some(t)), Some(t));
        let next = s
            .apply(Some(PlacementTransform {
                center_x: 20.0,
                ..t
            }))
            .unwrap();
        assert_eq!(next.center_x, 15.0);
        assert!(s.apply(None).is_none());
        assert_eq!(s.apply(Some(t)), Some(t));
    }

    #[test]
    fn test_smoother_takes_short_way_across_wrap() {
        let mut s = PlacementSmoother::new(0.5);
        let base = PlacementTransform {
            center_x: 0.0,
            center_y: 0.0,
            angle_deg: 88.0,
            width: 1.0,
            height: 1.0,
        };
        s.apply(Some(base));
        let out = s
            .apply(Some(PlacementTransform {
                angle_deg: -88.0,
                ..base
            }))
            .unwrap();
        // midpoint of 88° and 92° (≡ -88°) is 90°, not 0°
        assert!((out.angle_deg - 90.0).abs() < 1e-3);
    }

    proptest! {
        #[test]
        fn rotation_always_in_half_open_range(
            lx in 0.0f32..1.0, ly in 0.0f32..1.0,
            rx in 0.0f32..1.0, ry in 0.0f32..1.0,
        ) {
            let angle = eye_angle(&eyes((lx, ly), (rx, ry)));
            prop_assert!(angle > -90.0 && angle <= 90.0);
        }

        #[test]
        fn aspect_ratio_preserved(
            aw in 1u32..2000, ah in 1u32..2000,
            sw in 1u32..4000, sh in 1u32..4000,
            span in 0.01f32..0.9,
        ) {
            let lm = eyes((0.05, 0.5), (0.05 + span, 0.5));
            let a = asset(aw, ah);
            let mut phase = MotionPhase::new();
            let t = compute_placement(Some(&lm), Some(&a), (sw, sh), &mut phase, &PlacementConfig::default()).unwrap();
            let expected = ah as f32 / aw as f32;
            prop_assert!((t.height / t.width - expected).abs() <= expected * 1e-4);
        }
    }
}
