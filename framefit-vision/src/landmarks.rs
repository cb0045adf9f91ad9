//! Face-mesh landmark layout.
//!
//! Landmarks follow the 468-point face-mesh topology. Models with refined iris
//! output append 10 points (478 total); the first 468 indices keep their meaning.
//! Coordinates are normalized to the frame: x and y in [0, 1], z relative depth.

use crate::error::{Result, VisionError};
use crate::video::VideoFrame;

/// Produces zero or one landmark set per frame. `Ok(None)` means no face
/// this frame, which is routine; `Err` means the source itself failed.
pub trait LandmarkSource {
    fn detect(&mut self, frame: &VideoFrame) -> anyhow::Result<Option<LandmarkSet>>;
}

/// Points in the base face-mesh layout
pub const FACE_MESH_POINTS: usize = 468;
/// Points when the model also emits refined iris landmarks
pub const FACE_MESH_POINTS_WITH_IRIS: usize = 478;

/// Nose bridge point between the eyes
pub const BETWEEN_EYES: usize = 168;
/// Outer corner of the eye on the image-left side
pub const LEFT_EYE_OUTER: usize = 143;
/// Outer corner of the eye on the image-right side
pub const RIGHT_EYE_OUTER: usize = 372;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LandmarkPoint {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl LandmarkPoint {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y, z: 0.0 }
    }
}

/// Landmarks detected for a single face in a single frame
#[derive(Debug, Clone, PartialEq)]
pub struct LandmarkSet {
    points: Vec<LandmarkPoint>,
}

impl LandmarkSet {
    pub fn new(points: Vec<LandmarkPoint>) -> Result<Self> {
        match points.len() {
            FACE_MESH_POINTS | FACE_MESH_POINTS_WITH_IRIS => Ok(Self { points }),
            got => Err(VisionError::InvalidLandmarks {
                expected: FACE_MESH_POINTS,
                got,
            }),
        }
    }

    /// Build a set from flat `[x0, y0, z0, x1, y1, z1, ...]` values
    pub fn from_xyz(values: &[f32]) -> Result<Self> {
        if values.len() % 3 != 0 {
            return Err(VisionError::InvalidLandmarks {
                expected: FACE_MESH_POINTS * 3,
                got: values.len(),
            });
        }
        let points = values
            .chunks_exact(3)
            .map(|c| LandmarkPoint {
                x: c[0],
                y: c[1],
                z: c[2],
            })
            .collect();
        Self::new(points)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn between_eyes(&self) -> LandmarkPoint {
        self.points[BETWEEN_EYES]
    }

    pub fn left_eye_outer(&self) -> LandmarkPoint {
        self.points[LEFT_EYE_OUTER]
    }

    pub fn right_eye_outer(&self) -> LandmarkPoint {
        self.points[RIGHT_EYE_OUTER]
    }

    /// Axis-aligned bounds `(min_x, min_y, max_x, max_y)` in normalized space
    pub fn bounds(&self) -> (f32, f32, f32, f32) {
        self.points.iter().fold(
            (f32::MAX, f32::MAX, f32::MIN, f32::MIN),
            |(x0, y0, x1, y1), p| (x0.min(p.x), y0.min(p.y), x1.max(p.x), y1.max(p.y)),
        )
    }

    /// Full-length set built from the three anchor points only; every other
    /// index repeats `between_eyes`. Recorded traces carry just these three.
    pub fn from_anchors(
        between_eyes: LandmarkPoint,
        left_eye: LandmarkPoint,
        right_eye: LandmarkPoint,
    ) -> Self {
        let mut points = vec![between_eyes; FACE_MESH_POINTS];
        points[LEFT_EYE_OUTER] = left_eye;
        points[RIGHT_EYE_OUTER] = right_eye;
        Self { points }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_wrong_length() {
        let err = LandmarkSet::new(vec![LandmarkPoint::default(); 10]).unwrap_err();
        assert!(matches!(
            err,
            VisionError::InvalidLandmarks { expected: 468, got: 10 }
        ));
    }

    #[test]
    fn test_accepts_iris_layout() {
        let set = LandmarkSet::new(vec![LandmarkPoint::default(); 478]).unwrap();
        assert_eq!(set.len(), 478);
    }

    #[test]
    fn test_from_xyz() {
        let mut flat = vec![0.0f32; FACE_MESH_POINTS * 3];
        flat[BETWEEN_EYES * 3] = 0.5;
        flat[BETWEEN_EYES * 3 + 1] = 0.25;
        let set = LandmarkSet::from_xyz(&flat).unwrap();
        assert_eq!(set.between_eyes(), LandmarkPoint::new(0.5, 0.25));

        assert!(LandmarkSet::from_xyz(&flat[..10]).is_err());
    }

    #[test]
    fn test_anchor_indices() {
        let set = LandmarkSet::from_anchors(
            LandmarkPoint::new(0.5, 0.5),
            LandmarkPoint::new(0.4, 0.5),
            LandmarkPoint::new(0.6, 0.5),
        );
        assert_eq!(set.left_eye_outer().x, 0.4);
        assert_eq!(set.right_eye_outer().x, 0.6);
        assert_eq!(set.bounds(), (0.4, 0.5, 0.6, 0.5));
    }
}
