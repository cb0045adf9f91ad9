//! Recorded landmark traces (JSON) for offline rendering.
//!
//! Accepted shapes:
//! - `null`: no face in the frame
//! - `[[x, y, z], ...]` or `[[x, y], ...]`: a full face-mesh point list
//! - `{"between_eyes": [x, y], "left_eye": [x, y], "right_eye": [x, y]}`

use anyhow::{Context, Result};
use framefit_vision::{LandmarkPoint, LandmarkSet};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Trace {
    Xyz(Vec<[f32; 3]>),
    Xy(Vec<[f32; 2]>),
    Anchors {
        between_eyes: [f32; 2],
        left_eye: [f32; 2],
        right_eye: [f32; 2],
    },
}

pub fn parse_trace(raw: &str) -> Result<Option<LandmarkSet>> {
    let trace: Option<Trace> = serde_json::from_str(raw).context("parsing landmark trace")?;
    let Some(trace) = trace else {
        return Ok(None);
    };
    let set = match trace {
        Trace::Xyz(points) => LandmarkSet::new(
            points
                .into_iter()
                .map(|[x, y, z]| LandmarkPoint { x, y, z })
                .collect(),
        )?,
        Trace::Xy(points) => LandmarkSet::new(
            points
                .into_iter()
                .map(|[x, y]| LandmarkPoint::new(x, y))
                .collect(),
        )?,
        Trace::Anchors {
            between_eyes,
            left_eye,
            right_eye,
        } => LandmarkSet::from_anchors(
            LandmarkPoint::new(between_eyes[0], between_eyes[1]),
            LandmarkPoint::new(left_eye[0], left_eye[1]),
            LandmarkPoint::new(right_eye[0], right_eye[1]),
        ),
    };
    Ok(Some(set))
}

pub fn load_trace(path: &Path) -> Result<Option<LandmarkSet>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading trace {}", path.display()))?;
    parse_trace(&raw).with_context(|| format!("in {}", path.display()))
}
