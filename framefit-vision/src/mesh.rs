//! Face-mesh landmark source backed by an ONNX model.
//!
//! The model takes a square RGB crop and returns 468 (or 478) points in crop
//! pixel units plus a single face-presence logit. Without a face from the
//! previous frame, the crop is the whole frame letterboxed to a square
//! (detection). Otherwise it is a square around the previous landmarks
//! (tracking), which is tighter and gated by the tracking threshold.

use std::borrow::Cow;
use std::path::Path;

use anyhow::Result;
use image::{imageops, DynamicImage, RgbImage};
use ndarray::Array4;
use ort::{session::Session, value::Value};

use crate::landmarks::{LandmarkPoint, LandmarkSet, LandmarkSource, FACE_MESH_POINTS};
use crate::video::VideoFrame;

/// Default square input edge of the face-mesh model
pub const MESH_INPUT_SIZE: u32 = 192;
/// Region of interest grows by this factor around the previous face
pub const ROI_EXPANSION: f32 = 1.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TensorLayout {
    Nchw,
    Nhwc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputRange {
    ZeroOne,
    MinusOneOne,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeshOptions {
    pub input_size: u32,
    pub layout: TensorLayout,
    pub range: InputRange,
    pub min_detection_confidence: f32,
    pub min_tracking_confidence: f32,
    pub max_faces: usize,
}

impl Default for MeshOptions {
    fn default() -> Self {
        Self {
            input_size: MESH_INPUT_SIZE,
            layout: TensorLayout::Nhwc,
            range: InputRange::ZeroOne,
            min_detection_confidence: 0.5,
            min_tracking_confidence: 0.5,
            max_faces: 1,
        }
    }
}

impl MeshOptions {
    pub fn validate(&self) -> Result<()> {
        for (name, v) in [
            ("min_detection_confidence", self.min_detection_confidence),
            ("min_tracking_confidence", self.min_tracking_confidence),
        ] {
            if !(0.0..=1.0).contains(&v) {
                anyhow::bail!("{} must be within [0, 1], got {}", name, v);
            }
        }
        if self.max_faces != 1 {
            anyhow::bail!("only a single tracked face is supported (max_faces = {})", self.max_faces);
        }
        if self.input_size == 0 {
            anyhow::bail!("input_size must be positive");
        }
        Ok(())
    }
}

/// Square crop window in frame pixels; may extend past the frame edges
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Roi {
    pub x: f32,
    pub y: f32,
    pub size: f32,
}

impl Roi {
    /// Whole frame, centered in a square of its longer side
    pub fn letterbox(width: u32, height: u32) -> Self {
        let size = width.max(height) as f32;
        Self {
            x: (width as f32 - size) / 2.0,
            y: (height as f32 - size) / 2.0,
            size,
        }
    }

    /// Square around the landmarks' bounds, grown by `expand`. The side never
    /// exceeds twice the frame's longer edge.
    pub fn around(landmarks: &LandmarkSet, width: u32, height: u32, expand: f32) -> Self {
        let (x0, y0, x1, y1) = landmarks.bounds();
        let (w, h) = (width as f32, height as f32);
        let cx = (x0 + x1) / 2.0 * w;
        let cy = (y0 + y1) / 2.0 * h;
        let size = (((x1 - x0) * w).max((y1 - y0) * h).max(1.0) * expand).min(2.0 * w.max(h));
        Self {
            x: cx - size / 2.0,
            y: cy - size / 2.0,
            size,
        }
    }

    /// Map a point in model-input pixels back to normalized frame coordinates
    pub fn to_frame(&self, px: f32, py: f32, input_size: u32, width: u32, height: u32) -> (f32, f32) {
        let scale = self.size / input_size as f32;
        (
            (self.x + px * scale) / width as f32,
            (self.y + py * scale) / height as f32,
        )
    }
}

pub struct FaceMesh {
    session: Session,
    options: MeshOptions,
    roi: Option<Roi>,
}

impl FaceMesh {
    pub fn open(model: &Path, options: MeshOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self {
            session: crate::model::mesh_session(model)?,
            options,
            roi: None,
        })
    }

    fn infer(&mut self, input: Array4<f32>) -> Result<(Vec<f32>, f32)> {
        let input_tensor = Value::from_array(input)?;
        let outputs = self.session.run(ort::inputs![input_tensor])?;

        let mut points = None;
        let mut logit = None;
        for (_name, output) in outputs.iter() {
            let (_shape, data) = output.try_extract_tensor::<f32>()?;
            if data.len() == 1 {
                logit = Some(data[0]);
            } else if data.len() >= FACE_MESH_POINTS * 3 && data.len() % 3 == 0 {
                points = Some(data.to_vec());
            }
        }
        match (points, logit) {
            (Some(p), Some(l)) => Ok((p, l)),
            _ => Err(crate::error::VisionError::Model(
                "expected landmark and face-flag outputs".into(),
            )
            .into()),
        }
    }
}

impl LandmarkSource for FaceMesh {
    fn detect(&mut self, frame: &VideoFrame) -> Result<Option<LandmarkSet>> {
        let (width, height) = (frame.width(), frame.height());
        let (roi, threshold) = match self.roi {
            Some(roi) => (roi, self.options.min_tracking_confidence),
            None => (
                Roi::letterbox(width, height),
                self.options.min_detection_confidence,
            ),
        };

        let crop = crop_square(frame, &roi, self.options.input_size);
        let input = to_tensor(&crop, self.options.layout, self.options.range);
        let (raw, logit) = self.infer(input)?;

        let score = sigmoid(logit);
        if score < threshold {
            log::debug!(
                "face score {:.3} below {:.2} ({})",
                score,
                threshold,
                if self.roi.is_some() { "tracking" } else { "detection" }
            );
            self.roi = None;
            return Ok(None);
        }

        let size = self.options.input_size;
        let points = raw
            .chunks_exact(3)
            .map(|c| {
                let (x, y) = roi.to_frame(c[0], c[1], size, width, height);
                LandmarkPoint {
                    x,
                    y,
                    z: c[2] / size as f32,
                }
            })
            .collect();
        let landmarks = LandmarkSet::new(points)?;
        self.roi = Some(Roi::around(&landmarks, width, height, ROI_EXPANSION));
        Ok(Some(landmarks))
    }
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Cut `roi` out of the frame (black outside the frame) and scale it to the
/// model input size
pub fn crop_square(frame: &VideoFrame, roi: &Roi, input_size: u32) -> RgbImage {
    let rgb: Cow<RgbImage> = match frame.as_rgb8() {
        Some(img) => Cow::Borrowed(img),
        None => Cow::Owned(frame.to_rgb8()),
    };
    let side = roi.size.round().max(1.0) as u32;
    let mut canvas = RgbImage::new(side, side);
    imageops::overlay(
        &mut canvas,
        &*rgb,
        -(roi.x.round() as i64),
        -(roi.y.round() as i64),
    );
    if side == input_size {
        return canvas;
    }
    DynamicImage::ImageRgb8(canvas)
        .resize_exact(input_size, input_size, imageops::FilterType::Triangle)
        .to_rgb8()
}

fn to_tensor(img: &RgbImage, layout: TensorLayout, range: InputRange) -> Array4<f32> {
    let (w, h) = (img.width() as usize, img.height() as usize);
    let norm = |v: u8| match range {
        InputRange::ZeroOne => v as f32 / 255.0,
        InputRange::MinusOneOne => v as f32 / 127.5 - 1.0,
    };
    match layout {
        TensorLayout::Nhwc => Array4::from_shape_fn((1, h, w, 3), |(_, y, x, c)| {
            norm(img.get_pixel(x as u32, y as u32)[c])
        }),
        TensorLayout::Nchw => Array4::from_shape_fn((1, 3, h, w), |(_, c, y, x)| {
            norm(img.get_pixel(x as u32, y as u32)[c])
        }),
    }
}
