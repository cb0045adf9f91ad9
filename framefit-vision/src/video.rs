use anyhow::{Context, Result};
use image::{DynamicImage, RgbImage};
use v4l::buffer::Type;
use v4l::io::mmap::Stream;
use v4l::io::traits::CaptureStream;
use v4l::video::Capture;
use v4l::{Device, Format, FourCC};

use crate::error::VisionError;

/// One camera frame
pub type VideoFrame = DynamicImage;

/// Anything that yields a continuous sequence of frames at a fixed resolution
pub trait FrameSource {
    fn resolution(&self) -> (u32, u32);
    fn next_frame(&mut self) -> Result<VideoFrame>;
}

pub struct Camera {
    stream: Stream<'static>,
    width: u32,
    height: u32,
    fourcc: FourCC,
}

impl Camera {
    /// Open a V4L2 device, asking for `width`x`height`. The driver may pick
    /// the nearest size it supports; `resolution()` reports the actual one.
    ///
    /// A device that cannot be opened or streamed from fails with
    /// [`VisionError::SourceUnavailable`].
    pub fn open(device: &str, width: u32, height: u32) -> Result<Self> {
        let unavailable =
            |e: std::io::Error| VisionError::SourceUnavailable(format!("camera {}: {}", device, e));
        let dev = Device::with_path(device).map_err(unavailable)?;
        let mut fmt = dev.format().context("get format")?;
        // Prefer RGB, fallback to YUYV, else accept existing format
        let desired = Format::new(width, height, FourCC::new(b"RGB3"));
        fmt = dev.set_format(&desired).unwrap_or(fmt);
        if fmt.fourcc != FourCC::new(b"RGB3") {
            let yuyv = Format::new(width, height, FourCC::new(b"YUYV"));
            fmt = dev.set_format(&yuyv).unwrap_or(fmt);
        }
        if (fmt.width, fmt.height) != (width, height) {
            log::warn!(
                "camera {} delivers {}x{} instead of requested {}x{}",
                device,
                fmt.width,
                fmt.height,
                width,
                height
            );
        }
        let stream = Stream::with_buffers(&dev, Type::VideoCapture, 4).map_err(unavailable)?;
        Ok(Self {
            stream,
            width: fmt.width,
            height: fmt.height,
            fourcc: fmt.fourcc,
        })
    }
}

impl FrameSource for Camera {
    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn next_frame(&mut self) -> Result<VideoFrame> {
        let (data, meta) = self.stream.next().context("capture frame")?;
        log::debug!(
            "captured frame: {}x{} fourcc={:?} seq={} len={}",
            self.width,
            self.height,
            self.fourcc,
            meta.sequence,
            data.len()
        );
        let mut buf = match self.fourcc {
            f if f == FourCC::new(b"RGB3") => data.to_vec(),
            f if f == FourCC::new(b"YUYV") => yuyv_to_rgb(self.width, self.height, data)?,
            f if f == FourCC::new(b"GREY") => grey_to_rgb(self.width, self.height, data)?,
            other => anyhow::bail!("unsupported pixel format {:?}", other),
        };
        let expected = (self.width * self.height * 3) as usize;
        if buf.len() < expected {
            anyhow::bail!("buffer too small: got {}, expected {}", buf.len(), expected);
        }
        buf.truncate(expected);
        let img = RgbImage::from_raw(self.width, self.height, buf)
            .ok_or_else(|| anyhow::anyhow!("failed to build image buffer"))?;
        Ok(DynamicImage::ImageRgb8(img))
    }
}

/// Repeats one still image forever; replays and tests use it as a camera
pub struct StillSource {
    frame: VideoFrame,
}

impl StillSource {
    pub fn new(frame: VideoFrame) -> Self {
        Self { frame }
    }
}

impl FrameSource for StillSource {
    fn resolution(&self) -> (u32, u32) {
        (self.frame.width(), self.frame.height())
    }

    fn next_frame(&mut self) -> Result<VideoFrame> {
        Ok(self.frame.clone())
    }
}

fn yuyv_to_rgb(width: u32, height: u32, data: &[u8]) -> Result<Vec<u8>> {
    let expected = (width * height * 2) as usize;
    if data.len() < expected {
        anyhow::bail!("short YUYV buffer");
    }
    let mut out = Vec::with_capacity((width * height * 3) as usize);
    for chunk in data[..expected].chunks_exact(4) {
        let y0 = chunk[0] as f32;
        let u = chunk[1] as f32 - 128.0;
        let y1 = chunk[2] as f32;
        let v = chunk[3] as f32 - 128.0;
        for y in [y0, y1] {
            out.push(clamp(y + 1.402 * v));
            out.push(clamp(y - 0.344136 * u - 0.714136 * v));
            out.push(clamp(y + 1.772 * u));
        }
    }
    Ok(out)
}

fn clamp(v: f32) -> u8 {
    v.clamp(0.0, 255.0) as u8
}

fn grey_to_rgb(width: u32, height: u32, data: &[u8]) -> Result<Vec<u8>> {
    let expected = (width * height) as usize;
    if data.len() < expected {
        anyhow::bail!("short GREY buffer");
    }
    Ok(data[..expected].iter().flat_map(|&y| [y, y, y]).collect())
}
