use std::path::Path;

use image::{DynamicImage, RgbaImage};

use crate::error::Result;

/// Eyewear image drawn over the face. Immutable once loaded.
#[derive(Debug, Clone)]
pub struct OverlayAsset {
    image: DynamicImage,
}

impl OverlayAsset {
    pub fn new(image: RgbaImage) -> Self {
        Self {
            image: DynamicImage::ImageRgba8(image),
        }
    }

    pub fn open(path: &Path) -> Result<Self> {
        let image = image::open(path)?;
        Ok(Self::new(image.to_rgba8()))
    }

    pub fn image(&self) -> &DynamicImage {
        &self.image
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Intrinsic width / height; `None` for a degenerate image
    pub fn aspect_ratio(&self) -> Option<f32> {
        if self.width() == 0 || self.height() == 0 {
            return None;
        }
        Some(self.width() as f32 / self.height() as f32)
    }
}
