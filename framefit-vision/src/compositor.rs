//! Draws the camera passthrough and the placed overlay onto a render target.

use image::{imageops, DynamicImage, GenericImageView, Rgba, RgbaImage};

use crate::overlay::OverlayAsset;
use crate::placement::PlacementTransform;
use crate::video::VideoFrame;

/// 2D drawing surface with canvas-style scoped transforms
pub trait RenderTarget {
    fn size(&self) -> (u32, u32);
    /// Reset every pixel to transparent black
    fn clear(&mut self);
    /// Draw `image` stretched into the rectangle `(x, y, w, h)` of the current
    /// coordinate space
    fn draw_image(&mut self, image: &DynamicImage, x: f32, y: f32, w: f32, h: f32);
    fn save(&mut self);
    fn translate(&mut self, dx: f32, dy: f32);
    fn rotate(&mut self, radians: f32);
    fn restore(&mut self);
}

/// Composite one frame: passthrough video, then the overlay if placed.
///
/// Without a transform (no face, asset not ready) only the video is drawn.
pub fn render<S: RenderTarget>(
    surface: &mut S,
    frame: &VideoFrame,
    placement: Option<&PlacementTransform>,
    asset: Option<&OverlayAsset>,
) {
    let (w, h) = surface.size();
    surface.clear();
    surface.draw_image(frame, 0.0, 0.0, w as f32, h as f32);

    let (Some(t), Some(asset)) = (placement, asset) else {
        return;
    };
    surface.save();
    surface.translate(t.center_x, t.center_y);
    surface.rotate(t.angle_deg.to_radians());
    surface.draw_image(
        asset.image(),
        -t.width / 2.0,
        -t.height / 2.0,
        t.width,
        t.height,
    );
    surface.restore();
}

/// Affine map `x' = a·x + c·y + e`, `y' = b·x + d·y + f`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Affine {
    pub a: f32,
    pub b: f32,
    pub c: f32,
    pub d: f32,
    pub e: f32,
    pub f: f32,
}

impl Affine {
    pub const IDENTITY: Affine = Affine {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 1.0,
        e: 0.0,
        f: 0.0,
    };

    pub fn apply(&self, x: f32, y: f32) -> (f32, f32) {
        (
            self.a * x + self.c * y + self.e,
            self.b * x + self.d * y + self.f,
        )
    }

    pub fn translated(&self, dx: f32, dy: f32) -> Affine {
        Affine {
            e: self.a * dx + self.c * dy + self.e,
            f: self.b * dx + self.d * dy + self.f,
            ..*self
        }
    }

    pub fn rotated(&self, radians: f32) -> Affine {
        let (sin, cos) = radians.sin_cos();
        Affine {
            a: self.a * cos + self.c * sin,
            b: self.b * cos + self.d * sin,
            c: self.c * cos - self.a * sin,
            d: self.d * cos - self.b * sin,
            ..*self
        }
    }

    pub fn inverse(&self) -> Option<Affine> {
        let det = self.a * self.d - self.b * self.c;
        if det.abs() < f32::EPSILON {
            return None;
        }
        let a = self.d / det;
        let b = -self.b / det;
        let c = -self.c / det;
        let d = self.a / det;
        Some(Affine {
            a,
            b,
            c,
            d,
            e: -(a * self.e + c * self.f),
            f: -(b * self.e + d * self.f),
        })
    }
}

/// In-memory RGBA render target.
///
/// `mirrored` flips the presented image horizontally so the feed behaves
/// like a mirror; drawing itself always happens in un-mirrored camera space.
#[derive(Debug, Clone)]
pub struct ImageSurface {
    canvas: RgbaImage,
    current: Affine,
    stack: Vec<Affine>,
    pub mirrored: bool,
}

impl ImageSurface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            canvas: RgbaImage::new(width, height),
            current: Affine::IDENTITY,
            stack: Vec::new(),
            mirrored: false,
        }
    }

    pub fn canvas(&self) -> &RgbaImage {
        &self.canvas
    }

    pub fn transform(&self) -> Affine {
        self.current
    }

    /// Number of unmatched `save` calls
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// The image as the viewer should see it
    pub fn present(&self) -> RgbaImage {
        if self.mirrored {
            imageops::flip_horizontal(&self.canvas)
        } else {
            self.canvas.clone()
        }
    }

    fn is_pixel_aligned_copy(&self, image: &DynamicImage, x: f32, y: f32, w: f32, h: f32) -> bool {
        self.current == Affine::IDENTITY
            && x == 0.0
            && y == 0.0
            && w == image.width() as f32
            && h == image.height() as f32
    }
}

impl RenderTarget for ImageSurface {
    fn size(&self) -> (u32, u32) {
        self.canvas.dimensions()
    }

    fn clear(&mut self) {
        for px in self.canvas.pixels_mut() {
            *px = Rgba([0, 0, 0, 0]);
        }
    }

    fn draw_image(&mut self, image: &DynamicImage, x: f32, y: f32, w: f32, h: f32) {
        let (src_w, src_h) = image.dimensions();
        if src_w == 0 || src_h == 0 || w <= 0.0 || h <= 0.0 {
            return;
        }
        let (cw, ch) = self.canvas.dimensions();

        if self.is_pixel_aligned_copy(image, x, y, w, h) {
            for py in 0..src_h.min(ch) {
                for px in 0..src_w.min(cw) {
                    let dst = self.canvas.get_pixel_mut(px, py);
                    blend(dst, image.get_pixel(px, py));
                }
            }
            return;
        }

        let Some(inv) = self.current.inverse() else {
            return;
        };

        // Device-space bounds of the destination quad
        let corners = [
            self.current.apply(x, y),
            self.current.apply(x + w, y),
            self.current.apply(x, y + h),
            self.current.apply(x + w, y + h),
        ];
        let min_x = corners.iter().map(|c| c.0).fold(f32::MAX, f32::min).floor().max(0.0);
        let min_y = corners.iter().map(|c| c.1).fold(f32::MAX, f32::min).floor().max(0.0);
        let max_x = corners.iter().map(|c| c.0).fold(f32::MIN, f32::max).ceil().min(cw as f32);
        let max_y = corners.iter().map(|c| c.1).fold(f32::MIN, f32::max).ceil().min(ch as f32);
        if min_x >= max_x || min_y >= max_y {
            return;
        }

        let sx = src_w as f32 / w;
        let sy = src_h as f32 / h;
        for py in min_y as u32..max_y as u32 {
            for px in min_x as u32..max_x as u32 {
                let (lx, ly) = inv.apply(px as f32 + 0.5, py as f32 + 0.5);
                if lx < x || lx >= x + w || ly < y || ly >= y + h {
                    continue;
                }
                let u = (lx - x) * sx - 0.5;
                let v = (ly - y) * sy - 0.5;
                let sample = bilinear(image, u, v);
                blend(self.canvas.get_pixel_mut(px, py), sample);
            }
        }
    }

    fn save(&mut self) {
        self.stack.push(self.current);
    }

    fn translate(&mut self, dx: f32, dy: f32) {
        self.current = self.current.translated(dx, dy);
    }

    fn rotate(&mut self, radians: f32) {
        self.current = self.current.rotated(radians);
    }

    fn restore(&mut self) {
        if let Some(prev) = self.stack.pop() {
            self.current = prev;
        }
    }
}

/// Bilinear sample at continuous source coordinates, edges clamped
fn bilinear(image: &DynamicImage, u: f32, v: f32) -> Rgba<u8> {
    let (w, h) = image.dimensions();
    let u = u.clamp(0.0, (w - 1) as f32);
    let v = v.clamp(0.0, (h - 1) as f32);
    let x0 = u.floor() as u32;
    let y0 = v.floor() as u32;
    let x1 = (x0 + 1).min(w - 1);
    let y1 = (y0 + 1).min(h - 1);
    let fx = u - x0 as f32;
    let fy = v - y0 as f32;

    let p00 = image.get_pixel(x0, y0);
    let p10 = image.get_pixel(x1, y0);
    let p01 = image.get_pixel(x0, y1);
    let p11 = image.get_pixel(x1, y1);

    let w00 = (1.0 - fx) * (1.0 - fy);
    let w10 = fx * (1.0 - fy);
    let w01 = (1.0 - fx) * fy;
    let w11 = fx * fy;

    let mut out = [0u8; 4];
    for (i, o) in out.iter_mut().enumerate() {
        let c = p00[i] as f32 * w00 + p10[i] as f32 * w10 + p01[i] as f32 * w01 + p11[i] as f32 * w11;
        *o = c.round().clamp(0.0, 255.0) as u8;
    }
    Rgba(out)
}

/// Source-over alpha compositing
fn blend(dst: &mut Rgba<u8>, src: Rgba<u8>) {
    let sa = src[3] as u32;
    if sa == 255 {
        *dst = src;
        return;
    }
    if sa == 0 {
        return;
    }
    let inv = 255 - sa;
    for i in 0..3 {
        dst[i] = ((src[i] as u32 * sa + dst[i] as u32 * inv + 127) / 255) as u8;
    }
    dst[3] = (sa + (dst[3] as u32 * inv + 127) / 255) as u8;
}
