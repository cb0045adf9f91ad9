use anyhow::{Context, Result};
use directories::ProjectDirs;
use framefit_vision::mesh::{InputRange, MeshOptions, TensorLayout};
use framefit_vision::PlacementConfig;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub static PROJECT_DIRS: Lazy<Option<ProjectDirs>> =
    Lazy::new(|| ProjectDirs::from("", "", "framefit"));

pub static CONFIG_PATH: Lazy<PathBuf> = Lazy::new(|| match option_env!("FRAMEFIT_CONFIG_PATH") {
    Some(p) => PathBuf::from(p),
    None => PROJECT_DIRS
        .as_ref()
        .map(|d| d.config_dir().join("config.toml"))
        .unwrap_or_else(|| PathBuf::from("framefit.toml")),
});

/// Directory for state that must survive restarts (the selected overlay)
pub static DATA_DIR: Lazy<PathBuf> = Lazy::new(|| {
    PROJECT_DIRS
        .as_ref()
        .map(|d| d.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
});

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub camera: CameraConfig,
    pub mesh: MeshConfig,
    pub placement: PlacementSection,
    pub assets: AssetsConfig,
    pub render: RenderConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub device: String,
    pub width: u32,
    pub height: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device: "/dev/video0".to_string(),
            width: 1920,
            height: 1080,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layout {
    Nchw,
    Nhwc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Range {
    ZeroOne,
    MinusOneOne,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshConfig {
    pub model: PathBuf,
    pub min_detection_confidence: f32,
    pub min_tracking_confidence: f32,
    pub max_faces: usize,
    pub input_size: u32,
    pub layout: Layout,
    pub range: Range,
}

impl Default for MeshConfig {
    fn default() -> Self {
        let defaults = MeshOptions::default();
        Self {
            model: DATA_DIR.join("face_landmark.onnx"),
            min_detection_confidence: defaults.min_detection_confidence,
            min_tracking_confidence: defaults.min_tracking_confidence,
            max_faces: defaults.max_faces,
            input_size: defaults.input_size,
            layout: Layout::Nhwc,
            range: Range::ZeroOne,
        }
    }
}

impl MeshConfig {
    pub fn options(&self) -> MeshOptions {
        MeshOptions {
            input_size: self.input_size,
            layout: match self.layout {
                Layout::Nchw => TensorLayout::Nchw,
                Layout::Nhwc => TensorLayout::Nhwc,
            },
            range: match self.range {
                Range::ZeroOne => InputRange::ZeroOne,
                Range::MinusOneOne => InputRange::MinusOneOne,
            },
            min_detection_confidence: self.min_detection_confidence,
            min_tracking_confidence: self.min_tracking_confidence,
            max_faces: self.max_faces,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlacementSection {
    pub anchor_offset_px: f32,
    pub width_margin: f32,
    pub motion_speed: f32,
    pub motion_amplitude: f32,
    /// Exponential smoothing factor in (0, 1]; 1 disables smoothing
    pub smoothing: f32,
}

impl Default for PlacementSection {
    fn default() -> Self {
        let t = PlacementConfig::default();
        Self {
            anchor_offset_px: t.anchor_offset_px,
            width_margin: t.width_margin,
            motion_speed: t.motion_speed,
            motion_amplitude: t.motion_amplitude,
            smoothing: 1.0,
        }
    }
}

impl PlacementSection {
    pub fn tuning(&self) -> PlacementConfig {
        PlacementConfig {
            anchor_offset_px: self.anchor_offset_px,
            width_margin: self.width_margin,
            motion_speed: self.motion_speed,
            motion_amplitude: self.motion_amplitude,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetsConfig {
    pub manifest: PathBuf,
}

impl Default for AssetsConfig {
    fn default() -> Self {
        Self {
            manifest: DATA_DIR.join("frames.toml"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Present the feed like a mirror
    pub mirror: bool,
    /// Where composited snapshots are written
    pub output: PathBuf,
    /// Write a snapshot every N rendered frames
    pub snapshot_every: u64,
    /// Stop after this many frames; run until the camera fails when unset
    pub max_frames: Option<u64>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            mirror: true,
            output: PathBuf::from("framefit.png"),
            snapshot_every: 30,
            max_frames: None,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.camera.width == 0 || self.camera.height == 0 {
            anyhow::bail!(
                "camera resolution must be positive, got {}x{}",
                self.camera.width,
                self.camera.height
            );
        }
        self.mesh.options().validate()?;
        let p = &self.placement;
        for (name, v) in [
            ("width_margin", p.width_margin),
            ("motion_speed", p.motion_speed),
            ("motion_amplitude", p.motion_amplitude),
            ("anchor_offset_px", p.anchor_offset_px),
        ] {
            if !v.is_finite() {
                anyhow::bail!("placement.{} must be a finite number, got {}", name, v);
            }
        }
        if p.width_margin <= 1.0 {
            anyhow::bail!("placement.width_margin must exceed 1, got {}", p.width_margin);
        }
        if p.motion_speed <= 0.0 {
            anyhow::bail!("placement.motion_speed must be positive");
        }
        if p.motion_amplitude < 0.0 {
            anyhow::bail!("placement.motion_amplitude must not be negative");
        }
        if !(p.smoothing > 0.0 && p.smoothing <= 1.0) {
            anyhow::bail!("placement.smoothing must be within (0, 1], got {}", p.smoothing);
        }
        if self.render.snapshot_every == 0 {
            anyhow::bail!("render.snapshot_every must be at least 1");
        }
        Ok(())
    }
}

pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let path = path.unwrap_or(&CONFIG_PATH);
    if !path.exists() {
        return Ok(Config::default());
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading config at {}", path.display()))?;
    let cfg: Config =
        toml::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validating config {}", path.display()))?;
    Ok(cfg)
}

pub fn save_config(cfg: &Config, path: Option<&Path>) -> Result<()> {
    let path = path.unwrap_or(&CONFIG_PATH);
    let data = toml::to_string_pretty(cfg)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, data)?;
    Ok(())
}
