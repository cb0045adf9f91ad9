pub mod compositor;
pub mod error;
pub mod landmarks;
pub mod mesh;
pub mod model;
pub mod motion;
pub mod overlay;
pub mod placement;
pub mod slot;
pub mod video;

// Re-export commonly used types
pub use compositor::{render, ImageSurface, RenderTarget};
pub use error::VisionError;
pub use landmarks::{LandmarkPoint, LandmarkSet, LandmarkSource};
pub use mesh::{FaceMesh, MeshOptions};
pub use motion::MotionPhase;
pub use overlay::OverlayAsset;
pub use placement::{compute_placement, PlacementConfig, PlacementSmoother, PlacementTransform};
pub use slot::LatestSlot;
pub use video::{Camera, FrameSource, StillSource, VideoFrame};
