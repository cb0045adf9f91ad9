pub mod assets;
pub mod config;
pub mod selection;
pub mod session;
pub mod trace;

// Re-export vision types for convenience
pub use framefit_vision::{
    compositor, landmarks, placement, video, ImageSurface, LandmarkSet, OverlayAsset,
    PlacementTransform,
};
pub use session::{SessionState, TryOnSession};
