//! One try-on session: lifecycle, per-frame placement and compositing, and
//! the live camera loop.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use anyhow::{Context, Result};
use framefit_vision::{
    compute_placement, render, FrameSource, ImageSurface, LandmarkSet, LandmarkSource,
    LatestSlot, MotionPhase, OverlayAsset, PlacementConfig, PlacementSmoother,
    PlacementTransform, RenderTarget, VideoFrame, VisionError,
};
use log::{debug, error, info, warn};

use crate::assets::{AssetStore, LoadState};
use crate::selection::SelectionStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    LoadingAssets,
    AwaitingFirstDetection,
    Tracking,
    /// Camera or landmark source failed; the loop is halted until restarted
    Unavailable(String),
    Stopped,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Uninitialized => write!(f, "uninitialized"),
            SessionState::LoadingAssets => write!(f, "loading frames"),
            SessionState::AwaitingFirstDetection => write!(f, "looking for a face"),
            SessionState::Tracking => write!(f, "tracking"),
            SessionState::Unavailable(reason) => write!(f, "camera unavailable: {}", reason),
            SessionState::Stopped => write!(f, "stopped"),
        }
    }
}

/// Cancels a running session from any thread
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct TryOnSession<S: RenderTarget = ImageSurface> {
    state: SessionState,
    assets: AssetStore,
    selection: SelectionStore,
    active: u32,
    phase: MotionPhase,
    tuning: PlacementConfig,
    smoother: PlacementSmoother,
    surface: S,
    frames: u64,
    stop: StopHandle,
}

impl<S: RenderTarget> TryOnSession<S> {
    pub fn new(
        assets: AssetStore,
        selection: SelectionStore,
        surface: S,
        tuning: PlacementConfig,
        smoothing: f32,
    ) -> Self {
        let active = resolve_selection(&assets, selection.get());
        Self {
            state: SessionState::Uninitialized,
            assets,
            selection,
            active,
            phase: MotionPhase::new(),
            tuning,
            smoother: PlacementSmoother::new(smoothing),
            surface,
            frames: 0,
            stop: StopHandle::default(),
        }
    }

    /// Load every overlay, then wait for the first face.
    /// Returns the number of overlays ready to draw.
    pub fn start(&mut self) -> usize {
        self.state = SessionState::LoadingAssets;
        info!("Loading {} overlay(s)...", self.assets.pending());
        let ready = self.assets.load_all();
        if self.assets.ready(self.active).is_none() {
            warn!("Selected overlay {} is not available; showing camera only", self.active);
        }
        self.state = SessionState::AwaitingFirstDetection;
        info!("{} overlay(s) ready, waiting for a face", ready);
        ready
    }

    /// Switch the drawn overlay without restarting or persisting
    pub fn activate(&mut self, id: u32) -> Result<()> {
        if !self.assets.contains(id) {
            anyhow::bail!("no overlay with id {}", id);
        }
        self.active = id;
        self.smoother.reset();
        match self.assets.state(id) {
            Some(LoadState::Pending) => info!("Overlay {} selected, still loading", id),
            Some(LoadState::Failed(reason)) => warn!("Overlay {} selected but unusable: {}", id, reason),
            _ => info!("Overlay {} selected", id),
        }
        Ok(())
    }

    /// Hot-swap to `id` and remember it for the next session
    pub fn select(&mut self, id: u32) -> Result<()> {
        if !self.assets.contains(id) {
            anyhow::bail!("no overlay with id {}", id);
        }
        self.selection.set(id).context("persisting selection")?;
        self.activate(id)
    }

    /// Run placement and compositing for one delivered frame.
    ///
    /// Missing landmarks or an unloaded overlay only skip the overlay draw.
    /// Returns the placement that was drawn, if any.
    pub fn on_frame(
        &mut self,
        frame: &VideoFrame,
        landmarks: Option<&LandmarkSet>,
    ) -> Result<Option<PlacementTransform>> {
        if self.stop.is_stopped() && !matches!(self.state, SessionState::Unavailable(_)) {
            self.state = SessionState::Stopped;
        }
        match self.state {
            SessionState::Uninitialized | SessionState::LoadingAssets => {
                anyhow::bail!("frame delivered before overlays finished loading")
            }
            SessionState::Unavailable(ref reason) => {
                anyhow::bail!("session halted: {}", reason)
            }
            SessionState::Stopped => return Ok(None),
            _ => {}
        }
        if self.state == SessionState::AwaitingFirstDetection && landmarks.is_some() {
            info!("Face found, tracking");
            self.state = SessionState::Tracking;
        }
        if landmarks.is_none() {
            debug!("frame {}: no face", self.frames);
        }

        let asset: Option<&OverlayAsset> = self.assets.ready(self.active);
        let placement = compute_placement(
            landmarks,
            asset,
            self.surface.size(),
            &mut self.phase,
            &self.tuning,
        );
        let placement = self.smoother.apply(placement);
        render(&mut self.surface, frame, placement.as_ref(), asset);
        self.frames += 1;
        Ok(placement)
    }

    /// Mark the session as failed; nothing is drawn afterwards
    pub fn fail(&mut self, reason: impl Into<String>) {
        let reason = reason.into();
        error!("Session halted: {}", reason);
        self.state = SessionState::Unavailable(reason);
        self.stop.stop();
    }

    pub fn stop(&mut self) {
        self.stop.stop();
        if !matches!(self.state, SessionState::Unavailable(_)) {
            self.state = SessionState::Stopped;
        }
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn active(&self) -> u32 {
        self.active
    }

    pub fn assets(&self) -> &AssetStore {
        &self.assets
    }

    pub fn assets_mut(&mut self) -> &mut AssetStore {
        &mut self.assets
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames
    }
}

/// Stored id if the manifest has it, else 0, else the first listed asset
fn resolve_selection(assets: &AssetStore, stored: u32) -> u32 {
    if assets.contains(stored) {
        return stored;
    }
    let fallback = if assets.contains(0) {
        0
    } else {
        assets.descriptors().next().map(|d| d.id).unwrap_or(0)
    };
    if stored != 0 {
        warn!("Saved overlay {} no longer exists, using {}", stored, fallback);
    }
    fallback
}

/// A frame together with the landmarks found in it
pub struct Detection {
    pub frame: VideoFrame,
    pub landmarks: Option<LandmarkSet>,
}

type Delivery = Result<Detection>;

/// Drive the session from live sources until stopped, `max_frames` is
/// reached, or a source fails.
///
/// `open` runs on a capture thread, which feeds a latest-wins slot; frames
/// the renderer could not keep up with are dropped, never queued.
/// `on_rendered` is called after every composited frame. A camera or
/// landmark source that fails to open or stops delivering ends the loop with
/// [`VisionError::SourceUnavailable`].
pub fn run_live<S, O, F, L, C>(
    session: &mut TryOnSession<S>,
    open: O,
    max_frames: Option<u64>,
    mut on_rendered: C,
) -> Result<()>
where
    S: RenderTarget,
    O: FnOnce() -> Result<(F, L)> + Send,
    F: FrameSource,
    L: LandmarkSource,
    C: FnMut(&TryOnSession<S>) -> Result<()>,
{
    if *session.state() == SessionState::Uninitialized {
        session.start();
    }
    let slot: LatestSlot<Delivery> = LatestSlot::new();
    let stop = session.stop_handle();

    let result = thread::scope(|scope| {
        let producer_stop = stop.clone();
        let slot_ref = &slot;
        scope.spawn(move || produce(open, slot_ref, &producer_stop));

        let result = consume(session, &slot, max_frames, &mut on_rendered);
        stop.stop();
        slot.close();
        result
    });

    let dropped = slot.overwritten();
    if dropped > 0 {
        debug!("{} frame(s) superseded before rendering", dropped);
    }
    result
}

fn produce<O, F, L>(open: O, slot: &LatestSlot<Delivery>, stop: &StopHandle)
where
    O: FnOnce() -> Result<(F, L)>,
    F: FrameSource,
    L: LandmarkSource,
{
    let (mut frames, mut detector) = match open() {
        Ok(sources) => sources,
        Err(e) => {
            slot.publish(Err(e));
            slot.close();
            return;
        }
    };
    let (w, h) = frames.resolution();
    info!("Camera streaming at {}x{}", w, h);

    while !stop.is_stopped() {
        let delivery = frames
            .next_frame()
            .context("capturing frame")
            .and_then(|frame| {
                let landmarks = detector.detect(&frame).context("detecting landmarks")?;
                Ok(Detection { frame, landmarks })
            });
        let failed = delivery.is_err();
        if !slot.publish(delivery) || failed {
            break;
        }
    }
    slot.close();
}

fn consume<S, C>(
    session: &mut TryOnSession<S>,
    slot: &LatestSlot<Delivery>,
    max_frames: Option<u64>,
    on_rendered: &mut C,
) -> Result<()>
where
    S: RenderTarget,
    C: FnMut(&TryOnSession<S>) -> Result<()>,
{
    while let Some(delivery) = slot.take() {
        if session.stop.is_stopped() {
            break;
        }
        let detection = match delivery {
            Ok(d) => d,
            Err(e) => {
                session.fail(format!("{:#}", e));
                return Err(source_unavailable(e));
            }
        };
        session.on_frame(&detection.frame, detection.landmarks.as_ref())?;
        on_rendered(&*session)?;
        if max_frames.is_some_and(|m| session.frames_rendered() >= m) {
            break;
        }
    }
    session.stop();
    Ok(())
}

/// Keep an error already typed as unavailable, wrap anything else
fn source_unavailable(e: anyhow::Error) -> anyhow::Error {
    match e.downcast_ref::<VisionError>() {
        Some(VisionError::SourceUnavailable(_)) => e,
        _ => VisionError::SourceUnavailable(format!("{:#}", e)).into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::AssetDescriptor;
    use framefit_vision::LandmarkPoint;
    use image::{DynamicImage, Rgba, RgbaImage};
    use std::path::PathBuf;

    fn store_with(ids: &[u32]) -> AssetStore {
        let mut store = AssetStore::default();
        for &id in ids {
            store.insert(AssetDescriptor {
                id,
                name: format!("f{}", id),
                path: PathBuf::from(format!("f{}.png", id)),
            });
        }
        store
    }

    fn temp_selection() -> SelectionStore {
        SelectionStore::new(
            std::env::temp_dir()
                .join(format!("framefit-session-{}", uuid::Uuid::new_v4()))
                .join("selection.bin"),
        )
    }

    fn face() -> LandmarkSet {
        LandmarkSet::from_anchors(
            LandmarkPoint::new(0.5, 0.5),
            LandmarkPoint::new(0.4, 0.5),
            LandmarkPoint::new(0.6, 0.5),
        )
    }

    /// Session past the loading barrier with every asset left pending
    fn loaded_session(ids: &[u32]) -> TryOnSession {
        let mut s = TryOnSession::new(
            store_with(ids),
            temp_selection(),
            ImageSurface::new(64, 48),
            PlacementConfig::default(),
            1.0,
        );
        s.state = SessionState::AwaitingFirstDetection;
        s
    }

    #[test]
    fn test_selection_falls_back() {
        let sel = temp_selection();
        sel.set(7).unwrap();
        let s = TryOnSession::new(store_with(&[2, 3]), sel.clone(), ImageSurface::new(1, 1), PlacementConfig::default(), 1.0);
        assert_eq!(s.active(), 2);
        let s = TryOnSession::new(store_with(&[3, 0]), sel.clone(), ImageSurface::new(1, 1), PlacementConfig::default(), 1.0);
        assert_eq!(s.active(), 0);
        let s = TryOnSession::new(store_with(&[7]), sel.clone(), ImageSurface::new(1, 1), PlacementConfig::default(), 1.0);
        assert_eq!(s.active(), 7);
        std::fs::remove_dir_all(sel.path().parent().unwrap()).unwrap();
    }

    #[test]
    fn test_frames_rejected_before_loading() {
        let mut s = loaded_session(&[0]);
        s.state = SessionState::Uninitialized;
        let frame = DynamicImage::new_rgb8(64, 48);
        assert!(s.on_frame(&frame, Some(&face())).is_err());
    }

    #[test]
    fn test_state_transitions() {
        let mut s = loaded_session(&[0]);
        s.assets_mut()
            .complete(0, OverlayAsset::new(RgbaImage::from_pixel(4, 2, Rgba([255, 0, 0, 255]))));
        let frame = DynamicImage::new_rgb8(64, 48);

        assert!(s.on_frame(&frame, None).unwrap().is_none());
        assert_eq!(*s.state(), SessionState::AwaitingFirstDetection);

        assert!(s.on_frame(&frame, Some(&face())).unwrap().is_some());
        assert_eq!(*s.state(), SessionState::Tracking);

        // losing the face is a per-frame condition, not a state
        assert!(s.on_frame(&frame, None).unwrap().is_none());
        assert_eq!(*s.state(), SessionState::Tracking);
        assert_eq!(s.frames_rendered(), 3);

        s.stop();
        assert_eq!(s.on_frame(&frame, Some(&face())).unwrap(), None);
        assert_eq!(s.frames_rendered(), 3);
    }

    #[test]
    fn test_failure_halts() {
        let mut s = loaded_session(&[0]);
        s.fail("no camera");
        assert_eq!(*s.state(), SessionState::Unavailable("no camera".into()));
        assert!(s.stop_handle().is_stopped());
        assert!(s.on_frame(&DynamicImage::new_rgb8(64, 48), None).is_err());
        s.stop();
        assert!(matches!(s.state(), SessionState::Unavailable(_)));
    }

    #[test]
    fn test_select_unknown_id_keeps_previous() {
        let mut s = loaded_session(&[0, 1]);
        assert!(s.select(9).is_err());
        assert_eq!(s.active(), 0);
        assert_eq!(s.selection.get(), 0);

        s.select(1).unwrap();
        assert_eq!(s.active(), 1);
        assert_eq!(s.selection.get(), 1);
        std::fs::remove_dir_all(s.selection.path().parent().unwrap()).unwrap();
    }
}
