use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use framefit::assets::{AssetStore, LoadState, Manifest};
use framefit::config::{self, Config};
use framefit::selection::SelectionStore;
use framefit::session::{self, TryOnSession};
use framefit::{trace, ImageSurface};
use framefit_vision::{Camera, FaceMesh};
use log::{error, info};

#[derive(Parser)]
#[command(name = "framefit")]
#[command(version, about = "Virtual eyewear try-on over a live camera feed")]
struct Cli {
    /// Config file (defaults to the per-user config location)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Track the face from the camera and composite the selected frame
    Run {
        /// Stop after this many rendered frames
        #[arg(short, long)]
        frames: Option<u64>,
        /// Snapshot file to write composited frames to
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Composite a still image with recorded landmarks
    Render {
        /// Camera frame to draw on
        #[arg(short, long)]
        image: PathBuf,
        /// Landmark trace (JSON)
        #[arg(short, long)]
        landmarks: PathBuf,
        /// Where to write the result
        #[arg(short, long)]
        out: PathBuf,
        /// Overlay id to use instead of the saved selection
        #[arg(short, long)]
        asset: Option<u32>,
    },
    /// List the available frames
    List,
    /// Choose the frame used from now on
    Select {
        /// Overlay id from `list`
        id: u32,
    },
    /// Open config file in editor
    Config,
}

fn main() -> Result<()> {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .format_target(false)
        .format_timestamp(None)
        .parse_default_env()
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Run { frames, output } => run(&cfg, frames, output),
        Commands::Render {
            image,
            landmarks,
            out,
            asset,
        } => render_still(&cfg, &image, &landmarks, &out, asset),
        Commands::List => list(&cfg),
        Commands::Select { id } => select(&cfg, id),
        Commands::Config => open_config(cli.config.as_deref()),
    }
}

fn new_session(cfg: &Config, width: u32, height: u32) -> Result<TryOnSession> {
    let manifest = Manifest::load(&cfg.assets.manifest).context("Failed to load frame manifest")?;
    let mut surface = ImageSurface::new(width, height);
    surface.mirrored = cfg.render.mirror;
    Ok(TryOnSession::new(
        AssetStore::from_manifest(&manifest),
        SelectionStore::default(),
        surface,
        cfg.placement.tuning(),
        cfg.placement.smoothing,
    ))
}

fn run(cfg: &Config, frames: Option<u64>, output: Option<PathBuf>) -> Result<()> {
    let mut session = new_session(cfg, cfg.camera.width, cfg.camera.height)?;
    session.start();

    info!("Opening camera: {}", cfg.camera.device);
    let camera_cfg = cfg.camera.clone();
    let mesh_cfg = cfg.mesh.clone();
    let open = move || -> Result<(Camera, FaceMesh)> {
        let camera = Camera::open(&camera_cfg.device, camera_cfg.width, camera_cfg.height)
            .context("Failed to open camera")?;
        let mesh = FaceMesh::open(&mesh_cfg.model, mesh_cfg.options())
            .context("Failed to load landmark model")?;
        Ok((camera, mesh))
    };

    let output = output.unwrap_or_else(|| cfg.render.output.clone());
    let every = cfg.render.snapshot_every;
    let result = session::run_live(&mut session, open, frames.or(cfg.render.max_frames), |s| {
        if s.frames_rendered() % every == 0 {
            save_snapshot(s, &output)?;
        }
        Ok(())
    });

    if let Err(e) = result {
        error!("{}", session.state());
        return Err(e);
    }
    save_snapshot(&session, &output)?;
    info!(
        "Rendered {} frame(s), last frame written to {}",
        session.frames_rendered(),
        output.display()
    );
    Ok(())
}

fn save_snapshot(session: &TryOnSession, path: &Path) -> Result<()> {
    session
        .surface()
        .present()
        .save(path)
        .with_context(|| format!("writing {}", path.display()))
}

fn render_still(
    cfg: &Config,
    image_path: &Path,
    landmarks_path: &Path,
    out: &Path,
    asset: Option<u32>,
) -> Result<()> {
    let frame = image::open(image_path)
        .with_context(|| format!("reading {}", image_path.display()))?;
    let landmarks = trace::load_trace(landmarks_path)?;

    let mut session = new_session(cfg, frame.width(), frame.height())?;
    if let Some(id) = asset {
        session.activate(id)?;
    }
    session.start();

    match session.on_frame(&frame, landmarks.as_ref())? {
        Some(t) => info!(
            "Overlay {} at ({:.1}, {:.1}) size {:.1}x{:.1} angle {:.1}°",
            session.active(),
            t.center_x,
            t.center_y,
            t.width,
            t.height,
            t.angle_deg
        ),
        None => info!("No overlay drawn (no face or frame not loaded)"),
    }
    save_snapshot(&session, out)?;
    info!("✓ Written to {}", out.display());
    Ok(())
}

fn list(cfg: &Config) -> Result<()> {
    let manifest = Manifest::load(&cfg.assets.manifest).context("Failed to load frame manifest")?;
    let selected = SelectionStore::default().get();
    let mut store = AssetStore::from_manifest(&manifest);
    store.load_all();

    for d in store.descriptors() {
        let marker = if d.id == selected { "*" } else { " " };
        let status = match store.state(d.id) {
            Some(LoadState::Ready(a)) => format!("{}x{}", a.width(), a.height()),
            Some(LoadState::Failed(reason)) => format!("unusable: {}", reason),
            _ => "pending".to_string(),
        };
        info!("{} {:>3}  {:<20} {}", marker, d.id, d.name, status);
    }
    Ok(())
}

fn select(cfg: &Config, id: u32) -> Result<()> {
    let manifest = Manifest::load(&cfg.assets.manifest).context("Failed to load frame manifest")?;
    if !manifest.assets.iter().any(|a| a.id == id) {
        anyhow::bail!("No frame with id {}. Run 'list' to see available frames.", id);
    }
    SelectionStore::default()
        .set(id)
        .context("Failed to save selection")?;
    info!("✓ Frame {} selected", id);
    Ok(())
}

fn open_config(path: Option<&Path>) -> Result<()> {
    let config_path = path.map(Path::to_path_buf).unwrap_or_else(|| config::CONFIG_PATH.to_path_buf());
    if !config_path.exists() {
        config::save_config(&Config::default(), Some(&config_path))
            .context("Failed to write default config")?;
    }
    let editor = env::var("EDITOR").unwrap_or_else(|_| "vi".to_string());

    info!("Opening config file: {:?}", config_path);

    let status = std::process::Command::new(editor)
        .arg(&config_path)
        .status()
        .context("Failed to open editor")?;

    if !status.success() {
        anyhow::bail!("Editor exited with non-zero status");
    }

    Ok(())
}
