// Demo runner for the `hue_mirror` library: mirrors the screen (or a synthetic test
// pattern without the `screen` feature) onto the fixtures listed in a position file,
// logging every color write instead of sending it to a bridge.

use anyhow::{Context, Result};
use clap::Parser;
use hue_mirror::devices::{CaptureSurface, JsonPositionStore, LoggingActuator};
use hue_mirror::{ConfigPatch, EngineOptions, MirrorEngine};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "hue_mirror", about = "Mirror screen colors onto ambient light fixtures")]
struct Cli {
    /// Target cycles per second.
    #[arg(long, default_value_t = 10)]
    fps: u32,
    /// Brightness sent with every write (0-254).
    #[arg(long, default_value_t = 200)]
    brightness: u8,
    /// Channel spread multiplier applied to extracted colors.
    #[arg(long)]
    saturation_boost: Option<f32>,
    /// Weight of the newest observation, in (0, 1].
    #[arg(long)]
    smoothing_factor: Option<f32>,
    /// Fixture placement file.
    #[arg(long, default_value = ".res/light_positions.json")]
    positions: PathBuf,
    /// JSON file with engine options (thresholds, sampling grid, gamut, timeouts).
    #[arg(long)]
    options: Option<PathBuf>,
    /// Stop after this many seconds; runs until Ctrl-C when omitted.
    #[arg(long)]
    duration: Option<u64>,
    /// Seconds between status log lines.
    #[arg(long, default_value_t = 5)]
    status_every: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let options = match &cli.options {
        Some(path) => load_options(path)?,
        None => EngineOptions::default(),
    };

    let store = Arc::new(JsonPositionStore::new(&cli.positions));
    let positions_path = store.path().display().to_string();
    let engine = MirrorEngine::new(capture_surface(), store, Arc::new(LoggingActuator::new()), options)
        .context("invalid engine options")?;

    let mut patch = ConfigPatch::default();
    if let Some(boost) = cli.saturation_boost {
        patch = patch.saturation_boost(boost);
    }
    if let Some(factor) = cli.smoothing_factor {
        patch = patch.smoothing_factor(factor);
    }
    if !patch.is_empty() {
        engine.reconfigure(&patch).context("invalid mirroring settings")?;
    }

    engine
        .start(cli.fps, cli.brightness)
        .await
        .context("failed to start mirroring")?;
    info!(positions = %positions_path, "mirroring; press Ctrl-C to stop");

    let run_for = async {
        match cli.duration {
            Some(seconds) => tokio::time::sleep(Duration::from_secs(seconds)).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(run_for);
    let mut ticker = tokio::time::interval(Duration::from_secs(cli.status_every.max(1)));

    loop {
        tokio::select! {
            _ = &mut run_for => break,
            signal = tokio::signal::ctrl_c() => {
                if let Err(error) = signal {
                    warn!(%error, "failed to listen for Ctrl-C");
                }
                break;
            }
            _ = ticker.tick() => {
                let status = engine.status();
                info!(
                    cycles = status.cycles,
                    fps = status.fps,
                    fixtures = status.colors.len(),
                    colors = %serde_json::to_string(&status.colors).unwrap_or_default(),
                    "status"
                );
            }
        }
    }

    engine.stop().await.context("failed to stop mirroring")?;
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

fn load_options(path: &Path) -> Result<EngineOptions> {
    let contents =
        std::fs::read_to_string(path).with_context(|| format!("read options file {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("parse options file {}", path.display()))
}

#[cfg(feature = "screen")]
fn capture_surface() -> Arc<dyn CaptureSurface> {
    Arc::new(hue_mirror::devices::ScreenCapture)
}

#[cfg(not(feature = "screen"))]
fn capture_surface() -> Arc<dyn CaptureSurface> {
    Arc::new(hue_mirror::devices::TestPattern::new(640, 360))
}
