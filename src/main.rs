use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use vrkit::plugins::{default_search_path, ModuleScanner};
use vrkit::{AppConfig, Viewer};

#[derive(Parser)]
#[command(name = "vrkit")]
#[command(about = "Plug-in host for vrkit VR applications", long_about = None)]
struct Cli {
    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// List plug-in modules found on the search path
    Scan {
        /// Configuration file (defaults to ~/.vrkit/config.json)
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Search only these subdirectories of the default plug-in roots
        #[arg(short, long)]
        subdir: Vec<String>,
    },
    /// Print the default plug-in search path
    SearchPath {
        /// Subdirectories of the plug-in roots
        subdirs: Vec<String>,
        /// Leave out `debug` variant directories
        #[arg(long)]
        no_debug: bool,
    },
    /// Run the viewer frame loop
    Run {
        /// Configuration file (defaults to ~/.vrkit/config.json)
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Number of frames to run; 0 runs until interrupted
        #[arg(long, default_value_t = 0)]
        frames: u64,
        /// Frames per second
        #[arg(long, default_value_t = 60.0)]
        fps: f64,
        /// Emit SIGNAL once frame FRAME has run, as SIGNAL@FRAME
        #[arg(long, value_parser = parse_emit)]
        emit: Vec<(String, u64)>,
    },
    /// Show version information
    Version,
}

fn parse_emit(value: &str) -> Result<(String, u64), String> {
    let (signal, frame) = value
        .rsplit_once('@')
        .ok_or_else(|| format!("expected SIGNAL@FRAME, got '{}'", value))?;
    if signal.is_empty() {
        return Err(format!("missing signal name in '{}'", value));
    }
    let frame = frame
        .parse::<u64>()
        .map_err(|e| format!("invalid frame in '{}': {}", value, e))?;
    Ok((signal.to_string(), frame))
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<AppConfig> {
    match path {
        Some(path) => AppConfig::load(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display())),
        None => AppConfig::load_default().context("Failed to load default configuration"),
    }
}

fn scan(config: Option<PathBuf>, subdirs: Vec<String>) -> anyhow::Result<()> {
    let config = load_config(config.as_ref())?;
    let search_path = if subdirs.is_empty() {
        config.search_path()
    } else {
        let subdirs: Vec<&str> = subdirs.iter().map(String::as_str).collect();
        default_search_path(&subdirs, config.search_debug)
    };

    let modules = ModuleScanner::new().scan(&search_path);
    if modules.is_empty() {
        println!("No plug-in modules found");
    }

    for module in &modules {
        match module.plugin_info() {
            Ok(info) => {
                println!("{}  {}", info.full_name(), module.path().display());
                for dep in info.dependencies() {
                    println!("    depends on {}", dep);
                }
            }
            Err(e) => println!("{}  (not a plug-in: {})", module.path().display(), e),
        }
    }

    Ok(())
}

async fn run(config: Option<PathBuf>, frames: u64, fps: f64, emits: Vec<(String, u64)>) -> anyhow::Result<()> {
    if !(fps > 0.0) {
        anyhow::bail!("--fps must be positive");
    }

    let config = load_config(config.as_ref())?;
    let viewer = Viewer::new(config);
    viewer.init().context("Failed to initialise viewer")?;

    let (frame_tx, frame_rx) = watch::channel(0u64);

    // Signals are emitted off the frame loop, as input devices would.
    for (signal, at_frame) in emits {
        let repository = Arc::clone(viewer.signal_repository());
        let mut frame_rx = frame_rx.clone();
        tokio::spawn(async move {
            while *frame_rx.borrow() < at_frame {
                if frame_rx.changed().await.is_err() {
                    return;
                }
            }
            match repository.get_signal::<()>(&signal) {
                Ok(sig) => {
                    info!(signal = %signal, frame = at_frame, "Emitting signal");
                    sig.emit(&());
                }
                Err(e) => warn!(signal = %signal, error = %e, "Cannot emit signal"),
            }
        });
    }

    let mut interval = tokio::time::interval(Duration::from_secs_f64(1.0 / fps));
    let mut frame = 0u64;

    loop {
        tokio::select! {
            _ = interval.tick() => {
                viewer.update();
                frame += 1;
                let _ = frame_tx.send(frame);
                if frames != 0 && frame >= frames {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }

    viewer.exit();
    info!(frames = viewer.frame_count(), "Frame loop finished");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if cli.log_json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    match cli.command {
        Some(Commands::Version) | None => {
            println!("vrkit {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Scan { config, subdir }) => {
            scan(config, subdir)?;
        }
        Some(Commands::SearchPath { subdirs, no_debug }) => {
            let subdirs: Vec<&str> = subdirs.iter().map(String::as_str).collect();
            for dir in default_search_path(&subdirs, !no_debug) {
                println!("{}", dir.display());
            }
        }
        Some(Commands::Run {
            config,
            frames,
            fps,
            emit,
        }) => {
            run(config, frames, fps, emit).await?;
        }
    }

    Ok(())
}
