use clap::{Parser, Subcommand};
use lazy_frame::config::{self, FrameConfig};
use lazy_frame::imaging::{self, CropTolerance, ProbeBackend, RustBackend};
use lazy_frame::loader::PoolDispatch;
use lazy_frame::media::MediaContext;
use lazy_frame::output::{self, Classification, ScriptStep};
use lazy_frame::selection;
use lazy_frame::session::LazyImage;
use lazy_frame::types::{Geometry, StretchStrategy};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

fn version_string() -> &'static str {
    let on_tag = env!("ON_RELEASE_TAG");
    if on_tag == "true" {
        env!("CARGO_PKG_VERSION")
    } else {
        let hash = env!("GIT_HASH");
        if hash.is_empty() {
            "dev@unknown"
        } else {
            // Leaked once at startup
            Box::leak(format!("dev@{hash}").into_boxed_str())
        }
    }
}

#[derive(Parser)]
#[command(name = "lazy-frame")]
#[command(about = "Lazy, responsive image loading engine")]
#[command(long_about = "\
Lazy, responsive image loading engine

Decides when an image should load (as it nears the viewport), which source
to load (first matching media condition), and how to fit it into its box
(crop, stretch, or original size).

Config file (lazy-frame.toml):

  [viewport]
  max_buffer = 460.0

  [fit]
  stretch_strategy = \"crop\"       # crop | stretch | original
  max_crop_percentage = 20.0
  canvas_ratio = 1.5

  [[sources]]
  media = \"(max-width: 480px)\"
  url = \"small.jpg\"

  [[sources]]
  media = \"(min-width: 481px)\"
  url = \"large.jpg\"

Relative source urls are probed relative to the config file's directory.
Set RUST_LOG (or pass --verbose) to see state transitions.

Run 'lazy-frame gen-config' to generate a documented config file.")]
#[command(version = version_string())]
struct Cli {
    /// Log state transitions (same as RUST_LOG=debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print a stock config file with all options documented
    GenConfig,
    /// Load and validate a config file
    Check {
        #[arg(long, default_value = "lazy-frame.toml")]
        config: PathBuf,
    },
    /// Print the source selected for a viewport size
    Select {
        #[arg(long, default_value = "lazy-frame.toml")]
        config: PathBuf,
        /// Viewport width in px
        #[arg(long)]
        width: f64,
        /// Viewport height in px
        #[arg(long, default_value_t = 800.0)]
        height: f64,
    },
    /// Resolve a fit strategy for an image and container
    Classify {
        /// crop | stretch | original (anything else is original)
        #[arg(long, default_value = "crop")]
        strategy: StretchStrategy,
        /// Image size, WIDTHxHEIGHT
        #[arg(long)]
        image: Geometry,
        /// Container size, WIDTHxHEIGHT
        #[arg(long)]
        container: Geometry,
        /// Maximum crop percentage
        #[arg(long)]
        tolerance: Option<f64>,
    },
    /// Print an image's pixel dimensions
    Probe { url: String },
    /// Replay a JSON script of scroll/resize signals against one image
    Simulate {
        #[arg(long, default_value = "lazy-frame.toml")]
        config: PathBuf,
        #[arg(long)]
        script: PathBuf,
        /// Seconds to wait for each probe
        #[arg(long, default_value_t = 10)]
        timeout: u64,
    },
}

fn init_logging(verbose: bool) {
    let fallback = if verbose { "debug" } else { "warn" };
    let filter = if verbose {
        EnvFilter::new(fallback)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
        Command::Check { config } => {
            println!("==> Checking {}", config.display());
            let frame = config::load_config(&config)?;
            output::print_config_summary(&frame);
            if frame.sources.is_empty() {
                println!("==> Config is valid, but lists no sources");
            } else {
                println!("==> Config is valid");
            }
        }
        Command::Select {
            config,
            width,
            height,
        } => {
            let frame = config::load_config(&config)?;
            let ctx = MediaContext::screen(width, height);
            let selected = selection::select_with_context(&frame.sources, &ctx)?;
            output::print_selection(selected, &ctx);
        }
        Command::Classify {
            strategy,
            image,
            container,
            tolerance,
        } => {
            let tolerance = CropTolerance::from_override(tolerance);
            output::print_classification(&Classification {
                strategy,
                image,
                container,
                tolerance,
                deviation: imaging::crop_deviation_pct(image, container),
                state: imaging::classify(strategy, image, container, tolerance),
            });
        }
        Command::Probe { url } => {
            let dims = RustBackend::new().probe(&url)?;
            output::print_probe(&url, dims);
        }
        Command::Simulate {
            config,
            script,
            timeout,
        } => {
            let frame = config::load_config(&config)?;
            let steps: Vec<ScriptStep> = serde_json::from_str(&std::fs::read_to_string(&script)?)?;
            simulate(frame, &config_root(&config), &steps, Duration::from_secs(timeout))?;
        }
    }

    Ok(())
}

/// Directory relative source urls resolve against.
fn config_root(config: &Path) -> PathBuf {
    config
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

fn simulate(
    frame: FrameConfig,
    root: &Path,
    steps: &[ScriptStep],
    timeout: Duration,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut image = LazyImage::new(frame, PoolDispatch::new(RustBackend::with_root(root)));
    let Some(first) = steps.first() else {
        println!("==> Empty script");
        return Ok(());
    };
    image.mount(&first.environment());

    for (i, step) in steps.iter().enumerate() {
        let env = step.environment();
        if let Err(e) = image.handle(step.signal, &env) {
            tracing::error!(step = i + 1, "{e}");
        }
        if image.load_outcome().is_pending() && image.wait_timeout(timeout).is_none() {
            tracing::warn!(step = i + 1, "probe did not finish within {timeout:?}");
        }
        output::print_step(i + 1, step.signal, image.state())?;
    }
    image.dispose();
    Ok(())
}
