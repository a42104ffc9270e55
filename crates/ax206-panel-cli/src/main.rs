//! AX206 Panel Control Tool
//!
//! Mirrors images onto AX206-based USB picture frames.

mod config;

use anyhow::{Context, Result};
use ax206_panel_hw::lcd::{parse_hex_color, FlushOutcome};
use ax206_panel_hw::{count_devices, DisplayBuffer, DpfDevice, Mirror, RemoteFramebuffer};
use clap::{Parser, Subcommand};
use image::imageops::FilterType;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use config::Config;

#[derive(Parser)]
#[command(name = "ax206ctl")]
#[command(about = "Control tool for AX206 USB picture frames")]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Frame to use (usb0-usb9 or dpf0-dpf9), overrides the config file
    #[arg(short, long)]
    device: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Count AX206 frames on the USB bus
    List,
    /// Show panel information
    Info,
    /// Clear the display to a solid color
    Clear {
        /// Color in hex format (e.g., #FF0000 for red)
        #[arg(long, default_value = "#000000")]
        color: String,
    },
    /// Show an image, scaled to the panel
    Show {
        /// Image file path
        image: PathBuf,
    },
    /// Set the backlight level
    Backlight {
        /// Level (0 = off, 7 = brightest)
        level: u16,
    },
    /// Keep mirroring an image file, sending only what changed
    Watch {
        /// Image file path
        image: PathBuf,

        /// Poll interval in milliseconds (overrides the config file)
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
        interval: Option<u64>,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut config = match &cli.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => Config::default(),
    };
    if let Some(device) = cli.device {
        config.device = device;
    }

    match cli.command {
        Commands::List => handle_list(),
        Commands::Info => handle_info(&config),
        Commands::Clear { color } => handle_clear(&config, &color),
        Commands::Show { image } => handle_show(&config, &image),
        Commands::Backlight { level } => handle_backlight(&config, level),
        Commands::Watch { image, interval } => {
            let interval = interval.unwrap_or(config.watch_interval_ms);
            handle_watch(&config, &image, Duration::from_millis(interval)).await
        }
    }
}

/// Opens the configured frame and applies the configured backlight.
fn open_device(config: &Config) -> Result<DpfDevice> {
    let mut dpf = DpfDevice::open(&config.device)
        .with_context(|| format!("Cannot open dpf device {}", config.device))?;
    if let Some(level) = config.backlight {
        dpf.set_backlight(level)
            .context("Failed to set backlight level")?;
    }
    Ok(dpf)
}

/// Starts a mirroring session with a framebuffer the size of the panel.
fn start_mirror(config: &Config) -> Result<Mirror<DpfDevice>> {
    let dpf = open_device(config)?;
    let (width, height) = (dpf.width(), dpf.height());
    let (canvas_width, canvas_height) = config.canvas.resolve(width, height);
    let display = DisplayBuffer::with_canvas(width, height, canvas_width, canvas_height);

    let mut mirror = Mirror::with_display(dpf, display);
    mirror.allocate_framebuffer(width as u32, height as u32);
    Ok(mirror)
}

fn finish_mirror(mirror: Mirror<DpfDevice>) -> Result<()> {
    mirror.into_target().close().context("Failed to close device")
}

/// Decodes an image file into the framebuffer, scaled to fit exactly.
fn load_image(path: &Path, fb: &mut RemoteFramebuffer) -> Result<()> {
    let img = image::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let rgba = img
        .resize_exact(fb.width(), fb.height(), FilterType::Triangle)
        .to_rgba8();
    fb.data_mut().copy_from_slice(rgba.as_raw());
    Ok(())
}

/// Pushes the whole framebuffer through the update callback.
fn push_frame(mirror: &mut Mirror<DpfDevice>) -> FlushOutcome {
    let (width, height) = mirror
        .framebuffer()
        .map(|fb| (fb.width(), fb.height()))
        .unwrap_or_default();
    mirror.update(0, 0, width, height)
}

fn report(outcome: FlushOutcome) -> Result<()> {
    match outcome {
        FlushOutcome::Clean => println!("Display already up to date"),
        FlushOutcome::Sent { rect, return_code } => {
            println!("Updated {} (device returned {})", rect, return_code)
        }
        FlushOutcome::Dropped { rect } => anyhow::bail!("Failed to update {}", rect),
    }
    Ok(())
}

fn handle_list() -> Result<()> {
    let count = count_devices().context("Failed to enumerate USB devices")?;
    println!("AX206 frames found: {}", count);
    for index in 0..count.min(10) {
        println!("  usb{}", index);
    }
    Ok(())
}

fn handle_info(config: &Config) -> Result<()> {
    let dpf = open_device(config)?;
    println!("Frame {}:", config.device);
    println!("  Width: {}", dpf.width());
    println!("  Height: {}", dpf.height());
    dpf.close().context("Failed to close device")
}

fn handle_clear(config: &Config, color: &str) -> Result<()> {
    let pixel = parse_hex_color(color)
        .with_context(|| format!("Invalid color: {}. Use #RRGGBB", color))?;
    let mut mirror = start_mirror(config)?;
    if let Some(fb) = mirror.framebuffer_mut() {
        for chunk in fb.data_mut().chunks_exact_mut(4) {
            chunk.copy_from_slice(&pixel.to_bytes());
        }
    }
    let outcome = push_frame(&mut mirror);
    finish_mirror(mirror)?;
    report(outcome)?;
    println!("Display cleared to: {}", color);
    Ok(())
}

fn handle_show(config: &Config, image: &Path) -> Result<()> {
    let mut mirror = start_mirror(config)?;
    if let Some(fb) = mirror.framebuffer_mut() {
        load_image(image, fb)?;
    }
    let outcome = push_frame(&mut mirror);
    finish_mirror(mirror)?;
    report(outcome)
}

fn handle_backlight(config: &Config, level: u16) -> Result<()> {
    let mut dpf = open_device(config)?;
    dpf.set_backlight(level)
        .context("Failed to set backlight level")?;
    dpf.close().context("Failed to close device")?;
    println!("Backlight set to: {}", level);
    Ok(())
}

async fn handle_watch(config: &Config, image: &Path, interval: Duration) -> Result<()> {
    if interval.is_zero() {
        anyhow::bail!("Watch interval must be greater than 0");
    }
    let mut mirror = start_mirror(config)?;
    let mut ticker = tokio::time::interval(interval);
    let mut consecutive_errors: u32 = 0;
    info!(
        "Mirroring {} every {}ms, press Ctrl-C to stop",
        image.display(),
        interval.as_millis()
    );

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = &mut ctrl_c => {
                info!("Received SIGINT, shutting down");
                break;
            }
        }

        let loaded = match mirror.framebuffer_mut() {
            Some(fb) => load_image(image, fb),
            None => break,
        };
        if let Err(e) = loaded {
            // File may be mid-write
            warn!("Skipping frame: {:#}", e);
            continue;
        }

        match push_frame(&mut mirror) {
            FlushOutcome::Dropped { rect } => {
                consecutive_errors += 1;
                warn!(
                    "Update {} dropped ({} consecutive failures)",
                    rect, consecutive_errors
                );
            }
            FlushOutcome::Sent { rect, .. } => {
                consecutive_errors = 0;
                info!("Updated {}", rect);
            }
            FlushOutcome::Clean => consecutive_errors = 0,
        }
    }

    finish_mirror(mirror)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_watch_rejects_zero_interval() {
        let result = Cli::try_parse_from(["ax206ctl", "watch", "frame.png", "--interval", "0"]);
        assert!(result.is_err());

        let cli = Cli::try_parse_from(["ax206ctl", "watch", "frame.png", "--interval", "250"])
            .unwrap();
        assert!(matches!(
            cli.command,
            Commands::Watch {
                interval: Some(250),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_handle_watch_zero_interval_is_error() {
        let err = handle_watch(&Config::default(), Path::new("frame.png"), Duration::ZERO)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("greater than 0"));
    }
}
