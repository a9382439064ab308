//! Local capture tool: render one globe view and write it to disk.

use anyhow::Context;
use clap::Parser;
use globeshot::cdp::CdpLauncher;
use globeshot::logging::{self, LogConfig};
use globeshot::{CaptureConfig, ImageFormat, ProxyResponse, RenderCaptureHandler, RenderRequest};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "globeshot", version, about = "Render a deck.gl globe in headless Chrome and screenshot it")]
struct Args {
    /// Latitude of the view center (defaults to the configured default)
    #[arg(long, allow_hyphen_values = true)]
    latitude: Option<f64>,

    /// Longitude of the view center
    #[arg(long, allow_hyphen_values = true)]
    longitude: Option<f64>,

    /// Zoom level
    #[arg(long)]
    zoom: Option<f64>,

    /// Image format: jpeg or png
    #[arg(long)]
    format: Option<ImageFormat>,

    /// JPEG quality (0-100)
    #[arg(long)]
    quality: Option<u32>,

    /// Globe tessellation resolution
    #[arg(long)]
    resolution: Option<u32>,

    /// Maximum time to wait for rendering to finish
    #[arg(long)]
    render_timeout_ms: Option<u64>,

    /// Chrome/Chromium binary to launch
    #[arg(long)]
    browser: Option<PathBuf>,

    /// Output file (defaults to globe.<ext>)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Print the proxy response JSON instead of writing an image file
    #[arg(long)]
    response: bool,
}

impl Args {
    fn apply(&self, mut cfg: CaptureConfig) -> CaptureConfig {
        if let Some(format) = self.format {
            cfg.image_format = format;
            if format == ImageFormat::Png {
                cfg.image_quality = None;
            }
        }
        if let Some(q) = self.quality {
            cfg.image_quality = Some(q);
        }
        if let Some(r) = self.resolution {
            cfg.globe_resolution = r;
        }
        if let Some(t) = self.render_timeout_ms {
            cfg.render_timeout_ms = t;
        }
        if let Some(ref b) = self.browser {
            cfg.browser_executable_path = Some(b.clone());
        }
        cfg
    }

    fn request(&self, defaults: &RenderRequest) -> RenderRequest {
        RenderRequest {
            latitude: self.latitude.unwrap_or(defaults.latitude),
            longitude: self.longitude.unwrap_or(defaults.longitude),
            zoom: self.zoom.unwrap_or(defaults.zoom),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init(LogConfig::from_env());
    let args = Args::parse();

    let config = args.apply(CaptureConfig::from_env().context("loading configuration from environment")?);
    config.validate().context("validating configuration")?;

    let request = args.request(&config.defaults);
    let handler = RenderCaptureHandler::new(CdpLauncher, config);

    if args.response {
        let response = match handler.render(request).await {
            Ok(result) => ProxyResponse::image(&result),
            Err(e) => ProxyResponse::error(&e),
        };
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    let result = handler.render(request).await.context("rendering globe")?;
    let output = args
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from(format!("globe.{}", result.format.extension())));
    std::fs::write(&output, &result.image_bytes).with_context(|| format!("writing {}", output.display()))?;
    println!("Wrote {} ({} bytes)", output.display(), result.image_bytes.len());
    Ok(())
}
