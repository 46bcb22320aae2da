mod counter;
mod info;
mod server;
mod service;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use brat_core::BratConfig;
use brat_web::PlaywrightLauncher;

use crate::counter::HitCounter;
use crate::server::AppState;
use crate::service::RenderService;

#[derive(Parser)]
#[command(
    name = "brat",
    version,
    about = "Brat - render text overlays as images and word-by-word videos"
)]
struct Cli {
    /// Path to the config file (missing file means defaults)
    #[arg(long, global = true, default_value = "brat.config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server
    Serve {
        /// Bind address (overrides the config file)
        #[arg(long)]
        host: Option<String>,

        /// Port (overrides the config file and PORT)
        #[arg(long)]
        port: Option<u16>,
    },

    /// Render text to a PNG once and exit
    Image {
        #[arg()]
        text: String,

        #[arg(short, long, default_value = "brat.png")]
        output: PathBuf,
    },

    /// Render text to a reveal video once and exit
    Video {
        #[arg()]
        text: String,

        #[arg(short, long, default_value = "brat.mp4")]
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = BratConfig::load_or_default(&cli.config)
        .with_context(|| format!("failed to load config {}", cli.config.display()))?;
    brat_core::logging::init_logging(&config.logging);

    match cli.command {
        Commands::Serve { host, port } => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            run_async(cmd_serve(config))
        }
        Commands::Image { text, output } => run_async(cmd_image(config, text, output)),
        Commands::Video { text, output } => run_async(cmd_video(config, text, output)),
    }
}

fn run_async<F>(future: F) -> Result<()>
where
    F: std::future::Future<Output = Result<()>>,
{
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to initialize async runtime")?;
    runtime.block_on(future)
}

fn build_service(config: &BratConfig) -> Result<Arc<RenderService>> {
    let launcher = Arc::new(PlaywrightLauncher::from_config(&config.render));
    let service = RenderService::new(config, launcher).context("failed to set up renderer")?;
    Ok(Arc::new(service))
}

async fn cmd_serve(config: BratConfig) -> Result<()> {
    let service = build_service(&config)?;
    if !service.encoder().is_available().await {
        tracing::warn!(
            binary = %config.video.ffmpeg_binary,
            "ffmpeg not found, /bratvid requests will fail"
        );
    }

    let state = AppState {
        service: service.clone(),
        counter: HitCounter::new(&config.counter),
    };
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(addr = %addr, target = %config.render.target, "brat server listening");

    let served = server::serve(listener, state, server::shutdown_signal()).await;
    service.shutdown().await;
    served.context("server error")?;
    tracing::info!("brat server stopped");
    Ok(())
}

async fn cmd_image(config: BratConfig, text: String, output: PathBuf) -> Result<()> {
    let start = Instant::now();
    let service = build_service(&config)?;
    let rendered = service.render_image(&text).await;
    service.shutdown().await;

    let png = rendered.context("image render failed")?;
    tokio::fs::write(&output, &png)
        .await
        .with_context(|| format!("failed to write {}", output.display()))?;
    println!(
        "wrote {} ({} bytes) in {:.2}s",
        output.display(),
        png.len(),
        start.elapsed().as_secs_f64()
    );
    Ok(())
}

async fn cmd_video(config: BratConfig, text: String, output: PathBuf) -> Result<()> {
    let start = Instant::now();
    let service = build_service(&config)?;
    let rendered = service.render_video(&text).await;
    service.shutdown().await;

    let artifact = rendered.context("video render failed")?;
    tokio::fs::copy(&artifact.path, &output)
        .await
        .with_context(|| format!("failed to write {}", output.display()))?;
    println!(
        "wrote {} ({} frames, {:.1}s of video) in {:.2}s",
        output.display(),
        artifact.frames,
        artifact.duration_secs,
        start.elapsed().as_secs_f64()
    );
    artifact.workdir.remove().await;
    Ok(())
}
