use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

use xtool_preview::{
    backend_from_config, BuildStatus, BuildStatusBroadcaster, CaptureTool, FileWatcher,
    FrameProducer, PreviewConfig, PreviewServer,
};

#[derive(Parser, Debug)]
#[command(name = "xtool-preview")]
#[command(about = "Mirror a tethered device's screen to the browser")]
#[command(version)]
#[command(
    long_about = "Serves a live MJPEG/WebSocket preview of a tethered device's \
screen, wrapped in a device-shaped HTML viewer. Built for development hosts \
without native mirroring; pairs with a build tool that triggers \
rebuild-reinstall-refresh cycles on source changes."
)]
struct Args {
    /// Path to configuration file
    #[arg(
        short,
        long,
        default_value = "xtool-preview.toml",
        help = "Path to TOML configuration file"
    )]
    config: String,

    /// HTTP port to serve the preview on
    #[arg(long, value_parser = clap::value_parser!(u16).range(1024..))]
    port: Option<u16>,

    /// Capture rate in frames per second
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..=30))]
    fps: Option<u32>,

    /// Screenshot tool to use
    #[arg(long, value_enum)]
    capture_tool: Option<CaptureTool>,

    /// Capture through the in-process device RPC backend
    #[arg(long)]
    use_process_capture: bool,

    /// Do not open the viewer in a browser
    #[arg(long)]
    no_browser: bool,

    /// Target a specific device by UDID
    #[arg(long)]
    udid: Option<String>,

    /// Device name shown in the viewer
    #[arg(long)]
    device_name: Option<String>,

    /// Product identifier (e.g. iPhone15,2) used for the frame skin
    #[arg(long)]
    device_model: Option<String>,

    /// Watch a source directory and flip the build status on changes
    #[arg(long, value_name = "DIR")]
    watch: Option<PathBuf>,

    /// Enable debug logging (most verbose)
    #[arg(short, long, help = "Enable debug level logging")]
    debug: bool,

    /// Enable verbose logging (info level)
    #[arg(short, long, help = "Enable verbose info level logging")]
    verbose: bool,

    /// Enable quiet mode (errors only)
    #[arg(short, long, help = "Enable quiet mode - only log errors")]
    quiet: bool,

    /// Override log format (json, pretty, compact)
    #[arg(long, value_name = "FORMAT")]
    log_format: Option<String>,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration and exit without serving")]
    validate_config: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config {
        print_default_config();
        return Ok(());
    }

    init_logging(&args)?;

    info!("Starting xtool-preview v{}", env!("CARGO_PKG_VERSION"));

    let mut config = match PreviewConfig::load_from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };
    apply_overrides(&mut config, &args);

    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        eprintln!("✗ {}", e);
        std::process::exit(1);
    }

    if args.validate_config {
        println!("✓ Configuration is valid");
        return Ok(());
    }

    let backend = backend_from_config(&config)?;
    let producer = Arc::new(FrameProducer::new(
        backend,
        config.capture.fps,
        config.capture.jpeg_quality,
    ));
    producer.start().await.map_err(|e| {
        error!("Capture backend failed to start: {}", e);
        e
    })?;

    let status = Arc::new(BuildStatusBroadcaster::new());

    let mut watcher = match &args.watch {
        Some(dir) => {
            let mut watcher = FileWatcher::new(dir.clone(), &config.watch);
            let status_for_watcher = Arc::clone(&status);
            watcher.start(move || {
                info!("source change detected");
                status_for_watcher.update(BuildStatus::Building, "source change detected");
            })?;
            info!("watching {} for source changes", dir.display());
            Some(watcher)
        }
        None => None,
    };

    let server = PreviewServer::new(&config, Arc::clone(&producer), Arc::clone(&status));

    if !args.no_browser {
        open_browser(&config);
    }

    let result = server.start().await;

    if let Some(watcher) = watcher.as_mut() {
        watcher.stop().await;
    }
    producer.stop().await;

    match result {
        Ok(()) => {
            info!("preview stopped");
            Ok(())
        }
        Err(e) => {
            error!("Server error: {}", e);
            Err(e.into())
        }
    }
}

fn apply_overrides(config: &mut PreviewConfig, args: &Args) {
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(fps) = args.fps {
        config.capture.fps = fps;
    }
    if let Some(tool) = args.capture_tool {
        config.capture.tool = tool;
    }
    if args.use_process_capture {
        config.capture.use_process_capture = true;
    }
    if let Some(udid) = &args.udid {
        config.device.udid = udid.clone();
    }
    if let Some(name) = &args.device_name {
        config.device.name = name.clone();
    }
    if let Some(model) = &args.device_model {
        config.device.model = model.clone();
    }
}

/// Best-effort browser launch; the URL is logged either way.
fn open_browser(config: &PreviewConfig) {
    let host = if config.server.host == "0.0.0.0" {
        "127.0.0.1"
    } else {
        &config.server.host
    };
    let url = format!("http://{}:{}/", host, config.server.port);
    info!("viewer: {}", url);

    #[cfg(target_os = "macos")]
    let launcher = "open";
    #[cfg(not(target_os = "macos"))]
    let launcher = "xdg-open";

    if let Err(e) = std::process::Command::new(launcher)
        .arg(&url)
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .spawn()
    {
        warn!("could not open browser ({}); open {} manually", e, url);
    }
}

fn init_logging(args: &Args) -> Result<()> {
    use tracing_subscriber::{
        fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer,
    };

    let log_level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else if args.quiet {
        "error"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("xtool_preview={}", log_level)));

    let fmt_layer = match args.log_format.as_deref() {
        Some("json") => fmt::layer()
            .json()
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        Some("compact") => fmt::layer()
            .compact()
            .with_target(false)
            .boxed(),
        Some("pretty") | None => fmt::layer()
            .pretty()
            .with_target(true)
            .with_file(args.debug)
            .with_line_number(args.debug)
            .boxed(),
        Some(format) => {
            eprintln!("Warning: Unknown log format '{}', using default", format);
            fmt::layer().with_target(true).boxed()
        }
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(env_filter)
        .init();

    Ok(())
}

/// Print default configuration in TOML format
fn print_default_config() {
    println!("# xtool-preview configuration file");
    println!("# These are the built-in defaults; override in TOML or env vars");
    println!();

    let default_config = PreviewConfig::default();
    match toml::to_string_pretty(&default_config) {
        Ok(toml_str) => println!("{}", toml_str),
        Err(e) => eprintln!("Failed to render default config: {}", e),
    }
}
