//! Camera Share CLI
//!
//! Runs the capture flow end to end: open the camera, preview for a few
//! frames, take a photo and deliver it.

use camera_share::{
    app::{report_unhandled, App, UiAction},
    capture::{CameraSession, FacingMode, FileConfig, MediaDevices},
    delivery::{
        DeliveryAdapter, DeliveryMethod, HostBridge, ImageStore, MemoryClipboard, MockBridge,
    },
    metrics::MetricsRegistry,
};
use clap::{Parser, ValueEnum};
use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(name = "camera-share", version, about = "Capture a photo and hand it off")]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Camera to start with (front or back)
    #[arg(short, long)]
    facing: Option<FacingMode>,

    /// Where the photo goes
    #[arg(short, long, value_enum, default_value_t = Method::Auto)]
    method: Method,

    /// Download directory
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Backing file for the local image store
    #[arg(long)]
    store: Option<PathBuf>,

    /// Simulate running inside a messaging host
    #[arg(long)]
    embedded: bool,

    /// Frames to preview before capturing
    #[arg(long, default_value_t = 10)]
    preview_frames: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Method {
    Auto,
    Download,
    Clipboard,
    Bridge,
    Store,
}

impl From<Method> for DeliveryMethod {
    fn from(method: Method) -> Self {
        match method {
            Method::Auto => DeliveryMethod::Auto,
            Method::Download => DeliveryMethod::Download,
            Method::Clipboard => DeliveryMethod::Clipboard,
            Method::Bridge => DeliveryMethod::Bridge,
            Method::Store => DeliveryMethod::Store,
        }
    }
}

fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();
    info!("Camera Share v{}", camera_share::VERSION);

    let mut config = match &cli.config {
        Some(path) => match FileConfig::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Failed to load config: {}", e);
                std::process::exit(1);
            }
        },
        None => FileConfig::default(),
    };
    if let Some(facing) = cli.facing {
        config.capture.facing = facing;
    }
    if let Some(output) = &cli.output {
        config.delivery.download_dir = output.clone();
    }
    if let Some(store) = &cli.store {
        config.storage.path = Some(store.clone());
    }

    #[cfg(feature = "camera")]
    let devices = camera_share::capture::NativeMediaDevices::new();
    #[cfg(not(feature = "camera"))]
    let devices = {
        info!("Using mock camera input");
        camera_share::capture::MockMediaDevices::new()
    };

    if let Err(e) = run(devices, &cli, config) {
        report_unhandled(&*e);
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run<D: MediaDevices>(
    devices: D,
    cli: &Cli,
    config: FileConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let unloading = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&unloading);
    if let Err(e) = ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst)) {
        warn!("Could not install interrupt handler: {}", e);
    }

    let mut delivery = DeliveryAdapter::new(config.delivery.clone())
        .with_clipboard(Box::new(MemoryClipboard::new()));
    delivery = match &config.storage.path {
        Some(path) => delivery.with_store(ImageStore::open(path)?),
        None => delivery.with_store(ImageStore::in_memory()),
    };

    let host = cli.embedded.then(|| Rc::new(RefCell::new(MockBridge::new())));
    let bridge = host
        .as_ref()
        .map(|host| Box::new(Rc::clone(host)) as Box<dyn HostBridge>);

    let facing = config.capture.facing;
    let frame_rate = u64::from(config.capture.frame_rate.unwrap_or(30));
    let frame_interval = Duration::from_millis(1000 / frame_rate);
    let session = CameraSession::new(devices, config.capture);
    let mut app = App::new(session, delivery, bridge, config.bridge)
        .with_metrics(MetricsRegistry::new()?);
    app.setup();

    info!(%facing, "Starting camera");
    app.dispatch(UiAction::Start);
    app.run_pending();
    if !app.session().is_active() {
        app.handle(UiAction::Unload)?;
        return Err("camera did not start".into());
    }

    for frame in 0..cli.preview_frames {
        if unloading.load(Ordering::SeqCst) {
            info!(frame, "Interrupted during preview");
            app.handle(UiAction::Unload)?;
            return Ok(());
        }
        if app.session_mut().check_tracks() {
            return Err("camera disconnected during preview".into());
        }
        std::thread::sleep(frame_interval);
    }

    app.dispatch(UiAction::Capture);
    match (&host, DeliveryMethod::from(cli.method)) {
        // Inside a host the photo leaves through the main button.
        (Some(host), DeliveryMethod::Auto) => {
            app.run_pending();
            host.borrow_mut().click_main_button();
        }
        (_, method) => app.dispatch(UiAction::Deliver(method)),
    }
    app.run_pending();

    for message in app.status_log() {
        println!("[{:?}] {}", message.level, message.text);
    }
    if let Some(outcome) = app.last_outcome() {
        println!("{:?}", outcome);
    }

    app.handle(UiAction::Unload)?;

    if let Some(metrics) = app_metrics(&app) {
        println!("{}", metrics);
    }
    Ok(())
}

fn app_metrics<D: MediaDevices>(app: &App<D>) -> Option<String> {
    let metrics = app.metrics()?;
    match metrics.encode() {
        Ok(text) => Some(text),
        Err(e) => {
            warn!("Failed to encode metrics: {}", e);
            None
        }
    }
}
