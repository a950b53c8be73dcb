#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::doc_markdown, clippy::multiple_crate_versions)]

use std::{
    fs::File,
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use anyhow::Context;
use clap::Parser;
use sysinfo::Pid;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[cfg(feature = "openvr")]
use vrknock::{backend::openvr::OpenVrCompositor, graphics::SoftwareGpu};
use vrknock::{
    backend::{headless::HeadlessCompositor, BackendError, Compositor},
    config::GeneralConfig,
    notifications::NotificationBitmap,
    overlays::notification::NotificationOverlay,
    service::resolve_host,
    KnockService, OverlayRegistry,
};

/// Pops up "knock knock" notifications inside VR
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Do not connect to a VR runtime; keep overlays in memory
    #[arg(long)]
    headless: bool,

    /// Terminate a VRKnock instance that is already running
    #[arg(long)]
    replace: bool,

    /// Log file, instead of $VRKNOCK_LOGFILE or /tmp/vrknock.log
    #[arg(short, long, value_name = "FILE_PATH")]
    log_to: Option<PathBuf>,

    /// Send one knock with this message right after startup
    #[arg(short, long, value_name = "MESSAGE")]
    knock: Option<String>,

    /// Print the status reply as JSON after startup
    #[arg(long)]
    status: bool,

    /// Exit after the startup actions instead of waiting for Ctrl+C
    #[arg(long)]
    once: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let Some(_pid_file) = PidFile::acquire(args.replace) else {
        println!("VRKnock is already running. Pass --replace to take over.");
        return Ok(());
    };

    logging_init(open_log_file(args.log_to.clone()));

    log::info!(
        "Welcome to {} version {}!",
        env!("CARGO_PKG_NAME"),
        env!("KNOCK_BUILD"),
    );
    log::info!("It is {}.", chrono::Local::now().format("%c"));

    let running = Arc::new(AtomicBool::new(true));
    let _ = ctrlc::set_handler({
        let running = running.clone();
        move || {
            running.store(false, Ordering::Relaxed);
        }
    });

    if let Err(e) = run(&running, &args) {
        log::error!("{e:?}");
        return Err(e.into());
    }
    Ok(())
}

fn headless_compositor() -> Arc<dyn Compositor> {
    log::info!("Using headless compositor");
    Arc::new(HeadlessCompositor::new())
}

#[cfg(feature = "openvr")]
fn runtime_compositor(headless: bool) -> Arc<dyn Compositor> {
    if headless {
        return headless_compositor();
    }
    Arc::new(OpenVrCompositor::new(Arc::new(SoftwareGpu::new())))
}

#[cfg(not(feature = "openvr"))]
fn runtime_compositor(_headless: bool) -> Arc<dyn Compositor> {
    headless_compositor()
}

fn start_registry(
    config: &GeneralConfig,
    headless: bool,
) -> Result<Arc<OverlayRegistry>, BackendError> {
    let registry = Arc::new(OverlayRegistry::new(
        runtime_compositor(headless),
        config.registry_options(),
    ));
    match registry.init(config.application_type) {
        Err(BackendError::Init { subsystem, reason }) if !headless && cfg!(feature = "openvr") => {
            log::warn!("VR runtime unavailable ({subsystem}: {reason}), falling back to headless");
            let registry = Arc::new(OverlayRegistry::new(
                headless_compositor(),
                config.registry_options(),
            ));
            registry.init(config.application_type)?;
            Ok(registry)
        }
        Err(e) => Err(e),
        Ok(()) => Ok(registry),
    }
}

fn run(running: &AtomicBool, args: &Args) -> anyhow::Result<()> {
    let config = GeneralConfig::load_from_disk()?;

    let registry =
        start_registry(&config, args.headless).context("Could not connect to the VR runtime")?;

    let overlay = registry.register(Box::new(NotificationOverlay::new(
        config.overlay_name.as_str(),
        config.overlay_width,
    )))?;

    let icon = config
        .notification_icon
        .as_deref()
        .and_then(|path| match NotificationBitmap::load(path) {
            Ok(icon) => Some(icon),
            Err(e) => {
                log::warn!("{e:?}");
                None
            }
        });

    let service = KnockService::new(
        registry.clone(),
        overlay,
        resolve_host(config.host_name.as_deref()),
    )
    .with_notification(config.notification_type, config.notification_style)
    .with_icon(icon)
    .with_default_message(config.default_message.as_str());

    if let Some(message) = args.knock.as_deref() {
        let reply = service.trigger_knock("cli", Some(message));
        println!("{}", serde_json::to_string(&reply)?);
    }

    if args.status {
        println!("{}", serde_json::to_string(&service.get_status())?);
    }

    if !args.once {
        log::info!("Ready. Press Ctrl+C to exit.");
        while running.load(Ordering::Relaxed) && registry.is_running() {
            std::thread::sleep(Duration::from_millis(100));
        }
    }

    registry.stop();
    Ok(())
}

fn open_log_file(requested: Option<PathBuf>) -> Option<File> {
    let path = requested
        .or_else(|| std::env::var_os("VRKNOCK_LOGFILE").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("/tmp/vrknock.log"));

    match File::create(&path) {
        Ok(file) => {
            println!("Logging to {}", path.display());
            Some(file)
        }
        Err(e) => {
            println!("Not logging to {}: {e}", path.display());
            None
        }
    }
}

/// Stderr always gets output; `file` additionally gets a plain copy with
/// source locations.
fn logging_init(file: Option<File>) {
    let file_layer = file.map(|writer| {
        fmt::layer()
            .with_file(true)
            .with_line_number(true)
            .with_writer(writer)
            .with_ansi(false)
    });

    tracing_subscriber::registry()
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .with(fmt::layer().compact().with_writer(std::io::stderr))
        .with(file_layer)
        .init();

    log_panics::init();
}

/// Pid file in the runtime dir marking the live instance. Removed on drop.
struct PidFile {
    path: PathBuf,
}

impl PidFile {
    /// Returns `None` if another instance is alive and `replace` is unset.
    fn acquire(replace: bool) -> Option<Self> {
        let path = std::env::var_os("XDG_RUNTIME_DIR")
            .map_or_else(std::env::temp_dir, PathBuf::from)
            .join("vrknock.pid");

        if let Some(pid) = Self::read_pid(&path) {
            let mut system = sysinfo::System::new();
            system.refresh_processes(sysinfo::ProcessesToUpdate::Some(&[pid]), false);
            if let Some(other) = system.process(pid) {
                if !replace {
                    return None;
                }
                println!("Stopping previous instance (pid {pid})");
                other.kill_with(sysinfo::Signal::Term);
                other.wait();
            }
        }

        if let Err(e) = std::fs::write(&path, std::process::id().to_string()) {
            println!("Failed to write pid file {}: {e}", path.display());
        }
        Some(Self { path })
    }

    fn read_pid(path: &std::path::Path) -> Option<Pid> {
        let contents = std::fs::read_to_string(path).ok()?;
        contents.trim().parse::<u32>().ok().map(Pid::from_u32)
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}
