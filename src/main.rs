//! Multicam capture CLI
//!
//! Starts a preview loop per camera and captures all cameras on demand from
//! a line-based control panel on stdin.

use clap::Parser;
use multicam_capture::{
    camera::{check_device, default_provider, CameraProvider, DeviceLocks, MockCameraProvider},
    capture::{preflight, NoFocusControl, StillCapture},
    metrics::CaptureMetrics,
    orchestrator::{self, Orchestrator},
    panel::{render_batch, render_result, Command, StatusBoard, HELP},
    preview::{PreviewManager, PreviewSettings},
    registry::AppConfig,
    StartupError,
};
use std::io::BufRead;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

#[derive(Debug, Parser)]
#[command(name = "multicam", version, about = "Simultaneous still capture from multiple cameras")]
struct Args {
    /// TOML configuration file; built-in cameras are used without one.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory for captured images (overrides the config file).
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Capture every camera once and exit.
    #[arg(long)]
    once: bool,

    /// Do not start preview loops.
    #[arg(long)]
    no_preview: bool,

    /// Use synthetic cameras instead of hardware.
    #[arg(long)]
    simulate: bool,

    /// Serve Prometheus metrics on this port.
    #[cfg(feature = "metrics")]
    #[arg(long)]
    metrics_port: Option<u16>,
}

fn main() -> ExitCode {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();
    info!("Multicam capture v{}", multicam_capture::VERSION);

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(StartupError::Runtime)
    {
        Ok(runtime) => runtime,
        Err(e) => return fail(&e),
    };

    match runtime.block_on(run(args)) {
        Ok(code) => code,
        Err(e) => fail(&e),
    }
}

fn fail(e: &StartupError) -> ExitCode {
    error!(error = %e, "Startup failed");
    eprintln!("error: {e}");
    ExitCode::FAILURE
}

async fn run(args: Args) -> Result<ExitCode, StartupError> {
    let mut config = match &args.config {
        Some(path) => AppConfig::from_file(path)?,
        None => AppConfig::default(),
    };
    if let Some(dir) = args.output_dir {
        config.output.directory = dir;
    }

    let mut registry = config.registry()?;
    let provider: Arc<dyn CameraProvider> = if args.simulate {
        info!("Simulation mode: synthetic cameras, no external tools");
        config.primary.enabled = false;
        config.fallback.enabled = true;
        Arc::new(MockCameraProvider::new())
    } else {
        preflight(&[config.primary.program.as_str(), config.focus.program.as_str()]).await;
        let (accessible, skipped) = registry.retain_accessible(check_device)?;
        for (camera, reason) in &skipped {
            warn!(camera = %camera.id, device = %camera.device_path, error = %reason, "Camera skipped");
        }
        registry = accessible;
        default_provider()
    };
    let registry = Arc::new(registry);
    info!(cameras = registry.len(), output = %config.output.directory.display(), "Cameras ready");

    let metrics = Arc::new(CaptureMetrics::new()?);
    #[cfg(feature = "metrics")]
    if let Some(port) = args.metrics_port {
        use multicam_capture::metrics::{MetricsServer, MetricsServerConfig};
        let server = MetricsServer::new(MetricsServerConfig::with_port(port), Arc::clone(&metrics));
        tokio::spawn(async move {
            if let Err(e) = server.run().await {
                error!(error = %e, "Metrics server stopped");
            }
        });
    }

    let locks = Arc::new(DeviceLocks::new());
    let mut capture = StillCapture::from_config(&config, Arc::clone(&provider), Arc::clone(&locks))
        .with_metrics(Arc::clone(&metrics));
    if args.simulate {
        capture = capture.with_focus(Arc::new(NoFocusControl));
    }

    let (event_tx, mut event_rx) = orchestrator::channel();
    let orchestrator = Orchestrator::new(Arc::clone(&registry), Arc::new(capture))
        .with_events(event_tx)
        .with_metrics(Arc::clone(&metrics));

    if args.once {
        let batch = orchestrator.capture_all().await;
        print!("{}", render_batch(&batch));
        return Ok(if batch.succeeded() == 0 {
            ExitCode::FAILURE
        } else {
            ExitCode::SUCCESS
        });
    }

    let mut previews = PreviewManager::new(
        provider,
        locks,
        PreviewSettings::from_config(&config.preview),
    )
    .with_metrics(Arc::clone(&metrics));
    if config.preview.enabled && !args.no_preview {
        previews.start(&registry)?;
    }

    let (stop_tx, mut stop_rx) = mpsc::unbounded_channel::<()>();
    ctrlc::set_handler(move || {
        let _ = stop_tx.send(());
    })
    .map_err(|e| StartupError::Signal(e.to_string()))?;

    let mut lines = spawn_stdin_reader();
    let mut board = StatusBoard::new(&registry);
    println!("{HELP}");

    loop {
        tokio::select! {
            _ = stop_rx.recv() => {
                info!("Interrupted, shutting down");
                break;
            }
            Some(event) = event_rx.recv() => board.apply(&event),
            line = lines.recv() => {
                let Some(line) = line else {
                    info!("Input closed, shutting down");
                    break;
                };
                match line.parse::<Command>() {
                    Ok(Command::CaptureAll) => {
                        let batch = orchestrator.capture_all().await;
                        print!("{}", render_batch(&batch));
                    }
                    Ok(Command::CaptureOne(id)) => match orchestrator.capture_one(&id).await {
                        Some(result) => println!("{}", render_result(&result)),
                        None => println!("unknown camera `{id}`"),
                    },
                    Ok(Command::Focus { camera_id, focus }) => {
                        match orchestrator.adjust_focus(&camera_id, focus).await {
                            Ok(()) => println!("{camera_id}: focus {focus}"),
                            Err(e) => println!("{camera_id}: focus not applied: {e}"),
                        }
                    }
                    Ok(Command::Status) => {
                        while let Ok(event) = event_rx.try_recv() {
                            board.apply(&event);
                        }
                        board.update_preview(&previews.stats());
                        print!("{}", board.render());
                    }
                    Ok(Command::Help) => println!("{HELP}"),
                    Ok(Command::Quit) => break,
                    Err(e) => println!("{e}"),
                }
            }
        }
    }

    previews.stop();
    info!("Done");
    Ok(ExitCode::SUCCESS)
}

/// Forwards stdin lines; the channel closes at EOF.
fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}
