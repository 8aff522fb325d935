use anyhow::{anyhow, Result};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;

use camfleet::{
    Announce, CalibrationBoard, CoordinatorHandle, DetachedBackend, EventBus, EventBusError,
    EventFilter, EventReceiver, Coordinator, FleetConfig, PictureMessage, QuadcopterDescriptor,
    RawFrameDecoder,
};

#[derive(Parser, Debug)]
#[command(name = "camfleet")]
#[command(about = "Registry and calibration coordinator for a fleet of camera modules")]
#[command(version)]
#[command(long_about = "Assigns ids to announcing modules, tracks every camera module and \
drives calibration sessions across the fleet. Inbound messages are read as JSON lines \
from stdin and every outbound event is written as a JSON line to stdout.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "camfleet.toml", help = "Path to TOML configuration file")]
    config: String,

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
    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,

    /// Also write logs to this file
    #[arg(long, value_name = "PATH", help = "Write logs to a file in addition to stderr")]
    log_file: Option<String>,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration file and exit without starting the coordinator")]
    validate_config: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,
}

/// One line of input
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum InboundMessage {
    Announce(Announce),
    Picture(PictureMessage),
    InitializeCameras {
        quadcopters: Vec<QuadcopterDescriptor>,
    },
    PictureSending {
        camera_id: u32,
        active: bool,
    },
    StartCalibration {
        #[serde(default)]
        board: Option<CalibrationBoard>,
    },
    TakeCalibrationPictures,
    CalculateCalibration,
    DeleteCalibration {
        camera_id: u32,
    },
    RunCalibration {
        #[serde(default)]
        board: Option<CalibrationBoard>,
    },
    Snapshot,
}

#[derive(Serialize)]
struct Reply<'a, T> {
    reply: &'a str,
    result: T,
}

#[derive(Serialize)]
struct ErrorReply<'a> {
    reply: &'a str,
    error: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config {
        print_default_config()?;
        return Ok(());
    }

    let _log_guard = init_logging(&args)?;

    info!("Starting camfleet v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    let config = match FleetConfig::load_from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        if args.validate_config {
            eprintln!("✗ Configuration validation failed: {}", e);
            std::process::exit(1);
        }
        return Err(e.into());
    }
    if args.validate_config {
        println!("✓ Configuration is valid");
        return Ok(());
    }

    let bus = if config.bus.debug_logging {
        EventBus::with_debug_logging(config.bus.capacity)
    } else {
        EventBus::new(config.bus.capacity)
    };
    let printer = tokio::spawn(print_events(EventReceiver::new(
        bus.subscribe(),
        EventFilter::All,
        "stdout".to_string(),
    )));

    let (handle, coordinator) = Coordinator::spawn(
        &config,
        Arc::new(RawFrameDecoder::from(&config.picture)),
        Arc::new(DetachedBackend),
        bus.clone(),
    );
    drop(bus);

    let default_board = CalibrationBoard::from(&config.calibration.board);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Received Ctrl-C, shutting down");
                break;
            }
            line = lines.next_line() => match line? {
                Some(line) if line.trim().is_empty() => continue,
                Some(line) => match serde_json::from_str::<InboundMessage>(&line) {
                    Ok(message) => dispatch(&handle, message, default_board).await,
                    Err(e) => warn!("Ignoring malformed input line: {}", e),
                },
                None => {
                    info!("Input closed, shutting down");
                    break;
                }
            }
        }
    }

    if let Err(e) = handle.shutdown().await {
        debug!("Coordinator already stopped: {}", e);
    }
    coordinator.await?;
    printer.await?;

    info!("camfleet stopped");
    Ok(())
}

async fn dispatch(handle: &CoordinatorHandle, message: InboundMessage, default_board: CalibrationBoard) {
    match message {
        InboundMessage::Announce(announce) => {
            respond("announce", handle.announce(announce).await);
        }
        InboundMessage::Picture(picture) => {
            if let Err(e) = handle.deliver_picture(picture).await {
                warn!("Picture not delivered: {}", e);
            }
        }
        InboundMessage::InitializeCameras { quadcopters } => {
            let quadcopters: BTreeMap<u32, QuadcopterDescriptor> = quadcopters
                .into_iter()
                .map(|quadcopter| (quadcopter.id, quadcopter))
                .collect();
            respond("initialize_cameras", handle.initialize_cameras(quadcopters).await);
        }
        InboundMessage::PictureSending { camera_id, active } => {
            respond(
                "picture_sending",
                handle.set_picture_sending(camera_id, active).await,
            );
        }
        InboundMessage::StartCalibration { board } => {
            respond(
                "start_calibration",
                handle
                    .start_calibration(board.unwrap_or(default_board))
                    .await,
            );
        }
        InboundMessage::TakeCalibrationPictures => {
            respond(
                "take_calibration_pictures",
                handle.take_calibration_pictures().await,
            );
        }
        InboundMessage::CalculateCalibration => {
            respond(
                "calculate_calibration",
                handle.calculate_calibration().await,
            );
        }
        InboundMessage::DeleteCalibration { camera_id } => {
            respond(
                "delete_calibration",
                handle.delete_calibration(camera_id).await,
            );
        }
        InboundMessage::RunCalibration { board } => {
            // Runs in the background so pictures keep flowing in meanwhile
            let handle = handle.clone();
            let board = board.unwrap_or(default_board);
            tokio::spawn(async move {
                let (deadline, poll_interval) = handle.calibration_timing();
                respond(
                    "run_calibration",
                    handle.run_calibration(board, deadline, poll_interval).await,
                );
            });
        }
        InboundMessage::Snapshot => {
            respond("snapshot", handle.snapshot().await);
        }
    }
}

fn respond<T: Serialize>(request: &str, result: camfleet::Result<T>) {
    let line = match result {
        Ok(result) => serde_json::to_string(&Reply {
            reply: request,
            result,
        }),
        Err(e) => {
            warn!("Request {} failed: {}", request, e);
            serde_json::to_string(&ErrorReply {
                reply: request,
                error: e.to_string(),
            })
        }
    };
    match line {
        Ok(line) => println!("{}", line),
        Err(e) => error!("Failed to encode reply to {}: {}", request, e),
    }
}

async fn print_events(mut receiver: EventReceiver) {
    loop {
        match receiver.recv().await {
            Ok(event) => match serde_json::to_string(&event) {
                Ok(line) => println!("{}", line),
                Err(e) => error!("Failed to encode event {}: {}", event.event_type(), e),
            },
            Err(EventBusError::Lagged { skipped }) => {
                warn!("Event output fell behind, {} events lost", skipped);
            }
            Err(_) => break,
        }
    }
}

fn init_logging(args: &Args) -> Result<Option<WorkerGuard>> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

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
        .unwrap_or_else(|_| EnvFilter::new(format!("camfleet={}", log_level)));

    // stdout carries the event stream, so logs go to stderr
    let fmt_layer = match args.log_format.as_deref() {
        Some("json") => fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        Some("compact") => fmt::layer()
            .compact()
            .with_writer(std::io::stderr)
            .with_target(false)
            .boxed(),
        Some("pretty") | None => fmt::layer()
            .pretty()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_ids(args.debug)
            .with_file(args.debug)
            .with_line_number(args.debug)
            .boxed(),
        Some(format) => {
            eprintln!("Warning: Unknown log format '{}', using default", format);
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .boxed()
        }
    };

    let (file_layer, guard) = match args.log_file.as_deref() {
        Some(log_file) => {
            let path = Path::new(log_file);
            let file_name = path
                .file_name()
                .ok_or_else(|| anyhow!("Invalid log file path: {}", log_file))?;
            let directory = path
                .parent()
                .filter(|parent| !parent.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));

            let (writer, guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::never(directory, file_name));
            let layer = fmt::layer().with_ansi(false).with_writer(writer).boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(file_layer)
        .with(env_filter)
        .init();

    Ok(guard)
}

/// Print default configuration in TOML format
fn print_default_config() -> Result<()> {
    println!("# camfleet configuration file");
    println!("# Every key can be overridden with CAMFLEET_<SECTION>__<KEY> environment variables");
    println!();
    println!("{}", toml::to_string_pretty(&FleetConfig::default())?);
    Ok(())
}
