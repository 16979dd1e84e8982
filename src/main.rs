//! Companion Bot — service entry point.
//!
//! Startup sequence:
//!   1. Load .env (if present)
//!   2. Load config
//!   3. Resolve effective log level (CLI `-v` flags > env > config)
//!   4. Init logger once
//!   5. Build the workflow provider, knowledge uploader and shared state
//!   6. Spawn Ctrl-C → shutdown signal watcher
//!   7. Start the cron service and auto companion (with `--auto`)
//!   8. Run comms channels until shutdown
//!   9. Cancel token + join background tasks

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use companion_bot::config::{self, Config};
use companion_bot::error::AppError;
use companion_bot::llm::providers;
use companion_bot::logger;
use companion_bot::subsystems::comms::{self, CommsState, EVENT_CAPACITY};
use companion_bot::subsystems::companion::CompanionServices;
use companion_bot::subsystems::knowledge::KnowledgeBase;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), AppError> {
    // Load .env if present; the file is optional.
    let _ = dotenvy::dotenv();

    let args = parse_cli_args();

    let mut config = config::load(args.config_path.as_deref())?;

    // Without -i the console stays off (daemon-safe default).
    if args.interactive {
        config.comms.pty.enabled = true;
    }

    let effective_log_level = args.log_level.unwrap_or(config.log_level.as_str());
    let force_cli_level = args.log_level.is_some();

    std::fs::create_dir_all(&config.work_dir).map_err(|e| {
        AppError::Config(format!("cannot create work_dir {}: {e}", config.work_dir.display()))
    })?;

    logger::init(effective_log_level, force_cli_level, config.log_file.as_deref())?;

    info!(
        bot_name = %config.bot_name,
        work_dir = %config.work_dir.display(),
        configured_log_level = %config.log_level,
        effective_log_level = %effective_log_level,
        interactive = %args.interactive,
        auto = %args.auto,
        "config loaded"
    );

    let llm = providers::build(&config.llm, config.llm_api_key.clone())
        .map_err(|e| AppError::Config(e.to_string()))?;
    let knowledge = KnowledgeBase::from_config(&config)?;
    if !knowledge.is_enabled() {
        info!("knowledge base upload disabled");
    }
    let services = CompanionServices::new(&config, llm, knowledge);

    let (event_tx, event_rx) = mpsc::channel(EVENT_CAPACITY);
    let state = Arc::new(CommsState::new(&config, services, event_tx));

    // Ctrl-C cancels the shared token; every task watches it.
    let shutdown = CancellationToken::new();

    let ctrlc_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("ctrl-c received, shutting down");
            ctrlc_token.cancel();
        }
    });

    let auto_handle = if args.auto { start_auto(&config, state.clone(), shutdown.clone()).await } else { None };

    print_startup_summary(&config, &args);

    let console = config.comms_pty_should_load();
    let comms = comms::start(&config, state, event_rx, shutdown.clone());
    if let Err(e) = comms.join().await {
        warn!("comms exited with error: {e}");
    }

    // Headless auto mode keeps running until Ctrl-C.
    if args.auto && !console {
        shutdown.cancelled().await;
    }

    // Console EOF ends the run too; make sure everything else stops.
    shutdown.cancel();

    if let Some(handle) = auto_handle {
        handle.await.ok();
    }

    if args.interactive {
        use std::io::Write as _;
        println!("\n再见啦~");
        let _ = std::io::stdout().flush();
    }

    Ok(())
}

#[cfg(feature = "subsystem-cron")]
async fn start_auto(
    config: &Config,
    state: Arc<CommsState>,
    shutdown: CancellationToken,
) -> Option<tokio::task::JoinHandle<()>> {
    use companion_bot::subsystems::cron::{self, auto::AutoCompanion};

    // Scheduled messages need somebody to speak as.
    state.ensure_companion().await;

    let (cron, events) = cron::start(shutdown.clone());
    let auto = AutoCompanion::new(state, cron, config.cron.clone());
    if let Err(e) = auto.register().await {
        warn!("auto companion disabled: {e}");
        return None;
    }
    Some(tokio::spawn(auto.run(events, shutdown)))
}

#[cfg(not(feature = "subsystem-cron"))]
async fn start_auto(
    _config: &Config,
    _state: Arc<CommsState>,
    _shutdown: CancellationToken,
) -> Option<tokio::task::JoinHandle<()>> {
    warn!("--auto requested but the cron subsystem is not compiled in");
    None
}

fn print_startup_summary(config: &Config, args: &CliArgs) {
    let on_off = |b: bool| if b { "enabled" } else { "disabled" };
    let http_line = if config.comms_http_should_load() {
        config.comms.http.bind.clone()
    } else {
        "disabled".to_string()
    };

    println!("┌─ {} ─ pid {}", config.bot_name, std::process::id());
    println!("│ companion : {} ({})", config.companion.name, config.companion.style_type);
    println!("│ workflow  : {}", config.llm.provider);
    println!("│ console   : {}", on_off(config.comms_pty_should_load()));
    println!("│ http      : {http_line}");
    println!("│ auto      : {}", on_off(args.auto));
    println!("│ work_dir  : {}", config.work_dir.display());
    println!("└─");
}

struct CliArgs {
    log_level: Option<&'static str>,
    interactive: bool,
    auto: bool,
    config_path: Option<String>,
}

fn parse_cli_args() -> CliArgs {
    let mut verbosity = 0u8;
    let mut interactive = false;
    let mut auto = false;
    let mut config_path = None;

    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        if arg == "--" {
            break;
        }

        match arg.as_str() {
            "-h" | "--help" => {
                println!("Usage: companion-bot [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -h, --help                 Print help");
                println!("  -i, --interactive          Run the console chat");
                println!("  -a, --auto                 Run the scheduled auto companion");
                println!("  -f, --config <PATH>        Path to configuration file (default: config/default.toml)");
                println!("  -v, -vv, -vvv, -vvvv       Increase logging verbosity");
                std::process::exit(0);
            }
            "-i" | "--interactive" => interactive = true,
            "-a" | "--auto" => auto = true,
            "-f" | "--config" => {
                if let Some(path) = iter.next() {
                    config_path = Some(path);
                } else {
                    eprintln!("error: -f/--config requires a path argument");
                    std::process::exit(1);
                }
            }
            "--verbose" => verbosity = verbosity.saturating_add(1),
            a if a.starts_with('-') && a.len() > 1 && a.chars().skip(1).all(|c| c == 'v') => {
                verbosity = verbosity.saturating_add((a.len() - 1) as u8);
            }
            _ => {}
        }
    }

    // -v → warn, -vv → info, -vvv → debug, -vvvv+ → trace
    let log_level = match verbosity {
        0 => None,
        1 => Some("warn"),
        2 => Some("info"),
        3 => Some("debug"),
        _ => Some("trace"),
    };

    CliArgs { log_level, interactive, auto, config_path }
}
