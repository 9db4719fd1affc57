//! OpenAI response sensor — daemon entry point.
//!
//! Startup sequence:
//!   1. Load .env (if present)
//!   2. Parse CLI args
//!   3. Load config
//!   4. Init logger (CLI `-v` > RUST_LOG > config)
//!   5. Set up the platform (sensor entity + service registry)
//!   6. Spawn Ctrl-C → shutdown watcher
//!   7. Spawn the state-event drain and the linked-input watcher
//!   8. Run the console until EOF/Ctrl-C, then join everything

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use openai_response::error::AppError;
use openai_response::sensor::StateEvent;
use openai_response::{config, console, logger, platform};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), AppError> {
    // Load .env if present — ignore errors (file is optional).
    let _ = dotenvy::dotenv();

    let args = parse_cli_args();

    let config = config::load(args.config_path.as_deref())?;

    let effective_log_level = args.log_level.unwrap_or(config.log_level.as_str());
    logger::init(effective_log_level)?;

    info!(
        entity = %config.platform.name,
        model = %config.platform.model,
        base_url = %config.remote.base_url,
        log_level = %effective_log_level,
        "config loaded"
    );

    // Shared shutdown token — Ctrl-C cancels it, all tasks watch it.
    let shutdown = CancellationToken::new();

    // Observer channel: every entity mutation lands here as a StateEvent.
    let (event_tx, mut event_rx) = mpsc::channel::<StateEvent>(32);

    let platform = platform::setup(
        &config.platform,
        &config.remote,
        event_tx,
        shutdown.clone(),
    )?;

    info!(services = ?platform.registry.services(), "platform ready");

    // Ctrl-C handler — cancels the token so all tasks shut down.
    let ctrlc_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("ctrl-c received — initiating shutdown");
            ctrlc_token.cancel();
        }
    });

    // State drain: renders every published sensor state into the log. Dies
    // naturally when the sensor task drops its event sender.
    tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            info!(
                entity = %event.entity,
                native_value = event.native_value.map(|s| s.as_str()).unwrap_or("none"),
                model = %event.attributes.model,
                response_len = event.attributes.response_text.len(),
                "sensor state published"
            );
        }
    });

    // Linked input: console lines are observed as input changes and replayed
    // through the service path by the watcher.
    let (input_tx, input_rx) = mpsc::channel::<String>(32);
    let watcher =
        platform::spawn_input_watcher(platform.registry.clone(), input_rx, shutdown.clone());

    if config.console.enabled {
        console::run(input_tx, shutdown.clone()).await?;
    } else {
        drop(input_tx);
        shutdown.cancelled().await;
    }

    // Console EOF (not Ctrl-C) still stops everything.
    shutdown.cancel();

    watcher.await.ok();
    platform.join().await?;

    Ok(())
}

struct CliArgs {
    log_level: Option<&'static str>,
    config_path: Option<String>,
}

fn parse_cli_args() -> CliArgs {
    let mut verbosity = 0u8;
    let mut config_path = None;

    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        if arg == "--" {
            break;
        }

        match arg.as_str() {
            "-h" | "--help" => {
                println!("Usage: openai-response [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -h, --help                 Print help");
                println!("  -f, --config <PATH>        Path to configuration file (default: config/default.toml)");
                println!("  -v, -vv, -vvv              Increase logging verbosity");
                std::process::exit(0);
            }
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

    // Each -v raises verbosity one tier above the config default:
    //   -v    → debug  (flow-level diagnostics: dispatch, state transitions)
    //   -vv+  → trace  (full payload dumps, very verbose)
    let log_level = match verbosity {
        0 => None,
        1 => Some("debug"),
        _ => Some("trace"),
    };

    CliArgs { log_level, config_path }
}
