//! OSC console gateway
//!
//! Remote control and feedback for a digital mixing console over OSC,
//! with an HTTP API and an interactive console on top.

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use osc_console_gw::api::{self, ApiState};
use osc_console_gw::cli;
use osc_console_gw::config::ConfigWatcher;
use osc_console_gw::session::SessionController;

/// OSC Console Gateway - remote control and feedback for mixing consoles
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: String,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Also write logs to daily files in this directory
    #[arg(long, env = "LOG_DIR")]
    log_dir: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,

    /// Override the HTTP API port
    #[arg(long)]
    api_port: Option<u16>,

    /// Start the interactive console
    #[arg(long)]
    repl: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    let _log_guard = init_logging(&args)?;

    info!("Starting OSC console gateway v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    let (mut config_watcher, initial_config) = ConfigWatcher::new(args.config.clone()).await?;
    info!("Configuration loaded successfully with hot-reload enabled");

    let controller = SessionController::new();
    if let Err(e) = controller.init(&initial_config).await {
        warn!("⚠️  Console session not established: {}", e);
    }

    if initial_config.api.enabled {
        let port = args.api_port.unwrap_or(initial_config.api.port);
        let state = ApiState::new(controller.clone());
        tokio::spawn(async move {
            if let Err(e) = api::start_server(state, port).await {
                warn!("HTTP API stopped: {:#}", e);
            }
        });
    }

    let repl = if args.repl {
        let controller = controller.clone();
        Some(tokio::spawn(async move { cli::run_repl(controller).await }))
    } else {
        None
    };
    let repl_done = async {
        match repl {
            Some(task) => {
                if let Ok(Err(e)) = task.await {
                    warn!("Console error: {}", e);
                }
            },
            None => std::future::pending().await,
        }
    };
    tokio::pin!(repl_done);

    loop {
        tokio::select! {
            Some(new_config) = config_watcher.next_config() => {
                info!("📝 Configuration file changed, reloading...");
                match controller.reload(&new_config).await {
                    Ok(true) => info!("✅ Session rebuilt for {}", new_config.connection.host),
                    Ok(false) => {},
                    Err(e) => warn!("⚠️  Session rebuild failed: {}", e),
                }
            }
            _ = &mut repl_done => {
                info!("Console closed");
                break;
            }
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    warn!("Failed to listen for CTRL+C: {}", e);
                }
                info!("Shutdown signal received");
                break;
            }
        }
    }

    controller.shutdown().await;
    info!("OSC console gateway shutdown complete");
    Ok(())
}

fn init_logging(args: &Args) -> Result<Option<WorkerGuard>> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&args.log_level));

    let stdout = if args.json_logs {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_thread_ids(false)
            .with_thread_names(false)
            .boxed()
    };

    let (file, guard) = match &args.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "osc-console-gw.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        },
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout)
        .with(file)
        .init();

    Ok(guard)
}
