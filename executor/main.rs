#![forbid(unsafe_code)]

//! `farside-executor`: evaluates requests from a farside host.
//!
//! Reads one JSON request per line on stdin and writes one JSON response per
//! line on stdout. Logs go to stderr, which the host never parses.

use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use farside::executor::{serve, Dispatcher};
use farside::protocol::codec::MAX_LINE_BYTES;
use farside::runtime::{Runtime, DEFAULT_MAX_CALL_DEPTH};
use farside::{BridgeError, Result};

/// Stack reserved for the evaluation thread.
const EVAL_STACK_BYTES: usize = 256 * 1024 * 1024;

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "farside-executor", about = "farside request executor", version, long_about = None)]
struct Cli {
    /// Maximum depth of nested calls inside evaluated code.
    #[arg(long, default_value_t = DEFAULT_MAX_CALL_DEPTH)]
    max_call_depth: usize,

    /// Maximum length of one request line in bytes.
    #[arg(long, default_value_t = MAX_LINE_BYTES)]
    max_line_bytes: usize,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!(max_call_depth = args.max_call_depth, "farside-executor starting");

    // Syntax trees are not `Send`, so everything runs on one thread. Evaluation
    // recurses on the native stack, which must fit `max_call_depth` frames.
    let worker = std::thread::Builder::new()
        .name("farside-eval".into())
        .stack_size(EVAL_STACK_BYTES)
        .spawn(move || {
            tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .map_err(|err| BridgeError::Config(format!("failed to build tokio runtime: {err}")))?
                .block_on(run(args))
        })
        .map_err(|err| BridgeError::Config(format!("failed to start evaluation thread: {err}")))?;

    worker
        .join()
        .map_err(|_| BridgeError::Config("evaluation thread panicked".into()))?
}

async fn run(args: Cli) -> Result<()> {
    let ct = CancellationToken::new();
    let signal_ct = ct.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("shutdown signal received");
        signal_ct.cancel();
    });

    let mut dispatcher = Dispatcher::new(Runtime::with_max_call_depth(args.max_call_depth));
    let summary = serve(
        tokio::io::stdin(),
        tokio::io::stdout(),
        &mut dispatcher,
        args.max_line_bytes,
        ct,
    )
    .await?;

    info!(
        handled = summary.handled,
        noise = summary.noise,
        retained = dispatcher.table().len(),
        "farside-executor shut down"
    );
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // Stdout carries protocol packets only.
    let subscriber = fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| BridgeError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| BridgeError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
