//! coelink: CoE telemetry gateway.
//!
//! Receives CoE frames over UDP, keeps the most recent ones and answers
//! operator queries on stdin and, optionally, a telnet port. Changes can be
//! forwarded to an FHEM server.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use coelink::config::GatewayConfig;
use coelink::control::{run_shell, serve_telnet};
use coelink::logging::init_logging;
use coelink::{FhemBridge, Gateway};

#[derive(Parser, Debug)]
#[command(name = "coelink", version, about = "CoE telemetry gateway")]
struct Cli {
    /// YAML configuration file; defaults apply when omitted.
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Enable debug logging (RUST_LOG takes precedence).
    #[arg(short, long)]
    verbose: bool,

    /// Do not read commands from stdin.
    #[arg(long)]
    no_shell: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose).map_err(|e| anyhow::anyhow!("cannot initialise logging: {e}"))?;

    let mut config = match &cli.config {
        Some(path) => GatewayConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => GatewayConfig::default(),
    };
    if cli.no_shell {
        config.control.shell = false;
    }

    let gateway = Arc::new(Gateway::start(config.clone()).await.context("starting gateway")?);
    let cancel = CancellationToken::new();

    if let Some(addr) = config.control.telnet {
        let gateway = Arc::clone(&gateway);
        let prompt = config.control.prompt.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(e) = serve_telnet(gateway, addr, prompt, cancel).await {
                error!("Control server failed: {}", e);
            }
        });
    }

    if let Some(fhem) = config.fhem.clone() {
        tokio::spawn(FhemBridge::new(fhem).run(Arc::clone(&gateway)));
    }

    let shell = config.control.shell.then(|| {
        tokio::spawn(run_shell(Arc::clone(&gateway), config.control.prompt.clone(), cancel.clone()))
    });

    let ingestion_failed = tokio::select! {
        result = wait_for_operator(shell) => {
            result?;
            false
        }
        _ = gateway.stopped() => {
            error!("Ingestion stopped, shutting down");
            true
        }
    };

    cancel.cancel();
    gateway.shutdown();
    match gateway.save() {
        Ok(count) => info!("Saved {} frames to {}", count, config.dump_path.display()),
        Err(e) => error!("Final save failed: {}", e),
    }

    // The stdin reader thread may still be blocked on a read
    std::process::exit(if ingestion_failed { 1 } else { 0 })
}

/// Wait until the shell quits or ctrl-c arrives.
async fn wait_for_operator(shell: Option<JoinHandle<coelink::Result<bool>>>) -> anyhow::Result<()> {
    match shell {
        Some(shell) => {
            tokio::select! {
                result = shell => match result {
                    Ok(Ok(_)) => info!("Shell closed"),
                    Ok(Err(e)) => error!("Shell failed: {}", e),
                    Err(e) => error!("Shell task failed: {}", e),
                },
                signal = tokio::signal::ctrl_c() => {
                    signal.context("waiting for ctrl-c")?;
                    info!("Interrupted");
                }
            }
        }
        None => {
            tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
            info!("Interrupted");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_flags() {
        let cli = Cli::try_parse_from(["coelink", "--config", "gw.yaml", "-v", "--no-shell"])
            .expect("flags should parse");
        assert_eq!(cli.config, Some(PathBuf::from("gw.yaml")));
        assert!(cli.verbose);
        assert!(cli.no_shell);
    }

    #[test]
    fn defaults_without_flags() {
        let cli = Cli::try_parse_from(["coelink"]).expect("no flags should parse");
        assert!(cli.config.is_none());
        assert!(!cli.verbose);
        assert!(!cli.no_shell);
    }
}
