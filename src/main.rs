//! Scatter - TCP relay with traffic mirroring
//!
//! Every inbound connection is relayed to the primary peer; the client's
//! bytes are also copied to each mirror peer, whose replies are discarded.

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;

use scatter::cli::ServeOpts;
use scatter::config::{self, ScatterConfig};
use scatter::logger::{Logger, NoopLogger, TextLogger};
use scatter::Server;

fn main() -> Result<()> {
    let opts = ServeOpts::parse();

    // Choose logger once; zero overhead in hot paths with NoopLogger
    let logger: Arc<dyn Logger> = if opts.quiet {
        Arc::new(NoopLogger)
    } else if let Some(ref p) = opts.log_file {
        Arc::new(
            TextLogger::new(p)
                .with_context(|| format!("Failed to open log file: {}", p.display()))?,
        )
    } else {
        Arc::new(TextLogger::stderr())
    };

    let mut cfg = match opts.config {
        Some(ref p) => config::load(p)
            .with_context(|| format!("load config from {} failed", p.display()))?,
        None => ScatterConfig::default(),
    };
    if let Some(port) = opts.port {
        cfg.port = port;
    }
    if let Some(primary) = opts.primary {
        cfg.remote_addr = primary;
    }
    cfg.scatters.extend(opts.mirrors);
    if cfg.remote_addr.is_empty() {
        anyhow::bail!("primary address required (remote_addr in config or --primary)");
    }

    let mut server = Server::new(cfg.port, &cfg.remote_addr)
        .context("invalid server settings")?
        .with_logger(logger.clone());
    // Mirrors are optional; a bad one is reported and skipped
    for m in &cfg.scatters {
        if let Err(e) = server.add_mirror(m) {
            logger.error("mirror", &e.to_string());
        }
    }

    println!("Starting Scatter relay:");
    println!("  Port:    {}", server.port());
    println!("  Primary: {}", server.primary());
    for m in server.mirrors() {
        println!("  Mirror:  {}", m);
    }

    let server = Arc::new(server);
    let stopper = server.clone();
    ctrlc::set_handler(move || {
        eprintln!("\nInterrupted. Stopping accept loop (Ctrl-C)...");
        stopper.stop();
    })
    .context("Error setting Ctrl-C handler")?;

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?;
    rt.block_on(server.run()).context("Run server failed")?;
    Ok(())
}
