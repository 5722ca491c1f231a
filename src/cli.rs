//! Shared CLI helpers and small reusable Clap fragments

use clap::{ArgAction, Parser};
use std::path::PathBuf;

/// Relay daemon options
#[derive(Clone, Debug, Parser)]
#[command(
    author,
    version,
    about = "Scatter - relay TCP traffic to a primary peer and tap it to mirrors"
)]
pub struct ServeOpts {
    /// Config file (TOML or JSON) with port, remote_addr and scatters
    pub config: Option<PathBuf>,

    /// Listening port (overrides config)
    #[arg(short, long)]
    pub port: Option<u32>,

    /// Primary peer host:port (overrides config)
    #[arg(long)]
    pub primary: Option<String>,

    /// Extra mirror peer host:port (repeatable, appended to config)
    #[arg(short, long = "mirror", action = ArgAction::Append)]
    pub mirrors: Vec<String>,

    /// Append log lines to this file instead of stderr
    #[arg(long = "log-file")]
    pub log_file: Option<PathBuf>,

    /// Disable logging
    #[arg(short, long, conflicts_with = "log_file")]
    pub quiet: bool,
}

/// Debug sink options
#[derive(Clone, Debug, Parser)]
#[command(author, version, about = "Print whatever peers send to a port")]
pub struct SinkOpts {
    /// Port to listen on
    pub port: u16,
}
