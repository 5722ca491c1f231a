//! Error taxonomy for the relay library

use std::io;
use std::path::PathBuf;

/// Errors surfaced by [`Server`](crate::server::Server) and
/// [`Relay`](crate::relay::Relay).
///
/// Steady-state I/O failures never appear here: they end the task that hit
/// them and tear the relay down without being reported as a failure.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("port {0} is out of range (1-65535)")]
    InvalidPort(u32),

    #[error("invalid tcp address {addr:?}: {reason}")]
    InvalidAddress { addr: String, reason: &'static str },

    #[error("listen on port {port} failed")]
    Bind {
        port: u16,
        #[source]
        source: io::Error,
    },

    #[error("dial to {addr} failed")]
    Dial {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("config {}: {reason}", path.display())]
    Config { path: PathBuf, reason: String },
}

impl Error {
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            Error::InvalidPort(_) | Error::InvalidAddress { .. } | Error::Config { .. }
        )
    }

    pub fn is_dial(&self) -> bool {
        matches!(self, Error::Dial { .. })
    }

    pub fn is_bind(&self) -> bool {
        matches!(self, Error::Bind { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
