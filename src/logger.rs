use anyhow::Result;
use chrono::Utc;
use parking_lot::Mutex;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::net::SocketAddr;
use std::path::Path;
use uuid::Uuid;

use crate::addr::Endpoint;
use crate::relay::{RelayState, RelayStats};

/// Observability hooks for the server and its relays. Every method is a
/// no-op by default so implementations only override what they record.
pub trait Logger: Send + Sync {
    fn listening(&self, _port: u16) {}
    fn stopped(&self) {}
    fn accepted(&self, _peer: SocketAddr) {}
    fn state(&self, _relay: Uuid, _state: RelayState) {}
    fn relay_started(&self, _relay: Uuid, _peer: SocketAddr, _primary: &Endpoint, _mirrors: usize) {}
    fn primary_dial_failed(&self, _relay: Uuid, _addr: &Endpoint, _err: &io::Error) {}
    fn mirror_dial_failed(&self, _relay: Uuid, _addr: &Endpoint, _err: &io::Error) {}
    fn mirror_write_failed(&self, _relay: Uuid, _addr: &Endpoint, _err: &io::Error) {}
    fn mirror_lagged(&self, _relay: Uuid, _addr: &Endpoint) {}
    fn disconnected(&self, _relay: Uuid, _peer: SocketAddr, _stats: &RelayStats) {}
    fn error(&self, _context: &str, _msg: &str) {}
}

pub struct NoopLogger;
impl Logger for NoopLogger {}

/// Line-oriented logger writing `[timestamp] EVENT key=value ...` records to
/// a file or to stderr.
pub struct TextLogger {
    out: Mutex<Box<dyn Write + Send>>,
}

impl TextLogger {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let f = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            out: Mutex::new(Box::new(f)),
        })
    }

    pub fn stderr() -> Self {
        Self {
            out: Mutex::new(Box::new(io::stderr())),
        }
    }

    fn line(&self, s: &str) {
        let mut out = self.out.lock();
        let _ = writeln!(out, "[{}] {}", Utc::now().to_rfc3339(), s);
        let _ = out.flush();
    }
}

impl Logger for TextLogger {
    fn listening(&self, port: u16) {
        self.line(&format!("LISTEN port={port}"));
    }
    fn stopped(&self) {
        self.line("STOP");
    }
    fn accepted(&self, peer: SocketAddr) {
        self.line(&format!("CONNECT peer={peer}"));
    }
    fn relay_started(&self, relay: Uuid, peer: SocketAddr, primary: &Endpoint, mirrors: usize) {
        self.line(&format!(
            "RELAY id={relay} peer={peer} primary={primary} mirrors={mirrors}"
        ));
    }
    fn primary_dial_failed(&self, relay: Uuid, addr: &Endpoint, err: &io::Error) {
        self.line(&format!("DIAL_FAIL id={relay} primary={addr} msg={err}"));
    }
    fn mirror_dial_failed(&self, relay: Uuid, addr: &Endpoint, err: &io::Error) {
        self.line(&format!("MIRROR_SKIP id={relay} mirror={addr} msg={err}"));
    }
    fn mirror_write_failed(&self, relay: Uuid, addr: &Endpoint, err: &io::Error) {
        self.line(&format!("MIRROR_DROP id={relay} mirror={addr} msg={err}"));
    }
    fn mirror_lagged(&self, relay: Uuid, addr: &Endpoint) {
        self.line(&format!("MIRROR_LAG id={relay} mirror={addr}"));
    }
    fn disconnected(&self, relay: Uuid, peer: SocketAddr, stats: &RelayStats) {
        self.line(&format!(
            "DISCONNECT id={relay} peer={peer} up={} down={} mirrors={}",
            stats.bytes_up, stats.bytes_down, stats.mirrors
        ));
    }
    fn error(&self, context: &str, msg: &str) {
        self.line(&format!("ERROR ctx={context} msg={msg}"));
    }
}
