//! Config file loading (TOML or JSON)

use serde::Deserialize;
use std::path::Path;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ScatterConfig {
    /// Listening port
    #[serde(alias = "Port")]
    pub port: u32,
    /// Primary peer, `host:port`
    #[serde(alias = "primary", alias = "remoteAddr", alias = "RemoteAddr")]
    pub remote_addr: String,
    /// Mirror peers, `host:port` each
    #[serde(default, alias = "mirrors", alias = "Scatters")]
    pub scatters: Vec<String>,
}

pub fn load<P: AsRef<Path>>(path: P) -> Result<ScatterConfig> {
    let path = path.as_ref();
    let fail = |reason: String| Error::Config {
        path: path.to_path_buf(),
        reason,
    };
    let data = std::fs::read_to_string(path).map_err(|e| fail(e.to_string()))?;
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase());
    match ext.as_deref() {
        Some("toml") => toml::from_str(&data).map_err(|e| fail(e.to_string())),
        Some("json") => serde_json::from_str(&data).map_err(|e| fail(e.to_string())),
        _ => toml::from_str(&data)
            .or_else(|_| serde_json::from_str(&data))
            .map_err(|e| fail(format!("neither TOML nor JSON: {e}"))),
    }
}
