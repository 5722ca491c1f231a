//! Parsing of `host:port` TCP endpoints
//!
//! Validation is syntactic only. Host names are resolved when a peer is
//! dialed, so a name that fails DNS lookup surfaces as a dial failure.

use std::fmt;

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    host: String,
    port: u16,
}

impl Endpoint {
    pub fn parse(s: &str) -> Result<Self> {
        let invalid = |reason| Error::InvalidAddress {
            addr: s.to_string(),
            reason,
        };
        let s_trim = s.trim();
        if s_trim.is_empty() {
            return Err(invalid("empty address"));
        }
        let (host, port) = if let Some(rest) = s_trim.strip_prefix('[') {
            let (h, tail) = rest.split_once(']').ok_or_else(|| invalid("missing ']'"))?;
            let p = tail.strip_prefix(':').ok_or_else(|| invalid("missing port"))?;
            if h.is_empty() {
                return Err(invalid("empty host in brackets"));
            }
            (h, p)
        } else {
            let (h, p) = s_trim.rsplit_once(':').ok_or_else(|| invalid("missing port"))?;
            if h.contains(':') {
                return Err(invalid("too many colons"));
            }
            (h, p)
        };
        if host.chars().any(|c| c.is_whitespace() || c == '/') {
            return Err(invalid("bad host"));
        }
        let port: u16 = port.parse().map_err(|_| invalid("bad port"))?;
        Ok(Endpoint {
            host: host.to_string(),
            port,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Target suitable for `TcpStream::connect`. An empty host means the
    /// local system.
    pub fn dial_target(&self) -> (&str, u16) {
        if self.host.is_empty() {
            ("127.0.0.1", self.port)
        } else {
            (self.host.as_str(), self.port)
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

impl std::str::FromStr for Endpoint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Endpoint::parse(s)
    }
}
