//! Scatter library
//!
//! TCP relay that pairs every inbound connection with a primary peer and
//! copies the client's bytes to any number of mirror peers

pub mod addr;
pub mod cli;
pub mod config;
pub mod error;
pub mod logger;
pub mod relay;
pub mod server;
pub mod timeouts;

pub use error::{Error, Result};
pub use relay::{Relay, RelayState, RelayStats};
pub use server::Server;
