//! Accept loop that hands every inbound connection to its own [`Relay`].

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::watch;

use crate::addr::Endpoint;
use crate::error::{Error, Result};
use crate::logger::{Logger, NoopLogger};
use crate::relay::Relay;

pub struct Server {
    port: u16,
    primary: String,
    mirrors: Vec<String>,
    stop_tx: watch::Sender<bool>,
    logger: Arc<dyn Logger>,
}

impl Server {
    pub fn new(port: u32, primary: &str) -> Result<Self> {
        let port = u16::try_from(port)
            .ok()
            .filter(|p| *p != 0)
            .ok_or(Error::InvalidPort(port))?;
        Endpoint::parse(primary)?;
        let (stop_tx, _) = watch::channel(false);
        Ok(Self {
            port,
            primary: primary.trim().to_string(),
            mirrors: Vec::new(),
            stop_tx,
            logger: Arc::new(NoopLogger),
        })
    }

    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = logger;
        self
    }

    /// Adds a mirror target. Repeating a target already present is a no-op.
    /// Takes `&mut self`, so mirrors can only be added before the server is
    /// shared for `run`.
    pub fn add_mirror(&mut self, addr: &str) -> Result<()> {
        let ep = Endpoint::parse(addr)?;
        let known = self
            .mirrors
            .iter()
            .any(|m| Endpoint::parse(m).map_or(false, |e| e == ep));
        if !known {
            self.mirrors.push(addr.trim().to_string());
        }
        Ok(())
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn primary(&self) -> &str {
        &self.primary
    }

    pub fn mirrors(&self) -> &[String] {
        &self.mirrors
    }

    /// Listens on `0.0.0.0:port` and spawns a relay per connection until
    /// [`stop`](Self::stop) is called or `accept` fails. Relays already
    /// spawned keep running after this returns.
    pub async fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(("0.0.0.0", self.port))
            .await
            .map_err(|source| Error::Bind {
                port: self.port,
                source,
            })?;
        self.logger.listening(self.port);

        let mut stop_rx = self.stop_tx.subscribe();
        loop {
            let accepted = tokio::select! {
                _ = stop_requested(&mut stop_rx) => break,
                res = listener.accept() => res,
            };
            let (stream, peer) = match accepted {
                Ok(conn) => conn,
                Err(e) => {
                    self.logger.error("accept", &e.to_string());
                    break;
                }
            };
            let _ = stream.set_nodelay(true);
            self.logger.accepted(peer);

            let relay = match Relay::new(stream, &self.primary, self.mirrors.as_slice()) {
                Ok(r) => r.with_logger(self.logger.clone()),
                Err(e) => {
                    self.logger.error("relay", &e.to_string());
                    continue;
                }
            };
            let logger = self.logger.clone();
            tokio::spawn(async move {
                let id = relay.id();
                if let Err(e) = relay.run().await {
                    logger.error(&format!("relay {id}"), &e.to_string());
                }
            });
        }

        drop(listener);
        self.logger.stopped();
        Ok(())
    }

    /// Requests the accept loop to exit. Sticky: a stop issued before `run`
    /// makes `run` return right after binding. In-flight relays are not
    /// touched.
    pub fn stop(&self) {
        self.stop_tx.send_replace(true);
    }
}

async fn stop_requested(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|stopped| *stopped).await;
}
