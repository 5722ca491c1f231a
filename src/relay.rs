//! Per-connection relay: one inbound client, one primary peer, and any
//! number of mirror peers that receive a copy of the client's bytes.
//!
//! Lifecycle: `Created -> Dialing -> {DialFailed | Relaying} -> Closing -> Closed`.
//!
//! While relaying, four pieces of work run concurrently:
//! - (a) inbound -> primary copy, which also feeds the mirror tap
//! - (b) primary -> inbound copy
//! - (c) fan-out: one writer per mirror, fed through its own bounded queue
//! - (d) drain of whatever the mirrors send back
//!
//! (a) never waits on a mirror. It offers each chunk to every mirror queue
//! with `try_send`; a mirror whose queue is full is cut off from the stream,
//! like one whose write failed, and keeps its handle until teardown.
//!
//! The first of (a)/(b) to finish ends the relay. (a) and (b) are raced in a
//! single `select!`, so only one teardown can ever run. The inbound and
//! primary halves are owned by those two futures and close when they drop.
//! The mirror writers get a bounded window to flush chunks already queued
//! before they are aborted; (d) is aborted outright. Dropping their halves
//! closes the mirror handles.

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinSet;
use tokio::time::timeout;
use uuid::Uuid;

use crate::addr::Endpoint;
use crate::error::{Error, Result};
use crate::logger::{Logger, NoopLogger};
use crate::timeouts::{CONNECT_MS, COPY_BUF_SIZE, MIRROR_FLUSH_MS, MIRROR_QUEUE_DEPTH};

/// Relay lifecycle. `Created` covers the time between [`Relay::new`] and
/// [`Relay::run`], before a logger can be attached, so only the states from
/// `Dialing` on are reported through [`Logger::state`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    Created,
    Dialing,
    DialFailed,
    Relaying,
    Closing,
    Closed,
}

impl fmt::Display for RelayState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RelayState::Created => "created",
            RelayState::Dialing => "dialing",
            RelayState::DialFailed => "dial-failed",
            RelayState::Relaying => "relaying",
            RelayState::Closing => "closing",
            RelayState::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// Totals reported when a relay finishes normally.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    /// Bytes copied inbound -> primary.
    pub bytes_up: u64,
    /// Bytes copied primary -> inbound.
    pub bytes_down: u64,
    /// Mirrors that were successfully dialed.
    pub mirrors: usize,
}

pub struct Relay {
    id: Uuid,
    inbound: TcpStream,
    peer: SocketAddr,
    primary: Endpoint,
    mirrors: Vec<Endpoint>,
    logger: Arc<dyn Logger>,
}

impl Relay {
    /// Builds a relay for an accepted connection. The primary address must
    /// parse; mirror addresses that don't are dropped, as are repeats.
    pub fn new<S: AsRef<str>>(inbound: TcpStream, primary: &str, mirrors: &[S]) -> Result<Self> {
        let primary = Endpoint::parse(primary)?;
        let mut targets: Vec<Endpoint> = Vec::with_capacity(mirrors.len());
        for m in mirrors {
            if let Ok(ep) = Endpoint::parse(m.as_ref()) {
                if !targets.contains(&ep) {
                    targets.push(ep);
                }
            }
        }
        let peer = inbound
            .peer_addr()
            .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], 0)));
        Ok(Self {
            id: Uuid::new_v4(),
            inbound,
            peer,
            primary,
            mirrors: targets,
            logger: Arc::new(NoopLogger),
        })
    }

    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn primary(&self) -> &Endpoint {
        &self.primary
    }

    pub fn mirrors(&self) -> &[Endpoint] {
        &self.mirrors
    }

    /// Dials the peers and relays until either primary-facing direction
    /// ends. Only a failed primary dial is reported as an error.
    pub async fn run(self) -> Result<RelayStats> {
        let Relay {
            id,
            inbound,
            peer,
            primary,
            mirrors,
            logger,
        } = self;

        logger.state(id, RelayState::Dialing);
        let primary_conn = match dial(&primary).await {
            Ok(s) => s,
            Err(e) => {
                logger.primary_dial_failed(id, &primary, &e);
                drop(inbound);
                logger.state(id, RelayState::DialFailed);
                return Err(Error::Dial {
                    addr: primary.to_string(),
                    source: e,
                });
            }
        };

        let live = dial_mirrors(id, mirrors, logger.as_ref()).await;
        let mirror_count = live.len();
        logger.relay_started(id, peer, &primary, mirror_count);
        logger.state(id, RelayState::Relaying);

        let (in_r, in_w) = inbound.into_split();
        let (pr_r, pr_w) = primary_conn.into_split();

        let mut drains = JoinSet::new();
        let mut writers = JoinSet::new();
        let mut queues = Vec::with_capacity(mirror_count);
        for (addr, stream) in live {
            let (r, w) = stream.into_split();
            let (tx, rx) = mpsc::channel(MIRROR_QUEUE_DEPTH);
            drains.spawn(drain(r));
            writers.spawn(mirror_writer(id, addr.clone(), w, rx, logger.clone()));
            queues.push(MirrorQueue { addr, tx: Some(tx) });
        }
        let tap = (!queues.is_empty()).then(|| Tap {
            id,
            mirrors: queues,
            logger: logger.clone(),
        });

        let up = AtomicU64::new(0);
        let down = AtomicU64::new(0);
        tokio::select! {
            _ = copy_counted(in_r, pr_w, tap, &up) => {}
            _ = copy_counted(pr_r, in_w, None, &down) => {}
        }

        // Both copy futures are gone here, so inbound and primary are closed
        // and every mirror queue sender has been dropped.
        logger.state(id, RelayState::Closing);
        let flushed = timeout(Duration::from_millis(MIRROR_FLUSH_MS), async {
            while writers.join_next().await.is_some() {}
        })
        .await;
        if flushed.is_err() {
            writers.shutdown().await;
        }
        drains.shutdown().await;
        logger.state(id, RelayState::Closed);

        let stats = RelayStats {
            bytes_up: up.load(Ordering::Relaxed),
            bytes_down: down.load(Ordering::Relaxed),
            mirrors: mirror_count,
        };
        logger.disconnected(id, peer, &stats);
        Ok(stats)
    }
}

struct MirrorQueue {
    addr: Endpoint,
    tx: Option<mpsc::Sender<Arc<[u8]>>>,
}

/// Mirror side of the inbound -> primary copy. Never waits: a mirror whose
/// queue is full has fallen behind and is cut off from the stream.
struct Tap {
    id: Uuid,
    mirrors: Vec<MirrorQueue>,
    logger: Arc<dyn Logger>,
}

impl Tap {
    fn push(&mut self, bytes: &[u8]) {
        let chunk: Arc<[u8]> = Arc::from(bytes);
        for m in &mut self.mirrors {
            let res = match &m.tx {
                Some(tx) => tx.try_send(chunk.clone()),
                None => continue,
            };
            match res {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    self.logger.mirror_lagged(self.id, &m.addr);
                    m.tx = None;
                }
                // writer gave up after a failed write
                Err(TrySendError::Closed(_)) => m.tx = None,
            }
        }
    }
}

async fn dial(ep: &Endpoint) -> std::io::Result<TcpStream> {
    let stream = match timeout(
        Duration::from_millis(CONNECT_MS),
        TcpStream::connect(ep.dial_target()),
    )
    .await
    {
        Ok(res) => res?,
        Err(_) => {
            return Err(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                format!("connect timeout ({} ms)", CONNECT_MS),
            ))
        }
    };
    let _ = stream.set_nodelay(true);
    Ok(stream)
}

/// Dials every mirror at once; failures are logged and skipped. The result
/// keeps the configured order.
async fn dial_mirrors(
    id: Uuid,
    mirrors: Vec<Endpoint>,
    logger: &dyn Logger,
) -> Vec<(Endpoint, TcpStream)> {
    let mut set = JoinSet::new();
    for (idx, ep) in mirrors.into_iter().enumerate() {
        set.spawn(async move {
            let res = dial(&ep).await;
            (idx, ep, res)
        });
    }
    let mut live = Vec::with_capacity(set.len());
    while let Some(joined) = set.join_next().await {
        let Ok((idx, ep, res)) = joined else { continue };
        match res {
            Ok(stream) => live.push((idx, ep, stream)),
            Err(e) => logger.mirror_dial_failed(id, &ep, &e),
        }
    }
    live.sort_by_key(|(idx, _, _)| *idx);
    live.into_iter().map(|(_, ep, s)| (ep, s)).collect()
}

/// Copies `src` to `dst` until EOF or error, offering each chunk to the
/// tap first.
async fn copy_counted(
    mut src: OwnedReadHalf,
    mut dst: OwnedWriteHalf,
    mut tap: Option<Tap>,
    counter: &AtomicU64,
) -> std::io::Result<()> {
    let mut buf = vec![0u8; COPY_BUF_SIZE];
    loop {
        let n = src.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        if let Some(tap) = tap.as_mut() {
            tap.push(&buf[..n]);
        }
        dst.write_all(&buf[..n]).await?;
        counter.fetch_add(n as u64, Ordering::Relaxed);
    }
}

/// Writes one mirror's queued chunks. Hands the write half back so the
/// handle stays open until teardown collects it, even after a failed write.
async fn mirror_writer(
    id: Uuid,
    addr: Endpoint,
    mut writer: OwnedWriteHalf,
    mut rx: mpsc::Receiver<Arc<[u8]>>,
    logger: Arc<dyn Logger>,
) -> OwnedWriteHalf {
    while let Some(chunk) = rx.recv().await {
        if let Err(e) = writer.write_all(&chunk).await {
            logger.mirror_write_failed(id, &addr, &e);
            break;
        }
    }
    writer
}

async fn drain(mut src: OwnedReadHalf) {
    let _ = tokio::io::copy(&mut src, &mut tokio::io::sink()).await;
}
