#![allow(dead_code)]

use parking_lot::Mutex;
use scatter::addr::Endpoint;
use scatter::logger::Logger;
use scatter::{RelayState, RelayStats};
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use uuid::Uuid;

pub fn free_port() -> u16 {
    let sock = std::net::TcpListener::bind("0.0.0.0:0").unwrap();
    let p = sock.local_addr().unwrap().port();
    drop(sock);
    p
}

/// Address nothing listens on, so dials are refused.
pub fn refused_addr() -> String {
    let sock = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = sock.local_addr().unwrap();
    drop(sock);
    addr.to_string()
}

pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

pub async fn wait_until<F: Fn() -> bool>(what: &str, cond: F) {
    for _ in 0..250u32 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("timed out waiting for {what}");
}

/// Connected (client, accepted) loopback pair.
pub async fn socket_pair() -> (TcpStream, TcpStream) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (client, accepted) = tokio::join!(TcpStream::connect(addr), listener.accept());
    (client.unwrap(), accepted.unwrap().0)
}

#[derive(Clone, Copy, PartialEq, Eq)]
pub enum PeerMode {
    /// Write back everything received
    Echo,
    /// Read and record, never reply
    Record,
    /// Accept, then never read until `release` is called
    Silent,
    /// Close each connection as soon as anything arrives
    HangUp,
}

/// Test peer that records what it receives across all its connections.
pub struct TestPeer {
    pub addr: SocketAddr,
    received: Arc<Mutex<Vec<u8>>>,
    accepted: Arc<AtomicUsize>,
    closed: Arc<AtomicUsize>,
    release: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl TestPeer {
    pub async fn start(mode: PeerMode) -> TestPeer {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let received = Arc::new(Mutex::new(Vec::new()));
        let accepted = Arc::new(AtomicUsize::new(0));
        let closed = Arc::new(AtomicUsize::new(0));
        let (release, released) = watch::channel(false);
        let (r, a, c) = (received.clone(), accepted.clone(), closed.clone());
        let task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                a.fetch_add(1, Ordering::SeqCst);
                let (r, c) = (r.clone(), c.clone());
                if mode == PeerMode::Silent {
                    let mut released = released.clone();
                    tokio::spawn(async move {
                        let _ = released.wait_for(|go| *go).await;
                        serve_peer(stream, PeerMode::Record, r, c).await;
                    });
                    continue;
                }
                tokio::spawn(serve_peer(stream, mode, r, c));
            }
        });
        TestPeer {
            addr,
            received,
            accepted,
            closed,
            release,
            task,
        }
    }

    pub fn addr_string(&self) -> String {
        self.addr.to_string()
    }

    pub fn received(&self) -> Vec<u8> {
        self.received.lock().clone()
    }

    pub fn received_len(&self) -> usize {
        self.received.lock().len()
    }

    /// Lets silent connections start reading (and so notice a close).
    pub fn release(&self) {
        self.release.send_replace(true);
    }

    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    /// Connections that ended with EOF or error from the relay side.
    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Drop for TestPeer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve_peer(
    mut stream: TcpStream,
    mode: PeerMode,
    received: Arc<Mutex<Vec<u8>>>,
    closed: Arc<AtomicUsize>,
) {
    let mut buf = vec![0u8; 8192];
    loop {
        let n = match stream.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };
        received.lock().extend_from_slice(&buf[..n]);
        match mode {
            PeerMode::Echo => {
                if stream.write_all(&buf[..n]).await.is_err() {
                    break;
                }
            }
            PeerMode::HangUp => return,
            _ => {}
        }
    }
    closed.fetch_add(1, Ordering::SeqCst);
}

/// Reads exactly `len` bytes from `stream`, failing after a few seconds.
pub async fn read_n(stream: &mut TcpStream, len: usize) -> io::Result<Vec<u8>> {
    let mut out = vec![0u8; len];
    tokio::time::timeout(Duration::from_secs(5), stream.read_exact(&mut out))
        .await
        .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "read_n timeout"))??;
    Ok(out)
}

/// True once the peer has closed (`read` returns 0 or fails).
pub async fn sees_close(stream: &mut TcpStream) -> bool {
    let mut buf = [0u8; 64];
    loop {
        match tokio::time::timeout(Duration::from_secs(5), stream.read(&mut buf)).await {
            Err(_) => return false,
            Ok(Ok(0)) | Ok(Err(_)) => return true,
            Ok(Ok(_)) => continue,
        }
    }
}

/// Logger that keeps event names for assertions.
#[derive(Default)]
pub struct RecordingLogger {
    events: Mutex<Vec<String>>,
}

impl RecordingLogger {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    pub fn count(&self, event: &str) -> usize {
        self.events.lock().iter().filter(|e| *e == event).count()
    }

    fn push(&self, event: impl Into<String>) {
        self.events.lock().push(event.into());
    }
}

impl Logger for RecordingLogger {
    fn listening(&self, _port: u16) {
        self.push("listening");
    }
    fn stopped(&self) {
        self.push("stopped");
    }
    fn accepted(&self, _peer: SocketAddr) {
        self.push("accepted");
    }
    fn state(&self, _relay: Uuid, state: RelayState) {
        self.push(format!("state:{state}"));
    }
    fn primary_dial_failed(&self, _relay: Uuid, _addr: &Endpoint, _err: &io::Error) {
        self.push("primary_dial_failed");
    }
    fn mirror_dial_failed(&self, _relay: Uuid, _addr: &Endpoint, _err: &io::Error) {
        self.push("mirror_dial_failed");
    }
    fn mirror_write_failed(&self, _relay: Uuid, _addr: &Endpoint, _err: &io::Error) {
        self.push("mirror_write_failed");
    }
    fn mirror_lagged(&self, _relay: Uuid, _addr: &Endpoint) {
        self.push("mirror_lagged");
    }
    fn disconnected(&self, _relay: Uuid, _peer: SocketAddr, _stats: &RelayStats) {
        self.push("disconnected");
    }
}
