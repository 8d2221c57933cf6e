// ganglion-transport/src/session.rs
//
// An outbound pooled TLS session (spec.md §3, §4.2). Created on first
// demand by the pool, closed on last-stream idle past `max_time` or on
// shutdown. Owns the yamux client connection's driver task; `Control` is
// what `dial` actually uses to open typed streams.

use crate::stream::{GanglionStream, StreamGuard};
use ganglion_core::{Error, StreamType};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::io::AsyncWriteExt;
use tokio::task::JoinHandle;
use tokio_rustls::client::TlsStream;
use tokio_util::compat::TokioAsyncReadCompatExt;

pub struct Session {
    pub addr: SocketAddr,
    control: yamux::Control,
    driver: JoinHandle<()>,
    active_streams: Arc<AtomicUsize>,
    last_used_unix: AtomicI64,
    closed: AtomicBool,
}

fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

impl Session {
    /// Wraps an already-handshaked client TLS stream in a yamux client
    /// connection and spawns its driver task. The driver's only job on
    /// the client side is to keep polling the connection so outbound
    /// stream opens and yamux's own ping/keepalive frames make progress;
    /// ganglion never expects an inbound stream on a pool session.
    pub fn spawn(addr: SocketAddr, tls: TlsStream<tokio::net::TcpStream>) -> Arc<Self> {
        let socket = tls.compat();
        let mut connection = yamux::Connection::new(socket, yamux::Config::default(), yamux::Mode::Client);
        let control = connection.control();

        let driver = tokio::spawn(async move {
            loop {
                match connection.next_stream().await {
                    Ok(Some(inbound)) => {
                        tracing::warn!(%addr, "unexpected inbound stream on outbound session, dropping");
                        drop(inbound);
                    }
                    Ok(None) => break,
                    Err(err) => {
                        tracing::debug!(%addr, %err, "session driver exiting");
                        break;
                    }
                }
            }
        });

        Arc::new(Self {
            addr,
            control,
            driver,
            active_streams: Arc::new(AtomicUsize::new(0)),
            last_used_unix: AtomicI64::new(now_unix()),
            closed: AtomicBool::new(false),
        })
    }

    pub fn touch(&self) {
        self.last_used_unix.store(now_unix(), Ordering::Relaxed);
    }

    pub fn idle_for(&self) -> Duration {
        let last = self.last_used_unix.load(Ordering::Relaxed);
        let delta = (now_unix() - last).max(0);
        Duration::from_secs(delta as u64)
    }

    pub fn active_streams(&self) -> usize {
        self.active_streams.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Opens a new stream and writes the one-byte type tag (spec.md
    /// §4.2: `dial(type, addr, timeout)` opens a stream then writes
    /// `0x01`/`0x02`).
    pub async fn open_stream(&self, stream_type: StreamType) -> Result<GanglionStream, Error> {
        self.touch();
        let mut control = self.control.clone();
        let stream = control
            .open_stream()
            .await
            .map_err(|e| Error::SessionOpen(e.to_string()))?;
        self.active_streams.fetch_add(1, Ordering::SeqCst);
        let mut wrapped = GanglionStream::new(stream, StreamGuard(self.active_streams.clone()));
        wrapped
            .write_all(&[stream_type.tag()])
            .await
            .map_err(Error::Io)?;
        Ok(wrapped)
    }

    pub async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let mut control = self.control.clone();
        let _ = control.close().await;
        self.driver.abort();
    }
}

