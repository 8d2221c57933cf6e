// ganglion-transport/src/pool.rs
//
// Single process-wide pool, keyed by remote address, holding at most one
// session per peer (spec.md §4.2, Property 8). Grounded on
// original_source/pool.go's `ConnPool`/`Conn`/`reap`, not on the
// teacher's `cell-transport::pool::ConnectionPool` (a free list of many
// sessions per peer, which does not hold the pool-uniqueness invariant).

use crate::session::Session;
use crate::stream::GanglionStream;
use ganglion_core::{Error, StreamType};
use rustls::ServerName;
use std::collections::HashMap;
use std::convert::TryFrom;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tokio_rustls::TlsConnector;

type Slot = Arc<AsyncMutex<Option<Arc<Session>>>>;

pub struct ConnectionPool {
    slots: std::sync::Mutex<HashMap<SocketAddr, Slot>>,
    connector: TlsConnector,
    dial_timeout: Duration,
    max_idle: Duration,
}

impl ConnectionPool {
    pub fn new(tls_config: Arc<rustls::ClientConfig>, dial_timeout: Duration, max_idle: Duration) -> Arc<Self> {
        Arc::new(Self {
            slots: std::sync::Mutex::new(HashMap::new()),
            connector: TlsConnector::from(tls_config),
            dial_timeout,
            max_idle,
        })
    }

    fn slot_for(&self, addr: SocketAddr) -> Slot {
        let mut slots = self.slots.lock().expect("pool lock poisoned");
        slots
            .entry(addr)
            .or_insert_with(|| Arc::new(AsyncMutex::new(None)))
            .clone()
    }

    /// Returns an existing session to `addr` or dials a new one. Holding
    /// the per-address `tokio::sync::Mutex` across the dial (rather than
    /// the outer map's std mutex) is what gives Property 8: concurrent
    /// `acquire(addr)` callers serialize on the same slot and observe
    /// the same `Arc<Session>`, while acquires to different addresses
    /// proceed fully in parallel.
    pub async fn acquire(&self, addr: SocketAddr) -> Result<Arc<Session>, Error> {
        let slot = self.slot_for(addr);
        let mut guard = slot.lock().await;
        if let Some(session) = guard.as_ref() {
            if !session.is_closed() {
                session.touch();
                return Ok(session.clone());
            }
        }
        let session = self.dial_new(addr).await?;
        *guard = Some(session.clone());
        Ok(session)
    }

    async fn dial_new(&self, addr: SocketAddr) -> Result<Arc<Session>, Error> {
        let connect = async {
            let tcp = TcpStream::connect(addr).await.map_err(Error::Io)?;
            let server_name = ServerName::try_from(addr.ip().to_string().as_str())
                .map_err(|_| Error::SessionOpen("invalid server name".into()))?;
            let tls = self
                .connector
                .connect(server_name, tcp)
                .await
                .map_err(|e| Error::TlsHandshake {
                    addr,
                    source: e,
                })?;
            Ok::<_, Error>(tls)
        };

        let tls = match tokio::time::timeout(self.dial_timeout, connect).await {
            Ok(result) => result?,
            Err(_) => return Err(Error::DialTimeout { addr }),
        };

        Ok(Session::spawn(addr, tls))
    }

    /// Opens a typed stream to `addr`, acquiring (or dialing) its
    /// session first (spec.md §4.2).
    pub async fn dial(&self, stream_type: StreamType, addr: SocketAddr) -> Result<GanglionStream, Error> {
        let session = self.acquire(addr).await?;
        session.open_stream(stream_type).await
    }

    /// Background reaper: wakes every second, closes sessions idle past
    /// `max_idle` with zero active streams (spec.md §4.2, §8 Property 9).
    pub fn spawn_reaper(self: &Arc<Self>) -> JoinHandle<()> {
        let pool = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(1));
            loop {
                ticker.tick().await;
                pool.reap_once().await;
            }
        })
    }

    async fn reap_once(&self) {
        let addrs: Vec<SocketAddr> = {
            let slots = self.slots.lock().expect("pool lock poisoned");
            slots.keys().copied().collect()
        };
        for addr in addrs {
            let slot = self.slot_for(addr);
            let Ok(mut guard) = slot.try_lock() else {
                continue;
            };
            let should_reap = match guard.as_ref() {
                Some(session) => {
                    session.idle_for() > self.max_idle && session.active_streams() == 0
                }
                None => false,
            };
            if should_reap {
                if let Some(session) = guard.take() {
                    tracing::info!(%addr, "reaping idle session");
                    session.close().await;
                }
            }
        }
    }

    /// Closes every session and drops their slots (spec.md §4.2 "shutdown
    /// closes every session and cancels the reaper" -- the reaper task
    /// itself is cancelled by the caller aborting the handle returned
    /// from `spawn_reaper`).
    pub async fn shutdown(&self) {
        let slots: Vec<Slot> = {
            let map = self.slots.lock().expect("pool lock poisoned");
            map.values().cloned().collect()
        };
        for slot in slots {
            let mut guard = slot.lock().await;
            if let Some(session) = guard.take() {
                session.close().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_is_reused_for_same_address() {
        let pool = ConnectionPool::new(
            crate::tls::insecure_client_config(),
            Duration::from_secs(1),
            Duration::from_secs(60),
        );
        let addr: SocketAddr = "127.0.0.1:9000".parse().unwrap();
        let a = pool.slot_for(addr);
        let b = pool.slot_for(addr);
        assert!(Arc::ptr_eq(&a, &b));
    }
}
