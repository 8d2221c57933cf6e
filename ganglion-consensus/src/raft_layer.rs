// ganglion-consensus/src/raft_layer.rs
//
// C4: the `raft.StreamLayer` the Raft library dials/accepts through.
// Inbound streams arrive via a handoff channel fed by the dispatcher's
// (C3) registered handler for the raft stream type; outbound streams go
// straight through the connection pool (C2). Grounded on
// original_source/stream_layer.go's `raftLayer` + its `Handoff` method --
// deliberately not tls.go's `TLSStreamLayer`, which dials its own
// listener instead of sharing the multiplexed dispatcher (design note,
// Open Question resolved in DESIGN.md).

use ganglion_core::{Error, StreamType};
use ganglion_transport::{ConnectionPool, GanglionStream};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

pub struct RaftStreamLayer {
    pool: Arc<ConnectionPool>,
    local_addr: SocketAddr,
    inbound: Mutex<mpsc::Receiver<GanglionStream>>,
    cancel: CancellationToken,
}

impl RaftStreamLayer {
    /// Returns the layer and the sender half the dispatcher's raft-type
    /// handler should hand every accepted stream to.
    pub fn new(
        pool: Arc<ConnectionPool>,
        local_addr: SocketAddr,
        handoff_capacity: usize,
    ) -> (Arc<Self>, mpsc::Sender<GanglionStream>) {
        let (tx, rx) = mpsc::channel(handoff_capacity);
        let layer = Arc::new(Self {
            pool,
            local_addr,
            inbound: Mutex::new(rx),
            cancel: CancellationToken::new(),
        });
        (layer, tx)
    }

    /// Blocks until C3 hands off an inbound raft stream, or until
    /// `close` is called.
    pub async fn accept(&self) -> Result<GanglionStream, Error> {
        let mut rx = self.inbound.lock().await;
        tokio::select! {
            _ = self.cancel.cancelled() => Err(Error::Other("raft stream layer closed".into())),
            stream = rx.recv() => stream.ok_or_else(|| Error::Other("raft stream layer closed".into())),
        }
    }

    pub async fn dial(&self, addr: SocketAddr) -> Result<GanglionStream, Error> {
        self.pool.dial(StreamType::Raft, addr).await
    }

    pub fn addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Unblocks any pending `accept` with an error, matching the Go
    /// source's `Close` unblocking a pending `net.Listener.Accept`.
    pub fn close(&self) {
        self.cancel.cancel();
    }
}

/// The dispatcher handler (C3) registers for `StreamType::Raft`: it does
/// nothing but forward the freshly-accepted stream onto the handoff
/// channel the layer's `accept` reads from.
pub fn handoff_handler(
    tx: mpsc::Sender<GanglionStream>,
) -> impl Fn(
    CancellationToken,
    GanglionStream,
    SocketAddr,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>>
       + Send
       + Sync
       + 'static {
    move |_cancel, stream, remote| {
        let tx = tx.clone();
        Box::pin(async move {
            if tx.send(stream).await.is_err() {
                tracing::warn!(%remote, "raft stream layer not accepting, dropping inbound stream");
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn close_unblocks_pending_accept() {
        let pool = ConnectionPool::new(
            ganglion_transport::tls::insecure_client_config(),
            std::time::Duration::from_secs(1),
            std::time::Duration::from_secs(60),
        );
        let (layer, _tx) = RaftStreamLayer::new(pool, "127.0.0.1:9001".parse().unwrap(), 4);
        let layer2 = layer.clone();
        let handle = tokio::spawn(async move { layer2.accept().await });
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        layer.close();
        let result = tokio::time::timeout(std::time::Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_err());
    }
}
