// ganglion-transport/src/stream.rs
//
// A multiplexed stream plus a liveness guard so the pool's reaper can
// ask "does this session have zero active streams" without yamux itself
// exposing a counter (spec.md §9 "pool session refcounting": the reaper
// treats the multiplexer's active-stream count as the in-use indicator;
// we maintain that count ourselves, one increment per stream opened or
// accepted, one decrement on drop). yamux streams are futures-style
// AsyncRead/AsyncWrite; `tokio_util::compat` bridges them to tokio's
// traits so handlers can treat a `GanglionStream` like any other duplex
// byte stream.

use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio_util::compat::{Compat, FuturesAsyncReadCompatExt};

pub(crate) struct StreamGuard(pub Arc<AtomicUsize>);

impl Drop for StreamGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct GanglionStream {
    pub(crate) inner: Compat<yamux::Stream>,
    pub(crate) _guard: StreamGuard,
}

impl GanglionStream {
    pub(crate) fn new(stream: yamux::Stream, guard: StreamGuard) -> Self {
        Self {
            inner: stream.compat(),
            _guard: guard,
        }
    }
}

impl AsyncRead for GanglionStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for GanglionStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}
