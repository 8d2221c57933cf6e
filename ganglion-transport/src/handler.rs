// ganglion-transport/src/handler.rs
//
// Handlers receive `(cancellation context, stream)` and own the stream's
// lifetime (spec.md §4.3, §9 "Ownership of streams"). Boxed-future shape
// follows cell-core's `Connection`/`Listener` traits rather than pulling
// in `async-trait`, matching the teacher's no-extra-macro-dependency
// style for this kind of seam.

use crate::stream::GanglionStream;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use tokio_util::sync::CancellationToken;

pub trait StreamHandler: Send + Sync {
    fn handle(
        &self,
        cancel: CancellationToken,
        stream: GanglionStream,
        remote: SocketAddr,
    ) -> Pin<Box<dyn Future<Output = ()> + Send>>;
}

impl<F> StreamHandler for F
where
    F: Fn(CancellationToken, GanglionStream, SocketAddr) -> Pin<Box<dyn Future<Output = ()> + Send>>
        + Send
        + Sync,
{
    fn handle(
        &self,
        cancel: CancellationToken,
        stream: GanglionStream,
        remote: SocketAddr,
    ) -> Pin<Box<dyn Future<Output = ()> + Send>> {
        (self)(cancel, stream, remote)
    }
}
