// ganglion-consensus/src/forward.rs
//
// C5: the dispatcher handler registered for the forward stream type. A
// follower that forwarded a tuple just writes the encoded record and
// half-closes; this handler reads framed records off the stream one at a
// time and submits each to the applier (C6). Decoding and applying run
// as two tasks joined by a capacity-1 channel so a slow `Apply` (e.g.
// waiting on a log enqueue) applies back-pressure to the reader instead
// of buffering unboundedly, matching original_source/forward.go +
// forwarder.go's split between `handleForward`'s decode loop and the
// applier it hands decoded tuples to.

use crate::applier::Applier;
use ganglion_codec::header::{parse_header, read_length};
use ganglion_core::DecodeError;
use ganglion_transport::{GanglionStream, StreamHandler};
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, thiserror::Error)]
enum ReadFrameError {
    #[error("stream closed")]
    Eof,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),
}

/// Reads one complete framed record (header byte + length field + body)
/// off `stream`, returning the record's raw bytes unparsed -- the
/// applier and, eventually, C10 decode its fields; this layer only needs
/// to know where one record ends and the next begins.
async fn read_framed_record(
    stream: &mut GanglionStream,
    max_size: usize,
) -> Result<Vec<u8>, ReadFrameError> {
    let mut header_byte = [0u8; 1];
    let read = stream.read(&mut header_byte).await?;
    if read == 0 {
        return Err(ReadFrameError::Eof);
    }

    let (_version, width) = parse_header(header_byte[0])?;
    let mut length_bytes = vec![0u8; width];
    stream.read_exact(&mut length_bytes).await?;
    let length = read_length(&length_bytes, width);
    if length > max_size {
        return Err(ReadFrameError::Decode(DecodeError::ExceedsMax));
    }

    let mut body = vec![0u8; length];
    stream.read_exact(&mut body).await?;

    let mut record = Vec::with_capacity(1 + width + length);
    record.push(header_byte[0]);
    record.extend_from_slice(&length_bytes);
    record.extend_from_slice(&body);
    Ok(record)
}

pub struct ForwardHandler {
    applier: Arc<Applier>,
    max_size: usize,
}

impl ForwardHandler {
    pub fn new(applier: Arc<Applier>, max_size: usize) -> Arc<Self> {
        Arc::new(Self { applier, max_size })
    }

    async fn run(applier: Arc<Applier>, max_size: usize, mut stream: GanglionStream, remote: SocketAddr) {
        let (tx, rx) = mpsc::channel::<Vec<u8>>(1);
        let applier_task = tokio::spawn(Self::apply_loop(applier, rx));

        loop {
            match read_framed_record(&mut stream, max_size).await {
                Ok(record) => {
                    if tx.send(record).await.is_err() {
                        break;
                    }
                }
                Err(ReadFrameError::Eof) => break,
                Err(err) => {
                    tracing::warn!(%remote, %err, "closing forward stream after decode error");
                    break;
                }
            }
        }

        drop(tx);
        let _ = applier_task.await;
    }

    async fn apply_loop(applier: Arc<Applier>, mut rx: mpsc::Receiver<Vec<u8>>) {
        while let Some(record) = rx.recv().await {
            if let Err(err) = applier.apply(record).await {
                tracing::warn!(%err, "forwarded tuple failed to apply");
            }
        }
    }
}

impl StreamHandler for ForwardHandler {
    fn handle(
        &self,
        _cancel: CancellationToken,
        stream: GanglionStream,
        remote: SocketAddr,
    ) -> Pin<Box<dyn Future<Output = ()> + Send>> {
        let applier = self.applier.clone();
        let max_size = self.max_size;
        Box::pin(async move { Self::run(applier, max_size, stream, remote).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eof_variant_is_distinguished_from_decode_errors() {
        assert!(matches!(ReadFrameError::Eof, ReadFrameError::Eof));
    }
}
