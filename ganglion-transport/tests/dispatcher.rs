// Exercises spec.md Property 2 / Scenario S5: an unknown stream-type
// byte gets the stream closed without invoking any handler, while a
// registered type is dispatched and handled.

use ganglion_core::StreamType;
use ganglion_transport::{tls, Dispatcher};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::{TlsAcceptor, TlsConnector};
use tokio_util::compat::TokioAsyncReadCompatExt;
use tokio_util::sync::CancellationToken;

async fn spawn_dispatcher(hits: Arc<AtomicUsize>) -> (SocketAddr, CancellationToken) {
    let (cert_chain, key) = tls::generate_self_signed("127.0.0.1").unwrap();
    let server_config = tls::server_config(cert_chain, key).unwrap();
    let acceptor = TlsAcceptor::from(server_config);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let dispatcher = Dispatcher::new(Duration::from_millis(200), 64);
    dispatcher.register(
        StreamType::Forward,
        Arc::new(move |_cancel, mut stream: ganglion_transport::GanglionStream, _remote| {
            let hits = hits.clone();
            Box::pin(async move {
                hits.fetch_add(1, Ordering::SeqCst);
                let mut buf = Vec::new();
                let _ = stream.read_to_end(&mut buf).await;
            }) as std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>>
        }),
    );

    let cancel = CancellationToken::new();
    dispatcher.bind(listener, acceptor, cancel.clone());
    (addr, cancel)
}

async fn raw_client_connection(addr: SocketAddr) -> yamux::Connection<tokio_util::compat::Compat<tokio_rustls::client::TlsStream<TcpStream>>> {
    let tcp = TcpStream::connect(addr).await.unwrap();
    let connector = TlsConnector::from(tls::insecure_client_config());
    let server_name = rustls::ServerName::try_from("127.0.0.1").unwrap();
    let tls_stream = connector.connect(server_name, tcp).await.unwrap();
    yamux::Connection::new(tls_stream.compat(), yamux::Config::default(), yamux::Mode::Client)
}

#[tokio::test]
async fn unknown_tag_closes_without_handler() {
    let hits = Arc::new(AtomicUsize::new(0));
    let (addr, _cancel) = spawn_dispatcher(hits.clone()).await;

    let mut conn = raw_client_connection(addr).await;
    let mut control = conn.control();
    tokio::spawn(async move { while let Ok(Some(_)) = conn.next_stream().await {} });

    let mut stream = control.open_stream().await.unwrap();
    use futures::io::AsyncWriteExt as _;
    stream.write_all(&[0x7F]).await.unwrap();
    stream.close().await.ok();

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn known_tag_invokes_handler() {
    let hits = Arc::new(AtomicUsize::new(0));
    let (addr, _cancel) = spawn_dispatcher(hits.clone()).await;

    let mut conn = raw_client_connection(addr).await;
    let mut control = conn.control();
    tokio::spawn(async move { while let Ok(Some(_)) = conn.next_stream().await {} });

    let mut stream = control.open_stream().await.unwrap();
    use futures::io::AsyncWriteExt as _;
    stream.write_all(&[StreamType::Forward.tag(), 1, 2, 3]).await.unwrap();
    stream.close().await.ok();

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}
