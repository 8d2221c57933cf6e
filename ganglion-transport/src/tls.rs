// ganglion-transport/src/tls.rs
//
// TLS is out of the core's scope for certificate *provisioning*
// (spec.md §1 Out-of-scope), but the wire format requires a concrete
// rustls configuration to hand to the dispatcher's accept loop and the
// pool's dialer. Certificate acquisition itself is left to the caller
// (`GanglionConfig::tls` in ganglion-node); this module only turns
// already-loaded cert/key material into rustls configs, following the
// teacher's preference for `rustls` + `rustls-pemfile` in its workspace
// dependency set.

use rustls::{Certificate, PrivateKey};
use std::io::BufReader;
use std::sync::Arc;

pub fn server_config(
    cert_chain: Vec<Certificate>,
    key: PrivateKey,
) -> anyhow::Result<Arc<rustls::ServerConfig>> {
    let config = rustls::ServerConfig::builder()
        .with_safe_defaults()
        .with_no_client_auth()
        .with_single_cert(cert_chain, key)?;
    Ok(Arc::new(config))
}

pub fn client_config(root_store: rustls::RootCertStore) -> Arc<rustls::ClientConfig> {
    let config = rustls::ClientConfig::builder()
        .with_safe_defaults()
        .with_root_certificates(root_store)
        .with_no_client_auth();
    Arc::new(config)
}

/// A verifier that accepts any server certificate. Cluster peers
/// authenticate each other out of band (shared gossip secret / network
/// perimeter); this is used only where a deployment has not supplied a
/// root CA, and for integration tests against self-signed certificates.
pub struct NoVerifier;

impl rustls::client::ServerCertVerifier for NoVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &Certificate,
        _intermediates: &[Certificate],
        _server_name: &rustls::ServerName,
        _scts: &mut dyn Iterator<Item = &[u8]>,
        _ocsp_response: &[u8],
        _now: std::time::SystemTime,
    ) -> Result<rustls::client::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::ServerCertVerified::assertion())
    }
}

pub fn insecure_client_config() -> Arc<rustls::ClientConfig> {
    let mut config = rustls::ClientConfig::builder()
        .with_safe_defaults()
        .with_root_certificates(rustls::RootCertStore::empty())
        .with_no_client_auth();
    config
        .dangerous()
        .set_certificate_verifier(Arc::new(NoVerifier));
    Arc::new(config)
}

/// Self-signed cert/key pair for integration tests, grounded on the
/// teacher's `rcgen` workspace dependency (used the same way in its own
/// `cell-transport/tests/secure.rs`).
pub fn generate_self_signed(subject_alt_name: &str) -> anyhow::Result<(Vec<Certificate>, PrivateKey)> {
    let cert = rcgen::generate_simple_self_signed(vec![subject_alt_name.to_string()])?;
    let cert_der = cert.serialize_der()?;
    let key_der = cert.serialize_private_key_der();
    Ok((vec![Certificate(cert_der)], PrivateKey(key_der)))
}

pub fn load_cert_chain(pem: &[u8]) -> anyhow::Result<Vec<Certificate>> {
    let mut reader = BufReader::new(pem);
    let certs = rustls_pemfile::certs(&mut reader)?;
    Ok(certs.into_iter().map(Certificate).collect())
}

pub fn load_private_key(pem: &[u8]) -> anyhow::Result<PrivateKey> {
    let mut reader = BufReader::new(pem);
    let keys = rustls_pemfile::pkcs8_private_keys(&mut reader)?;
    let key = keys
        .into_iter()
        .next()
        .ok_or_else(|| anyhow::anyhow!("no PKCS8 private key found in PEM"))?;
    Ok(PrivateKey(key))
}
