//! TLS client setup for implicit TLS and STARTTLS
//! ([RFC 4642](https://datatracker.ietf.org/doc/html/rfc4642)).

use std::sync::Arc;
use std::time::Duration;

use tokio_rustls::TlsConnector;
use tokio_rustls::rustls::{ClientConfig, RootCertStore, pki_types::ServerName};

use crate::channel::NntpIo;
use crate::error::NntpError;

/// Build a shared TLS [`ClientConfig`] suitable for reuse across sessions.
///
/// rustls keeps session tickets inside the config, so sharing one
/// `Arc<ClientConfig>` per server lets later handshakes resume
/// ([RFC 8446 §2.2](https://datatracker.ietf.org/doc/html/rfc8446#section-2.2)).
///
/// When `cert_verification` is `false`, a no-op verifier is installed
/// (for servers with self-signed certificates).
pub fn build_tls_config(cert_verification: bool) -> Result<Arc<ClientConfig>, NntpError> {
    let provider = rustls::crypto::ring::default_provider();
    let _ = provider.install_default();

    let config = if cert_verification {
        let mut root_store = RootCertStore::empty();
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth()
    } else {
        ClientConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(NoVerifier::new()))
            .with_no_client_auth()
    };

    Ok(Arc::new(config))
}

/// Run a client handshake over an already connected stream.
///
/// `hostname` is checked against the server certificate, so it must be a
/// valid DNS name or IP address.
pub(crate) async fn tls_connect(
    io: Box<dyn NntpIo>,
    hostname: &str,
    config: Arc<ClientConfig>,
    timeout: Option<Duration>,
) -> Result<Box<dyn NntpIo>, NntpError> {
    let server_name = ServerName::try_from(hostname.to_string())
        .map_err(|_| NntpError::InvalidArgument(format!("invalid TLS server name: {hostname}")))?;
    let connector = TlsConnector::from(config);
    let handshake = connector.connect(server_name, io);

    let stream = match timeout {
        Some(limit) => tokio::time::timeout(limit, handshake)
            .await
            .map_err(|_| NntpError::Timeout)?,
        None => handshake.await,
    }
    .map_err(|e| NntpError::Tls(e.to_string()))?;

    tracing::debug!(host = hostname, "TLS handshake complete");
    Ok(Box::new(stream))
}

/// Accepts any server certificate. Installed by `build_tls_config(false)`.
#[derive(Debug)]
struct NoVerifier {
    supported_schemes: Vec<rustls::SignatureScheme>,
}

impl NoVerifier {
    fn new() -> Self {
        Self {
            supported_schemes: rustls::crypto::ring::default_provider()
                .signature_verification_algorithms
                .supported_schemes(),
        }
    }
}

impl rustls::client::danger::ServerCertVerifier for NoVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        self.supported_schemes.clone()
    }
}
