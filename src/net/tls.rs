use std::sync::Arc;

use rustls::pki_types::ServerName;
use rustls::RootCertStore;
use tokio_rustls::TlsConnector;

use crate::error::{Error, Result};
use crate::net::{MaybeTlsStream, Socket};
use crate::options::{ConnectOptions, SslMode};

/// Performs the TLS handshake over the raw stream, after the SSLRequest
/// prefix has been flushed.
///
/// `VERIFY_CA` and `VERIFY_IDENTITY` build a verifying client config from
/// the webpki roots plus any configured CA file. The lower modes accept any
/// certificate, matching the server-compatibility behavior of the C client.
pub(crate) async fn upgrade(
    stream: MaybeTlsStream,
    options: &ConnectOptions,
) -> Result<MaybeTlsStream> {
    let raw = match stream {
        MaybeTlsStream::Raw(raw) => raw,
        _ => return Err(Error::tls(TlsError("stream is already encrypted"))),
    };

    let config = client_config(options)?;
    let connector = TlsConnector::from(Arc::new(config));

    let host = ServerName::try_from(options.host.clone())
        .map_err(|_| Error::tls(TlsError("invalid host name for TLS")))?;

    let encrypted = connector
        .connect(host, raw)
        .await
        .map_err(Error::tls)?;

    Ok(MaybeTlsStream::Tls(Box::new(encrypted)))
}

fn client_config(options: &ConnectOptions) -> Result<rustls::ClientConfig> {
    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    if let Some(path) = &options.ssl_ca {
        let pem = std::fs::read(path)?;

        for cert in rustls_pemfile::certs(&mut pem.as_slice()) {
            let cert = cert.map_err(Error::tls)?;
            roots.add(cert).map_err(Error::tls)?;
        }
    }

    let mut config = rustls::ClientConfig::builder()
        .with_root_certificates(roots.clone())
        .with_no_client_auth();

    match options.ssl_mode {
        SslMode::VerifyCa => {
            // keep certificate verification, skip host name checks
            config.dangerous().set_certificate_verifier(Arc::new(
                verifier::NoHostnameVerification::new(roots)?,
            ));
        }

        SslMode::VerifyIdentity => {}

        // PREFERRED / REQUIRED encrypt without authenticating the peer
        _ => {
            config
                .dangerous()
                .set_certificate_verifier(Arc::new(verifier::NoVerification::new()));
        }
    }

    Ok(config)
}

#[derive(Debug)]
struct TlsError(&'static str);

impl std::fmt::Display for TlsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.0)
    }
}

impl std::error::Error for TlsError {}

mod verifier {
    use std::sync::Arc;

    use rustls::client::danger::{
        HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier,
    };
    use rustls::client::WebPkiServerVerifier;
    use rustls::crypto::ring::default_provider;
    use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
    use rustls::{DigitallySignedStruct, RootCertStore, SignatureScheme};

    use crate::error::{Error, Result};

    /// Accepts any certificate chain. Used for PREFERRED/REQUIRED, where
    /// the goal is channel encryption, not peer authentication.
    #[derive(Debug)]
    pub(super) struct NoVerification {
        provider: Arc<rustls::crypto::CryptoProvider>,
    }

    impl NoVerification {
        pub(super) fn new() -> Self {
            Self {
                provider: Arc::new(default_provider()),
            }
        }
    }

    impl ServerCertVerifier for NoVerification {
        fn verify_server_cert(
            &self,
            _end_entity: &CertificateDer<'_>,
            _intermediates: &[CertificateDer<'_>],
            _server_name: &ServerName<'_>,
            _ocsp_response: &[u8],
            _now: UnixTime,
        ) -> std::result::Result<ServerCertVerified, rustls::Error> {
            Ok(ServerCertVerified::assertion())
        }

        fn verify_tls12_signature(
            &self,
            message: &[u8],
            cert: &CertificateDer<'_>,
            dss: &DigitallySignedStruct,
        ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
            rustls::crypto::verify_tls12_signature(
                message,
                cert,
                dss,
                &self.provider.signature_verification_algorithms,
            )
        }

        fn verify_tls13_signature(
            &self,
            message: &[u8],
            cert: &CertificateDer<'_>,
            dss: &DigitallySignedStruct,
        ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
            rustls::crypto::verify_tls13_signature(
                message,
                cert,
                dss,
                &self.provider.signature_verification_algorithms,
            )
        }

        fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
            self.provider
                .signature_verification_algorithms
                .supported_schemes()
        }
    }

    /// Verifies the chain against the roots but ignores host name
    /// mismatches. Used for VERIFY_CA.
    #[derive(Debug)]
    pub(super) struct NoHostnameVerification {
        inner: Arc<WebPkiServerVerifier>,
    }

    impl NoHostnameVerification {
        pub(super) fn new(roots: RootCertStore) -> Result<Self> {
            let inner = WebPkiServerVerifier::builder(Arc::new(roots))
                .build()
                .map_err(Error::tls)?;

            Ok(Self { inner })
        }
    }

    impl ServerCertVerifier for NoHostnameVerification {
        fn verify_server_cert(
            &self,
            end_entity: &CertificateDer<'_>,
            intermediates: &[CertificateDer<'_>],
            _server_name: &ServerName<'_>,
            ocsp_response: &[u8],
            now: UnixTime,
        ) -> std::result::Result<ServerCertVerified, rustls::Error> {
            // delegate with a fixed name; mismatch errors are the only
            // thing this verifier forgives
            let name = ServerName::try_from("example.invalid").unwrap();

            match self.inner.verify_server_cert(
                end_entity,
                intermediates,
                &name,
                ocsp_response,
                now,
            ) {
                Ok(verified) => Ok(verified),
                Err(rustls::Error::InvalidCertificate(
                    rustls::CertificateError::NotValidForName,
                )) => Ok(ServerCertVerified::assertion()),
                Err(err) => Err(err),
            }
        }

        fn verify_tls12_signature(
            &self,
            message: &[u8],
            cert: &CertificateDer<'_>,
            dss: &DigitallySignedStruct,
        ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
            self.inner.verify_tls12_signature(message, cert, dss)
        }

        fn verify_tls13_signature(
            &self,
            message: &[u8],
            cert: &CertificateDer<'_>,
            dss: &DigitallySignedStruct,
        ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
            self.inner.verify_tls13_signature(message, cert, dss)
        }

        fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
            self.inner.supported_verify_schemes()
        }
    }
}
