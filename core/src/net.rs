/*
 * net.rs
 * Copyright (C) 2026 Chris Burdess
 *
 * This file is part of zhttp, a multi-protocol HTTP client library.
 *
 * zhttp is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * zhttp is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with zhttp.  If not, see <http://www.gnu.org/licenses/>.
 */

//! TLS connection helpers: rustls client configs (root store, ALPN, minimum
//! version, optional no-verification mode) and the TCP/TLS connect path with
//! its timeouts.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::client::TlsStream as TokioTlsStream;
use tokio_rustls::rustls::client::ClientConfig as RustlsClientConfig;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::RootCertStore;
use tokio_rustls::TlsConnector;
use tracing::{debug, warn};

use crate::config::{TlsConfig, TlsVersion};
use crate::error::HttpError;

/// Build a root certificate store: platform native certs first, then
/// webpki-roots as fallback.
fn build_root_store() -> RootCertStore {
    let mut root_store = RootCertStore::empty();
    if let Ok(certs) = rustls_native_certs::load_native_certs() {
        for cert in certs {
            let _ = root_store.add(cert);
        }
    }
    if root_store.is_empty() {
        root_store.roots = webpki_roots::TLS_SERVER_ROOTS.iter().cloned().collect();
    }
    root_store
}

static TLS13_ONLY: &[&tokio_rustls::rustls::SupportedProtocolVersion] =
    &[&tokio_rustls::rustls::version::TLS13];

fn protocol_versions(min: TlsVersion) -> &'static [&'static tokio_rustls::rustls::SupportedProtocolVersion] {
    match min {
        TlsVersion::Tls13 => TLS13_ONLY,
        TlsVersion::Tls12 => tokio_rustls::rustls::ALL_VERSIONS,
        // rustls does not implement TLS 1.0/1.1; clamp to 1.2.
        TlsVersion::Tls10 | TlsVersion::Tls11 => {
            warn!("TLS minimum version below 1.2 requested; clamping to 1.2");
            tokio_rustls::rustls::ALL_VERSIONS
        }
    }
}

/// Build a rustls client config for the given TLS options. ALPN protocols
/// are offered in the configured order.
pub fn client_config(tls: &TlsConfig) -> Arc<RustlsClientConfig> {
    let builder = RustlsClientConfig::builder_with_protocol_versions(protocol_versions(tls.min_version));
    let mut config = if tls.verify_certificates {
        builder
            .with_root_certificates(build_root_store())
            .with_no_client_auth()
    } else {
        warn!("TLS certificate verification disabled");
        builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(danger::NoVerification))
            .with_no_client_auth()
    };
    config.alpn_protocols = tls
        .alpn_protocols
        .iter()
        .map(|p| p.as_bytes().to_vec())
        .collect();
    Arc::new(config)
}

/// Open a TCP connection with the connect timeout applied. I/O error kinds
/// map onto the client error taxonomy.
pub async fn connect_tcp(host: &str, port: u16, connect_timeout: Duration) -> Result<TcpStream, HttpError> {
    let addr = format!("{}:{}", host, port);
    let tcp = timeout(connect_timeout, TcpStream::connect(&addr))
        .await
        .map_err(|_| HttpError::ConnectTimeout)?
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => HttpError::DnsHostNotFound,
            _ => {
                // getaddrinfo failures surface as ErrorKind::Other ("failed
                // to lookup address information").
                if e.to_string().contains("lookup address") {
                    HttpError::DnsError(e.to_string())
                } else {
                    HttpError::from(e)
                }
            }
        })?;
    let _ = tcp.set_nodelay(true);
    debug!(host, port, "TCP connected");
    Ok(tcp)
}

/// Perform a TLS handshake over an established TCP stream. SNI is the host
/// name; ALPN comes from the config.
pub async fn connect_tls(
    tcp: TcpStream,
    host: &str,
    config: Arc<RustlsClientConfig>,
    connect_timeout: Duration,
) -> Result<TokioTlsStream<TcpStream>, HttpError> {
    let server_name: ServerName<'static> = ServerName::try_from(host.to_string())
        .map_err(|_| HttpError::InvalidUrl(format!("invalid SNI host: {}", host)))?;
    let connector = TlsConnector::from(config);
    let tls = timeout(connect_timeout, connector.connect(server_name, tcp))
        .await
        .map_err(|_| HttpError::ConnectTimeout)?
        .map_err(|e| {
            let msg = e.to_string();
            if msg.contains("certificate") || msg.contains("UnknownIssuer") {
                HttpError::TlsCertificateVerificationFailed
            } else {
                HttpError::Tls(msg)
            }
        })?;
    debug!(host, alpn = ?tls.get_ref().1.alpn_protocol(), "TLS established");
    Ok(tls)
}

/// The ALPN protocol negotiated on a TLS stream, if any.
pub fn negotiated_alpn(tls: &TokioTlsStream<TcpStream>) -> Option<Vec<u8>> {
    tls.get_ref().1.alpn_protocol().map(|p| p.to_vec())
}

mod danger {
    //! Certificate verifier that accepts everything. Only reachable through
    //! `TlsConfig { verify_certificates: false, .. }`.

    use tokio_rustls::rustls::client::danger::{
        HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier,
    };
    use tokio_rustls::rustls::pki_types::{CertificateDer, ServerName, UnixTime};
    use tokio_rustls::rustls::{DigitallySignedStruct, Error, SignatureScheme};

    #[derive(Debug)]
    pub struct NoVerification;

    impl ServerCertVerifier for NoVerification {
        fn verify_server_cert(
            &self,
            _end_entity: &CertificateDer<'_>,
            _intermediates: &[CertificateDer<'_>],
            _server_name: &ServerName<'_>,
            _ocsp_response: &[u8],
            _now: UnixTime,
        ) -> Result<ServerCertVerified, Error> {
            Ok(ServerCertVerified::assertion())
        }

        fn verify_tls12_signature(
            &self,
            _message: &[u8],
            _cert: &CertificateDer<'_>,
            _dss: &DigitallySignedStruct,
        ) -> Result<HandshakeSignatureValid, Error> {
            Ok(HandshakeSignatureValid::assertion())
        }

        fn verify_tls13_signature(
            &self,
            _message: &[u8],
            _cert: &CertificateDer<'_>,
            _dss: &DigitallySignedStruct,
        ) -> Result<HandshakeSignatureValid, Error> {
            Ok(HandshakeSignatureValid::assertion())
        }

        fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
            vec![
                SignatureScheme::RSA_PKCS1_SHA256,
                SignatureScheme::RSA_PKCS1_SHA384,
                SignatureScheme::RSA_PKCS1_SHA512,
                SignatureScheme::ECDSA_NISTP256_SHA256,
                SignatureScheme::ECDSA_NISTP384_SHA384,
                SignatureScheme::ECDSA_NISTP521_SHA512,
                SignatureScheme::RSA_PSS_SHA256,
                SignatureScheme::RSA_PSS_SHA384,
                SignatureScheme::RSA_PSS_SHA512,
                SignatureScheme::ED25519,
            ]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alpn_order_preserved() {
        let cfg = client_config(&TlsConfig::default());
        assert_eq!(cfg.alpn_protocols, vec![b"h2".to_vec(), b"http/1.1".to_vec()]);
    }

    #[test]
    fn no_verify_config_builds() {
        let cfg = client_config(&TlsConfig {
            verify_certificates: false,
            ..TlsConfig::default()
        });
        assert!(!cfg.alpn_protocols.is_empty());
    }
}
