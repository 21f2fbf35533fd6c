/*
 * tls.rs
 * Copyright (C) 2026 Chris Burdess
 *
 * This file is part of Canter, an HTTP/1.x protocol library.
 *
 * Canter is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * Canter is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with Canter.  If not, see <http://www.gnu.org/licenses/>.
 */

//! TLS configuration built on rustls. Client roots come from the platform
//! store with webpki-roots as fallback; server material is loaded from PEM
//! files. Verify modes: Disabled (no verification / no client auth), Loose
//! (unverified peers allowed), Strict (full verification).

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};
use rustls::server::WebPkiClientVerifier;
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, ServerConfig, SignatureScheme};

use crate::error::{Error, Result};

/// Peer certificate verification policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VerifyMode {
    /// No verification; servers request no client certificate.
    Disabled,
    /// Peers may present unverifiable (or no) certificates.
    Loose,
    /// Full chain verification; servers require a client certificate.
    #[default]
    Strict,
}

/// TLS file and policy options, mirroring the configuration surface:
/// certificate file, private key file, DH file, CA path or file, verify mode.
#[derive(Debug, Clone, Default)]
pub struct TlsOptions {
    pub certificate_file: Option<PathBuf>,
    pub private_key_file: Option<PathBuf>,
    /// Accepted for configuration parity; rustls chooses its own key
    /// exchange groups, so the file content is not consumed.
    pub dh_file: Option<PathBuf>,
    pub ca_file: Option<PathBuf>,
    pub ca_path: Option<PathBuf>,
    pub verify: VerifyMode,
}

impl TlsOptions {
    /// Build a client-side context (for https connections).
    pub fn client_context(&self) -> Result<TlsContext> {
        let config = match self.verify {
            VerifyMode::Strict => ClientConfig::builder()
                .with_root_certificates(self.build_root_store()?)
                .with_no_client_auth(),
            VerifyMode::Loose | VerifyMode::Disabled => {
                ClientConfig::builder()
                    .dangerous()
                    .with_custom_certificate_verifier(Arc::new(AcceptAnyServerCert))
                    .with_no_client_auth()
            }
        };
        Ok(TlsContext {
            client: Some(Arc::new(config)),
            server: None,
        })
    }

    /// Build a server-side context from the certificate and key files.
    pub fn server_context(&self) -> Result<TlsContext> {
        let cert_file = self
            .certificate_file
            .as_ref()
            .ok_or_else(|| Error::state("server TLS requires a certificate file"))?;
        let key_file = self
            .private_key_file
            .as_ref()
            .ok_or_else(|| Error::state("server TLS requires a private key file"))?;
        let certs = load_certificates(cert_file)?;
        let key = load_private_key(key_file)?;

        let builder = match self.verify {
            VerifyMode::Disabled => ServerConfig::builder().with_no_client_auth(),
            VerifyMode::Loose | VerifyMode::Strict => {
                let roots = Arc::new(self.build_root_store()?);
                let verifier = match self.verify {
                    VerifyMode::Loose => WebPkiClientVerifier::builder(roots)
                        .allow_unauthenticated()
                        .build(),
                    _ => WebPkiClientVerifier::builder(roots).build(),
                }
                .map_err(|e| Error::new(format!("client verifier: {}", e)))?;
                ServerConfig::builder().with_client_cert_verifier(verifier)
            }
        };
        let config = builder
            .with_single_cert(certs, key)
            .map_err(Error::Tls)?;
        Ok(TlsContext {
            client: None,
            server: Some(Arc::new(config)),
        })
    }

    /// Root store: configured CA file/path when given, otherwise platform
    /// native certs with webpki-roots as fallback.
    fn build_root_store(&self) -> Result<RootCertStore> {
        let mut roots = RootCertStore::empty();
        if let Some(file) = &self.ca_file {
            for cert in load_certificates(file)? {
                roots
                    .add(cert)
                    .map_err(|e| Error::new(format!("bad CA certificate: {}", e)))?;
            }
        }
        if let Some(dir) = &self.ca_path {
            let entries = std::fs::read_dir(dir).map_err(Error::Io)?;
            for entry in entries {
                let path = entry.map_err(Error::Io)?.path();
                if path.is_file() {
                    if let Ok(certs) = load_certificates(&path) {
                        for cert in certs {
                            roots.add(cert).ok();
                        }
                    }
                }
            }
        }
        if self.ca_file.is_none() && self.ca_path.is_none() {
            if let Ok(certs) = rustls_native_certs::load_native_certs() {
                for cert in certs {
                    let _ = roots.add(cert);
                }
            }
            if roots.is_empty() {
                roots.roots = webpki_roots::TLS_SERVER_ROOTS.iter().cloned().collect();
            }
        }
        Ok(roots)
    }
}

/// Built TLS configuration, one side or both, shared between connections.
#[derive(Clone, Default, Debug)]
pub struct TlsContext {
    client: Option<Arc<ClientConfig>>,
    server: Option<Arc<ServerConfig>>,
}

impl TlsContext {
    /// Default client context with strict verification.
    pub fn default_client() -> Result<Self> {
        TlsOptions::default().client_context()
    }

    pub fn client_config(&self) -> Result<Arc<ClientConfig>> {
        self.client
            .clone()
            .ok_or_else(|| Error::state("no client TLS configuration"))
    }

    pub fn server_config(&self) -> Result<Arc<ServerConfig>> {
        self.server
            .clone()
            .ok_or_else(|| Error::state("no server TLS configuration"))
    }
}

fn load_certificates(path: &Path) -> Result<Vec<CertificateDer<'static>>> {
    let file = File::open(path).map_err(Error::Io)?;
    let mut reader = BufReader::new(file);
    let mut certs = Vec::new();
    for cert in rustls_pemfile::certs(&mut reader) {
        certs.push(cert.map_err(Error::Io)?);
    }
    if certs.is_empty() {
        return Err(Error::new(format!(
            "no certificates in {}",
            path.display()
        )));
    }
    Ok(certs)
}

fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>> {
    let file = File::open(path).map_err(Error::Io)?;
    let mut reader = BufReader::new(file);
    rustls_pemfile::private_key(&mut reader)
        .map_err(Error::Io)?
        .ok_or_else(|| Error::new(format!("no private key in {}", path.display())))
}

/// Verifier for Disabled/Loose client mode: accepts any server certificate.
#[derive(Debug)]
struct AcceptAnyServerCert;

impl ServerCertVerifier for AcceptAnyServerCert {
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
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        vec![
            SignatureScheme::RSA_PKCS1_SHA256,
            SignatureScheme::RSA_PKCS1_SHA384,
            SignatureScheme::RSA_PKCS1_SHA512,
            SignatureScheme::RSA_PSS_SHA256,
            SignatureScheme::RSA_PSS_SHA384,
            SignatureScheme::RSA_PSS_SHA512,
            SignatureScheme::ECDSA_NISTP256_SHA256,
            SignatureScheme::ECDSA_NISTP384_SHA384,
            SignatureScheme::ED25519,
        ]
    }
}

/// Extract the common name from a DER certificate: locate the CN attribute
/// OID (2.5.4.3) and read the directory string that follows. The subject RDN
/// appears after the issuer's, so the last occurrence is taken.
pub(crate) fn common_name(der: &[u8]) -> Option<String> {
    const CN_OID: &[u8] = &[0x06, 0x03, 0x55, 0x04, 0x03];
    let mut found: Option<String> = None;
    let mut i = 0;
    while i + CN_OID.len() < der.len() {
        if &der[i..i + CN_OID.len()] != CN_OID {
            i += 1;
            continue;
        }
        let mut p = i + CN_OID.len();
        // directory string: UTF8String, PrintableString, IA5String, TeletexString
        if p >= der.len() || !matches!(der[p], 0x0c | 0x13 | 0x16 | 0x14) {
            i += 1;
            continue;
        }
        p += 1;
        if p >= der.len() {
            break;
        }
        let (len, header) = match der[p] {
            l if l < 0x80 => (l as usize, 1),
            0x81 if p + 1 < der.len() => (der[p + 1] as usize, 2),
            0x82 if p + 2 < der.len() => {
                (((der[p + 1] as usize) << 8) | der[p + 2] as usize, 3)
            }
            _ => {
                i += 1;
                continue;
            }
        };
        let start = p + header;
        if start + len <= der.len() {
            if let Ok(s) = std::str::from_utf8(&der[start..start + len]) {
                found = Some(s.to_string());
            }
        }
        i = start + len;
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn common_name_from_minimal_der() {
        // Hand-built fragment: ... 06 03 55 04 03 (OID cn) 0c 07 "example" ...
        let mut der = vec![0x30, 0x10];
        der.extend_from_slice(&[0x06, 0x03, 0x55, 0x04, 0x03]);
        der.extend_from_slice(&[0x0c, 0x07]);
        der.extend_from_slice(b"example");
        assert_eq!(common_name(&der), Some("example".to_string()));
    }

    #[test]
    fn common_name_takes_last_occurrence() {
        let mut der = Vec::new();
        der.extend_from_slice(&[0x06, 0x03, 0x55, 0x04, 0x03, 0x13, 0x02]);
        der.extend_from_slice(b"ca");
        der.extend_from_slice(&[0x06, 0x03, 0x55, 0x04, 0x03, 0x0c, 0x04]);
        der.extend_from_slice(b"leaf");
        assert_eq!(common_name(&der), Some("leaf".to_string()));
    }

    #[test]
    fn common_name_absent() {
        assert_eq!(common_name(&[0x30, 0x03, 0x02, 0x01, 0x01]), None);
    }

    #[test]
    fn server_context_requires_files() {
        let err = TlsOptions::default().server_context().unwrap_err();
        assert!(err.is_state());
    }
}
