//! TLS configuration and the pinned-certificate trust model.
//!
//! Peers and the rendezvous service do not use CA validation. Every
//! installation holds the same shared certificate, and a connection is trusted
//! only if the other side presents a certificate that is byte-identical to a
//! pinned one. Host names are never checked: peers are reached by the raw
//! address the rendezvous service relays, which no certificate could name.
//!
//! Both directions are authenticated: the dialing side pins the listener's
//! certificate and the listening side requires and pins the dialer's client
//! certificate.

use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{CryptoProvider, verify_tls12_signature, verify_tls13_signature};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};
use rustls::server::danger::{ClientCertVerified, ClientCertVerifier};
use rustls::{
    CertificateError, ClientConfig, DigitallySignedStruct, DistinguishedName, ServerConfig,
    SignatureScheme,
};
use tokio_rustls::{TlsAcceptor, TlsConnector};
use tracing::warn;

use crate::error::SessionError;

/// Certificate chain and private key this peer presents.
#[derive(Debug)]
pub struct TlsIdentity {
    cert_chain: Vec<CertificateDer<'static>>,
    key: PrivateKeyDer<'static>,
}

impl Clone for TlsIdentity {
    fn clone(&self) -> Self {
        Self {
            cert_chain: self.cert_chain.clone(),
            key: self.key.clone_key(),
        }
    }
}

impl TlsIdentity {
    pub fn new(
        cert_chain: Vec<CertificateDer<'static>>,
        key: PrivateKeyDer<'static>,
    ) -> Result<Self, SessionError> {
        if cert_chain.is_empty() {
            return Err(SessionError::InvalidArgument(
                "certificate chain is empty".into(),
            ));
        }
        Ok(Self { cert_chain, key })
    }

    /// Parses a PEM certificate chain and a PEM private key.
    pub fn from_pem(cert_pem: &[u8], key_pem: &[u8]) -> Result<Self, SessionError> {
        let cert_chain = parse_certificates(cert_pem)?;
        let key = rustls_pemfile::private_key(&mut &key_pem[..])?.ok_or_else(|| {
            SessionError::InvalidArgument("no private key found in PEM input".into())
        })?;
        Self::new(cert_chain, key)
    }

    /// The end-entity certificate presented to the other side.
    pub fn certificate(&self) -> &CertificateDer<'static> {
        &self.cert_chain[0]
    }
}

/// Parses every certificate in a PEM bundle.
pub fn parse_certificates(pem: &[u8]) -> Result<Vec<CertificateDer<'static>>, SessionError> {
    let certs = rustls_pemfile::certs(&mut &pem[..]).collect::<Result<Vec<_>, _>>()?;
    if certs.is_empty() {
        return Err(SessionError::InvalidArgument(
            "no certificate found in PEM input".into(),
        ));
    }
    Ok(certs)
}

/// Ready-to-use client and server TLS configurations for one identity.
#[derive(Clone)]
pub struct TlsContext {
    client: Arc<ClientConfig>,
    server: Arc<ServerConfig>,
}

impl TlsContext {
    /// Builds configurations that present `identity` and trust exactly the
    /// identity's own certificate plus `extra_pins`.
    pub fn new(
        identity: &TlsIdentity,
        extra_pins: Vec<CertificateDer<'static>>,
    ) -> Result<Self, SessionError> {
        let provider = Arc::new(rustls::crypto::ring::default_provider());

        let mut pinned = vec![identity.certificate().clone()];
        pinned.extend(extra_pins);
        let verifier = Arc::new(PinnedCertVerifier::new(pinned, Arc::clone(&provider)));

        // Safe defaults are TLS 1.3 and 1.2; nothing older is negotiable.
        let client = ClientConfig::builder_with_provider(Arc::clone(&provider))
            .with_safe_default_protocol_versions()?
            .dangerous()
            .with_custom_certificate_verifier(verifier.clone())
            .with_client_auth_cert(identity.cert_chain.clone(), identity.key.clone_key())?;

        let server = ServerConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()?
            .with_client_cert_verifier(verifier)
            .with_single_cert(identity.cert_chain.clone(), identity.key.clone_key())?;

        Ok(Self {
            client: Arc::new(client),
            server: Arc::new(server),
        })
    }

    pub fn connector(&self) -> TlsConnector {
        TlsConnector::from(Arc::clone(&self.client))
    }

    pub fn acceptor(&self) -> TlsAcceptor {
        TlsAcceptor::from(Arc::clone(&self.server))
    }
}

impl std::fmt::Debug for TlsContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsContext").finish_non_exhaustive()
    }
}

/// Accepts a certificate only if it equals one of the pinned certificates.
///
/// Signatures are still verified with the provider's algorithms, so the
/// remote side must hold the private key matching the pinned certificate.
#[derive(Debug)]
struct PinnedCertVerifier {
    pinned: Vec<CertificateDer<'static>>,
    provider: Arc<CryptoProvider>,
}

impl PinnedCertVerifier {
    fn new(pinned: Vec<CertificateDer<'static>>, provider: Arc<CryptoProvider>) -> Self {
        Self { pinned, provider }
    }

    fn check(&self, end_entity: &CertificateDer<'_>) -> Result<(), rustls::Error> {
        if self.pinned.iter().any(|pin| pin.as_ref() == end_entity.as_ref()) {
            Ok(())
        } else {
            warn!("rejecting certificate that matches no pinned certificate");
            Err(rustls::Error::InvalidCertificate(
                CertificateError::ApplicationVerificationFailure,
            ))
        }
    }
}

impl ServerCertVerifier for PinnedCertVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        self.check(end_entity)?;
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(
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
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(
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

impl ClientCertVerifier for PinnedCertVerifier {
    fn root_hint_subjects(&self) -> &[DistinguishedName] {
        &[]
    }

    fn verify_client_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _now: UnixTime,
    ) -> Result<ClientCertVerified, rustls::Error> {
        self.check(end_entity)?;
        Ok(ClientCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(
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
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(
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
