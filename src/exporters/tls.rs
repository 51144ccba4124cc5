// SPDX-License-Identifier: Apache-2.0

use hyper_rustls::ConfigBuilderExt;
use rustls::ClientConfig;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{CryptoProvider, verify_tls12_signature, verify_tls13_signature};
use rustls::{DigitallySignedStruct, RootCertStore, SignatureScheme};
use rustls_pki_types::{CertificateDer, ServerName, UnixTime};
use std::sync::Arc;
use tower::BoxError;
use tracing::warn;

/// Client side TLS settings for exporters
#[derive(Clone, Debug, Default)]
pub struct TlsConfig {
    skip_verify: bool,
}

impl TlsConfig {
    pub fn new(skip_verify: bool) -> Self {
        Self { skip_verify }
    }

    pub fn skip_verify(&self) -> bool {
        self.skip_verify
    }

    /// Build a rustls config that trusts the platform roots, or any server
    /// certificate when verification is disabled.
    pub fn into_client_config(self) -> Result<ClientConfig, BoxError> {
        let builder = if self.skip_verify {
            let provider = CryptoProvider::get_default()
                .cloned()
                .unwrap_or_else(|| Arc::new(rustls::crypto::aws_lc_rs::default_provider()));

            ClientConfig::builder()
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(SkipServerVerification { provider }))
        } else {
            match ClientConfig::builder().with_native_roots() {
                Ok(builder) => builder,
                Err(e) => {
                    // plain http endpoints keep working without any roots
                    warn!(error = %e, "No native root certificates available");
                    ClientConfig::builder().with_root_certificates(RootCertStore::empty())
                }
            }
        };

        Ok(builder.with_no_client_auth())
    }
}

// Accepts any server certificate. Signatures are still checked so the
// handshake itself stays well formed.
//
// ONLY FOR ENDPOINTS USING SELF-SIGNED CERTIFICATES THAT YOU FULLY TRUST.
#[derive(Debug)]
struct SkipServerVerification {
    provider: Arc<CryptoProvider>,
}

impl ServerCertVerifier for SkipServerVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
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
