//! Plugin-backed signing core: drives an external signing plugin through a
//! four-command JSON protocol and wraps the result in a JWS envelope carrying
//! the X.509 certificate chain, plus the matching envelope verifier.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

pub mod algorithm;
pub mod cert;
mod crypto;
pub mod envelope;
pub mod plugin;
pub mod signer;
pub mod verifier;

pub use algorithm::{HashAlgorithm, KeySpec, SignatureAlgorithm};
pub use cert::CertificateProfileError;
pub use envelope::{
    Descriptor, JwsEnvelope, PayloadClaims, ProtectedHeader, UnprotectedHeader,
    MEDIA_TYPE_JWS_ENVELOPE, MEDIA_TYPE_PAYLOAD,
};
pub use plugin::{PluginMetadata, PluginTransport, TransportError, CONTRACT_VERSION};
pub use signer::{PluginSigner, SignOptions};
pub use verifier::{VerifiedPayload, Verifier, VerifyOptions};

/// Protocol step names as they appear in keyID mismatch messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolStep {
    DescribeKey,
    GenerateSignature,
}

impl fmt::Display for ProtocolStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolStep::DescribeKey => f.write_str("describeKey"),
            ProtocolStep::GenerateSignature => f.write_str("generateSignature"),
        }
    }
}

#[derive(Debug, Error)]
pub enum SignError {
    #[error("metadata command failed: {0}")]
    Metadata(TransportError),
    #[error("plugin does not have signing capabilities")]
    NoSigningCapability,
    #[error("describe-key command failed: {0}")]
    DescribeKey(TransportError),
    #[error("keyID in {step} response \"{got}\" does not match request \"{requested}\"")]
    KeyIdMismatch {
        step: ProtocolStep,
        got: String,
        requested: String,
    },
    #[error("keySpec \"{key_spec}\" for key \"{key_id}\" is not supported")]
    UnsupportedKeySpec { key_spec: String, key_id: String },
    #[error("token is expired")]
    TokenExpired,
    #[error("generate-signature command failed: {0}")]
    GenerateSignature(TransportError),
    #[error("signing algorithm \"{0}\" in generateSignature response is not supported")]
    UnsupportedSigningAlgorithm(String),
    #[error("empty certificate chain")]
    EmptyCertChain,
    #[error("x509: malformed certificate")]
    MalformedCertificate,
    #[error(transparent)]
    CertificateProfile(#[from] CertificateProfileError),
    #[error("signing certificate does not meet the minimum requirements: {0}")]
    EnvelopeCertificateProfile(#[source] CertificateProfileError),
    #[error("signature verification error")]
    SignatureVerification,
    #[error("generate-envelope command failed: {0}")]
    GenerateEnvelope(TransportError),
    #[error("signatureEnvelopeType in generateEnvelope response \"{got}\" does not match request \"{requested}\"")]
    EnvelopeTypeMismatch { got: String, requested: String },
    #[error("envelope content does not match envelope format")]
    MalformedEnvelope,
    #[error("signature algorithm \"{0}\" is not supported")]
    UnsupportedJwsAlgorithm(String),
    #[error("payload serialization failed")]
    PayloadSerialization,
    #[error("sign operation cancelled")]
    Cancelled,
}

#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("envelope content does not match envelope format")]
    MalformedEnvelope,
    #[error("signature algorithm \"{0}\" is not supported")]
    UnsupportedAlgorithm(String),
    #[error("x509: malformed certificate")]
    MalformedCertificate,
    #[error("signing certificate does not meet the minimum requirements: {0}")]
    CertificateProfile(#[source] CertificateProfileError),
    #[error("certificate chain verification failed: {0}")]
    UntrustedChain(String),
    #[error("signature algorithm \"{0}\" does not match the signing certificate key")]
    AlgorithmMismatch(String),
    #[error("signature verification error")]
    SignatureVerification,
    #[error("token is expired")]
    TokenExpired,
    #[error("payload content does not match payload format")]
    MalformedPayload,
}

/// RFC 8785 canonical JSON. The bytes a plugin signs must be exactly the
/// bytes a verifier reconstructs, so every signed structure goes through
/// this single serialisation path.
pub(crate) fn to_jcs_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>, serde_json::Error> {
    serde_jcs::to_vec(value)
}
