//! Plugin-backed signing orchestration.
//!
//! One metadata step selects the sub-protocol: raw-signature plugins sign a
//! JWS compact input and this crate assembles the envelope; envelope plugins
//! return a complete envelope that is validated and passed through verbatim.

use std::collections::BTreeMap;

use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;
use x509_parser::prelude::X509Certificate;

use crate::algorithm::{KeySpec, SignatureAlgorithm};
use crate::cert::{parse_der_certificate, validate_code_signing_profile};
use crate::crypto::verify_signature;
use crate::envelope::{
    compact_signing_input, Descriptor, JwsEnvelope, PayloadClaims, ProtectedHeader,
    MEDIA_TYPE_JWS_ENVELOPE, MEDIA_TYPE_PAYLOAD,
};
use crate::plugin::{
    Capability, DescribeKeyRequest, GenerateEnvelopeRequest, GenerateSignatureRequest,
    GetMetadataRequest, PluginTransport, CONTRACT_VERSION,
};
use crate::{to_jcs_bytes, ProtocolStep, SignError};

#[derive(Debug, Clone, Default)]
pub struct SignOptions {
    /// Absolute expiry of the signature. Must lie in the future.
    pub expiry: Option<OffsetDateTime>,
}

/// Signs descriptors by delegating the cryptographic operation to a plugin
/// reached through `T`.
pub struct PluginSigner<T> {
    transport: T,
    key_id: String,
    plugin_config: BTreeMap<String, String>,
}

impl<T: PluginTransport> PluginSigner<T> {
    pub fn new(transport: T, key_id: impl Into<String>) -> Self {
        PluginSigner {
            transport,
            key_id: key_id.into(),
            plugin_config: BTreeMap::new(),
        }
    }

    /// Plugin-specific configuration passed through on every keyed request.
    pub fn with_plugin_config(mut self, plugin_config: BTreeMap<String, String>) -> Self {
        self.plugin_config = plugin_config;
        self
    }

    /// Signs `descriptor` and returns the serialised JWS envelope.
    pub fn sign(
        &self,
        cancel: &CancellationToken,
        descriptor: &Descriptor,
        options: &SignOptions,
    ) -> Result<Vec<u8>, SignError> {
        if cancel.is_cancelled() {
            return Err(SignError::Cancelled);
        }
        let metadata = self
            .transport
            .get_metadata(cancel, &GetMetadataRequest::default())
            .map_err(SignError::Metadata)?;
        match metadata.first_signing_capability() {
            Some(Capability::SignatureGenerator) => {
                self.sign_with_raw_signature(cancel, descriptor, options)
            }
            Some(Capability::EnvelopeGenerator) => {
                self.sign_with_envelope(cancel, descriptor, options)
            }
            None => Err(SignError::NoSigningCapability),
        }
    }

    fn sign_with_raw_signature(
        &self,
        cancel: &CancellationToken,
        descriptor: &Descriptor,
        options: &SignOptions,
    ) -> Result<Vec<u8>, SignError> {
        if cancel.is_cancelled() {
            return Err(SignError::Cancelled);
        }
        let request = DescribeKeyRequest {
            contract_version: CONTRACT_VERSION.to_string(),
            key_id: self.key_id.clone(),
            plugin_config: self.plugin_config.clone(),
        };
        let described = self
            .transport
            .describe_key(cancel, &request)
            .map_err(SignError::DescribeKey)?;
        if described.key_id != self.key_id {
            return Err(SignError::KeyIdMismatch {
                step: ProtocolStep::DescribeKey,
                got: described.key_id,
                requested: self.key_id.clone(),
            });
        }
        let key_spec =
            KeySpec::from_name(&described.key_spec).ok_or(SignError::UnsupportedKeySpec {
                key_spec: described.key_spec,
                key_id: self.key_id.clone(),
            })?;
        let algorithm = key_spec.signature_algorithm();

        let claims = build_claims(descriptor, options)?;
        let protected_json = to_jcs_bytes(&ProtectedHeader::new(algorithm.jws()))
            .map_err(|_| SignError::PayloadSerialization)?;
        let payload_json = to_jcs_bytes(&claims).map_err(|_| SignError::PayloadSerialization)?;
        let signing_input = compact_signing_input(&protected_json, &payload_json);

        if cancel.is_cancelled() {
            return Err(SignError::Cancelled);
        }
        let request = GenerateSignatureRequest {
            contract_version: CONTRACT_VERSION.to_string(),
            key_id: self.key_id.clone(),
            key_spec: key_spec.name().to_string(),
            hash_algorithm: algorithm.hash().name().to_string(),
            payload: signing_input.clone(),
            plugin_config: self.plugin_config.clone(),
        };
        let response = self
            .transport
            .generate_signature(cancel, &request)
            .map_err(SignError::GenerateSignature)?;
        if response.key_id != self.key_id {
            return Err(SignError::KeyIdMismatch {
                step: ProtocolStep::GenerateSignature,
                got: response.key_id,
                requested: self.key_id.clone(),
            });
        }
        let signing_algorithm = SignatureAlgorithm::from_name(&response.signing_algorithm)
            .ok_or_else(|| {
                SignError::UnsupportedSigningAlgorithm(response.signing_algorithm.clone())
            })?;
        if response.certificate_chain.is_empty() {
            return Err(SignError::EmptyCertChain);
        }
        let leaf = parse_chain(&response.certificate_chain)?;
        validate_code_signing_profile(&leaf)?;
        verify_signature(signing_algorithm, &leaf, &signing_input, &response.signature)
            .map_err(|_| SignError::SignatureVerification)?;

        let envelope = JwsEnvelope::new(
            &protected_json,
            &payload_json,
            &response.signature,
            response.certificate_chain,
        );
        envelope
            .to_bytes()
            .map_err(|_| SignError::PayloadSerialization)
    }

    fn sign_with_envelope(
        &self,
        cancel: &CancellationToken,
        descriptor: &Descriptor,
        options: &SignOptions,
    ) -> Result<Vec<u8>, SignError> {
        if cancel.is_cancelled() {
            return Err(SignError::Cancelled);
        }
        let claims = build_claims(descriptor, options)?;
        let payload_json = to_jcs_bytes(&claims).map_err(|_| SignError::PayloadSerialization)?;
        let request = GenerateEnvelopeRequest {
            contract_version: CONTRACT_VERSION.to_string(),
            key_id: self.key_id.clone(),
            payload: payload_json,
            signature_envelope_type: MEDIA_TYPE_JWS_ENVELOPE.to_string(),
            payload_type: MEDIA_TYPE_PAYLOAD.to_string(),
            plugin_config: self.plugin_config.clone(),
        };
        let response = self
            .transport
            .generate_envelope(cancel, &request)
            .map_err(SignError::GenerateEnvelope)?;
        if response.signature_envelope_type != MEDIA_TYPE_JWS_ENVELOPE {
            return Err(SignError::EnvelopeTypeMismatch {
                got: response.signature_envelope_type,
                requested: MEDIA_TYPE_JWS_ENVELOPE.to_string(),
            });
        }

        let envelope = JwsEnvelope::from_bytes(&response.signature_envelope)
            .map_err(|_| SignError::MalformedEnvelope)?;
        let leaf = parse_chain(&envelope.header.x5c)?;
        validate_code_signing_profile(&leaf).map_err(SignError::EnvelopeCertificateProfile)?;
        let protected = envelope
            .protected_header()
            .map_err(|_| SignError::MalformedEnvelope)?;
        let algorithm = SignatureAlgorithm::from_jws(&protected.alg)
            .ok_or_else(|| SignError::UnsupportedJwsAlgorithm(protected.alg.clone()))?;
        let signature = envelope
            .signature_bytes()
            .map_err(|_| SignError::MalformedEnvelope)?;
        verify_signature(algorithm, &leaf, &envelope.signing_input(), &signature)
            .map_err(|_| SignError::SignatureVerification)?;

        // The plugin controls canonicalisation; return its bytes untouched.
        Ok(response.signature_envelope)
    }
}

fn build_claims(descriptor: &Descriptor, options: &SignOptions) -> Result<PayloadClaims, SignError> {
    let now = OffsetDateTime::now_utc();
    let exp = match options.expiry {
        Some(expiry) if expiry <= now => return Err(SignError::TokenExpired),
        Some(expiry) => Some(expiry.unix_timestamp()),
        None => None,
    };
    Ok(PayloadClaims {
        exp,
        iat: Some(now.unix_timestamp()),
        subject: descriptor.clone(),
    })
}

/// Parses every chain entry strictly and returns the leaf.
fn parse_chain(chain: &[Vec<u8>]) -> Result<X509Certificate<'_>, SignError> {
    let mut certs = chain.iter().map(|der| parse_der_certificate(der));
    let leaf = certs
        .next()
        .ok_or(SignError::EmptyCertChain)?
        .ok_or(SignError::MalformedCertificate)?;
    for cert in certs {
        cert.ok_or(SignError::MalformedCertificate)?;
    }
    Ok(leaf)
}
