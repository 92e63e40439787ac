//! Envelope verification: structural checks, certificate profile, chain
//! anchoring and the signature itself.

use time::OffsetDateTime;
use x509_parser::prelude::X509Certificate;

use crate::algorithm::{key_spec_from_certificate, SignatureAlgorithm};
use crate::cert::{
    parse_der_certificate, validate_code_signing_profile, validate_validity_period,
};
use crate::crypto::verify_signature;
use crate::envelope::{Descriptor, JwsEnvelope};
use crate::VerifyError;

#[derive(Debug, Clone, Default)]
pub struct VerifyOptions {
    /// DER-encoded certificates trusted as chain anchors.
    pub trust_roots: Vec<Vec<u8>>,
    /// Verification time; defaults to the current time.
    pub verification_time: Option<OffsetDateTime>,
}

/// The verified content of an envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedPayload {
    pub descriptor: Descriptor,
    pub signing_time: Option<OffsetDateTime>,
    pub expiry: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Verifier;

impl Verifier {
    pub fn new() -> Self {
        Verifier
    }

    /// Verifies a serialised JWS envelope and returns the signed descriptor
    /// together with its signing time and expiry.
    pub fn verify(
        &self,
        envelope_bytes: &[u8],
        options: &VerifyOptions,
    ) -> Result<VerifiedPayload, VerifyError> {
        let envelope =
            JwsEnvelope::from_bytes(envelope_bytes).map_err(|_| VerifyError::MalformedEnvelope)?;
        let protected = envelope
            .protected_header()
            .map_err(|_| VerifyError::MalformedEnvelope)?;
        let algorithm = SignatureAlgorithm::from_jws(&protected.alg)
            .ok_or_else(|| VerifyError::UnsupportedAlgorithm(protected.alg.clone()))?;

        let now = options
            .verification_time
            .unwrap_or_else(OffsetDateTime::now_utc);

        let chain = envelope
            .header
            .x5c
            .iter()
            .map(|der| parse_der_certificate(der).ok_or(VerifyError::MalformedCertificate))
            .collect::<Result<Vec<_>, _>>()?;
        let leaf = &chain[0];

        validate_code_signing_profile(leaf).map_err(VerifyError::CertificateProfile)?;
        validate_validity_period(leaf, now).map_err(VerifyError::CertificateProfile)?;
        if key_spec_from_certificate(leaf).map(|spec| spec.signature_algorithm())
            != Some(algorithm)
        {
            return Err(VerifyError::AlgorithmMismatch(protected.alg.clone()));
        }

        verify_chain(&chain, &envelope.header.x5c, &options.trust_roots, now)?;

        let signature = envelope
            .signature_bytes()
            .map_err(|_| VerifyError::MalformedEnvelope)?;
        verify_signature(algorithm, leaf, &envelope.signing_input(), &signature)
            .map_err(|_| VerifyError::SignatureVerification)?;

        let claims = envelope
            .payload_claims()
            .map_err(|_| VerifyError::MalformedPayload)?;
        let expiry = match (protected.expiry, claims.exp) {
            (Some(expiry), _) => Some(expiry),
            (None, Some(timestamp)) => Some(claim_time(timestamp)?),
            (None, None) => None,
        };
        if let Some(expiry) = expiry {
            if expiry <= now {
                return Err(VerifyError::TokenExpired);
            }
        }
        let signing_time = match (protected.signing_time, claims.iat) {
            (Some(signing_time), _) => Some(signing_time),
            (None, Some(timestamp)) => Some(claim_time(timestamp)?),
            (None, None) => None,
        };

        Ok(VerifiedPayload {
            descriptor: claims.subject,
            signing_time,
            expiry,
        })
    }
}

fn claim_time(timestamp: i64) -> Result<OffsetDateTime, VerifyError> {
    OffsetDateTime::from_unix_timestamp(timestamp).map_err(|_| VerifyError::MalformedPayload)
}

/// Walks the chain leaf-first: every certificate must be inside its validity
/// window, signed by its successor, and the terminal certificate must anchor
/// to one of the trust roots, either by identity or by a root's signature.
fn verify_chain(
    chain: &[X509Certificate<'_>],
    chain_der: &[Vec<u8>],
    trust_roots: &[Vec<u8>],
    now: OffsetDateTime,
) -> Result<(), VerifyError> {
    if trust_roots.is_empty() {
        return Err(VerifyError::UntrustedChain(
            "no trust roots provided".to_string(),
        ));
    }
    for cert in chain {
        validate_validity_period(cert, now).map_err(|_| {
            VerifyError::UntrustedChain(
                "chain certificate is outside its validity period".to_string(),
            )
        })?;
    }
    for pair in chain.windows(2) {
        let (child, issuer) = (&pair[0], &pair[1]);
        if child.issuer().as_raw() != issuer.subject().as_raw() {
            return Err(VerifyError::UntrustedChain(
                "issuer does not match the subject of the next certificate".to_string(),
            ));
        }
        child.verify_signature(Some(issuer.public_key())).map_err(|_| {
            VerifyError::UntrustedChain(
                "certificate is not signed by its issuer".to_string(),
            )
        })?;
    }

    let (Some(top), Some(top_der)) = (chain.last(), chain_der.last()) else {
        return Err(VerifyError::MalformedEnvelope);
    };
    let anchored = trust_roots.iter().any(|root_der| {
        if root_der == top_der {
            return true;
        }
        let Some(root) = parse_der_certificate(root_der) else {
            return false;
        };
        top.issuer().as_raw() == root.subject().as_raw()
            && top.verify_signature(Some(root.public_key())).is_ok()
    });
    if !anchored {
        return Err(VerifyError::UntrustedChain(
            "certificate chain does not terminate at a trusted root".to_string(),
        ));
    }
    Ok(())
}
