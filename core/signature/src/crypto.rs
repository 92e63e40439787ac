//! One-shot signature verification against a certificate's public key.
//!
//! JWS carries ECDSA signatures as raw `r || s` and RSA signatures as PKCS#1
//! octet strings; the hash is fixed by the algorithm identifier.

use p256::ecdsa::signature::Verifier as _;
use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::{Pss, RsaPublicKey};
use sha2::digest::DynDigest;
use sha2::{Digest, Sha256, Sha384, Sha512};
use x509_parser::prelude::X509Certificate;

use crate::algorithm::SignatureAlgorithm;

/// Uniform failure marker. Callers report every cryptographic failure as a
/// verification error without distinguishing the cause.
pub(crate) struct InvalidSignature;

pub(crate) fn verify_signature(
    algorithm: SignatureAlgorithm,
    cert: &X509Certificate<'_>,
    message: &[u8],
    signature: &[u8],
) -> Result<(), InvalidSignature> {
    let key_bytes: &[u8] = cert.public_key().subject_public_key.data.as_ref();
    match algorithm {
        SignatureAlgorithm::RsassaPssSha256 => verify_pss::<Sha256>(key_bytes, message, signature),
        SignatureAlgorithm::RsassaPssSha384 => verify_pss::<Sha384>(key_bytes, message, signature),
        SignatureAlgorithm::RsassaPssSha512 => verify_pss::<Sha512>(key_bytes, message, signature),
        SignatureAlgorithm::EcdsaSha256 => {
            let key = p256::ecdsa::VerifyingKey::from_sec1_bytes(key_bytes)
                .map_err(|_| InvalidSignature)?;
            let signature =
                p256::ecdsa::Signature::from_slice(signature).map_err(|_| InvalidSignature)?;
            key.verify(message, &signature).map_err(|_| InvalidSignature)
        }
        SignatureAlgorithm::EcdsaSha384 => {
            let key = p384::ecdsa::VerifyingKey::from_sec1_bytes(key_bytes)
                .map_err(|_| InvalidSignature)?;
            let signature =
                p384::ecdsa::Signature::from_slice(signature).map_err(|_| InvalidSignature)?;
            key.verify(message, &signature).map_err(|_| InvalidSignature)
        }
        SignatureAlgorithm::EcdsaSha512 => {
            let key = p521::ecdsa::VerifyingKey::from_sec1_bytes(key_bytes)
                .map_err(|_| InvalidSignature)?;
            let signature =
                p521::ecdsa::Signature::from_slice(signature).map_err(|_| InvalidSignature)?;
            key.verify(message, &signature).map_err(|_| InvalidSignature)
        }
    }
}

fn verify_pss<D>(key_bytes: &[u8], message: &[u8], signature: &[u8]) -> Result<(), InvalidSignature>
where
    D: Digest + DynDigest + Send + Sync + 'static,
{
    let key = RsaPublicKey::from_pkcs1_der(key_bytes).map_err(|_| InvalidSignature)?;
    let digest = D::digest(message);
    key.verify(Pss::new::<D>(), &digest, signature)
        .map_err(|_| InvalidSignature)
}
