//! Code-signing certificate profile checks.

use thiserror::Error;
use time::OffsetDateTime;
use x509_parser::prelude::{FromDer, X509Certificate};

/// A violation of the code-signing certificate profile. Each variant names
/// the rule it breaks so callers can tell them apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CertificateProfileError {
    #[error("keyUsage must have the bit positions for digitalSignature set")]
    MissingDigitalSignature,
    #[error("extKeyUsage must contain the value id-kp-codeSigning")]
    MissingCodeSigningUsage,
    #[error("if the basicConstraints extension is present, the CA field MUST be set false")]
    CertificateAuthority,
    #[error("certificate is not valid at the verification time")]
    ValidityPeriod,
}

/// Checks the leaf requirements for a code-signing certificate: the
/// digitalSignature keyUsage bit, the id-kp-codeSigning extended key usage,
/// and basicConstraints with CA unset.
pub fn validate_code_signing_profile(
    cert: &X509Certificate<'_>,
) -> Result<(), CertificateProfileError> {
    let digital_signature = cert
        .key_usage()
        .map_err(|_| CertificateProfileError::MissingDigitalSignature)?
        .map(|usage| usage.value.digital_signature())
        .unwrap_or(false);
    if !digital_signature {
        return Err(CertificateProfileError::MissingDigitalSignature);
    }

    let code_signing = cert
        .extended_key_usage()
        .map_err(|_| CertificateProfileError::MissingCodeSigningUsage)?
        .map(|usage| usage.value.code_signing)
        .unwrap_or(false);
    if !code_signing {
        return Err(CertificateProfileError::MissingCodeSigningUsage);
    }

    if let Some(constraints) = cert
        .basic_constraints()
        .map_err(|_| CertificateProfileError::CertificateAuthority)?
    {
        if constraints.value.ca {
            return Err(CertificateProfileError::CertificateAuthority);
        }
    }

    Ok(())
}

/// Checks `notBefore <= at <= notAfter`.
pub fn validate_validity_period(
    cert: &X509Certificate<'_>,
    at: OffsetDateTime,
) -> Result<(), CertificateProfileError> {
    let timestamp = at.unix_timestamp();
    let validity = cert.validity();
    if timestamp < validity.not_before.timestamp() || timestamp > validity.not_after.timestamp() {
        return Err(CertificateProfileError::ValidityPeriod);
    }
    Ok(())
}

/// Strict DER parse: the certificate must consume the full input.
pub(crate) fn parse_der_certificate(der: &[u8]) -> Option<X509Certificate<'_>> {
    match X509Certificate::from_der(der) {
        Ok((rem, cert)) if rem.is_empty() => Some(cert),
        _ => None,
    }
}
