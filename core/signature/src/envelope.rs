//! The JWS envelope wire format: three base64url compact fields plus an
//! unprotected header carrying the DER certificate chain.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;

pub const MEDIA_TYPE_JWS_ENVELOPE: &str = "application/vnd.cncf.notary.v2.jws.v1";
pub const MEDIA_TYPE_PAYLOAD: &str = "application/vnd.cncf.notary.payload.v1+json";

const HEADER_EXPIRY: &str = "io.cncf.notary.expiry";
const HEADER_SIGNING_TIME: &str = "io.cncf.notary.signingTime";

/// OCI-style content descriptor. Opaque to this layer; it travels as the
/// `subject` of the signed payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Descriptor {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub media_type: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub digest: String,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub size: u64,
}

fn is_zero(value: &u64) -> bool {
    *value == 0
}

/// The authenticated JOSE header.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtectedHeader {
    pub alg: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crit: Option<Vec<String>>,
    #[serde(default)]
    pub cty: String,
    #[serde(
        rename = "io.cncf.notary.expiry",
        default,
        skip_serializing_if = "Option::is_none",
        with = "time::serde::rfc3339::option"
    )]
    pub expiry: Option<OffsetDateTime>,
    #[serde(
        rename = "io.cncf.notary.signingTime",
        default,
        skip_serializing_if = "Option::is_none",
        with = "time::serde::rfc3339::option"
    )]
    pub signing_time: Option<OffsetDateTime>,
}

impl ProtectedHeader {
    pub fn new(alg: impl Into<String>) -> Self {
        ProtectedHeader {
            alg: alg.into(),
            crit: None,
            cty: MEDIA_TYPE_PAYLOAD.to_string(),
            expiry: None,
            signing_time: None,
        }
    }
}

/// The JWT-shaped claim set carried as the envelope payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayloadClaims {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    pub subject: Descriptor,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnprotectedHeader {
    #[serde(with = "base64_byte_chain")]
    pub x5c: Vec<Vec<u8>>,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("envelope content does not match envelope format")]
pub struct EnvelopeFormatError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwsEnvelope {
    pub protected: String,
    pub payload: String,
    pub signature: String,
    pub header: UnprotectedHeader,
}

impl JwsEnvelope {
    pub fn new(
        protected_json: &[u8],
        payload_json: &[u8],
        signature: &[u8],
        x5c: Vec<Vec<u8>>,
    ) -> Self {
        JwsEnvelope {
            protected: URL_SAFE_NO_PAD.encode(protected_json),
            payload: URL_SAFE_NO_PAD.encode(payload_json),
            signature: URL_SAFE_NO_PAD.encode(signature),
            header: UnprotectedHeader { x5c },
        }
    }

    /// Parses and structurally validates an envelope: all four fields
    /// present, the compact fields decodable base64url without padding, the
    /// protected header a JSON object naming an `alg`, and a non-empty
    /// certificate chain.
    pub fn from_bytes(bytes: &[u8]) -> Result<JwsEnvelope, EnvelopeFormatError> {
        let envelope: JwsEnvelope =
            serde_json::from_slice(bytes).map_err(|_| EnvelopeFormatError)?;
        if envelope.protected.is_empty()
            || envelope.payload.is_empty()
            || envelope.signature.is_empty()
            || envelope.header.x5c.is_empty()
        {
            return Err(EnvelopeFormatError);
        }
        envelope.protected_header()?;
        URL_SAFE_NO_PAD
            .decode(&envelope.payload)
            .map_err(|_| EnvelopeFormatError)?;
        envelope.signature_bytes()?;
        Ok(envelope)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// The bytes covered by the signature: `protected || "." || payload`.
    pub fn signing_input(&self) -> Vec<u8> {
        format!("{}.{}", self.protected, self.payload).into_bytes()
    }

    pub fn protected_header(&self) -> Result<ProtectedHeader, EnvelopeFormatError> {
        let raw = URL_SAFE_NO_PAD
            .decode(&self.protected)
            .map_err(|_| EnvelopeFormatError)?;
        let header: ProtectedHeader =
            serde_json::from_slice(&raw).map_err(|_| EnvelopeFormatError)?;
        if header.alg.is_empty() {
            return Err(EnvelopeFormatError);
        }
        if let Some(crit) = &header.crit {
            if crit
                .iter()
                .any(|name| name != HEADER_EXPIRY && name != HEADER_SIGNING_TIME)
            {
                return Err(EnvelopeFormatError);
            }
        }
        Ok(header)
    }

    pub fn payload_claims(&self) -> Result<PayloadClaims, EnvelopeFormatError> {
        let raw = URL_SAFE_NO_PAD
            .decode(&self.payload)
            .map_err(|_| EnvelopeFormatError)?;
        serde_json::from_slice(&raw).map_err(|_| EnvelopeFormatError)
    }

    pub fn signature_bytes(&self) -> Result<Vec<u8>, EnvelopeFormatError> {
        URL_SAFE_NO_PAD
            .decode(&self.signature)
            .map_err(|_| EnvelopeFormatError)
    }
}

/// The compact signing input for a protected header and payload that are not
/// yet wrapped in an envelope.
pub fn compact_signing_input(protected_json: &[u8], payload_json: &[u8]) -> Vec<u8> {
    format!(
        "{}.{}",
        URL_SAFE_NO_PAD.encode(protected_json),
        URL_SAFE_NO_PAD.encode(payload_json)
    )
    .into_bytes()
}

/// JSON `[]byte` convention: a standard-base64 string.
pub(crate) mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        STANDARD
            .decode(raw.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

/// JSON `[][]byte` convention: an array of standard-base64 strings.
pub(crate) mod base64_byte_chain {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(chain: &[Vec<u8>], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(chain.iter().map(|der| STANDARD.encode(der)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<Vec<u8>>, D::Error> {
        let raw = Vec::<String>::deserialize(deserializer)?;
        raw.iter()
            .map(|entry| STANDARD.decode(entry.as_bytes()))
            .collect::<Result<_, _>>()
            .map_err(serde::de::Error::custom)
    }
}
