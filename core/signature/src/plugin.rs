//! The four-command plugin protocol: JSON request/response schemas and the
//! transport seam. Launching the plugin process and framing its stdio is the
//! transport implementation's concern, not this crate's.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::envelope::{base64_byte_chain, base64_bytes};

/// Contract version carried in every request.
pub const CONTRACT_VERSION: &str = "1.0";

/// Opaque cause of a failed plugin invocation, surfaced verbatim inside the
/// signer's `<command> command failed: <cause>` messages.
pub type TransportError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The two signing capabilities a plugin can advertise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    SignatureGenerator,
    EnvelopeGenerator,
}

impl Capability {
    pub fn name(self) -> &'static str {
        match self {
            Capability::SignatureGenerator => "SIGNATURE_GENERATOR",
            Capability::EnvelopeGenerator => "ENVELOPE_GENERATOR",
        }
    }

    pub fn from_name(name: &str) -> Option<Capability> {
        match name {
            "SIGNATURE_GENERATOR" => Some(Capability::SignatureGenerator),
            "ENVELOPE_GENERATOR" => Some(Capability::EnvelopeGenerator),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginMetadata {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub version: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub supported_contract_versions: Vec<String>,
    #[serde(default)]
    pub capabilities: Vec<String>,
}

impl PluginMetadata {
    /// The first advertised capability that is a signing capability, which
    /// selects the signing sub-protocol.
    pub fn first_signing_capability(&self) -> Option<Capability> {
        self.capabilities
            .iter()
            .find_map(|name| Capability::from_name(name))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetMetadataRequest {
    pub contract_version: String,
}

impl Default for GetMetadataRequest {
    fn default() -> Self {
        GetMetadataRequest {
            contract_version: CONTRACT_VERSION.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DescribeKeyRequest {
    pub contract_version: String,
    #[serde(rename = "keyID")]
    pub key_id: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub plugin_config: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DescribeKeyResponse {
    #[serde(rename = "keyID")]
    pub key_id: String,
    pub key_spec: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateSignatureRequest {
    pub contract_version: String,
    #[serde(rename = "keyID")]
    pub key_id: String,
    pub key_spec: String,
    pub hash_algorithm: String,
    #[serde(with = "base64_bytes")]
    pub payload: Vec<u8>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub plugin_config: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateSignatureResponse {
    #[serde(rename = "keyID")]
    pub key_id: String,
    #[serde(default)]
    pub signing_algorithm: String,
    #[serde(default, with = "base64_bytes")]
    pub signature: Vec<u8>,
    #[serde(default, with = "base64_byte_chain")]
    pub certificate_chain: Vec<Vec<u8>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateEnvelopeRequest {
    pub contract_version: String,
    #[serde(rename = "keyID")]
    pub key_id: String,
    #[serde(with = "base64_bytes")]
    pub payload: Vec<u8>,
    pub signature_envelope_type: String,
    pub payload_type: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub plugin_config: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateEnvelopeResponse {
    #[serde(default, with = "base64_bytes")]
    pub signature_envelope: Vec<u8>,
    #[serde(default)]
    pub signature_envelope_type: String,
}

/// Executes plugin commands. One typed method per command; implementations
/// must honour the cancellation token and return promptly once it fires.
pub trait PluginTransport {
    fn get_metadata(
        &self,
        cancel: &CancellationToken,
        request: &GetMetadataRequest,
    ) -> Result<PluginMetadata, TransportError>;

    fn describe_key(
        &self,
        cancel: &CancellationToken,
        request: &DescribeKeyRequest,
    ) -> Result<DescribeKeyResponse, TransportError>;

    fn generate_signature(
        &self,
        cancel: &CancellationToken,
        request: &GenerateSignatureRequest,
    ) -> Result<GenerateSignatureResponse, TransportError>;

    fn generate_envelope(
        &self,
        cancel: &CancellationToken,
        request: &GenerateEnvelopeRequest,
    ) -> Result<GenerateEnvelopeResponse, TransportError>;
}

impl<T: PluginTransport + ?Sized> PluginTransport for &T {
    fn get_metadata(
        &self,
        cancel: &CancellationToken,
        request: &GetMetadataRequest,
    ) -> Result<PluginMetadata, TransportError> {
        (**self).get_metadata(cancel, request)
    }

    fn describe_key(
        &self,
        cancel: &CancellationToken,
        request: &DescribeKeyRequest,
    ) -> Result<DescribeKeyResponse, TransportError> {
        (**self).describe_key(cancel, request)
    }

    fn generate_signature(
        &self,
        cancel: &CancellationToken,
        request: &GenerateSignatureRequest,
    ) -> Result<GenerateSignatureResponse, TransportError> {
        (**self).generate_signature(cancel, request)
    }

    fn generate_envelope(
        &self,
        cancel: &CancellationToken,
        request: &GenerateEnvelopeRequest,
    ) -> Result<GenerateEnvelopeResponse, TransportError> {
        (**self).generate_envelope(cancel, request)
    }
}
