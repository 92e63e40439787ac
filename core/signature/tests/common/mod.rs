#![allow(dead_code)]

use std::cell::RefCell;

use rcgen::{
    CertificateParams, DnType, ExtendedKeyUsagePurpose, IsCa, KeyPair, KeyUsagePurpose,
};
use rsa::pkcs8::EncodePrivateKey;
use rsa::{Pss, RsaPrivateKey};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;

use signet_signature::envelope::compact_signing_input;
use signet_signature::plugin::{
    DescribeKeyRequest, DescribeKeyResponse, GenerateEnvelopeRequest, GenerateEnvelopeResponse,
    GenerateSignatureRequest, GenerateSignatureResponse, GetMetadataRequest, PluginMetadata,
    PluginTransport, TransportError, CONTRACT_VERSION,
};
use signet_signature::{JwsEnvelope, ProtectedHeader};

pub fn valid_metadata(capabilities: Vec<String>) -> PluginMetadata {
    PluginMetadata {
        name: "foo".to_string(),
        description: "friendly".to_string(),
        version: "1".to_string(),
        url: "example.com".to_string(),
        supported_contract_versions: vec![CONTRACT_VERSION.to_string()],
        capabilities,
    }
}

/// Every mock asserts that the request survives a JSON round-trip, the same
/// wire shape a real out-of-process plugin would see.
fn json_roundtrip<T: Serialize + DeserializeOwned>(value: &T) -> Result<(), TransportError> {
    let raw = serde_json::to_vec(value)?;
    serde_json::from_slice::<T>(&raw)?;
    Ok(())
}

pub fn rsa_key_2048() -> RsaPrivateKey {
    RsaPrivateKey::new(&mut rand::thread_rng(), 2048).expect("rsa key generation should succeed")
}

pub fn self_signed_rsa_cert(
    key: &RsaPrivateKey,
    key_usages: Vec<KeyUsagePurpose>,
    extended_key_usages: Vec<ExtendedKeyUsagePurpose>,
    is_ca: IsCa,
) -> Vec<u8> {
    let pkcs8 = key.to_pkcs8_der().expect("pkcs8 encoding should succeed");
    let key_pair = KeyPair::try_from(pkcs8.as_bytes()).expect("rsa key pair should load");
    let mut params = CertificateParams::new(Vec::<String>::new()).expect("params should build");
    params.distinguished_name.push(DnType::CommonName, "test");
    params.key_usages = key_usages;
    params.extended_key_usages = extended_key_usages;
    params.is_ca = is_ca;
    params
        .self_signed(&key_pair)
        .expect("certificate should build")
        .der()
        .to_vec()
}

pub fn rsa_code_signing_cert(key: &RsaPrivateKey) -> Vec<u8> {
    self_signed_rsa_cert(
        key,
        vec![KeyUsagePurpose::DigitalSignature],
        vec![ExtendedKeyUsagePurpose::CodeSigning],
        IsCa::ExplicitNoCa,
    )
}

pub fn ps256_sign(key: &RsaPrivateKey, message: &[u8]) -> Vec<u8> {
    key.sign_with_rng(
        &mut rand::thread_rng(),
        Pss::new::<Sha256>(),
        &Sha256::digest(message),
    )
    .expect("pss signing should succeed")
}

pub fn p256_code_signing_cert() -> (p256::ecdsa::SigningKey, Vec<u8>) {
    use p256::pkcs8::DecodePrivateKey;

    let key_pair = KeyPair::generate().expect("p256 key generation should succeed");
    let signing_key = p256::ecdsa::SigningKey::from_pkcs8_der(&key_pair.serialize_der())
        .expect("p256 signing key should load");
    let mut params = CertificateParams::new(Vec::<String>::new()).expect("params should build");
    params.distinguished_name.push(DnType::CommonName, "test");
    params.key_usages = vec![KeyUsagePurpose::DigitalSignature];
    params.extended_key_usages = vec![ExtendedKeyUsagePurpose::CodeSigning];
    params.is_ca = IsCa::ExplicitNoCa;
    let der = params
        .self_signed(&key_pair)
        .expect("certificate should build")
        .der()
        .to_vec();
    (signing_key, der)
}

pub fn es256_sign(key: &p256::ecdsa::SigningKey, message: &[u8]) -> Vec<u8> {
    use p256::ecdsa::signature::Signer as _;

    let signature: p256::ecdsa::Signature = key.sign(message);
    signature.to_bytes().to_vec()
}

/// Scripted responses for the metadata and describe-key steps, mirroring a
/// plugin that never reaches the signing command.
#[derive(Default)]
pub struct ScriptedPlugin {
    pub metadata: Option<Result<PluginMetadata, String>>,
    pub describe_key: Option<Result<DescribeKeyResponse, String>>,
}

impl PluginTransport for ScriptedPlugin {
    fn get_metadata(
        &self,
        _cancel: &CancellationToken,
        request: &GetMetadataRequest,
    ) -> Result<PluginMetadata, TransportError> {
        json_roundtrip(request)?;
        match &self.metadata {
            Some(Ok(metadata)) => Ok(metadata.clone()),
            Some(Err(message)) => Err(message.clone().into()),
            None => Err("get-metadata not scripted".into()),
        }
    }

    fn describe_key(
        &self,
        _cancel: &CancellationToken,
        request: &DescribeKeyRequest,
    ) -> Result<DescribeKeyResponse, TransportError> {
        json_roundtrip(request)?;
        match &self.describe_key {
            Some(Ok(response)) => Ok(response.clone()),
            Some(Err(message)) => Err(message.clone().into()),
            None => Err("describe-key not scripted".into()),
        }
    }

    fn generate_signature(
        &self,
        _cancel: &CancellationToken,
        _request: &GenerateSignatureRequest,
    ) -> Result<GenerateSignatureResponse, TransportError> {
        Err("generate-signature not scripted".into())
    }

    fn generate_envelope(
        &self,
        _cancel: &CancellationToken,
        _request: &GenerateEnvelopeRequest,
    ) -> Result<GenerateEnvelopeResponse, TransportError> {
        Err("generate-envelope not scripted".into())
    }
}

pub type SignFn = Box<dyn Fn(&[u8]) -> Vec<u8>>;

/// A raw-signature plugin: advertises SIGNATURE_GENERATOR and answers the
/// describe-key and generate-signature commands from its fields.
pub struct MockSignerPlugin {
    pub key_id: String,
    pub key_spec: String,
    pub signing_algorithm: String,
    pub certificate_chain: Vec<Vec<u8>>,
    /// Overrides the keyID echoed by generate-signature.
    pub signature_key_id: Option<String>,
    pub sign: Option<SignFn>,
}

impl MockSignerPlugin {
    pub fn new(key_id: &str, key_spec: &str) -> Self {
        MockSignerPlugin {
            key_id: key_id.to_string(),
            key_spec: key_spec.to_string(),
            signing_algorithm: String::new(),
            certificate_chain: Vec::new(),
            signature_key_id: None,
            sign: None,
        }
    }
}

impl PluginTransport for MockSignerPlugin {
    fn get_metadata(
        &self,
        _cancel: &CancellationToken,
        request: &GetMetadataRequest,
    ) -> Result<PluginMetadata, TransportError> {
        json_roundtrip(request)?;
        Ok(valid_metadata(vec!["SIGNATURE_GENERATOR".to_string()]))
    }

    fn describe_key(
        &self,
        _cancel: &CancellationToken,
        request: &DescribeKeyRequest,
    ) -> Result<DescribeKeyResponse, TransportError> {
        json_roundtrip(request)?;
        Ok(DescribeKeyResponse {
            key_id: self.key_id.clone(),
            key_spec: self.key_spec.clone(),
        })
    }

    fn generate_signature(
        &self,
        _cancel: &CancellationToken,
        request: &GenerateSignatureRequest,
    ) -> Result<GenerateSignatureResponse, TransportError> {
        json_roundtrip(request)?;
        let signature = self
            .sign
            .as_ref()
            .map(|sign| sign(&request.payload))
            .unwrap_or_default();
        Ok(GenerateSignatureResponse {
            key_id: self
                .signature_key_id
                .clone()
                .unwrap_or_else(|| self.key_id.clone()),
            signing_algorithm: self.signing_algorithm.clone(),
            signature,
            certificate_chain: self.certificate_chain.clone(),
        })
    }

    fn generate_envelope(
        &self,
        _cancel: &CancellationToken,
        _request: &GenerateEnvelopeRequest,
    ) -> Result<GenerateEnvelopeResponse, TransportError> {
        Err("unexpected generate-envelope command".into())
    }
}

/// An envelope plugin: advertises ENVELOPE_GENERATOR and builds a complete
/// PS256 envelope over the requested payload with a freshly generated
/// code-signing certificate, unless overridden by its fields.
#[derive(Default)]
pub struct MockEnvelopePlugin {
    /// Makes generate-envelope fail with this cause.
    pub error: Option<String>,
    /// Overrides the echoed signatureEnvelopeType.
    pub envelope_type: Option<String>,
    /// Overrides the certificate chain placed in the envelope.
    pub certificate_chain: Option<Vec<Vec<u8>>>,
    /// Signs with this key instead of the generated certificate's key.
    pub key: Option<RsaPrivateKey>,
    /// The last envelope handed back, for byte-identity assertions.
    pub last_envelope: RefCell<Option<Vec<u8>>>,
}

impl PluginTransport for MockEnvelopePlugin {
    fn get_metadata(
        &self,
        _cancel: &CancellationToken,
        request: &GetMetadataRequest,
    ) -> Result<PluginMetadata, TransportError> {
        json_roundtrip(request)?;
        Ok(valid_metadata(vec!["ENVELOPE_GENERATOR".to_string()]))
    }

    fn describe_key(
        &self,
        _cancel: &CancellationToken,
        _request: &DescribeKeyRequest,
    ) -> Result<DescribeKeyResponse, TransportError> {
        Err("unexpected describe-key command".into())
    }

    fn generate_signature(
        &self,
        _cancel: &CancellationToken,
        _request: &GenerateSignatureRequest,
    ) -> Result<GenerateSignatureResponse, TransportError> {
        Err("unexpected generate-signature command".into())
    }

    fn generate_envelope(
        &self,
        _cancel: &CancellationToken,
        request: &GenerateEnvelopeRequest,
    ) -> Result<GenerateEnvelopeResponse, TransportError> {
        json_roundtrip(request)?;
        if let Some(message) = &self.error {
            return Err(message.clone().into());
        }

        let generated_key = rsa_key_2048();
        let generated_cert = rsa_code_signing_cert(&generated_key);
        let signing_key = self.key.as_ref().unwrap_or(&generated_key);

        let protected_json = serde_jcs::to_vec(&ProtectedHeader::new("PS256"))?;
        let signing_input = compact_signing_input(&protected_json, &request.payload);
        let signature = ps256_sign(signing_key, &signing_input);
        let chain = self
            .certificate_chain
            .clone()
            .unwrap_or_else(|| vec![generated_cert]);

        let envelope = JwsEnvelope::new(&protected_json, &request.payload, &signature, chain);
        let bytes = envelope.to_bytes()?;
        *self.last_envelope.borrow_mut() = Some(bytes.clone());

        Ok(GenerateEnvelopeResponse {
            signature_envelope: bytes,
            signature_envelope_type: self
                .envelope_type
                .clone()
                .unwrap_or_else(|| request.signature_envelope_type.clone()),
        })
    }
}
