//! Fixed mapping between key specifications, signature algorithms, JWS names
//! and hash algorithms. One table drives every direction.

use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::traits::PublicKeyParts;
use rsa::RsaPublicKey;
use x509_parser::der_parser::asn1_rs::Oid;
use x509_parser::der_parser::oid;
use x509_parser::prelude::X509Certificate;

const OID_RSA_ENCRYPTION: Oid<'static> = oid!(1.2.840.113549.1.1.1);
const OID_EC_PUBLIC_KEY: Oid<'static> = oid!(1.2.840.10045.2.1);
const OID_SECP256R1: Oid<'static> = oid!(1.2.840.10045.3.1.7);
const OID_SECP384R1: Oid<'static> = oid!(1.3.132.0.34);
const OID_SECP521R1: Oid<'static> = oid!(1.3.132.0.35);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeySpec {
    Rsa2048,
    Rsa3072,
    Rsa4096,
    Ec256,
    Ec384,
    Ec521,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignatureAlgorithm {
    RsassaPssSha256,
    RsassaPssSha384,
    RsassaPssSha512,
    EcdsaSha256,
    EcdsaSha384,
    EcdsaSha512,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashAlgorithm {
    Sha256,
    Sha384,
    Sha512,
}

struct AlgorithmEntry {
    key_spec: KeySpec,
    key_spec_name: &'static str,
    algorithm: SignatureAlgorithm,
    algorithm_name: &'static str,
    jws_name: &'static str,
    hash: HashAlgorithm,
    hash_name: &'static str,
}

const ALGORITHMS: &[AlgorithmEntry] = &[
    AlgorithmEntry {
        key_spec: KeySpec::Rsa2048,
        key_spec_name: "RSA_2048",
        algorithm: SignatureAlgorithm::RsassaPssSha256,
        algorithm_name: "RSASSA_PSS_SHA_256",
        jws_name: "PS256",
        hash: HashAlgorithm::Sha256,
        hash_name: "SHA_256",
    },
    AlgorithmEntry {
        key_spec: KeySpec::Rsa3072,
        key_spec_name: "RSA_3072",
        algorithm: SignatureAlgorithm::RsassaPssSha384,
        algorithm_name: "RSASSA_PSS_SHA_384",
        jws_name: "PS384",
        hash: HashAlgorithm::Sha384,
        hash_name: "SHA_384",
    },
    AlgorithmEntry {
        key_spec: KeySpec::Rsa4096,
        key_spec_name: "RSA_4096",
        algorithm: SignatureAlgorithm::RsassaPssSha512,
        algorithm_name: "RSASSA_PSS_SHA_512",
        jws_name: "PS512",
        hash: HashAlgorithm::Sha512,
        hash_name: "SHA_512",
    },
    AlgorithmEntry {
        key_spec: KeySpec::Ec256,
        key_spec_name: "EC_256",
        algorithm: SignatureAlgorithm::EcdsaSha256,
        algorithm_name: "ECDSA_SHA_256",
        jws_name: "ES256",
        hash: HashAlgorithm::Sha256,
        hash_name: "SHA_256",
    },
    AlgorithmEntry {
        key_spec: KeySpec::Ec384,
        key_spec_name: "EC_384",
        algorithm: SignatureAlgorithm::EcdsaSha384,
        algorithm_name: "ECDSA_SHA_384",
        jws_name: "ES384",
        hash: HashAlgorithm::Sha384,
        hash_name: "SHA_384",
    },
    AlgorithmEntry {
        key_spec: KeySpec::Ec521,
        key_spec_name: "EC_521",
        algorithm: SignatureAlgorithm::EcdsaSha512,
        algorithm_name: "ECDSA_SHA_512",
        jws_name: "ES512",
        hash: HashAlgorithm::Sha512,
        hash_name: "SHA_512",
    },
];

impl KeySpec {
    pub fn name(self) -> &'static str {
        self.entry().key_spec_name
    }

    pub fn from_name(name: &str) -> Option<KeySpec> {
        ALGORITHMS
            .iter()
            .find(|entry| entry.key_spec_name == name)
            .map(|entry| entry.key_spec)
    }

    pub fn signature_algorithm(self) -> SignatureAlgorithm {
        self.entry().algorithm
    }

    fn entry(self) -> &'static AlgorithmEntry {
        ALGORITHMS
            .iter()
            .find(|entry| entry.key_spec == self)
            .expect("every key spec has a table entry")
    }
}

impl SignatureAlgorithm {
    pub fn name(self) -> &'static str {
        self.entry().algorithm_name
    }

    pub fn from_name(name: &str) -> Option<SignatureAlgorithm> {
        ALGORITHMS
            .iter()
            .find(|entry| entry.algorithm_name == name)
            .map(|entry| entry.algorithm)
    }

    pub fn jws(self) -> &'static str {
        self.entry().jws_name
    }

    pub fn from_jws(name: &str) -> Option<SignatureAlgorithm> {
        ALGORITHMS
            .iter()
            .find(|entry| entry.jws_name == name)
            .map(|entry| entry.algorithm)
    }

    pub fn hash(self) -> HashAlgorithm {
        self.entry().hash
    }

    pub fn key_spec(self) -> KeySpec {
        self.entry().key_spec
    }

    fn entry(self) -> &'static AlgorithmEntry {
        ALGORITHMS
            .iter()
            .find(|entry| entry.algorithm == self)
            .expect("every signature algorithm has a table entry")
    }
}

impl HashAlgorithm {
    pub fn name(self) -> &'static str {
        ALGORITHMS
            .iter()
            .find(|entry| entry.hash == self)
            .expect("every hash algorithm has a table entry")
            .hash_name
    }
}

/// Classifies the public key of a certificate: RSA by modulus width, EC by
/// named curve. Returns `None` for any key outside the supported set.
pub fn key_spec_from_certificate(cert: &X509Certificate<'_>) -> Option<KeySpec> {
    let spki = cert.public_key();
    let key_bytes: &[u8] = spki.subject_public_key.data.as_ref();
    if spki.algorithm.algorithm == OID_RSA_ENCRYPTION {
        let key = RsaPublicKey::from_pkcs1_der(key_bytes).ok()?;
        match key.size() * 8 {
            2048 => Some(KeySpec::Rsa2048),
            3072 => Some(KeySpec::Rsa3072),
            4096 => Some(KeySpec::Rsa4096),
            _ => None,
        }
    } else if spki.algorithm.algorithm == OID_EC_PUBLIC_KEY {
        let curve = spki.algorithm.parameters.as_ref()?.as_oid().ok()?;
        if curve == OID_SECP256R1 {
            Some(KeySpec::Ec256)
        } else if curve == OID_SECP384R1 {
            Some(KeySpec::Ec384)
        } else if curve == OID_SECP521R1 {
            Some(KeySpec::Ec521)
        } else {
            None
        }
    } else {
        None
    }
}
