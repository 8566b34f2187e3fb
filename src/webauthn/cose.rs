//! # Credential Public Keys
//!
//! Public keys arrive in two shapes: as a COSE_Key inside the authenticator
//! data, and as SPKI DER from the browser's `getPublicKey()`. Both are reduced
//! to a [`CredentialPublicKey`], stored as COSE_Key bytes next to the COSE
//! algorithm, and used to check assertion signatures.
//!
//! Supported algorithms are the two advertised in `pubKeyCredParams`:
//! ES256 (ECDSA P-256 / SHA-256) and RS256 (RSASSA-PKCS1-v1_5 / SHA-256).

use coset::{
    iana::{self, EnumI64},
    AsCborValue, CborSerializable, CoseKey, CoseKeyBuilder, Label,
};
use p256::{
    ecdsa::{signature::Verifier as _, Signature as EcdsaSignature, VerifyingKey},
    elliptic_curve::sec1::ToEncodedPoint,
    pkcs8::DecodePublicKey as _,
};
use rsa::{pkcs1v15, traits::PublicKeyParts, BigUint, RsaPublicKey};
use sha2::Sha256;
use thiserror::Error;

/// Algorithms offered to clients, in preference order.
pub const SUPPORTED_ALGORITHMS: [iana::Algorithm; 2] =
    [iana::Algorithm::ES256, iana::Algorithm::RS256];

/// Why a key or a signature was refused.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyError {
    #[error("unsupported COSE algorithm {0}")]
    UnsupportedAlgorithm(i64),
    #[error("invalid public key: {0}")]
    InvalidKey(String),
    #[error("signature does not verify")]
    BadSignature,
}

/// A credential public key the relying party can verify signatures with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialPublicKey {
    /// Uncompressed P-256 point coordinates, 32 bytes each.
    Es256 { x: Vec<u8>, y: Vec<u8> },
    /// Big-endian modulus and exponent without leading zero bytes.
    Rs256 { n: Vec<u8>, e: Vec<u8> },
}

impl CredentialPublicKey {
    pub fn algorithm(&self) -> iana::Algorithm {
        match self {
            CredentialPublicKey::Es256 { .. } => iana::Algorithm::ES256,
            CredentialPublicKey::Rs256 { .. } => iana::Algorithm::RS256,
        }
    }

    /// Decode a client-supplied key: SPKI DER first, COSE_Key second.
    pub fn decode(bytes: &[u8]) -> Result<Self, KeyError> {
        Self::from_spki_der(bytes).or_else(|_| Self::from_cose_bytes(bytes))
    }

    /// Parse an X.509 SubjectPublicKeyInfo.
    pub fn from_spki_der(der: &[u8]) -> Result<Self, KeyError> {
        if let Ok(key) = p256::PublicKey::from_public_key_der(der) {
            let point = key.to_encoded_point(false);
            let (Some(x), Some(y)) = (point.x(), point.y()) else {
                return Err(KeyError::InvalidKey("P-256 point is compressed".to_string()));
            };
            return Ok(CredentialPublicKey::Es256 {
                x: x.to_vec(),
                y: y.to_vec(),
            });
        }

        let key = RsaPublicKey::from_public_key_der(der)
            .map_err(|e| KeyError::InvalidKey(format!("not a P-256 or RSA SPKI: {e}")))?;
        Ok(CredentialPublicKey::Rs256 {
            n: key.n().to_bytes_be(),
            e: key.e().to_bytes_be(),
        })
    }

    /// Parse CBOR-encoded COSE_Key bytes.
    pub fn from_cose_bytes(bytes: &[u8]) -> Result<Self, KeyError> {
        let key = CoseKey::from_slice(bytes)
            .map_err(|e| KeyError::InvalidKey(format!("not a COSE_Key: {e:?}")))?;
        Self::from_cose_key(&key)
    }

    /// Parse a CBOR value already decoded from authenticator data.
    pub fn from_cbor_value(value: ciborium::Value) -> Result<Self, KeyError> {
        let key = CoseKey::from_cbor_value(value)
            .map_err(|e| KeyError::InvalidKey(format!("not a COSE_Key: {e:?}")))?;
        Self::from_cose_key(&key)
    }

    /// Extract the key material from a [`CoseKey`], checking that key type,
    /// algorithm and curve agree with each other.
    pub fn from_cose_key(key: &CoseKey) -> Result<Self, KeyError> {
        let alg = match &key.alg {
            Some(coset::RegisteredLabelWithPrivate::Assigned(alg)) => *alg,
            Some(coset::RegisteredLabelWithPrivate::PrivateUse(alg)) => {
                return Err(KeyError::UnsupportedAlgorithm(*alg))
            }
            _ => return Err(KeyError::InvalidKey("COSE_Key has no algorithm".to_string())),
        };

        let param = |label: i64| {
            key.params.iter().find_map(|(k, v)| match k {
                Label::Int(i) if *i == label => Some(v),
                _ => None,
            })
        };
        let bytes_param = |label: i64, name: &str| {
            param(label)
                .and_then(|v| v.as_bytes())
                .cloned()
                .ok_or_else(|| KeyError::InvalidKey(format!("COSE_Key is missing {name}")))
        };

        let parsed = match alg {
            iana::Algorithm::ES256 => {
                if key.kty != coset::RegisteredLabel::Assigned(iana::KeyType::EC2) {
                    return Err(KeyError::InvalidKey("ES256 key must be EC2".to_string()));
                }
                let crv = param(iana::Ec2KeyParameter::Crv.to_i64())
                    .and_then(|v| v.as_integer())
                    .and_then(|i| i64::try_from(i).ok());
                if crv != Some(iana::EllipticCurve::P_256.to_i64()) {
                    return Err(KeyError::InvalidKey("ES256 key must be on P-256".to_string()));
                }
                CredentialPublicKey::Es256 {
                    x: bytes_param(iana::Ec2KeyParameter::X.to_i64(), "x")?,
                    y: bytes_param(iana::Ec2KeyParameter::Y.to_i64(), "y")?,
                }
            }
            iana::Algorithm::RS256 => {
                if key.kty != coset::RegisteredLabel::Assigned(iana::KeyType::RSA) {
                    return Err(KeyError::InvalidKey("RS256 key must be RSA".to_string()));
                }
                CredentialPublicKey::Rs256 {
                    n: strip_leading_zeros(bytes_param(iana::RsaKeyParameter::N.to_i64(), "n")?),
                    e: strip_leading_zeros(bytes_param(iana::RsaKeyParameter::E.to_i64(), "e")?),
                }
            }
            other => return Err(KeyError::UnsupportedAlgorithm(other.to_i64())),
        };

        parsed.validate()?;
        Ok(parsed)
    }

    /// Confirm the key material is usable: the point is on the curve, or the
    /// RSA parameters are acceptable.
    pub fn validate(&self) -> Result<(), KeyError> {
        match self {
            CredentialPublicKey::Es256 { .. } => self.ecdsa_key().map(|_| ()),
            CredentialPublicKey::Rs256 { .. } => self.rsa_key().map(|_| ()),
        }
    }

    pub fn to_cose_key(&self) -> CoseKey {
        match self {
            CredentialPublicKey::Es256 { x, y } => {
                CoseKeyBuilder::new_ec2_pub_key(iana::EllipticCurve::P_256, x.clone(), y.clone())
                    .algorithm(iana::Algorithm::ES256)
                    .build()
            }
            CredentialPublicKey::Rs256 { n, e } => CoseKey {
                kty: coset::RegisteredLabel::Assigned(iana::KeyType::RSA),
                alg: Some(coset::RegisteredLabelWithPrivate::Assigned(
                    iana::Algorithm::RS256,
                )),
                params: vec![
                    (
                        Label::Int(iana::RsaKeyParameter::N.to_i64()),
                        ciborium::Value::Bytes(n.clone()),
                    ),
                    (
                        Label::Int(iana::RsaKeyParameter::E.to_i64()),
                        ciborium::Value::Bytes(e.clone()),
                    ),
                ],
                ..Default::default()
            },
        }
    }

    /// COSE_Key encoding, the storage format.
    pub fn to_cose_bytes(&self) -> Result<Vec<u8>, KeyError> {
        self.to_cose_key()
            .to_vec()
            .map_err(|e| KeyError::InvalidKey(format!("cannot encode COSE_Key: {e:?}")))
    }

    /// Verify `signature` over `message` with this key.
    ///
    /// ES256 signatures are normally ASN.1 DER as WebAuthn specifies; a raw
    /// 64 byte `r || s` is also accepted.
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> Result<(), KeyError> {
        match self {
            CredentialPublicKey::Es256 { .. } => {
                let key = self.ecdsa_key()?;
                let signature = EcdsaSignature::from_der(signature)
                    .or_else(|_| EcdsaSignature::from_slice(signature))
                    .map_err(|_| KeyError::BadSignature)?;
                key.verify(message, &signature)
                    .map_err(|_| KeyError::BadSignature)
            }
            CredentialPublicKey::Rs256 { .. } => {
                let key = pkcs1v15::VerifyingKey::<Sha256>::new(self.rsa_key()?);
                let signature = pkcs1v15::Signature::try_from(signature)
                    .map_err(|_| KeyError::BadSignature)?;
                key.verify(message, &signature)
                    .map_err(|_| KeyError::BadSignature)
            }
        }
    }

    fn ecdsa_key(&self) -> Result<VerifyingKey, KeyError> {
        let CredentialPublicKey::Es256 { x, y } = self else {
            return Err(KeyError::UnsupportedAlgorithm(self.algorithm().to_i64()));
        };
        if x.len() != 32 || y.len() != 32 {
            return Err(KeyError::InvalidKey(
                "P-256 coordinates must be 32 bytes".to_string(),
            ));
        }
        let mut sec1 = Vec::with_capacity(65);
        sec1.push(0x04);
        sec1.extend_from_slice(x);
        sec1.extend_from_slice(y);
        VerifyingKey::from_sec1_bytes(&sec1)
            .map_err(|_| KeyError::InvalidKey("point is not on P-256".to_string()))
    }

    fn rsa_key(&self) -> Result<RsaPublicKey, KeyError> {
        let CredentialPublicKey::Rs256 { n, e } = self else {
            return Err(KeyError::UnsupportedAlgorithm(self.algorithm().to_i64()));
        };
        RsaPublicKey::new(BigUint::from_bytes_be(n), BigUint::from_bytes_be(e))
            .map_err(|e| KeyError::InvalidKey(format!("bad RSA key: {e}")))
    }
}

fn strip_leading_zeros(mut bytes: Vec<u8>) -> Vec<u8> {
    let zeros = bytes.iter().take_while(|b| **b == 0).count();
    bytes.drain(..zeros);
    bytes
}
