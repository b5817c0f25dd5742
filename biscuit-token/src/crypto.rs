/*
 * Copyright (c) 2019 Geoffroy Couprie <contact@geoffroycouprie.com> and Contributors to the Eclipse Foundation.
 * SPDX-License-Identifier: Apache-2.0
 */
//! cryptographic operations
//!
//! Biscuit tokens use public key cryptography to sign a chain of blocks. Each
//! block signature covers the block's contents and the public key that will
//! sign the next block. This module wraps the actual signature algorithms
//! (Ed25519 and ECDSA over P256) behind a small, serialization friendly API.
use std::convert::TryInto;
use std::fmt;

use rand_core::{CryptoRng, RngCore};

use crate::error::{self, Format};
use crate::format::schema;
use crate::format::ThirdPartyVerificationMode;
use crate::token::builder::Algorithm;

/// pair of public and private key, used to sign a block
#[derive(Clone)]
pub struct KeyPair {
    private: PrivateKey,
    public: PublicKey,
}

impl KeyPair {
    pub fn new() -> Self {
        Self::new_with_rng(Algorithm::Ed25519, &mut rand::rngs::OsRng)
    }

    pub fn new_with_rng<T: RngCore + CryptoRng>(algorithm: Algorithm, rng: &mut T) -> Self {
        match algorithm {
            Algorithm::Ed25519 => {
                let kp = ed25519_dalek::SigningKey::generate(rng);
                let public = PublicKey::Ed25519(kp.verifying_key());
                KeyPair {
                    private: PrivateKey::Ed25519(kp),
                    public,
                }
            }
            Algorithm::Secp256r1 => {
                let sk = p256::ecdsa::SigningKey::random(rng);
                let public = PublicKey::Secp256r1(*sk.verifying_key());
                KeyPair {
                    private: PrivateKey::Secp256r1(sk),
                    public,
                }
            }
        }
    }

    pub fn from_private_key(private: PrivateKey) -> Self {
        let public = private.public();
        KeyPair { private, public }
    }

    pub fn private(&self) -> PrivateKey {
        self.private.clone()
    }

    pub fn public(&self) -> PublicKey {
        self.public
    }

    pub fn algorithm(&self) -> Algorithm {
        self.public.algorithm()
    }

    /// signs a payload with the private key
    pub fn sign(&self, data: &[u8]) -> Result<Signature, error::Format> {
        self.private.sign(data)
    }
}

impl Default for KeyPair {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyPair {{ public: {} }}", self.public.print())
    }
}

/// private part of a keypair, used to produce signatures
#[derive(Clone)]
pub enum PrivateKey {
    Ed25519(ed25519_dalek::SigningKey),
    Secp256r1(p256::ecdsa::SigningKey),
}

impl PrivateKey {
    pub fn algorithm(&self) -> Algorithm {
        match self {
            PrivateKey::Ed25519(_) => Algorithm::Ed25519,
            PrivateKey::Secp256r1(_) => Algorithm::Secp256r1,
        }
    }

    pub fn public(&self) -> PublicKey {
        match self {
            PrivateKey::Ed25519(kp) => PublicKey::Ed25519(kp.verifying_key()),
            PrivateKey::Secp256r1(kp) => PublicKey::Secp256r1(*kp.verifying_key()),
        }
    }

    pub fn sign(&self, data: &[u8]) -> Result<Signature, error::Format> {
        use ed25519_dalek::Signer as _;
        use p256::ecdsa::signature::Signer as _;

        match self {
            PrivateKey::Ed25519(kp) => Ok(Signature(kp.sign(data).to_bytes().to_vec())),
            PrivateKey::Secp256r1(kp) => {
                let sig: p256::ecdsa::DerSignature = kp.sign(data);
                Ok(Signature(sig.to_bytes().to_vec()))
            }
        }
    }

    pub fn from_bytes(bytes: &[u8], algorithm: Algorithm) -> Result<Self, error::Format> {
        match algorithm {
            Algorithm::Ed25519 => {
                let arr: [u8; 32] = bytes
                    .try_into()
                    .map_err(|_| Format::InvalidKeySize(bytes.len()))?;
                Ok(PrivateKey::Ed25519(ed25519_dalek::SigningKey::from_bytes(
                    &arr,
                )))
            }
            Algorithm::Secp256r1 => {
                let sk = p256::ecdsa::SigningKey::from_slice(bytes)
                    .map_err(|_| Format::InvalidKeySize(bytes.len()))?;
                Ok(PrivateKey::Secp256r1(sk))
            }
        }
    }

    pub fn from_bytes_hex(str: &str, algorithm: Algorithm) -> Result<Self, error::Format> {
        let bytes = hex::decode(str).map_err(|e| Format::DeserializationError(e.to_string()))?;
        Self::from_bytes(&bytes, algorithm)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            PrivateKey::Ed25519(kp) => kp.to_bytes().to_vec(),
            PrivateKey::Secp256r1(kp) => kp.to_bytes().to_vec(),
        }
    }

    pub fn to_bytes_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }
}

/// public part of a keypair, used to verify signatures
#[derive(Clone, Copy)]
pub enum PublicKey {
    Ed25519(ed25519_dalek::VerifyingKey),
    Secp256r1(p256::ecdsa::VerifyingKey),
}

impl PublicKey {
    pub fn algorithm(&self) -> Algorithm {
        match self {
            PublicKey::Ed25519(_) => Algorithm::Ed25519,
            PublicKey::Secp256r1(_) => Algorithm::Secp256r1,
        }
    }

    pub fn verify_signature(&self, data: &[u8], signature: &Signature) -> Result<(), Format> {
        use ed25519_dalek::Verifier as _;
        use p256::ecdsa::signature::Verifier as _;

        match self {
            PublicKey::Ed25519(key) => {
                let sig_bytes: [u8; 64] = signature
                    .0
                    .as_slice()
                    .try_into()
                    .map_err(|_| Format::InvalidSignatureSize)?;
                let sig = ed25519_dalek::Signature::from_bytes(&sig_bytes);
                key.verify(data, &sig)
                    .map_err(|e| Format::Signature(error::Signature::InvalidSignature(e.to_string())))
            }
            PublicKey::Secp256r1(key) => {
                let sig = p256::ecdsa::DerSignature::from_bytes(signature.0.as_slice().into())
                    .map_err(|_| Format::InvalidSignatureSize)?;
                key.verify(data, &sig)
                    .map_err(|e| Format::Signature(error::Signature::InvalidSignature(e.to_string())))
            }
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            PublicKey::Ed25519(key) => key.to_bytes().to_vec(),
            PublicKey::Secp256r1(key) => key.to_encoded_point(true).as_bytes().to_vec(),
        }
    }

    pub fn from_bytes(bytes: &[u8], algorithm: Algorithm) -> Result<Self, Format> {
        match algorithm {
            Algorithm::Ed25519 => {
                let arr: [u8; 32] = bytes
                    .try_into()
                    .map_err(|_| Format::InvalidKeySize(bytes.len()))?;
                let key = ed25519_dalek::VerifyingKey::from_bytes(&arr)
                    .map_err(|_| Format::InvalidKeySize(bytes.len()))?;
                Ok(PublicKey::Ed25519(key))
            }
            Algorithm::Secp256r1 => {
                let key = p256::ecdsa::VerifyingKey::from_sec1_bytes(bytes)
                    .map_err(|_| Format::InvalidKeySize(bytes.len()))?;
                Ok(PublicKey::Secp256r1(key))
            }
        }
    }

    pub fn from_bytes_hex(str: &str, algorithm: Algorithm) -> Result<Self, Format> {
        let bytes = hex::decode(str).map_err(|e| Format::DeserializationError(e.to_string()))?;
        Self::from_bytes(&bytes, algorithm)
    }

    pub fn print(&self) -> String {
        hex::encode(self.to_bytes())
    }

    pub(crate) fn to_proto(&self) -> schema::PublicKey {
        schema::PublicKey {
            algorithm: match self.algorithm() {
                Algorithm::Ed25519 => schema::public_key::Algorithm::Ed25519 as i32,
                Algorithm::Secp256r1 => schema::public_key::Algorithm::Secp256r1 as i32,
            },
            key: self.to_bytes(),
        }
    }

    pub(crate) fn from_proto(key: &schema::PublicKey) -> Result<Self, Format> {
        let algorithm = match schema::public_key::Algorithm::from_i32(key.algorithm) {
            Some(schema::public_key::Algorithm::Ed25519) => Algorithm::Ed25519,
            Some(schema::public_key::Algorithm::Secp256r1) => Algorithm::Secp256r1,
            None => return Err(Format::DeserializationError("invalid algorithm".to_string())),
        };

        Self::from_bytes(&key.key, algorithm)
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self.print())
    }
}

impl PartialEq for PublicKey {
    fn eq(&self, other: &Self) -> bool {
        self.algorithm() == other.algorithm() && self.to_bytes() == other.to_bytes()
    }
}

impl Eq for PublicKey {}

impl std::hash::Hash for PublicKey {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.algorithm().hash(state);
        self.to_bytes().hash(state);
    }
}

/// a detached signature, algorithm-agnostic
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Signature(pub(crate) Vec<u8>);

impl Signature {
    pub fn from_vec(bytes: Vec<u8>) -> Self {
        Signature(bytes)
    }

    pub fn to_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// signature produced by the holder of an external (third-party) key, over a block
#[derive(Clone, Debug)]
pub struct ExternalSignature {
    pub public_key: PublicKey,
    pub signature: Signature,
}

/// builds the payload covered by a block's main signature
///
/// version 0: `block || [external_signature] || next_key_algo || next_key_bytes`
/// version >= 1: version 0 payload followed by the previous block's signature
pub(crate) fn block_signature_payload(
    block: &[u8],
    next_key: &PublicKey,
    external_signature: Option<&[u8]>,
    previous_signature: Option<&[u8]>,
    version: u32,
) -> Vec<u8> {
    let mut payload = Vec::new();
    payload.extend_from_slice(block);

    if let Some(sig) = external_signature {
        payload.extend_from_slice(sig);
    }

    let algo: u32 = match next_key.algorithm() {
        Algorithm::Ed25519 => 0,
        Algorithm::Secp256r1 => 1,
    };
    payload.extend_from_slice(&algo.to_le_bytes());
    payload.extend_from_slice(&next_key.to_bytes());

    if version >= 1 {
        if let Some(prev) = previous_signature {
            payload.extend_from_slice(prev);
        }
    }

    payload
}

/// builds the payload a third-party block's external signature covers:
/// `block || previous_block_signature || version`
pub(crate) fn external_signature_payload(
    block: &[u8],
    previous_signature: &[u8],
    version: u32,
) -> Vec<u8> {
    let mut payload = Vec::new();
    payload.extend_from_slice(block);
    payload.extend_from_slice(previous_signature);
    payload.extend_from_slice(&version.to_le_bytes());
    payload
}

/// verifies a third-party block's external signature
pub(crate) fn verify_external_signature(
    payload: &[u8],
    _previous_key: &PublicKey,
    previous_signature: &Signature,
    external_signature: &ExternalSignature,
    version: u32,
    mode: ThirdPartyVerificationMode,
) -> Result<(), error::Token> {
    let to_verify = match mode {
        ThirdPartyVerificationMode::PreviousSignatureHashing => {
            external_signature_payload(payload, previous_signature.to_bytes(), version)
        }
        ThirdPartyVerificationMode::UnsafeLegacy => payload.to_vec(),
    };

    external_signature
        .public_key
        .verify_signature(&to_verify, &external_signature.signature)
        .map_err(error::Token::Format)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn keypair() -> KeyPair {
        KeyPair::new_with_rng(Algorithm::Ed25519, &mut rand::rngs::StdRng::seed_from_u64(0))
    }

    #[test]
    fn block_signature_payload_v0_layout() {
        let next_key = keypair().public();
        let block = b"some block bytes".to_vec();

        let payload = block_signature_payload(&block, &next_key, None, None, 0);

        let mut expected = Vec::new();
        expected.extend_from_slice(&block);
        expected.extend_from_slice(&0u32.to_le_bytes());
        expected.extend_from_slice(&next_key.to_bytes());

        assert_eq!(payload, expected);
    }

    #[test]
    fn block_signature_payload_includes_external_signature() {
        let next_key = keypair().public();
        let block = b"block".to_vec();
        let external = vec![1, 2, 3, 4];

        let payload = block_signature_payload(&block, &next_key, Some(&external), None, 0);

        let mut expected = Vec::new();
        expected.extend_from_slice(&block);
        expected.extend_from_slice(&external);
        expected.extend_from_slice(&0u32.to_le_bytes());
        expected.extend_from_slice(&next_key.to_bytes());

        assert_eq!(payload, expected);
    }

    #[test]
    fn block_signature_payload_v1_appends_previous_signature() {
        let next_key = keypair().public();
        let block = b"block".to_vec();
        let previous = vec![9, 9, 9];

        let payload = block_signature_payload(&block, &next_key, None, Some(&previous), 1);

        let mut expected = Vec::new();
        expected.extend_from_slice(&block);
        expected.extend_from_slice(&0u32.to_le_bytes());
        expected.extend_from_slice(&next_key.to_bytes());
        expected.extend_from_slice(&previous);

        assert_eq!(payload, expected);
    }

    #[test]
    fn block_signature_payload_v0_ignores_previous_signature() {
        let next_key = keypair().public();
        let block = b"block".to_vec();
        let previous = vec![9, 9, 9];

        let payload = block_signature_payload(&block, &next_key, None, Some(&previous), 0);

        assert!(!payload.ends_with(&previous));
    }

    #[test]
    fn external_signature_payload_layout() {
        let block = b"block bytes".to_vec();
        let previous_signature = vec![5, 6, 7];

        let payload = external_signature_payload(&block, &previous_signature, 0);

        let mut expected = Vec::new();
        expected.extend_from_slice(&block);
        expected.extend_from_slice(&previous_signature);
        expected.extend_from_slice(&0u32.to_le_bytes());

        assert_eq!(payload, expected);
    }

    #[test]
    fn sign_and_verify_roundtrip() {
        let kp = keypair();
        let data = b"hello world";
        let signature = kp.sign(data).unwrap();

        assert!(kp.public().verify_signature(data, &signature).is_ok());
        assert!(kp.public().verify_signature(b"tampered", &signature).is_err());
    }

    #[test]
    fn private_key_bytes_roundtrip() {
        let kp = keypair();
        let bytes = kp.private().to_bytes();
        let restored = PrivateKey::from_bytes(&bytes, Algorithm::Ed25519).unwrap();
        assert_eq!(restored.public(), kp.public());
    }
}
