/*
 * Copyright (c) 2019 Geoffroy Couprie <contact@geoffroycouprie.com> and Contributors to the Eclipse Foundation.
 * SPDX-License-Identifier: Apache-2.0
 */
//! low level wire format: signature chain serialization and verification
pub mod convert;
pub mod schema;

use prost::Message;

use crate::crypto::{
    block_signature_payload, verify_external_signature, ExternalSignature, KeyPair, PrivateKey,
    PublicKey, Signature,
};
use crate::error::{self, Format};
use crate::token::{Block, RootKeyProvider};

/// version of the payload covered by a third party block's external signature
pub const THIRD_PARTY_SIGNATURE_VERSION: u32 = 1;

/// how a third party block's external signature should be verified
///
/// tokens created before the third party block format was finalized used a
/// simpler (and weaker) scheme that did not hash in the previous block's
/// signature
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ThirdPartyVerificationMode {
    UnsafeLegacy,
    PreviousSignatureHashing,
}

/// a single signed block, as carried over the wire
#[derive(Clone, Debug)]
pub struct SignedBlock {
    pub data: Vec<u8>,
    pub next_key: PublicKey,
    pub signature: Signature,
    pub external_signature: Option<ExternalSignature>,
    pub version: u32,
}

/// proof attached to the token, allowing either further attenuation
/// (`NextSecret`) or proving the chain was sealed (`FinalSignature`)
#[derive(Clone, Debug)]
pub enum Proof {
    NextSecret(PrivateKey),
    FinalSignature(Signature),
}

/// a Biscuit token, with its cryptographic envelope intact
///
/// this is the structure that gets serialized to and deserialized from bytes;
/// [`crate::Biscuit`] wraps it together with the parsed Datalog contents
#[derive(Clone, Debug)]
pub struct SerializedBiscuit {
    pub root_key_id: Option<u32>,
    pub authority: SignedBlock,
    pub blocks: Vec<SignedBlock>,
    pub proof: Proof,
    third_party_verification_mode: ThirdPartyVerificationMode,
}

impl SerializedBiscuit {
    /// creates the first block of a new token, signed by the root keypair
    pub(crate) fn new(
        root_key_id: Option<u32>,
        root: &KeyPair,
        next: &KeyPair,
        authority: &Block,
    ) -> Result<Self, error::Token> {
        Self::new_inner(root_key_id, root, next, authority, 0)
    }

    /// same as [`Self::new`], but lets the caller pick the block signature
    /// payload version, used to exercise older token formats in tests
    pub(crate) fn new_inner(
        root_key_id: Option<u32>,
        root: &KeyPair,
        next: &KeyPair,
        authority: &Block,
        version: u32,
    ) -> Result<Self, error::Token> {
        let data = crate::format::convert::token_block_to_proto_block(authority).encode_to_vec();

        let payload = block_signature_payload(&data, &next.public(), None, None, version);
        let signature = root.sign(&payload).map_err(error::Token::Format)?;

        Ok(SerializedBiscuit {
            root_key_id,
            authority: SignedBlock {
                data,
                next_key: next.public(),
                signature,
                external_signature: None,
                version,
            },
            blocks: Vec::new(),
            proof: Proof::NextSecret(next.private()),
            third_party_verification_mode: ThirdPartyVerificationMode::PreviousSignatureHashing,
        })
    }

    fn last_signed_block(&self) -> &SignedBlock {
        self.blocks.last().unwrap_or(&self.authority)
    }

    /// appends a block signed with `keypair`, whose public key must match the
    /// previous block's committed next key
    pub(crate) fn append(
        &self,
        keypair: &KeyPair,
        block: &Block,
        external_signature: Option<ExternalSignature>,
    ) -> Result<Self, error::Token> {
        let data = crate::format::convert::token_block_to_proto_block(block).encode_to_vec();
        self.append_serialized(keypair, data, external_signature)
    }

    /// appends a block whose Datalog contents have already been serialized,
    /// used both for regular attenuation and for third party blocks
    pub(crate) fn append_serialized(
        &self,
        keypair: &KeyPair,
        data: Vec<u8>,
        external_signature: Option<ExternalSignature>,
    ) -> Result<Self, error::Token> {
        let previous = self.last_signed_block();
        let previous_key = match &self.proof {
            Proof::NextSecret(sk) => KeyPair::from_private_key(sk.clone()),
            Proof::FinalSignature(_) => return Err(error::Token::AppendOnSealed),
        };

        if previous_key.public() != previous.next_key {
            return Err(error::Token::Format(Format::UnknownPublicKey));
        }

        let next = KeyPair::new_with_rng(keypair.algorithm(), &mut rand::rngs::OsRng);

        let external_signature_bytes = external_signature.as_ref().map(|sig| sig.signature.to_bytes());
        let payload = block_signature_payload(
            &data,
            &next.public(),
            external_signature_bytes,
            Some(previous.signature.to_bytes()),
            1,
        );
        let signature = keypair.sign(&payload).map_err(error::Token::Format)?;

        let mut blocks = self.blocks.clone();
        blocks.push(SignedBlock {
            data,
            next_key: next.public(),
            signature,
            external_signature,
            version: 1,
        });

        Ok(SerializedBiscuit {
            root_key_id: self.root_key_id,
            authority: self.authority.clone(),
            blocks,
            proof: Proof::NextSecret(next.private()),
            third_party_verification_mode: self.third_party_verification_mode,
        })
    }

    /// creates a sealed version of this container: the proof becomes a final
    /// signature over the last block, and no further blocks can be appended
    pub(crate) fn seal(&self) -> Result<Self, error::Token> {
        let last = self.last_signed_block();
        let sk = match &self.proof {
            Proof::NextSecret(sk) => sk.clone(),
            Proof::FinalSignature(_) => return Err(error::Token::AlreadySealed),
        };

        let keypair = KeyPair::from_private_key(sk);
        let mut seal_payload = block_signature_payload(&last.data, &last.next_key, None, None, 0);
        seal_payload.extend_from_slice(last.signature.to_bytes());
        let signature = keypair.sign(&seal_payload).map_err(error::Token::Format)?;

        Ok(SerializedBiscuit {
            root_key_id: self.root_key_id,
            authority: self.authority.clone(),
            blocks: self.blocks.clone(),
            proof: Proof::FinalSignature(signature),
            third_party_verification_mode: self.third_party_verification_mode,
        })
    }

    /// verifies the whole signature chain against the given root public key
    pub(crate) fn verify(&self, root: &PublicKey) -> Result<(), Format> {
        let payload = block_signature_payload(
            &self.authority.data,
            &self.authority.next_key,
            self.authority
                .external_signature
                .as_ref()
                .map(|sig| sig.signature.to_bytes()),
            None,
            self.authority.version,
        );
        root.verify_signature(&payload, &self.authority.signature)?;

        let mut previous = &self.authority;
        for block in self.blocks.iter() {
            let payload = block_signature_payload(
                &block.data,
                &block.next_key,
                block
                    .external_signature
                    .as_ref()
                    .map(|sig| sig.signature.to_bytes()),
                Some(previous.signature.to_bytes()),
                block.version,
            );

            previous
                .next_key
                .verify_signature(&payload, &block.signature)?;

            if let Some(ext) = &block.external_signature {
                verify_external_signature(
                    &block.data,
                    &previous.next_key,
                    &previous.signature,
                    ext,
                    THIRD_PARTY_SIGNATURE_VERSION,
                    self.third_party_verification_mode,
                )
                .map_err(|_| Format::Signature(error::Signature::InvalidSignature(
                    "external signature verification failed".to_string(),
                )))?;
            }

            previous = block;
        }

        match &self.proof {
            Proof::NextSecret(sk) => {
                if KeyPair::from_private_key(sk.clone()).public() != previous.next_key {
                    return Err(Format::SealedSignature);
                }
            }
            Proof::FinalSignature(sig) => {
                let mut seal_payload =
                    block_signature_payload(&previous.data, &previous.next_key, None, None, 0);
                seal_payload.extend_from_slice(previous.signature.to_bytes());
                previous
                    .next_key
                    .verify_signature(&seal_payload, sig)
                    .map_err(|_| Format::SealedSignature)?;
            }
        }

        Ok(())
    }

    /// deserializes and verifies a token, choosing the root key via `key_provider`
    pub(crate) fn from_slice<KP>(slice: &[u8], key_provider: KP) -> Result<Self, Format>
    where
        KP: RootKeyProvider,
    {
        let container = Self::deserialize(slice, ThirdPartyVerificationMode::PreviousSignatureHashing)
            .map_err(|e| match e {
                error::Token::Format(f) => f,
                _ => Format::DeserializationError("invalid token".to_string()),
            })?;

        let root = key_provider.choose(container.root_key_id)?;
        container.verify(&root)?;

        Ok(container)
    }

    /// same as [`Self::from_slice`], but allows the deprecated (unsafe) third
    /// party block verification scheme
    pub(crate) fn unsafe_from_slice<KP>(slice: &[u8], key_provider: KP) -> Result<Self, Format>
    where
        KP: RootKeyProvider,
    {
        let container = Self::deserialize(slice, ThirdPartyVerificationMode::UnsafeLegacy).map_err(|e| {
            match e {
                error::Token::Format(f) => f,
                _ => Format::DeserializationError("invalid token".to_string()),
            }
        })?;

        let root = key_provider.choose(container.root_key_id)?;
        container.verify(&root)?;

        Ok(container)
    }

    /// deserializes the raw wire format without verifying any signature
    pub(crate) fn deserialize(
        slice: &[u8],
        mode: ThirdPartyVerificationMode,
    ) -> Result<Self, error::Token> {
        let proto = schema::Biscuit::decode(slice).map_err(|e| {
            error::Token::Format(Format::DeserializationError(format!(
                "deserialization error: {:?}",
                e
            )))
        })?;

        let authority = signed_block_from_proto(&proto.authority)?;
        let mut blocks = Vec::new();
        for block in proto.blocks.iter() {
            blocks.push(signed_block_from_proto(block)?);
        }

        let proof = match proto.proof.content {
            Some(schema::proof::Content::NextSecret(bytes)) => {
                let algorithm = authority.next_key.algorithm();
                Proof::NextSecret(
                    PrivateKey::from_bytes(&bytes, algorithm).map_err(error::Token::Format)?,
                )
            }
            Some(schema::proof::Content::FinalSignature(bytes)) => {
                Proof::FinalSignature(Signature::from_vec(bytes))
            }
            None => {
                return Err(error::Token::Format(Format::DeserializationError(
                    "deserialization error: missing proof".to_string(),
                )))
            }
        };

        Ok(SerializedBiscuit {
            root_key_id: proto.root_key_id,
            authority,
            blocks,
            proof,
            third_party_verification_mode: mode,
        })
    }

    /// serializes the token to the wire format
    pub(crate) fn to_vec(&self) -> Result<Vec<u8>, Format> {
        Ok(self.to_proto().encode_to_vec())
    }

    /// size in bytes of the serialized token
    pub(crate) fn serialized_size(&self) -> usize {
        self.to_proto().encoded_len()
    }

    fn to_proto(&self) -> schema::Biscuit {
        schema::Biscuit {
            root_key_id: self.root_key_id,
            authority: signed_block_to_proto(&self.authority),
            blocks: self.blocks.iter().map(signed_block_to_proto).collect(),
            proof: schema::Proof {
                content: Some(match &self.proof {
                    Proof::NextSecret(sk) => schema::proof::Content::NextSecret(sk.to_bytes()),
                    Proof::FinalSignature(sig) => {
                        schema::proof::Content::FinalSignature(sig.to_bytes().to_vec())
                    }
                }),
            },
        }
    }

    /// decodes the authority and attenuation blocks into their protobuf
    /// representation, to be further converted by the caller
    pub(crate) fn extract_blocks(
        &self,
        symbols: &mut crate::datalog::SymbolTable,
    ) -> Result<(schema::Block, Vec<schema::Block>), error::Token> {
        let authority = schema::Block::decode(&self.authority.data[..]).map_err(|e| {
            error::Token::Format(Format::BlockDeserializationError(format!(
                "error deserializing block: {:?}",
                e
            )))
        })?;

        let authority_block = crate::format::convert::proto_block_to_token_block(
            &authority,
            self.authority.external_signature.as_ref().map(|s| s.public_key),
        )?;
        if !symbols.is_disjoint(&authority_block.symbols) {
            return Err(error::Token::Format(Format::SymbolTableOverlap));
        }
        symbols.extend(&authority_block.symbols)?;
        symbols.public_keys.extend(&authority_block.public_keys)?;

        let mut blocks = Vec::new();
        for signed in self.blocks.iter() {
            let decoded = schema::Block::decode(&signed.data[..]).map_err(|e| {
                error::Token::Format(Format::BlockDeserializationError(format!(
                    "error deserializing block: {:?}",
                    e
                )))
            })?;

            let token_block = crate::format::convert::proto_block_to_token_block(
                &decoded,
                signed.external_signature.as_ref().map(|s| s.public_key),
            )?;
            if signed.external_signature.is_none() && !symbols.is_disjoint(&token_block.symbols) {
                return Err(error::Token::Format(Format::SymbolTableOverlap));
            }
            if signed.external_signature.is_none() {
                symbols.extend(&token_block.symbols)?;
                symbols.public_keys.extend(&token_block.public_keys)?;
            }

            blocks.push(decoded);
        }

        Ok((authority, blocks))
    }
}

fn signed_block_to_proto(block: &SignedBlock) -> schema::SignedBlock {
    schema::SignedBlock {
        block: block.data.clone(),
        next_key: block.next_key.to_proto(),
        signature: block.signature.to_bytes().to_vec(),
        external_signature: block.external_signature.as_ref().map(|sig| schema::ExternalSignature {
            signature: sig.signature.to_bytes().to_vec(),
            public_key: sig.public_key.to_proto(),
        }),
        version: Some(block.version),
    }
}

fn signed_block_from_proto(block: &schema::SignedBlock) -> Result<SignedBlock, error::Token> {
    let next_key = PublicKey::from_proto(&block.next_key).map_err(error::Token::Format)?;
    let external_signature = match &block.external_signature {
        None => None,
        Some(sig) => Some(ExternalSignature {
            public_key: PublicKey::from_proto(&sig.public_key).map_err(error::Token::Format)?,
            signature: Signature::from_vec(sig.signature.clone()),
        }),
    };

    Ok(SignedBlock {
        data: block.block.clone(),
        next_key,
        signature: Signature::from_vec(block.signature.clone()),
        external_signature,
        version: block.version.unwrap_or(0),
    })
}

