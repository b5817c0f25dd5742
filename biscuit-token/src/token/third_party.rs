/*
 * Copyright (c) 2019 Geoffroy Couprie <contact@geoffroycouprie.com> and Contributors to the Eclipse Foundation.
 * SPDX-License-Identifier: Apache-2.0
 */
//! support for third party blocks: blocks signed by a key that is not the
//! token's root key, attached by the holder without needing the root key

use prost::Message;

use crate::crypto::{self, KeyPair, PrivateKey};
use crate::datalog::SymbolTable;
use crate::error;
use crate::format::convert::token_block_to_proto_block;
use crate::format::{schema, SerializedBiscuit, THIRD_PARTY_SIGNATURE_VERSION};

use super::builder::BlockBuilder;

/// a request for a third party block, generated from a token, to be handed to
/// the holder of an external keypair
pub struct ThirdPartyRequest {
    pub(crate) previous_signature: crypto::Signature,
    pub(crate) symbols: SymbolTable,
}

impl ThirdPartyRequest {
    pub(crate) fn from_container(container: &SerializedBiscuit) -> Result<Self, error::Token> {
        let mut symbols = super::default_symbol_table();
        container.extract_blocks(&mut symbols)?;

        let previous = container.blocks.last().unwrap_or(&container.authority);

        Ok(ThirdPartyRequest {
            previous_signature: previous.signature.clone(),
            symbols,
        })
    }

    /// builds and signs a new block with the provided external keypair,
    /// producing the data to hand back to the token holder
    pub fn create_block(
        &self,
        private_key: &PrivateKey,
        block_builder: BlockBuilder,
    ) -> Result<ThirdPartyBlock, error::Token> {
        let keypair = KeyPair::from_private_key(private_key.clone());

        let mut block = block_builder.build(self.symbols.clone());
        block.external_key = Some(keypair.public());

        let payload = token_block_to_proto_block(&block).encode_to_vec();
        let to_sign = crypto::external_signature_payload(
            &payload,
            self.previous_signature.to_bytes(),
            THIRD_PARTY_SIGNATURE_VERSION,
        );
        let signature = keypair.sign(&to_sign).map_err(error::Token::Format)?;

        Ok(ThirdPartyBlock(ThirdPartyBlockContents {
            payload,
            external_signature: schema::ExternalSignature {
                signature: signature.to_bytes().to_vec(),
                public_key: keypair.public().to_proto(),
            },
        }))
    }
}

/// a third party block, ready to be appended to the token it was requested from
#[derive(Clone, Debug)]
pub struct ThirdPartyBlock(pub(crate) ThirdPartyBlockContents);

impl ThirdPartyBlock {
    /// serializes the block so it can be transmitted to the token holder
    pub fn to_bytes(&self) -> Result<Vec<u8>, error::Token> {
        let proto = schema::ThirdPartyBlockContents {
            payload: self.0.payload.clone(),
            external_signature: self.0.external_signature.clone(),
        };
        Ok(proto.encode_to_vec())
    }
}

#[derive(Clone, Debug)]
pub(crate) struct ThirdPartyBlockContents {
    pub(crate) payload: Vec<u8>,
    pub(crate) external_signature: schema::ExternalSignature,
}
