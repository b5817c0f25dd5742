/*
 * Copyright (c) 2019 Geoffroy Couprie <contact@geoffroycouprie.com> and Contributors to the Eclipse Foundation.
 * SPDX-License-Identifier: Apache-2.0
 */
//! the content of a single block: its facts, rules and checks, along with the
//! symbol table and scoping information needed to interpret them

use crate::crypto::PublicKey;
use crate::datalog::{Check, Fact, Rule, SymbolTable};

use super::public_keys::PublicKeys;
use super::Scope;

/// a block of a token, either the authority block or one of the attenuation blocks
#[derive(Clone, Debug)]
pub struct Block {
    /// the symbol table, containing only the symbols introduced by this block
    pub symbols: SymbolTable,
    pub facts: Vec<Fact>,
    pub rules: Vec<Rule>,
    pub checks: Vec<Check>,
    /// contents of an optional free form text field
    pub context: Option<String>,
    /// Datalog schema version used by this block
    pub version: u32,
    /// the public key used to verify an external block's signature, if any
    pub external_key: Option<PublicKey>,
    /// list of public keys referenced by this block's scopes and checks
    pub public_keys: PublicKeys,
    pub scopes: Vec<Scope>,
}

impl Block {
    pub fn new(symbols: SymbolTable) -> Block {
        Block {
            symbols,
            facts: Vec::new(),
            rules: Vec::new(),
            checks: Vec::new(),
            context: None,
            version: super::MIN_SCHEMA_VERSION,
            external_key: None,
            public_keys: PublicKeys::new(),
            scopes: Vec::new(),
        }
    }

    /// pretty print this block's contents as Datalog source, resolving
    /// symbols against `symbols` (the block's own table for a third party
    /// block, the token's merged table otherwise)
    pub fn print_source(&self, symbols: &SymbolTable) -> String {
        super::print_block(symbols, self)
    }
}
