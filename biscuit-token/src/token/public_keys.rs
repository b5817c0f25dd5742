/*
 * Copyright (c) 2019 Geoffroy Couprie <contact@geoffroycouprie.com> and Contributors to the Eclipse Foundation.
 * SPDX-License-Identifier: Apache-2.0
 */
use crate::crypto::PublicKey;
use crate::error;

/// the set of public keys referenced by a block or a token, used to resolve
/// `PublicKey` scopes and third party block signatures
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PublicKeys {
    pub keys: Vec<PublicKey>,
}

impl PublicKeys {
    pub fn new() -> Self {
        PublicKeys { keys: Vec::new() }
    }

    /// inserts a key, returning its index, reusing an existing entry if the
    /// key is already present
    pub fn insert(&mut self, key: &PublicKey) -> usize {
        if let Some(index) = self.keys.iter().position(|k| k == key) {
            return index;
        }
        self.keys.push(*key);
        self.keys.len() - 1
    }

    pub fn insert_fallible(&mut self, key: &PublicKey) -> Result<(), error::Format> {
        self.insert(key);
        Ok(())
    }

    pub fn get(&self, index: usize) -> Option<&PublicKey> {
        self.keys.get(index)
    }

    pub fn extend(&mut self, other: &PublicKeys) -> Result<(), error::Format> {
        for key in other.keys.iter() {
            self.insert(key);
        }
        Ok(())
    }
}
