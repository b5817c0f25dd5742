/*
 * Copyright (c) 2019 Geoffroy Couprie <contact@geoffroycouprie.com> and Contributors to the Eclipse Foundation.
 * SPDX-License-Identifier: Apache-2.0
 */
//! error types for the Datalog text parser
use std::fmt;

#[cfg(feature = "serde-error")]
use serde::Serialize;

/// errors that can happen when parsing Datalog source text
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "serde-error", derive(Serialize))]
pub enum LanguageError {
    #[error("parser error: {0:?}")]
    ParseError(Vec<LanguageErrorDetail>),
    #[error("the parser did not consume the whole input")]
    RemainingInput,
    #[error("expression shadows an already bound variable: {0}")]
    Shadowing(String),
}

/// a single parser error, with source position and message
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde-error", derive(Serialize))]
pub struct LanguageErrorDetail {
    pub input: String,
    pub message: String,
}

impl fmt::Display for LanguageErrorDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (near `{}`)", self.message, self.input)
    }
}
