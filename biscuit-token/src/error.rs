/*
 * Copyright (c) 2019 Geoffroy Couprie <contact@geoffroycouprie.com> and Contributors to the Eclipse Foundation.
 * SPDX-License-Identifier: Apache-2.0
 */
//! error types
use std::{convert::Infallible, fmt};

#[cfg(feature = "serde-error")]
use serde::Serialize;

pub use biscuit_token_parser::error::LanguageError;

/// the top level error type, wrapping all other error types
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "serde-error", derive(Serialize))]
pub enum Token {
    #[error("error deserializing or verifying the token: {0}")]
    Format(Format),
    #[error("tried to append a block to a sealed token")]
    AppendOnSealed,
    #[error("tried to seal an already sealed token")]
    AlreadySealed,
    #[error("authorization failed: {0}")]
    FailedLogic(Logic),
    #[error("error generating Datalog: {0}")]
    Language(LanguageError),
    #[error("reached Datalog execution limits")]
    RunLimit(RunLimit),
    #[error("cannot convert from Term: {0}")]
    ConversionError(String),
    #[error("cannot convert from Block: {0}")]
    Base64(String),
}

impl From<Format> for Token {
    fn from(e: Format) -> Self {
        Token::Format(e)
    }
}

impl From<Infallible> for Token {
    fn from(e: Infallible) -> Self {
        match e {}
    }
}

impl From<base64::DecodeError> for Token {
    fn from(e: base64::DecodeError) -> Self {
        Token::Base64(e.to_string())
    }
}

impl From<LanguageError> for Token {
    fn from(e: LanguageError) -> Self {
        Token::Language(e)
    }
}

impl From<RunLimit> for Token {
    fn from(e: RunLimit) -> Self {
        Token::RunLimit(e)
    }
}

/// errors in the Biscuit format
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "serde-error", derive(Serialize))]
pub enum Format {
    #[error("failed verifying the signature")]
    Signature(Signature),
    #[error("failed verifying the signature of a sealed token")]
    SealedSignature,
    #[error("the token does not provide intermediate public keys")]
    EmptyKeys,
    #[error("could not find the appropriate key to verify the signature")]
    UnknownPublicKey,
    #[error("could not deserialize the wrapped data")]
    DeserializationError(String),
    #[error("could not serialize the wrapped data")]
    SerializationError(String),
    #[error("could not deserialize the block")]
    BlockDeserializationError(String),
    #[error("could not serialize the block")]
    BlockSerializationError(String),
    #[error("Datalog contents of the block are disjoint with the symbol table")]
    SymbolTableOverlap,
    #[error("multiple symbol tables share the same namespace")]
    InvalidSymbolTable,
    #[error("tried to get a block at an invalid index")]
    InvalidBlockId(usize),
    #[error("block signature version is not supported")]
    InvalidSignatureSize,
    #[error("the key used in this token does not match the root public key")]
    UnknownPublicKeyId(u32),
    #[error("the root public key was not provided and no key provider could resolve it")]
    UnknownPublicKeyClass,
    #[error(
        "block format version is outdated, expected at least {minimum}, maximum {maximum}, got {actual}"
    )]
    Version {
        minimum: u32,
        maximum: u32,
        actual: u32,
    },
    #[error("invalid signature algorithm in the serialized key")]
    InvalidKeySize(usize),
    #[error("could not convert from the provided type")]
    ConvertError(String),
    #[error("could not deserialize the signature of a third party block")]
    BlockSignatureDeserializationError(String),
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signature::InvalidSignature(s) => write!(f, "invalid signature: {}", s),
            Signature::InvalidFormat => write!(f, "invalid signature format"),
        }
    }
}

/// errors related to the signature itself
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde-error", derive(Serialize))]
pub enum Signature {
    InvalidSignature(String),
    InvalidFormat,
}

/// errors in the Datalog evaluation
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "serde-error", derive(Serialize))]
pub enum Logic {
    #[error("no policy matched the request, denying by default")]
    NoMatchingPolicy { checks: Vec<FailedCheck> },
    #[error("a deny policy was triggered, or checks failed while testing an allow policy: {checks:?}, policy: {policy:?}")]
    Unauthorized {
        policy: MatchedPolicy,
        checks: Vec<FailedCheck>,
    },
    #[error("error evaluating an expression: {0}")]
    Evaluation(Expression),
}

/// policy that was matched to reach the given decision
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde-error", derive(Serialize))]
pub enum MatchedPolicy {
    Allow(usize),
    Deny(usize),
}

/// a single failed check, with the block and position it came from
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde-error", derive(Serialize))]
pub enum FailedCheck {
    Block(FailedBlockCheck),
    Authorizer(FailedAuthorizerCheck),
}

impl fmt::Display for FailedCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailedCheck::Block(c) => write!(f, "{}", c),
            FailedCheck::Authorizer(c) => write!(f, "{}", c),
        }
    }
}

/// a check that failed in a block of the token
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde-error", derive(Serialize))]
pub struct FailedBlockCheck {
    pub block_id: u32,
    pub check_id: u32,
    pub rule: String,
}

impl fmt::Display for FailedBlockCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "block check #{} failed in block {}: {}",
            self.check_id, self.block_id, self.rule
        )
    }
}

/// a check that failed in the authorizer
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde-error", derive(Serialize))]
pub struct FailedAuthorizerCheck {
    pub check_id: u32,
    pub rule: String,
}

impl fmt::Display for FailedAuthorizerCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "authorizer check #{} failed: {}", self.check_id, self.rule)
    }
}

/// errors coming from exceeding the authorizer's resource limits
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "serde-error", derive(Serialize))]
pub enum RunLimit {
    #[error("too many facts generated")]
    TooManyFacts,
    #[error("too many engine iterations")]
    TooManyIterations,
    #[error("spent too much time executing the authorizer")]
    Timeout,
}

/// errors evaluating an expression
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "serde-error", derive(Serialize))]
pub enum Expression {
    #[error("tried to pop a value from an empty stack, or the stack was not empty at the end of evaluation")]
    InvalidStack,
    #[error("invalid type used in an expression")]
    InvalidType,
    #[error("integer overflow while evaluating an expression")]
    Overflow,
    #[error("attempted to divide by zero")]
    DivideByZero,
    #[error("unknown symbol: {0}")]
    UnknownSymbol(u64),
    #[error("unknown variable: {0}")]
    UnknownVariable(u32),
    #[error("undefined extern function: {0}")]
    UndefinedExtern(String),
    #[error("error calling extern function {0}: {1}")]
    ExternEvalError(String, String),
    #[error("invalid regular expression")]
    InvalidRegex,
    #[error("closure parameter shadows an already bound variable")]
    ShadowedVariable,
}

impl From<Expression> for Token {
    fn from(e: Expression) -> Self {
        Token::FailedLogic(Logic::Evaluation(e))
    }
}
