/*
 * Copyright (c) 2019 Geoffroy Couprie <contact@geoffroycouprie.com> and Contributors to the Eclipse Foundation.
 * SPDX-License-Identifier: Apache-2.0
 */
//! parses Datalog source text into the builder-level representation used
//! throughout this crate, delegating the grammar itself to
//! `biscuit-token-parser` and only adapting its output types

use biscuit_token_parser::parser as grammar;

use crate::error::LanguageError;
use crate::token::builder::{Check, Fact, Policy, Rule};

/// parses a single fact, e.g. `right("file1", "read")`
pub fn parse_fact(source: &str) -> Result<Fact, LanguageError> {
    Ok(Fact::from(grammar::parse_fact(source)?))
}

/// parses a single rule, e.g. `parent($a, $b) <- ancestor($a, $b), distance($a, $b, 1)`
pub fn parse_rule(source: &str) -> Result<Rule, LanguageError> {
    let (rule, scopes) = grammar::parse_rule(source)?;
    Ok(Rule::from((rule, scopes)))
}

/// parses a single check, e.g. `check if resource("file1")`
pub fn parse_check(source: &str) -> Result<Check, LanguageError> {
    Ok(Check::from(grammar::parse_check(source)?))
}

/// parses a single policy, e.g. `allow if true`
pub fn parse_policy(source: &str) -> Result<Policy, LanguageError> {
    Ok(Policy::from(grammar::parse_policy(source)?))
}

/// strips the `//` line comments the other parsers do not expect
pub fn strip_comments(source: &str) -> String {
    grammar::strip_comments(source)
}
