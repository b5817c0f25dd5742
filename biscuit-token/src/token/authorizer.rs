/*
 * Copyright (c) 2019 Geoffroy Couprie <contact@geoffroycouprie.com> and Contributors to the Eclipse Foundation.
 * SPDX-License-Identifier: Apache-2.0
 */
//! runs the Datalog evaluation that decides whether a token authorizes a
//! request: merges the token's blocks and the caller's ad hoc facts, rules,
//! checks and policies into a single [`World`], saturates it, then checks
//! every check and matches policies in order.

use std::collections::HashMap;
use std::convert::TryFrom;
use std::time::Duration;

use crate::datalog::{
    self, ExternFunc, Origin, RunLimits, SymbolTable, TemporarySymbolTable, TrustedOrigins, World,
};
use crate::error::{self, FailedAuthorizerCheck, FailedBlockCheck, FailedCheck, Logic, MatchedPolicy};
use crate::token::builder::{AuthorizerBuilder, Convert, ConvertFrom, Fact, PolicyKind};
use crate::token::{Biscuit, Scope};

/// bounds on the Datalog evaluation carried out while authorizing a request
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthorizerLimits {
    pub max_facts: u64,
    pub max_iterations: u64,
    pub max_time: Duration,
}

impl Default for AuthorizerLimits {
    fn default() -> Self {
        AuthorizerLimits {
            max_facts: 1000,
            max_iterations: 100,
            max_time: Duration::from_millis(5),
        }
    }
}

impl From<AuthorizerLimits> for RunLimits {
    fn from(limits: AuthorizerLimits) -> Self {
        RunLimits {
            max_facts: limits.max_facts,
            max_iterations: limits.max_iterations,
            max_time: limits.max_time,
        }
    }
}

#[derive(Clone, Debug)]
struct PendingCheck {
    block_id: u32,
    check_id: u32,
    check: datalog::Check,
    printed: String,
}

#[derive(Clone, Debug)]
struct PendingAuthorizerCheck {
    check_id: u32,
    check: datalog::Check,
    printed: String,
}

#[derive(Clone, Debug)]
struct PendingPolicy {
    kind: PolicyKind,
    queries: Vec<datalog::Rule>,
}

/// the result of authorizing a token: combines the token's blocks with
/// whatever facts, rules, checks and policies the caller added, and
/// evaluates the whole thing as a single Datalog program
#[derive(Clone, Debug)]
pub struct Authorizer {
    pub(crate) symbols: SymbolTable,
    world: World,
    public_key_to_block_id: HashMap<usize, Vec<usize>>,
    block_scopes: Vec<Vec<Scope>>,
    block_checks: Vec<PendingCheck>,
    authorizer_checks: Vec<PendingAuthorizerCheck>,
    policies: Vec<PendingPolicy>,
    limits: AuthorizerLimits,
}

impl Authorizer {
    pub(crate) fn from_token(token: &Biscuit) -> Result<Self, error::Token> {
        Self::from_token_and_builder(token, AuthorizerBuilder::new())
    }

    pub(crate) fn from_token_and_builder(token: &Biscuit, builder: AuthorizerBuilder) -> Result<Self, error::Token> {
        let (facts, rules, checks, policies, limits) = builder.into_parts();

        let mut symbols = token.symbols.clone();
        let mut world = World::new();
        let mut public_key_to_block_id: HashMap<usize, Vec<usize>> = HashMap::new();
        let mut block_scopes = Vec::with_capacity(token.block_count());
        let mut block_checks = Vec::new();

        for i in 0..token.block_count() {
            let block = token.block(i)?;

            for fact in block.facts.iter() {
                let mut origin = Origin::default();
                origin.insert(i);
                world.insert_fact(origin, fact.clone());
            }

            for rule in block.rules.iter() {
                world.insert_rule(i, rule.clone());
            }

            for (check_id, check) in block.checks.iter().enumerate() {
                let printed = symbols.print_check(check);
                block_checks.push(PendingCheck {
                    block_id: i as u32,
                    check_id: check_id as u32,
                    check: check.clone(),
                    printed,
                });
            }

            if let Some(key) = token.block_external_key(i)? {
                if let Some(index) = symbols.public_keys.keys.iter().position(|k| k == &key) {
                    public_key_to_block_id.entry(index).or_default().push(i);
                }
            }

            block_scopes.push(block.scopes.clone());
        }

        for fact in facts {
            let fact = fact.convert(&mut symbols);
            let mut origin = Origin::default();
            origin.insert(usize::MAX);
            world.insert_fact(origin, fact);
        }

        for rule in rules {
            let rule = rule.convert(&mut symbols);
            world.insert_rule(usize::MAX, rule);
        }

        let mut authorizer_checks = Vec::new();
        for (check_id, check) in checks.into_iter().enumerate() {
            let check = check.convert(&mut symbols);
            let printed = symbols.print_check(&check);
            authorizer_checks.push(PendingAuthorizerCheck {
                check_id: check_id as u32,
                check,
                printed,
            });
        }

        let mut pending_policies = Vec::new();
        for policy in policies {
            let queries = policy.queries.iter().map(|q| q.convert(&mut symbols)).collect();
            pending_policies.push(PendingPolicy {
                kind: policy.kind,
                queries,
            });
        }

        Ok(Authorizer {
            symbols,
            world,
            public_key_to_block_id,
            block_scopes,
            block_checks,
            authorizer_checks,
            policies: pending_policies,
            limits,
        })
    }

    /// adds a fact, available for the rest of the authorizer's lifetime
    pub fn add_fact<F>(&mut self, fact: F) -> Result<(), error::Token>
    where
        F: TryInto<Fact>,
        error::Token: From<<F as TryInto<Fact>>::Error>,
    {
        let fact = fact.try_into()?;
        let fact = fact.convert(&mut self.symbols);
        let mut origin = Origin::default();
        origin.insert(usize::MAX);
        self.world.insert_fact(origin, fact);
        Ok(())
    }

    /// adds a rule, available for the rest of the authorizer's lifetime
    pub fn add_rule<R>(&mut self, rule: R) -> Result<(), error::Token>
    where
        R: TryInto<crate::token::builder::Rule>,
        error::Token: From<<R as TryInto<crate::token::builder::Rule>>::Error>,
    {
        let rule = rule.try_into()?;
        let rule = rule.convert(&mut self.symbols);
        self.world.insert_rule(usize::MAX, rule);
        Ok(())
    }

    /// adds a check, evaluated alongside the authorizer's other checks
    pub fn add_check<C>(&mut self, check: C) -> Result<(), error::Token>
    where
        C: TryInto<crate::token::builder::Check>,
        error::Token: From<<C as TryInto<crate::token::builder::Check>>::Error>,
    {
        let check = check.try_into()?;
        let check = check.convert(&mut self.symbols);
        let check_id = self.authorizer_checks.len() as u32;
        let printed = self.symbols.print_check(&check);
        self.authorizer_checks.push(PendingAuthorizerCheck {
            check_id,
            check,
            printed,
        });
        Ok(())
    }

    /// adds a policy, evaluated after the authorizer's facts and rules have
    /// saturated and every check has run
    pub fn add_policy<P>(&mut self, policy: P) -> Result<(), error::Token>
    where
        P: TryInto<crate::token::builder::Policy>,
        error::Token: From<<P as TryInto<crate::token::builder::Policy>>::Error>,
    {
        let policy = policy.try_into()?;
        let queries = policy.queries.iter().map(|q| q.convert(&mut self.symbols)).collect();
        self.policies.push(PendingPolicy {
            kind: policy.kind,
            queries,
        });
        Ok(())
    }

    /// runs the authorization, using the limits configured on the builder
    /// (or the default limits if none were set)
    pub fn authorize(&mut self) -> Result<(), error::Token> {
        let limits = self.limits.clone();
        self.authorize_with_limits(limits)
    }

    /// runs the authorization with an explicit set of limits
    pub fn authorize_with_limits(&mut self, limits: AuthorizerLimits) -> Result<(), error::Token> {
        let run_limits: RunLimits = limits.into();
        let default_origins = TrustedOrigins::default();
        let extern_funcs: HashMap<String, ExternFunc> = HashMap::new();
        let mut temp_symbols = TemporarySymbolTable::new(&self.symbols);

        let block_scopes = self.block_scopes.clone();
        let public_key_to_block_id = self.public_key_to_block_id.clone();
        self.world.run(
            move |block_id| {
                let scopes: &[Scope] = if block_id == usize::MAX {
                    &[]
                } else {
                    block_scopes.get(block_id).map(|v| v.as_slice()).unwrap_or(&[])
                };
                let trusted =
                    TrustedOrigins::from_scopes(scopes, &default_origins, block_id, &public_key_to_block_id);
                let mut origin = Origin::default();
                origin.insert(block_id);
                (trusted, origin)
            },
            &extern_funcs,
            &mut temp_symbols,
            &run_limits,
        )?;

        let mut failed_checks = Vec::new();

        for pending in self.authorizer_checks.iter() {
            let passed = self.check_passes(
                &pending.check,
                usize::MAX,
                &default_origins,
                &extern_funcs,
                &mut temp_symbols,
            )?;
            if !passed {
                failed_checks.push(FailedCheck::Authorizer(FailedAuthorizerCheck {
                    check_id: pending.check_id,
                    rule: pending.printed.clone(),
                }));
            }
        }

        for pending in self.block_checks.iter() {
            let passed = self.check_passes(
                &pending.check,
                pending.block_id as usize,
                &default_origins,
                &extern_funcs,
                &mut temp_symbols,
            )?;
            if !passed {
                failed_checks.push(FailedCheck::Block(FailedBlockCheck {
                    block_id: pending.block_id,
                    check_id: pending.check_id,
                    rule: pending.printed.clone(),
                }));
            }
        }

        for (index, policy) in self.policies.iter().enumerate() {
            let mut matched = false;
            for query in policy.queries.iter() {
                let trusted = TrustedOrigins::from_scopes(
                    &query.scopes,
                    &default_origins,
                    usize::MAX,
                    &self.public_key_to_block_id,
                );
                if self.world.test_rule(query, &trusted, &extern_funcs, &mut temp_symbols)? {
                    matched = true;
                    break;
                }
            }

            if matched {
                return match policy.kind {
                    PolicyKind::Allow => {
                        if failed_checks.is_empty() {
                            Ok(())
                        } else {
                            Err(error::Token::FailedLogic(Logic::Unauthorized {
                                policy: MatchedPolicy::Allow(index),
                                checks: failed_checks,
                            }))
                        }
                    }
                    PolicyKind::Deny => Err(error::Token::FailedLogic(Logic::Unauthorized {
                        policy: MatchedPolicy::Deny(index),
                        checks: failed_checks,
                    })),
                };
            }
        }

        Err(error::Token::FailedLogic(Logic::NoMatchingPolicy { checks: failed_checks }))
    }

    fn check_passes(
        &self,
        check: &datalog::Check,
        owner_block_id: usize,
        default_origins: &TrustedOrigins,
        extern_funcs: &HashMap<String, ExternFunc>,
        symbols: &mut TemporarySymbolTable,
    ) -> Result<bool, error::Token> {
        use crate::token::builder::CheckKind;

        match check.kind {
            CheckKind::One => {
                for query in check.queries.iter() {
                    let trusted = TrustedOrigins::from_scopes(
                        &query.scopes,
                        default_origins,
                        owner_block_id,
                        &self.public_key_to_block_id,
                    );
                    if self.world.test_rule(query, &trusted, extern_funcs, symbols)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            CheckKind::All => {
                for query in check.queries.iter() {
                    let trusted = TrustedOrigins::from_scopes(
                        &query.scopes,
                        default_origins,
                        owner_block_id,
                        &self.public_key_to_block_id,
                    );
                    if !self.world.test_rule_all(query, &trusted, extern_funcs, symbols)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            CheckKind::Reject => {
                for query in check.queries.iter() {
                    let trusted = TrustedOrigins::from_scopes(
                        &query.scopes,
                        default_origins,
                        owner_block_id,
                        &self.public_key_to_block_id,
                    );
                    if self.world.test_rule(query, &trusted, extern_funcs, symbols)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
        }
    }

    /// evaluates an ad hoc rule against the facts visible from the
    /// authorizer's default trust scope (the authority block and the
    /// authorizer's own facts), using the limits set on the builder
    pub fn query<T>(&self, rule: &str) -> Result<Vec<T>, error::Token>
    where
        T: TryFrom<Fact>,
        error::Token: From<<T as TryFrom<Fact>>::Error>,
    {
        self.query_with_limits(rule, self.limits.clone())
    }

    /// like [`Authorizer::query`], with an explicit set of limits
    pub fn query_with_limits<T>(&self, rule: &str, limits: AuthorizerLimits) -> Result<Vec<T>, error::Token>
    where
        T: TryFrom<Fact>,
        error::Token: From<<T as TryFrom<Fact>>::Error>,
    {
        self.run_query(rule, limits, &TrustedOrigins::default())
    }

    /// evaluates an ad hoc rule against every block's facts, ignoring the
    /// normal block scoping rules; meant for debugging and introspection
    pub fn query_all_with_limits<T>(&self, rule: &str, limits: AuthorizerLimits) -> Result<Vec<T>, error::Token>
    where
        T: TryFrom<Fact>,
        error::Token: From<<T as TryFrom<Fact>>::Error>,
    {
        let all: TrustedOrigins = (0..self.block_scopes.len())
            .chain(std::iter::once(usize::MAX))
            .collect();
        self.run_query(rule, limits, &all)
    }

    fn run_query<T>(&self, rule: &str, _limits: AuthorizerLimits, trusted: &TrustedOrigins) -> Result<Vec<T>, error::Token>
    where
        T: TryFrom<Fact>,
        error::Token: From<<T as TryFrom<Fact>>::Error>,
    {
        let rule = crate::parser::parse_rule(rule)?;
        let mut symbols = self.symbols.clone();
        let datalog_rule = rule.convert(&mut symbols);
        let extern_funcs: HashMap<String, ExternFunc> = HashMap::new();
        let mut temp_symbols = TemporarySymbolTable::new(&symbols);

        let facts = self
            .world
            .query_match(&datalog_rule, trusted, &extern_funcs, &mut temp_symbols)?;

        facts
            .iter()
            .map(|f| {
                let fact = Fact::convert_from(f, &symbols).map_err(error::Token::Format)?;
                T::try_from(fact).map_err(error::Token::from)
            })
            .collect()
    }

    /// pretty-prints every fact and rule currently known to the authorizer
    pub fn print_world(&self) -> String {
        let facts = self
            .world
            .facts
            .iter()
            .map(|(origin, fact)| format!("{}: {}", origin, self.symbols.print_fact(fact)))
            .collect::<Vec<_>>()
            .join("\n\t");
        let rules = self
            .world
            .rules
            .iter()
            .map(|(block_id, rule)| {
                let origin = if *block_id == usize::MAX {
                    "authorizer".to_string()
                } else {
                    block_id.to_string()
                };
                format!("{}: {}", origin, self.symbols.print_rule(rule))
            })
            .collect::<Vec<_>>()
            .join("\n\t");
        let checks = self
            .block_checks
            .iter()
            .map(|c| format!("block {}: {}", c.block_id, c.printed))
            .chain(self.authorizer_checks.iter().map(|c| format!("authorizer: {}", c.printed)))
            .collect::<Vec<_>>()
            .join("\n\t");

        format!(
            "World {{\n  facts: [\n\t{}\n  ]\n  rules: [\n\t{}\n  ]\n  checks: [\n\t{}\n  ]\n}}",
            facts, rules, checks
        )
    }
}

/// a policy (or check) decision, serialized form produced by a builder so
/// that authorization logic can be shipped independently of the token
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthorizerPolicies {
    pub version: u32,
    pub facts: Vec<crate::token::builder::Fact>,
    pub rules: Vec<crate::token::builder::Rule>,
    pub checks: Vec<crate::token::builder::Check>,
    pub policies: Vec<crate::token::builder::Policy>,
}
