/*
 * Copyright (c) 2019 Geoffroy Couprie <contact@geoffroycouprie.com> and Contributors to the Eclipse Foundation.
 * SPDX-License-Identifier: Apache-2.0
 */
//! convenience helpers layered on top of the block and authorizer builders,
//! covering the common resource/operation/time check patterns so callers
//! don't have to write out the underlying Datalog by hand

use std::time::SystemTime;

use super::builder::{
    check, constrained_rule, date, fact, pred, string, var, Binary, Check, CheckKind, Expression, Op, Policy,
    PolicyKind, Rule, Term,
};
use super::builder::{AuthorizerBuilder, BiscuitBuilder, BlockBuilder};
use crate::error;

/// common resource/operation checks shared by the block-level builders
pub trait BuilderExt: Sized {
    fn add_check<C>(self, check: C) -> Result<Self, error::Token>
    where
        C: TryInto<Check>,
        error::Token: From<<C as TryInto<Check>>::Error>;

    /// restricts access to a resource with an exact match
    fn check_resource(self, resource: &str) -> Result<Self, error::Token> {
        self.add_check(check(&[pred("resource", &[string(resource)])], CheckKind::One))
    }

    /// restricts access to resources under a given prefix
    fn check_resource_prefix(self, prefix: &str) -> Self {
        let rule = constrained_rule(
            "prefix_check",
            &[] as &[Term],
            &[pred("resource", &[var("resource")])],
            &[Expression {
                ops: vec![
                    Op::Value(Term::Variable("resource".to_string())),
                    Op::Value(Term::Str(prefix.to_string())),
                    Op::Binary(Binary::Prefix),
                ],
            }],
        );
        self.add_check(Check {
            queries: vec![rule],
            kind: CheckKind::One,
        })
        .expect("a check built from in-memory terms cannot fail to convert")
    }

    /// restricts access to resources for which a matching `right` fact grants
    /// the given operation
    fn check_right(self, right: &str) -> Result<Self, error::Token> {
        let rule = Rule::new(
            pred("check_right", &[] as &[Term]),
            vec![
                pred("resource", &[var("resource_name")]),
                pred("operation", &[string(right)]),
                pred("right", &[var("resource_name"), string(right)]),
            ],
            vec![],
            vec![],
        );
        self.add_check(Check {
            queries: vec![rule],
            kind: CheckKind::One,
        })
    }

    /// restricts access to a single operation, regardless of resource
    fn check_operation(self, operation: &str) -> Self {
        self.add_check(check(&[pred("operation", &[string(operation)])], CheckKind::One))
            .expect("a check built from in-memory terms cannot fail to convert")
    }

    /// restricts the token to be used before the given expiration date
    fn check_expiration_date(self, date: SystemTime) -> Self {
        let rule = constrained_rule(
            "expiration",
            &[] as &[Term],
            &[pred("time", &[var("time")])],
            &[Expression {
                ops: vec![
                    Op::Value(Term::Variable("time".to_string())),
                    Op::Value(self::date(&date)),
                    Op::Binary(Binary::LessOrEqual),
                ],
            }],
        );
        self.add_check(Check {
            queries: vec![rule],
            kind: CheckKind::One,
        })
        .expect("a check built from in-memory terms cannot fail to convert")
    }

    /// adds a `resource($resource), operation($operation), right($resource, $operation)`
    /// fact pair, covering the common "grant this right" pattern
    fn right(self, resource: &str, operation: &str) -> Self;
}

impl BuilderExt for BlockBuilder {
    fn add_check<C>(self, check: C) -> Result<Self, error::Token>
    where
        C: TryInto<Check>,
        error::Token: From<<C as TryInto<Check>>::Error>,
    {
        self.check(check)
    }

    fn right(self, resource: &str, operation: &str) -> Self {
        self.fact(fact("right", &[string(resource), string(operation)]))
            .expect("a fact built from in-memory terms cannot fail to convert")
    }
}

impl BuilderExt for BiscuitBuilder {
    fn add_check<C>(self, check: C) -> Result<Self, error::Token>
    where
        C: TryInto<Check>,
        error::Token: From<<C as TryInto<Check>>::Error>,
    {
        self.check(check)
    }

    fn right(self, resource: &str, operation: &str) -> Self {
        self.fact(fact("right", &[string(resource), string(operation)]))
            .expect("a fact built from in-memory terms cannot fail to convert")
    }
}

/// time and catch-all policy helpers for the authorizer builder
pub trait AuthorizerExt: Sized {
    /// adds the current time as a `time()` fact
    fn time(self) -> Self;
    /// adds an `allow if true` catch-all policy
    fn allow_all(self) -> Self;
    /// adds a `deny if true` catch-all policy
    fn deny_all(self) -> Self;
}

impl AuthorizerExt for AuthorizerBuilder {
    fn time(self) -> Self {
        let now = SystemTime::now();
        self.fact(fact("time", &[date(&now)])).unwrap_or(self)
    }

    fn allow_all(self) -> Self {
        let mut s = self;
        s = s
            .policy(Policy {
                queries: vec![Rule::new(pred("allow", &[] as &[Term]), vec![], vec![], vec![])],
                kind: PolicyKind::Allow,
            })
            .expect("a policy built from in-memory terms cannot fail to convert");
        s
    }

    fn deny_all(self) -> Self {
        let mut s = self;
        s = s
            .policy(Policy {
                queries: vec![Rule::new(pred("deny", &[] as &[Term]), vec![], vec![], vec![])],
                kind: PolicyKind::Deny,
            })
            .expect("a policy built from in-memory terms cannot fail to convert");
        s
    }
}
