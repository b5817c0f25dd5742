/*
 * Copyright (c) 2019 Geoffroy Couprie <contact@geoffroycouprie.com> and Contributors to the Eclipse Foundation.
 * SPDX-License-Identifier: Apache-2.0
 */
//! internal representation of a Biscuit token, as a Datalog program
//!
//! facts, rules and checks are stored with interned strings (ids into a
//! [`SymbolTable`]), and evaluated through a stack-machine [`Expression`]
//! engine instead of tree-walking an AST.
pub mod expression;
pub mod origin;

pub use expression::{Binary, Expression, ExternFunc, Op, Unary};
pub use origin::{Origin, TrustedOrigins};

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::{Duration, Instant};

use crate::error::{self, RunLimit};
use crate::token::builder::CheckKind;
use crate::token::public_keys::PublicKeys;
use crate::token::Scope;

/// index of an interned string in a [`SymbolTable`]
pub type SymbolIndex = u64;

/// a Datalog value, with strings and dates already interned
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Term {
    Variable(u32),
    Integer(i64),
    Str(SymbolIndex),
    Date(u64),
    Bytes(Vec<u8>),
    Bool(bool),
    Set(BTreeSet<Term>),
    Null,
    Array(Vec<Term>),
    Map(BTreeMap<MapKey, Term>),
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MapKey {
    Integer(i64),
    Str(SymbolIndex),
}

/// a predicate, used in both facts and rule bodies
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Predicate {
    pub name: SymbolIndex,
    pub terms: Vec<Term>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Fact {
    pub predicate: Predicate,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Rule {
    pub head: Predicate,
    pub body: Vec<Predicate>,
    pub expressions: Vec<Expression>,
    pub scopes: Vec<Scope>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Check {
    pub queries: Vec<Rule>,
    pub kind: CheckKind,
}

/// the well-known symbols present in every symbol table, so they never need
/// to be transmitted over the wire
fn default_symbols() -> Vec<String> {
    [
        "read", "write", "resource", "operation", "right", "time", "role", "owner", "tenant",
        "namespace", "user", "team", "service", "admin", "email", "group", "member",
        "ip_address", "client", "client_ip", "domain", "path", "version", "cluster", "node",
        "hostname", "nonce", "query", "revocation_id", "allowed_by", "denied_by", "sequence",
        "authority", "ambient", "allow", "deny", "local", "origin", "real", "current_time",
        "expiration", "ttl", "type", "name", "value", "id", "body", "params", "header",
        "uri", "action", "scope", "key", "public_key", "algorithm", "block", "seal",
        "revoked", "session", "audience", "issuer", "subject", "not_before", "jti",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// string and public key interning table
///
/// the first [`default_symbols`] entries are shared by every implementation
/// and never serialized; everything appended afterwards is specific to the
/// block (or authorizer) that owns this table.
#[derive(Clone, Debug, Default)]
pub struct SymbolTable {
    pub symbols: Vec<String>,
    pub public_keys: PublicKeys,
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable {
            symbols: default_symbols(),
            public_keys: PublicKeys::new(),
        }
    }

    pub fn from(symbols: Vec<String>) -> Result<Self, error::Format> {
        let mut table = SymbolTable::new();
        for s in symbols {
            table.insert(&s);
        }
        Ok(table)
    }

    pub fn from_symbols_and_public_keys(
        symbols: Vec<String>,
        public_keys: Vec<crate::crypto::PublicKey>,
    ) -> Result<Self, error::Format> {
        let mut table = Self::from(symbols)?;
        let mut keys = PublicKeys::new();
        for key in public_keys {
            keys.insert_fallible(&key)?;
        }
        table.public_keys = keys;
        Ok(table)
    }

    /// interns a string, returning its (possibly freshly created) index
    pub fn insert(&mut self, s: &str) -> SymbolIndex {
        if let Some(index) = self.symbols.iter().position(|x| x == s) {
            index as SymbolIndex
        } else {
            self.symbols.push(s.to_string());
            (self.symbols.len() - 1) as SymbolIndex
        }
    }

    pub fn get(&self, s: &str) -> Option<SymbolIndex> {
        self.symbols.iter().position(|x| x == s).map(|i| i as SymbolIndex)
    }

    pub fn get_symbol(&self, index: SymbolIndex) -> Option<&str> {
        self.symbols.get(index as usize).map(|s| s.as_str())
    }

    /// the symbols held by this table alone, to be written out in a `Block`
    pub fn strings(&self) -> Vec<String> {
        self.symbols.clone()
    }

    /// prints a symbol, falling back to a placeholder instead of panicking
    /// when the index is out of range
    pub fn print_symbol_default(&self, index: SymbolIndex) -> String {
        match self.get_symbol(index) {
            Some(s) => s.to_string(),
            None => format!("<{}?>", index),
        }
    }

    /// true if none of `other`'s strings are already present in this table
    pub fn is_disjoint(&self, other: &SymbolTable) -> bool {
        other.symbols.iter().all(|s| !self.symbols.contains(s))
    }

    /// merges another table's strings and public keys into this one
    pub fn extend(&mut self, other: &SymbolTable) -> Result<(), error::Token> {
        for s in other.symbols.iter() {
            self.insert(s);
        }
        Ok(())
    }

    pub fn print_fact(&self, fact: &Fact) -> String {
        self.print_predicate(&fact.predicate)
    }

    pub fn print_predicate(&self, predicate: &Predicate) -> String {
        let name = self.get_symbol(predicate.name).unwrap_or("<?>");
        let terms = predicate
            .terms
            .iter()
            .map(|t| self.print_term(t))
            .collect::<Vec<_>>()
            .join(", ");
        format!("{}({})", name, terms)
    }

    pub fn print_term(&self, term: &Term) -> String {
        match term {
            Term::Variable(i) => format!("${}", i),
            Term::Integer(i) => i.to_string(),
            Term::Str(i) => format!("\"{}\"", self.get_symbol(*i).unwrap_or("<?>")),
            Term::Date(d) => format!("{}", crate::time::format_date(*d)),
            Term::Bytes(b) => format!("hex:{}", hex::encode(b)),
            Term::Bool(b) => b.to_string(),
            Term::Null => "null".to_string(),
            Term::Set(s) => format!(
                "[{}]",
                s.iter().map(|t| self.print_term(t)).collect::<Vec<_>>().join(", ")
            ),
            Term::Array(a) => format!(
                "[{}]",
                a.iter().map(|t| self.print_term(t)).collect::<Vec<_>>().join(", ")
            ),
            Term::Map(m) => format!(
                "{{{}}}",
                m.iter()
                    .map(|(k, v)| format!("{}: {}", self.print_map_key(k), self.print_term(v)))
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        }
    }

    fn print_map_key(&self, key: &MapKey) -> String {
        match key {
            MapKey::Integer(i) => i.to_string(),
            MapKey::Str(i) => format!("\"{}\"", self.get_symbol(*i).unwrap_or("<?>")),
        }
    }

    pub fn print_rule_body(&self, rule: &Rule) -> String {
        let preds = rule
            .body
            .iter()
            .map(|p| self.print_predicate(p))
            .collect::<Vec<_>>();
        let expressions = rule
            .expressions
            .iter()
            .filter_map(|e| e.print(self))
            .collect::<Vec<_>>();
        preds.into_iter().chain(expressions).collect::<Vec<_>>().join(", ")
    }

    pub fn print_rule(&self, rule: &Rule) -> String {
        format!(
            "{} <- {}",
            self.print_predicate(&rule.head),
            self.print_rule_body(rule)
        )
    }

    pub fn print_check(&self, check: &Check) -> String {
        let kind = match check.kind {
            CheckKind::One => "check if",
            CheckKind::All => "check all",
            CheckKind::Reject => "reject if",
        };
        let queries = check
            .queries
            .iter()
            .map(|q| self.print_rule_body(q))
            .collect::<Vec<_>>()
            .join(" or ");
        format!("{} {}", kind, queries)
    }
}

/// a binding of rule variables to concrete values
pub type Bindings = HashMap<u32, Term>;

fn substitute_term(term: &Term, bindings: &Bindings) -> Term {
    match term {
        Term::Variable(i) => bindings.get(i).cloned().unwrap_or_else(|| term.clone()),
        Term::Set(s) => Term::Set(s.iter().map(|t| substitute_term(t, bindings)).collect()),
        Term::Array(a) => Term::Array(a.iter().map(|t| substitute_term(t, bindings)).collect()),
        Term::Map(m) => Term::Map(
            m.iter()
                .map(|(k, v)| (k.clone(), substitute_term(v, bindings)))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn match_terms(pattern: &Term, value: &Term, bindings: &mut Bindings) -> bool {
    match pattern {
        Term::Variable(i) => match bindings.get(i) {
            Some(bound) => bound == value,
            None => {
                bindings.insert(*i, value.clone());
                true
            }
        },
        other => other == value,
    }
}

fn match_predicate(pattern: &Predicate, fact: &Predicate, bindings: &Bindings) -> Option<Bindings> {
    if pattern.name != fact.name || pattern.terms.len() != fact.terms.len() {
        return None;
    }

    let mut new_bindings = bindings.clone();
    for (p, f) in pattern.terms.iter().zip(fact.terms.iter()) {
        if !match_terms(p, f, &mut new_bindings) {
            return None;
        }
    }

    Some(new_bindings)
}

/// bounds for a Datalog evaluation run, preventing runaway computations
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunLimits {
    pub max_facts: u64,
    pub max_iterations: u64,
    pub max_time: Duration,
}

impl Default for RunLimits {
    fn default() -> Self {
        RunLimits {
            max_facts: 1000,
            max_iterations: 100,
            max_time: Duration::from_millis(5),
        }
    }
}

/// the Datalog fact and rule database for a token or an authorizer
///
/// facts are paired with the [`Origin`] of the blocks that contributed them,
/// so that scoped rules can select which facts they are allowed to see.
#[derive(Clone, Debug, Default)]
pub struct World {
    pub facts: Vec<(Origin, Fact)>,
    pub rules: Vec<(usize, Rule)>,
}

impl World {
    pub fn new() -> Self {
        World {
            facts: Vec::new(),
            rules: Vec::new(),
        }
    }

    pub fn insert_fact(&mut self, origin: Origin, fact: Fact) {
        if !self.facts.iter().any(|(o, f)| o == &origin && f == &fact) {
            self.facts.push((origin, fact));
        }
    }

    pub fn insert_rule(&mut self, block_id: usize, rule: Rule) {
        self.rules.push((block_id, rule));
    }

    fn facts_visible_from(&self, trusted: &TrustedOrigins) -> impl Iterator<Item = &Fact> {
        self.facts
            .iter()
            .filter(move |(origin, _)| trusted.contains(origin))
            .map(|(_, fact)| fact)
    }

    /// applies a rule once against the current fact set, returning newly derived facts
    fn apply_rule(
        &self,
        rule: &Rule,
        trusted: &TrustedOrigins,
        extern_funcs: &HashMap<String, ExternFunc>,
        symbols: &mut TemporarySymbolTable,
    ) -> Result<Vec<Predicate>, error::Token> {
        let mut bindings_list = vec![Bindings::new()];

        for pattern in rule.body.iter() {
            let mut next = Vec::new();
            for bindings in bindings_list.iter() {
                for fact in self.facts_visible_from(trusted) {
                    if let Some(new_bindings) = match_predicate(pattern, &fact.predicate, bindings)
                    {
                        next.push(new_bindings);
                    }
                }
            }
            bindings_list = next;
            if bindings_list.is_empty() {
                return Ok(Vec::new());
            }
        }

        let mut generated = Vec::new();
        'bindings: for bindings in bindings_list {
            for expression in rule.expressions.iter() {
                match expression.evaluate(&bindings, symbols, extern_funcs) {
                    Ok(Term::Bool(true)) => {}
                    Ok(Term::Bool(false)) | Err(_) => continue 'bindings,
                    Ok(_) => continue 'bindings,
                }
            }

            let head = Predicate {
                name: rule.head.name,
                terms: rule
                    .head
                    .terms
                    .iter()
                    .map(|t| substitute_term(t, &bindings))
                    .collect(),
            };
            generated.push(head);
        }

        Ok(generated)
    }

    /// evaluates a single query rule, returning every matching set of bindings
    pub fn query_match(
        &self,
        rule: &Rule,
        trusted: &TrustedOrigins,
        extern_funcs: &HashMap<String, ExternFunc>,
        symbols: &mut TemporarySymbolTable,
    ) -> Result<Vec<Fact>, error::Token> {
        let generated = self.apply_rule(rule, trusted, extern_funcs, symbols)?;
        Ok(generated
            .into_iter()
            .map(|predicate| Fact { predicate })
            .collect())
    }

    /// true if the rule matches at least once, short-circuiting as soon as found
    pub fn test_rule(
        &self,
        rule: &Rule,
        trusted: &TrustedOrigins,
        extern_funcs: &HashMap<String, ExternFunc>,
        symbols: &mut TemporarySymbolTable,
    ) -> Result<bool, error::Token> {
        Ok(!self.apply_rule(rule, trusted, extern_funcs, symbols)?.is_empty())
    }

    /// true if the rule matches for every possible binding that satisfies its body
    /// predicates alone (used by `check all`)
    pub fn test_rule_all(
        &self,
        rule: &Rule,
        trusted: &TrustedOrigins,
        extern_funcs: &HashMap<String, ExternFunc>,
        symbols: &mut TemporarySymbolTable,
    ) -> Result<bool, error::Token> {
        let mut bindings_list = vec![Bindings::new()];

        for pattern in rule.body.iter() {
            let mut next = Vec::new();
            for bindings in bindings_list.iter() {
                for fact in self.facts_visible_from(trusted) {
                    if let Some(new_bindings) = match_predicate(pattern, &fact.predicate, bindings)
                    {
                        next.push(new_bindings);
                    }
                }
            }
            bindings_list = next;
        }

        if bindings_list.is_empty() {
            return Ok(true);
        }

        for bindings in bindings_list {
            let mut ok = true;
            for expression in rule.expressions.iter() {
                match expression.evaluate(&bindings, symbols, extern_funcs) {
                    Ok(Term::Bool(true)) => {}
                    Ok(Term::Bool(false)) => {
                        ok = false;
                        break;
                    }
                    Ok(_) => return Err(error::Token::from(error::Expression::InvalidType)),
                    Err(_) => {
                        ok = false;
                        break;
                    }
                }
            }
            if !ok {
                return Ok(false);
            }
        }

        Ok(true)
    }

    /// runs the naive bottom-up fixed-point saturation described by the
    /// Datalog evaluator: repeatedly apply every rule until no new facts are
    /// produced, or a [`RunLimits`] bound is reached.
    pub fn run(
        &mut self,
        origin_for_block: impl Fn(usize) -> (TrustedOrigins, Origin),
        extern_funcs: &HashMap<String, ExternFunc>,
        symbols: &mut TemporarySymbolTable,
        limits: &RunLimits,
    ) -> Result<(), error::Token> {
        let start = Instant::now();
        let mut iterations: u64 = 0;

        loop {
            if start.elapsed() > limits.max_time {
                return Err(error::Token::RunLimit(RunLimit::Timeout));
            }
            if iterations > limits.max_iterations {
                return Err(error::Token::RunLimit(RunLimit::TooManyIterations));
            }
            iterations += 1;

            let mut new_facts = Vec::new();
            for (block_id, rule) in self.rules.iter() {
                let (trusted, origin) = origin_for_block(*block_id);
                let generated = self.apply_rule(rule, &trusted, extern_funcs, symbols)?;
                for predicate in generated {
                    let fact = Fact { predicate };
                    if !self.facts.iter().any(|(o, f)| o == &origin && f == &fact) {
                        new_facts.push((origin.clone(), fact));
                    }
                }
            }

            if new_facts.is_empty() {
                return Ok(());
            }

            for (origin, fact) in new_facts {
                if self.facts.len() as u64 >= limits.max_facts {
                    return Err(error::Token::RunLimit(RunLimit::TooManyFacts));
                }
                self.insert_fact(origin, fact);
            }
        }
    }
}

/// a symbol table augmented with a scratch area for values produced while
/// evaluating expressions (e.g. string concatenation results) that do not
/// belong in any block's persisted symbol table
#[derive(Clone, Debug)]
pub struct TemporarySymbolTable {
    base: SymbolTable,
    temp: Vec<String>,
}

impl TemporarySymbolTable {
    pub fn new(base: &SymbolTable) -> Self {
        TemporarySymbolTable {
            base: base.clone(),
            temp: Vec::new(),
        }
    }

    pub fn insert(&mut self, s: &str) -> SymbolIndex {
        if let Some(index) = self.base.get(s) {
            return index;
        }
        if let Some(pos) = self.temp.iter().position(|x| x == s) {
            return (self.base.symbols.len() + pos) as SymbolIndex;
        }
        self.temp.push(s.to_string());
        (self.base.symbols.len() + self.temp.len() - 1) as SymbolIndex
    }

    pub fn get_symbol(&self, index: SymbolIndex) -> Option<&str> {
        let base_len = self.base.symbols.len();
        if (index as usize) < base_len {
            self.base.get_symbol(index)
        } else {
            self.temp.get(index as usize - base_len).map(|s| s.as_str())
        }
    }
}

/// the minimal block format version required by a set of Datalog elements
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct SchemaVersion(pub u32);

impl SchemaVersion {
    pub fn check_compatibility(&self, version: u32) -> Result<(), error::Format> {
        if version < self.0 {
            Err(error::Format::Version {
                minimum: self.0,
                maximum: crate::token::MAX_SCHEMA_VERSION,
                actual: version,
            })
        } else {
            Ok(())
        }
    }
}

fn term_requires_v3_3(term: &Term) -> bool {
    match term {
        Term::Null | Term::Array(_) | Term::Map(_) => true,
        Term::Set(s) => s.iter().any(term_requires_v3_3),
        _ => false,
    }
}

fn op_requires_v3_3(op: &Op) -> bool {
    match op {
        Op::Value(t) => term_requires_v3_3(t),
        Op::Unary(Unary::Ffi(_)) | Op::Unary(Unary::TypeOf) => true,
        Op::Binary(b) => matches!(
            b,
            Binary::HeterogeneousEqual
                | Binary::HeterogeneousNotEqual
                | Binary::Any
                | Binary::All
                | Binary::Get
                | Binary::Ffi(_)
                | Binary::TryOr
        ),
        Op::Closure(_, _) => true,
        _ => false,
    }
}

fn op_requires_v3_1(op: &Op) -> bool {
    matches!(
        op,
        Op::Binary(Binary::BitwiseAnd) | Op::Binary(Binary::BitwiseOr) | Op::Binary(Binary::BitwiseXor) | Op::Binary(Binary::NotEqual)
    )
}

/// determines the minimum Datalog schema version required to represent the
/// given facts, rules, checks and scopes
pub fn get_schema_version(facts: &[Fact], rules: &[Rule], checks: &[Check], scopes: &[Scope]) -> SchemaVersion {
    let mut version = crate::token::MIN_SCHEMA_VERSION;

    if !scopes.is_empty() {
        version = version.max(crate::token::DATALOG_3_1);
    }

    let rules_iter = rules
        .iter()
        .chain(checks.iter().flat_map(|c| c.queries.iter()));

    for rule in rules_iter {
        if !rule.scopes.is_empty() {
            version = version.max(crate::token::DATALOG_3_1);
        }
        for expression in rule.expressions.iter() {
            for op in expression.ops.iter() {
                if op_requires_v3_1(op) {
                    version = version.max(crate::token::DATALOG_3_1);
                }
                if op_requires_v3_3(op) {
                    version = version.max(crate::token::DATALOG_3_3);
                }
            }
        }
        for predicate in rule.body.iter().chain(std::iter::once(&rule.head)) {
            if predicate.terms.iter().any(term_requires_v3_3) {
                version = version.max(crate::token::DATALOG_3_3);
            }
        }
    }

    for check in checks.iter() {
        if check.kind != CheckKind::One {
            version = version.max(crate::token::DATALOG_3_1);
        }
        if check.kind == CheckKind::Reject {
            version = version.max(crate::token::DATALOG_3_3);
        }
    }

    for fact in facts.iter() {
        if fact.predicate.terms.iter().any(term_requires_v3_3) {
            version = version.max(crate::token::DATALOG_3_3);
        }
    }

    SchemaVersion(version)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Expression as ExprError, Logic, Token};

    fn fact(name: u64, terms: Vec<Term>) -> Fact {
        Fact {
            predicate: Predicate { name, terms },
        }
    }

    fn empty_symbols() -> TemporarySymbolTable {
        TemporarySymbolTable::new(&SymbolTable::default())
    }

    fn no_externs() -> HashMap<String, ExternFunc> {
        HashMap::new()
    }

    #[test]
    fn insert_fact_dedups_by_origin_and_value() {
        let mut world = World::new();
        let origin = Origin::default();
        let f = fact(0, vec![Term::Integer(1)]);

        world.insert_fact(origin.clone(), f.clone());
        world.insert_fact(origin.clone(), f.clone());
        assert_eq!(world.facts.len(), 1);

        let mut other_origin = Origin::default();
        other_origin.insert(1);
        world.insert_fact(other_origin, f);
        assert_eq!(world.facts.len(), 2);
    }

    #[test]
    fn run_saturates_to_a_fixed_point() {
        let mut world = World::new();
        let mut origin = Origin::default();
        origin.insert(0);
        world.insert_fact(origin, fact(10, vec![Term::Integer(1)]));

        let rule = Rule {
            head: Predicate {
                name: 11,
                terms: vec![Term::Variable(0)],
            },
            body: vec![Predicate {
                name: 10,
                terms: vec![Term::Variable(0)],
            }],
            expressions: Vec::new(),
            scopes: Vec::new(),
        };
        world.insert_rule(0, rule);

        let mut symbols = empty_symbols();
        let limits = RunLimits::default();
        world
            .run(
                |_block_id| {
                    let mut origin = Origin::default();
                    origin.insert(0);
                    (TrustedOrigins::default(), origin)
                },
                &no_externs(),
                &mut symbols,
                &limits,
            )
            .unwrap();

        assert!(world
            .facts
            .iter()
            .any(|(_, f)| f == &fact(11, vec![Term::Integer(1)])));
    }

    #[test]
    fn test_rule_finds_a_match() {
        let mut world = World::new();
        let mut origin = Origin::default();
        origin.insert(0);
        world.insert_fact(origin, fact(10, vec![Term::Integer(1)]));

        let rule = Rule {
            head: Predicate {
                name: 11,
                terms: vec![],
            },
            body: vec![Predicate {
                name: 10,
                terms: vec![Term::Variable(0)],
            }],
            expressions: Vec::new(),
            scopes: Vec::new(),
        };

        let mut symbols = empty_symbols();
        let found = world
            .test_rule(&rule, &TrustedOrigins::default(), &no_externs(), &mut symbols)
            .unwrap();
        assert!(found);
    }

    #[test]
    fn test_rule_skips_non_bool_expression_results() {
        let world = World::new();
        let rule = Rule {
            head: Predicate {
                name: 11,
                terms: vec![],
            },
            body: vec![],
            expressions: vec![Expression {
                ops: vec![Op::Value(Term::Integer(42))],
            }],
            scopes: Vec::new(),
        };

        let mut symbols = empty_symbols();
        let found = world
            .test_rule(&rule, &TrustedOrigins::default(), &no_externs(), &mut symbols)
            .unwrap();
        assert!(!found);
    }

    #[test]
    fn test_rule_all_raises_invalid_type_on_non_bool_expression() {
        let world = World::new();
        let rule = Rule {
            head: Predicate {
                name: 11,
                terms: vec![],
            },
            body: vec![],
            expressions: vec![Expression {
                ops: vec![Op::Value(Term::Integer(42))],
            }],
            scopes: Vec::new(),
        };

        let mut symbols = empty_symbols();
        let result = world.test_rule_all(&rule, &TrustedOrigins::default(), &no_externs(), &mut symbols);

        match result {
            Err(Token::FailedLogic(Logic::Evaluation(ExprError::InvalidType))) => {}
            other => panic!("expected InvalidType evaluation error, got {:?}", other),
        }
    }

    #[test]
    fn test_rule_all_passes_when_every_binding_matches() {
        let mut world = World::new();
        let mut origin = Origin::default();
        origin.insert(0);
        world.insert_fact(origin.clone(), fact(10, vec![Term::Integer(1)]));
        world.insert_fact(origin, fact(10, vec![Term::Integer(2)]));

        let rule = Rule {
            head: Predicate {
                name: 11,
                terms: vec![],
            },
            body: vec![Predicate {
                name: 10,
                terms: vec![Term::Variable(0)],
            }],
            expressions: vec![Expression {
                ops: vec![Op::Value(Term::Bool(true))],
            }],
            scopes: Vec::new(),
        };

        let mut symbols = empty_symbols();
        let passed = world
            .test_rule_all(&rule, &TrustedOrigins::default(), &no_externs(), &mut symbols)
            .unwrap();
        assert!(passed);
    }

    #[test]
    fn test_rule_all_fails_when_one_binding_does_not_match() {
        let mut world = World::new();
        let mut origin = Origin::default();
        origin.insert(0);
        world.insert_fact(origin.clone(), fact(10, vec![Term::Integer(1)]));
        world.insert_fact(origin, fact(10, vec![Term::Integer(2)]));

        let rule = Rule {
            head: Predicate {
                name: 11,
                terms: vec![],
            },
            body: vec![Predicate {
                name: 10,
                terms: vec![Term::Variable(0)],
            }],
            expressions: vec![Expression {
                ops: vec![
                    Op::Value(Term::Variable(0)),
                    Op::Value(Term::Integer(1)),
                    Op::Binary(Binary::Equal),
                ],
            }],
            scopes: Vec::new(),
        };

        let mut symbols = empty_symbols();
        let passed = world
            .test_rule_all(&rule, &TrustedOrigins::default(), &no_externs(), &mut symbols)
            .unwrap();
        assert!(!passed);
    }
}
