/*
 * Copyright (c) 2019 Geoffroy Couprie <contact@geoffroycouprie.com> and Contributors to the Eclipse Foundation.
 * SPDX-License-Identifier: Apache-2.0
 */
//! helper types and functions to create tokens and blocks
//!
//! values here use human readable names (strings for variables and
//! predicates) instead of the interned representation used internally by
//! the Datalog engine. [`Convert`] and [`ConvertFrom`] bridge the two
//! representations through a [`SymbolTable`](crate::datalog::SymbolTable).
use std::{
    collections::{BTreeMap, BTreeSet, HashMap, HashSet},
    fmt,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use biscuit_token_parser::builder as parser_builder;
use biscuit_token_parser::parser;
use rand::{CryptoRng, RngCore};

use crate::crypto::KeyPair;
use crate::datalog::{self, SymbolTable, TemporarySymbolTable};
use crate::error;
use crate::token::{authorizer::AuthorizerLimits, block::Block, Biscuit, Scope as TokenScope};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Term {
    Variable(String),
    Integer(i64),
    Str(String),
    Date(u64),
    Bytes(Vec<u8>),
    Bool(bool),
    Set(BTreeSet<Term>),
    Parameter(String),
    Null,
    Array(Vec<Term>),
    Map(BTreeMap<MapKey, Term>),
}

impl AsRef<Term> for Term {
    fn as_ref(&self) -> &Term {
        self
    }
}

impl Term {
    /// converts a runtime Datalog term back into its human readable form,
    /// interning the strings it carries as it goes
    pub fn from_datalog(term: datalog::Term, symbols: &mut TemporarySymbolTable) -> Result<Term, error::Expression> {
        Ok(match term {
            datalog::Term::Variable(_) => return Err(error::Expression::InvalidType),
            datalog::Term::Integer(i) => Term::Integer(i),
            datalog::Term::Str(i) => Term::Str(
                symbols
                    .get_symbol(i)
                    .ok_or(error::Expression::UnknownSymbol(i))?
                    .to_string(),
            ),
            datalog::Term::Date(d) => Term::Date(d),
            datalog::Term::Bytes(b) => Term::Bytes(b),
            datalog::Term::Bool(b) => Term::Bool(b),
            datalog::Term::Null => Term::Null,
            datalog::Term::Set(s) => {
                let mut set = BTreeSet::new();
                for t in s {
                    set.insert(Term::from_datalog(t, symbols)?);
                }
                Term::Set(set)
            }
            datalog::Term::Array(a) => {
                let mut array = Vec::new();
                for t in a {
                    array.push(Term::from_datalog(t, symbols)?);
                }
                Term::Array(array)
            }
            datalog::Term::Map(m) => {
                let mut map = BTreeMap::new();
                for (k, v) in m {
                    let key = match k {
                        datalog::MapKey::Integer(i) => MapKey::Integer(i),
                        datalog::MapKey::Str(i) => MapKey::Str(
                            symbols
                                .get_symbol(i)
                                .ok_or(error::Expression::UnknownSymbol(i))?
                                .to_string(),
                        ),
                    };
                    map.insert(key, Term::from_datalog(v, symbols)?);
                }
                Term::Map(map)
            }
        })
    }

    /// interns this term's strings and produces the runtime Datalog term
    pub fn to_datalog(&self, symbols: &mut TemporarySymbolTable) -> datalog::Term {
        match self {
            Term::Variable(name) => datalog::Term::Variable(symbols.insert(name) as u32),
            Term::Integer(i) => datalog::Term::Integer(*i),
            Term::Str(s) => datalog::Term::Str(symbols.insert(s)),
            Term::Date(d) => datalog::Term::Date(*d),
            Term::Bytes(b) => datalog::Term::Bytes(b.clone()),
            Term::Bool(b) => datalog::Term::Bool(*b),
            Term::Null => datalog::Term::Null,
            Term::Parameter(_) => datalog::Term::Null,
            Term::Set(s) => datalog::Term::Set(s.iter().map(|t| t.to_datalog(symbols)).collect()),
            Term::Array(a) => datalog::Term::Array(a.iter().map(|t| t.to_datalog(symbols)).collect()),
            Term::Map(m) => datalog::Term::Map(
                m.iter()
                    .map(|(k, v)| {
                        let key = match k {
                            MapKey::Integer(i) => datalog::MapKey::Integer(*i),
                            MapKey::Str(s) => datalog::MapKey::Str(symbols.insert(s)),
                            MapKey::Parameter(_) => datalog::MapKey::Integer(0),
                        };
                        (key, v.to_datalog(symbols))
                    })
                    .collect(),
            ),
        }
    }

    fn extract_parameters(&self, parameters: &mut HashMap<String, Option<Term>>) {
        match self {
            Term::Parameter(name) => {
                parameters.insert(name.to_string(), None);
            }
            Term::Set(s) => {
                for term in s {
                    term.extract_parameters(parameters);
                }
            }
            Term::Array(a) => {
                for term in a {
                    term.extract_parameters(parameters);
                }
            }
            Term::Map(m) => {
                for (_, term) in m {
                    term.extract_parameters(parameters);
                }
            }
            _ => {}
        }
    }
}

impl From<parser_builder::Term> for Term {
    fn from(t: parser_builder::Term) -> Self {
        match t {
            parser_builder::Term::Variable(v) => Term::Variable(v),
            parser_builder::Term::Integer(i) => Term::Integer(i),
            parser_builder::Term::Str(s) => Term::Str(s),
            parser_builder::Term::Date(d) => Term::Date(d),
            parser_builder::Term::Bytes(b) => Term::Bytes(b),
            parser_builder::Term::Bool(b) => Term::Bool(b),
            parser_builder::Term::Set(s) => Term::Set(s.into_iter().map(Term::from).collect()),
            parser_builder::Term::Parameter(p) => Term::Parameter(p),
            parser_builder::Term::Null => Term::Null,
            parser_builder::Term::Array(a) => Term::Array(a.into_iter().map(Term::from).collect()),
            parser_builder::Term::Map(m) => {
                Term::Map(m.into_iter().map(|(k, v)| (MapKey::from(k), Term::from(v))).collect())
            }
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Variable(s) => write!(f, "${s}"),
            Term::Integer(i) => write!(f, "{i}"),
            Term::Str(s) => write!(f, "\"{s}\""),
            Term::Date(d) => write!(f, "{}", crate::time::format_date(*d)),
            Term::Bytes(b) => write!(f, "hex:{}", hex::encode(b)),
            Term::Bool(b) => write!(f, "{b}"),
            Term::Null => write!(f, "null"),
            Term::Parameter(s) => write!(f, "{{{s}}}"),
            Term::Set(s) => {
                write!(f, "[")?;
                for (i, t) in s.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{t}")?;
                }
                write!(f, "]")
            }
            Term::Array(a) => {
                write!(f, "[")?;
                for (i, t) in a.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{t}")?;
                }
                write!(f, "]")
            }
            Term::Map(m) => {
                write!(f, "{{")?;
                for (i, (k, v)) in m.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    match k {
                        MapKey::Integer(k) => write!(f, "{k}: {v}")?,
                        MapKey::Str(k) => write!(f, "\"{k}\": {v}")?,
                        MapKey::Parameter(k) => write!(f, "{{{k}}}: {v}")?,
                    }
                }
                write!(f, "}}")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MapKey {
    Parameter(String),
    Integer(i64),
    Str(String),
}

impl From<parser_builder::MapKey> for MapKey {
    fn from(k: parser_builder::MapKey) -> Self {
        match k {
            parser_builder::MapKey::Parameter(p) => MapKey::Parameter(p),
            parser_builder::MapKey::Integer(i) => MapKey::Integer(i),
            parser_builder::MapKey::Str(s) => MapKey::Str(s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Hash, Eq)]
pub struct Predicate {
    pub name: String,
    pub terms: Vec<Term>,
}

impl Predicate {
    pub fn new<T: Into<Vec<Term>>>(name: String, terms: T) -> Predicate {
        Predicate {
            name,
            terms: terms.into(),
        }
    }
}

impl AsRef<Predicate> for Predicate {
    fn as_ref(&self) -> &Predicate {
        self
    }
}

impl From<parser_builder::Predicate> for Predicate {
    fn from(p: parser_builder::Predicate) -> Self {
        Predicate {
            name: p.name,
            terms: p.terms.into_iter().map(Term::from).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fact {
    pub predicate: Predicate,
    pub parameters: Option<HashMap<String, Option<Term>>>,
}

impl Fact {
    pub fn new<T: Into<Vec<Term>>>(name: String, terms: T) -> Fact {
        let mut parameters = HashMap::new();
        let terms: Vec<Term> = terms.into();
        for term in &terms {
            term.extract_parameters(&mut parameters);
        }
        Fact {
            predicate: Predicate::new(name, terms),
            parameters: Some(parameters),
        }
    }
}

impl From<parser_builder::Fact> for Fact {
    fn from(f: parser_builder::Fact) -> Self {
        Fact::new(
            f.predicate.name,
            f.predicate.terms.into_iter().map(Term::from).collect::<Vec<_>>(),
        )
    }
}

impl std::convert::TryFrom<&str> for Fact {
    type Error = error::Token;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        Ok(Fact::from(parser::parse_fact(s)?))
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        for (i, term) in self.terms.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{term}")?;
        }
        write!(f, ")")
    }
}

impl fmt::Display for Fact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.predicate)
    }
}

impl std::convert::TryFrom<Term> for i64 {
    type Error = error::Token;

    fn try_from(t: Term) -> Result<Self, Self::Error> {
        match t {
            Term::Integer(i) => Ok(i),
            _ => Err(error::Token::ConversionError(format!("expected an integer, got {t}"))),
        }
    }
}

impl std::convert::TryFrom<Term> for bool {
    type Error = error::Token;

    fn try_from(t: Term) -> Result<Self, Self::Error> {
        match t {
            Term::Bool(b) => Ok(b),
            _ => Err(error::Token::ConversionError(format!("expected a bool, got {t}"))),
        }
    }
}

impl std::convert::TryFrom<Term> for String {
    type Error = error::Token;

    fn try_from(t: Term) -> Result<Self, Self::Error> {
        match t {
            Term::Str(s) => Ok(s),
            _ => Err(error::Token::ConversionError(format!("expected a string, got {t}"))),
        }
    }
}

impl std::convert::TryFrom<Term> for Vec<u8> {
    type Error = error::Token;

    fn try_from(t: Term) -> Result<Self, Self::Error> {
        match t {
            Term::Bytes(b) => Ok(b),
            _ => Err(error::Token::ConversionError(format!("expected bytes, got {t}"))),
        }
    }
}

/// extracts a fact's terms into a tuple, erroring if the arity or the
/// individual term types don't match
impl<A> std::convert::TryFrom<Fact> for (A,)
where
    A: std::convert::TryFrom<Term, Error = error::Token>,
{
    type Error = error::Token;

    fn try_from(fact: Fact) -> Result<Self, Self::Error> {
        let mut terms = fact.predicate.terms.into_iter();
        let a = terms
            .next()
            .ok_or_else(|| error::Token::ConversionError("expected a fact with 1 term".to_string()))?;
        if terms.next().is_some() {
            return Err(error::Token::ConversionError("expected a fact with 1 term".to_string()));
        }
        Ok((A::try_from(a)?,))
    }
}

impl<A, B> std::convert::TryFrom<Fact> for (A, B)
where
    A: std::convert::TryFrom<Term, Error = error::Token>,
    B: std::convert::TryFrom<Term, Error = error::Token>,
{
    type Error = error::Token;

    fn try_from(fact: Fact) -> Result<Self, Self::Error> {
        let mut terms = fact.predicate.terms.into_iter();
        let a = terms
            .next()
            .ok_or_else(|| error::Token::ConversionError("expected a fact with 2 terms".to_string()))?;
        let b = terms
            .next()
            .ok_or_else(|| error::Token::ConversionError("expected a fact with 2 terms".to_string()))?;
        if terms.next().is_some() {
            return Err(error::Token::ConversionError("expected a fact with 2 terms".to_string()));
        }
        Ok((A::try_from(a)?, B::try_from(b)?))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expression {
    pub ops: Vec<Op>,
}

impl From<parser_builder::Expression> for Expression {
    fn from(e: parser_builder::Expression) -> Self {
        Expression {
            ops: e.ops.into_iter().map(Op::from).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    Value(Term),
    Unary(Unary),
    Binary(Binary),
    Closure(Vec<String>, Vec<Op>),
}

impl From<parser_builder::Op> for Op {
    fn from(op: parser_builder::Op) -> Self {
        match op {
            parser_builder::Op::Value(t) => Op::Value(Term::from(t)),
            parser_builder::Op::Unary(u) => Op::Unary(Unary::from(u)),
            parser_builder::Op::Binary(b) => Op::Binary(Binary::from(b)),
            parser_builder::Op::Closure(params, ops) => {
                Op::Closure(params, ops.into_iter().map(Op::from).collect())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unary {
    Negate,
    Parens,
    Length,
    TypeOf,
    Ffi(String),
}

impl From<parser_builder::Unary> for Unary {
    fn from(u: parser_builder::Unary) -> Self {
        match u {
            parser_builder::Unary::Negate => Unary::Negate,
            parser_builder::Unary::Parens => Unary::Parens,
            parser_builder::Unary::Length => Unary::Length,
            parser_builder::Unary::TypeOf => Unary::TypeOf,
            parser_builder::Unary::Ffi(s) => Unary::Ffi(s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Binary {
    LessThan,
    GreaterThan,
    LessOrEqual,
    GreaterOrEqual,
    Equal,
    Contains,
    Prefix,
    Suffix,
    Regex,
    Add,
    Sub,
    Mul,
    Div,
    And,
    Or,
    Intersection,
    Union,
    BitwiseAnd,
    BitwiseOr,
    BitwiseXor,
    NotEqual,
    HeterogeneousEqual,
    HeterogeneousNotEqual,
    LazyAnd,
    LazyOr,
    All,
    Any,
    Get,
    Ffi(String),
    TryOr,
}

impl From<parser_builder::Binary> for Binary {
    fn from(b: parser_builder::Binary) -> Self {
        use parser_builder::Binary as P;
        match b {
            P::LessThan => Binary::LessThan,
            P::GreaterThan => Binary::GreaterThan,
            P::LessOrEqual => Binary::LessOrEqual,
            P::GreaterOrEqual => Binary::GreaterOrEqual,
            P::Equal => Binary::Equal,
            P::Contains => Binary::Contains,
            P::Prefix => Binary::Prefix,
            P::Suffix => Binary::Suffix,
            P::Regex => Binary::Regex,
            P::Add => Binary::Add,
            P::Sub => Binary::Sub,
            P::Mul => Binary::Mul,
            P::Div => Binary::Div,
            P::And => Binary::And,
            P::Or => Binary::Or,
            P::Intersection => Binary::Intersection,
            P::Union => Binary::Union,
            P::BitwiseAnd => Binary::BitwiseAnd,
            P::BitwiseOr => Binary::BitwiseOr,
            P::BitwiseXor => Binary::BitwiseXor,
            P::NotEqual => Binary::NotEqual,
            P::HeterogeneousEqual => Binary::HeterogeneousEqual,
            P::HeterogeneousNotEqual => Binary::HeterogeneousNotEqual,
            P::LazyAnd => Binary::LazyAnd,
            P::LazyOr => Binary::LazyOr,
            P::All => Binary::All,
            P::Any => Binary::Any,
            P::Get => Binary::Get,
            P::Ffi(s) => Binary::Ffi(s),
            P::TryOr => Binary::TryOr,
        }
    }
}

pub use crate::crypto::PublicKey;

/// signature algorithm used by a key pair or a public key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Algorithm {
    Ed25519,
    Secp256r1,
}

impl From<parser_builder::Algorithm> for Algorithm {
    fn from(a: parser_builder::Algorithm) -> Self {
        match a {
            parser_builder::Algorithm::Ed25519 => Algorithm::Ed25519,
            parser_builder::Algorithm::Secp256r1 => Algorithm::Secp256r1,
        }
    }
}

impl From<crate::format::schema::public_key::Algorithm> for Algorithm {
    fn from(a: crate::format::schema::public_key::Algorithm) -> Self {
        match a {
            crate::format::schema::public_key::Algorithm::Ed25519 => Algorithm::Ed25519,
            crate::format::schema::public_key::Algorithm::Secp256r1 => Algorithm::Secp256r1,
        }
    }
}

/// a scope restricting which blocks a rule's predicates can be matched against
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub enum Scope {
    Authority,
    Previous,
    PublicKey(PublicKey),
    Parameter(String),
}

impl From<parser_builder::Scope> for Scope {
    fn from(_: parser_builder::Scope) -> Self {
        // textual public key scopes are resolved against the symbol table
        // at conversion time; parsing alone cannot produce a concrete key
        Scope::Previous
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub head: Predicate,
    pub body: Vec<Predicate>,
    pub expressions: Vec<Expression>,
    pub parameters: Option<HashMap<String, Option<Term>>>,
    pub scopes: Vec<Scope>,
    pub scope_parameters: Option<HashMap<String, Option<PublicKey>>>,
}

impl Rule {
    pub fn new(head: Predicate, body: Vec<Predicate>, expressions: Vec<Expression>, scopes: Vec<Scope>) -> Rule {
        let mut parameters = HashMap::new();

        for term in &head.terms {
            term.extract_parameters(&mut parameters);
        }
        for predicate in &body {
            for term in &predicate.terms {
                term.extract_parameters(&mut parameters);
            }
        }

        Rule {
            head,
            body,
            expressions,
            parameters: Some(parameters),
            scopes,
            scope_parameters: Some(HashMap::new()),
        }
    }

    /// every variable used in the head or in an expression must appear in at
    /// least one body predicate
    pub fn validate_variables(&self) -> Result<(), String> {
        let mut free_variables: HashSet<String> = HashSet::default();
        for term in self.head.terms.iter() {
            if let Term::Variable(s) = term {
                free_variables.insert(s.to_string());
            }
        }

        for e in self.expressions.iter() {
            for op in e.ops.iter() {
                if let Op::Value(Term::Variable(s)) = op {
                    free_variables.insert(s.to_string());
                }
            }
        }

        for predicate in self.body.iter() {
            for term in predicate.terms.iter() {
                if let Term::Variable(v) = term {
                    free_variables.remove(v);
                    if free_variables.is_empty() {
                        return Ok(());
                    }
                }
            }
        }

        if free_variables.is_empty() {
            Ok(())
        } else {
            Err(format!(
                "the rule contains variables that are not bound by predicates in the rule's body: {}",
                free_variables
                    .iter()
                    .map(|s| format!("${}", s))
                    .collect::<Vec<_>>()
                    .join(", ")
            ))
        }
    }
}

impl From<(parser_builder::Rule, Vec<parser_builder::Scope>)> for Rule {
    fn from((r, scopes): (parser_builder::Rule, Vec<parser_builder::Scope>)) -> Self {
        Rule::new(
            Predicate::from(r.head),
            r.body.into_iter().map(Predicate::from).collect(),
            r.expressions.into_iter().map(Expression::from).collect(),
            scopes.into_iter().map(Scope::from).collect(),
        )
    }
}

impl std::convert::TryFrom<&str> for Rule {
    type Error = error::Token;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        let (rule, scopes) = parser::parse_rule(s)?;
        Ok(Rule::from((rule, scopes)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Check {
    pub queries: Vec<Rule>,
    pub kind: CheckKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckKind {
    One,
    All,
    Reject,
}

impl From<parser_builder::CheckKind> for CheckKind {
    fn from(k: parser_builder::CheckKind) -> Self {
        match k {
            parser_builder::CheckKind::One => CheckKind::One,
            parser_builder::CheckKind::All => CheckKind::All,
            parser_builder::CheckKind::Reject => CheckKind::Reject,
        }
    }
}

impl From<parser_builder::Check> for Check {
    fn from(c: parser_builder::Check) -> Self {
        Check {
            queries: c
                .queries
                .into_iter()
                .map(|q| Rule::from((q, vec![])))
                .collect(),
            kind: CheckKind::from(c.kind),
        }
    }
}

impl std::convert::TryFrom<&str> for Check {
    type Error = error::Token;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        Ok(Check::from(parser::parse_check(s)?))
    }
}

/// a bare rule used as a check is wrapped as a `one` check on that single query
impl std::convert::TryFrom<Rule> for Check {
    type Error = error::Token;

    fn try_from(rule: Rule) -> Result<Self, Self::Error> {
        Ok(Check {
            queries: vec![rule],
            kind: CheckKind::One,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyKind {
    Allow,
    Deny,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Policy {
    pub queries: Vec<Rule>,
    pub kind: PolicyKind,
}

impl From<parser_builder::Policy> for Policy {
    fn from(p: parser_builder::Policy) -> Self {
        Policy {
            queries: p.queries.into_iter().map(|q| Rule::from((q, vec![]))).collect(),
            kind: match p.kind {
                parser_builder::PolicyKind::Allow => PolicyKind::Allow,
                parser_builder::PolicyKind::Deny => PolicyKind::Deny,
            },
        }
    }
}

impl std::convert::TryFrom<&str> for Policy {
    type Error = error::Token;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        Ok(Policy::from(parser::parse_policy(s)?))
    }
}

/// converts a builder-level value into its interned Datalog representation
pub trait Convert<T> {
    fn convert(&self, symbols: &mut SymbolTable) -> T;
}

/// converts an interned Datalog value back into its builder-level representation
pub trait ConvertFrom<T>: Sized {
    fn convert_from(input: &T, symbols: &SymbolTable) -> Result<Self, error::Format>;
}

fn intern(symbols: &mut SymbolTable, term: &Term) -> datalog::Term {
    match term {
        Term::Variable(name) => datalog::Term::Variable(symbols.insert(name) as u32),
        Term::Integer(i) => datalog::Term::Integer(*i),
        Term::Str(s) => datalog::Term::Str(symbols.insert(s)),
        Term::Date(d) => datalog::Term::Date(*d),
        Term::Bytes(b) => datalog::Term::Bytes(b.clone()),
        Term::Bool(b) => datalog::Term::Bool(*b),
        Term::Null => datalog::Term::Null,
        Term::Parameter(_) => datalog::Term::Null,
        Term::Set(s) => datalog::Term::Set(s.iter().map(|t| intern(symbols, t)).collect()),
        Term::Array(a) => datalog::Term::Array(a.iter().map(|t| intern(symbols, t)).collect()),
        Term::Map(m) => datalog::Term::Map(
            m.iter()
                .map(|(k, v)| {
                    let key = match k {
                        MapKey::Integer(i) => datalog::MapKey::Integer(*i),
                        MapKey::Str(s) => datalog::MapKey::Str(symbols.insert(s)),
                        MapKey::Parameter(_) => datalog::MapKey::Integer(0),
                    };
                    (key, intern(symbols, v))
                })
                .collect(),
        ),
    }
}

fn unintern(symbols: &SymbolTable, term: &datalog::Term) -> Result<Term, error::Format> {
    Ok(match term {
        datalog::Term::Variable(i) => Term::Variable(format!("{}", i)),
        datalog::Term::Integer(i) => Term::Integer(*i),
        datalog::Term::Str(i) => Term::Str(
            symbols
                .get_symbol(*i)
                .ok_or(error::Format::ConvertError(format!("unknown symbol {i}")))?
                .to_string(),
        ),
        datalog::Term::Date(d) => Term::Date(*d),
        datalog::Term::Bytes(b) => Term::Bytes(b.clone()),
        datalog::Term::Bool(b) => Term::Bool(*b),
        datalog::Term::Null => Term::Null,
        datalog::Term::Set(s) => {
            let mut set = BTreeSet::new();
            for t in s {
                set.insert(unintern(symbols, t)?);
            }
            Term::Set(set)
        }
        datalog::Term::Array(a) => {
            let mut array = Vec::new();
            for t in a {
                array.push(unintern(symbols, t)?);
            }
            Term::Array(array)
        }
        datalog::Term::Map(m) => {
            let mut map = BTreeMap::new();
            for (k, v) in m {
                let key = match k {
                    datalog::MapKey::Integer(i) => MapKey::Integer(*i),
                    datalog::MapKey::Str(i) => MapKey::Str(
                        symbols
                            .get_symbol(*i)
                            .ok_or(error::Format::ConvertError(format!("unknown symbol {i}")))?
                            .to_string(),
                    ),
                };
                map.insert(key, unintern(symbols, v)?);
            }
            Term::Map(map)
        }
    })
}

impl Convert<datalog::Predicate> for Predicate {
    fn convert(&self, symbols: &mut SymbolTable) -> datalog::Predicate {
        datalog::Predicate {
            name: symbols.insert(&self.name),
            terms: self.terms.iter().map(|t| intern(symbols, t)).collect(),
        }
    }
}

impl ConvertFrom<datalog::Predicate> for Predicate {
    fn convert_from(input: &datalog::Predicate, symbols: &SymbolTable) -> Result<Self, error::Format> {
        let name = symbols
            .get_symbol(input.name)
            .ok_or(error::Format::ConvertError(format!("unknown symbol {}", input.name)))?
            .to_string();
        let mut terms = Vec::new();
        for term in input.terms.iter() {
            terms.push(unintern(symbols, term)?);
        }
        Ok(Predicate { name, terms })
    }
}

impl Convert<datalog::Fact> for Fact {
    fn convert(&self, symbols: &mut SymbolTable) -> datalog::Fact {
        datalog::Fact {
            predicate: self.predicate.convert(symbols),
        }
    }
}

impl ConvertFrom<datalog::Fact> for Fact {
    fn convert_from(input: &datalog::Fact, symbols: &SymbolTable) -> Result<Self, error::Format> {
        let predicate = Predicate::convert_from(&input.predicate, symbols)?;
        Ok(Fact::new(predicate.name, predicate.terms))
    }
}

fn convert_op(op: &Op, symbols: &mut SymbolTable) -> datalog::Op {
    match op {
        Op::Value(t) => datalog::Op::Value(intern(symbols, t)),
        Op::Unary(u) => datalog::Op::Unary(match u {
            Unary::Negate => datalog::Unary::Negate,
            Unary::Parens => datalog::Unary::Parens,
            Unary::Length => datalog::Unary::Length,
            Unary::TypeOf => datalog::Unary::TypeOf,
            Unary::Ffi(name) => datalog::Unary::Ffi(symbols.insert(name)),
        }),
        Op::Binary(b) => datalog::Op::Binary(match b {
            Binary::LessThan => datalog::Binary::LessThan,
            Binary::GreaterThan => datalog::Binary::GreaterThan,
            Binary::LessOrEqual => datalog::Binary::LessOrEqual,
            Binary::GreaterOrEqual => datalog::Binary::GreaterOrEqual,
            Binary::Equal => datalog::Binary::Equal,
            Binary::Contains => datalog::Binary::Contains,
            Binary::Prefix => datalog::Binary::Prefix,
            Binary::Suffix => datalog::Binary::Suffix,
            Binary::Regex => datalog::Binary::Regex,
            Binary::Add => datalog::Binary::Add,
            Binary::Sub => datalog::Binary::Sub,
            Binary::Mul => datalog::Binary::Mul,
            Binary::Div => datalog::Binary::Div,
            Binary::And => datalog::Binary::And,
            Binary::Or => datalog::Binary::Or,
            Binary::Intersection => datalog::Binary::Intersection,
            Binary::Union => datalog::Binary::Union,
            Binary::BitwiseAnd => datalog::Binary::BitwiseAnd,
            Binary::BitwiseOr => datalog::Binary::BitwiseOr,
            Binary::BitwiseXor => datalog::Binary::BitwiseXor,
            Binary::NotEqual => datalog::Binary::NotEqual,
            Binary::HeterogeneousEqual => datalog::Binary::HeterogeneousEqual,
            Binary::HeterogeneousNotEqual => datalog::Binary::HeterogeneousNotEqual,
            Binary::LazyAnd => datalog::Binary::LazyAnd,
            Binary::LazyOr => datalog::Binary::LazyOr,
            Binary::All => datalog::Binary::All,
            Binary::Any => datalog::Binary::Any,
            Binary::Get => datalog::Binary::Get,
            Binary::Ffi(name) => datalog::Binary::Ffi(symbols.insert(name)),
            Binary::TryOr => datalog::Binary::TryOr,
        }),
        Op::Closure(params, ops) => datalog::Op::Closure(
            params.iter().map(|p| symbols.insert(p) as u32).collect(),
            ops.iter().map(|o| convert_op(o, symbols)).collect(),
        ),
    }
}

impl Convert<datalog::Rule> for Rule {
    fn convert(&self, symbols: &mut SymbolTable) -> datalog::Rule {
        datalog::Rule {
            head: self.head.convert(symbols),
            body: self.body.iter().map(|p| p.convert(symbols)).collect(),
            expressions: self
                .expressions
                .iter()
                .map(|e| datalog::Expression {
                    ops: e.ops.iter().map(|o| convert_op(o, symbols)).collect(),
                })
                .collect(),
            scopes: self
                .scopes
                .iter()
                .filter_map(|s| match s {
                    Scope::Authority => Some(TokenScope::Authority),
                    Scope::Previous => Some(TokenScope::Previous),
                    Scope::PublicKey(key) => {
                        let index = symbols.public_keys.insert(key);
                        Some(TokenScope::PublicKey(index as u64))
                    }
                    Scope::Parameter(_) => None,
                })
                .collect(),
        }
    }
}

impl ConvertFrom<datalog::Rule> for Rule {
    fn convert_from(input: &datalog::Rule, symbols: &SymbolTable) -> Result<Self, error::Format> {
        let head = Predicate::convert_from(&input.head, symbols)?;
        let mut body = Vec::new();
        for p in input.body.iter() {
            body.push(Predicate::convert_from(p, symbols)?);
        }
        // expressions are kept internally; printing uses `SymbolTable::print_rule` directly
        Ok(Rule::new(head, body, Vec::new(), Vec::new()))
    }
}

impl Convert<datalog::Check> for Check {
    fn convert(&self, symbols: &mut SymbolTable) -> datalog::Check {
        datalog::Check {
            queries: self.queries.iter().map(|q| q.convert(symbols)).collect(),
            kind: self.kind,
        }
    }
}

impl ConvertFrom<datalog::Check> for Check {
    fn convert_from(input: &datalog::Check, symbols: &SymbolTable) -> Result<Self, error::Format> {
        let mut queries = Vec::new();
        for q in input.queries.iter() {
            queries.push(Rule::convert_from(q, symbols)?);
        }
        Ok(Check { queries, kind: input.kind })
    }
}

/// creates a new fact
pub fn fact<I: AsRef<Term>>(name: &str, terms: &[I]) -> Fact {
    let pred = pred(name, terms);
    Fact::new(pred.name, pred.terms)
}

/// creates a predicate
pub fn pred<I: AsRef<Term>>(name: &str, terms: &[I]) -> Predicate {
    Predicate {
        name: name.to_string(),
        terms: terms.iter().map(|term| term.as_ref().clone()).collect(),
    }
}

/// creates a rule
pub fn rule<T: AsRef<Term>>(head_name: &str, head_terms: &[T], predicates: &[Predicate]) -> Rule {
    Rule::new(pred(head_name, head_terms), predicates.to_vec(), Vec::new(), vec![])
}

/// creates a rule with constraints
pub fn constrained_rule<T: AsRef<Term>>(
    head_name: &str,
    head_terms: &[T],
    predicates: &[Predicate],
    expressions: &[Expression],
) -> Rule {
    Rule::new(
        pred(head_name, head_terms),
        predicates.to_vec(),
        expressions.to_vec(),
        vec![],
    )
}

/// creates a check
pub fn check<P: AsRef<Predicate>>(predicates: &[P], kind: CheckKind) -> Check {
    let empty_terms: &[Term] = &[];
    Check {
        queries: vec![Rule::new(
            pred("query", empty_terms),
            predicates.iter().map(|p| p.as_ref().clone()).collect(),
            vec![],
            vec![],
        )],
        kind,
    }
}

pub fn int(i: i64) -> Term {
    Term::Integer(i)
}

pub fn string(s: &str) -> Term {
    Term::Str(s.to_string())
}

/// creates a date, stored as seconds since UNIX_EPOCH
pub fn date(t: &SystemTime) -> Term {
    let dur = t.duration_since(UNIX_EPOCH).unwrap();
    Term::Date(dur.as_secs())
}

pub fn var(s: &str) -> Term {
    Term::Variable(s.to_string())
}

pub fn variable(s: &str) -> Term {
    Term::Variable(s.to_string())
}

pub fn bytes(s: &[u8]) -> Term {
    Term::Bytes(s.to_vec())
}

pub fn boolean(b: bool) -> Term {
    Term::Bool(b)
}

pub fn set(s: BTreeSet<Term>) -> Term {
    Term::Set(s)
}

pub fn null() -> Term {
    Term::Null
}

pub fn array(a: Vec<Term>) -> Term {
    Term::Array(a)
}

pub fn map(m: BTreeMap<MapKey, Term>) -> Term {
    Term::Map(m)
}

pub fn parameter(p: &str) -> Term {
    Term::Parameter(p.to_string())
}

/// builds the authority block of a new token
#[derive(Clone, Debug, Default)]
pub struct BiscuitBuilder {
    facts: Vec<Fact>,
    rules: Vec<Rule>,
    checks: Vec<Check>,
    scopes: Vec<Scope>,
    context: Option<String>,
    root_key_id: Option<u32>,
}

impl BiscuitBuilder {
    pub fn new() -> Self {
        BiscuitBuilder::default()
    }

    pub fn fact<F>(mut self, fact: F) -> Result<Self, error::Token>
    where
        F: TryInto<Fact>,
        error::Token: From<<F as TryInto<Fact>>::Error>,
    {
        self.facts.push(fact.try_into()?);
        Ok(self)
    }

    pub fn rule<R>(mut self, rule: R) -> Result<Self, error::Token>
    where
        R: TryInto<Rule>,
        error::Token: From<<R as TryInto<Rule>>::Error>,
    {
        let rule = rule.try_into()?;
        rule.validate_variables()
            .map_err(error::Token::ConversionError)?;
        self.rules.push(rule);
        Ok(self)
    }

    pub fn check<C>(mut self, check: C) -> Result<Self, error::Token>
    where
        C: TryInto<Check>,
        error::Token: From<<C as TryInto<Check>>::Error>,
    {
        self.checks.push(check.try_into()?);
        Ok(self)
    }

    pub fn scope(mut self, scope: Scope) -> Self {
        self.scopes.push(scope);
        self
    }

    pub fn context(mut self, context: String) -> Self {
        self.context = Some(context);
        self
    }

    pub fn root_key_id(mut self, id: u32) -> Self {
        self.root_key_id = Some(id);
        self
    }

    fn build_block(&self, base_symbols: &SymbolTable) -> (Block, SymbolTable) {
        let mut symbols = base_symbols.clone();
        let start = symbols.symbols.len();

        let facts = self.facts.iter().map(|f| f.convert(&mut symbols)).collect();
        let rules = self.rules.iter().map(|r| r.convert(&mut symbols)).collect();
        let checks = self.checks.iter().map(|c| c.convert(&mut symbols)).collect();
        let scopes = self
            .scopes
            .iter()
            .filter_map(|s| match s {
                Scope::Authority => Some(TokenScope::Authority),
                Scope::Previous => Some(TokenScope::Previous),
                Scope::PublicKey(key) => Some(TokenScope::PublicKey(symbols.public_keys.insert(key) as u64)),
                Scope::Parameter(_) => None,
            })
            .collect();

        let local_symbols = SymbolTable {
            symbols: symbols.symbols[start..].to_vec(),
            public_keys: symbols.public_keys.clone(),
        };

        (
            Block {
                symbols: local_symbols,
                facts,
                rules,
                checks,
                context: self.context.clone(),
                version: crate::token::MAX_SCHEMA_VERSION,
                external_key: None,
                public_keys: symbols.public_keys.clone(),
                scopes,
            },
            symbols,
        )
    }

    pub fn build(self, root: &KeyPair) -> Result<Biscuit, error::Token> {
        let mut rng = rand::rngs::OsRng;
        self.build_with_rng(root, SymbolTable::new(), &mut rng)
    }

    pub fn build_with_rng<R: RngCore + CryptoRng>(
        self,
        root: &KeyPair,
        base_symbols: SymbolTable,
        rng: &mut R,
    ) -> Result<Biscuit, error::Token> {
        let (block, symbols) = self.build_block(&base_symbols);
        let version = datalog::get_schema_version(&block.facts, &block.rules, &block.checks, &block.scopes).0;
        let mut block = block;
        block.version = version;
        Biscuit::new_with_rng(rng, self.root_key_id, root, symbols, block)
    }
}

/// builds an attenuation block to append to an existing token
#[derive(Clone, Debug, Default)]
pub struct BlockBuilder {
    facts: Vec<Fact>,
    rules: Vec<Rule>,
    checks: Vec<Check>,
    scopes: Vec<Scope>,
    context: Option<String>,
}

impl BlockBuilder {
    pub fn new() -> Self {
        BlockBuilder::default()
    }

    pub fn fact<F>(mut self, fact: F) -> Result<Self, error::Token>
    where
        F: TryInto<Fact>,
        error::Token: From<<F as TryInto<Fact>>::Error>,
    {
        self.facts.push(fact.try_into()?);
        Ok(self)
    }

    pub fn rule<R>(mut self, rule: R) -> Result<Self, error::Token>
    where
        R: TryInto<Rule>,
        error::Token: From<<R as TryInto<Rule>>::Error>,
    {
        let rule = rule.try_into()?;
        rule.validate_variables()
            .map_err(error::Token::ConversionError)?;
        self.rules.push(rule);
        Ok(self)
    }

    pub fn check<C>(mut self, check: C) -> Result<Self, error::Token>
    where
        C: TryInto<Check>,
        error::Token: From<<C as TryInto<Check>>::Error>,
    {
        self.checks.push(check.try_into()?);
        Ok(self)
    }

    pub fn scope(mut self, scope: Scope) -> Self {
        self.scopes.push(scope);
        self
    }

    pub fn context(mut self, context: String) -> Self {
        self.context = Some(context);
        self
    }

    pub(crate) fn build(self, base_symbols: SymbolTable) -> Block {
        let mut symbols = base_symbols;
        let start = symbols.symbols.len();

        let facts = self.facts.iter().map(|f| f.convert(&mut symbols)).collect();
        let rules = self.rules.iter().map(|r| r.convert(&mut symbols)).collect();
        let checks: Vec<datalog::Check> = self.checks.iter().map(|c| c.convert(&mut symbols)).collect();
        let scopes = self
            .scopes
            .iter()
            .filter_map(|s| match s {
                Scope::Authority => Some(TokenScope::Authority),
                Scope::Previous => Some(TokenScope::Previous),
                Scope::PublicKey(key) => Some(TokenScope::PublicKey(symbols.public_keys.insert(key) as u64)),
                Scope::Parameter(_) => None,
            })
            .collect();

        let version = datalog::get_schema_version(&facts, &rules, &checks, &scopes).0;

        let local_symbols = SymbolTable {
            symbols: symbols.symbols[start..].to_vec(),
            public_keys: symbols.public_keys.clone(),
        };

        Block {
            symbols: local_symbols,
            facts,
            rules,
            checks,
            context: self.context,
            version,
            external_key: None,
            public_keys: symbols.public_keys,
            scopes,
        }
    }
}

/// builds an authorizer for a token, adding facts, rules, checks and policies
/// that only exist for the duration of the authorization request
#[derive(Clone, Debug, Default)]
pub struct AuthorizerBuilder {
    facts: Vec<Fact>,
    rules: Vec<Rule>,
    checks: Vec<Check>,
    policies: Vec<Policy>,
    limits: AuthorizerLimits,
}

impl AuthorizerBuilder {
    pub fn new() -> Self {
        AuthorizerBuilder::default()
    }

    pub fn fact<F>(mut self, fact: F) -> Result<Self, error::Token>
    where
        F: TryInto<Fact>,
        error::Token: From<<F as TryInto<Fact>>::Error>,
    {
        self.facts.push(fact.try_into()?);
        Ok(self)
    }

    pub fn rule<R>(mut self, rule: R) -> Result<Self, error::Token>
    where
        R: TryInto<Rule>,
        error::Token: From<<R as TryInto<Rule>>::Error>,
    {
        self.rules.push(rule.try_into()?);
        Ok(self)
    }

    pub fn check<C>(mut self, check: C) -> Result<Self, error::Token>
    where
        C: TryInto<Check>,
        error::Token: From<<C as TryInto<Check>>::Error>,
    {
        self.checks.push(check.try_into()?);
        Ok(self)
    }

    pub fn policy<P>(mut self, policy: P) -> Result<Self, error::Token>
    where
        P: TryInto<Policy>,
        error::Token: From<<P as TryInto<Policy>>::Error>,
    {
        self.policies.push(policy.try_into()?);
        Ok(self)
    }

    pub fn set_limits(mut self, limits: AuthorizerLimits) -> Self {
        self.limits = limits;
        self
    }

    pub(crate) fn into_parts(self) -> (Vec<Fact>, Vec<Rule>, Vec<Check>, Vec<Policy>, AuthorizerLimits) {
        (self.facts, self.rules, self.checks, self.policies, self.limits)
    }

    pub fn build(self, token: &Biscuit) -> Result<crate::token::authorizer::Authorizer, error::Token> {
        crate::token::authorizer::Authorizer::from_token_and_builder(token, self)
    }
}

#[allow(unused)]
fn _assert_duration_used(_: Duration) {}
