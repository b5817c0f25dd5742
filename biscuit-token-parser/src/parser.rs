/*
 * Copyright (c) 2019 Geoffroy Couprie <contact@geoffroycouprie.com> and Contributors to the Eclipse Foundation.
 * SPDX-License-Identifier: Apache-2.0
 */
//! textual Datalog parser, producing [`crate::builder`] values
//!
//! This module is a collaborator to the core engine: it turns the surface
//! syntax described for blocks, checks and policies into the builder AST.
//! It does not know anything about symbol tables, signatures or evaluation.
use std::collections::{BTreeMap, BTreeSet, HashSet};

use nom::{
    branch::alt,
    bytes::complete::{escaped_transform, is_not, tag, take_while1},
    character::complete::{alphanumeric1, char, digit1, multispace0, multispace1, one_of},
    combinator::{cut, map, map_res, opt, recognize, value},
    multi::{many0, separated_list0, separated_list1},
    sequence::{delimited, pair, preceded, terminated, tuple},
    Finish, IResult,
};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

use crate::builder::{
    self, Algorithm, Binary, Check, CheckKind, Expression, Fact, MapKey, Op, Policy, PolicyKind,
    Predicate, PublicKey, Rule, Scope, Term, Unary,
};
use crate::error::{LanguageError, LanguageErrorDetail};

/// parses a single fact: `name(term, term, ...)`
pub fn fact(i: &str) -> IResult<&str, Fact> {
    let (i, _) = space0(i)?;
    let (i, predicate) = predicate(i)?;
    Ok((i, Fact::new(predicate.name, predicate.terms)))
}

/// parses a single rule: `head <- body, expr, ..., [trusting ...]`
pub fn rule(i: &str) -> IResult<&str, (Rule, Vec<Scope>)> {
    let (i, _) = space0(i)?;
    let (i, head) = predicate(i)?;
    let (i, _) = space0(i)?;
    let (i, _) = tag("<-")(i)?;
    let (i, _) = space0(i)?;
    let (i, (body, expressions, scopes)) = rule_body(i)?;

    let r = Rule::new(head, body, expressions, scopes.clone());
    Ok((i, (r, scopes)))
}

/// parses the part after `<-`: predicates and expressions separated by commas,
/// optionally followed by a `trusting` clause
fn rule_body(i: &str) -> IResult<&str, (Vec<Predicate>, Vec<Expression>, Vec<Scope>)> {
    let (i, elements) = separated_list0(comma, rule_body_element)(i)?;
    let (i, _) = space0(i)?;
    let (i, scopes) = opt(scopes)(i)?;

    let mut body = Vec::new();
    let mut expressions = Vec::new();
    for e in elements {
        match e {
            RuleBodyElement::Predicate(p) => body.push(p),
            RuleBodyElement::Expression(e) => expressions.push(e),
        }
    }

    Ok((i, (body, expressions, scopes.unwrap_or_default())))
}

enum RuleBodyElement {
    Predicate(Predicate),
    Expression(Expression),
}

fn rule_body_element(i: &str) -> IResult<&str, RuleBodyElement> {
    alt((
        map(predicate, RuleBodyElement::Predicate),
        map(expression, |ops| {
            RuleBodyElement::Expression(Expression { ops })
        }),
    ))(i)
}

/// parses a check: `check if ...`, `check all ...` or `reject if ...`
pub fn check(i: &str) -> IResult<&str, Check> {
    alt((
        map(preceded(pair(tag("check"), space1), check_kind_if_all), |(kind, queries)| {
            Check { queries, kind }
        }),
        map(preceded(pair(tag("reject"), space1), check_kind_reject), |queries| Check {
            queries,
            kind: CheckKind::Reject,
        }),
    ))(i)
}

fn check_kind_if_all(i: &str) -> IResult<&str, (CheckKind, Vec<Rule>)> {
    alt((
        map(preceded(pair(tag("all"), space1), check_body), |q| {
            (CheckKind::All, q)
        }),
        map(preceded(pair(tag("if"), space1), check_body), |q| {
            (CheckKind::One, q)
        }),
    ))(i)
}

fn check_kind_reject(i: &str) -> IResult<&str, Vec<Rule>> {
    preceded(pair(tag("if"), space1), check_body)(i)
}

/// a check/policy body is one or more queries (bodies), separated by `or`
fn check_body(i: &str) -> IResult<&str, Vec<Rule>> {
    separated_list1(tuple((space0, tag("or"), space1)), check_query)(i)
}

fn check_query(i: &str) -> IResult<&str, Rule> {
    let (i, (body, expressions, scopes)) = rule_body(i)?;
    Ok((
        i,
        Rule::new(
            Predicate::new("query".to_string(), vec![] as Vec<Term>),
            body,
            expressions,
            scopes,
        ),
    ))
}

/// parses a policy: `allow if ...` or `deny if ...`
pub fn policy(i: &str) -> IResult<&str, Policy> {
    alt((
        map(
            preceded(tuple((tag("allow"), space1, tag("if"), space1)), check_body),
            |queries| Policy {
                queries,
                kind: PolicyKind::Allow,
            },
        ),
        map(
            preceded(tuple((tag("deny"), space1, tag("if"), space1)), check_body),
            |queries| Policy {
                queries,
                kind: PolicyKind::Deny,
            },
        ),
    ))(i)
}

/// `trusting authority | previous | ed25519/HEX | secp256r1/HEX`, comma-separated
fn scopes(i: &str) -> IResult<&str, Vec<Scope>> {
    preceded(
        tuple((tag("trusting"), space1)),
        separated_list1(comma, scope),
    )(i)
}

fn scope(i: &str) -> IResult<&str, Scope> {
    alt((
        value(Scope::Authority, tag("authority")),
        value(Scope::Previous, tag("previous")),
        map(
            preceded(pair(tag("ed25519"), char('/')), hex_bytes),
            |key| {
                Scope::PublicKey(PublicKey {
                    key,
                    algorithm: Algorithm::Ed25519,
                })
            },
        ),
        map(
            preceded(pair(tag("secp256r1"), char('/')), hex_bytes),
            |key| {
                Scope::PublicKey(PublicKey {
                    key,
                    algorithm: Algorithm::Secp256r1,
                })
            },
        ),
    ))(i)
}

fn predicate(i: &str) -> IResult<&str, Predicate> {
    let (i, name) = identifier(i)?;
    let (i, terms) = delimited(
        char('('),
        separated_list0(comma, term),
        cut(preceded(space0, char(')'))),
    )(i)?;
    Ok((i, Predicate::new(name.to_string(), terms)))
}

// ---------------------------------------------------------------------
// terms
// ---------------------------------------------------------------------

fn term(i: &str) -> IResult<&str, Term> {
    let (i, _) = space0(i)?;
    alt((
        variable,
        date_term,
        hex_term,
        string_term,
        bool_term,
        null_term,
        map_term,
        set_term,
        array_term,
        integer_term,
    ))(i)
}

fn variable(i: &str) -> IResult<&str, Term> {
    map(preceded(char('$'), identifier), |s: &str| {
        Term::Variable(s.to_string())
    })(i)
}

fn integer_term(i: &str) -> IResult<&str, Term> {
    map(
        recognize(pair(opt(char('-')), digit1)),
        |s: &str| Term::Integer(s.parse::<i64>().unwrap_or(0)),
    )(i)
}

fn string_term(i: &str) -> IResult<&str, Term> {
    map(quoted_string, Term::Str)(i)
}

fn quoted_string(i: &str) -> IResult<&str, String> {
    delimited(
        char('"'),
        map(
            opt(escaped_transform(
                is_not("\"\\"),
                '\\',
                alt((
                    value("\\", tag("\\")),
                    value("\"", tag("\"")),
                    value("\n", tag("n")),
                )),
            )),
            |s: Option<String>| s.unwrap_or_default(),
        ),
        char('"'),
    )(i)
}

fn bool_term(i: &str) -> IResult<&str, Term> {
    alt((
        value(Term::Bool(true), tag("true")),
        value(Term::Bool(false), tag("false")),
    ))(i)
}

fn null_term(i: &str) -> IResult<&str, Term> {
    value(Term::Null, tag("null"))(i)
}

fn hex_term(i: &str) -> IResult<&str, Term> {
    map(preceded(tag("hex:"), hex_bytes), Term::Bytes)(i)
}

fn hex_bytes(i: &str) -> IResult<&str, Vec<u8>> {
    map_res(
        take_while1(|c: char| c.is_ascii_hexdigit()),
        hex::decode,
    )(i)
}

fn date_term(i: &str) -> IResult<&str, Term> {
    map_res(
        recognize(tuple((
            digit1,
            char('-'),
            digit1,
            char('-'),
            digit1,
            char('T'),
            digit1,
            char(':'),
            digit1,
            char(':'),
            digit1,
            opt(pair(char('.'), digit1)),
            alt((tag("Z"), recognize(pair(one_of("+-"), digit1)))),
        ))),
        |s: &str| -> Result<Term, time::error::Parse> {
            let dt = OffsetDateTime::parse(s, &Rfc3339)?;
            Ok(Term::Date(dt.unix_timestamp().max(0) as u64))
        },
    )(i)
}

fn set_term(i: &str) -> IResult<&str, Term> {
    alt((
        value(Term::Set(BTreeSet::new()), tag("{,}")),
        map(
            delimited(
                char('{'),
                separated_list1(comma, non_variable_term),
                cut(preceded(space0, char('}'))),
            ),
            |terms| Term::Set(terms.into_iter().collect()),
        ),
    ))(i)
}

fn map_term(i: &str) -> IResult<&str, Term> {
    map(
        delimited(
            char('{'),
            separated_list1(comma, map_entry),
            cut(preceded(space0, char('}'))),
        ),
        |entries| Term::Map(entries.into_iter().collect::<BTreeMap<_, _>>()),
    )(i)
}

fn map_entry(i: &str) -> IResult<&str, (MapKey, Term)> {
    let (i, _) = space0(i)?;
    let (i, key) = alt((
        map(quoted_string, MapKey::Str),
        map(integer_term, |t| match t {
            Term::Integer(v) => MapKey::Integer(v),
            _ => unreachable!(),
        }),
    ))(i)?;
    let (i, _) = space0(i)?;
    let (i, _) = char(':')(i)?;
    let (i, value) = term(i)?;
    Ok((i, (key, value)))
}

fn array_term(i: &str) -> IResult<&str, Term> {
    map(
        delimited(
            char('['),
            separated_list0(comma, non_variable_term),
            cut(preceded(space0, char(']'))),
        ),
        Term::Array,
    )(i)
}

fn non_variable_term(i: &str) -> IResult<&str, Term> {
    let (i, t) = term(i)?;
    Ok((i, t))
}

// ---------------------------------------------------------------------
// expressions: recursive-descent over standard precedence, emitting a
// reverse-polish `Vec<Op>` as operands are reduced
// ---------------------------------------------------------------------

fn expression(i: &str) -> IResult<&str, Vec<Op>> {
    or_expr(i)
}

fn or_expr(i: &str) -> IResult<&str, Vec<Op>> {
    let (i, first) = and_expr(i)?;
    let (i, rest) = many0(preceded(tuple((space0, tag("||"), space0)), and_expr))(i)?;
    Ok((i, fold_binary(first, rest, Binary::Or)))
}

fn and_expr(i: &str) -> IResult<&str, Vec<Op>> {
    let (i, first) = cmp_expr(i)?;
    let (i, rest) = many0(preceded(tuple((space0, tag("&&"), space0)), cmp_expr))(i)?;
    Ok((i, fold_binary(first, rest, Binary::And)))
}

fn cmp_expr(i: &str) -> IResult<&str, Vec<Op>> {
    let (i, first) = add_expr(i)?;
    let (i, rest) = opt(pair(
        preceded(
            space0,
            alt((
                value(Binary::LessOrEqual, tag("<=")),
                value(Binary::GreaterOrEqual, tag(">=")),
                value(Binary::Equal, tag("==")),
                value(Binary::NotEqual, tag("!=")),
                value(Binary::LessThan, tag("<")),
                value(Binary::GreaterThan, tag(">")),
            )),
        ),
        preceded(space0, add_expr),
    ))(i)?;

    Ok((
        i,
        match rest {
            None => first,
            Some((op, mut right)) => {
                let mut out = first;
                out.append(&mut right);
                out.push(Op::Binary(op));
                out
            }
        },
    ))
}

fn add_expr(i: &str) -> IResult<&str, Vec<Op>> {
    let (i, first) = mul_expr(i)?;
    let (i, rest) = many0(pair(
        preceded(
            space0,
            alt((value(Binary::Add, char('+')), value(Binary::Sub, char('-')))),
        ),
        preceded(space0, mul_expr),
    ))(i)?;
    Ok((i, fold_binary_ops(first, rest)))
}

fn mul_expr(i: &str) -> IResult<&str, Vec<Op>> {
    let (i, first) = unary_expr(i)?;
    let (i, rest) = many0(pair(
        preceded(
            space0,
            alt((value(Binary::Mul, char('*')), value(Binary::Div, char('/')))),
        ),
        preceded(space0, unary_expr),
    ))(i)?;
    Ok((i, fold_binary_ops(first, rest)))
}

fn unary_expr(i: &str) -> IResult<&str, Vec<Op>> {
    let (i, negate) = opt(char('-'))(i)?;
    let (i, mut ops) = postfix_expr(i)?;
    if negate.is_some() {
        ops.push(Op::Unary(Unary::Negate));
    }
    Ok((i, ops))
}

fn postfix_expr(i: &str) -> IResult<&str, Vec<Op>> {
    let (i, mut ops) = primary_expr(i)?;
    let (i, calls) = many0(preceded(pair(space0, char('.')), method_call))(i)?;
    for call in calls {
        ops = call.apply(ops);
    }
    Ok((i, ops))
}

enum MethodCall {
    Unary(Unary),
    Binary(Binary, Vec<Op>),
}

impl MethodCall {
    fn apply(self, mut receiver: Vec<Op>) -> Vec<Op> {
        match self {
            MethodCall::Unary(u) => {
                receiver.push(Op::Unary(u));
                receiver
            }
            MethodCall::Binary(b, mut arg) => {
                receiver.append(&mut arg);
                receiver.push(Op::Binary(b));
                receiver
            }
        }
    }
}

fn method_call(i: &str) -> IResult<&str, MethodCall> {
    let (i, name) = identifier(i)?;
    match name {
        "length" => map(tag("()"), |_| MethodCall::Unary(Unary::Length))(i),
        "type" | "type_of" => map(tag("()"), |_| MethodCall::Unary(Unary::TypeOf))(i),
        "contains" => one_arg(i, Binary::Contains),
        "starts_with" => one_arg(i, Binary::Prefix),
        "ends_with" => one_arg(i, Binary::Suffix),
        "matches" => one_arg(i, Binary::Regex),
        "intersection" => one_arg(i, Binary::Intersection),
        "union" => one_arg(i, Binary::Union),
        "get" => one_arg(i, Binary::Get),
        "try_or" => one_arg(i, Binary::TryOr),
        "all" => closure_arg(i, Binary::All),
        "any" => closure_arg(i, Binary::Any),
        _ => Err(nom::Err::Error(nom::error::Error::new(
            i,
            nom::error::ErrorKind::Tag,
        ))),
    }
}

fn one_arg(i: &str, op: Binary) -> IResult<&str, MethodCall> {
    map(
        delimited(char('('), expression, cut(preceded(space0, char(')')))),
        move |arg| MethodCall::Binary(op.clone(), arg),
    )(i)
}

fn closure_arg(i: &str, op: Binary) -> IResult<&str, MethodCall> {
    map(
        delimited(char('('), closure, cut(preceded(space0, char(')')))),
        move |arg| MethodCall::Binary(op.clone(), arg),
    )(i)
}

fn closure(i: &str) -> IResult<&str, Vec<Op>> {
    let (i, params) = separated_list1(comma, preceded(char('$'), identifier))(i)?;
    let (i, _) = tuple((space0, tag("->"), space0))(i)?;
    let (i, body) = expression(i)?;
    Ok((
        i,
        vec![Op::Closure(
            params.into_iter().map(String::from).collect(),
            body,
        )],
    ))
}

fn primary_expr(i: &str) -> IResult<&str, Vec<Op>> {
    alt((
        map(
            delimited(
                char('('),
                expression,
                cut(preceded(space0, char(')'))),
            ),
            |mut ops| {
                ops.push(Op::Unary(Unary::Parens));
                ops
            },
        ),
        map(term, |t| vec![Op::Value(t)]),
    ))(i)
}

fn fold_binary(first: Vec<Op>, rest: Vec<Vec<Op>>, op: Binary) -> Vec<Op> {
    let mut out = first;
    for mut r in rest {
        out.append(&mut r);
        out.push(Op::Binary(op.clone()));
    }
    out
}

fn fold_binary_ops(first: Vec<Op>, rest: Vec<(Binary, Vec<Op>)>) -> Vec<Op> {
    let mut out = first;
    for (op, mut r) in rest {
        out.append(&mut r);
        out.push(Op::Binary(op));
    }
    out
}

// ---------------------------------------------------------------------
// lexical helpers
// ---------------------------------------------------------------------

fn identifier(i: &str) -> IResult<&str, &str> {
    recognize(pair(
        alt((alphanumeric1, tag("_"))),
        many0(alt((alphanumeric1, tag("_")))),
    ))(i)
}

fn comma(i: &str) -> IResult<&str, ()> {
    value((), tuple((space0, char(','), space0)))(i)
}

fn space0(i: &str) -> IResult<&str, ()> {
    value((), multispace0)(i)
}

fn space1(i: &str) -> IResult<&str, ()> {
    value((), multispace1)(i)
}

/// checks that no closure parameter shadows an already-bound variable name;
/// the Datalog core relies on this being rejected at the parser layer
pub fn check_no_shadowing(ops: &[Op], bound: &HashSet<String>) -> Result<(), LanguageError> {
    for op in ops {
        if let Op::Closure(params, body) = op {
            for p in params {
                if bound.contains(p) {
                    return Err(LanguageError::Shadowing(p.clone()));
                }
            }
            let mut inner = bound.clone();
            inner.extend(params.iter().cloned());
            check_no_shadowing(body, &inner)?;
        }
    }
    Ok(())
}

fn to_language_error(i: &str, e: nom::error::Error<&str>) -> LanguageError {
    LanguageError::ParseError(vec![LanguageErrorDetail {
        input: i.to_string(),
        message: format!("{:?}", e.code),
    }])
}

/// parses a full fact, failing if any input remains
pub fn parse_fact(i: &str) -> Result<Fact, LanguageError> {
    let (remaining, f) = fact(i).finish().map_err(|e| to_language_error(i, e))?;
    if !remaining.trim().is_empty() {
        return Err(LanguageError::RemainingInput);
    }
    Ok(f)
}

/// parses a full rule (with its trusting scopes), failing if any input remains
pub fn parse_rule(i: &str) -> Result<(Rule, Vec<Scope>), LanguageError> {
    let (remaining, r) = rule(i).finish().map_err(|e| to_language_error(i, e))?;
    if !remaining.trim().is_empty() {
        return Err(LanguageError::RemainingInput);
    }
    Ok(r)
}

/// parses a full check, failing if any input remains
pub fn parse_check(i: &str) -> Result<Check, LanguageError> {
    let (remaining, c) = check(i).finish().map_err(|e| to_language_error(i, e))?;
    if !remaining.trim().is_empty() {
        return Err(LanguageError::RemainingInput);
    }
    Ok(c)
}

/// parses a full policy, failing if any input remains
pub fn parse_policy(i: &str) -> Result<Policy, LanguageError> {
    let (remaining, p) = policy(i).finish().map_err(|e| to_language_error(i, e))?;
    if !remaining.trim().is_empty() {
        return Err(LanguageError::RemainingInput);
    }
    Ok(p)
}

/// strips `//` and `/* */` comments from a block of Datalog source
pub fn strip_comments(i: &str) -> String {
    let mut out = String::with_capacity(i.len());
    let mut chars = i.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '/' && chars.peek() == Some(&'/') {
            for c in chars.by_ref() {
                if c == '\n' {
                    out.push('\n');
                    break;
                }
            }
        } else if c == '/' && chars.peek() == Some(&'*') {
            chars.next();
            let mut prev = ' ';
            for c in chars.by_ref() {
                if prev == '*' && c == '/' {
                    break;
                }
                prev = c;
            }
        } else {
            out.push(c);
        }
    }
    out
}
