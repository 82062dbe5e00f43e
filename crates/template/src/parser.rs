//! Nom parsers for value expressions and assignment sources.
//!
//! Both entry points consume their whole input; trailing garbage is a
//! syntax error, which the renderer turns into a raw clause.

use nom::{
    branch::alt,
    bytes::complete::{tag, take_while1},
    character::complete::{char, digit1, space0, space1},
    combinator::{all_consuming, map, map_res, opt, value},
    multi::many0,
    sequence::{delimited, preceded, separated_pair, tuple},
    Finish, IResult,
};

use arbor_auth::HostQueryKind;

use crate::ast::{Accessor, MatchValue, Reference, Root, Segment, Source, ValueExpr};
use crate::error::TemplateError;

// =============================================================================
// ENTRY POINTS
// =============================================================================

/// Parse literal text with embedded `{ref}` placeholders.
pub fn parse_value_expr(input: &str) -> Result<ValueExpr, TemplateError> {
    all_consuming(many0(segment))(input)
        .finish()
        .map(|(_, segments)| ValueExpr { segments })
        .map_err(|e| syntax(input, e))
}

/// Parse the right-hand side of an assignment clause.
///
/// ```text
/// keys(name)
/// hosts(acme:role:db /hosts/name {primary} 0 zone=eu)
/// ```
pub fn parse_source(input: &str) -> Result<Source, TemplateError> {
    all_consuming(delimited(space0, alt((keys_source, hosts_source)), space0))(input)
        .finish()
        .map(|(_, source)| source)
        .map_err(|e| syntax(input, e))
}

/// Parse a bare reference such as `$db.extra.zone` or `ports[1]`.
pub fn parse_reference(input: &str) -> Result<Reference, TemplateError> {
    all_consuming(reference)(input)
        .finish()
        .map(|(_, r)| r)
        .map_err(|e| syntax(input, e))
}

fn syntax(clause: &str, err: nom::error::Error<&str>) -> TemplateError {
    let message = if err.input.is_empty() {
        format!("unexpected end of input ({:?})", err.code)
    } else {
        format!("unexpected '{}' ({:?})", err.input, err.code)
    };
    TemplateError::syntax(clause, message)
}

// =============================================================================
// VALUE EXPRESSIONS
// =============================================================================

fn segment(input: &str) -> IResult<&str, Segment> {
    alt((
        map(placeholder, Segment::Placeholder),
        map(literal_text, |s: &str| Segment::Literal(s.to_string())),
    ))(input)
}

fn literal_text(input: &str) -> IResult<&str, &str> {
    take_while1(|c| c != '{' && c != '}')(input)
}

fn placeholder(input: &str) -> IResult<&str, Reference> {
    delimited(char('{'), reference, char('}'))(input)
}

fn reference(input: &str) -> IResult<&str, Reference> {
    map(tuple((root, many0(accessor))), |(root, path)| Reference { root, path })(input)
}

fn root(input: &str) -> IResult<&str, Root> {
    alt((
        map(preceded(char('$'), identifier), |s| Root::Var(s.to_string())),
        map(identifier, |s| Root::Key(s.to_string())),
    ))(input)
}

fn accessor(input: &str) -> IResult<&str, Accessor> {
    alt((
        map(delimited(char('['), index, char(']')), Accessor::Index),
        map(preceded(char('.'), identifier), |s| Accessor::Field(s.to_string())),
    ))(input)
}

fn identifier(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_ascii_alphanumeric() || c == '_' || c == '-')(input)
}

fn index(input: &str) -> IResult<&str, usize> {
    map_res(digit1, |s: &str| s.parse::<usize>())(input)
}

// =============================================================================
// ASSIGNMENT SOURCES
// =============================================================================

fn keys_source(input: &str) -> IResult<&str, Source> {
    map(
        delimited(tag("keys("), delimited(space0, identifier, space0), char(')')),
        |name| Source::Keys(name.to_string()),
    )(input)
}

fn hosts_source(input: &str) -> IResult<&str, Source> {
    let (input, _) = tag("hosts(")(input)?;
    let (input, (_, role, _, kind, _, match_value, _, index_hint, extra, _)) = tuple((
        space0,
        token,
        space1,
        query_kind,
        space1,
        match_value,
        space1,
        index,
        opt(preceded(space1, extra_filter)),
        space0,
    ))(input)?;
    let (input, _) = char(')')(input)?;

    Ok((
        input,
        Source::Hosts {
            role: role.to_string(),
            kind,
            match_value,
            index_hint,
            extra,
        },
    ))
}

fn token(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| !c.is_whitespace() && c != ')' && c != '{' && c != '}')(input)
}

fn query_kind(input: &str) -> IResult<&str, HostQueryKind> {
    alt((
        value(HostQueryKind::Name, tag("/hosts/name")),
        value(HostQueryKind::Ip, tag("/hosts/ip")),
    ))(input)
}

fn match_value(input: &str) -> IResult<&str, MatchValue> {
    alt((
        map(placeholder, MatchValue::Placeholder),
        map(token, |s| MatchValue::Literal(s.to_string())),
    ))(input)
}

fn extra_filter(input: &str) -> IResult<&str, (String, String)> {
    map(
        separated_pair(identifier, char('='), token),
        |(k, v): (&str, &str)| (k.to_string(), v.to_string()),
    )(input)
}

// =============================================================================
// TESTS
// =============================================================================
