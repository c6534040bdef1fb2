//! Parsers for the server's textual literals.
//!
//! Arrays (`{...}`), composites (`(...)`) and row identifiers (`(...)`)
//! share one grammar:
//!
//! - `"` toggles quoted mode; inside quotes `\x` stands for `x` and `""`
//!   for one `"` (composite output doubles quotes).
//! - Outside quotes `,` ends an element and a bare `NULL` is a null.
//! - Nested `{...}`/`(...)` outside quotes are kept verbatim as one element
//!   so the caller can parse them one level down.
//!
//! An empty element that was never quoted is skipped in arrays and is a
//! NULL field in composites, which is how the server writes a null field.
//! A quoted empty element is always the empty string.

use std::borrow::Cow;

use crate::pg::{PgError, PgResult};

/// Which delimiters and element rules apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiteralKind {
    Array,
    Composite,
    RowId,
}

impl LiteralKind {
    fn delimiters(self) -> (char, char) {
        match self {
            LiteralKind::Array => ('{', '}'),
            LiteralKind::Composite | LiteralKind::RowId => ('(', ')'),
        }
    }
}

/// One element produced by [`parse_nested`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LiteralElement<'a> {
    Null,
    Value { text: Cow<'a, str>, quoted: bool },
}

impl LiteralElement<'_> {
    pub fn into_option(self) -> Option<String> {
        match self {
            LiteralElement::Null => None,
            LiteralElement::Value { text, .. } => Some(text.into_owned()),
        }
    }
}

/// Element accumulator; reused across elements of one literal.
#[derive(Default)]
struct Element {
    text: String,
    quoted: bool,
}

/// Split a nested literal into its top-level elements.
///
/// Calls `on_element` once per element in order and returns how many were
/// emitted.
pub fn parse_nested<'a, F>(input: &'a str, kind: LiteralKind, mut on_element: F) -> PgResult<usize>
where
    F: FnMut(LiteralElement<'a>) -> PgResult<()>,
{
    let body = strip_delimiters(input, kind)?;

    let mut count = 0;
    let mut emit = |element: &mut Element| -> PgResult<()> {
        let current = std::mem::take(element);
        let out = if current.quoted {
            LiteralElement::Value {
                text: Cow::Owned(current.text),
                quoted: true,
            }
        } else if current.text.is_empty() {
            match kind {
                // `(,)` has two null fields; `()` with nothing at all has one
                LiteralKind::Composite | LiteralKind::RowId => LiteralElement::Null,
                LiteralKind::Array => return Ok(()),
            }
        } else if current.text == "NULL" {
            LiteralElement::Null
        } else {
            LiteralElement::Value {
                text: Cow::Owned(current.text),
                quoted: false,
            }
        };
        count += 1;
        on_element(out)
    };

    let mut element = Element::default();
    let mut in_quotes = false;
    let mut depth = 0usize;
    let mut chars = body.chars().peekable();
    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '\\' => {
                    let escaped = chars
                        .next()
                        .ok_or_else(|| PgError::malformed(input, "dangling escape"))?;
                    if depth > 0 {
                        element.text.push('\\');
                    }
                    element.text.push(escaped);
                }
                '"' if depth == 0 && chars.peek() == Some(&'"') => {
                    chars.next();
                    element.text.push('"');
                }
                '"' => {
                    in_quotes = false;
                    if depth > 0 {
                        element.text.push('"');
                    }
                }
                _ => element.text.push(c),
            }
            continue;
        }
        match c {
            '"' => {
                in_quotes = true;
                if depth > 0 {
                    element.text.push('"');
                } else {
                    element.quoted = true;
                }
            }
            '{' | '(' => {
                depth += 1;
                element.text.push(c);
            }
            '}' | ')' => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| PgError::malformed(input, "unbalanced delimiters"))?;
                element.text.push(c);
            }
            ',' if depth == 0 => emit(&mut element)?,
            _ => element.text.push(c),
        }
    }
    if in_quotes {
        return Err(PgError::malformed(input, "unterminated quote"));
    }
    if depth != 0 {
        return Err(PgError::malformed(input, "unbalanced delimiters"));
    }
    // `{}` has no elements; a trailing element is flushed otherwise
    if !(kind == LiteralKind::Array && body.is_empty()) {
        emit(&mut element)?;
    }
    Ok(count)
}

fn strip_delimiters(input: &str, kind: LiteralKind) -> PgResult<&str> {
    let (open, close) = kind.delimiters();
    let mut literal = input;
    // Arrays with non-default bounds carry a `[lo:hi]=` prefix.
    if kind == LiteralKind::Array && literal.starts_with('[') {
        literal = literal
            .split_once('=')
            .map(|(_, rest)| rest)
            .ok_or_else(|| PgError::malformed(input, "array bounds without '='"))?;
    }
    if literal.len() < 2 || !literal.starts_with(open) || !literal.ends_with(close) {
        return Err(PgError::malformed(
            input,
            format!("expected a literal enclosed in '{}' and '{}'", open, close),
        ));
    }
    Ok(&literal[1..literal.len() - 1])
}

/// Elements of an array literal, `None` for NULL.
pub fn parse_array(input: &str) -> PgResult<Vec<Option<String>>> {
    let mut out = Vec::new();
    parse_array_into(input, &mut out)?;
    Ok(out)
}

/// Like [`parse_array`], appending to a caller-owned buffer.
pub fn parse_array_into(input: &str, out: &mut Vec<Option<String>>) -> PgResult<()> {
    parse_nested(input, LiteralKind::Array, |e| {
        out.push(e.into_option());
        Ok(())
    })?;
    Ok(())
}

/// Fields of a composite literal; the count must match exactly.
pub fn parse_composite(input: &str, expected_fields: usize) -> PgResult<Vec<Option<String>>> {
    let mut out = Vec::with_capacity(expected_fields);
    parse_composite_into(input, expected_fields, &mut out)?;
    Ok(out)
}

/// Like [`parse_composite`], appending to a caller-owned buffer.
pub fn parse_composite_into(
    input: &str,
    expected_fields: usize,
    out: &mut Vec<Option<String>>,
) -> PgResult<()> {
    let count = parse_nested(input, LiteralKind::Composite, |e| {
        out.push(e.into_option());
        Ok(())
    })?;
    if count != expected_fields {
        return Err(PgError::malformed(
            input,
            format!(
                "composite has {} fields but {} were expected",
                count, expected_fields
            ),
        ));
    }
    Ok(())
}

/// Pack a `(page, offset)` row identifier as `(page << 16) | offset`.
pub fn parse_row_id(input: &str) -> PgResult<i64> {
    let mut parts: Vec<Option<String>> = Vec::with_capacity(2);
    parse_nested(input, LiteralKind::RowId, |e| {
        parts.push(e.into_option());
        Ok(())
    })?;
    match parts.as_slice() {
        [Some(page), Some(offset)] => {
            let page: u32 = page
                .trim()
                .parse()
                .map_err(|_| PgError::malformed(input, "row id page is not an unsigned integer"))?;
            let offset: u16 = offset.trim().parse().map_err(|_| {
                PgError::malformed(input, "row id offset is not an unsigned integer")
            })?;
            Ok(pack_row_id(page, offset))
        }
        _ => Err(PgError::malformed(
            input,
            format!("row id needs exactly 2 elements, found {}", parts.len()),
        )),
    }
}

#[inline]
pub fn pack_row_id(page: u32, offset: u16) -> i64 {
    ((page as i64) << 16) | offset as i64
}

/// Decode a `\x`-prefixed hex blob.
pub fn decode_blob_hex(input: &str) -> PgResult<Vec<u8>> {
    let hex = input
        .strip_prefix("\\x")
        .ok_or_else(|| PgError::malformed(input, "blob literal must start with \\x"))?;
    decode_hex(input, hex)
}

/// Decode the text form of a PostGIS geometry. The server prints hex EWKB
/// without a prefix; a `\x` prefix is accepted as well.
pub fn decode_wkb_hex(input: &str) -> PgResult<Vec<u8>> {
    decode_hex(input, input.strip_prefix("\\x").unwrap_or(input))
}

fn decode_hex(input: &str, hex: &str) -> PgResult<Vec<u8>> {
    if hex.len() % 2 != 0 {
        return Err(PgError::malformed(input, "odd number of hex digits"));
    }
    let digit = |b: u8| -> PgResult<u8> {
        match b {
            b'0'..=b'9' => Ok(b - b'0'),
            b'a'..=b'f' => Ok(b - b'a' + 10),
            b'A'..=b'F' => Ok(b - b'A' + 10),
            _ => Err(PgError::malformed(input, "non-hex character in blob")),
        }
    };
    hex.as_bytes()
        .chunks_exact(2)
        .map(|pair| Ok(digit(pair[0])? << 4 | digit(pair[1])?))
        .collect()
}

/// Coordinates of a geometric literal in order, e.g. `<(1,2),3>` is
/// `[1, 2, 3]` and `[(0,0),(1,1)]` is `[0, 0, 1, 1]`.
pub fn parse_geometry(input: &str) -> PgResult<Vec<f64>> {
    input
        .split(|c: char| "(){}[]<>,".contains(c) || c.is_whitespace())
        .filter(|token| !token.is_empty())
        .map(|token| {
            token
                .parse::<f64>()
                .map_err(|_| PgError::malformed(input, format!("bad coordinate \"{}\"", token)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_array() {
        assert_eq!(
            parse_array("{1,2,3}").unwrap(),
            vec![Some("1".into()), Some("2".into()), Some("3".into())]
        );
    }

    #[test]
    fn test_array_null_element() {
        assert_eq!(
            parse_array("{1,NULL,3}").unwrap(),
            vec![Some("1".into()), None, Some("3".into())]
        );
        // a quoted NULL is the string
        assert_eq!(parse_array("{\"NULL\"}").unwrap(), vec![Some("NULL".into())]);
    }

    #[test]
    fn test_quoted_comma_and_escape() {
        assert_eq!(
            parse_array("{\"a,b\",c}").unwrap(),
            vec![Some("a,b".into()), Some("c".into())]
        );
        assert_eq!(
            parse_array(r#"{"say \"hi\"","back\\slash"}"#).unwrap(),
            vec![Some("say \"hi\"".into()), Some("back\\slash".into())]
        );
    }

    #[test]
    fn test_empty_elements() {
        assert_eq!(parse_array("{}").unwrap(), Vec::<Option<String>>::new());
        assert_eq!(parse_array("{\"\",a}").unwrap(), vec![Some("".into()), Some("a".into())]);
        // never-quoted empties are skipped
        assert_eq!(parse_array("{a,,b}").unwrap(), vec![Some("a".into()), Some("b".into())]);
    }

    #[test]
    fn test_nested_array_kept_verbatim() {
        assert_eq!(
            parse_array(r#"{{1,2},{"x,y",NULL}}"#).unwrap(),
            vec![Some("{1,2}".into()), Some(r#"{"x,y",NULL}"#.into())]
        );
        let inner = parse_array(r#"{"x,y",NULL}"#).unwrap();
        assert_eq!(inner, vec![Some("x,y".into()), None]);
    }

    #[test]
    fn test_array_bounds_prefix() {
        assert_eq!(
            parse_array("[0:1]={7,8}").unwrap(),
            vec![Some("7".into()), Some("8".into())]
        );
    }

    #[test]
    fn test_delimiter_errors() {
        assert!(matches!(parse_array("1,2"), Err(PgError::MalformedLiteral { .. })));
        assert!(matches!(parse_array("{1,2"), Err(PgError::MalformedLiteral { .. })));
        assert!(matches!(parse_array("{\"open}"), Err(PgError::MalformedLiteral { .. })));
        assert!(parse_composite("{1,2}", 2).is_err());
    }

    #[test]
    fn test_composite_field_count() {
        assert_eq!(
            parse_composite("(1,2)", 2).unwrap(),
            vec![Some("1".into()), Some("2".into())]
        );
        assert!(matches!(
            parse_composite("(1,2)", 3),
            Err(PgError::MalformedLiteral { .. })
        ));
        assert!(parse_composite("(1,2,3)", 2).is_err());
    }

    #[test]
    fn test_composite_null_fields() {
        assert_eq!(
            parse_composite("(1,,\"\")", 3).unwrap(),
            vec![Some("1".into()), None, Some("".into())]
        );
    }

    #[test]
    fn test_composite_with_nested_values() {
        let fields = parse_composite(r#"("(1,2)","{a,b}",x)"#, 3).unwrap();
        assert_eq!(fields[0].as_deref(), Some("(1,2)"));
        assert_eq!(fields[1].as_deref(), Some("{a,b}"));
    }

    #[test]
    fn test_composite_doubled_quotes() {
        let fields = parse_composite(r#"("say ""hi""","{x,""y,z""}")"#, 2).unwrap();
        assert_eq!(fields[0].as_deref(), Some("say \"hi\""));
        assert_eq!(fields[1].as_deref(), Some("{x,\"y,z\"}"));
        assert_eq!(
            parse_array(fields[1].as_deref().unwrap()).unwrap(),
            vec![Some("x".into()), Some("y,z".into())]
        );
    }

    #[test]
    fn test_row_id() {
        assert_eq!(parse_row_id("(1,5)").unwrap(), 65541);
        assert_eq!(parse_row_id("(0,1)").unwrap(), 1);
        assert!(parse_row_id("(1)").is_err());
        assert!(parse_row_id("(1,2,3)").is_err());
        assert!(parse_row_id("(-1,2)").is_err());
        assert!(parse_row_id("(1,70000)").is_err());
    }

    #[test]
    fn test_blob_hex() {
        assert_eq!(decode_blob_hex("\\xAABB").unwrap(), vec![0xAA, 0xBB]);
        assert_eq!(decode_blob_hex("\\x0a1f").unwrap(), vec![0x0A, 0x1F]);
        assert_eq!(decode_blob_hex("\\x").unwrap(), Vec::<u8>::new());
        assert_eq!(decode_blob_hex("\\xAB").unwrap(), vec![0xAB]);
        assert!(matches!(
            decode_blob_hex("\\xAB1"),
            Err(PgError::MalformedLiteral { .. })
        ));
        assert!(decode_blob_hex("\\xZZ").is_err());
        assert!(decode_blob_hex("AABB").is_err());
    }

    #[test]
    fn test_wkb_hex_prefix_is_optional() {
        let point = "0101000000000000000000F03F0000000000000040";
        let bytes = decode_wkb_hex(point).unwrap();
        assert_eq!(bytes.len(), 21);
        assert_eq!(bytes[0], 0x01);
        assert_eq!(decode_wkb_hex(&format!("\\x{}", point)).unwrap(), bytes);
        assert!(decode_wkb_hex("0101F").is_err());
    }

    #[test]
    fn test_geometry() {
        assert_eq!(parse_geometry("(1.5,2)").unwrap(), vec![1.5, 2.0]);
        assert_eq!(parse_geometry("<(1,2),3>").unwrap(), vec![1.0, 2.0, 3.0]);
        assert_eq!(parse_geometry("{1,-1,0}").unwrap(), vec![1.0, -1.0, 0.0]);
        assert_eq!(
            parse_geometry("[(0,0),(1,1)]").unwrap(),
            vec![0.0, 0.0, 1.0, 1.0]
        );
        assert!(parse_geometry("(a,b)").is_err());
    }
}
