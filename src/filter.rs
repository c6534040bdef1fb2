//! Filter pushdown: host predicates rendered as remote SQL.

use std::collections::BTreeMap;
use std::fmt;

use crate::error::{Result, ScanError};
use crate::logical::Value;

/// Largest `(page << 16) | offset` a row id can pack to.
const MAX_PACKED_ROW_ID: i128 = (u32::MAX as i128) << 16 | 0xFFFF;

/// Comparison operators that can be pushed down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOp {
    Equal,
    NotEqual,
    LessThan,
    GreaterThan,
    LessThanOrEqual,
    GreaterThanOrEqual,
}

impl ComparisonOp {
    pub fn as_sql(self) -> &'static str {
        match self {
            ComparisonOp::Equal => "=",
            ComparisonOp::NotEqual => "<>",
            ComparisonOp::LessThan => "<",
            ComparisonOp::GreaterThan => ">",
            ComparisonOp::LessThanOrEqual => "<=",
            ComparisonOp::GreaterThanOrEqual => ">=",
        }
    }
}

impl fmt::Display for ComparisonOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// A host-side filter on one column.
#[derive(Debug, Clone, PartialEq)]
pub enum TableFilter {
    IsNull,
    IsNotNull,
    And(Vec<TableFilter>),
    Or(Vec<TableFilter>),
    Comparison { op: ComparisonOp, value: Value },
    In(Vec<Value>),
    /// Filter on one field of a struct column.
    StructExtract {
        child_name: String,
        child: Box<TableFilter>,
    },
    /// Filter the host may or may not use; rendered as its child.
    Optional(Box<TableFilter>),
    /// Runtime-computed filter; always evaluated locally.
    Dynamic,
    /// Arbitrary host expression with no SQL rendering.
    Expression(String),
}

impl TableFilter {
    pub fn comparison(op: ComparisonOp, value: Value) -> Self {
        TableFilter::Comparison { op, value }
    }

    pub fn struct_extract(child_name: impl Into<String>, child: TableFilter) -> Self {
        TableFilter::StructExtract {
            child_name: child_name.into(),
            child: Box::new(child),
        }
    }
}

/// Quote an identifier, doubling embedded `"`.
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote a string literal, doubling embedded `'`.
pub fn quote_literal(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

/// Render one value as a SQL literal.
///
/// On the row-id column, integers are unpacked back into a `tid` literal.
pub fn render_literal(value: &Value, is_row_id: bool) -> Result<String> {
    if is_row_id {
        let packed = value.as_i128().ok_or_else(|| {
            ScanError::Unsupported(format!("row id filter on non-integer value {}", value))
        })?;
        if !(0..=MAX_PACKED_ROW_ID).contains(&packed) {
            return Err(ScanError::Unsupported(format!(
                "row id filter value {} is not a packed (page, offset) pair",
                packed
            )));
        }
        let page = packed >> 16;
        let offset = packed & 0xFFFF;
        return Ok(format!("'({},{})'::tid", page, offset));
    }
    match value {
        Value::Null => Ok("NULL".to_string()),
        Value::Blob(_) => Ok(format!("'{}'::BYTEA", value)),
        Value::Enum(_) | Value::List(_) | Value::Struct(_) => Err(ScanError::Unsupported(
            format!("cannot push down a filter on value {}", value),
        )),
        v if v.is_numeric() => Ok(v.to_string()),
        v => Ok(quote_literal(&v.to_string())),
    }
}

/// Render a filter against an already-quoted column expression.
///
/// Returns an empty string when nothing in the filter can be pushed down.
pub fn render_filter(column: &str, filter: &TableFilter, is_row_id: bool) -> Result<String> {
    match filter {
        TableFilter::IsNull => Ok(format!("{} IS NULL", column)),
        TableFilter::IsNotNull => Ok(format!("{} IS NOT NULL", column)),
        TableFilter::And(children) => render_conjunction(column, children, "AND", is_row_id),
        TableFilter::Or(children) => render_conjunction(column, children, "OR", is_row_id),
        TableFilter::Comparison { op, value } => Ok(format!(
            "{} {} {}",
            column,
            op,
            render_literal(value, is_row_id)?
        )),
        TableFilter::In(values) => {
            let literals = values
                .iter()
                .map(|v| render_literal(v, is_row_id))
                .collect::<Result<Vec<_>>>()?;
            Ok(format!("{} IN ({})", column, literals.join(", ")))
        }
        TableFilter::StructExtract { child_name, child } => {
            let extracted = format!("({}).{}", column, quote_identifier(child_name));
            render_filter(&extracted, child, false)
        }
        TableFilter::Optional(child) => render_filter(column, child, is_row_id),
        TableFilter::Dynamic => Ok(String::new()),
        TableFilter::Expression(expr) => Err(ScanError::Internal(format!(
            "unsupported filter type for pushdown: {}",
            expr
        ))),
    }
}

fn render_conjunction(
    column: &str,
    children: &[TableFilter],
    op: &str,
    is_row_id: bool,
) -> Result<String> {
    let mut parts = Vec::with_capacity(children.len());
    for child in children {
        let rendered = render_filter(column, child, is_row_id)?;
        if !rendered.is_empty() {
            parts.push(rendered);
        }
    }
    if parts.is_empty() {
        return Ok(String::new());
    }
    Ok(format!("({})", parts.join(&format!(" {} ", op))))
}

/// Render the filters of a scan, keyed by host column index, as one
/// `AND`-joined condition.
///
/// `resolve` maps a column index to its quoted identifier and whether it is
/// the row-id column.
pub fn render_filters<F>(filters: &BTreeMap<usize, TableFilter>, mut resolve: F) -> Result<String>
where
    F: FnMut(usize) -> Result<(String, bool)>,
{
    let mut parts = Vec::new();
    for (&index, filter) in filters {
        let (column, is_row_id) = resolve(index)?;
        let rendered = render_filter(&column, filter, is_row_id)?;
        if !rendered.is_empty() {
            parts.push(rendered);
        }
    }
    Ok(parts.join(" AND "))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn x() -> String {
        quote_identifier("x")
    }

    #[test]
    fn test_comparison() {
        let f = TableFilter::comparison(ComparisonOp::Equal, Value::Integer(5));
        assert_eq!(render_filter(&x(), &f, false).unwrap(), "\"x\" = 5");

        let f = TableFilter::comparison(ComparisonOp::GreaterThanOrEqual, Value::Double(1.5));
        assert_eq!(render_filter(&x(), &f, false).unwrap(), "\"x\" >= 1.5");
    }

    #[test]
    fn test_string_literals_are_quoted() {
        let f = TableFilter::comparison(ComparisonOp::NotEqual, Value::Varchar("it's".into()));
        assert_eq!(render_filter(&x(), &f, false).unwrap(), "\"x\" <> 'it''s'");
    }

    #[test]
    fn test_blob_literal() {
        let f = TableFilter::comparison(ComparisonOp::Equal, Value::Blob(vec![0xAA, 0x0B]));
        assert_eq!(
            render_filter(&x(), &f, false).unwrap(),
            "\"x\" = '\\xAA0B'::BYTEA"
        );
    }

    #[test]
    fn test_null_checks() {
        assert_eq!(
            render_filter(&x(), &TableFilter::IsNull, false).unwrap(),
            "\"x\" IS NULL"
        );
        assert_eq!(
            render_filter(&x(), &TableFilter::IsNotNull, false).unwrap(),
            "\"x\" IS NOT NULL"
        );
    }

    #[test]
    fn test_in_list() {
        let f = TableFilter::In(vec![Value::Integer(1), Value::Integer(2), Value::Integer(3)]);
        assert_eq!(render_filter(&x(), &f, false).unwrap(), "\"x\" IN (1, 2, 3)");
    }

    #[test]
    fn test_conjunctions() {
        let f = TableFilter::And(vec![
            TableFilter::IsNotNull,
            TableFilter::comparison(ComparisonOp::LessThan, Value::Integer(10)),
        ]);
        assert_eq!(
            render_filter(&x(), &f, false).unwrap(),
            "(\"x\" IS NOT NULL AND \"x\" < 10)"
        );

        let f = TableFilter::Or(vec![TableFilter::Dynamic, TableFilter::IsNull]);
        assert_eq!(render_filter(&x(), &f, false).unwrap(), "(\"x\" IS NULL)");
    }

    #[test]
    fn test_empty_conjunction_renders_empty() {
        let f = TableFilter::And(vec![TableFilter::Dynamic, TableFilter::Dynamic]);
        assert_eq!(render_filter(&x(), &f, false).unwrap(), "");
    }

    #[test]
    fn test_dynamic_is_never_pushed() {
        let f = TableFilter::Optional(Box::new(TableFilter::Or(vec![TableFilter::And(vec![
            TableFilter::struct_extract("a", TableFilter::Dynamic),
        ])])));
        assert_eq!(render_filter(&x(), &f, false).unwrap(), "");
    }

    #[test]
    fn test_struct_extract() {
        let f = TableFilter::struct_extract(
            "lat",
            TableFilter::comparison(ComparisonOp::GreaterThan, Value::Integer(0)),
        );
        assert_eq!(
            render_filter(&quote_identifier("pos"), &f, false).unwrap(),
            "(\"pos\").\"lat\" > 0"
        );
    }

    #[test]
    fn test_row_id_literal() {
        let f = TableFilter::comparison(ComparisonOp::Equal, Value::BigInt(65541));
        assert_eq!(
            render_filter("ctid", &f, true).unwrap(),
            "ctid = '(1,5)'::tid"
        );
    }

    #[test]
    fn test_row_id_out_of_range() {
        let f = TableFilter::comparison(ComparisonOp::Equal, Value::BigInt(-1));
        assert!(matches!(
            render_filter("ctid", &f, true),
            Err(ScanError::Unsupported(_))
        ));
        let f = TableFilter::comparison(ComparisonOp::Equal, Value::BigInt(1 << 48));
        assert!(matches!(
            render_filter("ctid", &f, true),
            Err(ScanError::Unsupported(_))
        ));
        let last = Value::BigInt(((u32::MAX as i64) << 16) | 0xFFFF);
        let f = TableFilter::comparison(ComparisonOp::LessThanOrEqual, last);
        assert_eq!(
            render_filter("ctid", &f, true).unwrap(),
            "ctid <= '(4294967295,65535)'::tid"
        );
    }

    #[test]
    fn test_bc_date_literal() {
        // 44 BC is astronomical year -43
        let epoch = chrono::NaiveDate::from_ymd_opt(1970, 1, 1).unwrap();
        let ides = chrono::NaiveDate::from_ymd_opt(-43, 3, 15).unwrap();
        let date = Value::Date(crate::logical::Date((ides - epoch).num_days() as i32));
        let f = TableFilter::comparison(ComparisonOp::LessThan, date);
        assert_eq!(
            render_filter(&x(), &f, false).unwrap(),
            "\"x\" < '0044-03-15 BC'"
        );
    }

    #[test]
    fn test_expression_is_internal_error() {
        let f = TableFilter::Expression("x + 1 = 2".into());
        assert!(matches!(
            render_filter(&x(), &f, false),
            Err(ScanError::Internal(_))
        ));
    }

    #[test]
    fn test_render_filters_joins_columns() {
        let mut filters = BTreeMap::new();
        filters.insert(0, TableFilter::IsNotNull);
        filters.insert(1, TableFilter::Dynamic);
        filters.insert(
            2,
            TableFilter::comparison(ComparisonOp::Equal, Value::Varchar("b".into())),
        );
        let names = ["a", "skip", "b"];
        let sql = render_filters(&filters, |i| Ok((quote_identifier(names[i]), false))).unwrap();
        assert_eq!(sql, "\"a\" IS NOT NULL AND \"b\" = 'b'");
    }

    #[test]
    fn test_identifier_quoting() {
        assert_eq!(quote_identifier("we\"ird"), "\"we\"\"ird\"");
    }
}
