//! Scan binding and query construction.
//!
//! A [`ScanBinding`] is built once per scan from the remote table's columns.
//! A [`ScanQuery`] adds the projection, pushed-down filters and limit, renders
//! the SQL and opens the matching reader through [`open_reader`].

use std::collections::BTreeMap;

use tracing::{debug, info};

use crate::batch::ColumnarBatch;
use crate::config::{ResultFormat, ScanConfig};
use crate::error::{Result, ScanError};
use crate::filter::{quote_identifier, render_filters, TableFilter};
use crate::logical::LogicalType;
use crate::pg::{PgVersion, RemoteConnection, RemoteTypeDescriptor};
use crate::reader::{BinaryResultReader, ResultReader, TextResultReader};
use crate::type_bridge::{
    resolve_type, ResolveOptions, ResolvedType, TypeAnnotation, TypeHint, TypeLookup,
};

/// Host column index of the physical row identifier.
pub const ROW_ID_INDEX: usize = usize::MAX;

/// Remote name of the row identifier pseudo column.
pub const ROW_ID_COLUMN: &str = "ctid";

/// One remote column as seen by the host.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnBinding {
    /// Position in the remote table, [`ROW_ID_INDEX`] for the row id.
    pub source_index: usize,
    pub name: String,
    pub resolved: ResolvedType,
}

impl ColumnBinding {
    pub fn new(source_index: usize, name: impl Into<String>, resolved: ResolvedType) -> Self {
        Self {
            source_index,
            name: name.into(),
            resolved,
        }
    }

    pub fn row_id() -> Self {
        Self::new(ROW_ID_INDEX, ROW_ID_COLUMN, ResolvedType::row_id())
    }

    pub fn is_row_id(&self) -> bool {
        self.source_index == ROW_ID_INDEX
    }

    /// Quoted identifier used in filters.
    pub fn identifier(&self) -> String {
        if self.is_row_id() {
            ROW_ID_COLUMN.to_string()
        } else {
            quote_identifier(&self.name)
        }
    }

    /// Expression in the SELECT list. Columns the host cannot decode are
    /// cast to text on the server.
    pub fn select_expression(&self) -> String {
        let ident = self.identifier();
        match varchar_cast(&self.resolved.logical_type, &self.resolved.annotation) {
            Some(cast) => format!("{}{}", ident, cast),
            None => ident,
        }
    }
}

fn varchar_cast(ty: &LogicalType, annotation: &TypeAnnotation) -> Option<&'static str> {
    if annotation.hint == TypeHint::CastToVarchar {
        return Some("::VARCHAR");
    }
    // arrays of undecodable elements cast element-wise; the remote array
    // type carries no dimension count
    match (ty.list_child(), annotation.children.first()) {
        (Some(child), Some(child_ann)) => varchar_cast(child, child_ann).map(|_| "::VARCHAR[]"),
        _ => None,
    }
}

/// Bind-time state of one remote table scan.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanBinding {
    pub schema: Option<String>,
    pub table: String,
    /// Columns in remote table order.
    pub columns: Vec<ColumnBinding>,
}

impl ScanBinding {
    pub fn new(schema: Option<String>, table: impl Into<String>) -> Self {
        Self {
            schema,
            table: table.into(),
            columns: Vec::new(),
        }
    }

    /// Bind every remote column, resolving its type.
    pub fn bind(
        schema: Option<String>,
        table: impl Into<String>,
        remote_columns: &[(String, RemoteTypeDescriptor)],
        lookup: Option<&dyn TypeLookup>,
        options: &ResolveOptions,
    ) -> Self {
        let mut binding = Self::new(schema, table);
        for (name, desc) in remote_columns {
            let resolved = resolve_type(desc, lookup, options);
            binding.push_column(name.clone(), resolved);
        }
        binding
    }

    pub fn push_column(&mut self, name: impl Into<String>, resolved: ResolvedType) {
        let index = self.columns.len();
        self.columns.push(ColumnBinding::new(index, name, resolved));
    }

    /// Column by host index; [`ROW_ID_INDEX`] yields the row id.
    pub fn column(&self, index: usize) -> Option<ColumnBinding> {
        if index == ROW_ID_INDEX {
            return Some(ColumnBinding::row_id());
        }
        self.columns.get(index).cloned()
    }

    /// `"schema"."table"`.
    pub fn qualified_name(&self) -> String {
        match &self.schema {
            Some(schema) => format!("{}.{}", quote_identifier(schema), quote_identifier(&self.table)),
            None => quote_identifier(&self.table),
        }
    }
}

/// One query against a bound table.
#[derive(Debug, Clone)]
pub struct ScanQuery<'a> {
    binding: &'a ScanBinding,
    projection: Vec<usize>,
    filters: BTreeMap<usize, TableFilter>,
    limit: Option<u64>,
    offset: Option<u64>,
}

impl<'a> ScanQuery<'a> {
    /// Query projecting every bound column.
    pub fn new(binding: &'a ScanBinding) -> Self {
        Self {
            binding,
            projection: (0..binding.columns.len()).collect(),
            filters: BTreeMap::new(),
            limit: None,
            offset: None,
        }
    }

    /// Host column indices to produce, in output order. An empty projection
    /// reads the row id only.
    pub fn project(mut self, columns: Vec<usize>) -> Self {
        self.projection = columns;
        self
    }

    /// Push down a filter on host column `index`.
    pub fn filter(mut self, index: usize, filter: TableFilter) -> Self {
        self.filters.insert(index, filter);
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    fn projected(&self) -> Result<Vec<ColumnBinding>> {
        if self.projection.is_empty() {
            return Ok(vec![ColumnBinding::row_id()]);
        }
        self.projection
            .iter()
            .map(|&index| {
                self.binding.column(index).ok_or_else(|| {
                    ScanError::Internal(format!(
                        "projected column {} is not bound on {}",
                        index,
                        self.binding.qualified_name()
                    ))
                })
            })
            .collect()
    }

    /// Resolved types of the output columns, in output order.
    pub fn projected_types(&self) -> Result<Vec<ResolvedType>> {
        Ok(self.projected()?.into_iter().map(|c| c.resolved).collect())
    }

    /// An empty batch shaped like the output.
    pub fn new_batch(&self, config: &ScanConfig) -> Result<ColumnarBatch> {
        let types: Vec<LogicalType> = self
            .projected_types()?
            .into_iter()
            .map(|r| r.logical_type)
            .collect();
        Ok(ColumnarBatch::new(&types, config.vector_size))
    }

    /// Pushed-down condition, empty when nothing can be pushed.
    pub fn where_clause(&self) -> Result<String> {
        render_filters(&self.filters, |index| {
            let column = self.binding.column(index).ok_or_else(|| {
                ScanError::Internal(format!("filter on unbound column {}", index))
            })?;
            Ok((column.identifier(), column.is_row_id()))
        })
    }

    /// The plain `SELECT` used by the text reader.
    pub fn select_sql(&self) -> Result<String> {
        let columns = self
            .projected()?
            .iter()
            .map(ColumnBinding::select_expression)
            .collect::<Vec<_>>()
            .join(", ");
        let mut sql = format!("SELECT {} FROM {}", columns, self.binding.qualified_name());
        let condition = self.where_clause()?;
        if !condition.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&condition);
        }
        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }
        if let Some(offset) = self.offset {
            sql.push_str(&format!(" OFFSET {}", offset));
        }
        Ok(sql)
    }

    /// The binary `COPY` used by the binary reader.
    pub fn copy_sql(&self) -> Result<String> {
        Ok(format!(
            "COPY ({}) TO STDOUT (FORMAT \"binary\")",
            self.select_sql()?
        ))
    }
}

/// Pick the wire format for a connection.
pub fn choose_format(config: &ScanConfig, server_version: Option<&str>) -> ResultFormat {
    match config.format {
        ResultFormat::Auto => match server_version.map(PgVersion::parse) {
            Some(version) if !version.is_postgres() => ResultFormat::Text,
            _ => ResultFormat::Binary,
        },
        format => format,
    }
}

/// Issue the scan query and return a reader positioned at the first row.
pub fn open_reader<'c, C>(
    conn: C,
    query: &ScanQuery<'_>,
    config: &ScanConfig,
) -> Result<Box<dyn ResultReader + 'c>>
where
    C: RemoteConnection + 'c,
{
    config.validate()?;
    let format = choose_format(config, conn.server_version());
    let types = query.projected_types()?;
    let (mut reader, sql): (Box<dyn ResultReader + 'c>, String) = match format {
        ResultFormat::Text => (Box::new(TextResultReader::new(conn, types)), query.select_sql()?),
        _ => (Box::new(BinaryResultReader::new(conn, types)), query.copy_sql()?),
    };
    debug!(sql = %sql, ?format, "Issuing scan query");
    if config.debug_show_queries {
        info!("{}", sql);
    }
    reader.begin_copy(&sql)?;
    Ok(reader)
}
