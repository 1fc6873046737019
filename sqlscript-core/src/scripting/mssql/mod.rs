//! SQL Server scripting engine.
//!
//! Schema statements are rendered from the catalog snapshot by [`ddl`];
//! table data is read over the live connection and rendered by [`data`].

use std::borrow::Cow;

use async_trait::async_trait;
use tiberius::Row;
use tracing::debug;

use crate::Result;
use crate::connection::SqlServerConnection;
use crate::error::GenerateScriptError;
use crate::models::{Database, ObjectId, Table};
use crate::options::ScriptOptions;

use super::ScriptEngine;

pub mod data;
pub mod ddl;

use data::{CellValue, LiteralKind, ProjectedColumn};

/// Brackets an identifier, doubling any closing bracket.
///
/// # Example
/// ```rust
/// use sqlscript_core::scripting::mssql::quote_identifier;
///
/// assert_eq!(quote_identifier("Order Details"), "[Order Details]");
/// assert_eq!(quote_identifier("a]b"), "[a]]b]");
/// ```
pub fn quote_identifier(name: &str) -> String {
    format!("[{}]", name.replace(']', "]]"))
}

/// `[schema].[name]`
pub fn qualified_name(schema: &str, name: &str) -> String {
    format!("{}.{}", quote_identifier(schema), quote_identifier(name))
}

/// `N'...'` string literal with embedded quotes doubled.
pub fn quote_unicode(value: &str) -> String {
    format!("N'{}'", value.replace('\'', "''"))
}

/// Snapshot table the object belongs to.
///
/// # Errors
/// Returns a script generation error when the table is not in the snapshot.
pub fn find_table<'d>(database: &'d Database, object: &ObjectId) -> Result<&'d Table> {
    let (schema, name) = object.table_key();
    database
        .table(schema, name)
        .ok_or_else(|| GenerateScriptError::script(format!("object {object} was not found")))
}

/// Schema statements for one object of `table`, table data excluded.
///
/// A full-text index follows the statement that creates its key index: the
/// table script when the key is an inline constraint, the key index's own
/// script otherwise.
///
/// # Errors
/// Fails when the index or foreign key is not on the table, or when the
/// DDL renderers reject the object.
pub fn schema_statements(
    table: &Table,
    object: &ObjectId,
    database_collation: Option<&str>,
    options: &ScriptOptions,
) -> Result<Vec<String>> {
    let not_found = || GenerateScriptError::script(format!("object {object} was not found"));
    let full_text = table
        .full_text_index
        .as_ref()
        .filter(|_| options.full_text_indexes);

    match object {
        ObjectId::Table { .. } => {
            if !options.script_schema {
                return Ok(Vec::new());
            }
            let mut statements = ddl::table_statements(table, database_collation, options)?;
            if let Some(full_text) = full_text
                && ddl::full_text_key_is_inline(table, full_text, options)
            {
                statements.extend(ddl::full_text_statements(table, full_text));
            }
            Ok(statements)
        }
        ObjectId::Index { name, .. } => {
            let index = table.index(name).ok_or_else(not_found)?;
            if !options.script_schema {
                return Ok(Vec::new());
            }
            let mut statements = ddl::index_statements(table, index, options)?;
            if let Some(full_text) = full_text
                && full_text.key_index == index.name
                && !ddl::full_text_key_is_inline(table, full_text, options)
            {
                statements.extend(ddl::full_text_statements(table, full_text));
            }
            Ok(statements)
        }
        ObjectId::ForeignKey { name, .. } => {
            let foreign_key = table.foreign_key(name).ok_or_else(not_found)?;
            if !options.script_schema || !options.dri_foreign_keys {
                return Ok(Vec::new());
            }
            Ok(ddl::foreign_key_statements(table, foreign_key))
        }
    }
}

/// Engine scripting objects of one connected database.
pub struct SqlServerScriptEngine<'a> {
    connection: &'a mut SqlServerConnection,
    database: &'a Database,
}

impl<'a> SqlServerScriptEngine<'a> {
    pub fn new(connection: &'a mut SqlServerConnection, database: &'a Database) -> Self {
        Self {
            connection,
            database,
        }
    }

    /// Table from the snapshot, or re-read from the catalog when objects are
    /// not prefetched.
    async fn resolve_table(
        &mut self,
        object: &ObjectId,
        options: &ScriptOptions,
    ) -> Result<Cow<'a, Table>> {
        let database: &'a Database = self.database;
        let table = find_table(database, object)?;

        if options.prefetch_objects {
            return Ok(Cow::Borrowed(table));
        }

        debug!("Reloading {}", qualified_name(&table.schema, &table.name));
        self.connection
            .load_table(table.object_id)
            .await?
            .map(Cow::Owned)
            .ok_or_else(|| {
                GenerateScriptError::script(format!("object {object} no longer exists"))
            })
    }

    /// `INSERT` statements for every row of the table.
    async fn script_data(&mut self, table: &Table) -> Result<Vec<String>> {
        let projection = data::insert_projection(table);
        let rows = self.read_rows(table, &projection).await?;
        debug!(
            "Read {} rows from {}",
            rows.len(),
            qualified_name(&table.schema, &table.name)
        );
        Ok(data::insert_statements(table, &projection, &rows))
    }

    async fn read_rows(
        &mut self,
        table: &Table,
        projection: &[ProjectedColumn],
    ) -> Result<Vec<Vec<CellValue>>> {
        let Some(sql) = data::select_statement(table, projection) else {
            return Ok(Vec::new());
        };
        let target = qualified_name(&table.schema, &table.name);

        let rows = self
            .connection
            .client()
            .simple_query(sql)
            .await
            .map_err(|e| read_failed(&target, e))?
            .into_first_result()
            .await
            .map_err(|e| read_failed(&target, e))?;

        rows.iter()
            .map(|row| {
                decode_row(row, projection).map_err(|e| {
                    GenerateScriptError::script_failed(format!("decoding data of {target}"), e)
                })
            })
            .collect()
    }
}

fn read_failed(target: &str, e: tiberius::error::Error) -> GenerateScriptError {
    GenerateScriptError::script_failed(format!("reading data of {target}"), e)
}

/// Reads one cell per projected column.
fn decode_row(row: &Row, projection: &[ProjectedColumn]) -> tiberius::Result<Vec<CellValue>> {
    projection
        .iter()
        .enumerate()
        .map(|(idx, column)| decode_cell(row, idx, column.kind))
        .collect()
}

fn decode_cell(row: &Row, idx: usize, kind: LiteralKind) -> tiberius::Result<CellValue> {
    let value = match kind {
        LiteralKind::Integer => row.try_get::<i64, _>(idx)?.map(CellValue::Integer),
        LiteralKind::Bit => row.try_get::<bool, _>(idx)?.map(CellValue::Bit),
        LiteralKind::Float => row.try_get::<f64, _>(idx)?.map(CellValue::Float),
        LiteralKind::Real => row.try_get::<f32, _>(idx)?.map(CellValue::Real),
        LiteralKind::Binary => row
            .try_get::<&[u8], _>(idx)?
            .map(|bytes| CellValue::Bytes(bytes.to_vec())),
        LiteralKind::Decimal { .. }
        | LiteralKind::Money
        | LiteralKind::Temporal(_)
        | LiteralKind::Unicode
        | LiteralKind::Ansi => row
            .try_get::<&str, _>(idx)?
            .map(|text| CellValue::Text(text.to_string())),
    };
    Ok(value.unwrap_or(CellValue::Null))
}

#[async_trait]
impl ScriptEngine for SqlServerScriptEngine<'_> {
    async fn script_object(
        &mut self,
        object: &ObjectId,
        options: &ScriptOptions,
    ) -> Result<Vec<String>> {
        let table = self.resolve_table(object, options).await?;
        let mut statements =
            schema_statements(&table, object, self.database.collation.as_deref(), options)?;

        if matches!(object, ObjectId::Table { .. }) && options.script_data {
            statements.extend(self.script_data(&table).await?);
        }
        Ok(statements)
    }

    fn database_name(&self) -> &str {
        &self.database.name
    }
}
