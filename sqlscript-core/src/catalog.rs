//! Catalog snapshot loading from the `sys.*` views.
//!
//! Each object kind is read with one query over all tables (or a single
//! table when reloading) and attached to its owning [`Table`] by object id.
//! Rows are ordered so that repeated runs against an unchanged database
//! produce identical snapshots.

use std::collections::HashMap;

use tiberius::{Client, FromSql, Row};
use tokio::net::TcpStream;
use tokio_util::compat::Compat;
use tracing::debug;

use crate::Result;
use crate::error::GenerateScriptError;
use crate::models::{
    CheckConstraint, Column, Database, DataSpace, DefaultConstraint, ForeignKey, ForeignKeyColumn,
    FullTextColumn, FullTextIndex, Index, IndexKind, IndexedColumn, ReferentialAction,
    SecondaryXmlIndex, SpatialTessellation, Table,
};

/// Tiberius client over a tokio TCP stream.
pub type SqlClient = Client<Compat<TcpStream>>;

/// Extended property marking tables owned by database tooling.
const TOOLS_SUPPORT_PROPERTY: &str = "microsoft_database_tools_support";

/// Which tables a catalog read covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableFilter {
    All,
    ObjectId(i32),
}

impl TableFilter {
    /// Predicate over the `t` (sys.tables) alias.
    fn clause(self) -> String {
        match self {
            Self::All => "1 = 1".to_string(),
            Self::ObjectId(object_id) => format!("t.object_id = {object_id}"),
        }
    }
}

/// Extension trait for typed column access with enumeration errors.
trait RowExt {
    fn field<'r, T>(&'r self, idx: usize, context: &str) -> Result<Option<T>>
    where
        T: FromSql<'r>;

    fn required<'r, T>(&'r self, idx: usize, context: &str) -> Result<T>
    where
        T: FromSql<'r>,
    {
        self.field(idx, context)?.ok_or_else(|| {
            GenerateScriptError::enumeration(format!("{context}: unexpected NULL in column {idx}"))
        })
    }

    fn text(&self, idx: usize, context: &str) -> Result<String> {
        self.required::<&str>(idx, context).map(str::to_string)
    }

    fn optional_text(&self, idx: usize, context: &str) -> Result<Option<String>> {
        Ok(self.field::<&str>(idx, context)?.map(str::to_string))
    }

    /// `bit` column where NULL reads as false.
    fn flag(&self, idx: usize, context: &str) -> Result<bool> {
        Ok(self.field::<bool>(idx, context)?.unwrap_or(false))
    }
}

impl RowExt for Row {
    fn field<'r, T>(&'r self, idx: usize, context: &str) -> Result<Option<T>>
    where
        T: FromSql<'r>,
    {
        self.try_get::<T, usize>(idx).map_err(|e| {
            GenerateScriptError::enumeration_failed(format!("{context}: column {idx}"), e)
        })
    }
}

/// Tables keyed by object id, in catalog order.
#[derive(Debug, Default)]
struct TableSet {
    tables: Vec<Table>,
    positions: HashMap<i32, usize>,
}

impl TableSet {
    fn new(tables: Vec<Table>) -> Self {
        let positions = tables
            .iter()
            .enumerate()
            .map(|(position, table)| (table.object_id, position))
            .collect();
        Self { tables, positions }
    }

    fn get_mut(&mut self, object_id: i32) -> Option<&mut Table> {
        let position = *self.positions.get(&object_id)?;
        self.tables.get_mut(position)
    }

    fn into_tables(self) -> Vec<Table> {
        self.tables
    }
}

async fn query(client: &mut SqlClient, sql: String, context: &str) -> Result<Vec<Row>> {
    client
        .simple_query(sql)
        .await
        .map_err(|e| GenerateScriptError::enumeration_failed(format!("querying {context}"), e))?
        .into_first_result()
        .await
        .map_err(|e| GenerateScriptError::enumeration_failed(format!("reading {context}"), e))
}

/// Reads the name and default collation of the connected database.
///
/// # Errors
/// Returns a connection error when the session has no current database.
pub(crate) async fn current_database(client: &mut SqlClient) -> Result<(String, Option<String>)> {
    let rows = client
        .simple_query(
            "SELECT DB_NAME(), CONVERT(nvarchar(128), DATABASEPROPERTYEX(DB_NAME(), 'Collation'))",
        )
        .await
        .map_err(|e| GenerateScriptError::connection_failed("resolving database", e))?
        .into_first_result()
        .await
        .map_err(|e| GenerateScriptError::connection_failed("resolving database", e))?;

    let row = rows
        .first()
        .ok_or_else(|| GenerateScriptError::connection("database name query returned no rows"))?;
    let name = row
        .try_get::<&str, usize>(0)
        .map_err(|e| GenerateScriptError::connection_failed("resolving database", e))?
        .ok_or_else(|| GenerateScriptError::connection("connection has no current database"))?
        .to_string();
    let collation = row
        .try_get::<&str, usize>(1)
        .map_err(|e| GenerateScriptError::connection_failed("resolving database", e))?
        .map(str::to_string);

    Ok((name, collation))
}

/// Loads the full catalog snapshot of the connected database.
///
/// # Errors
/// Returns an enumeration error if any catalog query fails.
pub async fn load_database(
    client: &mut SqlClient,
    name: String,
    collation: Option<String>,
) -> Result<Database> {
    let tables = load_tables(client, TableFilter::All).await?;
    debug!("Loaded {} tables from catalog of {}", tables.len(), name);
    Ok(Database {
        name,
        collation,
        tables,
    })
}

/// Loads tables with all their dependent objects.
///
/// # Errors
/// Returns an enumeration error if any catalog query fails.
pub async fn load_tables(client: &mut SqlClient, filter: TableFilter) -> Result<Vec<Table>> {
    let mut set = TableSet::new(query_tables(client, filter).await?);

    load_columns(client, filter, &mut set).await?;
    load_indexes(client, filter, &mut set).await?;
    load_index_columns(client, filter, &mut set).await?;
    load_foreign_keys(client, filter, &mut set).await?;
    load_foreign_key_columns(client, filter, &mut set).await?;
    load_check_constraints(client, filter, &mut set).await?;
    load_default_constraints(client, filter, &mut set).await?;
    load_full_text_indexes(client, filter, &mut set).await?;

    Ok(set.into_tables())
}

async fn query_tables(client: &mut SqlClient, filter: TableFilter) -> Result<Vec<Table>> {
    let sql = format!(
        "SELECT t.object_id, s.name, t.name,
                CAST(CASE WHEN t.is_ms_shipped = 1 OR EXISTS (
                    SELECT 1 FROM sys.extended_properties ep
                    WHERE ep.class = 1 AND ep.major_id = t.object_id AND ep.minor_id = 0
                      AND ep.name = N'{TOOLS_SUPPORT_PROPERTY}')
                THEN 1 ELSE 0 END AS bit),
                ds.type, ds.name, pc.name
         FROM sys.tables t
         JOIN sys.schemas s ON s.schema_id = t.schema_id
         LEFT JOIN sys.indexes i ON i.object_id = t.object_id AND i.index_id IN (0, 1)
         LEFT JOIN sys.data_spaces ds ON ds.data_space_id = i.data_space_id
         LEFT JOIN sys.index_columns ic ON ic.object_id = i.object_id AND ic.index_id = i.index_id
              AND ic.partition_ordinal = 1
         LEFT JOIN sys.columns pc ON pc.object_id = ic.object_id AND pc.column_id = ic.column_id
         WHERE {}
         ORDER BY s.name, t.name",
        filter.clause()
    );

    let mut tables = Vec::new();
    for row in query(client, sql, "tables").await? {
        let mut table = Table::new(row.text(1, "tables")?, row.text(2, "tables")?);
        table.object_id = row.required(0, "tables")?;
        table.is_system_object = row.flag(3, "tables")?;
        table.data_space = data_space(&row, 4, "tables")?;
        tables.push(table);
    }
    Ok(tables)
}

fn data_space(row: &Row, idx: usize, context: &str) -> Result<Option<DataSpace>> {
    let Some(kind) = row.field::<&str>(idx, context)? else {
        return Ok(None);
    };
    let Some(name) = row.optional_text(idx.saturating_add(1), context)? else {
        return Ok(None);
    };
    Ok(DataSpace::from_catalog(
        kind,
        name,
        row.optional_text(idx.saturating_add(2), context)?,
    ))
}

/// Primary index name and usage of a secondary XML index.
fn secondary_xml_index(
    row: &Row,
    idx: usize,
    context: &str,
) -> Result<Option<SecondaryXmlIndex>> {
    let Some(primary_index) = row.optional_text(idx, context)? else {
        return Ok(None);
    };
    Ok(Some(SecondaryXmlIndex {
        primary_index,
        usage: row
            .optional_text(idx.saturating_add(1), context)?
            .unwrap_or_else(|| "PATH".to_string()),
    }))
}

/// Tessellation columns, starting at the scheme.
fn spatial_tessellation(
    row: &Row,
    idx: usize,
    context: &str,
) -> Result<Option<SpatialTessellation>> {
    let Some(scheme) = row.optional_text(idx, context)? else {
        return Ok(None);
    };
    let column = |offset: usize| idx.saturating_add(offset);

    let mut corners = [0.0_f64; 4];
    let mut has_bounding_box = true;
    for (offset, corner) in (1..=4).zip(corners.iter_mut()) {
        match row.field::<f64>(column(offset), context)? {
            Some(value) => *corner = value,
            None => has_bounding_box = false,
        }
    }

    let mut grid_levels = Vec::new();
    for offset in 5..=8 {
        if let Some(level) = row.optional_text(column(offset), context)? {
            grid_levels.push(level);
        }
    }

    Ok(Some(SpatialTessellation {
        scheme,
        bounding_box: has_bounding_box.then_some(corners),
        grid_levels,
        cells_per_object: row.field::<i32>(column(9), context)?,
    }))
}

async fn load_columns(
    client: &mut SqlClient,
    filter: TableFilter,
    set: &mut TableSet,
) -> Result<()> {
    let sql = format!(
        "SELECT c.object_id, c.name, ty.name, bt.name, SCHEMA_NAME(ty.schema_id),
                ty.is_user_defined,
                c.max_length, c.precision, c.scale, c.is_nullable, c.is_identity,
                CONVERT(nvarchar(40), idc.seed_value), CONVERT(nvarchar(40), idc.increment_value),
                c.is_computed, cc.definition, cc.is_persisted, c.collation_name, c.is_rowguidcol
         FROM sys.columns c
         JOIN sys.tables t ON t.object_id = c.object_id
         JOIN sys.types ty ON ty.user_type_id = c.user_type_id
         LEFT JOIN sys.types bt ON bt.user_type_id = c.system_type_id
         LEFT JOIN sys.identity_columns idc
              ON idc.object_id = c.object_id AND idc.column_id = c.column_id
         LEFT JOIN sys.computed_columns cc
              ON cc.object_id = c.object_id AND cc.column_id = c.column_id
         WHERE {}
         ORDER BY c.object_id, c.column_id",
        filter.clause()
    );

    const CONTEXT: &str = "columns";
    for row in query(client, sql, CONTEXT).await? {
        let Some(table) = set.get_mut(row.required(0, CONTEXT)?) else {
            continue;
        };
        let type_name = row.text(2, CONTEXT)?;
        let column = Column {
            name: row.text(1, CONTEXT)?,
            system_type_name: row
                .optional_text(3, CONTEXT)?
                .unwrap_or_else(|| type_name.clone()),
            type_name,
            type_schema: row
                .optional_text(4, CONTEXT)?
                .unwrap_or_else(|| "sys".to_string()),
            is_user_defined_type: row.flag(5, CONTEXT)?,
            max_length: row.required(6, CONTEXT)?,
            precision: row.required(7, CONTEXT)?,
            scale: row.required(8, CONTEXT)?,
            is_nullable: row.flag(9, CONTEXT)?,
            is_identity: row.flag(10, CONTEXT)?,
            identity_seed: row.optional_text(11, CONTEXT)?,
            identity_increment: row.optional_text(12, CONTEXT)?,
            is_computed: row.flag(13, CONTEXT)?,
            computed_definition: row.optional_text(14, CONTEXT)?,
            is_persisted: row.flag(15, CONTEXT)?,
            collation: row.optional_text(16, CONTEXT)?,
            is_rowguidcol: row.flag(17, CONTEXT)?,
        };
        table.columns.push(column);
    }
    Ok(())
}

async fn load_indexes(
    client: &mut SqlClient,
    filter: TableFilter,
    set: &mut TableSet,
) -> Result<()> {
    let sql = format!(
        "SELECT i.object_id, i.name, i.type, i.is_unique, i.is_primary_key,
                i.is_unique_constraint, i.filter_definition, i.fill_factor, i.is_padded,
                i.ignore_dup_key, i.allow_row_locks, i.allow_page_locks,
                ds.type, ds.name, pc.name,
                pxi.name, xi.secondary_type_desc,
                st.tessellation_scheme, st.bounding_box_xmin, st.bounding_box_ymin,
                st.bounding_box_xmax, st.bounding_box_ymax,
                st.level_1_grid_desc, st.level_2_grid_desc, st.level_3_grid_desc,
                st.level_4_grid_desc, st.cells_per_object
         FROM sys.indexes i
         JOIN sys.tables t ON t.object_id = i.object_id
         LEFT JOIN sys.data_spaces ds ON ds.data_space_id = i.data_space_id
         LEFT JOIN sys.index_columns ic ON ic.object_id = i.object_id AND ic.index_id = i.index_id
              AND ic.partition_ordinal = 1
         LEFT JOIN sys.columns pc ON pc.object_id = ic.object_id AND pc.column_id = ic.column_id
         LEFT JOIN sys.xml_indexes xi ON xi.object_id = i.object_id AND xi.index_id = i.index_id
         LEFT JOIN sys.indexes pxi ON pxi.object_id = xi.object_id
              AND pxi.index_id = xi.using_xml_index_id
         LEFT JOIN sys.spatial_index_tessellations st ON st.object_id = i.object_id
              AND st.index_id = i.index_id
         WHERE i.type > 0 AND i.is_hypothetical = 0 AND {}
         ORDER BY i.object_id, i.index_id",
        filter.clause()
    );

    const CONTEXT: &str = "indexes";
    for row in query(client, sql, CONTEXT).await? {
        let Some(table) = set.get_mut(row.required(0, CONTEXT)?) else {
            continue;
        };
        let code: u8 = row.required(2, CONTEXT)?;
        let Some(kind) = IndexKind::from_code(code) else {
            continue;
        };
        let mut index = Index::new(row.text(1, CONTEXT)?, kind);
        index.is_unique = row.flag(3, CONTEXT)?;
        index.is_primary_key = row.flag(4, CONTEXT)?;
        index.is_unique_constraint = row.flag(5, CONTEXT)?;
        index.filter_definition = row.optional_text(6, CONTEXT)?;
        index.fill_factor = row.field(7, CONTEXT)?.unwrap_or(0);
        index.is_padded = row.flag(8, CONTEXT)?;
        index.ignore_dup_key = row.flag(9, CONTEXT)?;
        index.allow_row_locks = row.flag(10, CONTEXT)?;
        index.allow_page_locks = row.flag(11, CONTEXT)?;
        index.data_space = data_space(&row, 12, CONTEXT)?;
        index.secondary_xml = secondary_xml_index(&row, 15, CONTEXT)?;
        index.spatial = spatial_tessellation(&row, 17, CONTEXT)?;
        table.indexes.push(index);
    }
    Ok(())
}

async fn load_index_columns(
    client: &mut SqlClient,
    filter: TableFilter,
    set: &mut TableSet,
) -> Result<()> {
    let sql = format!(
        "SELECT ic.object_id, i.name, c.name, ic.is_descending_key, ic.is_included_column
         FROM sys.index_columns ic
         JOIN sys.indexes i ON i.object_id = ic.object_id AND i.index_id = ic.index_id
         JOIN sys.columns c ON c.object_id = ic.object_id AND c.column_id = ic.column_id
         JOIN sys.tables t ON t.object_id = ic.object_id
         WHERE i.type > 0 AND {}
           AND (ic.key_ordinal > 0 OR ic.is_included_column = 1 OR i.type IN (3, 4, 5, 6))
         ORDER BY ic.object_id, ic.index_id, ic.is_included_column, ic.key_ordinal,
                  ic.index_column_id",
        filter.clause()
    );

    const CONTEXT: &str = "index columns";
    for row in query(client, sql, CONTEXT).await? {
        let Some(table) = set.get_mut(row.required(0, CONTEXT)?) else {
            continue;
        };
        let index_name = row.text(1, CONTEXT)?;
        let Some(index) = table.indexes.iter_mut().find(|index| index.name == index_name) else {
            continue;
        };
        index.columns.push(IndexedColumn {
            name: row.text(2, CONTEXT)?,
            is_descending: row.flag(3, CONTEXT)?,
            is_included: row.flag(4, CONTEXT)?,
        });
    }
    Ok(())
}

async fn load_foreign_keys(
    client: &mut SqlClient,
    filter: TableFilter,
    set: &mut TableSet,
) -> Result<()> {
    let sql = format!(
        "SELECT fk.parent_object_id, fk.name, SCHEMA_NAME(rt.schema_id), rt.name,
                fk.delete_referential_action_desc, fk.update_referential_action_desc,
                fk.is_disabled, fk.is_not_trusted, fk.is_not_for_replication
         FROM sys.foreign_keys fk
         JOIN sys.tables t ON t.object_id = fk.parent_object_id
         JOIN sys.tables rt ON rt.object_id = fk.referenced_object_id
         WHERE {}
         ORDER BY fk.parent_object_id, fk.name",
        filter.clause()
    );

    const CONTEXT: &str = "foreign keys";
    for row in query(client, sql, CONTEXT).await? {
        let Some(table) = set.get_mut(row.required(0, CONTEXT)?) else {
            continue;
        };
        table.foreign_keys.push(ForeignKey {
            name: row.text(1, CONTEXT)?,
            columns: Vec::new(),
            referenced_schema: row.text(2, CONTEXT)?,
            referenced_table: row.text(3, CONTEXT)?,
            on_delete: ReferentialAction::from_desc(row.required(4, CONTEXT)?),
            on_update: ReferentialAction::from_desc(row.required(5, CONTEXT)?),
            is_disabled: row.flag(6, CONTEXT)?,
            is_not_trusted: row.flag(7, CONTEXT)?,
            is_not_for_replication: row.flag(8, CONTEXT)?,
        });
    }
    Ok(())
}

async fn load_foreign_key_columns(
    client: &mut SqlClient,
    filter: TableFilter,
    set: &mut TableSet,
) -> Result<()> {
    let sql = format!(
        "SELECT fk.parent_object_id, fk.name, pc.name, rc.name
         FROM sys.foreign_key_columns fkc
         JOIN sys.foreign_keys fk ON fk.object_id = fkc.constraint_object_id
         JOIN sys.tables t ON t.object_id = fk.parent_object_id
         JOIN sys.columns pc ON pc.object_id = fkc.parent_object_id
              AND pc.column_id = fkc.parent_column_id
         JOIN sys.columns rc ON rc.object_id = fkc.referenced_object_id
              AND rc.column_id = fkc.referenced_column_id
         WHERE {}
         ORDER BY fk.parent_object_id, fk.name, fkc.constraint_column_id",
        filter.clause()
    );

    const CONTEXT: &str = "foreign key columns";
    for row in query(client, sql, CONTEXT).await? {
        let Some(table) = set.get_mut(row.required(0, CONTEXT)?) else {
            continue;
        };
        let name = row.text(1, CONTEXT)?;
        let Some(foreign_key) = table.foreign_keys.iter_mut().find(|fk| fk.name == name) else {
            continue;
        };
        foreign_key
            .columns
            .push(ForeignKeyColumn::new(row.text(2, CONTEXT)?, row.text(3, CONTEXT)?));
    }
    Ok(())
}

async fn load_check_constraints(
    client: &mut SqlClient,
    filter: TableFilter,
    set: &mut TableSet,
) -> Result<()> {
    let sql = format!(
        "SELECT cc.parent_object_id, cc.name, cc.definition,
                cc.is_disabled, cc.is_not_trusted, cc.is_not_for_replication
         FROM sys.check_constraints cc
         JOIN sys.tables t ON t.object_id = cc.parent_object_id
         WHERE {}
         ORDER BY cc.parent_object_id, cc.name",
        filter.clause()
    );

    const CONTEXT: &str = "check constraints";
    for row in query(client, sql, CONTEXT).await? {
        let Some(table) = set.get_mut(row.required(0, CONTEXT)?) else {
            continue;
        };
        table.check_constraints.push(CheckConstraint {
            name: row.text(1, CONTEXT)?,
            definition: row.text(2, CONTEXT)?,
            is_disabled: row.flag(3, CONTEXT)?,
            is_not_trusted: row.flag(4, CONTEXT)?,
            is_not_for_replication: row.flag(5, CONTEXT)?,
        });
    }
    Ok(())
}

async fn load_default_constraints(
    client: &mut SqlClient,
    filter: TableFilter,
    set: &mut TableSet,
) -> Result<()> {
    let sql = format!(
        "SELECT dc.parent_object_id, dc.name, c.name, dc.definition
         FROM sys.default_constraints dc
         JOIN sys.tables t ON t.object_id = dc.parent_object_id
         JOIN sys.columns c ON c.object_id = dc.parent_object_id
              AND c.column_id = dc.parent_column_id
         WHERE {}
         ORDER BY dc.parent_object_id, c.column_id",
        filter.clause()
    );

    const CONTEXT: &str = "default constraints";
    for row in query(client, sql, CONTEXT).await? {
        let Some(table) = set.get_mut(row.required(0, CONTEXT)?) else {
            continue;
        };
        table.default_constraints.push(DefaultConstraint {
            name: row.text(1, CONTEXT)?,
            column: row.text(2, CONTEXT)?,
            definition: row.text(3, CONTEXT)?,
        });
    }
    Ok(())
}

async fn load_full_text_indexes(
    client: &mut SqlClient,
    filter: TableFilter,
    set: &mut TableSet,
) -> Result<()> {
    let sql = format!(
        "SELECT fi.object_id, fc.name, ki.name, fi.change_tracking_state_desc
         FROM sys.fulltext_indexes fi
         JOIN sys.tables t ON t.object_id = fi.object_id
         JOIN sys.fulltext_catalogs fc ON fc.fulltext_catalog_id = fi.fulltext_catalog_id
         JOIN sys.indexes ki ON ki.object_id = fi.object_id AND ki.index_id = fi.unique_index_id
         WHERE {}",
        filter.clause()
    );

    const CONTEXT: &str = "full-text indexes";
    for row in query(client, sql, CONTEXT).await? {
        let Some(table) = set.get_mut(row.required(0, CONTEXT)?) else {
            continue;
        };
        table.full_text_index = Some(FullTextIndex {
            catalog: row.text(1, CONTEXT)?,
            key_index: row.text(2, CONTEXT)?,
            change_tracking: row.optional_text(3, CONTEXT)?.unwrap_or_default(),
            columns: Vec::new(),
        });
    }

    let sql = format!(
        "SELECT fic.object_id, c.name, fic.language_id
         FROM sys.fulltext_index_columns fic
         JOIN sys.tables t ON t.object_id = fic.object_id
         JOIN sys.columns c ON c.object_id = fic.object_id AND c.column_id = fic.column_id
         WHERE {}
         ORDER BY fic.object_id, fic.column_id",
        filter.clause()
    );

    const COLUMN_CONTEXT: &str = "full-text index columns";
    for row in query(client, sql, COLUMN_CONTEXT).await? {
        let Some(table) = set.get_mut(row.required(0, COLUMN_CONTEXT)?) else {
            continue;
        };
        if let Some(full_text) = table.full_text_index.as_mut() {
            full_text.columns.push(FullTextColumn {
                name: row.text(1, COLUMN_CONTEXT)?,
                language_id: row.field(2, COLUMN_CONTEXT)?,
            });
        }
    }
    Ok(())
}
