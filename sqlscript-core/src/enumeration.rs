//! Selection of scriptable objects from a catalog snapshot.
//!
//! The functions here are pure: skipped objects are returned as
//! [`SkipEvent`] values for the caller to log, so the selection rules can be
//! tested without a live server.

use std::fmt;

use tracing::info;

use crate::Result;
use crate::error::GenerateScriptError;
use crate::models::{Database, ObjectId, Table};

/// Table whose indexes and foreign keys belong to diagram tooling.
pub const DIAGRAM_SUPPORT_TABLE: &str = "sysdiagrams";

/// Object left out of the script; not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipEvent {
    IndexWithoutColumns { table: String, index: String },
    ForeignKeyWithoutColumns { table: String, foreign_key: String },
}

impl fmt::Display for SkipEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IndexWithoutColumns { table, index } => {
                write!(f, "Failed to add index for Table {table}, Index {index}")
            }
            Self::ForeignKeyWithoutColumns { table, foreign_key } => write!(
                f,
                "Failed to add Foreign Key for Table {table}, Foreign Key {foreign_key}"
            ),
        }
    }
}

/// Ordered object list plus the objects that were skipped.
#[derive(Debug, Clone, Default)]
pub struct Enumeration {
    /// Tables, then indexes, then foreign keys
    pub objects: Vec<ObjectId>,
    pub skipped: Vec<SkipEvent>,
    pub table_count: usize,
    pub index_count: usize,
    pub foreign_key_count: usize,
}

/// Identifiers of all non-system tables in catalog order.
///
/// # Errors
/// Returns an enumeration error when no database was resolved.
pub fn get_tables(database: Option<&Database>) -> Result<Vec<ObjectId>> {
    let database = database
        .ok_or_else(|| GenerateScriptError::enumeration("database handle is not available"))?;

    Ok(database
        .tables
        .iter()
        .filter(|table| !table.is_system_object)
        .map(|table| ObjectId::table(&table.schema, &table.name))
        .collect())
}

/// Identifiers of indexes that have at least one indexed column.
pub fn get_indexes(database: &Database) -> (Vec<ObjectId>, Vec<SkipEvent>) {
    let mut objects = Vec::new();
    let mut skipped = Vec::new();

    for table in database.tables.iter().filter(|table| is_candidate(table)) {
        for index in &table.indexes {
            if index.columns.is_empty() {
                skipped.push(SkipEvent::IndexWithoutColumns {
                    table: table.name.clone(),
                    index: index.name.clone(),
                });
            } else {
                objects.push(ObjectId::index(&table.schema, &table.name, &index.name));
            }
        }
    }

    (objects, skipped)
}

/// Identifiers of foreign keys that reference at least one column.
pub fn get_foreign_keys(database: &Database) -> (Vec<ObjectId>, Vec<SkipEvent>) {
    let mut objects = Vec::new();
    let mut skipped = Vec::new();

    for table in database.tables.iter().filter(|table| is_candidate(table)) {
        for foreign_key in &table.foreign_keys {
            if foreign_key.columns.is_empty() {
                skipped.push(SkipEvent::ForeignKeyWithoutColumns {
                    table: table.name.clone(),
                    foreign_key: foreign_key.name.clone(),
                });
            } else {
                objects.push(ObjectId::foreign_key(
                    &table.schema,
                    &table.name,
                    &foreign_key.name,
                ));
            }
        }
    }

    (objects, skipped)
}

/// Collects tables, then indexes, then foreign keys.
///
/// Skipped objects are returned, not logged.
///
/// # Errors
/// Returns an enumeration error when no database was resolved.
pub fn enumerate_objects(database: Option<&Database>) -> Result<Enumeration> {
    info!("Getting tables");
    let tables = get_tables(database)?;
    let database = database
        .ok_or_else(|| GenerateScriptError::enumeration("database handle is not available"))?;

    info!("Getting indexes");
    let (indexes, mut skipped) = get_indexes(database);
    info!("Getting foreign keys");
    let (foreign_keys, foreign_key_skips) = get_foreign_keys(database);
    skipped.extend(foreign_key_skips);

    let mut enumeration = Enumeration {
        table_count: tables.len(),
        index_count: indexes.len(),
        foreign_key_count: foreign_keys.len(),
        objects: tables,
        skipped,
    };
    enumeration.objects.extend(indexes);
    enumeration.objects.extend(foreign_keys);

    Ok(enumeration)
}

fn is_candidate(table: &Table) -> bool {
    !table.is_system_object && !table.name.eq_ignore_ascii_case(DIAGRAM_SUPPORT_TABLE)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::models::{ForeignKey, ForeignKeyColumn, Index, IndexKind, IndexedColumn};

    fn customers() -> Table {
        let mut table = Table::new("dbo", "Customers");
        let mut email = Index::new("IX_Customers_Email", IndexKind::NonClustered);
        email.columns.push(IndexedColumn::key("Email"));
        table.indexes.push(email);
        table.indexes.push(Index::new("IX_Empty", IndexKind::NonClustered));
        table.foreign_keys.push(ForeignKey {
            name: "FK_Customers_Region".to_string(),
            columns: vec![ForeignKeyColumn::new("RegionId", "Id")],
            referenced_schema: "dbo".to_string(),
            referenced_table: "Region".to_string(),
            ..Default::default()
        });
        table.foreign_keys.push(ForeignKey {
            name: "FK_Empty".to_string(),
            ..Default::default()
        });
        table
    }

    fn diagrams(name: &str) -> Table {
        let mut table = Table::new("dbo", name);
        let mut index = Index::new("UK_principal_name", IndexKind::NonClustered);
        index.columns.push(IndexedColumn::key("principal_id"));
        table.indexes.push(index);
        table
    }

    #[test]
    fn test_get_tables_requires_database() {
        let error = get_tables(None).unwrap_err();
        assert!(matches!(error, GenerateScriptError::Enumeration { .. }));
    }

    #[test]
    fn test_get_tables_excludes_system_objects() {
        let mut database = Database::new("shop");
        database.tables.push(customers());
        let mut system = Table::new("sys", "trace_xe_action_map");
        system.is_system_object = true;
        database.tables.push(system);

        let tables = get_tables(Some(&database)).unwrap();
        assert_eq!(tables, vec![ObjectId::table("dbo", "Customers")]);
    }

    #[test]
    fn test_get_indexes_skips_columnless_indexes() {
        let mut database = Database::new("shop");
        database.tables.push(customers());

        let (indexes, skipped) = get_indexes(&database);
        assert_eq!(
            indexes,
            vec![ObjectId::index("dbo", "Customers", "IX_Customers_Email")]
        );
        assert_eq!(
            skipped,
            vec![SkipEvent::IndexWithoutColumns {
                table: "Customers".to_string(),
                index: "IX_Empty".to_string(),
            }]
        );
        assert_eq!(
            skipped[0].to_string(),
            "Failed to add index for Table Customers, Index IX_Empty"
        );
    }

    #[test]
    fn test_get_foreign_keys_skips_columnless_keys() {
        let mut database = Database::new("shop");
        database.tables.push(customers());

        let (foreign_keys, skipped) = get_foreign_keys(&database);
        assert_eq!(
            foreign_keys,
            vec![ObjectId::foreign_key("dbo", "Customers", "FK_Customers_Region")]
        );
        assert_eq!(
            skipped[0].to_string(),
            "Failed to add Foreign Key for Table Customers, Foreign Key FK_Empty"
        );
    }

    #[test]
    fn test_diagram_table_is_excluded_case_insensitively() {
        let mut database = Database::new("shop");
        database.tables.push(diagrams("sysdiagrams"));
        database.tables.push(diagrams("SysDiagrams"));

        let (indexes, skipped) = get_indexes(&database);
        assert!(indexes.is_empty());
        assert!(skipped.is_empty());

        // The table itself is still scripted when it is not flagged as system.
        assert_eq!(get_tables(Some(&database)).unwrap().len(), 2);
    }

    #[test]
    fn test_enumerate_objects_orders_groups() {
        let mut region = Table::new("dbo", "Region");
        let mut pk = Index::new("PK_Region", IndexKind::Clustered);
        pk.is_primary_key = true;
        pk.columns.push(IndexedColumn::key("Id"));
        region.indexes.push(pk);

        let mut database = Database::new("shop");
        database.tables.push(customers());
        database.tables.push(region);

        let enumeration = enumerate_objects(Some(&database)).unwrap();
        assert_eq!(
            enumeration.objects,
            vec![
                ObjectId::table("dbo", "Customers"),
                ObjectId::table("dbo", "Region"),
                ObjectId::index("dbo", "Customers", "IX_Customers_Email"),
                ObjectId::index("dbo", "Region", "PK_Region"),
                ObjectId::foreign_key("dbo", "Customers", "FK_Customers_Region"),
            ]
        );
        assert_eq!(enumeration.table_count, 2);
        assert_eq!(enumeration.index_count, 2);
        assert_eq!(enumeration.foreign_key_count, 1);
        assert_eq!(enumeration.skipped.len(), 2);
    }

    #[test]
    fn test_enumerate_empty_database() {
        let enumeration = enumerate_objects(Some(&Database::new("empty"))).unwrap();
        assert!(enumeration.objects.is_empty());
        assert!(enumeration.skipped.is_empty());
    }
}
