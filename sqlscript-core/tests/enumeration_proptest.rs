//! Property-based tests for object enumeration and script assembly
//!
//! Random catalogs check that objects come out tables first, then indexes,
//! then foreign keys, and that diagram support tables and column-less
//! objects never reach the script.

#![allow(clippy::unwrap_used)]

use futures::executor::block_on;
use futures::stream;
use proptest::prelude::*;
use sqlscript_core::models::{
    ForeignKey, ForeignKeyColumn, Index, IndexKind, IndexedColumn, Table,
};
use sqlscript_core::{Database, ExclusionRules, ObjectId, assemble_script, enumerate_objects};

/// Generate a random table name, occasionally the diagram support table
fn arb_table_name() -> impl Strategy<Value = String> {
    prop_oneof![
        8 => "[A-Za-z][A-Za-z0-9_]{0,12}",
        1 => Just("sysdiagrams".to_string()),
    ]
}

/// Generate a random index, possibly without columns
fn arb_index() -> impl Strategy<Value = Index> {
    ("IX_[A-Za-z0-9]{1,8}", 0usize..3, any::<bool>()).prop_map(|(name, columns, clustered)| {
        let kind = if clustered {
            IndexKind::Clustered
        } else {
            IndexKind::NonClustered
        };
        let mut index = Index::new(name, kind);
        for idx in 0..columns {
            index.columns.push(IndexedColumn::key(format!("c{idx}")));
        }
        index
    })
}

/// Generate a random foreign key, possibly without columns
fn arb_foreign_key() -> impl Strategy<Value = ForeignKey> {
    ("FK_[A-Za-z0-9]{1,8}", 0usize..3).prop_map(|(name, columns)| ForeignKey {
        name,
        columns: (0..columns)
            .map(|idx| ForeignKeyColumn::new(format!("c{idx}"), "Id"))
            .collect(),
        referenced_schema: "dbo".to_string(),
        referenced_table: "Parent".to_string(),
        ..Default::default()
    })
}

/// Generate a random table
fn arb_table() -> impl Strategy<Value = Table> {
    (
        arb_table_name(),
        any::<bool>(),
        prop::collection::vec(arb_index(), 0..4),
        prop::collection::vec(arb_foreign_key(), 0..3),
    )
        .prop_map(|(name, is_system_object, indexes, foreign_keys)| {
            let mut table = Table::new("dbo", name);
            table.is_system_object = is_system_object;
            table.indexes = indexes;
            table.foreign_keys = foreign_keys;
            table
        })
}

/// Generate a random catalog
fn arb_database() -> impl Strategy<Value = Database> {
    prop::collection::vec(arb_table(), 0..6).prop_map(|mut tables| {
        // Keep user table names unique so lookups by name are unambiguous.
        for (idx, table) in tables.iter_mut().enumerate() {
            if table.name != "sysdiagrams" {
                table.name = format!("{}_{idx}", table.name);
            }
        }
        let mut database = Database::new("test_db");
        database.tables = tables;
        database
    })
}

fn rank(object: &ObjectId) -> u8 {
    match object {
        ObjectId::Table { .. } => 0,
        ObjectId::Index { .. } => 1,
        ObjectId::ForeignKey { .. } => 2,
    }
}

proptest! {
    /// Objects are grouped tables, then indexes, then foreign keys
    #[test]
    fn prop_objects_are_grouped_by_kind(database in arb_database()) {
        let enumeration = enumerate_objects(Some(&database)).unwrap();
        let ranks: Vec<u8> = enumeration.objects.iter().map(rank).collect();
        prop_assert!(ranks.windows(2).all(|pair| pair[0] <= pair[1]));

        prop_assert_eq!(
            enumeration.objects.len(),
            [enumeration.table_count, enumeration.index_count, enumeration.foreign_key_count]
                .iter()
                .sum::<usize>()
        );
    }

    /// System tables never appear; table order follows the catalog
    #[test]
    fn prop_tables_follow_catalog_order(database in arb_database()) {
        let enumeration = enumerate_objects(Some(&database)).unwrap();
        let expected: Vec<ObjectId> = database
            .tables
            .iter()
            .filter(|table| !table.is_system_object)
            .map(|table| ObjectId::table(&table.schema, &table.name))
            .collect();
        prop_assert_eq!(&enumeration.objects[..enumeration.table_count], &expected[..]);
    }

    /// Diagram support tables contribute no indexes or foreign keys
    #[test]
    fn prop_sysdiagrams_never_contributes(database in arb_database()) {
        let enumeration = enumerate_objects(Some(&database)).unwrap();
        for object in &enumeration.objects[enumeration.table_count..] {
            let (_, table) = object.table_key();
            prop_assert_ne!(table, "sysdiagrams");
        }
    }

    /// Every column-less index or foreign key is reported as skipped
    #[test]
    fn prop_column_less_objects_are_skipped(database in arb_database()) {
        let enumeration = enumerate_objects(Some(&database)).unwrap();

        let candidates = database.tables.iter().filter(|table| {
            !table.is_system_object && table.name != "sysdiagrams"
        });
        let expected_skips: usize = candidates
            .map(|table| {
                let indexes = table.indexes.iter().filter(|index| index.columns.is_empty());
                let foreign_keys = table.foreign_keys.iter().filter(|fk| fk.columns.is_empty());
                indexes.count().saturating_add(foreign_keys.count())
            })
            .sum();
        prop_assert_eq!(enumeration.skipped.len(), expected_skips);

        for object in &enumeration.objects {
            let (schema, name) = object.table_key();
            let table = database.table(schema, name).unwrap();
            match object {
                ObjectId::Index { name, .. } => {
                    prop_assert!(table
                        .indexes
                        .iter()
                        .any(|index| &index.name == name && !index.columns.is_empty()));
                }
                ObjectId::ForeignKey { name, .. } => {
                    prop_assert!(table
                        .foreign_keys
                        .iter()
                        .any(|fk| &fk.name == name && !fk.columns.is_empty()));
                }
                ObjectId::Table { .. } => {}
            }
        }
    }

    /// Assembly keeps statement order and drops only excluded inserts
    #[test]
    fn prop_assembly_preserves_order(
        statements in prop::collection::vec(
            prop_oneof![
                "CREATE TABLE \\[dbo\\]\\.\\[[a-z]{1,6}\\]",
                "INSERT \\[dbo\\]\\.\\[[a-z]{1,6}\\] \\(\\[Id\\]\\) VALUES \\([0-9]{1,3}\\)",
                Just("INSERT [dbo].[umbracoServer] ([Id]) VALUES (1)".to_string()),
            ],
            0..12,
        )
    ) {
        let input = stream::iter(statements.clone().into_iter().map(Ok));
        let script = block_on(assemble_script(input, &ExclusionRules::default())).unwrap();

        let kept: Vec<&String> = statements
            .iter()
            .filter(|statement| !statement.starts_with("INSERT [dbo].[umbracoServer]"))
            .collect();
        let expected: String = kept.iter().map(|statement| format!("{statement}\nGO\n")).collect();

        prop_assert_eq!(script.as_str(), expected.as_str());
        prop_assert_eq!(script.statement_count(), kept.len());
        prop_assert_eq!(script.excluded_count(), statements.len().saturating_sub(kept.len()));
    }
}
