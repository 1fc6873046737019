//! Scripting options.
//!
//! [`ScriptOptions`] is the flat flag record handed to the scripting engine.
//! The generator always runs with [`ScriptOptions::deployment`]; other
//! combinations exist for tests and library callers.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::IndexKind;

/// SQL Server version the generated script must run on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SqlServerVersion {
    /// SQL Server 2005
    Version90,
    /// SQL Server 2008
    Version100,
    /// SQL Server 2008 R2
    Version105,
    /// SQL Server 2012
    Version110,
    /// SQL Server 2014
    Version120,
    /// SQL Server 2016
    Version130,
    /// SQL Server 2017
    Version140,
    /// SQL Server 2019
    Version150,
    /// SQL Server 2022
    Version160,
}

impl SqlServerVersion {
    /// Whether a column of the given system type can be created on this version.
    pub fn supports_type(self, system_type: &str) -> bool {
        match system_type.to_ascii_lowercase().as_str() {
            "date" | "time" | "datetime2" | "datetimeoffset" | "geography" | "geometry"
            | "hierarchyid" => self >= Self::Version100,
            _ => true,
        }
    }

    /// Whether an index of the given kind can be created on this version.
    pub fn supports_index(self, kind: IndexKind) -> bool {
        match kind {
            IndexKind::NonClusteredColumnstore => self >= Self::Version110,
            IndexKind::ClusteredColumnstore | IndexKind::NonClusteredHash => {
                self >= Self::Version120
            }
            IndexKind::Spatial => self >= Self::Version100,
            IndexKind::Clustered | IndexKind::NonClustered | IndexKind::Xml => true,
        }
    }
}

impl fmt::Display for SqlServerVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Flags controlling what the scripting engine emits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptOptions {
    /// Emit DDL
    pub script_schema: bool,
    /// Emit `INSERT` statements for table rows
    pub script_data: bool,
    pub target_server_version: SqlServerVersion,
    /// Default constraints
    pub default_constraints: bool,
    /// Master switch for relational indexes
    pub indexes: bool,
    pub clustered_indexes: bool,
    pub non_clustered_indexes: bool,
    pub full_text_indexes: bool,
    pub dri_primary_key: bool,
    pub dri_unique_keys: bool,
    pub dri_foreign_keys: bool,
    pub dri_checks: bool,
    /// Prefix the script with `USE [database]`
    pub include_database_context: bool,
    pub no_file_group: bool,
    pub no_table_partitioning_schemes: bool,
    pub no_index_partitioning_schemes: bool,
    /// Script from the catalog snapshot instead of re-reading each table
    pub prefetch_objects: bool,
}

impl Default for ScriptOptions {
    fn default() -> Self {
        Self {
            script_schema: true,
            script_data: false,
            target_server_version: SqlServerVersion::Version160,
            default_constraints: false,
            indexes: false,
            clustered_indexes: false,
            non_clustered_indexes: false,
            full_text_indexes: false,
            dri_primary_key: false,
            dri_unique_keys: false,
            dri_foreign_keys: false,
            dri_checks: false,
            include_database_context: false,
            no_file_group: false,
            no_table_partitioning_schemes: false,
            no_index_partitioning_schemes: false,
            prefetch_objects: false,
        }
    }
}

impl ScriptOptions {
    /// Options used to build a deployable schema + data script.
    pub fn deployment() -> Self {
        Self {
            script_schema: true,
            script_data: true,
            target_server_version: SqlServerVersion::Version110,
            default_constraints: true,
            indexes: true,
            clustered_indexes: true,
            non_clustered_indexes: true,
            full_text_indexes: true,
            include_database_context: false,
            no_file_group: true,
            no_table_partitioning_schemes: true,
            no_index_partitioning_schemes: true,
            prefetch_objects: true,
            ..Self::default()
        }
        .with_dri_all()
    }

    /// Enables every declarative referential integrity flag.
    pub fn with_dri_all(mut self) -> Self {
        self.dri_primary_key = true;
        self.dri_unique_keys = true;
        self.dri_foreign_keys = true;
        self.dri_checks = true;
        self
    }

    pub fn with_target(mut self, version: SqlServerVersion) -> Self {
        self.target_server_version = version;
        self
    }

    /// Whether an index of this kind is emitted at all.
    pub fn scripts_index_kind(&self, kind: IndexKind) -> bool {
        self.indexes
            && if kind.is_clustered() {
                self.clustered_indexes
            } else {
                self.non_clustered_indexes
            }
    }

    /// Whether a constraint-backed index is declared inline in `CREATE TABLE`.
    pub fn scripts_key_constraint(&self, is_primary_key: bool) -> bool {
        if is_primary_key {
            self.dri_primary_key
        } else {
            self.dri_unique_keys
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_deployment_options() {
        let options = ScriptOptions::deployment();
        assert!(options.script_schema);
        assert!(options.script_data);
        assert_eq!(options.target_server_version, SqlServerVersion::Version110);
        assert!(options.default_constraints);
        assert!(options.clustered_indexes && options.non_clustered_indexes);
        assert!(options.full_text_indexes);
        assert!(options.dri_primary_key && options.dri_unique_keys);
        assert!(options.dri_foreign_keys && options.dri_checks);
        assert!(!options.include_database_context);
        assert!(options.no_file_group);
        assert!(options.no_table_partitioning_schemes && options.no_index_partitioning_schemes);
        assert!(options.prefetch_objects);
    }

    #[test]
    fn test_version_type_support() {
        assert!(!SqlServerVersion::Version90.supports_type("datetime2"));
        assert!(SqlServerVersion::Version100.supports_type("DATE"));
        assert!(SqlServerVersion::Version90.supports_type("nvarchar"));
        assert_eq!(SqlServerVersion::Version110.to_string(), "Version110");
    }

    #[test]
    fn test_version_index_support() {
        let v110 = SqlServerVersion::Version110;
        assert!(v110.supports_index(IndexKind::NonClusteredColumnstore));
        assert!(!v110.supports_index(IndexKind::ClusteredColumnstore));
        assert!(SqlServerVersion::Version120.supports_index(IndexKind::ClusteredColumnstore));
    }

    #[test]
    fn test_index_kind_switches() {
        let mut options = ScriptOptions::deployment();
        assert!(options.scripts_index_kind(IndexKind::Clustered));

        options.clustered_indexes = false;
        assert!(!options.scripts_index_kind(IndexKind::Clustered));
        assert!(options.scripts_index_kind(IndexKind::NonClustered));

        options.indexes = false;
        assert!(!options.scripts_index_kind(IndexKind::NonClustered));
    }
}
