//! Catalog snapshot and object identifier models.
//!
//! A [`Database`] is read once from the live catalog and held for the
//! duration of a run. [`ObjectId`] values are the opaque locators handed to
//! the scripting engine. All models are serializable so catalogs can be
//! captured as JSON fixtures.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque locator for a scriptable catalog object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ObjectId {
    Table {
        schema: String,
        name: String,
    },
    Index {
        schema: String,
        table: String,
        name: String,
    },
    ForeignKey {
        schema: String,
        table: String,
        name: String,
    },
}

impl ObjectId {
    /// Identifier of a table.
    pub fn table(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self::Table {
            schema: schema.into(),
            name: name.into(),
        }
    }

    /// Identifier of an index on `schema.table`.
    pub fn index(
        schema: impl Into<String>,
        table: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self::Index {
            schema: schema.into(),
            table: table.into(),
            name: name.into(),
        }
    }

    /// Identifier of a foreign key declared on `schema.table`.
    pub fn foreign_key(
        schema: impl Into<String>,
        table: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self::ForeignKey {
            schema: schema.into(),
            table: table.into(),
            name: name.into(),
        }
    }

    /// Schema and name of the table the object belongs to.
    pub fn table_key(&self) -> (&str, &str) {
        match self {
            Self::Table { schema, name } => (schema, name),
            Self::Index { schema, table, .. } | Self::ForeignKey { schema, table, .. } => {
                (schema, table)
            }
        }
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (schema, table) = self.table_key();
        write!(f, "Table[@Name='{table}' and @Schema='{schema}']")?;
        match self {
            Self::Table { .. } => Ok(()),
            Self::Index { name, .. } => write!(f, "/Index[@Name='{name}']"),
            Self::ForeignKey { name, .. } => write!(f, "/ForeignKey[@Name='{name}']"),
        }
    }
}

/// Prefetched catalog of the connected database.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Database {
    pub name: String,
    /// Default collation; column collations equal to it are not scripted
    pub collation: Option<String>,
    pub tables: Vec<Table>,
}

impl Database {
    /// Creates an empty catalog for the named database.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Looks up a table by schema and name.
    pub fn table(&self, schema: &str, name: &str) -> Option<&Table> {
        self.tables
            .iter()
            .find(|table| table.schema == schema && table.name == name)
    }
}

/// User or system table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Table {
    pub object_id: i32,
    pub schema: String,
    pub name: String,
    /// Shipped by the engine or flagged as tooling support (e.g. `sysdiagrams`)
    pub is_system_object: bool,
    pub columns: Vec<Column>,
    pub indexes: Vec<Index>,
    pub foreign_keys: Vec<ForeignKey>,
    pub check_constraints: Vec<CheckConstraint>,
    pub default_constraints: Vec<DefaultConstraint>,
    pub full_text_index: Option<FullTextIndex>,
    pub data_space: Option<DataSpace>,
}

impl Table {
    /// Creates a user table with no columns.
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn index(&self, name: &str) -> Option<&Index> {
        self.indexes.iter().find(|index| index.name == name)
    }

    pub fn foreign_key(&self, name: &str) -> Option<&ForeignKey> {
        self.foreign_keys.iter().find(|fk| fk.name == name)
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|column| column.name == name)
    }

    /// Index backing the primary key, if any.
    pub fn primary_key(&self) -> Option<&Index> {
        self.indexes.iter().find(|index| index.is_primary_key)
    }

    /// Clustered index, if the table is not a heap.
    pub fn clustered_index(&self) -> Option<&Index> {
        self.indexes
            .iter()
            .find(|index| index.kind == IndexKind::Clustered)
    }
}

/// Table column with its physical type.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Column {
    pub name: String,
    /// Declared type; an alias or CLR type name for user-defined types
    pub type_name: String,
    /// Underlying system type (`nvarchar`, `int`, `hierarchyid`, ...)
    pub system_type_name: String,
    pub type_schema: String,
    pub is_user_defined_type: bool,
    /// Storage length in bytes, `-1` for `(max)`
    pub max_length: i16,
    pub precision: u8,
    pub scale: u8,
    pub is_nullable: bool,
    pub is_identity: bool,
    pub identity_seed: Option<String>,
    pub identity_increment: Option<String>,
    pub is_computed: bool,
    pub computed_definition: Option<String>,
    pub is_persisted: bool,
    pub collation: Option<String>,
    pub is_rowguidcol: bool,
}

impl Default for Column {
    fn default() -> Self {
        Self {
            name: String::new(),
            type_name: String::new(),
            system_type_name: String::new(),
            type_schema: "sys".to_string(),
            is_user_defined_type: false,
            max_length: 0,
            precision: 0,
            scale: 0,
            is_nullable: true,
            is_identity: false,
            identity_seed: None,
            identity_increment: None,
            is_computed: false,
            computed_definition: None,
            is_persisted: false,
            collation: None,
            is_rowguidcol: false,
        }
    }
}

impl Column {
    /// Creates a nullable column of a system type.
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        let type_name = type_name.into();
        Self {
            name: name.into(),
            system_type_name: type_name.clone(),
            type_name,
            ..Default::default()
        }
    }

    /// Lower-cased system type name used for type decisions.
    pub fn system_type(&self) -> String {
        let name = if self.system_type_name.is_empty() {
            &self.type_name
        } else {
            &self.system_type_name
        };
        name.to_ascii_lowercase()
    }

    /// `timestamp`/`rowversion` columns are generated by the server.
    pub fn is_row_version(&self) -> bool {
        matches!(self.system_type().as_str(), "timestamp" | "rowversion")
    }

    /// Whether an `INSERT` may supply a value for this column.
    pub fn is_insertable(&self) -> bool {
        !self.is_computed && !self.is_row_version()
    }
}

/// Physical index kind as reported by `sys.indexes.type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexKind {
    Clustered,
    #[default]
    NonClustered,
    Xml,
    Spatial,
    ClusteredColumnstore,
    NonClusteredColumnstore,
    NonClusteredHash,
}

impl IndexKind {
    /// Maps a `sys.indexes.type` code; heaps (`0`) have no kind.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Self::Clustered),
            2 => Some(Self::NonClustered),
            3 => Some(Self::Xml),
            4 => Some(Self::Spatial),
            5 => Some(Self::ClusteredColumnstore),
            6 => Some(Self::NonClusteredColumnstore),
            7 => Some(Self::NonClusteredHash),
            _ => None,
        }
    }

    pub fn is_clustered(self) -> bool {
        matches!(self, Self::Clustered | Self::ClusteredColumnstore)
    }
}

impl fmt::Display for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let desc = match self {
            Self::Clustered => "CLUSTERED",
            Self::NonClustered => "NONCLUSTERED",
            Self::Xml => "XML",
            Self::Spatial => "SPATIAL",
            Self::ClusteredColumnstore => "CLUSTERED COLUMNSTORE",
            Self::NonClusteredColumnstore => "NONCLUSTERED COLUMNSTORE",
            Self::NonClusteredHash => "NONCLUSTERED HASH",
        };
        f.write_str(desc)
    }
}

/// Relational index, including those backing key constraints.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Index {
    pub name: String,
    pub kind: IndexKind,
    pub is_unique: bool,
    pub is_primary_key: bool,
    pub is_unique_constraint: bool,
    pub columns: Vec<IndexedColumn>,
    pub filter_definition: Option<String>,
    pub fill_factor: u8,
    pub is_padded: bool,
    pub ignore_dup_key: bool,
    pub allow_row_locks: bool,
    pub allow_page_locks: bool,
    pub data_space: Option<DataSpace>,
    /// Set on secondary XML indexes; a primary XML index has none.
    pub secondary_xml: Option<SecondaryXmlIndex>,
    /// Tessellation of a spatial index.
    pub spatial: Option<SpatialTessellation>,
}

impl Default for Index {
    fn default() -> Self {
        Self {
            name: String::new(),
            kind: IndexKind::NonClustered,
            is_unique: false,
            is_primary_key: false,
            is_unique_constraint: false,
            columns: Vec::new(),
            filter_definition: None,
            fill_factor: 0,
            is_padded: false,
            ignore_dup_key: false,
            allow_row_locks: true,
            allow_page_locks: true,
            data_space: None,
            secondary_xml: None,
            spatial: None,
        }
    }
}

impl Index {
    pub fn new(name: impl Into<String>, kind: IndexKind) -> Self {
        Self {
            name: name.into(),
            kind,
            ..Default::default()
        }
    }

    /// Primary key and unique constraints are declared inside `CREATE TABLE`.
    pub fn is_constraint(&self) -> bool {
        self.is_primary_key || self.is_unique_constraint
    }

    pub fn key_columns(&self) -> impl Iterator<Item = &IndexedColumn> {
        self.columns.iter().filter(|column| !column.is_included)
    }

    pub fn included_columns(&self) -> impl Iterator<Item = &IndexedColumn> {
        self.columns.iter().filter(|column| column.is_included)
    }
}

/// Primary XML index a secondary XML index is built over, and what it
/// optimizes for.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SecondaryXmlIndex {
    pub primary_index: String,
    /// `PATH`, `VALUE` or `PROPERTY`
    pub usage: String,
}

/// Grid settings of a spatial index, as stored in
/// `sys.spatial_index_tessellations`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SpatialTessellation {
    /// e.g. `GEOMETRY_GRID` or `GEOGRAPHY_AUTO_GRID`
    pub scheme: String,
    /// `xmin, ymin, xmax, ymax`; geometry grids only
    pub bounding_box: Option<[f64; 4]>,
    /// `LOW`, `MEDIUM` or `HIGH` per level; empty for auto grids
    pub grid_levels: Vec<String>,
    pub cells_per_object: Option<i32>,
}

impl SpatialTessellation {
    pub fn is_auto_grid(&self) -> bool {
        self.scheme.to_ascii_uppercase().ends_with("_AUTO_GRID")
    }
}

/// Key or included column of an index.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexedColumn {
    pub name: String,
    pub is_descending: bool,
    pub is_included: bool,
}

impl IndexedColumn {
    pub fn key(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn included(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_included: true,
            ..Default::default()
        }
    }
}

/// Foreign key declared on the owning table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ForeignKey {
    pub name: String,
    pub columns: Vec<ForeignKeyColumn>,
    pub referenced_schema: String,
    pub referenced_table: String,
    pub on_delete: ReferentialAction,
    pub on_update: ReferentialAction,
    pub is_disabled: bool,
    pub is_not_trusted: bool,
    pub is_not_for_replication: bool,
}

/// Column pair of a foreign key.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ForeignKeyColumn {
    pub column: String,
    pub referenced_column: String,
}

impl ForeignKeyColumn {
    pub fn new(column: impl Into<String>, referenced_column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            referenced_column: referenced_column.into(),
        }
    }
}

/// Referential actions for foreign keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferentialAction {
    #[default]
    NoAction,
    Cascade,
    SetNull,
    SetDefault,
}

impl ReferentialAction {
    /// Parses `sys.foreign_keys.*_referential_action_desc`.
    pub fn from_desc(desc: &str) -> Self {
        match desc.to_ascii_uppercase().as_str() {
            "CASCADE" => Self::Cascade,
            "SET_NULL" => Self::SetNull,
            "SET_DEFAULT" => Self::SetDefault,
            _ => Self::NoAction,
        }
    }

    /// T-SQL keyword, `None` for the implicit `NO ACTION`.
    pub fn keyword(self) -> Option<&'static str> {
        match self {
            Self::NoAction => None,
            Self::Cascade => Some("CASCADE"),
            Self::SetNull => Some("SET NULL"),
            Self::SetDefault => Some("SET DEFAULT"),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckConstraint {
    pub name: String,
    pub definition: String,
    pub is_disabled: bool,
    pub is_not_trusted: bool,
    pub is_not_for_replication: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultConstraint {
    pub name: String,
    pub column: String,
    pub definition: String,
}

/// Full-text index; at most one per table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FullTextIndex {
    pub catalog: String,
    /// Unique index the full-text index is keyed on
    pub key_index: String,
    pub change_tracking: String,
    pub columns: Vec<FullTextColumn>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FullTextColumn {
    pub name: String,
    pub language_id: Option<i32>,
}

/// Storage location of a table or index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DataSpace {
    FileGroup { name: String },
    PartitionScheme { name: String, column: Option<String> },
}

impl DataSpace {
    /// Maps `sys.data_spaces.type` (`FG`, `PS`); other kinds are not scripted.
    pub fn from_catalog(kind: &str, name: String, column: Option<String>) -> Option<Self> {
        match kind.trim() {
            "FG" => Some(Self::FileGroup { name }),
            "PS" => Some(Self::PartitionScheme { name, column }),
            _ => None,
        }
    }
}
