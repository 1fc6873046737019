//! T-SQL DDL rendering for tables, indexes, constraints and full-text indexes.
//!
//! Output follows the layout SQL Server Management Objects produce so that
//! generated scripts diff cleanly against scripts made with SSMS.

use crate::Result;
use crate::error::GenerateScriptError;
use crate::models::{
    Column, DataSpace, ForeignKey, FullTextIndex, Index, IndexKind, IndexedColumn, Table,
};
use crate::options::{ScriptOptions, SqlServerVersion};

use super::{qualified_name, quote_identifier, quote_unicode};

/// `CREATE TABLE` plus default and check constraints.
///
/// # Errors
/// Fails when a column type or inline index is not available in the target
/// server version.
pub fn table_statements(
    table: &Table,
    database_collation: Option<&str>,
    options: &ScriptOptions,
) -> Result<Vec<String>> {
    let version = options.target_server_version;
    for column in &table.columns {
        if !version.supports_type(&column.system_type()) {
            return Err(GenerateScriptError::script(format!(
                "column {} of {} has type [{}] which {} does not support",
                quote_identifier(&column.name),
                qualified_name(&table.schema, &table.name),
                column.type_name,
                version
            )));
        }
    }

    let mut definitions: Vec<String> = table
        .columns
        .iter()
        .map(|column| format!("\t{}", column_definition(column, database_collation)))
        .collect();

    for index in table.indexes.iter().filter(|index| index.is_constraint()) {
        if options.scripts_key_constraint(index.is_primary_key) {
            definitions.push(key_constraint(index, options)?);
        }
    }

    let mut create = format!(
        "CREATE TABLE {}(\n{}\n)",
        qualified_name(&table.schema, &table.name),
        definitions.join(",\n")
    );
    if let Some(clause) = data_space_clause(
        table.data_space.as_ref(),
        options.no_file_group,
        options.no_table_partitioning_schemes,
    ) {
        create.push(' ');
        create.push_str(&clause);
    }

    let mut statements = vec![
        "SET ANSI_NULLS ON".to_string(),
        "SET QUOTED_IDENTIFIER ON".to_string(),
        create,
    ];

    if options.default_constraints {
        for default in &table.default_constraints {
            statements.push(format!(
                "ALTER TABLE {} ADD  CONSTRAINT {}  DEFAULT {} FOR {}",
                qualified_name(&table.schema, &table.name),
                quote_identifier(&default.name),
                default.definition,
                quote_identifier(&default.column)
            ));
        }
    }

    if options.dri_checks {
        for check in &table.check_constraints {
            statements.push(format!(
                "ALTER TABLE {}  WITH {} ADD  CONSTRAINT {} CHECK {} ({})",
                qualified_name(&table.schema, &table.name),
                check_mode(check.is_not_trusted),
                quote_identifier(&check.name),
                if check.is_not_for_replication {
                    " NOT FOR REPLICATION"
                } else {
                    ""
                },
                check.definition
            ));
            statements.push(enable_constraint(table, &check.name, check.is_disabled));
        }
    }

    Ok(statements)
}

/// Column definition as it appears inside `CREATE TABLE`.
pub fn column_definition(column: &Column, database_collation: Option<&str>) -> String {
    if column.is_computed {
        let mut definition = format!(
            "{} AS {}",
            quote_identifier(&column.name),
            column.computed_definition.as_deref().unwrap_or("NULL")
        );
        if column.is_persisted {
            definition.push_str(" PERSISTED");
            if !column.is_nullable {
                definition.push_str(" NOT NULL");
            }
        }
        return definition;
    }

    let mut definition = format!("{} {}", quote_identifier(&column.name), data_type(column));

    if column.is_identity {
        definition.push_str(&format!(
            " IDENTITY({},{})",
            column.identity_seed.as_deref().unwrap_or("1"),
            column.identity_increment.as_deref().unwrap_or("1")
        ));
    }
    if column.is_rowguidcol {
        definition.push_str(" ROWGUIDCOL");
    }
    if let Some(collation) = column.collation.as_deref()
        && database_collation != Some(collation)
    {
        definition.push_str(&format!(" COLLATE {collation}"));
    }
    definition.push_str(if column.is_nullable {
        " NULL"
    } else {
        " NOT NULL"
    });

    definition
}

/// Bracketed type name with length, precision or scale arguments.
pub fn data_type(column: &Column) -> String {
    if column.is_user_defined_type {
        return qualified_name(&column.type_schema, &column.type_name);
    }

    let type_name = column.type_name.to_ascii_lowercase();
    let arguments = match type_name.as_str() {
        "char" | "varchar" | "binary" | "varbinary" => Some(length(column.max_length, 1)),
        "nchar" | "nvarchar" => Some(length(column.max_length, 2)),
        "decimal" | "numeric" => Some(format!("{}, {}", column.precision, column.scale)),
        "datetime2" | "time" | "datetimeoffset" => Some(column.scale.to_string()),
        _ => None,
    };

    match arguments {
        Some(arguments) => format!("[{type_name}]({arguments})"),
        None => format!("[{type_name}]"),
    }
}

fn length(max_length: i16, bytes_per_char: i16) -> String {
    if max_length < 0 {
        "max".to_string()
    } else {
        max_length
            .checked_div(bytes_per_char)
            .unwrap_or(max_length)
            .to_string()
    }
}

fn key_constraint(index: &Index, options: &ScriptOptions) -> Result<String> {
    if !options.target_server_version.supports_index(index.kind) {
        return Err(unsupported_index(index, options));
    }

    let kind = if index.is_primary_key {
        "PRIMARY KEY"
    } else {
        "UNIQUE"
    };
    let mut constraint = format!(
        " CONSTRAINT {} {} {} \n(\n{}\n){}",
        quote_identifier(&index.name),
        kind,
        if index.kind.is_clustered() {
            "CLUSTERED"
        } else {
            "NONCLUSTERED"
        },
        key_column_list(index.key_columns()),
        with_clause(index)
    );
    if let Some(clause) = data_space_clause(
        index.data_space.as_ref(),
        options.no_file_group,
        options.no_index_partitioning_schemes,
    ) {
        constraint.push(' ');
        constraint.push_str(&clause);
    }
    Ok(constraint)
}

/// Statements creating a stand-alone index.
///
/// Returns nothing for indexes declared inline by [`table_statements`] and
/// for index kinds switched off in the options.
///
/// # Errors
/// Fails for hash indexes, for spatial indexes without tessellation
/// settings and for kinds the target version cannot create.
pub fn index_statements(
    table: &Table,
    index: &Index,
    options: &ScriptOptions,
) -> Result<Vec<String>> {
    if index.is_constraint() && options.scripts_key_constraint(index.is_primary_key) {
        return Ok(Vec::new());
    }
    if !options.scripts_index_kind(index.kind) {
        return Ok(Vec::new());
    }
    if !options.target_server_version.supports_index(index.kind) {
        return Err(unsupported_index(index, options));
    }

    let target = qualified_name(&table.schema, &table.name);
    let mut statement = match index.kind {
        IndexKind::Clustered | IndexKind::NonClustered => {
            if index.is_constraint() {
                // Key constraint not declared inline; add it after the fact.
                format!(
                    "ALTER TABLE {} ADD  CONSTRAINT {} {} {} \n(\n{}\n){}",
                    target,
                    quote_identifier(&index.name),
                    if index.is_primary_key {
                        "PRIMARY KEY"
                    } else {
                        "UNIQUE"
                    },
                    index.kind,
                    key_column_list(index.key_columns()),
                    with_clause(index)
                )
            } else {
                let mut create = format!(
                    "CREATE {}{} INDEX {} ON {}\n(\n{}\n)",
                    if index.is_unique { "UNIQUE " } else { "" },
                    index.kind,
                    quote_identifier(&index.name),
                    target,
                    key_column_list(index.key_columns())
                );
                let included: Vec<String> = index
                    .included_columns()
                    .map(|column| quote_identifier(&column.name))
                    .collect();
                if !included.is_empty() {
                    create.push_str(&format!("\nINCLUDE({})", included.join(",")));
                }
                if let Some(filter) = index.filter_definition.as_deref() {
                    create.push_str(&format!(" \nWHERE {filter}"));
                }
                create.push_str(&with_clause(index));
                create
            }
        }
        IndexKind::NonClusteredColumnstore => format!(
            "CREATE NONCLUSTERED COLUMNSTORE INDEX {} ON {}\n(\n{}\n)",
            quote_identifier(&index.name),
            target,
            index
                .columns
                .iter()
                .map(|column| format!("\t{}", quote_identifier(&column.name)))
                .collect::<Vec<_>>()
                .join(",\n")
        ),
        IndexKind::ClusteredColumnstore => format!(
            "CREATE CLUSTERED COLUMNSTORE INDEX {} ON {}",
            quote_identifier(&index.name),
            target
        ),
        IndexKind::Xml => return Ok(vec![xml_index(&target, index)]),
        IndexKind::Spatial => spatial_index(&target, index, options)?,
        IndexKind::NonClusteredHash => {
            return Err(GenerateScriptError::script(format!(
                "hash index {} on {} is on a memory-optimized table, which is not scripted",
                quote_identifier(&index.name),
                target
            )));
        }
    };

    if let Some(clause) = data_space_clause(
        index.data_space.as_ref(),
        options.no_file_group,
        options.no_index_partitioning_schemes,
    ) {
        statement.push(' ');
        statement.push_str(&clause);
    }

    Ok(vec![statement])
}

/// `CREATE [PRIMARY] XML INDEX`. XML indexes live with their table, so no
/// data space clause follows.
fn xml_index(target: &str, index: &Index) -> String {
    let column = index
        .columns
        .first()
        .map(|column| format!("\t{}", quote_identifier(&column.name)))
        .unwrap_or_default();

    match &index.secondary_xml {
        None => format!(
            "CREATE PRIMARY XML INDEX {} ON {}\n(\n{}\n){}",
            quote_identifier(&index.name),
            target,
            column,
            lock_with_clause(index)
        ),
        Some(secondary) => format!(
            "CREATE XML INDEX {} ON {}\n(\n{}\n)\nUSING XML INDEX {} FOR {} {}",
            quote_identifier(&index.name),
            target,
            column,
            quote_identifier(&secondary.primary_index),
            secondary.usage.to_ascii_uppercase(),
            lock_with_clause(index)
        ),
    }
}

/// `CREATE SPATIAL INDEX` with its tessellation settings.
fn spatial_index(target: &str, index: &Index, options: &ScriptOptions) -> Result<String> {
    let Some(tessellation) = index.spatial.as_ref() else {
        return Err(GenerateScriptError::script(format!(
            "spatial index {} on {} has no tessellation settings",
            quote_identifier(&index.name),
            target
        )));
    };
    let version = options.target_server_version;
    if tessellation.is_auto_grid() && version < SqlServerVersion::Version110 {
        return Err(GenerateScriptError::script(format!(
            "spatial index {} uses {}, which {} does not support",
            quote_identifier(&index.name),
            tessellation.scheme,
            version
        )));
    }

    let mut settings = Vec::new();
    if let Some([xmin, ymin, xmax, ymax]) = tessellation.bounding_box {
        settings.push(format!("BOUNDING_BOX =({xmin}, {ymin}, {xmax}, {ymax})"));
    }
    if !tessellation.is_auto_grid() && !tessellation.grid_levels.is_empty() {
        let grids: Vec<String> = tessellation
            .grid_levels
            .iter()
            .zip(1..)
            .map(|(density, level)| format!("LEVEL_{level} = {}", density.to_ascii_uppercase()))
            .collect();
        settings.push(format!("GRIDS =({})", grids.join(",")));
    }
    if let Some(cells) = tessellation.cells_per_object {
        settings.push(format!("\nCELLS_PER_OBJECT = {cells}"));
    }
    settings.extend(lock_settings(index));

    let column = index
        .columns
        .first()
        .map(|column| format!("\t{}", quote_identifier(&column.name)))
        .unwrap_or_default();
    Ok(format!(
        "CREATE SPATIAL INDEX {} ON {}\n(\n{}\n)USING  {} \nWITH ({})",
        quote_identifier(&index.name),
        target,
        column,
        tessellation.scheme.to_ascii_uppercase(),
        settings.join(", ")
    ))
}

/// `ALTER TABLE ... ADD CONSTRAINT ... FOREIGN KEY` and its enable/disable
/// companion statement.
pub fn foreign_key_statements(table: &Table, foreign_key: &ForeignKey) -> Vec<String> {
    let columns: Vec<String> = foreign_key
        .columns
        .iter()
        .map(|pair| quote_identifier(&pair.column))
        .collect();
    let referenced: Vec<String> = foreign_key
        .columns
        .iter()
        .map(|pair| quote_identifier(&pair.referenced_column))
        .collect();

    let mut add = format!(
        "ALTER TABLE {}  WITH {} ADD  CONSTRAINT {} FOREIGN KEY({})\nREFERENCES {} ({})",
        qualified_name(&table.schema, &table.name),
        check_mode(foreign_key.is_not_trusted),
        quote_identifier(&foreign_key.name),
        columns.join(", "),
        qualified_name(&foreign_key.referenced_schema, &foreign_key.referenced_table),
        referenced.join(", ")
    );
    if let Some(action) = foreign_key.on_update.keyword() {
        add.push_str(&format!("\nON UPDATE {action}"));
    }
    if let Some(action) = foreign_key.on_delete.keyword() {
        add.push_str(&format!("\nON DELETE {action}"));
    }
    if foreign_key.is_not_for_replication {
        add.push_str("\nNOT FOR REPLICATION ");
    }

    vec![
        add,
        enable_constraint(table, &foreign_key.name, foreign_key.is_disabled),
    ]
}

/// Full-text catalog guard and `CREATE FULLTEXT INDEX`.
pub fn full_text_statements(table: &Table, full_text: &FullTextIndex) -> Vec<String> {
    let columns: Vec<String> = full_text
        .columns
        .iter()
        .map(|column| match column.language_id {
            Some(language) => format!("{} LANGUAGE {}", quote_identifier(&column.name), language),
            None => quote_identifier(&column.name),
        })
        .collect();

    let change_tracking = match full_text.change_tracking.to_ascii_uppercase().as_str() {
        "MANUAL" => "MANUAL",
        "OFF" => "OFF",
        _ => "AUTO",
    };

    vec![
        format!(
            "IF NOT EXISTS (SELECT 1 FROM sys.fulltext_catalogs WHERE name = {}) \
             CREATE FULLTEXT CATALOG {}",
            quote_unicode(&full_text.catalog),
            quote_identifier(&full_text.catalog)
        ),
        format!(
            "CREATE FULLTEXT INDEX ON {}(\n{})\nKEY INDEX {}ON ({})\nWITH (CHANGE_TRACKING = {})",
            qualified_name(&table.schema, &table.name),
            columns.join(", \n"),
            quote_identifier(&full_text.key_index),
            quote_identifier(&full_text.catalog),
            change_tracking
        ),
    ]
}

/// Whether the full-text index is keyed on a constraint declared inline in
/// `CREATE TABLE`, so it can be created together with the table.
pub fn full_text_key_is_inline(
    table: &Table,
    full_text: &FullTextIndex,
    options: &ScriptOptions,
) -> bool {
    table.index(&full_text.key_index).is_some_and(|index| {
        index.is_constraint() && options.scripts_key_constraint(index.is_primary_key)
    })
}

/// `ON [filegroup]` / `ON [scheme]([column])`, subject to suppression flags.
pub fn data_space_clause(
    data_space: Option<&DataSpace>,
    no_file_group: bool,
    no_partitioning: bool,
) -> Option<String> {
    match data_space? {
        DataSpace::FileGroup { name } if !no_file_group => {
            Some(format!("ON {}", quote_identifier(name)))
        }
        DataSpace::PartitionScheme { name, column } if !no_partitioning => Some(match column {
            Some(column) => format!("ON {}({})", quote_identifier(name), quote_identifier(column)),
            None => format!("ON {}", quote_identifier(name)),
        }),
        _ => None,
    }
}

fn key_column_list<'a>(columns: impl Iterator<Item = &'a IndexedColumn>) -> String {
    columns
        .map(|column| {
            format!(
                "\t{} {}",
                quote_identifier(&column.name),
                if column.is_descending { "DESC" } else { "ASC" }
            )
        })
        .collect::<Vec<_>>()
        .join(",\n")
}

fn on_off(flag: bool) -> &'static str {
    if flag { "ON" } else { "OFF" }
}

fn with_clause(index: &Index) -> String {
    let mut settings = vec![
        format!("PAD_INDEX = {}", on_off(index.is_padded)),
        format!("IGNORE_DUP_KEY = {}", on_off(index.ignore_dup_key)),
        format!("ALLOW_ROW_LOCKS = {}", on_off(index.allow_row_locks)),
        format!("ALLOW_PAGE_LOCKS = {}", on_off(index.allow_page_locks)),
    ];
    if index.fill_factor > 0 {
        settings.push(format!("FILLFACTOR = {}", index.fill_factor));
    }
    format!("WITH ({})", settings.join(", "))
}

/// Index options valid for XML and spatial indexes, which take no
/// `IGNORE_DUP_KEY`.
fn lock_settings(index: &Index) -> Vec<String> {
    let mut settings = vec![
        format!("PAD_INDEX = {}", on_off(index.is_padded)),
        format!("ALLOW_ROW_LOCKS = {}", on_off(index.allow_row_locks)),
        format!("ALLOW_PAGE_LOCKS = {}", on_off(index.allow_page_locks)),
    ];
    if index.fill_factor > 0 {
        settings.push(format!("FILLFACTOR = {}", index.fill_factor));
    }
    settings
}

fn lock_with_clause(index: &Index) -> String {
    format!("WITH ({})", lock_settings(index).join(", "))
}

fn check_mode(is_not_trusted: bool) -> &'static str {
    if is_not_trusted {
        "NOCHECK"
    } else {
        "CHECK"
    }
}

fn enable_constraint(table: &Table, name: &str, is_disabled: bool) -> String {
    format!(
        "ALTER TABLE {} {} CONSTRAINT {}",
        qualified_name(&table.schema, &table.name),
        if is_disabled { "NOCHECK" } else { "CHECK" },
        quote_identifier(name)
    )
}

fn unsupported_index(index: &Index, options: &ScriptOptions) -> GenerateScriptError {
    GenerateScriptError::script(format!(
        "{} index {} is not supported by {}",
        index.kind,
        quote_identifier(&index.name),
        options.target_server_version
    ))
}
