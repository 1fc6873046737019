//! Table data as `INSERT` statements.
//!
//! Rows are read through a projection that converts every column to a
//! form the driver can decode without loss (integers widened to `bigint`,
//! exact numerics and temporals converted to text, binary-like types cast to
//! `varbinary(max)`), then rendered as T-SQL literals.

use std::fmt::Write;

use crate::models::{Column, Table};

use super::{qualified_name, quote_identifier, quote_unicode};

/// How a projected column is decoded and rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiteralKind {
    Integer,
    Bit,
    Float,
    Real,
    Decimal { precision: u8, scale: u8 },
    /// `money`/`smallmoney`, converted with style 2
    Money,
    /// Temporal value rendered as `CAST(N'...' AS <type>)`
    Temporal(&'static str),
    Unicode,
    Ansi,
    Binary,
}

impl LiteralKind {
    /// Picks the literal kind for a column's underlying system type.
    pub fn for_column(column: &Column) -> Self {
        match column.system_type().as_str() {
            "tinyint" | "smallint" | "int" | "bigint" => Self::Integer,
            "bit" => Self::Bit,
            "float" => Self::Float,
            "real" => Self::Real,
            "decimal" | "numeric" => Self::Decimal {
                precision: column.precision,
                scale: column.scale,
            },
            "money" | "smallmoney" => Self::Money,
            "datetime" => Self::Temporal("DateTime"),
            "smalldatetime" => Self::Temporal("SmallDateTime"),
            "date" => Self::Temporal("Date"),
            "time" => Self::Temporal("Time"),
            "datetime2" => Self::Temporal("DateTime2"),
            "datetimeoffset" => Self::Temporal("DateTimeOffset"),
            "char" | "varchar" | "text" => Self::Ansi,
            "nchar" | "nvarchar" | "ntext" | "xml" | "sql_variant" | "sysname"
            | "uniqueidentifier" => Self::Unicode,
            _ => Self::Binary,
        }
    }
}

/// Decoded cell of a data row.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Null,
    Integer(i64),
    Bit(bool),
    Float(f64),
    Real(f32),
    Text(String),
    Bytes(Vec<u8>),
}

/// Insertable column with the expression used to read it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectedColumn {
    pub name: String,
    pub kind: LiteralKind,
    pub expression: String,
}

/// Select-list expression for a column.
pub fn projection(column: &Column) -> ProjectedColumn {
    let quoted = quote_identifier(&column.name);
    let system_type = column.system_type();
    let kind = LiteralKind::for_column(column);

    let expression = match kind {
        LiteralKind::Integer => format!("CAST({quoted} AS bigint)"),
        LiteralKind::Bit | LiteralKind::Float | LiteralKind::Real => quoted,
        LiteralKind::Decimal { .. } => format!("CONVERT(nvarchar(64),{quoted})"),
        LiteralKind::Money => format!("CONVERT(nvarchar(64),{quoted},2)"),
        LiteralKind::Temporal("Time") => format!("CONVERT(nvarchar(64),{quoted})"),
        LiteralKind::Temporal(_) => format!("CONVERT(nvarchar(64),{quoted},126)"),
        LiteralKind::Unicode => match system_type.as_str() {
            "uniqueidentifier" => format!("CONVERT(nvarchar(36),{quoted})"),
            "ntext" | "xml" | "sql_variant" => format!("CONVERT(nvarchar(max),{quoted})"),
            _ => quoted,
        },
        LiteralKind::Ansi if system_type == "text" => format!("CONVERT(varchar(max),{quoted})"),
        LiteralKind::Ansi => quoted,
        LiteralKind::Binary => format!("CONVERT(varbinary(max),{quoted})"),
    };

    ProjectedColumn {
        name: column.name.clone(),
        kind,
        expression,
    }
}

/// Projections for every column an `INSERT` may supply.
pub fn insert_projection(table: &Table) -> Vec<ProjectedColumn> {
    table
        .columns
        .iter()
        .filter(|column| column.is_insertable())
        .map(projection)
        .collect()
}

/// Columns that give the data a stable order.
///
/// Primary key columns, else the clustered key, else every column whose
/// type supports comparison.
pub fn order_columns(table: &Table) -> Vec<String> {
    let key = table.primary_key().or_else(|| table.clustered_index());
    if let Some(index) = key {
        let columns: Vec<String> = index.key_columns().map(|column| column.name.clone()).collect();
        if !columns.is_empty() {
            return columns;
        }
    }

    table
        .columns
        .iter()
        .filter(|column| {
            !matches!(
                column.system_type().as_str(),
                "text" | "ntext" | "image" | "xml" | "geography" | "geometry"
            )
        })
        .map(|column| column.name.clone())
        .collect()
}

/// `SELECT` reading the projected columns in a deterministic order, or
/// `None` when the table has no insertable column.
pub fn select_statement(table: &Table, projection: &[ProjectedColumn]) -> Option<String> {
    if projection.is_empty() {
        return None;
    }

    let expressions: Vec<&str> = projection
        .iter()
        .map(|column| column.expression.as_str())
        .collect();
    let mut sql = format!(
        "SELECT {} FROM {}",
        expressions.join(", "),
        qualified_name(&table.schema, &table.name)
    );

    let order: Vec<String> = order_columns(table)
        .iter()
        .map(|name| quote_identifier(name))
        .collect();
    if !order.is_empty() {
        sql.push_str(" ORDER BY ");
        sql.push_str(&order.join(", "));
    }
    Some(sql)
}

/// Renders a cell as a T-SQL literal.
pub fn render_literal(kind: LiteralKind, value: &CellValue) -> String {
    match value {
        CellValue::Null => "NULL".to_string(),
        CellValue::Integer(value) => value.to_string(),
        CellValue::Bit(true) => "1".to_string(),
        CellValue::Bit(false) => "0".to_string(),
        // Shortest round-trip digits; exponent form keeps the literal a float.
        CellValue::Float(value) => format!("{value:E}"),
        CellValue::Real(value) => format!("{value:E}"),
        CellValue::Bytes(bytes) => hex_literal(bytes),
        CellValue::Text(text) => match kind {
            LiteralKind::Decimal { precision, scale } => {
                format!("CAST({text} AS Decimal({precision}, {scale}))")
            }
            LiteralKind::Money | LiteralKind::Integer => text.clone(),
            LiteralKind::Temporal(type_name) => {
                format!("CAST({} AS {type_name})", quote_unicode(text))
            }
            LiteralKind::Ansi => format!("'{}'", text.replace('\'', "''")),
            _ => quote_unicode(text),
        },
    }
}

fn hex_literal(bytes: &[u8]) -> String {
    let mut literal = String::with_capacity(bytes.len().saturating_mul(2).saturating_add(2));
    literal.push_str("0x");
    for byte in bytes {
        // Writing to a String cannot fail.
        let _ = write!(literal, "{byte:02X}");
    }
    literal
}

/// `INSERT` statements for the rows, wrapped in `SET IDENTITY_INSERT` when
/// an identity column is supplied.
pub fn insert_statements(
    table: &Table,
    projection: &[ProjectedColumn],
    rows: &[Vec<CellValue>],
) -> Vec<String> {
    if rows.is_empty() || projection.is_empty() {
        return Vec::new();
    }

    let target = qualified_name(&table.schema, &table.name);
    let column_list: Vec<String> = projection
        .iter()
        .map(|column| quote_identifier(&column.name))
        .collect();
    let column_list = column_list.join(", ");

    let identity = projection.iter().any(|projected| {
        table
            .column(&projected.name)
            .is_some_and(|column| column.is_identity)
    });

    let mut statements = Vec::with_capacity(rows.len().saturating_add(2));
    if identity {
        statements.push(format!("SET IDENTITY_INSERT {target} ON "));
    }
    for row in rows {
        let values: Vec<String> = projection
            .iter()
            .zip(row)
            .map(|(column, value)| render_literal(column.kind, value))
            .collect();
        statements.push(format!(
            "INSERT {target} ({column_list}) VALUES ({})",
            values.join(", ")
        ));
    }
    if identity {
        statements.push(format!("SET IDENTITY_INSERT {target} OFF"));
    }

    statements
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::models::{Index, IndexKind, IndexedColumn};

    fn orders() -> Table {
        let mut table = Table::new("dbo", "Orders");
        let mut id = Column::new("Id", "int");
        id.is_identity = true;
        id.is_nullable = false;

        let mut total = Column::new("Total", "decimal");
        total.precision = 18;
        total.scale = 2;

        let mut version = Column::new("Version", "timestamp");
        version.is_nullable = false;

        let mut computed = Column::new("TotalWithTax", "decimal");
        computed.is_computed = true;

        table.columns = vec![
            id,
            Column::new("Note", "nvarchar"),
            total,
            Column::new("PlacedAt", "datetime"),
            version,
            computed,
        ];

        let mut pk = Index::new("PK_Orders", IndexKind::Clustered);
        pk.is_primary_key = true;
        pk.columns.push(IndexedColumn::key("Id"));
        table.indexes.push(pk);
        table
    }

    #[test]
    fn test_projection_skips_generated_columns() {
        let projection = insert_projection(&orders());
        let names: Vec<&str> = projection.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Id", "Note", "Total", "PlacedAt"]);
    }

    #[test]
    fn test_projection_expressions() {
        let cases = [
            ("int", "CAST([c] AS bigint)"),
            ("bit", "[c]"),
            ("decimal", "CONVERT(nvarchar(64),[c])"),
            ("money", "CONVERT(nvarchar(64),[c],2)"),
            ("datetime2", "CONVERT(nvarchar(64),[c],126)"),
            ("time", "CONVERT(nvarchar(64),[c])"),
            ("uniqueidentifier", "CONVERT(nvarchar(36),[c])"),
            ("ntext", "CONVERT(nvarchar(max),[c])"),
            ("text", "CONVERT(varchar(max),[c])"),
            ("varchar", "[c]"),
            ("image", "CONVERT(varbinary(max),[c])"),
            ("hierarchyid", "CONVERT(varbinary(max),[c])"),
        ];
        for (type_name, expected) in cases {
            assert_eq!(
                projection(&Column::new("c", type_name)).expression,
                expected,
                "type {type_name}"
            );
        }
    }

    #[test]
    fn test_select_orders_by_primary_key() {
        let table = orders();
        let projection = insert_projection(&table);
        assert_eq!(
            select_statement(&table, &projection).unwrap(),
            "SELECT CAST([Id] AS bigint), [Note], CONVERT(nvarchar(64),[Total]), \
             CONVERT(nvarchar(64),[PlacedAt],126) FROM [dbo].[Orders] ORDER BY [Id]"
        );
    }

    #[test]
    fn test_heap_orders_by_comparable_columns() {
        let mut table = Table::new("dbo", "Log");
        table.columns = vec![
            Column::new("At", "datetime"),
            Column::new("Body", "ntext"),
            Column::new("Level", "int"),
        ];
        assert_eq!(order_columns(&table), vec!["At", "Level"]);

        table.columns = vec![Column::new("Body", "ntext")];
        let projection = insert_projection(&table);
        assert_eq!(
            select_statement(&table, &projection).unwrap(),
            "SELECT CONVERT(nvarchar(max),[Body]) FROM [dbo].[Log]"
        );
    }

    #[test]
    fn test_render_literals() {
        assert_eq!(render_literal(LiteralKind::Integer, &CellValue::Null), "NULL");
        assert_eq!(render_literal(LiteralKind::Integer, &CellValue::Integer(-7)), "-7");
        assert_eq!(render_literal(LiteralKind::Bit, &CellValue::Bit(true)), "1");
        assert_eq!(render_literal(LiteralKind::Float, &CellValue::Float(1.5)), "1.5E0");
        assert_eq!(
            render_literal(
                LiteralKind::Decimal { precision: 18, scale: 2 },
                &CellValue::Text("12.50".to_string())
            ),
            "CAST(12.50 AS Decimal(18, 2))"
        );
        assert_eq!(
            render_literal(LiteralKind::Money, &CellValue::Text("9.9900".to_string())),
            "9.9900"
        );
        assert_eq!(
            render_literal(
                LiteralKind::Temporal("DateTime"),
                &CellValue::Text("2024-02-29T13:45:00".to_string())
            ),
            "CAST(N'2024-02-29T13:45:00' AS DateTime)"
        );
        assert_eq!(
            render_literal(LiteralKind::Unicode, &CellValue::Text("O'Brien".to_string())),
            "N'O''Brien'"
        );
        assert_eq!(
            render_literal(LiteralKind::Ansi, &CellValue::Text("it's".to_string())),
            "'it''s'"
        );
        assert_eq!(
            render_literal(LiteralKind::Binary, &CellValue::Bytes(vec![0x00, 0xAB, 0x0f])),
            "0x00AB0F"
        );
        assert_eq!(render_literal(LiteralKind::Binary, &CellValue::Bytes(Vec::new())), "0x");
    }

    #[test]
    fn test_float_literals_keep_magnitude_and_precision() {
        let cases = [
            (1e300, "1E300"),
            (-1e300, "-1E300"),
            (1e-300, "1E-300"),
            (0.1 + 0.2, "3.0000000000000004E-1"),
            (0.0, "0E0"),
        ];
        for (value, expected) in cases {
            let literal = render_literal(LiteralKind::Float, &CellValue::Float(value));
            assert_eq!(literal, expected);
            assert_eq!(literal.parse::<f64>().unwrap(), value);
        }
    }

    #[test]
    fn test_real_literals_keep_magnitude_and_precision() {
        let cases = [(3e38_f32, "3E38"), (1.2e-38_f32, "1.2E-38"), (0.1_f32, "1E-1")];
        for (value, expected) in cases {
            let literal = render_literal(LiteralKind::Real, &CellValue::Real(value));
            assert_eq!(literal, expected);
            assert_eq!(literal.parse::<f32>().unwrap(), value);
        }
    }

    #[test]
    fn test_insert_statements_with_identity() {
        let table = orders();
        let projection = insert_projection(&table);
        let rows = vec![vec![
            CellValue::Integer(1),
            CellValue::Text("first".to_string()),
            CellValue::Text("10.00".to_string()),
            CellValue::Null,
        ]];

        assert_eq!(
            insert_statements(&table, &projection, &rows),
            vec![
                "SET IDENTITY_INSERT [dbo].[Orders] ON ",
                "INSERT [dbo].[Orders] ([Id], [Note], [Total], [PlacedAt]) \
                 VALUES (1, N'first', CAST(10.00 AS Decimal(18, 2)), NULL)",
                "SET IDENTITY_INSERT [dbo].[Orders] OFF",
            ]
        );
    }

    #[test]
    fn test_insert_statements_without_identity_or_rows() {
        let mut table = Table::new("dbo", "Settings");
        table.columns = vec![Column::new("Key", "varchar"), Column::new("Value", "nvarchar")];
        let projection = insert_projection(&table);

        assert!(insert_statements(&table, &projection, &[]).is_empty());

        let rows = vec![vec![
            CellValue::Text("theme".to_string()),
            CellValue::Text("dark".to_string()),
        ]];
        assert_eq!(
            insert_statements(&table, &projection, &rows),
            vec!["INSERT [dbo].[Settings] ([Key], [Value]) VALUES ('theme', N'dark')"]
        );
    }
}
