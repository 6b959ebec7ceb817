//! Building an actual schema from catalog (`INFORMATION_SCHEMA`) rows.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::CatalogFilter;
use crate::core::{Column, DbType, DefaultValue, Schema, Table, UNBOUNDED};
use crate::error::{Result, SyncError};

/// Cumulative size (in storage units) up to which leading columns are common.
pub const COMMON_SIZE_THRESHOLD: i64 = 2048;

/// Database schema whose tables keep unqualified native names by default.
pub const DEFAULT_SCHEMA: &str = "dbo";

/// One row of the catalog's column view, joined with key usage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogColumnRow {
    pub table_schema: String,
    pub table_name: String,
    /// `BASE TABLE` or `VIEW`.
    pub table_type: String,
    pub column_name: String,
    /// 1-based position within the table.
    pub ordinal_position: i32,
    /// `YES` or `NO`.
    pub is_nullable: String,
    pub data_type: String,
    /// Character/byte length; `-1` or absent for max / not applicable.
    #[serde(default)]
    pub character_maximum_length: Option<i32>,
    /// Column takes part in the primary key.
    #[serde(default)]
    pub is_key: bool,
    /// Raw default expression as stored by the catalog.
    #[serde(default)]
    pub column_default: Option<String>,
}

impl CatalogColumnRow {
    fn is_base_table(&self) -> bool {
        self.table_type.eq_ignore_ascii_case("BASE TABLE")
    }

    fn to_column(&self) -> Result<Column> {
        let db_type = DbType::from_catalog_name(&self.data_type).ok_or_else(|| {
            SyncError::Structural(format!(
                "Column {}.{}.{} has unsupported data type '{}'",
                self.table_schema, self.table_name, self.column_name, self.data_type
            ))
        })?;

        let mut column = Column::new(&self.column_name, db_type);
        column.length = match self.character_maximum_length {
            Some(length) if length >= 0 && db_type.is_sized() => length,
            _ => UNBOUNDED,
        };
        column.flags.nullable = self.is_nullable.eq_ignore_ascii_case("YES");
        if self.is_key {
            column = column.key();
        }
        column.default = self.column_default.as_deref().and_then(parse_default);
        column.flags.large = column.is_large();
        Ok(column)
    }
}

const TIMESTAMP_FUNCTIONS: &[&str] = &[
    "getdate()",
    "getutcdate()",
    "sysdatetime()",
    "sysutcdatetime()",
    "current_timestamp",
    "now()",
];

/// Parse a catalog default expression such as `((0))`, `(N'abc')` or `(getdate())`.
pub fn parse_default(raw: &str) -> Option<DefaultValue> {
    let mut expr = raw.trim();
    while wrapped_in_parens(expr) {
        expr = expr[1..expr.len() - 1].trim();
    }
    if expr.is_empty() {
        return None;
    }

    if TIMESTAMP_FUNCTIONS
        .iter()
        .any(|f| expr.eq_ignore_ascii_case(f))
    {
        return Some(DefaultValue::current_timestamp());
    }

    let quoted = expr
        .strip_prefix("N'")
        .or_else(|| expr.strip_prefix('\''))
        .and_then(|rest| rest.strip_suffix('\''));
    match quoted {
        Some(text) => Some(DefaultValue::literal(text.replace("''", "'"))),
        None => Some(DefaultValue::primitive(expr)),
    }
}

/// Whether the first and last characters are a matching pair of parentheses,
/// as in `((0))` but not `(1)+(2)`.
fn wrapped_in_parens(expr: &str) -> bool {
    if expr.len() < 2 || !expr.starts_with('(') || !expr.ends_with(')') {
        return false;
    }
    let last = expr.len() - 1;
    let mut depth = 0i32;
    let mut quoted = false;
    for (i, c) in expr.char_indices() {
        match c {
            '\'' => quoted = !quoted,
            '(' if !quoted => depth += 1,
            ')' if !quoted => {
                depth -= 1;
                if depth == 0 && i != last {
                    return false;
                }
            }
            _ => {}
        }
    }
    depth == 0
}

/// Mark leading columns as common until their cumulative size exceeds
/// `threshold`.
///
/// Columns are evaluated in ordinal order. Classification stops at the first
/// key column, at the first column with no bounded size, or once the running
/// total exceeds the threshold.
pub fn classify_common_columns(table: &mut Table, threshold: i64) {
    let mut total: i64 = 0;
    for column in table.columns_mut() {
        column.flags.common = false;
    }
    for column in table.columns_mut() {
        if column.is_key() {
            break;
        }
        let Some(size) = column.db_type.storage_size(column.length) else {
            break;
        };
        total += size;
        if total > threshold {
            break;
        }
        column.flags.common = true;
    }
}

/// Group catalog rows into base tables and build a fixed-up schema.
///
/// Rows are grouped by schema and table name. Table native names follow
/// [`CatalogFilter::native_table_name`]. Tables keep the order in which they
/// first appear; columns are ordered by `ordinal_position`.
pub fn schema_from_rows(
    rows: &[CatalogColumnRow],
    filter: &CatalogFilter,
    threshold: i64,
) -> Result<Schema> {
    let mut order: Vec<(String, String)> = Vec::new();
    let mut grouped: HashMap<(String, String), Vec<&CatalogColumnRow>> = HashMap::new();

    for row in rows {
        if !row.is_base_table() || !filter.accepts(Some(&row.table_schema), &row.table_name) {
            continue;
        }
        let key = (row.table_schema.to_lowercase(), row.table_name.to_lowercase());
        if !grouped.contains_key(&key) {
            order.push(key.clone());
        }
        grouped.entry(key).or_default().push(row);
    }

    let mut schema = Schema::new();
    for key in order {
        let Some(mut table_rows) = grouped.remove(&key) else {
            continue;
        };
        table_rows.sort_by_key(|r| r.ordinal_position);

        let first = table_rows[0];
        let mut table =
            Table::new(filter.native_table_name(&first.table_schema, &first.table_name));
        for row in table_rows {
            table.add_column(row.to_column()?)?;
        }
        classify_common_columns(&mut table, threshold);
        schema.add_table(table)?;
    }

    schema.fixup();
    debug!("Built schema from catalog rows: {} tables", schema.tables().len());
    Ok(schema)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::DefaultKind;

    fn row(table: &str, column: &str, pos: i32, data_type: &str, length: Option<i32>) -> CatalogColumnRow {
        CatalogColumnRow {
            table_schema: "dbo".to_string(),
            table_name: table.to_string(),
            table_type: "BASE TABLE".to_string(),
            column_name: column.to_string(),
            ordinal_position: pos,
            is_nullable: "NO".to_string(),
            data_type: data_type.to_string(),
            character_maximum_length: length,
            is_key: false,
            column_default: None,
        }
    }

    #[test]
    fn test_parse_default() {
        let zero = parse_default("((0))").unwrap();
        assert_eq!(zero.kind, DefaultKind::Primitive);
        assert_eq!(zero.value, "0");

        let text = parse_default("(N'it''s')").unwrap();
        assert_eq!(text.kind, DefaultKind::Literal);
        assert_eq!(text.value, "it's");

        assert_eq!(
            parse_default("(getdate())").unwrap().kind,
            DefaultKind::CurrentTimestamp
        );
        assert_eq!(parse_default("now()").unwrap().kind, DefaultKind::CurrentTimestamp);
        assert!(parse_default("()").is_none());
    }

    #[test]
    fn test_parse_default_keeps_unbalanced_parens() {
        assert_eq!(parse_default("(1)+(2)").unwrap().value, "(1)+(2)");
        assert_eq!(parse_default("((1)+(2))").unwrap().value, "(1)+(2)");
        assert_eq!(parse_default("(N'a)(b')").unwrap().value, "a)(b");
    }

    #[test]
    fn test_rows_grouped_and_ordered() {
        let mut id = row("Orders", "Id", 1, "int", None);
        id.is_key = true;
        let mut note = row("Orders", "Note", 3, "nvarchar", Some(-1));
        note.is_nullable = "YES".to_string();
        let mut view = row("OrderView", "Id", 1, "int", None);
        view.table_type = "VIEW".to_string();
        let rows = vec![
            note,
            row("Customers", "Id", 1, "int", None),
            id,
            row("Orders", "Code", 2, "varchar", Some(20)),
            view,
        ];

        let filter = CatalogFilter::new().with_default_schema(DEFAULT_SCHEMA);
        let schema = schema_from_rows(&rows, &filter, COMMON_SIZE_THRESHOLD).unwrap();
        let names: Vec<&str> = schema.tables().iter().map(|t| t.native_name.as_str()).collect();
        assert_eq!(names, vec!["Orders", "Customers"]);

        let orders = schema.table("Orders").unwrap();
        let columns: Vec<&str> = orders.columns().iter().map(|c| c.native_name.as_str()).collect();
        assert_eq!(columns, vec!["Id", "Code", "Note"]);
        assert!(orders.columns()[0].is_key());
        assert_eq!(orders.columns()[1].db_type, DbType::AnsiString);
        assert_eq!(orders.columns()[1].length, 20);
        assert!(orders.columns()[2].is_nullable());
        assert!(orders.columns()[2].flags.large);
    }

    #[test]
    fn test_filter_applies_to_rows() {
        let mut other = row("Audit", "Id", 1, "int", None);
        other.table_schema = "audit".to_string();
        let rows = vec![row("Orders", "Id", 1, "int", None), other];
        let filter = CatalogFilter::new().with_schemas(["DBO"]);
        let schema = schema_from_rows(&rows, &filter, COMMON_SIZE_THRESHOLD).unwrap();
        assert_eq!(schema.tables().len(), 1);
        assert!(schema.table("dbo.Orders").is_some());
    }

    #[test]
    fn test_same_table_name_in_two_schemas() {
        let mut audit_id = row("Orders", "Id", 1, "int", None);
        audit_id.table_schema = "audit".to_string();
        let mut audit_at = row("Orders", "ChangedAt", 2, "datetime", None);
        audit_at.table_schema = "audit".to_string();
        let rows = vec![
            row("Orders", "Id", 1, "int", None),
            audit_id,
            row("Orders", "Code", 2, "varchar", Some(20)),
            audit_at,
        ];

        let filter = CatalogFilter::new().with_default_schema("dbo");
        let schema = schema_from_rows(&rows, &filter, COMMON_SIZE_THRESHOLD).unwrap();
        let names: Vec<&str> = schema.tables().iter().map(|t| t.native_name.as_str()).collect();
        assert_eq!(names, vec!["Orders", "audit.Orders"]);
        assert_eq!(schema.table("Orders").unwrap().columns()[1].native_name, "Code");
        assert_eq!(
            schema.table("audit.Orders").unwrap().columns()[1].native_name,
            "ChangedAt"
        );
        assert!(filter.accepts_native(&schema.tables()[1].native_name));

        // Without a default schema every name is qualified.
        let schema = schema_from_rows(&rows, &CatalogFilter::default(), COMMON_SIZE_THRESHOLD).unwrap();
        assert!(schema.table("dbo.Orders").is_some());
        assert!(schema.table("audit.Orders").is_some());
    }

    #[test]
    fn test_unsupported_type_is_structural_error() {
        let rows = vec![row("Places", "Location", 1, "geography", None)];
        let err = schema_from_rows(&rows, &CatalogFilter::default(), COMMON_SIZE_THRESHOLD).unwrap_err();
        assert!(matches!(err, SyncError::Structural(_)));
    }

    #[test]
    fn test_common_classification_stops_at_threshold() {
        let mut table = Table::new("T");
        table.add_column(Column::new("A", DbType::Int32)).unwrap();
        table.add_column(Column::new("B", DbType::String).length(1000)).unwrap();
        table.add_column(Column::new("C", DbType::Int64)).unwrap();
        table.add_column(Column::new("D", DbType::Int32)).unwrap();

        classify_common_columns(&mut table, COMMON_SIZE_THRESHOLD);
        let common: Vec<bool> = table.columns().iter().map(|c| c.flags.common).collect();
        // 4 + 2000 = 2004, + 8 = 2012, + 4 = 2016: all within the threshold.
        assert_eq!(common, vec![true, true, true, true]);

        classify_common_columns(&mut table, 2010);
        let common: Vec<bool> = table.columns().iter().map(|c| c.flags.common).collect();
        assert_eq!(common, vec![true, true, false, false]);
    }

    #[test]
    fn test_common_classification_stops_at_key_and_unbounded() {
        let mut table = Table::new("T");
        table.add_column(Column::new("A", DbType::Int32)).unwrap();
        table.add_column(Column::new("Id", DbType::Int32).key()).unwrap();
        table.add_column(Column::new("C", DbType::Int32)).unwrap();
        classify_common_columns(&mut table, COMMON_SIZE_THRESHOLD);
        let common: Vec<bool> = table.columns().iter().map(|c| c.flags.common).collect();
        assert_eq!(common, vec![true, false, false]);

        let mut table = Table::new("U");
        table.add_column(Column::new("Body", DbType::String)).unwrap();
        table.add_column(Column::new("C", DbType::Int32)).unwrap();
        classify_common_columns(&mut table, COMMON_SIZE_THRESHOLD);
        assert!(table.columns().iter().all(|c| !c.flags.common));
    }
}
