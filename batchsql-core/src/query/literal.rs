//! Literal-mode INSERT builders.
//!
//! Values are inlined as single-quoted text. Nothing here escapes them; run
//! [`crate::sanitize::check_value`] over the rows first (the client does this
//! when value checks are enabled) and use these builders for trusted input.

use super::{Statement, column_list, validate_shape};
use crate::models::{DataTable, SqlValue};

/// Builder for statements with values spliced into the SQL text.
#[derive(Debug, Clone, Copy, Default)]
pub struct LiteralInsert;

impl LiteralInsert {
    /// `INSERT INTO t (a, b) VALUES ('1', 'x'), ('2', 'y')`.
    pub fn multi_row<C: AsRef<str>>(
        table: &str,
        columns: &[C],
        rows: &[Vec<SqlValue>],
    ) -> crate::Result<Statement> {
        validate_shape(table, columns, rows)?;

        let tuples: Vec<String> = rows
            .iter()
            .map(|row| {
                let cells: Vec<String> = row.iter().map(SqlValue::render_literal).collect();
                format!("({})", cells.join(", "))
            })
            .collect();

        Ok(Statement::new(format!(
            "INSERT INTO {} ({}) VALUES {}",
            table,
            column_list(columns),
            tuples.join(", ")
        )))
    }

    /// One statement covering every row of `table`.
    pub fn from_table(table: &DataTable) -> crate::Result<Statement> {
        Self::multi_row(table.name(), &table.schema.column_names(), table.rows())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ColumnDef, ColumnType, TableSchema};

    #[test]
    fn test_multi_row_quotes_every_value() {
        let rows = vec![
            vec![SqlValue::from(1), SqlValue::from("x")],
            vec![SqlValue::from(2), SqlValue::Null],
        ];
        let stmt = LiteralInsert::multi_row("t", &["a", "b"], &rows).unwrap();
        assert_eq!(
            stmt.sql,
            "INSERT INTO t (a, b) VALUES ('1', 'x'), ('2', NULL)"
        );
        assert!(stmt.params.is_empty());
    }

    #[test]
    fn test_from_table() {
        let schema = TableSchema::new(
            "people",
            vec![
                ColumnDef::new("id", ColumnType::Int),
                ColumnDef::new("name", ColumnType::VarChar),
            ],
        )
        .unwrap();
        let table = DataTable::with_rows(
            schema,
            vec![vec![SqlValue::from(7), SqlValue::from("O\\'Brien")]],
        )
        .unwrap();

        let stmt = LiteralInsert::from_table(&table).unwrap();
        assert_eq!(
            stmt.sql,
            "INSERT INTO people (id, name) VALUES ('7', 'O\\'Brien')"
        );
    }

    #[test]
    fn test_empty_table_rejected() {
        let schema =
            TableSchema::new("t", vec![ColumnDef::new("a", ColumnType::Int)]).unwrap();
        assert!(LiteralInsert::from_table(&DataTable::new(schema)).is_err());
    }
}
