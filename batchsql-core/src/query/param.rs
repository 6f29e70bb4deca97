//! Parameterized INSERT builders.
//!
//! Values never appear in the SQL text produced here. Multi-row placeholders
//! are named from a structured `(row, column)` key, `@r{row}c{col}`, so two
//! cells cannot collapse onto one name regardless of table width. Single-row
//! placeholders reuse the column keys when every key is a valid placeholder
//! name and are otherwise all positional.

use super::{BoundStatement, MAX_PLACEHOLDERS, ParameterBinding, Statement, column_list, validate_shape};
use crate::error::BatchSqlError;
use crate::models::{ParamDef, RowMap, SqlValue, TableSchema};

/// Builder for statements whose values are bound by the driver.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParamInsert;

fn cell_placeholder(row: usize, column: usize) -> String {
    format!("r{}c{}", row, column)
}

fn is_placeholder_name(key: &str) -> bool {
    !key.is_empty() && key.chars().all(super::is_placeholder_char)
}

impl ParamInsert {
    /// `INSERT INTO t (k1, k2) VALUES (@k1, @k2)` for one row.
    ///
    /// If any key is not a valid placeholder name, every placeholder is named
    /// by position (`@p0`, `@p1`, ...) instead, so a key spelled like a
    /// positional name cannot collide with one.
    ///
    /// # Errors
    /// Returns an input error for an empty map.
    pub fn single_row(table: &str, data: &RowMap) -> crate::Result<Statement> {
        if data.is_empty() {
            return Err(BatchSqlError::empty_input("row map"));
        }
        let columns: Vec<&str> = data.keys().map(String::as_str).collect();
        validate_shape(table, &columns, &[data.values().cloned().collect()])?;

        let by_key = data.keys().all(|key| is_placeholder_name(key));
        let mut params = ParameterBinding::new();
        let mut placeholders = Vec::with_capacity(data.len());
        for (index, (key, value)) in data.iter().enumerate() {
            let name = if by_key {
                key.clone()
            } else {
                format!("p{}", index)
            };
            placeholders.push(format!("@{}", name));
            params.insert(&name, value.clone())?;
        }

        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            table,
            column_list(&columns),
            placeholders.join(", ")
        );
        Ok(Statement::with_params(sql, params))
    }

    /// Multi-row INSERTs with one value tuple per row, split into as few
    /// statements as the placeholder limit allows.
    ///
    /// Placeholder row indices keep counting across chunks, so every cell of
    /// the batch has a distinct name.
    pub fn multi_row_chunks<C: AsRef<str>>(
        table: &str,
        columns: &[C],
        rows: &[Vec<SqlValue>],
    ) -> crate::Result<Vec<Statement>> {
        validate_shape(table, columns, rows)?;
        let rows_per_statement = MAX_PLACEHOLDERS
            .checked_div(columns.len())
            .unwrap_or(1)
            .max(1);
        rows.chunks(rows_per_statement)
            .enumerate()
            .map(|(chunk, slice)| {
                Self::build_multi_row(table, columns, slice, chunk.saturating_mul(rows_per_statement))
            })
            .collect()
    }

    fn build_multi_row<C: AsRef<str>>(
        table: &str,
        columns: &[C],
        rows: &[Vec<SqlValue>],
        first_row: usize,
    ) -> crate::Result<Statement> {
        let mut params = ParameterBinding::new();
        let mut tuples = Vec::with_capacity(rows.len());
        for (offset, row) in rows.iter().enumerate() {
            let row_index = first_row.saturating_add(offset);
            let mut placeholders = Vec::with_capacity(row.len());
            for (column_index, value) in row.iter().enumerate() {
                let name = cell_placeholder(row_index, column_index);
                placeholders.push(format!("@{}", name));
                params.insert(&name, value.clone())?;
            }
            tuples.push(format!("({})", placeholders.join(", ")));
        }

        let sql = format!(
            "INSERT INTO {} ({}) VALUES {}",
            table,
            column_list(columns),
            tuples.join(", ")
        );
        Ok(Statement::with_params(sql, params))
    }
}

/// One positional INSERT reused for every row of a table.
///
/// Each [`ParamDef`] names a source column of the table; the cell in that
/// column is coerced to the definition's type and length before binding.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedInsert {
    sql: String,
    params: Vec<ParamDef>,
    source_columns: Vec<usize>,
}

impl PreparedInsert {
    /// Prepares `INSERT INTO t (a, b) VALUES (?, ?)` for `params`.
    ///
    /// # Errors
    /// Returns an input error if `params` is empty, names a column twice,
    /// or names a column the schema does not have.
    pub fn new(schema: &TableSchema, params: &[ParamDef]) -> crate::Result<Self> {
        if params.is_empty() {
            return Err(BatchSqlError::InvalidArgument {
                name: "parameters".to_string(),
            });
        }
        crate::models::ensure_unique(params.iter().map(|p| p.name.as_str()))?;

        let source_columns = params
            .iter()
            .map(|p| {
                schema.column_index(&p.name).ok_or_else(|| {
                    BatchSqlError::input(format!(
                        "parameter '{}' has no matching column in '{}'",
                        p.name, schema.name
                    ))
                })
            })
            .collect::<crate::Result<Vec<_>>>()?;

        let names: Vec<&str> = params.iter().map(|p| p.name.as_str()).collect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            schema.name,
            column_list(&names),
            vec!["?"; params.len()].join(", ")
        );

        Ok(Self {
            sql,
            params: params.to_vec(),
            source_columns,
        })
    }

    /// The positional SQL text.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Binds one source row.
    pub fn bind_row(&self, row: &[SqlValue]) -> crate::Result<BoundStatement> {
        let values = self
            .params
            .iter()
            .zip(&self.source_columns)
            .map(|(def, &column)| {
                let cell = row.get(column).ok_or_else(|| {
                    BatchSqlError::input(format!("row has no value for column '{}'", def.name))
                })?;
                def.bind_value(cell)
            })
            .collect::<crate::Result<Vec<_>>>()?;

        Ok(BoundStatement {
            sql: self.sql.clone(),
            values,
        })
    }
}
