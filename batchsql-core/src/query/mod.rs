//! SQL statement construction.
//!
//! Statements are written with named `@placeholders` and a
//! [`ParameterBinding`]; [`Statement::bind`] rewrites them into the driver's
//! positional form just before execution.
//!
//! # Module Structure
//! - `param`: parameterized INSERT builders (the default for every write)
//! - `literal`: values inlined as quoted text, for trusted input only
//! - `csv`: quote-aware CSV decoding into rows

pub mod csv;
pub mod literal;
pub mod param;

pub use self::csv::CsvEncoding;
pub use literal::LiteralInsert;
pub use param::{ParamInsert, PreparedInsert};

use std::collections::HashMap;

use crate::error::BatchSqlError;
use crate::models::SqlValue;

/// Most placeholders MySQL accepts in one prepared statement.
pub const MAX_PLACEHOLDERS: usize = 65_535;

/// Ordered placeholder name to value mapping.
///
/// Names are stored without the `@` sigil; every lookup accepts either form.
/// Inserting a name twice is an error, so two cells can never silently share
/// a placeholder. Lookups go through a name index, so binding a statement
/// with tens of thousands of placeholders stays linear.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterBinding {
    entries: Vec<(String, SqlValue)>,
    index: HashMap<String, usize>,
}

fn strip_sigil(name: &str) -> &str {
    name.strip_prefix('@').unwrap_or(name)
}

impl ParameterBinding {
    /// Creates an empty binding.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a binding from pairs, rejecting duplicate names.
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> crate::Result<Self>
    where
        K: AsRef<str>,
        V: Into<SqlValue>,
    {
        let mut binding = Self::new();
        for (name, value) in pairs {
            binding.insert(name.as_ref(), value)?;
        }
        Ok(binding)
    }

    /// Adds a placeholder value.
    ///
    /// # Errors
    /// Returns an input error if the name is empty or already bound.
    pub fn insert(&mut self, name: &str, value: impl Into<SqlValue>) -> crate::Result<()> {
        let name = strip_sigil(name);
        if name.is_empty() {
            return Err(BatchSqlError::input("placeholder name cannot be empty"));
        }
        if self.index.contains_key(name) {
            return Err(BatchSqlError::input(format!(
                "placeholder @{} is bound more than once",
                name
            )));
        }
        self.index.insert(name.to_string(), self.entries.len());
        self.entries.push((name.to_string(), value.into()));
        Ok(())
    }

    /// Looks up a value by placeholder name.
    pub fn get(&self, name: &str) -> Option<&SqlValue> {
        let position = *self.index.get(strip_sigil(name))?;
        self.entries.get(position).map(|(_, value)| value)
    }

    /// Number of bound placeholders.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is bound.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Bound pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &SqlValue)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }
}

/// SQL text with named placeholders plus their values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Statement {
    /// SQL text with `@name` placeholders
    pub sql: String,
    /// Values for the placeholders
    pub params: ParameterBinding,
}

/// SQL text with positional `?` placeholders and values in order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoundStatement {
    /// SQL text with `?` placeholders
    pub sql: String,
    /// One value per `?`, in order
    pub values: Vec<SqlValue>,
}

impl BoundStatement {
    /// A statement without parameters, sent as-is.
    pub fn raw(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            values: Vec::new(),
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum ScanState {
    Normal,
    Quoted(char),
    LineComment,
    BlockComment,
}

fn is_placeholder_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '$'
}

impl Statement {
    /// A statement with no parameters.
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: ParameterBinding::new(),
        }
    }

    /// A statement with named parameters.
    pub fn with_params(sql: impl Into<String>, params: ParameterBinding) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }

    /// Rewrites named placeholders into positional ones.
    ///
    /// Every `@name` outside quotes, backticks and comments becomes `?`, and
    /// its value is appended in order of appearance. `@@variables` are left
    /// alone. A statement with an empty binding is passed through untouched.
    ///
    /// # Errors
    /// Returns an input error if a placeholder has no bound value.
    ///
    /// # Example
    /// ```rust
    /// use batchsql_core::query::{ParameterBinding, Statement};
    ///
    /// let params = ParameterBinding::from_pairs([("@id", 7)])?;
    /// let bound = Statement::with_params("SELECT name FROM t WHERE id = @id AND tag <> '@id'", params).bind()?;
    /// assert_eq!(bound.sql, "SELECT name FROM t WHERE id = ? AND tag <> '@id'");
    /// assert_eq!(bound.values.len(), 1);
    /// # Ok::<(), batchsql_core::BatchSqlError>(())
    /// ```
    pub fn bind(&self) -> crate::Result<BoundStatement> {
        if self.params.is_empty() {
            return Ok(BoundStatement::raw(self.sql.clone()));
        }

        let mut sql = String::with_capacity(self.sql.len());
        let mut values = Vec::new();
        let mut state = ScanState::Normal;
        let mut chars = self.sql.chars().peekable();

        while let Some(c) = chars.next() {
            match state {
                ScanState::Normal => match c {
                    '\'' | '"' | '`' => {
                        state = ScanState::Quoted(c);
                        sql.push(c);
                    }
                    '#' => {
                        state = ScanState::LineComment;
                        sql.push(c);
                    }
                    '-' if chars.peek() == Some(&'-') => {
                        state = ScanState::LineComment;
                        sql.push(c);
                    }
                    '/' if chars.peek() == Some(&'*') => {
                        state = ScanState::BlockComment;
                        sql.push(c);
                        if let Some(star) = chars.next() {
                            sql.push(star);
                        }
                    }
                    '@' if chars.peek() == Some(&'@') => {
                        sql.push(c);
                        while let Some(&next) = chars.peek() {
                            if next == '@' || is_placeholder_char(next) || next == '.' {
                                sql.push(next);
                                chars.next();
                            } else {
                                break;
                            }
                        }
                    }
                    '@' if chars.peek().is_some_and(|n| is_placeholder_char(*n)) => {
                        let mut name = String::new();
                        while let Some(&next) = chars.peek() {
                            if !is_placeholder_char(next) {
                                break;
                            }
                            name.push(next);
                            chars.next();
                        }
                        let value = self.params.get(&name).ok_or_else(|| {
                            BatchSqlError::input(format!("no value bound for placeholder @{}", name))
                        })?;
                        sql.push('?');
                        values.push(value.clone());
                    }
                    _ => sql.push(c),
                },
                ScanState::Quoted(quote) => {
                    sql.push(c);
                    if c == '\\' && quote != '`' {
                        if let Some(escaped) = chars.next() {
                            sql.push(escaped);
                        }
                    } else if c == quote {
                        state = ScanState::Normal;
                    }
                }
                ScanState::LineComment => {
                    sql.push(c);
                    if c == '\n' {
                        state = ScanState::Normal;
                    }
                }
                ScanState::BlockComment => {
                    sql.push(c);
                    if c == '*' && chars.peek() == Some(&'/') {
                        if let Some(slash) = chars.next() {
                            sql.push(slash);
                        }
                        state = ScanState::Normal;
                    }
                }
            }
        }

        if values.len() < self.params.len() {
            tracing::debug!(
                "{} bound parameter(s) not referenced by statement",
                self.params.len().saturating_sub(values.len())
            );
        }

        Ok(BoundStatement { sql, values })
    }
}

/// Validates an INSERT target: identifiers, column uniqueness, row widths.
pub(crate) fn validate_shape<C: AsRef<str>>(
    table: &str,
    columns: &[C],
    rows: &[Vec<SqlValue>],
) -> crate::Result<()> {
    if table.trim().is_empty() {
        return Err(BatchSqlError::InvalidArgument {
            name: "table name".to_string(),
        });
    }
    if columns.is_empty() {
        return Err(BatchSqlError::input("at least one column is required"));
    }
    crate::models::ensure_unique(columns.iter().map(AsRef::as_ref))?;
    if rows.is_empty() {
        return Err(BatchSqlError::input(format!(
            "no rows to write into '{}'",
            table
        )));
    }
    if let Some((index, row)) = rows
        .iter()
        .enumerate()
        .find(|(_, row)| row.len() != columns.len())
    {
        return Err(BatchSqlError::input(format!(
            "row {} has {} values, expected {}",
            index.saturating_add(1),
            row.len(),
            columns.len()
        )));
    }
    Ok(())
}

/// Joins column names for an INSERT column list.
pub(crate) fn column_list<C: AsRef<str>>(columns: &[C]) -> String {
    columns
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(", ")
}
