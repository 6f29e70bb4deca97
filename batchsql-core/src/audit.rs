//! Error audit records and the table that stores them.
//!
//! The audit table is created on first use with a fixed schema:
//!
//! | column        | type                                  |
//! |---------------|---------------------------------------|
//! | `id`          | auto-increment primary key            |
//! | `project`     | `VARCHAR(20)`                         |
//! | `method_name` | `VARCHAR(100)`                        |
//! | `full_name`   | `VARCHAR(500)`                        |
//! | `message`     | `VARCHAR(1000)`                       |
//! | `information` | `TEXT`                                |
//! | `remark`      | `TEXT`, nullable                      |
//! | `error_time`  | `TIMESTAMP`, defaults to insert time  |

use chrono::NaiveDateTime;

use crate::models::SqlValue;
use crate::query::{ParameterBinding, Statement};

const PROJECT_WIDTH: usize = 20;
const METHOD_NAME_WIDTH: usize = 100;
const FULL_NAME_WIDTH: usize = 500;
const MESSAGE_WIDTH: usize = 1000;

const CLOSURE_SEGMENT: &str = "{{closure}}";

/// One row of the audit table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditRecord {
    /// Project the failure belongs to
    pub project: String,
    /// Normalized method name
    pub method_name: String,
    /// Qualified location, e.g. a module path
    pub full_name: String,
    /// Short failure message
    pub message: String,
    /// Message plus cause chain or backtrace
    pub information: String,
    /// Free-form remark, empty unless set
    pub remark: String,
    /// Explicit timestamp; `None` lets the server stamp the row
    pub error_time: Option<NaiveDateTime>,
}

impl AuditRecord {
    /// Creates a record with an empty remark.
    ///
    /// The row is stamped by the server's `error_time` default when inserted.
    /// The method name is normalized with [`normalize_method_name`].
    pub fn new(
        project: impl Into<String>,
        method_name: &str,
        full_name: impl Into<String>,
        message: impl Into<String>,
        information: impl Into<String>,
    ) -> Self {
        let full_name = full_name.into();
        Self {
            project: project.into(),
            method_name: normalize_method_name(method_name, &full_name),
            full_name,
            message: message.into(),
            information: information.into(),
            remark: String::new(),
            error_time: None,
        }
    }

    /// Builds a record from an error and its `source()` chain.
    ///
    /// `message` is the error's own display text; `information` adds every
    /// cause on its own line.
    pub fn from_error(
        project: impl Into<String>,
        method_name: &str,
        full_name: impl Into<String>,
        error: &(dyn std::error::Error + 'static),
    ) -> Self {
        Self::new(
            project,
            method_name,
            full_name,
            error.to_string(),
            error_report(error),
        )
    }

    /// Builder method to attach a remark.
    pub fn with_remark(mut self, remark: impl Into<String>) -> Self {
        self.remark = remark.into();
        self
    }

    /// Builder method to override the timestamp.
    pub fn with_error_time(mut self, error_time: NaiveDateTime) -> Self {
        self.error_time = Some(error_time);
        self
    }

    /// The INSERT for this record, fields clipped to their column widths.
    ///
    /// `error_time` is only listed when the record carries an explicit
    /// timestamp.
    pub fn insert_statement(&self, table: &str) -> crate::Result<Statement> {
        let mut params = ParameterBinding::from_pairs([
            ("project", SqlValue::from(clip(&self.project, PROJECT_WIDTH))),
            (
                "method_name",
                SqlValue::from(clip(&self.method_name, METHOD_NAME_WIDTH)),
            ),
            (
                "full_name",
                SqlValue::from(clip(&self.full_name, FULL_NAME_WIDTH)),
            ),
            ("message", SqlValue::from(clip(&self.message, MESSAGE_WIDTH))),
            ("information", SqlValue::from(self.information.as_str())),
            ("remark", SqlValue::from(self.remark.as_str())),
        ])?;

        let mut columns = "project, method_name, full_name, message, information, remark".to_string();
        let mut values =
            "@project, @method_name, @full_name, @message, @information, @remark".to_string();
        if let Some(error_time) = self.error_time {
            params.insert("error_time", SqlValue::DateTime(error_time))?;
            columns.push_str(", error_time");
            values.push_str(", @error_time");
        }

        Ok(Statement::with_params(
            format!("INSERT INTO {} ({}) VALUES ({})", table, columns, values),
            params,
        ))
    }
}

/// `CREATE TABLE IF NOT EXISTS` for the audit table.
pub fn create_table_sql(table: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {} (\
         id INT NOT NULL AUTO_INCREMENT COMMENT 'Key', \
         project VARCHAR({}) NOT NULL COMMENT 'Project name', \
         method_name VARCHAR({}) NOT NULL COMMENT 'Method name', \
         full_name VARCHAR({}) NOT NULL COMMENT 'Full path', \
         message VARCHAR({}) NOT NULL COMMENT 'Message', \
         information TEXT NOT NULL COMMENT 'Information', \
         remark TEXT COMMENT 'Remark', \
         error_time TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP COMMENT 'Record time', \
         PRIMARY KEY (id))",
        table, PROJECT_WIDTH, METHOD_NAME_WIDTH, FULL_NAME_WIDTH, MESSAGE_WIDTH
    )
}

/// Text between the first `<` and the next `>`, if non-empty.
fn angle_inner(text: &str) -> Option<&str> {
    let start = text.find('<')?.checked_add(1)?;
    let end = start.checked_add(text[start..].find('>')?)?;
    let inner = &text[start..end];
    (!inner.is_empty()).then_some(inner)
}

/// Recovers a readable method name from a generated one.
///
/// - `MoveNext` (a generated state machine) takes the name between the first
///   `<` and `>` of `full_name`.
/// - A name that itself contains `<...>` is reduced to the inner text.
/// - A closure or async frame (`{{closure}}`) takes the last named segment
///   of the `::`-separated `full_name`.
///
/// # Example
/// ```rust
/// use batchsql_core::audit::normalize_method_name;
///
/// assert_eq!(normalize_method_name("MoveNext", "App.Loader+<Import>d__4"), "Import");
/// assert_eq!(normalize_method_name("{{closure}}", "app::loader::import::{{closure}}"), "import");
/// assert_eq!(normalize_method_name("import", "app::loader"), "import");
/// ```
pub fn normalize_method_name(method_name: &str, full_name: &str) -> String {
    let mut name = method_name;

    if name == "MoveNext"
        && let Some(inner) = angle_inner(full_name)
    {
        name = inner;
    }
    if name.contains('<')
        && name.contains('>')
        && let Some(inner) = angle_inner(name)
    {
        name = inner;
    }
    if name.ends_with(CLOSURE_SEGMENT)
        && let Some(segment) = full_name
            .rsplit("::")
            .find(|s| !s.is_empty() && *s != CLOSURE_SEGMENT)
    {
        name = segment;
    }

    name.to_string()
}

/// Display text of `error` followed by each cause.
pub fn error_report(error: &(dyn std::error::Error + 'static)) -> String {
    let mut report = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        report.push_str("\nCaused by: ");
        report.push_str(&cause.to_string());
        source = cause.source();
    }
    report
}

fn clip(text: &str, width: usize) -> &str {
    match text.char_indices().nth(width) {
        Some((byte, _)) => &text[..byte],
        None => text,
    }
}
