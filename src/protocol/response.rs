use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::DriverError;
use crate::client::Handle;

/// Status code attached to every procedure response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "i8", into = "i8")]
pub enum ResponseStatus {
    Success,
    UserAbort,
    GracefulFailure,
    UnexpectedFailure,
    ConnectionLost,
    Unknown(i8),
}

impl From<i8> for ResponseStatus {
    fn from(code: i8) -> Self {
        match code {
            1 => ResponseStatus::Success,
            -1 => ResponseStatus::UserAbort,
            -2 => ResponseStatus::GracefulFailure,
            -3 => ResponseStatus::UnexpectedFailure,
            -4 => ResponseStatus::ConnectionLost,
            other => ResponseStatus::Unknown(other),
        }
    }
}

impl From<ResponseStatus> for i8 {
    fn from(status: ResponseStatus) -> Self {
        match status {
            ResponseStatus::Success => 1,
            ResponseStatus::UserAbort => -1,
            ResponseStatus::GracefulFailure => -2,
            ResponseStatus::UnexpectedFailure => -3,
            ResponseStatus::ConnectionLost => -4,
            ResponseStatus::Unknown(code) => code,
        }
    }
}

impl std::fmt::Display for ResponseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResponseStatus::Success => write!(f, "SUCCESS"),
            ResponseStatus::UserAbort => write!(f, "USER_ABORT"),
            ResponseStatus::GracefulFailure => write!(f, "GRACEFUL_FAILURE"),
            ResponseStatus::UnexpectedFailure => write!(f, "UNEXPECTED_FAILURE"),
            ResponseStatus::ConnectionLost => write!(f, "CONNECTION_LOST"),
            ResponseStatus::Unknown(code) => write!(f, "UNKNOWN({})", code),
        }
    }
}

/// Column metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub column_type: String,
}

impl Column {
    pub fn new(name: &str, column_type: &str) -> Self {
        Self {
            name: name.to_string(),
            column_type: column_type.to_string(),
        }
    }
}

/// A result table: column metadata plus rows of dynamic values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub columns: Vec<Column>,
    #[serde(default)]
    pub rows: Vec<Vec<Value>>,
}

impl Table {
    pub fn new(columns: Vec<Column>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn with_row(mut self, row: Vec<Value>) -> Self {
        self.rows.push(row);
        self
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Case-insensitive column lookup
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn fetch_row(&self, index: usize) -> Option<Row<'_>> {
        self.rows.get(index).map(|values| Row {
            table: self,
            values,
        })
    }

    pub fn iter_rows(&self) -> impl Iterator<Item = Row<'_>> {
        self.rows.iter().map(move |values| Row {
            table: self,
            values,
        })
    }
}

/// Borrowed view of one table row
#[derive(Debug, Clone, Copy)]
pub struct Row<'a> {
    table: &'a Table,
    values: &'a [Value],
}

impl<'a> Row<'a> {
    pub fn values(&self) -> &'a [Value] {
        self.values
    }

    pub fn get(&self, column: &str) -> Option<&'a Value> {
        self.table
            .column_index(column)
            .and_then(|idx| self.values.get(idx))
    }

    /// Returns `Ok(None)` for SQL NULL.
    pub fn get_string(&self, column: &str) -> Result<Option<&'a str>, DriverError> {
        match self.get(column) {
            None => Err(DriverError::ProtocolError(format!(
                "Unknown column: {}",
                column
            ))),
            Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.as_str())),
            Some(other) => Err(DriverError::ProtocolError(format!(
                "Column {} is not a string: {}",
                column, other
            ))),
        }
    }

    /// Returns `Ok(None)` for SQL NULL.
    pub fn get_i64(&self, column: &str) -> Result<Option<i64>, DriverError> {
        match self.get(column) {
            None => Err(DriverError::ProtocolError(format!(
                "Unknown column: {}",
                column
            ))),
            Some(Value::Null) => Ok(None),
            Some(v) => v.as_i64().map(Some).ok_or_else(|| {
                DriverError::ProtocolError(format!("Column {} is not an integer: {}", column, v))
            }),
        }
    }
}

/// Response frame as it travels on the wire
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseFrame {
    pub handle: Handle,
    pub status: ResponseStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_string: Option<String>,
    #[serde(default)]
    pub app_status: i8,
    #[serde(default)]
    pub tables: Vec<Table>,
}

impl ResponseFrame {
    pub fn success(handle: Handle, tables: Vec<Table>) -> Self {
        Self {
            handle,
            status: ResponseStatus::Success,
            status_string: None,
            app_status: 0,
            tables,
        }
    }

    pub fn failure(handle: Handle, status: ResponseStatus, message: &str) -> Self {
        Self {
            handle,
            status,
            status_string: Some(message.to_string()),
            app_status: 0,
            tables: Vec::new(),
        }
    }

    /// Turns a non-success status into the error a caller sees
    pub fn check_status(&self) -> Result<(), DriverError> {
        if self.status == ResponseStatus::Success {
            return Ok(());
        }
        Err(DriverError::ServerError {
            status: self.status,
            message: self.status_string.clone().unwrap_or_default(),
        })
    }
}

/// Decoded result of a query call
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResponse {
    pub status: ResponseStatus,
    pub status_string: Option<String>,
    pub app_status: i8,
    pub tables: Vec<Table>,
}

impl QueryResponse {
    pub fn table_count(&self) -> usize {
        self.tables.len()
    }

    pub fn table(&self, index: usize) -> Option<&Table> {
        self.tables.get(index)
    }
}

impl From<ResponseFrame> for QueryResponse {
    fn from(frame: ResponseFrame) -> Self {
        Self {
            status: frame.status,
            status_string: frame.status_string,
            app_status: frame.app_status,
            tables: frame.tables,
        }
    }
}

/// Decoded result of an exec call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecResult {
    pub rows_affected: i64,
}

impl From<ResponseFrame> for ExecResult {
    fn from(frame: ResponseFrame) -> Self {
        // Each modifying statement reports its tuple count in the first cell.
        let rows_affected = frame
            .tables
            .iter()
            .filter_map(|t| t.rows.first().and_then(|r| r.first()))
            .filter_map(Value::as_i64)
            .sum();
        Self { rows_affected }
    }
}
