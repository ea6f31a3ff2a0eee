//! Protocol-level MySQL driver for mysql-compat.
//!
//! Wraps the `mysql` crate behind the small surface the client layer needs:
//! connect, query, select-db, ping, close. Row values and column metadata
//! are converted into owned, driver-independent types here so the layers
//! above never see `mysql::Row` directly.

use mysql::prelude::*;
use mysql::{OptsBuilder, Pool};
use std::fmt;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Default MySQL port.
pub const DEFAULT_PORT: u16 = 3306;

/// Client error: could not reach the server.
pub const CR_CONNECTION_ERROR: u16 = 2002;
/// Client error: the server closed the connection (or it was never open).
pub const CR_SERVER_GONE_ERROR: u16 = 2006;
/// Server error: authentication failed.
pub const ER_ACCESS_DENIED_ERROR: u16 = 1045;
/// Server error: SQL syntax error.
pub const ER_PARSE_ERROR: u16 = 1064;
/// Server error: unknown database.
pub const ER_BAD_DB_ERROR: u16 = 1049;

// Column flag bits from the wire protocol, as surfaced in field metadata.
pub const NOT_NULL_FLAG: u32 = 0x0001;
pub const PRI_KEY_FLAG: u32 = 0x0002;
pub const UNIQUE_KEY_FLAG: u32 = 0x0004;
pub const MULTIPLE_KEY_FLAG: u32 = 0x0008;
pub const BLOB_FLAG: u32 = 0x0010;
pub const UNSIGNED_FLAG: u32 = 0x0020;
pub const AUTO_INCREMENT_FLAG: u32 = 0x0200;
pub const NUM_FLAG: u32 = 0x8000;

// ---------------------------------------------------------------------------
// DriverError
// ---------------------------------------------------------------------------

/// An error from the driver layer, carrying a MySQL client/server error code.
#[derive(Debug, Clone, PartialEq)]
pub struct DriverError {
    /// MySQL error number (CR_* client codes or ER_* server codes).
    pub code: u16,
    /// Human-readable error message.
    pub message: String,
    /// SQLSTATE error code.
    pub sqlstate: String,
}

impl DriverError {
    pub fn new(code: u16, message: &str) -> Self {
        Self {
            code,
            message: message.to_string(),
            sqlstate: "HY000".to_string(),
        }
    }

    pub fn connection_error(message: &str) -> Self {
        Self::new(CR_CONNECTION_ERROR, message)
    }

    pub fn gone_away() -> Self {
        Self::new(CR_SERVER_GONE_ERROR, "MySQL server has gone away")
    }
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "driver error {}: {}", self.code, self.message)
    }
}

impl std::error::Error for DriverError {}

// ---------------------------------------------------------------------------
// ColumnType — MySQL column types
// ---------------------------------------------------------------------------

/// MySQL column/field data types as defined in the wire protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ColumnType {
    Decimal = 0x00,
    Tiny = 0x01,
    Short = 0x02,
    Long = 0x03,
    Float = 0x04,
    Double = 0x05,
    Null = 0x06,
    Timestamp = 0x07,
    LongLong = 0x08,
    Int24 = 0x09,
    Date = 0x0A,
    Time = 0x0B,
    DateTime = 0x0C,
    Year = 0x0D,
    Varchar = 0x0F,
    Bit = 0x10,
    Json = 0xF5,
    NewDecimal = 0xF6,
    Enum = 0xF7,
    Set = 0xF8,
    TinyBlob = 0xF9,
    MediumBlob = 0xFA,
    LongBlob = 0xFB,
    Blob = 0xFC,
    VarString = 0xFD,
    String = 0xFE,
    Geometry = 0xFF,
}

impl ColumnType {
    /// Convert a raw wire-protocol byte to a ColumnType. Unknown bytes map
    /// to None.
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0x00 => Some(ColumnType::Decimal),
            0x01 => Some(ColumnType::Tiny),
            0x02 => Some(ColumnType::Short),
            0x03 => Some(ColumnType::Long),
            0x04 => Some(ColumnType::Float),
            0x05 => Some(ColumnType::Double),
            0x06 => Some(ColumnType::Null),
            0x07 => Some(ColumnType::Timestamp),
            0x08 => Some(ColumnType::LongLong),
            0x09 => Some(ColumnType::Int24),
            0x0A => Some(ColumnType::Date),
            0x0B => Some(ColumnType::Time),
            0x0C => Some(ColumnType::DateTime),
            0x0D => Some(ColumnType::Year),
            0x0F => Some(ColumnType::Varchar),
            0x10 => Some(ColumnType::Bit),
            0xF5 => Some(ColumnType::Json),
            0xF6 => Some(ColumnType::NewDecimal),
            0xF7 => Some(ColumnType::Enum),
            0xF8 => Some(ColumnType::Set),
            0xF9 => Some(ColumnType::TinyBlob),
            0xFA => Some(ColumnType::MediumBlob),
            0xFB => Some(ColumnType::LongBlob),
            0xFC => Some(ColumnType::Blob),
            0xFD => Some(ColumnType::VarString),
            0xFE => Some(ColumnType::String),
            0xFF => Some(ColumnType::Geometry),
            _ => None,
        }
    }

    /// Human-readable name, as surfaced by field introspection.
    pub fn name(&self) -> &'static str {
        match self {
            ColumnType::Decimal => "DECIMAL",
            ColumnType::Tiny => "TINY",
            ColumnType::Short => "SHORT",
            ColumnType::Long => "LONG",
            ColumnType::Float => "FLOAT",
            ColumnType::Double => "DOUBLE",
            ColumnType::Null => "NULL",
            ColumnType::Timestamp => "TIMESTAMP",
            ColumnType::LongLong => "LONGLONG",
            ColumnType::Int24 => "INT24",
            ColumnType::Date => "DATE",
            ColumnType::Time => "TIME",
            ColumnType::DateTime => "DATETIME",
            ColumnType::Year => "YEAR",
            ColumnType::Varchar => "VARCHAR",
            ColumnType::Bit => "BIT",
            ColumnType::Json => "JSON",
            ColumnType::NewDecimal => "NEWDECIMAL",
            ColumnType::Enum => "ENUM",
            ColumnType::Set => "SET",
            ColumnType::TinyBlob => "TINYBLOB",
            ColumnType::MediumBlob => "MEDIUMBLOB",
            ColumnType::LongBlob => "LONGBLOB",
            ColumnType::Blob => "BLOB",
            ColumnType::VarString => "VAR_STRING",
            ColumnType::String => "STRING",
            ColumnType::Geometry => "GEOMETRY",
        }
    }
}

// ---------------------------------------------------------------------------
// SqlValue
// ---------------------------------------------------------------------------

/// A value in a query result row.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlValue::Null => write!(f, "NULL"),
            SqlValue::Int(v) => write!(f, "{}", v),
            SqlValue::Float(v) => write!(f, "{}", v),
            SqlValue::Str(v) => write!(f, "{}", v),
            SqlValue::Bytes(v) => write!(f, "<bytes({})>", v.len()),
        }
    }
}

// ---------------------------------------------------------------------------
// ColumnMeta
// ---------------------------------------------------------------------------

/// Metadata for one column of a result set.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnMeta {
    /// Column name (alias).
    pub name: String,
    /// Table this column belongs to.
    pub table: String,
    /// Wire-protocol column type.
    pub column_type: ColumnType,
    /// Maximum column length.
    pub length: u32,
    /// Column flag bits (NOT_NULL_FLAG etc.).
    pub flags: u32,
}

// ---------------------------------------------------------------------------
// QueryOutput
// ---------------------------------------------------------------------------

/// The fully materialized outcome of one query.
#[derive(Debug, Clone, Default)]
pub struct QueryOutput {
    /// Column metadata, in select-list order. Empty for statements that
    /// return no result set.
    pub columns: Vec<ColumnMeta>,
    /// All rows, converted to owned values.
    pub rows: Vec<Vec<SqlValue>>,
}

// ---------------------------------------------------------------------------
// ConnectionState
// ---------------------------------------------------------------------------

/// Lifecycle state of a driver connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Connected and ready to accept commands.
    Ready,
    /// Connection has been closed.
    Closed,
}

// ---------------------------------------------------------------------------
// DriverConnection
// ---------------------------------------------------------------------------

/// A live connection to a MySQL server.
pub struct DriverConnection {
    /// Current lifecycle state.
    pub state: ConnectionState,
    /// Server version string from the handshake.
    pub server_version: String,
    /// Connection/thread ID assigned by the server.
    pub connection_id: u32,
    /// Authenticated username.
    pub username: String,
    /// Current default database.
    pub database: String,
    /// Host connected to.
    pub host: String,
    /// Port connected to.
    pub port: u16,
    /// Underlying connection pool.
    pool: Option<Pool>,
}

impl fmt::Debug for DriverConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverConnection")
            .field("state", &self.state)
            .field("server_version", &self.server_version)
            .field("connection_id", &self.connection_id)
            .field("username", &self.username)
            .field("database", &self.database)
            .finish()
    }
}

/// Open a connection to a MySQL server.
pub fn connect(
    host: &str,
    user: &str,
    password: &str,
    database: &str,
    port: u16,
) -> Result<DriverConnection, DriverError> {
    if host.is_empty() {
        return Err(DriverError::connection_error("No hostname provided"));
    }
    if user.is_empty() {
        return Err(DriverError::new(ER_ACCESS_DENIED_ERROR, "No username provided"));
    }

    let port_to_use = if port == 0 { DEFAULT_PORT } else { port };

    let opts = OptsBuilder::new()
        .ip_or_hostname(Some(host))
        .tcp_port(port_to_use)
        .user(Some(user))
        .pass(Some(password))
        .db_name(if database.is_empty() { None } else { Some(database) });

    let pool = Pool::new(opts)
        .map_err(|e| DriverError::connection_error(&format!("Connection failed: {}", e)))?;

    // Verify the pool can actually hand out a connection before reporting
    // success; Pool::new itself is lazy.
    let mut conn = pool
        .get_conn()
        .map_err(|e| DriverError::connection_error(&format!("Connection failed: {}", e)))?;

    let server_version: String = conn
        .query_first("SELECT VERSION()")
        .map_err(|e| DriverError::connection_error(&format!("Failed to get version: {}", e)))?
        .unwrap_or_else(|| "8.0.0".to_string());

    let connection_id: u32 = conn
        .query_first("SELECT CONNECTION_ID()")
        .map_err(|e| {
            DriverError::connection_error(&format!("Failed to get connection ID: {}", e))
        })?
        .unwrap_or(1);

    drop(conn); // return the probe connection to the pool

    Ok(DriverConnection {
        state: ConnectionState::Ready,
        server_version,
        connection_id,
        username: user.to_string(),
        database: database.to_string(),
        host: host.to_string(),
        port: port_to_use,
        pool: Some(pool),
    })
}

/// Execute a query and materialize the full result set.
pub fn query(conn: &mut DriverConnection, sql: &str) -> Result<QueryOutput, DriverError> {
    if conn.state != ConnectionState::Ready {
        return Err(DriverError::gone_away());
    }

    let pool = conn.pool.as_ref().ok_or_else(DriverError::gone_away)?;

    let mut pool_conn = pool
        .get_conn()
        .map_err(|e| DriverError::new(CR_SERVER_GONE_ERROR, &format!("Failed to get connection: {}", e)))?;

    let rows: Vec<mysql::Row> = pool_conn
        .query(sql)
        .map_err(|e| DriverError::new(ER_PARSE_ERROR, &format!("Query error: {}", e)))?;

    let mut columns = Vec::new();
    if let Some(first_row) = rows.first() {
        for col in first_row.columns().iter() {
            let raw_type = col.column_type() as u8;
            columns.push(ColumnMeta {
                name: col.name_str().to_string(),
                table: col.table_str().to_string(),
                column_type: ColumnType::from_byte(raw_type).unwrap_or(ColumnType::String),
                length: col.column_length(),
                flags: col.flags().bits() as u32,
            });
        }
    }

    let mut out_rows = Vec::with_capacity(rows.len());
    for row in rows {
        let mut values = Vec::with_capacity(row.len());
        for idx in 0..row.len() {
            values.push(convert_value(&row, idx));
        }
        out_rows.push(values);
    }

    Ok(QueryOutput {
        columns,
        rows: out_rows,
    })
}

/// Switch the default database for the connection.
pub fn select_db(conn: &mut DriverConnection, database: &str) -> Result<(), DriverError> {
    if conn.state != ConnectionState::Ready {
        return Err(DriverError::gone_away());
    }
    if database.is_empty() {
        return Err(DriverError::new(ER_BAD_DB_ERROR, "No database name provided"));
    }

    let pool = conn.pool.as_ref().ok_or_else(DriverError::gone_away)?;
    let mut pool_conn = pool
        .get_conn()
        .map_err(|e| DriverError::new(CR_SERVER_GONE_ERROR, &format!("Failed to get connection: {}", e)))?;

    pool_conn
        .query_drop(format!("USE `{}`", database.replace('`', "``")))
        .map_err(|e| DriverError::new(ER_BAD_DB_ERROR, &format!("Cannot use database: {}", e)))?;

    conn.database = database.to_string();
    Ok(())
}

/// Check whether the server is still reachable on this connection.
pub fn ping(conn: &mut DriverConnection) -> bool {
    if conn.state != ConnectionState::Ready {
        return false;
    }
    let pool = match conn.pool.as_ref() {
        Some(p) => p,
        None => return false,
    };
    match pool.get_conn() {
        Ok(mut c) => c.query_drop("SELECT 1").is_ok(),
        Err(_) => false,
    }
}

/// Close the connection and drop the pool.
pub fn close(conn: &mut DriverConnection) {
    conn.pool = None;
    conn.state = ConnectionState::Closed;
}

/// Convert one cell of a `mysql::Row` to an owned SqlValue.
fn convert_value(row: &mysql::Row, idx: usize) -> SqlValue {
    if row.as_ref(idx).is_none() {
        return SqlValue::Null;
    }
    if let Some(s) = row.get::<String, usize>(idx) {
        SqlValue::Str(s)
    } else if let Some(i) = row.get::<i64, usize>(idx) {
        SqlValue::Int(i)
    } else if let Some(f) = row.get::<f64, usize>(idx) {
        SqlValue::Float(f)
    } else if let Some(b) = row.get::<Vec<u8>, usize>(idx) {
        SqlValue::Bytes(b)
    } else {
        SqlValue::Null
    }
}

// ===========================================================================
// Tests
// ===========================================================================
