//! Modern MySQL client surface for mysql-compat.
//!
//! This is the handle-oriented API the legacy shim delegates to: one `Link`
//! per connection, fully materialized `ResultSet` cursors, and free functions
//! mirroring the mysqli call surface (connect, query, fetch, field
//! introspection, escaping). Errors surface as `Result` here; the shim layer
//! flattens them to the legacy untyped convention.

use mysql_compat_driver as driver;
use std::collections::HashMap;
use std::fmt;

pub use mysql_compat_driver::{ColumnMeta, ColumnType, SqlValue, DEFAULT_PORT};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Fetch mode: return an associative row.
pub const FETCH_ASSOC: i32 = 1;
/// Fetch mode: return an index-keyed row.
pub const FETCH_NUM: i32 = 2;
/// Fetch mode: return both associative and index keys.
pub const FETCH_BOTH: i32 = 3;

// ---------------------------------------------------------------------------
// ClientError
// ---------------------------------------------------------------------------

/// An error from the client layer.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientError {
    /// MySQL error number.
    pub errno: i32,
    /// Human-readable error message.
    pub message: String,
    /// SQLSTATE error code.
    pub sqlstate: String,
}

impl ClientError {
    pub fn new(errno: i32, message: &str) -> Self {
        Self {
            errno,
            message: message.to_string(),
            sqlstate: "HY000".to_string(),
        }
    }

    pub fn gone_away() -> Self {
        Self::new(
            driver::CR_SERVER_GONE_ERROR as i32,
            "MySQL server has gone away",
        )
    }
}

impl From<driver::DriverError> for ClientError {
    fn from(e: driver::DriverError) -> Self {
        Self {
            errno: e.code as i32,
            message: e.message,
            sqlstate: e.sqlstate,
        }
    }
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "error {}: {}", self.errno, self.message)
    }
}

impl std::error::Error for ClientError {}

// ---------------------------------------------------------------------------
// Field
// ---------------------------------------------------------------------------

/// Describes a column/field in a result set.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    /// Column name.
    pub name: String,
    /// Table this column belongs to.
    pub table: String,
    /// Column type.
    pub column_type: ColumnType,
    /// Maximum length of the column.
    pub length: u32,
    /// Column flag bits (see the driver crate's *_FLAG constants).
    pub flags: u32,
}

impl Field {
    /// Human-readable type name (e.g. "LONG", "VAR_STRING").
    pub fn type_name(&self) -> &'static str {
        self.column_type.name()
    }

    pub fn not_null(&self) -> bool {
        self.flags & driver::NOT_NULL_FLAG != 0
    }

    pub fn is_primary_key(&self) -> bool {
        self.flags & driver::PRI_KEY_FLAG != 0
    }

    pub fn is_blob(&self) -> bool {
        self.flags & driver::BLOB_FLAG != 0
    }
}

impl From<ColumnMeta> for Field {
    fn from(meta: ColumnMeta) -> Self {
        Self {
            name: meta.name,
            table: meta.table,
            column_type: meta.column_type,
            length: meta.length,
            flags: meta.flags,
        }
    }
}

// ---------------------------------------------------------------------------
// ResultSet
// ---------------------------------------------------------------------------

/// A fully materialized result set with sequential row and field cursors.
#[derive(Debug, Clone)]
pub struct ResultSet {
    /// All rows in the result set.
    pub rows: Vec<Vec<SqlValue>>,
    /// Field/column metadata, in select-list order.
    pub fields: Vec<Field>,
    /// Current row pointer (for sequential fetching).
    pub current_row: usize,
    /// Current field pointer (for sequential field introspection).
    pub current_field: usize,
}

impl ResultSet {
    /// Create a new empty result set.
    pub fn new() -> Self {
        Self {
            rows: Vec::new(),
            fields: Vec::new(),
            current_row: 0,
            current_field: 0,
        }
    }

    /// Create a result set from rows and field metadata.
    pub fn from_rows(rows: Vec<Vec<SqlValue>>, fields: Vec<Field>) -> Self {
        Self {
            rows,
            fields,
            current_row: 0,
            current_field: 0,
        }
    }
}

impl Default for ResultSet {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Link
// ---------------------------------------------------------------------------

/// Represents a connection to a MySQL server.
#[derive(Debug)]
pub struct Link {
    /// Hostname of the MySQL server.
    pub host: String,
    /// Username used to authenticate.
    pub username: String,
    /// The current database.
    pub database: String,
    /// Port number.
    pub port: u16,
    /// Whether the connection is currently active.
    pub connected: bool,
    /// Server version information string.
    pub server_info: String,
    /// Number of affected rows from the last query.
    pub affected_rows: i64,
    /// Last auto-increment insert ID.
    pub insert_id: i64,
    /// Last error number (0 = no error).
    pub errno: i32,
    /// Last error message.
    pub error: String,
    /// Current character set.
    pub charset: String,
    /// Underlying driver connection, absent for detached links.
    driver_conn: Option<driver::DriverConnection>,
}

impl Link {
    /// Build a link that is not backed by a live driver connection.
    ///
    /// State-only operations (select_db, escaping, error inspection, close)
    /// behave normally; queries fail with the server-gone-away error. Used
    /// by embedders that manage their own connections, and by tests.
    pub fn detached(host: &str, username: &str, database: &str) -> Self {
        Self {
            host: host.to_string(),
            username: username.to_string(),
            database: database.to_string(),
            port: DEFAULT_PORT,
            connected: true,
            server_info: String::new(),
            affected_rows: 0,
            insert_id: 0,
            errno: 0,
            error: String::new(),
            charset: "utf8mb4".to_string(),
            driver_conn: None,
        }
    }

    fn record_error(&mut self, e: &ClientError) {
        self.errno = e.errno;
        self.error = e.message.clone();
    }

    fn clear_error(&mut self) {
        self.errno = 0;
        self.error.clear();
    }
}

// ---------------------------------------------------------------------------
// Connection functions
// ---------------------------------------------------------------------------

/// Connect to a MySQL server.
///
/// Equivalent to PHP's `mysqli_connect()`.
pub fn connect(
    host: &str,
    user: &str,
    password: &str,
    database: &str,
    port: Option<u16>,
) -> Result<Link, ClientError> {
    let port_val = port.unwrap_or(DEFAULT_PORT);
    let conn = driver::connect(host, user, password, database, port_val)?;
    let server_info = conn.server_version.clone();

    Ok(Link {
        host: host.to_string(),
        username: user.to_string(),
        database: database.to_string(),
        port: port_val,
        connected: true,
        server_info,
        affected_rows: 0,
        insert_id: 0,
        errno: 0,
        error: String::new(),
        charset: "utf8mb4".to_string(),
        driver_conn: Some(conn),
    })
}

/// Execute a query on the link.
///
/// Equivalent to PHP's `mysqli_query()`. On failure the link's errno/error
/// state is updated before the error is returned.
pub fn query(link: &mut Link, sql: &str) -> Result<ResultSet, ClientError> {
    if !link.connected {
        let e = ClientError::gone_away();
        link.record_error(&e);
        return Err(e);
    }

    let conn = match link.driver_conn.as_mut() {
        Some(c) => c,
        None => {
            let e = ClientError::gone_away();
            link.record_error(&e);
            return Err(e);
        }
    };

    let out = match driver::query(conn, sql) {
        Ok(out) => out,
        Err(e) => {
            let e: ClientError = e.into();
            link.record_error(&e);
            return Err(e);
        }
    };

    link.affected_rows = out.rows.len() as i64;
    link.clear_error();

    let fields = out.columns.into_iter().map(Field::from).collect();
    Ok(ResultSet::from_rows(out.rows, fields))
}

/// Select/change the current database.
///
/// Equivalent to PHP's `mysqli_select_db()`.
pub fn select_db(link: &mut Link, database: &str) -> bool {
    if !link.connected || database.is_empty() {
        return false;
    }
    match link.driver_conn.as_mut() {
        Some(conn) => match driver::select_db(conn, database) {
            Ok(()) => {
                link.database = database.to_string();
                link.clear_error();
                true
            }
            Err(e) => {
                link.record_error(&e.into());
                false
            }
        },
        // Detached links track the name only.
        None => {
            link.database = database.to_string();
            true
        }
    }
}

/// Escape a string for use in a query, bound to this link's charset.
///
/// Equivalent to PHP's `mysqli_real_escape_string()`. Escapes NUL,
/// backslash, single quote, double quote, Control-Z, newline and carriage
/// return.
pub fn real_escape_string(_link: &Link, input: &str) -> String {
    let mut result = String::with_capacity(input.len() * 2);
    for ch in input.chars() {
        match ch {
            '\0' => result.push_str("\\0"),
            '\n' => result.push_str("\\n"),
            '\r' => result.push_str("\\r"),
            '\\' => result.push_str("\\\\"),
            '\'' => result.push_str("\\'"),
            '"' => result.push_str("\\\""),
            '\x1a' => result.push_str("\\Z"),
            _ => result.push(ch),
        }
    }
    result
}

/// Get the last error message for the link.
///
/// Equivalent to PHP's `mysqli_error()`.
pub fn error(link: &Link) -> String {
    link.error.clone()
}

/// Get the last error number for the link.
///
/// Equivalent to PHP's `mysqli_errno()`.
pub fn errno(link: &Link) -> i32 {
    link.errno
}

/// Get the number of affected rows from the last query.
///
/// Equivalent to PHP's `mysqli_affected_rows()`.
pub fn affected_rows(link: &Link) -> i64 {
    link.affected_rows
}

/// Get the last auto-increment insert ID.
///
/// Equivalent to PHP's `mysqli_insert_id()`.
pub fn insert_id(link: &Link) -> i64 {
    link.insert_id
}

/// Get the server version string.
///
/// Equivalent to PHP's `mysqli_get_server_info()`.
pub fn get_server_info(link: &Link) -> String {
    link.server_info.clone()
}

/// Check whether the server is still reachable.
///
/// Equivalent to PHP's `mysqli_ping()`.
pub fn ping(link: &mut Link) -> bool {
    if !link.connected {
        return false;
    }
    match link.driver_conn.as_mut() {
        Some(conn) => driver::ping(conn),
        None => false,
    }
}

/// Set the character set for the link.
///
/// Equivalent to PHP's `mysqli_set_charset()`.
pub fn set_charset(link: &mut Link, charset: &str) -> bool {
    if !link.connected {
        return false;
    }
    let valid = matches!(
        charset,
        "utf8" | "utf8mb3" | "utf8mb4" | "latin1" | "ascii" | "binary"
    );
    if valid {
        link.charset = charset.to_string();
    }
    valid
}

/// Close the connection.
///
/// Equivalent to PHP's `mysqli_close()`. The link object stays around in a
/// disconnected state; later queries against it fail with a gone-away error.
pub fn close(link: &mut Link) {
    if let Some(ref mut conn) = link.driver_conn {
        driver::close(conn);
    }
    link.driver_conn = None;
    link.connected = false;
    link.clear_error();
}

// ---------------------------------------------------------------------------
// Result functions
// ---------------------------------------------------------------------------

/// Get the number of rows in a result set.
///
/// Equivalent to PHP's `mysqli_num_rows()`.
pub fn num_rows(result: &ResultSet) -> usize {
    result.rows.len()
}

/// Get the number of fields in a result set.
///
/// Equivalent to PHP's `mysqli_num_fields()`.
pub fn num_fields(result: &ResultSet) -> usize {
    result.fields.len()
}

/// Fetch the next row as an associative map.
///
/// Equivalent to PHP's `mysqli_fetch_assoc()`.
pub fn fetch_assoc(result: &mut ResultSet) -> Option<HashMap<String, SqlValue>> {
    fetch_array(result, FETCH_ASSOC)
}

/// Fetch the next row as a vector of values.
///
/// Equivalent to PHP's `mysqli_fetch_row()`.
pub fn fetch_row(result: &mut ResultSet) -> Option<Vec<SqlValue>> {
    if result.current_row >= result.rows.len() {
        return None;
    }
    let row = result.rows[result.current_row].clone();
    result.current_row += 1;
    Some(row)
}

/// Fetch the next row in the given mode.
///
/// Equivalent to PHP's `mysqli_fetch_array()`. In FETCH_NUM and FETCH_BOTH
/// modes the index keys are the decimal strings "0", "1", ... mirroring the
/// combined array shape of the original API.
pub fn fetch_array(result: &mut ResultSet, mode: i32) -> Option<HashMap<String, SqlValue>> {
    if result.current_row >= result.rows.len() {
        return None;
    }
    let row = &result.rows[result.current_row];
    result.current_row += 1;

    let mut map = HashMap::new();

    if mode == FETCH_NUM || mode == FETCH_BOTH {
        for (i, val) in row.iter().enumerate() {
            map.insert(i.to_string(), val.clone());
        }
    }
    if mode == FETCH_ASSOC || mode == FETCH_BOTH {
        for (i, field) in result.fields.iter().enumerate() {
            if i < row.len() {
                map.insert(field.name.clone(), row[i].clone());
            }
        }
    }

    Some(map)
}

/// Reposition the row cursor.
///
/// Equivalent to PHP's `mysqli_data_seek()`.
pub fn data_seek(result: &mut ResultSet, row: usize) -> bool {
    if row >= result.rows.len() {
        return false;
    }
    result.current_row = row;
    true
}

/// Reposition the field cursor.
///
/// Equivalent to PHP's `mysqli_field_seek()`.
pub fn field_seek(result: &mut ResultSet, offset: usize) -> bool {
    if offset >= result.fields.len() {
        return false;
    }
    result.current_field = offset;
    true
}

/// Return metadata for the field at the cursor and advance it.
///
/// Equivalent to PHP's `mysqli_fetch_field()`. Returns None once all fields
/// have been read.
pub fn fetch_field(result: &mut ResultSet) -> Option<Field> {
    if result.current_field >= result.fields.len() {
        return None;
    }
    let field = result.fields[result.current_field].clone();
    result.current_field += 1;
    Some(field)
}

/// Release a result set.
///
/// Equivalent to PHP's `mysqli_free_result()`. Ownership-based: consuming
/// the value drops the buffered rows.
pub fn free_result(result: ResultSet) {
    drop(result);
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn int_field(name: &str) -> Field {
        Field {
            name: name.to_string(),
            table: "t".to_string(),
            column_type: ColumnType::Long,
            length: 11,
            flags: mysql_compat_driver::NOT_NULL_FLAG | mysql_compat_driver::NUM_FLAG,
        }
    }

    fn str_field(name: &str) -> Field {
        Field {
            name: name.to_string(),
            table: "t".to_string(),
            column_type: ColumnType::VarString,
            length: 255,
            flags: 0,
        }
    }

    fn users_result() -> ResultSet {
        ResultSet::from_rows(
            vec![
                vec![SqlValue::Int(1), SqlValue::Str("Alice".to_string())],
                vec![SqlValue::Int(2), SqlValue::Str("Bob".to_string())],
            ],
            vec![int_field("id"), str_field("name")],
        )
    }

    #[test]
    fn test_detached_link_state() {
        let link = Link::detached("localhost", "root", "testdb");
        assert!(link.connected);
        assert_eq!(link.host, "localhost");
        assert_eq!(link.database, "testdb");
        assert_eq!(link.errno, 0);
        assert!(link.error.is_empty());
    }

    #[test]
    fn test_query_on_detached_link_fails_gone_away() {
        let mut link = Link::detached("localhost", "root", "testdb");
        let result = query(&mut link, "SELECT 1");
        assert!(result.is_err());
        assert_eq!(result.unwrap_err().errno, 2006);
        // The failure is recorded on the link for error()/errno().
        assert_eq!(errno(&link), 2006);
        assert!(error(&link).contains("gone away"));
    }

    #[test]
    fn test_query_on_closed_link() {
        let mut link = Link::detached("localhost", "root", "testdb");
        close(&mut link);
        assert!(!link.connected);
        let result = query(&mut link, "SELECT 1");
        assert!(result.is_err());
        assert_eq!(result.unwrap_err().errno, 2006);
    }

    #[test]
    fn test_select_db_detached() {
        let mut link = Link::detached("localhost", "root", "testdb");
        assert!(select_db(&mut link, "other_db"));
        assert_eq!(link.database, "other_db");

        assert!(!select_db(&mut link, ""));
        assert_eq!(link.database, "other_db");

        close(&mut link);
        assert!(!select_db(&mut link, "newdb"));
    }

    #[test]
    fn test_real_escape_string() {
        let link = Link::detached("localhost", "root", "testdb");
        assert_eq!(real_escape_string(&link, "hello"), "hello");
        assert_eq!(real_escape_string(&link, "it's"), "it\\'s");
        assert_eq!(real_escape_string(&link, "line1\nline2"), "line1\\nline2");
        assert_eq!(real_escape_string(&link, "tab\ttab"), "tab\ttab");
        assert_eq!(real_escape_string(&link, r#"say "hi""#), r#"say \"hi\""#);
        assert_eq!(real_escape_string(&link, "null\0byte"), "null\\0byte");
        assert_eq!(real_escape_string(&link, "back\\slash"), "back\\\\slash");
        assert_eq!(real_escape_string(&link, "ctrl\x1aZ"), "ctrl\\ZZ");
    }

    #[test]
    fn test_close_clears_error_state() {
        let mut link = Link::detached("localhost", "root", "testdb");
        let _ = query(&mut link, "SELECT 1"); // leaves errno 2006 behind
        close(&mut link);
        assert_eq!(errno(&link), 0);
        assert_eq!(error(&link), "");
    }

    #[test]
    fn test_fetch_assoc() {
        let mut result = users_result();
        assert_eq!(num_rows(&result), 2);
        assert_eq!(num_fields(&result), 2);

        let row1 = fetch_assoc(&mut result).expect("should have row");
        assert_eq!(row1.get("id"), Some(&SqlValue::Int(1)));
        assert_eq!(row1.get("name"), Some(&SqlValue::Str("Alice".to_string())));

        let row2 = fetch_assoc(&mut result).expect("should have row");
        assert_eq!(row2.get("id"), Some(&SqlValue::Int(2)));

        assert!(fetch_assoc(&mut result).is_none());
    }

    #[test]
    fn test_fetch_row() {
        let mut result = ResultSet::from_rows(
            vec![vec![SqlValue::Int(42)], vec![SqlValue::Int(99)]],
            vec![int_field("val")],
        );

        assert_eq!(fetch_row(&mut result), Some(vec![SqlValue::Int(42)]));
        assert_eq!(fetch_row(&mut result), Some(vec![SqlValue::Int(99)]));
        assert!(fetch_row(&mut result).is_none());
    }

    #[test]
    fn test_fetch_array_both_mode() {
        let mut result = ResultSet::from_rows(
            vec![vec![SqlValue::Str("red".to_string())]],
            vec![str_field("color")],
        );

        let row = fetch_array(&mut result, FETCH_BOTH).expect("should have row");
        // Should contain both index key "0" and named key "color".
        assert_eq!(row.get("0"), Some(&SqlValue::Str("red".to_string())));
        assert_eq!(row.get("color"), Some(&SqlValue::Str("red".to_string())));
    }

    #[test]
    fn test_fetch_array_num_mode_has_no_names() {
        let mut result = users_result();
        let row = fetch_array(&mut result, FETCH_NUM).expect("should have row");
        assert_eq!(row.get("0"), Some(&SqlValue::Int(1)));
        assert!(row.get("id").is_none());
    }

    #[test]
    fn test_data_seek() {
        let mut result = users_result();
        let _ = fetch_row(&mut result);
        let _ = fetch_row(&mut result);
        assert!(fetch_row(&mut result).is_none());

        assert!(data_seek(&mut result, 0));
        let row = fetch_assoc(&mut result).expect("rewound");
        assert_eq!(row.get("id"), Some(&SqlValue::Int(1)));

        assert!(!data_seek(&mut result, 2)); // out of range
    }

    #[test]
    fn test_field_seek_and_fetch_field() {
        let mut result = ResultSet::from_rows(
            Vec::new(),
            vec![str_field("a"), str_field("b"), str_field("c")],
        );

        // Sequential reads advance the cursor.
        assert_eq!(fetch_field(&mut result).unwrap().name, "a");
        assert_eq!(fetch_field(&mut result).unwrap().name, "b");

        // Seek then read.
        assert!(field_seek(&mut result, 1));
        assert_eq!(fetch_field(&mut result).unwrap().name, "b");
        assert_eq!(fetch_field(&mut result).unwrap().name, "c");
        assert!(fetch_field(&mut result).is_none());

        assert!(!field_seek(&mut result, 3)); // out of range
    }

    #[test]
    fn test_field_accessors() {
        let f = int_field("id");
        assert_eq!(f.type_name(), "LONG");
        assert!(f.not_null());
        assert!(!f.is_primary_key());
        assert!(!f.is_blob());
    }

    #[test]
    fn test_set_charset() {
        let mut link = Link::detached("localhost", "root", "testdb");
        assert!(set_charset(&mut link, "utf8"));
        assert_eq!(link.charset, "utf8");

        assert!(!set_charset(&mut link, "invalid_charset"));
        assert_eq!(link.charset, "utf8");

        close(&mut link);
        assert!(!set_charset(&mut link, "latin1"));
    }

    #[test]
    fn test_ping_detached_and_closed() {
        let mut link = Link::detached("localhost", "root", "testdb");
        assert!(!ping(&mut link)); // no driver behind it
        close(&mut link);
        assert!(!ping(&mut link));
    }

    #[test]
    fn test_error_display() {
        let err = ClientError::new(1045, "Access denied for user");
        assert_eq!(err.to_string(), "error 1045: Access denied for user");
    }

    #[test]
    fn test_free_result_consumes() {
        let result = users_result();
        free_result(result);
    }
}
