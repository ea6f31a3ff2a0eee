//! Install-if-absent function registry.
//!
//! The original compatibility layer only defined each legacy function when
//! the host had not already provided one. Here that load-order convention
//! becomes an explicit registry: a host embedding the shim builds a
//! [`FunctionTable`], registers any of its own providers first, then calls
//! [`install_compat_functions`], which defines only the names still missing.
//!
//! Dispatch is uniform — every entry takes the compat context and a slice
//! of [`Value`] arguments and returns a [`Value`] — so failures keep the
//! legacy shape at this level too: `Value::Bool(false)` is the falsy
//! sentinel, never an error.

use crate::{
    mysql_affected_rows, mysql_close, mysql_connect, mysql_data_seek, mysql_errno, mysql_error,
    mysql_escape_string, mysql_fetch_array, mysql_fetch_assoc, mysql_fetch_field, mysql_fetch_row,
    mysql_free_result, mysql_get_server_info, mysql_insert_id, mysql_num_fields, mysql_num_rows,
    mysql_ping, mysql_query, mysql_real_escape_string, mysql_select_db, CompatContext, Field,
    LinkId, ResultId, SqlValue,
};
use std::collections::HashMap;

// ---------------------------------------------------------------------------
// Value
// ---------------------------------------------------------------------------

/// A dynamically typed argument/return value for registry dispatch.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Array(HashMap<String, Value>),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Legacy truthiness: false, 0, empty string and null are falsy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty() && s != "0",
            Value::Array(a) => !a.is_empty(),
        }
    }
}

impl From<SqlValue> for Value {
    fn from(v: SqlValue) -> Self {
        match v {
            SqlValue::Null => Value::Null,
            SqlValue::Int(i) => Value::Int(i),
            SqlValue::Float(f) => Value::Float(f),
            SqlValue::Str(s) => Value::Str(s),
            SqlValue::Bytes(b) => Value::Str(String::from_utf8_lossy(&b).into_owned()),
        }
    }
}

// ---------------------------------------------------------------------------
// FunctionTable
// ---------------------------------------------------------------------------

/// A native function entry: context plus arguments in call order.
pub type NativeFn = fn(&mut CompatContext, &[Value]) -> Value;

/// Name-keyed table of native functions.
pub struct FunctionTable {
    functions: HashMap<String, NativeFn>,
}

impl FunctionTable {
    pub fn new() -> Self {
        Self {
            functions: HashMap::new(),
        }
    }

    /// Whether a function of this name is already registered.
    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Register a function under a name, unless the name is taken.
    /// Returns whether the definition was installed.
    pub fn define(&mut self, name: &str, f: NativeFn) -> bool {
        if self.contains(name) {
            return false;
        }
        self.functions.insert(name.to_string(), f);
        true
    }

    /// Invoke a registered function. None when the name is unknown.
    pub fn call(&self, ctx: &mut CompatContext, name: &str, args: &[Value]) -> Option<Value> {
        let f = self.functions.get(name)?;
        Some(f(ctx, args))
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

impl Default for FunctionTable {
    fn default() -> Self {
        Self::new()
    }
}

/// The full legacy surface, in registration order.
const COMPAT_FUNCTIONS: &[(&str, NativeFn)] = &[
    ("mysql_connect", native_connect),
    ("mysql_select_db", native_select_db),
    ("mysql_query", native_query),
    ("mysql_real_escape_string", native_real_escape_string),
    ("mysql_escape_string", native_escape_string),
    ("mysql_error", native_error),
    ("mysql_errno", native_errno),
    ("mysql_close", native_close),
    ("mysql_free_result", native_free_result),
    ("mysql_num_rows", native_num_rows),
    ("mysql_num_fields", native_num_fields),
    ("mysql_fetch_array", native_fetch_array),
    ("mysql_fetch_assoc", native_fetch_assoc),
    ("mysql_fetch_row", native_fetch_row),
    ("mysql_fetch_field", native_fetch_field),
    ("mysql_data_seek", native_data_seek),
    ("mysql_affected_rows", native_affected_rows),
    ("mysql_insert_id", native_insert_id),
    ("mysql_get_server_info", native_get_server_info),
    ("mysql_ping", native_ping),
];

/// Define every legacy function whose name the host has not already taken.
/// Returns how many definitions were installed.
pub fn install_compat_functions(table: &mut FunctionTable) -> usize {
    let mut installed = 0;
    for (name, f) in COMPAT_FUNCTIONS {
        if table.define(name, *f) {
            installed += 1;
        }
    }
    installed
}

// ---------------------------------------------------------------------------
// Argument marshaling
// ---------------------------------------------------------------------------

/// Optional string argument: absent or null means "use the default".
fn opt_str(args: &[Value], idx: usize) -> Option<&str> {
    args.get(idx).and_then(Value::as_str)
}

/// Optional link argument.
fn opt_link(args: &[Value], idx: usize) -> Option<LinkId> {
    args.get(idx)
        .and_then(Value::as_int)
        .map(|i| LinkId(i as u32))
}

/// Required result argument.
fn result_arg(args: &[Value], idx: usize) -> Option<ResultId> {
    args.get(idx)
        .and_then(Value::as_int)
        .map(|i| ResultId(i as u32))
}

fn row_to_value(row: HashMap<String, SqlValue>) -> Value {
    Value::Array(row.into_iter().map(|(k, v)| (k, v.into())).collect())
}

fn field_to_value(field: Field) -> Value {
    let mut map = HashMap::new();
    map.insert("name".to_string(), Value::Str(field.name.clone()));
    map.insert("table".to_string(), Value::Str(field.table.clone()));
    map.insert(
        "type".to_string(),
        Value::Str(field.type_name().to_string()),
    );
    map.insert("max_length".to_string(), Value::Int(field.length as i64));
    map.insert(
        "not_null".to_string(),
        Value::Int(if field.not_null() { 1 } else { 0 }),
    );
    map.insert(
        "primary_key".to_string(),
        Value::Int(if field.is_primary_key() { 1 } else { 0 }),
    );
    map.insert(
        "blob".to_string(),
        Value::Int(if field.is_blob() { 1 } else { 0 }),
    );
    Value::Array(map)
}

// ---------------------------------------------------------------------------
// Native wrappers
// ---------------------------------------------------------------------------

fn native_connect(ctx: &mut CompatContext, args: &[Value]) -> Value {
    let server = opt_str(args, 0);
    let username = opt_str(args, 1);
    let password = opt_str(args, 2);
    match mysql_connect(ctx, server, username, password) {
        Some(id) => Value::Int(id.0 as i64),
        None => Value::Bool(false),
    }
}

fn native_select_db(ctx: &mut CompatContext, args: &[Value]) -> Value {
    let database = match opt_str(args, 0) {
        Some(db) => db.to_string(),
        None => return Value::Bool(false),
    };
    Value::Bool(mysql_select_db(ctx, &database, opt_link(args, 1)))
}

fn native_query(ctx: &mut CompatContext, args: &[Value]) -> Value {
    let sql = match opt_str(args, 0) {
        Some(s) => s.to_string(),
        None => return Value::Bool(false),
    };
    match mysql_query(ctx, &sql, opt_link(args, 1)) {
        Some(id) => Value::Int(id.0 as i64),
        None => Value::Bool(false),
    }
}

fn native_real_escape_string(ctx: &mut CompatContext, args: &[Value]) -> Value {
    match opt_str(args, 0) {
        Some(s) => Value::Str(mysql_real_escape_string(ctx, s)),
        None => Value::Bool(false),
    }
}

fn native_escape_string(ctx: &mut CompatContext, args: &[Value]) -> Value {
    match opt_str(args, 0) {
        Some(s) => Value::Str(mysql_escape_string(ctx, s)),
        None => Value::Bool(false),
    }
}

fn native_error(ctx: &mut CompatContext, args: &[Value]) -> Value {
    Value::Str(mysql_error(ctx, opt_link(args, 0)))
}

fn native_errno(ctx: &mut CompatContext, args: &[Value]) -> Value {
    Value::Int(mysql_errno(ctx, opt_link(args, 0)) as i64)
}

fn native_close(ctx: &mut CompatContext, args: &[Value]) -> Value {
    Value::Bool(mysql_close(ctx, opt_link(args, 0)))
}

fn native_free_result(ctx: &mut CompatContext, args: &[Value]) -> Value {
    match result_arg(args, 0) {
        Some(id) => Value::Bool(mysql_free_result(ctx, id)),
        None => Value::Bool(false),
    }
}

fn native_num_rows(ctx: &mut CompatContext, args: &[Value]) -> Value {
    match result_arg(args, 0).and_then(|id| mysql_num_rows(ctx, id)) {
        Some(n) => Value::Int(n as i64),
        None => Value::Bool(false),
    }
}

fn native_num_fields(ctx: &mut CompatContext, args: &[Value]) -> Value {
    match result_arg(args, 0).and_then(|id| mysql_num_fields(ctx, id)) {
        Some(n) => Value::Int(n as i64),
        None => Value::Bool(false),
    }
}

fn native_fetch_array(ctx: &mut CompatContext, args: &[Value]) -> Value {
    let id = match result_arg(args, 0) {
        Some(id) => id,
        None => return Value::Bool(false),
    };
    let mode = args.get(1).and_then(Value::as_int).map(|m| m as i32);
    match mysql_fetch_array(ctx, id, mode) {
        Some(row) => row_to_value(row),
        None => Value::Bool(false),
    }
}

fn native_fetch_assoc(ctx: &mut CompatContext, args: &[Value]) -> Value {
    match result_arg(args, 0).and_then(|id| mysql_fetch_assoc(ctx, id)) {
        Some(row) => row_to_value(row),
        None => Value::Bool(false),
    }
}

fn native_fetch_row(ctx: &mut CompatContext, args: &[Value]) -> Value {
    match result_arg(args, 0).and_then(|id| mysql_fetch_row(ctx, id)) {
        Some(row) => Value::Array(
            row.into_iter()
                .enumerate()
                .map(|(i, v)| (i.to_string(), v.into()))
                .collect(),
        ),
        None => Value::Bool(false),
    }
}

fn native_fetch_field(ctx: &mut CompatContext, args: &[Value]) -> Value {
    let id = match result_arg(args, 0) {
        Some(id) => id,
        None => return Value::Bool(false),
    };
    let offset = args.get(1).and_then(Value::as_int).map(|o| o as usize);
    match mysql_fetch_field(ctx, id, offset) {
        Some(field) => field_to_value(field),
        None => Value::Bool(false),
    }
}

fn native_data_seek(ctx: &mut CompatContext, args: &[Value]) -> Value {
    let id = match result_arg(args, 0) {
        Some(id) => id,
        None => return Value::Bool(false),
    };
    let row = match args.get(1).and_then(Value::as_int) {
        Some(r) if r >= 0 => r as usize,
        _ => return Value::Bool(false),
    };
    Value::Bool(mysql_data_seek(ctx, id, row))
}

fn native_affected_rows(ctx: &mut CompatContext, args: &[Value]) -> Value {
    Value::Int(mysql_affected_rows(ctx, opt_link(args, 0)))
}

fn native_insert_id(ctx: &mut CompatContext, args: &[Value]) -> Value {
    Value::Int(mysql_insert_id(ctx, opt_link(args, 0)))
}

fn native_get_server_info(ctx: &mut CompatContext, args: &[Value]) -> Value {
    Value::Str(mysql_get_server_info(ctx, opt_link(args, 0)))
}

fn native_ping(ctx: &mut CompatContext, args: &[Value]) -> Value {
    Value::Bool(mysql_ping(ctx, opt_link(args, 0)))
}

// ===========================================================================
// Tests
// ===========================================================================
