//! Integration suite for the legacy compatibility surface.
//!
//! Exercises the shim end to end: request-scoped contexts, implicit link
//! resolution across operations, the escape fallback chain, result handle
//! lifecycles, and registry dispatch. Scenarios that need a live MySQL
//! server are `#[ignore]`d and expect a local server with the credentials
//! used below.

use mysql_compat_client::{ColumnType, Field, Link, ResultSet, SqlValue};
use mysql_compat_shim::registry::{install_compat_functions, FunctionTable, Value};
use mysql_compat_shim::{
    mysql_close, mysql_connect, mysql_data_seek, mysql_errno, mysql_error, mysql_fetch_array,
    mysql_fetch_assoc, mysql_fetch_field, mysql_free_result, mysql_num_fields, mysql_num_rows,
    mysql_query, mysql_real_escape_string, mysql_select_db, CompatContext, EscapeProvider,
};

fn field(name: &str, column_type: ColumnType) -> Field {
    Field {
        name: name.to_string(),
        table: "users".to_string(),
        column_type,
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
        vec![field("id", ColumnType::Long), field("name", ColumnType::VarString)],
    )
}

/// A stand-in for a host framework's database abstraction.
struct FrameworkDb {
    initialized: bool,
}

impl EscapeProvider for FrameworkDb {
    fn is_active(&self) -> bool {
        self.initialized
    }
    fn escape_str(&self, input: &str) -> String {
        input.replace('\'', "''")
    }
}

#[test]
fn implicit_link_flows_through_a_request() {
    let mut ctx = CompatContext::new();
    let id = ctx.adopt_link(Link::detached("localhost", "app", "appdb"));
    ctx.set_default_link(id);

    // Omitted-link operations all target the adopted default.
    assert!(mysql_select_db(&mut ctx, "reports", None));
    assert_eq!(ctx.link(id).unwrap().database, "reports");
    assert_eq!(mysql_errno(&ctx, None), 0);

    // Closing implicitly leaves the handle dangling; later implicit use
    // fails at the driver level instead of being pre-validated.
    assert!(mysql_close(&mut ctx, None));
    assert!(mysql_query(&mut ctx, "SELECT 1", None).is_none());
    assert_eq!(mysql_errno(&ctx, None), 2006);
    assert!(mysql_error(&ctx, None).contains("gone away"));
}

#[test]
fn failed_connect_clobbers_implicit_link() {
    let mut ctx = CompatContext::new();
    let id = ctx.adopt_link(Link::detached("localhost", "app", "appdb"));
    ctx.set_default_link(id);

    // A failed reconnect replaces the implicit handle just like a
    // successful one would: implicit operations must not silently keep
    // using the pre-failure connection.
    assert!(mysql_connect(&mut ctx, Some(""), Some("app"), Some("secret")).is_none());
    assert!(!mysql_select_db(&mut ctx, "reports", None));
    assert!(mysql_query(&mut ctx, "SELECT 1", None).is_none());

    // The connect failure is what error inspection reports now.
    assert_eq!(mysql_errno(&ctx, None), 2002);
    assert!(!mysql_error(&ctx, None).is_empty());

    // The earlier link still exists and is reachable explicitly.
    assert!(mysql_select_db(&mut ctx, "reports", Some(id)));
}

#[test]
fn contexts_do_not_share_handles() {
    let mut first = CompatContext::new();
    let id = first.adopt_link(Link::detached("localhost", "app", "appdb"));
    first.set_default_link(id);

    // A second request context starts clean: the first context's handles
    // mean nothing to it.
    let mut second = CompatContext::new();
    assert_eq!(second.default_link(), None);
    assert!(!mysql_select_db(&mut second, "reports", Some(id)));
}

#[test]
fn result_lifecycle_fetch_seek_free() {
    let mut ctx = CompatContext::new();
    let rid = ctx.adopt_result(users_result());

    assert_eq!(mysql_num_rows(&ctx, rid), Some(2));
    assert_eq!(mysql_num_fields(&ctx, rid), Some(2));

    // Walk all rows in combined mode.
    let first = mysql_fetch_array(&mut ctx, rid, None).expect("row 1");
    assert_eq!(first.get("name"), Some(&SqlValue::Str("Alice".to_string())));
    assert_eq!(first.get("1"), Some(&SqlValue::Str("Alice".to_string())));
    let second = mysql_fetch_assoc(&mut ctx, rid).expect("row 2");
    assert_eq!(second.get("id"), Some(&SqlValue::Int(2)));
    assert!(mysql_fetch_array(&mut ctx, rid, None).is_none());

    // Rewind and introspect fields.
    assert!(mysql_data_seek(&mut ctx, rid, 0));
    let f = mysql_fetch_field(&mut ctx, rid, Some(1)).expect("field");
    assert_eq!(f.name, "name");

    // Release exactly once.
    assert!(mysql_free_result(&mut ctx, rid));
    assert!(!mysql_free_result(&mut ctx, rid));
    assert_eq!(mysql_num_rows(&ctx, rid), None);
}

#[test]
fn escape_chain_prefers_framework_then_link_then_naive() {
    // Tier 3: fresh context, nothing to delegate to.
    let ctx = CompatContext::new();
    assert_eq!(mysql_real_escape_string(&ctx, "it's a\\b"), "it\\'s a\\\\b");

    // Tier 2: a default link exists, its connection-bound escape runs.
    let mut ctx = CompatContext::new();
    let id = ctx.adopt_link(Link::detached("localhost", "app", "appdb"));
    ctx.set_default_link(id);
    assert_eq!(mysql_real_escape_string(&ctx, "a\nb"), "a\\nb");

    // Tier 1: an active framework abstraction wins over the link.
    ctx.set_escape_provider(Box::new(FrameworkDb { initialized: true }));
    assert_eq!(mysql_real_escape_string(&ctx, "it's"), "it''s");

    // An inactive abstraction is skipped at call time.
    let mut ctx = CompatContext::new();
    ctx.set_escape_provider(Box::new(FrameworkDb { initialized: false }));
    assert_eq!(mysql_real_escape_string(&ctx, "it's"), "it\\'s");
}

#[test]
fn registry_dispatch_covers_a_request() {
    let mut table = FunctionTable::new();
    install_compat_functions(&mut table);

    let mut ctx = CompatContext::new();
    let rid = ctx.adopt_result(users_result());

    let rows = table
        .call(&mut ctx, "mysql_num_rows", &[Value::Int(rid.0 as i64)])
        .unwrap();
    assert_eq!(rows, Value::Int(2));

    let row = table
        .call(&mut ctx, "mysql_fetch_assoc", &[Value::Int(rid.0 as i64)])
        .unwrap();
    assert!(row.is_truthy());

    let freed = table
        .call(&mut ctx, "mysql_free_result", &[Value::Int(rid.0 as i64)])
        .unwrap();
    assert_eq!(freed, Value::Bool(true));
}

#[test]
#[ignore] // Requires a real MySQL server at localhost:3306
fn live_server_implicit_roundtrip() {
    let mut ctx = CompatContext::new();

    let link = mysql_connect(&mut ctx, Some("localhost"), Some("root"), Some("pass"))
        .expect("connect should succeed");
    assert_eq!(ctx.default_link(), Some(link));

    let rid = mysql_query(&mut ctx, "SELECT 1", None).expect("query via implicit link");
    assert_eq!(mysql_num_rows(&ctx, rid), Some(1));

    let row = mysql_fetch_array(&mut ctx, rid, None).expect("one row");
    assert!(row.contains_key("0"));

    assert!(mysql_free_result(&mut ctx, rid));
    assert!(mysql_close(&mut ctx, None));
}

#[test]
#[ignore] // Requires a real MySQL server at localhost:3306
fn live_server_connect_replaces_default() {
    let mut ctx = CompatContext::new();
    let first = mysql_connect(&mut ctx, Some("localhost"), Some("root"), Some("pass")).unwrap();
    let second = mysql_connect(&mut ctx, Some("127.0.0.1:3306"), Some("root"), Some("pass")).unwrap();
    assert_ne!(first, second);
    assert_eq!(ctx.default_link(), Some(second));
}
