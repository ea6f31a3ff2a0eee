//! Legacy mysql_* compatibility shim.
//!
//! Presents the removed procedural MySQL call surface (connect, select-db,
//! query, escape, fetch, field introspection, close) on top of the modern
//! client layer, preserving the legacy calling conventions exactly:
//!
//! - every operation that takes an optional link uses the explicit argument
//!   when given, else the context's default link — including a stale or
//!   closed one the caller forgot about;
//! - failures are falsy/sentinel return values, never typed errors;
//! - escaping falls back through three ordered tiers (host framework
//!   abstraction, link-bound escape, naive local escape).
//!
//! All state lives in a [`CompatContext`] created per logical request, so
//! nothing here is process-global and contexts never leak handles across
//! requests.

use mysql_compat_client as client;
use std::collections::HashMap;

pub use mysql_compat_client::{
    Field, Link, ResultSet, SqlValue, FETCH_ASSOC, FETCH_BOTH, FETCH_NUM,
};

pub mod registry;

// ---------------------------------------------------------------------------
// Handles
// ---------------------------------------------------------------------------

/// Opaque handle to a connection owned by a [`CompatContext`].
///
/// Plain copyable ids, like the resource ids of the original API: a handle
/// can outlive the connection it names, and using such a stale handle fails
/// at the driver level rather than being pre-validated here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LinkId(pub u32);

/// Opaque handle to a result set owned by a [`CompatContext`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResultId(pub u32);

// ---------------------------------------------------------------------------
// EscapeProvider — optional host framework abstraction
// ---------------------------------------------------------------------------

/// A host framework's database abstraction, consulted first when escaping.
///
/// The original API probed for an enclosing framework at call time and
/// preferred its escaping over the raw driver. Here that probe is an
/// injected trait object: presence is checked when escaping, and the
/// provider can additionally report itself inactive (e.g. its own database
/// layer is not initialized yet).
pub trait EscapeProvider {
    /// Whether the abstraction is initialized for the current context.
    fn is_active(&self) -> bool;
    /// Escape a string for use in a query.
    fn escape_str(&self, input: &str) -> String;
}

// ---------------------------------------------------------------------------
// CompatContext
// ---------------------------------------------------------------------------

/// Per-request state for the compatibility surface.
///
/// Owns every link and result set opened through it, keyed by handle id,
/// plus the default ("implicit") link that operations with an omitted link
/// argument resolve to. One context corresponds to one logical request;
/// contexts are not shared across requests.
pub struct CompatContext {
    links: HashMap<u32, Link>,
    results: HashMap<u32, ResultSet>,
    next_link: u32,
    next_result: u32,
    default_link: Option<LinkId>,
    escape_provider: Option<Box<dyn EscapeProvider>>,
    connect_errno: i32,
    connect_error: String,
    /// Server used when mysql_connect is called without one.
    pub default_server: String,
    /// Username used when mysql_connect is called without one.
    pub default_user: String,
    /// Password used when mysql_connect is called without one.
    pub default_password: String,
}

impl CompatContext {
    pub fn new() -> Self {
        Self {
            links: HashMap::new(),
            results: HashMap::new(),
            next_link: 1,
            next_result: 1,
            default_link: None,
            escape_provider: None,
            connect_errno: 0,
            connect_error: String::new(),
            default_server: "localhost".to_string(),
            default_user: String::new(),
            default_password: String::new(),
        }
    }

    /// Take ownership of a link opened elsewhere and return its handle.
    /// Does not touch the default link; only [`mysql_connect`] (or an
    /// explicit [`CompatContext::set_default_link`]) does that.
    pub fn adopt_link(&mut self, link: Link) -> LinkId {
        let id = LinkId(self.next_link);
        self.next_link += 1;
        self.links.insert(id.0, link);
        id
    }

    /// Take ownership of a result set produced elsewhere.
    pub fn adopt_result(&mut self, result: ResultSet) -> ResultId {
        let id = ResultId(self.next_result);
        self.next_result += 1;
        self.results.insert(id.0, result);
        id
    }

    /// The current default link, if any.
    pub fn default_link(&self) -> Option<LinkId> {
        self.default_link
    }

    /// Point the default link at an adopted link.
    pub fn set_default_link(&mut self, link: LinkId) {
        self.default_link = Some(link);
    }

    /// Inspect a link by handle.
    pub fn link(&self, id: LinkId) -> Option<&Link> {
        self.links.get(&id.0)
    }

    /// Inspect a result set by handle.
    pub fn result(&self, id: ResultId) -> Option<&ResultSet> {
        self.results.get(&id.0)
    }

    /// Install the host framework's escape abstraction.
    pub fn set_escape_provider(&mut self, provider: Box<dyn EscapeProvider>) {
        self.escape_provider = Some(provider);
    }

    /// Whether an escape provider is installed and reports itself active.
    pub fn escape_provider_active(&self) -> bool {
        self.escape_provider
            .as_ref()
            .map(|p| p.is_active())
            .unwrap_or(false)
    }

    /// Resolve an optional link argument: the explicit handle when given,
    /// else the default link. An explicit but unknown handle does NOT fall
    /// back to the default.
    fn resolve(&self, explicit: Option<LinkId>) -> Option<&Link> {
        let id = explicit.or(self.default_link)?;
        self.links.get(&id.0)
    }

    fn resolve_mut(&mut self, explicit: Option<LinkId>) -> Option<&mut Link> {
        let id = explicit.or(self.default_link)?;
        self.links.get_mut(&id.0)
    }
}

impl Default for CompatContext {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Connection functions
// ---------------------------------------------------------------------------

/// Open a connection and make it the context's default link.
///
/// Equivalent to PHP's `mysql_connect()`. Omitted arguments fall back to the
/// context's configured defaults. A server string may carry a port as
/// "host:port". Returns the new handle, or None on failure.
///
/// The default link is assigned unconditionally, exactly as the original
/// stored the raw connect result: a failed connect clobbers it, so later
/// implicit operations fail too, and the failure's errno/message is
/// reported by [`mysql_error`]/[`mysql_errno`] while no link resolves.
pub fn mysql_connect(
    ctx: &mut CompatContext,
    server: Option<&str>,
    username: Option<&str>,
    password: Option<&str>,
) -> Option<LinkId> {
    let server = server.unwrap_or(&ctx.default_server).to_string();
    let username = username.unwrap_or(&ctx.default_user).to_string();
    let password = password.unwrap_or(&ctx.default_password).to_string();

    let (host, port) = match server.rsplit_once(':') {
        Some((h, p)) => match p.parse::<u16>() {
            Ok(port) => (h.to_string(), Some(port)),
            Err(_) => (server.clone(), None),
        },
        None => (server.clone(), None),
    };

    match client::connect(&host, &username, &password, "", port) {
        Ok(link) => {
            let id = ctx.adopt_link(link);
            ctx.default_link = Some(id);
            ctx.connect_errno = 0;
            ctx.connect_error.clear();
            Some(id)
        }
        Err(e) => {
            ctx.default_link = None;
            ctx.connect_errno = e.errno;
            ctx.connect_error = e.message;
            None
        }
    }
}

/// Select the current database on a link.
///
/// Equivalent to PHP's `mysql_select_db()`.
pub fn mysql_select_db(ctx: &mut CompatContext, database: &str, link: Option<LinkId>) -> bool {
    match ctx.resolve_mut(link) {
        Some(l) => client::select_db(l, database),
        None => false,
    }
}

/// Execute a query.
///
/// Equivalent to PHP's `mysql_query()`. Returns the result handle, or None
/// on failure (including a missing or closed link — the driver-level
/// failure propagates as the falsy return, the shim does not special-case
/// it).
pub fn mysql_query(ctx: &mut CompatContext, sql: &str, link: Option<LinkId>) -> Option<ResultId> {
    let result = {
        let l = ctx.resolve_mut(link)?;
        client::query(l, sql).ok()?
    };
    Some(ctx.adopt_result(result))
}

/// Get the last error message for a link.
///
/// Equivalent to PHP's `mysql_error()`. When no link resolves this reports
/// the last failed connect's message, else the empty string.
pub fn mysql_error(ctx: &CompatContext, link: Option<LinkId>) -> String {
    match ctx.resolve(link) {
        Some(l) => client::error(l),
        None => ctx.connect_error.clone(),
    }
}

/// Get the last error number for a link.
///
/// Equivalent to PHP's `mysql_errno()`. When no link resolves this reports
/// the last failed connect's errno, else zero.
pub fn mysql_errno(ctx: &CompatContext, link: Option<LinkId>) -> i32 {
    match ctx.resolve(link) {
        Some(l) => client::errno(l),
        None => ctx.connect_errno,
    }
}

/// Close a link.
///
/// Equivalent to PHP's `mysql_close()`. The default link is deliberately
/// left pointing at the closed connection, as the original did: a later
/// implicit use hits the closed link and fails at the driver level.
pub fn mysql_close(ctx: &mut CompatContext, link: Option<LinkId>) -> bool {
    match ctx.resolve_mut(link) {
        Some(l) => {
            client::close(l);
            true
        }
        None => false,
    }
}

/// Rows changed by the last statement on a link.
///
/// Equivalent to PHP's `mysql_affected_rows()`. -1 when no link resolves.
pub fn mysql_affected_rows(ctx: &CompatContext, link: Option<LinkId>) -> i64 {
    match ctx.resolve(link) {
        Some(l) => client::affected_rows(l),
        None => -1,
    }
}

/// Last auto-increment id generated on a link.
///
/// Equivalent to PHP's `mysql_insert_id()`. Zero when no link resolves.
pub fn mysql_insert_id(ctx: &CompatContext, link: Option<LinkId>) -> i64 {
    match ctx.resolve(link) {
        Some(l) => client::insert_id(l),
        None => 0,
    }
}

/// Server version string for a link.
///
/// Equivalent to PHP's `mysql_get_server_info()`.
pub fn mysql_get_server_info(ctx: &CompatContext, link: Option<LinkId>) -> String {
    match ctx.resolve(link) {
        Some(l) => client::get_server_info(l),
        None => String::new(),
    }
}

/// Probe whether the server behind a link is still reachable.
///
/// Equivalent to PHP's `mysql_ping()`.
pub fn mysql_ping(ctx: &mut CompatContext, link: Option<LinkId>) -> bool {
    match ctx.resolve_mut(link) {
        Some(l) => client::ping(l),
        None => false,
    }
}

// ---------------------------------------------------------------------------
// Escaping
// ---------------------------------------------------------------------------

/// Escape a string for use in a query.
///
/// Equivalent to PHP's `mysql_real_escape_string()`. Falls back through
/// three ordered tiers, each of which downstream code may depend on:
///
/// 1. the host framework's escape abstraction, when installed and active;
/// 2. the default link's connection-bound escape, when a default link
///    exists (even a closed one);
/// 3. a naive local escape.
pub fn mysql_real_escape_string(ctx: &CompatContext, input: &str) -> String {
    if let Some(provider) = ctx.escape_provider.as_ref() {
        if provider.is_active() {
            return provider.escape_str(input);
        }
    }
    if let Some(id) = ctx.default_link {
        if let Some(link) = ctx.links.get(&id.0) {
            return client::real_escape_string(link, input);
        }
    }
    fallback_escape(input)
}

/// Escape a string for use in a query.
///
/// Equivalent to PHP's `mysql_escape_string()`, which the original aliased
/// to the real-escape variant.
pub fn mysql_escape_string(ctx: &CompatContext, input: &str) -> String {
    mysql_real_escape_string(ctx, input)
}

/// Last-resort escape: quotes, backslashes and NUL only.
///
/// Not charset-aware — it can mis-escape multi-byte sequences for some
/// connection charsets. That is a known gap in the legacy behavior and is
/// preserved as-is for compatibility.
pub fn fallback_escape(input: &str) -> String {
    let mut result = String::with_capacity(input.len() + 8);
    for ch in input.chars() {
        match ch {
            '\\' => result.push_str("\\\\"),
            '\'' => result.push_str("\\'"),
            '"' => result.push_str("\\\""),
            '\0' => result.push_str("\\0"),
            _ => result.push(ch),
        }
    }
    result
}

// ---------------------------------------------------------------------------
// Result functions
// ---------------------------------------------------------------------------

/// Release a result set.
///
/// Equivalent to PHP's `mysql_free_result()`. Succeeds exactly once per
/// handle; a second release of the same handle is falsy.
pub fn mysql_free_result(ctx: &mut CompatContext, result: ResultId) -> bool {
    match ctx.results.remove(&result.0) {
        Some(r) => {
            client::free_result(r);
            true
        }
        None => false,
    }
}

/// Number of rows in a result set.
///
/// Equivalent to PHP's `mysql_num_rows()`. None on a bad handle.
pub fn mysql_num_rows(ctx: &CompatContext, result: ResultId) -> Option<usize> {
    ctx.results.get(&result.0).map(client::num_rows)
}

/// Number of fields in a result set.
///
/// Equivalent to PHP's `mysql_num_fields()`. None on a bad handle.
pub fn mysql_num_fields(ctx: &CompatContext, result: ResultId) -> Option<usize> {
    ctx.results.get(&result.0).map(client::num_fields)
}

/// Fetch the next row in the given mode (default: combined assoc+index).
///
/// Equivalent to PHP's `mysql_fetch_array()`. None marks end of data or a
/// bad handle.
pub fn mysql_fetch_array(
    ctx: &mut CompatContext,
    result: ResultId,
    mode: Option<i32>,
) -> Option<HashMap<String, SqlValue>> {
    let r = ctx.results.get_mut(&result.0)?;
    client::fetch_array(r, mode.unwrap_or(FETCH_BOTH))
}

/// Fetch the next row as an associative map.
///
/// Equivalent to PHP's `mysql_fetch_assoc()`.
pub fn mysql_fetch_assoc(
    ctx: &mut CompatContext,
    result: ResultId,
) -> Option<HashMap<String, SqlValue>> {
    let r = ctx.results.get_mut(&result.0)?;
    client::fetch_assoc(r)
}

/// Fetch the next row as a vector of values.
///
/// Equivalent to PHP's `mysql_fetch_row()`.
pub fn mysql_fetch_row(ctx: &mut CompatContext, result: ResultId) -> Option<Vec<SqlValue>> {
    let r = ctx.results.get_mut(&result.0)?;
    client::fetch_row(r)
}

/// Field metadata at the field cursor, optionally seeking first.
///
/// Equivalent to PHP's `mysql_fetch_field()`: when an offset is given the
/// field cursor seeks there before reading, and reading advances it.
pub fn mysql_fetch_field(
    ctx: &mut CompatContext,
    result: ResultId,
    offset: Option<usize>,
) -> Option<Field> {
    let r = ctx.results.get_mut(&result.0)?;
    if let Some(o) = offset {
        // A failed seek is ignored and the read happens at the current
        // position, exactly as the original did.
        let _ = client::field_seek(r, o);
    }
    client::fetch_field(r)
}

/// Reposition the row cursor of a result set.
///
/// Equivalent to PHP's `mysql_data_seek()`.
pub fn mysql_data_seek(ctx: &mut CompatContext, result: ResultId, row: usize) -> bool {
    match ctx.results.get_mut(&result.0) {
        Some(r) => client::data_seek(r, row),
        None => false,
    }
}

// ===========================================================================
// Tests
// ===========================================================================
