//! mysql-compat — legacy mysql_* compatibility layer.
//!
//! This is the root integration package tying together the three layers:
//! the protocol-level driver, the modern (mysqli-style) client surface, and
//! the legacy mysql_* shim with its per-request context, implicit default
//! link, and install-if-absent function registry.

pub use mysql_compat_client as client;
pub use mysql_compat_driver as driver;
pub use mysql_compat_shim as shim;
