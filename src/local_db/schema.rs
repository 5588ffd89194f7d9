//! Database Schema Definitions
//!
//! Ordered schema migrations for the revision store. Each migration's SQL is
//! applied once, inside a transaction, and recorded in `schema_migrations`.

/// A single schema step
#[derive(Debug, Clone, Copy)]
pub struct Migration {
    pub version: i32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, ascending by version
pub const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    description: "revision records, head index, deprecations, path bindings",
    sql: include_str!("schema.sql"),
}];

/// Version the database reaches after all migrations
pub fn latest_version() -> i32 {
    MIGRATIONS.last().map(|m| m.version).unwrap_or(0)
}

/// Migrations newer than `current_version`, in application order
pub fn pending_migrations(current_version: i32) -> impl Iterator<Item = &'static Migration> {
    MIGRATIONS.iter().filter(move |m| m.version > current_version)
}
