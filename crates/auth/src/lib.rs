//! Role-based access control for bot commands.
//!
//! This crate provides:
//! - `Authorizer`: permission checks and administration over a role graph
//! - `RbacStore`: persistence trait, with SQLite and in-memory backends
//! - `RoleGraph`: validated role hierarchy with inheritance walks

pub mod authorizer;
pub mod error;
pub mod graph;
pub mod records;
pub mod store;
pub mod store_memory;
pub mod store_sqlite;

pub use {
    authorizer::Authorizer,
    error::{Context, Error, Result},
    graph::RoleGraph,
    records::{
        ALL_USERS, BindingKind, Permission, Role, RoleBinding, Snapshot, WILDCARD_PERMISSION,
    },
    store::{ChangeSet, RbacStore},
    store_memory::InMemoryRbacStore,
    store_sqlite::SqliteRbacStore,
};

/// Run database migrations for the RBAC tables.
///
/// Call this before [`SqliteRbacStore::with_pool`] when sharing a pool.
pub async fn run_migrations(pool: &sqlx::SqlitePool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .set_ignore_missing(true)
        .run(pool)
        .await?;
    Ok(())
}
