//! SQLite-backed RBAC store using sqlx.

use std::path::Path;

use {
    async_trait::async_trait,
    sqlx::{
        SqlitePool,
        sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    },
    tracing::debug,
};

use crate::{
    Context, Result,
    records::{BindingKind, Permission, Role, RoleBinding},
    store::{ChangeSet, RbacStore},
};

#[derive(sqlx::FromRow)]
struct PermissionRow {
    name: String,
    description: String,
}

impl From<PermissionRow> for Permission {
    fn from(row: PermissionRow) -> Self {
        Self {
            name: row.name,
            description: row.description,
        }
    }
}

#[derive(sqlx::FromRow)]
struct RoleRow {
    name: String,
    description: String,
    permissions: String,
    parents: String,
}

impl TryFrom<RoleRow> for Role {
    type Error = crate::Error;

    fn try_from(row: RoleRow) -> Result<Self> {
        let permissions = serde_json::from_str(&row.permissions)
            .with_context(|| format!("corrupt permissions column for role {}", row.name))?;
        let parents = serde_json::from_str(&row.parents)
            .with_context(|| format!("corrupt parents column for role {}", row.name))?;
        Ok(Self {
            name: row.name,
            description: row.description,
            permissions,
            parents,
        })
    }
}

#[derive(sqlx::FromRow)]
struct BindingRow {
    kind: String,
    identifier: String,
    roles: String,
}

impl TryFrom<BindingRow> for RoleBinding {
    type Error = crate::Error;

    fn try_from(row: BindingRow) -> Result<Self> {
        let roles = serde_json::from_str(&row.roles).with_context(|| {
            format!("corrupt roles column for {} binding {}", row.kind, row.identifier)
        })?;
        Ok(Self {
            kind: row.kind.parse()?,
            identifier: row.identifier,
            roles,
        })
    }
}

/// SQLite persistence for permissions, roles and bindings.
pub struct SqliteRbacStore {
    pool: SqlitePool,
}

impl SqliteRbacStore {
    /// Open (creating if needed) the database file at `path` and run
    /// migrations.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;
        crate::run_migrations(&pool).await?;
        debug!(path = %path.display(), "rbac database ready");
        Ok(Self::with_pool(pool))
    }

    /// Connect to a database URL such as `sqlite::memory:` and run
    /// migrations.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(database_url)
            .await?;
        crate::run_migrations(&pool).await?;
        Ok(Self::with_pool(pool))
    }

    /// Create a store on an existing pool. Call [`crate::run_migrations`]
    /// first.
    pub fn with_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RbacStore for SqliteRbacStore {
    async fn permissions(&self) -> Result<Vec<Permission>> {
        let rows: Vec<PermissionRow> =
            sqlx::query_as("SELECT name, description FROM rbac_permissions ORDER BY name")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(Permission::from).collect())
    }

    async fn permission(&self, name: &str) -> Result<Option<Permission>> {
        let row: Option<PermissionRow> =
            sqlx::query_as("SELECT name, description FROM rbac_permissions WHERE name = ?")
                .bind(name)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(Permission::from))
    }

    async fn roles(&self) -> Result<Vec<Role>> {
        let rows: Vec<RoleRow> = sqlx::query_as(
            "SELECT name, description, permissions, parents FROM rbac_roles ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Role::try_from).collect()
    }

    async fn role(&self, name: &str) -> Result<Option<Role>> {
        let row: Option<RoleRow> = sqlx::query_as(
            "SELECT name, description, permissions, parents FROM rbac_roles WHERE name = ?",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Role::try_from).transpose()
    }

    async fn bindings(&self) -> Result<Vec<RoleBinding>> {
        let rows: Vec<BindingRow> = sqlx::query_as(
            "SELECT kind, identifier, roles FROM rbac_bindings ORDER BY kind, identifier",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(RoleBinding::try_from).collect()
    }

    async fn binding(&self, kind: BindingKind, identifier: &str) -> Result<Option<RoleBinding>> {
        let row: Option<BindingRow> = sqlx::query_as(
            "SELECT kind, identifier, roles FROM rbac_bindings WHERE kind = ? AND identifier = ?",
        )
        .bind(kind.as_str())
        .bind(identifier)
        .fetch_optional(&self.pool)
        .await?;
        row.map(RoleBinding::try_from).transpose()
    }

    async fn commit(&self, changes: ChangeSet) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for name in &changes.delete_permissions {
            sqlx::query("DELETE FROM rbac_permissions WHERE name = ?")
                .bind(name)
                .execute(&mut *tx)
                .await?;
        }
        for name in &changes.delete_roles {
            sqlx::query("DELETE FROM rbac_roles WHERE name = ?")
                .bind(name)
                .execute(&mut *tx)
                .await?;
        }
        for (kind, identifier) in &changes.delete_bindings {
            sqlx::query("DELETE FROM rbac_bindings WHERE kind = ? AND identifier = ?")
                .bind(kind.as_str())
                .bind(identifier)
                .execute(&mut *tx)
                .await?;
        }

        for permission in &changes.upsert_permissions {
            sqlx::query(
                "INSERT INTO rbac_permissions (name, description) VALUES (?, ?)
                 ON CONFLICT(name) DO UPDATE SET description = excluded.description",
            )
            .bind(&permission.name)
            .bind(&permission.description)
            .execute(&mut *tx)
            .await?;
        }
        for role in &changes.upsert_roles {
            sqlx::query(
                "INSERT INTO rbac_roles (name, description, permissions, parents) VALUES (?, ?, ?, ?)
                 ON CONFLICT(name) DO UPDATE SET
                    description = excluded.description,
                    permissions = excluded.permissions,
                    parents = excluded.parents",
            )
            .bind(&role.name)
            .bind(&role.description)
            .bind(serde_json::to_string(&role.permissions)?)
            .bind(serde_json::to_string(&role.parents)?)
            .execute(&mut *tx)
            .await?;
        }
        for binding in &changes.upsert_bindings {
            sqlx::query(
                "INSERT INTO rbac_bindings (kind, identifier, roles) VALUES (?, ?, ?)
                 ON CONFLICT(kind, identifier) DO UPDATE SET roles = excluded.roles",
            )
            .bind(binding.kind.as_str())
            .bind(&binding.identifier)
            .bind(serde_json::to_string(&binding.roles)?)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    async fn make_store() -> SqliteRbacStore {
        SqliteRbacStore::connect("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn commit_roundtrip() {
        let store = make_store().await;
        store
            .commit(ChangeSet {
                upsert_permissions: vec![Permission::new("deploy", "Ship it")],
                upsert_roles: vec![
                    Role::new("admin", "Admins").with_permissions(["deploy"]),
                    Role::new("ops", "").with_parents(["admin"]),
                ],
                upsert_bindings: vec![RoleBinding::new(BindingKind::MemberOf, "G1", ["ops"])],
                ..ChangeSet::default()
            })
            .await
            .unwrap();

        assert_eq!(
            store.permission("deploy").await.unwrap().unwrap().description,
            "Ship it"
        );
        let roles = store.roles().await.unwrap();
        assert_eq!(roles.len(), 2);
        assert_eq!(roles[0].permissions, vec!["deploy".to_string()]);
        assert_eq!(roles[1].parents, vec!["admin".to_string()]);
        let binding = store
            .binding(BindingKind::MemberOf, "G1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(binding.roles, vec!["ops".to_string()]);
        assert!(store.binding(BindingKind::User, "G1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn upsert_replaces_and_delete_removes() {
        let store = make_store().await;
        store
            .commit(ChangeSet {
                upsert_roles: vec![Role::new("a", "first")],
                ..ChangeSet::default()
            })
            .await
            .unwrap();
        store
            .commit(ChangeSet {
                upsert_roles: vec![Role::new("a", "second")],
                ..ChangeSet::default()
            })
            .await
            .unwrap();
        assert_eq!(store.role("a").await.unwrap().unwrap().description, "second");

        store
            .commit(ChangeSet {
                delete_roles: vec!["a".into()],
                ..ChangeSet::default()
            })
            .await
            .unwrap();
        assert!(store.role("a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn failed_commit_rolls_back() {
        let store = make_store().await;
        sqlx::query("DROP TABLE rbac_bindings")
            .execute(&store.pool)
            .await
            .unwrap();

        let result = store
            .commit(ChangeSet {
                upsert_permissions: vec![Permission::new("deploy", "")],
                upsert_bindings: vec![RoleBinding::new(BindingKind::User, "U1", ["a"])],
                ..ChangeSet::default()
            })
            .await;
        assert!(result.is_err());
        assert!(store.permissions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn open_creates_database_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("rbac.db");
        let store = SqliteRbacStore::open(&path).await.unwrap();
        store
            .commit(ChangeSet {
                upsert_permissions: vec![Permission::new("x", "")],
                ..ChangeSet::default()
            })
            .await
            .unwrap();
        drop(store);

        let reopened = SqliteRbacStore::open(&path).await.unwrap();
        assert_eq!(reopened.permissions().await.unwrap().len(), 1);
    }
}
