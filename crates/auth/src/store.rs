//! Persistence trait for RBAC records.

use async_trait::async_trait;

use crate::{
    Result,
    records::{BindingKind, Permission, Role, RoleBinding},
};

/// A batch of writes applied atomically by [`RbacStore::commit`].
///
/// Deletions are applied before upserts.
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    pub upsert_permissions: Vec<Permission>,
    pub delete_permissions: Vec<String>,
    pub upsert_roles: Vec<Role>,
    pub delete_roles: Vec<String>,
    pub upsert_bindings: Vec<RoleBinding>,
    pub delete_bindings: Vec<(BindingKind, String)>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.upsert_permissions.is_empty()
            && self.delete_permissions.is_empty()
            && self.upsert_roles.is_empty()
            && self.delete_roles.is_empty()
            && self.upsert_bindings.is_empty()
            && self.delete_bindings.is_empty()
    }
}

/// Persistence backend for permissions, roles and bindings.
///
/// Listing methods return records ordered by name (bindings by kind, then
/// identifier).
#[async_trait]
pub trait RbacStore: Send + Sync {
    async fn permissions(&self) -> Result<Vec<Permission>>;
    async fn permission(&self, name: &str) -> Result<Option<Permission>>;
    async fn roles(&self) -> Result<Vec<Role>>;
    async fn role(&self, name: &str) -> Result<Option<Role>>;
    async fn bindings(&self) -> Result<Vec<RoleBinding>>;
    async fn binding(&self, kind: BindingKind, identifier: &str) -> Result<Option<RoleBinding>>;
    /// Apply every change in `changes`, or none of them.
    async fn commit(&self, changes: ChangeSet) -> Result<()>;
}
