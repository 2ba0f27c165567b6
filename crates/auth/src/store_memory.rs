//! In-memory store for tests and RBAC-less deployments.

use std::{
    collections::BTreeMap,
    sync::{
        Mutex,
        atomic::{AtomicBool, Ordering},
    },
};

use async_trait::async_trait;

use crate::{
    Error, Result,
    records::{BindingKind, Permission, Role, RoleBinding},
    store::{ChangeSet, RbacStore},
};

#[derive(Default)]
struct State {
    permissions: BTreeMap<String, Permission>,
    roles: BTreeMap<String, Role>,
    bindings: BTreeMap<(BindingKind, String), RoleBinding>,
}

/// `BTreeMap`-backed store. Nothing survives the process.
#[derive(Default)]
pub struct InMemoryRbacStore {
    state: Mutex<State>,
    fail_commits: AtomicBool,
}

impl InMemoryRbacStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent commit fail without touching the state.
    pub fn set_fail_commits(&self, fail: bool) {
        self.fail_commits.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl RbacStore for InMemoryRbacStore {
    async fn permissions(&self) -> Result<Vec<Permission>> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        Ok(state.permissions.values().cloned().collect())
    }

    async fn permission(&self, name: &str) -> Result<Option<Permission>> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        Ok(state.permissions.get(name).cloned())
    }

    async fn roles(&self) -> Result<Vec<Role>> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        Ok(state.roles.values().cloned().collect())
    }

    async fn role(&self, name: &str) -> Result<Option<Role>> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        Ok(state.roles.get(name).cloned())
    }

    async fn bindings(&self) -> Result<Vec<RoleBinding>> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        Ok(state.bindings.values().cloned().collect())
    }

    async fn binding(&self, kind: BindingKind, identifier: &str) -> Result<Option<RoleBinding>> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        Ok(state.bindings.get(&(kind, identifier.to_string())).cloned())
    }

    async fn commit(&self, changes: ChangeSet) -> Result<()> {
        if self.fail_commits.load(Ordering::SeqCst) {
            return Err(Error::message("commit rejected by in-memory store"));
        }
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        for name in changes.delete_permissions {
            state.permissions.remove(&name);
        }
        for name in changes.delete_roles {
            state.roles.remove(&name);
        }
        for key in changes.delete_bindings {
            state.bindings.remove(&key);
        }
        for permission in changes.upsert_permissions {
            state.permissions.insert(permission.name.clone(), permission);
        }
        for role in changes.upsert_roles {
            state.roles.insert(role.name.clone(), role);
        }
        for binding in changes.upsert_bindings {
            state
                .bindings
                .insert((binding.kind, binding.identifier.clone()), binding);
        }
        Ok(())
    }
}
