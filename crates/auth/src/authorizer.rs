//! Permission checks and RBAC administration.
//!
//! Every mutation validates the resulting role set before anything is
//! written, commits one [`ChangeSet`], and only then swaps the in-memory
//! [`RoleGraph`]. A failed validation or commit leaves both the store and
//! the graph exactly as they were.

use std::{
    collections::{BTreeMap, BTreeSet},
    path::Path,
    sync::Arc,
};

use {
    tokio::sync::Mutex,
    tracing::{error, info, warn},
};

use crate::{
    Error, Result,
    graph::RoleGraph,
    records::{BindingKind, Permission, Role, RoleBinding, Snapshot},
    store::{ChangeSet, RbacStore},
    store_sqlite::SqliteRbacStore,
};

pub struct Authorizer {
    store: Arc<dyn RbacStore>,
    /// Serializes mutations and guards graph walks.
    graph: Mutex<RoleGraph>,
}

impl Authorizer {
    /// Build an authorizer over `store`, loading the role graph from it.
    pub async fn new(store: Arc<dyn RbacStore>) -> Result<Self> {
        let graph = RoleGraph::build(store.roles().await?)?;
        info!(roles = graph.len(), "rbac role graph loaded");
        Ok(Self {
            store,
            graph: Mutex::new(graph),
        })
    }

    /// Open the SQLite database at `path` and build an authorizer over it.
    pub async fn open(path: &Path) -> Result<Self> {
        let store = SqliteRbacStore::open(path).await?;
        Self::new(Arc::new(store)).await
    }

    /// Whether `user`, speaking in `channel` and belonging to `member_of`,
    /// holds `permission`.
    ///
    /// With no bindings at all everything is allowed, so a fresh install can
    /// be bootstrapped. A store failure denies.
    pub async fn is_granted(
        &self,
        permission: &str,
        user: &str,
        channel: &str,
        member_of: &[String],
    ) -> bool {
        let bindings = match self.store.bindings().await {
            Ok(bindings) => bindings,
            Err(e) => {
                error!(user, permission, channel, error = %e, "cannot read role bindings, denying");
                return false;
            },
        };
        if bindings.is_empty() {
            warn!(user, permission, channel, "no role bindings defined, allowing everything");
            return true;
        }

        let mut roles: Vec<&str> = Vec::new();
        for binding in bindings
            .iter()
            .filter(|b| b.applies_to(user, channel, member_of))
        {
            for role in &binding.roles {
                if !roles.contains(&role.as_str()) {
                    roles.push(role.as_str());
                }
            }
        }

        let graph = self.graph.lock().await;
        for role in &roles {
            if !graph.contains(role) {
                warn!(role, "binding references unknown role");
                continue;
            }
            if let Some(through) = graph.granting_role(role, permission) {
                info!(
                    user,
                    permission,
                    channel,
                    roles = ?roles,
                    member_of = ?member_of,
                    granted_through = through,
                    "permission granted"
                );
                return true;
            }
        }
        info!(
            user,
            permission,
            channel,
            roles = ?roles,
            member_of = ?member_of,
            "permission denied"
        );
        false
    }

    // ── Roles ───────────────────────────────────────────────────────────────

    /// Create `name`, or update the description and parents of an existing
    /// role. Existing permission grants are kept.
    pub async fn add_role(&self, name: &str, description: &str, parents: &[String]) -> Result<()> {
        require_name("role", name)?;
        let mut graph = self.graph.lock().await;
        let mut roles = self.role_map().await?;

        for parent in parents.iter().filter(|p| !p.is_empty()) {
            if parent != name && !roles.contains_key(parent) {
                return Err(Error::unknown_parent(name, parent.as_str()));
            }
        }

        let mut parent_names: Vec<String> = Vec::new();
        for parent in parents.iter().filter(|p| !p.is_empty()) {
            if !parent_names.contains(parent) {
                parent_names.push(parent.clone());
            }
        }

        let role = match roles.remove(name) {
            Some(mut existing) => {
                existing.description = description.to_string();
                existing.parents = parent_names;
                existing
            },
            None => Role::new(name, description).with_parents(parent_names),
        };
        roles.insert(name.to_string(), role.clone());

        let changes = ChangeSet {
            upsert_roles: vec![role],
            ..ChangeSet::default()
        };
        self.apply(&mut graph, roles, changes).await?;
        info!(role = name, "role saved");
        Ok(())
    }

    /// Delete `name`, dropping it from child roles' parents and from every
    /// binding. Bindings left without roles are deleted.
    pub async fn remove_role(&self, name: &str) -> Result<()> {
        let mut graph = self.graph.lock().await;
        let mut roles = self.role_map().await?;
        if roles.remove(name).is_none() {
            return Err(Error::unknown_role(name));
        }

        let mut changes = ChangeSet {
            delete_roles: vec![name.to_string()],
            ..ChangeSet::default()
        };
        for role in roles.values_mut() {
            if role.parents.iter().any(|p| p == name) {
                role.parents.retain(|p| p != name);
                changes.upsert_roles.push(role.clone());
            }
        }
        for mut binding in self.store.bindings().await? {
            if !binding.roles.iter().any(|r| r == name) {
                continue;
            }
            binding.roles.retain(|r| r != name);
            if binding.roles.is_empty() {
                changes.delete_bindings.push((binding.kind, binding.identifier));
            } else {
                changes.upsert_bindings.push(binding);
            }
        }

        self.apply(&mut graph, roles, changes).await?;
        info!(role = name, "role removed");
        Ok(())
    }

    // ── Permissions ─────────────────────────────────────────────────────────

    /// Create `name`, or update its description.
    pub async fn add_permission(&self, name: &str, description: &str) -> Result<()> {
        require_name("permission", name)?;
        let mut graph = self.graph.lock().await;
        let roles = self.role_map().await?;
        let changes = ChangeSet {
            upsert_permissions: vec![Permission::new(name, description)],
            ..ChangeSet::default()
        };
        self.apply(&mut graph, roles, changes).await?;
        info!(permission = name, "permission saved");
        Ok(())
    }

    /// Delete `name` and detach it from every role.
    pub async fn remove_permission(&self, name: &str) -> Result<()> {
        let mut graph = self.graph.lock().await;
        if self.store.permission(name).await?.is_none() {
            return Err(Error::unknown_permission(name));
        }
        let mut roles = self.role_map().await?;
        let mut changes = ChangeSet {
            delete_permissions: vec![name.to_string()],
            ..ChangeSet::default()
        };
        for role in roles.values_mut() {
            if role.has_permission(name) {
                role.permissions.retain(|p| p != name);
                changes.upsert_roles.push(role.clone());
            }
        }
        self.apply(&mut graph, roles, changes).await?;
        info!(permission = name, "permission removed");
        Ok(())
    }

    /// Grant `permission` to `role`. Attaching twice is a no-op.
    pub async fn attach_permission(&self, permission: &str, role: &str) -> Result<()> {
        let mut graph = self.graph.lock().await;
        if self.store.permission(permission).await?.is_none() {
            return Err(Error::unknown_permission(permission));
        }
        let mut roles = self.role_map().await?;
        let target = roles.get_mut(role).ok_or_else(|| Error::unknown_role(role))?;
        if target.has_permission(permission) {
            return Ok(());
        }
        target.permissions.push(permission.to_string());
        let changes = ChangeSet {
            upsert_roles: vec![target.clone()],
            ..ChangeSet::default()
        };
        self.apply(&mut graph, roles, changes).await?;
        info!(permission, role, "permission attached");
        Ok(())
    }

    /// Revoke `permission` from `role`.
    pub async fn detach_permission(&self, permission: &str, role: &str) -> Result<()> {
        let mut graph = self.graph.lock().await;
        if self.store.permission(permission).await?.is_none() {
            return Err(Error::unknown_permission(permission));
        }
        let mut roles = self.role_map().await?;
        let target = roles.get_mut(role).ok_or_else(|| Error::unknown_role(role))?;
        target.permissions.retain(|p| p != permission);
        let changes = ChangeSet {
            upsert_roles: vec![target.clone()],
            ..ChangeSet::default()
        };
        self.apply(&mut graph, roles, changes).await?;
        info!(permission, role, "permission detached");
        Ok(())
    }

    // ── Bindings ────────────────────────────────────────────────────────────

    /// Add `roles` to the binding for `kind`/`identifier`, creating it if
    /// needed. Every role must exist.
    pub async fn bind_to_role(
        &self,
        kind: BindingKind,
        identifier: &str,
        roles: &[String],
    ) -> Result<()> {
        require_name("binding identifier", identifier)?;
        if roles.is_empty() {
            return Err(Error::message("a binding needs at least one role"));
        }
        let mut graph = self.graph.lock().await;
        let role_map = self.role_map().await?;
        if let Some(missing) = roles.iter().find(|r| !role_map.contains_key(*r)) {
            return Err(Error::unknown_role(missing.as_str()));
        }

        let mut binding = self
            .store
            .binding(kind, identifier)
            .await?
            .unwrap_or_else(|| RoleBinding::new(kind, identifier, Vec::<String>::new()));
        for role in roles {
            if !binding.roles.contains(role) {
                binding.roles.push(role.clone());
            }
        }
        let changes = ChangeSet {
            upsert_bindings: vec![binding],
            ..ChangeSet::default()
        };
        self.apply(&mut graph, role_map, changes).await?;
        info!(%kind, identifier, roles = ?roles, "roles bound");
        Ok(())
    }

    /// Remove `role` from the binding for `kind`/`identifier`, deleting the
    /// binding when no role is left.
    pub async fn unbind_from_role(
        &self,
        kind: BindingKind,
        identifier: &str,
        role: &str,
    ) -> Result<()> {
        let mut graph = self.graph.lock().await;
        let mut binding = self
            .store
            .binding(kind, identifier)
            .await?
            .ok_or_else(|| Error::unknown_binding(kind, identifier))?;
        if !binding.roles.iter().any(|r| r == role) {
            return Err(Error::RoleNotBound {
                role: role.to_string(),
                kind,
                identifier: identifier.to_string(),
            });
        }
        binding.roles.retain(|r| r != role);

        let mut changes = ChangeSet::default();
        if binding.roles.is_empty() {
            changes.delete_bindings.push((kind, identifier.to_string()));
        } else {
            changes.upsert_bindings.push(binding);
        }
        let roles = self.role_map().await?;
        self.apply(&mut graph, roles, changes).await?;
        info!(%kind, identifier, role, "role unbound");
        Ok(())
    }

    // ── Snapshots ───────────────────────────────────────────────────────────

    /// Everything currently persisted.
    pub async fn list(&self) -> Result<Snapshot> {
        let _graph = self.graph.lock().await;
        Ok(Snapshot {
            roles: self.store.roles().await?,
            bindings: self.store.bindings().await?,
            permissions: self.store.permissions().await?,
        })
    }

    /// Serialized snapshot, or `None` when there is nothing to dump.
    pub async fn dump(&self) -> Result<Option<Vec<u8>>> {
        let snapshot = self.list().await?;
        if snapshot.is_empty() {
            return Ok(None);
        }
        Ok(Some(serde_json::to_vec(&snapshot)?))
    }

    /// Merge a serialized snapshot into the current state. Records with the
    /// same key are replaced; nothing is deleted. Bindings without roles are
    /// skipped. Every role a binding names and every permission a role
    /// carries must exist afterwards, or nothing is loaded.
    pub async fn load(&self, raw: &[u8]) -> Result<()> {
        let snapshot: Snapshot = serde_json::from_slice(raw)?;
        let mut graph = self.graph.lock().await;
        let mut roles = self.role_map().await?;

        for role in &snapshot.roles {
            roles.insert(role.name.clone(), role.clone());
        }
        let bindings: Vec<RoleBinding> = snapshot
            .bindings
            .into_iter()
            .filter(|b| {
                if b.roles.is_empty() {
                    warn!(kind = %b.kind, identifier = %b.identifier, "skipping empty binding");
                }
                !b.roles.is_empty()
            })
            .collect();

        let mut permissions: BTreeSet<String> = self
            .store
            .permissions()
            .await?
            .into_iter()
            .map(|p| p.name)
            .collect();
        permissions.extend(snapshot.permissions.iter().map(|p| p.name.clone()));
        for role in &snapshot.roles {
            if let Some(missing) = role.permissions.iter().find(|p| !permissions.contains(*p)) {
                return Err(Error::unknown_permission(missing.as_str()));
            }
        }
        for binding in &bindings {
            if let Some(missing) = binding.roles.iter().find(|r| !roles.contains_key(*r)) {
                return Err(Error::unknown_role(missing.as_str()));
            }
        }

        let counts = (snapshot.roles.len(), bindings.len(), snapshot.permissions.len());
        let changes = ChangeSet {
            upsert_permissions: snapshot.permissions,
            upsert_roles: snapshot.roles,
            upsert_bindings: bindings,
            ..ChangeSet::default()
        };
        self.apply(&mut graph, roles, changes).await?;
        info!(
            roles = counts.0,
            bindings = counts.1,
            permissions = counts.2,
            "rbac snapshot loaded"
        );
        Ok(())
    }

    // ── Internals ───────────────────────────────────────────────────────────

    async fn role_map(&self) -> Result<BTreeMap<String, Role>> {
        Ok(self
            .store
            .roles()
            .await?
            .into_iter()
            .map(|r| (r.name.clone(), r))
            .collect())
    }

    /// Validate `roles` (the complete post-change role set), persist
    /// `changes`, then install the new graph.
    async fn apply(
        &self,
        graph: &mut RoleGraph,
        roles: BTreeMap<String, Role>,
        changes: ChangeSet,
    ) -> Result<()> {
        let candidate = RoleGraph::build(roles.into_values())?;
        if !changes.is_empty() {
            self.store.commit(changes).await?;
        }
        *graph = candidate;
        Ok(())
    }
}

fn require_name(what: &str, name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(Error::message(format!("{what} name cannot be empty")));
    }
    Ok(())
}
