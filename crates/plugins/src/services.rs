//! Capability lookup shared between plugins.
//!
//! A component that wants to expose functionality to plugins registers a
//! typed handle under a capability name; consumers ask for that name and
//! type and get `None` if either does not match.

use std::{
    any::Any,
    collections::HashMap,
    sync::{Arc, RwLock},
};

use tracing::debug;

/// Capability name of the RBAC authorizer.
pub const RBAC_SERVICE: &str = "rbac";

type Service = Arc<dyn Any + Send + Sync>;

#[derive(Default)]
pub struct ServiceRegistry {
    services: RwLock<HashMap<String, Service>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `service` under `name`, replacing any previous entry.
    pub fn register<T: Send + Sync + 'static>(&self, name: &str, service: Arc<T>) {
        let mut services = self.services.write().unwrap_or_else(|e| e.into_inner());
        services.insert(name.to_string(), service);
        debug!(service = name, type_name = std::any::type_name::<T>(), "service registered");
    }

    pub fn get<T: Send + Sync + 'static>(&self, name: &str) -> Option<Arc<T>> {
        let services = self.services.read().unwrap_or_else(|e| e.into_inner());
        services.get(name).cloned()?.downcast::<T>().ok()
    }

    pub fn contains(&self, name: &str) -> bool {
        let services = self.services.read().unwrap_or_else(|e| e.into_inner());
        services.contains_key(name)
    }
}
