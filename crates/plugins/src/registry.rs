//! Ordered plugin registry.
//!
//! Registration order is significant: it breaks ties between plugins whose
//! triggers match the same message and orders every help listing. The
//! registry is filled and configured before dispatch starts and shared
//! read-only afterwards.

use std::sync::Arc;

use tracing::info;

use crate::{
    Error, Result,
    plugin::{Plugin, PluginDescriptor},
};

pub struct RegisteredPlugin {
    descriptor: PluginDescriptor,
    plugin: Arc<dyn Plugin>,
}

impl RegisteredPlugin {
    pub fn descriptor(&self) -> &PluginDescriptor {
        &self.descriptor
    }

    pub fn plugin(&self) -> &Arc<dyn Plugin> {
        &self.plugin
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn is_enabled(&self) -> bool {
        !self.descriptor.disabled
    }
}

#[derive(Default)]
pub struct PluginRegistry {
    plugins: Vec<RegisteredPlugin>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `plugin`, capturing its descriptor. Names must be unique.
    pub fn register(&mut self, plugin: Arc<dyn Plugin>) -> Result<()> {
        let descriptor = plugin.metadata();
        if self.get(&descriptor.name).is_some() {
            return Err(Error::duplicate_plugin(descriptor.name));
        }
        info!(
            plugin = %descriptor.name,
            version = %descriptor.version,
            active = descriptor.active_triggers.len(),
            passive = descriptor.passive_triggers.len(),
            "plugin registered"
        );
        self.plugins.push(RegisteredPlugin { descriptor, plugin });
        Ok(())
    }

    /// Mark `name` disabled. The entry stays in place.
    pub fn disable(&mut self, name: &str) -> Result<()> {
        let entry = self
            .plugins
            .iter_mut()
            .find(|p| p.descriptor.name == name)
            .ok_or_else(|| Error::unknown_plugin(name))?;
        entry.descriptor.disabled = true;
        info!(plugin = name, "plugin disabled");
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&RegisteredPlugin> {
        self.plugins.iter().find(|p| p.descriptor.name == name)
    }

    /// Every plugin in registration order, disabled ones included.
    pub fn iter(&self) -> impl Iterator<Item = &RegisteredPlugin> {
        self.plugins.iter()
    }

    /// Enabled plugins in registration order.
    pub fn enabled(&self) -> impl Iterator<Item = &RegisteredPlugin> {
        self.plugins.iter().filter(|p| p.is_enabled())
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::plugin::{PluginContext, Trigger},
        async_trait::async_trait,
        hal_common::types::InboundMessage,
    };

    struct Named(&'static str);

    #[async_trait]
    impl Plugin for Named {
        fn metadata(&self) -> PluginDescriptor {
            PluginDescriptor::new(self.0, "test").with_active(Trigger::new(self.0, ""))
        }

        async fn process_message(
            &self,
            _trigger: &str,
            _message: &InboundMessage,
            _ctx: &PluginContext,
        ) -> anyhow::Result<bool> {
            Ok(true)
        }
    }

    #[test]
    fn keeps_registration_order() {
        let mut registry = PluginRegistry::new();
        for name in ["zeta", "alpha", "mid"] {
            registry.register(Arc::new(Named(name))).unwrap();
        }
        let names: Vec<&str> = registry.iter().map(|p| p.name()).collect();
        assert_eq!(names, ["zeta", "alpha", "mid"]);
    }

    #[test]
    fn rejects_duplicate_names() {
        let mut registry = PluginRegistry::new();
        registry.register(Arc::new(Named("echo"))).unwrap();
        assert!(matches!(
            registry.register(Arc::new(Named("echo"))),
            Err(Error::DuplicatePlugin { .. })
        ));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn disable_keeps_entry() {
        let mut registry = PluginRegistry::new();
        registry.register(Arc::new(Named("a"))).unwrap();
        registry.register(Arc::new(Named("b"))).unwrap();
        registry.disable("a").unwrap();

        assert_eq!(registry.len(), 2);
        assert!(!registry.get("a").unwrap().is_enabled());
        let enabled: Vec<&str> = registry.enabled().map(|p| p.name()).collect();
        assert_eq!(enabled, ["b"]);
        assert!(matches!(
            registry.disable("ghost"),
            Err(Error::UnknownPlugin { .. })
        ));
    }
}
