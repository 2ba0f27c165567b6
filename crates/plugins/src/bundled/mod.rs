//! Plugins shipped with the bot.

use std::sync::Arc;

use crate::{Result, registry::PluginRegistry};

pub mod echo;
pub mod help;
pub mod logger;
pub mod rbac;

/// Register every bundled plugin, in listing order.
pub fn register_bundled(registry: &mut PluginRegistry) -> Result<()> {
    registry.register(Arc::new(echo::EchoPlugin))?;
    registry.register(Arc::new(help::HelpPlugin))?;
    registry.register(Arc::new(logger::LoggerPlugin))?;
    registry.register(Arc::new(rbac::RbacPlugin))?;
    Ok(())
}


#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_all_bundled_plugins() {
        let mut registry = PluginRegistry::new();
        register_bundled(&mut registry).unwrap();
        let names: Vec<_> = registry.iter().map(|p| p.name().to_string()).collect();
        assert_eq!(names, ["echo", "help", "logger", "rbac"]);
        assert!(register_bundled(&mut registry).is_err());
    }
}
