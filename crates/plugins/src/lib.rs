//! Plugin contract, registry and the bundled plugins.
//!
//! A plugin declares active triggers (command words) and passive triggers
//! (regular expressions). The dispatcher decides which plugin runs; plugins
//! answer by enqueueing responses on the outbound queue.

pub mod bundled;
pub mod error;
pub mod plugin;
pub mod registry;
pub mod services;

pub use {
    bundled::register_bundled,
    error::{Error, Result},
    plugin::{Plugin, PluginContext, PluginDescriptor, Trigger, command_args},
    registry::{PluginRegistry, RegisteredPlugin},
    services::{RBAC_SERVICE, ServiceRegistry},
};
