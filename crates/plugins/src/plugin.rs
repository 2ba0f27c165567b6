use std::sync::Arc;

use {async_trait::async_trait, hal_channels::OutboundSender, hal_common::types::InboundMessage};

use crate::{registry::PluginRegistry, services::ServiceRegistry};

/// A command word (active) or regular expression (passive) a plugin reacts
/// to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trigger {
    pub name: String,
    pub short_description: String,
    pub long_description: String,
}

impl Trigger {
    pub fn new(name: impl Into<String>, short_description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            short_description: short_description.into(),
            long_description: String::new(),
        }
    }

    #[must_use]
    pub fn with_long_description(mut self, long_description: impl Into<String>) -> Self {
        self.long_description = long_description.into();
        self
    }
}

/// What a plugin tells the registry about itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginDescriptor {
    pub name: String,
    pub version: String,
    pub description: String,
    pub active_triggers: Vec<Trigger>,
    pub passive_triggers: Vec<Trigger>,
    /// Only evaluate triggers when the bot is mentioned or in a DM.
    pub requires_mention: bool,
    pub disabled: bool,
}

impl PluginDescriptor {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            description: description.into(),
            active_triggers: Vec::new(),
            passive_triggers: Vec::new(),
            requires_mention: false,
            disabled: false,
        }
    }

    #[must_use]
    pub fn with_active(mut self, trigger: Trigger) -> Self {
        self.active_triggers.push(trigger);
        self
    }

    #[must_use]
    pub fn with_passive(mut self, trigger: Trigger) -> Self {
        self.passive_triggers.push(trigger);
        self
    }

    #[must_use]
    pub fn requiring_mention(mut self) -> Self {
        self.requires_mention = true;
        self
    }
}

/// Everything a plugin may touch while handling a message.
#[derive(Clone)]
pub struct PluginContext {
    pub outbound: OutboundSender,
    pub registry: Arc<PluginRegistry>,
    pub services: Arc<ServiceRegistry>,
}

/// A message handler. Plugins never talk to the chat gateway directly; they
/// enqueue responses on `ctx.outbound`.
#[async_trait]
pub trait Plugin: Send + Sync {
    fn metadata(&self) -> PluginDescriptor;

    /// Handle `message`. `trigger` is the active trigger name that matched,
    /// or for passive triggers the matched text.
    ///
    /// Returns whether the message was handled. Only passive handlers'
    /// answers are consulted, to decide on a fallback reply.
    async fn process_message(
        &self,
        trigger: &str,
        message: &InboundMessage,
        ctx: &PluginContext,
    ) -> anyhow::Result<bool>;
}

/// Text following the first word equal (ignoring case) to `command`, or the
/// whole text trimmed when the word is absent.
pub fn command_args<'a>(text: &'a str, command: &str) -> &'a str {
    let mut rest = text.trim_start();
    while !rest.is_empty() {
        let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
        let (word, tail) = rest.split_at(end);
        if word.eq_ignore_ascii_case(command) {
            return tail.trim();
        }
        rest = tail.trim_start();
    }
    text.trim()
}

#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest};

    #[rstest]
    #[case("echo hello world", "echo", "hello world")]
    #[case("<@U_HAL> ECHO  hi ", "echo", "hi")]
    #[case("echo", "echo", "")]
    #[case("nothing here", "echo", "nothing here")]
    #[case("rbac add-role ops Operators", "rbac", "add-role ops Operators")]
    fn extracts_command_args(#[case] text: &str, #[case] command: &str, #[case] expected: &str) {
        assert_eq!(command_args(text, command), expected);
    }

    #[test]
    fn descriptor_defaults() {
        let d = PluginDescriptor::new("echo", "Parrot").with_active(Trigger::new("echo", "x"));
        assert!(!d.requires_mention);
        assert!(!d.disabled);
        assert_eq!(d.active_triggers.len(), 1);
        assert!(d.requiring_mention().requires_mention);
    }
}
