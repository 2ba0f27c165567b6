//! `help`: plugin, command and passive-trigger listings.
//!
//! Replies go to the requesting user rather than the channel.

use std::fmt::Write as _;

use {async_trait::async_trait, hal_common::types::InboundMessage};

use crate::{
    plugin::{Plugin, PluginContext, PluginDescriptor, Trigger, command_args},
    registry::PluginRegistry,
};

pub struct HelpPlugin;

#[async_trait]
impl Plugin for HelpPlugin {
    fn metadata(&self) -> PluginDescriptor {
        PluginDescriptor::new("help", "Helper plugin.")
            .with_active(
                Trigger::new("help", "Will provide some help :)").with_long_description(
                    "help [<plugin> [<command>]]: describe a plugin, or one of its commands.",
                ),
            )
            .with_active(Trigger::new("list-plugins", "List all enabled plugins"))
            .with_active(Trigger::new("list-commands", "List all available commands"))
            .with_active(Trigger::new("list-triggers", "List all passive triggers"))
    }

    async fn process_message(
        &self,
        trigger: &str,
        message: &InboundMessage,
        ctx: &PluginContext,
    ) -> anyhow::Result<bool> {
        let registry = &ctx.registry;
        let text = match trigger {
            "list-plugins" => plugin_list(registry),
            "list-commands" => command_list(registry),
            "list-triggers" => trigger_list(registry),
            _ => {
                let args = command_args(&message.text, "help");
                let mut words = args.split_whitespace();
                let help = match (words.next(), words.next()) {
                    (None, _) => plugin_help(registry, "help", Some("help")),
                    (Some(plugin), command) => plugin_help(registry, plugin, command),
                };
                help.unwrap_or_else(|| format!("Sorry but I cannot find help for `help {args}`"))
            },
        };
        ctx.outbound.reply(&message.user_id, text).await?;
        Ok(true)
    }
}

fn header(d: &PluginDescriptor) -> String {
    format!("*{}* ({}) - {}", d.name, d.version, d.description)
}

pub fn plugin_list(registry: &PluginRegistry) -> String {
    let mut out = String::from("Here is my plugin list:\n");
    for p in registry.enabled() {
        let _ = writeln!(out, ">{}", header(p.descriptor()));
    }
    out
}

fn trigger_section<'a>(
    registry: &'a PluginRegistry,
    triggers: impl Fn(&'a PluginDescriptor) -> &'a [Trigger],
) -> String {
    let mut out = String::new();
    for p in registry.enabled() {
        let list = triggers(p.descriptor());
        if list.is_empty() {
            continue;
        }
        let _ = writeln!(out, "\n{}", header(p.descriptor()));
        for t in list {
            let _ = writeln!(out, ">_{}_  - {}", t.name, t.short_description);
        }
    }
    out
}

pub fn command_list(registry: &PluginRegistry) -> String {
    let body = trigger_section(registry, |d| d.active_triggers.as_slice());
    if body.is_empty() {
        return "Cannot find any plugin actions.".into();
    }
    format!("Here are all the commands available:\n{body}")
}

pub fn trigger_list(registry: &PluginRegistry) -> String {
    let body = trigger_section(registry, |d| d.passive_triggers.as_slice());
    if body.is_empty() {
        return "Cannot find any passive triggers.".into();
    }
    format!("Here are all the passive triggers enabled:\n{body}")
}

/// Describe `plugin`'s commands, with the long description of `command`.
/// `None` when the plugin is unknown or disabled.
pub fn plugin_help(
    registry: &PluginRegistry,
    plugin: &str,
    command: Option<&str>,
) -> Option<String> {
    let d = registry.enabled().find(|p| p.name() == plugin)?.descriptor();
    let mut out = format!("{}\n", header(d));
    for t in &d.active_triggers {
        if Some(t.name.as_str()) == command {
            let _ = writeln!(out, "> *{}*:\n```{}```", t.name, t.long_description);
        } else {
            let _ = writeln!(out, "> *{}* - {}", t.name, t.short_description);
        }
    }
    Some(out)
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use {
        super::*,
        crate::bundled::{echo::EchoPlugin, logger::LoggerPlugin, testing},
    };

    fn registry() -> PluginRegistry {
        let mut r = PluginRegistry::new();
        r.register(Arc::new(EchoPlugin)).unwrap();
        r.register(Arc::new(HelpPlugin)).unwrap();
        r.register(Arc::new(LoggerPlugin)).unwrap();
        r
    }

    #[test]
    fn lists_enabled_plugins_in_order() {
        let mut r = registry();
        r.disable("logger").unwrap();
        let text = plugin_list(&r);
        assert!(text.starts_with("Here is my plugin list:\n>*echo*"));
        assert!(text.find("*echo*").unwrap() < text.find("*help*").unwrap());
        assert!(!text.contains("logger"));
    }

    #[test]
    fn command_and_trigger_listings() {
        let r = registry();
        let commands = command_list(&r);
        assert!(commands.contains(">_echo_  - Parrot style"));
        assert!(commands.contains(">_list-triggers_"));
        assert!(!commands.contains("*logger*"));

        let triggers = trigger_list(&r);
        assert!(triggers.contains(">_(?s:.*)_  - Log everything"));
    }

    #[test]
    fn empty_listings() {
        let r = PluginRegistry::new();
        assert_eq!(command_list(&r), "Cannot find any plugin actions.");
        assert_eq!(trigger_list(&r), "Cannot find any passive triggers.");
    }

    #[test]
    fn named_command_gets_long_description() {
        let text = plugin_help(&registry(), "echo", Some("echo")).unwrap();
        assert!(text.contains("> *echo*:\n```Will repeat what you put after.```"));
        let text = plugin_help(&registry(), "echo", None).unwrap();
        assert!(text.contains("> *echo* - Parrot style"));
    }

    #[tokio::test]
    async fn unknown_plugin_reply_goes_to_user() {
        let (ctx, mut rx) = testing::context(registry());
        let msg = InboundMessage::new("C1", "U7", "help weather");
        assert!(HelpPlugin.process_message("help", &msg, &ctx).await.unwrap());

        let out = rx.try_recv().unwrap();
        assert_eq!(out.destination.unwrap().to_string(), "U7");
        assert_eq!(
            out.content.unwrap().text,
            "Sorry but I cannot find help for `help weather`"
        );
    }

    #[tokio::test]
    async fn bare_help_describes_itself() {
        let (ctx, mut rx) = testing::context(registry());
        let msg = InboundMessage::new("D1", "U7", "help");
        HelpPlugin.process_message("help", &msg, &ctx).await.unwrap();
        let text = rx.try_recv().unwrap().content.unwrap().text;
        assert!(text.starts_with("*help*"));
        assert!(text.contains("> *list-plugins* - List all enabled plugins"));
    }
}
