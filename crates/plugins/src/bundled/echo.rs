//! `echo`: repeats whatever follows the command word.

use {async_trait::async_trait, hal_common::types::InboundMessage};

use crate::plugin::{Plugin, PluginContext, PluginDescriptor, Trigger, command_args};

pub struct EchoPlugin;

#[async_trait]
impl Plugin for EchoPlugin {
    fn metadata(&self) -> PluginDescriptor {
        PluginDescriptor::new("echo", "Will repeat what you said").with_active(
            Trigger::new("echo", "Parrot style")
                .with_long_description("Will repeat what you put after."),
        )
    }

    async fn process_message(
        &self,
        trigger: &str,
        message: &InboundMessage,
        ctx: &PluginContext,
    ) -> anyhow::Result<bool> {
        let text = command_args(&message.text, trigger);
        if text.is_empty() {
            return Ok(false);
        }
        ctx.outbound.reply(&message.channel_id, text).await?;
        Ok(true)
    }
}
