//! `logger`: passive trigger matching every message, logged at info.

use {async_trait::async_trait, hal_common::types::InboundMessage, tracing::info};

use crate::plugin::{Plugin, PluginContext, PluginDescriptor, Trigger};

pub struct LoggerPlugin;

#[async_trait]
impl Plugin for LoggerPlugin {
    fn metadata(&self) -> PluginDescriptor {
        PluginDescriptor::new("logger", "Logs messages").with_passive(
            Trigger::new("(?s:.*)", "Log everything")
                .with_long_description("Will intercept all messages to log them."),
        )
    }

    async fn process_message(
        &self,
        matched: &str,
        message: &InboundMessage,
        _ctx: &PluginContext,
    ) -> anyhow::Result<bool> {
        if !matched.is_empty() {
            info!(
                channel_id = %message.channel_id,
                user_id = %message.user_id,
                text = matched,
                "message"
            );
        }
        Ok(false)
    }
}
