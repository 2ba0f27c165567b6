use {
    async_trait::async_trait,
    hal_common::types::{BotIdentity, Content, Destination, InboundMessage, MessageStamp},
    tokio::sync::mpsc,
};

use crate::Result;

/// Events produced by a connected chat gateway.
#[derive(Debug, Clone)]
pub enum GatewayEvent {
    /// The session is up; carries who the bot is on this platform.
    Connected(BotIdentity),
    Message(InboundMessage),
    /// Late delivery confirmation for a message sent under `correlation_id`.
    Ack {
        correlation_id: String,
        stamp: MessageStamp,
    },
    Disconnected { reason: String },
}

/// Receiver end of a gateway's event stream.
pub type EventReceiver = mpsc::Receiver<GatewayEvent>;

/// Sender end of a gateway's event stream.
pub type EventSender = mpsc::Sender<GatewayEvent>;

/// Chat transport used by the dispatcher and the delivery worker.
#[async_trait]
pub trait ChatGateway: Send + Sync {
    /// Open the session and start streaming events.
    async fn connect(&self) -> Result<EventReceiver>;

    /// Turn a user id or channel name into a concrete channel id.
    async fn resolve(&self, destination: &Destination) -> Option<String>;

    /// Post a new message.
    async fn send(&self, channel_id: &str, content: &Content) -> Result<MessageStamp>;

    /// Replace the content of a previously sent message.
    async fn edit(&self, channel_id: &str, stamp: &MessageStamp, content: &Content) -> Result<()>;

    /// Channels `user_id` belongs to.
    async fn memberships(&self, user_id: &str) -> Result<Vec<String>>;

    /// Whether `channel_id` is a one-to-one conversation with the bot.
    fn is_direct(&self, channel_id: &str) -> bool {
        channel_id.starts_with('D')
    }
}
