//! Terminal chat gateway: stdin lines become direct messages to the bot and
//! outbound messages are printed.

use std::{
    io::Write,
    sync::{
        Mutex,
        atomic::{AtomicU64, Ordering},
    },
};

use {
    async_trait::async_trait,
    chrono::Utc,
    hal_common::types::{BotIdentity, Content, Destination, InboundMessage, MessageStamp},
    tokio::{
        io::{AsyncBufRead, AsyncBufReadExt, BufReader},
        sync::mpsc,
    },
    tracing::{debug, warn},
};

use crate::{
    Error, Result,
    gateway::{ChatGateway, EventReceiver, GatewayEvent},
};

pub const CONSOLE_USER_ID: &str = "U_CONSOLE";
pub const CONSOLE_CHANNEL_ID: &str = "D_CONSOLE";
pub const CONSOLE_BOT_ID: &str = "U_HAL";
pub const CONSOLE_BOT_NAME: &str = "hal";

type Input = Box<dyn AsyncBufRead + Send + Unpin>;
type Output = Box<dyn Write + Send>;

pub struct ConsoleGateway {
    input: Mutex<Option<Input>>,
    output: Mutex<Output>,
    sequence: AtomicU64,
}

impl ConsoleGateway {
    /// Gateway over the process's stdin and stdout.
    pub fn stdio() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()), std::io::stdout())
    }

    pub fn new(
        input: impl AsyncBufRead + Send + Unpin + 'static,
        output: impl Write + Send + 'static,
    ) -> Self {
        Self {
            input: Mutex::new(Some(Box::new(input))),
            output: Mutex::new(Box::new(output)),
            sequence: AtomicU64::new(0),
        }
    }

    pub fn identity() -> BotIdentity {
        BotIdentity::new(CONSOLE_BOT_ID, CONSOLE_BOT_NAME)
    }

    fn next_stamp(&self) -> MessageStamp {
        let now = Utc::now();
        let seq = self.sequence.fetch_add(1, Ordering::SeqCst);
        MessageStamp::new(format!("{}.{seq:06}", now.timestamp()), now)
    }

    fn print(&self, line: &str) -> Result<()> {
        let mut out = self.output.lock().unwrap_or_else(|e| e.into_inner());
        writeln!(out, "{line}")?;
        out.flush()?;
        Ok(())
    }
}

#[async_trait]
impl ChatGateway for ConsoleGateway {
    async fn connect(&self) -> Result<EventReceiver> {
        let input = self
            .input
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
            .ok_or_else(|| Error::unavailable("console already connected"))?;

        let (tx, rx) = mpsc::channel(64);
        tx.send(GatewayEvent::Connected(Self::identity()))
            .await
            .map_err(|_| Error::unavailable("event receiver dropped"))?;

        tokio::spawn(async move {
            let mut lines = input.lines();
            let reason = loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let text = line.trim();
                        if text.is_empty() {
                            continue;
                        }
                        let mut message =
                            InboundMessage::new(CONSOLE_CHANNEL_ID, CONSOLE_USER_ID, text);
                        message.timestamp = Utc::now().timestamp().to_string();
                        if tx.send(GatewayEvent::Message(message)).await.is_err() {
                            debug!("console event receiver dropped");
                            return;
                        }
                    },
                    Ok(None) => break "end of input".to_string(),
                    Err(e) => {
                        warn!(error = %e, "console read failed");
                        break e.to_string();
                    },
                }
            };
            let _ = tx.send(GatewayEvent::Disconnected { reason }).await;
        });

        Ok(rx)
    }

    async fn resolve(&self, destination: &Destination) -> Option<String> {
        match destination {
            Destination::Channel(id) => Some(id.clone()),
            Destination::User(_) => Some(CONSOLE_CHANNEL_ID.to_string()),
            Destination::ChannelName(name) => Some(format!("#{name}")),
        }
    }

    async fn send(&self, channel_id: &str, content: &Content) -> Result<MessageStamp> {
        let stamp = self.next_stamp();
        self.print(&format!("[{channel_id} {}] {}", stamp.token, content.text))?;
        Ok(stamp)
    }

    async fn edit(&self, channel_id: &str, stamp: &MessageStamp, content: &Content) -> Result<()> {
        self.print(&format!("[{channel_id}] [edit {}] {}", stamp.token, content.text))
    }

    async fn memberships(&self, _user_id: &str) -> Result<Vec<String>> {
        Ok(Vec::new())
    }
}
