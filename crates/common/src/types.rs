//! Message, response and delivery-stamp types shared by the gateway, the
//! dispatcher and the plugins.

use {
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
};

use crate::{Error, Result};

// ── Identity ────────────────────────────────────────────────────────────────

/// Who the bot is on the chat platform, learned when the gateway connects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BotIdentity {
    pub id: String,
    pub name: String,
}

impl BotIdentity {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }

    /// The token a user types to address the bot, e.g. `<@U024BE7LH>`.
    pub fn mention_token(&self) -> String {
        format!("<@{}>", self.id)
    }
}

// ── Inbound ─────────────────────────────────────────────────────────────────

/// Replacement content carried by an edit notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageEdit {
    pub user_id: String,
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MessageSubtype {
    #[default]
    Normal,
    Edited(MessageEdit),
}

/// A message event received from the chat gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub channel_id: String,
    pub user_id: String,
    pub text: String,
    #[serde(default)]
    pub subtype: MessageSubtype,
    /// Platform delivery token of the message itself.
    pub timestamp: String,
}

impl InboundMessage {
    pub fn new(
        channel_id: impl Into<String>,
        user_id: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            channel_id: channel_id.into(),
            user_id: user_id.into(),
            text: text.into(),
            subtype: MessageSubtype::Normal,
            timestamp: String::new(),
        }
    }

    pub fn is_edit(&self) -> bool {
        matches!(self.subtype, MessageSubtype::Edited(_))
    }

    /// Fold an edit notification into a plain message carrying the edited
    /// text and author. Normal messages are returned unchanged.
    #[must_use]
    pub fn into_effective(self) -> Self {
        match self.subtype {
            MessageSubtype::Normal => self,
            MessageSubtype::Edited(edit) => Self {
                user_id: edit.user_id,
                text: edit.text,
                subtype: MessageSubtype::Normal,
                ..self
            },
        }
    }
}

// ── Delivery stamps ─────────────────────────────────────────────────────────

/// Delivery token of a sent message together with the instant it denotes.
///
/// `token` is what the gateway needs to edit the message later; `sent_at` is
/// what the tracker ages entries by.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageStamp {
    pub token: String,
    pub sent_at: DateTime<Utc>,
}

impl MessageStamp {
    pub fn new(token: impl Into<String>, sent_at: DateTime<Utc>) -> Self {
        Self {
            token: token.into(),
            sent_at,
        }
    }

    /// Parse an epoch-seconds token with an optional fractional part, such as
    /// `1700000000.123456`.
    pub fn from_epoch_token(token: &str) -> Result<Self> {
        let (secs, frac) = token.split_once('.').unwrap_or((token, ""));
        let secs: i64 = secs.parse().map_err(|_| Error::invalid_stamp(token))?;
        if !frac.chars().all(|c| c.is_ascii_digit()) {
            return Err(Error::invalid_stamp(token));
        }
        let mut digits: String = frac.chars().take(9).collect();
        while digits.len() < 9 {
            digits.push('0');
        }
        let nanos: u32 = digits.parse().map_err(|_| Error::invalid_stamp(token))?;
        let sent_at = DateTime::<Utc>::from_timestamp(secs, nanos)
            .ok_or_else(|| Error::invalid_stamp(token))?;
        Ok(Self::new(token, sent_at))
    }
}

// ── Outbound ────────────────────────────────────────────────────────────────

/// Where a response should be delivered.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Destination {
    /// A concrete channel id, used as-is.
    Channel(String),
    /// A channel referenced by name (`#general`).
    ChannelName(String),
    /// A user id; delivered to the direct-message channel with that user.
    User(String),
}

impl Destination {
    /// Classify a raw reference. Returns `None` for an empty reference.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        if let Some(name) = raw.strip_prefix('#') {
            return (!name.is_empty()).then(|| Self::ChannelName(name.to_string()));
        }
        if raw.starts_with('U') || raw.starts_with('W') {
            return Some(Self::User(raw.to_string()));
        }
        Some(Self::Channel(raw.to_string()))
    }

    /// Whether this reference needs the gateway to turn it into a channel id.
    pub fn needs_resolution(&self) -> bool {
        !matches!(self, Self::Channel(_))
    }
}

impl std::fmt::Display for Destination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Channel(id) | Self::User(id) => f.write_str(id),
            Self::ChannelName(name) => write!(f, "#{name}"),
        }
    }
}

/// Payload of an outbound message. Opaque to routing and delivery.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Content {
    pub text: String,
    /// Platform-specific rich content (attachments, blocks), passed through.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<serde_json::Value>,
}

impl Content {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            extra: None,
        }
    }
}

/// A response queued for delivery.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutboundResponse {
    pub destination: Option<Destination>,
    /// Correlation key letting a later response edit this one in place.
    pub tracker_id: Option<String>,
    /// Overrides the default tracking TTL, in minutes.
    pub ttl_minutes: Option<u32>,
    pub content: Option<Content>,
}

impl OutboundResponse {
    /// Text reply addressed to a raw destination reference.
    pub fn text(to: &str, text: impl Into<String>) -> Self {
        Self {
            destination: Destination::parse(to),
            content: Some(Content::text(text)),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn tracked(mut self, tracker_id: impl Into<String>) -> Self {
        self.tracker_id = Some(tracker_id.into());
        self
    }

    #[must_use]
    pub fn with_ttl(mut self, minutes: u32) -> Self {
        self.ttl_minutes = Some(minutes);
        self
    }
}
