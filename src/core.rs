//! Core domain types and service traits for the notification fanout.
//!
//! This module defines the event envelope that travels through the exchange,
//! the closed set of known event kinds, the delivery channels, and the trait
//! contract every channel-specific sender implements.

use async_trait::async_trait;
use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// The unit of distribution published to the fanout exchange.
///
/// Field names on the wire are kept stable so that producers and consumers
/// deployed independently can still exchange events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Event {
    /// Globally unique identifier. Empty until the producer assigns one.
    #[serde(default, deserialize_with = "nullable_string")]
    pub id: String,
    /// Free-form category label, e.g. "BOAS_VINDAS" or "PROMOCAO".
    #[serde(rename = "tipo", default, deserialize_with = "nullable_string")]
    pub kind: String,
    #[serde(rename = "titulo", default, deserialize_with = "nullable_string")]
    pub title: String,
    #[serde(rename = "mensagem", default, deserialize_with = "nullable_string")]
    pub body: String,
    /// Destination identifier. Its format depends on the channel.
    #[serde(rename = "destinatario", default, deserialize_with = "nullable_string")]
    pub recipient: String,
    /// Construction time, serialized as `yyyy-MM-dd HH:mm:ss`. Missing or
    /// `null` means "now".
    #[serde(rename = "timestamp", with = "timestamp_format", default = "now")]
    pub created_at: NaiveDateTime,
}

fn now() -> NaiveDateTime {
    Local::now().naive_local()
}

/// Producers that model fields as nullable write explicit `null`s; those
/// decode to an empty string like a missing field does.
fn nullable_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

impl Default for Event {
    fn default() -> Self {
        Self {
            id: String::new(),
            kind: String::new(),
            title: String::new(),
            body: String::new(),
            recipient: String::new(),
            created_at: now(),
        }
    }
}

impl Event {
    /// Creates an event without an id. The producer assigns one on publish.
    pub fn new(
        kind: impl Into<String>,
        title: impl Into<String>,
        body: impl Into<String>,
        recipient: impl Into<String>,
    ) -> Self {
        Self {
            kind: kind.into(),
            title: title.into(),
            body: body.into(),
            recipient: recipient.into(),
            ..Default::default()
        }
    }

    /// Creates an event with a freshly generated id.
    pub fn with_generated_id(
        kind: impl Into<String>,
        title: impl Into<String>,
        body: impl Into<String>,
        recipient: impl Into<String>,
    ) -> Self {
        Self {
            id: generate_id(),
            ..Self::new(kind, title, body, recipient)
        }
    }

    /// Sets the id, replacing whatever was there.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Returns true when the event has no usable id yet.
    pub fn needs_id(&self) -> bool {
        self.id.trim().is_empty()
    }

    /// Assigns a fresh id if none is set. Returns true if an id was generated.
    pub fn ensure_id(&mut self) -> bool {
        if self.needs_id() {
            self.id = generate_id();
            true
        } else {
            false
        }
    }
}

/// Generates a new globally unique event id (hyphenated UUID v4).
pub fn generate_id() -> String {
    Uuid::new_v4().to_string()
}

mod timestamp_format {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%Y-%m-%d %H:%M:%S";

    pub fn serialize<S>(value: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveDateTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<String>::deserialize(deserializer)? {
            Some(raw) => {
                NaiveDateTime::parse_from_str(&raw, FORMAT).map_err(serde::de::Error::custom)
            }
            None => Ok(super::now()),
        }
    }
}

/// The closed set of known event kinds.
///
/// Kinds are display labels only. Routing through a fanout exchange never
/// looks at them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    Welcome,
    Promotion,
    Maintenance,
    Security,
    System,
    Purchase,
    Notification,
    Custom { code: String, description: String },
}

impl EventKind {
    /// The label carried in `Event::kind`.
    pub fn code(&self) -> &str {
        match self {
            EventKind::Welcome => "BOAS_VINDAS",
            EventKind::Promotion => "PROMOCAO",
            EventKind::Maintenance => "MANUTENCAO",
            EventKind::Security => "SEGURANCA",
            EventKind::System => "SISTEMA",
            EventKind::Purchase => "COMPRA",
            EventKind::Notification => "NOTIFICACAO",
            EventKind::Custom { code, .. } => code,
        }
    }

    pub fn description(&self) -> &str {
        match self {
            EventKind::Welcome => "Welcome event",
            EventKind::Promotion => "Promotional event",
            EventKind::Maintenance => "Maintenance event",
            EventKind::Security => "Security event",
            EventKind::System => "System event",
            EventKind::Purchase => "Purchase event",
            EventKind::Notification => "Generic notification",
            EventKind::Custom { description, .. } => description,
        }
    }

    /// Maps a label back to a known kind, falling back to `Custom`.
    pub fn from_code(code: &str) -> Self {
        match code {
            "BOAS_VINDAS" => EventKind::Welcome,
            "PROMOCAO" => EventKind::Promotion,
            "MANUTENCAO" => EventKind::Maintenance,
            "SEGURANCA" => EventKind::Security,
            "SISTEMA" => EventKind::System,
            "COMPRA" => EventKind::Purchase,
            "NOTIFICACAO" => EventKind::Notification,
            other => EventKind::Custom {
                code: other.to_string(),
                description: other.to_string(),
            },
        }
    }

    /// Builds an event of this kind with a fresh id.
    pub fn to_event(
        &self,
        title: impl Into<String>,
        body: impl Into<String>,
        recipient: impl Into<String>,
    ) -> Event {
        Event::with_generated_id(self.code(), title, body, recipient)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// A notification channel, one per bound queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Email,
    Sms,
    Push,
}

impl Channel {
    pub const ALL: [Channel; 3] = [Channel::Email, Channel::Sms, Channel::Push];

    /// Fixed human-readable label used in logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Channel::Email => "EMAIL",
            Channel::Sms => "SMS",
            Channel::Push => "PUSH",
        }
    }

    /// Queue name used when the configuration does not override it.
    pub fn default_queue(&self) -> &'static str {
        match self {
            Channel::Email => "fila.email",
            Channel::Sms => "fila.sms",
            Channel::Push => "fila.push",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Failure raised by a channel transport while delivering an event.
#[derive(Error, Debug, Clone)]
pub enum SendError {
    #[error("transport rejected the send: {0}")]
    Rejected(String),

    #[error("transport unavailable: {0}")]
    Unavailable(String),

    #[error("sender panicked: {0}")]
    Panicked(String),
}

// =============================================================================
// Service Traits
// =============================================================================

/// Delivers an event through one notification channel.
#[async_trait]
pub trait ChannelSender: Send + Sync {
    /// The channel this sender serves.
    fn channel(&self) -> Channel;

    /// Sends the event to its recipient.
    ///
    /// # Returns
    /// * `Ok(())` if the external transport accepted the notification
    /// * `Err(SendError)` otherwise; the consumer drops the message
    async fn send(&self, event: &Event) -> Result<(), SendError>;
}
