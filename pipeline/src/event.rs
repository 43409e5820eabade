use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The five interaction kinds the funnel understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "event_kind", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    InviteSent,
    Connected,
    MessageSent,
    ReplyReceived,
    MeetingBooked,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            EventKind::InviteSent => write!(f, "invite_sent"),
            EventKind::Connected => write!(f, "connected"),
            EventKind::MessageSent => write!(f, "message_sent"),
            EventKind::ReplyReceived => write!(f, "reply_received"),
            EventKind::MeetingBooked => write!(f, "meeting_booked"),
        }
    }
}

/// Allow casting EventKind from strings.
impl FromStr for EventKind {
    type Err = ParseEventKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "invite_sent" => Ok(EventKind::InviteSent),
            "connected" => Ok(EventKind::Connected),
            "message_sent" => Ok(EventKind::MessageSent),
            "reply_received" => Ok(EventKind::ReplyReceived),
            "meeting_booked" => Ok(EventKind::MeetingBooked),
            invalid => Err(ParseEventKindError(invalid.to_owned())),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("{0} is not a valid EventKind")]
pub struct ParseEventKindError(String);

/// One interaction with a lead, as submitted by the transport layer.
#[derive(Debug, Clone, Deserialize)]
pub struct EventInput {
    pub lead_id: Uuid,
    pub kind: EventKind,
    pub actor: String,
    /// Defaults to the engine clock's "now" when absent. Follow-up due
    /// times are always computed from "now", never from this value.
    pub occurred_at: Option<DateTime<Utc>>,
}

/// An interaction ready for appending, with `occurred_at` resolved.
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub lead_id: Uuid,
    pub actor: String,
    pub kind: EventKind,
    pub occurred_at: DateTime<Utc>,
}

/// A recorded interaction. Append-only: never edited or deleted.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct InteractionEvent {
    pub id: Uuid,
    pub lead_id: Uuid,
    pub actor: String,
    pub kind: EventKind,
    pub occurred_at: DateTime<Utc>,
}
