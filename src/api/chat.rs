//! Trip chat contract
//!
//! History is fetched over HTTP. Live frames arrive as JSON text on a socket
//! owned by the host application; this module only shapes outgoing frames and
//! folds incoming ones into a conversation.

use crate::api::bids::Bid;
use crate::api::gateway::{ApiGateway, ApiRequest};
use crate::api::response::read_envelope;
use crate::api::{TripId, UserId};
use crate::auth::claims;
use crate::error::{AuthError, ClientError, ValidationError};
use crate::validators::validate_message_text;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Frames from the same sender with the same text this close together are one message.
pub const DUPLICATE_WINDOW_MS: i64 = 1000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub trip_id: TripId,
    pub sender_id: UserId,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

impl ChatMessage {
    fn created_at_millis(&self) -> Option<i64> {
        self.created_at
            .as_deref()
            .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
            .map(|t| t.timestamp_millis())
    }

    /// Whether `other` is the same message seen twice.
    pub fn is_duplicate_of(&self, other: &ChatMessage) -> bool {
        if self.id.is_some() && self.id == other.id {
            return true;
        }

        if self.sender_id != other.sender_id || self.message != other.message {
            return false;
        }

        match (self.created_at_millis(), other.created_at_millis()) {
            (Some(a), Some(b)) => (a - b).abs() < DUPLICATE_WINDOW_MS,
            _ => false,
        }
    }
}

/// A frame ready to be written to the chat socket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutgoingMessage {
    pub trip_id: TripId,
    pub sender_id: UserId,
    pub message: String,
    pub created_at: String,
}

impl OutgoingMessage {
    pub fn new(
        trip_id: TripId,
        sender_id: UserId,
        text: &str,
        now: DateTime<Utc>,
    ) -> Result<Self, ValidationError> {
        Ok(Self {
            trip_id,
            sender_id,
            message: validate_message_text(text)?,
            created_at: now.to_rfc3339_opts(SecondsFormat::Millis, true),
        })
    }

    pub fn to_frame(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Decode a socket frame. Anything that is not a chat message is `None`.
pub fn parse_incoming(frame: &str) -> Option<ChatMessage> {
    serde_json::from_str(frame).ok()
}

/// Append `incoming` to `conversation` unless it belongs to another trip or
/// repeats a message already present. Returns whether it was appended.
pub fn merge_incoming(
    conversation: &mut Vec<ChatMessage>,
    trip_id: TripId,
    incoming: ChatMessage,
) -> bool {
    if incoming.trip_id != trip_id {
        return false;
    }
    if conversation.iter().any(|m| m.is_duplicate_of(&incoming)) {
        return false;
    }
    conversation.push(incoming);
    true
}

pub struct ChatApi {
    gateway: ApiGateway,
}

impl ChatApi {
    pub fn new(gateway: ApiGateway) -> Self {
        Self { gateway }
    }

    /// `GET /chat/{trip}/accepted-bid`. `None` when the trip has no accepted bid.
    pub async fn accepted_bid(&self, trip_id: TripId) -> Result<Option<Bid>, ClientError> {
        let response = self
            .gateway
            .send(ApiRequest::get(format!("/chat/{}/accepted-bid", trip_id)))
            .await?;

        match read_envelope::<Bid>(response, "Failed to load accepted bid").await {
            Ok(envelope) => Ok(envelope.data),
            Err(ClientError::Server { status, message }) => {
                tracing::debug!(trip_id, status, %message, "No accepted bid for trip");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// `GET /chat/{trip}/messages`, oldest first as the server returns them.
    pub async fn messages(&self, trip_id: TripId) -> Result<Vec<ChatMessage>, ClientError> {
        let response = self
            .gateway
            .send(ApiRequest::get(format!("/chat/{}/messages", trip_id)))
            .await?;
        Ok(read_envelope::<Vec<ChatMessage>>(response, "Failed to load messages")
            .await?
            .data
            .unwrap_or_default())
    }

    /// Build an outgoing frame signed with the current user's id.
    pub fn compose(&self, trip_id: TripId, text: &str) -> Result<OutgoingMessage, ClientError> {
        let sender_id = self
            .gateway
            .tokens()
            .access_token()
            .and_then(|token| claims::decode(&token))
            .and_then(|c| c.user_id)
            .ok_or(AuthError::MissingToken)?;

        Ok(OutgoingMessage::new(trip_id, sender_id, text, Utc::now())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn message(id: Option<i64>, sender_id: UserId, text: &str, created_at: &str) -> ChatMessage {
        ChatMessage {
            id,
            trip_id: 42,
            sender_id,
            message: text.to_string(),
            created_at: Some(created_at.to_string()),
        }
    }

    #[test]
    fn test_outgoing_message_is_trimmed_and_stamped() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let msg = OutgoingMessage::new(42, 7, "  on my way  ", now).unwrap();

        assert_eq!(msg.message, "on my way");
        assert_eq!(msg.created_at, "2024-05-01T12:00:00.000Z");

        let frame: serde_json::Value = serde_json::from_str(&msg.to_frame().unwrap()).unwrap();
        assert_eq!(frame["trip_id"], 42);
        assert_eq!(frame["sender_id"], 7);
    }

    #[test]
    fn test_blank_outgoing_message_rejected() {
        let err = OutgoingMessage::new(42, 7, "   ", Utc::now()).unwrap_err();
        assert_eq!(err, ValidationError::EmptyField("message"));
    }

    #[test]
    fn test_merge_ignores_other_trips() {
        let mut conversation = Vec::new();
        let mut other = message(Some(1), 7, "hi", "2024-05-01T12:00:00.000Z");
        other.trip_id = 99;

        assert!(!merge_incoming(&mut conversation, 42, other));
        assert!(conversation.is_empty());
    }

    #[test]
    fn test_merge_drops_same_id() {
        let mut conversation = vec![message(Some(1), 7, "hi", "2024-05-01T12:00:00.000Z")];
        let again = message(Some(1), 7, "hi (edited)", "2024-05-01T12:05:00.000Z");

        assert!(!merge_incoming(&mut conversation, 42, again));
        assert_eq!(conversation.len(), 1);
    }

    #[test]
    fn test_merge_drops_echo_within_a_second() {
        let mut conversation = vec![message(None, 7, "hi", "2024-05-01T12:00:00.000Z")];

        let echo = message(Some(5), 7, "hi", "2024-05-01T12:00:00.400Z");
        assert!(!merge_incoming(&mut conversation, 42, echo));

        let later = message(Some(6), 7, "hi", "2024-05-01T12:00:02.000Z");
        assert!(merge_incoming(&mut conversation, 42, later));

        let other_sender = message(Some(7), 8, "hi", "2024-05-01T12:00:02.100Z");
        assert!(merge_incoming(&mut conversation, 42, other_sender));

        assert_eq!(conversation.len(), 3);
    }

    #[test]
    fn test_parse_incoming() {
        let frame = r#"{"id":3,"trip_id":42,"sender_id":7,"message":"hello","created_at":"2024-05-01T12:00:00Z"}"#;
        let msg = parse_incoming(frame).unwrap();
        assert_eq!(msg.id, Some(3));
        assert_eq!(msg.message, "hello");

        assert!(parse_incoming("not json").is_none());
        assert!(parse_incoming(r#"{"type":"ping"}"#).is_none());
    }
}
