//! Bid lifecycle facade
//!
//! The server is the authority on bids. The ledger only remembers the last
//! list it saw per trip so a too-low amount can be refused locally.

use crate::api::gateway::{ApiGateway, ApiRequest};
use crate::api::response::{read_ack, read_envelope};
use crate::api::{BidId, TripId, UserId};
use crate::auth::claims;
use crate::error::{ClientError, ErrorContext, ValidationError};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;

/// Minimum amount when a trip has no active bids.
pub const BID_FLOOR: u64 = 100;
/// Increment used by the amount stepper.
pub const BID_STEP: u64 = 10;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BidStatus {
    Active,
    Accepted,
    Rejected,
    Refunded,
    #[default]
    #[serde(other)]
    Unknown,
}


impl BidStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BidStatus::Accepted | BidStatus::Rejected | BidStatus::Refunded
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bid {
    pub id: BidId,
    #[serde(default)]
    pub trip_id: Option<TripId>,
    #[serde(default)]
    pub sender_id: Option<UserId>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(deserialize_with = "deserialize_amount")]
    pub amount: u64,
    #[serde(default)]
    pub status: BidStatus,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

impl Bid {
    pub fn is_active(&self) -> bool {
        self.status == BidStatus::Active
    }
}

// Amounts arrive as integers, floats or numeric strings depending on the backend column type.
fn deserialize_amount<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    let amount = match &value {
        Value::Number(n) => n.as_u64().or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| *f >= 0.0).map(|f| f as u64),
        _ => None,
    };
    amount.ok_or_else(|| serde::de::Error::custom(format!("invalid bid amount: {}", value)))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BidAction {
    Accept,
    Reject,
}

impl fmt::Display for BidAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BidAction::Accept => write!(f, "accept"),
            BidAction::Reject => write!(f, "reject"),
        }
    }
}

// ============================================================================
// PURE HELPERS
// ============================================================================

/// Highest active amount, or [`BID_FLOOR`] when nothing is active.
pub fn highest_active_or_floor(bids: &[Bid]) -> u64 {
    bids.iter()
        .filter(|b| b.is_active())
        .map(|b| b.amount)
        .max()
        .unwrap_or(BID_FLOOR)
}

/// The accepted bid if there is one, otherwise the highest active bid.
pub fn featured_bid(bids: &[Bid]) -> Option<&Bid> {
    bids.iter()
        .find(|b| b.status == BidStatus::Accepted)
        .or_else(|| {
            bids.iter()
                .filter(|b| b.is_active())
                .max_by_key(|b| b.amount)
        })
}

pub fn my_active_bid(bids: &[Bid], user_id: UserId) -> Option<&Bid> {
    bids.iter()
        .find(|b| b.sender_id == Some(user_id) && b.is_active())
}

/// Starting value for the amount input: the user's own active bid, or the
/// current minimum.
pub fn suggested_amount(bids: &[Bid], user_id: Option<UserId>) -> u64 {
    user_id
        .and_then(|id| my_active_bid(bids, id))
        .map(|b| b.amount)
        .unwrap_or_else(|| highest_active_or_floor(bids))
}

/// Move `current` by `steps` increments of [`BID_STEP`], never below `minimum`.
pub fn adjust_amount(current: u64, steps: i64, minimum: u64) -> u64 {
    let delta = steps.unsigned_abs().saturating_mul(BID_STEP);
    let moved = if steps >= 0 {
        current.saturating_add(delta)
    } else {
        current.saturating_sub(delta)
    };
    moved.max(minimum)
}

// ============================================================================
// LEDGER
// ============================================================================

pub struct BidLedger {
    gateway: ApiGateway,
    known: Mutex<HashMap<TripId, Vec<Bid>>>,
}

impl BidLedger {
    pub fn new(gateway: ApiGateway) -> Self {
        Self {
            gateway,
            known: Mutex::new(HashMap::new()),
        }
    }

    /// `GET /bids/{trip}` in server order.
    pub async fn list_for_trip(&self, trip_id: TripId) -> Result<Vec<Bid>, ClientError> {
        let response = self
            .gateway
            .send(ApiRequest::get(format!("/bids/{}", trip_id)))
            .await?;
        let bids = read_envelope::<Vec<Bid>>(response, "Failed to fetch bids")
            .await?
            .data
            .unwrap_or_default();

        self.known
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(trip_id, bids.clone());
        Ok(bids)
    }

    /// `GET /bids/user`: the current user's bids across all trips.
    pub async fn list_mine(&self) -> Result<Vec<Bid>, ClientError> {
        let response = self.gateway.send(ApiRequest::get("/bids/user")).await?;
        Ok(read_envelope::<Vec<Bid>>(response, "Failed to fetch your bids")
            .await?
            .data
            .unwrap_or_default())
    }

    /// Bids from the last successful [`list_for_trip`](Self::list_for_trip).
    pub fn cached(&self, trip_id: TripId) -> Option<Vec<Bid>> {
        self.known
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&trip_id)
            .cloned()
    }

    pub fn minimum_bid(&self, trip_id: TripId) -> u64 {
        self.cached(trip_id)
            .map(|bids| highest_active_or_floor(&bids))
            .unwrap_or(BID_FLOOR)
    }

    /// Place or update the current user's bid on a trip.
    ///
    /// Amounts under [`minimum_bid`](Self::minimum_bid) are refused without a
    /// request. On success the trip's list is fetched again.
    pub async fn place(&self, trip_id: TripId, amount: u64) -> Result<Option<Bid>, ClientError> {
        let minimum = self.minimum_bid(trip_id);
        if amount < minimum {
            return Err(ValidationError::BelowMinimum { minimum, amount }.into());
        }

        let sender_id = self
            .gateway
            .tokens()
            .access_token()
            .and_then(|token| claims::decode(&token))
            .and_then(|c| c.user_id);

        let mut body = json!({ "trip_id": trip_id, "amount": amount });
        if let Some(id) = sender_id {
            body["sender_id"] = json!(id);
        }

        let result = async {
            let response = self
                .gateway
                .send(ApiRequest::post("/bids").json(body))
                .await?;
            read_envelope::<Value>(response, "Failed to place bid").await
        }
        .await;

        let envelope = match result {
            Ok(envelope) => envelope,
            Err(e) => {
                let mut ctx = ErrorContext::new("place_bid");
                if let Some(id) = sender_id {
                    ctx = ctx.with_user_id(id);
                }
                ctx.log_error(&e);
                return Err(e);
            }
        };

        tracing::info!(trip_id, amount, "Bid placed");
        let placed = envelope
            .data
            .and_then(|data| serde_json::from_value::<Bid>(data).ok());

        if let Err(e) = self.list_for_trip(trip_id).await {
            tracing::warn!(trip_id, error = %e, "Failed to refresh bids after placing");
        }

        Ok(placed)
    }

    pub async fn accept(&self, trip_id: TripId, bid_id: BidId) -> Result<Vec<Bid>, ClientError> {
        self.decide(trip_id, bid_id, BidAction::Accept).await
    }

    pub async fn reject(&self, trip_id: TripId, bid_id: BidId) -> Result<Vec<Bid>, ClientError> {
        self.decide(trip_id, bid_id, BidAction::Reject).await
    }

    async fn decide(
        &self,
        trip_id: TripId,
        bid_id: BidId,
        action: BidAction,
    ) -> Result<Vec<Bid>, ClientError> {
        let known_status = self
            .cached(trip_id)
            .and_then(|bids| bids.into_iter().find(|b| b.id == bid_id))
            .map(|b| b.status);
        if let Some(status) = known_status.filter(|s| *s != BidStatus::Active) {
            tracing::warn!(bid_id, ?status, %action, "Deciding on a bid that is no longer active");
        }

        let fallback = format!("Failed to {} bid", action);
        let response = self
            .gateway
            .send(ApiRequest::post(format!("/bids/{}/{}", bid_id, action)))
            .await?;
        if let Err(e) = read_ack(response, &fallback).await {
            ErrorContext::new(format!("{}_bid", action)).log_error(&e);
            return Err(e);
        }

        tracing::info!(trip_id, bid_id, %action, "Bid decision recorded");
        self.list_for_trip(trip_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bid(id: BidId, sender_id: UserId, amount: u64, status: BidStatus) -> Bid {
        Bid {
            id,
            trip_id: Some(42),
            sender_id: Some(sender_id),
            username: None,
            amount,
            status,
            created_at: None,
            updated_at: None,
        }
    }

    #[test]
    fn test_highest_active_ignores_other_statuses() {
        let bids = vec![
            bid(1, 10, 100, BidStatus::Active),
            bid(2, 11, 150, BidStatus::Active),
            bid(3, 12, 500, BidStatus::Rejected),
        ];
        assert_eq!(highest_active_or_floor(&bids), 150);
    }

    #[test]
    fn test_floor_when_nothing_active() {
        assert_eq!(highest_active_or_floor(&[]), BID_FLOOR);
        let bids = vec![bid(1, 10, 300, BidStatus::Refunded)];
        assert_eq!(highest_active_or_floor(&bids), BID_FLOOR);
    }

    #[test]
    fn test_featured_prefers_accepted() {
        let bids = vec![
            bid(1, 10, 200, BidStatus::Active),
            bid(2, 11, 120, BidStatus::Accepted),
        ];
        assert_eq!(featured_bid(&bids).map(|b| b.id), Some(2));

        let bids = vec![
            bid(1, 10, 200, BidStatus::Active),
            bid(2, 11, 250, BidStatus::Active),
        ];
        assert_eq!(featured_bid(&bids).map(|b| b.id), Some(2));
        assert!(featured_bid(&[]).is_none());
    }

    #[test]
    fn test_my_active_bid_and_suggestion() {
        let bids = vec![
            bid(1, 7, 110, BidStatus::Rejected),
            bid(2, 7, 130, BidStatus::Active),
            bid(3, 8, 160, BidStatus::Active),
        ];
        assert_eq!(my_active_bid(&bids, 7).map(|b| b.id), Some(2));
        assert_eq!(suggested_amount(&bids, Some(7)), 130);
        assert_eq!(suggested_amount(&bids, Some(9)), 160);
        assert_eq!(suggested_amount(&bids, None), 160);
    }

    #[test]
    fn test_adjust_amount_clamps_to_minimum() {
        assert_eq!(adjust_amount(150, 1, 150), 160);
        assert_eq!(adjust_amount(160, -1, 150), 150);
        assert_eq!(adjust_amount(150, -1, 150), 150);
        assert_eq!(adjust_amount(5, -3, 0), 0);
    }

    #[test]
    fn test_bid_decodes_loose_wire_shapes() {
        let bids: Vec<Bid> = serde_json::from_value(json!([
            { "id": 1, "amount": 100, "status": "active" },
            { "id": 2, "trip_id": 42, "sender_id": 7, "amount": "150.00", "status": "accepted" },
            { "id": 3, "amount": 90.0, "status": "withdrawn" }
        ]))
        .unwrap();

        assert_eq!(bids[0].trip_id, None);
        assert_eq!(bids[1].amount, 150);
        assert_eq!(bids[1].status, BidStatus::Accepted);
        assert_eq!(bids[2].amount, 90);
        assert_eq!(bids[2].status, BidStatus::Unknown);
    }

    #[test]
    fn test_row_without_status_does_not_spoil_the_list() {
        let bids: Vec<Bid> = serde_json::from_value(json!([
            { "id": 1, "amount": 120, "status": "active" },
            { "id": 2, "amount": 200 }
        ]))
        .unwrap();

        assert_eq!(bids.len(), 2);
        assert_eq!(bids[1].status, BidStatus::Unknown);
        // Only active rows count toward the minimum.
        assert_eq!(highest_active_or_floor(&bids), 120);
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!BidStatus::Active.is_terminal());
        assert!(BidStatus::Accepted.is_terminal());
        assert!(BidStatus::Rejected.is_terminal());
        assert!(BidStatus::Refunded.is_terminal());
    }

    #[test]
    fn test_action_paths() {
        assert_eq!(BidAction::Accept.to_string(), "accept");
        assert_eq!(BidAction::Reject.to_string(), "reject");
    }
}
