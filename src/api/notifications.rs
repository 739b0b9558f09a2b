//! Notification feed derived from bid state
//!
//! There is no notification endpoint; notices are computed from the user's
//! own bids and from active bids on the trips they posted.

use crate::api::bids::{Bid, BidLedger, BidStatus};
use crate::api::gateway::{ApiGateway, ApiRequest};
use crate::api::response::read_json;
use crate::api::{BidId, TripId};
use crate::error::ClientError;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;
use std::cmp::Reverse;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    BidAccepted,
    BidRejected,
    BidRefunded,
    NewBids,
}

/// What tapping the notice should open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationAction {
    None,
    Chat { trip_id: TripId, bid_id: BidId },
    ViewBids { trip_id: TripId },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub id: String,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub timestamp: Option<String>,
    pub action: NotificationAction,
}

impl Notification {
    fn sort_key(&self) -> i64 {
        self.timestamp
            .as_deref()
            .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
            .map(|t| t.timestamp_millis())
            .unwrap_or(i64::MIN)
    }
}

/// A trip the user posted, as listed by `GET /travels/my`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TripSummary {
    pub id: TripId,
    #[serde(default)]
    pub departure_airport: String,
    #[serde(default)]
    pub arrival_airport: String,
}

fn trip_label(trip_id: Option<TripId>) -> String {
    trip_id.map(|id| id.to_string()).unwrap_or_default()
}

/// Notices for the user's own bids that reached a terminal status.
pub fn bid_notifications(bids: &[Bid]) -> Vec<Notification> {
    bids.iter()
        .filter_map(|bid| {
            let timestamp = bid.updated_at.clone().or_else(|| bid.created_at.clone());
            let (kind, prefix, title, message, action) = match bid.status {
                BidStatus::Accepted => (
                    NotificationKind::BidAccepted,
                    "bid-accepted",
                    "Your bid was accepted!",
                    format!(
                        "Your bid of {} Connects was accepted for trip {}",
                        bid.amount,
                        trip_label(bid.trip_id)
                    ),
                    bid.trip_id
                        .map(|trip_id| NotificationAction::Chat {
                            trip_id,
                            bid_id: bid.id,
                        })
                        .unwrap_or(NotificationAction::None),
                ),
                BidStatus::Rejected => (
                    NotificationKind::BidRejected,
                    "bid-rejected",
                    "Your bid was rejected",
                    format!(
                        "Your bid of {} Connects was rejected. Your connects have been refunded.",
                        bid.amount
                    ),
                    NotificationAction::None,
                ),
                BidStatus::Refunded => (
                    NotificationKind::BidRefunded,
                    "bid-refunded",
                    "Bid refunded",
                    format!(
                        "Your bid of {} Connects was refunded as another bid was accepted.",
                        bid.amount
                    ),
                    NotificationAction::None,
                ),
                BidStatus::Active | BidStatus::Unknown => return None,
            };

            Some(Notification {
                id: format!("{}-{}", prefix, bid.id),
                kind,
                title: title.to_string(),
                message,
                timestamp,
                action,
            })
        })
        .collect()
}

/// A "new bids" notice for a trip with at least one active bid.
pub fn trip_notification(
    trip: &TripSummary,
    bids: &[Bid],
    now: DateTime<Utc>,
) -> Option<Notification> {
    let active = bids.iter().filter(|b| b.is_active()).count();
    if active == 0 {
        return None;
    }

    Some(Notification {
        id: format!("new-bids-{}", trip.id),
        kind: NotificationKind::NewBids,
        title: "New bids on your trip!".to_string(),
        message: format!(
            "{} new bid(s) on your trip {} ➜ {}",
            active, trip.departure_airport, trip.arrival_airport
        ),
        timestamp: Some(now.to_rfc3339_opts(SecondsFormat::Millis, true)),
        action: NotificationAction::ViewBids { trip_id: trip.id },
    })
}

/// Newest first. Notices without a readable timestamp sink to the end.
pub fn sort_newest_first(notifications: &mut [Notification]) {
    notifications.sort_by_key(|n| Reverse(n.sort_key()));
}

pub struct NotificationFeed {
    gateway: ApiGateway,
    bids: Arc<BidLedger>,
}

impl NotificationFeed {
    pub fn new(gateway: ApiGateway, bids: Arc<BidLedger>) -> Self {
        Self { gateway, bids }
    }

    /// Build the full feed. A trip whose bids fail to load is skipped.
    pub async fn load(&self) -> Result<Vec<Notification>, ClientError> {
        let mine = self.bids.list_mine().await?;
        let mut notifications = bid_notifications(&mine);

        let response = self.gateway.send(ApiRequest::get("/travels/my")).await?;
        let trips: Vec<TripSummary> = read_json(response, "Failed to load notifications").await?;

        let now = Utc::now();
        for trip in &trips {
            match self.bids.list_for_trip(trip.id).await {
                Ok(bids) => notifications.extend(trip_notification(trip, &bids, now)),
                Err(e) => tracing::warn!(trip_id = trip.id, error = %e, "Skipping trip bids"),
            }
        }

        sort_newest_first(&mut notifications);
        Ok(notifications)
    }
}
