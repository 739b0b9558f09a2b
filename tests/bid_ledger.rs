//! Bid listing, placement guard, and accept/reject refetch.

mod support;

use carrymate::api::BidStatus;
use carrymate::error::{ClientError, ValidationError};
use serde_json::json;
use support::{client_for, mint_token, spawn_backend, FakeBackend, TestClient};

fn trip_42_bids() -> serde_json::Value {
    json!({
        "success": true,
        "data": [
            { "id": 1, "amount": 100, "status": "active" },
            { "id": 2, "amount": 150, "status": "active" }
        ]
    })
}

fn signed_in(backend: &FakeBackend) -> TestClient {
    let app = client_for(&backend.settings());
    app.tokens.save_pair(&mint_token(7, "amy", 3_600), "refresh-1");
    app
}

#[tokio::test]
async fn bid_below_highest_active_is_blocked_locally() {
    let backend = spawn_backend();
    backend.on("GET", "/bids/42", 200, trip_42_bids());
    backend.on("POST", "/bids", 200, json!({ "success": true, "data": { "id": 3, "amount": 160, "status": "active" } }));
    let app = signed_in(&backend);

    let bids = app.client.bids().list_for_trip(42).await.unwrap();
    assert_eq!(bids.iter().map(|b| b.id).collect::<Vec<_>>(), vec![1, 2]);
    assert_eq!(app.client.bids().minimum_bid(42), 150);

    let err = app.client.bids().place(42, 140).await.unwrap_err();
    assert!(matches!(
        err,
        ClientError::Validation(ValidationError::BelowMinimum {
            minimum: 150,
            amount: 140
        })
    ));
    assert!(backend.requests_to("POST", "/bids").is_empty());

    let placed = app.client.bids().place(42, 160).await.unwrap();
    assert_eq!(placed.map(|b| b.id), Some(3));

    let posts = backend.requests_to("POST", "/bids");
    assert_eq!(posts.len(), 1);
    assert_eq!(
        posts[0].body,
        json!({ "trip_id": 42, "amount": 160, "sender_id": 7 })
    );
    // Placement is followed by a refetch of the trip's bids.
    assert_eq!(backend.requests_to("GET", "/bids/42").len(), 2);
}

#[tokio::test]
async fn floor_applies_to_unlisted_trip() {
    let backend = spawn_backend();
    let app = signed_in(&backend);

    let err = app.client.bids().place(9, 90).await.unwrap_err();

    assert!(err.is_validation());
    assert!(backend.requests().is_empty());
}

#[tokio::test]
async fn server_refusal_message_is_passed_through() {
    let backend = spawn_backend();
    backend.on(
        "POST",
        "/bids",
        400,
        json!({ "success": false, "message": "Insufficient connects" }),
    );
    let app = signed_in(&backend);

    let err = app.client.bids().place(42, 200).await.unwrap_err();

    assert_eq!(err.user_message(), "Insufficient connects");
}

#[tokio::test]
async fn place_falls_back_to_generic_message() {
    let backend = spawn_backend();
    backend.on("POST", "/bids", 500, json!({}));
    let app = signed_in(&backend);

    let err = app.client.bids().place(42, 200).await.unwrap_err();

    assert_eq!(err.user_message(), "Failed to place bid");
}

#[tokio::test]
async fn accept_refetches_trip_bids() {
    let backend = spawn_backend();
    backend.respond(
        "GET",
        "/bids/42",
        vec![
            (200, trip_42_bids()),
            (
                200,
                json!({
                    "success": true,
                    "data": [
                        { "id": 1, "amount": 100, "status": "refunded" },
                        { "id": 2, "amount": 150, "status": "accepted" }
                    ]
                }),
            ),
        ],
    );
    backend.on("POST", "/bids/2/accept", 200, json!({ "success": true, "message": "Bid accepted" }));
    let app = signed_in(&backend);

    app.client.bids().list_for_trip(42).await.unwrap();
    let bids = app.client.bids().accept(42, 2).await.unwrap();

    assert_eq!(bids[1].status, BidStatus::Accepted);
    assert_eq!(bids[0].status, BidStatus::Refunded);
    assert_eq!(backend.requests_to("POST", "/bids/2/accept").len(), 1);
    assert_eq!(backend.requests_to("GET", "/bids/42").len(), 2);
    // Nothing active any more, so the floor is back.
    assert_eq!(app.client.bids().minimum_bid(42), 100);
}

#[tokio::test]
async fn reject_failure_uses_action_fallback() {
    let backend = spawn_backend();
    backend.on("POST", "/bids/1/reject", 500, json!({ "success": false }));
    let app = signed_in(&backend);

    let err = app.client.bids().reject(42, 1).await.unwrap_err();

    assert_eq!(err.user_message(), "Failed to reject bid");
    assert!(backend.requests_to("GET", "/bids/42").is_empty());
}

#[tokio::test]
async fn list_mine_reads_data_field() {
    let backend = spawn_backend();
    backend.on(
        "GET",
        "/bids/user",
        200,
        json!({ "data": [
            { "id": 5, "trip_id": 42, "sender_id": 7, "amount": 120, "status": "rejected" }
        ] }),
    );
    let app = signed_in(&backend);

    let mine = app.client.bids().list_mine().await.unwrap();

    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0].status, BidStatus::Rejected);
    assert_eq!(mine[0].trip_id, Some(42));
}
