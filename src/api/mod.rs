//! Backend endpoint wrappers
//!
//! `auth` talks to `/auth/*` directly. Everything else goes through
//! [`ApiGateway`], which owns bearer headers and the 401 refresh-and-retry.

pub mod auth;
pub mod bids;
pub mod chat;
pub mod gateway;
pub mod kyc;
pub mod notifications;
pub mod response;
pub mod wallet;

pub type UserId = i64;
pub type TripId = i64;
pub type BidId = i64;

pub use auth::{AuthApi, AuthGrant, User};
pub use bids::{Bid, BidLedger, BidStatus};
pub use chat::{ChatApi, ChatMessage, OutgoingMessage};
pub use gateway::{ApiGateway, ApiRequest};
pub use kyc::{KycApi, KycStatus};
pub use notifications::{Notification, NotificationFeed};
pub use wallet::{Transaction, WalletApi, WalletSummary};
