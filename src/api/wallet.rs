use crate::api::gateway::{ApiGateway, ApiRequest};
use crate::api::response::{read_json, reject};
use crate::error::{ClientError, ErrorContext};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;

/// Connects a traveller needs before posting a trip. The server re-checks.
pub const TRIP_MIN_CONNECTS: i64 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub struct WalletBalance {
    #[serde(default, alias = "balance")]
    pub connects: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Credit,
    Debit,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Transaction {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    pub amount: i64,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl Transaction {
    /// `+50 Connects` for credits, `-20 Connects` for debits.
    pub fn display_amount(&self) -> String {
        let amount = self.amount.abs();
        match self.kind {
            TransactionKind::Credit => format!("+{} Connects", amount),
            TransactionKind::Debit => format!("-{} Connects", amount),
            TransactionKind::Other => format!("{} Connects", self.amount),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletSummary {
    pub balance: i64,
    pub transactions: Vec<Transaction>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Movement {
    Use,
    Earn,
}

impl fmt::Display for Movement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Movement::Use => write!(f, "use"),
            Movement::Earn => write!(f, "earn"),
        }
    }
}

#[derive(Deserialize)]
struct BidBalanceResponse {
    #[serde(default)]
    balance: i64,
}

pub struct WalletApi {
    gateway: ApiGateway,
}

impl WalletApi {
    pub fn new(gateway: ApiGateway) -> Self {
        Self { gateway }
    }

    /// `GET /wallet`
    pub async fn balance(&self) -> Result<i64, ClientError> {
        let response = self.gateway.send(ApiRequest::get("/wallet")).await?;
        let balance: WalletBalance = read_json(response, "Failed to fetch balance").await?;
        Ok(balance.connects)
    }

    /// `GET /wallet/transactions`
    pub async fn transactions(&self) -> Result<Vec<Transaction>, ClientError> {
        let response = self
            .gateway
            .send(ApiRequest::get("/wallet/transactions"))
            .await?;
        read_json(response, "Failed to fetch transactions").await
    }

    /// Balance and history fetched concurrently. Either failure fails both.
    pub async fn summary(&self) -> Result<WalletSummary, ClientError> {
        let (balance, transactions) = futures::try_join!(self.balance(), self.transactions())
            .map_err(|e| {
                ErrorContext::new("wallet_summary").log_error(&e);
                e
            })?;
        Ok(WalletSummary {
            balance,
            transactions,
        })
    }

    /// `POST /wallet/add`
    pub async fn add_connects(&self, amount: u64) -> Result<(), ClientError> {
        let response = self
            .gateway
            .send(ApiRequest::post("/wallet/add").json(json!({ "amount": amount })))
            .await?;
        Self::ack(response, "Failed to add connects").await?;
        tracing::info!(amount, "Connects added");
        Ok(())
    }

    /// `POST /wallet/use`
    pub async fn use_connects(&self, amount: u64, description: &str) -> Result<(), ClientError> {
        self.move_connects(Movement::Use, amount, description).await
    }

    /// `POST /wallet/earn`
    pub async fn earn_connects(&self, amount: u64, description: &str) -> Result<(), ClientError> {
        self.move_connects(Movement::Earn, amount, description).await
    }

    /// `GET /bids/user/balance`: Connects available for bidding.
    pub async fn bid_balance(&self) -> Result<i64, ClientError> {
        let response = self
            .gateway
            .send(ApiRequest::get("/bids/user/balance"))
            .await?;
        let body: BidBalanceResponse = read_json(response, "Failed to fetch balance").await?;
        Ok(body.balance)
    }

    /// Whether the user holds at least [`TRIP_MIN_CONNECTS`].
    ///
    /// A failed balance lookup answers `true`; the server makes the final call
    /// when the trip is posted.
    pub async fn can_post_trip(&self) -> bool {
        match self.balance().await {
            Ok(balance) => balance >= TRIP_MIN_CONNECTS,
            Err(e) => {
                tracing::warn!(error = %e, "Balance check failed, deferring to server");
                true
            }
        }
    }

    async fn move_connects(
        &self,
        movement: Movement,
        amount: u64,
        description: &str,
    ) -> Result<(), ClientError> {
        let request = ApiRequest::post(format!("/wallet/{}", movement))
            .json(json!({ "amount": amount, "description": description }));
        let response = self.gateway.send(request).await?;
        Self::ack(response, &format!("Failed to {} connects", movement)).await
    }

    async fn ack(response: reqwest::Response, fallback: &str) -> Result<(), ClientError> {
        if !response.status().is_success() {
            return Err(reject(response, fallback).await);
        }
        Ok(())
    }
}
