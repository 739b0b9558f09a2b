use crate::api::gateway::{ApiGateway, ApiRequest};
use crate::api::response::read_json;
use crate::error::{AuthError, ClientError, ErrorContext};
use crate::validators::validate_aadhaar;
use serde::Deserialize;
use serde_json::{json, Map, Value};

/// KYC state as reported by the server. Unrecognised fields are kept.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct KycStatus {
    #[serde(default, alias = "isVerified", alias = "is_verified")]
    pub verified: bool,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

pub struct KycApi {
    gateway: ApiGateway,
}

impl KycApi {
    pub fn new(gateway: ApiGateway) -> Self {
        Self { gateway }
    }

    /// `GET /kyc/status`
    pub async fn status(&self) -> Result<KycStatus, ClientError> {
        self.require_token()?;
        let response = self.gateway.send(ApiRequest::get("/kyc/status")).await?;
        read_json(response, "Failed to fetch KYC status").await
    }

    /// `POST /kyc/submit` after checking the number locally.
    pub async fn submit(&self, aadhaar_number: &str) -> Result<Value, ClientError> {
        self.require_token()?;
        let aadhaar_number = validate_aadhaar(aadhaar_number)?;

        let request =
            ApiRequest::post("/kyc/submit").json(json!({ "aadhaarNumber": aadhaar_number }));
        let response = self.gateway.send(request).await?;

        match read_json::<Value>(response, "Failed to submit KYC verification").await {
            Ok(body) => {
                tracing::info!("KYC verification submitted");
                Ok(body)
            }
            Err(e) => {
                ErrorContext::new("submit_kyc").log_error(&e);
                Err(e)
            }
        }
    }

    fn require_token(&self) -> Result<(), ClientError> {
        match self.gateway.tokens().access_token() {
            Some(_) => Ok(()),
            None => Err(AuthError::MissingToken.into()),
        }
    }
}
