use crate::api::response::read_json;
use crate::error::{AuthError, ClientError};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub username: String,
}

/// Token pair issued by login and refresh.
#[derive(Clone, Deserialize)]
pub struct AuthGrant {
    pub token: String,
    #[serde(rename = "refreshToken")]
    pub refresh_token: String,
    #[serde(default)]
    pub user: Option<User>,
}

impl std::fmt::Debug for AuthGrant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthGrant")
            .field("token", &"[redacted]")
            .field("refresh_token", &"[redacted]")
            .field("user", &self.user)
            .finish()
    }
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    otp: &'a str,
}

#[derive(Serialize)]
struct RefreshRequest<'a> {
    #[serde(rename = "refreshToken")]
    refresh_token: &'a str,
}

#[derive(Deserialize)]
struct ValidateResponse {
    #[serde(default)]
    user: Option<User>,
}

/// Wire calls to the `/auth/*` endpoints. Holds no session state.
#[derive(Clone)]
pub struct AuthApi {
    http_client: reqwest::Client,
    base_url: String,
}

impl AuthApi {
    pub fn new(base_url: String, http_client: reqwest::Client) -> Self {
        Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// `POST /auth/validate` with the access token as bearer.
    pub async fn validate(&self, token: &str) -> Result<Option<User>, ClientError> {
        let response = self
            .http_client
            .post(self.url("/auth/validate"))
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .bearer_auth(token)
            .send()
            .await?;

        let body: ValidateResponse = read_json(response, "Session validation failed").await?;
        Ok(body.user)
    }

    pub async fn login(&self, username: &str, otp: &str) -> Result<AuthGrant, ClientError> {
        let response = self
            .http_client
            .post(self.url("/auth/login"))
            .json(&LoginRequest { username, otp })
            .send()
            .await?;

        read_json(response, "Login failed").await
    }

    /// `POST /auth/refresh`. Any non-2xx answer is reported as
    /// [`AuthError::RefreshRejected`].
    pub async fn refresh(&self, refresh_token: &str) -> Result<AuthGrant, ClientError> {
        let response = self
            .http_client
            .post(self.url("/auth/refresh"))
            .json(&RefreshRequest { refresh_token })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AuthError::RefreshRejected {
                status: status.as_u16(),
            }
            .into());
        }

        Ok(response.json::<AuthGrant>().await?)
    }

    /// `POST /auth/logout`. The response body is ignored.
    pub async fn logout(&self, token: &str) -> Result<(), ClientError> {
        self.http_client
            .post(self.url("/auth/logout"))
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .bearer_auth(token)
            .send()
            .await?;
        Ok(())
    }

    /// Sends the logout notification in the background. Every outcome,
    /// including the absence of a runtime, is ignored.
    pub fn notify_logout(&self, token: String) {
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                tracing::debug!("No async runtime, skipping logout notification");
                return;
            }
        };

        let api = self.clone();
        handle.spawn(async move {
            if let Err(e) = api.logout(&token).await {
                tracing::debug!(error = %e, "Logout notification failed");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_grant_deserializes_wire_names() {
        let grant: AuthGrant = serde_json::from_value(json!({
            "token": "a.b.c",
            "refreshToken": "r",
            "user": { "id": 7, "username": "amy" }
        }))
        .unwrap();

        assert_eq!(grant.refresh_token, "r");
        assert_eq!(grant.user.unwrap().username, "amy");
    }

    #[test]
    fn test_grant_debug_redacts_tokens() {
        let grant = AuthGrant {
            token: "secret-access".to_string(),
            refresh_token: "secret-refresh".to_string(),
            user: None,
        };
        let debug = format!("{:?}", grant);
        assert!(!debug.contains("secret"));
    }

    #[test]
    fn test_base_url_trailing_slash_is_trimmed() {
        let api = AuthApi::new("http://localhost:5000/".to_string(), reqwest::Client::new());
        assert_eq!(api.url("/auth/login"), "http://localhost:5000/auth/login");
    }

    #[test]
    fn test_notify_logout_without_runtime_is_ignored() {
        let api = AuthApi::new("http://127.0.0.1:1".to_string(), reqwest::Client::new());
        api.notify_logout("token".to_string());
    }
}
