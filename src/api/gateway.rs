//! Authenticated request wrapper
//!
//! Every non-auth endpoint goes through [`ApiGateway::send`], which attaches
//! the stored access token and recovers from a single 401 by refreshing the
//! token pair and re-issuing the request once.

use crate::api::auth::AuthApi;
use crate::error::{AuthError, ClientError};
use crate::storage::TokenStore;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use serde_json::Value;

/// A request relative to the configured base URL.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
    pub headers: HeaderMap,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            headers: HeaderMap::new(),
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Caller headers override the default content type but never the bearer token.
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }
}

#[derive(Clone)]
pub struct ApiGateway {
    http_client: reqwest::Client,
    base_url: String,
    tokens: TokenStore,
    auth: AuthApi,
}

impl ApiGateway {
    pub fn new(base_url: String, http_client: reqwest::Client, tokens: TokenStore) -> Self {
        let base_url = base_url.trim_end_matches('/').to_string();
        let auth = AuthApi::new(base_url.clone(), http_client.clone());
        Self {
            http_client,
            base_url,
            tokens,
            auth,
        }
    }

    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    /// Send `request`, refreshing and retrying once if the server answers 401.
    ///
    /// The retried response is returned as-is, so a second 401 reaches the
    /// caller. If the refresh endpoint refuses the stored refresh token the
    /// token pair is cleared and [`AuthError::AuthenticationFailed`] returned.
    pub async fn send(&self, request: ApiRequest) -> Result<reqwest::Response, ClientError> {
        let token = self.tokens.access_token();
        let response = self.build(&request, token.as_deref()).send().await?;

        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        let refresh_token = match self.tokens.refresh_token() {
            Some(refresh_token) => refresh_token,
            None => return Ok(response),
        };

        tracing::debug!(
            method = %request.method,
            path = %request.path,
            "Access token rejected, refreshing before retry"
        );

        match self.auth.refresh(&refresh_token).await {
            Ok(grant) => {
                self.tokens.save_pair(&grant.token, &grant.refresh_token);
                let retried = self.build(&request, Some(&grant.token)).send().await?;
                Ok(retried)
            }
            Err(ClientError::Network(e)) => Err(ClientError::Network(e)),
            Err(e) => {
                tracing::warn!(error = %e, path = %request.path, "Token refresh after 401 failed");
                self.tokens.clear();
                Err(AuthError::AuthenticationFailed.into())
            }
        }
    }

    fn build(&self, request: &ApiRequest, token: Option<&str>) -> reqwest::RequestBuilder {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        for (name, value) in request.headers.iter() {
            headers.insert(name.clone(), value.clone());
        }

        if let Some(token) = token {
            match HeaderValue::from_str(&format!("Bearer {}", token)) {
                Ok(value) => {
                    headers.insert(AUTHORIZATION, value);
                }
                Err(_) => tracing::warn!("Stored access token is not a valid header value"),
            }
        }

        let builder = self
            .http_client
            .request(request.method.clone(), format!("{}{}", self.base_url, request.path))
            .headers(headers);

        match &request.body {
            Some(body) => builder.body(body.to_string()),
            None => builder,
        }
    }
}
