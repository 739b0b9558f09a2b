//! Response decoding shared by every endpoint wrapper.

use crate::error::ClientError;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

/// The `{success, data, message, error}` wrapper most endpoints answer with.
#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    pub success: Option<bool>,
    pub data: Option<T>,
    pub message: Option<String>,
    pub error: Option<String>,
}

/// Picks the server-supplied failure text: `error`, then `message`, then `fallback`.
pub fn server_message(body: &Value, fallback: &str) -> String {
    ["error", "message"]
        .iter()
        .find_map(|key| {
            body.get(*key)
                .and_then(Value::as_str)
                .filter(|text| !text.is_empty())
        })
        .unwrap_or(fallback)
        .to_string()
}

/// Turns a non-2xx response into [`ClientError::Server`], keeping the
/// server's message verbatim when the body carries one.
pub async fn reject(response: reqwest::Response, fallback: &str) -> ClientError {
    let status = response.status().as_u16();
    let body = response.json::<Value>().await.unwrap_or(Value::Null);
    ClientError::Server {
        status,
        message: server_message(&body, fallback),
    }
}

/// Decodes a 2xx JSON body as `T`.
pub async fn read_json<T: DeserializeOwned>(
    response: reqwest::Response,
    fallback: &str,
) -> Result<T, ClientError> {
    if !response.status().is_success() {
        return Err(reject(response, fallback).await);
    }
    Ok(response.json::<T>().await?)
}

/// Decodes a 2xx enveloped body. `success: false` is treated like a non-2xx
/// answer even when the status code says otherwise.
pub async fn read_envelope<T: DeserializeOwned>(
    response: reqwest::Response,
    fallback: &str,
) -> Result<Envelope<T>, ClientError> {
    let status = response.status().as_u16();
    let envelope: Envelope<T> = read_json(response, fallback).await?;

    if envelope.success == Some(false) {
        let message = envelope
            .error
            .or(envelope.message)
            .filter(|text| !text.is_empty())
            .unwrap_or_else(|| fallback.to_string());
        return Err(ClientError::Server { status, message });
    }

    Ok(envelope)
}

/// Checks the status of a response whose body the caller does not need.
pub async fn read_ack(response: reqwest::Response, fallback: &str) -> Result<(), ClientError> {
    let status = response.status().as_u16();
    if !response.status().is_success() {
        return Err(reject(response, fallback).await);
    }

    let body = response.json::<Value>().await.unwrap_or(Value::Null);
    if body.get("success").and_then(Value::as_bool) == Some(false) {
        return Err(ClientError::Server {
            status,
            message: server_message(&body, fallback),
        });
    }
    Ok(())
}
