//! Scripted fake backend for integration tests.
#![allow(dead_code)]

use actix_web::{web, App, HttpRequest, HttpResponse, HttpServer};
use carrymate::client::Client;
use carrymate::configuration::{ApiSettings, SessionSettings, Settings, StorageSettings};
use carrymate::navigation::RecordingNavigator;
use carrymate::storage::{MemoryStore, TokenStore};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::net::TcpListener;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub authorization: Option<String>,
    pub body: Value,
}

#[derive(Default)]
pub struct BackendState {
    requests: Mutex<Vec<RecordedRequest>>,
    // Responses per "METHOD /path". The last one repeats.
    routes: Mutex<HashMap<String, VecDeque<(u16, Value)>>>,
    delays: Mutex<HashMap<String, Duration>>,
}

async fn handle(
    req: HttpRequest,
    body: web::Bytes,
    state: web::Data<BackendState>,
) -> HttpResponse {
    let recorded = RecordedRequest {
        method: req.method().to_string(),
        path: req.path().to_string(),
        authorization: req
            .headers()
            .get("Authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        body: serde_json::from_slice(&body).unwrap_or(Value::Null),
    };
    let key = format!("{} {}", recorded.method, recorded.path);
    state.requests.lock().unwrap().push(recorded);

    let delay = state.delays.lock().unwrap().get(&key).copied();
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }

    let scripted = {
        let mut routes = state.routes.lock().unwrap();
        routes.get_mut(&key).and_then(|queue| {
            if queue.len() > 1 {
                queue.pop_front()
            } else {
                queue.front().cloned()
            }
        })
    };

    match scripted {
        Some((status, body)) => HttpResponse::build(
            actix_web::http::StatusCode::from_u16(status).unwrap(),
        )
        .json(body),
        None => HttpResponse::NotFound().json(json!({ "error": "not found" })),
    }
}

pub struct FakeBackend {
    pub address: String,
    pub state: web::Data<BackendState>,
}

pub fn spawn_backend() -> FakeBackend {
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();

    let state = web::Data::new(BackendState::default());
    let server_state = state.clone();
    let server = HttpServer::new(move || {
        App::new()
            .app_data(server_state.clone())
            .default_service(web::to(handle))
    })
    .workers(1)
    .listen(listener)
    .expect("Failed to bind address")
    .run();
    let _ = tokio::spawn(server);

    FakeBackend {
        address: format!("http://127.0.0.1:{}", port),
        state,
    }
}

impl FakeBackend {
    /// Queue `(status, body)` answers for `method path`.
    pub fn respond(&self, method: &str, path: &str, responses: Vec<(u16, Value)>) {
        self.state
            .routes
            .lock()
            .unwrap()
            .insert(format!("{} {}", method, path), responses.into());
    }

    pub fn on(&self, method: &str, path: &str, status: u16, body: Value) {
        self.respond(method, path, vec![(status, body)]);
    }

    /// Hold every answer to `method path` back for `delay`.
    pub fn delay(&self, method: &str, path: &str, delay: Duration) {
        self.state
            .delays
            .lock()
            .unwrap()
            .insert(format!("{} {}", method, path), delay);
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.requests.lock().unwrap().clone()
    }

    pub fn requests_to(&self, method: &str, path: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.method == method && r.path == path)
            .collect()
    }

    /// Poll until a request to `method path` shows up, for fire-and-forget calls.
    pub async fn wait_for(&self, method: &str, path: &str) -> bool {
        for _ in 0..50 {
            if !self.requests_to(method, path).is_empty() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        false
    }

    pub fn settings(&self) -> Settings {
        settings_for(&self.address)
    }
}

pub fn settings_for(base_url: &str) -> Settings {
    Settings {
        api: ApiSettings {
            base_url: base_url.to_string(),
            request_timeout_secs: Some(5),
        },
        storage: StorageSettings {
            path: String::new(),
        },
        session: SessionSettings::default(),
    }
}

/// An address nothing listens on.
pub fn closed_address() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("http://127.0.0.1:{}", port)
}

pub struct TestClient {
    pub client: Client,
    pub tokens: TokenStore,
    pub navigator: Arc<RecordingNavigator>,
}

pub fn client_for(settings: &Settings) -> TestClient {
    let store = Arc::new(MemoryStore::new());
    let navigator = Arc::new(RecordingNavigator::new());
    let client = Client::build(settings, store.clone(), navigator.clone())
        .expect("Failed to build client");

    TestClient {
        client,
        tokens: TokenStore::new(store),
        navigator,
    }
}

/// Mint an HS256 token for `user_id` expiring `expires_in` seconds from now.
pub fn mint_token(user_id: i64, username: &str, expires_in: i64) -> String {
    let now = chrono::Utc::now().timestamp();
    let claims = json!({
        "sub": username,
        "username": username,
        "userId": user_id,
        "iat": now,
        "exp": now + expires_in,
    });
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(b"test-secret"),
    )
    .expect("Failed to mint token")
}

pub fn grant(user_id: i64, username: &str, refresh_token: &str) -> (String, Value) {
    let token = mint_token(user_id, username, 3_600);
    let body = json!({
        "token": token,
        "refreshToken": refresh_token,
        "user": { "id": user_id, "username": username },
    });
    (token, body)
}
