#![allow(dead_code)]

/// Shared helpers for HTTP-level tests
///
/// Every test gets a fresh router over its own in-memory store and drives it
/// with `tower::ServiceExt::oneshot`; no server or database is needed.
/// Cookies are carried by hand, the way a browser would.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, HeaderMap, Method, Request, StatusCode};
use axum::Router;
use memora_api::app::{build_router, AppState};
use memora_api::config::{
    A2fConfig, ApiConfig, Config, DatabaseConfig, JwtConfig, LogFormat, SessionSettings,
};
use memora_shared::auth::permissions::CapabilityMap;
use memora_shared::auth::session::{CHALLENGE_COOKIE, SESSION_COOKIE};
use memora_shared::store::memory::MemoryStore;
use memora_shared::store::Stores;
use serde_json::{json, Value};
use totp_rs::{Algorithm, Secret, TOTP};
use tower::ServiceExt;

pub const PASSWORD: &str = "Corr3ct-Horse!";

pub fn test_config() -> Config {
    Config {
        api: ApiConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            cors_origins: vec!["*".to_string()],
            production: false,
        },
        database: DatabaseConfig {
            url: "postgresql://localhost/memora_test".to_string(),
            max_connections: 1,
        },
        jwt: JwtConfig {
            secret: "integration-test-secret-at-least-32-bytes".to_string(),
        },
        session: SessionSettings { ttl_days: 7 },
        a2f: A2fConfig {
            issuer: "Memora Hub".to_string(),
        },
        log_format: LogFormat::Text,
    }
}

/// Router plus direct access to its store
pub struct TestApp {
    pub router: Router,
    pub store: Arc<MemoryStore>,
}

/// Response with the body parsed as JSON (`Value::Null` when empty)
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl TestResponse {
    /// Value of a cookie set by this response
    pub fn cookie(&self, name: &str) -> Option<String> {
        self.set_cookie_header(name).and_then(|raw| {
            let value = raw.split(';').next()?.split_once('=')?.1.to_string();
            Some(value)
        })
    }

    /// Full `Set-Cookie` header for a cookie name
    pub fn set_cookie_header(&self, name: &str) -> Option<String> {
        let prefix = format!("{}=", name);
        self.headers
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .find(|v| v.starts_with(&prefix))
            .map(str::to_string)
    }

    pub fn session(&self) -> Option<String> {
        self.cookie(SESSION_COOKIE)
            .filter(|v| !v.is_empty())
            .map(|v| format!("{}={}", SESSION_COOKIE, v))
    }

    pub fn challenge(&self) -> Option<String> {
        self.cookie(CHALLENGE_COOKIE)
            .filter(|v| !v.is_empty())
            .map(|v| format!("{}={}", CHALLENGE_COOKIE, v))
    }
}

/// A registered user and their session cookie
pub struct Account {
    pub id: String,
    pub email: String,
    pub cookie: String,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_capabilities(CapabilityMap::standard())
    }

    pub fn with_capabilities(map: CapabilityMap) -> Self {
        let store = Arc::new(MemoryStore::new());
        let state = AppState::new(Stores::from_memory(store.clone()), test_config())
            .with_capabilities(map);

        Self {
            router: build_router(state),
            store,
        }
    }

    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        cookie: Option<&str>,
        body: Option<Value>,
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }

        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        self.execute(request).await
    }

    pub async fn execute(&self, request: Request<Body>) -> TestResponse {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };

        TestResponse {
            status,
            headers,
            body,
        }
    }

    pub async fn get(&self, uri: &str, cookie: &str) -> TestResponse {
        self.send(Method::GET, uri, Some(cookie), None).await
    }

    pub async fn post(&self, uri: &str, cookie: &str, body: Value) -> TestResponse {
        self.send(Method::POST, uri, Some(cookie), Some(body)).await
    }

    pub async fn patch(&self, uri: &str, cookie: &str, body: Value) -> TestResponse {
        self.send(Method::PATCH, uri, Some(cookie), Some(body)).await
    }

    pub async fn delete(&self, uri: &str, cookie: &str) -> TestResponse {
        self.send(Method::DELETE, uri, Some(cookie), None).await
    }

    /// Registers `email` with [`PASSWORD`] and returns the signed-in account
    pub async fn register(&self, email: &str) -> Account {
        let response = self
            .send(
                Method::POST,
                "/v1/auth/register",
                None,
                Some(json!({
                    "email": email,
                    "password": PASSWORD,
                    "first_name": "Test",
                    "last_name": "User",
                })),
            )
            .await;
        assert_eq!(response.status, StatusCode::CREATED, "{}", response.body);

        Account {
            id: response.body["user"]["id"].as_str().unwrap().to_string(),
            email: email.to_string(),
            cookie: response.session().expect("register sets a session cookie"),
        }
    }

    pub async fn login(&self, email: &str, password: &str) -> TestResponse {
        self.send(
            Method::POST,
            "/v1/auth/login",
            None,
            Some(json!({ "email": email, "password": password })),
        )
        .await
    }

    /// Creates a group owned by `owner` and returns its id
    pub async fn create_group(&self, owner: &Account, name: &str) -> String {
        let response = self
            .post("/v1/groups", &owner.cookie, json!({ "name": name }))
            .await;
        assert_eq!(response.status, StatusCode::CREATED, "{}", response.body);
        response.body["id"].as_str().unwrap().to_string()
    }

    /// Adds `member` to a group through the API, acting as `actor`
    pub async fn add_member(&self, actor: &Account, group_id: &str, member: &Account, role: &str) {
        let response = self
            .post(
                &format!("/v1/groups/{}/members", group_id),
                &actor.cookie,
                json!({ "email": member.email, "role": role }),
            )
            .await;
        assert_eq!(response.status, StatusCode::CREATED, "{}", response.body);
    }
}

/// Current code for a base32 secret, computed independently of the server
pub fn current_code(secret: &str) -> String {
    let bytes = Secret::Encoded(secret.to_string()).to_bytes().unwrap();
    let totp = TOTP::new(
        Algorithm::SHA1,
        6,
        1,
        30,
        bytes,
        Some("Memora Hub".to_string()),
        "test".to_string(),
    )
    .unwrap();
    totp.generate_current().unwrap()
}

/// A well-formed code that is not currently valid
pub fn wrong_code(secret: &str) -> String {
    let valid = current_code(secret);
    ["000000", "111111", "222222"]
        .into_iter()
        .find(|c| *c != valid)
        .unwrap()
        .to_string()
}
