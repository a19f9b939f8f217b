use axum::http::{header, HeaderMap};
use axum::Router;
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use std::net::SocketAddr;
use tokio::net::TcpListener;

use crate::auth::claims::{Action, ActionFlags};
use crate::auth::rbac::RbacService;
use crate::auth::users::{self, NewUser};
use crate::config::Config;
use crate::controllers::AppState;
use crate::models::{permission, role, user};

/// A test application for integration testing.
///
/// Spins up the server on an ephemeral port with an in-memory SQLite database.
///
/// ```rust,ignore
/// #[tokio::test]
/// async fn sign_in_works() {
///     let app = TestApp::new().await;
///     app.create_user("a@b.com", "secret123", None).await;
///     let res = app.sign_in("a@b.com", "secret123").await;
///     assert_eq!(res.status, 200);
/// }
/// ```
pub struct TestApp {
    pub addr: SocketAddr,
    pub client: TestClient,
    pub db: DatabaseConnection,
    pub config: Config,
    pub state: AppState,
}

impl TestApp {
    /// Test app with [`Config::for_tests`].
    pub async fn new() -> Self {
        Self::with_config(Config::for_tests()).await
    }

    /// Test app with a custom config.
    pub async fn with_config(config: Config) -> Self {
        Self::with_routes(config, |_| Router::new()).await
    }

    /// Test app with extra routes, built from the app's shared state so they
    /// can sit behind `authenticate`.
    pub async fn with_routes(
        config: Config,
        build: impl FnOnce(AppState) -> Router<AppState>,
    ) -> Self {
        let app = crate::App::with_config(config)
            .await
            .expect("Failed to create test app");
        let state = app.state();
        let app = app.routes(build(state.clone()));

        let router = app.router();
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind test server");
        let addr = listener.local_addr().expect("Failed to get local addr");

        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        TestApp {
            addr,
            client: TestClient::new(addr),
            db: app.db.clone(),
            config: app.config.clone(),
            state,
        }
    }

    /// Get the full URL for a path on the test server.
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Create an active user with a verified email.
    pub async fn create_user(&self, email: &str, password: &str, role_id: Option<i32>) -> user::Model {
        let username = email.split('@').next().unwrap_or(email).to_string();
        users::create_user(
            &self.db,
            NewUser {
                email: email.to_string(),
                username,
                password: password.to_string(),
                role_id,
                email_verified: true,
            },
            self.config.security.min_password_length,
        )
        .await
        .expect("Failed to create test user")
    }

    /// Create a role.
    pub async fn create_role(&self, name: &str) -> role::Model {
        RbacService::create_role(&self.db, name, None)
            .await
            .expect("Failed to create test role")
    }

    /// Grant `actions` on `resource` to a role, creating the resource if needed.
    pub async fn grant(&self, role_id: i32, resource: &str, actions: &[Action]) {
        let exists = permission::Entity::find()
            .filter(permission::Column::Name.eq(resource))
            .one(&self.db)
            .await
            .expect("Failed to look up permission");
        if exists.is_none() {
            RbacService::create_permission(&self.db, resource, None)
                .await
                .expect("Failed to create permission");
        }
        self.state
            .rbac
            .upsert_grant(&self.db, role_id, resource, ActionFlags::only(actions))
            .await
            .expect("Failed to grant permission");
    }

    /// Overwrite a user's failed-attempt counter.
    pub async fn set_failed_attempts(&self, user_id: i32, attempts: i32) {
        user::Entity::update_many()
            .col_expr(user::Column::FailedLoginAttempts, Expr::value(attempts))
            .filter(user::Column::Id.eq(user_id))
            .exec(&self.db)
            .await
            .expect("Failed to set failed attempts");
    }

    /// Reload a user row.
    pub async fn reload_user(&self, user_id: i32) -> user::Model {
        user::Entity::find_by_id(user_id)
            .one(&self.db)
            .await
            .expect("Failed to load user")
            .expect("User not found")
    }

    /// POST `/api/auth/sign-in`.
    pub async fn sign_in(&self, email: &str, password: &str) -> TestResponse {
        let body = serde_json::json!({
            "email": email,
            "password": password,
        });
        self.client
            .post(&self.url("/api/auth/sign-in"), &body.to_string())
            .await
    }
}

/// A simple HTTP test client with helper methods.
///
/// It keeps no cookie store; pass cookies explicitly.
#[derive(Clone)]
pub struct TestClient {
    inner: reqwest::Client,
    base_addr: SocketAddr,
}

impl TestClient {
    /// Create a new test client pointing at the given address.
    pub fn new(addr: SocketAddr) -> Self {
        TestClient {
            inner: reqwest::Client::new(),
            base_addr: addr,
        }
    }

    async fn send(&self, req: reqwest::RequestBuilder) -> TestResponse {
        let res = req.send().await.expect("request failed");
        TestResponse::from_response(res).await
    }

    /// Send a GET request.
    pub async fn get(&self, url: &str) -> TestResponse {
        self.send(self.inner.get(url)).await
    }

    /// Send a GET request with a bearer token.
    pub async fn get_with_auth(&self, url: &str, token: &str) -> TestResponse {
        self.send(
            self.inner
                .get(url)
                .header(header::AUTHORIZATION, format!("Bearer {}", token)),
        )
        .await
    }

    /// Send a GET request with a `Cookie` header.
    pub async fn get_with_cookies(&self, url: &str, cookies: &str) -> TestResponse {
        self.send(self.inner.get(url).header(header::COOKIE, cookies))
            .await
    }

    /// Send a POST request with a JSON body.
    pub async fn post(&self, url: &str, body: &str) -> TestResponse {
        self.send(
            self.inner
                .post(url)
                .header(header::CONTENT_TYPE, "application/json")
                .body(body.to_string()),
        )
        .await
    }

    /// Send a POST request with a bearer token and JSON body.
    pub async fn post_with_auth(&self, url: &str, token: &str, body: &str) -> TestResponse {
        self.send(
            self.inner
                .post(url)
                .header(header::CONTENT_TYPE, "application/json")
                .header(header::AUTHORIZATION, format!("Bearer {}", token))
                .body(body.to_string()),
        )
        .await
    }

    /// Send a POST request with a `Cookie` header and JSON body.
    pub async fn post_with_cookies(&self, url: &str, cookies: &str, body: &str) -> TestResponse {
        self.send(
            self.inner
                .post(url)
                .header(header::CONTENT_TYPE, "application/json")
                .header(header::COOKIE, cookies)
                .body(body.to_string()),
        )
        .await
    }

    /// Send a PUT request with a `Cookie` header.
    pub async fn put_with_cookies(&self, url: &str, cookies: &str) -> TestResponse {
        self.send(self.inner.put(url).header(header::COOKIE, cookies))
            .await
    }

    /// Send a DELETE request with a `Cookie` header.
    pub async fn delete_with_cookies(&self, url: &str, cookies: &str) -> TestResponse {
        self.send(self.inner.delete(url).header(header::COOKIE, cookies))
            .await
    }

    /// Get the base URL.
    pub fn base_url(&self) -> String {
        format!("http://{}", self.base_addr)
    }
}

/// A simplified HTTP response for test assertions.
#[derive(Debug)]
pub struct TestResponse {
    pub status: u16,
    pub body: String,
    pub headers: HeaderMap,
}

impl TestResponse {
    async fn from_response(res: reqwest::Response) -> Self {
        let status = res.status().as_u16();
        let headers = res.headers().clone();
        let body = res.text().await.unwrap_or_default();
        TestResponse {
            status,
            body,
            headers,
        }
    }

    /// Parse the body as JSON.
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_str(&self.body).expect("Failed to parse response as JSON")
    }

    /// Check if the response indicates success.
    pub fn is_success(&self) -> bool {
        self.json()["success"].as_bool().unwrap_or(false)
    }

    /// Get the data field from the response.
    pub fn data(&self) -> serde_json::Value {
        self.json()["data"].clone()
    }

    /// Get the error field from the response.
    pub fn error(&self) -> serde_json::Value {
        self.json()["error"].clone()
    }

    /// Every raw `Set-Cookie` header for `name`, in response order.
    pub fn set_cookies(&self, name: &str) -> Vec<String> {
        let prefix = format!("{}=", name);
        self.headers
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .filter(|v| v.starts_with(&prefix))
            .map(|v| v.to_string())
            .collect()
    }

    /// The `Set-Cookie` header for `name` a browser would keep (the last one).
    pub fn set_cookie(&self, name: &str) -> Option<String> {
        self.set_cookies(name).pop()
    }

    /// Value of a cookie set by this response. Removal cookies yield `None`.
    pub fn cookie(&self, name: &str) -> Option<String> {
        let raw = self.set_cookie(name)?;
        let value = raw
            .split(';')
            .next()?
            .split_once('=')?
            .1
            .trim()
            .to_string();
        if value.is_empty() || raw.contains("Max-Age=0") {
            None
        } else {
            Some(value)
        }
    }

    /// Whether the response told the client to drop cookie `name`.
    pub fn cookie_cleared(&self, name: &str) -> bool {
        self.set_cookie(name).is_some() && self.cookie(name).is_none()
    }

    /// A `Cookie` header carrying every auth cookie this response set.
    pub fn auth_cookie_header(&self) -> String {
        ["access_token", "refresh_token", "session_id"]
            .iter()
            .filter_map(|name| self.cookie(name).map(|v| format!("{}={}", name, v)))
            .collect::<Vec<_>>()
            .join("; ")
    }
}
