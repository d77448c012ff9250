//! In-memory Stellar Burgers backend for harness tests
//!
//! Mirrors the live API's routes, status codes and messages closely enough
//! to run the shipped scenario catalog, including its two known defects:
//! unauthenticated orders are accepted and unknown ingredient ids yield a
//! plain-text 500.

use axum::extract::State;
use axum::http::{header::AUTHORIZATION, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Ingredient ids served unless a test supplies its own
pub const DEFAULT_INGREDIENTS: [&str; 5] = [
    "61c0c5a71d1f82001bdaaa6d",
    "61c0c5a71d1f82001bdaaa6f",
    "61c0c5a71d1f82001bdaaa70",
    "61c0c5a71d1f82001bdaaa72",
    "61c0c5a71d1f82001bdaaa7a",
];

const NOT_AUTHORISED: &str = "You should be authorised";

#[derive(Debug, Clone)]
struct MockUser {
    password: String,
    name: String,
}

#[derive(Debug, Default)]
struct MockState {
    users: HashMap<String, MockUser>,
    /// token -> email
    tokens: HashMap<String, String>,
    orders: HashMap<String, Vec<Value>>,
    ingredients: Vec<String>,
    healthy: bool,
    reject_registrations: bool,
    reject_logins: bool,
    reject_deletes: bool,
    omit_register_tokens: bool,
    next_id: u64,
    login_calls: usize,
    delete_calls: usize,
    ingredient_calls: usize,
}

impl MockState {
    fn issue_token(&mut self, email: &str) -> String {
        self.next_id += 1;
        let token = format!("tok-{}", self.next_id);
        self.tokens.insert(token.clone(), email.to_string());
        token
    }

    fn auth_response(&mut self, email: &str) -> Value {
        let name = self.users.get(email).map(|u| u.name.clone()).unwrap_or_default();
        let token = self.issue_token(email);
        json!({
            "success": true,
            "user": { "email": email, "name": name },
            "accessToken": format!("Bearer {}", token),
            "refreshToken": format!("ref-{}", token),
        })
    }

    fn caller(&self, headers: &HeaderMap) -> Option<String> {
        let raw = headers.get(AUTHORIZATION)?.to_str().ok()?;
        let token = raw.strip_prefix("Bearer ")?;
        self.tokens
            .get(token)
            .filter(|email| self.users.contains_key(*email))
            .cloned()
    }
}

type Shared = Arc<Mutex<MockState>>;

/// Running mock backend; shuts down when dropped
pub struct MockBackend {
    /// API root, e.g. `http://127.0.0.1:12345/api`
    pub base_url: String,
    state: Shared,
    _shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl MockBackend {
    pub async fn spawn() -> Self {
        Self::spawn_with_ingredients(DEFAULT_INGREDIENTS.to_vec()).await
    }

    pub async fn spawn_with_ingredients(ingredients: Vec<&str>) -> Self {
        let state: Shared = Arc::new(Mutex::new(MockState {
            ingredients: ingredients.into_iter().map(str::to_string).collect(),
            healthy: true,
            ..Default::default()
        }));

        let app = Router::new()
            .route("/api/ingredients", get(list_ingredients))
            .route("/api/auth/register", post(register))
            .route("/api/auth/login", post(login))
            .route("/api/auth/user", axum::routing::patch(patch_user).delete(delete_user))
            .route("/api/orders", post(create_order).get(list_orders))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");
        let port = listener
            .local_addr()
            .expect("Failed to get local address")
            .port();

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .expect("Mock backend failed");
        });

        Self {
            base_url: format!("http://127.0.0.1:{}/api", port),
            state,
            _shutdown_tx: Some(shutdown_tx),
        }
    }

    /// Create an account directly and return a valid token for it
    pub fn add_user(&self, email: &str, password: &str, name: &str) -> String {
        let mut state = self.state.lock();
        state.users.insert(
            email.to_string(),
            MockUser {
                password: password.to_string(),
                name: name.to_string(),
            },
        );
        state.issue_token(email)
    }

    /// Invalidate every token issued for `email`
    pub fn revoke_tokens(&self, email: &str) {
        self.state.lock().tokens.retain(|_, owner| owner != email);
    }

    pub fn set_password(&self, email: &str, password: &str) {
        if let Some(user) = self.state.lock().users.get_mut(email) {
            user.password = password.to_string();
        }
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.state.lock().healthy = healthy;
    }

    pub fn reject_registrations(&self) {
        self.state.lock().reject_registrations = true;
    }

    pub fn reject_logins(&self) {
        self.state.lock().reject_logins = true;
    }

    /// Answer `DELETE /auth/user` with a 500
    pub fn reject_deletes(&self) {
        self.state.lock().reject_deletes = true;
    }

    /// Accept registrations without returning any tokens
    pub fn omit_register_tokens(&self) {
        self.state.lock().omit_register_tokens = true;
    }

    pub fn has_user(&self, email: &str) -> bool {
        self.state.lock().users.contains_key(email)
    }

    pub fn user_count(&self) -> usize {
        self.state.lock().users.len()
    }

    pub fn login_calls(&self) -> usize {
        self.state.lock().login_calls
    }

    pub fn delete_calls(&self) -> usize {
        self.state.lock().delete_calls
    }

    pub fn ingredient_calls(&self) -> usize {
        self.state.lock().ingredient_calls
    }
}

fn reply(status: StatusCode, body: Value) -> Response {
    (status, Json(body)).into_response()
}

fn refuse(status: StatusCode, message: &str) -> Response {
    reply(status, json!({ "success": false, "message": message }))
}

fn field<'a>(body: &'a Value, name: &str) -> Option<&'a str> {
    body.get(name).and_then(Value::as_str).filter(|s| !s.is_empty())
}

async fn list_ingredients(State(state): State<Shared>) -> Response {
    let mut state = state.lock();
    state.ingredient_calls += 1;
    if !state.healthy {
        return refuse(StatusCode::SERVICE_UNAVAILABLE, "maintenance");
    }
    let data: Vec<Value> = state
        .ingredients
        .iter()
        .map(|id| json!({ "_id": id, "name": format!("Ingredient {}", id), "type": "main" }))
        .collect();
    reply(StatusCode::OK, json!({ "success": true, "data": data }))
}

async fn register(State(state): State<Shared>, Json(body): Json<Value>) -> Response {
    let mut state = state.lock();
    if state.reject_registrations {
        return refuse(StatusCode::INTERNAL_SERVER_ERROR, "registration disabled");
    }
    let (Some(email), Some(password), Some(name)) =
        (field(&body, "email"), field(&body, "password"), field(&body, "name"))
    else {
        return refuse(
            StatusCode::FORBIDDEN,
            "Email, password and name are required fields",
        );
    };
    if state.users.contains_key(email) {
        return refuse(StatusCode::FORBIDDEN, "User already exists");
    }
    state.users.insert(
        email.to_string(),
        MockUser {
            password: password.to_string(),
            name: name.to_string(),
        },
    );
    if state.omit_register_tokens {
        return reply(
            StatusCode::OK,
            json!({ "success": true, "user": { "email": email, "name": name } }),
        );
    }
    let response = state.auth_response(email);
    reply(StatusCode::OK, response)
}

async fn login(State(state): State<Shared>, Json(body): Json<Value>) -> Response {
    let mut state = state.lock();
    state.login_calls += 1;
    let email = field(&body, "email").unwrap_or_default();
    let password = field(&body, "password").unwrap_or_default();
    let matches = state
        .users
        .get(email)
        .map(|u| u.password == password)
        .unwrap_or(false);
    if state.reject_logins || !matches {
        return refuse(StatusCode::UNAUTHORIZED, "email or password are incorrect");
    }
    let response = state.auth_response(email);
    reply(StatusCode::OK, response)
}

async fn patch_user(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let mut state = state.lock();
    let Some(mut email) = state.caller(&headers) else {
        return refuse(StatusCode::UNAUTHORIZED, NOT_AUTHORISED);
    };

    if let Some(new_email) = field(&body, "email") {
        if new_email != email {
            if state.users.contains_key(new_email) {
                return refuse(StatusCode::FORBIDDEN, "User with such email already exists");
            }
            if let Some(user) = state.users.remove(&email) {
                state.users.insert(new_email.to_string(), user);
            }
            if let Some(orders) = state.orders.remove(&email) {
                state.orders.insert(new_email.to_string(), orders);
            }
            for owner in state.tokens.values_mut() {
                if *owner == email {
                    *owner = new_email.to_string();
                }
            }
            email = new_email.to_string();
        }
    }

    let Some(user) = state.users.get_mut(&email) else {
        return refuse(StatusCode::UNAUTHORIZED, NOT_AUTHORISED);
    };
    if let Some(password) = field(&body, "password") {
        user.password = password.to_string();
    }
    if let Some(name) = field(&body, "name") {
        user.name = name.to_string();
    }
    let name = user.name.clone();

    reply(
        StatusCode::OK,
        json!({ "success": true, "user": { "email": email, "name": name } }),
    )
}

async fn delete_user(State(state): State<Shared>, headers: HeaderMap) -> Response {
    let mut state = state.lock();
    state.delete_calls += 1;
    if state.reject_deletes {
        return refuse(StatusCode::INTERNAL_SERVER_ERROR, "deletion unavailable");
    }
    let Some(email) = state.caller(&headers) else {
        return refuse(StatusCode::UNAUTHORIZED, NOT_AUTHORISED);
    };
    state.users.remove(&email);
    state.orders.remove(&email);
    state.tokens.retain(|_, owner| *owner != email);
    reply(
        StatusCode::ACCEPTED,
        json!({ "success": true, "message": "User successfully removed" }),
    )
}

async fn create_order(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let mut state = state.lock();
    let ids: Vec<String> = body
        .get("ingredients")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    if ids.is_empty() {
        return refuse(StatusCode::BAD_REQUEST, "Ingredient ids must be provided");
    }
    if ids.iter().any(|id| !state.ingredients.contains(id)) {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            "<!DOCTYPE html><pre>Internal Server Error</pre>",
        )
            .into_response();
    }

    state.next_id += 1;
    let order = json!({
        "number": 10_000 + state.next_id,
        "ingredients": ids,
        "status": "done",
    });
    if let Some(email) = state.caller(&headers) {
        state.orders.entry(email).or_default().push(order.clone());
    }

    reply(
        StatusCode::OK,
        json!({ "success": true, "name": "Space burger", "order": order }),
    )
}

async fn list_orders(State(state): State<Shared>, headers: HeaderMap) -> Response {
    let state = state.lock();
    let Some(email) = state.caller(&headers) else {
        return refuse(StatusCode::UNAUTHORIZED, NOT_AUTHORISED);
    };
    let orders = state.orders.get(&email).cloned().unwrap_or_default();
    let total = orders.len();
    reply(
        StatusCode::OK,
        json!({ "success": true, "orders": orders, "total": total, "totalToday": total }),
    )
}
