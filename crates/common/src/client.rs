//! HTTP client for the Stellar Burgers API
//!
//! A thin wrapper over `reqwest` that turns every call into an
//! [`ApiResult`]. No retries and no caching happen at this layer.

use reqwest::header::{HeaderMap, CONTENT_TYPE};
pub use reqwest::Method;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use crate::config::BackendConfig;
use crate::error::{Error, Result};
use crate::observer::{Exchange, ExchangeObserver, NoopObserver};
use crate::types::ApiResult;

/// A single low-level API call
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub token: Option<String>,
    pub body: Option<Value>,
    pub query: Vec<(String, String)>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            token: None,
            body: None,
            query: Vec::new(),
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    /// Attach a bearer credential (without the `Bearer ` prefix)
    pub fn bearer(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Attach a bearer credential only when one is known
    pub fn bearer_opt(mut self, token: Option<&str>) -> Self {
        self.token = token.map(str::to_string);
        self
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Label used in logs and reports, e.g. `POST /auth/login`
    pub fn label(&self) -> String {
        format!("{} {}", self.method, self.path)
    }
}

/// Client bound to one backend base URL
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    observer: Arc<dyn ExchangeObserver>,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    /// Create a client for the configured backend
    pub fn new(config: &BackendConfig) -> Result<Self> {
        config.validate()?;
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            observer: Arc::new(NoopObserver),
        })
    }

    /// Replace the exchange observer
    pub fn with_observer(mut self, observer: Arc<dyn ExchangeObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Issue one request and normalize the response.
    ///
    /// Transport failures come back as `Err(Error::Http)`; any status code,
    /// including 4xx/5xx, is a successful call.
    pub async fn execute(&self, request: ApiRequest) -> Result<ApiResult> {
        let path = normalize_path(&request.path)?;
        let url = format!("{}{}", self.base_url, path);
        let label = request.label();

        let mut builder = self
            .http
            .request(request.method.clone(), &url)
            .header(CONTENT_TYPE, "application/json");

        if let Some(token) = request.token.as_deref() {
            if token.trim().is_empty() {
                return Err(Error::InvalidToken);
            }
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }

        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) => {
                debug!("{} failed: {}", label, e);
                self.observer.observe(&Exchange {
                    step: label,
                    request: request.body,
                    response: None,
                    error: Some(e.to_string()),
                });
                return Err(Error::Http(e));
            }
        };

        let status = response.status().as_u16();
        let headers = header_map(response.headers());
        let text = response.text().await?;
        let result = ApiResult::from_parts(status, text, headers);

        debug!("{} -> {}", label, result.status);
        self.observer.observe(&Exchange {
            step: label,
            request: request.body,
            response: Some(result.clone()),
            error: None,
        });

        Ok(result)
    }

    /// GET /ingredients
    pub async fn list_ingredients(&self) -> Result<ApiResult> {
        self.execute(ApiRequest::get("/ingredients")).await
    }

    /// POST /auth/register
    pub async fn register(&self, email: &str, password: &str, name: &str) -> Result<ApiResult> {
        self.execute(ApiRequest::post("/auth/register").json(json!({
            "email": email,
            "password": password,
            "name": name,
        })))
        .await
    }

    /// POST /auth/login
    pub async fn login(&self, email: &str, password: &str) -> Result<ApiResult> {
        self.execute(ApiRequest::post("/auth/login").json(json!({
            "email": email,
            "password": password,
        })))
        .await
    }

    /// PATCH /auth/user
    pub async fn patch_user(&self, token: &str, data: Value) -> Result<ApiResult> {
        self.execute(
            ApiRequest::new(Method::PATCH, "/auth/user")
                .bearer(token)
                .json(data),
        )
        .await
    }

    /// DELETE /auth/user
    pub async fn delete_user(&self, token: &str) -> Result<ApiResult> {
        self.execute(ApiRequest::new(Method::DELETE, "/auth/user").bearer(token))
            .await
    }

    /// POST /orders
    pub async fn create_order(&self, ingredients: &[String], token: Option<&str>) -> Result<ApiResult> {
        self.execute(
            ApiRequest::post("/orders")
                .bearer_opt(token)
                .json(json!({ "ingredients": ingredients })),
        )
        .await
    }

    /// GET /orders
    pub async fn list_user_orders(&self, token: &str) -> Result<ApiResult> {
        self.execute(ApiRequest::get("/orders").bearer(token)).await
    }

    /// True when the ingredient endpoint answers 200 with `success: true`
    pub async fn is_available(&self) -> bool {
        match self.list_ingredients().await {
            Ok(result) => result.is_ok(),
            Err(e) => {
                debug!("Availability probe failed: {}", e);
                false
            }
        }
    }
}

/// Validate a relative API path and make sure it starts with `/`
pub fn normalize_path(path: &str) -> Result<String> {
    let path = path.trim();
    if path.is_empty() {
        return Err(Error::InvalidPath("path is empty".to_string()));
    }
    if path.contains("://") || path.chars().any(char::is_whitespace) {
        return Err(Error::InvalidPath(path.to_string()));
    }
    if path.starts_with('/') {
        Ok(path.to_string())
    } else {
        Ok(format!("/{}", path))
    }
}

/// Flatten response headers; repeated names are joined with `", "`
fn header_map(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut map: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let value = String::from_utf8_lossy(value.as_bytes());
        map.entry(name.as_str().to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert_with(|| value.into_owned());
    }
    map
}
