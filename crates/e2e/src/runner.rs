//! Suite runner that drives scenarios against the backend

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use stellar_common::identity::unique_email;
use stellar_common::{
    ApiClient, ApiRequest, ApiResult, BackendConfig, Exchange, ExchangeObserver, FanOutObserver,
    Method, RecordingObserver, TracingObserver,
};
use tokio::sync::OnceCell;
use tracing::{debug, error, info, warn};

use crate::cleanup::{CleanupConfig, DELETE_ACCEPTED};
use crate::error::{E2eError, E2eResult};
use crate::fixtures::{invalid_ingredients, SessionFixtures, UserFixture};
use crate::spec::{ApiCall, IngredientSelection, IngredientSet, ScenarioSpec, ScenarioStep, TemplateVars};

/// Tag marking scenarios that need a reachable backend
pub const LIVE_TAG: &str = "live";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Passed,
    Failed,
    Skipped,
}

/// Record of one executed step, including what went over the wire
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    pub index: usize,
    pub call: String,
    pub success: bool,
    pub duration_ms: u64,
    pub failures: Vec<String>,
    pub exchanges: Vec<Exchange>,
}

/// Result of running a single scenario
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioResult {
    pub name: String,
    pub outcome: Outcome,
    pub duration_ms: u64,
    pub steps: Vec<StepRecord>,
    pub error: Option<String>,
    pub skip_reason: Option<String>,
    /// Cleanup rounds used at teardown, if an account was removed
    pub cleanup_attempts: Option<u32>,
}

impl ScenarioResult {
    fn skipped(name: &str, reason: String) -> Self {
        Self {
            name: name.to_string(),
            outcome: Outcome::Skipped,
            duration_ms: 0,
            steps: vec![],
            error: None,
            skip_reason: Some(reason),
            cleanup_attempts: None,
        }
    }

    pub fn passed(&self) -> bool {
        self.outcome == Outcome::Passed
    }
}

/// Result of running a set of scenarios
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteResult {
    pub base_url: String,
    pub backend_available: bool,
    pub started_at: DateTime<Utc>,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub duration_ms: u64,
    pub results: Vec<ScenarioResult>,
}

impl SuiteResult {
    pub fn get(&self, name: &str) -> Option<&ScenarioResult> {
        self.results.iter().find(|r| r.name == name)
    }
}

/// Configuration for the suite runner
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub backend: BackendConfig,
    pub cleanup: CleanupConfig,
    pub specs_dir: PathBuf,
    pub output_dir: PathBuf,
    /// Run scenarios parked as known backend deviations instead of skipping them
    pub run_known_deviations: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            backend: BackendConfig::default(),
            cleanup: CleanupConfig::default(),
            specs_dir: default_specs_dir(),
            output_dir: PathBuf::from("test-results"),
            run_known_deviations: false,
        }
    }
}

/// Scenario catalog shipped with this crate
pub fn default_specs_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("specs")
}

/// Runs scenarios one at a time against a single backend
pub struct SuiteRunner {
    config: RunnerConfig,
    client: ApiClient,
    recorder: Arc<RecordingObserver>,
    session: SessionFixtures,
    available: OnceCell<bool>,
}

impl SuiteRunner {
    /// Create a runner; the client is bound to `config.backend`
    pub fn new(config: RunnerConfig) -> E2eResult<Self> {
        let recorder = Arc::new(RecordingObserver::new());
        let observers = vec![
            recorder.clone() as Arc<dyn ExchangeObserver>,
            Arc::new(TracingObserver),
        ];
        let client =
            ApiClient::new(&config.backend)?.with_observer(Arc::new(FanOutObserver::new(observers)));

        Ok(Self {
            config,
            client,
            recorder,
            session: SessionFixtures::new(),
            available: OnceCell::new(),
        })
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Probe the backend once per runner
    pub async fn backend_available(&self) -> bool {
        *self
            .available
            .get_or_init(|| async {
                let up = self.client.is_available().await;
                self.recorder.take();
                if up {
                    info!("Backend is available at {}", self.client.base_url());
                } else {
                    warn!("Backend is not available at {}", self.client.base_url());
                }
                up
            })
            .await
    }

    /// Run all scenarios in the specs directory
    pub async fn run_all(&self) -> E2eResult<SuiteResult> {
        let specs = ScenarioSpec::load_all(&self.config.specs_dir)?;
        Ok(self.run_specs(&specs).await)
    }

    /// Run scenarios matching a tag
    pub async fn run_tagged(&self, tag: &str) -> E2eResult<SuiteResult> {
        let specs = ScenarioSpec::load_all(&self.config.specs_dir)?;
        let filtered: Vec<ScenarioSpec> = ScenarioSpec::filter_by_tag(&specs, tag)
            .into_iter()
            .cloned()
            .collect();
        Ok(self.run_specs(&filtered).await)
    }

    /// Run a specific scenario by name
    pub async fn run_named(&self, name: &str) -> E2eResult<SuiteResult> {
        let specs = ScenarioSpec::load_all(&self.config.specs_dir)?;
        let spec = specs
            .into_iter()
            .find(|s| s.name == name)
            .ok_or_else(|| E2eError::SpecParse(format!("Scenario not found: {}", name)))?;
        Ok(self.run_specs(std::slice::from_ref(&spec)).await)
    }

    /// Run a list of scenarios sequentially
    pub async fn run_specs(&self, specs: &[ScenarioSpec]) -> SuiteResult {
        let started_at = Utc::now();
        let start = Instant::now();

        let backend_available = if specs.iter().any(|s| s.has_tag(LIVE_TAG)) {
            self.backend_available().await
        } else {
            true
        };

        info!("Running {} scenario(s)...", specs.len());

        let mut results = Vec::with_capacity(specs.len());
        let (mut passed, mut failed, mut skipped) = (0, 0, 0);

        for spec in specs {
            let result = self.run_spec(spec, backend_available).await;
            match result.outcome {
                Outcome::Passed => {
                    passed += 1;
                    info!("✓ {} ({} ms)", result.name, result.duration_ms);
                }
                Outcome::Failed => {
                    failed += 1;
                    error!(
                        "✗ {} - {}",
                        result.name,
                        result.error.as_deref().unwrap_or("unknown error")
                    );
                }
                Outcome::Skipped => {
                    skipped += 1;
                    info!(
                        "- {} skipped: {}",
                        result.name,
                        result.skip_reason.as_deref().unwrap_or("")
                    );
                }
            }
            results.push(result);
        }

        let duration_ms = start.elapsed().as_millis() as u64;
        info!(
            "Scenario results: {} passed, {} failed, {} skipped ({} ms)",
            passed, failed, skipped, duration_ms
        );

        SuiteResult {
            base_url: self.client.base_url().to_string(),
            backend_available,
            started_at,
            total: specs.len(),
            passed,
            failed,
            skipped,
            duration_ms,
            results,
        }
    }

    /// Run a single scenario, including fixture setup and teardown
    pub async fn run_spec(&self, spec: &ScenarioSpec, backend_available: bool) -> ScenarioResult {
        if let Some(reason) = &spec.known_deviation {
            if !self.config.run_known_deviations {
                return ScenarioResult::skipped(&spec.name, format!("known deviation: {}", reason));
            }
        }
        if spec.has_tag(LIVE_TAG) && !backend_available {
            return ScenarioResult::skipped(
                &spec.name,
                format!("backend unavailable at {}", self.client.base_url()),
            );
        }

        let start = Instant::now();
        debug!("Running scenario: {}", spec.name);
        self.recorder.take();

        let mut fixture = match UserFixture::setup(&self.client, spec.fixture, self.config.cleanup).await {
            Ok(fixture) => fixture,
            Err(e) => {
                return ScenarioResult {
                    name: spec.name.clone(),
                    outcome: Outcome::Failed,
                    duration_ms: start.elapsed().as_millis() as u64,
                    steps: vec![],
                    error: Some(e.to_string()),
                    skip_reason: None,
                    cleanup_attempts: None,
                }
            }
        };

        let fresh_email = unique_email();
        let mut steps = Vec::with_capacity(spec.steps.len());
        let mut failure: Option<String> = None;

        for (index, step) in spec.steps.iter().enumerate() {
            let step_start = Instant::now();
            let outcome = self.execute_step(&mut fixture, step, &fresh_email).await;
            let exchanges = self.recorder.take();

            let (call, failures, error) = match outcome {
                Ok((call, result, failures)) if !failures.is_empty() => {
                    let error = E2eError::AssertionFailed(format!(
                        "step {} ({}): {}; response {}",
                        index + 1,
                        call,
                        failures.join("; "),
                        result.describe()
                    ));
                    (call, failures, Some(error.to_string()))
                }
                Ok((call, _, failures)) => (call, failures, None),
                Err(e) => {
                    let message = format!("step {}: {}", index + 1, e);
                    (describe_call(&step.request), vec![e.to_string()], Some(message))
                }
            };

            steps.push(StepRecord {
                index,
                call,
                success: error.is_none(),
                duration_ms: step_start.elapsed().as_millis() as u64,
                failures,
                exchanges,
            });

            if error.is_some() {
                failure = error;
                break; // Stop on first failure
            }
        }

        let mut cleanup_attempts = None;
        match fixture.teardown(&self.client, self.config.cleanup).await {
            Ok(report) => cleanup_attempts = report.map(|r| r.attempts),
            Err(e) => {
                failure = Some(match failure {
                    Some(existing) => format!("{}; {}", existing, e),
                    None => e.to_string(),
                });
            }
        }
        self.recorder.take();

        ScenarioResult {
            name: spec.name.clone(),
            outcome: if failure.is_none() {
                Outcome::Passed
            } else {
                Outcome::Failed
            },
            duration_ms: start.elapsed().as_millis() as u64,
            steps,
            error: failure,
            skip_reason: None,
            cleanup_attempts,
        }
    }

    /// Perform one step and check its expectation.
    ///
    /// Returns the call label, the response and the violated checks.
    async fn execute_step(
        &self,
        fixture: &mut UserFixture,
        step: &ScenarioStep,
        fresh_email: &str,
    ) -> E2eResult<(String, ApiResult, Vec<String>)> {
        let vars = template_vars(fixture, fresh_email);
        let request = self.build_request(&step.request, fixture, &vars).await?;
        let label = request.label();
        let sent_body = request.body.clone();

        let result = self.client.execute(request).await?;
        // Account changes must be recorded even when the check errors
        apply_side_effects(&step.request, fixture, sent_body.as_ref(), &result);

        let failures = step.expect.check(&result, &vars)?;
        Ok((label, result, failures))
    }

    async fn build_request(
        &self,
        call: &ApiCall,
        fixture: &UserFixture,
        vars: &TemplateVars,
    ) -> E2eResult<ApiRequest> {
        let request = match call {
            ApiCall::ListIngredients => ApiRequest::get("/ingredients"),
            ApiCall::Register {
                email,
                password,
                name,
                omit,
            } => {
                let mut body = Map::new();
                for (field, value, default) in [
                    ("email", email, "{email}"),
                    ("password", password, "{password}"),
                    ("name", name, "{name}"),
                ] {
                    if omit.iter().any(|f| f == field) {
                        continue;
                    }
                    let raw = value.as_deref().unwrap_or(default);
                    body.insert(field.to_string(), Value::String(vars.render(raw)?));
                }
                ApiRequest::post("/auth/register").json(Value::Object(body))
            }
            ApiCall::Login { email, password } => {
                let email = vars.render(email.as_deref().unwrap_or("{email}"))?;
                let password = vars.render(password.as_deref().unwrap_or("{password}"))?;
                ApiRequest::post("/auth/login")
                    .json(serde_json::json!({ "email": email, "password": password }))
            }
            ApiCall::PatchUser { auth, body } => {
                ApiRequest::new(Method::PATCH, "/auth/user")
                    .bearer_opt(auth_token(fixture, *auth)?)
                    .json(Value::Object(vars.render_map(body)?))
            }
            ApiCall::DeleteUser { auth } => ApiRequest::new(Method::DELETE, "/auth/user")
                .bearer_opt(auth_token(fixture, *auth)?),
            ApiCall::CreateOrder { ingredients, auth } => {
                let ids = match ingredients {
                    IngredientSelection::Set(IngredientSet::Valid) => {
                        self.session.valid_ingredients(&self.client).await?
                    }
                    IngredientSelection::Set(IngredientSet::Invalid) => invalid_ingredients(),
                    IngredientSelection::Set(IngredientSet::Empty) => Vec::new(),
                    IngredientSelection::Explicit(ids) => ids
                        .iter()
                        .map(|id| vars.render(id))
                        .collect::<E2eResult<_>>()?,
                };
                ApiRequest::post("/orders")
                    .bearer_opt(auth_token(fixture, *auth)?)
                    .json(serde_json::json!({ "ingredients": ids }))
            }
            ApiCall::ListOrders { auth } => {
                ApiRequest::get("/orders").bearer_opt(auth_token(fixture, *auth)?)
            }
            ApiCall::Raw {
                method,
                path,
                auth,
                body,
            } => {
                let method = Method::from_bytes(method.to_uppercase().as_bytes())
                    .map_err(|_| E2eError::SpecParse(format!("invalid HTTP method: {}", method)))?;
                let mut request =
                    ApiRequest::new(method, vars.render(path)?).bearer_opt(auth_token(fixture, *auth)?);
                if let Some(body) = body {
                    request = request.json(vars.render_value(body)?);
                }
                request
            }
        };
        Ok(request)
    }

    /// Write suite results to a JSON file
    pub fn write_results(&self, results: &SuiteResult) -> E2eResult<PathBuf> {
        std::fs::create_dir_all(&self.config.output_dir)?;

        let path = self.config.output_dir.join("test-results.json");
        let json = serde_json::to_string_pretty(results)?;
        std::fs::write(&path, json)?;

        info!("Results written to: {}", path.display());
        Ok(path)
    }
}

fn template_vars(fixture: &UserFixture, fresh_email: &str) -> TemplateVars {
    let user = fixture.user();
    TemplateVars {
        email: user.map(|u| u.email.clone()),
        password: user.map(|u| u.password.clone()),
        name: user.map(|u| u.name.clone()),
        token: user.and_then(|u| u.token.clone()),
        fresh_email: fresh_email.to_string(),
    }
}

fn auth_token(fixture: &UserFixture, auth: bool) -> E2eResult<Option<&str>> {
    if !auth {
        return Ok(None);
    }
    fixture.token().map(Some).ok_or_else(|| {
        E2eError::SpecParse("authenticated call needs a registered or logged_in fixture".to_string())
    })
}

/// Keep the fixture's view of the account in line with accepted calls
fn apply_side_effects(
    call: &ApiCall,
    fixture: &mut UserFixture,
    sent: Option<&Value>,
    result: &ApiResult,
) {
    let sent_field = |field: &str| {
        sent.and_then(|b| b.get(field))
            .and_then(Value::as_str)
            .map(str::to_string)
    };
    let own_email = fixture.user().map(|u| u.email.clone());
    let is_own_account = own_email.is_some() && sent_field("email") == own_email;

    match call {
        ApiCall::Register { .. } if is_own_account => fixture.adopt_registration(result),
        ApiCall::Login { .. } if is_own_account && result.is_ok() => {
            if let (Some(user), Some(token)) = (fixture.user_mut(), result.access_token()) {
                user.set_token(&token);
            }
        }
        ApiCall::PatchUser { auth: true, .. } if result.is_ok() => {
            if let (Some(user), Some(Value::Object(patch))) = (fixture.user_mut(), sent) {
                user.apply_patch(patch);
            }
        }
        ApiCall::DeleteUser { auth: true } if result.succeeded_with(&DELETE_ACCEPTED) => {
            fixture.mark_deleted()
        }
        _ => {}
    }
}

fn describe_call(call: &ApiCall) -> String {
    match call {
        ApiCall::ListIngredients => "GET /ingredients".to_string(),
        ApiCall::Register { .. } => "POST /auth/register".to_string(),
        ApiCall::Login { .. } => "POST /auth/login".to_string(),
        ApiCall::PatchUser { .. } => "PATCH /auth/user".to_string(),
        ApiCall::DeleteUser { .. } => "DELETE /auth/user".to_string(),
        ApiCall::CreateOrder { .. } => "POST /orders".to_string(),
        ApiCall::ListOrders { .. } => "GET /orders".to_string(),
        ApiCall::Raw { method, path, .. } => format!("{} {}", method.to_uppercase(), path),
    }
}
