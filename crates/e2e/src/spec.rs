//! Declarative YAML scenario specification
//!
//! A scenario names the account fixture it needs, then lists API calls with
//! the response each one must produce:
//!
//! ```yaml
//! name: register-duplicate-user
//! tags: [live, auth]
//! fixture: registered
//! steps:
//!   - request:
//!       call: register
//!     expect:
//!       status: 403
//!       success: false
//!       message_contains: already exists
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;
use stellar_common::types::lookup_path;
use stellar_common::ApiResult;

use crate::error::{E2eError, E2eResult};
use crate::fixtures::FixtureLevel;

/// A complete scenario parsed from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioSpec {
    /// Unique name for this scenario
    pub name: String,

    /// Human-readable description
    #[serde(default)]
    pub description: String,

    /// Tags for filtering; `live` marks scenarios that need the backend
    #[serde(default)]
    pub tags: Vec<String>,

    /// Account setup required before the steps run
    #[serde(default)]
    pub fixture: FixtureLevel,

    /// Known backend defect; the scenario is skipped with this reason
    #[serde(default)]
    pub known_deviation: Option<String>,

    /// Steps to execute in order
    pub steps: Vec<ScenarioStep>,
}

/// One call and its expected outcome
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioStep {
    pub request: ApiCall,

    #[serde(default)]
    pub expect: Expectation,
}

fn default_auth() -> bool {
    true
}

/// API call performed by a step
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "call", rename_all = "snake_case")]
pub enum ApiCall {
    /// GET /ingredients
    ListIngredients,

    /// POST /auth/register; missing values come from the fixture
    Register {
        #[serde(default)]
        email: Option<String>,
        #[serde(default)]
        password: Option<String>,
        #[serde(default)]
        name: Option<String>,
        /// Fields left out of the payload entirely
        #[serde(default)]
        omit: Vec<String>,
    },

    /// POST /auth/login; missing values come from the fixture
    Login {
        #[serde(default)]
        email: Option<String>,
        #[serde(default)]
        password: Option<String>,
    },

    /// PATCH /auth/user
    PatchUser {
        #[serde(default = "default_auth")]
        auth: bool,
        body: Map<String, Value>,
    },

    /// DELETE /auth/user
    DeleteUser {
        #[serde(default = "default_auth")]
        auth: bool,
    },

    /// POST /orders
    CreateOrder {
        ingredients: IngredientSelection,
        #[serde(default = "default_auth")]
        auth: bool,
    },

    /// GET /orders
    ListOrders {
        #[serde(default = "default_auth")]
        auth: bool,
    },

    /// Any other request
    Raw {
        method: String,
        path: String,
        #[serde(default)]
        auth: bool,
        #[serde(default)]
        body: Option<Value>,
    },
}

/// Which ingredient ids an order step sends
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IngredientSelection {
    Set(IngredientSet),
    Explicit(Vec<String>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngredientSet {
    /// A random subset of the live catalog
    Valid,
    /// Fixed ids the backend does not know
    Invalid,
    /// An empty list
    Empty,
}

/// Checks applied to a step's response
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Expectation {
    #[serde(default)]
    pub status: Option<u16>,

    /// Any of these statuses is acceptable
    #[serde(default)]
    pub status_in: Vec<u16>,

    #[serde(default)]
    pub success: Option<bool>,

    /// Case-insensitive substring of `message`
    #[serde(default)]
    pub message_contains: Option<String>,

    /// Dotted body path -> exact value (strings may use placeholders)
    #[serde(default)]
    pub equals: BTreeMap<String, Value>,

    /// Dotted body paths that must hold a non-empty value
    #[serde(default)]
    pub present: Vec<String>,

    /// Dotted body path -> minimum array length
    #[serde(default)]
    pub min_len: BTreeMap<String, usize>,

    /// Only check body fields when the body parsed as JSON
    #[serde(default)]
    pub allow_missing_body: bool,
}

impl Expectation {
    /// Compare a response against this expectation.
    ///
    /// Returns one message per violated check, each naming the expected
    /// and the actual value.
    pub fn check(&self, result: &ApiResult, vars: &TemplateVars) -> E2eResult<Vec<String>> {
        let mut failures = Vec::new();

        if let Some(status) = self.status {
            if result.status != status {
                failures.push(format!("expected status {}, got {}", status, result.status));
            }
        }
        if !self.status_in.is_empty() && !self.status_in.contains(&result.status) {
            failures.push(format!(
                "expected status in {:?}, got {}",
                self.status_in, result.status
            ));
        }

        if !self.has_body_checks() {
            return Ok(failures);
        }
        let body = match &result.json {
            Some(body) => body,
            None if self.allow_missing_body => return Ok(failures),
            None => {
                failures.push("expected a JSON body, got none".to_string());
                return Ok(failures);
            }
        };

        if let Some(success) = self.success {
            let actual = body.get("success").and_then(Value::as_bool);
            if actual != Some(success) {
                failures.push(format!(
                    "expected success {}, got {}",
                    success,
                    display_opt(actual.map(Value::Bool).as_ref())
                ));
            }
        }

        if let Some(needle) = &self.message_contains {
            let message = body.get("message").and_then(Value::as_str).unwrap_or("");
            if !message.to_lowercase().contains(&needle.to_lowercase()) {
                failures.push(format!(
                    "expected message containing '{}', got '{}'",
                    needle, message
                ));
            }
        }

        for (path, expected) in &self.equals {
            let expected = vars.render_value(expected)?;
            let actual = lookup_path(body, path);
            if actual != Some(&expected) {
                failures.push(format!(
                    "expected {} = {}, got {}",
                    path,
                    expected,
                    display_opt(actual)
                ));
            }
        }

        for path in &self.present {
            let actual = lookup_path(body, path);
            if !is_non_empty(actual) {
                failures.push(format!(
                    "expected {} to be present, got {}",
                    path,
                    display_opt(actual)
                ));
            }
        }

        for (path, min) in &self.min_len {
            let actual = lookup_path(body, path).and_then(Value::as_array).map(Vec::len);
            match actual {
                Some(len) if len >= *min => {}
                Some(len) => failures.push(format!(
                    "expected at least {} item(s) in {}, got {}",
                    min, path, len
                )),
                None => failures.push(format!(
                    "expected {} to be a list of at least {} item(s), got {}",
                    path,
                    min,
                    display_opt(lookup_path(body, path))
                )),
            }
        }

        Ok(failures)
    }

    fn has_body_checks(&self) -> bool {
        self.success.is_some()
            || self.message_contains.is_some()
            || !self.equals.is_empty()
            || !self.present.is_empty()
            || !self.min_len.is_empty()
    }
}

fn is_non_empty(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(a)) => !a.is_empty(),
        Some(Value::Object(o)) => !o.is_empty(),
        Some(Value::Bool(_)) | Some(Value::Number(_)) => true,
    }
}

fn display_opt(value: Option<&Value>) -> String {
    value.map_or_else(|| "<missing>".to_string(), Value::to_string)
}

/// Values substituted into `{placeholder}` strings
#[derive(Debug, Clone, Default)]
pub struct TemplateVars {
    pub email: Option<String>,
    pub password: Option<String>,
    pub name: Option<String>,
    pub token: Option<String>,
    pub fresh_email: String,
}

impl TemplateVars {
    /// Substitute known placeholders; unknown `{...}` text is left alone
    pub fn render(&self, input: &str) -> E2eResult<String> {
        let mut out = String::with_capacity(input.len());
        let mut rest = input;

        while let Some(start) = rest.find('{') {
            out.push_str(&rest[..start]);
            let tail = &rest[start..];
            let Some(end) = tail.find('}') else {
                out.push_str(tail);
                return Ok(out);
            };
            let key = &tail[1..end];
            match self.lookup(key) {
                Some(Some(value)) => out.push_str(value),
                Some(None) => {
                    return Err(E2eError::SpecParse(format!(
                        "placeholder {{{}}} has no value; does the scenario need a fixture?",
                        key
                    )))
                }
                None => out.push_str(&tail[..=end]),
            }
            rest = &tail[end + 1..];
        }
        out.push_str(rest);
        Ok(out)
    }

    /// Render every string inside a JSON value
    pub fn render_value(&self, value: &Value) -> E2eResult<Value> {
        Ok(match value {
            Value::String(s) => Value::String(self.render(s)?),
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|v| self.render_value(v))
                    .collect::<E2eResult<_>>()?,
            ),
            Value::Object(map) => Value::Object(self.render_map(map)?),
            other => other.clone(),
        })
    }

    pub fn render_map(&self, map: &Map<String, Value>) -> E2eResult<Map<String, Value>> {
        map.iter()
            .map(|(k, v)| Ok((k.clone(), self.render_value(v)?)))
            .collect()
    }

    fn lookup(&self, key: &str) -> Option<Option<&str>> {
        match key {
            "email" => Some(self.email.as_deref()),
            "password" => Some(self.password.as_deref()),
            "name" => Some(self.name.as_deref()),
            "token" => Some(self.token.as_deref()),
            "fresh_email" => Some(Some(self.fresh_email.as_str())),
            _ => None,
        }
    }
}

impl ScenarioSpec {
    /// Parse a scenario from YAML string
    pub fn from_yaml(yaml: &str) -> E2eResult<Self> {
        let spec: Self = serde_yaml::from_str(yaml)?;
        spec.validate()?;
        Ok(spec)
    }

    /// Parse a scenario from a YAML file
    pub fn from_file(path: &Path) -> E2eResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
            .map_err(|e| E2eError::SpecParse(format!("{}: {}", path.display(), e)))
    }

    /// Load all scenarios from a directory, ordered by file path
    pub fn load_all(dir: &Path) -> E2eResult<Vec<Self>> {
        if !dir.is_dir() {
            return Err(E2eError::SpecParse(format!(
                "spec directory not found: {}",
                dir.display()
            )));
        }

        let mut paths: Vec<_> = walkdir::WalkDir::new(dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .map(|e| e.into_path())
            .filter(|p| {
                p.extension()
                    .map(|ext| ext == "yaml" || ext == "yml")
                    .unwrap_or(false)
            })
            .collect();
        paths.sort();

        let mut specs = Vec::with_capacity(paths.len());
        for path in paths {
            specs.push(Self::from_file(&path)?);
        }

        let mut names: Vec<&str> = specs.iter().map(|s| s.name.as_str()).collect();
        names.sort_unstable();
        if let Some(dup) = names.windows(2).find(|w| w[0] == w[1]) {
            return Err(E2eError::SpecParse(format!("duplicate scenario name: {}", dup[0])));
        }

        Ok(specs)
    }

    /// Filter scenarios by tag
    pub fn filter_by_tag<'a>(specs: &'a [Self], tag: &str) -> Vec<&'a Self> {
        specs.iter().filter(|s| s.has_tag(tag)).collect()
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    /// Whether any step orders from the live ingredient catalog
    pub fn needs_catalog(&self) -> bool {
        self.steps.iter().any(|s| {
            matches!(
                s.request,
                ApiCall::CreateOrder {
                    ingredients: IngredientSelection::Set(IngredientSet::Valid),
                    ..
                }
            )
        })
    }

    fn validate(&self) -> E2eResult<()> {
        if self.name.trim().is_empty() {
            return Err(E2eError::SpecParse("scenario name is empty".to_string()));
        }
        if self.steps.is_empty() {
            return Err(E2eError::SpecParse(format!("{}: no steps", self.name)));
        }
        for step in &self.steps {
            if let ApiCall::Register { omit, .. } = &step.request {
                if let Some(field) = omit
                    .iter()
                    .find(|f| !matches!(f.as_str(), "email" | "password" | "name"))
                {
                    return Err(E2eError::SpecParse(format!(
                        "{}: cannot omit unknown field '{}'",
                        self.name, field
                    )));
                }
            }
        }
        Ok(())
    }
}
