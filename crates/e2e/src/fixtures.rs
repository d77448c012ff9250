//! Scenario preconditions: test accounts and ingredient data
//!
//! A [`UserFixture`] walks one account through
//! `uninitialized -> identity_generated -> registered -> logged_in -> in_use -> torn_down`.
//! Any setup call that does not answer HTTP 200 with `success: true` stops
//! the walk with a precondition error carrying the response.
//!
//! [`SessionFixtures`] holds data shared by the whole run, fetched once.

use serde::{Deserialize, Serialize};
use std::fmt;
use stellar_common::identity::{unique_email, DEFAULT_NAME, DEFAULT_PASSWORD};
use stellar_common::{ApiClient, ApiResult, IngredientCatalog, TestUser};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::cleanup::{run_cleanup, CleanupConfig, CleanupReport};
use crate::error::{E2eError, E2eResult};

/// Well-formed but unknown ingredient ids
pub const INVALID_INGREDIENT_HASHES: [&str; 3] = ["invalid_hash_1", "12345", "deadbeefcafebabe"];

/// Lifecycle position of a [`UserFixture`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixtureState {
    Uninitialized,
    IdentityGenerated,
    Registered,
    LoggedIn,
    InUse,
    TornDown,
}

impl fmt::Display for FixtureState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FixtureState::Uninitialized => "uninitialized",
            FixtureState::IdentityGenerated => "identity_generated",
            FixtureState::Registered => "registered",
            FixtureState::LoggedIn => "logged_in",
            FixtureState::InUse => "in_use",
            FixtureState::TornDown => "torn_down",
        };
        f.write_str(s)
    }
}

impl FixtureState {
    fn can_move_to(self, to: FixtureState) -> bool {
        use FixtureState::*;
        matches!(
            (self, to),
            (Uninitialized, IdentityGenerated)
                | (IdentityGenerated, Registered)
                | (Registered, LoggedIn)
                | (IdentityGenerated | Registered | LoggedIn, InUse)
                | (IdentityGenerated | Registered | LoggedIn | InUse, TornDown)
        )
    }
}

/// How much account setup a scenario needs before its steps run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixtureLevel {
    /// No account at all
    #[default]
    None,
    /// Fresh credentials, not yet registered
    Credentials,
    /// Registered account with the registration token
    Registered,
    /// Registered and logged in; token comes from login
    LoggedIn,
}

/// One scenario's test account
#[derive(Debug)]
pub struct UserFixture {
    state: FixtureState,
    user: Option<TestUser>,
    /// Set once the backend holds an account for `user`
    registered: bool,
}

impl Default for UserFixture {
    fn default() -> Self {
        Self::new()
    }
}

impl UserFixture {
    pub fn new() -> Self {
        Self {
            state: FixtureState::Uninitialized,
            user: None,
            registered: false,
        }
    }

    /// Advance a fixture as far as `level` asks and hand it to the scenario.
    ///
    /// If setup fails after the backend created the account, the account is
    /// removed before the precondition error is returned. A removal that
    /// also fails is reported alongside it.
    pub async fn setup(
        client: &ApiClient,
        level: FixtureLevel,
        cleanup: CleanupConfig,
    ) -> E2eResult<Self> {
        let mut fixture = Self::new();
        if level == FixtureLevel::None {
            return Ok(fixture);
        }

        if let Err(e) = fixture.advance(client, level).await {
            return Err(fixture.roll_back(client, cleanup, e).await);
        }

        fixture.transition(FixtureState::InUse)?;
        Ok(fixture)
    }

    async fn advance(&mut self, client: &ApiClient, level: FixtureLevel) -> E2eResult<()> {
        self.generate_identity()?;
        if matches!(level, FixtureLevel::Registered | FixtureLevel::LoggedIn) {
            self.register(client).await?;
        }
        if level == FixtureLevel::LoggedIn {
            self.log_in(client).await?;
        }
        Ok(())
    }

    async fn roll_back(
        &mut self,
        client: &ApiClient,
        cleanup: CleanupConfig,
        precondition: E2eError,
    ) -> E2eError {
        if !self.registered {
            return precondition;
        }
        match self.teardown(client, cleanup).await {
            Ok(_) => precondition,
            Err(cleanup_err) => {
                warn!("{}", cleanup_err);
                E2eError::SetupRollbackFailed {
                    precondition: Box::new(precondition),
                    cleanup: Box::new(cleanup_err),
                }
            }
        }
    }

    pub fn state(&self) -> FixtureState {
        self.state
    }

    pub fn user(&self) -> Option<&TestUser> {
        self.user.as_ref()
    }

    pub fn user_mut(&mut self) -> Option<&mut TestUser> {
        self.user.as_mut()
    }

    pub fn token(&self) -> Option<&str> {
        self.user.as_ref().and_then(|u| u.token.as_deref())
    }

    /// Whether teardown has an account to remove
    pub fn is_registered(&self) -> bool {
        self.registered
    }

    /// Create fresh credentials for this fixture
    pub fn generate_identity(&mut self) -> E2eResult<()> {
        self.transition(FixtureState::IdentityGenerated)?;
        self.user = Some(TestUser::new(unique_email(), DEFAULT_PASSWORD, DEFAULT_NAME));
        Ok(())
    }

    /// Register the generated identity
    pub async fn register(&mut self, client: &ApiClient) -> E2eResult<()> {
        self.check_transition(FixtureState::Registered)?;
        let user = self.require_user()?.clone();

        let result = client.register(&user.email, &user.password, &user.name).await?;
        if !result.is_ok() {
            return Err(E2eError::precondition("POST /auth/register", &result));
        }
        self.registered = true;
        if result.access_token().is_none() {
            return Err(E2eError::precondition(
                "POST /auth/register (no access token)",
                &result,
            ));
        }

        self.absorb_token(&result);
        self.transition(FixtureState::Registered)?;
        debug!("Registered {}", user.email);
        Ok(())
    }

    /// Log in with the registered credentials and keep the returned token
    pub async fn log_in(&mut self, client: &ApiClient) -> E2eResult<()> {
        self.check_transition(FixtureState::LoggedIn)?;
        let user = self.require_user()?.clone();

        let result = client.login(&user.email, &user.password).await?;
        if !result.is_ok() || result.access_token().is_none() {
            return Err(E2eError::precondition("POST /auth/login", &result));
        }

        self.absorb_token(&result);
        self.transition(FixtureState::LoggedIn)?;
        debug!("Logged in as {}", user.email);
        Ok(())
    }

    /// Note that a scenario step registered this fixture's identity itself
    pub fn adopt_registration(&mut self, result: &ApiResult) {
        if result.is_ok() {
            self.registered = true;
            self.absorb_token(result);
        }
    }

    /// Note that a scenario step deleted the account itself
    pub fn mark_deleted(&mut self) {
        self.registered = false;
    }

    /// Remove the account, if one was created.
    ///
    /// Cleanup is strict: an account that could not be deleted is an error.
    pub async fn teardown(
        &mut self,
        client: &ApiClient,
        config: CleanupConfig,
    ) -> E2eResult<Option<CleanupReport>> {
        if self.state == FixtureState::Uninitialized {
            return Ok(None);
        }
        self.transition(FixtureState::TornDown)?;

        let user = match (&self.user, self.registered) {
            (Some(user), true) => user.clone(),
            _ => return Ok(None),
        };

        let report = run_cleanup(
            client,
            &user.email,
            &user.password,
            user.token.as_deref(),
            config,
        )
        .await;

        if report.deleted {
            self.registered = false;
            info!("Cleaned up {}", user.email);
            Ok(Some(report))
        } else {
            Err(report.into_error(&user.email))
        }
    }

    fn absorb_token(&mut self, result: &ApiResult) {
        if let (Some(user), Some(token)) = (self.user.as_mut(), result.access_token()) {
            user.set_token(&token);
        }
    }

    fn require_user(&self) -> E2eResult<&TestUser> {
        self.user.as_ref().ok_or_else(|| {
            E2eError::Client(stellar_common::Error::InvalidStateTransition {
                from: self.state.to_string(),
                to: "an identity-bearing state".to_string(),
            })
        })
    }

    fn check_transition(&self, to: FixtureState) -> E2eResult<()> {
        if self.state.can_move_to(to) {
            Ok(())
        } else {
            Err(E2eError::Client(stellar_common::Error::InvalidStateTransition {
                from: self.state.to_string(),
                to: to.to_string(),
            }))
        }
    }

    fn transition(&mut self, to: FixtureState) -> E2eResult<()> {
        self.check_transition(to)?;
        self.state = to;
        Ok(())
    }
}

/// Data fetched once and shared by every scenario in a run
#[derive(Debug, Default)]
pub struct SessionFixtures {
    catalog: OnceCell<IngredientCatalog>,
}

impl SessionFixtures {
    pub fn new() -> Self {
        Self::default()
    }

    /// The backend's ingredient ids, fetched on first use
    pub async fn ingredient_catalog(&self, client: &ApiClient) -> E2eResult<&IngredientCatalog> {
        self.catalog
            .get_or_try_init(|| async {
                let result = client.list_ingredients().await?;
                if !result.is_ok() {
                    return Err(E2eError::precondition("GET /ingredients", &result));
                }
                let catalog = IngredientCatalog::from_response(&result);
                if catalog.is_empty() {
                    return Err(E2eError::precondition(
                        "GET /ingredients (no ingredient ids in data)",
                        &result,
                    ));
                }
                info!("Loaded {} ingredient id(s)", catalog.len());
                Ok(catalog)
            })
            .await
    }

    /// Two or three random ingredient ids for an order
    pub async fn valid_ingredients(&self, client: &ApiClient) -> E2eResult<Vec<String>> {
        let catalog = self.ingredient_catalog(client).await?;
        Ok(catalog.sample(&mut rand::thread_rng()))
    }
}

/// Ingredient ids the backend must reject
pub fn invalid_ingredients() -> Vec<String> {
    INVALID_INGREDIENT_HASHES.iter().map(|s| s.to_string()).collect()
}
