//! Stellar Burgers Contract Test Framework
//!
//! This crate drives live contract tests against a hosted Stellar Burgers
//! backend:
//! - Prepares test accounts through a fixture state machine
//! - Parses declarative YAML scenarios
//! - Removes every account it created, retrying with re-authentication
//! - Reports each request/response pair alongside the scenario outcome
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Contract Suite Runner                      │
//! ├─────────────────────────────────────────────────────────────┤
//! │  SuiteRunner                                                 │
//! │    ├── backend_available() -> bool       (probe, once)      │
//! │    ├── UserFixture::setup(level)         (per scenario)     │
//! │    ├── SessionFixtures::ingredient_catalog (once per run)   │
//! │    ├── execute steps -> StepRecord                          │
//! │    └── UserFixture::teardown -> run_cleanup (strict)        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ScenarioSpec (YAML)                                         │
//! │    ├── name, tags, fixture, known_deviation                 │
//! │    └── steps: [{ request: ApiCall, expect: Expectation }]   │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod cleanup;
pub mod error;
pub mod fixtures;
pub mod runner;
pub mod spec;

pub use cleanup::{delete_user_safely, run_cleanup, CleanupConfig, CleanupReport};
pub use error::{E2eError, E2eResult};
pub use fixtures::{FixtureLevel, FixtureState, SessionFixtures, UserFixture};
pub use runner::{Outcome, RunnerConfig, SuiteResult, SuiteRunner};
pub use spec::{ApiCall, Expectation, ScenarioSpec, ScenarioStep};
