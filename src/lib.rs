//! Integration-test harness for multi-container deployments.
//!
//! A test suite holds a [`TestHarness`] scoped to one project
//! namespace: `setup` brings the deployment up through the compose CLI
//! and blocks until every container runs, the wait primitives poll the
//! containers and the service registry until the state under test
//! appears (or a bounded timeout produces a failure carrying the last
//! observed state), and `teardown` stops the lot and prints a timing
//! report.

pub mod config;
pub mod domain;
pub mod error;
pub mod infra;
pub mod services;

// Make test_support available for integration tests
// In a real production crate, we might use a feature flag "test-utils"
pub mod test_support;

pub use config::{HarnessConfig, init_logging};
pub use domain::{
    CommandResult, ComposeRuntime, ContainerRecord, ContainerState, HealthInstance,
    InspectRecord, RegistryCheck, RegistryKeyValue, ServiceAddressSet, ServiceRegistry,
    StateKind,
};
pub use error::{HarnessError, Result};
pub use infra::{CommandRunner, ComposeAdapter, ConsulAdapter};
pub use services::{
    DEFAULT_COMPOSE_FILE, DEFAULT_POLL_INTERVAL, DEFAULT_TIMEOUT, Poll, TestHarness,
    WaitOptions, dump_environment, update_env_file, wait_until,
};
