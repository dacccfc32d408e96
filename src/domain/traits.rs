use super::{CommandResult, ContainerRecord, HealthInstance, InspectRecord, RegistryKeyValue};
use crate::error::Result;
use std::fmt::Debug;

/// Everything the harness needs from the orchestration side. The real
/// implementation shells out to the compose and container-runtime CLIs;
/// tests substitute a scripted mock.
pub trait ComposeRuntime: Send + Sync + Debug {
    /// Bring the whole deployment up, detached.
    fn up(&self) -> Result<()>;

    /// List containers, optionally filtered to one service.
    fn ps(&self, service: Option<&str>) -> Result<Vec<ContainerRecord>>;

    /// Set the instance count for a service.
    fn scale(&self, service: &str, count: u32) -> Result<()>;

    /// Stop one service's containers, or the whole deployment.
    fn stop(&self, service: Option<&str>) -> Result<()>;

    /// Remove one service's containers or the whole deployment, forced.
    fn rm(&self, service: Option<&str>) -> Result<()>;

    /// Stop one container by its full name.
    fn stop_container(&self, container: &str) -> Result<()>;

    /// Fetch a container's log stream, optionally bounded by a
    /// runtime-native `--since` expression.
    fn logs(&self, container: &str, since: Option<&str>) -> Result<String>;

    /// Run a command inside a container. Non-zero exit is reported in
    /// the result, not as an error; callers inspect the code themselves.
    fn exec(&self, container: &str, argv: &[&str]) -> Result<CommandResult>;

    /// Inspect a container's runtime metadata.
    fn inspect(&self, container: &str) -> Result<Vec<InspectRecord>>;
}

/// Everything the harness needs from the service-discovery side.
pub trait ServiceRegistry: Send + Sync + Debug {
    /// Look up a key. An absent key is a valid result, not an error.
    fn get_key(&self, key: &str) -> Result<RegistryKeyValue>;

    /// Whether a named health check currently reports passing. An
    /// absent or malformed check reads as not passing.
    fn is_check_passing(&self, check_id: &str) -> Result<bool>;

    /// The passing instances of a service. Empty when the service is
    /// not (yet) registered.
    fn service_health(&self, service: &str) -> Result<Vec<HealthInstance>>;

    /// The advertised addresses of a service's passing instances.
    fn service_addresses(&self, service: &str) -> Result<Vec<String>>;
}
