use std::time::Duration;

pub const DEFAULT_COMPOSE_BIN: &str = "docker-compose";
pub const DEFAULT_DOCKER_BIN: &str = "docker";
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Environment-derived harness configuration, read once at
/// construction. Every knob has a working default so a plain
/// `HarnessConfig::from_env()` is enough on a developer machine.
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    /// Path to the orchestration CLI (`COMPOSE_BIN`).
    pub compose_bin: String,
    /// Path to the container-runtime CLI (`DOCKER_BIN`).
    pub docker_bin: String,
    /// Registry host to fall back to when the registry container's
    /// address cannot be resolved (`CONSUL`).
    pub consul_host: String,
    /// Timeout applied to every registry HTTP call
    /// (`HTTP_TIMEOUT_SECS`).
    pub http_timeout: Duration,
}

impl HarnessConfig {
    pub fn from_env() -> Self {
        let http_timeout = std::env::var("HTTP_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_HTTP_TIMEOUT);

        Self {
            compose_bin: env_or("COMPOSE_BIN", DEFAULT_COMPOSE_BIN),
            docker_bin: env_or("DOCKER_BIN", DEFAULT_DOCKER_BIN),
            consul_host: env_or("CONSUL", "consul"),
            http_timeout,
        }
    }
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            compose_bin: DEFAULT_COMPOSE_BIN.to_string(),
            docker_bin: DEFAULT_DOCKER_BIN.to_string(),
            consul_host: "consul".to_string(),
            http_timeout: DEFAULT_HTTP_TIMEOUT,
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

/// Installs a fmt subscriber honoring `LOG_LEVEL` (then `RUST_LOG`,
/// then `info`). Safe to call from every test; repeat installs are
/// ignored so suites don't fight over the global subscriber.
pub fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_env("LOG_LEVEL")
        .or_else(|_| tracing_subscriber::EnvFilter::try_from_env("RUST_LOG"))
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_without_environment() {
        let config = HarnessConfig::default();
        assert_eq!(config.compose_bin, "docker-compose");
        assert_eq!(config.docker_bin, "docker");
        assert_eq!(config.http_timeout, Duration::from_secs(10));
    }
}
