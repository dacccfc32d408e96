use crate::config::HarnessConfig;
use crate::domain::{
    CommandResult, ComposeRuntime, ContainerRecord, HealthInstance, InspectRecord,
    ServiceAddressSet, ServiceRegistry,
};
use crate::error::{HarnessError, Result};
use crate::infra::{CommandRunner, ComposeAdapter, ConsulAdapter};
use crate::services::wait::{Poll, WaitOptions, wait_until};
use regex::Regex;
use std::fs;
use std::net::IpAddr;
use std::path::Path;
use std::sync::{Arc, LazyLock, Mutex, OnceLock};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub const DEFAULT_COMPOSE_FILE: &str = "docker-compose.yml";

/// The container the registry runs in, used to resolve the registry
/// address once the deployment is up.
const REGISTRY_CONTAINER: &str = "consul_1";

static IP_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d{1,3}(?:\.\d{1,3}){3}\b").expect("address pattern"));

/// Per-test-class harness for one deployment. Test cases hold one and
/// delegate to it: bring the environment up once, poll it into the
/// states the test asserts on, and tear it down at the end.
///
/// All operations are scoped to the project namespace given at
/// construction, which prefixes every container name for the
/// harness's lifetime.
#[derive(Debug)]
pub struct TestHarness {
    project: String,
    config: HarnessConfig,
    runtime: Arc<dyn ComposeRuntime>,
    // Constructed on first use: the registry itself is only reachable
    // once bring-up has completed.
    registry: OnceLock<Arc<dyn ServiceRegistry>>,
    timings: Mutex<Vec<(String, Duration)>>,
}

impl TestHarness {
    pub fn new(project: &str) -> Self {
        Self::with_compose_file(project, DEFAULT_COMPOSE_FILE)
    }

    pub fn with_compose_file(project: &str, compose_file: &str) -> Self {
        let config = HarnessConfig::from_env();
        let runtime = ComposeAdapter::new(&config, project, compose_file);
        Self::assemble(project, config, Arc::new(runtime))
    }

    /// Builds a harness over a caller-supplied runtime. This is the
    /// seam the crate's own tests use to substitute scripted mocks.
    pub fn with_runtime(project: &str, runtime: Arc<dyn ComposeRuntime>) -> Self {
        Self::assemble(project, HarnessConfig::from_env(), runtime)
    }

    fn assemble(project: &str, config: HarnessConfig, runtime: Arc<dyn ComposeRuntime>) -> Self {
        Self {
            project: project.to_string(),
            config,
            runtime,
            registry: OnceLock::new(),
            timings: Mutex::new(Vec::new()),
        }
    }

    /// Seeds the lazily-constructed registry handle, bypassing address
    /// resolution. Used by tests and by suites that know the registry
    /// address up front.
    pub fn set_registry(&self, registry: Arc<dyn ServiceRegistry>) {
        let _ = self.registry.set(registry);
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    // ---- lifecycle ----

    /// Brings the deployment up, detached, and blocks until every
    /// container reports a running state.
    pub fn setup(&self) -> Result<Vec<ContainerRecord>> {
        info!("bringing up project {}", self.project);
        self.instrument("compose up -d", || self.runtime.up())?;
        self.wait_for_containers_up(None, WaitOptions::default())
    }

    /// Stops and removes the deployment. Individual failures are
    /// logged and tolerated so one broken container cannot leave the
    /// rest of the environment behind.
    pub fn teardown(&self) {
        info!("tearing down project {}", self.project);

        if let Err(err) = self.instrument("compose stop", || self.runtime.stop(None)) {
            warn!("stop during teardown failed: {err}");
        }
        if let Err(err) = self.instrument("compose rm -f", || self.runtime.rm(None)) {
            warn!("rm during teardown failed: {err}");
        }

        self.report();
    }

    /// Dumps every container's log stream to the test log. Meant for a
    /// failure path, before `teardown` destroys the evidence.
    pub fn collect_logs(&self) {
        let records = match self.runtime.ps(None) {
            Ok(records) => records,
            Err(err) => {
                warn!("could not list containers for log collection: {err}");
                return;
            }
        };

        for record in records {
            match self.runtime.logs(&record.name, None) {
                Ok(text) => info!("---- logs {} ----\n{text}", record.name),
                Err(err) => warn!("could not collect logs for {}: {err}", record.name),
            }
        }
    }

    /// Emits one timing line per instrumented CLI invocation, oldest
    /// first. Called from `teardown`; callable on its own.
    pub fn report(&self) {
        let timings = self.timings.lock().unwrap();
        if timings.is_empty() {
            return;
        }
        info!("{:>12} | task", "elapsed");
        for (label, elapsed) in timings.iter() {
            info!("{:>12} | {label}", format!("{elapsed:.2?}"));
        }
    }

    fn instrument<T>(&self, label: &str, op: impl FnOnce() -> Result<T>) -> Result<T> {
        let started = Instant::now();
        let result = op();
        self.timings
            .lock()
            .unwrap()
            .push((label.to_string(), started.elapsed()));
        result
    }

    // ---- naming ----

    /// Completes a partial container identifier with the project
    /// namespace. A 64-hex-digit id or an already-qualified name passes
    /// through unchanged.
    pub fn container_name(&self, partial: &str) -> String {
        let is_container_id =
            partial.len() == 64 && partial.chars().all(|c| c.is_ascii_hexdigit());
        if is_container_id || self.project.is_empty() {
            return partial.to_string();
        }

        let prefix = format!("{}_", self.project);
        if partial.starts_with(&prefix) {
            return partial.to_string();
        }
        format!("{prefix}{partial}")
    }

    /// The name of a service's nth container.
    pub fn instance_name(&self, service: &str, ordinal: u32) -> String {
        self.container_name(&format!("{service}_{ordinal}"))
    }

    /// The registry check id for a service's nth container.
    pub fn check_id(&self, service: &str, ordinal: u32) -> String {
        format!("service:{}", self.instance_name(service, ordinal))
    }

    // ---- orchestration operations ----

    pub fn compose_ps(&self, service: Option<&str>) -> Result<Vec<ContainerRecord>> {
        self.instrument("compose ps", || self.runtime.ps(service))
    }

    pub fn compose_scale(&self, service: &str, count: u32) -> Result<()> {
        self.instrument(&format!("compose scale {service}={count}"), || {
            self.runtime.scale(service, count)
        })
    }

    pub fn compose_stop(&self, service: Option<&str>) -> Result<()> {
        self.instrument("compose stop", || self.runtime.stop(service))
    }

    pub fn compose_rm(&self, service: Option<&str>) -> Result<()> {
        self.instrument("compose rm -f", || self.runtime.rm(service))
    }

    pub fn docker_stop(&self, container: &str) -> Result<()> {
        let name = self.container_name(container);
        self.instrument(&format!("docker stop {name}"), || {
            self.runtime.stop_container(&name)
        })
    }

    pub fn docker_logs(&self, container: &str, since: Option<&str>) -> Result<String> {
        let name = self.container_name(container);
        self.instrument(&format!("docker logs {name}"), || {
            self.runtime.logs(&name, since)
        })
    }

    pub fn docker_exec(&self, container: &str, argv: &[&str]) -> Result<CommandResult> {
        let name = self.container_name(container);
        self.instrument(&format!("docker exec {name}"), || {
            self.runtime.exec(&name, argv)
        })
    }

    pub fn docker_inspect(&self, container: &str) -> Result<Vec<InspectRecord>> {
        let name = self.container_name(container);
        self.instrument(&format!("docker inspect {name}"), || {
            self.runtime.inspect(&name)
        })
    }

    /// Runs an external helper script, requiring exit status zero.
    pub fn run_script(&self, program: &str, args: &[&str]) -> Result<CommandResult> {
        self.instrument(&format!("script {program}"), || {
            CommandRunner::new(program).run(args.iter().copied())
        })
    }

    /// Collects each of a service's addresses by asking its containers
    /// directly, classified by reachability. Containers that cannot
    /// answer are skipped; the registry-side view is
    /// `service_addresses_from_registry`.
    pub fn get_service_ips(&self, service: &str) -> Result<ServiceAddressSet> {
        let records = self.runtime.ps(Some(service))?;
        let mut addresses = ServiceAddressSet::default();

        for record in &records {
            let result = self.runtime.exec(&record.name, &["ip", "-o", "addr"])?;
            for found in IP_PATTERN.find_iter(&result.combined_output()) {
                let Ok(addr) = found.as_str().parse::<IpAddr>() else {
                    continue;
                };
                if addr.is_loopback() || addr.is_unspecified() {
                    continue;
                }
                addresses.push(addr);
            }
        }

        debug!(
            "{service}: {} external / {} internal address(es)",
            addresses.external.len(),
            addresses.internal.len()
        );
        Ok(addresses)
    }

    // ---- registry operations ----

    /// The registry handle, constructed on first access by resolving
    /// the registry container's address and falling back to the
    /// configured host when the runtime does not report one.
    pub fn registry(&self) -> Result<Arc<dyn ServiceRegistry>> {
        if let Some(registry) = self.registry.get() {
            return Ok(Arc::clone(registry));
        }

        let connected = self.connect_registry()?;
        let _ = self.registry.set(connected);
        Ok(Arc::clone(self.registry.get().unwrap()))
    }

    fn connect_registry(&self) -> Result<Arc<dyn ServiceRegistry>> {
        let name = self.container_name(REGISTRY_CONTAINER);
        let records = self.runtime.inspect(&name)?;
        let host = records
            .first()
            .and_then(|r| r.primary_address())
            .map(str::to_string)
            .unwrap_or_else(|| self.config.consul_host.clone());

        debug!("connecting to registry at {host}");
        let adapter = ConsulAdapter::for_host(&host, self.config.http_timeout)?;
        Ok(Arc::new(adapter))
    }

    pub fn get_key(&self, key: &str) -> Result<crate::domain::RegistryKeyValue> {
        self.registry()?.get_key(key)
    }

    pub fn is_check_passing(&self, check_id: &str) -> Result<bool> {
        self.registry()?.is_check_passing(check_id)
    }

    pub fn service_addresses_from_registry(&self, service: &str) -> Result<Vec<String>> {
        self.registry()?.service_addresses(service)
    }

    // ---- wait primitives ----

    /// Blocks until every listed container (optionally filtered to one
    /// service) reports a running state. An empty listing is "not yet":
    /// the containers may simply not have appeared. A failing listing
    /// command is fatal.
    pub fn wait_for_containers_up(
        &self,
        service: Option<&str>,
        opts: WaitOptions,
    ) -> Result<Vec<ContainerRecord>> {
        let what = match service {
            Some(service) => format!("containers of {service} up"),
            None => "all containers up".to_string(),
        };

        wait_until(&what, opts, || match self.runtime.ps(service) {
            Err(err) => Poll::Fatal(err),
            Ok(records) if records.is_empty() => {
                Poll::NotYet("no containers listed yet".to_string())
            }
            Ok(records) => {
                if records.iter().all(|r| r.state.is_running()) {
                    Poll::Satisfied(records)
                } else {
                    Poll::NotYet(render_states(&records))
                }
            }
        })
    }

    /// Blocks until the registry reports at least `min_count` passing
    /// instances of the service; `None` means at least one.
    pub fn wait_for_service_healthy(
        &self,
        service: &str,
        min_count: Option<usize>,
        opts: WaitOptions,
    ) -> Result<Vec<HealthInstance>> {
        let registry = self.registry()?;
        let what = format!("{service} healthy");

        wait_until(&what, opts, || match registry.service_health(service) {
            Err(err) => Poll::Fatal(err),
            Ok(instances) if instances.is_empty() => {
                Poll::NotYet(format!("no passing instances of {service}"))
            }
            Ok(instances) => match min_count {
                Some(n) if instances.len() < n => {
                    Poll::NotYet(format!("{}/{n} instances passing", instances.len()))
                }
                _ => Poll::Satisfied(instances),
            },
        })
    }

    /// Blocks until the registry no longer lists any instance of the
    /// service. Absence is the success condition here.
    pub fn wait_for_service_removed(&self, service: &str, opts: WaitOptions) -> Result<()> {
        let registry = self.registry()?;
        let what = format!("{service} removed");

        wait_until(&what, opts, || match registry.service_health(service) {
            Err(err) => Poll::Fatal(err),
            Ok(instances) if instances.is_empty() => Poll::Satisfied(()),
            Ok(instances) => {
                Poll::NotYet(format!("{} instance(s) still registered", instances.len()))
            }
        })
    }

    /// Blocks until the container's log stream matches `pattern`,
    /// scanning each poll's output incrementally from a byte cursor so
    /// content is never examined twice. Returns the matching line. The
    /// container disappearing mid-wait is fatal.
    pub fn watch_logs_for(
        &self,
        container: &str,
        pattern: &str,
        opts: WaitOptions,
    ) -> Result<String> {
        let name = self.container_name(container);
        let matcher =
            Regex::new(pattern).map_err(|_| HarnessError::parse("log pattern", pattern))?;
        let what = format!("`{pattern}` in {name} logs");
        let mut cursor = 0usize;

        wait_until(&what, opts, move || {
            let text = match self.runtime.logs(&name, None) {
                Ok(text) => text,
                Err(err) => return Poll::Fatal(err),
            };

            // A shrinking stream means the container was recreated;
            // rescan it from the top once.
            let fresh = match text.get(cursor..) {
                Some(fresh) => fresh,
                None => {
                    cursor = 0;
                    text.as_str()
                }
            };

            let outcome = match matcher.find(fresh) {
                Some(found) => Poll::Satisfied(line_around(fresh, found.start()).to_string()),
                None => Poll::NotYet(format!("{} new log byte(s) without a match", fresh.len())),
            };
            cursor = text.len();
            outcome
        })
    }

    // ---- environment files ----

    /// Rewrites matching `KEY=value` lines in place. Keys are matched
    /// exactly against the text before `=`; unmatched lines pass
    /// through untouched and no new keys are appended.
    pub fn update_env_file(&self, path: impl AsRef<Path>, substitutions: &[(&str, &str)]) -> Result<()> {
        update_env_file(path, substitutions)
    }

    /// Writes the current process environment as `KEY=value` lines, in
    /// a shape the orchestration CLI accepts as an env file.
    pub fn dump_environment(&self, path: impl AsRef<Path>) -> Result<()> {
        dump_environment(path)
    }
}

pub fn update_env_file(path: impl AsRef<Path>, substitutions: &[(&str, &str)]) -> Result<()> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)?;
    let had_trailing_newline = content.ends_with('\n');

    let lines: Vec<String> = content
        .lines()
        .map(|line| {
            let key = line.split_once('=').map(|(k, _)| k);
            match substitutions.iter().find(|(k, _)| Some(*k) == key) {
                Some((k, v)) => format!("{k}={v}"),
                None => line.to_string(),
            }
        })
        .collect();

    let mut rewritten = lines.join("\n");
    if had_trailing_newline {
        rewritten.push('\n');
    }
    fs::write(path, rewritten)?;
    Ok(())
}

pub fn dump_environment(path: impl AsRef<Path>) -> Result<()> {
    let mut out = String::new();
    for (key, value) in std::env::vars() {
        out.push_str(&key);
        out.push('=');
        out.push_str(&value);
        out.push('\n');
    }
    fs::write(path.as_ref(), out)?;
    Ok(())
}

fn render_states(records: &[ContainerRecord]) -> String {
    records
        .iter()
        .map(|r| format!("{}={}", r.name, r.state))
        .collect::<Vec<_>>()
        .join(", ")
}

/// The full line containing byte offset `at`.
fn line_around(text: &str, at: usize) -> &str {
    let start = text[..at].rfind('\n').map(|i| i + 1).unwrap_or(0);
    let end = text[at..].find('\n').map(|i| at + i).unwrap_or(text.len());
    text[start..end].trim_end_matches('\r')
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn harness() -> TestHarness {
        TestHarness::with_runtime("app", Arc::new(crate::test_support::MockCompose::new()))
    }

    #[test]
    fn test_container_name_completion() {
        let harness = harness();
        assert_eq!(harness.container_name("nginx_1"), "app_nginx_1");
        assert_eq!(harness.container_name("app_nginx_1"), "app_nginx_1");

        let id = "a".repeat(64);
        assert_eq!(harness.container_name(&id), id);
    }

    #[test]
    fn test_instance_and_check_naming() {
        let harness = harness();
        assert_eq!(harness.instance_name("nginx", 2), "app_nginx_2");
        assert_eq!(harness.check_id("nginx", 2), "service:app_nginx_2");
    }

    #[test]
    fn test_update_env_file_rewrites_only_matching_keys() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "PASSWORD=oldvalue\nOTHER=1\n").unwrap();

        update_env_file(file.path(), &[("PASSWORD", "x")]).unwrap();

        let content = fs::read_to_string(file.path()).unwrap();
        assert_eq!(content, "PASSWORD=x\nOTHER=1\n");
    }

    #[test]
    fn test_update_env_file_matches_whole_key_only() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "PASSWORD_HASH=abc\nPASSWORD=secret\n").unwrap();

        update_env_file(file.path(), &[("PASSWORD", "x")]).unwrap();

        let content = fs::read_to_string(file.path()).unwrap();
        assert_eq!(content, "PASSWORD_HASH=abc\nPASSWORD=x\n");
    }

    #[test]
    fn test_dump_environment_is_loadable_by_update() {
        let file = NamedTempFile::new().unwrap();
        // SAFETY: test process, no concurrent env access.
        unsafe { std::env::set_var("HARNESS_DUMP_PROBE", "before") };

        dump_environment(file.path()).unwrap();
        let content = fs::read_to_string(file.path()).unwrap();
        assert!(content.lines().any(|l| l == "HARNESS_DUMP_PROBE=before"));

        update_env_file(file.path(), &[("HARNESS_DUMP_PROBE", "after")]).unwrap();
        let content = fs::read_to_string(file.path()).unwrap();
        assert!(content.lines().any(|l| l == "HARNESS_DUMP_PROBE=after"));
    }

    #[test]
    fn test_line_around_extracts_full_line() {
        let text = "first\nsecond line here\nthird";
        let at = text.find("line").unwrap();
        assert_eq!(line_around(text, at), "second line here");
    }
}
