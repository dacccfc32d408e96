use crate::domain::{
    CommandResult, ComposeRuntime, ContainerRecord, HealthInstance, InspectRecord,
    RegistryKeyValue, ServiceRegistry,
};
use crate::error::{HarnessError, Result};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

/// Shorthand for building listing records in tests.
pub fn container(name: &str, state: &str) -> ContainerRecord {
    ContainerRecord::new(name, "/bin/app", state, Vec::new())
}

/// Shorthand for building health-catalog instances in tests.
pub fn instance(service: &str, ordinal: u32) -> HealthInstance {
    HealthInstance {
        id: format!("{service}-{ordinal}"),
        service: service.to_string(),
        address: format!("10.0.0.{ordinal}"),
        port: 8080,
        node: format!("node-{ordinal}"),
    }
}

/// A queue of scripted observations. Each read pops the next one; once
/// the queue drains, the last observation repeats forever, which is how
/// an external system looks to a poller after it stops changing.
#[derive(Debug)]
struct Script<T> {
    queue: VecDeque<T>,
    stable: Option<T>,
}

impl<T: Clone> Script<T> {
    fn new() -> Self {
        Self {
            queue: VecDeque::new(),
            stable: None,
        }
    }

    fn push(&mut self, observation: T) {
        self.queue.push_back(observation);
    }

    fn set_stable(&mut self, observation: T) {
        self.queue.clear();
        self.stable = Some(observation);
    }

    fn next(&mut self) -> Option<T> {
        match self.queue.pop_front() {
            Some(observation) => {
                self.stable = Some(observation.clone());
                Some(observation)
            }
            None => self.stable.clone(),
        }
    }
}

impl<T: Clone> Default for Script<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Scripted stand-in for the orchestration CLI. Records every call,
/// serves scripted listing/log observations, and can be told to fail a
/// named operation.
#[derive(Debug)]
pub struct MockCompose {
    ps: Mutex<Script<Vec<ContainerRecord>>>,
    // Value of None scripts the container as gone.
    logs: Mutex<HashMap<String, Script<Option<String>>>>,
    exec_results: Mutex<HashMap<String, CommandResult>>,
    inspect_results: Mutex<HashMap<String, Vec<InspectRecord>>>,
    commands: Mutex<Vec<String>>,
    fail_on: Mutex<Option<String>>,
}

impl MockCompose {
    pub fn new() -> Self {
        Self {
            ps: Mutex::new(Script::new()),
            logs: Mutex::new(HashMap::new()),
            exec_results: Mutex::new(HashMap::new()),
            inspect_results: Mutex::new(HashMap::new()),
            commands: Mutex::new(Vec::new()),
            fail_on: Mutex::new(None),
        }
    }

    /// The listing every `ps` call sees from now on.
    pub fn set_containers(&self, records: Vec<ContainerRecord>) {
        self.ps.lock().unwrap().set_stable(records);
    }

    /// One listing observation; consumed in order by successive `ps`
    /// calls, after which the last one repeats.
    pub fn push_ps_observation(&self, records: Vec<ContainerRecord>) {
        self.ps.lock().unwrap().push(records);
    }

    /// One full log stream observation for a container.
    pub fn push_logs(&self, name: &str, stream: &str) {
        self.logs
            .lock()
            .unwrap()
            .entry(name.to_string())
            .or_default()
            .push(Some(stream.to_string()));
    }

    /// Scripts the container as gone from this observation on.
    pub fn push_logs_gone(&self, name: &str) {
        self.logs
            .lock()
            .unwrap()
            .entry(name.to_string())
            .or_default()
            .push(None);
    }

    pub fn set_exec_result(&self, name: &str, result: CommandResult) {
        self.exec_results
            .lock()
            .unwrap()
            .insert(name.to_string(), result);
    }

    pub fn set_inspect(&self, name: &str, records: Vec<InspectRecord>) {
        self.inspect_results
            .lock()
            .unwrap()
            .insert(name.to_string(), records);
    }

    /// Makes the named operation fail with a client error.
    pub fn set_fail_on(&self, operation: &str) {
        *self.fail_on.lock().unwrap() = Some(operation.to_string());
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }

    pub fn calls_to(&self, operation: &str) -> usize {
        self.commands
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.split(':').next() == Some(operation))
            .count()
    }

    fn record(&self, command: &str) {
        self.commands.lock().unwrap().push(command.to_string());
    }

    fn check_fail(&self, operation: &str) -> Result<()> {
        if self.fail_on.lock().unwrap().as_deref() == Some(operation) {
            return Err(HarnessError::Client {
                command: format!("mock {operation}"),
                status: 1,
                stderr: format!("injected failure on {operation}"),
            });
        }
        Ok(())
    }
}

impl Default for MockCompose {
    fn default() -> Self {
        Self::new()
    }
}

impl ComposeRuntime for MockCompose {
    fn up(&self) -> Result<()> {
        self.record("up");
        self.check_fail("up")
    }

    fn ps(&self, service: Option<&str>) -> Result<Vec<ContainerRecord>> {
        self.record(&format!("ps:{}", service.unwrap_or("*")));
        self.check_fail("ps")?;

        let mut records = self.ps.lock().unwrap().next().unwrap_or_default();
        if let Some(service) = service {
            let infix = format!("_{service}_");
            let prefix = format!("{service}_");
            records.retain(|r| r.name.contains(&infix) || r.name.starts_with(&prefix));
        }
        Ok(records)
    }

    fn scale(&self, service: &str, count: u32) -> Result<()> {
        self.record(&format!("scale:{service}={count}"));
        self.check_fail("scale")
    }

    fn stop(&self, service: Option<&str>) -> Result<()> {
        self.record(&format!("stop:{}", service.unwrap_or("*")));
        self.check_fail("stop")
    }

    fn rm(&self, service: Option<&str>) -> Result<()> {
        self.record(&format!("rm:{}", service.unwrap_or("*")));
        self.check_fail("rm")
    }

    fn stop_container(&self, container: &str) -> Result<()> {
        self.record(&format!("stop_container:{container}"));
        self.check_fail("stop_container")
    }

    fn logs(&self, container: &str, _since: Option<&str>) -> Result<String> {
        self.record(&format!("logs:{container}"));
        self.check_fail("logs")?;

        let next = self
            .logs
            .lock()
            .unwrap()
            .get_mut(container)
            .and_then(Script::next);
        match next {
            Some(Some(stream)) => Ok(stream),
            Some(None) | None => Err(HarnessError::Client {
                command: format!("mock logs {container}"),
                status: 1,
                stderr: format!("no such container: {container}"),
            }),
        }
    }

    fn exec(&self, container: &str, argv: &[&str]) -> Result<CommandResult> {
        self.record(&format!("exec:{container}:{}", argv.join(" ")));
        self.check_fail("exec")?;

        Ok(self
            .exec_results
            .lock()
            .unwrap()
            .get(container)
            .cloned()
            .unwrap_or(CommandResult {
                status: 0,
                stdout: String::new(),
                stderr: String::new(),
            }))
    }

    fn inspect(&self, container: &str) -> Result<Vec<InspectRecord>> {
        self.record(&format!("inspect:{container}"));
        self.check_fail("inspect")?;

        self.inspect_results
            .lock()
            .unwrap()
            .get(container)
            .cloned()
            .ok_or_else(|| HarnessError::Client {
                command: format!("mock inspect {container}"),
                status: 1,
                stderr: format!("no such container: {container}"),
            })
    }
}

/// Scripted stand-in for the service registry.
#[derive(Debug)]
pub struct MockRegistry {
    kv: Mutex<HashMap<String, String>>,
    checks: Mutex<HashMap<String, String>>,
    health: Mutex<HashMap<String, Script<Vec<HealthInstance>>>>,
    commands: Mutex<Vec<String>>,
    fail_transport_on: Mutex<Option<String>>,
}

impl MockRegistry {
    pub fn new() -> Self {
        Self {
            kv: Mutex::new(HashMap::new()),
            checks: Mutex::new(HashMap::new()),
            health: Mutex::new(HashMap::new()),
            commands: Mutex::new(Vec::new()),
            fail_transport_on: Mutex::new(None),
        }
    }

    pub fn set_key(&self, key: &str, value: &str) {
        self.kv
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
    }

    pub fn set_check(&self, check_id: &str, status: &str) {
        self.checks
            .lock()
            .unwrap()
            .insert(check_id.to_string(), status.to_string());
    }

    /// The health catalog every query sees from now on.
    pub fn set_health(&self, service: &str, instances: Vec<HealthInstance>) {
        self.health
            .lock()
            .unwrap()
            .entry(service.to_string())
            .or_default()
            .set_stable(instances);
    }

    /// One health-catalog observation; consumed in order by successive
    /// queries, after which the last one repeats.
    pub fn push_health_observation(&self, service: &str, instances: Vec<HealthInstance>) {
        self.health
            .lock()
            .unwrap()
            .entry(service.to_string())
            .or_default()
            .push(instances);
    }

    /// Makes the named operation fail at the transport level.
    pub fn set_fail_transport_on(&self, operation: &str) {
        *self.fail_transport_on.lock().unwrap() = Some(operation.to_string());
    }

    pub fn calls_to(&self, operation: &str) -> usize {
        self.commands
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.split(':').next() == Some(operation))
            .count()
    }

    fn record(&self, command: &str) {
        self.commands.lock().unwrap().push(command.to_string());
    }

    fn check_fail(&self, operation: &str) -> Result<()> {
        if self.fail_transport_on.lock().unwrap().as_deref() == Some(operation) {
            return Err(HarnessError::Transport {
                message: format!("injected transport failure on {operation}"),
            });
        }
        Ok(())
    }
}

impl Default for MockRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceRegistry for MockRegistry {
    fn get_key(&self, key: &str) -> Result<RegistryKeyValue> {
        self.record(&format!("get_key:{key}"));
        self.check_fail("get_key")?;

        Ok(RegistryKeyValue {
            key: key.to_string(),
            value: self.kv.lock().unwrap().get(key).cloned(),
        })
    }

    fn is_check_passing(&self, check_id: &str) -> Result<bool> {
        self.record(&format!("is_check_passing:{check_id}"));
        self.check_fail("is_check_passing")?;

        Ok(self
            .checks
            .lock()
            .unwrap()
            .get(check_id)
            .is_some_and(|status| status.eq_ignore_ascii_case("passing")))
    }

    fn service_health(&self, service: &str) -> Result<Vec<HealthInstance>> {
        self.record(&format!("service_health:{service}"));
        self.check_fail("service_health")?;

        Ok(self
            .health
            .lock()
            .unwrap()
            .get_mut(service)
            .and_then(Script::next)
            .unwrap_or_default())
    }

    fn service_addresses(&self, service: &str) -> Result<Vec<String>> {
        let addresses = self
            .service_health(service)?
            .into_iter()
            .map(|instance| instance.address)
            .filter(|addr| !addr.is_empty())
            .collect();
        Ok(addresses)
    }
}
