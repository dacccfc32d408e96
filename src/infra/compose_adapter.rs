use crate::config::HarnessConfig;
use crate::domain::{CommandResult, ComposeRuntime, ContainerRecord, InspectRecord};
use crate::error::Result;
use crate::infra::command::CommandRunner;
use crate::infra::parse::{parse_inspect, parse_listing};
use tracing::debug;

/// Drives a deployment through the compose CLI, with container-level
/// operations going through the container runtime's own CLI. Every
/// compose invocation is scoped to one compose file and one project
/// namespace, fixed for the adapter's lifetime.
#[derive(Debug)]
pub struct ComposeAdapter {
    compose: CommandRunner,
    docker: CommandRunner,
    project: String,
    compose_file: String,
}

impl ComposeAdapter {
    pub fn new(config: &HarnessConfig, project: &str, compose_file: &str) -> Self {
        Self {
            compose: CommandRunner::new(&config.compose_bin),
            docker: CommandRunner::new(&config.docker_bin),
            project: project.to_string(),
            compose_file: compose_file.to_string(),
        }
    }

    /// Echo every CLI invocation's output to the log.
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.compose = self.compose.verbose(verbose);
        self.docker = self.docker.verbose(verbose);
        self
    }

    fn compose_args<'a>(&'a self, tail: &[&'a str]) -> Vec<&'a str> {
        let mut args = vec!["-f", self.compose_file.as_str()];
        if !self.project.is_empty() {
            args.push("-p");
            args.push(self.project.as_str());
        }
        args.extend_from_slice(tail);
        args
    }

    fn service_prefix(&self, service: &str) -> String {
        if self.project.is_empty() {
            format!("{service}_")
        } else {
            format!("{}_{service}_", self.project)
        }
    }
}

impl ComposeRuntime for ComposeAdapter {
    fn up(&self) -> Result<()> {
        self.compose.run(self.compose_args(&["up", "-d"]))?;
        Ok(())
    }

    fn ps(&self, service: Option<&str>) -> Result<Vec<ContainerRecord>> {
        let result = self.compose.run(self.compose_args(&["ps"]))?;
        let mut records = parse_listing(&result.stdout)?;

        if let Some(service) = service {
            let prefix = self.service_prefix(service);
            records.retain(|r| r.name.starts_with(&prefix));
        }

        debug!("listed {} container(s)", records.len());
        Ok(records)
    }

    fn scale(&self, service: &str, count: u32) -> Result<()> {
        let setting = format!("{service}={count}");
        self.compose
            .run(self.compose_args(&["scale", setting.as_str()]))?;
        Ok(())
    }

    fn stop(&self, service: Option<&str>) -> Result<()> {
        let mut args = vec!["stop"];
        args.extend(service);
        self.compose.run(self.compose_args(&args))?;
        Ok(())
    }

    fn rm(&self, service: Option<&str>) -> Result<()> {
        let mut args = vec!["rm", "-f"];
        args.extend(service);
        self.compose.run(self.compose_args(&args))?;
        Ok(())
    }

    fn stop_container(&self, container: &str) -> Result<()> {
        self.docker.run(["stop", container])?;
        Ok(())
    }

    fn logs(&self, container: &str, since: Option<&str>) -> Result<String> {
        let mut args = vec!["logs"];
        if let Some(since) = since {
            args.push("--since");
            args.push(since);
        }
        args.push(container);

        let result = self.docker.run(args)?;
        Ok(result.combined_output())
    }

    fn exec(&self, container: &str, argv: &[&str]) -> Result<CommandResult> {
        let mut args = vec!["exec", container];
        args.extend_from_slice(argv);
        self.docker.run_unchecked(args)
    }

    fn inspect(&self, container: &str) -> Result<Vec<InspectRecord>> {
        let result = self.docker.run(["inspect", container])?;
        parse_inspect(&result.stdout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter() -> ComposeAdapter {
        ComposeAdapter::new(&HarnessConfig::default(), "app", "docker-compose.yml")
    }

    #[test]
    fn test_compose_args_carry_file_and_project() {
        let adapter = adapter();
        assert_eq!(
            adapter.compose_args(&["up", "-d"]),
            vec!["-f", "docker-compose.yml", "-p", "app", "up", "-d"]
        );
    }

    #[test]
    fn test_empty_project_omits_namespace_flag() {
        let adapter = ComposeAdapter::new(&HarnessConfig::default(), "", "compose.yml");
        assert_eq!(adapter.compose_args(&["ps"]), vec!["-f", "compose.yml", "ps"]);
        assert_eq!(adapter.service_prefix("nginx"), "nginx_");
    }

    #[test]
    fn test_service_prefix_is_project_qualified() {
        assert_eq!(adapter().service_prefix("nginx"), "app_nginx_");
    }
}
