use std::collections::BTreeMap;
use std::fmt;
use std::net::IpAddr;

/// Coarse classification of the state column reported by the
/// orchestration CLI. The raw label is kept alongside so nothing is
/// lost when a record is re-rendered into a failure message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateKind {
    Running,
    Exited,
    Restarting,
    Paused,
    Created,
    Dead,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerState {
    kind: StateKind,
    label: String,
}

impl ContainerState {
    /// Classifies a state label such as `Up`, `Up (healthy)`, `Exit 137`
    /// or `Restarting`. Labels introduced by newer tool versions fall
    /// through to `Unknown` instead of failing the parse.
    pub fn parse(label: &str) -> Self {
        let trimmed = label.trim();
        let head = trimmed
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();

        let kind = match head.as_str() {
            "up" | "running" => StateKind::Running,
            "exit" | "exited" => StateKind::Exited,
            "restarting" => StateKind::Restarting,
            "paused" => StateKind::Paused,
            "created" => StateKind::Created,
            "dead" => StateKind::Dead,
            _ => StateKind::Unknown,
        };

        Self {
            kind,
            label: trimmed.to_string(),
        }
    }

    pub fn kind(&self) -> StateKind {
        self.kind
    }

    pub fn is_running(&self) -> bool {
        self.kind == StateKind::Running
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

impl fmt::Display for ContainerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)
    }
}

/// One row of a container listing. Rebuilt on every poll; the name is
/// the only identity carried across polls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerRecord {
    pub name: String,
    pub command: String,
    pub state: ContainerState,
    pub ports: Vec<String>,
}

impl ContainerRecord {
    pub fn new(name: &str, command: &str, state: &str, ports: Vec<String>) -> Self {
        Self {
            name: name.to_string(),
            command: command.to_string(),
            state: ContainerState::parse(state),
            ports,
        }
    }
}

/// Normalized result of a container-runtime `inspect` call, independent
/// of which output generation the installed tool produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InspectRecord {
    pub id: String,
    pub name: String,
    pub state: String,
    pub ip_address: Option<String>,
    pub network_addresses: BTreeMap<String, String>,
}

impl InspectRecord {
    /// The first usable address: the default-network address when the
    /// runtime still reports one, otherwise the first named network.
    pub fn primary_address(&self) -> Option<&str> {
        self.ip_address
            .as_deref()
            .filter(|ip| !ip.is_empty())
            .or_else(|| {
                self.network_addresses
                    .values()
                    .map(String::as_str)
                    .find(|ip| !ip.is_empty())
            })
    }
}

/// Addresses a service answers on, split by reachability. Rebuilt on
/// every query, never cached.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceAddressSet {
    pub external: Vec<IpAddr>,
    pub internal: Vec<IpAddr>,
}

impl ServiceAddressSet {
    pub fn push(&mut self, addr: IpAddr) {
        if is_internal(&addr) {
            self.internal.push(addr);
        } else {
            self.external.push(addr);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.external.is_empty() && self.internal.is_empty()
    }
}

fn is_internal(addr: &IpAddr) -> bool {
    match addr {
        IpAddr::V4(v4) => v4.is_private() || v4.is_loopback() || v4.is_link_local(),
        IpAddr::V6(v6) => v6.is_loopback() || v6.is_unique_local() || v6.is_unicast_link_local(),
    }
}
