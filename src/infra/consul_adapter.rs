use crate::domain::{HealthInstance, RegistryCheck, RegistryKeyValue, ServiceRegistry};
use crate::error::{HarnessError, Result};
use base64::Engine;
use reqwest::StatusCode;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

/// Blocking HTTP client for a Consul-compatible registry: key/value
/// lookups, agent-level checks and the service health catalog. A
/// missing key or an empty catalog is a valid answer; only
/// connection-level failures surface as errors.
#[derive(Debug)]
pub struct ConsulAdapter {
    base_url: String,
    client: reqwest::blocking::Client,
}

impl ConsulAdapter {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    /// Convenience constructor for a bare host on the default port.
    pub fn for_host(host: &str, timeout: Duration) -> Result<Self> {
        Self::new(&format!("http://{host}:8500"), timeout)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn get_text(&self, path: &str) -> Result<String> {
        let url = format!("{}{path}", self.base_url);
        let resp = self.client.get(&url).send()?.error_for_status()?;
        Ok(resp.text()?)
    }
}

impl ServiceRegistry for ConsulAdapter {
    fn get_key(&self, key: &str) -> Result<RegistryKeyValue> {
        let url = format!("{}/v1/kv/{key}", self.base_url);
        let resp = self.client.get(&url).send()?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(RegistryKeyValue::absent(key));
        }

        let body = resp.error_for_status()?.text()?;
        decode_kv_envelope(key, &body)
    }

    fn is_check_passing(&self, check_id: &str) -> Result<bool> {
        let body = self.get_text("/v1/agent/checks")?;

        match decode_checks(&body) {
            Some(checks) => Ok(checks
                .get(check_id)
                .map(RegistryCheck::is_passing)
                .unwrap_or(false)),
            None => {
                debug!("unreadable checks payload, treating {check_id} as not passing");
                Ok(false)
            }
        }
    }

    fn service_health(&self, service: &str) -> Result<Vec<HealthInstance>> {
        let body = self.get_text(&format!("/v1/health/service/{service}?passing"))?;
        decode_health(&body)
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

#[derive(Deserialize)]
struct KvEntry {
    #[serde(rename = "Value")]
    value: Option<String>,
}

#[derive(Deserialize)]
struct CheckEntry {
    #[serde(rename = "Status", default)]
    status: String,
}

#[derive(Deserialize)]
struct HealthEntry {
    #[serde(rename = "Node", default)]
    node: NodeEntry,
    #[serde(rename = "Service", default)]
    service: ServiceEntry,
}

#[derive(Deserialize, Default)]
struct NodeEntry {
    #[serde(rename = "Node", default)]
    node: String,
    #[serde(rename = "Address", default)]
    address: String,
}

#[derive(Deserialize, Default)]
struct ServiceEntry {
    #[serde(rename = "ID", default)]
    id: String,
    #[serde(rename = "Service", default)]
    service: String,
    #[serde(rename = "Address", default)]
    address: String,
    #[serde(rename = "Port", default)]
    port: u16,
}

/// The KV endpoint answers with an envelope array whose `Value` field
/// is base64 on current servers but raw text on some older ones. A
/// present key whose value fails base64 decoding is passed through
/// unchanged rather than rejected.
fn decode_kv_envelope(key: &str, body: &str) -> Result<RegistryKeyValue> {
    let entries: Vec<KvEntry> =
        serde_json::from_str(body).map_err(|_| HarnessError::parse("registry kv envelope", body))?;

    let value = match entries.into_iter().next().and_then(|e| e.value) {
        Some(raw) => match base64::engine::general_purpose::STANDARD.decode(&raw) {
            Ok(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
            Err(_) => Some(raw),
        },
        None => None,
    };

    Ok(RegistryKeyValue {
        key: key.to_string(),
        value,
    })
}

fn decode_checks(body: &str) -> Option<HashMap<String, RegistryCheck>> {
    let entries: HashMap<String, CheckEntry> = serde_json::from_str(body).ok()?;
    Some(
        entries
            .into_iter()
            .map(|(check_id, entry)| {
                let check = RegistryCheck {
                    check_id: check_id.clone(),
                    status: entry.status,
                };
                (check_id, check)
            })
            .collect(),
    )
}

fn decode_health(body: &str) -> Result<Vec<HealthInstance>> {
    let entries: Vec<HealthEntry> = serde_json::from_str(body)
        .map_err(|_| HarnessError::parse("registry health catalog", body))?;

    Ok(entries
        .into_iter()
        .map(|entry| {
            // Instances registered without an explicit address fall back
            // to the node's address, matching the registry's own rules.
            let address = if entry.service.address.is_empty() {
                entry.node.address
            } else {
                entry.service.address
            };
            HealthInstance {
                id: entry.service.id,
                service: entry.service.service,
                address,
                port: entry.service.port,
                node: entry.node.node,
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kv_envelope_decodes_base64_value() {
        // "hello" in base64
        let body = r#"[{"Key": "app/password", "Value": "aGVsbG8="}]"#;
        let kv = decode_kv_envelope("app/password", body).unwrap();
        assert!(kv.present());
        assert_eq!(kv.value.as_deref(), Some("hello"));
    }

    #[test]
    fn test_kv_envelope_passes_raw_value_through() {
        let body = r#"[{"Key": "app/flag", "Value": "not/base64!"}]"#;
        let kv = decode_kv_envelope("app/flag", body).unwrap();
        assert_eq!(kv.value.as_deref(), Some("not/base64!"));
    }

    #[test]
    fn test_kv_envelope_null_value_is_absent() {
        let body = r#"[{"Key": "app/empty", "Value": null}]"#;
        let kv = decode_kv_envelope("app/empty", body).unwrap();
        assert!(!kv.present());
    }

    #[test]
    fn test_kv_envelope_malformed_is_parse_error() {
        let err = decode_kv_envelope("k", "<html>boom</html>").unwrap_err();
        assert!(matches!(err, HarnessError::Parse { .. }));
    }

    #[test]
    fn test_checks_payload_lookup() {
        let body = r#"{
            "service:app_nginx_1": {"Status": "passing"},
            "service:app_db_1": {"Status": "critical"}
        }"#;
        let checks = decode_checks(body).unwrap();
        assert!(checks["service:app_nginx_1"].is_passing());
        assert!(!checks["service:app_db_1"].is_passing());
        assert!(checks.get("service:missing_1").is_none());
    }

    #[test]
    fn test_malformed_checks_payload_is_none() {
        assert!(decode_checks("[]").is_none());
        assert!(decode_checks("garbage").is_none());
    }

    #[test]
    fn test_health_catalog_address_fallback() {
        let body = r#"[
            {
                "Node": {"Node": "node-1", "Address": "10.0.0.5"},
                "Service": {"ID": "nginx-1", "Service": "nginx", "Address": "", "Port": 80}
            },
            {
                "Node": {"Node": "node-2", "Address": "10.0.0.6"},
                "Service": {"ID": "nginx-2", "Service": "nginx", "Address": "192.168.1.7", "Port": 80}
            }
        ]"#;
        let instances = decode_health(body).unwrap();
        assert_eq!(instances.len(), 2);
        assert_eq!(instances[0].address, "10.0.0.5");
        assert_eq!(instances[1].address, "192.168.1.7");
        assert_eq!(instances[1].port, 80);
    }

    #[test]
    fn test_empty_health_catalog_is_valid() {
        assert!(decode_health("[]").unwrap().is_empty());
    }
}
