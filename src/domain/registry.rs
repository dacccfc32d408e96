/// A key lookup result. Absence is a valid, error-free outcome kept
/// distinct from transport failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryKeyValue {
    pub key: String,
    pub value: Option<String>,
}

impl RegistryKeyValue {
    pub fn absent(key: &str) -> Self {
        Self {
            key: key.to_string(),
            value: None,
        }
    }

    pub fn present(&self) -> bool {
        self.value.is_some()
    }
}

/// One instance of a service as the registry's health catalog reports
/// it. Only instances with passing checks are surfaced to callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthInstance {
    pub id: String,
    pub service: String,
    pub address: String,
    pub port: u16,
    pub node: String,
}

/// A single health check record from the registry agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryCheck {
    pub check_id: String,
    pub status: String,
}

impl RegistryCheck {
    /// Anything other than an explicit `passing` status counts as not
    /// passing, since callers poll these for readiness.
    pub fn is_passing(&self) -> bool {
        self.status.eq_ignore_ascii_case("passing")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_key_is_not_present() {
        let kv = RegistryKeyValue::absent("services/app/password");
        assert!(!kv.present());
        assert_eq!(kv.key, "services/app/password");
    }

    #[test]
    fn test_check_status_interpretation() {
        let passing = RegistryCheck {
            check_id: "service:app_nginx_1".to_string(),
            status: "passing".to_string(),
        };
        let warning = RegistryCheck {
            check_id: "service:app_nginx_1".to_string(),
            status: "warning".to_string(),
        };
        assert!(passing.is_passing());
        assert!(!warning.is_passing());
    }
}
