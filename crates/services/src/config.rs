use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_BASE_URL: &str = "https://psychologytestbe-production.up.railway.app/api/v1";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(12);

/// How the device's backend user is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IdentityPolicy {
    /// Always ask the backend for users bound to the device first.
    #[default]
    ServerReconciling,
    /// Trust a locally cached user id without contacting the backend.
    LocalCacheFirst,
}

impl IdentityPolicy {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            IdentityPolicy::ServerReconciling => "server-reconciling",
            IdentityPolicy::LocalCacheFirst => "local-cache-first",
        }
    }
}

impl fmt::Display for IdentityPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown identity policy `{0}` (expected server-reconciling or local-cache-first)")]
pub struct ParsePolicyError(String);

impl FromStr for IdentityPolicy {
    type Err = ParsePolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "server-reconciling" | "server" => Ok(IdentityPolicy::ServerReconciling),
            "local-cache-first" | "local" => Ok(IdentityPolicy::LocalCacheFirst),
            other => Err(ParsePolicyError(other.to_owned())),
        }
    }
}

/// Backend and identity settings shared by the API-facing services.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApiConfig {
    pub base_url: String,
    pub timeout: Duration,
    pub identity_policy: IdentityPolicy,
    /// Platform-provided installation id; a timestamp token is generated when absent.
    pub platform_device_id: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.into(),
            timeout: DEFAULT_TIMEOUT,
            identity_policy: IdentityPolicy::default(),
            platform_device_id: None,
        }
    }
}

impl ApiConfig {
    /// Read `PSY_API_BASE_URL`, `PSY_API_TIMEOUT_SECS`, `PSY_IDENTITY_POLICY`
    /// and `PSY_DEVICE_ID`, falling back to defaults for missing or invalid values.
    #[must_use]
    pub fn from_env() -> Self {
        let lookup = |key: &str| env::var(key).ok();
        Self::from_lookup(lookup)
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let base_url = lookup("PSY_API_BASE_URL")
            .filter(|value| !value.trim().is_empty())
            .unwrap_or(defaults.base_url);
        let timeout = lookup("PSY_API_TIMEOUT_SECS")
            .and_then(|value| value.trim().parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .map_or(defaults.timeout, Duration::from_secs);
        let identity_policy = lookup("PSY_IDENTITY_POLICY")
            .and_then(|value| value.parse().ok())
            .unwrap_or(defaults.identity_policy);
        let platform_device_id = lookup("PSY_DEVICE_ID").filter(|value| !value.trim().is_empty());

        Self {
            base_url,
            timeout,
            identity_policy,
            platform_device_id,
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    #[must_use]
    pub fn with_identity_policy(mut self, policy: IdentityPolicy) -> Self {
        self.identity_policy = policy;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> ApiConfig {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        ApiConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn empty_environment_uses_defaults() {
        assert_eq!(config_from(&[]), ApiConfig::default());
    }

    #[test]
    fn environment_overrides_are_applied() {
        let config = config_from(&[
            ("PSY_API_BASE_URL", "http://localhost:8080/api/v1"),
            ("PSY_API_TIMEOUT_SECS", "3"),
            ("PSY_IDENTITY_POLICY", "local-cache-first"),
            ("PSY_DEVICE_ID", "ios-abc"),
        ]);
        assert_eq!(config.base_url, "http://localhost:8080/api/v1");
        assert_eq!(config.timeout, Duration::from_secs(3));
        assert_eq!(config.identity_policy, IdentityPolicy::LocalCacheFirst);
        assert_eq!(config.platform_device_id.as_deref(), Some("ios-abc"));
    }

    #[test]
    fn invalid_values_fall_back() {
        let config = config_from(&[
            ("PSY_API_TIMEOUT_SECS", "0"),
            ("PSY_IDENTITY_POLICY", "whatever"),
            ("PSY_DEVICE_ID", "  "),
        ]);
        assert_eq!(config.timeout, DEFAULT_TIMEOUT);
        assert_eq!(config.identity_policy, IdentityPolicy::ServerReconciling);
        assert!(config.platform_device_id.is_none());
    }

    #[test]
    fn policy_parses_and_displays() {
        assert_eq!(
            " Server-Reconciling ".parse::<IdentityPolicy>().unwrap(),
            IdentityPolicy::ServerReconciling
        );
        assert_eq!(
            "local".parse::<IdentityPolicy>().unwrap(),
            IdentityPolicy::LocalCacheFirst
        );
        assert_eq!(IdentityPolicy::LocalCacheFirst.to_string(), "local-cache-first");
        assert!("nope".parse::<IdentityPolicy>().is_err());
    }

    #[test]
    fn unknown_policy_error_names_the_input() {
        let err = "Nope".parse::<IdentityPolicy>().unwrap_err();
        let boxed: Box<dyn std::error::Error> = Box::new(err.clone());
        assert_eq!(
            boxed.to_string(),
            "unknown identity policy `nope` (expected server-reconciling or local-cache-first)"
        );
        assert_eq!(err, ParsePolicyError("nope".into()));
    }

    #[test]
    fn policy_serializes_kebab_case() {
        let json = serde_json::to_string(&IdentityPolicy::ServerReconciling).unwrap();
        assert_eq!(json, "\"server-reconciling\"");
    }
}
