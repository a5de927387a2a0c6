use crds::StringMatch;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;

const DEFAULT_HTTP_TIMEOUT_SECONDS: u64 = 180;

/// Defaults shared by every reconciliation pass. Built once from the config
/// file and never mutated afterwards.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationConfig {
    /// Appended to APIRule hosts that aren't fully qualified.
    #[serde(default)]
    pub default_domain_name: String,
    /// Auth proxy that fronts every rule not routed straight to its service.
    pub oathkeeper_svc: String,
    pub oathkeeper_svc_port: u32,
    #[serde(default = "default_http_timeout_seconds")]
    pub http_timeout_seconds: u64,
    #[serde(default)]
    pub reconcile_timeout_seconds: Option<u64>,
    #[serde(default)]
    pub cors_config: CorsConfig,
    #[serde(default)]
    pub additional_labels: BTreeMap<String, String>,
}

fn default_http_timeout_seconds() -> u64 {
    DEFAULT_HTTP_TIMEOUT_SECONDS
}

impl ReconciliationConfig {
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_seconds)
    }

    pub fn reconcile_timeout(&self) -> Option<Duration> {
        self.reconcile_timeout_seconds.map(Duration::from_secs)
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CorsConfig {
    #[serde(default)]
    pub allow_origins: Vec<StringMatch>,
    #[serde(default)]
    pub allow_methods: Vec<String>,
    #[serde(default)]
    pub allow_headers: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allow_origins: vec![StringMatch::Regex(".*".to_string())],
            allow_methods: ["GET", "POST", "PUT", "DELETE", "PATCH"]
                .into_iter()
                .map(String::from)
                .collect(),
            allow_headers: ["Authorization", "Content-Type", "*"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_config_with_defaults() {
        let config: ReconciliationConfig = serde_yml::from_str(
            r#"
oathkeeperSvc: oathkeeper.apigate-system.svc.cluster.local
oathkeeperSvcPort: 4455
"#,
        )
        .unwrap();

        assert_eq!(config.default_domain_name, "");
        assert_eq!(config.http_timeout(), Duration::from_secs(180));
        assert_eq!(config.reconcile_timeout(), None);
        assert_eq!(config.cors_config, CorsConfig::default());
        assert!(config.additional_labels.is_empty());
    }

    #[test]
    fn parses_full_config() {
        let config: ReconciliationConfig = serde_yml::from_str(
            r#"
defaultDomainName: local.apigate.dev
oathkeeperSvc: oathkeeper.apigate-system.svc.cluster.local
oathkeeperSvcPort: 4455
httpTimeoutSeconds: 30
reconcileTimeoutSeconds: 10
corsConfig:
  allowOrigins:
    - exact: https://console.local.apigate.dev
    - prefix: https://app.
  allowMethods: [GET]
  allowHeaders: [Authorization]
additionalLabels:
  app.kubernetes.io/managed-by: apigate
"#,
        )
        .unwrap();

        assert_eq!(config.http_timeout(), Duration::from_secs(30));
        assert_eq!(config.reconcile_timeout(), Some(Duration::from_secs(10)));
        assert_eq!(
            config.cors_config.allow_origins,
            vec![
                StringMatch::Exact("https://console.local.apigate.dev".to_string()),
                StringMatch::Prefix("https://app.".to_string()),
            ]
        );
        assert_eq!(
            config.additional_labels.get("app.kubernetes.io/managed-by"),
            Some(&"apigate".to_string())
        );
    }
}
