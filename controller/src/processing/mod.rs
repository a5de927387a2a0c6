pub mod config;
pub mod context;
pub mod istio;
pub mod processors;

use crds::{APIRule, MutatorError, Rule};
use kube::ResourceExt;
use std::collections::HashSet;
use thiserror::Error;

pub use config::ReconciliationConfig;
pub use context::Context;

/// Labels tying a generated object back to the APIRule that owns it.
pub const OWNER_LABEL: &str = "apirule.gateway.apigate.dev/v1beta1";
pub const OWNER_LABEL_V1ALPHA1: &str = "apirule.gateway.apigate.dev/v1alpha1";

const CLUSTER_LOCAL_DOMAIN: &str = "svc.cluster.local";

const ALLOW_HANDLER: &str = "allow";
const NO_AUTH_HANDLER: &str = "no_auth";
const JWT_HANDLER: &str = "jwt";

#[derive(Debug, Error)]
pub enum Error {
    #[error("APIRule is missing metadata.{0}")]
    MissingMetadata(&'static str),

    #[error("rule for path {path} has no service and the APIRule has no default service")]
    MissingService { path: String },

    #[error("{0}")]
    Mutator(#[from] MutatorError),

    #[error("unable to list owned objects: {0}")]
    ClusterRead(#[source] kube::Error),

    #[error("reconciliation cancelled")]
    Cancelled,

    #[error("reconciliation deadline exceeded")]
    DeadlineExceeded,
}

/// A single write the apply step has to perform.
#[derive(Clone, Debug, PartialEq)]
pub enum ObjectChange<K> {
    /// Create the full object. Its name is generated by the API server.
    Create(K),
    /// Replace an existing object, keeping its identity and resource version.
    Update(K),
}

impl<K> ObjectChange<K> {
    pub fn action(&self) -> &'static str {
        match self {
            ObjectChange::Create(_) => "create",
            ObjectChange::Update(_) => "update",
        }
    }

    pub fn object(&self) -> &K {
        match self {
            ObjectChange::Create(obj) | ObjectChange::Update(obj) => obj,
        }
    }
}

/// How a rule's requests are authenticated.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AccessClass {
    /// No authentication at all.
    Open,
    /// Tokens are validated by the mesh, traffic goes straight to the service.
    Jwt,
    /// Everything else goes through the auth proxy.
    Proxied,
}

pub fn classify(rule: &Rule) -> AccessClass {
    if rule
        .access_strategies
        .iter()
        .any(|s| s.handler == JWT_HANDLER)
    {
        return AccessClass::Jwt;
    }

    let open = rule.mutators.is_empty()
        && rule
            .access_strategies
            .iter()
            .all(|s| s.handler == ALLOW_HANDLER || s.handler == NO_AUTH_HANDLER);

    if open {
        AccessClass::Open
    } else {
        AccessClass::Proxied
    }
}

/// Keeps the first rule for every path, in declaration order.
pub fn filter_duplicate_paths(rules: &[Rule]) -> Vec<&Rule> {
    let mut seen = HashSet::new();
    rules
        .iter()
        .filter(|rule| seen.insert(rule.path.as_str()))
        .collect()
}

pub fn owner_label_value(api: &APIRule) -> Result<String, Error> {
    let namespace = api.namespace().ok_or(Error::MissingMetadata("namespace"))?;
    let name = api
        .metadata
        .name
        .as_deref()
        .ok_or(Error::MissingMetadata("name"))?;
    Ok(format!("{}.{}", name, namespace))
}

pub fn host_with_domain(host: &str, default_domain: &str) -> String {
    if default_domain.is_empty() || host.contains('.') {
        host.to_string()
    } else {
        format!("{}.{}", host, default_domain)
    }
}

pub fn host_local_domain(service: &str, namespace: &str) -> String {
    format!("{}.{}.{}", service, namespace, CLUSTER_LOCAL_DOMAIN)
}

/// Rule service namespace, then the default service namespace, then the
/// APIRule's own namespace.
pub fn service_namespace(api: &APIRule, rule: &Rule) -> Option<String> {
    rule.service
        .as_ref()
        .and_then(|s| s.namespace.clone())
        .or_else(|| api.spec.service.as_ref().and_then(|s| s.namespace.clone()))
        .or_else(|| api.namespace())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crds::{APIRuleSpec, Handler, Service};

    pub(crate) fn service(name: &str, port: u32) -> Service {
        Service {
            name: name.to_string(),
            port,
            namespace: None,
        }
    }

    pub(crate) fn rule(path: &str, strategies: &[&str]) -> Rule {
        Rule {
            path: path.to_string(),
            access_strategies: strategies.iter().map(|s| Handler::new(s)).collect(),
            ..Default::default()
        }
    }

    pub(crate) fn api_rule(rules: Vec<Rule>) -> APIRule {
        let mut api = APIRule::new(
            "httpbin",
            APIRuleSpec {
                host: "httpbin".to_string(),
                gateway: "istio-system/apigate-gateway".to_string(),
                service: Some(service("httpbin", 8000)),
                rules,
            },
        );
        api.metadata.namespace = Some("default".to_string());
        api
    }

    #[test]
    fn classifies_access_strategies() {
        assert_eq!(classify(&rule("/", &[])), AccessClass::Open);
        assert_eq!(classify(&rule("/", &["allow"])), AccessClass::Open);
        assert_eq!(classify(&rule("/", &["no_auth"])), AccessClass::Open);
        assert_eq!(classify(&rule("/", &["jwt"])), AccessClass::Jwt);
        assert_eq!(classify(&rule("/", &["noop", "jwt"])), AccessClass::Jwt);
        assert_eq!(classify(&rule("/", &["noop"])), AccessClass::Proxied);
        assert_eq!(
            classify(&rule("/", &["oauth2_introspection"])),
            AccessClass::Proxied
        );

        let mut allow_with_mutators = rule("/", &["allow"]);
        allow_with_mutators.mutators = vec![Handler::new("id_token")];
        assert_eq!(classify(&allow_with_mutators), AccessClass::Proxied);
    }

    #[test]
    fn filters_duplicate_paths_keeping_first() {
        let rules = vec![
            rule("/a", &["allow"]),
            rule("/b", &["jwt"]),
            rule("/a", &["noop"]),
        ];

        let filtered = filter_duplicate_paths(&rules);
        assert_eq!(filtered.len(), 2);
        assert_eq!(filtered[0].path, "/a");
        assert_eq!(filtered[0].access_strategies[0].handler, "allow");
        assert_eq!(filtered[1].path, "/b");
    }

    #[test]
    fn owner_label_uses_name_and_namespace() {
        assert_eq!(
            owner_label_value(&api_rule(vec![])).unwrap(),
            "httpbin.default"
        );
    }

    #[test]
    fn owner_label_requires_namespace() {
        let mut api = api_rule(vec![]);
        api.metadata.namespace = None;
        assert!(matches!(
            owner_label_value(&api),
            Err(Error::MissingMetadata("namespace"))
        ));
    }

    #[test]
    fn appends_default_domain_to_short_hosts() {
        assert_eq!(host_with_domain("httpbin", "apigate.local"), "httpbin.apigate.local");
        assert_eq!(
            host_with_domain("httpbin.example.com", "apigate.local"),
            "httpbin.example.com"
        );
        assert_eq!(host_with_domain("httpbin", ""), "httpbin");
    }

    #[test]
    fn resolves_service_namespace() {
        let mut api = api_rule(vec![]);
        let mut r = rule("/", &[]);
        assert_eq!(service_namespace(&api, &r).as_deref(), Some("default"));

        api.spec.service.as_mut().unwrap().namespace = Some("backend".to_string());
        assert_eq!(service_namespace(&api, &r).as_deref(), Some("backend"));

        r.service = Some(Service {
            namespace: Some("override".to_string()),
            ..service("other", 80)
        });
        assert_eq!(service_namespace(&api, &r).as_deref(), Some("override"));
    }
}
