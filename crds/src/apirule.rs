use k8s_openapi::serde::{Deserialize, Serialize};
use kube::CustomResource;
use schemars::gen::SchemaGenerator;
use schemars::schema::{InstanceType, Schema, SchemaObject};
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

pub const COOKIE_MUTATOR: &str = "cookie";
pub const HEADER_MUTATOR: &str = "header";

#[derive(Debug, Clone, CustomResource, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "gateway.apigate.dev",
    version = "v1beta1",
    kind = "APIRule",
    doc = "APIRule exposes a service through an Istio gateway with per-path access rules",
    namespaced
)]
pub struct APIRuleSpec {
    /// Host of the exposed service, either a short name or a fully qualified domain.
    pub host: String,
    /// Gateway reference in the form `namespace/name`.
    pub gateway: String,
    /// Default backend for rules that don't override it.
    pub service: Option<Service>,
    pub rules: Vec<Rule>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Service {
    pub name: String,
    pub port: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    /// Literal path. `/*` matches everything, anything else is used as a regex.
    pub path: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub methods: Vec<String>,
    #[serde(default)]
    pub access_strategies: Vec<Handler>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<Service>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mutators: Vec<Handler>,
}

/// A named access strategy or mutator with its opaque configuration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Handler {
    pub handler: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "preserve_unknown_fields")]
    pub config: Option<serde_json::Value>,
}

fn preserve_unknown_fields(_: &mut SchemaGenerator) -> Schema {
    Schema::Object(SchemaObject {
        instance_type: Some(InstanceType::Object.into()),
        extensions: [(
            "x-kubernetes-preserve-unknown-fields".to_string(),
            serde_json::Value::Bool(true),
        )]
        .into_iter()
        .collect(),
        ..Default::default()
    })
}

impl Handler {
    pub fn new(handler: &str) -> Self {
        Self {
            handler: handler.to_string(),
            config: None,
        }
    }

    pub fn with_config(handler: &str, config: serde_json::Value) -> Self {
        Self {
            handler: handler.to_string(),
            config: Some(config),
        }
    }
}

#[derive(Debug, Error)]
pub enum MutatorError {
    #[error("invalid {handler} mutator config: {source}")]
    Config {
        handler: &'static str,
        source: serde_json::Error,
    },
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct CookieMutatorConfig {
    #[serde(default)]
    pub cookies: BTreeMap<String, String>,
}

impl CookieMutatorConfig {
    pub fn has_cookies(&self) -> bool {
        !self.cookies.is_empty()
    }
}

/// Renders the value of a `Cookie` request header.
impl fmt::Display for CookieMutatorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (name, value)) in self.cookies.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{}={}", name, value)?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct HeaderMutatorConfig {
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

impl HeaderMutatorConfig {
    pub fn has_headers(&self) -> bool {
        !self.headers.is_empty()
    }
}

impl Rule {
    pub fn cookie_mutator(&self) -> Result<CookieMutatorConfig, MutatorError> {
        self.mutator_config(COOKIE_MUTATOR)
    }

    pub fn header_mutator(&self) -> Result<HeaderMutatorConfig, MutatorError> {
        self.mutator_config(HEADER_MUTATOR)
    }

    fn mutator_config<T>(&self, handler: &'static str) -> Result<T, MutatorError>
    where
        T: DeserializeOwned + Default,
    {
        match self.mutators.iter().find(|m| m.handler == handler) {
            Some(Handler {
                config: Some(config),
                ..
            }) => serde_json::from_value(config.clone())
                .map_err(|source| MutatorError::Config { handler, source }),
            _ => Ok(T::default()),
        }
    }
}
