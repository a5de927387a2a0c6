//! Desired state for the Istio backend: one VirtualService per APIRule with
//! one HTTP route per distinct rule path.

use crate::processing::config::CorsConfig;
use crate::processing::processors::{VirtualServiceCreator, VirtualServiceProcessor};
use crate::processing::{
    classify, filter_duplicate_paths, host_local_domain, host_with_domain, owner_label_value,
    service_namespace, AccessClass, Error, ReconciliationConfig, OWNER_LABEL,
    OWNER_LABEL_V1ALPHA1,
};
use crds::{
    APIRule, CorsPolicy, Destination, HttpMatchRequest, HttpRoute, HttpRouteDestination,
    HeaderOperations, Headers, PortSelector, Rule, StringMatch, VirtualService,
    VirtualServiceSpec,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::ResourceExt;
use log::debug;
use std::collections::BTreeMap;
use std::time::Duration;

const WILDCARD_PATH: &str = "/*";
const FORWARDED_HOST_HEADER: &str = "x-forwarded-host";
const COOKIE_HEADER: &str = "Cookie";

pub fn new_virtual_service_processor(
    config: &ReconciliationConfig,
) -> VirtualServiceProcessor<IstioVirtualServiceCreator> {
    VirtualServiceProcessor::new(IstioVirtualServiceCreator::new(config))
}

#[derive(Clone, Debug)]
pub struct IstioVirtualServiceCreator {
    oathkeeper_svc: String,
    oathkeeper_svc_port: u32,
    cors_config: CorsConfig,
    default_domain_name: String,
    additional_labels: BTreeMap<String, String>,
    http_timeout: Duration,
}

impl IstioVirtualServiceCreator {
    pub fn new(config: &ReconciliationConfig) -> Self {
        Self {
            oathkeeper_svc: config.oathkeeper_svc.clone(),
            oathkeeper_svc_port: config.oathkeeper_svc_port,
            cors_config: config.cors_config.clone(),
            default_domain_name: config.default_domain_name.clone(),
            additional_labels: config.additional_labels.clone(),
            http_timeout: config.http_timeout(),
        }
    }

    fn http_route(&self, api: &APIRule, rule: &Rule, host: &str) -> Result<HttpRoute, Error> {
        let access = classify(rule);

        let destination = match access {
            AccessClass::Open | AccessClass::Jwt => {
                // Rule level service wins over the APIRule default.
                let service = rule
                    .service
                    .as_ref()
                    .or(api.spec.service.as_ref())
                    .ok_or_else(|| Error::MissingService {
                        path: rule.path.clone(),
                    })?;
                let namespace =
                    service_namespace(api, rule).ok_or(Error::MissingMetadata("namespace"))?;
                Destination {
                    host: host_local_domain(&service.name, &namespace),
                    port: Some(PortSelector {
                        number: service.port,
                    }),
                }
            }
            AccessClass::Proxied => Destination {
                host: self.oathkeeper_svc.clone(),
                port: Some(PortSelector {
                    number: self.oathkeeper_svc_port,
                }),
            },
        };
        debug!(
            "Routing {} ({:?}) to {}",
            rule.path, access, destination.host
        );

        // Paths are regexes already, they are not escaped.
        let uri = if rule.path == WILDCARD_PATH {
            StringMatch::Prefix("/".to_string())
        } else {
            StringMatch::Regex(rule.path.clone())
        };

        let mut request = HeaderOperations::default();
        request
            .set
            .insert(FORWARDED_HOST_HEADER.to_string(), host.to_string());

        // Other strategies are mutated by the auth proxy, not the mesh.
        if access == AccessClass::Jwt {
            let cookies = rule.cookie_mutator()?;
            if cookies.has_cookies() {
                request
                    .set
                    .insert(COOKIE_HEADER.to_string(), cookies.to_string());
            }

            let headers = rule.header_mutator()?;
            if headers.has_headers() {
                request.set.extend(headers.headers);
            }
        }

        Ok(HttpRoute {
            match_: vec![HttpMatchRequest { uri: Some(uri) }],
            route: vec![HttpRouteDestination {
                destination,
                weight: None,
            }],
            cors_policy: Some(CorsPolicy {
                allow_origins: self.cors_config.allow_origins.clone(),
                allow_methods: self.cors_config.allow_methods.clone(),
                allow_headers: self.cors_config.allow_headers.clone(),
            }),
            timeout: Some(format!("{}s", self.http_timeout.as_secs())),
            headers: Some(Headers {
                request: Some(request),
                response: None,
            }),
        })
    }
}

impl VirtualServiceCreator for IstioVirtualServiceCreator {
    fn create(&self, api: &APIRule) -> Result<VirtualService, Error> {
        let owner = owner_label_value(api)?;
        let host = host_with_domain(&api.spec.host, &self.default_domain_name);

        let http = filter_duplicate_paths(&api.spec.rules)
            .into_iter()
            .map(|rule| self.http_route(api, rule, &host))
            .collect::<Result<Vec<_>, _>>()?;

        // Extra labels never shadow ownership.
        let mut labels = self.additional_labels.clone();
        labels.insert(OWNER_LABEL.to_string(), owner.clone());
        labels.insert(OWNER_LABEL_V1ALPHA1.to_string(), owner);

        Ok(VirtualService {
            metadata: ObjectMeta {
                generate_name: Some(format!("{}-", api.name_any())),
                namespace: api.namespace(),
                labels: Some(labels),
                ..Default::default()
            },
            spec: VirtualServiceSpec {
                hosts: vec![host],
                gateways: vec![api.spec.gateway.clone()],
                http,
            },
        })
    }
}
