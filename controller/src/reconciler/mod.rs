use crate::k8s::apply::apply;
use crate::processing::istio::{new_virtual_service_processor, IstioVirtualServiceCreator};
use crate::processing::processors::VirtualServiceProcessor;
use crate::processing::{Context, ReconciliationConfig};
use anyhow::anyhow;
use crds::APIRule;
use futures_util::future::BoxFuture;
use kube::ResourceExt;
use log::debug;
use pingora::server::ShutdownWatch;
use std::sync::Arc;
use std::time::Duration;

/// Runs one reconciliation pass per APIRule event and applies its result.
pub struct Reconciler {
    processor: Arc<VirtualServiceProcessor<IstioVirtualServiceCreator>>,
    timeout: Option<Duration>,
}

impl Reconciler {
    pub fn new(config: &ReconciliationConfig) -> Self {
        Self {
            processor: Arc::new(new_virtual_service_processor(config)),
            timeout: config.reconcile_timeout(),
        }
    }

    pub fn reconcile(
        &self,
    ) -> impl Fn(kube::client::Client, APIRule, ShutdownWatch) -> BoxFuture<'static, Result<(), anyhow::Error>>
           + Send
           + Sync
           + 'static {
        let processor = self.processor.clone();
        let timeout = self.timeout;
        move |k8s_client, api_rule, shutdown| {
            let processor = processor.clone();
            Box::pin(async move {
                let name = api_rule.name_any();
                let namespace = api_rule.namespace().unwrap_or_default();
                debug!("Reconciling APIRule '{}' in the {} namespace", name, namespace);

                let mut ctx = Context::new(shutdown);
                if let Some(timeout) = timeout {
                    ctx = ctx.with_timeout(timeout);
                }

                let changes = processor
                    .evaluate_reconciliation(&ctx, &k8s_client, &api_rule)
                    .await
                    .map_err(|e| anyhow!("APIRule '{}' in {}: {}", name, namespace, e))?;

                for change in changes {
                    let action = change.action();
                    apply(k8s_client.clone(), &api_rule, change).await?;
                    debug!(
                        "Applied {} for APIRule '{}' in the {} namespace",
                        action, name, namespace
                    );
                }

                Ok(())
            })
        }
    }
}
