use async_trait::async_trait;
use crds::VirtualService;
use kube::api::ListParams;
use kube::Api;
use std::collections::BTreeMap;

/// Read access to the VirtualServices of a namespace, narrowed by labels.
#[async_trait]
pub trait VirtualServiceLister: Send + Sync {
    async fn list(
        &self,
        namespace: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<VirtualService>, kube::Error>;
}

#[async_trait]
impl VirtualServiceLister for kube::Client {
    async fn list(
        &self,
        namespace: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<VirtualService>, kube::Error> {
        let api: Api<VirtualService> = Api::namespaced(self.clone(), namespace);
        let params = ListParams::default().labels(&label_selector(labels));
        Ok(api.list(&params).await?.items)
    }
}

/// Equality-based selector matching every given label.
pub fn label_selector(labels: &BTreeMap<String, String>) -> String {
    labels
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(",")
}
