use crate::k8s::Object;
use crate::processing::ObjectChange;
use anyhow::anyhow;
use crds::APIRule;
use k8s_openapi::NamespaceResourceScope;
use kube::api::PostParams;
use kube::{Api, Resource, ResourceExt};
use log::info;
use serde::Serialize;

/// Writes a computed change to the cluster. Updates carry the resource
/// version they were read with, so a concurrent writer surfaces as a conflict.
pub async fn apply<K>(
    client: kube::Client,
    owner: &APIRule,
    change: ObjectChange<K>,
) -> Result<K, anyhow::Error>
where
    K: Object + Serialize + Resource<Scope = NamespaceResourceScope>,
    <K as Resource>::DynamicType: Default,
{
    let namespace = change
        .object()
        .namespace()
        .ok_or_else(|| anyhow!("{} target has no namespace", change.action()))?;
    let api: Api<K> = Api::namespaced(client, &namespace);
    let params = PostParams::default();

    match change {
        ObjectChange::Create(obj) => {
            let obj = owned_by(obj, owner)?;
            let created = api
                .create(&params, &obj)
                .await
                .map_err(|e| anyhow!("unable to create object in {}: {}", namespace, e))?;
            info!("Created {} in the {} namespace", created.name_any(), namespace);
            Ok(created)
        }
        ObjectChange::Update(obj) => {
            let obj = owned_by(obj, owner)?;
            let name = obj
                .meta()
                .name
                .clone()
                .ok_or_else(|| anyhow!("update target in {} has no name", namespace))?;
            let updated = api
                .replace(&name, &params, &obj)
                .await
                .map_err(|e| anyhow!("unable to update {} in {}: {}", name, namespace, e))?;
            info!("Updated {} in the {} namespace", name, namespace);
            Ok(updated)
        }
    }
}

/// Makes the APIRule the controller owner of `obj`, so the cluster garbage
/// collects it once the APIRule is deleted. Objects that already have a
/// controller are left as they are.
pub fn owned_by<K: Resource>(mut obj: K, owner: &APIRule) -> Result<K, anyhow::Error> {
    let oref = owner
        .controller_owner_ref(&())
        .ok_or_else(|| anyhow!("APIRule '{}' has no uid", owner.name_any()))?;

    let refs = obj.meta_mut().owner_references.get_or_insert_with(Vec::new);
    if !refs.iter().any(|r| r.controller == Some(true)) {
        refs.push(oref);
    }
    Ok(obj)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::tests::{api_rule, rule};
    use crds::{VirtualService, VirtualServiceSpec};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};

    fn owner() -> APIRule {
        let mut api = api_rule(vec![rule("/*", &["allow"])]);
        api.metadata.uid = Some("6f1c2d7e-apirule".to_string());
        api
    }

    fn virtual_service(owner_references: Option<Vec<OwnerReference>>) -> VirtualService {
        VirtualService {
            metadata: ObjectMeta {
                generate_name: Some("httpbin-".to_string()),
                namespace: Some("default".to_string()),
                owner_references,
                ..Default::default()
            },
            spec: VirtualServiceSpec::default(),
        }
    }

    #[test]
    fn created_object_is_controlled_by_its_apirule() {
        let vs = owned_by(virtual_service(None), &owner()).unwrap();

        let refs = vs.metadata.owner_references.unwrap();
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].api_version, "gateway.apigate.dev/v1beta1");
        assert_eq!(refs[0].kind, "APIRule");
        assert_eq!(refs[0].name, "httpbin");
        assert_eq!(refs[0].uid, "6f1c2d7e-apirule");
        assert_eq!(refs[0].controller, Some(true));
    }

    #[test]
    fn keeps_an_existing_controller() {
        let existing = OwnerReference {
            api_version: "gateway.apigate.dev/v1beta1".to_string(),
            kind: "APIRule".to_string(),
            name: "httpbin".to_string(),
            uid: "6f1c2d7e-apirule".to_string(),
            controller: Some(true),
            block_owner_deletion: Some(true),
        };

        let vs = owned_by(virtual_service(Some(vec![existing.clone()])), &owner()).unwrap();
        assert_eq!(vs.metadata.owner_references, Some(vec![existing]));
    }

    #[test]
    fn owner_without_uid_is_an_error() {
        let mut api = owner();
        api.metadata.uid = None;
        assert!(owned_by(virtual_service(None), &api).is_err());
    }
}
