use crate::k8s::lister::VirtualServiceLister;
use crate::processing::{
    owner_label_value, Context, Error, ObjectChange, OWNER_LABEL, OWNER_LABEL_V1ALPHA1,
};
use crds::{APIRule, VirtualService};
use kube::ResourceExt;
use log::{debug, warn};
use std::collections::BTreeMap;

/// Builds the VirtualService an APIRule should produce.
pub trait VirtualServiceCreator: Send + Sync {
    fn create(&self, api: &APIRule) -> Result<VirtualService, Error>;
}

/// Computes the single VirtualService change needed to move the cluster
/// towards an APIRule. Never writes to the cluster itself.
pub struct VirtualServiceProcessor<C> {
    creator: C,
}

impl<C: VirtualServiceCreator> VirtualServiceProcessor<C> {
    pub fn new(creator: C) -> Self {
        Self { creator }
    }

    pub async fn evaluate_reconciliation<L>(
        &self,
        ctx: &Context,
        client: &L,
        api: &APIRule,
    ) -> Result<Vec<ObjectChange<VirtualService>>, Error>
    where
        L: VirtualServiceLister + ?Sized,
    {
        let desired = self.creator.create(api)?;
        let actual = self.actual_state(ctx, client, api).await?;

        Ok(vec![object_changes(desired, actual)])
    }

    async fn actual_state<L>(
        &self,
        ctx: &Context,
        client: &L,
        api: &APIRule,
    ) -> Result<Option<VirtualService>, Error>
    where
        L: VirtualServiceLister + ?Sized,
    {
        let owner = owner_label_value(api)?;
        let namespace = api.namespace().ok_or(Error::MissingMetadata("namespace"))?;

        // Objects written before the current label existed only carry the legacy one.
        for key in [OWNER_LABEL, OWNER_LABEL_V1ALPHA1] {
            let labels = BTreeMap::from([(key.to_string(), owner.clone())]);
            let owned = ctx
                .run(client.list(&namespace, &labels))
                .await?
                .map_err(Error::ClusterRead)?;

            if owned.len() > 1 {
                warn!(
                    "Found {} virtual services owned by {}, using {}",
                    owned.len(),
                    owner,
                    owned[0].name_any()
                );
            }
            if let Some(actual) = owned.into_iter().next() {
                debug!("Virtual service {} owned by {} exists", actual.name_any(), owner);
                return Ok(Some(actual));
            }
        }

        debug!("No virtual service owned by {}", owner);
        Ok(None)
    }
}

/// Always emits a change; an existing object is replaced even when unchanged.
fn object_changes(
    desired: VirtualService,
    actual: Option<VirtualService>,
) -> ObjectChange<VirtualService> {
    match actual {
        Some(mut actual) => {
            actual.spec = desired.spec;
            ObjectChange::Update(actual)
        }
        None => ObjectChange::Create(desired),
    }
}
