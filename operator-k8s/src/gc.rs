use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{PersistentVolumeClaim, Service};
use kube::api::{DeleteParams, ListParams};
use kube::core::NamespaceResourceScope;
use kube::{Api, Client, Resource, ResourceExt};
use operator_api::consts::{LABEL_INSTANCE_ID, LABEL_RETAIN};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::warn;

/// Failure modes of the Garbage Collector.
#[derive(Debug, Error)]
pub enum GcError {
    #[error("failed to list derivatives: {0}")]
    List(#[source] kube::Error),
    #[error("failed to delete derivative: {0}")]
    Delete(#[source] kube::Error),
}

/// Delete every derivative of `inst` that is not marked retained.
///
/// Lists Deployments, PersistentVolumeClaims, and Services in the
/// Instance's namespace matching `helx.renci.org/id=<guid>`, deleting
/// those that do not carry `helx.renci.org/retain=true`, using foreground
/// propagation.
pub async fn delete_derivatives(
    client: &Client,
    namespace: &str,
    guid: &str,
) -> Result<(), GcError> {
    delete_kind::<Deployment>(client, namespace, guid).await?;
    delete_kind::<PersistentVolumeClaim>(client, namespace, guid).await?;
    delete_kind::<Service>(client, namespace, guid).await?;
    Ok(())
}

async fn delete_kind<K>(client: &Client, namespace: &str, guid: &str) -> Result<(), GcError>
where
    K: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + Clone
        + std::fmt::Debug
        + DeserializeOwned
        + Send
        + Sync
        + 'static,
{
    let api: Api<K> = Api::namespaced(client.clone(), namespace);
    let selector = format!("{LABEL_INSTANCE_ID}={guid}");
    let objects = api
        .list(&ListParams::default().labels(&selector))
        .await
        .map_err(GcError::List)?;

    for obj in objects {
        let retained = obj
            .labels()
            .get(LABEL_RETAIN)
            .is_some_and(|v| v == "true");
        if retained {
            continue;
        }
        let name = obj.name_any();
        if let Err(err) = api.delete(&name, &DeleteParams::foreground()).await {
            warn!(%name, %err, "failed to delete derivative");
            return Err(GcError::Delete(err));
        }
    }

    Ok(())
}
