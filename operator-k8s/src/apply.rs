use std::collections::BTreeMap;

use crd_api::v1alpha1::Instance;
use json_patch::{diff, Patch, PatchOperation};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{PersistentVolumeClaim, Service};
use kube::api::{Patch as KubePatch, PatchParams, PostParams};
use kube::core::ObjectMeta;
use kube::core::NamespaceResourceScope;
use kube::{Api, Client, Resource, ResourceExt};
use operator_api::consts::{LABEL_INSTANCE_ID, LABEL_RETAIN, RETAIN_TRUE};
use operator_api::RenderArtifact;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tracing::warn;

use crate::consts::FIELD_MANAGER;

/// Failure modes of the Apply Engine.
#[derive(Debug, Error)]
pub enum ApplyError {
    #[error("failed to decode rendered artifact: {0}")]
    Decode(#[source] serde_yaml::Error),
    #[error("failed to re-encode decoded artifact: {0}")]
    Reencode(#[source] serde_json::Error),
    #[error("cluster API call failed: {0}")]
    Api(#[source] kube::Error),
}

/// The cluster kind a rendered artifact targets, used to pick the
/// per-kind JSON-Patch filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Deployment,
    Pvc,
    Service,
}

/// Apply one rendered artifact for `inst`, defaulting namespace/name, merging
/// the instance-id label (and retain/owner-reference policy), then either
/// creating it or patching drift away.
pub async fn apply_artifact(
    client: &Client,
    kind: Kind,
    inst: &Instance,
    artifact: &RenderArtifact,
) -> Result<(), ApplyError> {
    if artifact.rendered.trim().is_empty() {
        return Ok(());
    }

    match kind {
        Kind::Deployment => apply_typed::<Deployment>(client, kind, inst, artifact).await,
        Kind::Pvc => apply_typed::<PersistentVolumeClaim>(client, kind, inst, artifact).await,
        Kind::Service => apply_typed::<Service>(client, kind, inst, artifact).await,
    }
}

async fn apply_typed<K>(
    client: &Client,
    kind: Kind,
    inst: &Instance,
    artifact: &RenderArtifact,
) -> Result<(), ApplyError>
where
    K: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + Clone
        + std::fmt::Debug
        + DeserializeOwned
        + Serialize
        + Send
        + Sync
        + 'static,
{
    let mut desired: K =
        serde_yaml::from_str(&artifact.rendered).map_err(ApplyError::Decode)?;

    let namespace = inst.namespace().unwrap_or_default();
    if desired.meta().namespace.is_none() {
        desired.meta_mut().namespace = Some(namespace.clone());
    }
    if desired.meta().name.is_none() {
        desired.meta_mut().name = Some(inst.name_any());
    }
    apply_labels(desired.meta_mut(), inst, artifact);

    let api: Api<K> = Api::namespaced(client.clone(), &namespace);
    let name = desired.name_any();

    match api.get(&name).await {
        Ok(live) => {
            let live_value = serde_json::to_value(&live).map_err(ApplyError::Reencode)?;
            let desired_value = serde_json::to_value(&desired).map_err(ApplyError::Reencode)?;
            let mut patch = diff(&live_value, &desired_value);
            filter_patch(kind, &mut patch);
            if patch.0.is_empty() {
                return Ok(());
            }
            api.patch(&name, &PatchParams::default(), &KubePatch::Json::<K>(patch))
                .await
                .map_err(ApplyError::Api)?;
        }
        Err(kube::Error::Api(err)) if err.code == 404 => {
            let params = PostParams {
                field_manager: Some(FIELD_MANAGER.to_owned()),
                ..PostParams::default()
            };
            api.create(&params, &desired).await.map_err(ApplyError::Api)?;
        }
        Err(err) => return Err(ApplyError::Api(err)),
    }

    Ok(())
}

fn apply_labels(meta: &mut ObjectMeta, inst: &Instance, artifact: &RenderArtifact) {
    let guid = inst.status.as_ref().map_or("", |s| s.uuid.as_str());
    let labels = meta.labels.get_or_insert_with(BTreeMap::new);
    labels.insert(LABEL_INSTANCE_ID.to_owned(), guid.to_owned());

    if artifact.is_retained() {
        labels.insert(LABEL_RETAIN.to_owned(), RETAIN_TRUE.to_owned());
    } else {
        let owner = inst.controller_owner_ref(&());
        if let Some(owner) = owner {
            meta.owner_references.get_or_insert_with(Vec::new).push(owner);
        } else {
            warn!(instance = %inst.name_any(), "could not build owner reference");
        }
    }
}

/// Drop `remove` operations for PVCs: PVC spec is largely immutable after
/// creation, and removal of fields the server already defaulted in would fail.
fn filter_patch(kind: Kind, patch: &mut Patch) {
    if kind != Kind::Pvc {
        return;
    }
    patch
        .0
        .retain(|op| !matches!(op, PatchOperation::Remove(_)));
}
