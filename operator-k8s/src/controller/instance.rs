use std::sync::Arc;
use std::time::Duration;

use crd_api::v1alpha1::Instance;
use kube::api::{Patch, PatchParams};
use kube::runtime::controller::Action;
use kube::{Api, Resource, ResourceExt};
use tracing::warn;
use uuid::Uuid;

use crate::apply::{apply_artifact, Kind};
use crate::artifact::generate_artifacts;
use crate::controller::{Context, ReconcileError};
use crate::gc;
use crate::join_store::resolve;
use crate::metrics::{ARTIFACTS_APPLIED_COUNT, RECONCILE_FAILED_COUNT};

/// Reconcile one observed `Instance` event.
pub async fn reconcile(inst: Arc<Instance>, ctx: Arc<Context>) -> Result<Action, ReconcileError> {
    let namespace = inst.namespace().unwrap_or_default();
    let key = resolve(&namespace, &inst.name_any());
    let api: Api<Instance> = Api::namespaced(ctx.client.clone(), &namespace);

    let Some(current) = api.get_opt(&inst.name_any()).await? else {
        if let Some(removed) = ctx.store.delete_instance(&key) {
            let guid = removed.status.map(|s| s.uuid).unwrap_or_default();
            if !guid.is_empty() {
                gc::delete_derivatives(&ctx.client, &namespace, &guid).await?;
            }
        }
        return Ok(Action::await_change());
    };

    let generation = current.meta().generation.unwrap_or(0);
    let observed = current.status.as_ref().map_or(0, |s| s.observed_generation);
    if observed >= generation {
        ctx.store.upsert_instance(&key, current);
        return Ok(Action::requeue(ctx.requeue));
    }

    let mut inst = current;
    ensure_guid(&api, &mut inst).await?;

    ctx.store.upsert_instance(&key, inst.clone());
    apply_generated_artifacts(&ctx, &inst).await?;
    patch_observed_generation(&api, &inst, generation).await?;

    Ok(Action::requeue(ctx.requeue))
}

pub fn error_policy(_inst: Arc<Instance>, err: &ReconcileError, _ctx: Arc<Context>) -> Action {
    warn!(%err, "instance reconcile failed");
    RECONCILE_FAILED_COUNT.with_label_values(&["Instance"]).inc();
    Action::requeue(Duration::from_secs(30))
}

/// Generate and apply every artifact derived from `inst`, used both by the
/// Instance controller's own reconcile and by the App/User controllers when
/// refreshing derivatives edged to a changed App or User.
pub async fn apply_generated_artifacts(
    ctx: &Context,
    inst: &Instance,
) -> Result<(), ReconcileError> {
    let artifacts = generate_artifacts(&ctx.store, &ctx.engine, inst).await;

    if let Some(deployment) = &artifacts.deployment {
        apply_artifact(&ctx.client, Kind::Deployment, inst, deployment).await?;
        ARTIFACTS_APPLIED_COUNT
            .with_label_values(&["Deployment"])
            .inc();
    }
    for (claim, artifact) in &artifacts.pvcs {
        if let Err(err) = apply_artifact(&ctx.client, Kind::Pvc, inst, artifact).await {
            warn!(%claim, %err, "failed to apply pvc derivative");
            continue;
        }
        ARTIFACTS_APPLIED_COUNT
            .with_label_values(&["PersistentVolumeClaim"])
            .inc();
    }
    for (container, artifact) in &artifacts.services {
        if let Err(err) = apply_artifact(&ctx.client, Kind::Service, inst, artifact).await {
            warn!(%container, %err, "failed to apply service derivative");
            continue;
        }
        ARTIFACTS_APPLIED_COUNT
            .with_label_values(&["Service"])
            .inc();
    }

    Ok(())
}

async fn ensure_guid(api: &Api<Instance>, inst: &mut Instance) -> Result<(), ReconcileError> {
    let has_guid = inst.status.as_ref().is_some_and(|s| !s.uuid.is_empty());
    if has_guid {
        return Ok(());
    }
    let mut status = inst.status.clone().unwrap_or_default();
    status.uuid = Uuid::new_v4().to_string();
    let patch = serde_json::json!({ "status": status });
    let updated = api
        .patch_status(&inst.name_any(), &PatchParams::default(), &Patch::Merge(patch))
        .await
        .map_err(ReconcileError::Status)?;
    *inst = updated;
    Ok(())
}

async fn patch_observed_generation(
    api: &Api<Instance>,
    inst: &Instance,
    generation: i64,
) -> Result<(), ReconcileError> {
    let mut status = inst.status.clone().unwrap_or_default();
    status.observed_generation = generation;
    let patch = serde_json::json!({ "status": status });
    api.patch_status(&inst.name_any(), &PatchParams::default(), &Patch::Merge(patch))
        .await
        .map_err(ReconcileError::Status)?;
    Ok(())
}
