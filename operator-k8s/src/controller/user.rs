use std::sync::Arc;
use std::time::Duration;

use crd_api::v1alpha1::User;
use kube::api::{Patch, PatchParams};
use kube::runtime::controller::Action;
use kube::{Api, Resource, ResourceExt};
use tracing::warn;

use crate::controller::instance::apply_generated_artifacts;
use crate::controller::{Context, ReconcileError};
use crate::gc;
use crate::join_store::resolve;
use crate::metrics::RECONCILE_FAILED_COUNT;

/// Reconcile one observed `User` event.
pub async fn reconcile(user: Arc<User>, ctx: Arc<Context>) -> Result<Action, ReconcileError> {
    let namespace = user.namespace().unwrap_or_default();
    let key = resolve(&namespace, &user.name_any());
    let api: Api<User> = Api::namespaced(ctx.client.clone(), &namespace);

    let Some(current) = api.get_opt(&user.name_any()).await? else {
        for inst in ctx.store.delete_user(&key) {
            let inst_ns = inst.namespace().unwrap_or_default();
            let guid = inst.status.map(|s| s.uuid).unwrap_or_default();
            if !guid.is_empty() {
                gc::delete_derivatives(&ctx.client, &inst_ns, &guid).await?;
            }
        }
        return Ok(Action::await_change());
    };

    let generation = current.meta().generation.unwrap_or(0);
    let observed = current.status.as_ref().map_or(0, |s| s.observed_generation);
    if observed >= generation {
        let _ = ctx.store.upsert_user(&key, current);
        return Ok(Action::requeue(ctx.requeue));
    }

    let edged = ctx.store.upsert_user(&key, current.clone());
    for inst in &edged {
        apply_generated_artifacts(&ctx, inst).await?;
    }
    patch_observed_generation(&api, &current, generation).await?;

    Ok(Action::requeue(ctx.requeue))
}

pub fn error_policy(_user: Arc<User>, err: &ReconcileError, _ctx: Arc<Context>) -> Action {
    warn!(%err, "user reconcile failed");
    RECONCILE_FAILED_COUNT.with_label_values(&["User"]).inc();
    Action::requeue(Duration::from_secs(30))
}

async fn patch_observed_generation(
    api: &Api<User>,
    user: &User,
    generation: i64,
) -> Result<(), ReconcileError> {
    let mut status = user.status.clone().unwrap_or_default();
    status.observed_generation = generation;
    let patch = serde_json::json!({ "status": status });
    api.patch_status(&user.name_any(), &PatchParams::default(), &Patch::Merge(patch))
        .await
        .map_err(ReconcileError::Status)?;
    Ok(())
}
