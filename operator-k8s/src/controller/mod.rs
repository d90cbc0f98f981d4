pub mod app;
pub mod instance;
pub mod user;

use std::time::Duration;

use kube::Client;
use thiserror::Error;

use crate::apply::ApplyError;
use crate::gc::GcError;
use crate::join_store::JoinStore;
use crate::template::TemplateEngine;

/// Shared context handed to every reconcile function.
pub struct Context {
    pub client: Client,
    pub store: JoinStore,
    pub engine: TemplateEngine,
    /// Resync interval applied after a successful reconcile, configured via `--requeue-after-secs`.
    pub requeue: Duration,
}

/// Errors a reconciler can surface to `kube::runtime::Controller`, which
/// requeues with exponential backoff on any of these.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("cluster API call failed: {0}")]
    Kube(#[from] kube::Error),
    #[error("status patch failed: {0}")]
    Status(#[source] kube::Error),
    #[error(transparent)]
    Apply(#[from] ApplyError),
    #[error(transparent)]
    Gc(#[from] GcError),
}
