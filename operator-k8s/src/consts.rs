use std::time::Duration;

/// The default requeue duration to achieve eventual consistency
pub(crate) const DEFAULT_REQUEUE_DURATION: Duration = Duration::from_secs(600);
/// The field manager identifier used for every server-side apply and JSON-Patch call
pub(crate) const FIELD_MANAGER: &str = "helx-operator";
/// File extension recognized by the template loader
pub(crate) const TEMPLATE_GLOB: &str = "**/*.tmpl";
/// Name of the template that renders a `Deployment` artifact
pub(crate) const TEMPLATE_DEPLOYMENT: &str = "deployment.tmpl";
/// Name of the template that renders a PVC artifact
pub(crate) const TEMPLATE_PVC: &str = "pvc.tmpl";
/// Name of the template that renders a Service artifact
pub(crate) const TEMPLATE_SERVICE: &str = "service.tmpl";
/// Maximum number of `reRender` passes `renderToFixedPoint` will attempt before giving up
pub(crate) const MAX_FIXED_POINT_ITERATIONS: usize = 8;
