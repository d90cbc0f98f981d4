use clap::Parser;

use crate::consts::DEFAULT_REQUEUE_DURATION;

/// `helx-operator` config
#[derive(Debug, Parser)]
#[non_exhaustive]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// The namespace to work, default to cluster wide
    #[arg(long, value_parser=namespace_mode_parser, default_value = "")]
    pub namespace: Namespace,
    /// The address on which the readiness/liveness/metrics HTTP server will listen
    #[arg(long, default_value = "0.0.0.0:8080")]
    pub listen_addr: String,
    /// Path to a kubeconfig file; empty uses the in-cluster config
    #[arg(long, default_value = "")]
    pub kubeconfig: String,
    /// Directory of artifact templates, scanned once at startup
    #[arg(long, default_value = "/etc/helx-operator/templates")]
    pub template_dir: String,
    /// Whether to create the CRDs if they are missing on the cluster
    #[arg(long, default_value = "true")]
    pub manage_crds: bool,
    /// Resync interval for successfully reconciled objects, in seconds
    #[arg(long, default_value_t = DEFAULT_REQUEUE_DURATION.as_secs())]
    pub requeue_after_secs: u64,
}

/// The namespace to work, `ClusterWide` means work with all namespaces
#[allow(clippy::exhaustive_enums)]
#[derive(Clone, Debug)]
pub enum Namespace {
    /// A single namespace
    Single(String),
    /// All namespaces
    ClusterWide,
}

/// parse namespace mode
#[allow(clippy::unnecessary_wraps)]
fn namespace_mode_parser(value: &str) -> Result<Namespace, String> {
    if value.is_empty() {
        return Ok(Namespace::ClusterWide);
    }
    Ok(Namespace::Single(value.to_owned()))
}
