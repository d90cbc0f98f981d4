use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::volume::{Volume, VolumeMount};

/// The full rendering context handed to every artifact template for one Instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct System {
    pub app_class_name: String,
    pub app_name: String,
    pub instance_name: String,
    pub guid: String,
    pub user_name: String,
    /// Joined `User` identity, absorbed into flat fields so templates need no nested lookup
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_as_user: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_as_group: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fs_group: Option<i64>,
    #[serde(default)]
    pub supplemental_groups: Vec<i64>,
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
    #[serde(default)]
    pub containers: Vec<Container>,
    #[serde(default)]
    pub volumes: BTreeMap<String, Volume>,
}

/// One rendered container, derived from an `App` `Service` blueprint plus
/// any per-Instance resource override.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Container {
    pub name: String,
    pub image: String,
    #[serde(default)]
    pub command: Vec<String>,
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
    #[serde(default)]
    pub ports: Vec<PortMap>,
    /// True iff any port in `ports` has a non-zero external port.
    pub has_service: bool,
    pub resources: Resources,
    #[serde(default)]
    pub volume_mounts: Vec<VolumeMount>,
}

/// A container port paired with the external (Service) port it is exposed as.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortMap {
    pub container_port: i32,
    pub external_port: i32,
    pub protocol: String,
}

impl PortMap {
    pub fn new(container_port: i32, external_port: i32) -> Self {
        Self {
            container_port,
            external_port,
            protocol: "TCP".to_owned(),
        }
    }
}

/// Resource requests/limits for a single container, resolved from an
/// Instance's per-service override if present.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Resources {
    #[serde(default)]
    pub request: BTreeMap<String, String>,
    #[serde(default)]
    pub limit: BTreeMap<String, String>,
}

/// One piece of rendered YAML, plus the attributes carried alongside it
/// (currently just whether it requested retention).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RenderArtifact {
    pub rendered: String,
    #[serde(default)]
    pub attr: BTreeMap<String, String>,
}

impl RenderArtifact {
    pub fn is_retained(&self) -> bool {
        self.attr
            .get(crate::consts::OPTION_RETAIN)
            .is_some_and(|v| v == "true")
    }
}
