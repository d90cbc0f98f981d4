#![allow(clippy::str_to_string)]
#![allow(clippy::missing_docs_in_private_items)]

use std::collections::HashMap;

use garde::Validate;
use k8s_openapi::serde::{Deserialize, Serialize};
use kube::CustomResource;
use schemars::JsonSchema;

/// Reusable multi-container blueprint for a workload.
///
/// An `App` is never launched directly; an `Instance` references it by
/// name and supplies the per-launch identity (`User`) and resource
/// overrides.
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, JsonSchema, Validate)]
#[kube(
    group = "helx.renci.org",
    version = "v1alpha1",
    kind = "App",
    singular = "app",
    plural = "apps",
    namespaced,
    status = "AppStatus",
    shortname = "happ",
    printcolumn = r#"{"name":"Class", "type":"string", "description":"The app class name", "jsonPath":".spec.appClassName"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "description":"The app age", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
#[schemars(rename_all = "camelCase")]
#[garde(allow_unvalidated)]
pub struct AppSpec {
    /// Logical class this app belongs to, exposed to templates as `APP_CLASS_NAME`
    #[garde(length(min = 1))]
    pub app_class_name: String,
    /// Opaque source text carried alongside the app (e.g. the manifest the app was derived from)
    #[serde(default)]
    #[garde(skip)]
    pub source_text: String,
    /// Ordered list of container blueprints
    #[garde(dive)]
    pub services: Vec<Service>,
}

/// A single container blueprint within an `App`.
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, Validate, Default)]
#[serde(rename_all = "camelCase")]
#[schemars(rename_all = "camelCase")]
pub struct Service {
    /// Name of the service, used to key resource overrides and as the container name
    #[garde(length(min = 1))]
    pub name: String,
    /// Container image
    #[garde(length(min = 1))]
    pub image: String,
    /// Entrypoint/command, preserved in declaration order
    #[serde(default)]
    #[garde(skip)]
    pub command: Vec<String>,
    /// Environment variables for the container
    #[serde(default)]
    #[garde(skip)]
    pub environment: HashMap<String, String>,
    /// Whether this service runs as an init container
    #[serde(default)]
    #[garde(skip)]
    pub init: bool,
    /// Exposed ports
    #[serde(default)]
    #[garde(dive)]
    pub ports: Vec<ServicePort>,
    /// Resource bound hints, keyed by resource name (e.g. `cpu`, `memory`)
    #[serde(default)]
    #[garde(skip)]
    pub resource_bounds: HashMap<String, ResourceBoundary>,
    /// Pod security context override for this service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[garde(skip)]
    pub security_context: Option<SecurityContext>,
    /// Volumes, keyed by logical name, value is a volume-spec string (see the volume-spec grammar)
    #[serde(default)]
    #[garde(skip)]
    pub volumes: HashMap<String, String>,
}

/// A container port paired with the external (Service) port it should be exposed as.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, JsonSchema, Validate, Default)]
#[serde(rename_all = "camelCase")]
#[schemars(rename_all = "camelCase")]
pub struct ServicePort {
    /// Port the container listens on
    #[garde(range(min = 1, max = 65535))]
    pub container_port: i32,
    /// External (Service) port; zero means "not externally exposed"
    #[serde(default)]
    #[garde(skip)]
    pub port: i32,
}

/// A min/max resource hint (e.g. `cpu: {min: "100m", max: "1"}`).
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, Validate, Default)]
pub struct ResourceBoundary {
    /// Minimum quantity, as a Kubernetes resource quantity string
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[garde(skip)]
    pub min: Option<String>,
    /// Maximum quantity, as a Kubernetes resource quantity string
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[garde(skip)]
    pub max: Option<String>,
}

/// Security context override carried by a `Service` blueprint.
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, Validate, Default)]
#[serde(rename_all = "camelCase")]
#[schemars(rename_all = "camelCase")]
pub struct SecurityContext {
    /// UID the container should run as
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[garde(skip)]
    pub run_as_user: Option<i64>,
    /// GID the container should run as
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[garde(skip)]
    pub run_as_group: Option<i64>,
    /// `fsGroup` applied to mounted volumes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[garde(skip)]
    pub fs_group: Option<i64>,
    /// Supplemental group IDs
    #[serde(default)]
    #[garde(skip)]
    pub supplemental_groups: Vec<i64>,
}

/// Observed state of an `App`. Carries nothing beyond the generation watermark;
/// apps have no derived resources of their own.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, Validate)]
#[serde(rename_all = "camelCase")]
#[schemars(rename_all = "camelCase")]
pub struct AppStatus {
    /// Generation last observed by the engine
    #[garde(skip)]
    pub observed_generation: i64,
}

#[cfg(test)]
mod test {
    use garde::Validate;

    use super::{App, AppSpec, Service};

    fn sample_spec() -> AppSpec {
        AppSpec {
            app_class_name: "notebook".to_owned(),
            source_text: String::new(),
            services: vec![Service {
                name: "nginx-test".to_owned(),
                image: "nginx:latest".to_owned(),
                ..Service::default()
            }],
        }
    }

    #[test]
    fn validation_ok() {
        assert!(Validate::validate(&sample_spec(), &()).is_ok());
    }

    #[test]
    fn validation_rejects_empty_class_name() {
        let mut spec = sample_spec();
        spec.app_class_name = String::new();
        assert!(Validate::validate(&spec, &())
            .unwrap_err()
            .to_string()
            .contains("appClassName"));
    }

    #[test]
    fn app_round_trips_through_yaml() {
        let app_yaml = r#"
apiVersion: helx.renci.org/v1alpha1
kind: App
metadata:
  name: jupyter
  namespace: default
spec:
  appClassName: notebook
  services:
    - name: nginx-test
      image: nginx:latest
      ports:
        - containerPort: 80
          port: 80
        "#;
        let app: App = serde_yaml::from_str(app_yaml).unwrap();
        assert_eq!(app.spec.app_class_name, "notebook");
        assert_eq!(app.spec.services.len(), 1);
        assert_eq!(app.spec.services[0].ports[0].port, 80);
    }
}
