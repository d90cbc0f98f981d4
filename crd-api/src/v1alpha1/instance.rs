#![allow(clippy::str_to_string)]
#![allow(clippy::missing_docs_in_private_items)]

use std::collections::HashMap;

use garde::Validate;
use k8s_openapi::serde::{Deserialize, Serialize};
use kube::CustomResource;
use schemars::JsonSchema;

use crate::v1alpha1::app::SecurityContext;

/// A concrete launch of one `App` on behalf of one `User`.
///
/// Each `Instance` is joined against its referenced `App` and `User` to
/// produce a Deployment, zero or more PersistentVolumeClaims, and zero or
/// more Services. The assigned GUID is the stable identity carried by
/// every derived object for the lifetime of the instance.
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, JsonSchema, Validate)]
#[kube(
    group = "helx.renci.org",
    version = "v1alpha1",
    kind = "Instance",
    singular = "instance",
    plural = "instances",
    namespaced,
    status = "InstanceStatus",
    shortname = "hinst",
    printcolumn = r#"{"name":"App", "type":"string", "description":"The referenced app", "jsonPath":".spec.appName"}"#,
    printcolumn = r#"{"name":"User", "type":"string", "description":"The referenced user", "jsonPath":".spec.userName"}"#,
    printcolumn = r#"{"name":"Guid", "type":"string", "description":"The assigned guid", "jsonPath":".status.uuid"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "description":"The instance age", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
#[schemars(rename_all = "camelCase")]
#[garde(allow_unvalidated)]
pub struct InstanceSpec {
    /// Reference to the `App` to launch, resolved relative to this instance's namespace when unqualified
    #[garde(length(min = 1))]
    pub app_name: String,
    /// Reference to the `User` to launch on behalf of, resolved the same way as `appName`
    #[garde(length(min = 1))]
    pub user_name: String,
    /// Per-service resource overrides, keyed by `Service.name`
    #[serde(default)]
    #[garde(skip)]
    pub resources: HashMap<String, ResourceOverride>,
    /// Security context override applied on top of the app's per-service security contexts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[garde(skip)]
    pub security_context: Option<SecurityContext>,
    /// UID to run as, overrides the joined `User`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[garde(skip)]
    pub run_as_user: Option<i64>,
    /// GID to run as, overrides the joined `User`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[garde(skip)]
    pub run_as_group: Option<i64>,
    /// `fsGroup`, overrides the joined `User`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[garde(skip)]
    pub fs_group: Option<i64>,
    /// Supplemental group IDs, overrides the joined `User`
    #[serde(default)]
    #[garde(skip)]
    pub supplemental_groups: Vec<i64>,
}

/// Resource request/limit override for a single service.
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, Validate, Default)]
pub struct ResourceOverride {
    /// Resource requests, keyed by resource name
    #[serde(default)]
    #[garde(skip)]
    pub request: HashMap<String, String>,
    /// Resource limits, keyed by resource name
    #[serde(default)]
    #[garde(skip)]
    pub limit: HashMap<String, String>,
}

/// Observed state of an `Instance`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, Validate)]
#[serde(rename_all = "camelCase")]
#[schemars(rename_all = "camelCase")]
pub struct InstanceStatus {
    /// Generation last observed by the engine
    #[garde(skip)]
    pub observed_generation: i64,
    /// Stable GUID assigned on first reconciliation; never cleared once set
    #[serde(default)]
    #[garde(skip)]
    pub uuid: String,
}

#[cfg(test)]
mod test {
    use garde::Validate;

    use super::{Instance, InstanceSpec};

    fn sample_spec() -> InstanceSpec {
        InstanceSpec {
            app_name: "jupyter".to_owned(),
            user_name: "u1".to_owned(),
            resources: Default::default(),
            security_context: None,
            run_as_user: None,
            run_as_group: None,
            fs_group: None,
            supplemental_groups: vec![],
        }
    }

    #[test]
    fn validation_ok() {
        assert!(Validate::validate(&sample_spec(), &()).is_ok());
    }

    #[test]
    fn validation_rejects_empty_app_name() {
        let mut spec = sample_spec();
        spec.app_name = String::new();
        assert!(Validate::validate(&spec, &())
            .unwrap_err()
            .to_string()
            .contains("appName"));
    }

    #[test]
    fn instance_round_trips_through_yaml() {
        let instance_yaml = r#"
apiVersion: helx.renci.org/v1alpha1
kind: Instance
metadata:
  name: i1
  namespace: default
spec:
  appName: jupyter
  userName: u1
status:
  observedGeneration: 2
  uuid: "11111111-2222-3333-4444-555555555555"
        "#;
        let instance: Instance = serde_yaml::from_str(instance_yaml).unwrap();
        assert_eq!(instance.spec.app_name, "jupyter");
        assert_eq!(
            instance.status.as_ref().map(|s| s.uuid.as_str()),
            Some("11111111-2222-3333-4444-555555555555")
        );
    }
}
