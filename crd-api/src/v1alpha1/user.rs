#![allow(clippy::str_to_string)]
#![allow(clippy::missing_docs_in_private_items)]

use garde::Validate;
use k8s_openapi::serde::{Deserialize, Serialize};
use kube::CustomResource;
use schemars::JsonSchema;

/// Identity attributes for a workload owner.
///
/// A `User` carries the numeric UID/GID and supplemental groups an
/// `Instance` should run as. Resolution of a human-facing handle into
/// these attributes is performed by an external directory-lookup sidecar
/// that populates `status`; the engine only ever reads it.
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, JsonSchema, Validate)]
#[kube(
    group = "helx.renci.org",
    version = "v1alpha1",
    kind = "User",
    singular = "user",
    plural = "users",
    namespaced,
    status = "UserStatus",
    shortname = "huser",
    printcolumn = r#"{"name":"Handle", "type":"string", "description":"The user handle", "jsonPath":".spec.userHandle"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "description":"The user age", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
#[schemars(rename_all = "camelCase")]
#[garde(allow_unvalidated)]
pub struct UserSpec {
    /// Human-facing handle this identity was resolved from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[garde(skip)]
    pub user_handle: Option<String>,
}

/// Resolved identity attributes, observed state of a `User`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, Validate)]
#[serde(rename_all = "camelCase")]
#[schemars(rename_all = "camelCase")]
pub struct UserStatus {
    /// Generation last observed by the engine
    #[garde(skip)]
    pub observed_generation: i64,
    /// UID to run as
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[garde(skip)]
    pub run_as_user: Option<i64>,
    /// GID to run as
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[garde(skip)]
    pub run_as_group: Option<i64>,
    /// `fsGroup` applied to mounted volumes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[garde(skip)]
    pub fs_group: Option<i64>,
    /// Supplemental group IDs, carried as strings to match the directory-lookup sidecar's wire format
    #[serde(default)]
    #[garde(skip)]
    pub supplemental_groups: Vec<String>,
}

#[cfg(test)]
mod test {
    use super::User;

    #[test]
    fn user_round_trips_through_yaml() {
        let user_yaml = r#"
apiVersion: helx.renci.org/v1alpha1
kind: User
metadata:
  name: u1
  namespace: default
spec:
  userHandle: alice
status:
  observedGeneration: 1
  runAsUser: 0
  supplementalGroups: ["100", "101"]
        "#;
        let user: User = serde_yaml::from_str(user_yaml).unwrap();
        assert_eq!(user.spec.user_handle.as_deref(), Some("alice"));
        assert_eq!(
            user.status.as_ref().and_then(|s| s.run_as_user),
            Some(0)
        );
        assert_eq!(
            user.status.as_ref().map(|s| s.supplemental_groups.len()),
            Some(2)
        );
    }
}
