//! Custom Resource Definitions for the helx-operator reconciliation engine.

pub mod v1alpha1;
