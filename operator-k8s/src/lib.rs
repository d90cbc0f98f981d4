//! The reconciliation engine: join store, template engine, artifact
//! generator, per-kind reconcilers, apply engine, garbage collector, and
//! the process's ambient HTTP/metrics/CLI surface.

pub mod apply;
pub mod artifact;
pub mod config;
pub mod consts;
pub mod controller;
pub mod gc;
pub mod join_store;
pub mod metrics;
pub mod operator;
pub mod router;
pub mod template;
