/// Label and environment-variable names shared between the engine and its templates.
pub mod consts;

/// The `System`/`Container` rendering context handed to artifact templates.
pub mod context;

/// The volume-spec mini-language: grammar, parser, and derived types.
pub mod volume;

pub use context::{Container, PortMap, RenderArtifact, Resources, System};
pub use volume::{parse as parse_volume_spec, Volume, VolumeMount, VolumeSpecError};
