//! Descriptor parsing, normalization, and resource identity for Strata.
//!
//! This crate defines the schema layer: YAML descriptor parsing
//! (`Kustomization`), the validated and normalized form consumed by the build
//! pipeline (`Descriptor`), resource identity (`Gvk`, `ResId`), patch target
//! selectors (`Selector`), and JSON-Patch operation types (`PatchOperation`).

pub mod descriptor;
pub mod normalize;
pub mod patch;
pub mod resid;
pub mod types;

pub use descriptor::{
    parse_descriptor_str, DescriptorError, GeneratorArgs, GeneratorOptions, ImageOverride,
    Json6902Patch, Kustomization, PatchEntry, ReplicaOverride, TargetSpec, DESCRIPTOR_FILE_NAMES,
};
pub use normalize::{
    Behavior, Descriptor, FileSource, GeneratorDirective, GeneratorKind, PatchDirective,
    PatchFlavor, PatchSource,
};
pub use patch::PatchOperation;
pub use resid::{is_cluster_scoped, Gvk, Requirement, ResId, Selector};
pub use types::{ContentHash, OutputDigest};
