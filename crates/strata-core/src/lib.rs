//! Customization pipeline for Strata.
//!
//! This crate ties together descriptor loading, value generators, the
//! name/namespace/label/annotation transformers, structural patches, the
//! cross-document reference fixer and the deterministic emitter into the
//! [`Engine`], the central API for rendering a descriptor directory into a
//! single YAML stream.

pub mod document;
pub mod emit;
pub mod engine;
pub mod fieldspec;
pub mod generator;
pub mod hash;
pub mod loader;
pub mod patch;
pub mod refs;
pub mod resource_set;
pub mod transform;

pub use document::{DataEncoding, Document, DocumentError};
pub use emit::{emit, to_yaml, ReorderMode};
pub use engine::{BuildOptions, BuildResult, Engine};
pub use hash::content_hash;
pub use loader::LoadRestrictor;
pub use refs::RenameMap;
pub use resource_set::ResourceSet;

use std::fmt;
use std::path::PathBuf;
use strata_fs::FsError;
use thiserror::Error;

/// Pipeline stage an error was raised in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Load,
    Generate,
    Transform,
    Patch,
    Emit,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Load => "load",
            Self::Generate => "generate",
            Self::Transform => "transform",
            Self::Patch => "patch",
            Self::Emit => "emit",
        })
    }
}

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("not found: {}", path.display())]
    NotFound { path: PathBuf },
    #[error("failed to parse {}: {reason}", path.display())]
    Parse { path: PathBuf, reason: String },
    #[error("invalid {}: {reason}", path.display())]
    Schema { path: PathBuf, reason: String },
    #[error("descriptor cycle: {}", format_chain(chain))]
    Cycle { chain: Vec<PathBuf> },
    #[error("generator '{generator}': duplicate key '{key}'")]
    DuplicateKey { generator: String, key: String },
    #[error("{stage}: no document matches {target} ({context})")]
    TargetNotFound {
        stage: Stage,
        target: String,
        context: String,
    },
    #[error("{stage}: {target} matches {count} documents, expected exactly one ({context})")]
    AmbiguousTarget {
        stage: Stage,
        target: String,
        count: usize,
        context: String,
    },
    #[error("patch {patch} failed on {document}: {reason}")]
    PatchApply {
        patch: String,
        document: String,
        reason: String,
    },
    #[error("identity collision: {id} is produced more than once")]
    IdentityCollision { id: String },
    #[error("I/O error: {0}")]
    Io(#[source] FsError),
    #[error("failed to write output: {0}")]
    Emit(#[source] std::io::Error),
}

impl BuildError {
    pub fn stage(&self) -> Stage {
        match self {
            Self::NotFound { .. }
            | Self::Parse { .. }
            | Self::Schema { .. }
            | Self::Cycle { .. }
            | Self::Io(_) => Stage::Load,
            Self::DuplicateKey { .. } => Stage::Generate,
            Self::TargetNotFound { stage, .. } | Self::AmbiguousTarget { stage, .. } => *stage,
            Self::PatchApply { .. } => Stage::Patch,
            Self::IdentityCollision { .. } => Stage::Transform,
            Self::Emit(_) => Stage::Emit,
        }
    }

    pub(crate) fn from_fs(err: FsError) -> Self {
        match err {
            FsError::NotFound(path) => Self::NotFound { path },
            other => Self::Io(other),
        }
    }
}

fn format_chain(chain: &[PathBuf]) -> String {
    chain
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(" -> ")
}
