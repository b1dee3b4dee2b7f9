//! File-access capability for Strata.
//!
//! The build pipeline never touches `std::fs` directly. It reads through the
//! [`FileSystem`] trait, which this crate implements twice: [`DiskFs`] over the
//! host filesystem (atomic writes via a temp file and rename) and [`MemoryFs`],
//! an in-memory tree used by tests and embedders.

pub mod disk;
pub mod memory;

pub use disk::DiskFs;
pub use memory::MemoryFs;

use std::path::{Component, Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FsError {
    #[error("not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("not a directory: {}", .0.display())]
    NotADirectory(PathBuf),
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl FsError {
    pub(crate) fn from_io(path: &Path, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::NotFound {
            Self::NotFound(path.to_path_buf())
        } else {
            Self::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    }
}

/// Abstract file access: read, write, and list.
pub trait FileSystem {
    fn read_file(&self, path: &Path) -> Result<Vec<u8>, FsError>;

    fn write_file(&self, path: &Path, data: &[u8]) -> Result<(), FsError>;

    /// Entry names (not paths) directly under `path`, sorted.
    fn list_dir(&self, path: &Path) -> Result<Vec<String>, FsError>;

    fn is_dir(&self, path: &Path) -> bool;

    fn exists(&self, path: &Path) -> bool;
}

impl<T: FileSystem + ?Sized> FileSystem for &T {
    fn read_file(&self, path: &Path) -> Result<Vec<u8>, FsError> {
        (**self).read_file(path)
    }

    fn write_file(&self, path: &Path, data: &[u8]) -> Result<(), FsError> {
        (**self).write_file(path, data)
    }

    fn list_dir(&self, path: &Path) -> Result<Vec<String>, FsError> {
        (**self).list_dir(path)
    }

    fn is_dir(&self, path: &Path) -> bool {
        (**self).is_dir(path)
    }

    fn exists(&self, path: &Path) -> bool {
        (**self).exists(path)
    }
}

/// Lexically normalize a path: drop `.` components and fold `..` into the
/// preceding component. Symlinks are not consulted. Leading `..` components
/// of a relative path are kept.
pub fn clean_path(path: &Path) -> PathBuf {
    let mut out: Vec<Component<'_>> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.last() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir | Component::Prefix(_)) => {}
                _ => out.push(component),
            },
            other => out.push(other),
        }
    }
    if out.is_empty() {
        return PathBuf::from(".");
    }
    out.iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_path_folds_dots() {
        assert_eq!(clean_path(Path::new("a/./b/../c")), PathBuf::from("a/c"));
        assert_eq!(clean_path(Path::new("/app/../base")), PathBuf::from("/base"));
        assert_eq!(clean_path(Path::new("./")), PathBuf::from("."));
        assert_eq!(clean_path(Path::new("../x/..")), PathBuf::from(".."));
        assert_eq!(clean_path(Path::new("/..")), PathBuf::from("/"));
    }

    #[test]
    fn fs_error_display_not_found() {
        let e = FsError::NotFound(PathBuf::from("/missing.yaml"));
        assert!(e.to_string().contains("/missing.yaml"));
    }

    #[test]
    fn io_not_found_maps_to_not_found() {
        let e = FsError::from_io(
            Path::new("x"),
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert!(matches!(e, FsError::NotFound(_)));
    }
}
