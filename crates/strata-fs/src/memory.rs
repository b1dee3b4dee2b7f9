use crate::{clean_path, FileSystem, FsError};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

/// In-memory file tree. Relative paths resolve against `/`; directories are
/// implied by the files beneath them.
#[derive(Debug, Default)]
pub struct MemoryFs {
    files: Mutex<BTreeMap<PathBuf, Vec<u8>>>,
}

impl MemoryFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, for fixtures.
    #[must_use]
    pub fn with_file(self, path: impl AsRef<Path>, data: impl AsRef<[u8]>) -> Self {
        self.insert(path, data);
        self
    }

    pub fn insert(&self, path: impl AsRef<Path>, data: impl AsRef<[u8]>) {
        let key = Self::key(path.as_ref());
        self.files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, data.as_ref().to_vec());
    }

    pub fn len(&self) -> usize {
        self.files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn key(path: &Path) -> PathBuf {
        clean_path(&Path::new("/").join(path))
    }
}

impl FileSystem for MemoryFs {
    fn read_file(&self, path: &Path) -> Result<Vec<u8>, FsError> {
        self.files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&Self::key(path))
            .cloned()
            .ok_or_else(|| FsError::NotFound(path.to_path_buf()))
    }

    fn write_file(&self, path: &Path, data: &[u8]) -> Result<(), FsError> {
        if self.is_dir(path) {
            return Err(FsError::Io {
                path: path.to_path_buf(),
                source: std::io::Error::other("is a directory"),
            });
        }
        self.insert(path, data);
        Ok(())
    }

    fn list_dir(&self, path: &Path) -> Result<Vec<String>, FsError> {
        let dir = Self::key(path);
        let files = self.files.lock().unwrap_or_else(PoisonError::into_inner);
        if files.contains_key(&dir) {
            return Err(FsError::NotADirectory(path.to_path_buf()));
        }
        let names: BTreeSet<String> = files
            .keys()
            .filter_map(|p| p.strip_prefix(&dir).ok())
            .filter_map(|rest| rest.components().next())
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        if names.is_empty() && dir != Path::new("/") {
            return Err(FsError::NotFound(path.to_path_buf()));
        }
        Ok(names.into_iter().collect())
    }

    fn is_dir(&self, path: &Path) -> bool {
        let dir = Self::key(path);
        let files = self.files.lock().unwrap_or_else(PoisonError::into_inner);
        dir == Path::new("/")
            || files
                .keys()
                .any(|p| p != &dir && p.starts_with(&dir))
    }

    fn exists(&self, path: &Path) -> bool {
        let key = Self::key(path);
        let present = self
            .files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&key);
        present || self.is_dir(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_and_absolute_paths_alias() {
        let fs = MemoryFs::new().with_file("app/kustomization.yaml", "resources: []\n");
        assert_eq!(
            fs.read_file(Path::new("/app/kustomization.yaml")).unwrap(),
            b"resources: []\n"
        );
        assert_eq!(
            fs.read_file(Path::new("./app/../app/kustomization.yaml")).unwrap(),
            b"resources: []\n"
        );
    }

    #[test]
    fn directories_are_implied() {
        let fs = MemoryFs::new()
            .with_file("/base/a.yaml", "")
            .with_file("/base/nested/b.yaml", "");
        assert!(fs.is_dir(Path::new("/base")));
        assert!(fs.is_dir(Path::new("/base/nested")));
        assert!(!fs.is_dir(Path::new("/base/a.yaml")));
        assert!(fs.exists(Path::new("/base")));
        assert!(!fs.exists(Path::new("/other")));
        assert_eq!(
            fs.list_dir(Path::new("/base")).unwrap(),
            vec!["a.yaml", "nested"]
        );
    }

    #[test]
    fn prefix_sibling_is_not_a_child() {
        let fs = MemoryFs::new().with_file("/base-extra/a.yaml", "");
        assert!(!fs.is_dir(Path::new("/base")));
    }

    #[test]
    fn list_missing_dir_is_not_found() {
        let fs = MemoryFs::new();
        assert!(matches!(
            fs.list_dir(Path::new("/nope")).unwrap_err(),
            FsError::NotFound(_)
        ));
        assert!(fs.list_dir(Path::new("/")).unwrap().is_empty());
    }

    #[test]
    fn write_file_is_visible_to_reads() {
        let fs = MemoryFs::new();
        fs.write_file(Path::new("out.yaml"), b"---").unwrap();
        assert_eq!(fs.read_file(Path::new("/out.yaml")).unwrap(), b"---");
        assert_eq!(fs.len(), 1);
    }
}
