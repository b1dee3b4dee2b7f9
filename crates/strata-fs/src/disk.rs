use crate::{FileSystem, FsError};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

/// Host filesystem access. Relative paths resolve against `root`.
#[derive(Debug, Clone)]
pub struct DiskFs {
    root: PathBuf,
}

impl DiskFs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Filesystem rooted at the process working directory.
    pub fn cwd() -> Self {
        Self::new(".")
    }

    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}

impl Default for DiskFs {
    fn default() -> Self {
        Self::cwd()
    }
}

impl FileSystem for DiskFs {
    fn read_file(&self, path: &Path) -> Result<Vec<u8>, FsError> {
        let full = self.resolve(path);
        if full.is_dir() {
            return Err(FsError::Io {
                path: path.to_path_buf(),
                source: std::io::Error::other("is a directory"),
            });
        }
        fs::read(&full).map_err(|e| FsError::from_io(path, e))
    }

    /// Atomic write: the data lands in a temp file beside the target and is
    /// renamed over it, so readers never observe a partial file.
    fn write_file(&self, path: &Path, data: &[u8]) -> Result<(), FsError> {
        let full = self.resolve(path);
        let dir = match full.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir).map_err(|e| FsError::from_io(&dir, e))?;
        let mut tmp = NamedTempFile::new_in(&dir).map_err(|e| FsError::from_io(&dir, e))?;
        tmp.write_all(data).map_err(|e| FsError::from_io(path, e))?;
        tmp.as_file()
            .sync_all()
            .map_err(|e| FsError::from_io(path, e))?;
        tmp.persist(&full)
            .map_err(|e| FsError::from_io(path, e.error))?;
        debug!("wrote {} bytes to {}", data.len(), full.display());
        Ok(())
    }

    fn list_dir(&self, path: &Path) -> Result<Vec<String>, FsError> {
        let full = self.resolve(path);
        if !full.exists() {
            return Err(FsError::NotFound(path.to_path_buf()));
        }
        if !full.is_dir() {
            return Err(FsError::NotADirectory(path.to_path_buf()));
        }
        let mut names = Vec::new();
        for entry in fs::read_dir(&full).map_err(|e| FsError::from_io(path, e))? {
            let entry = entry.map_err(|e| FsError::from_io(path, e))?;
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    fn is_dir(&self, path: &Path) -> bool {
        self.resolve(path).is_dir()
    }

    fn exists(&self, path: &Path) -> bool {
        self.resolve(path).exists()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_fs() -> (tempfile::TempDir, DiskFs) {
        let dir = tempfile::tempdir().unwrap();
        let fs = DiskFs::new(dir.path());
        (dir, fs)
    }

    #[test]
    fn write_then_read() {
        let (_dir, fs) = test_fs();
        fs.write_file(Path::new("out/rendered.yaml"), b"kind: ConfigMap\n")
            .unwrap();
        let back = fs.read_file(Path::new("out/rendered.yaml")).unwrap();
        assert_eq!(back, b"kind: ConfigMap\n");
        assert!(fs.is_dir(Path::new("out")));
    }

    #[test]
    fn write_replaces_existing_file() {
        let (_dir, fs) = test_fs();
        fs.write_file(Path::new("a.yaml"), b"first").unwrap();
        fs.write_file(Path::new("a.yaml"), b"second").unwrap();
        assert_eq!(fs.read_file(Path::new("a.yaml")).unwrap(), b"second");
        // no temp files left behind
        assert_eq!(fs.list_dir(Path::new(".")).unwrap(), vec!["a.yaml"]);
    }

    #[test]
    fn missing_file_is_not_found() {
        let (_dir, fs) = test_fs();
        let err = fs.read_file(Path::new("nope.yaml")).unwrap_err();
        assert!(matches!(err, FsError::NotFound(_)));
    }

    #[test]
    fn list_dir_is_sorted() {
        let (dir, fs) = test_fs();
        for name in ["c.yaml", "a.yaml", "b.yaml"] {
            std::fs::write(dir.path().join(name), "").unwrap();
        }
        assert_eq!(
            fs.list_dir(Path::new(".")).unwrap(),
            vec!["a.yaml", "b.yaml", "c.yaml"]
        );
    }

    #[test]
    fn list_dir_on_file_is_not_a_directory() {
        let (dir, fs) = test_fs();
        std::fs::write(dir.path().join("f"), "").unwrap();
        assert!(matches!(
            fs.list_dir(Path::new("f")).unwrap_err(),
            FsError::NotADirectory(_)
        ));
    }
}
