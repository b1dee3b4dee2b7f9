//! Reading descriptors, resource files and patch files through a [`FileSystem`].

use crate::document::{parse_stream, Document};
use crate::patch::{parse_patch_stream, LoadedPatch, PatchBody};
use crate::BuildError;
use std::path::{Component, Path, PathBuf};
use strata_fs::{clean_path, FileSystem};
use strata_schema::{parse_descriptor_str, Descriptor, PatchDirective, PatchSource, DESCRIPTOR_FILE_NAMES};
use tracing::debug;

/// Which files a descriptor may read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LoadRestrictor {
    /// Plain files must live under the descriptor's directory.
    #[default]
    RootOnly,
    /// Any readable path.
    None,
}

/// File access scoped to one descriptor directory.
pub struct FileLoader<'a, F: ?Sized> {
    fs: &'a F,
    dir: PathBuf,
    descriptor: PathBuf,
    restrictor: LoadRestrictor,
}

impl<'a, F: FileSystem + ?Sized> FileLoader<'a, F> {
    pub fn new(fs: &'a F, dir: PathBuf, descriptor: PathBuf, restrictor: LoadRestrictor) -> Self {
        Self {
            fs,
            dir: clean_path(&dir),
            descriptor,
            restrictor,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn descriptor(&self) -> &Path {
        &self.descriptor
    }

    /// Resolve `relative` against the descriptor directory.
    pub fn resolve(&self, relative: &str) -> PathBuf {
        clean_path(&self.dir.join(relative))
    }

    /// Read a plain file, honouring the load restrictor.
    pub fn read(&self, relative: &str) -> Result<Vec<u8>, BuildError> {
        let path = self.resolve(relative);
        if self.restrictor == LoadRestrictor::RootOnly && !is_within(&path, &self.dir) {
            return Err(BuildError::Schema {
                path: self.descriptor.clone(),
                reason: format!("'{relative}' is outside the descriptor directory"),
            });
        }
        debug!("reading {}", path.display());
        self.fs.read_file(&path).map_err(BuildError::from_fs)
    }

    pub fn read_text(&self, relative: &str) -> Result<String, BuildError> {
        let bytes = self.read(relative)?;
        String::from_utf8(bytes).map_err(|_| BuildError::Parse {
            path: self.resolve(relative),
            reason: "file is not valid UTF-8".to_owned(),
        })
    }

    /// Parse a resource file into documents.
    pub fn documents(&self, relative: &str) -> Result<Vec<Document>, BuildError> {
        let path = self.resolve(relative);
        let text = self.read_text(relative)?;
        let values = parse_stream(&text).map_err(|e| BuildError::Parse {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        values
            .into_iter()
            .map(|value| {
                Document::from_value(value).map_err(|e| BuildError::Schema {
                    path: path.clone(),
                    reason: e.to_string(),
                })
            })
            .collect()
    }

    /// Load the bodies of every patch directive, in declaration order.
    pub fn patches(&self, directives: &[PatchDirective]) -> Result<Vec<LoadedPatch>, BuildError> {
        let mut out = Vec::new();
        for directive in directives {
            let (origin, error_path, values) = match &directive.source {
                PatchSource::Path(relative) => {
                    let path = self.resolve(relative);
                    let text = self.read_text(relative)?;
                    let values = parse_patch_stream(&text).map_err(|e| BuildError::Parse {
                        path: path.clone(),
                        reason: e.to_string(),
                    })?;
                    (relative.clone(), path, values)
                }
                PatchSource::Inline(yaml) => {
                    let value: serde_json::Value =
                        serde_yaml::from_value(yaml.clone()).map_err(|e| BuildError::Parse {
                            path: self.descriptor.clone(),
                            reason: format!("inline patch: {e}"),
                        })?;
                    ("inline".to_owned(), self.descriptor.clone(), vec![value])
                }
            };
            if values.is_empty() {
                return Err(BuildError::Schema {
                    path: error_path,
                    reason: "patch is empty".to_owned(),
                });
            }
            for value in values {
                let schema = |reason: String| BuildError::Schema {
                    path: error_path.clone(),
                    reason,
                };
                let body = PatchBody::from_value(value).map_err(schema)?;
                out.push(
                    LoadedPatch::new(directive.flavor, directive.target.clone(), body, origin.clone())
                        .map_err(schema)?,
                );
            }
        }
        Ok(out)
    }
}

/// Locate the descriptor file in `dir`. More than one candidate is an error.
pub fn find_descriptor<F: FileSystem + ?Sized>(fs: &F, dir: &Path) -> Result<PathBuf, BuildError> {
    let found: Vec<PathBuf> = DESCRIPTOR_FILE_NAMES
        .iter()
        .map(|name| dir.join(name))
        .filter(|p| fs.exists(p) && !fs.is_dir(p))
        .collect();
    match found.as_slice() {
        [] => Err(BuildError::NotFound {
            path: dir.join(DESCRIPTOR_FILE_NAMES[0]),
        }),
        [only] => Ok(only.clone()),
        _ => Err(BuildError::Schema {
            path: dir.to_path_buf(),
            reason: format!(
                "found more than one descriptor ({}); keep exactly one",
                DESCRIPTOR_FILE_NAMES.join(", ")
            ),
        }),
    }
}

/// Read, parse and normalize the descriptor in `dir`.
pub fn load_descriptor<F: FileSystem + ?Sized>(
    fs: &F,
    dir: &Path,
) -> Result<(PathBuf, Descriptor), BuildError> {
    let path = find_descriptor(fs, dir)?;
    let bytes = fs.read_file(&path).map_err(BuildError::from_fs)?;
    let text = String::from_utf8(bytes).map_err(|_| BuildError::Parse {
        path: path.clone(),
        reason: "descriptor is not valid UTF-8".to_owned(),
    })?;
    let descriptor = parse_descriptor_str(&text)
        .and_then(|k| k.normalize())
        .map_err(|e| {
            if e.is_parse() {
                BuildError::Parse {
                    path: path.clone(),
                    reason: e.to_string(),
                }
            } else {
                BuildError::Schema {
                    path: path.clone(),
                    reason: e.to_string(),
                }
            }
        })?;
    Ok((path, descriptor))
}

/// Lexical containment. A relative root of `.` contains every relative path
/// that does not climb out of it.
fn is_within(path: &Path, root: &Path) -> bool {
    if root.as_os_str().is_empty() || root == Path::new(".") {
        return path.is_relative()
            && !matches!(path.components().next(), Some(Component::ParentDir));
    }
    path.starts_with(root)
}
