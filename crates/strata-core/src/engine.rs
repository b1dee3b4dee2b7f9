use crate::emit::{emit, order, ReorderMode};
use crate::hash::output_digest;
use crate::loader::{load_descriptor, FileLoader, LoadRestrictor};
use crate::refs::{fix_references, RenameMap};
use crate::resource_set::ResourceSet;
use crate::{generator, patch, transform, BuildError};
use std::io::Write;
use std::path::{Path, PathBuf};
use strata_fs::{clean_path, FileSystem};
use strata_schema::OutputDigest;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildOptions {
    pub load_restrictor: LoadRestrictor,
    pub reorder: ReorderMode,
}

/// Result of a successful render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildResult {
    pub output: String,
    pub documents: usize,
    pub digest: OutputDigest,
}

/// Central entry point: renders a descriptor directory into one YAML stream.
///
/// Every descriptor level loads its resources (recursing into nested
/// descriptor directories), runs its generators, applies the transformers
/// and patches in a fixed order, and rewrites references to anything it
/// renamed. Once the whole tree is assembled, generated documents receive
/// their content-hash suffix and references are rewritten a second time.
pub struct Engine<F> {
    fs: F,
    options: BuildOptions,
}

impl<F: FileSystem> Engine<F> {
    pub fn new(fs: F) -> Self {
        Self::with_options(fs, BuildOptions::default())
    }

    pub fn with_options(fs: F, options: BuildOptions) -> Self {
        Self { fs, options }
    }

    pub fn options(&self) -> BuildOptions {
        self.options
    }

    pub fn fs(&self) -> &F {
        &self.fs
    }

    /// Assemble the final document set for the descriptor in `root`.
    pub fn build(&self, root: &Path) -> Result<ResourceSet, BuildError> {
        info!("building {}", root.display());
        let mut stack = Vec::new();
        let mut set = self.build_level(root, &mut stack)?;

        generator::append_hashes(&mut set);
        let renames = RenameMap::from_history(&set);
        let fixed = fix_references(&mut set, &renames);
        debug!("hash suffixes: {} renames, {fixed} references updated", renames.len());
        set.ensure_unique()?;
        Ok(set)
    }

    /// Build and serialize.
    pub fn render(&self, root: &Path) -> Result<BuildResult, BuildError> {
        let set = self.build(root)?;
        let ordered = order(set.documents(), self.options.reorder);
        let output = emit(&ordered);
        let digest = output_digest(&output);
        info!(
            "rendered {} documents (digest {})",
            ordered.len(),
            &digest.as_str()[..12]
        );
        Ok(BuildResult {
            documents: ordered.len(),
            output,
            digest,
        })
    }

    /// Render and write the stream to `sink`.
    pub fn render_to<W: Write + ?Sized>(
        &self,
        root: &Path,
        sink: &mut W,
    ) -> Result<BuildResult, BuildError> {
        let result = self.render(root)?;
        sink.write_all(result.output.as_bytes())
            .and_then(|()| sink.flush())
            .map_err(BuildError::Emit)?;
        Ok(result)
    }

    fn build_level(&self, dir: &Path, stack: &mut Vec<PathBuf>) -> Result<ResourceSet, BuildError> {
        let dir = clean_path(dir);
        if stack.contains(&dir) {
            let mut chain = stack.clone();
            chain.push(dir);
            return Err(BuildError::Cycle { chain });
        }
        stack.push(dir.clone());

        let (descriptor_path, descriptor) = load_descriptor(&self.fs, &dir)?;
        debug!("loaded descriptor {}", descriptor_path.display());
        if descriptor.is_empty() {
            warn!("{} declares no resources or generators", descriptor_path.display());
        }
        let files = FileLoader::new(
            &self.fs,
            dir.clone(),
            descriptor_path,
            self.options.load_restrictor,
        );

        let mut set = ResourceSet::new();
        for entry in &descriptor.resources {
            let path = files.resolve(entry);
            if self.fs.is_dir(&path) {
                set.append(self.build_level(&path, stack)?);
            } else {
                for doc in files.documents(entry)? {
                    set.push(doc);
                }
            }
        }
        generator::run(&mut set, &descriptor.generators, &files)?;

        transform::apply(&mut set, &descriptor)?;
        let patches = files.patches(&descriptor.patches)?;
        patch::apply_all(&mut set, &patches)?;

        let renames = RenameMap::from_history(&set);
        let fixed = fix_references(&mut set, &renames);
        debug!(
            "{}: {} documents, {} renames, {fixed} references updated",
            dir.display(),
            set.len(),
            renames.len()
        );
        set.ensure_unique()?;

        stack.pop();
        Ok(set)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_fs::MemoryFs;

    #[test]
    fn empty_descriptor_renders_nothing() {
        let fs = MemoryFs::new().with_file("/app/kustomization.yaml", "");
        let result = Engine::new(fs).render(Path::new("/app")).unwrap();
        assert_eq!(result.output, "");
        assert_eq!(result.documents, 0);
    }

    #[test]
    fn render_to_writes_the_stream() {
        let fs = MemoryFs::new()
            .with_file("/app/kustomization.yaml", "resources: [svc.yaml]\n")
            .with_file(
                "/app/svc.yaml",
                "apiVersion: v1\nkind: Service\nmetadata:\n  name: svc\n",
            );
        let mut sink = Vec::new();
        let result = Engine::new(fs)
            .render_to(Path::new("/app"), &mut sink)
            .unwrap();
        assert_eq!(String::from_utf8(sink).unwrap(), result.output);
        assert_eq!(result.documents, 1);
    }

    #[test]
    fn self_reference_is_a_cycle() {
        let fs = MemoryFs::new().with_file("/app/kustomization.yaml", "resources: [.]\n");
        let err = Engine::new(fs).build(Path::new("/app")).unwrap_err();
        assert!(matches!(err, BuildError::Cycle { ref chain } if chain.len() == 2));
    }
}
