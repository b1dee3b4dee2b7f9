use crate::descriptor::{
    DescriptorError, GeneratorArgs, GeneratorOptions, ImageOverride, Kustomization,
    ReplicaOverride,
};
use crate::resid::Selector;
use std::collections::{BTreeMap, BTreeSet};

/// Validated, defaulted representation of a parsed descriptor.
///
/// Resource references are trimmed and deduplication-checked, generator
/// literals are split into key/value pairs, and every patch flavour is folded
/// into a single [`PatchDirective`] list in declaration order. This is the
/// input to the build pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct Descriptor {
    pub name_prefix: String,
    pub name_suffix: String,
    pub namespace: Option<String>,
    pub common_labels: BTreeMap<String, String>,
    pub common_annotations: BTreeMap<String, String>,
    pub resources: Vec<String>,
    pub generators: Vec<GeneratorDirective>,
    pub patches: Vec<PatchDirective>,
    pub images: Vec<ImageOverride>,
    pub replicas: Vec<ReplicaOverride>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GeneratorKind {
    /// Plain-text key/value document (ConfigMap).
    ValueMap,
    /// Opaque byte map (Secret) carrying a declared type tag.
    ByteMap { type_tag: String },
}

impl GeneratorKind {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ValueMap => "ConfigMap",
            Self::ByteMap { .. } => "Secret",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Behavior {
    #[default]
    Create,
    Merge,
    Replace,
}

impl Behavior {
    fn parse(raw: Option<&str>) -> Result<Self, DescriptorError> {
        match raw.map(|s| s.trim().to_lowercase()).as_deref() {
            None | Some("" | "create") => Ok(Self::Create),
            Some("merge") => Ok(Self::Merge),
            Some("replace") => Ok(Self::Replace),
            Some(other) => Err(DescriptorError::InvalidBehavior(other.to_owned())),
        }
    }
}

/// A `files` entry: an explicit key, or the file's base name when absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSource {
    pub key: Option<String>,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratorDirective {
    pub kind: GeneratorKind,
    pub name: String,
    pub namespace: Option<String>,
    pub behavior: Behavior,
    pub literals: Vec<(String, String)>,
    pub files: Vec<FileSource>,
    pub env_files: Vec<String>,
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
    pub disable_name_suffix_hash: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchFlavor {
    /// Partial document merged into the target derived from its own identity.
    StrategicMerge,
    /// Ordered operation list against an explicit single target.
    Json6902,
    /// Body shape decides; the selector may match several documents.
    Auto,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PatchSource {
    Path(String),
    Inline(serde_yaml::Value),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PatchDirective {
    pub flavor: PatchFlavor,
    pub target: Option<Selector>,
    pub source: PatchSource,
}

impl PatchDirective {
    /// Whether exactly one document must match.
    pub fn single_target(&self) -> bool {
        !matches!(self.flavor, PatchFlavor::Auto)
    }
}

impl Kustomization {
    /// Normalize the descriptor: validate shape constraints and resolve defaults.
    pub fn normalize(&self) -> Result<Descriptor, DescriptorError> {
        let mut resources = Vec::with_capacity(self.resources.len() + self.bases.len());
        let mut seen = BTreeSet::new();
        for raw in self.resources.iter().chain(&self.bases) {
            let entry = raw.trim().to_owned();
            if is_remote(&entry) {
                return Err(DescriptorError::RemoteResource(entry));
            }
            if !seen.insert(entry.clone()) {
                return Err(DescriptorError::DuplicateResource(entry));
            }
            resources.push(entry);
        }

        let global = self.generator_options.clone().unwrap_or_default();
        let mut generators = Vec::new();
        let mut names = BTreeSet::new();
        for args in &self.config_map_generator {
            if args.type_tag.is_some() {
                return Err(DescriptorError::UnexpectedType(args.name.clone()));
            }
            let directive = normalize_generator(args, GeneratorKind::ValueMap, &global)?;
            check_unique_generator(&mut names, &directive)?;
            generators.push(directive);
        }
        for args in &self.secret_generator {
            let type_tag = args
                .type_tag
                .as_deref()
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .unwrap_or("Opaque")
                .to_owned();
            let directive = normalize_generator(args, GeneratorKind::ByteMap { type_tag }, &global)?;
            check_unique_generator(&mut names, &directive)?;
            generators.push(directive);
        }

        let mut patches = Vec::new();
        for entry in &self.patches_strategic_merge {
            let source = match entry {
                serde_yaml::Value::String(s) if s.contains('\n') => {
                    PatchSource::Inline(parse_inline(s)?)
                }
                serde_yaml::Value::String(s) => PatchSource::Path(s.trim().to_owned()),
                other => PatchSource::Inline(other.clone()),
            };
            patches.push(PatchDirective {
                flavor: PatchFlavor::StrategicMerge,
                target: None,
                source,
            });
        }
        for entry in &self.patches_json6902 {
            let target = &entry.target;
            if blank(target.kind.as_ref()) || blank(target.name.as_ref()) {
                return Err(DescriptorError::IncompleteTarget);
            }
            patches.push(PatchDirective {
                flavor: PatchFlavor::Json6902,
                target: Some(Selector::from_target(target)?),
                source: patch_source(entry.path.as_ref(), entry.patch.as_ref())?,
            });
        }
        for entry in &self.patches {
            patches.push(PatchDirective {
                flavor: PatchFlavor::Auto,
                target: entry.target.as_ref().map(Selector::from_target).transpose()?,
                source: patch_source(entry.path.as_ref(), entry.patch.as_ref())?,
            });
        }

        for image in &self.images {
            if image.name.trim().is_empty() {
                return Err(DescriptorError::EmptyImageName);
            }
        }
        for replica in &self.replicas {
            if replica.count < 0 {
                return Err(DescriptorError::NegativeReplicas {
                    name: replica.name.clone(),
                    count: replica.count,
                });
            }
        }

        Ok(Descriptor {
            name_prefix: self.name_prefix.clone(),
            name_suffix: self.name_suffix.clone(),
            namespace: self
                .namespace
                .as_deref()
                .map(str::trim)
                .filter(|ns| !ns.is_empty())
                .map(str::to_owned),
            common_labels: checked_map(&self.common_labels)?,
            common_annotations: checked_map(&self.common_annotations)?,
            resources,
            generators,
            patches,
            images: self.images.clone(),
            replicas: self.replicas.clone(),
        })
    }
}

impl Descriptor {
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty() && self.generators.is_empty()
    }
}

/// Split a `KEY=VALUE` literal, stripping one pair of matching outer quotes.
pub fn parse_literal(raw: &str) -> Result<(String, String), DescriptorError> {
    let Some((key, value)) = raw.split_once('=') else {
        return Err(DescriptorError::InvalidLiteral(raw.to_owned()));
    };
    let key = key.trim();
    if key.is_empty() {
        return Err(DescriptorError::InvalidLiteral(raw.to_owned()));
    }
    Ok((key.to_owned(), unquote(value).to_owned()))
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

fn parse_file_source(raw: &str) -> Result<FileSource, DescriptorError> {
    let raw = raw.trim();
    let source = match raw.split_once('=') {
        Some((key, path)) => FileSource {
            key: Some(key.trim().to_owned()),
            path: path.trim().to_owned(),
        },
        None => FileSource {
            key: None,
            path: raw.to_owned(),
        },
    };
    if source.path.is_empty() || source.key.as_deref() == Some("") {
        return Err(DescriptorError::InvalidFileSource(raw.to_owned()));
    }
    Ok(source)
}

fn normalize_generator(
    args: &GeneratorArgs,
    kind: GeneratorKind,
    global: &GeneratorOptions,
) -> Result<GeneratorDirective, DescriptorError> {
    let name = args.name.trim().to_owned();
    if name.is_empty() {
        return Err(DescriptorError::EmptyGeneratorName(kind.kind()));
    }
    let literals = args
        .literals
        .iter()
        .map(String::as_str)
        .map(parse_literal)
        .collect::<Result<Vec<_>, _>>()?;
    let files = args
        .files
        .iter()
        .map(String::as_str)
        .map(parse_file_source)
        .collect::<Result<Vec<_>, _>>()?;
    let env_files = args
        .envs
        .iter()
        .chain(args.env.as_ref())
        .map(|e| e.trim().to_owned())
        .filter(|e| !e.is_empty())
        .collect();

    let local = args.options.clone().unwrap_or_default();
    let mut labels = global.labels.clone();
    labels.extend(local.labels);
    let mut annotations = global.annotations.clone();
    annotations.extend(local.annotations);
    let disable_name_suffix_hash = local
        .disable_name_suffix_hash
        .or(global.disable_name_suffix_hash)
        .unwrap_or(false);

    Ok(GeneratorDirective {
        kind,
        name,
        namespace: args
            .namespace
            .as_deref()
            .map(str::trim)
            .filter(|ns| !ns.is_empty())
            .map(str::to_owned),
        behavior: Behavior::parse(args.behavior.as_deref())?,
        literals,
        files,
        env_files,
        labels: checked_map(&labels)?,
        annotations: checked_map(&annotations)?,
        disable_name_suffix_hash,
    })
}

fn check_unique_generator(
    seen: &mut BTreeSet<(&'static str, Option<String>, String)>,
    directive: &GeneratorDirective,
) -> Result<(), DescriptorError> {
    let key = (
        directive.kind.kind(),
        directive.namespace.clone(),
        directive.name.clone(),
    );
    if seen.insert(key) {
        Ok(())
    } else {
        Err(DescriptorError::DuplicateGenerator {
            kind: directive.kind.kind(),
            name: directive.name.clone(),
        })
    }
}

fn patch_source(
    path: Option<&String>,
    inline: Option<&serde_yaml::Value>,
) -> Result<PatchSource, DescriptorError> {
    match (path, inline) {
        (Some(p), None) if !p.trim().is_empty() => Ok(PatchSource::Path(p.trim().to_owned())),
        (None, Some(serde_yaml::Value::String(s))) => Ok(PatchSource::Inline(parse_inline(s)?)),
        (None, Some(v)) if !v.is_null() => Ok(PatchSource::Inline(v.clone())),
        _ => Err(DescriptorError::AmbiguousPatchSource),
    }
}

fn parse_inline(text: &str) -> Result<serde_yaml::Value, DescriptorError> {
    serde_yaml::from_str(text).map_err(DescriptorError::InlinePatch)
}

fn checked_map(map: &BTreeMap<String, String>) -> Result<BTreeMap<String, String>, DescriptorError> {
    if map.keys().any(|k| k.trim().is_empty()) {
        return Err(DescriptorError::EmptyMetadataKey);
    }
    Ok(map.clone())
}

fn blank(value: Option<&String>) -> bool {
    value.map_or(true, |v| v.trim().is_empty())
}

fn is_remote(entry: &str) -> bool {
    entry.contains("://") || entry.starts_with("github.com/") || entry.starts_with("git@")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::parse_descriptor_str;

    fn normalize(input: &str) -> Result<Descriptor, DescriptorError> {
        parse_descriptor_str(input).unwrap().normalize()
    }

    #[test]
    fn normalizes_generators_in_declaration_order() {
        let d = normalize(
            r"
configMapGenerator:
- name: cfg
  literals:
  - A=1
  - B='quoted value'
secretGenerator:
- name: creds
  literals:
  - username=admin
",
        )
        .unwrap();
        assert_eq!(d.generators.len(), 2);
        assert_eq!(d.generators[0].kind, GeneratorKind::ValueMap);
        assert_eq!(
            d.generators[0].literals,
            vec![
                ("A".to_owned(), "1".to_owned()),
                ("B".to_owned(), "quoted value".to_owned())
            ]
        );
        assert_eq!(
            d.generators[1].kind,
            GeneratorKind::ByteMap {
                type_tag: "Opaque".to_owned()
            }
        );
    }

    #[test]
    fn bases_follow_resources() {
        let d = normalize("resources:\n- a.yaml\nbases:\n- ../base\n").unwrap();
        assert_eq!(d.resources, vec!["a.yaml", "../base"]);
    }

    #[test]
    fn rejects_duplicate_resources() {
        let err = normalize("resources:\n- a.yaml\n- ' a.yaml'\n").unwrap_err();
        assert!(matches!(err, DescriptorError::DuplicateResource(r) if r == "a.yaml"));
    }

    #[test]
    fn rejects_remote_resources() {
        let err = normalize("resources:\n- https://example.com/app.yaml\n").unwrap_err();
        assert!(matches!(err, DescriptorError::RemoteResource(_)));
    }

    #[test]
    fn rejects_duplicate_generator_names() {
        let err = normalize(
            "configMapGenerator:\n- name: a\n  literals: [X=1]\n- name: a\n  literals: [Y=2]\n",
        )
        .unwrap_err();
        assert!(matches!(err, DescriptorError::DuplicateGenerator { .. }));
    }

    #[test]
    fn same_name_across_generator_kinds_is_allowed() {
        let d = normalize(
            "configMapGenerator:\n- name: a\n  literals: [X=1]\nsecretGenerator:\n- name: a\n  literals: [Y=2]\n",
        )
        .unwrap();
        assert_eq!(d.generators.len(), 2);
    }

    #[test]
    fn rejects_malformed_literal() {
        let err = normalize("configMapGenerator:\n- name: a\n  literals: [NOEQUALS]\n").unwrap_err();
        assert!(matches!(err, DescriptorError::InvalidLiteral(_)));
    }

    #[test]
    fn rejects_unknown_behavior() {
        let err =
            normalize("configMapGenerator:\n- name: a\n  behavior: upsert\n  literals: [X=1]\n")
                .unwrap_err();
        assert!(matches!(err, DescriptorError::InvalidBehavior(b) if b == "upsert"));
    }

    #[test]
    fn generator_options_layer_global_then_local() {
        let d = normalize(
            r"
generatorOptions:
  disableNameSuffixHash: true
  labels:
    tier: backend
configMapGenerator:
- name: a
  literals: [X=1]
  options:
    disableNameSuffixHash: false
    labels:
      extra: yes
",
        )
        .unwrap();
        let g = &d.generators[0];
        assert!(!g.disable_name_suffix_hash);
        assert_eq!(g.labels.get("tier").map(String::as_str), Some("backend"));
        assert_eq!(g.labels.get("extra").map(String::as_str), Some("yes"));
    }

    #[test]
    fn file_sources_with_and_without_keys() {
        let d = normalize("configMapGenerator:\n- name: a\n  files:\n  - app.properties\n  - cfg=conf/app.ini\n")
            .unwrap();
        assert_eq!(
            d.generators[0].files,
            vec![
                FileSource {
                    key: None,
                    path: "app.properties".to_owned()
                },
                FileSource {
                    key: Some("cfg".to_owned()),
                    path: "conf/app.ini".to_owned()
                },
            ]
        );
    }

    #[test]
    fn folds_patch_flavours_in_order() {
        let d = normalize(
            r#"
patchesStrategicMerge:
- patch.yaml
- |-
  apiVersion: apps/v1
  kind: Deployment
  metadata:
    name: web
patchesJson6902:
- target:
    kind: Deployment
    name: web
  patch: '[{"op": "remove", "path": "/spec/replicas"}]'
patches:
- target:
    kind: Service
  path: svc.yaml
"#,
        )
        .unwrap();
        assert_eq!(d.patches.len(), 4);
        assert_eq!(d.patches[0].source, PatchSource::Path("patch.yaml".to_owned()));
        assert!(matches!(d.patches[1].source, PatchSource::Inline(serde_yaml::Value::Mapping(_))));
        assert_eq!(d.patches[2].flavor, PatchFlavor::Json6902);
        assert!(matches!(d.patches[2].source, PatchSource::Inline(serde_yaml::Value::Sequence(_))));
        assert!(d.patches[2].single_target());
        assert!(!d.patches[3].single_target());
    }

    #[test]
    fn json6902_requires_kind_and_name() {
        let err = normalize("patchesJson6902:\n- target:\n    kind: Deployment\n  path: p.json\n")
            .unwrap_err();
        assert!(matches!(err, DescriptorError::IncompleteTarget));
    }

    #[test]
    fn patch_requires_exactly_one_source() {
        let err = normalize("patches:\n- target:\n    kind: Deployment\n").unwrap_err();
        assert!(matches!(err, DescriptorError::AmbiguousPatchSource));
    }

    #[test]
    fn blank_namespace_is_unset() {
        let d = normalize("namespace: '  '\n").unwrap();
        assert_eq!(d.namespace, None);
    }
}
