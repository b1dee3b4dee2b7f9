use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// File names recognised as a customization descriptor, in priority order.
pub const DESCRIPTOR_FILE_NAMES: [&str; 3] =
    ["kustomization.yaml", "kustomization.yml", "Kustomization"];

#[derive(Debug, Error)]
pub enum DescriptorError {
    #[error("failed to parse descriptor: {0}")]
    Parse(#[source] serde_yaml::Error),
    #[error("invalid descriptor: {0}")]
    Shape(#[source] serde_yaml::Error),
    #[error("descriptor must be a mapping")]
    NotAMapping,
    #[error("duplicate resource reference '{0}'")]
    DuplicateResource(String),
    #[error("remote resource '{0}' is not supported; resources must be local paths")]
    RemoteResource(String),
    #[error("duplicate {kind} generator '{name}'")]
    DuplicateGenerator { kind: &'static str, name: String },
    #[error("{0} generator name must not be empty")]
    EmptyGeneratorName(&'static str),
    #[error("configMapGenerator '{0}' does not accept a 'type'")]
    UnexpectedType(String),
    #[error("invalid literal '{0}', expected KEY=VALUE")]
    InvalidLiteral(String),
    #[error("invalid file source '{0}', expected PATH or KEY=PATH")]
    InvalidFileSource(String),
    #[error("invalid behavior '{0}', expected create, merge or replace")]
    InvalidBehavior(String),
    #[error("patch entry must set exactly one of 'path' or 'patch'")]
    AmbiguousPatchSource,
    #[error("patchesJson6902 target must name both kind and name")]
    IncompleteTarget,
    #[error("inline patch is not valid YAML: {0}")]
    InlinePatch(#[source] serde_yaml::Error),
    #[error("invalid selector term '{0}'")]
    InvalidSelector(String),
    #[error("label and annotation keys must not be empty")]
    EmptyMetadataKey,
    #[error("images entry must name an image")]
    EmptyImageName,
    #[error("replicas entry '{name}' has negative count {count}")]
    NegativeReplicas { name: String, count: i64 },
}

impl DescriptorError {
    /// True when the input was not well-formed YAML at all, as opposed to
    /// well-formed YAML of the wrong shape.
    pub fn is_parse(&self) -> bool {
        matches!(self, Self::Parse(_) | Self::InlinePatch(_))
    }
}

/// The customization descriptor as written by the user.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Kustomization {
    #[serde(default)]
    pub api_version: Option<String>,
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub name_prefix: String,
    #[serde(default)]
    pub name_suffix: String,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub common_labels: BTreeMap<String, String>,
    #[serde(default)]
    pub common_annotations: BTreeMap<String, String>,
    #[serde(default)]
    pub resources: Vec<String>,
    #[serde(default)]
    pub bases: Vec<String>,
    #[serde(default)]
    pub config_map_generator: Vec<GeneratorArgs>,
    #[serde(default)]
    pub secret_generator: Vec<GeneratorArgs>,
    #[serde(default)]
    pub generator_options: Option<GeneratorOptions>,
    #[serde(default)]
    pub patches_strategic_merge: Vec<serde_yaml::Value>,
    #[serde(default, rename = "patchesJson6902")]
    pub patches_json6902: Vec<Json6902Patch>,
    #[serde(default)]
    pub patches: Vec<PatchEntry>,
    #[serde(default)]
    pub images: Vec<ImageOverride>,
    #[serde(default)]
    pub replicas: Vec<ReplicaOverride>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct GeneratorArgs {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub behavior: Option<String>,
    #[serde(default)]
    pub literals: Vec<String>,
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default)]
    pub envs: Vec<String>,
    #[serde(default)]
    pub env: Option<String>,
    #[serde(default, rename = "type")]
    pub type_tag: Option<String>,
    #[serde(default)]
    pub options: Option<GeneratorOptions>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct GeneratorOptions {
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
    #[serde(default)]
    pub disable_name_suffix_hash: Option<bool>,
}

/// Patch target as written in `patchesJson6902` and `patches` entries.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TargetSpec {
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub label_selector: Option<String>,
    #[serde(default)]
    pub annotation_selector: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Json6902Patch {
    pub target: TargetSpec,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub patch: Option<serde_yaml::Value>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PatchEntry {
    #[serde(default)]
    pub target: Option<TargetSpec>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub patch: Option<serde_yaml::Value>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ImageOverride {
    pub name: String,
    #[serde(default)]
    pub new_name: Option<String>,
    #[serde(default)]
    pub new_tag: Option<String>,
    #[serde(default)]
    pub digest: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ReplicaOverride {
    pub name: String,
    pub count: i64,
}

/// Parse a descriptor from YAML text.
///
/// Malformed YAML yields [`DescriptorError::Parse`]; well-formed YAML that does
/// not fit the descriptor shape yields [`DescriptorError::Shape`].
pub fn parse_descriptor_str(input: &str) -> Result<Kustomization, DescriptorError> {
    let value: serde_yaml::Value = serde_yaml::from_str(input).map_err(DescriptorError::Parse)?;
    match value {
        // An empty file is a valid, empty descriptor.
        serde_yaml::Value::Null => Ok(Kustomization::default()),
        serde_yaml::Value::Mapping(_) => {
            serde_yaml::from_value(value).map_err(DescriptorError::Shape)
        }
        _ => Err(DescriptorError::NotAMapping),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_descriptor() {
        let input = r#"
apiVersion: kustomize.config.k8s.io/v1beta1
kind: Kustomization
namePrefix: foo-
nameSuffix: -bar
namespace: ns1
commonLabels:
  app: nginx
commonAnnotations:
  note: This is a test annotation
resources:
  - deployment.yaml
  - namespace.yaml
configMapGenerator:
- name: literalConfigMap
  literals:
  - DB_USERNAME=admin
  - DB_PASSWORD=somepw
secretGenerator:
- name: secret
  literals:
    - DB_USERNAME=admin
  type: Opaque
patchesJson6902:
- target:
    group: apps
    version: v1
    kind: Deployment
    name: dply1
  path: jsonpatch.json
"#;
        let k = parse_descriptor_str(input).expect("should parse");
        assert_eq!(k.name_prefix, "foo-");
        assert_eq!(k.name_suffix, "-bar");
        assert_eq!(k.namespace.as_deref(), Some("ns1"));
        assert_eq!(k.common_labels.get("app").map(String::as_str), Some("nginx"));
        assert_eq!(k.resources, vec!["deployment.yaml", "namespace.yaml"]);
        assert_eq!(k.config_map_generator[0].literals.len(), 2);
        assert_eq!(k.secret_generator[0].type_tag.as_deref(), Some("Opaque"));
        assert_eq!(k.patches_json6902[0].target.kind.as_deref(), Some("Deployment"));
        assert_eq!(k.patches_json6902[0].path.as_deref(), Some("jsonpatch.json"));
    }

    #[test]
    fn empty_input_is_empty_descriptor() {
        let k = parse_descriptor_str("").unwrap();
        assert_eq!(k, Kustomization::default());
    }

    #[test]
    fn rejects_unknown_fields_as_shape_error() {
        let err = parse_descriptor_str("namePrefix: a-\nbogus: true\n").unwrap_err();
        assert!(matches!(err, DescriptorError::Shape(_)), "got {err:?}");
        assert!(!err.is_parse());
    }

    #[test]
    fn malformed_yaml_is_parse_error() {
        let err = parse_descriptor_str("resources: [a, b\n").unwrap_err();
        assert!(err.is_parse(), "got {err:?}");
    }

    #[test]
    fn scalar_document_is_rejected() {
        let err = parse_descriptor_str("just a string\n").unwrap_err();
        assert!(matches!(err, DescriptorError::NotAMapping));
    }

    #[test]
    fn inline_patch_may_be_structured() {
        let input = r"
patches:
- target:
    kind: Deployment
  patch:
  - op: add
    path: /spec/replicas
    value: 2
";
        let k = parse_descriptor_str(input).unwrap();
        assert!(k.patches[0].patch.as_ref().unwrap().is_sequence());
    }
}
