use serde_json::{Map, Value};
use strata_schema::{Gvk, ResId, Selector};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DocumentError {
    #[error("document must be a mapping")]
    NotAMapping,
    #[error("document is missing a non-empty '{0}'")]
    MissingField(&'static str),
}

/// How the `data` values of a document are stored in memory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DataEncoding {
    /// Values are written out as held.
    #[default]
    Verbatim,
    /// Values are raw text and are base64-encoded on emission (generated Secrets).
    Base64OnEmit,
}

/// One resource document plus the bookkeeping the pipeline needs.
///
/// The content is held as a JSON-shaped tree; keys are sorted when it is
/// emitted or hashed, so two documents with the same content always emit
/// identically.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    content: Map<String, Value>,
    prior_names: Vec<String>,
    original_namespace: Option<String>,
    needs_hash: bool,
    encoding: DataEncoding,
}

impl Document {
    /// Wrap a loaded value, checking it has `apiVersion`, `kind` and `metadata.name`.
    pub fn from_value(value: Value) -> Result<Self, DocumentError> {
        let Value::Object(content) = value else {
            return Err(DocumentError::NotAMapping);
        };
        check_shape(&content)?;
        let original_namespace = namespace_of(&content).map(str::to_owned);
        Ok(Self {
            content,
            prior_names: Vec::new(),
            original_namespace,
            needs_hash: false,
            encoding: DataEncoding::Verbatim,
        })
    }

    /// Wrap generator output. The caller guarantees the identity fields.
    pub fn generated(content: Map<String, Value>, needs_hash: bool, encoding: DataEncoding) -> Self {
        let original_namespace = namespace_of(&content).map(str::to_owned);
        Self {
            content,
            prior_names: Vec::new(),
            original_namespace,
            needs_hash,
            encoding,
        }
    }

    pub fn api_version(&self) -> &str {
        str_field(&self.content, "apiVersion")
    }

    pub fn kind(&self) -> &str {
        str_field(&self.content, "kind")
    }

    pub fn gvk(&self) -> Gvk {
        Gvk::from_api_version(self.api_version(), self.kind())
    }

    pub fn name(&self) -> &str {
        self.metadata()
            .and_then(|m| m.get("name"))
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    pub fn namespace(&self) -> Option<&str> {
        namespace_of(&self.content)
    }

    pub fn id(&self) -> ResId {
        ResId {
            gvk: self.gvk(),
            namespace: self.namespace().map(str::to_owned),
            name: self.name().to_owned(),
        }
    }

    /// Rename, remembering the previous name for later target matching.
    pub fn set_name(&mut self, name: impl Into<String>) {
        let name = name.into();
        let old = self.name().to_owned();
        if old == name {
            return;
        }
        self.prior_names.push(old);
        self.metadata_mut().insert("name".to_owned(), Value::String(name));
    }

    pub fn set_namespace(&mut self, namespace: &str) {
        self.metadata_mut()
            .insert("namespace".to_owned(), Value::String(namespace.to_owned()));
    }

    /// Every name this document has carried, oldest first, ending with the current one.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.prior_names
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(self.name()))
    }

    /// Whether `name` is the current name or any earlier one.
    pub fn answers_to(&self, name: &str) -> bool {
        self.names().any(|n| n == name)
    }

    pub fn original_namespace(&self) -> Option<&str> {
        self.original_namespace.as_deref()
    }

    pub fn label(&self, key: &str) -> Option<&str> {
        self.metadata_entry("labels", key)
    }

    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.metadata_entry("annotations", key)
    }

    /// Selector match. Names and namespaces match current or original values.
    pub fn matches(&self, selector: &Selector) -> bool {
        selector.matches_gvk(&self.gvk())
            && selector.name.as_deref().map_or(true, |n| self.answers_to(n))
            && selector.namespace.as_deref().map_or(true, |ns| {
                self.namespace() == Some(ns) || self.original_namespace() == Some(ns)
            })
            && selector
                .label_selector
                .iter()
                .all(|r| r.matches(|k| self.label(k)))
            && selector
                .annotation_selector
                .iter()
                .all(|r| r.matches(|k| self.annotation(k)))
    }

    pub fn content(&self) -> &Map<String, Value> {
        &self.content
    }

    pub fn content_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.content
    }

    pub fn into_content(self) -> Map<String, Value> {
        self.content
    }

    /// Check that `content` carries the identity fields every document needs.
    pub fn validate(content: &Map<String, Value>) -> Result<(), DocumentError> {
        check_shape(content)
    }

    /// Swap in new content, refusing content that lost its identity fields.
    pub fn replace_content(&mut self, content: Map<String, Value>) -> Result<(), DocumentError> {
        check_shape(&content)?;
        let old = self.name().to_owned();
        self.content = content;
        if self.name() != old {
            self.prior_names.push(old);
        }
        Ok(())
    }

    pub fn metadata_mut(&mut self) -> &mut Map<String, Value> {
        crate::fieldspec::object_entry(&mut self.content, "metadata")
    }

    pub fn needs_hash(&self) -> bool {
        self.needs_hash
    }

    pub fn set_needs_hash(&mut self, needs_hash: bool) {
        self.needs_hash = needs_hash;
    }

    pub fn encoding(&self) -> DataEncoding {
        self.encoding
    }

    fn metadata(&self) -> Option<&Map<String, Value>> {
        self.content.get("metadata").and_then(Value::as_object)
    }

    fn metadata_entry(&self, map: &str, key: &str) -> Option<&str> {
        self.metadata()
            .and_then(|m| m.get(map))
            .and_then(Value::as_object)
            .and_then(|m| m.get(key))
            .and_then(Value::as_str)
    }
}

fn str_field<'a>(map: &'a Map<String, Value>, key: &str) -> &'a str {
    map.get(key).and_then(Value::as_str).unwrap_or_default()
}

fn namespace_of(content: &Map<String, Value>) -> Option<&str> {
    content
        .get("metadata")
        .and_then(Value::as_object)
        .and_then(|m| m.get("namespace"))
        .and_then(Value::as_str)
        .filter(|ns| !ns.is_empty())
}

fn check_shape(content: &Map<String, Value>) -> Result<(), DocumentError> {
    if str_field(content, "apiVersion").is_empty() {
        return Err(DocumentError::MissingField("apiVersion"));
    }
    if str_field(content, "kind").is_empty() {
        return Err(DocumentError::MissingField("kind"));
    }
    let name = content
        .get("metadata")
        .and_then(Value::as_object)
        .map(|m| str_field(m, "name"))
        .unwrap_or_default();
    if name.is_empty() {
        return Err(DocumentError::MissingField("metadata.name"));
    }
    Ok(())
}

/// Parse a YAML stream into document values.
///
/// Empty documents are skipped and `*List` documents are expanded into their
/// `items`, so a file may hold any number of resources.
pub fn parse_stream(text: &str) -> Result<Vec<Value>, serde_yaml::Error> {
    let mut out = Vec::new();
    for part in serde_yaml::Deserializer::from_str(text) {
        let value: Value = serde::Deserialize::deserialize(part)?;
        if value.is_null() {
            continue;
        }
        expand_list(value, &mut out);
    }
    Ok(out)
}

fn expand_list(value: Value, out: &mut Vec<Value>) {
    let is_list = value
        .get("kind")
        .and_then(Value::as_str)
        .is_some_and(|k| k.ends_with("List"))
        && value.get("items").is_some_and(Value::is_array);
    if !is_list {
        out.push(value);
        return;
    }
    if let Value::Object(mut map) = value {
        if let Some(Value::Array(items)) = map.remove("items") {
            for item in items {
                expand_list(item, out);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use strata_schema::Requirement;

    fn deployment() -> Document {
        Document::from_value(json!({
            "apiVersion": "apps/v1",
            "kind": "Deployment",
            "metadata": {"name": "web", "labels": {"app": "web"}},
        }))
        .unwrap()
    }

    #[test]
    fn identity_from_content() {
        let d = deployment();
        assert_eq!(d.gvk(), Gvk::new("apps", "v1", "Deployment"));
        assert_eq!(d.name(), "web");
        assert_eq!(d.namespace(), None);
        assert_eq!(d.id().to_string(), "apps/v1/Deployment web");
    }

    #[test]
    fn rejects_missing_identity_fields() {
        let err = Document::from_value(json!({"kind": "ConfigMap", "metadata": {"name": "a"}}))
            .unwrap_err();
        assert_eq!(err, DocumentError::MissingField("apiVersion"));
        let err = Document::from_value(json!({"apiVersion": "v1", "kind": "ConfigMap"})).unwrap_err();
        assert_eq!(err, DocumentError::MissingField("metadata.name"));
        assert_eq!(
            Document::from_value(json!(["a"])).unwrap_err(),
            DocumentError::NotAMapping
        );
    }

    #[test]
    fn renames_keep_history() {
        let mut d = deployment();
        d.set_name("p-web");
        d.set_name("p-web-s");
        assert_eq!(d.name(), "p-web-s");
        assert!(d.answers_to("web"));
        assert!(d.answers_to("p-web"));
        assert!(!d.answers_to("other"));
        assert_eq!(d.names().collect::<Vec<_>>(), vec!["web", "p-web", "p-web-s"]);
    }

    #[test]
    fn selector_matches_prior_names_and_labels() {
        let mut d = deployment();
        d.set_name("p-web");
        let sel = Selector {
            kind: Some("Deployment".into()),
            name: Some("web".into()),
            label_selector: vec![Requirement::Equals("app".into(), "web".into())],
            ..Selector::default()
        };
        assert!(d.matches(&sel));

        let wrong_group = Selector {
            group: Some(String::new()),
            ..sel.clone()
        };
        assert!(!d.matches(&wrong_group));
    }

    #[test]
    fn namespace_selector_matches_original_namespace() {
        let mut d = Document::from_value(json!({
            "apiVersion": "v1",
            "kind": "Service",
            "metadata": {"name": "svc", "namespace": "dev"},
        }))
        .unwrap();
        d.set_namespace("prod");
        let sel = Selector {
            namespace: Some("dev".into()),
            ..Selector::default()
        };
        assert!(d.matches(&sel));
        assert_eq!(d.namespace(), Some("prod"));
    }

    #[test]
    fn replace_content_validates_and_tracks_renames() {
        let mut d = deployment();
        let mut content = d.content().clone();
        content.remove("kind");
        assert!(d.replace_content(content).is_err());
        assert_eq!(d.kind(), "Deployment");

        let mut renamed = d.content().clone();
        renamed["metadata"]["name"] = json!("api");
        d.replace_content(renamed).unwrap();
        assert_eq!(d.name(), "api");
        assert!(d.answers_to("web"));
    }

    #[test]
    fn parses_multi_document_streams_and_lists() {
        let text = "\
apiVersion: v1
kind: Service
metadata:
  name: a
---
---
apiVersion: v1
kind: List
items:
- apiVersion: v1
  kind: ConfigMap
  metadata:
    name: b
- apiVersion: v1
  kind: Secret
  metadata:
    name: c
";
        let values = parse_stream(text).unwrap();
        let kinds: Vec<&str> = values
            .iter()
            .map(|v| v["kind"].as_str().unwrap())
            .collect();
        assert_eq!(kinds, vec!["Service", "ConfigMap", "Secret"]);
    }

    #[test]
    fn malformed_stream_is_an_error() {
        assert!(parse_stream("a: [1, 2\n").is_err());
    }
}
