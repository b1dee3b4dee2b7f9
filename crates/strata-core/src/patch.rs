//! Structural patches: JSON-Pointer operation lists and merge patches.
//!
//! Each patch resolves its target selector against the current set, applies
//! to copies of every matched document, and commits only when every copy
//! succeeded. A failing operation leaves the whole set untouched.

use crate::document::Document;
use crate::resource_set::ResourceSet;
use crate::{BuildError, Stage};
use serde_json::{Map, Value};
use strata_schema::{Gvk, PatchFlavor, PatchOperation, ResId, Selector};
use tracing::debug;

/// Parsed patch content.
#[derive(Debug, Clone, PartialEq)]
pub enum PatchBody {
    Operations(Vec<PatchOperation>),
    /// Partial document; maps merge, `null` deletes, anything else replaces.
    Merge(Map<String, Value>),
}

impl PatchBody {
    /// Classify one patch document by shape.
    pub fn from_value(value: Value) -> Result<Self, String> {
        match value {
            Value::Array(_) => serde_json::from_value(value)
                .map(Self::Operations)
                .map_err(|e| format!("invalid operation list: {e}")),
            Value::Object(map) => Ok(Self::Merge(map)),
            other => Err(format!("patch must be a mapping or an operation list, got {other}")),
        }
    }
}

/// A patch ready to apply: body, resolved target, and where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedPatch {
    pub flavor: PatchFlavor,
    pub target: Selector,
    pub body: PatchBody,
    /// Patch file path, or `inline` for patches written in the descriptor.
    pub origin: String,
}

impl LoadedPatch {
    /// Pair a body with its target. Merge bodies without an explicit target
    /// select the document they name.
    pub fn new(
        flavor: PatchFlavor,
        target: Option<Selector>,
        body: PatchBody,
        origin: impl Into<String>,
    ) -> Result<Self, String> {
        match (flavor, &body) {
            (PatchFlavor::StrategicMerge, PatchBody::Operations(_)) => {
                return Err("patchesStrategicMerge entries must be partial documents".to_owned());
            }
            (PatchFlavor::Json6902, PatchBody::Merge(_)) => {
                return Err("patchesJson6902 entries must be operation lists".to_owned());
            }
            _ => {}
        }
        let target = match (target, &body) {
            (Some(t), _) => t,
            (None, PatchBody::Merge(map)) => Selector::for_id(&merge_identity(map)?),
            (None, PatchBody::Operations(_)) => {
                return Err("an operation list needs an explicit target".to_owned());
            }
        };
        Ok(Self {
            flavor,
            target,
            body,
            origin: origin.into(),
        })
    }

    fn single_target(&self) -> bool {
        !matches!(self.flavor, PatchFlavor::Auto)
    }
}

fn non_empty(value: Option<&Value>) -> Option<&str> {
    value.and_then(Value::as_str).filter(|s| !s.is_empty())
}

fn merge_identity(map: &Map<String, Value>) -> Result<ResId, String> {
    let meta = map.get("metadata").and_then(Value::as_object);
    let (Some(api_version), Some(kind), Some(name)) = (
        non_empty(map.get("apiVersion")),
        non_empty(map.get("kind")),
        non_empty(meta.and_then(|m| m.get("name"))),
    ) else {
        return Err("merge patch must name apiVersion, kind and metadata.name".to_owned());
    };
    Ok(ResId {
        gvk: Gvk::from_api_version(api_version, kind),
        namespace: non_empty(meta.and_then(|m| m.get("namespace"))).map(str::to_owned),
        name: name.to_owned(),
    })
}

/// Split a patch file into its documents. Lists are not expanded.
pub fn parse_patch_stream(text: &str) -> Result<Vec<Value>, serde_yaml::Error> {
    let mut out = Vec::new();
    for part in serde_yaml::Deserializer::from_str(text) {
        let value: Value = serde::Deserialize::deserialize(part)?;
        if !value.is_null() {
            out.push(value);
        }
    }
    Ok(out)
}

/// Apply patches in order. Each patch is all-or-nothing.
pub fn apply_all(set: &mut ResourceSet, patches: &[LoadedPatch]) -> Result<(), BuildError> {
    for patch in patches {
        apply_one(set, patch)?;
    }
    Ok(())
}

fn apply_one(set: &mut ResourceSet, patch: &LoadedPatch) -> Result<(), BuildError> {
    let hits = set.select(&patch.target);
    if hits.is_empty() {
        return Err(BuildError::TargetNotFound {
            stage: Stage::Patch,
            target: patch.target.to_string(),
            context: patch.origin.clone(),
        });
    }
    if patch.single_target() && hits.len() > 1 {
        return Err(BuildError::AmbiguousTarget {
            stage: Stage::Patch,
            target: patch.target.to_string(),
            count: hits.len(),
            context: patch.origin.clone(),
        });
    }

    let mut staged = Vec::with_capacity(hits.len());
    for &index in &hits {
        let Some(doc) = set.get(index) else { continue };
        let failure = |reason: String| BuildError::PatchApply {
            patch: patch.origin.clone(),
            document: doc.id().to_string(),
            reason,
        };
        let mut value = Value::Object(doc.content().clone());
        match &patch.body {
            PatchBody::Operations(ops) => apply_operations(&mut value, ops).map_err(failure)?,
            PatchBody::Merge(body) => merge_document(&mut value, body),
        }
        let Value::Object(content) = value else {
            return Err(failure("patched document is no longer a mapping".to_owned()));
        };
        Document::validate(&content).map_err(|e| failure(e.to_string()))?;
        staged.push((index, content));
    }

    for (index, content) in staged {
        if let Some(doc) = set.get_mut(index) {
            debug!("patched {} with {}", doc.id(), patch.origin);
            doc.replace_content(content)
                .map_err(|e| BuildError::PatchApply {
                    patch: patch.origin.clone(),
                    document: doc.id().to_string(),
                    reason: e.to_string(),
                })?;
        }
    }
    Ok(())
}

/// Merge a partial document into `target`, keeping its identity fields.
pub fn merge_document(target: &mut Value, body: &Map<String, Value>) {
    let mut body = body.clone();
    body.remove("apiVersion");
    body.remove("kind");
    if let Some(Value::Object(meta)) = body.get_mut("metadata") {
        meta.remove("name");
        meta.remove("namespace");
    }
    merge_value(target, &Value::Object(body));
}

fn merge_value(target: &mut Value, patch: &Value) {
    let Value::Object(patch) = patch else {
        *target = patch.clone();
        return;
    };
    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    let Value::Object(map) = target else { return };
    for (key, value) in patch {
        if value.is_null() {
            map.remove(key);
        } else if let Some(existing) = map.get_mut(key) {
            merge_value(existing, value);
        } else {
            map.insert(key.clone(), strip_nulls(value));
        }
    }
}

fn strip_nulls(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k.clone(), strip_nulls(v)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Apply an operation list in order, stopping at the first failure.
pub fn apply_operations(doc: &mut Value, ops: &[PatchOperation]) -> Result<(), String> {
    for op in ops {
        apply_operation(doc, op).map_err(|reason| format!("{} {}: {reason}", op.name(), op.path()))?;
    }
    Ok(())
}

fn apply_operation(doc: &mut Value, op: &PatchOperation) -> Result<(), String> {
    match op {
        PatchOperation::Add { path, value } => add(doc, path, value.clone()),
        PatchOperation::Remove { path } => remove(doc, path).map(drop),
        PatchOperation::Replace { path, value } => {
            let slot = doc
                .pointer_mut(path)
                .ok_or_else(|| "path does not exist".to_owned())?;
            *slot = value.clone();
            Ok(())
        }
        PatchOperation::Move { from, path } => {
            if path.starts_with(&format!("{from}/")) {
                return Err(format!("cannot move {from} into itself"));
            }
            let value = remove(doc, from)?;
            add(doc, path, value)
        }
        PatchOperation::Copy { from, path } => {
            let value = doc
                .pointer(from)
                .cloned()
                .ok_or_else(|| format!("source {from} does not exist"))?;
            add(doc, path, value)
        }
        PatchOperation::Test { path, value } => match doc.pointer(path) {
            Some(actual) if actual == value => Ok(()),
            Some(actual) => Err(format!("test failed: expected {value}, found {actual}")),
            None => Err("test failed: path does not exist".to_owned()),
        },
    }
}

/// Split a pointer into its parent pointer and unescaped final token.
fn split_pointer(path: &str) -> Result<(&str, String), String> {
    let Some(slash) = path.rfind('/') else {
        return Err(format!("invalid pointer '{path}'"));
    };
    if !path.starts_with('/') {
        return Err(format!("invalid pointer '{path}'"));
    }
    let token = path[slash + 1..].replace("~1", "/").replace("~0", "~");
    Ok((&path[..slash], token))
}

fn array_index(token: &str, len: usize, allow_end: bool) -> Result<usize, String> {
    if allow_end && token == "-" {
        return Ok(len);
    }
    let valid = !token.is_empty()
        && token.bytes().all(|b| b.is_ascii_digit())
        && (token == "0" || !token.starts_with('0'));
    let index: usize = if valid {
        token.parse().map_err(|_| format!("invalid array index '{token}'"))?
    } else {
        return Err(format!("invalid array index '{token}'"));
    };
    let limit = if allow_end { len } else { len.saturating_sub(1) };
    if index > limit || (!allow_end && len == 0) {
        return Err(format!("array index {index} out of bounds"));
    }
    Ok(index)
}

fn add(doc: &mut Value, path: &str, value: Value) -> Result<(), String> {
    if path.is_empty() {
        *doc = value;
        return Ok(());
    }
    let (parent, token) = split_pointer(path)?;
    match doc.pointer_mut(parent) {
        Some(Value::Object(map)) => {
            map.insert(token, value);
            Ok(())
        }
        Some(Value::Array(items)) => {
            let index = array_index(&token, items.len(), true)?;
            items.insert(index, value);
            Ok(())
        }
        Some(_) => Err(format!("parent {parent} is not a container")),
        None => Err(format!("parent {parent} does not exist")),
    }
}

fn remove(doc: &mut Value, path: &str) -> Result<Value, String> {
    if path.is_empty() {
        return Err("cannot remove the document root".to_owned());
    }
    let (parent, token) = split_pointer(path)?;
    match doc.pointer_mut(parent) {
        Some(Value::Object(map)) => map
            .remove(&token)
            .ok_or_else(|| "path does not exist".to_owned()),
        Some(Value::Array(items)) => {
            let index = array_index(&token, items.len(), false)?;
            Ok(items.remove(index))
        }
        Some(_) => Err(format!("parent {parent} is not a container")),
        None => Err(format!("parent {parent} does not exist")),
    }
}
