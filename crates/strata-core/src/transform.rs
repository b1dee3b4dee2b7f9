//! The fixed-order transformers run at every descriptor level.

use crate::fieldspec::{pod_spec_path, walk, FieldSpec, ANNOTATION_FIELDS, LABEL_FIELDS, SCALABLE_KINDS};
use crate::resource_set::ResourceSet;
use crate::{BuildError, Stage};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use strata_schema::{is_cluster_scoped, Descriptor, ImageOverride, ReplicaOverride};
use tracing::debug;

/// Kinds whose names are global API identifiers and never get a prefix or suffix.
const FIXED_NAME_KINDS: &[&str] = &["Namespace", "CustomResourceDefinition", "APIService"];

const BINDING_KINDS: &[&str] = &["RoleBinding", "ClusterRoleBinding"];

/// Run every transformer in order: names, namespace, labels, annotations,
/// images, replicas.
pub fn apply(set: &mut ResourceSet, descriptor: &Descriptor) -> Result<(), BuildError> {
    apply_name_affixes(set, &descriptor.name_prefix, &descriptor.name_suffix);
    if let Some(namespace) = &descriptor.namespace {
        apply_namespace(set, namespace);
    }
    apply_metadata(set, LABEL_FIELDS, &descriptor.common_labels);
    apply_metadata(set, ANNOTATION_FIELDS, &descriptor.common_annotations);
    apply_images(set, &descriptor.images);
    apply_replicas(set, &descriptor.replicas)
}

pub fn apply_name_affixes(set: &mut ResourceSet, prefix: &str, suffix: &str) {
    if prefix.is_empty() && suffix.is_empty() {
        return;
    }
    for doc in set.iter_mut() {
        if FIXED_NAME_KINDS.contains(&doc.kind()) {
            continue;
        }
        let renamed = format!("{prefix}{}{suffix}", doc.name());
        debug!("rename {} -> {renamed}", doc.id());
        doc.set_name(renamed);
    }
}

/// Place every namespaced document in `namespace`.
///
/// Binding subjects that point at a ServiceAccount from this set follow it
/// into the new namespace.
pub fn apply_namespace(set: &mut ResourceSet, namespace: &str) {
    let accounts: BTreeSet<String> = set
        .iter()
        .filter(|d| d.kind() == "ServiceAccount")
        .flat_map(|d| d.names().map(str::to_owned).collect::<Vec<_>>())
        .collect();

    for doc in set.iter_mut() {
        if BINDING_KINDS.contains(&doc.kind()) {
            if let Some(Value::Array(subjects)) = doc.content_mut().get_mut("subjects") {
                for subject in subjects.iter_mut().filter_map(Value::as_object_mut) {
                    let is_local_account = subject.get("kind").and_then(Value::as_str)
                        == Some("ServiceAccount")
                        && subject
                            .get("name")
                            .and_then(Value::as_str)
                            .is_some_and(|n| accounts.contains(n));
                    if is_local_account {
                        subject.insert("namespace".to_owned(), Value::String(namespace.to_owned()));
                    }
                }
            }
        }
        if !is_cluster_scoped(doc.kind()) {
            doc.set_namespace(namespace);
        }
    }
}

/// Add `entries` to each label or annotation map named by `fields`.
/// Keys already present keep their values.
pub fn apply_metadata(set: &mut ResourceSet, fields: &[FieldSpec], entries: &BTreeMap<String, String>) {
    if entries.is_empty() {
        return;
    }
    for doc in set.iter_mut() {
        let kind = doc.kind().to_owned();
        let mut root = Value::Object(std::mem::take(doc.content_mut()));
        for field in fields.iter().filter(|f| f.applies_to(&kind)) {
            walk(&mut root, &field.segments(), field.create, &mut |node| {
                if node.is_null() {
                    *node = Value::Object(Map::new());
                }
                if let Value::Object(map) = node {
                    for (key, value) in entries {
                        map.entry(key.clone())
                            .or_insert_with(|| Value::String(value.clone()));
                    }
                }
            });
        }
        if let Value::Object(content) = root {
            *doc.content_mut() = content;
        }
    }
}

pub fn apply_images(set: &mut ResourceSet, images: &[ImageOverride]) {
    if images.is_empty() {
        return;
    }
    for doc in set.iter_mut() {
        let Some(pod) = pod_spec_path(doc.kind()) else {
            continue;
        };
        let mut root = Value::Object(std::mem::take(doc.content_mut()));
        for list in ["containers", "initContainers"] {
            let path = format!("{pod}/{list}/image");
            let segments: Vec<&str> = path.split('/').collect();
            walk(&mut root, &segments, false, &mut |node| {
                if let Value::String(image) = node {
                    if let Some(updated) = images.iter().find_map(|o| override_image(image, o)) {
                        *image = updated;
                    }
                }
            });
        }
        if let Value::Object(content) = root {
            *doc.content_mut() = content;
        }
    }
}

/// Apply one override to an image reference, or `None` if it names another image.
fn override_image(image: &str, ov: &ImageOverride) -> Option<String> {
    let (name, suffix) = split_image(image);
    if name != ov.name.trim() {
        return None;
    }
    let new_name = ov.new_name.as_deref().unwrap_or(name);
    let tail = match (&ov.digest, &ov.new_tag) {
        (Some(digest), _) => format!("@{digest}"),
        (None, Some(tag)) => format!(":{tag}"),
        (None, None) => suffix.to_owned(),
    };
    Some(format!("{new_name}{tail}"))
}

/// Split `registry:5000/app:1.2@sha256:..` into the name and the `:tag`/`@digest` tail.
fn split_image(image: &str) -> (&str, &str) {
    if let Some(at) = image.find('@') {
        return image.split_at(at);
    }
    match image.rfind(':') {
        Some(colon) if !image[colon..].contains('/') => image.split_at(colon),
        _ => (image, ""),
    }
}

pub fn apply_replicas(set: &mut ResourceSet, replicas: &[ReplicaOverride]) -> Result<(), BuildError> {
    for ov in replicas {
        let mut hit = false;
        for doc in set.iter_mut() {
            if !SCALABLE_KINDS.contains(&doc.kind()) || !doc.answers_to(&ov.name) {
                continue;
            }
            let spec = crate::fieldspec::object_entry(doc.content_mut(), "spec");
            spec.insert("replicas".to_owned(), Value::from(ov.count));
            hit = true;
        }
        if !hit {
            return Err(BuildError::TargetNotFound {
                stage: Stage::Transform,
                target: format!("workload '{}'", ov.name),
                context: "replicas".to_owned(),
            });
        }
    }
    Ok(())
}
