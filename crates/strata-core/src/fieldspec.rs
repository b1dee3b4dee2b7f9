//! Where metadata and cross-references live inside each kind of document.
//!
//! Label and annotation placement, image fields, and name-reference fields
//! are all described by slash-separated paths. Sequences met along a path are
//! walked element by element, so `spec/template/spec/containers/image`
//! reaches every container.

use serde_json::{Map, Value};

/// A location inside documents of one kind (or of every kind when `kind` is unset).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub kind: Option<&'static str>,
    pub path: &'static str,
    /// Create missing intermediate maps when the field is absent. Segments
    /// marked `[]` hold sequences and are never created.
    pub create: bool,
}

impl FieldSpec {
    const fn any(path: &'static str) -> Self {
        Self {
            kind: None,
            path,
            create: true,
        }
    }

    const fn of(kind: &'static str, path: &'static str, create: bool) -> Self {
        Self {
            kind: Some(kind),
            path,
            create,
        }
    }

    pub fn applies_to(&self, kind: &str) -> bool {
        self.kind.map_or(true, |k| k == kind)
    }

    pub fn segments(&self) -> Vec<&'static str> {
        self.path.split('/').collect()
    }
}

pub static LABEL_FIELDS: &[FieldSpec] = &[
    FieldSpec::any("metadata/labels"),
    FieldSpec::of("Service", "spec/selector", false),
    FieldSpec::of("ReplicationController", "spec/selector", false),
    FieldSpec::of("ReplicationController", "spec/template/metadata/labels", true),
    FieldSpec::of("Deployment", "spec/selector/matchLabels", true),
    FieldSpec::of("Deployment", "spec/template/metadata/labels", true),
    FieldSpec::of("ReplicaSet", "spec/selector/matchLabels", true),
    FieldSpec::of("ReplicaSet", "spec/template/metadata/labels", true),
    FieldSpec::of("DaemonSet", "spec/selector/matchLabels", true),
    FieldSpec::of("DaemonSet", "spec/template/metadata/labels", true),
    FieldSpec::of("StatefulSet", "spec/selector/matchLabels", true),
    FieldSpec::of("StatefulSet", "spec/template/metadata/labels", true),
    FieldSpec::of("StatefulSet", "spec/volumeClaimTemplates[]/metadata/labels", true),
    FieldSpec::of("Job", "spec/selector/matchLabels", false),
    FieldSpec::of("Job", "spec/template/metadata/labels", true),
    FieldSpec::of("CronJob", "spec/jobTemplate/spec/selector/matchLabels", false),
    FieldSpec::of("CronJob", "spec/jobTemplate/metadata/labels", true),
    FieldSpec::of("CronJob", "spec/jobTemplate/spec/template/metadata/labels", true),
    FieldSpec::of("PodDisruptionBudget", "spec/selector/matchLabels", false),
    FieldSpec::of("NetworkPolicy", "spec/podSelector/matchLabels", false),
    FieldSpec::of("NetworkPolicy", "spec/ingress/from/podSelector/matchLabels", false),
    FieldSpec::of("NetworkPolicy", "spec/egress/to/podSelector/matchLabels", false),
];

pub static ANNOTATION_FIELDS: &[FieldSpec] = &[
    FieldSpec::any("metadata/annotations"),
    FieldSpec::of("ReplicationController", "spec/template/metadata/annotations", true),
    FieldSpec::of("Deployment", "spec/template/metadata/annotations", true),
    FieldSpec::of("ReplicaSet", "spec/template/metadata/annotations", true),
    FieldSpec::of("DaemonSet", "spec/template/metadata/annotations", true),
    FieldSpec::of("StatefulSet", "spec/template/metadata/annotations", true),
    FieldSpec::of("Job", "spec/template/metadata/annotations", true),
    FieldSpec::of("CronJob", "spec/jobTemplate/metadata/annotations", true),
    FieldSpec::of("CronJob", "spec/jobTemplate/spec/template/metadata/annotations", true),
];

/// Kinds that keep their declared replica count under `spec/replicas`.
pub const SCALABLE_KINDS: &[&str] = &[
    "Deployment",
    "ReplicaSet",
    "ReplicationController",
    "StatefulSet",
];

/// Path of the pod spec embedded in a workload kind.
pub fn pod_spec_path(kind: &str) -> Option<&'static str> {
    match kind {
        "Pod" => Some("spec"),
        "Deployment" | "ReplicaSet" | "DaemonSet" | "StatefulSet" | "Job"
        | "ReplicationController" => Some("spec/template/spec"),
        "CronJob" => Some("spec/jobTemplate/spec/template/spec"),
        "PodTemplate" => Some("template/spec"),
        _ => None,
    }
}

/// The kind a reference field points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefTarget {
    Kind(&'static str),
    /// Read from the `kind` field next to the name (`roleRef`, `subjects`, ...).
    SiblingKind,
}

/// A field in a referrer document holding the name of another document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceField {
    pub target: RefTarget,
    pub path: String,
}

impl ReferenceField {
    fn new(target: RefTarget, path: impl Into<String>) -> Self {
        Self {
            target,
            path: path.into(),
        }
    }
}

const POD_REFERENCES: &[(&str, &str)] = &[
    ("ConfigMap", "volumes/configMap/name"),
    ("ConfigMap", "volumes/projected/sources/configMap/name"),
    ("ConfigMap", "containers/env/valueFrom/configMapKeyRef/name"),
    ("ConfigMap", "initContainers/env/valueFrom/configMapKeyRef/name"),
    ("ConfigMap", "containers/envFrom/configMapRef/name"),
    ("ConfigMap", "initContainers/envFrom/configMapRef/name"),
    ("Secret", "volumes/secret/secretName"),
    ("Secret", "volumes/projected/sources/secret/name"),
    ("Secret", "containers/env/valueFrom/secretKeyRef/name"),
    ("Secret", "initContainers/env/valueFrom/secretKeyRef/name"),
    ("Secret", "containers/envFrom/secretRef/name"),
    ("Secret", "initContainers/envFrom/secretRef/name"),
    ("Secret", "imagePullSecrets/name"),
    ("ServiceAccount", "serviceAccountName"),
    ("ServiceAccount", "serviceAccount"),
    ("PersistentVolumeClaim", "volumes/persistentVolumeClaim/claimName"),
];

/// Every reference field a document of `kind` may carry.
pub fn reference_fields(kind: &str) -> Vec<ReferenceField> {
    let mut out = vec![ReferenceField::new(
        RefTarget::SiblingKind,
        "metadata/ownerReferences/name",
    )];
    if let Some(pod) = pod_spec_path(kind) {
        out.extend(
            POD_REFERENCES
                .iter()
                .map(|&(target, path)| {
                    ReferenceField::new(RefTarget::Kind(target), format!("{pod}/{path}"))
                }),
        );
    }
    let extra: &[(RefTarget, &str)] = match kind {
        "StatefulSet" => &[(RefTarget::Kind("Service"), "spec/serviceName")],
        "Ingress" => &[
            (RefTarget::Kind("Service"), "spec/backend/serviceName"),
            (RefTarget::Kind("Service"), "spec/defaultBackend/service/name"),
            (RefTarget::Kind("Service"), "spec/rules/http/paths/backend/serviceName"),
            (RefTarget::Kind("Service"), "spec/rules/http/paths/backend/service/name"),
            (RefTarget::Kind("Secret"), "spec/tls/secretName"),
        ],
        "ServiceAccount" => &[
            (RefTarget::Kind("Secret"), "imagePullSecrets/name"),
            (RefTarget::Kind("Secret"), "secrets/name"),
        ],
        "RoleBinding" | "ClusterRoleBinding" => &[
            (RefTarget::SiblingKind, "roleRef/name"),
            (RefTarget::SiblingKind, "subjects/name"),
        ],
        "HorizontalPodAutoscaler" => &[(RefTarget::SiblingKind, "spec/scaleTargetRef/name")],
        "APIService" => &[(RefTarget::Kind("Service"), "spec/service/name")],
        "MutatingWebhookConfiguration" | "ValidatingWebhookConfiguration" => {
            &[(RefTarget::Kind("Service"), "webhooks/clientConfig/service/name")]
        }
        _ => &[],
    };
    out.extend(
        extra
            .iter()
            .map(|(target, path)| ReferenceField::new(*target, *path)),
    );
    out
}

/// Walk `segments` from `node`, calling `visit` on every node reached.
///
/// Sequences are flattened at every step. With `create`, missing or null
/// intermediate entries become empty maps, except for segments ending in `[]`,
/// which name a sequence and are only followed when present.
pub fn walk(
    node: &mut Value,
    segments: &[&str],
    create: bool,
    visit: &mut dyn FnMut(&mut Value),
) {
    if let Value::Array(items) = node {
        for item in items {
            walk(item, segments, create, visit);
        }
        return;
    }
    let Some((head, rest)) = segments.split_first() else {
        visit(node);
        return;
    };
    let Value::Object(map) = node else {
        return;
    };
    let (key, sequence) = match head.strip_suffix("[]") {
        Some(key) => (key, true),
        None => (*head, false),
    };
    let create_here = create && !sequence;
    if !map.contains_key(key) {
        if !create_here {
            return;
        }
        map.insert(key.to_owned(), Value::Object(Map::new()));
    }
    if let Some(child) = map.get_mut(key) {
        if create_here && child.is_null() {
            *child = Value::Object(Map::new());
        }
        walk(child, rest, create, visit);
    }
}

/// Walk to each parent of the final segment and hand over the parent map with
/// the final key. Used where the sibling fields of a value matter.
pub fn walk_parents(
    node: &mut Value,
    path: &str,
    visit: &mut dyn FnMut(&mut Map<String, Value>, &str),
) {
    let segments: Vec<&str> = path.split('/').collect();
    let Some((last, parents)) = segments.split_last() else {
        return;
    };
    walk(node, parents, false, &mut |parent| {
        if let Value::Object(map) = parent {
            visit(map, last);
        }
    });
}

/// Get the map under `key`, inserting or overwriting with an empty map when needed.
pub fn object_entry<'a>(map: &'a mut Map<String, Value>, key: &str) -> &'a mut Map<String, Value> {
    as_object(map.entry(key.to_owned()).or_insert(Value::Null))
}

/// The map held by `slot`, replacing any other value with an empty map first.
fn as_object(slot: &mut Value) -> &mut Map<String, Value> {
    match slot {
        Value::Object(inner) => inner,
        other => {
            *other = Value::Object(Map::new());
            as_object(other)
        }
    }
}
