use crate::descriptor::{DescriptorError, TargetSpec};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kinds that are never placed in a namespace.
const CLUSTER_SCOPED_KINDS: &[&str] = &[
    "APIService",
    "CSIDriver",
    "CSINode",
    "ClusterRole",
    "ClusterRoleBinding",
    "ComponentStatus",
    "CustomResourceDefinition",
    "IngressClass",
    "MutatingWebhookConfiguration",
    "Namespace",
    "Node",
    "PersistentVolume",
    "PodSecurityPolicy",
    "PriorityClass",
    "RuntimeClass",
    "StorageClass",
    "ValidatingWebhookConfiguration",
    "VolumeAttachment",
];

pub fn is_cluster_scoped(kind: &str) -> bool {
    CLUSTER_SCOPED_KINDS.contains(&kind)
}

/// Group, version and kind of a document. The core group is the empty string.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Gvk {
    pub group: String,
    pub version: String,
    pub kind: String,
}

impl Gvk {
    pub fn new(group: impl Into<String>, version: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            version: version.into(),
            kind: kind.into(),
        }
    }

    /// Split an `apiVersion` value (`apps/v1` or `v1`) and pair it with a kind.
    pub fn from_api_version(api_version: &str, kind: &str) -> Self {
        match api_version.split_once('/') {
            Some((group, version)) => Self::new(group, version, kind),
            None => Self::new("", api_version, kind),
        }
    }

    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }

    pub fn is_cluster_scoped(&self) -> bool {
        is_cluster_scoped(&self.kind)
    }
}

impl fmt::Display for Gvk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.api_version(), self.kind)
    }
}

/// Full identity of a document within a resource set.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResId {
    pub gvk: Gvk,
    pub namespace: Option<String>,
    pub name: String,
}

impl fmt::Display for ResId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{} {ns}/{}", self.gvk, self.name),
            None => write!(f, "{} {}", self.gvk, self.name),
        }
    }
}

/// One term of a label or annotation selector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Requirement {
    Equals(String, String),
    NotEquals(String, String),
    Exists(String),
    NotExists(String),
}

impl Requirement {
    /// Evaluate against a key lookup.
    pub fn matches<'a>(&self, lookup: impl Fn(&str) -> Option<&'a str>) -> bool {
        match self {
            Self::Equals(k, v) => lookup(k) == Some(v.as_str()),
            Self::NotEquals(k, v) => lookup(k) != Some(v.as_str()),
            Self::Exists(k) => lookup(k).is_some(),
            Self::NotExists(k) => lookup(k).is_none(),
        }
    }

    /// Parse a comma-separated selector (`app=web,tier!=db,canary,!legacy`).
    pub fn parse_all(input: &str) -> Result<Vec<Self>, DescriptorError> {
        let mut out = Vec::new();
        for raw in input.split(',') {
            let term = raw.trim();
            if term.is_empty() {
                continue;
            }
            let parsed = if let Some((k, v)) = term.split_once("!=") {
                Self::NotEquals(k.trim().to_owned(), v.trim().to_owned())
            } else if let Some((k, v)) = term.split_once("==").or_else(|| term.split_once('=')) {
                Self::Equals(k.trim().to_owned(), v.trim().to_owned())
            } else if let Some(k) = term.strip_prefix('!') {
                Self::NotExists(k.trim().to_owned())
            } else {
                Self::Exists(term.to_owned())
            };
            let key = match &parsed {
                Self::Equals(k, _) | Self::NotEquals(k, _) | Self::Exists(k) | Self::NotExists(k) => k,
            };
            if key.is_empty() {
                return Err(DescriptorError::InvalidSelector(term.to_owned()));
            }
            out.push(parsed);
        }
        Ok(out)
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Equals(k, v) => write!(f, "{k}={v}"),
            Self::NotEquals(k, v) => write!(f, "{k}!={v}"),
            Self::Exists(k) => f.write_str(k),
            Self::NotExists(k) => write!(f, "!{k}"),
        }
    }
}

/// Patch or transformer target. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selector {
    pub group: Option<String>,
    pub version: Option<String>,
    pub kind: Option<String>,
    pub name: Option<String>,
    pub namespace: Option<String>,
    pub label_selector: Vec<Requirement>,
    pub annotation_selector: Vec<Requirement>,
}

impl Selector {
    pub fn from_target(spec: &TargetSpec) -> Result<Self, DescriptorError> {
        let non_empty = |v: &Option<String>| v.as_ref().map(|s| s.trim().to_owned()).filter(|s| !s.is_empty());
        Ok(Self {
            group: spec.group.as_ref().map(|s| s.trim().to_owned()),
            version: non_empty(&spec.version),
            kind: non_empty(&spec.kind),
            name: non_empty(&spec.name),
            namespace: non_empty(&spec.namespace),
            label_selector: match &spec.label_selector {
                Some(s) => Requirement::parse_all(s)?,
                None => Vec::new(),
            },
            annotation_selector: match &spec.annotation_selector {
                Some(s) => Requirement::parse_all(s)?,
                None => Vec::new(),
            },
        })
    }

    /// Selector that matches exactly one identity.
    pub fn for_id(id: &ResId) -> Self {
        Self {
            group: Some(id.gvk.group.clone()),
            version: Some(id.gvk.version.clone()),
            kind: Some(id.gvk.kind.clone()),
            name: Some(id.name.clone()),
            namespace: id.namespace.clone(),
            ..Self::default()
        }
    }

    pub fn matches_gvk(&self, gvk: &Gvk) -> bool {
        self.group.as_ref().map_or(true, |g| *g == gvk.group)
            && self.version.as_ref().map_or(true, |v| *v == gvk.version)
            && self.kind.as_ref().map_or(true, |k| *k == gvk.kind)
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let any = |v: &Option<String>| v.clone().unwrap_or_else(|| "*".to_owned());
        let group = match &self.group {
            Some(g) if g.is_empty() => "core".to_owned(),
            other => any(other),
        };
        write!(
            f,
            "{group}/{}/{} {}/{}",
            any(&self.version),
            any(&self.kind),
            any(&self.namespace),
            any(&self.name)
        )?;
        if !self.label_selector.is_empty() {
            let terms: Vec<String> = self.label_selector.iter().map(ToString::to_string).collect();
            write!(f, " labels({})", terms.join(","))?;
        }
        if !self.annotation_selector.is_empty() {
            let terms: Vec<String> = self.annotation_selector.iter().map(ToString::to_string).collect();
            write!(f, " annotations({})", terms.join(","))?;
        }
        Ok(())
    }
}
