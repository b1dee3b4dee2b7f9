use crate::fieldspec::{reference_fields, walk_parents, RefTarget};
use crate::resource_set::ResourceSet;
use serde_json::Value;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
struct Rename {
    kind: String,
    namespace: Option<String>,
    from: String,
    to: String,
}

/// Old-name to new-name pairs gathered from the documents' name histories.
///
/// Current names are kept alongside the renames so a reference that already
/// points at a live document is never redirected to one that used to share
/// its name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenameMap {
    entries: Vec<Rename>,
}

impl RenameMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map every name each document has carried to its current name.
    pub fn from_history(set: &ResourceSet) -> Self {
        let mut map = Self::new();
        for doc in set {
            for from in doc.names() {
                map.push(doc.kind(), doc.namespace(), from, doc.name());
            }
        }
        map
    }

    pub fn record(&mut self, kind: &str, namespace: Option<&str>, from: &str, to: &str) {
        if from == to {
            return;
        }
        self.push(kind, namespace, from, to);
    }

    fn push(&mut self, kind: &str, namespace: Option<&str>, from: &str, to: &str) {
        let rename = Rename {
            kind: kind.to_owned(),
            namespace: namespace.map(str::to_owned),
            from: from.to_owned(),
            to: to.to_owned(),
        };
        if !self.entries.contains(&rename) {
            self.entries.push(rename);
        }
    }

    /// Number of recorded renames, not counting names that stayed put.
    pub fn len(&self) -> usize {
        self.entries.iter().filter(|r| r.from != r.to).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// New name for a reference to `kind`/`name` made from `namespace`.
    ///
    /// When several documents of that kind answer to `name`, the one in the
    /// referrer's namespace wins; if that still leaves a choice the reference
    /// is left alone.
    pub fn resolve(&self, kind: &str, namespace: Option<&str>, name: &str) -> Option<&str> {
        let candidates: Vec<&Rename> = self
            .entries
            .iter()
            .filter(|r| r.kind == kind && r.from == name)
            .collect();
        let chosen = match candidates.as_slice() {
            [] => None,
            [only] => Some(*only),
            many => {
                let local: Vec<&&Rename> = many
                    .iter()
                    .filter(|r| r.namespace.as_deref() == namespace)
                    .collect();
                match local.as_slice() {
                    [only] => Some(**only),
                    _ => {
                        warn!("reference to {kind} '{name}' is ambiguous; leaving it unchanged");
                        None
                    }
                }
            }
        };
        chosen.map(|r| r.to.as_str()).filter(|to| *to != name)
    }
}

/// Rewrite every known reference field whose value was renamed.
///
/// Returns the number of fields changed.
pub fn fix_references(set: &mut ResourceSet, renames: &RenameMap) -> usize {
    if renames.is_empty() {
        return 0;
    }
    let mut changed = 0;
    for doc in set.iter_mut() {
        let kind = doc.kind().to_owned();
        let namespace = doc.namespace().map(str::to_owned);
        let fields = reference_fields(&kind);
        let mut root = Value::Object(std::mem::take(doc.content_mut()));
        for field in &fields {
            walk_parents(&mut root, &field.path, &mut |parent, key| {
                let target_kind = match field.target {
                    RefTarget::Kind(k) => k.to_owned(),
                    RefTarget::SiblingKind => match parent.get("kind").and_then(Value::as_str) {
                        Some(k) => k.to_owned(),
                        None => return,
                    },
                };
                let Some(current) = parent.get(key).and_then(Value::as_str) else {
                    return;
                };
                if let Some(new) = renames.resolve(&target_kind, namespace.as_deref(), current) {
                    debug!("{kind} {}: {target_kind} '{current}' -> '{new}'", field.path);
                    parent.insert(key.to_owned(), Value::String(new.to_owned()));
                    changed += 1;
                }
            });
        }
        if let Value::Object(content) = root {
            *doc.content_mut() = content;
        }
    }
    changed
}
