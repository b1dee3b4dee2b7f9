//! ConfigMap and Secret generators.
//!
//! Generated documents are named after their directive and carry a pending
//! hash suffix. The suffix is appended once, over the final data, after the
//! whole tree has been assembled (see [`append_hashes`]).

use crate::document::{DataEncoding, Document};
use crate::hash::content_hash;
use crate::loader::FileLoader;
use crate::resource_set::ResourceSet;
use crate::{BuildError, Stage};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;
use strata_fs::FileSystem;
use strata_schema::{Behavior, GeneratorDirective, GeneratorKind};
use tracing::debug;

enum Entry {
    Text(String),
    Binary(Vec<u8>),
}

/// Run every generator directive of one descriptor level, in order.
pub fn run<F: FileSystem + ?Sized>(
    set: &mut ResourceSet,
    directives: &[GeneratorDirective],
    files: &FileLoader<'_, F>,
) -> Result<(), BuildError> {
    for directive in directives {
        let entries = collect_entries(directive, files)?;
        match directive.behavior {
            Behavior::Create => {
                let doc = create(directive, entries);
                check_type(&doc, files.descriptor())?;
                debug!("generated {}", doc.id());
                set.push(doc);
            }
            Behavior::Merge | Behavior::Replace => {
                let doc = find_existing(set, directive)?;
                update(doc, directive, entries);
                check_type(doc, files.descriptor())?;
                debug!("updated {} from generator '{}'", doc.id(), directive.name);
            }
        }
    }
    Ok(())
}

fn collect_entries<F: FileSystem + ?Sized>(
    directive: &GeneratorDirective,
    files: &FileLoader<'_, F>,
) -> Result<BTreeMap<String, Entry>, BuildError> {
    let mut entries = BTreeMap::new();
    let mut put = |key: String, entry: Entry| -> Result<(), BuildError> {
        if !is_valid_key(&key) {
            return Err(BuildError::Schema {
                path: files.descriptor().to_path_buf(),
                reason: format!(
                    "generator '{}': key '{key}' must consist of alphanumerics, '-', '_' or '.'",
                    directive.name
                ),
            });
        }
        if entries.insert(key.clone(), entry).is_some() {
            return Err(BuildError::DuplicateKey {
                generator: directive.name.clone(),
                key,
            });
        }
        Ok(())
    };

    for env in &directive.env_files {
        let text = files.read_text(env)?;
        let pairs = parse_env(&text).map_err(|reason| BuildError::Parse {
            path: files.resolve(env),
            reason,
        })?;
        for (key, value) in pairs {
            put(key, Entry::Text(value))?;
        }
    }
    for (key, value) in &directive.literals {
        put(key.clone(), Entry::Text(value.clone()))?;
    }
    for source in &directive.files {
        let bytes = files.read(&source.path)?;
        let key = match &source.key {
            Some(key) => key.clone(),
            None => Path::new(&source.path)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
        };
        let entry = match String::from_utf8(bytes) {
            Ok(text) => Entry::Text(text),
            Err(_) if matches!(directive.kind, GeneratorKind::ByteMap { .. }) => {
                return Err(BuildError::Parse {
                    path: files.resolve(&source.path),
                    reason: "secret sources must be UTF-8 text".to_owned(),
                });
            }
            Err(e) => Entry::Binary(e.into_bytes()),
        };
        put(key, entry)?;
    }
    Ok(entries)
}

fn create(directive: &GeneratorDirective, entries: BTreeMap<String, Entry>) -> Document {
    let mut metadata = Map::new();
    metadata.insert("name".to_owned(), Value::String(directive.name.clone()));
    if let Some(ns) = &directive.namespace {
        metadata.insert("namespace".to_owned(), Value::String(ns.clone()));
    }
    if !directive.labels.is_empty() {
        metadata.insert("labels".to_owned(), string_map(&directive.labels));
    }
    if !directive.annotations.is_empty() {
        metadata.insert("annotations".to_owned(), string_map(&directive.annotations));
    }

    let mut content = Map::new();
    content.insert("apiVersion".to_owned(), Value::String("v1".to_owned()));
    content.insert("kind".to_owned(), Value::String(directive.kind.kind().to_owned()));
    content.insert("metadata".to_owned(), Value::Object(metadata));
    let encoding = match &directive.kind {
        GeneratorKind::ValueMap => DataEncoding::Verbatim,
        GeneratorKind::ByteMap { type_tag } => {
            content.insert("type".to_owned(), Value::String(type_tag.clone()));
            DataEncoding::Base64OnEmit
        }
    };
    store_entries(&mut content, entries, false);
    Document::generated(content, !directive.disable_name_suffix_hash, encoding)
}

fn find_existing<'a>(
    set: &'a mut ResourceSet,
    directive: &GeneratorDirective,
) -> Result<&'a mut Document, BuildError> {
    let kind = directive.kind.kind();
    let behavior = match directive.behavior {
        Behavior::Merge => "merge",
        _ => "replace",
    };
    set.iter_mut()
        .find(|doc| {
            doc.kind() == kind
                && doc.answers_to(&directive.name)
                && directive
                    .namespace
                    .as_deref()
                    .map_or(true, |ns| doc.namespace() == Some(ns))
        })
        .ok_or_else(|| BuildError::TargetNotFound {
            stage: Stage::Generate,
            target: format!("{kind} '{}'", directive.name),
            context: format!("generator behavior {behavior}"),
        })
}

fn update(doc: &mut Document, directive: &GeneratorDirective, entries: BTreeMap<String, Entry>) {
    let encode_now =
        doc.kind() == "Secret" && doc.encoding() == DataEncoding::Verbatim;
    let content = doc.content_mut();
    if directive.behavior == Behavior::Replace {
        content.remove("data");
        content.remove("binaryData");
    }
    store_entries(content, entries, encode_now);

    let metadata = doc.metadata_mut();
    for (field, extra) in [("labels", &directive.labels), ("annotations", &directive.annotations)] {
        if extra.is_empty() {
            continue;
        }
        let map = crate::fieldspec::object_entry(metadata, field);
        for (k, v) in extra {
            map.insert(k.clone(), Value::String(v.clone()));
        }
    }
    let keep_hash = doc.needs_hash() && !directive.disable_name_suffix_hash;
    doc.set_needs_hash(keep_hash);
}

/// Write text entries under `data` and binary ones (base64) under `binaryData`.
fn store_entries(content: &mut Map<String, Value>, entries: BTreeMap<String, Entry>, encode_text: bool) {
    for (key, entry) in entries {
        let (field, value) = match entry {
            Entry::Text(text) if encode_text => ("data", STANDARD.encode(text.as_bytes())),
            Entry::Text(text) => ("data", text),
            Entry::Binary(bytes) => ("binaryData", STANDARD.encode(bytes)),
        };
        crate::fieldspec::object_entry(content, field).insert(key, Value::String(value));
    }
}

/// Keys a well-known Secret type cannot do without.
fn check_type(doc: &Document, descriptor: &Path) -> Result<(), BuildError> {
    if doc.kind() != "Secret" {
        return Ok(());
    }
    let type_tag = doc.content().get("type").and_then(Value::as_str).unwrap_or("Opaque");
    let data = doc.content().get("data").and_then(Value::as_object);
    let has = |key: &str| data.is_some_and(|d| d.contains_key(key));
    let missing = match type_tag {
        "kubernetes.io/tls" if !(has("tls.crt") && has("tls.key")) => Some("'tls.crt' and 'tls.key'"),
        "kubernetes.io/basic-auth" if !(has("username") || has("password")) => {
            Some("'username' or 'password'")
        }
        "kubernetes.io/ssh-auth" if !has("ssh-privatekey") => Some("'ssh-privatekey'"),
        "kubernetes.io/dockerconfigjson" if !has(".dockerconfigjson") => Some("'.dockerconfigjson'"),
        _ => None,
    };
    match missing {
        Some(keys) => Err(BuildError::Schema {
            path: descriptor.to_path_buf(),
            reason: format!("secret '{}' of type {type_tag} requires {keys}", doc.name()),
        }),
        None => Ok(()),
    }
}

/// Append `-<hash>` to every generated document still waiting for one.
pub fn append_hashes(set: &mut ResourceSet) {
    for doc in set.iter_mut() {
        if !doc.needs_hash() {
            continue;
        }
        let hash = content_hash(doc);
        let hashed = format!("{}-{hash}", doc.name());
        debug!("hash suffix {} -> {hashed}", doc.id());
        doc.set_name(hashed);
        doc.set_needs_hash(false);
    }
}

/// Parse `KEY=VALUE` lines. Blank lines and `#` comments are skipped.
pub fn parse_env(text: &str) -> Result<Vec<(String, String)>, String> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut out = Vec::new();
    for (n, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            return Err(format!("line {}: expected KEY=VALUE, got '{line}'", n + 1));
        };
        let key = key.trim();
        if key.is_empty() {
            return Err(format!("line {}: empty key", n + 1));
        }
        out.push((key.to_owned(), value.trim_start().to_owned()));
    }
    Ok(out)
}

fn is_valid_key(key: &str) -> bool {
    !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

fn string_map(map: &BTreeMap<String, String>) -> Value {
    Value::Object(
        map.iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect(),
    )
}
