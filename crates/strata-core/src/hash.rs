use crate::document::{DataEncoding, Document};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use strata_schema::{ContentHash, OutputDigest};

const HASH_LEN: usize = 10;

/// Content hash of a generated ConfigMap or Secret.
///
/// The payload is the compact sorted-key JSON of the kind, an empty name,
/// the data maps and (for Secrets) the type, with Secret values in their
/// base64 form. Only content takes part, so the same data always hashes the
/// same no matter which descriptor or level produced it.
pub fn content_hash(doc: &Document) -> ContentHash {
    let content = doc.content();
    let mut payload = Map::new();
    payload.insert("kind".to_owned(), Value::String(doc.kind().to_owned()));
    payload.insert("name".to_owned(), Value::String(String::new()));

    let data = content.get("data").cloned().unwrap_or(Value::Null);
    if doc.kind() == "Secret" {
        let data = match (doc.encoding(), data) {
            (DataEncoding::Base64OnEmit, Value::Object(map)) => Value::Object(encode_values(map)),
            (_, other) => other,
        };
        payload.insert("data".to_owned(), data);
        let type_tag = content
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or("Opaque");
        payload.insert("type".to_owned(), Value::String(type_tag.to_owned()));
    } else {
        payload.insert("data".to_owned(), data);
        if let Some(Value::Object(binary)) = content.get("binaryData") {
            if !binary.is_empty() {
                payload.insert("binaryData".to_owned(), Value::Object(binary.clone()));
            }
        }
    }

    let mut json = String::new();
    write_sorted(&Value::Object(payload), &mut json);
    let json = escape_html(&json);
    let hex = format!("{:x}", Sha256::digest(json.as_bytes()));
    ContentHash::new(encode(&hex[..HASH_LEN]))
}

/// Digest of a rendered output stream.
pub fn output_digest(output: &str) -> OutputDigest {
    OutputDigest::new(blake3::hash(output.as_bytes()).to_hex().to_string())
}

/// Base64 every string value of a data map.
pub fn encode_values(map: Map<String, Value>) -> Map<String, Value> {
    map.into_iter()
        .map(|(k, v)| match v {
            Value::String(s) => (k, Value::String(STANDARD.encode(s.as_bytes()))),
            other => (k, other),
        })
        .collect()
}

/// Compact JSON with object keys in byte order at every depth.
fn write_sorted(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<&str, &Value> = map.iter().map(|(k, v)| (k.as_str(), v)).collect();
            out.push('{');
            for (i, (key, item)) in sorted.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::from(key).to_string());
                out.push(':');
                write_sorted(item, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_sorted(item, out);
            }
            out.push(']');
        }
        leaf => out.push_str(&leaf.to_string()),
    }
}

// Matches the escaping applied by common JSON encoders for HTML safety.
fn escape_html(json: &str) -> String {
    let mut out = String::with_capacity(json.len());
    for c in json.chars() {
        match c {
            '<' => out.push_str("\\u003c"),
            '>' => out.push_str("\\u003e"),
            '&' => out.push_str("\\u0026"),
            '\u{2028}' => out.push_str("\\u2028"),
            '\u{2029}' => out.push_str("\\u2029"),
            other => out.push(other),
        }
    }
    out
}

// Swap characters that make suffixes read like words or numbers.
fn encode(hex: &str) -> String {
    hex.chars()
        .map(|c| match c {
            '0' => 'g',
            '1' => 'h',
            '3' => 'k',
            'a' => 'm',
            'e' => 't',
            other => other,
        })
        .collect()
}
