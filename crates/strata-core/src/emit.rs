//! Deterministic YAML output.
//!
//! Documents are ordered by kind (or kept in load order), keys are written in
//! lexicographic order, sequences sit at their parent key's indentation, and
//! strings are quoted only when a plain scalar would read back as something
//! else. The same input always renders byte-identically.

use crate::document::{DataEncoding, Document};
use crate::hash::encode_values;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Document order in the output stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReorderMode {
    /// Group by kind so that dependencies are created before dependents.
    #[default]
    Legacy,
    /// Keep load order.
    None,
}

const LEADING_KINDS: &[&str] = &[
    "Namespace",
    "ResourceQuota",
    "StorageClass",
    "CustomResourceDefinition",
    "MutatingWebhookConfiguration",
    "ServiceAccount",
    "PodSecurityPolicy",
    "Role",
    "ClusterRole",
    "RoleBinding",
    "ClusterRoleBinding",
    "ConfigMap",
    "Secret",
    "Service",
    "LimitRange",
    "PriorityClass",
    "Deployment",
    "StatefulSet",
    "CronJob",
    "PodDisruptionBudget",
];

const TRAILING_KINDS: &[&str] = &["ValidatingWebhookConfiguration"];

fn rank(kind: &str) -> usize {
    if let Some(i) = LEADING_KINDS.iter().position(|k| *k == kind) {
        return i;
    }
    if let Some(i) = TRAILING_KINDS.iter().position(|k| *k == kind) {
        return LEADING_KINDS.len() + 1 + i;
    }
    LEADING_KINDS.len()
}

/// Order documents for output. The sort is stable, so kinds of equal rank
/// keep their load order.
pub fn order<'a>(docs: &'a [Document], mode: ReorderMode) -> Vec<&'a Document> {
    let mut out: Vec<&Document> = docs.iter().collect();
    if mode == ReorderMode::Legacy {
        out.sort_by_key(|d| rank(d.kind()));
    }
    out
}

/// Render documents as a `---`-separated stream.
pub fn emit(docs: &[&Document]) -> String {
    let mut out = String::new();
    for (i, doc) in docs.iter().enumerate() {
        if i > 0 {
            out.push_str("---\n");
        }
        out.push_str(&to_yaml(&output_content(doc)));
    }
    out
}

/// Content as it should appear in the output, with deferred encodings applied.
pub fn output_content(doc: &Document) -> Value {
    let mut content = doc.content().clone();
    if doc.encoding() == DataEncoding::Base64OnEmit {
        if let Some(Value::Object(data)) = content.remove("data") {
            content.insert("data".to_owned(), Value::Object(encode_values(data)));
        }
    }
    Value::Object(content)
}

/// Render one value as a YAML document.
pub fn to_yaml(value: &Value) -> String {
    let mut w = Writer::default();
    match value {
        Value::Object(map) if !map.is_empty() => w.map(map, 0, false),
        Value::Array(items) if !items.is_empty() => w.seq(items, 0, false),
        other => {
            w.after_marker(other, 0);
            w.out.remove(0);
        }
    }
    w.out
}

#[derive(Default)]
struct Writer {
    out: String,
}

impl Writer {
    fn pad(&mut self, indent: usize) {
        self.out.extend(std::iter::repeat(' ').take(indent));
    }

    /// Entries at column `indent`. With `inline`, the first key continues the current line.
    fn map(&mut self, map: &Map<String, Value>, indent: usize, inline: bool) {
        let sorted: BTreeMap<&str, &Value> = map.iter().map(|(k, v)| (k.as_str(), v)).collect();
        for (i, (key, value)) in sorted.into_iter().enumerate() {
            if i > 0 || !inline {
                self.pad(indent);
            }
            self.out.push_str(&key_scalar(key));
            self.out.push(':');
            match value {
                Value::Object(m) if !m.is_empty() => {
                    self.out.push('\n');
                    self.map(m, indent + 2, false);
                }
                Value::Array(items) if !items.is_empty() => {
                    self.out.push('\n');
                    self.seq(items, indent, false);
                }
                other => self.after_marker(other, indent),
            }
        }
    }

    /// Items with the dash at column `indent`.
    fn seq(&mut self, items: &[Value], indent: usize, inline: bool) {
        for (i, item) in items.iter().enumerate() {
            if i > 0 || !inline {
                self.pad(indent);
            }
            self.out.push('-');
            match item {
                Value::Object(m) if !m.is_empty() => {
                    self.out.push(' ');
                    self.map(m, indent + 2, true);
                }
                Value::Array(inner) if !inner.is_empty() => {
                    self.out.push(' ');
                    self.seq(inner, indent + 2, true);
                }
                other => self.after_marker(other, indent),
            }
        }
    }

    /// A leaf after `key:` or `-`. Block scalar lines go two columns past `indent`.
    fn after_marker(&mut self, value: &Value, indent: usize) {
        match value {
            Value::Object(_) => self.out.push_str(" {}\n"),
            Value::Array(_) => self.out.push_str(" []\n"),
            Value::Null => self.out.push_str(" null\n"),
            Value::Bool(b) => self.out.push_str(&format!(" {b}\n")),
            Value::Number(n) => self.out.push_str(&format!(" {n}\n")),
            Value::String(s) => match string_style(s) {
                Style::Literal => self.literal(s, indent + 2),
                style => {
                    self.out.push(' ');
                    self.out.push_str(&render_inline(s, style));
                    self.out.push('\n');
                }
            },
        }
    }

    fn literal(&mut self, s: &str, indent: usize) {
        let trailing = s.len() - s.trim_end_matches('\n').len();
        let chomp = match trailing {
            0 => "-",
            1 => "",
            _ => "+",
        };
        // Indentation is otherwise inferred from the first non-empty line.
        let indented = s
            .split('\n')
            .find(|line| !line.is_empty())
            .is_some_and(|line| line.starts_with(' '));
        let indicator = if indented { "2" } else { "" };
        self.out.push_str(&format!(" |{indicator}{chomp}\n"));
        let body = s.strip_suffix('\n').unwrap_or(s);
        for line in body.split('\n') {
            if !line.is_empty() {
                self.pad(indent);
                self.out.push_str(line);
            }
            self.out.push('\n');
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Style {
    Plain,
    Single,
    Double,
    Literal,
}

fn key_scalar(key: &str) -> String {
    let style = match string_style(key) {
        Style::Literal => Style::Double,
        other => other,
    };
    render_inline(key, style)
}

fn render_inline(s: &str, style: Style) -> String {
    match style {
        Style::Plain | Style::Literal => s.to_owned(),
        Style::Single => format!("'{}'", s.replace('\'', "''")),
        Style::Double => double_quoted(s),
    }
}

fn string_style(s: &str) -> Style {
    if s.chars().any(needs_escape) {
        return Style::Double;
    }
    if s.contains('\n') {
        let literal_ok = !s.trim_matches('\n').is_empty()
            && !s.contains('\t')
            && s.split('\n').all(|line| !line.ends_with(' '));
        return if literal_ok { Style::Literal } else { Style::Double };
    }
    if resolves_to_non_string(s) {
        return Style::Double;
    }
    if is_plain_safe(s) {
        Style::Plain
    } else {
        Style::Single
    }
}

fn needs_escape(c: char) -> bool {
    (c.is_control() && c != '\n')
        || matches!(c, '\u{feff}' | '\u{2028}' | '\u{2029}' | '\u{fffe}' | '\u{ffff}')
}

fn double_quoted(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            '\0' => out.push_str("\\0"),
            c if needs_escape(c) => {
                let code = u32::from(c);
                if code <= 0xff {
                    out.push_str(&format!("\\x{code:02X}"));
                } else {
                    out.push_str(&format!("\\u{code:04X}"));
                }
            }
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

const NON_STRING_WORDS: &[&str] = &[
    "y", "Y", "yes", "Yes", "YES", "n", "N", "no", "No", "NO", "true", "True", "TRUE", "false",
    "False", "FALSE", "on", "On", "ON", "off", "Off", "OFF", "null", "Null", "NULL", "~",
    ".inf", ".Inf", ".INF", "+.inf", "+.Inf", "+.INF", "-.inf", "-.Inf", "-.INF", ".nan", ".NaN",
    ".NAN", "<<",
];

/// Whether a plain scalar spelled `s` would load as a bool, null, number or timestamp.
fn resolves_to_non_string(s: &str) -> bool {
    if s.is_empty() || NON_STRING_WORDS.contains(&s) {
        return true;
    }
    let Some(first) = s.chars().next() else {
        return true;
    };
    if !matches!(first, '+' | '-' | '.' | '0'..='9') {
        return false;
    }
    is_int(s) || is_float(s) || is_base60(s) || is_timestamp(s)
}

fn is_int(s: &str) -> bool {
    let digits = s.strip_prefix(['+', '-']).unwrap_or(s).replace('_', "");
    if let Some(hex) = digits.strip_prefix("0x") {
        return !hex.is_empty() && hex.chars().all(|c| c.is_ascii_hexdigit());
    }
    if let Some(bin) = digits.strip_prefix("0b") {
        return !bin.is_empty() && bin.chars().all(|c| matches!(c, '0' | '1'));
    }
    if let Some(oct) = digits.strip_prefix("0o") {
        return !oct.is_empty() && oct.chars().all(|c| matches!(c, '0'..='7'));
    }
    !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())
}

fn is_float(s: &str) -> bool {
    let plain = s.replace('_', "");
    let body = plain.strip_prefix(['+', '-']).unwrap_or(&plain);
    if !body.starts_with(|c: char| c.is_ascii_digit() || c == '.') {
        return false;
    }
    body.chars().any(|c| c.is_ascii_digit()) && plain.parse::<f64>().is_ok()
}

fn is_base60(s: &str) -> bool {
    let body = s.strip_prefix(['+', '-']).unwrap_or(s);
    let mut parts = body.split(':');
    let head_ok = parts
        .next()
        .is_some_and(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit() || c == '_'));
    let rest: Vec<&str> = parts.collect();
    head_ok
        && !rest.is_empty()
        && rest
            .iter()
            .all(|p| (1..=2).contains(&p.len()) && p.chars().all(|c| c.is_ascii_digit()))
}

fn is_timestamp(s: &str) -> bool {
    let bytes = s.as_bytes();
    if bytes.len() < 8 {
        return false;
    }
    let year = bytes.iter().take(4).all(u8::is_ascii_digit);
    let mut parts = s.get(5..).unwrap_or_default().splitn(2, '-');
    let month = parts
        .next()
        .is_some_and(|m| (1..=2).contains(&m.len()) && m.bytes().all(|b| b.is_ascii_digit()));
    let day = parts.next().is_some_and(|rest| {
        let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
        (1..=2).contains(&digits.len())
    });
    year && bytes[4] == b'-' && month && day
}

/// Whether `s` can be written unquoted in block context.
fn is_plain_safe(s: &str) -> bool {
    let Some(first) = s.chars().next() else {
        return false;
    };
    if s.starts_with(' ') || s.ends_with(' ') || s.starts_with("---") || s.starts_with("...") {
        return false;
    }
    if matches!(
        first,
        ',' | '[' | ']' | '{' | '}' | '#' | '&' | '*' | '!' | '|' | '>' | '\'' | '"' | '%' | '@' | '`'
    ) {
        return false;
    }
    if matches!(first, '-' | '?' | ':') {
        match s.chars().nth(1) {
            None | Some(' ') => return false,
            Some(_) => {}
        }
    }
    !(s.contains(": ") || s.contains(" #") || s.ends_with(':'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn nested_maps_and_sequences() {
        let v = json!({
            "b": {"y": 1, "x": [1, "two", {"k": "v", "a": [true]}]},
            "a": "plain",
            "c": {},
            "d": [],
        });
        assert_eq!(
            to_yaml(&v),
            "\
a: plain
b:
  x:
  - 1
  - two
  - a:
    - true
    k: v
  y: 1
c: {}
d: []
"
        );
    }

    #[test]
    fn nested_sequences_share_the_line() {
        assert_eq!(to_yaml(&json!({"m": [[1, 2], [3]]})), "m:\n- - 1\n  - 2\n- - 3\n");
    }

    #[test]
    fn ambiguous_strings_are_double_quoted() {
        for s in ["3", "1.5", "0x1F", "true", "yes", "Off", "null", "~", "", "1e3", "1:20", "2001-12-14"] {
            assert_eq!(string_style(s), Style::Double, "{s:?}");
        }
        assert_eq!(to_yaml(&json!({"replica": "3"})), "replica: \"3\"\n");
    }

    #[test]
    fn plain_and_single_quoted_strings() {
        for s in ["nginx", "apps/v1", "foo-bar", "This is a test annotation", "a:b", "-x", "1.2.3"] {
            assert_eq!(string_style(s), Style::Plain, "{s:?}");
        }
        for s in ["*", "- item", "key: value", "trailing ", "#comment", "a #b", "---", "{x}", "'q'"] {
            assert_eq!(string_style(s), Style::Single, "{s:?}");
        }
        assert_eq!(render_inline("it's", Style::Single), "'it''s'");
    }

    #[test]
    fn multiline_strings_use_literal_blocks() {
        let v = json!({"k": {"script": "echo a\necho b\n", "tail": "x\ny", "keep": "x\n\n"}});
        assert_eq!(
            to_yaml(&v),
            "k:\n  keep: |+\n    x\n\n  script: |\n    echo a\n    echo b\n  tail: |-\n    x\n    y\n"
        );
    }

    #[test]
    fn literal_block_in_sequence_and_leading_space() {
        let v = json!({"l": ["a\nb", "  indented\nx"]});
        assert_eq!(to_yaml(&v), "l:\n- |-\n  a\n  b\n- |2-\n    indented\n  x\n");
    }

    #[test]
    fn literal_blocks_read_back_unchanged() {
        let cases = [
            "\n  indented\n",
            "\n\n  x",
            "  lead\nrest\n",
            "\n\n\nfirst\n  second\n\n",
            "a\n\n  b",
            "x\n\n",
        ];
        for s in cases {
            for value in [json!({"k": s}), json!({"outer": {"k": s}}), json!({"l": ["p", s]})] {
                let yaml = to_yaml(&value);
                let back: Value = serde_yaml::from_str(&yaml).unwrap();
                assert_eq!(back, value, "{s:?} rendered as\n{yaml}");
            }
        }
        assert_eq!(to_yaml(&json!({"k": "\n  indented\n"})), "k: |2\n\n    indented\n");
    }

    #[test]
    fn keys_are_written_in_byte_order() {
        let mut map = Map::new();
        for key in ["zeta", "Beta", "alpha", "_x", "10", "9"] {
            map.insert(key.to_owned(), json!(1));
        }
        assert_eq!(
            to_yaml(&Value::Object(map)),
            "\"10\": 1\n\"9\": 1\nBeta: 1\n_x: 1\nalpha: 1\nzeta: 1\n"
        );
    }

    #[test]
    fn control_characters_force_escapes() {
        assert_eq!(double_quoted("a\tb\u{1}"), "\"a\\tb\\x01\"");
        assert_eq!(string_style("line \nnext"), Style::Double);
    }

    #[test]
    fn legacy_order_groups_by_kind() {
        let doc = |kind: &str, name: &str| {
            Document::from_value(json!({"apiVersion": "v1", "kind": kind, "metadata": {"name": name}}))
                .unwrap()
        };
        let docs = vec![
            doc("Deployment", "d"),
            doc("Widget", "w"),
            doc("ValidatingWebhookConfiguration", "v"),
            doc("Secret", "s"),
            doc("Namespace", "n"),
            doc("ConfigMap", "c"),
            doc("Gadget", "g"),
        ];
        let names: Vec<&str> = order(&docs, ReorderMode::Legacy)
            .iter()
            .map(|d| d.name())
            .collect();
        assert_eq!(names, vec!["n", "c", "s", "d", "w", "g", "v"]);
        let kept: Vec<&str> = order(&docs, ReorderMode::None)
            .iter()
            .map(|d| d.name())
            .collect();
        assert_eq!(kept, vec!["d", "w", "v", "s", "n", "c", "g"]);
    }

    #[test]
    fn generated_secret_data_is_encoded_on_output() {
        let Value::Object(map) = json!({
            "apiVersion": "v1",
            "kind": "Secret",
            "metadata": {"name": "s"},
            "data": {"DB_USERNAME": "admin"},
        }) else {
            unreachable!()
        };
        let doc = Document::generated(map, false, DataEncoding::Base64OnEmit);
        let out = emit(&[&doc]);
        assert!(out.contains("DB_USERNAME: YWRtaW4=\n"), "{out}");
        assert_eq!(doc.content()["data"]["DB_USERNAME"], "admin");
    }

    #[test]
    fn documents_are_separated() {
        let doc = |name: &str| {
            Document::from_value(json!({"apiVersion": "v1", "kind": "ConfigMap", "metadata": {"name": name}}))
                .unwrap()
        };
        let (a, b) = (doc("a"), doc("b"));
        assert_eq!(
            emit(&[&a, &b]),
            "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: a\n---\napiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: b\n"
        );
    }
}
