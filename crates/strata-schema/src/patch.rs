use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One JSON-Patch (RFC 6902) operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum PatchOperation {
    Add { path: String, value: Value },
    Remove { path: String },
    Replace { path: String, value: Value },
    Move { from: String, path: String },
    Copy { from: String, path: String },
    Test { path: String, value: Value },
}

impl PatchOperation {
    pub fn path(&self) -> &str {
        match self {
            Self::Add { path, .. }
            | Self::Remove { path }
            | Self::Replace { path, .. }
            | Self::Move { path, .. }
            | Self::Copy { path, .. }
            | Self::Test { path, .. } => path,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Add { .. } => "add",
            Self::Remove { .. } => "remove",
            Self::Replace { .. } => "replace",
            Self::Move { .. } => "move",
            Self::Copy { .. } => "copy",
            Self::Test { .. } => "test",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_operation_list_from_json() {
        let ops: Vec<PatchOperation> = serde_yaml::from_str(
            r#"[
    {"op": "add", "path": "/spec/replica", "value": "3"},
    {"op": "remove", "path": "/metadata/labels/old"},
    {"op": "move", "from": "/a", "path": "/b"}
]"#,
        )
        .unwrap();
        assert_eq!(ops.len(), 3);
        assert_eq!(
            ops[0],
            PatchOperation::Add {
                path: "/spec/replica".to_owned(),
                value: Value::String("3".to_owned()),
            }
        );
        assert_eq!(ops[1].name(), "remove");
        assert_eq!(ops[2].path(), "/b");
    }

    #[test]
    fn parses_operation_list_from_yaml() {
        let ops: Vec<PatchOperation> = serde_yaml::from_str(
            "- op: replace\n  path: /spec/replicas\n  value: 5\n- op: test\n  path: /kind\n  value: Deployment\n",
        )
        .unwrap();
        assert_eq!(ops[0].name(), "replace");
        assert_eq!(
            ops[1],
            PatchOperation::Test {
                path: "/kind".to_owned(),
                value: Value::String("Deployment".to_owned()),
            }
        );
    }

    #[test]
    fn rejects_unknown_op() {
        let res: Result<Vec<PatchOperation>, _> =
            serde_yaml::from_str("- op: frobnicate\n  path: /a\n");
        assert!(res.is_err());
    }

    #[test]
    fn add_requires_value() {
        let res: Result<Vec<PatchOperation>, _> = serde_yaml::from_str("- op: add\n  path: /a\n");
        assert!(res.is_err());
    }
}
