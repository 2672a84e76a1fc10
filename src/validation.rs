//! Mindmap output parsing and structural validation.
//!
//! Remote output is untrusted. [`parse_mindmap`] turns raw model text into
//! a [`MindmapNode`] tree and then runs [`validate_mindmap`], which enforces
//! the shape limits every stored mindmap must satisfy:
//!
//! | rule                        | code                   |
//! |-----------------------------|------------------------|
//! | title is a non-empty string | `INVALID_TITLE`        |
//! | children is a sequence      | `INVALID_CHILDREN`     |
//! | node depth ≤ 10 (root = 0)  | `MAX_DEPTH_EXCEEDED`   |
//! | ≤ 100 direct children       | `TOO_MANY_CHILDREN`    |
//! | ≤ 500 nodes in the tree     | `TOTAL_NODES_EXCEEDED` |
//!
//! Text that is not JSON at all is `MalformedOutput` (retryable with a
//! stricter prompt); JSON that parses but breaks a rule is a
//! [`ValidationError`].

use std::fmt;

use serde_json::Value;

use crate::types::MindmapNode;
use crate::{AbridgeError, Result};

/// Deepest allowed node depth; the root is at depth 0.
pub const MAX_DEPTH: usize = 10;
/// Most direct children a single node may have.
pub const MAX_CHILDREN: usize = 100;
/// Most nodes a whole tree may have.
pub const MAX_TOTAL_NODES: usize = 500;

/// Which structural rule a tree broke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViolationCode {
    MaxDepthExceeded,
    TooManyChildren,
    TotalNodesExceeded,
    InvalidTitle,
    InvalidChildren,
    InvalidNode,
}

impl ViolationCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MaxDepthExceeded => "MAX_DEPTH_EXCEEDED",
            Self::TooManyChildren => "TOO_MANY_CHILDREN",
            Self::TotalNodesExceeded => "TOTAL_NODES_EXCEEDED",
            Self::InvalidTitle => "INVALID_TITLE",
            Self::InvalidChildren => "INVALID_CHILDREN",
            Self::InvalidNode => "INVALID_NODE",
        }
    }
}

impl fmt::Display for ViolationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A structural rule violation, located by a path such as `root.children[3]`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{code} at {path}: {message}")]
pub struct ValidationError {
    pub code: ViolationCode,
    pub path: String,
    pub message: String,
}

impl ValidationError {
    fn new(code: ViolationCode, path: &str, message: impl Into<String>) -> Self {
        Self {
            code,
            path: path.to_string(),
            message: message.into(),
        }
    }
}

/// Shape limits for a mindmap tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StructureLimits {
    pub max_depth: usize,
    pub max_children: usize,
    pub max_total_nodes: usize,
}

impl Default for StructureLimits {
    fn default() -> Self {
        Self {
            max_depth: MAX_DEPTH,
            max_children: MAX_CHILDREN,
            max_total_nodes: MAX_TOTAL_NODES,
        }
    }
}

/// Validate a tree against the default [`StructureLimits`].
pub fn validate_mindmap(root: &MindmapNode) -> std::result::Result<(), ValidationError> {
    validate_with_limits(root, &StructureLimits::default())
}

/// Validate a tree against explicit limits. Read-only.
pub fn validate_with_limits(
    root: &MindmapNode,
    limits: &StructureLimits,
) -> std::result::Result<(), ValidationError> {
    let mut seen = 0usize;
    validate_node(root, 0, "root", &mut seen, limits)
}

fn validate_node(
    node: &MindmapNode,
    depth: usize,
    path: &str,
    seen: &mut usize,
    limits: &StructureLimits,
) -> std::result::Result<(), ValidationError> {
    if node.title.trim().is_empty() {
        return Err(ValidationError::new(
            ViolationCode::InvalidTitle,
            path,
            "title must be a non-empty string",
        ));
    }
    if depth > limits.max_depth {
        return Err(ValidationError::new(
            ViolationCode::MaxDepthExceeded,
            path,
            format!("depth {depth} exceeds maximum {}", limits.max_depth),
        ));
    }
    if node.children.len() > limits.max_children {
        return Err(ValidationError::new(
            ViolationCode::TooManyChildren,
            path,
            format!(
                "{} children exceeds maximum {}",
                node.children.len(),
                limits.max_children
            ),
        ));
    }
    *seen += 1;
    if *seen > limits.max_total_nodes {
        return Err(ValidationError::new(
            ViolationCode::TotalNodesExceeded,
            path,
            format!("tree exceeds {} nodes", limits.max_total_nodes),
        ));
    }
    for (i, child) in node.children.iter().enumerate() {
        validate_node(child, depth + 1, &format!("{path}.children[{i}]"), seen, limits)?;
    }
    Ok(())
}

/// Parse raw model output into a validated mindmap tree.
///
/// Surrounding markdown code fences are tolerated even though the prompt
/// asks for bare JSON.
pub fn parse_mindmap(raw: &str) -> Result<MindmapNode> {
    let body = strip_code_fence(raw);
    if body.is_empty() {
        return Err(AbridgeError::MalformedOutput(
            "mindmap output is empty".into(),
        ));
    }
    let value: Value = serde_json::from_str(body)
        .map_err(|e| AbridgeError::MalformedOutput(format!("mindmap is not valid JSON: {e}")))?;
    let root = node_from_value(&value, "root")?;
    validate_mindmap(&root)?;
    Ok(root)
}

/// Convert a JSON value into a node, checking only JSON types.
fn node_from_value(value: &Value, path: &str) -> std::result::Result<MindmapNode, ValidationError> {
    let Value::Object(map) = value else {
        return Err(ValidationError::new(
            ViolationCode::InvalidNode,
            path,
            "node must be a JSON object",
        ));
    };
    let Some(Value::String(title)) = map.get("title") else {
        return Err(ValidationError::new(
            ViolationCode::InvalidTitle,
            path,
            "title must be a non-empty string",
        ));
    };
    let children = match map.get("children") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items
            .iter()
            .enumerate()
            .map(|(i, child)| node_from_value(child, &format!("{path}.children[{i}]")))
            .collect::<std::result::Result<Vec<_>, _>>()?,
        Some(_) => {
            return Err(ValidationError::new(
                ViolationCode::InvalidChildren,
                path,
                "children must be an array",
            ));
        }
    };
    Ok(MindmapNode {
        title: title.clone(),
        children,
    })
}

fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string (e.g. "json") on the opening fence line.
    let rest = rest.split_once('\n').map_or("", |(_, body)| body);
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_fences() {
        assert_eq!(strip_code_fence("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("```\n{}\n```  "), "{}");
        assert_eq!(strip_code_fence("  {}  "), "{}");
    }

    #[test]
    fn reports_path_of_violation() {
        let raw = r#"{"title":"root","children":[{"title":"ok"},{"title":""}]}"#;
        let err = parse_mindmap(raw).unwrap_err();
        let AbridgeError::Validation(v) = err else {
            panic!("expected validation error, got {err:?}");
        };
        assert_eq!(v.code, ViolationCode::InvalidTitle);
        assert_eq!(v.path, "root.children[1]");
    }

    #[test]
    fn non_array_children_rejected() {
        let err = parse_mindmap(r#"{"title":"root","children":"nope"}"#).unwrap_err();
        assert!(matches!(
            err,
            AbridgeError::Validation(ValidationError {
                code: ViolationCode::InvalidChildren,
                ..
            })
        ));
    }

    #[test]
    fn prose_is_malformed_output() {
        let err = parse_mindmap("Here is your mindmap!").unwrap_err();
        assert!(matches!(err, AbridgeError::MalformedOutput(_)));
    }
}
