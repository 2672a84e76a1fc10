//! Mindmap tree type.

use serde::{Deserialize, Serialize};

/// A node of a generated mindmap.
///
/// Trees built from remote output only exist after passing
/// [`validate_mindmap`](crate::validation::validate_mindmap), so title,
/// depth and fan-out limits hold for every node reachable from a
/// [`MindmapResult`](crate::MindmapResult) root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MindmapNode {
    pub title: String,
    #[serde(default)]
    pub children: Vec<MindmapNode>,
}

impl MindmapNode {
    /// A node without children.
    pub fn leaf(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            children: Vec::new(),
        }
    }

    /// A node with the given children.
    pub fn with_children(title: impl Into<String>, children: Vec<MindmapNode>) -> Self {
        Self {
            title: title.into(),
            children,
        }
    }

    /// Total number of nodes in this subtree, including `self`.
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(Self::node_count).sum::<usize>()
    }

    /// Depth of the deepest node below `self` (a leaf has depth 0).
    pub fn depth(&self) -> usize {
        self.children
            .iter()
            .map(|c| c.depth() + 1)
            .max()
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_and_depth() {
        let tree = MindmapNode::with_children(
            "root",
            vec![
                MindmapNode::with_children("a", vec![MindmapNode::leaf("a1")]),
                MindmapNode::leaf("b"),
            ],
        );
        assert_eq!(tree.node_count(), 4);
        assert_eq!(tree.depth(), 2);
        assert_eq!(MindmapNode::leaf("x").depth(), 0);
    }

    #[test]
    fn children_default_to_empty() {
        let node: MindmapNode = serde_json::from_str(r#"{"title":"solo"}"#).unwrap();
        assert!(node.children.is_empty());
    }
}
