/// Flat, parent-pointer row form of a folder tree, used for storage.
///
/// `flatten` emits rows in pre-order (root first). `reconstruct` accepts
/// rows in any order: pass one indexes every row by path into an arena,
/// pass two wires each row to its parent by looking up `parent_path`.
/// Rows whose parent cannot be resolved are dropped with a warning.
use super::FolderNode;
use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::warn;

/// One persisted row per folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlatFolderNode {
    pub snapshot_id: String,
    pub path: String,
    pub name: CompactString,
    pub size: u64,
    pub file_count: u64,
    /// `None` only for the root row.
    pub parent_path: Option<String>,
    /// Root is depth 0.
    pub depth: u32,
    pub is_accessible: bool,
}

/// Flatten `root` into pre-order rows tagged with `snapshot_id`.
pub fn flatten(root: &FolderNode, snapshot_id: &str) -> Vec<FlatFolderNode> {
    let mut rows = Vec::new();
    let mut stack: Vec<(&FolderNode, Option<&str>, u32)> = vec![(root, None, 0)];

    while let Some((node, parent_path, depth)) = stack.pop() {
        rows.push(FlatFolderNode {
            snapshot_id: snapshot_id.to_string(),
            path: node.path.clone(),
            name: node.name.clone(),
            size: node.size,
            file_count: node.file_count,
            parent_path: parent_path.map(str::to_string),
            depth,
            is_accessible: node.is_accessible,
        });
        // Reverse so the first child is popped first.
        for child in node.children.iter().rev() {
            stack.push((child, Some(node.path.as_str()), depth + 1));
        }
    }

    rows
}

/// Rebuild a tree from rows. Returns `None` when no root row exists.
pub fn reconstruct(rows: Vec<FlatFolderNode>) -> Option<FolderNode> {
    if rows.is_empty() {
        return None;
    }

    // Pass 1: arena of nodes keyed by path.
    let mut arena: Vec<Option<FolderNode>> = Vec::with_capacity(rows.len());
    let mut parents: Vec<Option<String>> = Vec::with_capacity(rows.len());
    let mut index: HashMap<String, usize> = HashMap::with_capacity(rows.len());

    for row in rows {
        if index.contains_key(&row.path) {
            warn!("Duplicate row for {} ignored", row.path);
            continue;
        }
        index.insert(row.path.clone(), arena.len());
        parents.push(row.parent_path);
        arena.push(Some(FolderNode {
            path: row.path,
            name: row.name,
            size: row.size,
            file_count: row.file_count,
            children: Vec::new(),
            is_accessible: row.is_accessible,
        }));
    }

    // Pass 2: resolve parent pointers.
    let mut children: Vec<Vec<usize>> = vec![Vec::new(); arena.len()];
    let mut root: Option<usize> = None;

    for (idx, parent_path) in parents.iter().enumerate() {
        match parent_path {
            None => {
                if let Some(existing) = root {
                    warn!(
                        "Extra root row {} ignored (root is {})",
                        node_path(&arena, idx),
                        node_path(&arena, existing)
                    );
                } else {
                    root = Some(idx);
                }
            }
            Some(parent_path) => match index.get(parent_path) {
                Some(&parent_idx) if parent_idx != idx => children[parent_idx].push(idx),
                _ => warn!(
                    "Parent not found for node: {} (parent: {})",
                    node_path(&arena, idx),
                    parent_path
                ),
            },
        }
    }

    let root = root?;
    Some(assemble(root, &mut arena, &children))
}

/// Move nodes out of the arena into their parents, depth-first.
fn assemble(idx: usize, arena: &mut [Option<FolderNode>], children: &[Vec<usize>]) -> FolderNode {
    let mut node = arena[idx].take().unwrap_or_else(|| FolderNode::new(String::new()));
    node.children = children[idx]
        .iter()
        .map(|&child| assemble(child, arena, children))
        .collect();
    node
}

fn node_path(arena: &[Option<FolderNode>], idx: usize) -> &str {
    arena[idx].as_ref().map_or("<moved>", |n| n.path.as_str())
}
