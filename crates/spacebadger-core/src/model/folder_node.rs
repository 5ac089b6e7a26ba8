/// A single directory in the sized folder tree.
///
/// Unlike an arena of indices, the scanned tree is owned recursively: each
/// node exclusively owns its children, and a finished tree is immutable.
/// Files are never materialised as nodes; they only contribute to their
/// directory's `size` and `file_count`.
use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderNode {
    /// Absolute path, unique within one tree.
    pub path: String,

    /// Final path segment (the whole path for roots like `/`).
    pub name: CompactString,

    /// Bytes of every file directly or transitively inside this folder.
    pub size: u64,

    /// Files directly or transitively inside this folder.
    pub file_count: u64,

    pub children: Vec<FolderNode>,

    /// `false` if listing this directory failed. Says nothing about
    /// descendants, which are simply absent.
    pub is_accessible: bool,
}

impl FolderNode {
    /// Create an empty, accessible folder for `path`.
    pub fn new(path: impl Into<String>) -> Self {
        let path = path.into();
        let name = display_name(&path);
        Self {
            path,
            name,
            size: 0,
            file_count: 0,
            children: Vec::new(),
            is_accessible: true,
        }
    }

    /// Create a placeholder for a directory whose listing failed.
    pub fn new_inaccessible(path: impl Into<String>) -> Self {
        Self {
            is_accessible: false,
            ..Self::new(path)
        }
    }

    /// Attach a finished child and fold its totals into this node.
    pub fn push_child(&mut self, child: FolderNode) {
        self.size += child.size;
        self.file_count += child.file_count;
        self.children.push(child);
    }

    /// Number of folders in this subtree, this node included.
    pub fn folder_count(&self) -> u64 {
        self.iter().count() as u64
    }

    /// Pre-order iterator over this node and every descendant.
    pub fn iter(&self) -> Descendants<'_> {
        Descendants { stack: vec![self] }
    }

    /// Find the node whose path equals `target`.
    ///
    /// Subtrees whose path is not a string prefix of `target` are skipped
    /// without being visited.
    pub fn find(&self, target: &str) -> Option<&FolderNode> {
        if self.path == target {
            return Some(self);
        }
        if !target.starts_with(self.path.as_str()) {
            return None;
        }
        self.children.iter().find_map(|child| child.find(target))
    }

    /// Direct children ordered by size descending, then path.
    pub fn children_sorted_by_size(&self) -> Vec<&FolderNode> {
        let mut children: Vec<&FolderNode> = self.children.iter().collect();
        children.sort_unstable_by(|a, b| b.size.cmp(&a.size).then_with(|| a.path.cmp(&b.path)));
        children
    }

    /// Recursively order children by path so trees built in different
    /// orders (concurrent scan, database reload) compare equal.
    pub fn sort_by_path(&mut self) {
        self.children.sort_unstable_by(|a, b| a.path.cmp(&b.path));
        for child in &mut self.children {
            child.sort_by_path();
        }
    }
}

/// Pre-order traversal without recursion.
pub struct Descendants<'a> {
    stack: Vec<&'a FolderNode>,
}

impl<'a> Iterator for Descendants<'a> {
    type Item = &'a FolderNode;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.stack.extend(node.children.iter().rev());
        Some(node)
    }
}

/// Final segment of `path`, or the path itself when it has none (`/`, `C:\`).
fn display_name(path: &str) -> CompactString {
    match Path::new(path).file_name() {
        Some(name) => CompactString::new(name.to_string_lossy()),
        None => CompactString::new(path),
    }
}
