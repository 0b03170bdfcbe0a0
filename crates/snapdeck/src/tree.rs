//! Folder tree - hierarchy of folders built from suite keys
//!
//! Built from scratch on every refresh. Keys are processed in sorted order so
//! that files sharing a folder arrive contiguously and ancestors are
//! registered before their descendants need them.
//!
//! Folders without files of their own are never materialized: a node's
//! parent is the nearest ancestor that holds files (or the root). With
//! `-/a/b/c/f1` and `-/a/g/f2` the tree is `-` → {`-/a/b/c`, `-/a/g`}.

use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tracing::debug;

use crate::error::{IndexError, Result};
use crate::types::{FolderNode, SuiteDict, ROOT_FOLDER};

/// Folder nodes keyed by folder path
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FolderDict {
    nodes: HashMap<String, FolderNode>,
}

impl FolderDict {
    /// Dictionary holding only the synthetic root.
    pub fn with_root() -> Self {
        let mut nodes = HashMap::new();
        nodes.insert(ROOT_FOLDER.to_string(), FolderNode::new(ROOT_FOLDER, None));
        Self { nodes }
    }

    pub fn get(&self, folder_path: &str) -> Option<&FolderNode> {
        self.nodes.get(folder_path)
    }

    pub fn contains(&self, folder_path: &str) -> bool {
        self.nodes.contains_key(folder_path)
    }

    pub fn root(&self) -> &FolderNode {
        &self.nodes[ROOT_FOLDER]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FolderNode)> {
        self.nodes.iter()
    }

    /// Ancestor chain of a folder, nearest first, ending at the root.
    pub fn ancestors(&self, folder_path: &str) -> Vec<&FolderNode> {
        let mut chain = Vec::new();
        let mut current = self
            .nodes
            .get(folder_path)
            .and_then(|n| n.parent_folder_path.as_deref());
        while let Some(path) = current {
            match self.nodes.get(path) {
                Some(node) => {
                    chain.push(node);
                    current = node.parent_folder_path.as_deref();
                }
                None => break,
            }
        }
        chain
    }

    /// Depth-first pre-order walk from the root, children in registration order.
    pub fn walk(&self) -> Vec<(usize, &FolderNode)> {
        let mut out = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![(0usize, ROOT_FOLDER)];
        while let Some((depth, path)) = stack.pop() {
            let Some(node) = self.nodes.get(path) else {
                continue;
            };
            out.push((depth, node));
            for child in node.children_folder_paths.iter().rev() {
                stack.push((depth + 1, child.as_str()));
            }
        }
        out
    }

    /// Check the tree invariants: a parentless root, every other node linked
    /// both ways with its parent, reachable from the root, and each file
    /// listed once.
    pub fn validate(&self) -> Result<()> {
        let root = self
            .nodes
            .get(ROOT_FOLDER)
            .ok_or_else(|| IndexError::TreeInvariant("root folder missing".to_string()))?;
        if root.parent_folder_path.is_some() {
            return Err(IndexError::TreeInvariant("root folder has a parent".to_string()));
        }

        for node in self.nodes.values() {
            let Some(parent_path) = node.parent_folder_path.as_deref() else {
                if node.folder_path != ROOT_FOLDER {
                    return Err(IndexError::TreeInvariant(format!(
                        "folder '{}' has no parent",
                        node.folder_path
                    )));
                }
                continue;
            };
            let parent = self.nodes.get(parent_path).ok_or_else(|| {
                IndexError::TreeInvariant(format!(
                    "folder '{}' points at missing parent '{}'",
                    node.folder_path, parent_path
                ))
            })?;
            if !parent.children_folder_paths.contains(&node.folder_path) {
                return Err(IndexError::TreeInvariant(format!(
                    "parent '{}' does not list child '{}'",
                    parent_path, node.folder_path
                )));
            }
        }

        let walked = self.walk();
        if walked.len() != self.nodes.len() {
            return Err(IndexError::TreeInvariant(format!(
                "{} of {} folders reachable from root",
                walked.len(),
                self.nodes.len()
            )));
        }

        let mut seen = HashSet::new();
        for (_, node) in walked {
            for file in &node.file_paths {
                if !seen.insert(file.as_str()) {
                    return Err(IndexError::TreeInvariant(format!(
                        "file '{}' listed twice",
                        file
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Folder containing a suite key (`-/x/a.snap.js` → `-/x`).
pub fn folder_of(file_key: &str) -> &str {
    file_key
        .rsplit_once('/')
        .map(|(dir, _)| dir)
        .unwrap_or(ROOT_FOLDER)
}

/// Filesystem parent of a folder path, `None` above the root.
fn parent_folder(folder_path: &str) -> Option<&str> {
    if folder_path == ROOT_FOLDER {
        return None;
    }
    folder_path.rsplit_once('/').map(|(parent, _)| parent)
}

/// Build the folder tree for every suite in the dictionary.
pub fn build_tree(suites: &SuiteDict) -> Result<FolderDict> {
    build_tree_from_keys(suites.keys().map(String::as_str))
}

/// Build the folder tree from suite keys.
pub fn build_tree_from_keys<'a, I>(keys: I) -> Result<FolderDict>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut keys: Vec<&str> = keys.into_iter().collect();
    keys.sort_unstable();
    keys.dedup();

    let mut dict = FolderDict::with_root();
    let mut cursor = ROOT_FOLDER.to_string();

    for key in keys {
        let folder = folder_of(key);

        if folder != cursor {
            if !dict.contains(folder) {
                let parent = nearest_registered_ancestor(&dict, folder)?;
                debug!(folder, parent = %parent, "Registering folder");
                if let Some(parent_node) = dict.nodes.get_mut(&parent) {
                    parent_node.children_folder_paths.push(folder.to_string());
                }
                dict.nodes
                    .insert(folder.to_string(), FolderNode::new(folder, Some(parent)));
            }
            cursor.clear();
            cursor.push_str(folder);
        }

        match dict.nodes.get_mut(&cursor) {
            Some(node) => node.file_paths.push(key.to_string()),
            None => {
                return Err(IndexError::TreeInvariant(format!(
                    "cursor folder '{}' is not registered",
                    cursor
                )))
            }
        }
    }

    Ok(dict)
}

/// Walk up from `folder` one level at a time to the first registered folder.
fn nearest_registered_ancestor(dict: &FolderDict, folder: &str) -> Result<String> {
    let mut current = folder;
    while let Some(parent) = parent_folder(current) {
        if dict.contains(parent) {
            return Ok(parent.to_string());
        }
        current = parent;
    }
    Err(IndexError::TreeInvariant(format!(
        "no registered ancestor for folder '{}' (keys must live under '{}/')",
        folder, ROOT_FOLDER
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(keys: &[&str]) -> FolderDict {
        build_tree_from_keys(keys.iter().copied()).unwrap()
    }

    fn node<'a>(dict: &'a FolderDict, path: &str) -> &'a FolderNode {
        dict.get(path)
            .unwrap_or_else(|| panic!("missing folder {path}"))
    }

    #[test]
    fn test_scenario_tree() {
        let dict = build(&["-/x/a.snap.js", "-/x/y/b.snap.js", "-/z/c.snap.js"]);

        assert_eq!(dict.len(), 4);
        let root = node(&dict, "-");
        assert_eq!(root.children_folder_paths, vec!["-/x", "-/z"]);
        assert!(root.file_paths.is_empty());

        let x = node(&dict, "-/x");
        assert_eq!(x.file_paths, vec!["-/x/a.snap.js"]);
        assert_eq!(x.children_folder_paths, vec!["-/x/y"]);
        assert_eq!(x.parent_folder_path.as_deref(), Some("-"));

        let y = node(&dict, "-/x/y");
        assert_eq!(y.file_paths, vec!["-/x/y/b.snap.js"]);
        assert_eq!(y.parent_folder_path.as_deref(), Some("-/x"));

        let z = node(&dict, "-/z");
        assert_eq!(z.file_paths, vec!["-/z/c.snap.js"]);
        dict.validate().unwrap();
    }

    #[test]
    fn test_empty_intermediate_folders_are_skipped() {
        let dict = build(&["-/a/b/c/f1", "-/a/g/f2"]);

        assert_eq!(dict.len(), 3);
        assert!(!dict.contains("-/a"));
        assert!(!dict.contains("-/a/b"));
        assert_eq!(node(&dict, "-/a/b/c").parent_folder_path.as_deref(), Some("-"));
        assert_eq!(node(&dict, "-/a/g").parent_folder_path.as_deref(), Some("-"));
        assert_eq!(dict.root().children_folder_paths, vec!["-/a/b/c", "-/a/g"]);
        dict.validate().unwrap();
    }

    #[test]
    fn test_unsorted_input_is_sorted_first() {
        let sorted = build(&["-/x/a.snap.js", "-/x/y/b.snap.js", "-/z/c.snap.js"]);
        let shuffled = build(&["-/z/c.snap.js", "-/x/y/b.snap.js", "-/x/a.snap.js"]);
        assert_eq!(sorted, shuffled);
    }

    #[test]
    fn test_build_is_idempotent() {
        let keys = ["-/p/q/r.snap.js", "-/p/s.snap.js", "-/t.snap.js", "-/p/q/u.snap.js"];
        assert_eq!(build(&keys), build(&keys));
    }

    #[test]
    fn test_folder_revisited_after_subfolder() {
        // "-/x/y/..." sorts between the two files of "-/x"
        let dict = build(&["-/x/a.snap.js", "-/x/y/b.snap.js", "-/x/z.snap.js"]);

        assert_eq!(dict.len(), 3);
        assert_eq!(
            node(&dict, "-/x").file_paths,
            vec!["-/x/a.snap.js", "-/x/z.snap.js"]
        );
        assert_eq!(node(&dict, "-/x").children_folder_paths, vec!["-/x/y"]);
        dict.validate().unwrap();
    }

    #[test]
    fn test_files_at_root() {
        let dict = build(&["-/a.snap.js", "-/b.snap.js"]);
        assert_eq!(dict.len(), 1);
        assert_eq!(dict.root().file_paths, vec!["-/a.snap.js", "-/b.snap.js"]);
    }

    #[test]
    fn test_deeper_folder_registered_before_its_ancestor() {
        // "-/a/b/c" sorts before "-/a/d", so "-/a" is not registered when
        // "-/a/b/c" is placed and it attaches to the root.
        let dict = build(&["-/a/b/c/f.snap.js", "-/a/d.snap.js"]);
        assert_eq!(node(&dict, "-/a/b/c").parent_folder_path.as_deref(), Some("-"));
        assert_eq!(node(&dict, "-/a").parent_folder_path.as_deref(), Some("-"));
        dict.validate().unwrap();
    }

    #[test]
    fn test_key_outside_root_is_an_invariant_error() {
        let err = build_tree_from_keys(["outside/a.snap.js"]).unwrap_err();
        assert!(matches!(err, IndexError::TreeInvariant(_)));
        assert!(err.to_string().contains("outside"));
    }

    #[test]
    fn test_every_file_listed_exactly_once() {
        let mut keys = Vec::new();
        for a in ["alpha", "beta", "gamma"] {
            for b in ["one", "two"] {
                for f in 0..4 {
                    keys.push(format!("-/{a}/{b}/deep/f{f}.snap.js"));
                    keys.push(format!("-/{a}/{b}/f{f}.snap.js"));
                }
            }
            keys.push(format!("-/{a}/top.snap.js"));
        }
        let dict = build_tree_from_keys(keys.iter().map(String::as_str)).unwrap();
        dict.validate().unwrap();

        let mut listed: Vec<&str> = dict
            .iter()
            .flat_map(|(_, n)| n.file_paths.iter().map(String::as_str))
            .collect();
        listed.sort_unstable();
        let mut expected: Vec<&str> = keys.iter().map(String::as_str).collect();
        expected.sort_unstable();
        assert_eq!(listed, expected);

        for (path, n) in dict.iter() {
            for file in &n.file_paths {
                assert_eq!(folder_of(file), path.as_str());
            }
        }
    }

    #[test]
    fn test_ancestors_and_walk() {
        let dict = build(&["-/x/a.snap.js", "-/x/y/b.snap.js", "-/z/c.snap.js"]);

        let chain: Vec<&str> = dict
            .ancestors("-/x/y")
            .iter()
            .map(|n| n.folder_path.as_str())
            .collect();
        assert_eq!(chain, vec!["-/x", "-"]);
        assert!(dict.ancestors("-").is_empty());

        let walked: Vec<(usize, &str)> = dict
            .walk()
            .into_iter()
            .map(|(d, n)| (d, n.folder_path.as_str()))
            .collect();
        assert_eq!(walked, vec![(0, "-"), (1, "-/x"), (2, "-/x/y"), (1, "-/z")]);
    }

    #[test]
    fn test_folder_of() {
        assert_eq!(folder_of("-/x/a.snap.js"), "-/x");
        assert_eq!(folder_of("-/a.snap.js"), "-");
        assert_eq!(folder_of("loose"), "-");
    }
}
