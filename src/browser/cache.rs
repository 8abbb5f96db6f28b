//! Cache of remote directory structure.

use std::collections::{BTreeSet, HashMap};

use crate::remote_path;

/// What is known about one remote directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryNode {
    /// Normalized absolute path.
    pub path: String,
    /// Absolute paths of known subdirectories.
    pub children: BTreeSet<String>,
    /// `children` is complete.
    pub fully_explored: bool,
}

impl DirectoryNode {
    /// A node with no known children.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            children: BTreeSet::new(),
            fully_explored: false,
        }
    }

    /// A node known to have no subdirectories.
    pub fn explored_leaf(path: impl Into<String>) -> Self {
        Self {
            fully_explored: true,
            ..Self::new(path)
        }
    }

    /// Last path segment.
    pub fn name(&self) -> &str {
        remote_path::file_name(&self.path)
    }
}

/// Parse `find <root> -mindepth 1 -maxdepth <max_depth> -type d` output.
///
/// Every directory at depth `d` below `root` becomes a node marked fully
/// explored iff `d < max_depth`: its own children were within reach of the
/// listing. The root is always fully explored. Lines outside `root` or
/// deeper than `max_depth` are ignored.
pub fn parse_listing(root: &str, listing: &str, max_depth: usize) -> HashMap<String, DirectoryNode> {
    let root = remote_path::normalize(root);
    let max_depth = max_depth.max(1);

    let mut nodes = HashMap::new();
    nodes.insert(root.clone(), DirectoryNode::explored_leaf(root.clone()));

    for line in listing.lines() {
        let line = line.trim();
        if !line.starts_with('/') {
            continue;
        }
        let path = remote_path::normalize(line);
        let depth = match remote_path::relative_segments(&root, &path) {
            Some(segments) => segments.len(),
            None => continue,
        };
        if depth == 0 || depth > max_depth {
            continue;
        }

        let node = nodes
            .entry(path.clone())
            .or_insert_with(|| DirectoryNode::new(path.clone()));
        node.fully_explored = depth < max_depth;

        let parent = remote_path::parent(&path);
        nodes
            .entry(parent.clone())
            .or_insert_with(|| DirectoryNode {
                fully_explored: depth - 1 < max_depth,
                ..DirectoryNode::new(parent)
            })
            .children
            .insert(path);
    }

    nodes
}

/// Map of explored remote directories keyed by normalized path.
///
/// Children only ever grow through [`merge`](Self::merge) and
/// [`insert_child`](Self::insert_child); [`invalidate`](Self::invalidate)
/// and [`forget`](Self::forget) are the explicit ways back.
#[derive(Debug, Clone, Default)]
pub struct DirectoryCache {
    nodes: HashMap<String, DirectoryNode>,
}

impl DirectoryCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a node.
    pub fn get(&self, path: &str) -> Option<&DirectoryNode> {
        self.nodes.get(&remote_path::normalize(path))
    }

    /// Whether `path` is cached.
    pub fn contains(&self, path: &str) -> bool {
        self.get(path).is_some()
    }

    /// Number of cached nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Whether `path` must be listed before its children can be shown.
    pub fn needs_fetch(&self, path: &str) -> bool {
        self.get(path).map_or(true, |node| !node.fully_explored)
    }

    /// Merge freshly fetched nodes: children are unioned and a node stays
    /// explored once any fetch explored it.
    pub fn merge(&mut self, fetched: HashMap<String, DirectoryNode>) {
        for (path, node) in fetched {
            match self.nodes.get_mut(&path) {
                Some(existing) => {
                    existing.children.extend(node.children);
                    existing.fully_explored |= node.fully_explored;
                }
                None => {
                    self.nodes.insert(path, node);
                }
            }
        }
    }

    /// Record a newly created directory without listing anything.
    ///
    /// `mkdir -p` may have created several levels, so every missing level
    /// is linked into its parent up to the first ancestor already cached.
    /// Explored flags of cached nodes are left as is; new levels start
    /// unexplored.
    pub fn insert_child(&mut self, child: &str) {
        let child = remote_path::normalize(child);
        if child == "/" {
            return;
        }
        self.nodes
            .entry(child.clone())
            .or_insert_with(|| DirectoryNode::new(child.clone()));

        let mut current = child;
        while current != "/" {
            let parent = remote_path::parent(&current);
            let cached = self.nodes.contains_key(&parent);
            self.nodes
                .entry(parent.clone())
                .or_insert_with(|| DirectoryNode::new(parent.clone()))
                .children
                .insert(current);
            if cached {
                break;
            }
            current = parent;
        }
    }

    /// Drop what is known below `path` so the next visit lists it again.
    pub fn invalidate(&mut self, path: &str) {
        if let Some(node) = self.nodes.get_mut(&remote_path::normalize(path)) {
            node.children.clear();
            node.fully_explored = false;
        }
    }

    /// Remove `path` and everything cached below it, and unlink it from its
    /// parent. Used when the directory turns out not to exist.
    pub fn forget(&mut self, path: &str) {
        let path = remote_path::normalize(path);
        if path == "/" {
            self.invalidate(&path);
            return;
        }
        self.nodes.retain(|key, _| {
            !(key == &path || remote_path::relative_segments(&path, key).is_some())
        });
        if let Some(parent) = self.nodes.get_mut(&remote_path::parent(&path)) {
            parent.children.remove(&path);
        }
    }
}
