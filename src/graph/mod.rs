//! Table dependency graph.
//!
//! Provides:
//! - Edge insertion with cycle rejection
//! - Topological ordering (Kahn's algorithm) for import statements
//! - Start levels for labelling workers at the start barrier

use ahash::AHashMap;
use std::collections::VecDeque;

/// Errors raised while building the dependency graph
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    #[error("relationship {child} -> {parent} would create a cycle")]
    Cycle { child: String, parent: String },

    #[error("unknown table '{0}' in dependency graph")]
    UnknownTable(String),
}

/// Directed acyclic graph of tables.
///
/// An edge `child -> parent` means the child consumes or samples rows of
/// the parent. The graph rejects any edge that would close a cycle, so it is
/// acyclic at all times.
#[derive(Debug, Default, Clone)]
pub struct DependencyGraph {
    names: Vec<String>,
    index: AHashMap<String, usize>,
    /// For each table, the tables it depends on
    parents: Vec<Vec<usize>>,
    /// For each table, the tables that depend on it
    children: Vec<Vec<usize>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a table node. Adding an existing name is a no-op.
    pub fn add_table(&mut self, name: &str) {
        if self.index.contains_key(name) {
            return;
        }
        self.index.insert(name.to_string(), self.names.len());
        self.names.push(name.to_string());
        self.parents.push(Vec::new());
        self.children.push(Vec::new());
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Record that `child` depends on `parent`.
    ///
    /// Duplicate edges are ignored. On error the graph is left unchanged.
    pub fn add_edge(&mut self, child: &str, parent: &str) -> Result<(), GraphError> {
        let c = self.id(child)?;
        let p = self.id(parent)?;

        if c == p || self.is_ancestor(c, p) {
            return Err(GraphError::Cycle {
                child: child.to_string(),
                parent: parent.to_string(),
            });
        }

        if !self.parents[c].contains(&p) {
            self.parents[c].push(p);
        }
        if !self.children[p].contains(&c) {
            self.children[p].push(c);
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Tables `name` depends on, in insertion order
    pub fn parents(&self, name: &str) -> Vec<&str> {
        self.neighbours(name, &self.parents)
    }

    /// Tables depending on `name`, in insertion order
    pub fn children(&self, name: &str) -> Vec<&str> {
        self.neighbours(name, &self.children)
    }

    /// Order tables so parents come before children, or children before
    /// parents when `reverse` is set.
    ///
    /// Ties keep the order in which tables were added.
    pub fn topological_sort(&self, reverse: bool) -> Vec<&str> {
        let n = self.len();
        let mut in_degree: Vec<usize> = self.parents.iter().map(Vec::len).collect();

        let mut queue: VecDeque<usize> = (0..n).filter(|&i| in_degree[i] == 0).collect();
        let mut order = Vec::with_capacity(n);

        while let Some(id) = queue.pop_front() {
            order.push(id);
            for &child in &self.children[id] {
                in_degree[child] -= 1;
                if in_degree[child] == 0 {
                    queue.push_back(child);
                }
            }
        }

        debug_assert_eq!(order.len(), n, "dependency graph contains a cycle");

        if reverse {
            order.reverse();
        }
        order.into_iter().map(|i| self.names[i].as_str()).collect()
    }

    /// Longest-path depth of every table: roots are level 0, a child sits one
    /// level below its deepest parent.
    pub fn levels(&self) -> AHashMap<&str, usize> {
        let mut depth = vec![0usize; self.len()];
        for name in self.topological_sort(false) {
            let id = self.index[name];
            depth[id] = self.parents[id]
                .iter()
                .map(|&p| depth[p] + 1)
                .max()
                .unwrap_or(0);
        }
        self.names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.as_str(), depth[i]))
            .collect()
    }

    fn id(&self, name: &str) -> Result<usize, GraphError> {
        self.index
            .get(name)
            .copied()
            .ok_or_else(|| GraphError::UnknownTable(name.to_string()))
    }

    fn neighbours<'a>(&'a self, name: &str, edges: &[Vec<usize>]) -> Vec<&'a str> {
        match self.index.get(name) {
            Some(&id) => edges[id].iter().map(|&i| self.names[i].as_str()).collect(),
            None => Vec::new(),
        }
    }

    /// Whether `ancestor` is reachable from `descendant` by following parents
    fn is_ancestor(&self, ancestor: usize, descendant: usize) -> bool {
        let mut visited = vec![false; self.len()];
        let mut queue = VecDeque::new();
        queue.push_back(descendant);

        while let Some(current) = queue.pop_front() {
            for &parent in &self.parents[current] {
                if parent == ancestor {
                    return true;
                }
                if !visited[parent] {
                    visited[parent] = true;
                    queue.push_back(parent);
                }
            }
        }

        false
    }
}
