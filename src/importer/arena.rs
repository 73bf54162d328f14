// ==========================================
// Hierarchy Recon - Import arena
// ==========================================
// Every node touched by one import call lives in a Vec and is addressed by
// NodeIdx. Lookup tables map keys to indices; batch keys are consulted
// before persisted ones. First registration of a key wins.
// ==========================================

use crate::domain::hierarchy::HierarchyNode;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeIdx(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeOrigin {
    Imported,    // built from rows of this batch
    Synthesized, // placeholder for a missing legacy ancestor
    Persisted,   // loaded from the repository, never written by this call
}

#[derive(Debug, Clone)]
pub struct ArenaNode {
    pub node: HierarchyNode,
    pub origin: NodeOrigin,
    pub path: Vec<String>, // collapsed level path, may be empty
    pub parent: Option<NodeIdx>,
    pub group: Option<usize>, // index into the row groups for Imported nodes
}

// ==========================================
// KeyTable
// ==========================================
#[derive(Debug, Default)]
pub struct KeyTable {
    by_hierarchy_id: HashMap<String, NodeIdx>,
    by_xref: HashMap<i64, NodeIdx>,
    by_name: HashMap<String, NodeIdx>,
    by_path: HashMap<Vec<String>, NodeIdx>,
    by_depth_name: HashMap<(usize, String), NodeIdx>,
}

impl KeyTable {
    pub fn register_hierarchy_id(&mut self, hierarchy_id: &str, idx: NodeIdx) {
        self.by_hierarchy_id
            .entry(hierarchy_id.to_string())
            .or_insert(idx);
    }

    pub fn register_xref(&mut self, xref: i64, idx: NodeIdx) {
        self.by_xref.entry(xref).or_insert(idx);
    }

    pub fn register_name(&mut self, name: &str, idx: NodeIdx) {
        self.by_name.entry(name.to_string()).or_insert(idx);
    }

    /// Registers the path and its (depth, last name) pair; empty paths are ignored.
    pub fn register_path(&mut self, path: &[String], idx: NodeIdx) {
        let Some(last) = path.last() else {
            return;
        };
        self.by_path.entry(path.to_vec()).or_insert(idx);
        self.by_depth_name
            .entry((path.len(), last.clone()))
            .or_insert(idx);
    }

    pub fn hierarchy_id(&self, hierarchy_id: &str) -> Option<NodeIdx> {
        self.by_hierarchy_id.get(hierarchy_id).copied()
    }

    pub fn xref(&self, xref: i64) -> Option<NodeIdx> {
        self.by_xref.get(&xref).copied()
    }

    pub fn name(&self, name: &str) -> Option<NodeIdx> {
        self.by_name.get(name).copied()
    }

    pub fn path(&self, path: &[String]) -> Option<NodeIdx> {
        self.by_path.get(path).copied()
    }

    pub fn depth_name(&self, depth: usize, name: &str) -> Option<NodeIdx> {
        self.by_depth_name.get(&(depth, name.to_string())).copied()
    }
}

// ==========================================
// NodeArena
// ==========================================
#[derive(Debug, Default)]
pub struct NodeArena {
    nodes: Vec<ArenaNode>,
    pub batch: KeyTable,
    pub persisted: KeyTable,
}

impl NodeArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load persisted nodes and register them in the persisted table.
    pub fn with_persisted(nodes: Vec<HierarchyNode>) -> Self {
        let mut arena = Self::new();
        for node in nodes {
            let path = node.level_path.clone();
            let idx = arena.push(ArenaNode {
                node,
                origin: NodeOrigin::Persisted,
                path,
                parent: None,
                group: None,
            });
            let entry = &arena.nodes[idx.0];
            let (hid, name, xref, path) = (
                entry.node.hierarchy_id.clone(),
                entry.node.name.clone(),
                entry.node.xref_key,
                entry.path.clone(),
            );
            arena.persisted.register_hierarchy_id(&hid, idx);
            arena.persisted.register_name(&name, idx);
            if let Some(xref) = xref {
                arena.persisted.register_xref(xref, idx);
            }
            arena.persisted.register_path(&path, idx);
        }
        arena
    }

    pub fn push(&mut self, node: ArenaNode) -> NodeIdx {
        self.nodes.push(node);
        NodeIdx(self.nodes.len() - 1)
    }

    pub fn get(&self, idx: NodeIdx) -> &ArenaNode {
        &self.nodes[idx.0]
    }

    pub fn get_mut(&mut self, idx: NodeIdx) -> &mut ArenaNode {
        &mut self.nodes[idx.0]
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeIdx, &ArenaNode)> {
        self.nodes.iter().enumerate().map(|(i, n)| (NodeIdx(i), n))
    }

    // ===== Lookups: batch first, then persisted =====

    pub fn find_by_hierarchy_id(&self, hierarchy_id: &str) -> Option<NodeIdx> {
        self.batch
            .hierarchy_id(hierarchy_id)
            .or_else(|| self.persisted.hierarchy_id(hierarchy_id))
    }

    pub fn find_by_xref(&self, xref: i64) -> Option<NodeIdx> {
        self.batch.xref(xref).or_else(|| self.persisted.xref(xref))
    }

    pub fn find_by_path(&self, path: &[String]) -> Option<NodeIdx> {
        self.batch.path(path).or_else(|| self.persisted.path(path))
    }

    pub fn find_by_depth_name(&self, depth: usize, name: &str) -> Option<NodeIdx> {
        self.batch
            .depth_name(depth, name)
            .or_else(|| self.persisted.depth_name(depth, name))
    }

    /// Persisted node a placeholder may stand for:
    /// same hierarchy id, then same path, then same (depth, name), then same name.
    pub fn find_persisted_match(
        &self,
        hierarchy_id: &str,
        path: &[String],
        name: &str,
    ) -> Option<NodeIdx> {
        self.persisted
            .hierarchy_id(hierarchy_id)
            .or_else(|| self.persisted.path(path))
            .or_else(|| self.persisted.depth_name(path.len(), name))
            .or_else(|| self.persisted.name(name))
    }

    /// True when walking up from `parent` reaches `child` (linking would close a cycle).
    pub fn would_cycle(&self, child: NodeIdx, parent: NodeIdx) -> bool {
        let mut current = Some(parent);
        let mut steps = 0;
        while let Some(idx) = current {
            if idx == child {
                return true;
            }
            steps += 1;
            if steps > self.nodes.len() {
                return true;
            }
            current = self.nodes[idx.0].parent;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn persisted(hid: &str, name: &str, level_path: &[&str]) -> HierarchyNode {
        let mut node = HierarchyNode::new("P1", hid, name);
        node.level_path = path(level_path);
        node
    }

    #[test]
    fn test_batch_shadows_persisted() {
        let mut arena = NodeArena::with_persisted(vec![persisted("REV", "Revenue", &["Revenue"])]);
        assert_eq!(arena.find_by_hierarchy_id("REV"), Some(NodeIdx(0)));

        let idx = arena.push(ArenaNode {
            node: HierarchyNode::new("P1", "REV2", "Revenue"),
            origin: NodeOrigin::Imported,
            path: path(&["Revenue"]),
            parent: None,
            group: Some(0),
        });
        arena.batch.register_path(&path(&["Revenue"]), idx);
        assert_eq!(arena.find_by_path(&path(&["Revenue"])), Some(idx));
        assert_eq!(arena.find_by_depth_name(1, "Revenue"), Some(idx));
    }

    #[test]
    fn test_first_registration_wins() {
        let mut table = KeyTable::default();
        table.register_name("Sales", NodeIdx(1));
        table.register_name("Sales", NodeIdx(2));
        assert_eq!(table.name("Sales"), Some(NodeIdx(1)));
    }

    #[test]
    fn test_persisted_match_order() {
        let arena = NodeArena::with_persisted(vec![
            persisted("A", "Sales", &["Income", "Sales"]),
            persisted("SYNTH_INCOME", "Income", &["Income"]),
        ]);
        assert_eq!(
            arena.find_persisted_match("SYNTH_INCOME", &path(&["X"]), "X"),
            Some(NodeIdx(1))
        );
        assert_eq!(
            arena.find_persisted_match("SYNTH_OTHER", &path(&["Other", "Sales"]), "Sales"),
            Some(NodeIdx(0))
        );
        assert_eq!(arena.find_persisted_match("SYNTH_NONE", &path(&["None"]), "None"), None);
    }

    #[test]
    fn test_would_cycle() {
        let mut arena = NodeArena::new();
        let a = arena.push(ArenaNode {
            node: HierarchyNode::new("P1", "A", "A"),
            origin: NodeOrigin::Imported,
            path: Vec::new(),
            parent: None,
            group: None,
        });
        let b = arena.push(ArenaNode {
            node: HierarchyNode::new("P1", "B", "B"),
            origin: NodeOrigin::Imported,
            path: Vec::new(),
            parent: Some(a),
            group: None,
        });
        assert!(arena.would_cycle(a, b));
        assert!(!arena.would_cycle(b, a));
    }
}
