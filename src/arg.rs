//! Abstract reachability graph.
//!
//! Nodes live in an arena and are addressed by [`NodeId`]. The tree
//! structure is stored on both ends: a node keeps its generating edge
//! (parent and action) and the ids of its children. Coverage is stored on
//! both ends too: `covered_by` on the covered node, `covers` on the
//! covering ones.
//!
//! Ids are never reused. Pruned nodes leave a hole in the arena.

use std::collections::{HashMap, HashSet};
use std::fmt::{Display, Formatter};

use log::debug;

use crate::error::{CegarError, Result};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl Display for NodeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone)]
pub struct ArgEdge<A> {
    pub source: NodeId,
    pub action: A,
    pub target: NodeId,
}

#[derive(Debug, Clone)]
pub struct ArgNode<S, A> {
    id: NodeId,
    state: S,
    in_edge: Option<ArgEdge<A>>,
    children: Vec<NodeId>,
    covered_by: Vec<NodeId>,
    covers: Vec<NodeId>,
    expanded: bool,
    target: bool,
    depth: usize,
    key: u64,
    prec_version: usize,
}

impl<S, A> ArgNode<S, A> {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn state(&self) -> &S {
        &self.state
    }

    pub fn in_edge(&self) -> Option<&ArgEdge<A>> {
        self.in_edge.as_ref()
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.in_edge.as_ref().map(|e| e.source)
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Nodes whose states together subsume this one. Empty if not covered.
    pub fn covered_by(&self) -> &[NodeId] {
        &self.covered_by
    }

    pub fn covers(&self) -> &[NodeId] {
        &self.covers
    }

    pub fn is_covered(&self) -> bool {
        !self.covered_by.is_empty()
    }

    pub fn is_expanded(&self) -> bool {
        self.expanded
    }

    pub fn is_target(&self) -> bool {
        self.target
    }

    /// Neither expanded, covered, nor a target.
    pub fn is_incomplete(&self) -> bool {
        !self.expanded && !self.target && !self.is_covered()
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Projection key: only nodes with equal keys may cover each other.
    pub fn key(&self) -> u64 {
        self.key
    }

    /// Version of the precision the state was computed with.
    pub fn prec_version(&self) -> usize {
        self.prec_version
    }
}

/// What a new node is made of.
#[derive(Debug, Clone)]
pub struct NodeData<S> {
    pub state: S,
    pub target: bool,
    pub key: u64,
    pub prec_version: usize,
}

#[derive(Debug, Clone)]
pub struct Arg<S, A> {
    nodes: Vec<Option<ArgNode<S, A>>>,
    init_nodes: Vec<NodeId>,
    initialized: bool,
    by_key: HashMap<u64, Vec<NodeId>>,
}

impl<S, A> Default for Arg<S, A> {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            init_nodes: Vec::new(),
            initialized: false,
            by_key: HashMap::new(),
        }
    }
}

fn missing(id: NodeId) -> CegarError {
    CegarError::InconsistentArg(format!("node {} does not exist", id))
}

impl<S, A> Arg<S, A> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the initial nodes have been created.
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn set_initialized(&mut self) {
        self.initialized = true;
    }

    pub fn node(&self, id: NodeId) -> Option<&ArgNode<S, A>> {
        self.nodes.get(id.0).and_then(|n| n.as_ref())
    }

    pub fn get(&self, id: NodeId) -> Result<&ArgNode<S, A>> {
        self.node(id).ok_or_else(|| missing(id))
    }

    fn get_mut(&mut self, id: NodeId) -> Result<&mut ArgNode<S, A>> {
        self.nodes
            .get_mut(id.0)
            .and_then(|n| n.as_mut())
            .ok_or_else(|| missing(id))
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.node(id).is_some()
    }

    /// Live nodes in creation order.
    pub fn nodes(&self) -> impl Iterator<Item = &ArgNode<S, A>> {
        self.nodes.iter().flatten()
    }

    pub fn init_nodes(&self) -> &[NodeId] {
        &self.init_nodes
    }

    pub fn size(&self) -> usize {
        self.nodes().count()
    }

    pub fn depth(&self) -> usize {
        self.nodes().map(|n| n.depth).max().unwrap_or(0)
    }

    fn alloc(&mut self, data: NodeData<S>, in_edge: Option<ArgEdge<A>>, depth: usize) -> NodeId {
        let id = NodeId(self.nodes.len());
        let in_edge = in_edge.map(|e| ArgEdge { target: id, ..e });
        self.by_key.entry(data.key).or_default().push(id);
        self.nodes.push(Some(ArgNode {
            id,
            state: data.state,
            in_edge,
            children: Vec::new(),
            covered_by: Vec::new(),
            covers: Vec::new(),
            expanded: false,
            target: data.target,
            depth,
            key: data.key,
            prec_version: data.prec_version,
        }));
        id
    }

    pub fn create_init_node(&mut self, data: NodeData<S>) -> NodeId {
        let id = self.alloc(data, None, 0);
        self.init_nodes.push(id);
        id
    }

    pub fn create_succ_node(&mut self, parent: NodeId, action: A, data: NodeData<S>) -> Result<NodeId> {
        let depth = self.get(parent)?.depth + 1;
        let edge = ArgEdge {
            source: parent,
            action,
            target: parent,
        };
        let id = self.alloc(data, Some(edge), depth);
        self.get_mut(parent)?.children.push(id);
        Ok(id)
    }

    pub fn set_expanded(&mut self, id: NodeId) -> Result<()> {
        self.get_mut(id)?.expanded = true;
        Ok(())
    }

    /// Live nodes with the given projection key.
    pub fn nodes_with_key(&self, key: u64) -> impl Iterator<Item = &ArgNode<S, A>> {
        self.by_key
            .get(&key)
            .into_iter()
            .flatten()
            .filter_map(|&id| self.node(id))
    }

    /// Mark `id` as covered by the union of `by`.
    pub fn cover(&mut self, id: NodeId, by: Vec<NodeId>) -> Result<()> {
        if by.is_empty() || by.contains(&id) {
            return Err(CegarError::InconsistentArg(format!("{} cannot cover itself", id)));
        }
        let node = self.get(id)?;
        if node.is_covered() || !node.children.is_empty() {
            return Err(CegarError::InconsistentArg(format!(
                "{} is already covered or expanded",
                id
            )));
        }
        for &c in &by {
            self.get_mut(c)?.covers.push(id);
        }
        debug!("{} covered by {:?}", id, by);
        self.get_mut(id)?.covered_by = by;
        Ok(())
    }

    pub fn uncover(&mut self, id: NodeId) -> Result<()> {
        let by = std::mem::take(&mut self.get_mut(id)?.covered_by);
        for c in by {
            if let Some(Some(node)) = self.nodes.get_mut(c.0) {
                node.covers.retain(|&x| x != id);
            }
        }
        Ok(())
    }

    /// Nodes of the subtrees rooted at `roots`, roots included.
    pub fn descendants(&self, roots: &[NodeId]) -> Vec<NodeId> {
        let mut res = Vec::new();
        let mut stack: Vec<NodeId> = roots.to_vec();
        while let Some(id) = stack.pop() {
            if let Some(node) = self.node(id) {
                res.push(id);
                stack.extend(node.children.iter().copied());
            }
        }
        res
    }

    /// Remove `id` together with its siblings and all their descendants, and
    /// mark the parent for re-expansion. Pruning an initial node prunes
    /// everything.
    pub fn prune(&mut self, id: NodeId) -> Result<()> {
        let Some(parent) = self.get(id)?.parent() else {
            self.prune_all();
            return Ok(());
        };
        let children = std::mem::take(&mut self.get_mut(parent)?.children);
        let removed = self.descendants(&children);
        debug!("pruning {} node(s) below {}", removed.len(), parent);
        self.remove(&removed)?;
        self.get_mut(parent)?.expanded = false;
        Ok(())
    }

    pub fn prune_all(&mut self) {
        debug!("pruning the whole ARG ({} nodes)", self.size());
        for slot in self.nodes.iter_mut() {
            *slot = None;
        }
        self.init_nodes.clear();
        self.by_key.clear();
        self.initialized = false;
    }

    fn remove(&mut self, ids: &[NodeId]) -> Result<()> {
        let removed: HashSet<NodeId> = ids.iter().copied().collect();
        for &id in ids {
            let (covers, covered_by) = {
                let node = self.get(id)?;
                (node.covers.clone(), node.covered_by.clone())
            };
            // Nodes covered (even partly) by a removed node lose their cover.
            for c in covers {
                if !removed.contains(&c) && self.contains(c) {
                    self.uncover(c)?;
                }
            }
            for c in covered_by {
                if let Some(Some(node)) = self.nodes.get_mut(c.0) {
                    node.covers.retain(|&x| x != id);
                }
            }
        }
        for &id in ids {
            if let Some(node) = self.nodes.get_mut(id.0).and_then(|n| n.take()) {
                if let Some(list) = self.by_key.get_mut(&node.key) {
                    list.retain(|&x| x != id);
                }
            }
        }
        self.init_nodes.retain(|id| !removed.contains(id));
        Ok(())
    }

    /// Nodes that still need to be expanded, in creation order.
    pub fn incomplete_nodes(&self) -> Vec<NodeId> {
        self.nodes()
            .filter(|n| n.is_incomplete())
            .map(|n| n.id)
            .collect()
    }

    pub fn target_nodes(&self) -> Vec<NodeId> {
        self.nodes().filter(|n| n.target).map(|n| n.id).collect()
    }

    /// Initialized, fully expanded and free of targets.
    pub fn is_safe(&self) -> bool {
        self.initialized && self.nodes().all(|n| !n.target && !n.is_incomplete())
    }

    /// Nodes from an initial node down to `id`.
    pub fn path_to(&self, id: NodeId) -> Result<Vec<NodeId>> {
        let mut path = vec![id];
        let mut current = self.get(id)?;
        while let Some(parent) = current.parent() {
            path.push(parent);
            current = self.get(parent)?;
        }
        path.reverse();
        Ok(path)
    }

    /// Check the structural invariants.
    pub fn check_well_formed(&self) -> Result<()> {
        let fail = |msg: String| Err(CegarError::InconsistentArg(msg));
        for node in self.nodes() {
            let id = node.id;
            match &node.in_edge {
                None if !self.init_nodes.contains(&id) => {
                    return fail(format!("{} has no parent and is not initial", id));
                }
                Some(edge) => {
                    let Some(parent) = self.node(edge.source) else {
                        return fail(format!("parent of {} is gone", id));
                    };
                    if edge.target != id || !parent.children.contains(&id) {
                        return fail(format!("edge {} -> {} is broken", edge.source, id));
                    }
                    if parent.depth + 1 != node.depth {
                        return fail(format!("wrong depth at {}", id));
                    }
                }
                None => {}
            }
            if node.is_covered() && !node.children.is_empty() {
                return fail(format!("{} is covered but has children", id));
            }
            if node.target && !node.children.is_empty() {
                return fail(format!("target {} has children", id));
            }
            for c in &node.covered_by {
                match self.node(*c) {
                    Some(by) if by.covers.contains(&id) && by.key == node.key => {}
                    _ => return fail(format!("cover of {} by {} is broken", id, c)),
                }
            }
            for c in &node.covers {
                if !self.node(*c).is_some_and(|n| n.covered_by.contains(&id)) {
                    return fail(format!("{} covers {} one-sidedly", id, c));
                }
            }
        }
        Ok(())
    }
}
