//! # Temporal Network Graph
//!
//! Arena of nodes and edges addressed by stable indices. This is the graph
//! collaborator every engine works against: loaders build it, the
//! initializers repair it, the propagation drivers add derived values to it.
//!
//! ## Layout
//!
//! - `nodes`: dense `Vec<Node>`, `NodeId` is the index.
//! - `edges`: `Vec<Option<Edge>>`, removed edges leave a hole so `EdgeId`s
//!   stay stable for the lifetime of a check.
//! - `out_adj` / `in_adj`: per node, neighbour → edge id. At most one edge
//!   per ordered pair.
//!
//! The graph is `Serialize + Deserialize` through a flat `GraphData` form
//! (nodes, edges, Z/Ω names); adjacency and indexes are rebuilt on load.

use std::fmt;

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use crate::model::*;
use crate::{Error, Result};

/// Default name of the origin node.
pub const Z_NAME: &str = "Z";
/// Default name of the horizon node.
pub const OMEGA_NAME: &str = "Ω";

// ============================================================================
// TNGraph
// ============================================================================

/// A (conditional, possibly contingent) temporal network.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(into = "GraphData", try_from = "GraphData")]
pub struct TNGraph {
    name: String,
    nodes: Vec<Node>,
    edges: Vec<Option<Edge>>,
    out_adj: Vec<HashMap<NodeId, EdgeId>>,
    in_adj: Vec<HashMap<NodeId, EdgeId>>,
    node_index: HashMap<String, NodeId>,
    edge_index: HashMap<String, EdgeId>,
    z: Option<NodeId>,
    omega: Option<NodeId>,
    observers: HashMap<Proposition, NodeId>,
    /// proposition → propositions observed only in scenarios where it is known
    children: HashMap<Proposition, Label>,
    /// contingent node → activation node
    activation_of: HashMap<NodeId, NodeId>,
    edge_count: usize,
}

impl TNGraph {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Self::default() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    // ========================================================================
    // Nodes
    // ========================================================================

    /// Add a node. Names are unique.
    pub fn add_node(&mut self, name: &str, label: Label) -> Result<NodeId> {
        if self.node_index.contains_key(name) {
            return Err(Error::Duplicate(format!("node '{name}'")));
        }
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node::new(id, name).with_label(label));
        self.out_adj.push(HashMap::new());
        self.in_adj.push(HashMap::new());
        self.node_index.insert(name.to_string(), id);
        Ok(id)
    }

    /// Add an observation node for `p`. Each proposition has one observer.
    pub fn add_observer(&mut self, name: &str, p: Proposition, label: Label) -> Result<NodeId> {
        if let Some(other) = self.observers.get(&p) {
            return Err(Error::Duplicate(format!(
                "proposition {p} already observed by '{}'",
                self.nodes[other.index()].name
            )));
        }
        let id = self.add_node(name, label)?;
        self.nodes[id.index()].observes = Some(p);
        self.observers.insert(p, id);
        Ok(id)
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.index()]
    }

    pub fn node_by_name(&self, name: &str) -> Option<NodeId> {
        self.node_index.get(name).copied()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + use<> {
        (0..self.nodes.len() as u32).map(NodeId)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn z(&self) -> Option<NodeId> {
        self.z
    }

    pub fn set_z(&mut self, id: NodeId) {
        self.z = Some(id);
    }

    pub fn omega(&self) -> Option<NodeId> {
        self.omega
    }

    pub fn set_omega(&mut self, id: NodeId) {
        self.omega = Some(id);
    }

    // ========================================================================
    // Observers and propositions
    // ========================================================================

    pub fn observer_of(&self, p: Proposition) -> Option<NodeId> {
        self.observers.get(&p).copied()
    }

    /// `(proposition, observer)` pairs in proposition order.
    pub fn observers(&self) -> Vec<(Proposition, NodeId)> {
        let mut out: Vec<(Proposition, NodeId)> = self.observers.iter().map(|(p, n)| (*p, *n)).collect();
        out.sort();
        out
    }

    /// Propositions in use: observed ones plus any mentioned in a node or
    /// edge label.
    pub fn propositions(&self) -> Vec<Proposition> {
        let mut all = Label::EMPTY;
        let mut add = |l: &Label| {
            for p in l.propositions() {
                all = all.with(p.straight());
            }
        };
        for p in self.observers.keys() {
            add(&Label::of(p.straight()));
        }
        for n in &self.nodes {
            add(&n.label);
        }
        for e in self.edges() {
            for l in e.values.labels() {
                add(l);
            }
        }
        all.propositions().collect()
    }

    /// Propositions observed only once `p` is known.
    pub fn children_of(&self, p: Proposition) -> Label {
        self.children.get(&p).copied().unwrap_or_default()
    }

    pub fn set_children_of(&mut self, p: Proposition, children: Label) {
        self.children.insert(p, children);
    }

    /// Children of the proposition observed by `node`, empty for other nodes.
    pub fn children_of_observer(&self, node: NodeId) -> Label {
        self.node(node).observes.map(|p| self.children_of(p)).unwrap_or_default()
    }

    /// Recompute the children-of relation from observer labels: `q` is a
    /// child of `p` when `p` appears in the label of `q`'s observer, directly
    /// or through a chain of observers.
    pub fn refresh_children(&mut self) {
        self.children.clear();
        for (q, obs) in self.observers() {
            for p in self.node(obs).label.propositions() {
                let entry = self.children.entry(p).or_default();
                *entry = entry.with(q.straight());
            }
        }
        loop {
            let mut changed = false;
            let snapshot: Vec<(Proposition, Label)> = self.children.iter().map(|(p, l)| (*p, *l)).collect();
            for (p, kids) in snapshot {
                let mut closure = kids;
                for q in kids.propositions() {
                    if let Some(grand) = self.children.get(&q) {
                        for r in grand.propositions() {
                            closure = closure.with(r.straight());
                        }
                    }
                }
                if closure != kids {
                    self.children.insert(p, closure);
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }
    }

    // ========================================================================
    // Edges
    // ========================================================================

    /// Add an edge `src → dst`. Fails if the pair already has one.
    pub fn add_edge(&mut self, src: NodeId, dst: NodeId, constraint_type: ConstraintType) -> Result<EdgeId> {
        let name = format!("{}_{}", self.node(src).name, self.node(dst).name);
        self.add_named_edge(&name, src, dst, constraint_type)
    }

    pub fn add_named_edge(
        &mut self,
        name: &str,
        src: NodeId,
        dst: NodeId,
        constraint_type: ConstraintType,
    ) -> Result<EdgeId> {
        if src.index() >= self.nodes.len() {
            return Err(Error::NotFound(format!("Source node {src}")));
        }
        if dst.index() >= self.nodes.len() {
            return Err(Error::NotFound(format!("Target node {dst}")));
        }
        if self.find_edge(src, dst).is_some() {
            return Err(Error::Duplicate(format!(
                "edge {} → {}",
                self.node(src).name,
                self.node(dst).name
            )));
        }
        Ok(self.insert_edge(name, src, dst, constraint_type))
    }

    /// The edge `src → dst`, created with the given type if missing.
    /// Returns the id and whether it was created.
    pub fn ensure_edge(&mut self, src: NodeId, dst: NodeId, constraint_type: ConstraintType) -> (EdgeId, bool) {
        if let Some(id) = self.find_edge(src, dst) {
            return (id, false);
        }
        let name = format!("{}_{}", self.node(src).name, self.node(dst).name);
        (self.insert_edge(&name, src, dst, constraint_type), true)
    }

    fn insert_edge(&mut self, name: &str, src: NodeId, dst: NodeId, constraint_type: ConstraintType) -> EdgeId {
        let mut name = name.to_string();
        while self.edge_index.contains_key(&name) {
            name.push('\'');
        }
        let id = EdgeId(self.edges.len() as u32);
        self.edges.push(Some(Edge::new(id, name.clone(), src, dst, constraint_type)));
        self.out_adj[src.index()].insert(dst, id);
        self.in_adj[dst.index()].insert(src, id);
        self.edge_index.insert(name, id);
        self.edge_count += 1;
        id
    }

    /// Convenience for loaders: merge `(label, w)` into `src → dst`,
    /// creating a requirement edge if needed.
    pub fn merge_value(&mut self, src: NodeId, dst: NodeId, label: Label, w: Weight) -> EdgeId {
        let (id, _) = self.ensure_edge(src, dst, ConstraintType::Requirement);
        self.edge_mut(id).merge_value(label, w);
        id
    }

    /// Add a contingent link `activation ⇒ contingent` with duration in
    /// `[lower, upper]`: edges `A→C: upper` and `C→A: −lower`, both marked
    /// contingent. Lower/upper-case values are added by the initializer.
    pub fn add_contingent_link(
        &mut self,
        activation: NodeId,
        contingent: NodeId,
        lower: Weight,
        upper: Weight,
        label: Label,
    ) -> Result<(EdgeId, EdgeId)> {
        if let Some(prev) = self.activation_of.get(&contingent) {
            return Err(Error::ContingentLink(format!(
                "node '{}' is already contingent on '{}'",
                self.node(contingent).name,
                self.node(*prev).name
            )));
        }
        let ac = self.add_edge(activation, contingent, ConstraintType::Contingent)?;
        let ca = self.add_edge(contingent, activation, ConstraintType::Contingent)?;
        self.edge_mut(ac).merge_value(label, upper);
        self.edge_mut(ca).merge_value(label, -lower);
        self.mark_contingent(activation, contingent);
        Ok((ac, ca))
    }

    /// Register `activation ⇒ contingent` for an existing pair of contingent
    /// edges (used when a loader builds the edges itself).
    pub fn mark_contingent(&mut self, activation: NodeId, contingent: NodeId) {
        let a = self.node_mut(activation);
        a.role = a.role.with_activation();
        let c = self.node_mut(contingent);
        c.role = c.role.with_contingent();
        self.activation_of.insert(contingent, activation);
    }

    pub fn activation_of(&self, contingent: NodeId) -> Option<NodeId> {
        self.activation_of.get(&contingent).copied()
    }

    /// `(activation, contingent)` pairs in contingent-node order.
    pub fn contingent_links(&self) -> Vec<(NodeId, NodeId)> {
        let mut out: Vec<(NodeId, NodeId)> = self.activation_of.iter().map(|(c, a)| (*a, *c)).collect();
        out.sort_by_key(|(_, c)| *c);
        out
    }

    pub fn find_edge(&self, src: NodeId, dst: NodeId) -> Option<EdgeId> {
        self.out_adj.get(src.index())?.get(&dst).copied()
    }

    pub fn edge_by_name(&self, name: &str) -> Option<EdgeId> {
        self.edge_index.get(name).copied()
    }

    /// # Panics
    /// If `id` refers to a removed edge. Use [`try_edge`](Self::try_edge) otherwise.
    pub fn edge(&self, id: EdgeId) -> &Edge {
        self.edges[id.index()].as_ref().expect("edge id refers to a removed edge")
    }

    pub fn edge_mut(&mut self, id: EdgeId) -> &mut Edge {
        self.edges[id.index()].as_mut().expect("edge id refers to a removed edge")
    }

    pub fn try_edge(&self, id: EdgeId) -> Option<&Edge> {
        self.edges.get(id.index()).and_then(Option::as_ref)
    }

    /// Edge between two nodes, if any.
    pub fn edge_between(&self, src: NodeId, dst: NodeId) -> Option<&Edge> {
        self.find_edge(src, dst).map(|id| self.edge(id))
    }

    /// Remove an edge. Returns `true` if it existed.
    pub fn remove_edge(&mut self, id: EdgeId) -> bool {
        let Some(edge) = self.edges.get_mut(id.index()).and_then(Option::take) else {
            return false;
        };
        self.out_adj[edge.src.index()].remove(&edge.dst);
        self.in_adj[edge.dst.index()].remove(&edge.src);
        self.edge_index.remove(&edge.name);
        self.edge_count -= 1;
        true
    }

    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.iter().filter_map(Option::as_ref)
    }

    pub fn edge_ids(&self) -> Vec<EdgeId> {
        self.edges().map(|e| e.id).collect()
    }

    pub fn edge_count(&self) -> usize {
        self.edge_count
    }

    /// Outgoing edges of a node, in edge-id order.
    pub fn out_edges(&self, node: NodeId) -> Vec<EdgeId> {
        let mut v: Vec<EdgeId> = self.out_adj[node.index()].values().copied().collect();
        v.sort_unstable();
        v
    }

    /// Incoming edges of a node, in edge-id order.
    pub fn in_edges(&self, node: NodeId) -> Vec<EdgeId> {
        let mut v: Vec<EdgeId> = self.in_adj[node.index()].values().copied().collect();
        v.sort_unstable();
        v
    }

    /// Total number of labeled values over all edges.
    pub fn value_count(&self) -> usize {
        self.edges().map(Edge::value_count).sum()
    }

    /// `true` when every edge value carries the empty label and there are
    /// no propositions: the network is a plain STN(U).
    pub fn is_unconditional(&self) -> bool {
        self.observers.is_empty()
            && self.nodes.iter().all(|n| n.label.is_empty())
            && self.edges().all(|e| e.values.labels().all(Label::is_empty))
    }
}

// ============================================================================
// Display
// ============================================================================

impl fmt::Display for TNGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "%TNGraph: {}", self.name)?;
        writeln!(f, "%Nodes:")?;
        for n in &self.nodes {
            write!(f, "{} {}", n.name, n.label)?;
            if let Some(p) = n.observes {
                write!(f, " obs {p}")?;
            }
            writeln!(f)?;
        }
        writeln!(f, "%Edges:")?;
        for e in self.edges() {
            write!(
                f,
                "{}: {} → {} {:?} {}",
                e.name,
                self.node(e.src).name,
                self.node(e.dst).name,
                e.constraint_type,
                e.values
            )?;
            for uc in e.upper_case.entries() {
                let names: Vec<&str> = uc.aleph.nodes().map(|n| self.node(n).name.as_str()).collect();
                write!(f, " UC({}, {}, {})", weight::format(uc.weight), uc.label, names.join("∙"))?;
            }
            if let Some(lc) = &e.lower_case {
                write!(f, " LC({}, {}, {})", lc.weight, lc.label, self.node(lc.node).name.to_lowercase())?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

// ============================================================================
// Serialized form
// ============================================================================

/// Flat, serializable form of a `TNGraph`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphData {
    pub name: String,
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    #[serde(default)]
    pub z: Option<String>,
    #[serde(default)]
    pub omega: Option<String>,
}

impl From<TNGraph> for GraphData {
    fn from(g: TNGraph) -> Self {
        let z = g.z.map(|id| g.node(id).name.clone());
        let omega = g.omega.map(|id| g.node(id).name.clone());
        GraphData {
            name: g.name,
            nodes: g.nodes,
            edges: g.edges.into_iter().flatten().collect(),
            z,
            omega,
        }
    }
}

impl TryFrom<GraphData> for TNGraph {
    type Error = Error;

    fn try_from(data: GraphData) -> Result<Self> {
        let mut g = TNGraph::new(data.name);
        let mut remap: HashMap<NodeId, NodeId> = HashMap::new();
        for node in data.nodes {
            let id = match node.observes {
                Some(p) => g.add_observer(&node.name, p, node.label)?,
                None => g.add_node(&node.name, node.label)?,
            };
            g.node_mut(id).role = node.role;
            remap.insert(node.id, id);
        }
        for edge in data.edges {
            let resolve = |old: NodeId| {
                remap
                    .get(&old)
                    .copied()
                    .ok_or_else(|| Error::NotFound(format!("node id {old} of edge '{}'", edge.name)))
            };
            let src = resolve(edge.src)?;
            let dst = resolve(edge.dst)?;
            let id = g.add_named_edge(&edge.name, src, dst, edge.constraint_type)?;
            let contingent_pair = edge.constraint_type == ConstraintType::Contingent
                && g.node(src).is_activation()
                && g.node(dst).is_contingent();
            let e = g.edge_mut(id);
            e.values = edge.values;
            e.upper_case = edge.upper_case;
            e.lower_case = edge.lower_case;
            if contingent_pair {
                g.activation_of.insert(dst, src);
            }
        }
        if let Some(z) = data.z {
            let id = g.node_by_name(&z).ok_or_else(|| Error::NotFound(format!("Z node '{z}'")))?;
            g.set_z(id);
        }
        if let Some(omega) = data.omega {
            let id = g.node_by_name(&omega).ok_or_else(|| Error::NotFound(format!("Ω node '{omega}'")))?;
            g.set_omega(id);
        }
        g.refresh_children();
        Ok(g)
    }
}

// ============================================================================
// Tests
// ============================================================================
