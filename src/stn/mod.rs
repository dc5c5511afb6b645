//! # Simple temporal networks
//!
//! A plain distance graph: edge `u → v` with weight `w` means `v − u ≤ w`.
//! The network is consistent iff the graph has no negative cycle.
//!
//! | Algorithm | Source | Negative weights | Output |
//! |-----------|--------|------------------|--------|
//! | Bellman-Ford | one node or virtual | yes | potentials |
//! | Dijkstra | one node | only out of the source | potentials |
//! | Floyd-Warshall | all pairs | yes | distance matrix |
//! | Johnson | all pairs | yes | distance matrix |
//! | Yen / Bannister-Eppstein | one node or virtual | yes | potentials |
//! | BFCT | one node or virtual | yes | potentials |
//!
//! Potentials hold `+∞` for nodes not reachable from the source.

pub mod heap;

use std::collections::VecDeque;

use hashbrown::HashMap;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::graph::TNGraph;
use crate::model::NodeId;
use crate::model::weight::{self, Weight};
use crate::{Error, Result};

use heap::IndexedHeap;

// ============================================================================
// Options
// ============================================================================

/// Direction of a single-source computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathMode {
    /// Distances from the source to every node.
    FromSource,
    /// Distances from every node to the source.
    ToSink,
}

/// Node order for the Yen passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeOrder {
    /// Insertion order.
    Fixed,
    /// Random permutation (Bannister-Eppstein).
    Random(u64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StnAlgorithm {
    BellmanFord,
    Dijkstra,
    FloydWarshall,
    Johnson,
    Yen,
    BannisterEppstein { seed: u64 },
    Bfct,
}

// ============================================================================
// Distance matrix
// ============================================================================

/// All-pairs shortest distances. Unreachable pairs hold `+∞`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistanceMatrix {
    n: usize,
    data: Vec<Weight>,
}

impl DistanceMatrix {
    fn new(n: usize) -> Self {
        let mut data = vec![weight::POS_INFINITY; n * n];
        for i in 0..n {
            data[i * n + i] = 0;
        }
        Self { n, data }
    }

    pub fn size(&self) -> usize {
        self.n
    }

    pub fn get(&self, from: NodeId, to: NodeId) -> Weight {
        self.data[from.index() * self.n + to.index()]
    }

    fn set(&mut self, from: usize, to: usize, w: Weight) {
        self.data[from * self.n + to] = w;
    }

    fn at(&self, from: usize, to: usize) -> Weight {
        self.data[from * self.n + to]
    }

    /// Row of distances from one node.
    pub fn row(&self, from: NodeId) -> &[Weight] {
        let start = from.index() * self.n;
        &self.data[start..start + self.n]
    }
}

// ============================================================================
// Stn
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct Stn {
    names: Vec<String>,
    index: HashMap<String, NodeId>,
    edges: HashMap<(usize, usize), Weight>,
    /// `(dst, w)` per source.
    out_adj: Vec<Vec<(usize, Weight)>>,
    /// `(src, w)` per destination.
    in_adj: Vec<Vec<(usize, Weight)>>,
    potentials: Vec<Weight>,
    z: Option<NodeId>,
}

impl Stn {
    pub fn new() -> Self {
        Self::default()
    }

    /// Project a graph whose values all carry the empty label.
    /// Node ids are preserved.
    pub fn from_graph(graph: &TNGraph) -> Result<Self> {
        let mut stn = Stn::new();
        for node in graph.nodes() {
            stn.add_node(&node.name)?;
        }
        stn.z = graph.z();
        for e in graph.edges() {
            if !e.upper_case.is_empty() || e.lower_case.is_some() {
                return Err(Error::WellDefinition(format!(
                    "edge '{}' carries contingent values and cannot be projected to an STN",
                    e.name
                )));
            }
            for (label, w) in e.values.iter() {
                if !label.is_empty() {
                    return Err(Error::WellDefinition(format!(
                        "edge '{}' has a value under label {label}",
                        e.name
                    )));
                }
                match *w {
                    weight::POS_INFINITY => {}
                    weight::NEG_INFINITY => {
                        return Err(Error::Overflow(format!("edge '{}' has weight -∞", e.name)));
                    }
                    w => {
                        stn.add_edge(e.src, e.dst, w);
                    }
                }
            }
        }
        Ok(stn)
    }

    pub fn add_node(&mut self, name: &str) -> Result<NodeId> {
        if self.index.contains_key(name) {
            return Err(Error::Duplicate(format!("node '{name}'")));
        }
        let id = NodeId(self.names.len() as u32);
        self.names.push(name.to_string());
        self.index.insert(name.to_string(), id);
        self.out_adj.push(Vec::new());
        self.in_adj.push(Vec::new());
        self.potentials.push(weight::POS_INFINITY);
        Ok(id)
    }

    /// Add `src → dst: w`; parallel edges keep the minimum.
    /// Returns `true` when the stored weight changed.
    pub fn add_edge(&mut self, src: NodeId, dst: NodeId, w: Weight) -> bool {
        let (u, v) = (src.index(), dst.index());
        match self.edges.get(&(u, v)) {
            Some(&old) if old <= w => return false,
            Some(_) => {
                set_adjacent(&mut self.out_adj[u], v, w);
                set_adjacent(&mut self.in_adj[v], u, w);
            }
            None => {
                self.out_adj[u].push((v, w));
                self.in_adj[v].push((u, w));
            }
        }
        self.edges.insert((u, v), w);
        true
    }

    pub fn weight(&self, src: NodeId, dst: NodeId) -> Option<Weight> {
        self.edges.get(&(src.index(), dst.index())).copied()
    }

    pub fn node_count(&self) -> usize {
        self.names.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn node_by_name(&self, name: &str) -> Option<NodeId> {
        self.index.get(name).copied()
    }

    pub fn name(&self, id: NodeId) -> &str {
        &self.names[id.index()]
    }

    pub fn z(&self) -> Option<NodeId> {
        self.z
    }

    pub fn set_z(&mut self, z: NodeId) {
        self.z = Some(z);
    }

    /// Result of the last single-source run.
    pub fn potential(&self, id: NodeId) -> Weight {
        self.potentials[id.index()]
    }

    pub fn potentials(&self) -> &[Weight] {
        &self.potentials
    }

    /// Run `algorithm` over the whole network. `true` iff consistent.
    ///
    /// Dijkstra starts from Z (or the first node); the others use a virtual
    /// source so that every negative cycle is found.
    pub fn check(&mut self, algorithm: StnAlgorithm) -> Result<bool> {
        let consistent = match algorithm {
            StnAlgorithm::BellmanFord => self.bellman_ford(None, PathMode::FromSource),
            StnAlgorithm::Dijkstra => match self.z.or_else(|| (self.node_count() > 0).then_some(NodeId(0))) {
                Some(source) => self.dijkstra(source, PathMode::FromSource)?,
                None => true,
            },
            StnAlgorithm::FloydWarshall => self.floyd_warshall().is_some(),
            StnAlgorithm::Johnson => self.johnson().is_some(),
            StnAlgorithm::Yen => self.yen(None, PathMode::FromSource, NodeOrder::Fixed),
            StnAlgorithm::BannisterEppstein { seed } => {
                self.yen(None, PathMode::FromSource, NodeOrder::Random(seed))
            }
            StnAlgorithm::Bfct => self.bfct(None, PathMode::FromSource),
        };
        debug!(?algorithm, nodes = self.node_count(), edges = self.edge_count(), consistent, "STN check");
        Ok(consistent)
    }

    fn arcs(&self, mode: PathMode) -> &[Vec<(usize, Weight)>] {
        match mode {
            PathMode::FromSource => &self.out_adj,
            PathMode::ToSink => &self.in_adj,
        }
    }

    /// Initial distances: `0` at the source (every node for the virtual
    /// source), `+∞` elsewhere.
    fn start(&self, source: Option<NodeId>) -> Vec<Weight> {
        match source {
            Some(s) => {
                let mut d = vec![weight::POS_INFINITY; self.node_count()];
                d[s.index()] = 0;
                d
            }
            None => vec![0; self.node_count()],
        }
    }

    // ========================================================================
    // Bellman-Ford
    // ========================================================================

    /// `false` iff a negative cycle is reachable from the source (any
    /// negative cycle with the virtual source `None`).
    pub fn bellman_ford(&mut self, source: Option<NodeId>, mode: PathMode) -> bool {
        let n = self.node_count();
        if n == 0 {
            return true;
        }
        let mut d = self.start(source);
        let arcs = self.arcs(mode);
        let mut consistent = false;
        for _ in 0..n {
            let mut changed = false;
            for (u, out) in arcs.iter().enumerate() {
                if d[u] == weight::POS_INFINITY {
                    continue;
                }
                for &(v, w) in out {
                    let candidate = weight::add(d[u], w);
                    if candidate < d[v] {
                        d[v] = candidate;
                        changed = true;
                    }
                }
            }
            if !changed {
                consistent = true;
                break;
            }
        }
        self.potentials = d;
        consistent
    }

    // ========================================================================
    // Dijkstra
    // ========================================================================

    /// Single-source distances with non-negative weights. Arcs leaving the
    /// source may be negative; any other negative arc is an error. A
    /// negative cycle through the source is reported as `false`.
    pub fn dijkstra(&mut self, source: NodeId, mode: PathMode) -> Result<bool> {
        let s = source.index();
        let arcs = self.arcs(mode);
        for (u, out) in arcs.iter().enumerate() {
            if u == s {
                continue;
            }
            if let Some(&(v, w)) = out.iter().find(|(_, w)| *w < 0) {
                let (a, b) = match mode {
                    PathMode::FromSource => (u, v),
                    PathMode::ToSink => (v, u),
                };
                return Err(Error::NegativeEdge(format!("{} → {} ({w})", self.names[a], self.names[b])));
            }
        }
        let d = dijkstra_from(arcs, s, |_, _, w| w);
        let back_into_source = arcs
            .iter()
            .enumerate()
            .flat_map(|(u, out)| out.iter().map(move |&(v, w)| (u, v, w)))
            .filter(|&(_, v, _)| v == s)
            .any(|(u, _, w)| d[u] != weight::POS_INFINITY && weight::add(d[u], w) < 0);
        self.potentials = d;
        Ok(!back_into_source)
    }

    // ========================================================================
    // All pairs
    // ========================================================================

    /// `None` when the network has a negative cycle.
    pub fn floyd_warshall(&self) -> Option<DistanceMatrix> {
        let n = self.node_count();
        let mut m = DistanceMatrix::new(n);
        for (&(u, v), &w) in &self.edges {
            if w < m.at(u, v) {
                m.set(u, v, w);
            }
        }
        for k in 0..n {
            for i in 0..n {
                let ik = m.at(i, k);
                if ik == weight::POS_INFINITY {
                    continue;
                }
                for j in 0..n {
                    let kj = m.at(k, j);
                    if kj == weight::POS_INFINITY {
                        continue;
                    }
                    let through = weight::add(ik, kj);
                    if through < m.at(i, j) {
                        m.set(i, j, through);
                    }
                }
                if m.at(i, i) < 0 {
                    return None;
                }
            }
        }
        Some(m)
    }

    /// Bellman-Ford potentials, then Dijkstra from every node on reduced
    /// costs `w + h(u) − h(v) ≥ 0`. `None` on a negative cycle.
    pub fn johnson(&self) -> Option<DistanceMatrix> {
        let n = self.node_count();
        let mut reweighted = self.clone();
        if !reweighted.bellman_ford(None, PathMode::FromSource) {
            return None;
        }
        let h = reweighted.potentials;
        let mut m = DistanceMatrix::new(n);
        for s in 0..n {
            let reduced = dijkstra_from(&self.out_adj, s, |u, v, w| w + h[u] - h[v]);
            for (t, rd) in reduced.into_iter().enumerate() {
                if rd != weight::POS_INFINITY {
                    m.set(s, t, rd - h[s] + h[t]);
                }
            }
        }
        Some(m)
    }

    // ========================================================================
    // Yen / Bannister-Eppstein
    // ========================================================================

    /// Bellman-Ford split into a forward and a backward pass over a node
    /// order. Only nodes whose distance changed since their last scan are
    /// scanned again. With `NodeOrder::Random` this is the randomized
    /// variant of Bannister and Eppstein.
    ///
    /// After every round the parent pointers are checked for a cycle, which
    /// can only close through a negative cycle.
    pub fn yen(&mut self, source: Option<NodeId>, mode: PathMode, order: NodeOrder) -> bool {
        let n = self.node_count();
        if n == 0 {
            return true;
        }
        if self.edges.iter().any(|(&(u, v), &w)| u == v && w < 0) {
            return false;
        }
        let mut sequence: Vec<usize> = (0..n).collect();
        if let NodeOrder::Random(seed) = order {
            sequence.shuffle(&mut StdRng::seed_from_u64(seed));
        }
        let mut rank = vec![0usize; n];
        for (r, &u) in sequence.iter().enumerate() {
            rank[u] = r;
        }

        let mut d = self.start(source);
        // [forward, backward]: arcs of `u` still to relax in that pass
        let mut dirty: [Vec<bool>; 2] = {
            let reached: Vec<bool> = d.iter().map(|w| *w != weight::POS_INFINITY).collect();
            [reached.clone(), reached]
        };
        let mut parent: Vec<Option<usize>> = vec![None; n];
        let arcs = self.arcs(mode);
        let mut rounds = 0usize;
        let mut consistent = true;

        while dirty.iter().flatten().any(|x| *x) {
            rounds += 1;
            if rounds > n + 1 {
                consistent = false;
                break;
            }
            for pass in 0..2 {
                for i in 0..n {
                    let u = if pass == 0 { sequence[i] } else { sequence[n - 1 - i] };
                    if !dirty[pass][u] {
                        continue;
                    }
                    dirty[pass][u] = false;
                    for &(v, w) in &arcs[u] {
                        let ahead = if pass == 0 { rank[v] > rank[u] } else { rank[v] < rank[u] };
                        if !ahead {
                            continue;
                        }
                        let candidate = weight::add(d[u], w);
                        if candidate < d[v] {
                            d[v] = candidate;
                            parent[v] = Some(u);
                            dirty[0][v] = true;
                            dirty[1][v] = true;
                        }
                    }
                }
            }
            if has_parent_cycle(&parent) {
                consistent = false;
                break;
            }
            if let Some(s) = source
                && d[s.index()] < 0
            {
                consistent = false;
                break;
            }
        }
        self.potentials = d;
        consistent
    }

    // ========================================================================
    // BFCT
    // ========================================================================

    /// FIFO Bellman-Ford with Tarjan's subtree disassembly: when `v`
    /// improves through `u`, the shortest-path subtree under `v` is detached
    /// and its nodes dequeued. Finding `u` inside that subtree is a negative
    /// cycle.
    pub fn bfct(&mut self, source: Option<NodeId>, mode: PathMode) -> bool {
        let n = self.node_count();
        if n == 0 {
            return true;
        }
        let mut d = self.start(source);
        let mut parent: Vec<Option<usize>> = vec![None; n];
        let mut children: Vec<Vec<usize>> = vec![Vec::new(); n];
        let mut queued = vec![false; n];
        let mut queue = VecDeque::new();
        for u in 0..n {
            if d[u] != weight::POS_INFINITY {
                queue.push_back(u);
                queued[u] = true;
            }
        }
        let arcs = self.arcs(mode);
        let mut consistent = true;

        'scan: while let Some(u) = queue.pop_front() {
            if !queued[u] {
                continue;
            }
            queued[u] = false;
            for &(v, w) in &arcs[u] {
                let candidate = weight::add(d[u], w);
                if candidate >= d[v] {
                    continue;
                }
                if subtree_contains(&children, v, u) {
                    consistent = false;
                    break 'scan;
                }
                disassemble(&mut children, &mut parent, &mut queued, v);
                d[v] = candidate;
                parent[v] = Some(u);
                children[u].push(v);
                if !queued[v] {
                    queued[v] = true;
                    queue.push_back(v);
                }
            }
        }
        self.potentials = d;
        consistent
    }
}

fn set_adjacent(list: &mut [(usize, Weight)], node: usize, w: Weight) {
    if let Some(entry) = list.iter_mut().find(|(n, _)| *n == node) {
        entry.1 = w;
    }
}

/// Dijkstra over `arcs` with `cost(u, v, w)` as the arc length.
fn dijkstra_from(
    arcs: &[Vec<(usize, Weight)>],
    source: usize,
    cost: impl Fn(usize, usize, Weight) -> Weight,
) -> Vec<Weight> {
    let n = arcs.len();
    let mut d = vec![weight::POS_INFINITY; n];
    let mut queue = IndexedHeap::with_capacity(n);
    queue.insert_or_decrease_key(source, 0);
    while let Some((u, du)) = queue.extract_min() {
        d[u] = du;
        for &(v, w) in &arcs[u] {
            queue.insert_or_decrease_key(v, weight::add(du, cost(u, v, w)));
        }
    }
    d
}

/// Does following parent pointers from some node lead back to it?
fn has_parent_cycle(parent: &[Option<usize>]) -> bool {
    // 0 = unvisited, 1 = on the current walk, 2 = known acyclic
    let mut mark = vec![0u8; parent.len()];
    for start in 0..parent.len() {
        let mut x = start;
        while mark[x] == 0 {
            mark[x] = 1;
            match parent[x] {
                Some(p) => x = p,
                None => break,
            }
        }
        if mark[x] == 1 && parent[x].is_some() {
            return true;
        }
        let mut y = start;
        while mark[y] == 1 {
            mark[y] = 2;
            match parent[y] {
                Some(p) => y = p,
                None => break,
            }
        }
    }
    false
}

fn subtree_contains(children: &[Vec<usize>], root: usize, target: usize) -> bool {
    let mut stack = vec![root];
    while let Some(x) = stack.pop() {
        if x == target {
            return true;
        }
        stack.extend(children[x].iter().copied());
    }
    false
}

/// Detach `root` from its parent and drop every proper descendant from the
/// tree and the queue.
fn disassemble(children: &mut [Vec<usize>], parent: &mut [Option<usize>], queued: &mut [bool], root: usize) {
    if let Some(p) = parent[root].take() {
        children[p].retain(|c| *c != root);
    }
    let mut stack = std::mem::take(&mut children[root]);
    while let Some(x) = stack.pop() {
        parent[x] = None;
        queued[x] = false;
        stack.append(&mut children[x]);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const ALL: [StnAlgorithm; 6] = [
        StnAlgorithm::BellmanFord,
        StnAlgorithm::FloydWarshall,
        StnAlgorithm::Johnson,
        StnAlgorithm::Yen,
        StnAlgorithm::BannisterEppstein { seed: 7 },
        StnAlgorithm::Bfct,
    ];

    /// Z → A: 10, A → B: 5, B → Z: -12, Z → B: 20.
    fn triangle() -> (Stn, NodeId, NodeId, NodeId) {
        let mut stn = Stn::new();
        let z = stn.add_node("Z").unwrap();
        let a = stn.add_node("A").unwrap();
        let b = stn.add_node("B").unwrap();
        stn.set_z(z);
        stn.add_edge(z, a, 10);
        stn.add_edge(a, b, 5);
        stn.add_edge(b, z, -12);
        stn.add_edge(z, b, 20);
        (stn, z, a, b)
    }

    #[test]
    fn test_parallel_edges_keep_minimum() {
        let (mut stn, z, a, _) = triangle();
        assert!(!stn.add_edge(z, a, 11));
        assert!(stn.add_edge(z, a, 8));
        assert_eq!(stn.weight(z, a), Some(8));
        assert_eq!(stn.edge_count(), 4);
        assert!(matches!(stn.add_node("A"), Err(Error::Duplicate(_))));
    }

    #[test]
    fn test_bellman_ford_potentials_both_directions() {
        let (mut stn, z, a, b) = triangle();
        assert!(stn.bellman_ford(Some(z), PathMode::FromSource));
        assert_eq!(stn.potentials(), &[0, 10, 15]);
        assert!(stn.bellman_ford(Some(z), PathMode::ToSink));
        assert_eq!((stn.potential(a), stn.potential(b)), (-7, -12));
    }

    #[test]
    fn test_negative_cycle_found_by_every_algorithm() {
        let (mut stn, z, a, _) = triangle();
        stn.add_edge(a, z, -11);
        for algorithm in ALL {
            assert!(!stn.check(algorithm).unwrap(), "{algorithm:?}");
        }
    }

    #[test]
    fn test_consistent_network_passes_every_algorithm() {
        let (mut stn, ..) = triangle();
        for algorithm in ALL {
            assert!(stn.check(algorithm).unwrap(), "{algorithm:?}");
        }
    }

    #[test]
    fn test_dijkstra_rejects_negative_inner_edge() {
        let (mut stn, z, ..) = triangle();
        assert!(matches!(stn.dijkstra(z, PathMode::FromSource), Err(Error::NegativeEdge(_))));
    }

    #[test]
    fn test_dijkstra_allows_negative_source_arcs() {
        let mut stn = Stn::new();
        let s = stn.add_node("S").unwrap();
        let x = stn.add_node("X").unwrap();
        let y = stn.add_node("Y").unwrap();
        stn.add_edge(s, x, -3);
        stn.add_edge(x, y, 2);
        assert!(stn.dijkstra(s, PathMode::FromSource).unwrap());
        assert_eq!(stn.potentials(), &[0, -3, -1]);

        stn.add_edge(y, s, 0);
        assert!(!stn.dijkstra(s, PathMode::FromSource).unwrap());
    }

    #[test]
    fn test_all_pairs_agree() {
        let (stn, z, a, b) = triangle();
        let fw = stn.floyd_warshall().unwrap();
        let johnson = stn.johnson().unwrap();
        assert_eq!(fw, johnson);
        assert_eq!(fw.get(a, z), -7);
        assert_eq!(fw.get(b, a), -2);
        assert_eq!(fw.row(z), &[0, 10, 15]);
    }

    #[test]
    fn test_unreachable_nodes_keep_infinity() {
        let mut stn = Stn::new();
        let s = stn.add_node("S").unwrap();
        let t = stn.add_node("T").unwrap();
        stn.add_edge(t, s, 4);
        assert!(stn.bfct(Some(s), PathMode::FromSource));
        assert_eq!(stn.potential(t), weight::POS_INFINITY);
        assert!(stn.yen(Some(s), PathMode::ToSink, NodeOrder::Fixed));
        assert_eq!(stn.potential(t), 4);
        assert_eq!(stn.floyd_warshall().unwrap().get(s, t), weight::POS_INFINITY);
    }

    #[test]
    fn test_negative_self_loop() {
        let mut stn = Stn::new();
        let x = stn.add_node("X").unwrap();
        stn.add_edge(x, x, -1);
        for algorithm in ALL {
            assert!(!stn.check(algorithm).unwrap(), "{algorithm:?}");
        }
    }

    #[test]
    fn test_from_graph_requires_empty_labels() {
        use crate::model::{Label, Proposition};
        let mut g = TNGraph::new("g");
        let z = g.add_node("Z", Label::EMPTY).unwrap();
        let x = g.add_node("X", Label::EMPTY).unwrap();
        g.set_z(z);
        g.merge_value(z, x, Label::EMPTY, 3);
        let stn = Stn::from_graph(&g).unwrap();
        assert_eq!((stn.z(), stn.weight(z, x)), (Some(z), Some(3)));

        let p = Proposition::from_char('p').unwrap();
        g.add_observer("P?", p, Label::EMPTY).unwrap();
        g.merge_value(x, z, Label::EMPTY.with(p.straight()), -1);
        assert!(matches!(Stn::from_graph(&g), Err(Error::WellDefinition(_))));
    }
}
