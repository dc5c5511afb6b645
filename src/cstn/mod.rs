//! # CSTN dynamic-consistency checker
//!
//! Fixed-point driver over the labeled rules. Each cycle takes the set of
//! edges changed in the previous cycle, re-runs every rule that involves
//! them and collects the edges that change now. The check ends when a cycle
//! changes nothing (consistent), a negative loop under a resolved label
//! appears (inconsistent), or a budget runs out.
//!
//! ```text
//! init ──► R0 pass ──► cycle: for each pending edge A→B
//!                         ├─ R0 / R3 (observer and sibling roles)
//!                         ├─ LP on A→B→C and C→A→B
//!                         └─ contingent rules (CSTNU only)
//! ```

pub mod init;
pub mod rules;

use std::ops::ControlFlow;
use std::time::Instant;

use chrono::Utc;
use hashbrown::HashSet;
use tracing::{debug, info, trace, warn};

use crate::config::CheckConfig;
use crate::cstnu;
use crate::graph::TNGraph;
use crate::model::weight::{self, Weight};
use crate::model::{ConstraintType, EdgeId, Label, NodeId};
use crate::runtime::{CancelFlag, DcChecker};
use crate::status::{CheckState, CheckStatus, NegativeLoop};
use crate::{Error, Result};

use rules::{Inference, Rule, RuleContext};

// ============================================================================
// Working set
// ============================================================================

/// Edges pending a re-check. An edge already pending is not added twice.
#[derive(Debug, Default)]
pub struct WorkSet {
    members: HashSet<EdgeId>,
}

impl WorkSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// `true` when the edge was not pending yet.
    pub fn insert(&mut self, id: EdgeId) -> bool {
        self.members.insert(id)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Pending edges in id order; the set is left empty.
    pub fn drain_sorted(&mut self) -> Vec<EdgeId> {
        let mut out: Vec<EdgeId> = self.members.drain().collect();
        out.sort_unstable();
        out
    }
}

impl FromIterator<EdgeId> for WorkSet {
    fn from_iter<I: IntoIterator<Item = EdgeId>>(iter: I) -> Self {
        Self { members: iter.into_iter().collect() }
    }
}

// ============================================================================
// Cstn
// ============================================================================

enum Outcome {
    Stable,
    Inconsistent,
    Interrupted(CheckState),
}

/// CSTN checker. Owns the graph for the duration of the check.
#[derive(Debug)]
pub struct Cstn {
    graph: TNGraph,
    config: CheckConfig,
    status: CheckStatus,
    cancel: CancelFlag,
    /// Set while `propagate` runs.
    deadline: Option<Instant>,
    z: NodeId,
    horizon: Weight,
    /// Also run the contingent-link rules (set by the CSTNU checker).
    contingent: bool,
}

impl Cstn {
    pub fn new(graph: TNGraph, config: CheckConfig) -> Self {
        Self {
            graph,
            config,
            status: CheckStatus::new(),
            cancel: CancelFlag::new(),
            deadline: None,
            z: NodeId(0),
            horizon: 0,
            contingent: false,
        }
    }

    pub(crate) fn with_contingent_rules(mut self) -> Self {
        self.contingent = true;
        self
    }

    pub fn with_cancel_flag(mut self, flag: CancelFlag) -> Self {
        self.cancel = flag;
        self
    }

    pub(crate) fn cancel_flag(&self) -> &CancelFlag {
        &self.cancel
    }

    pub fn graph(&self) -> &TNGraph {
        &self.graph
    }

    pub(crate) fn graph_mut(&mut self) -> &mut TNGraph {
        &mut self.graph
    }

    pub fn into_graph(self) -> TNGraph {
        self.graph
    }

    pub fn status(&self) -> &CheckStatus {
        &self.status
    }

    pub(crate) fn status_mut(&mut self) -> &mut CheckStatus {
        &mut self.status
    }

    pub fn config(&self) -> &CheckConfig {
        &self.config
    }

    pub fn horizon(&self) -> Weight {
        self.horizon
    }

    /// Z node, once initialized.
    pub fn z(&self) -> Option<NodeId> {
        self.status.initialized.then_some(self.z)
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Check the network's well-definedness, add Z and the bound edges,
    /// then run one R0 pass.
    pub fn init(&mut self) -> Result<()> {
        if self.status.initialized {
            return Err(Error::AlreadyInitialized);
        }
        let report = init::init_graph(&mut self.graph, &self.config)?;
        self.z = report.z;
        self.horizon = report.horizon;
        self.status.horizon = report.horizon;
        self.status.well_definition_fixes += report.fixes;
        self.status.initialized = true;

        let observer_edges: Vec<EdgeId> = self
            .graph
            .observers()
            .into_iter()
            .flat_map(|(_, obs)| self.graph.out_edges(obs))
            .collect();
        let mut changed = WorkSet::new();
        for id in observer_edges {
            self.run(&mut changed, |ctx| rules::r0(ctx, ctx.graph.edge(id)));
        }
        debug!(rewritten = changed.len(), "initial R0 pass");
        Ok(())
    }

    /// Initialize if needed, then propagate to a fixed point.
    pub fn check(&mut self) -> Result<CheckStatus> {
        if !self.status.initialized {
            self.init()?;
        }
        self.propagate()
    }

    /// Propagate to a fixed point. Requires `init`.
    pub fn propagate(&mut self) -> Result<CheckStatus> {
        if !self.status.initialized {
            return Err(Error::NotInitialized);
        }
        if self.status.finished {
            return Ok(self.status.clone());
        }
        let start = Instant::now();
        self.deadline = Some(start + self.config.timeout);
        self.status.started_at = Some(Utc::now());
        self.status.state = CheckState::Propagating;
        info!(
            network = %self.graph.name(),
            nodes = self.graph.node_count(),
            edges = self.graph.edge_count(),
            propositions = self.graph.propositions().len(),
            horizon = self.horizon,
            semantics = %self.config.dc_semantics,
            contingent = self.contingent,
            "check started"
        );

        let outcome = self.run_cycles();
        self.deadline = None;
        self.status.execution_time = Some(start.elapsed());
        match outcome {
            Outcome::Stable => {
                self.status.state = CheckState::StableConsistent;
                self.status.consistency = true;
                self.status.finished = true;
            }
            Outcome::Inconsistent => {}
            Outcome::Interrupted(state) => {
                warn!(?state, cycles = self.status.cycles, "check interrupted");
                self.status.state = state;
                self.status.consistency = false;
                self.status.finished = false;
                self.status.timeout = state == CheckState::TimedOut;
            }
        }
        info!(
            verdict = ?self.status.state,
            cycles = self.status.cycles,
            rules = self.status.rules.total(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "check finished"
        );
        Ok(self.status.clone())
    }

    /// Run every rule once over every propagation edge and return how many
    /// edges changed. Zero on a graph already at its fixed point.
    pub fn propagation_pass(&mut self) -> Result<usize> {
        if !self.status.initialized {
            return Err(Error::NotInitialized);
        }
        let mut next = WorkSet::new();
        for id in self.initial_edges() {
            if self.process_edge(id, &mut next).is_break() {
                break;
            }
        }
        Ok(next.len())
    }

    fn initial_edges(&self) -> Vec<EdgeId> {
        if self.config.propagate_only_to_z {
            self.graph.in_edges(self.z)
        } else {
            self.graph.edge_ids()
        }
    }

    /// `m · n² · 3^k`, or the configured override.
    pub fn cycle_budget(&self) -> u64 {
        if let Some(limit) = self.config.cycle_limit {
            return limit;
        }
        let m = self.graph.edge_count() as u64;
        let n = self.graph.node_count() as u64;
        let k = self.graph.propositions().len() as u32;
        m.saturating_mul(n.saturating_mul(n))
            .saturating_mul(3u64.saturating_pow(k))
            .max(1)
    }

    fn run_cycles(&mut self) -> Outcome {
        let budget = self.cycle_budget();
        let mut current: WorkSet = self.initial_edges().into_iter().collect();
        while !current.is_empty() {
            if self.status.cycles >= budget {
                return Outcome::Interrupted(CheckState::CycleLimitReached);
            }
            self.status.cycles += 1;
            debug!(cycle = self.status.cycles, pending = current.len(), "propagation cycle");
            let mut next = WorkSet::new();
            for id in current.drain_sorted() {
                if let ControlFlow::Break(outcome) = self.process_edge(id, &mut next) {
                    return outcome;
                }
                if let ControlFlow::Break(outcome) = self.checkpoint() {
                    return outcome;
                }
            }
            current = next;
        }
        Outcome::Stable
    }

    /// Stop on cancellation or once the deadline has passed.
    fn checkpoint(&self) -> ControlFlow<Outcome> {
        if self.cancel.is_cancelled() {
            ControlFlow::Break(Outcome::Interrupted(CheckState::Cancelled))
        } else if self.deadline.is_some_and(|d| Instant::now() >= d) {
            ControlFlow::Break(Outcome::Interrupted(CheckState::TimedOut))
        } else {
            ControlFlow::Continue(())
        }
    }

    // ========================================================================
    // Rule application
    // ========================================================================

    /// Re-check one edge `A → B`. Breaks on a negative loop, and after a
    /// triangle batch once the run is cancelled or out of time.
    fn process_edge(&mut self, id: EdgeId, next: &mut WorkSet) -> ControlFlow<Outcome> {
        let Some(edge) = self.graph.try_edge(id) else {
            return ControlFlow::Continue(());
        };
        let (a, b) = (edge.src, edge.dst);
        let only_to_z = self.config.propagate_only_to_z;
        if only_to_z && b != self.z {
            return ControlFlow::Continue(());
        }

        if !self.observation_rules(id, a, b, next) {
            return ControlFlow::Break(Outcome::Inconsistent);
        }

        if !only_to_z {
            for second in self.graph.out_edges(b) {
                if !self.triangle(id, second, next) {
                    return ControlFlow::Break(Outcome::Inconsistent);
                }
            }
            self.checkpoint()?;
        }
        for first in self.graph.in_edges(a) {
            if !self.triangle(first, id, next) {
                return ControlFlow::Break(Outcome::Inconsistent);
            }
        }
        self.checkpoint()?;

        if self.contingent && !self.run(next, |ctx| cstnu::rules::letter_removal(ctx, ctx.graph.edge(id))) {
            return ControlFlow::Break(Outcome::Inconsistent);
        }
        ControlFlow::Continue(())
    }

    /// R0 and R3 with `A → B` as the observer edge, then as the sibling.
    fn observation_rules(&mut self, id: EdgeId, a: NodeId, b: NodeId, next: &mut WorkSet) -> bool {
        let is_observer = self.graph.node(a).is_observer();
        if is_observer {
            if !self.run(next, |ctx| rules::r0(ctx, ctx.graph.edge(id))) {
                return false;
            }
            for sibling in self.graph.in_edges(b) {
                if sibling != id && !self.run(next, |ctx| rules::r3(ctx, ctx.graph.edge(id), ctx.graph.edge(sibling))) {
                    return false;
                }
            }
        }

        for p in edge_propositions(&self.graph, id) {
            let Some(obs) = self.graph.observer_of(p) else { continue };
            if obs == a || obs == b {
                continue;
            }
            let Some(observer_edge) = self.graph.find_edge(obs, b) else { continue };
            if !self.run(next, |ctx| rules::r3(ctx, ctx.graph.edge(observer_edge), ctx.graph.edge(id))) {
                return false;
            }
        }

        if is_observer && !self.run(next, |ctx| rules::r0(ctx, ctx.graph.edge(id))) {
            return false;
        }
        true
    }

    /// Rules closing `first = A → B`, `second = B → C` into `A → C`.
    fn triangle(&mut self, first: EdgeId, second: EdgeId, next: &mut WorkSet) -> bool {
        let contingent = self.contingent;
        self.run(next, |ctx| {
            let (ab, bc) = (ctx.graph.edge(first), ctx.graph.edge(second));
            let mut out = rules::labeled_propagation(ctx, ab, bc);
            if contingent {
                out.extend(cstnu::rules::triangle(ctx, ab, bc));
            }
            out
        })
    }

    /// Evaluate a rule against the current graph and merge what it derives.
    fn run<F>(&mut self, next: &mut WorkSet, rule: F) -> bool
    where
        F: FnOnce(&RuleContext<'_>) -> Vec<Inference>,
    {
        let inferences = {
            let ctx = RuleContext::new(&self.graph, self.config.dc_semantics, self.z).with_horizon(self.horizon);
            rule(&ctx)
        };
        self.apply(inferences, next)
    }

    fn apply(&mut self, inferences: Vec<Inference>, next: &mut WorkSet) -> bool {
        for inference in inferences {
            match inference {
                Inference::NegativeLoop { node, label, weight } => {
                    let name = self.graph.node(node).name.clone();
                    info!(node = %name, %label, weight = %weight::format(weight), "negative loop");
                    self.status.set_inconsistent(NegativeLoop { node: name, label: label.to_string(), weight });
                    return false;
                }
                Inference::Value(d) => {
                    if self.config.propagate_only_to_z && d.dst != self.z {
                        continue;
                    }
                    let (id, created) = self.graph.ensure_edge(d.src, d.dst, ConstraintType::Derived);
                    let edge = self.graph.edge_mut(id);
                    let changed = if d.aleph.is_empty() {
                        edge.merge_value(d.label, d.weight)
                    } else {
                        edge.merge_upper_case(d.label, d.aleph.clone(), d.weight)
                    };
                    if changed {
                        self.count(d.rule);
                        trace!(
                            rule = %d.rule,
                            edge = %self.graph.edge(id).name,
                            label = %d.label,
                            aleph = %d.aleph,
                            weight = %weight::format(d.weight),
                            "value derived"
                        );
                        next.insert(id);
                    } else if created {
                        self.graph.remove_edge(id);
                    }
                }
            }
        }
        true
    }

    fn count(&mut self, rule: Rule) {
        let counters = &mut self.status.rules;
        match rule {
            Rule::R0 => counters.r0 += 1,
            Rule::R3 => counters.r3 += 1,
            Rule::LabeledPropagation => counters.labeled_propagation += 1,
            Rule::UpperCase => counters.upper_case += 1,
            Rule::LowerCase => counters.lower_case += 1,
            Rule::CrossCase => counters.cross_case += 1,
            Rule::LetterRemoval => counters.letter_removal += 1,
        }
    }

    // ========================================================================
    // Output
    // ========================================================================

    /// Copy of the graph without q-labeled finite values, horizon bounds and
    /// edges left empty by the cleaning.
    pub fn cleaned_graph(&self) -> TNGraph {
        let mut g = self.graph.clone();
        let (z, horizon) = (self.z, self.horizon);
        for id in g.edge_ids() {
            let edge = g.edge_mut(id);
            let is_bound = edge.constraint_type == ConstraintType::Internal && edge.src == z;
            edge.values.retain(|l, w| {
                !(l.contains_unknown() && w != weight::NEG_INFINITY) && !(is_bound && w == horizon)
            });
            edge.upper_case.retain(|l, _, w| !(l.contains_unknown() && w != weight::NEG_INFINITY));
            let removable = matches!(edge.constraint_type, ConstraintType::Derived | ConstraintType::Internal);
            if removable && edge.is_empty() {
                g.remove_edge(id);
            }
        }
        g
    }
}

/// Propositions mentioned by any ordinary or upper-case value of an edge.
fn edge_propositions(graph: &TNGraph, id: EdgeId) -> Vec<crate::model::Proposition> {
    let e = graph.edge(id);
    let mut all = Label::EMPTY;
    for label in e.values.labels() {
        for p in label.propositions() {
            all = all.with(p.straight());
        }
    }
    for uc in e.upper_case.entries() {
        for p in uc.label.propositions() {
            all = all.with(p.straight());
        }
    }
    all.propositions().collect()
}

impl DcChecker for Cstn {
    fn check(&mut self) -> Result<CheckStatus> {
        Cstn::check(self)
    }

    fn status(&self) -> &CheckStatus {
        &self.status
    }

    fn graph(&self) -> &TNGraph {
        &self.graph
    }

    fn set_cancel_flag(&mut self, flag: CancelFlag) {
        self.cancel = flag;
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DcSemantics;
    use crate::model::Proposition;

    fn l(s: &str) -> Label {
        Label::parse(s).unwrap()
    }

    fn p(c: char) -> Proposition {
        Proposition::from_char(c).unwrap()
    }

    #[test]
    fn test_workset_dedup_and_order() {
        let mut ws = WorkSet::new();
        assert!(ws.insert(EdgeId(4)));
        assert!(ws.insert(EdgeId(1)));
        assert!(!ws.insert(EdgeId(4)));
        assert_eq!(ws.len(), 2);
        assert_eq!(ws.drain_sorted(), vec![EdgeId(1), EdgeId(4)]);
        assert!(ws.is_empty());
    }

    #[test]
    fn test_contract_violations() {
        let mut g = TNGraph::new("t");
        g.add_node("Z", Label::EMPTY).unwrap();
        let mut cstn = Cstn::new(g, CheckConfig::default());
        assert!(matches!(cstn.propagate(), Err(Error::NotInitialized)));
        assert!(matches!(cstn.propagation_pass(), Err(Error::NotInitialized)));
        cstn.init().unwrap();
        assert!(matches!(cstn.init(), Err(Error::AlreadyInitialized)));
    }

    #[test]
    fn test_initial_r0_pass_rewrites_observer_edges() {
        let mut g = TNGraph::new("t");
        let z = g.add_node("Z", Label::EMPTY).unwrap();
        let obs = g.add_observer("P?", p('p'), Label::EMPTY).unwrap();
        let x = g.add_node("X", Label::EMPTY).unwrap();
        g.set_z(z);
        let e = g.merge_value(obs, x, l("p"), -3);
        let mut cstn = Cstn::new(g, CheckConfig::default());
        cstn.init().unwrap();
        assert_eq!(cstn.graph().edge(e).values.get(&Label::EMPTY), Some(-3));
        assert_eq!(cstn.graph().edge(e).values.get(&l("p")), None);
        assert_eq!(cstn.status().rules.r0, 1);
    }

    #[test]
    fn test_cycle_budget_override() {
        let mut g = TNGraph::new("t");
        g.add_node("Z", Label::EMPTY).unwrap();
        let cstn = Cstn::new(g, CheckConfig::default().with_cycle_limit(7));
        assert_eq!(cstn.cycle_budget(), 7);
    }

    #[test]
    fn test_cycle_limit_is_inconclusive() {
        let mut g = TNGraph::new("t");
        let z = g.add_node("Z", Label::EMPTY).unwrap();
        let a = g.add_node("A", Label::EMPTY).unwrap();
        let b = g.add_node("B", Label::EMPTY).unwrap();
        g.set_z(z);
        g.merge_value(a, b, Label::EMPTY, -1);
        g.merge_value(b, a, Label::EMPTY, 3);
        let mut cstn = Cstn::new(g, CheckConfig::default().with_cycle_limit(1));
        let status = cstn.check().unwrap();
        assert_eq!(status.state, CheckState::CycleLimitReached);
        assert!(!status.finished);
        assert!(!status.consistency);
    }

    #[test]
    fn test_cancelled_check() {
        let mut g = TNGraph::new("t");
        let z = g.add_node("Z", Label::EMPTY).unwrap();
        let x = g.add_node("X", Label::EMPTY).unwrap();
        g.set_z(z);
        g.merge_value(x, z, Label::EMPTY, -2);
        let flag = CancelFlag::new();
        flag.cancel();
        let mut cstn = Cstn::new(g, CheckConfig::default()).with_cancel_flag(flag);
        let status = cstn.check().unwrap();
        assert_eq!(status.state, CheckState::Cancelled);
        assert!(status.is_inconclusive());
    }

    #[test]
    fn test_cleaned_graph_drops_horizon_bounds() {
        let mut g = TNGraph::new("t");
        let z = g.add_node("Z", Label::EMPTY).unwrap();
        let x = g.add_node("X", Label::EMPTY).unwrap();
        g.set_z(z);
        g.merge_value(x, z, Label::EMPTY, -2);
        let mut cstn = Cstn::new(g, CheckConfig::default().with_semantics(DcSemantics::Standard));
        assert!(cstn.check().unwrap().consistency);
        let cleaned = cstn.cleaned_graph();
        assert!(cleaned.edge_between(z, x).is_none());
        assert_eq!(cleaned.edge_between(x, z).unwrap().values.get(&Label::EMPTY), Some(-2));
    }
}
