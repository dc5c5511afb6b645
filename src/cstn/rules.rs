//! CSTN inference rules: R0/qR0, R3/qR3*, LP/qLP.
//!
//! Every rule reads edge snapshots plus the node labels and children-of
//! relation exposed by `RuleContext`, and returns the values it derives.
//! Rules never mutate the graph; the driver merges what they return.
//!
//! Edge `A→B` with value `(ℓ, w)` means `B − A ≤ w` in every scenario
//! satisfying `ℓ`.

use crate::config::DcSemantics;
use crate::graph::TNGraph;
use crate::model::weight::{self, Weight};
use crate::model::{ALabel, Edge, Label, LiteralState, NodeId, Proposition};

// ============================================================================
// Inference results
// ============================================================================

/// Name of the rule that produced a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rule {
    R0,
    R3,
    LabeledPropagation,
    UpperCase,
    LowerCase,
    CrossCase,
    LetterRemoval,
}

impl std::fmt::Display for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Rule::R0 => "R0",
            Rule::R3 => "R3",
            Rule::LabeledPropagation => "LP",
            Rule::UpperCase => "UC",
            Rule::LowerCase => "LC",
            Rule::CrossCase => "CC",
            Rule::LetterRemoval => "LR",
        };
        f.write_str(name)
    }
}

/// A value to merge into `src → dst`. An empty `aleph` means an ordinary
/// value, otherwise an upper-case one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Derived {
    pub rule: Rule,
    pub src: NodeId,
    pub dst: NodeId,
    pub label: Label,
    pub aleph: ALabel,
    pub weight: Weight,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inference {
    Value(Derived),
    /// Negative self-loop under a label without unknown literals.
    NegativeLoop { node: NodeId, label: Label, weight: Weight },
}

// ============================================================================
// Context
// ============================================================================

/// Read-only view the rules need besides the edges themselves.
#[derive(Clone, Copy)]
pub struct RuleContext<'a> {
    pub graph: &'a TNGraph,
    pub semantics: DcSemantics,
    pub z: NodeId,
    /// No node is later than this after Z. `None` disables the cutoff.
    pub horizon: Option<Weight>,
}

impl<'a> RuleContext<'a> {
    pub fn new(graph: &'a TNGraph, semantics: DcSemantics, z: NodeId) -> Self {
        Self { graph, semantics, z, horizon: None }
    }

    pub fn with_horizon(mut self, horizon: Weight) -> Self {
        self.horizon = Some(horizon);
        self
    }

    pub fn node_label(&self, node: NodeId) -> Label {
        self.graph.node(node).label
    }

    pub fn children_of(&self, p: Proposition) -> Label {
        self.graph.children_of(p)
    }

    /// Does `label` subsume the labels of both endpoints?
    pub fn fits_endpoints(&self, label: &Label, src: NodeId, dst: NodeId) -> bool {
        label.subsumes(&self.node_label(src)) && label.subsumes(&self.node_label(dst))
    }

    /// Label of a value derived on an edge into `target`.
    ///
    /// Into Z, with a negative operand, the extended conjunction is used and
    /// children of unknown literals are dropped. Elsewhere the plain
    /// conjunction is used and unknown literals are not allowed.
    pub fn combine(&self, a: &Label, b: &Label, target: NodeId, negative: bool) -> Option<Label> {
        if target == self.z && negative {
            return Some(
                a.conjunction_extended(b)
                    .remove_children_of_unknown(|p| self.children_of(p)),
            );
        }
        a.conjunction(b).filter(|l| target == self.z || !l.contains_unknown())
    }

    /// Wrap a derived value, turning negative self-loops into their meaning:
    /// an inconsistency under a resolved label, a `−∞` q-loop otherwise.
    /// Non-negative self-loops carry no information.
    ///
    /// An ordinary value `X →[w] Z` with `w < −horizon` puts `X` after the
    /// horizon bound `Z →[horizon] X`. That is a negative loop through Z
    /// under a resolved label and a `−∞` q-value otherwise.
    pub fn close(
        &self,
        rule: Rule,
        src: NodeId,
        dst: NodeId,
        label: Label,
        aleph: ALabel,
        w: Weight,
    ) -> Option<Inference> {
        let value = |weight: Weight| {
            Some(Inference::Value(Derived { rule, src, dst, label, aleph: aleph.clone(), weight }))
        };
        if src != dst {
            if let Some(h) = self.horizon
                && dst == self.z
                && aleph.is_empty()
                && w != weight::NEG_INFINITY
                && w < -h
            {
                if label.contains_unknown() {
                    return value(weight::NEG_INFINITY);
                }
                return Some(Inference::NegativeLoop { node: self.z, label, weight: weight::add(w, h) });
            }
            return value(w);
        }
        if w >= 0 {
            return None;
        }
        if !aleph.is_empty() {
            return value(w);
        }
        if label.contains_unknown() {
            return value(weight::NEG_INFINITY);
        }
        Some(Inference::NegativeLoop { node: src, label, weight: w })
    }
}

/// Ordinary and upper-case values of an edge as `(label, aleph, weight)`.
pub(crate) fn all_values(edge: &Edge) -> Vec<(Label, ALabel, Weight)> {
    let mut out: Vec<(Label, ALabel, Weight)> = edge
        .values
        .entries()
        .into_iter()
        .map(|(l, w)| (l, ALabel::empty(), w))
        .collect();
    out.extend(edge.upper_case.entries().into_iter().map(|e| (e.label, e.aleph, e.weight)));
    out
}

// ============================================================================
// R0 / qR0
// ============================================================================

/// R0/qR0 on an edge leaving an observation node `P?`.
///
/// A value `(αp, w)` on `P? → X` with `w` inside the semantics' R0 window
/// says `X` happens before `p` can be known, so `p` (and every proposition
/// observed only after `p`) is dropped from the label. Into Z, children of
/// unknown literals are dropped too.
pub fn r0(ctx: &RuleContext<'_>, edge: &Edge) -> Vec<Inference> {
    let Some(p) = ctx.graph.node(edge.src).observes else {
        return Vec::new();
    };
    if edge.is_self_loop() {
        return Vec::new();
    }
    let mut out = Vec::new();
    for (label, aleph, w) in all_values(edge) {
        if !label.contains_proposition(p) || !ctx.semantics.r0_applies(w) {
            continue;
        }
        let rewritten = r0_label(ctx, &label, p, edge.dst);
        if !ctx.fits_endpoints(&rewritten, edge.src, edge.dst) {
            continue;
        }
        out.push(Inference::Value(Derived {
            rule: Rule::R0,
            src: edge.src,
            dst: edge.dst,
            label: rewritten,
            aleph,
            weight: w,
        }));
    }
    out
}

fn r0_label(ctx: &RuleContext<'_>, label: &Label, p: Proposition, x: NodeId) -> Label {
    let out = label.remove_proposition(p).remove_all(&ctx.children_of(p));
    if x == ctx.z {
        out.remove_children_of_unknown(|q| ctx.children_of(q))
    } else {
        out
    }
}

// ============================================================================
// R3 / qR3*
// ============================================================================

/// R3/qR3* through the observer edge `P? → D` and a sibling `S → D` whose
/// values mention `p`.
///
/// With `(γ, w)` on `P? → D` inside the R3 window and `(βp, v)` on `S → D`,
/// derives `S → D` with `max(v, w)` (ε-adjusted) under `β ∘ γ'` where `γ'`
/// is `γ` without `p` and its children; `∘` is the extended conjunction
/// when `D` is Z and the plain one otherwise. Upper-case values on either
/// edge take part; the derived value carries the union of their ℵ.
pub fn r3(ctx: &RuleContext<'_>, observer_edge: &Edge, sibling: &Edge) -> Vec<Inference> {
    let Some(p) = ctx.graph.node(observer_edge.src).observes else {
        return Vec::new();
    };
    let d = observer_edge.dst;
    if sibling.dst != d
        || sibling.src == observer_edge.src
        || sibling.is_self_loop()
        || observer_edge.is_self_loop()
    {
        return Vec::new();
    }
    let d_is_z = d == ctx.z;
    let p_children = ctx.children_of(p);
    let siblings: Vec<(Label, ALabel, Weight)> = all_values(sibling)
        .into_iter()
        .filter(|(l, _, _)| l.contains_proposition(p))
        .filter(|(l, _, _)| d_is_z || l.state_of(p) != Some(LiteralState::Unknown))
        .collect();
    if siblings.is_empty() {
        return Vec::new();
    }

    let mut out = Vec::new();
    for (obs_label, obs_aleph, w) in all_values(observer_edge) {
        if !ctx.semantics.r3_applies(w, d_is_z) {
            continue;
        }
        let obs_label = obs_label.remove_proposition(p).remove_all(&p_children);
        for (label, aleph, v) in &siblings {
            let Some(new_label) = r3_label(ctx, label, &obs_label, p, d_is_z) else {
                continue;
            };
            if !ctx.fits_endpoints(&new_label, sibling.src, d) {
                continue;
            }
            out.push(Inference::Value(Derived {
                rule: Rule::R3,
                src: sibling.src,
                dst: d,
                label: new_label,
                aleph: aleph.union(&obs_aleph),
                weight: ctx.semantics.r3_value(*v, w),
            }));
        }
    }
    out
}

/// Split the two labels into the sibling-only part `α`, the shared part
/// `β` and the observer-only part `γ`, then conjoin them.
fn r3_label(
    ctx: &RuleContext<'_>,
    sibling_label: &Label,
    observer_label: &Label,
    p: Proposition,
    d_is_z: bool,
) -> Option<Label> {
    let rest = sibling_label.remove_proposition(p);
    let alpha = rest.sub_label_in(observer_label, false);
    let gamma = observer_label.sub_label_in(&rest, false);
    let shared_s = rest.sub_label_in(observer_label, true);
    let shared_o = observer_label.sub_label_in(&rest, true);
    if d_is_z {
        let beta = shared_s.conjunction_extended(&shared_o);
        let joined = alpha.conjunction_extended(&beta).conjunction_extended(&gamma);
        return Some(joined.remove_children_of_unknown(|q| ctx.children_of(q)));
    }
    let beta = shared_s.conjunction(&shared_o)?;
    let joined = alpha.conjunction(&beta)?.conjunction(&gamma)?;
    (!joined.contains_unknown()).then_some(joined)
}

// ============================================================================
// Labeled propagation
// ============================================================================

/// LP/qLP: closes the triangle `A → B → C` into `A → C`.
///
/// Only non-positive sums are derived. A negative sum on a self-loop is an
/// inconsistency under a resolved label and a `−∞` q-loop otherwise.
/// Self-loops only hold q-loop markers and are never used as legs.
pub fn labeled_propagation(ctx: &RuleContext<'_>, ab: &Edge, bc: &Edge) -> Vec<Inference> {
    debug_assert_eq!(ab.dst, bc.src);
    if ab.is_self_loop() || bc.is_self_loop() {
        return Vec::new();
    }
    let (a, c) = (ab.src, bc.dst);
    let mut out = Vec::new();
    for (alpha, u) in ab.values.entries() {
        for (beta, v) in bc.values.entries() {
            let sum = weight::add(u, v);
            if sum > 0 {
                continue;
            }
            let Some(label) = ctx.combine(&alpha, &beta, c, u < 0 || v < 0) else {
                continue;
            };
            if let Some(inf) = ctx.close(Rule::LabeledPropagation, a, c, label, ALabel::empty(), sum) {
                out.push(inf);
            }
        }
    }
    out
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ConstraintType;
    use pretty_assertions::assert_eq;

    fn l(s: &str) -> Label {
        Label::parse(s).unwrap()
    }

    fn p(c: char) -> Proposition {
        Proposition::from_char(c).unwrap()
    }

    /// Z, P? observing p, Q? observing q (child of p), X.
    fn network() -> (TNGraph, NodeId, NodeId, NodeId, NodeId) {
        let mut g = TNGraph::new("rules");
        let z = g.add_node("Z", Label::EMPTY).unwrap();
        let obs_p = g.add_observer("P?", p('p'), Label::EMPTY).unwrap();
        let obs_q = g.add_observer("Q?", p('q'), l("p")).unwrap();
        let x = g.add_node("X", Label::EMPTY).unwrap();
        g.set_z(z);
        g.refresh_children();
        (g, z, obs_p, obs_q, x)
    }

    fn values(out: &[Inference]) -> Vec<(NodeId, NodeId, String, Weight)> {
        out.iter()
            .filter_map(|i| match i {
                Inference::Value(d) => Some((d.src, d.dst, d.label.to_string(), d.weight)),
                Inference::NegativeLoop { .. } => None,
            })
            .collect()
    }

    #[test]
    fn test_r0_strips_observed_literal_and_children() {
        let (mut g, z, obs_p, _, x) = network();
        let e = g.merge_value(obs_p, x, l("p¬qr"), -2);
        let ctx = RuleContext::new(&g, DcSemantics::InstantaneousReaction, z);
        assert_eq!(values(&r0(&ctx, g.edge(e))), vec![(obs_p, x, "r".to_string(), -2)]);
    }

    #[test]
    fn test_r0_window_depends_on_semantics() {
        let (mut g, z, obs_p, _, x) = network();
        let e = g.merge_value(obs_p, x, l("p"), 0);
        let ir = RuleContext::new(&g, DcSemantics::InstantaneousReaction, z);
        assert!(r0(&ir, g.edge(e)).is_empty());
        let std = RuleContext::new(&g, DcSemantics::Standard, z);
        assert_eq!(r0(&std, g.edge(e)).len(), 1);
        let eps = RuleContext::new(&g, DcSemantics::Epsilon { reaction_time: 1 }, z);
        assert_eq!(r0(&eps, g.edge(e)).len(), 1);
    }

    #[test]
    fn test_r0_keeps_endpoint_labels() {
        let (mut g, z, obs_p, _, _) = network();
        let y = g.add_node("Y", l("p")).unwrap();
        let e = g.merge_value(obs_p, y, l("p"), -1);
        let ctx = RuleContext::new(&g, DcSemantics::InstantaneousReaction, z);
        assert!(r0(&ctx, g.edge(e)).is_empty());
    }

    #[test]
    fn test_r3_into_z_uses_extended_conjunction() {
        let (mut g, z, obs_p, _, x) = network();
        let oe = g.merge_value(obs_p, z, l("¬a"), -4);
        let se = g.merge_value(x, z, l("pa"), -6);
        let ctx = RuleContext::new(&g, DcSemantics::InstantaneousReaction, z);
        let out = r3(&ctx, g.edge(oe), g.edge(se));
        assert_eq!(values(&out), vec![(x, z, "¿a".to_string(), -4)]);
    }

    #[test]
    fn test_r3_skips_zero_observer_value_into_z() {
        let (mut g, z, obs_p, _, x) = network();
        let oe = g.merge_value(obs_p, z, Label::EMPTY, 0);
        let se = g.merge_value(x, z, l("p"), -3);
        let ctx = RuleContext::new(&g, DcSemantics::Standard, z);
        assert!(r3(&ctx, g.edge(oe), g.edge(se)).is_empty());
    }

    #[test]
    fn test_r3_plain_conjunction_elsewhere() {
        let (mut g, z, obs_p, _, x) = network();
        let y = g.add_node("Y", Label::EMPTY).unwrap();
        let oe = g.merge_value(obs_p, y, l("b"), -1);
        let se = g.merge_value(x, y, l("¬pa"), -5);
        let ctx = RuleContext::new(&g, DcSemantics::InstantaneousReaction, z);
        assert_eq!(values(&r3(&ctx, g.edge(oe), g.edge(se))), vec![(x, y, "ab".to_string(), -1)]);

        let clash = g.merge_value(obs_p, y, l("¬a"), -2);
        let ctx = RuleContext::new(&g, DcSemantics::InstantaneousReaction, z);
        let derived = values(&r3(&ctx, g.edge(clash), g.edge(se)));
        assert!(derived.iter().all(|(_, _, label, _)| !label.contains('¿')));
    }

    #[test]
    fn test_r3_epsilon_adjusts_observer_value() {
        let (mut g, z, obs_p, _, x) = network();
        let oe = g.merge_value(obs_p, z, Label::EMPTY, -2);
        let se = g.merge_value(x, z, l("p"), -9);
        let ctx = RuleContext::new(&g, DcSemantics::Epsilon { reaction_time: 3 }, z);
        assert_eq!(values(&r3(&ctx, g.edge(oe), g.edge(se))), vec![(x, z, "⊡".to_string(), -5)]);
    }

    #[test]
    fn test_r3_observer_upper_case_value() {
        let (mut g, z, obs_p, _, x) = network();
        let c = g.add_node("C", Label::EMPTY).unwrap();
        let oe = g.merge_value(obs_p, z, Label::EMPTY, 5);
        g.edge_mut(oe).merge_upper_case(Label::EMPTY, ALabel::single(c), -4);
        let se = g.merge_value(x, z, l("p"), -6);
        let ctx = RuleContext::new(&g, DcSemantics::InstantaneousReaction, z);
        let out = r3(&ctx, g.edge(oe), g.edge(se));
        assert_eq!(
            out,
            vec![Inference::Value(Derived {
                rule: Rule::R3,
                src: x,
                dst: z,
                label: Label::EMPTY,
                aleph: ALabel::single(c),
                weight: -4,
            })]
        );
    }

    #[test]
    fn test_lp_derives_non_positive_sums_only() {
        let (mut g, z, _, _, x) = network();
        let y = g.add_node("Y", Label::EMPTY).unwrap();
        let xy = g.merge_value(x, y, l("a"), 3);
        let yz = g.merge_value(y, z, l("b"), -5);
        let ctx = RuleContext::new(&g, DcSemantics::InstantaneousReaction, z);
        assert_eq!(
            values(&labeled_propagation(&ctx, g.edge(xy), g.edge(yz))),
            vec![(x, z, "ab".to_string(), -2)]
        );

        let yx = g.add_edge(y, x, ConstraintType::Requirement).unwrap();
        g.edge_mut(yx).merge_value(Label::EMPTY, 1);
        let ctx = RuleContext::new(&g, DcSemantics::InstantaneousReaction, z);
        assert!(labeled_propagation(&ctx, g.edge(xy), g.edge(yx)).is_empty());
    }

    #[test]
    fn test_lp_q_label_only_into_z() {
        let (mut g, z, _, _, x) = network();
        let y = g.add_node("Y", Label::EMPTY).unwrap();
        let w = g.add_node("W", Label::EMPTY).unwrap();
        let xy = g.merge_value(x, y, l("a"), -1);
        let yz = g.merge_value(y, z, l("¬a"), -1);
        let yw = g.merge_value(y, w, l("¬a"), -1);
        let ctx = RuleContext::new(&g, DcSemantics::InstantaneousReaction, z);
        assert_eq!(
            values(&labeled_propagation(&ctx, g.edge(xy), g.edge(yz))),
            vec![(x, z, "¿a".to_string(), -2)]
        );
        assert!(labeled_propagation(&ctx, g.edge(xy), g.edge(yw)).is_empty());
    }

    #[test]
    fn test_lp_negative_self_loop() {
        let (mut g, z, _, _, x) = network();
        let zx = g.merge_value(z, x, Label::EMPTY, 5);
        let xz = g.merge_value(x, z, Label::EMPTY, -10);
        let ctx = RuleContext::new(&g, DcSemantics::InstantaneousReaction, z);
        assert_eq!(
            labeled_propagation(&ctx, g.edge(zx), g.edge(xz)),
            vec![Inference::NegativeLoop { node: z, label: Label::EMPTY, weight: -5 }]
        );
    }

    #[test]
    fn test_lp_negative_q_loop_is_minus_infinity() {
        let (mut g, z, _, _, x) = network();
        let zx = g.merge_value(z, x, l("a"), 1);
        let xz = g.merge_value(x, z, l("¬a"), -3);
        let ctx = RuleContext::new(&g, DcSemantics::InstantaneousReaction, z);
        assert_eq!(
            values(&labeled_propagation(&ctx, g.edge(zx), g.edge(xz))),
            vec![(z, z, "¿a".to_string(), weight::NEG_INFINITY)]
        );
    }

    #[test]
    fn test_lp_into_z_beyond_horizon() {
        let (mut g, z, _, _, x) = network();
        let y = g.add_node("Y", Label::EMPTY).unwrap();
        let w = g.add_node("W", Label::EMPTY).unwrap();
        let xy = g.merge_value(x, y, l("a"), -2);
        let yz = g.merge_value(y, z, l("¬a"), -3);
        let xw = g.merge_value(x, w, l("a"), -2);
        let wz = g.merge_value(w, z, l("a"), -3);

        let ctx = RuleContext::new(&g, DcSemantics::InstantaneousReaction, z).with_horizon(4);
        assert_eq!(
            values(&labeled_propagation(&ctx, g.edge(xy), g.edge(yz))),
            vec![(x, z, "¿a".to_string(), weight::NEG_INFINITY)]
        );
        assert_eq!(
            labeled_propagation(&ctx, g.edge(xw), g.edge(wz)),
            vec![Inference::NegativeLoop { node: z, label: l("a"), weight: -1 }]
        );

        let wide = RuleContext::new(&g, DcSemantics::InstantaneousReaction, z).with_horizon(10);
        assert_eq!(
            values(&labeled_propagation(&wide, g.edge(xw), g.edge(wz))),
            vec![(x, z, "a".to_string(), -5)]
        );
    }
}
