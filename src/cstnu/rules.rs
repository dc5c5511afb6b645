//! Contingent-link rules: upper-case, lower-case, cross-case and labeled
//! letter removal.
//!
//! A contingent link `A ⇒ C` with duration in `[x, y]` contributes the
//! lower-case value `(c, x)` on `A → C` and the upper-case value
//! `(C, −y)` on `C → A`. Upper-case values carry the set ℵ of contingent
//! nodes whose late occurrence they assume.

use crate::cstn::rules::{Inference, Rule, RuleContext};
use crate::graph::TNGraph;
use crate::model::weight::{self, Weight};
use crate::model::{ALabel, Edge, Label, LowerCaseValue, NodeId, UpperCaseEntry};

/// All contingent rules closing `A → B → C` into `A → C`.
pub fn triangle(ctx: &RuleContext<'_>, ab: &Edge, bc: &Edge) -> Vec<Inference> {
    debug_assert_eq!(ab.dst, bc.src);
    if ab.is_self_loop() || bc.is_self_loop() {
        return Vec::new();
    }
    let mut out = upper_case(ctx, ab, bc);
    out.extend(lower_case(ctx, ab, bc));
    out
}

fn derive(
    ctx: &RuleContext<'_>,
    rule: Rule,
    (src, dst): (NodeId, NodeId),
    (alpha, u): (&Label, Weight),
    (beta, v): (&Label, Weight),
    aleph: ALabel,
) -> Option<Inference> {
    let sum = weight::add(u, v);
    let label = ctx.combine(alpha, beta, dst, u < 0 || v < 0)?;
    ctx.close(rule, src, dst, label, aleph, sum)
}

// ============================================================================
// Upper case
// ============================================================================

/// Upper-case propagation.
///
/// - no-case + upper-case: `A →[u] B →[C: v] T` gives `A →[C: u+v] T`;
/// - conjoined: `A →[ℵ₁: u] B →[ℵ₂: v] Z` gives `A →[ℵ₁∪ℵ₂: u+v] Z`;
/// - forward: `A →[ℵ: u] B →[v] Z` gives `A →[ℵ: u+v] Z`.
///
/// Only non-positive sums are derived.
pub fn upper_case(ctx: &RuleContext<'_>, ab: &Edge, bc: &Edge) -> Vec<Inference> {
    let (a, c) = (ab.src, bc.dst);
    let into_z = c == ctx.z;
    let mut out = Vec::new();

    let mut push = |alpha: &Label, u: Weight, beta: &Label, v: Weight, aleph: ALabel| {
        if weight::add(u, v) > 0 {
            return;
        }
        if let Some(inf) = derive(ctx, Rule::UpperCase, (a, c), (alpha, u), (beta, v), aleph) {
            out.push(inf);
        }
    };

    let second_upper = bc.upper_case.entries();
    let first_upper = ab.upper_case.entries();
    for uc2 in &second_upper {
        for (alpha, u) in ab.values.entries() {
            push(&alpha, u, &uc2.label, uc2.weight, uc2.aleph.clone());
        }
        if into_z {
            for uc1 in &first_upper {
                push(&uc1.label, uc1.weight, &uc2.label, uc2.weight, uc1.aleph.union(&uc2.aleph));
            }
        }
    }
    if into_z {
        for uc1 in &first_upper {
            for (beta, v) in bc.values.entries() {
                push(&uc1.label, uc1.weight, &beta, v, uc1.aleph.clone());
            }
        }
    }
    out
}

// ============================================================================
// Lower case / cross case
// ============================================================================

/// Lower-case and cross-case rules through the contingent node `B`.
///
/// With `(c, x)` on `A → B`:
/// - `B →[v] C`, `v < 0` gives `A →[x+v] C`;
/// - `B →[ℵ: v] C`, `v < 0`, `B ∉ ℵ` gives `A →[ℵ: x+v] C`, and with more
///   than one tag in ℵ only into Z.
pub fn lower_case(ctx: &RuleContext<'_>, ab: &Edge, bc: &Edge) -> Vec<Inference> {
    let Some(lc) = &ab.lower_case else {
        return Vec::new();
    };
    let contingent = ab.dst;
    if lc.node != contingent {
        return Vec::new();
    }
    let (a, c) = (ab.src, bc.dst);
    let mut out = Vec::new();

    for (beta, v) in bc.values.entries() {
        if v >= 0 {
            continue;
        }
        if let Some(inf) =
            derive(ctx, Rule::LowerCase, (a, c), (&lc.label, lc.weight), (&beta, v), ALabel::empty())
        {
            out.push(inf);
        }
    }
    for uc in bc.upper_case.entries() {
        if uc.weight >= 0 || uc.aleph.contains(contingent) {
            continue;
        }
        if uc.aleph.len() > 1 && c != ctx.z {
            continue;
        }
        if let Some(inf) =
            derive(ctx, Rule::CrossCase, (a, c), (&lc.label, lc.weight), (&uc.label, uc.weight), uc.aleph)
        {
            out.push(inf);
        }
    }
    out
}

// ============================================================================
// Letter removal
// ============================================================================

/// Lower-case value of the link `activation ⇒ contingent`.
pub fn lower_case_of(graph: &TNGraph, activation: NodeId, contingent: NodeId) -> Option<LowerCaseValue> {
    graph
        .edge_between(activation, contingent)?
        .lower_case
        .clone()
        .filter(|lc| lc.node == contingent)
}

/// Labeled letter removal on the upper-case values of `edge`.
///
/// For `Y →[ℵ∋C: v] W` where `A_C ⇒ C` has lower bound `x`:
/// - `W = A_C` and `v ≥ −x`: the tag `C` is dropped;
/// - `W = Z` with `A_C →[ℵ₁: w] Z`: derives `Y →[(ℵ∖C)∪ℵ₁: max(v, w−x)] Z`.
///
/// When `edge` is itself `A_C → Z`, the second form is applied to every
/// edge into Z whose upper-case values mention a contingent node of `A_C`.
pub fn letter_removal(ctx: &RuleContext<'_>, edge: &Edge) -> Vec<Inference> {
    let mut out = Vec::new();
    let graph = ctx.graph;

    for uc in edge.upper_case.entries() {
        for c in uc.aleph.nodes() {
            let Some(activation) = graph.activation_of(c) else { continue };
            let Some(lc) = lower_case_of(graph, activation, c) else { continue };
            if edge.dst == activation {
                remove_at_activation(ctx, edge.src, &uc, c, activation, &lc, &mut out);
            } else if edge.dst == ctx.z {
                remove_through_activation(ctx, edge.src, &uc, c, activation, &lc, &mut out);
            }
        }
    }

    if edge.dst == ctx.z && graph.node(edge.src).is_activation() {
        let activation = edge.src;
        for (a, c) in graph.contingent_links() {
            if a != activation {
                continue;
            }
            let Some(lc) = lower_case_of(graph, activation, c) else { continue };
            for id in graph.in_edges(ctx.z) {
                let other = graph.edge(id);
                if other.id == edge.id {
                    continue;
                }
                for uc in other.upper_case.entries() {
                    if uc.aleph.contains(c) {
                        remove_through_activation(ctx, other.src, &uc, c, activation, &lc, &mut out);
                    }
                }
            }
        }
    }
    out
}

fn remove_at_activation(
    ctx: &RuleContext<'_>,
    y: NodeId,
    uc: &UpperCaseEntry,
    c: NodeId,
    activation: NodeId,
    lc: &LowerCaseValue,
    out: &mut Vec<Inference>,
) {
    if uc.weight < -lc.weight {
        return;
    }
    let Some(label) = ctx.combine(&uc.label, &lc.label, activation, uc.weight < 0) else {
        return;
    };
    if let Some(inf) = ctx.close(Rule::LetterRemoval, y, activation, label, uc.aleph.without(c), uc.weight) {
        out.push(inf);
    }
}

fn remove_through_activation(
    ctx: &RuleContext<'_>,
    y: NodeId,
    uc: &UpperCaseEntry,
    c: NodeId,
    activation: NodeId,
    lc: &LowerCaseValue,
    out: &mut Vec<Inference>,
) {
    let z = ctx.z;
    let Some(az) = ctx.graph.edge_between(activation, z) else {
        return;
    };
    let rest = uc.aleph.without(c);
    let az_values = az
        .values
        .entries()
        .into_iter()
        .map(|(l, w)| (l, ALabel::empty(), w))
        .chain(az.upper_case.entries().into_iter().map(|e| (e.label, e.aleph, e.weight)));
    for (gamma, aleph1, w) in az_values {
        if aleph1.contains(c) {
            continue;
        }
        let new_w = uc.weight.max(weight::add(w, -lc.weight));
        let negative = new_w < 0;
        let Some(label) = ctx
            .combine(&uc.label, &lc.label, z, negative)
            .and_then(|l| ctx.combine(&l, &gamma, z, negative))
        else {
            continue;
        };
        if let Some(inf) = ctx.close(Rule::LetterRemoval, y, z, label, rest.union(&aleph1), new_w) {
            out.push(inf);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
