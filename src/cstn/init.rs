//! Network initialization: well-definedness, Z/Ω, horizon and bound edges.
//!
//! Structural problems are fatal (`Error::WellDefinition`). Problems with an
//! obvious repair are fixed in place, logged at `warn` and counted.

use tracing::{debug, warn};

use crate::config::CheckConfig;
use crate::graph::{OMEGA_NAME, TNGraph, Z_NAME};
use crate::model::weight::{self, Weight};
use crate::model::{ConstraintType, EdgeId, Label, NodeId};
use crate::{Error, Result};

/// What initialization established.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitReport {
    pub z: NodeId,
    pub omega: Option<NodeId>,
    pub horizon: Weight,
    /// Number of auto-fixed well-definedness violations.
    pub fixes: u64,
}

/// Prepare `graph` for propagation.
///
/// 1. Find or create Z (and Ω when propagating only to Z).
/// 2. Repair or reject node and edge labels.
/// 3. Insert the observer-precedence edges `X → P?`.
/// 4. Compute the horizon and add `Z → X` / `X → Z` bounds.
pub fn init_graph(graph: &mut TNGraph, config: &CheckConfig) -> Result<InitReport> {
    config.validate()?;
    let mut fixes = 0u64;

    let z = ensure_z(graph, &mut fixes)?;
    let omega = if config.propagate_only_to_z { Some(ensure_omega(graph)?) } else { None };

    graph.refresh_children();
    fix_observer_labels(graph, &mut fixes);
    fix_node_labels(graph, &mut fixes)?;
    graph.refresh_children();
    fix_edge_labels(graph, &mut fixes)?;
    add_observer_precedence(graph, config, &mut fixes);

    let horizon = horizon(graph, config.dc_semantics.reaction_time())?;
    add_bounds(graph, z, omega, horizon);

    debug!(horizon, fixes, nodes = graph.node_count(), edges = graph.edge_count(), "graph initialized");
    Ok(InitReport { z, omega, horizon, fixes })
}

fn ensure_z(graph: &mut TNGraph, fixes: &mut u64) -> Result<NodeId> {
    let z = match graph.z().or_else(|| graph.node_by_name(Z_NAME)) {
        Some(z) => z,
        None => {
            debug!("adding Z node");
            graph.add_node(Z_NAME, Label::EMPTY)?
        }
    };
    graph.set_z(z);
    if graph.node(z).is_observer() {
        return Err(Error::WellDefinition(format!(
            "Z node '{}' cannot be an observation node",
            graph.node(z).name
        )));
    }
    if !graph.node(z).label.is_empty() {
        warn!(label = %graph.node(z).label, "Z node label removed");
        graph.node_mut(z).label = Label::EMPTY;
        *fixes += 1;
    }
    Ok(z)
}

fn ensure_omega(graph: &mut TNGraph) -> Result<NodeId> {
    let omega = match graph.omega().or_else(|| graph.node_by_name(OMEGA_NAME)) {
        Some(o) => o,
        None => graph.add_node(OMEGA_NAME, Label::EMPTY)?,
    };
    graph.set_omega(omega);
    Ok(omega)
}

/// An observer must not depend on its own proposition.
fn fix_observer_labels(graph: &mut TNGraph, fixes: &mut u64) {
    for (p, obs) in graph.observers() {
        let label = graph.node(obs).label;
        if label.contains_proposition(p) {
            warn!(node = %graph.node(obs).name, %p, "observer label mentions its own proposition, stripped");
            graph.node_mut(obs).label = label.remove_proposition(p);
            *fixes += 1;
        }
    }
}

/// Every proposition in a node label needs an observer, and the node label
/// must subsume the observer's label.
fn fix_node_labels(graph: &mut TNGraph, fixes: &mut u64) -> Result<()> {
    loop {
        let mut changed = false;
        for id in graph.node_ids() {
            let label = graph.node(id).label;
            let mut extended = label;
            for p in label.propositions() {
                let obs = graph.observer_of(p).ok_or_else(|| {
                    Error::WellDefinition(format!(
                        "proposition {p} in the label of node '{}' has no observation node",
                        graph.node(id).name
                    ))
                })?;
                let obs_label = graph.node(obs).label;
                if !extended.subsumes(&obs_label) {
                    extended = extended.conjunction(&obs_label).ok_or_else(|| {
                        Error::WellDefinition(format!(
                            "label {label} of node '{}' contradicts label {obs_label} of observer '{}'",
                            graph.node(id).name,
                            graph.node(obs).name
                        ))
                    })?;
                }
            }
            if extended != label {
                warn!(node = %graph.node(id).name, from = %label, to = %extended, "node label extended");
                graph.node_mut(id).label = extended;
                *fixes += 1;
                changed = true;
            }
        }
        if !changed {
            return Ok(());
        }
    }
}

/// Edge labels must mention only observed propositions and subsume the
/// labels of both endpoints. Too general labels are widened; values that
/// can never hold are dropped.
fn fix_edge_labels(graph: &mut TNGraph, fixes: &mut u64) -> Result<()> {
    for id in graph.edge_ids() {
        let (src, dst) = {
            let e = graph.edge(id);
            (e.src, e.dst)
        };
        let endpoints = graph
            .node(src)
            .label
            .conjunction(&graph.node(dst).label)
            .ok_or_else(|| {
                Error::WellDefinition(format!(
                    "edge '{}' connects nodes with inconsistent labels {} and {}",
                    graph.edge(id).name,
                    graph.node(src).label,
                    graph.node(dst).label
                ))
            })?;

        check_weights(graph, id)?;
        for p in edge_propositions(graph, id) {
            if graph.observer_of(p).is_none() {
                return Err(Error::WellDefinition(format!(
                    "proposition {p} on edge '{}' has no observation node",
                    graph.edge(id).name
                )));
            }
        }

        let name = graph.edge(id).name.clone();
        let edge = graph.edge_mut(id);
        for (label, w) in edge.values.entries() {
            if label.subsumes(&endpoints) {
                continue;
            }
            edge.values.remove(&label);
            match label.conjunction(&endpoints) {
                Some(widened) => {
                    warn!(edge = %name, from = %label, to = %widened, "edge label widened to endpoint labels");
                    edge.values.merge(widened, w);
                }
                None => warn!(edge = %name, %label, "value inconsistent with endpoint labels dropped"),
            }
            *fixes += 1;
        }
        for uc in edge.upper_case.entries() {
            if uc.label.subsumes(&endpoints) {
                continue;
            }
            edge.upper_case.remove(&uc.label, &uc.aleph);
            if let Some(widened) = uc.label.conjunction(&endpoints) {
                edge.upper_case.merge(widened, uc.aleph, uc.weight);
            }
            *fixes += 1;
        }
    }
    Ok(())
}

fn edge_propositions(graph: &TNGraph, id: EdgeId) -> Vec<crate::model::Proposition> {
    let e = graph.edge(id);
    let mut all = Label::EMPTY;
    let labels = e.values.labels().copied().chain(e.upper_case.entries().into_iter().map(|uc| uc.label));
    for label in labels {
        for p in label.propositions() {
            all = all.with(p.straight());
        }
    }
    all.propositions().collect()
}

fn check_weights(graph: &TNGraph, id: EdgeId) -> Result<()> {
    let e = graph.edge(id);
    let too_big = |w: Weight| !weight::is_infinite(w) && w.abs() > weight::MAX_FINITE;
    if e.values.iter().any(|(_, w)| too_big(*w)) || e.upper_case.entries().iter().any(|uc| too_big(uc.weight)) {
        return Err(Error::Overflow(format!(
            "edge '{}' has a weight beyond ±{}",
            e.name,
            weight::MAX_FINITE
        )));
    }
    Ok(())
}

/// `X → P?` with the reaction bound for every `p` in the label of `X`:
/// `p` must be observed before `X` can depend on it.
fn add_observer_precedence(graph: &mut TNGraph, config: &CheckConfig, fixes: &mut u64) {
    let bound = config.dc_semantics.observer_precedence_bound();
    for id in graph.node_ids() {
        let label = graph.node(id).label;
        for p in label.propositions() {
            let Some(obs) = graph.observer_of(p) else { continue };
            if obs == id {
                continue;
            }
            let (edge, created) = graph.ensure_edge(id, obs, ConstraintType::Internal);
            if graph.edge_mut(edge).merge_value(label, bound) {
                if !created {
                    warn!(
                        node = %graph.node(id).name,
                        observer = %graph.node(obs).name,
                        "precedence bound to observer tightened"
                    );
                }
                *fixes += 1;
            }
        }
    }
}

/// `max(|negative weight|, ε) × (n − 1)`: no node ever needs to be further
/// than this from Z.
fn horizon(graph: &TNGraph, reaction_time: Weight) -> Result<Weight> {
    let mut max_negative: Weight = reaction_time;
    for e in graph.edges() {
        let ordinary = e.values.iter().map(|(_, w)| *w);
        let upper = e.upper_case.entries().into_iter().map(|uc| uc.weight);
        for w in ordinary.chain(upper) {
            if w < 0 && w != weight::NEG_INFINITY {
                max_negative = max_negative.max(-w);
            }
        }
    }
    let factor = graph.node_count().saturating_sub(1) as Weight;
    match max_negative.checked_mul(factor) {
        Some(h) if h <= weight::MAX_FINITE => Ok(h),
        _ => Err(Error::Overflow(format!(
            "horizon {max_negative} × {factor} exceeds the finite weight range"
        ))),
    }
}

fn add_bounds(graph: &mut TNGraph, z: NodeId, omega: Option<NodeId>, horizon: Weight) {
    for x in graph.node_ids() {
        if x == z {
            continue;
        }
        let label = graph.node(x).label;
        let (zx, _) = graph.ensure_edge(z, x, ConstraintType::Internal);
        graph.edge_mut(zx).merge_value(label, horizon);
        let (xz, _) = graph.ensure_edge(x, z, ConstraintType::Internal);
        graph.edge_mut(xz).merge_value(label, 0);
        if let Some(o) = omega.filter(|o| *o != x) {
            let (ox, _) = graph.ensure_edge(o, x, ConstraintType::Internal);
            graph.edge_mut(ox).merge_value(label, 0);
        }
    }
}

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
    fn test_z_is_created_and_bounds_added() {
        let mut g = TNGraph::new("t");
        let a = g.add_node("A", Label::EMPTY).unwrap();
        let b = g.add_node("B", Label::EMPTY).unwrap();
        g.merge_value(a, b, Label::EMPTY, -4);
        let report = init_graph(&mut g, &CheckConfig::default()).unwrap();
        let z = report.z;
        assert_eq!(g.node(z).name, "Z");
        assert_eq!(report.horizon, 8);
        assert_eq!(g.edge_between(z, a).unwrap().values.get(&Label::EMPTY), Some(8));
        assert_eq!(g.edge_between(b, z).unwrap().values.get(&Label::EMPTY), Some(0));
        assert_eq!(g.edge_between(z, b).unwrap().constraint_type, ConstraintType::Internal);
    }

    #[test]
    fn test_missing_observer_is_fatal() {
        let mut g = TNGraph::new("t");
        g.add_node("Z", Label::EMPTY).unwrap();
        g.add_node("X", l("p")).unwrap();
        let err = init_graph(&mut g, &CheckConfig::default()).unwrap_err();
        assert!(matches!(err, Error::WellDefinition(_)));
    }

    #[test]
    fn test_inconsistent_endpoints_are_fatal() {
        let mut g = TNGraph::new("t");
        g.add_node("Z", Label::EMPTY).unwrap();
        g.add_observer("P?", p('p'), Label::EMPTY).unwrap();
        let x = g.add_node("X", l("p")).unwrap();
        let y = g.add_node("Y", l("¬p")).unwrap();
        g.merge_value(x, y, Label::EMPTY, 1);
        assert!(matches!(init_graph(&mut g, &CheckConfig::default()), Err(Error::WellDefinition(_))));
    }

    #[test]
    fn test_fixable_violations_are_repaired() {
        let mut g = TNGraph::new("t");
        g.add_node("Z", Label::EMPTY).unwrap();
        let obs = g.add_observer("P?", p('p'), l("p")).unwrap();
        let x = g.add_node("X", l("p")).unwrap();
        let y = g.add_node("Y", Label::EMPTY).unwrap();
        let e = g.merge_value(y, x, Label::EMPTY, 3);
        let report = init_graph(&mut g, &CheckConfig::default()).unwrap();
        assert!(g.node(obs).label.is_empty());
        assert_eq!(g.edge(e).values.get(&l("p")), Some(3));
        assert_eq!(g.edge(e).values.get(&Label::EMPTY), None);
        assert_eq!(g.edge_between(x, obs).unwrap().values.get(&l("p")), Some(0));
        assert_eq!(report.fixes, 3);
    }

    #[test]
    fn test_epsilon_precedence_bound() {
        let mut g = TNGraph::new("t");
        g.add_node("Z", Label::EMPTY).unwrap();
        let obs = g.add_observer("P?", p('p'), Label::EMPTY).unwrap();
        let x = g.add_node("X", l("¬p")).unwrap();
        let config = CheckConfig::default().with_semantics(DcSemantics::Epsilon { reaction_time: 2 });
        init_graph(&mut g, &config).unwrap();
        assert_eq!(g.edge_between(x, obs).unwrap().values.get(&l("¬p")), Some(-2));
    }

    #[test]
    fn test_omega_in_z_only_mode() {
        let mut g = TNGraph::new("t");
        g.add_node("Z", Label::EMPTY).unwrap();
        let x = g.add_node("X", Label::EMPTY).unwrap();
        let report = init_graph(&mut g, &CheckConfig::default().with_propagate_only_to_z(true)).unwrap();
        let omega = report.omega.unwrap();
        assert_eq!(g.node(omega).name, "Ω");
        assert_eq!(g.edge_between(omega, x).unwrap().values.get(&Label::EMPTY), Some(0));
        assert!(g.edge_between(report.z, omega).is_some());
    }

    #[test]
    fn test_horizon_overflow() {
        let mut g = TNGraph::new("t");
        let z = g.add_node("Z", Label::EMPTY).unwrap();
        let x = g.add_node("X", Label::EMPTY).unwrap();
        let y = g.add_node("Y", Label::EMPTY).unwrap();
        g.merge_value(x, z, Label::EMPTY, -weight::MAX_FINITE);
        g.merge_value(y, z, Label::EMPTY, -1);
        assert!(matches!(init_graph(&mut g, &CheckConfig::default()), Err(Error::Overflow(_))));
    }

    #[test]
    fn test_horizon_covers_reaction_time() {
        let mut g = TNGraph::new("t");
        g.add_node("Z", Label::EMPTY).unwrap();
        let a = g.add_node("A", Label::EMPTY).unwrap();
        let b = g.add_node("B", Label::EMPTY).unwrap();
        g.merge_value(a, b, Label::EMPTY, -1);
        let config = CheckConfig::default().with_semantics(DcSemantics::Epsilon { reaction_time: 3 });
        assert_eq!(init_graph(&mut g, &config).unwrap().horizon, 6);
    }
}
