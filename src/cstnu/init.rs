//! Contingent-link initialization.
//!
//! Each registered link `A ⇒ C` must be a matched pair of contingent edges
//! `A → C: (ℓ, y)` and `C → A: (ℓ, −x)` with `0 ≤ x ≤ y`. The initializer
//! adds the lower-case value `(ℓ, c, x)` on `A → C` and the upper-case value
//! `(ℓ, {C}, −y)` on `C → A`.

use tracing::debug;

use crate::graph::TNGraph;
use crate::model::{ALabel, ConstraintType, EdgeId, Label, NodeId};
use crate::model::weight::{self, Weight};
use crate::{Error, Result};

/// Bounds of one contingent link, as read from its edge pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkBounds {
    pub label: Label,
    pub lower: Weight,
    pub upper: Weight,
}

/// Validate every contingent link and install its case values.
/// Returns the number of links.
pub fn init_contingent_links(graph: &mut TNGraph) -> Result<usize> {
    check_contingent_edges(graph)?;
    let links = graph.contingent_links();
    for &(a, c) in &links {
        let (ac, ca) = link_edges(graph, a, c)?;
        let bounds = link_bounds(graph, ac, ca)?;
        graph.edge_mut(ac).set_lower_case(bounds.label, c, bounds.lower);
        graph.edge_mut(ca).merge_upper_case(bounds.label, ALabel::single(c), -bounds.upper);
        debug!(
            activation = %graph.node(a).name,
            contingent = %graph.node(c).name,
            label = %bounds.label,
            lower = bounds.lower,
            upper = bounds.upper,
            "contingent link"
        );
    }
    Ok(links.len())
}

/// Every edge typed `Contingent` must belong to a registered link.
fn check_contingent_edges(graph: &TNGraph) -> Result<()> {
    for e in graph.edges().filter(|e| e.is_contingent()) {
        let registered = graph.activation_of(e.dst) == Some(e.src) || graph.activation_of(e.src) == Some(e.dst);
        if !registered {
            return Err(Error::ContingentLink(format!(
                "edge '{}' is contingent but not part of a contingent link",
                e.name
            )));
        }
    }
    Ok(())
}

fn link_edges(graph: &TNGraph, a: NodeId, c: NodeId) -> Result<(EdgeId, EdgeId)> {
    let missing = |src: NodeId, dst: NodeId| {
        Error::ContingentLink(format!(
            "missing edge {} → {} of link {} ⇒ {}",
            graph.node(src).name,
            graph.node(dst).name,
            graph.node(a).name,
            graph.node(c).name
        ))
    };
    let ac = graph.find_edge(a, c).ok_or_else(|| missing(a, c))?;
    let ca = graph.find_edge(c, a).ok_or_else(|| missing(c, a))?;
    for id in [ac, ca] {
        if graph.edge(id).constraint_type != ConstraintType::Contingent {
            return Err(Error::ContingentLink(format!("edge '{}' is not contingent", graph.edge(id).name)));
        }
    }
    Ok((ac, ca))
}

/// Read `[x, y]` from the edge pair.
pub fn link_bounds(graph: &TNGraph, ac: EdgeId, ca: EdgeId) -> Result<LinkBounds> {
    let (forward, back) = (graph.edge(ac), graph.edge(ca));
    let entries = forward.values.entries();
    let [(label, upper)] = entries.as_slice() else {
        return Err(Error::ContingentLink(format!(
            "edge '{}' must carry exactly one value, found {}",
            forward.name,
            entries.len()
        )));
    };
    let lower = back.values.get(label).map(|w| -w).ok_or_else(|| {
        Error::ContingentLink(format!("edge '{}' has no value under label {label}", back.name))
    })?;
    if weight::is_infinite(*upper) || weight::is_infinite(lower) || lower < 0 || lower > *upper {
        return Err(Error::ContingentLink(format!(
            "link {} has contradictory bounds [{}, {}]",
            forward.name,
            weight::format(lower),
            weight::format(*upper)
        )));
    }
    Ok(LinkBounds { label: *label, lower, upper: *upper })
}
