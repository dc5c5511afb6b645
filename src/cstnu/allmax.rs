//! AllMax projection: the worst case of a CSTNU in which every contingent
//! duration takes its upper bound.
//!
//! The projection is a plain CSTN over the same nodes. Ordinary and
//! upper-case values become ordinary values; lower-case values are dropped.
//! The upper-case value `({C}, −y)` of each link `A ⇒ C` becomes the
//! ordinary `C → A: −y`, which with `A → C: y` fixes `C` at `A + y`.

use std::time::Instant;

use tracing::debug;

use crate::config::CheckConfig;
use crate::cstn::Cstn;
use crate::graph::TNGraph;
use crate::runtime::CancelFlag;
use crate::status::{CheckState, CheckStatus};
use crate::stn::{PathMode, Stn};
use crate::Result;

/// Build the AllMax projection. Node ids are the same as in `graph`.
pub fn all_max_projection(graph: &TNGraph) -> Result<TNGraph> {
    let mut projection = TNGraph::new(format!("{} (AllMax)", graph.name()));
    for node in graph.nodes() {
        match node.observes {
            Some(p) => projection.add_observer(&node.name, p, node.label)?,
            None => projection.add_node(&node.name, node.label)?,
        };
    }
    if let Some(z) = graph.z() {
        projection.set_z(z);
    }
    if let Some(omega) = graph.omega() {
        projection.set_omega(omega);
    }
    for e in graph.edges() {
        for (label, w) in e.values.iter() {
            projection.merge_value(e.src, e.dst, *label, *w);
        }
        for uc in e.upper_case.entries() {
            projection.merge_value(e.src, e.dst, uc.label, uc.weight);
        }
    }
    projection.refresh_children();
    Ok(projection)
}

/// Check the AllMax projection of `graph`.
///
/// Unconditional projections are checked with Bellman-Ford, the others
/// with the CSTN engine under `config` and `cancel`. The returned status
/// may be inconclusive when that run is stopped early.
pub fn check_all_max(graph: &TNGraph, config: &CheckConfig, cancel: &CancelFlag) -> Result<CheckStatus> {
    let projection = all_max_projection(graph)?;
    let status = if projection.is_unconditional() {
        let start = Instant::now();
        let consistent = Stn::from_graph(&projection)?.bellman_ford(None, PathMode::FromSource);
        CheckStatus {
            state: if consistent { CheckState::StableConsistent } else { CheckState::StableInconsistent },
            consistency: consistent,
            finished: true,
            initialized: true,
            execution_time: Some(start.elapsed()),
            ..CheckStatus::new()
        }
    } else {
        Cstn::new(projection, config.clone()).with_cancel_flag(cancel.clone()).check()?
    };
    debug!(state = ?status.state, cycles = status.cycles, "AllMax projection checked");
    Ok(status)
}
