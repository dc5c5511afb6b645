//! # CSTNU dynamic-controllability checker
//!
//! Runs the CSTN driver with the contingent-link rules switched on, then
//! confirms a positive verdict on the AllMax projection. The post-check
//! shares the run's deadline, cycle budget and cancel flag.
//!
//! ```text
//! init: contingent links ──► CSTN init (Z, bounds, R0 pass)
//! check: CSTN fixed point (+ UC / LC / CC / LR) ──► AllMax post-check
//! ```

pub mod allmax;
pub mod init;
pub mod rules;

use tracing::{info, warn};

use crate::config::CheckConfig;
use crate::cstn::Cstn;
use crate::graph::TNGraph;
use crate::model::Weight;
use crate::runtime::{CancelFlag, DcChecker};
use crate::status::{CheckState, CheckStatus};
use crate::{Error, Result};

#[derive(Debug)]
pub struct Cstnu {
    inner: Cstn,
    links: usize,
}

impl Cstnu {
    pub fn new(graph: TNGraph, config: CheckConfig) -> Self {
        Self { inner: Cstn::new(graph, config).with_contingent_rules(), links: 0 }
    }

    pub fn with_cancel_flag(mut self, flag: CancelFlag) -> Self {
        self.inner = self.inner.with_cancel_flag(flag);
        self
    }

    pub fn graph(&self) -> &TNGraph {
        self.inner.graph()
    }

    pub fn into_graph(self) -> TNGraph {
        self.inner.into_graph()
    }

    pub fn status(&self) -> &CheckStatus {
        self.inner.status()
    }

    pub fn config(&self) -> &CheckConfig {
        self.inner.config()
    }

    pub fn horizon(&self) -> Weight {
        self.inner.horizon()
    }

    /// Number of contingent links found by `init`.
    pub fn link_count(&self) -> usize {
        self.links
    }

    /// Install the case values of every contingent link, then run the
    /// CSTN initialization.
    pub fn init(&mut self) -> Result<()> {
        if self.inner.status().initialized {
            return Err(Error::AlreadyInitialized);
        }
        self.links = init::init_contingent_links(self.inner.graph_mut())?;
        self.inner.init()
    }

    /// Initialize if needed, propagate, and run the AllMax post-check on a
    /// stable result.
    pub fn check(&mut self) -> Result<CheckStatus> {
        if !self.inner.status().initialized {
            self.init()?;
        }
        let status = self.inner.propagate()?;
        if status.state != CheckState::StableConsistent || status.all_max_consistent.is_some() {
            return Ok(status);
        }

        let config = remaining_config(self.inner.config(), &status);
        let post = if config.timeout.is_zero() {
            CheckStatus { state: CheckState::TimedOut, timeout: true, ..CheckStatus::new() }
        } else {
            allmax::check_all_max(self.inner.graph(), &config, self.inner.cancel_flag())?
        };
        match post.state {
            CheckState::StableConsistent => {}
            CheckState::StableInconsistent => {
                warn!(network = %self.inner.graph().name(), "AllMax projection inconsistent");
            }
            state => warn!(?state, "AllMax post-check interrupted"),
        }
        record_all_max(self.inner.status_mut(), &post);
        let status = self.inner.status();
        info!(
            links = self.links,
            verdict = ?status.state,
            controllable = status.consistency,
            "controllability verdict"
        );
        Ok(status.clone())
    }

    /// One full rule pass; see [`Cstn::propagation_pass`].
    pub fn propagation_pass(&mut self) -> Result<usize> {
        self.inner.propagation_pass()
    }

    pub fn cleaned_graph(&self) -> TNGraph {
        self.inner.cleaned_graph()
    }
}

/// What is left of the run's time and cycle budgets after `status`.
fn remaining_config(config: &CheckConfig, status: &CheckStatus) -> CheckConfig {
    let mut left = config.clone();
    left.timeout = config.timeout.saturating_sub(status.execution_time.unwrap_or_default());
    left.cycle_limit = config.cycle_limit.map(|limit| limit.saturating_sub(status.cycles));
    left
}

/// Fold the AllMax post-check into the run status. An interrupted
/// post-check leaves the verdict open.
fn record_all_max(status: &mut CheckStatus, post: &CheckStatus) {
    if let Some(extra) = post.execution_time {
        status.execution_time = Some(status.execution_time.unwrap_or_default() + extra);
    }
    match post.state {
        CheckState::StableConsistent => status.all_max_consistent = Some(true),
        CheckState::StableInconsistent => {
            status.all_max_consistent = Some(false);
            status.state = CheckState::StableInconsistent;
            status.consistency = false;
        }
        state => {
            status.all_max_consistent = None;
            status.state = state;
            status.consistency = false;
            status.finished = false;
            status.timeout = state == CheckState::TimedOut;
        }
    }
}

impl DcChecker for Cstnu {
    fn check(&mut self) -> Result<CheckStatus> {
        Cstnu::check(self)
    }

    fn status(&self) -> &CheckStatus {
        self.inner.status()
    }

    fn graph(&self) -> &TNGraph {
        self.inner.graph()
    }

    fn set_cancel_flag(&mut self, flag: CancelFlag) {
        DcChecker::set_cancel_flag(&mut self.inner, flag);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::model::{ALabel, Label};

    /// Z, A ⇒ C in [1, 3], and a requirement between Z and C.
    fn network(deadline: Weight) -> (TNGraph, [crate::model::NodeId; 3]) {
        let mut g = TNGraph::new("cstnu");
        let z = g.add_node("Z", Label::EMPTY).unwrap();
        let a = g.add_node("A", Label::EMPTY).unwrap();
        let c = g.add_node("C", Label::EMPTY).unwrap();
        g.set_z(z);
        g.add_contingent_link(a, c, 1, 3, Label::EMPTY).unwrap();
        g.merge_value(z, c, Label::EMPTY, deadline);
        (g, [z, a, c])
    }

    #[test]
    fn test_init_installs_link_and_rejects_reinit() {
        let (g, [_, a, c]) = network(10);
        let mut cstnu = Cstnu::new(g, CheckConfig::default());
        cstnu.init().unwrap();
        assert_eq!(cstnu.link_count(), 1);
        let ca = cstnu.graph().edge_between(c, a).unwrap();
        assert_eq!(ca.upper_case.get(&Label::EMPTY, &ALabel::single(c)), Some(-3));
        assert!(matches!(cstnu.init(), Err(Error::AlreadyInitialized)));
    }

    #[test]
    fn test_controllable_with_slack() {
        let (g, _) = network(10);
        let mut cstnu = Cstnu::new(g, CheckConfig::default());
        let status = cstnu.check().unwrap();
        assert!(status.consistency);
        assert_eq!(status.all_max_consistent, Some(true));
    }

    fn stable() -> CheckStatus {
        CheckStatus {
            state: CheckState::StableConsistent,
            finished: true,
            initialized: true,
            cycles: 4,
            execution_time: Some(Duration::from_millis(10)),
            ..CheckStatus::new()
        }
    }

    #[test]
    fn test_remaining_budgets() {
        let config = CheckConfig::default().with_timeout(Duration::from_secs(1)).with_cycle_limit(10);
        let left = remaining_config(&config, &stable());
        assert_eq!(left.timeout, Duration::from_millis(990));
        assert_eq!(left.cycle_limit, Some(6));
        assert_eq!(remaining_config(&CheckConfig::default(), &stable()).cycle_limit, None);
    }

    #[test]
    fn test_projection_inconsistency_is_a_verdict() {
        let mut status = stable();
        let post = CheckStatus { state: CheckState::StableInconsistent, consistency: false, finished: true, ..stable() };
        record_all_max(&mut status, &post);
        assert_eq!(status.state, CheckState::StableInconsistent);
        assert!(status.finished);
        assert!(!status.consistency);
        assert_eq!(status.all_max_consistent, Some(false));
        assert_eq!(status.execution_time, Some(Duration::from_millis(20)));
    }

    #[test]
    fn test_interrupted_projection_is_inconclusive() {
        for state in [CheckState::TimedOut, CheckState::CycleLimitReached, CheckState::Cancelled] {
            let mut status = stable();
            let post = CheckStatus { state, consistency: false, ..CheckStatus::new() };
            record_all_max(&mut status, &post);
            assert_eq!(status.state, state);
            assert!(!status.finished);
            assert!(!status.consistency);
            assert_eq!(status.all_max_consistent, None);
            assert_eq!(status.timeout, state == CheckState::TimedOut);
        }
    }

    #[test]
    fn test_uncontrollable_deadline() {
        // C can take 3 after A, but must be at most 2 after Z, and A ≥ Z.
        let (g, _) = network(2);
        let mut cstnu = Cstnu::new(g, CheckConfig::default());
        let status = cstnu.check().unwrap();
        assert!(!status.consistency);
        assert_eq!(status.state, CheckState::StableInconsistent);
    }
}
