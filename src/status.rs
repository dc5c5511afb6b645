//! Run status of a consistency/controllability check.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::Weight;
use crate::model::weight;

/// Driver state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CheckState {
    #[default]
    Initializing,
    Propagating,
    StableConsistent,
    StableInconsistent,
    TimedOut,
    CycleLimitReached,
    /// Stopped by the caller through a cancel flag.
    Cancelled,
}

impl CheckState {
    /// The check reached a verdict.
    pub fn is_stable(self) -> bool {
        matches!(self, CheckState::StableConsistent | CheckState::StableInconsistent)
    }
}

/// Per-rule application counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleCounters {
    pub r0: u64,
    pub r3: u64,
    pub labeled_propagation: u64,
    pub upper_case: u64,
    pub lower_case: u64,
    pub cross_case: u64,
    pub letter_removal: u64,
}

impl RuleCounters {
    pub fn total(&self) -> u64 {
        self.r0
            + self.r3
            + self.labeled_propagation
            + self.upper_case
            + self.lower_case
            + self.cross_case
            + self.letter_removal
    }
}

/// The negative self-loop that proved inconsistency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NegativeLoop {
    pub node: String,
    pub label: String,
    pub weight: Weight,
}

/// Mutable record of one check. Owned by the driver while it runs, read by
/// the caller afterwards.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CheckStatus {
    pub state: CheckState,
    /// Verdict: consistent (CSTN) / controllable (CSTNU). Meaningful only
    /// when `finished`.
    pub consistency: bool,
    pub finished: bool,
    pub timeout: bool,
    pub initialized: bool,
    pub cycles: u64,
    pub rules: RuleCounters,
    /// Auto-fixed well-definedness violations found by the initializer.
    pub well_definition_fixes: u64,
    pub horizon: Weight,
    pub started_at: Option<DateTime<Utc>>,
    pub execution_time: Option<Duration>,
    pub negative_loop: Option<NegativeLoop>,
    /// Whether the AllMax projection confirmed controllability (CSTNU only).
    pub all_max_consistent: Option<bool>,
}

impl CheckStatus {
    pub fn new() -> Self {
        Self { consistency: true, ..Self::default() }
    }

    pub fn reset(&mut self) {
        *self = CheckStatus::new();
    }

    /// Record a proven negative loop.
    pub fn set_inconsistent(&mut self, loop_found: NegativeLoop) {
        self.consistency = false;
        self.finished = true;
        self.state = CheckState::StableInconsistent;
        self.negative_loop = Some(loop_found);
    }

    pub fn is_inconclusive(&self) -> bool {
        matches!(
            self.state,
            CheckState::TimedOut | CheckState::CycleLimitReached | CheckState::Cancelled
        )
    }
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verdict = match self.state {
            CheckState::StableConsistent => "consistent",
            CheckState::StableInconsistent => "NOT consistent",
            CheckState::TimedOut => "timeout",
            CheckState::CycleLimitReached => "cycle limit reached (not consistent by exhaustion)",
            CheckState::Cancelled => "cancelled",
            CheckState::Initializing | CheckState::Propagating => "running",
        };
        writeln!(f, "Verdict: {verdict}")?;
        writeln!(f, "Cycles: {}", self.cycles)?;
        writeln!(f, "Horizon: {}", weight::format(self.horizon))?;
        writeln!(
            f,
            "Rules: R0={} R3={} LP={} UC={} LC={} CC={} LR={}",
            self.rules.r0,
            self.rules.r3,
            self.rules.labeled_propagation,
            self.rules.upper_case,
            self.rules.lower_case,
            self.rules.cross_case,
            self.rules.letter_removal
        )?;
        if self.well_definition_fixes > 0 {
            writeln!(f, "Well-definition fixes: {}", self.well_definition_fixes)?;
        }
        if let Some(nl) = &self.negative_loop {
            writeln!(f, "Negative loop: {} ({}, {})", nl.node, weight::format(nl.weight), nl.label)?;
        }
        if let Some(all_max) = self.all_max_consistent {
            writeln!(f, "AllMax projection consistent: {all_max}")?;
        }
        match self.execution_time {
            Some(t) => write!(f, "Elapsed: {:.3}s, timeout: {}", t.as_secs_f64(), self.timeout),
            None => write!(f, "Elapsed: n/a, timeout: {}", self.timeout),
        }
    }
}
