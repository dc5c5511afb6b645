//! Check configuration and the DC-semantics policy.
//!
//! The three dynamic-consistency semantics differ only at a few hook points
//! of the rules. `DcSemantics` is the policy value carrying them; every rule
//! takes it as an argument.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::model::weight::{self, Weight};
use crate::{Error, Result};

// ============================================================================
// DC semantics
// ============================================================================

/// How fast a strategy may react to an observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DcSemantics {
    /// Reaction at the same instant as the observation.
    #[default]
    InstantaneousReaction,
    /// Reaction strictly after the observation.
    Standard,
    /// Reaction at least `reaction_time` after the observation.
    Epsilon {
        #[serde(alias = "reactionTime")]
        reaction_time: Weight,
    },
}

impl DcSemantics {
    pub fn epsilon(reaction_time: Weight) -> Result<Self> {
        let s = DcSemantics::Epsilon { reaction_time };
        s.validate()?;
        Ok(s)
    }

    pub fn validate(&self) -> Result<()> {
        match *self {
            DcSemantics::Epsilon { reaction_time } if reaction_time <= 0 => Err(Error::InvalidConfig(
                format!("reaction time must be positive, got {reaction_time}"),
            )),
            _ => Ok(()),
        }
    }

    /// Reaction delay ε (0 for IR and Standard).
    pub fn reaction_time(&self) -> Weight {
        match *self {
            DcSemantics::Epsilon { reaction_time } => reaction_time,
            _ => 0,
        }
    }

    /// R0/qR0 applies to `P? →[w] X` when `X` is too close to `P?` to have
    /// seen the observation.
    pub fn r0_applies(&self, w: Weight) -> bool {
        match *self {
            DcSemantics::InstantaneousReaction => w < 0,
            DcSemantics::Standard => w <= 0,
            DcSemantics::Epsilon { reaction_time } => w < reaction_time,
        }
    }

    /// R3/qR3* applies to the observer edge `P? →[w] D` under the R0
    /// condition, except for a zero weight into Z.
    pub fn r3_applies(&self, w: Weight, d_is_z: bool) -> bool {
        self.r0_applies(w) && !(d_is_z && w == 0)
    }

    /// Weight produced by R3 from the sibling value `v` and the observer
    /// value `w`.
    pub fn r3_value(&self, v: Weight, w: Weight) -> Weight {
        let w = match *self {
            DcSemantics::Epsilon { reaction_time } if w != weight::NEG_INFINITY => w - reaction_time,
            _ => w,
        };
        v.max(w)
    }

    /// Bound `X − P? ≥ −weight` inserted when `X`'s label mentions the
    /// proposition observed at `P?`: the observation must come first.
    pub fn observer_precedence_bound(&self) -> Weight {
        -self.reaction_time()
    }
}

impl std::fmt::Display for DcSemantics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DcSemantics::InstantaneousReaction => write!(f, "IR"),
            DcSemantics::Standard => write!(f, "Std"),
            DcSemantics::Epsilon { reaction_time } => write!(f, "ε={reaction_time}"),
        }
    }
}

// ============================================================================
// CheckConfig
// ============================================================================

/// Options recognized by the checkers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CheckConfig {
    pub dc_semantics: DcSemantics,
    /// Derive only values on edges into Z (the Z-limited rule set).
    #[serde(alias = "propagateOnlyToSink")]
    pub propagate_only_to_z: bool,
    #[serde(rename = "timeoutSeconds", with = "duration_secs")]
    pub timeout: Duration,
    /// Produce a cleaned copy of the checked graph.
    pub output_cleaned: bool,
    /// Overrides the computed cycle budget.
    pub cycle_limit: Option<u64>,
}

impl Default for CheckConfig {
    fn default() -> Self {
        Self {
            dc_semantics: DcSemantics::default(),
            propagate_only_to_z: false,
            timeout: Duration::from_secs(30 * 60),
            output_cleaned: false,
            cycle_limit: None,
        }
    }
}

impl CheckConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a JSON configuration, e.g.
    /// `{"dcSemantics": {"kind": "epsilon", "reaction_time": 2}, "timeoutSeconds": 10}`.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: CheckConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.dc_semantics.validate()?;
        if self.timeout.is_zero() {
            return Err(Error::InvalidConfig("timeout must be positive".into()));
        }
        Ok(())
    }

    pub fn with_semantics(mut self, semantics: DcSemantics) -> Self {
        self.dc_semantics = semantics;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_propagate_only_to_z(mut self, only_to_z: bool) -> Self {
        self.propagate_only_to_z = only_to_z;
        self
    }

    pub fn with_output_cleaned(mut self, cleaned: bool) -> Self {
        self.output_cleaned = cleaned;
        self
    }

    pub fn with_cycle_limit(mut self, limit: u64) -> Self {
        self.cycle_limit = Some(limit);
        self
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}
