//! # cstnu — Dynamic consistency checking for temporal networks
//!
//! Decides whether a conditional temporal network (CSTN) is dynamically
//! consistent, or a conditional network with contingent links (CSTNU) is
//! dynamically controllable, by saturating labeled constraints until a fixed
//! point or a negative loop. Plain STNs get the classical shortest-path
//! algorithms.
//!
//! ## Design Principles
//!
//! 1. **Arena graph**: `TNGraph` addresses nodes and edges by stable ids
//! 2. **Pure rules**: every inference rule reads edge snapshots and returns
//!    derived values; only the drivers mutate the graph
//! 3. **Semantics as a value**: IR / Standard / ε-reaction is a `DcSemantics`
//!    policy passed to the rules, not a type hierarchy
//! 4. **Exhaustion is a status**: timeouts and cycle budgets end up in
//!    `CheckStatus`, never in `Error`
//!
//! ## Quick Start
//!
//! ```rust
//! use cstnu::{CheckConfig, Cstn, Label, TNGraph};
//!
//! # fn example() -> cstnu::Result<()> {
//! let mut g = TNGraph::new("two nodes");
//! let z = g.add_node("Z", Label::EMPTY)?;
//! let x = g.add_node("X", Label::EMPTY)?;
//! g.set_z(z);
//! g.merge_value(z, x, Label::EMPTY, 5);
//! g.merge_value(x, z, Label::EMPTY, -10);
//!
//! let mut checker = Cstn::new(g, CheckConfig::default());
//! let status = checker.check()?;
//! assert!(!status.consistency);
//! # Ok(())
//! # }
//! # example().unwrap();
//! ```
//!
//! ## Engines
//!
//! | Engine | Network | Entry point |
//! |--------|---------|-------------|
//! | CSTN | conditional, no contingent links | [`Cstn`] |
//! | CSTNU | conditional with contingent links | [`Cstnu`] |
//! | STN | plain distance graph | [`Stn`] |

// ============================================================================
// Modules
// ============================================================================

pub mod model;
pub mod graph;
pub mod config;
pub mod status;
pub mod cstn;
pub mod cstnu;
pub mod stn;
pub mod export;
pub mod runtime;

// ============================================================================
// Re-exports: Model
// ============================================================================

pub use model::{
    ALabel, ConstraintType, Edge, EdgeId, Label, LabeledValueMap, Literal, LiteralState, Node, NodeId,
    Proposition, Weight,
};

// ============================================================================
// Re-exports: Engines
// ============================================================================

pub use config::{CheckConfig, DcSemantics};
pub use cstn::Cstn;
pub use cstnu::Cstnu;
pub use graph::TNGraph;
pub use runtime::{CancelFlag, DcChecker};
pub use status::{CheckState, CheckStatus};
pub use stn::{Stn, StnAlgorithm};

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Structural problem that cannot be repaired automatically.
    #[error("Network not well defined: {0}")]
    WellDefinition(String),

    #[error("Contingent link error: {0}")]
    ContingentLink(String),

    #[error("Weight overflow: {0}")]
    Overflow(String),

    #[error("Network not initialized")]
    NotInitialized,

    #[error("Network already initialized")]
    AlreadyInitialized,

    #[error("Negative edge {0}: Dijkstra requires non-negative weights")]
    NegativeEdge(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Duplicate: {0}")]
    Duplicate(String),

    #[error("Invalid label: {0}")]
    InvalidLabel(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Runtime error: {0}")]
    Runtime(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
