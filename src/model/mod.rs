//! # Temporal Network Model
//!
//! Value types shared by every engine: literals and labels, labeled value
//! maps, upper-case annotations, nodes and edges.
//!
//! Design rule: this module is pure data. No I/O, no logging, no graph
//! traversal. The propagation engines and the graph arena build on it.

pub mod weight;
pub mod literal;
pub mod label;
pub mod labeled_map;
pub mod aleph;
pub mod node;
pub mod edge;

pub use weight::{Weight, NEG_INFINITY, POS_INFINITY, MAX_FINITE};
pub use literal::{Literal, LiteralState, Proposition};
pub use label::Label;
pub use labeled_map::LabeledValueMap;
pub use aleph::{ALabel, UpperCaseEntry, UpperCaseMap};
pub use node::{ContingentRole, Node, NodeId};
pub use edge::{ConstraintType, Edge, EdgeId, LowerCaseValue};
