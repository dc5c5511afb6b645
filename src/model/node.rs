//! Node (timepoint) of a temporal network.

use serde::{Deserialize, Serialize};

use super::label::Label;
use super::literal::Proposition;
use super::weight::Weight;

/// Opaque node identifier: the node's index in the graph arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Role of a node in a contingent link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ContingentRole {
    #[default]
    None,
    /// Starts one or more contingent links.
    Activation,
    /// Ends a contingent link: executed by nature.
    Contingent,
    /// Ends one contingent link and starts another.
    ContingentAndActivation,
}

impl ContingentRole {
    pub fn is_contingent(self) -> bool {
        matches!(self, ContingentRole::Contingent | ContingentRole::ContingentAndActivation)
    }

    pub fn is_activation(self) -> bool {
        matches!(self, ContingentRole::Activation | ContingentRole::ContingentAndActivation)
    }

    pub(crate) fn with_activation(self) -> Self {
        match self {
            ContingentRole::None | ContingentRole::Activation => ContingentRole::Activation,
            _ => ContingentRole::ContingentAndActivation,
        }
    }

    pub(crate) fn with_contingent(self) -> Self {
        match self {
            ContingentRole::None | ContingentRole::Contingent => ContingentRole::Contingent,
            _ => ContingentRole::ContingentAndActivation,
        }
    }
}

/// A timepoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub name: String,
    /// Scenarios in which the node is executed.
    pub label: Label,
    /// Proposition whose truth value is revealed when this node executes.
    pub observes: Option<Proposition>,
    #[serde(default)]
    pub role: ContingentRole,
    /// Scratch distance used by shortest-path algorithms.
    #[serde(skip)]
    pub potential: Weight,
}

impl Node {
    pub fn new(id: NodeId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            label: Label::EMPTY,
            observes: None,
            role: ContingentRole::None,
            potential: 0,
        }
    }

    pub fn with_label(mut self, label: Label) -> Self {
        self.label = label;
        self
    }

    pub fn with_observed(mut self, p: Proposition) -> Self {
        self.observes = Some(p);
        self
    }

    pub fn is_observer(&self) -> bool {
        self.observes.is_some()
    }

    pub fn is_contingent(&self) -> bool {
        self.role.is_contingent()
    }

    pub fn is_activation(&self) -> bool {
        self.role.is_activation()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let p = Proposition::from_char('p').unwrap();
        let n = Node::new(NodeId(1), "P?")
            .with_observed(p)
            .with_label(Label::parse("¬q").unwrap());
        assert!(n.is_observer());
        assert!(!n.is_contingent());
        assert_eq!(n.label.to_string(), "¬q");
    }

    #[test]
    fn test_roles_combine() {
        let r = ContingentRole::None.with_contingent().with_activation();
        assert_eq!(r, ContingentRole::ContingentAndActivation);
        assert!(r.is_contingent() && r.is_activation());
    }
}
