//! Edge (labeled distance constraint) of a temporal network.

use serde::{Deserialize, Serialize};

use super::aleph::{ALabel, UpperCaseMap};
use super::label::Label;
use super::labeled_map::LabeledValueMap;
use super::node::NodeId;
use super::weight::Weight;

/// Opaque edge identifier: the edge's slot in the graph arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EdgeId(pub u32);

impl EdgeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for EdgeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Origin of an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ConstraintType {
    /// Given by the user.
    #[default]
    Requirement,
    /// One half of a contingent link.
    Contingent,
    /// Created by propagation.
    Derived,
    /// Added by the initializer (bounds, corrective edges).
    Internal,
}

/// The lower-case value of a contingent link `A ⇒ C`: the minimal duration
/// `x`, stored on `A→C`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LowerCaseValue {
    pub label: Label,
    pub node: NodeId,
    pub weight: Weight,
}

/// A directed edge `src → dst`. A value `(ℓ, w)` means `dst − src ≤ w` in
/// every scenario satisfying `ℓ`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub id: EdgeId,
    pub name: String,
    pub src: NodeId,
    pub dst: NodeId,
    pub constraint_type: ConstraintType,
    pub values: LabeledValueMap,
    #[serde(default)]
    pub upper_case: UpperCaseMap,
    #[serde(default)]
    pub lower_case: Option<LowerCaseValue>,
}

impl Edge {
    pub fn new(
        id: EdgeId,
        name: impl Into<String>,
        src: NodeId,
        dst: NodeId,
        constraint_type: ConstraintType,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            src,
            dst,
            constraint_type,
            values: LabeledValueMap::new(),
            upper_case: UpperCaseMap::new(),
            lower_case: None,
        }
    }

    pub fn with_value(mut self, label: Label, w: Weight) -> Self {
        self.values.merge(label, w);
        self
    }

    pub fn is_self_loop(&self) -> bool {
        self.src == self.dst
    }

    pub fn is_contingent(&self) -> bool {
        self.constraint_type == ConstraintType::Contingent
    }

    /// No ordinary, upper-case or lower-case value.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty() && self.upper_case.is_empty() && self.lower_case.is_none()
    }

    /// Merge an ordinary value. `true` when the edge changed.
    ///
    /// Upper-case values that the new ordinary value makes redundant are
    /// dropped as well.
    pub fn merge_value(&mut self, label: Label, w: Weight) -> bool {
        if !self.values.merge(label, w) {
            return false;
        }
        self.upper_case.retain(|l, _, v| !(l.subsumes(&label) && v >= w));
        true
    }

    /// Merge an upper-case value. An empty ℵ is merged as an ordinary value.
    /// Values not better than an ordinary value under a more general label
    /// are rejected.
    pub fn merge_upper_case(&mut self, label: Label, aleph: ALabel, w: Weight) -> bool {
        if aleph.is_empty() {
            return self.merge_value(label, w);
        }
        if self.values.is_dominated(&label, w) {
            return false;
        }
        self.upper_case.merge(label, aleph, w)
    }

    /// Set the lower-case value. Only the smallest one for a given label is
    /// kept; a contingent link has exactly one.
    pub fn set_lower_case(&mut self, label: Label, node: NodeId, w: Weight) -> bool {
        match &self.lower_case {
            Some(lc) if lc.node == node && lc.label == label && lc.weight <= w => false,
            _ => {
                self.lower_case = Some(LowerCaseValue { label, node, weight: w });
                true
            }
        }
    }

    /// Total number of stored values (ordinary + upper-case + lower-case).
    pub fn value_count(&self) -> usize {
        self.values.len() + self.upper_case.len() + usize::from(self.lower_case.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn l(s: &str) -> Label {
        Label::parse(s).unwrap()
    }

    #[test]
    fn test_merge_value_prunes_upper_case() {
        let mut e = Edge::new(EdgeId(0), "X-Z", NodeId(1), NodeId(0), ConstraintType::Requirement);
        assert!(e.merge_upper_case(l("a"), ALabel::single(NodeId(3)), -4));
        assert!(e.merge_value(Label::EMPTY, -6));
        assert!(e.upper_case.is_empty());
        assert!(!e.merge_upper_case(l("a"), ALabel::single(NodeId(3)), -5));
    }

    #[test]
    fn test_empty_aleph_is_ordinary() {
        let mut e = Edge::new(EdgeId(0), "A-B", NodeId(1), NodeId(2), ConstraintType::Derived);
        assert!(e.merge_upper_case(Label::EMPTY, ALabel::empty(), 3));
        assert_eq!(e.values.get(&Label::EMPTY), Some(3));
        assert!(e.upper_case.is_empty());
    }

    #[test]
    fn test_lower_case_keeps_smallest() {
        let mut e = Edge::new(EdgeId(0), "A-C", NodeId(1), NodeId(2), ConstraintType::Contingent);
        assert!(e.set_lower_case(Label::EMPTY, NodeId(2), 3));
        assert!(!e.set_lower_case(Label::EMPTY, NodeId(2), 5));
        assert_eq!(e.value_count(), 1);
    }
}
