//! Upper-case annotations.
//!
//! An upper-case value is a weight that holds unless one of the contingent
//! nodes named by its `ALabel` (ℵ) has already executed. Most upper-case
//! values carry a single contingent node; values on edges into Z may carry
//! several (conjoined upper-case values).

use std::fmt;

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use super::label::Label;
use super::node::NodeId;
use super::weight::{self, Weight};

/// A set of contingent nodes (ℵ). Kept sorted and deduplicated.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ALabel(SmallVec<[NodeId; 2]>);

impl ALabel {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn single(node: NodeId) -> Self {
        let mut v = SmallVec::new();
        v.push(node);
        ALabel(v)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.0.binary_search(&node).is_ok()
    }

    pub fn nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.0.iter().copied()
    }

    /// ℵ ∪ ℵ'.
    pub fn union(&self, other: &ALabel) -> ALabel {
        let mut v: SmallVec<[NodeId; 2]> = self.0.iter().chain(other.0.iter()).copied().collect();
        v.sort_unstable();
        v.dedup();
        ALabel(v)
    }

    /// ℵ ∖ {node}.
    pub fn without(&self, node: NodeId) -> ALabel {
        ALabel(self.0.iter().copied().filter(|n| *n != node).collect())
    }

    /// Is every node of `other` also in `self`?
    pub fn contains_all(&self, other: &ALabel) -> bool {
        other.0.iter().all(|n| self.contains(*n))
    }
}

impl FromIterator<NodeId> for ALabel {
    fn from_iter<I: IntoIterator<Item = NodeId>>(iter: I) -> Self {
        let mut v: SmallVec<[NodeId; 2]> = iter.into_iter().collect();
        v.sort_unstable();
        v.dedup();
        ALabel(v)
    }
}

impl fmt::Display for ALabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "◇");
        }
        let parts: Vec<String> = self.0.iter().map(|n| format!("n{n}")).collect();
        write!(f, "{}", parts.join("∙"))
    }
}

/// One upper-case value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpperCaseEntry {
    pub label: Label,
    pub aleph: ALabel,
    pub weight: Weight,
}

/// Antichain-minimal upper-case values of one edge.
///
/// `(α, ℵ, v)` is dominated by `(β, ℵ', w)` when `α` subsumes `β`,
/// `ℵ ⊇ ℵ'` and `v ≥ w`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "Vec<UpperCaseEntry>", from = "Vec<UpperCaseEntry>")]
pub struct UpperCaseMap {
    values: HashMap<(Label, ALabel), Weight>,
}

impl UpperCaseMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, label: &Label, aleph: &ALabel) -> Option<Weight> {
        self.values.get(&(*label, aleph.clone())).copied()
    }

    pub fn is_dominated(&self, label: &Label, aleph: &ALabel, w: Weight) -> bool {
        self.values
            .iter()
            .any(|((l, a), v)| label.subsumes(l) && aleph.contains_all(a) && *v <= w)
    }

    /// Merge a value; `true` when the map changed.
    pub fn merge(&mut self, label: Label, aleph: ALabel, w: Weight) -> bool {
        if w == weight::POS_INFINITY || self.is_dominated(&label, &aleph, w) {
            return false;
        }
        self.values
            .retain(|(l, a), v| !(l.subsumes(&label) && a.contains_all(&aleph) && *v >= w));
        self.values.insert((label, aleph), w);
        true
    }

    pub fn remove(&mut self, label: &Label, aleph: &ALabel) -> Option<Weight> {
        self.values.remove(&(*label, aleph.clone()))
    }

    pub fn retain(&mut self, mut keep: impl FnMut(&Label, &ALabel, Weight) -> bool) {
        self.values.retain(|(l, a), w| keep(l, a, *w));
    }

    /// Entries in a stable order.
    pub fn entries(&self) -> Vec<UpperCaseEntry> {
        let mut out: Vec<UpperCaseEntry> = self
            .values
            .iter()
            .map(|((label, aleph), w)| UpperCaseEntry { label: *label, aleph: aleph.clone(), weight: *w })
            .collect();
        out.sort_by(|a, b| {
            a.label
                .len()
                .cmp(&b.label.len())
                .then(a.label.cmp(&b.label))
                .then(a.aleph.cmp(&b.aleph))
        });
        out
    }
}

impl From<Vec<UpperCaseEntry>> for UpperCaseMap {
    fn from(entries: Vec<UpperCaseEntry>) -> Self {
        let mut map = UpperCaseMap::new();
        for e in entries {
            map.merge(e.label, e.aleph, e.weight);
        }
        map
    }
}

impl From<UpperCaseMap> for Vec<UpperCaseEntry> {
    fn from(map: UpperCaseMap) -> Self {
        map.entries()
    }
}
