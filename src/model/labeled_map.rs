//! Antichain-minimal map from labels to weights.
//!
//! The map never holds two entries `(α, v)` and `(β, w)` where `α` subsumes
//! `β` and `v ≥ w`: the more specific, weaker entry is redundant and is
//! dropped on merge.

use std::fmt;

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use super::label::Label;
use super::weight::{self, Weight};

/// Labeled values of one edge.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LabeledValueMap {
    values: HashMap<Label, Weight>,
}

impl LabeledValueMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value stored under exactly this label.
    pub fn get(&self, label: &Label) -> Option<Weight> {
        self.values.get(label).copied()
    }

    /// Minimal value among entries whose label is subsumed by `label`
    /// (entries that hold in every scenario satisfying `label`).
    pub fn min_value_subsumed_by(&self, label: &Label) -> Option<Weight> {
        self.values
            .iter()
            .filter(|(l, _)| label.subsumes(l))
            .map(|(_, w)| *w)
            .min()
    }

    /// Entries in a stable order (fewest literals first, then label order).
    pub fn entries(&self) -> Vec<(Label, Weight)> {
        let mut out: Vec<(Label, Weight)> = self.values.iter().map(|(l, w)| (*l, *w)).collect();
        out.sort_by(|a, b| a.0.len().cmp(&b.0.len()).then(a.0.cmp(&b.0)));
        out
    }

    pub fn labels(&self) -> impl Iterator<Item = &Label> {
        self.values.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Label, &Weight)> {
        self.values.iter()
    }

    /// Would `(label, w)` be redundant with respect to the current entries?
    pub fn is_dominated(&self, label: &Label, w: Weight) -> bool {
        self.values
            .iter()
            .any(|(l, v)| label.subsumes(l) && *v <= w)
    }

    /// Merge a value, keeping the map antichain-minimal.
    ///
    /// Returns `true` when the map changed, i.e. the new value was not
    /// dominated. Every entry the new value dominates is removed.
    pub fn merge(&mut self, label: Label, w: Weight) -> bool {
        if w == weight::POS_INFINITY || self.is_dominated(&label, w) {
            return false;
        }
        self.values.retain(|l, v| !(l.subsumes(&label) && *v >= w));
        self.values.insert(label, w);
        true
    }

    /// Remove the value stored under exactly this label.
    pub fn remove(&mut self, label: &Label) -> Option<Weight> {
        self.values.remove(label)
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    /// Keep only entries satisfying `keep`.
    pub fn retain(&mut self, mut keep: impl FnMut(&Label, Weight) -> bool) {
        self.values.retain(|l, w| keep(l, *w));
    }

    /// Smallest weight in the map.
    pub fn min_value(&self) -> Option<Weight> {
        self.values.values().copied().min()
    }

    /// Largest weight in the map.
    pub fn max_value(&self) -> Option<Weight> {
        self.values.values().copied().max()
    }
}

impl fmt::Display for LabeledValueMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (label, w)) in self.entries().into_iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "({}, {})", weight::format(w), label)?;
        }
        write!(f, "}}")
    }
}

impl FromIterator<(Label, Weight)> for LabeledValueMap {
    fn from_iter<I: IntoIterator<Item = (Label, Weight)>>(iter: I) -> Self {
        let mut map = LabeledValueMap::new();
        for (label, w) in iter {
            map.merge(label, w);
        }
        map
    }
}
