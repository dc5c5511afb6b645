//! Label algebra.
//!
//! A `Label` is an immutable conjunction of literals. Each proposition
//! appears at most once, in exactly one state (straight, negated, unknown).
//! Internally a label is three disjoint 64-bit masks, so labels are `Copy`
//! and cheap to hash: they are the keys of every labeled value map.
//!
//! The algebra never computes the proposition hierarchy itself. Operations
//! that need the children-of relation take it as a closure.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::literal::{Literal, LiteralState, NOT, Proposition, UNKNOWN};
use crate::{Error, Result};

/// Text form of the empty label.
pub const EMPTY_LABEL: &str = "⊡";

/// A conjunction of literals over the proposition alphabet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Label {
    straight: u64,
    negated: u64,
    unknown: u64,
}

fn propositions_of(mask: u64) -> impl Iterator<Item = Proposition> {
    (0..Proposition::MAX)
        .filter(move |i| mask & (1u64 << i) != 0)
        .filter_map(Proposition::from_index)
}

impl Label {
    /// The empty label (always true).
    pub const EMPTY: Label = Label { straight: 0, negated: 0, unknown: 0 };

    pub fn new() -> Self {
        Self::EMPTY
    }

    /// Label holding a single literal.
    pub fn of(literal: Literal) -> Self {
        Self::EMPTY.with(literal)
    }

    /// Build from literals. Later literals on the same proposition replace
    /// earlier ones.
    pub fn from_literals(literals: impl IntoIterator<Item = Literal>) -> Self {
        literals.into_iter().fold(Self::EMPTY, |acc, l| acc.with(l))
    }

    /// Copy of this label where `literal` replaces whatever state its
    /// proposition had.
    pub fn with(self, literal: Literal) -> Self {
        let mut out = self.remove_proposition(literal.proposition);
        let bit = literal.proposition.bit();
        match literal.state {
            LiteralState::Straight => out.straight |= bit,
            LiteralState::Negated => out.negated |= bit,
            LiteralState::Unknown => out.unknown |= bit,
        }
        out
    }

    fn mask(&self) -> u64 {
        self.straight | self.negated | self.unknown
    }

    pub fn is_empty(&self) -> bool {
        self.mask() == 0
    }

    /// Number of literals.
    pub fn len(&self) -> usize {
        self.mask().count_ones() as usize
    }

    /// Literals in alphabet order.
    pub fn literals(&self) -> impl Iterator<Item = Literal> + '_ {
        propositions_of(self.mask()).filter_map(move |p| self.state_of(p).map(|s| Literal::new(p, s)))
    }

    /// Propositions mentioned, in any state.
    pub fn propositions(&self) -> impl Iterator<Item = Proposition> + use<> {
        propositions_of(self.mask())
    }

    /// Propositions mentioned with the unknown state.
    pub fn unknown_propositions(&self) -> impl Iterator<Item = Proposition> + use<> {
        propositions_of(self.unknown)
    }

    pub fn state_of(&self, p: Proposition) -> Option<LiteralState> {
        let bit = p.bit();
        if self.straight & bit != 0 {
            Some(LiteralState::Straight)
        } else if self.negated & bit != 0 {
            Some(LiteralState::Negated)
        } else if self.unknown & bit != 0 {
            Some(LiteralState::Unknown)
        } else {
            None
        }
    }

    /// Does the label mention `p` in any state?
    pub fn contains_proposition(&self, p: Proposition) -> bool {
        self.mask() & p.bit() != 0
    }

    /// Does the label contain exactly this literal?
    pub fn contains(&self, literal: Literal) -> bool {
        self.state_of(literal.proposition) == Some(literal.state)
    }

    pub fn contains_unknown(&self) -> bool {
        self.unknown != 0
    }

    /// Conjunction. `None` when the labels disagree on some proposition.
    pub fn conjunction(&self, other: &Label) -> Option<Label> {
        let out = Label {
            straight: self.straight | other.straight,
            negated: self.negated | other.negated,
            unknown: self.unknown | other.unknown,
        };
        let clash = (out.straight & out.negated)
            | (out.straight & out.unknown)
            | (out.negated & out.unknown);
        (clash == 0).then_some(out)
    }

    /// Extended conjunction (`★`). Never fails: disagreeing literals
    /// collapse to unknown.
    pub fn conjunction_extended(&self, other: &Label) -> Label {
        let straight = self.straight | other.straight;
        let negated = self.negated | other.negated;
        let unknown = self.unknown | other.unknown | (straight & negated);
        Label {
            straight: straight & !unknown,
            negated: negated & !unknown,
            unknown,
        }
    }

    /// Can the two labels be conjoined?
    pub fn is_consistent_with(&self, other: &Label) -> bool {
        self.conjunction(other).is_some()
    }

    /// `self` subsumes `other` when every literal of `other` is in `self`,
    /// i.e. `self` is at least as specific.
    pub fn subsumes(&self, other: &Label) -> bool {
        (other.straight & !self.straight) == 0
            && (other.negated & !self.negated) == 0
            && (other.unknown & !self.unknown) == 0
    }

    /// Remove one literal. A no-op when the label holds the proposition in
    /// another state or not at all.
    pub fn remove(&self, literal: Literal) -> Label {
        if self.contains(literal) {
            self.remove_proposition(literal.proposition)
        } else {
            *self
        }
    }

    /// Remove a proposition in whatever state it appears.
    pub fn remove_proposition(&self, p: Proposition) -> Label {
        let keep = !p.bit();
        Label {
            straight: self.straight & keep,
            negated: self.negated & keep,
            unknown: self.unknown & keep,
        }
    }

    /// Remove every proposition mentioned by `props`.
    pub fn remove_all(&self, props: &Label) -> Label {
        let keep = !props.mask();
        Label {
            straight: self.straight & keep,
            negated: self.negated & keep,
            unknown: self.unknown & keep,
        }
    }

    /// Sub-label restricted by another label's proposition set.
    ///
    /// With `shared == true`, keeps the literals whose proposition also
    /// appears in `other`; otherwise keeps those whose proposition does not.
    pub fn sub_label_in(&self, other: &Label, shared: bool) -> Label {
        let filter = if shared { other.mask() } else { !other.mask() };
        Label {
            straight: self.straight & filter,
            negated: self.negated & filter,
            unknown: self.unknown & filter,
        }
    }

    /// Drop every proposition that is a child of an unknown literal in this
    /// label. `children_of(p)` lists, as a label, the propositions whose
    /// observation only makes sense once `p` is known.
    pub fn remove_children_of_unknown<F>(&self, children_of: F) -> Label
    where
        F: Fn(Proposition) -> Label,
    {
        if self.unknown == 0 {
            return *self;
        }
        let mut out = *self;
        for p in self.unknown_propositions() {
            out = out.remove_all(&children_of(p));
        }
        out
    }

    /// Parse the text form (`a¬b¿c`, `⊡` for empty; `!` and `?` are
    /// accepted for `¬` and `¿`).
    pub fn parse(s: &str) -> Result<Label> {
        s.parse()
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "{EMPTY_LABEL}");
        }
        for literal in self.literals() {
            write!(f, "{literal}")?;
        }
        Ok(())
    }
}

impl FromStr for Label {
    type Err = Error;

    fn from_str(s: &str) -> Result<Label> {
        let s = s.trim();
        if s.is_empty() || s == EMPTY_LABEL {
            return Ok(Label::EMPTY);
        }
        let mut label = Label::EMPTY;
        let mut state = LiteralState::Straight;
        for c in s.chars() {
            match c {
                NOT | '!' => state = LiteralState::Negated,
                UNKNOWN | '?' => state = LiteralState::Unknown,
                c if c.is_whitespace() => {}
                c => {
                    let p = Proposition::try_from(c)?;
                    if label.contains_proposition(p) {
                        return Err(Error::InvalidLabel(format!(
                            "proposition '{c}' appears twice in \"{s}\""
                        )));
                    }
                    label = label.with(Literal::new(p, state));
                    state = LiteralState::Straight;
                }
            }
        }
        if state != LiteralState::Straight {
            return Err(Error::InvalidLabel(format!("dangling operator in \"{s}\"")));
        }
        Ok(label)
    }
}

impl Serialize for Label {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Label {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn l(s: &str) -> Label {
        Label::parse(s).unwrap()
    }

    fn p(c: char) -> Proposition {
        Proposition::from_char(c).unwrap()
    }

    #[test]
    fn test_parse_and_display() {
        assert_eq!(l("a¬b¿c").to_string(), "a¬b¿c");
        assert_eq!(l("!b a").to_string(), "a¬b");
        assert_eq!(l("⊡"), Label::EMPTY);
        assert_eq!(Label::EMPTY.to_string(), "⊡");
        assert!(Label::parse("aa").is_err());
        assert!(Label::parse("a¬").is_err());
        assert!(Label::parse("a1").is_err());
    }

    #[test]
    fn test_conjunction_conflict() {
        assert_eq!(l("a").conjunction(&l("b")), Some(l("ab")));
        assert_eq!(l("a").conjunction(&l("¬a")), None);
        assert_eq!(l("¿a").conjunction(&l("a")), None);
        assert_eq!(l("a¬b").conjunction(&l("¬b")), Some(l("a¬b")));
    }

    #[test]
    fn test_conjunction_extended() {
        assert_eq!(l("a").conjunction_extended(&l("¬a")), l("¿a"));
        assert_eq!(l("a¬b").conjunction_extended(&l("¬ac")), l("¿a¬bc"));
        assert_eq!(l("¿a").conjunction_extended(&l("a")), l("¿a"));
    }

    #[test]
    fn test_subsumes() {
        assert!(l("ab").subsumes(&l("a")));
        assert!(!l("a").subsumes(&l("ab")));
        assert!(l("a").subsumes(&Label::EMPTY));
        assert!(!l("¬a").subsumes(&l("a")));
        assert!(!l("¿a").subsumes(&l("a")));
    }

    #[test]
    fn test_remove() {
        assert_eq!(l("a¬b").remove(p('b').negated()), l("a"));
        assert_eq!(l("a¬b").remove(p('b').straight()), l("a¬b"));
        assert_eq!(l("a¬b¿c").remove_proposition(p('c')), l("a¬b"));
        assert_eq!(l("a¬b¿c").remove_all(&l("ac")), l("¬b"));
    }

    #[test]
    fn test_sub_label_in() {
        let alpha = l("a¬bc");
        let beta = l("¬b¬cd");
        assert_eq!(alpha.sub_label_in(&beta, true), l("¬bc"));
        assert_eq!(alpha.sub_label_in(&beta, false), l("a"));
        assert_eq!(beta.sub_label_in(&alpha, false), l("d"));
    }

    #[test]
    fn test_remove_children_of_unknown() {
        // q and r are observed only when p is known
        let children = |x: Proposition| if x == p('p') { l("qr") } else { Label::EMPTY };
        assert_eq!(l("¿pq¬rs").remove_children_of_unknown(children), l("¿ps"));
        assert_eq!(l("pq¬r").remove_children_of_unknown(children), l("pq¬r"));
    }

    fn arb_label() -> impl Strategy<Value = Label> {
        prop::collection::vec((0usize..6, 0u8..4), 0..6).prop_map(|lits| {
            let mut label = Label::EMPTY;
            for (idx, state) in lits {
                let prop = Proposition::from_index(idx).unwrap();
                label = match state {
                    0 => label.with(prop.straight()),
                    1 => label.with(prop.negated()),
                    2 => label.with(prop.unknown()),
                    _ => label,
                };
            }
            label
        })
    }

    proptest! {
        #[test]
        fn conjunction_is_commutative(a in arb_label(), b in arb_label()) {
            prop_assert_eq!(a.conjunction(&b), b.conjunction(&a));
        }

        #[test]
        fn conjunction_extended_is_total_and_commutative(a in arb_label(), b in arb_label()) {
            let ab = a.conjunction_extended(&b);
            prop_assert_eq!(ab, b.conjunction_extended(&a));
            if let Some(plain) = a.conjunction(&b) {
                prop_assert_eq!(plain, ab);
            }
        }

        #[test]
        fn subsumption_is_a_partial_order(a in arb_label(), b in arb_label(), c in arb_label()) {
            prop_assert!(a.subsumes(&a));
            if a.subsumes(&b) && b.subsumes(&a) {
                prop_assert_eq!(a, b);
            }
            if a.subsumes(&b) && b.subsumes(&c) {
                prop_assert!(a.subsumes(&c));
            }
        }

        #[test]
        fn removing_absent_literal_is_noop(a in arb_label(), idx in 0usize..6) {
            let prop = Proposition::from_index(idx).unwrap();
            if !a.contains_proposition(prop) {
                prop_assert_eq!(a.remove(prop.straight()), a);
                prop_assert_eq!(a.remove_proposition(prop), a);
            }
        }

        #[test]
        fn text_form_roundtrips(a in arb_label()) {
            prop_assert_eq!(Label::parse(&a.to_string()).unwrap(), a);
        }
    }
}
