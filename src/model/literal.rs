//! Propositions and literals.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Symbol used for a negated literal.
pub const NOT: char = '¬';
/// Symbol used for an unknown literal.
pub const UNKNOWN: char = '¿';

/// An observable proposition.
///
/// Propositions are written as single letters: `a`..`z` then `A`..`Z`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "char", into = "char")]
pub struct Proposition(u8);

impl Proposition {
    /// Size of the proposition alphabet.
    pub const MAX: usize = 52;

    /// Proposition by alphabet index.
    pub fn from_index(index: usize) -> Option<Self> {
        (index < Self::MAX).then_some(Proposition(index as u8))
    }

    /// Proposition for a letter.
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            'a'..='z' => Some(Proposition(c as u8 - b'a')),
            'A'..='Z' => Some(Proposition(c as u8 - b'A' + 26)),
            _ => None,
        }
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }

    pub fn as_char(self) -> char {
        if self.0 < 26 {
            (b'a' + self.0) as char
        } else {
            (b'A' + self.0 - 26) as char
        }
    }

    pub(crate) fn bit(self) -> u64 {
        1u64 << self.0
    }

    pub fn straight(self) -> Literal {
        Literal::new(self, LiteralState::Straight)
    }

    pub fn negated(self) -> Literal {
        Literal::new(self, LiteralState::Negated)
    }

    pub fn unknown(self) -> Literal {
        Literal::new(self, LiteralState::Unknown)
    }
}

impl TryFrom<char> for Proposition {
    type Error = Error;

    fn try_from(c: char) -> Result<Self> {
        Proposition::from_char(c)
            .ok_or_else(|| Error::InvalidLabel(format!("'{c}' is not a proposition letter")))
    }
}

impl From<Proposition> for char {
    fn from(p: Proposition) -> char {
        p.as_char()
    }
}

impl fmt::Display for Proposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// Truth state of a literal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LiteralState {
    /// The proposition is true.
    Straight,
    /// The proposition is false.
    Negated,
    /// The proposition is not yet known (q-literal).
    Unknown,
}

impl LiteralState {
    /// Combine two states of the same proposition without failing:
    /// equal states stay, anything else becomes unknown.
    pub fn extended_and(self, other: LiteralState) -> LiteralState {
        if self == other { self } else { LiteralState::Unknown }
    }
}

/// A proposition with a truth state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Literal {
    pub proposition: Proposition,
    pub state: LiteralState,
}

impl Literal {
    pub fn new(proposition: Proposition, state: LiteralState) -> Self {
        Self { proposition, state }
    }

    /// The complement of a straight or negated literal. Unknown stays unknown.
    pub fn negation(self) -> Literal {
        let state = match self.state {
            LiteralState::Straight => LiteralState::Negated,
            LiteralState::Negated => LiteralState::Straight,
            LiteralState::Unknown => LiteralState::Unknown,
        };
        Literal::new(self.proposition, state)
    }

    pub fn is_unknown(self) -> bool {
        self.state == LiteralState::Unknown
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.state {
            LiteralState::Straight => write!(f, "{}", self.proposition),
            LiteralState::Negated => write!(f, "{NOT}{}", self.proposition),
            LiteralState::Unknown => write!(f, "{UNKNOWN}{}", self.proposition),
        }
    }
}
