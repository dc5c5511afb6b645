//! Edge weights with infinity sentinels.
//!
//! Weights are plain `i64`. Two sentinels encode the infinities used by the
//! propagation rules: `NEG_INFINITY` marks a negative q-loop, `POS_INFINITY`
//! an absent bound. Finite weights must stay within `±MAX_FINITE` so the sum
//! of any two finite weights never overflows.

/// An edge weight (temporal distance).
pub type Weight = i64;

/// Negative infinity: the value of a negative loop under an unresolved label.
pub const NEG_INFINITY: Weight = i64::MIN;

/// Positive infinity: no constraint.
pub const POS_INFINITY: Weight = i64::MAX;

/// Largest magnitude a finite weight may have.
pub const MAX_FINITE: Weight = i64::MAX / 4;

/// Is this weight one of the two infinity sentinels?
pub fn is_infinite(w: Weight) -> bool {
    w == NEG_INFINITY || w == POS_INFINITY
}

/// Sum two weights, letting infinities absorb.
///
/// `−∞ + x = −∞` for every `x` except `+∞`; `+∞ + x = +∞` for every finite
/// `x`. `−∞ + +∞` has no meaning in the rules and is resolved to `+∞`
/// (no constraint). Finite sums beyond `MAX_FINITE` saturate to the
/// matching infinity.
pub fn add(a: Weight, b: Weight) -> Weight {
    if a == POS_INFINITY || b == POS_INFINITY {
        return POS_INFINITY;
    }
    if a == NEG_INFINITY || b == NEG_INFINITY {
        return NEG_INFINITY;
    }
    match a.checked_add(b) {
        Some(s) if s > MAX_FINITE => POS_INFINITY,
        Some(s) if s < -MAX_FINITE => NEG_INFINITY,
        Some(s) => s,
        None if a > 0 => POS_INFINITY,
        None => NEG_INFINITY,
    }
}

/// Render a weight the way the status summaries print it.
pub fn format(w: Weight) -> String {
    match w {
        NEG_INFINITY => "-∞".to_string(),
        POS_INFINITY => "+∞".to_string(),
        _ => w.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infinities_absorb() {
        assert_eq!(add(NEG_INFINITY, 5), NEG_INFINITY);
        assert_eq!(add(-3, NEG_INFINITY), NEG_INFINITY);
        assert_eq!(add(POS_INFINITY, -7), POS_INFINITY);
        assert_eq!(add(NEG_INFINITY, POS_INFINITY), POS_INFINITY);
    }

    #[test]
    fn test_finite_sum_saturates() {
        assert_eq!(add(3, -5), -2);
        assert_eq!(add(MAX_FINITE, 1), POS_INFINITY);
        assert_eq!(add(-MAX_FINITE, -1), NEG_INFINITY);
    }

    #[test]
    fn test_format() {
        assert_eq!(format(NEG_INFINITY), "-∞");
        assert_eq!(format(12), "12");
    }
}
