//! Interval value domain.
//!
//! The interval domain tracks lower and upper bounds of integer values.
//! It has infinite height: widening extrapolates unstable bounds to `±∞`.

use std::cmp::{max, min};
use std::fmt;

use crate::environment::NonRelationalValue;
use crate::lattice::{Lattice, Satisfiability};
use crate::symbolic::{BinaryOperator, Constant, TernaryOperator, UnaryOperator};
use crate::types::TypeSet;

/// Bound of an interval: -∞, finite value, or +∞.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Bound {
    NegInf,
    Finite(i64),
    PosInf,
}

impl Bound {
    pub fn as_finite(&self) -> Option<i64> {
        match self {
            Bound::Finite(n) => Some(*n),
            _ => None,
        }
    }

    fn signum(&self) -> i64 {
        match self {
            Bound::NegInf => -1,
            Bound::Finite(n) => n.signum(),
            Bound::PosInf => 1,
        }
    }

    fn infinity(sign: i64) -> Bound {
        if sign < 0 {
            Bound::NegInf
        } else {
            Bound::PosInf
        }
    }

    pub fn add(&self, other: &Bound) -> Bound {
        match (self, other) {
            (Bound::Finite(a), Bound::Finite(b)) => a.checked_add(*b).map_or(Bound::infinity(a.signum()), Bound::Finite),
            (Bound::NegInf, _) | (_, Bound::NegInf) => Bound::NegInf,
            (Bound::PosInf, _) | (_, Bound::PosInf) => Bound::PosInf,
        }
    }

    pub fn sub(&self, other: &Bound) -> Bound {
        match (self, other) {
            (Bound::Finite(a), Bound::Finite(b)) => a
                .checked_sub(*b)
                .map_or(Bound::infinity(-b.signum()), Bound::Finite),
            (Bound::NegInf, _) | (_, Bound::PosInf) => Bound::NegInf,
            (Bound::PosInf, _) | (_, Bound::NegInf) => Bound::PosInf,
        }
    }

    pub fn mul(&self, other: &Bound) -> Bound {
        match (self, other) {
            (Bound::Finite(a), Bound::Finite(b)) => a
                .checked_mul(*b)
                .map_or(Bound::infinity(a.signum() * b.signum()), Bound::Finite),
            (Bound::Finite(0), _) | (_, Bound::Finite(0)) => Bound::Finite(0),
            _ => Bound::infinity(self.signum() * other.signum()),
        }
    }

    /// Truncating division by a non-zero bound.
    fn div(&self, other: &Bound) -> Bound {
        match (self, other) {
            (Bound::Finite(a), Bound::Finite(b)) => a.checked_div(*b).map_or(Bound::PosInf, Bound::Finite),
            (Bound::Finite(_), _) => Bound::Finite(0),
            _ => Bound::infinity(self.signum() * other.signum()),
        }
    }

    pub fn neg(&self) -> Bound {
        match self {
            Bound::NegInf => Bound::PosInf,
            Bound::Finite(n) => n.checked_neg().map_or(Bound::PosInf, Bound::Finite),
            Bound::PosInf => Bound::NegInf,
        }
    }

    fn abs(&self) -> Bound {
        if self.signum() < 0 {
            self.neg()
        } else {
            *self
        }
    }
}

impl fmt::Display for Bound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bound::NegInf => write!(f, "-∞"),
            Bound::Finite(n) => write!(f, "{}", n),
            Bound::PosInf => write!(f, "+∞"),
        }
    }
}

/// Interval: [low, high]. The empty interval is normalized to `[+∞, -∞]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Interval {
    pub low: Bound,
    pub high: Bound,
}

impl Interval {
    pub fn new(low: i64, high: i64) -> Self {
        Self::from_bounds(Bound::Finite(low), Bound::Finite(high))
    }

    pub fn from_bounds(low: Bound, high: Bound) -> Self {
        if low > high || low == Bound::PosInf || high == Bound::NegInf {
            Self::bottom()
        } else {
            Self { low, high }
        }
    }

    pub fn constant(value: i64) -> Self {
        Self::new(value, value)
    }

    pub fn is_empty(&self) -> bool {
        self.low > self.high
    }

    pub fn as_constant(&self) -> Option<i64> {
        match (self.low, self.high) {
            (Bound::Finite(l), Bound::Finite(h)) if l == h => Some(l),
            _ => None,
        }
    }

    pub fn contains(&self, value: i64) -> bool {
        !self.is_empty() && self.low <= Bound::Finite(value) && Bound::Finite(value) <= self.high
    }

    /// Interval of a computed result on non-empty operands.
    ///
    /// A lower bound that overflowed to +∞ (or an upper bound to -∞) stands for a value just
    /// outside the `i64` range, so it is kept as the nearest finite bound.
    fn hull(low: Bound, high: Bound) -> Interval {
        let low = if low == Bound::PosInf { Bound::Finite(i64::MAX) } else { low };
        let high = if high == Bound::NegInf { Bound::Finite(i64::MIN) } else { high };
        Interval::from_bounds(low, high)
    }

    fn from_corners(corners: [Bound; 4]) -> Interval {
        let low = corners.iter().min().copied().unwrap_or(Bound::NegInf);
        let high = corners.iter().max().copied().unwrap_or(Bound::PosInf);
        Interval::hull(low, high)
    }

    fn add(&self, other: &Interval) -> Interval {
        Interval::hull(self.low.add(&other.low), self.high.add(&other.high))
    }

    fn sub(&self, other: &Interval) -> Interval {
        Interval::hull(self.low.sub(&other.high), self.high.sub(&other.low))
    }

    fn mul(&self, other: &Interval) -> Interval {
        Interval::from_corners([
            self.low.mul(&other.low),
            self.low.mul(&other.high),
            self.high.mul(&other.low),
            self.high.mul(&other.high),
        ])
    }

    fn div(&self, other: &Interval) -> Interval {
        if other.as_constant() == Some(0) {
            return Interval::bottom();
        }
        if other.contains(0) {
            return Interval::top();
        }
        Interval::from_corners([
            self.low.div(&other.low),
            self.low.div(&other.high),
            self.high.div(&other.low),
            self.high.div(&other.high),
        ])
    }

    fn rem(&self, other: &Interval) -> Interval {
        if other.as_constant() == Some(0) {
            return Interval::bottom();
        }
        // |a % b| < |b|, with the sign of a.
        let bound = max(other.low.abs(), other.high.abs()).sub(&Bound::Finite(1));
        let low = if self.low >= Bound::Finite(0) { Bound::Finite(0) } else { bound.neg() };
        let high = if self.high <= Bound::Finite(0) { Bound::Finite(0) } else { bound };
        Interval::from_bounds(low, high)
    }

    fn neg(&self) -> Interval {
        Interval::hull(self.high.neg(), self.low.neg())
    }

    fn below(bound: Bound) -> Interval {
        Interval::hull(Bound::NegInf, bound)
    }

    fn above(bound: Bound) -> Interval {
        Interval::hull(bound, Bound::PosInf)
    }

    /// Definitely `self < other`, definitely not, or unknown.
    fn less_than(&self, other: &Interval) -> Satisfiability {
        if self.high < other.low {
            Satisfiability::Satisfied
        } else if self.low >= other.high {
            Satisfiability::NotSatisfied
        } else {
            Satisfiability::Unknown
        }
    }

    fn less_or_equal(&self, other: &Interval) -> Satisfiability {
        if self.high <= other.low {
            Satisfiability::Satisfied
        } else if self.low > other.high {
            Satisfiability::NotSatisfied
        } else {
            Satisfiability::Unknown
        }
    }

    fn equal(&self, other: &Interval) -> Satisfiability {
        match (self.as_constant(), other.as_constant()) {
            (Some(a), Some(b)) => Satisfiability::from_bool(a == b),
            _ if self.glb(other).is_bottom() => Satisfiability::NotSatisfied,
            _ => Satisfiability::Unknown,
        }
    }

    /// Refine `(self, other)` assuming `self < other` (strict) or `self <= other`.
    fn refine_less(&self, other: &Interval, strict: bool) -> (Interval, Interval) {
        let offset = Bound::Finite(if strict { 1 } else { 0 });
        let left = self.glb(&Interval::below(other.high.sub(&offset)));
        let right = other.glb(&Interval::above(self.low.add(&offset)));
        (left, right)
    }

    /// Trim a bound of `self` equal to the constant `value`.
    fn exclude(&self, value: i64) -> Interval {
        if self.low == Bound::Finite(value) {
            Interval::from_bounds(Bound::Finite(value.saturating_add(1)), self.high)
        } else if self.high == Bound::Finite(value) {
            Interval::from_bounds(self.low, Bound::Finite(value.saturating_sub(1)))
        } else {
            *self
        }
    }
}

impl Lattice for Interval {
    fn bottom() -> Self {
        Self {
            low: Bound::PosInf,
            high: Bound::NegInf,
        }
    }

    fn top() -> Self {
        Self {
            low: Bound::NegInf,
            high: Bound::PosInf,
        }
    }

    fn is_bottom(&self) -> bool {
        self.is_empty()
    }

    fn is_top(&self) -> bool {
        self.low == Bound::NegInf && self.high == Bound::PosInf
    }

    fn leq(&self, other: &Self) -> bool {
        if self.is_empty() {
            return true;
        }
        if other.is_empty() {
            return false;
        }
        other.low <= self.low && self.high <= other.high
    }

    fn lub(&self, other: &Self) -> Self {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        Interval {
            low: min(self.low, other.low),
            high: max(self.high, other.high),
        }
    }

    fn widening(&self, other: &Self) -> Self {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        let low = if other.low < self.low { Bound::NegInf } else { self.low };
        let high = if other.high > self.high { Bound::PosInf } else { self.high };
        Interval { low, high }
    }

    fn glb(&self, other: &Self) -> Self {
        Interval::from_bounds(max(self.low, other.low), min(self.high, other.high))
    }
}

impl NonRelationalValue for Interval {
    fn eval_constant(constant: &Constant, _types: &TypeSet) -> Self {
        match constant {
            Constant::Int(n) => Interval::constant(*n),
            _ => Interval::top(),
        }
    }

    fn eval_unary(op: UnaryOperator, arg: &Self, _types: &TypeSet) -> Self {
        match op {
            UnaryOperator::Neg => arg.neg(),
            UnaryOperator::StrLen => Interval::above(Bound::Finite(0)),
            UnaryOperator::Not => Interval::top(),
        }
    }

    fn eval_binary(op: BinaryOperator, left: &Self, right: &Self, _types: &TypeSet) -> Self {
        match op {
            BinaryOperator::Add => left.add(right),
            BinaryOperator::Sub => left.sub(right),
            BinaryOperator::Mul => left.mul(right),
            BinaryOperator::Div => left.div(right),
            BinaryOperator::Rem => left.rem(right),
            _ => Interval::top(),
        }
    }

    fn eval_ternary(_op: TernaryOperator, _first: &Self, _second: &Self, _third: &Self, _types: &TypeSet) -> Self {
        Interval::top()
    }

    fn satisfies_binary(op: BinaryOperator, left: &Self, right: &Self) -> Satisfiability {
        match op {
            BinaryOperator::Lt => left.less_than(right),
            BinaryOperator::Le => left.less_or_equal(right),
            BinaryOperator::Gt => right.less_than(left),
            BinaryOperator::Ge => right.less_or_equal(left),
            BinaryOperator::Eq => left.equal(right),
            BinaryOperator::Ne => left.equal(right).negate(),
            _ => Satisfiability::Unknown,
        }
    }

    fn refine_binary(op: BinaryOperator, left: &Self, right: &Self) -> (Self, Self) {
        match op {
            BinaryOperator::Lt => left.refine_less(right, true),
            BinaryOperator::Le => left.refine_less(right, false),
            BinaryOperator::Gt => {
                let (r, l) = right.refine_less(left, true);
                (l, r)
            }
            BinaryOperator::Ge => {
                let (r, l) = right.refine_less(left, false);
                (l, r)
            }
            BinaryOperator::Eq => {
                let common = left.glb(right);
                (common, common)
            }
            BinaryOperator::Ne => {
                let left_refined = right.as_constant().map_or(*left, |c| left.exclude(c));
                let right_refined = left.as_constant().map_or(*right, |c| right.exclude(c));
                (left_refined, right_refined)
            }
            _ => (*left, *right),
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "⊥");
        }
        write!(f, "[{}, {}]", self.low, self.high)
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::lattice::laws::{check_lattice_laws, check_widening_stabilizes};

    #[test]
    fn test_interval_operations() {
        let i1 = Interval::new(0, 10);
        let i2 = Interval::new(5, 15);

        assert_eq!(i1.lub(&i2), Interval::new(0, 15));
        assert_eq!(i1.glb(&i2), Interval::new(5, 10));
        assert_eq!(i1.widening(&i2), Interval::from_bounds(Bound::Finite(0), Bound::PosInf));
        assert!(Interval::new(0, 3).glb(&Interval::new(5, 6)).is_bottom());
    }

    #[test]
    fn test_interval_lattice_axioms() {
        check_lattice_laws(&[
            Interval::bottom(),
            Interval::top(),
            Interval::constant(0),
            Interval::constant(5),
            Interval::new(0, 10),
            Interval::new(-5, 5),
            Interval::new(10, 20),
            Interval::from_bounds(Bound::NegInf, Bound::Finite(3)),
        ]);
    }

    #[test]
    fn test_widening_stabilizes_growing_chain() {
        let chain: Vec<Interval> = (0..100).map(|i| Interval::new(0, i)).collect();
        check_widening_stabilizes(chain, 3);
    }

    #[test]
    fn test_multiplication_signs() {
        let neg = Interval::from_bounds(Bound::NegInf, Bound::Finite(-1));
        let pos = Interval::new(2, 3);
        let product = Interval::eval_binary(BinaryOperator::Mul, &neg, &pos, &TypeSet::Top);
        assert_eq!(product, Interval::from_bounds(Bound::NegInf, Bound::Finite(-2)));

        let mixed = Interval::eval_binary(BinaryOperator::Mul, &Interval::new(-2, 3), &pos, &TypeSet::Top);
        assert_eq!(mixed, Interval::new(-6, 9));
    }

    #[test]
    fn test_overflow_goes_to_infinity() {
        let top = TypeSet::Top;
        let eval = |op, a: Interval, b: Interval| Interval::eval_binary(op, &a, &b, &top);
        let max = Interval::constant(i64::MAX);
        let min = Interval::constant(i64::MIN);
        let above_max = Interval::from_bounds(Bound::Finite(i64::MAX), Bound::PosInf);
        let below_min = Interval::from_bounds(Bound::NegInf, Bound::Finite(i64::MIN));

        let sum = eval(BinaryOperator::Add, max, Interval::constant(1));
        assert_ne!(sum, max);
        assert_eq!(sum, above_max);
        assert_eq!(eval(BinaryOperator::Sub, min, Interval::constant(1)), below_min);
        assert_eq!(eval(BinaryOperator::Sub, Interval::constant(0), min), above_max);
        assert_eq!(eval(BinaryOperator::Mul, max, Interval::constant(2)), above_max);
        assert_eq!(eval(BinaryOperator::Mul, min, Interval::constant(2)), below_min);
        assert_eq!(eval(BinaryOperator::Div, min, Interval::constant(-1)), above_max);
        assert_eq!(Interval::eval_unary(UnaryOperator::Neg, &min, &top), above_max);

        // `MAX + 1 > MAX` must stay feasible.
        assert_ne!(Interval::satisfies_binary(BinaryOperator::Gt, &sum, &max), Satisfiability::NotSatisfied);
        let (left, _) = Interval::refine_binary(BinaryOperator::Gt, &sum, &max);
        assert!(!left.is_bottom());
    }

    #[test]
    fn test_division_and_remainder() {
        let top = TypeSet::Top;
        let div = |a: Interval, b: Interval| Interval::eval_binary(BinaryOperator::Div, &a, &b, &top);
        assert_eq!(div(Interval::new(10, 20), Interval::new(2, 5)), Interval::new(2, 10));
        assert!(div(Interval::new(1, 2), Interval::constant(0)).is_bottom());
        assert!(div(Interval::new(1, 2), Interval::new(-1, 1)).is_top());

        let rem = Interval::eval_binary(BinaryOperator::Rem, &Interval::new(0, 100), &Interval::constant(7), &top);
        assert_eq!(rem, Interval::new(0, 6));
    }

    #[test]
    fn test_comparisons() {
        let small = Interval::new(0, 5);
        let large = Interval::new(10, 20);
        assert_eq!(Interval::satisfies_binary(BinaryOperator::Lt, &small, &large), Satisfiability::Satisfied);
        assert_eq!(Interval::satisfies_binary(BinaryOperator::Gt, &small, &large), Satisfiability::NotSatisfied);
        assert_eq!(
            Interval::satisfies_binary(BinaryOperator::Eq, &Interval::constant(3), &Interval::constant(3)),
            Satisfiability::Satisfied
        );
        assert_eq!(
            Interval::satisfies_binary(BinaryOperator::Le, &Interval::new(0, 10), &Interval::constant(5)),
            Satisfiability::Unknown
        );

        let (x, _) = Interval::refine_binary(BinaryOperator::Ge, &Interval::new(0, 100), &Interval::constant(42));
        assert_eq!(x, Interval::new(42, 100));
        let (x, _) = Interval::refine_binary(BinaryOperator::Ne, &Interval::new(0, 10), &Interval::constant(0));
        assert_eq!(x, Interval::new(1, 10));
    }

    #[test]
    fn test_display() {
        assert_eq!(Interval::constant(6).to_string(), "[6, 6]");
        assert_eq!(Interval::top().to_string(), "[-∞, +∞]");
        assert_eq!(Interval::bottom().to_string(), "⊥");
    }
}
