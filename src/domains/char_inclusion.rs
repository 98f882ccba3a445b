//! Character inclusion string domain.
//!
//! A string is abstracted by the characters it certainly contains and the characters it may
//! contain. The order is `(C1, M1) ⊑ (C2, M2)` iff `C2 ⊆ C1` and `M1 ⊆ M2`.

use std::collections::BTreeSet;
use std::fmt;

use crate::environment::NonRelationalValue;
use crate::lattice::{Lattice, Satisfiability};
use crate::symbolic::{BinaryOperator, Constant, TernaryOperator, UnaryOperator};
use crate::types::TypeSet;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CharInclusion {
    certainly: BTreeSet<char>,
    /// `None` means any character.
    maybe: Option<BTreeSet<char>>,
    is_bottom: bool,
}

impl CharInclusion {
    pub fn new(certainly: BTreeSet<char>, maybe: Option<BTreeSet<char>>) -> Self {
        let consistent = match &maybe {
            Some(m) => certainly.is_subset(m),
            None => true,
        };
        if !consistent {
            return Self::bottom();
        }
        CharInclusion {
            certainly,
            maybe,
            is_bottom: false,
        }
    }

    pub fn of_string(s: &str) -> Self {
        let chars: BTreeSet<char> = s.chars().collect();
        Self::new(chars.clone(), Some(chars))
    }

    pub fn certainly_contained(&self) -> &BTreeSet<char> {
        &self.certainly
    }

    pub fn maybe_contained(&self) -> Option<&BTreeSet<char>> {
        self.maybe.as_ref()
    }

    fn may_contain(&self, c: char) -> bool {
        self.maybe.as_ref().map_or(true, |m| m.contains(&c))
    }

    fn union_maybe(a: &Option<BTreeSet<char>>, b: &Option<BTreeSet<char>>) -> Option<BTreeSet<char>> {
        match (a, b) {
            (Some(a), Some(b)) => Some(a.union(b).copied().collect()),
            _ => None,
        }
    }

    fn concat(&self, other: &Self) -> Self {
        Self::new(
            self.certainly.union(&other.certainly).copied().collect(),
            Self::union_maybe(&self.maybe, &other.maybe),
        )
    }

    /// Does `self` contain `other` as a substring?
    fn contains(&self, other: &Self) -> Satisfiability {
        if other.maybe.as_ref().is_some_and(|m| m.is_empty()) {
            // `other` is the empty string.
            return Satisfiability::Satisfied;
        }
        if other.certainly.iter().any(|c| !self.may_contain(*c)) {
            return Satisfiability::NotSatisfied;
        }
        Satisfiability::Unknown
    }
}

impl Lattice for CharInclusion {
    fn bottom() -> Self {
        CharInclusion {
            certainly: BTreeSet::new(),
            maybe: Some(BTreeSet::new()),
            is_bottom: true,
        }
    }

    fn top() -> Self {
        CharInclusion {
            certainly: BTreeSet::new(),
            maybe: None,
            is_bottom: false,
        }
    }

    fn is_bottom(&self) -> bool {
        self.is_bottom
    }

    fn is_top(&self) -> bool {
        !self.is_bottom && self.certainly.is_empty() && self.maybe.is_none()
    }

    fn leq(&self, other: &Self) -> bool {
        if self.is_bottom {
            return true;
        }
        if other.is_bottom {
            return false;
        }
        let maybe_included = match (&self.maybe, &other.maybe) {
            (_, None) => true,
            (None, Some(_)) => false,
            (Some(a), Some(b)) => a.is_subset(b),
        };
        maybe_included && other.certainly.is_subset(&self.certainly)
    }

    fn lub(&self, other: &Self) -> Self {
        if self.is_bottom {
            return other.clone();
        }
        if other.is_bottom {
            return self.clone();
        }
        Self::new(
            self.certainly.intersection(&other.certainly).copied().collect(),
            Self::union_maybe(&self.maybe, &other.maybe),
        )
    }

    /// Finite height over the characters of the program: widening is the join.
    fn widening(&self, other: &Self) -> Self {
        self.lub(other)
    }

    fn glb(&self, other: &Self) -> Self {
        if self.is_bottom || other.is_bottom {
            return Self::bottom();
        }
        let maybe = match (&self.maybe, &other.maybe) {
            (None, m) | (m, None) => m.clone(),
            (Some(a), Some(b)) => Some(a.intersection(b).copied().collect()),
        };
        Self::new(self.certainly.union(&other.certainly).copied().collect(), maybe)
    }
}

impl NonRelationalValue for CharInclusion {
    fn eval_constant(constant: &Constant, _types: &TypeSet) -> Self {
        match constant {
            Constant::Str(s) => Self::of_string(s),
            _ => Self::top(),
        }
    }

    fn eval_unary(_op: UnaryOperator, _arg: &Self, _types: &TypeSet) -> Self {
        Self::top()
    }

    fn eval_binary(op: BinaryOperator, left: &Self, right: &Self, _types: &TypeSet) -> Self {
        match op {
            BinaryOperator::Concat => left.concat(right),
            _ => Self::top(),
        }
    }

    fn eval_ternary(op: TernaryOperator, first: &Self, _second: &Self, third: &Self, _types: &TypeSet) -> Self {
        match op {
            TernaryOperator::Substring => Self::new(BTreeSet::new(), first.maybe.clone()),
            TernaryOperator::Replace => Self::new(BTreeSet::new(), Self::union_maybe(&first.maybe, &third.maybe)),
        }
    }

    fn satisfies_binary(op: BinaryOperator, left: &Self, right: &Self) -> Satisfiability {
        match op {
            BinaryOperator::Contains => left.contains(right),
            _ => Satisfiability::Unknown,
        }
    }
}

impl fmt::Display for CharInclusion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_bottom {
            return write!(f, "⊥");
        }
        let chars = |set: &BTreeSet<char>| set.iter().map(|c| c.to_string()).collect::<Vec<_>>().join(", ");
        write!(f, "CertainlyContained: {{{}}}, MaybeContained: ", chars(&self.certainly))?;
        match &self.maybe {
            Some(m) => write!(f, "{{{}}}", chars(m)),
            None => write!(f, "Σ"),
        }
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::lattice::laws::check_lattice_laws;

    fn s(text: &str) -> CharInclusion {
        CharInclusion::of_string(text)
    }

    #[test]
    fn test_char_inclusion_lattice() {
        check_lattice_laws(&[
            CharInclusion::bottom(),
            CharInclusion::top(),
            s(""),
            s("abc"),
            s("abd"),
            s("hello"),
            CharInclusion::new(BTreeSet::from(['a']), None),
        ]);
    }

    #[test]
    fn test_join_keeps_common_certain_chars() {
        let joined = s("abc").lub(&s("abd"));
        assert_eq!(joined.certainly_contained(), &BTreeSet::from(['a', 'b']));
        assert_eq!(joined.maybe_contained(), Some(&BTreeSet::from(['a', 'b', 'c', 'd'])));
        assert_eq!(joined.to_string(), "CertainlyContained: {a, b}, MaybeContained: {a, b, c, d}");
    }

    #[test]
    fn test_concat_and_contains() {
        let top = TypeSet::Top;
        let hello = CharInclusion::eval_binary(BinaryOperator::Concat, &s("he"), &s("llo"), &top);
        assert_eq!(hello, s("hello"));

        assert_eq!(
            CharInclusion::satisfies_binary(BinaryOperator::Contains, &hello, &s("z")),
            Satisfiability::NotSatisfied
        );
        assert_eq!(
            CharInclusion::satisfies_binary(BinaryOperator::Contains, &hello, &s("")),
            Satisfiability::Satisfied
        );
        assert_eq!(
            CharInclusion::satisfies_binary(BinaryOperator::Contains, &hello, &s("lo")),
            Satisfiability::Unknown
        );
    }

    #[test]
    fn test_inconsistent_pair_is_bottom() {
        assert!(CharInclusion::new(BTreeSet::from(['x']), Some(BTreeSet::new())).is_bottom());
        assert!(s("ab").glb(&s("cd")).is_bottom());
    }
}
