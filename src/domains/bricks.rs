//! Bricks string domain.
//!
//! A string is abstracted by a list of bricks `[S]^(min, max)`: the concatenation of `k` strings drawn
//! from `S`, for some `min <= k <= max`. Lists are kept normalized, compared after padding the shorter
//! one with empty bricks, and widened with the three bounds below.

use std::collections::BTreeSet;
use std::fmt;

use crate::environment::NonRelationalValue;
use crate::lattice::{Lattice, Satisfiability};
use crate::symbolic::{BinaryOperator, Constant, UnaryOperator};
use crate::types::TypeSet;

/// Longest brick list kept by widening (`kL`).
pub const MAX_BRICKS: usize = 10;
/// Widest repetition interval kept by widening (`kI`).
pub const MAX_INTERVAL_WIDTH: usize = 10;
/// Largest string set kept by widening (`kS`).
pub const MAX_STRINGS: usize = 20;
/// Cap on the representative strings enumerated by [`Bricks::reps`].
pub const MAX_REPRESENTATIVES: usize = 1024;

/// `[S]^(min, max)`: `S = None` is any string, `max = None` is unbounded.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Brick {
    strings: Option<BTreeSet<String>>,
    min: usize,
    max: Option<usize>,
}

fn add_max(a: Option<usize>, b: Option<usize>) -> Option<usize> {
    Some(a?.saturating_add(b?))
}

fn max_leq(a: Option<usize>, b: Option<usize>) -> bool {
    match (a, b) {
        (_, None) => true,
        (None, Some(_)) => false,
        (Some(a), Some(b)) => a <= b,
    }
}

/// Concatenation of every string of `left` with every string of `right`.
fn product(left: &BTreeSet<String>, right: &BTreeSet<String>) -> BTreeSet<String> {
    left.iter()
        .flat_map(|l| right.iter().map(move |r| format!("{}{}", l, r)))
        .collect()
}

/// `S^k`, or `None` when it would exceed `limit` strings.
fn power(strings: &BTreeSet<String>, k: usize, limit: usize) -> Option<BTreeSet<String>> {
    let mut result = BTreeSet::from([String::new()]);
    for _ in 0..k {
        result = product(&result, strings);
        if result.len() > limit {
            return None;
        }
    }
    Some(result)
}

impl Brick {
    pub fn new(strings: Option<BTreeSet<String>>, min: usize, max: Option<usize>) -> Self {
        Brick { strings, min, max }
    }

    pub fn of_strings<I: IntoIterator<Item = S>, S: Into<String>>(strings: I, min: usize, max: usize) -> Self {
        Brick::new(Some(strings.into_iter().map(Into::into).collect()), min, Some(max))
    }

    /// Any string: `[Σ*]^(0, +∞)`.
    pub fn top() -> Self {
        Brick::new(None, 0, None)
    }

    /// The empty string: `[∅]^(0, 0)`.
    pub fn empty() -> Self {
        Brick::new(Some(BTreeSet::new()), 0, Some(0))
    }

    pub fn strings(&self) -> Option<&BTreeSet<String>> {
        self.strings.as_ref()
    }

    pub fn min(&self) -> usize {
        self.min
    }

    pub fn max(&self) -> Option<usize> {
        self.max
    }

    /// Denotes exactly the empty string.
    fn is_empty_string(&self) -> bool {
        self.max == Some(0)
            || match &self.strings {
                Some(s) => s.iter().all(|x| x.is_empty()),
                None => false,
            }
    }

    fn leq(&self, other: &Brick) -> bool {
        let strings_included = match (&self.strings, &other.strings) {
            (_, None) => true,
            (None, Some(_)) => false,
            (Some(a), Some(b)) => a.is_subset(b),
        };
        strings_included && other.min <= self.min && max_leq(self.max, other.max)
    }

    fn lub(&self, other: &Brick) -> Brick {
        let strings = match (&self.strings, &other.strings) {
            (Some(a), Some(b)) => Some(a.union(b).cloned().collect()),
            _ => None,
        };
        let max = match (self.max, other.max) {
            (Some(a), Some(b)) => Some(a.max(b)),
            _ => None,
        };
        Brick::new(strings, self.min.min(other.min), max)
    }

    fn widening(&self, other: &Brick) -> Brick {
        let joined = self.lub(other);
        match &joined.strings {
            Some(s) if s.len() > MAX_STRINGS => return Brick::top(),
            None => return Brick::top(),
            Some(_) => {}
        }
        match joined.max {
            Some(max) if max.saturating_sub(joined.min) <= MAX_INTERVAL_WIDTH => joined,
            _ => Brick::new(joined.strings, 0, None),
        }
    }

    /// The concatenations of `k` strings of the brick, for every admissible `k`.
    fn reps(&self) -> Option<BTreeSet<String>> {
        let strings = self.strings.as_ref()?;
        let max = self.max?;
        let mut result = BTreeSet::new();
        for k in self.min..=max {
            result.extend(power(strings, k, MAX_REPRESENTATIVES)?);
            if result.len() > MAX_REPRESENTATIVES {
                return None;
            }
        }
        Some(result)
    }
}

impl fmt::Display for Brick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.strings {
            Some(s) => {
                let strings: Vec<String> = s.iter().map(|x| format!("{:?}", x)).collect();
                write!(f, "[{{{}}}]", strings.join(", "))?;
            }
            None => write!(f, "[Σ*]")?,
        }
        match self.max {
            Some(max) => write!(f, "({},{})", self.min, max),
            None => write!(f, "({},+∞)", self.min),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Bricks {
    /// Normalized. An empty list is the empty string.
    bricks: Vec<Brick>,
    is_bottom: bool,
}

impl Bricks {
    pub fn new(bricks: Vec<Brick>) -> Self {
        Bricks {
            bricks: normalize(bricks),
            is_bottom: false,
        }
    }

    pub fn of_string(s: &str) -> Self {
        Self::new(vec![Brick::of_strings([s], 1, 1)])
    }

    pub fn bricks(&self) -> &[Brick] {
        &self.bricks
    }

    fn concat(&self, other: &Self) -> Self {
        let mut bricks = self.bricks.clone();
        bricks.extend(other.bricks.iter().cloned());
        Self::new(bricks)
    }

    /// Both lists extended to the same length.
    fn padded(&self, other: &Self) -> (Vec<Brick>, Vec<Brick>) {
        if self.bricks.len() < other.bricks.len() {
            (pad(&self.bricks, &other.bricks), other.bricks.clone())
        } else {
            (self.bricks.clone(), pad(&other.bricks, &self.bricks))
        }
    }

    fn pointwise(&self, other: &Self, op: impl Fn(&Brick, &Brick) -> Brick) -> Self {
        let (left, right) = self.padded(other);
        Self::new(left.iter().zip(&right).map(|(a, b)| op(a, b)).collect())
    }

    /// Every string the abstraction denotes, when finitely many and few enough.
    pub fn reps(&self) -> Option<BTreeSet<String>> {
        if self.is_bottom {
            return Some(BTreeSet::new());
        }
        let mut result = BTreeSet::from([String::new()]);
        for brick in &self.bricks {
            result = product(&result, &brick.reps()?);
            if result.len() > MAX_REPRESENTATIVES {
                return None;
            }
        }
        Some(result)
    }

    fn contains(&self, other: &Self) -> Satisfiability {
        let (Some(haystacks), Some(needles)) = (self.reps(), other.reps()) else {
            return Satisfiability::Unknown;
        };
        let found = |h: &String| needles.iter().filter(|n| h.contains(n.as_str())).count();
        if haystacks.iter().all(|h| found(h) == needles.len()) {
            Satisfiability::Satisfied
        } else if haystacks.iter().all(|h| found(h) == 0) {
            Satisfiability::NotSatisfied
        } else {
            Satisfiability::Unknown
        }
    }
}

/// Insert empty bricks into `short` where it differs from `long`, until both have the same length.
fn pad(short: &[Brick], long: &[Brick]) -> Vec<Brick> {
    let missing = long.len() - short.len();
    let mut result = Vec::with_capacity(long.len());
    let mut added = 0;
    let mut next = 0;
    for brick in long {
        let must_pad = next >= short.len() || short[next] != *brick;
        if added < missing && must_pad {
            result.push(Brick::empty());
            added += 1;
        } else {
            result.push(short[next].clone());
            next += 1;
        }
    }
    result
}

/// Rewrite a brick list until no rule applies.
fn normalize(mut bricks: Vec<Brick>) -> Vec<Brick> {
    loop {
        let before = bricks.clone();

        // Bricks denoting only the empty string disappear.
        bricks.retain(|b| !b.is_empty_string());

        let mut merged: Vec<Brick> = Vec::with_capacity(bricks.len());
        for brick in bricks {
            let Some(last) = merged.last_mut() else {
                merged.push(brick);
                continue;
            };
            if last.strings == brick.strings {
                // [S]^(m1,M1)[S]^(m2,M2) = [S]^(m1+m2, M1+M2)
                last.min = last.min.saturating_add(brick.min);
                last.max = add_max(last.max, brick.max);
                continue;
            }
            if let (Some(a), Some(b), Some(1), Some(1), 1, 1) =
                (&last.strings, &brick.strings, last.max, brick.max, last.min, brick.min)
            {
                let concatenated = product(a, b);
                if concatenated.len() <= MAX_STRINGS {
                    // [S1]^(1,1)[S2]^(1,1) = [S1·S2]^(1,1)
                    last.strings = Some(concatenated);
                    continue;
                }
            }
            merged.push(brick);
        }

        let mut expanded = Vec::with_capacity(merged.len());
        for brick in merged {
            match (&brick.strings, brick.min) {
                (Some(strings), min) if min >= 2 => match power(strings, min, MAX_STRINGS) {
                    // [S]^(m,M) = [S^m]^(1,1)[S]^(0,M-m)
                    Some(prefix) => {
                        expanded.push(Brick::new(Some(prefix), 1, Some(1)));
                        let rest = brick.max.map(|max| max.saturating_sub(min));
                        expanded.push(Brick::new(brick.strings.clone(), 0, rest));
                    }
                    None => expanded.push(brick),
                },
                _ => expanded.push(brick),
            }
        }
        bricks = expanded;

        if bricks == before {
            return bricks;
        }
    }
}

impl Lattice for Bricks {
    fn bottom() -> Self {
        Bricks {
            bricks: Vec::new(),
            is_bottom: true,
        }
    }

    fn top() -> Self {
        Bricks {
            bricks: vec![Brick::top()],
            is_bottom: false,
        }
    }

    fn is_bottom(&self) -> bool {
        self.is_bottom
    }

    fn is_top(&self) -> bool {
        !self.is_bottom && self.bricks == [Brick::top()]
    }

    fn leq(&self, other: &Self) -> bool {
        if self.is_bottom {
            return true;
        }
        if other.is_bottom {
            return false;
        }
        if other.is_top() {
            return true;
        }
        let (left, right) = self.padded(other);
        left.iter().zip(&right).all(|(a, b)| a.leq(b))
    }

    fn lub(&self, other: &Self) -> Self {
        if self.is_bottom {
            return other.clone();
        }
        if other.is_bottom {
            return self.clone();
        }
        if self.is_top() || other.is_top() {
            return Self::top();
        }
        self.pointwise(other, Brick::lub)
    }

    fn widening(&self, other: &Self) -> Self {
        if self.is_bottom {
            return other.clone();
        }
        if other.is_bottom {
            return self.clone();
        }
        if self.bricks.len() > MAX_BRICKS || other.bricks.len() > MAX_BRICKS || self.is_top() || other.is_top() {
            return Self::top();
        }
        self.pointwise(other, Brick::widening)
    }
}

impl NonRelationalValue for Bricks {
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

    fn satisfies_binary(op: BinaryOperator, left: &Self, right: &Self) -> Satisfiability {
        match op {
            BinaryOperator::Contains => left.contains(right),
            _ => Satisfiability::Unknown,
        }
    }
}

impl fmt::Display for Bricks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_bottom {
            return write!(f, "⊥");
        }
        if self.bricks.is_empty() {
            return write!(f, "\"\"");
        }
        for brick in &self.bricks {
            write!(f, "{}", brick)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    fn set(strings: &[&str]) -> BTreeSet<String> {
        strings.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_normalization_rules() {
        // Consecutive single bricks are merged.
        let ab = Bricks::new(vec![Brick::of_strings(["a"], 1, 1), Brick::of_strings(["b"], 1, 1)]);
        assert_eq!(ab, Bricks::of_string("ab"));

        // Empty bricks vanish.
        let padded = Bricks::new(vec![Brick::empty(), Brick::of_strings(["a"], 1, 1), Brick::empty()]);
        assert_eq!(padded, Bricks::of_string("a"));

        // Equal string sets are merged by adding repetitions.
        let merged = Bricks::new(vec![Brick::of_strings(["a"], 0, 1), Brick::of_strings(["a"], 0, 2)]);
        assert_eq!(merged.bricks(), &[Brick::of_strings(["a"], 0, 3)]);

        // Mandatory repetitions are unrolled.
        let repeated = Bricks::new(vec![Brick::of_strings(["ab"], 2, 3)]);
        assert_eq!(
            repeated.bricks(),
            &[Brick::of_strings(["abab"], 1, 1), Brick::of_strings(["ab"], 0, 1)]
        );
    }

    #[test]
    fn test_lub_pads_shorter_list() {
        let a = Bricks::of_string("a");
        let b = Bricks::new(vec![Brick::of_strings(["a"], 1, 1), Brick::of_strings(["x", "y"], 0, 1)]);
        let joined = a.lub(&b);
        assert!(a.leq(&joined));
        assert!(b.leq(&joined));
        assert_eq!(joined, b);
        assert!(a.leq(&b));
        assert!(!b.leq(&a));
    }

    #[test]
    fn test_widening_bounds() {
        let top = TypeSet::Top;
        let mut current = Bricks::of_string("a");
        let mut approx = Bricks::bottom();
        let mut stable_after = None;
        for step in 0..50 {
            let next = approx.widening(&current);
            assert!(current.leq(&next));
            if next == approx {
                stable_after = Some(step);
                break;
            }
            approx = next;
            current = Bricks::eval_binary(BinaryOperator::Concat, &current, &Bricks::of_string("a"), &top);
        }
        assert!(stable_after.is_some(), "widening did not stabilize: {}", approx);

        let many: Vec<String> = (0..=MAX_STRINGS).map(|i| i.to_string()).collect();
        let wide = Bricks::new(vec![Brick::new(Some(many.into_iter().collect()), 1, Some(1))]);
        assert!(Bricks::of_string("x").widening(&wide).is_top());
    }

    #[test]
    fn test_representatives() {
        let brick = Brick::of_strings(["a", "b"], 1, 2);
        assert_eq!(
            Bricks::new(vec![brick]).reps(),
            Some(set(&["a", "aa", "ab", "b", "ba", "bb"]))
        );
        assert_eq!(Bricks::new(vec![Brick::new(Some(set(&["a"])), 0, None)]).reps(), None);
        assert_eq!(Bricks::top().reps(), None);
        assert_eq!(Bricks::of_string("").reps(), Some(set(&[""])));
    }

    #[test]
    fn test_contains() {
        let hello = Bricks::of_string("hello");
        assert_eq!(
            Bricks::satisfies_binary(BinaryOperator::Contains, &hello, &Bricks::of_string("ell")),
            Satisfiability::Satisfied
        );
        assert_eq!(
            Bricks::satisfies_binary(BinaryOperator::Contains, &hello, &Bricks::of_string("z")),
            Satisfiability::NotSatisfied
        );
        assert_eq!(
            Bricks::satisfies_binary(BinaryOperator::Contains, &Bricks::top(), &Bricks::of_string("z")),
            Satisfiability::Unknown
        );
    }

    #[test]
    fn test_display() {
        let b = Bricks::new(vec![Brick::of_strings(["a"], 1, 1), Brick::new(Some(set(&["b"])), 0, None)]);
        assert_eq!(b.to_string(), "[{\"a\"}](1,1)[{\"b\"}](0,+∞)");
        assert_eq!(Bricks::top().to_string(), "[Σ*](0,+∞)");
    }
}
