//! Core lattice trait and utilities.

use std::fmt::{self, Debug};

/// Lattice interface every abstract value implements.
///
/// An abstract value approximates a set of concrete runtime states. The engine only relies on the
/// algebraic contract below and never re-verifies it at runtime; use [`laws::check_lattice_laws`]
/// in the tests of a new domain.
///
/// # Lattice Properties
///
/// - `leq` is a non-strict partial order: reflexive, transitive, antisymmetric up to equivalence.
/// - `lub(a, b)` is an upper bound of both arguments: `a ⊑ a ⊔ b` and `b ⊑ a ⊔ b`.
/// - `lub` is commutative, associative and idempotent up to `leq`-equivalence, with `a ⊔ ⊥ = a`.
/// - `widening(a, b)` is an upper bound of `a` and `b`, and every chain built by repeatedly widening
///   stabilizes after finitely many steps. This is the termination contract of the fixpoint engine.
///
/// Values are compared structurally (`PartialEq`) and by `leq`, never by identity.
pub trait Lattice: Clone + Debug + PartialEq + Sized {
    /// Create the bottom element (⊥): no concrete state, unreachable.
    fn bottom() -> Self;

    /// Create the top element (⊤): any concrete state.
    fn top() -> Self;

    /// Check if this element is bottom.
    fn is_bottom(&self) -> bool;

    /// Check if this element is top.
    fn is_top(&self) -> bool;

    /// Partial order: `self ⊑ other` (self is at least as precise as other).
    fn leq(&self, other: &Self) -> bool;

    /// Least upper bound (`⊔`), the smallest element containing both inputs.
    fn lub(&self, other: &Self) -> Self;

    /// Widening (`∇`): `self` is the previous approximation, `other` the new one.
    ///
    /// **Why no default?** Widening must extrapolate on infinite-height lattices, plain `lub` would
    /// not force termination. Finite-height domains simply delegate to [`Lattice::lub`].
    fn widening(&self, other: &Self) -> Self;

    /// Greatest lower bound (`⊓`).
    ///
    /// Domains without a meet keep the default, which returns `self`: it is an over-approximation of
    /// the meet and therefore sound wherever a meet is used to refine a state.
    fn glb(&self, other: &Self) -> Self {
        let _ = other;
        self.clone()
    }

    /// Check equivalence of abstract elements with respect to the order.
    fn equivalent(&self, other: &Self) -> bool {
        self.leq(other) && other.leq(self)
    }

    /// Join multiple elements.
    fn lub_all<I>(elems: I) -> Self
    where
        I: IntoIterator<Item = Self>,
    {
        elems.into_iter().fold(Self::bottom(), |acc, e| acc.lub(&e))
    }
}

/// Outcome of checking whether an expression holds in an abstract state.
///
/// It is a lattice itself: `Bottom ⊑ Satisfied, NotSatisfied ⊑ Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Satisfiability {
    /// Evaluated in an unreachable state.
    Bottom,
    /// Holds in every concrete state.
    Satisfied,
    /// Holds in no concrete state.
    NotSatisfied,
    /// May or may not hold.
    Unknown,
}

impl Satisfiability {
    pub fn from_bool(value: bool) -> Self {
        if value {
            Satisfiability::Satisfied
        } else {
            Satisfiability::NotSatisfied
        }
    }

    pub fn negate(self) -> Self {
        match self {
            Satisfiability::Satisfied => Satisfiability::NotSatisfied,
            Satisfiability::NotSatisfied => Satisfiability::Satisfied,
            other => other,
        }
    }

    pub fn and(self, other: Self) -> Self {
        use Satisfiability::*;
        match (self, other) {
            (Bottom, _) | (_, Bottom) => Bottom,
            (NotSatisfied, _) | (_, NotSatisfied) => NotSatisfied,
            (Satisfied, Satisfied) => Satisfied,
            _ => Unknown,
        }
    }

    pub fn or(self, other: Self) -> Self {
        use Satisfiability::*;
        match (self, other) {
            (Bottom, _) | (_, Bottom) => Bottom,
            (Satisfied, _) | (_, Satisfied) => Satisfied,
            (NotSatisfied, NotSatisfied) => NotSatisfied,
            _ => Unknown,
        }
    }
}

impl fmt::Display for Satisfiability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Satisfiability::Bottom => write!(f, "⊥"),
            Satisfiability::Satisfied => write!(f, "satisfied"),
            Satisfiability::NotSatisfied => write!(f, "not satisfied"),
            Satisfiability::Unknown => write!(f, "unknown"),
        }
    }
}

impl Lattice for Satisfiability {
    fn bottom() -> Self {
        Satisfiability::Bottom
    }

    fn top() -> Self {
        Satisfiability::Unknown
    }

    fn is_bottom(&self) -> bool {
        matches!(self, Satisfiability::Bottom)
    }

    fn is_top(&self) -> bool {
        matches!(self, Satisfiability::Unknown)
    }

    fn leq(&self, other: &Self) -> bool {
        self == other || self.is_bottom() || other.is_top()
    }

    fn lub(&self, other: &Self) -> Self {
        if self.leq(other) {
            *other
        } else if other.leq(self) {
            *self
        } else {
            Satisfiability::Unknown
        }
    }

    fn widening(&self, other: &Self) -> Self {
        self.lub(other)
    }

    fn glb(&self, other: &Self) -> Self {
        if self.leq(other) {
            *self
        } else if other.leq(self) {
            *other
        } else {
            Satisfiability::Bottom
        }
    }
}

/// Reusable checks of the lattice contract, for the tests of concrete domains.
pub mod laws {
    use super::Lattice;

    /// Validate the lattice axioms over every pair of `samples`.
    ///
    /// Panics with a descriptive message on the first violated law.
    pub fn check_lattice_laws<L: Lattice>(samples: &[L]) {
        let bottom = L::bottom();
        let top = L::top();
        assert!(bottom.is_bottom(), "bottom() is not recognized as bottom");
        assert!(top.is_top(), "top() is not recognized as top");

        for a in samples {
            // Reflexivity: a ⊑ a
            assert!(a.leq(a), "Reflexivity failed for {:?}", a);

            // Extremes: ⊥ ⊑ a ⊑ ⊤
            assert!(bottom.leq(a), "Bottom is not below {:?}", a);
            assert!(a.leq(&top), "{:?} is not below top", a);

            // Identity: a ⊔ ⊥ = a
            let joined = a.lub(&bottom);
            assert!(a.equivalent(&joined), "Join with bottom failed for {:?}", a);

            // Idempotence: a ⊔ a = a
            assert!(a.equivalent(&a.lub(a)), "Join idempotence failed for {:?}", a);

            // Meet is below its receiver
            assert!(a.glb(&top).leq(a), "Meet with top is not below {:?}", a);

            for b in samples {
                // Commutativity: a ⊔ b = b ⊔ a
                let ab = a.lub(b);
                let ba = b.lub(a);
                assert!(ab.equivalent(&ba), "Join commutativity failed for {:?}, {:?}", a, b);

                // Join upper bound: a ⊑ (a ⊔ b)
                assert!(a.leq(&ab), "Join is not upper bound for {:?}", a);
                assert!(b.leq(&ab), "Join is not upper bound for {:?}", b);

                // Widening upper bound: a ⊑ (a ∇ b), b ⊑ (a ∇ b)
                let widened = a.widening(b);
                assert!(a.leq(&widened), "Widening does not cover {:?}", a);
                assert!(b.leq(&widened), "Widening does not cover {:?}", b);

                // Meet is a lower bound of its receiver
                assert!(a.glb(b).leq(a), "Meet is not below {:?}", a);

                for c in samples {
                    // Associativity: (a ⊔ b) ⊔ c = a ⊔ (b ⊔ c)
                    let left = ab.lub(c);
                    let right = a.lub(&b.lub(c));
                    assert!(left.equivalent(&right), "Join associativity failed for {:?}, {:?}, {:?}", a, b, c);
                }
            }
        }
    }

    /// Check that repeatedly widening along `chain` stabilizes within `max_steps`.
    ///
    /// Returns the number of steps after which the approximation stopped changing.
    pub fn check_widening_stabilizes<L: Lattice>(chain: impl IntoIterator<Item = L>, max_steps: usize) -> usize {
        let mut approx = L::bottom();
        let mut last_change = 0;
        for (step, next) in chain.into_iter().enumerate() {
            let widened = approx.widening(&next);
            assert!(next.leq(&widened), "Widening does not cover chain element {:?}", next);
            if widened != approx {
                last_change = step;
                assert!(step < max_steps, "Widening did not stabilize within {} steps", max_steps);
            }
            approx = widened;
        }
        last_change
    }
}
