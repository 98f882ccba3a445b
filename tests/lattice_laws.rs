//! Property-based checks of the value domains.

use proptest::prelude::*;

use absint_rs::domains::{Bound, Bricks, CharInclusion, Interval};
use absint_rs::environment::NonRelationalValue;
use absint_rs::lattice::laws::{check_lattice_laws, check_widening_stabilizes};
use absint_rs::lattice::{Lattice, Satisfiability};
use absint_rs::symbolic::BinaryOperator;
use absint_rs::types::TypeSet;

fn interval() -> impl Strategy<Value = Interval> {
    (-1000i64..1000, 0i64..500).prop_map(|(low, width)| Interval::new(low, low + width))
}

/// An interval together with one of its elements.
fn member() -> impl Strategy<Value = (Interval, i64)> {
    interval().prop_flat_map(|i| {
        let (low, high) = match (i.low.as_finite(), i.high.as_finite()) {
            (Some(l), Some(h)) => (l, h),
            _ => (0, 0),
        };
        (Just(i), low..=high)
    })
}

fn word() -> impl Strategy<Value = String> {
    "[a-d]{0,4}"
}

proptest! {
    #[test]
    fn interval_lattice_laws(a in interval(), b in interval(), c in interval()) {
        check_lattice_laws(&[Interval::bottom(), Interval::top(), a, b, c]);
    }

    #[test]
    fn interval_widening_covers_and_stabilizes(start in -100i64..100, step in 1i64..50) {
        let chain = (0..20).map(|k| Interval::new(start, start + k * step));
        let last_change = check_widening_stabilizes(chain, 3);
        prop_assert!(last_change <= 2);
    }

    #[test]
    fn interval_arithmetic_is_sound((x, a) in member(), (y, b) in member()) {
        let types = TypeSet::Top;
        let cases = [
            (BinaryOperator::Add, a + b),
            (BinaryOperator::Sub, a - b),
            (BinaryOperator::Mul, a * b),
        ];
        for (op, concrete) in cases {
            let abstracted = Interval::eval_binary(op, &x, &y, &types);
            prop_assert!(abstracted.contains(concrete), "{} {:?} {} = {} not in {}", x, op, y, concrete, abstracted);
        }
        if b != 0 {
            let quotient = Interval::eval_binary(BinaryOperator::Div, &x, &y, &types);
            prop_assert!(quotient.contains(a / b), "{} / {} = {} not in {}", x, y, a / b, quotient);
        }
    }

    #[test]
    fn interval_arithmetic_overflows_to_infinity(a in (i64::MAX - 20)..=i64::MAX, b in -20i64..=20, negate in any::<bool>()) {
        let (a, b) = if negate { (-a - 1, -b) } else { (a, b) };
        let x = Interval::constant(a);
        let y = Interval::constant(b);
        let types = TypeSet::Top;
        let cases = [
            (BinaryOperator::Add, i128::from(a) + i128::from(b)),
            (BinaryOperator::Sub, i128::from(a) - i128::from(b)),
            (BinaryOperator::Mul, i128::from(a) * i128::from(b)),
        ];
        for (op, exact) in cases {
            let abstracted = Interval::eval_binary(op, &x, &y, &types);
            match i64::try_from(exact) {
                Ok(exact) => prop_assert!(abstracted.contains(exact), "{:?}: {} not in {}", op, exact, abstracted),
                Err(_) if exact > 0 => prop_assert_eq!(abstracted.high, Bound::PosInf),
                Err(_) => prop_assert_eq!(abstracted.low, Bound::NegInf),
            }
        }
    }

    #[test]
    fn interval_comparisons_are_sound((x, a) in member(), (y, b) in member()) {
        match Interval::satisfies_binary(BinaryOperator::Lt, &x, &y) {
            Satisfiability::Satisfied => prop_assert!(a < b),
            Satisfiability::NotSatisfied => prop_assert!(a >= b),
            _ => {}
        }
        if a < b {
            let (left, right) = Interval::refine_binary(BinaryOperator::Lt, &x, &y);
            prop_assert!(left.contains(a));
            prop_assert!(right.contains(b));
        }
    }

    #[test]
    fn char_inclusion_lattice_laws(a in word(), b in word(), c in word()) {
        check_lattice_laws(&[
            CharInclusion::bottom(),
            CharInclusion::top(),
            CharInclusion::of_string(&a),
            CharInclusion::of_string(&b),
            CharInclusion::of_string(&c),
        ]);
    }

    #[test]
    fn char_inclusion_contains_is_sound(haystack in word(), needle in word()) {
        let result = CharInclusion::satisfies_binary(
            BinaryOperator::Contains,
            &CharInclusion::of_string(&haystack),
            &CharInclusion::of_string(&needle),
        );
        match result {
            Satisfiability::Satisfied => prop_assert!(haystack.contains(needle.as_str())),
            Satisfiability::NotSatisfied => prop_assert!(!haystack.contains(needle.as_str())),
            _ => {}
        }
    }

    #[test]
    fn bricks_concat_of_constants_is_exact(a in word(), b in word()) {
        let types = TypeSet::Top;
        let joined = Bricks::eval_binary(BinaryOperator::Concat, &Bricks::of_string(&a), &Bricks::of_string(&b), &types);
        let concatenated = format!("{}{}", a, b);
        let reps = joined.reps();
        prop_assert!(reps.is_some());
        prop_assert!(reps.unwrap_or_default().contains(&concatenated));
    }

    #[test]
    fn bricks_lub_is_an_upper_bound(a in word(), b in word()) {
        let left = Bricks::of_string(&a);
        let right = Bricks::of_string(&b);
        let joined = left.lub(&right);
        prop_assert!(left.leq(&joined));
        prop_assert!(right.leq(&joined));
        if let Some(reps) = joined.reps() {
            prop_assert!(reps.contains(&a));
            prop_assert!(reps.contains(&b));
        }
    }
}
