//! Type inference as a value analysis.
//!
//! The values tracked for each identifier are [`TypeSet`]s: the runtime types the identifier may hold.
//! Operators compute the types of their results from the types of their operands, so running the
//! fixpoint with a [`TypeEnvironment`] yields the runtime types of every expression.

use crate::environment::{Environment, NonRelationalValue};
use crate::symbolic::{BinaryOperator, Constant, TernaryOperator, UnaryOperator};
use crate::types::{Type, TypeSet};

pub type TypeEnvironment = Environment<TypeSet>;

impl NonRelationalValue for TypeSet {
    fn eval_constant(constant: &Constant, _types: &TypeSet) -> Self {
        TypeSet::single(constant.static_type())
    }

    fn eval_pointer(_types: &TypeSet) -> Self {
        TypeSet::single(Type::Pointer)
    }

    fn eval_unary(op: UnaryOperator, arg: &Self, _types: &TypeSet) -> Self {
        op.result_types(arg)
    }

    fn eval_binary(op: BinaryOperator, left: &Self, right: &Self, _types: &TypeSet) -> Self {
        op.result_types(left, right)
    }

    fn eval_ternary(op: TernaryOperator, first: &Self, second: &Self, third: &Self, _types: &TypeSet) -> Self {
        op.result_types([first, second, third])
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::lattice::Lattice;
    use crate::state::ValueDomain;
    use crate::symbolic::{Identifier, SymbolicExpression};

    #[test]
    fn test_types_flow_through_assignments() {
        let x = Identifier::variable("x");
        let y = Identifier::variable("y");
        let env = TypeEnvironment::new()
            .assign(&x, &SymbolicExpression::constant(Constant::Int(1)))
            .unwrap();
        assert_eq!(env.get(&x), TypeSet::single(Type::Integer));

        let concat = SymbolicExpression::binary(
            BinaryOperator::Concat,
            SymbolicExpression::constant(Constant::Str("a".into())),
            SymbolicExpression::constant(Constant::Str("b".into())),
            TypeSet::Top,
        );
        let env = env.assign(&y, &concat).unwrap();
        assert_eq!(env.get(&y), TypeSet::single(Type::String));

        let joined = env.lub(&env.assign(&x, &SymbolicExpression::constant(Constant::Str("s".into()))).unwrap());
        assert_eq!(joined.get(&x), TypeSet::from_types(&[Type::Integer, Type::String]));
    }

    #[test]
    fn test_pointers_have_pointer_type() {
        let loc = Identifier::heap_location("A", false);
        let pointer = SymbolicExpression::identifier(Identifier::pointer_to(&loc), TypeSet::Top);
        let env = TypeEnvironment::new();
        assert_eq!(env.eval(&pointer).unwrap(), TypeSet::single(Type::Pointer));
    }
}
