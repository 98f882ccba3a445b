//! Value domains shipped with the crate.
//!
//! Every domain here is a [`NonRelationalValue`](crate::environment::NonRelationalValue), lifted to
//! identifiers by [`Environment`](crate::environment::Environment).

pub mod bricks;
pub mod char_inclusion;
pub mod interval;
pub mod types;

pub use bricks::{Brick, Bricks};
pub use char_inclusion::CharInclusion;
pub use interval::{Bound, Interval};
pub use types::TypeEnvironment;
