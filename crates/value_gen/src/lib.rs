//! Scalar value generators for relsynth table models.
//!
//! Every non-relational column in a model is backed by one generator built
//! from a [`GeneratorSpec`]. Generators are seeded so that the same model and
//! seed always produce the same values.
//!
//! # Example
//!
//! ```rust
//! use value_gen::{GeneratorSpec, Value};
//!
//! let spec = GeneratorSpec::Sequence { start: 10, step: 5 };
//! let mut gen = spec.build(42).unwrap();
//!
//! assert_eq!(gen.next_value(), Value::Int(10));
//! assert_eq!(gen.next_value(), Value::Int(15));
//! ```

pub mod fake;
pub mod generator;
pub mod value;

pub use fake::FakeKind;
pub use generator::{GeneratorError, GeneratorSpec, ValueGenerator};
pub use value::{Literal, Value};
