//! The basic differentiable operations behind the [Variable](crate::variable::Variable)
//! operators.
//!
//! This is deliberately not an exhaustive op catalog: any operation
//! implementing [Function](crate::function::Function) plugs into the engine
//! the same way these do.

mod math;

pub use math::{Add, AddConstant, Div, Mul, MulConstant, Neg, PowVarConst, PowVarVar, Sub, Sum};
