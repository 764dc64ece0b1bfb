//! Scalar element types and their runtime [Dtype] descriptors.
//!
//! The graph engine never branches on a concrete element type; it only
//! compares [Dtype] values for equality when validating gradients against
//! recorded data descriptors.

use std::fmt;

/// Runtime dtype identity of a tensor-like value.
///
/// Two values are type-compatible iff their [Dtype]s compare equal. This is
/// what gradient type checks use, so a backend with more element types can
/// extend the enum without touching the engine.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dtype {
    F32,
    F64,
}

impl fmt::Display for Dtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dtype::F32 => write!(f, "f32"),
            Dtype::F64 => write!(f, "f64"),
        }
    }
}

/// Scalar types that can back an [NdArray](crate::tensor::NdArray).
pub trait Elem:
    Copy
    + Default
    + PartialEq
    + PartialOrd
    + fmt::Debug
    + fmt::Display
    + num_traits::Float
    + num_traits::FromPrimitive
    + num_traits::ToPrimitive
    + 'static
{
    const DTYPE: Dtype;
}

impl Elem for f32 {
    const DTYPE: Dtype = Dtype::F32;
}

impl Elem for f64 {
    const DTYPE: Dtype = Dtype::F64;
}
