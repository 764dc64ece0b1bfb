use super::Error;
use crate::dtypes::Dtype;

/// Shape + dtype descriptor recorded on a
/// [VariableNode](crate::variable::VariableNode) whenever data is assigned.
///
/// The node keeps the descriptor rather than the data itself; data ownership
/// stays with the [Variable](crate::variable::Variable) unless explicitly
/// retained for backward.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataType {
    pub shape: Vec<usize>,
    pub dtype: Dtype,
}

impl DataType {
    pub fn of<T: TensorLike>(t: &T) -> Self {
        Self {
            shape: t.shape().to_vec(),
            dtype: t.dtype(),
        }
    }

    pub fn size(&self) -> usize {
        self.shape.iter().product()
    }

    /// Validates that `grad` matches this descriptor.
    ///
    /// A dtype difference is a [Error::TypeMismatch], a shape difference a
    /// [Error::ShapeMismatch] - except that 0-d and single-element arrays
    /// are considered equivalent, matching the usual scalar/0-d convention.
    pub fn check_grad<T: TensorLike>(&self, grad: &T) -> Result<(), Error> {
        if grad.dtype() != self.dtype {
            return Err(Error::TypeMismatch {
                expected: self.dtype,
                found: grad.dtype(),
            });
        }
        if grad.shape() != &self.shape[..] && !(self.size() == 1 && grad.size() == 1) {
            return Err(Error::ShapeMismatch {
                expected: self.shape.clone(),
                found: grad.shape().to_vec(),
            });
        }
        Ok(())
    }
}

/// The capability set the graph engine requires of an array-like value.
///
/// The engine is generic over this contract and never assumes a particular
/// numeric backend: anything with a shape, a dtype identity, element-wise
/// algebra and a sum reduction can flow through [Variable](crate::variable::Variable)s
/// and [Function](crate::function::Function)s. [NdArray](super::NdArray) is
/// the built-in CPU implementation.
///
/// Binary operations are fallible ([Error::ShapeMismatch] on incompatible
/// operands); unary operations cannot fail.
pub trait TensorLike: Clone + std::fmt::Debug + 'static {
    fn shape(&self) -> &[usize];
    fn dtype(&self) -> Dtype;

    fn ndim(&self) -> usize {
        self.shape().len()
    }

    fn size(&self) -> usize {
        self.shape().iter().product()
    }

    fn zeros_like(&self) -> Self;
    fn ones_like(&self) -> Self;

    fn try_add(&self, rhs: &Self) -> Result<Self, Error>;
    fn try_sub(&self, rhs: &Self) -> Result<Self, Error>;
    fn try_mul(&self, rhs: &Self) -> Result<Self, Error>;
    fn try_div(&self, rhs: &Self) -> Result<Self, Error>;
    /// Element-wise `self ^ rhs`.
    fn try_pow(&self, rhs: &Self) -> Result<Self, Error>;

    /// Accumulates `rhs` into `self`.
    ///
    /// Implementations may mutate in place only when they own the buffer
    /// uniquely; a shared buffer must be copied first so that external
    /// handles to it are never mutated.
    fn try_add_assign(&mut self, rhs: &Self) -> Result<(), Error>;

    fn negate(&self) -> Self;
    fn ln(&self) -> Self;
    fn add_scalar(&self, v: f64) -> Self;
    fn mul_scalar(&self, v: f64) -> Self;
    fn powf(&self, v: f64) -> Self;

    /// Sum reduction. `axis: None` sums all elements into a 0-d array;
    /// `keepdims` keeps the reduced axes with extent 1.
    fn sum(&self, axis: Option<usize>, keepdims: bool) -> Self;
}
