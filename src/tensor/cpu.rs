use std::sync::Arc;

use super::{Error, TensorLike};
use crate::dtypes::{Dtype, Elem};

/// A heap-allocated, contiguous (row-major) nd-array.
///
/// The element buffer lives behind an [Arc], so cloning an [NdArray] is
/// cheap and mutation goes through [Arc::make_mut]: a uniquely owned buffer
/// is mutated in place, a shared one is copied first. The backward engine
/// relies on exactly this copy-on-write behavior when accumulating
/// gradients.
#[derive(Clone)]
pub struct NdArray<E: Elem> {
    pub(crate) data: Arc<Vec<E>>,
    pub(crate) shape: Vec<usize>,
}

impl<E: Elem> std::fmt::Debug for NdArray<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NdArray")
            .field("shape", &self.shape)
            .field("data", &self.data)
            .finish()
    }
}

impl<E: Elem> PartialEq for NdArray<E> {
    fn eq(&self, other: &Self) -> bool {
        self.shape == other.shape && self.data == other.data
    }
}

impl<E: Elem> NdArray<E> {
    /// Fallible construction from a flat element vector.
    pub fn try_from_vec(shape: &[usize], data: Vec<E>) -> Result<Self, Error> {
        if data.len() != shape.iter().product::<usize>() {
            return Err(Error::WrongNumElements);
        }
        Ok(Self {
            data: Arc::new(data),
            shape: shape.to_vec(),
        })
    }

    /// See [NdArray::try_from_vec]. Panics on a size mismatch.
    pub fn from_vec(shape: &[usize], data: Vec<E>) -> Self {
        Self::try_from_vec(shape, data).unwrap()
    }

    /// A 0-d array holding a single value.
    pub fn scalar(v: E) -> Self {
        Self {
            data: Arc::new(vec![v]),
            shape: Vec::new(),
        }
    }

    pub fn full(shape: &[usize], v: E) -> Self {
        Self {
            data: Arc::new(vec![v; shape.iter().product()]),
            shape: shape.to_vec(),
        }
    }

    pub fn zeros(shape: &[usize]) -> Self {
        Self::full(shape, E::zero())
    }

    pub fn ones(shape: &[usize]) -> Self {
        Self::full(shape, E::one())
    }

    pub fn as_slice(&self) -> &[E] {
        &self.data
    }

    pub fn to_vec(&self) -> Vec<E> {
        self.data.as_ref().clone()
    }

    /// Applies `f` to every element, producing a new array of the same shape.
    pub fn map(&self, f: impl FnMut(E) -> E) -> Self {
        Self {
            data: Arc::new(self.data.iter().copied().map(f).collect()),
            shape: self.shape.clone(),
        }
    }

    /// Element-wise combination of two arrays.
    ///
    /// Operands must have the same shape, except that a single-element
    /// operand broadcasts against any shape (the 0-d/scalar convention).
    fn zip(&self, rhs: &Self, mut f: impl FnMut(E, E) -> E) -> Result<Self, Error> {
        if self.shape == rhs.shape {
            let data = self
                .data
                .iter()
                .zip(rhs.data.iter())
                .map(|(&a, &b)| f(a, b))
                .collect();
            Ok(Self {
                data: Arc::new(data),
                shape: self.shape.clone(),
            })
        } else if rhs.size() == 1 {
            let b = rhs.data[0];
            Ok(self.map(|a| f(a, b)))
        } else if self.size() == 1 {
            let a = self.data[0];
            Ok(rhs.map(|b| f(a, b)))
        } else {
            Err(Error::ShapeMismatch {
                expected: self.shape.clone(),
                found: rhs.shape.clone(),
            })
        }
    }
}

impl<E: Elem> TensorLike for NdArray<E> {
    fn shape(&self) -> &[usize] {
        &self.shape
    }

    fn dtype(&self) -> Dtype {
        E::DTYPE
    }

    fn zeros_like(&self) -> Self {
        Self::zeros(&self.shape)
    }

    fn ones_like(&self) -> Self {
        Self::ones(&self.shape)
    }

    fn try_add(&self, rhs: &Self) -> Result<Self, Error> {
        self.zip(rhs, |a, b| a + b)
    }

    fn try_sub(&self, rhs: &Self) -> Result<Self, Error> {
        self.zip(rhs, |a, b| a - b)
    }

    fn try_mul(&self, rhs: &Self) -> Result<Self, Error> {
        self.zip(rhs, |a, b| a * b)
    }

    fn try_div(&self, rhs: &Self) -> Result<Self, Error> {
        self.zip(rhs, |a, b| a / b)
    }

    fn try_pow(&self, rhs: &Self) -> Result<Self, Error> {
        self.zip(rhs, |a, b| a.powf(b))
    }

    fn try_add_assign(&mut self, rhs: &Self) -> Result<(), Error> {
        if self.shape == rhs.shape {
            let buf = Arc::make_mut(&mut self.data);
            for (a, &b) in buf.iter_mut().zip(rhs.data.iter()) {
                *a = *a + b;
            }
            Ok(())
        } else if rhs.size() == 1 {
            let b = rhs.data[0];
            let buf = Arc::make_mut(&mut self.data);
            for a in buf.iter_mut() {
                *a = *a + b;
            }
            Ok(())
        } else {
            // self is a single element against a larger rhs: the result
            // changes shape, so build it out of place.
            *self = self.try_add(rhs)?;
            Ok(())
        }
    }

    fn negate(&self) -> Self {
        self.map(|a| -a)
    }

    fn ln(&self) -> Self {
        self.map(|a| a.ln())
    }

    fn add_scalar(&self, v: f64) -> Self {
        let v = E::from_f64(v).unwrap();
        self.map(|a| a + v)
    }

    fn mul_scalar(&self, v: f64) -> Self {
        let v = E::from_f64(v).unwrap();
        self.map(|a| a * v)
    }

    fn powf(&self, v: f64) -> Self {
        let v = E::from_f64(v).unwrap();
        self.map(|a| a.powf(v))
    }

    fn sum(&self, axis: Option<usize>, keepdims: bool) -> Self {
        match axis {
            None => {
                let total = self.data.iter().fold(E::zero(), |acc, &v| acc + v);
                let shape = if keepdims {
                    vec![1; self.shape.len()]
                } else {
                    Vec::new()
                };
                Self {
                    data: Arc::new(vec![total]),
                    shape,
                }
            }
            Some(axis) => {
                assert!(
                    axis < self.shape.len(),
                    "axis {axis} out of range for shape {:?}",
                    self.shape
                );
                let outer: usize = self.shape[..axis].iter().product();
                let mid = self.shape[axis];
                let inner: usize = self.shape[axis + 1..].iter().product();
                let mut data = vec![E::zero(); outer * inner];
                for o in 0..outer {
                    for m in 0..mid {
                        for i in 0..inner {
                            data[o * inner + i] =
                                data[o * inner + i] + self.data[(o * mid + m) * inner + i];
                        }
                    }
                }
                let mut shape = self.shape.clone();
                if keepdims {
                    shape[axis] = 1;
                } else {
                    shape.remove(axis);
                }
                Self {
                    data: Arc::new(data),
                    shape,
                }
            }
        }
    }
}
