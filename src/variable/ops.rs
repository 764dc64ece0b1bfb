//! Arithmetic sugar on [Variable]s.
//!
//! Every operator routes through [apply_single](crate::function::apply_single)
//! with the corresponding function from [crate::functions], so the result is
//! always a well-formed graph node. Plain scalar operands, on either side,
//! go through the `*Constant` functions, which is equivalent to coercing
//! them into non-grad-requiring variables.

use std::ops::{Add, Div, Mul, Neg, Sub};

use super::Variable;
use crate::function::apply_single;
use crate::functions;
use crate::tensor::{Error, TensorLike};

impl<T: TensorLike> Variable<T> {
    pub fn try_add(&self, rhs: &Variable<T>) -> Result<Variable<T>, Error> {
        apply_single(functions::Add, &[self, rhs])
    }

    pub fn try_add_scalar(&self, rhs: f64) -> Result<Variable<T>, Error> {
        apply_single(functions::AddConstant(rhs), &[self])
    }

    pub fn try_sub(&self, rhs: &Variable<T>) -> Result<Variable<T>, Error> {
        apply_single(functions::Sub, &[self, rhs])
    }

    pub fn try_sub_scalar(&self, rhs: f64) -> Result<Variable<T>, Error> {
        apply_single(functions::AddConstant(-rhs), &[self])
    }

    pub fn try_mul(&self, rhs: &Variable<T>) -> Result<Variable<T>, Error> {
        apply_single(functions::Mul, &[self, rhs])
    }

    pub fn try_mul_scalar(&self, rhs: f64) -> Result<Variable<T>, Error> {
        apply_single(functions::MulConstant(rhs), &[self])
    }

    pub fn try_div(&self, rhs: &Variable<T>) -> Result<Variable<T>, Error> {
        apply_single(functions::Div, &[self, rhs])
    }

    pub fn try_div_scalar(&self, rhs: f64) -> Result<Variable<T>, Error> {
        apply_single(functions::MulConstant(1.0 / rhs), &[self])
    }

    pub fn try_neg(&self) -> Result<Variable<T>, Error> {
        apply_single(functions::Neg, &[self])
    }

    /// Element-wise `self ^ exponent` with a variable exponent.
    pub fn try_pow(&self, exponent: &Variable<T>) -> Result<Variable<T>, Error> {
        apply_single(functions::PowVarVar, &[self, exponent])
    }

    /// See [Variable::try_pow]. Panics on failure.
    pub fn pow(&self, exponent: &Variable<T>) -> Variable<T> {
        self.try_pow(exponent).unwrap()
    }

    /// Element-wise `self ^ c` with a constant exponent.
    pub fn try_powf(&self, c: f64) -> Result<Variable<T>, Error> {
        apply_single(functions::PowVarConst(c), &[self])
    }

    /// See [Variable::try_powf]. Panics on failure.
    pub fn powf(&self, c: f64) -> Variable<T> {
        self.try_powf(c).unwrap()
    }

    /// Sum of all elements, as a 0-d variable.
    pub fn try_sum(&self) -> Result<Variable<T>, Error> {
        apply_single(functions::Sum, &[self])
    }

    /// See [Variable::try_sum]. Panics on failure.
    pub fn sum(&self) -> Variable<T> {
        self.try_sum().unwrap()
    }
}

impl<T: TensorLike> Add<&Variable<T>> for &Variable<T> {
    type Output = Variable<T>;
    fn add(self, rhs: &Variable<T>) -> Variable<T> {
        self.try_add(rhs).unwrap()
    }
}

impl<T: TensorLike> Add<f64> for &Variable<T> {
    type Output = Variable<T>;
    fn add(self, rhs: f64) -> Variable<T> {
        self.try_add_scalar(rhs).unwrap()
    }
}

impl<T: TensorLike> Sub<&Variable<T>> for &Variable<T> {
    type Output = Variable<T>;
    fn sub(self, rhs: &Variable<T>) -> Variable<T> {
        self.try_sub(rhs).unwrap()
    }
}

impl<T: TensorLike> Sub<f64> for &Variable<T> {
    type Output = Variable<T>;
    fn sub(self, rhs: f64) -> Variable<T> {
        self.try_sub_scalar(rhs).unwrap()
    }
}

impl<T: TensorLike> Mul<&Variable<T>> for &Variable<T> {
    type Output = Variable<T>;
    fn mul(self, rhs: &Variable<T>) -> Variable<T> {
        self.try_mul(rhs).unwrap()
    }
}

impl<T: TensorLike> Mul<f64> for &Variable<T> {
    type Output = Variable<T>;
    fn mul(self, rhs: f64) -> Variable<T> {
        self.try_mul_scalar(rhs).unwrap()
    }
}

impl<T: TensorLike> Div<&Variable<T>> for &Variable<T> {
    type Output = Variable<T>;
    fn div(self, rhs: &Variable<T>) -> Variable<T> {
        self.try_div(rhs).unwrap()
    }
}

impl<T: TensorLike> Div<f64> for &Variable<T> {
    type Output = Variable<T>;
    fn div(self, rhs: f64) -> Variable<T> {
        self.try_div_scalar(rhs).unwrap()
    }
}

impl<T: TensorLike> Add<&Variable<T>> for f64 {
    type Output = Variable<T>;
    fn add(self, rhs: &Variable<T>) -> Variable<T> {
        rhs.try_add_scalar(self).unwrap()
    }
}

impl<T: TensorLike> Sub<&Variable<T>> for f64 {
    type Output = Variable<T>;
    fn sub(self, rhs: &Variable<T>) -> Variable<T> {
        // c - x == (-x) + c
        let neg = rhs.try_neg().unwrap();
        neg.try_add_scalar(self).unwrap()
    }
}

impl<T: TensorLike> Mul<&Variable<T>> for f64 {
    type Output = Variable<T>;
    fn mul(self, rhs: &Variable<T>) -> Variable<T> {
        rhs.try_mul_scalar(self).unwrap()
    }
}

impl<T: TensorLike> Div<&Variable<T>> for f64 {
    type Output = Variable<T>;
    fn div(self, rhs: &Variable<T>) -> Variable<T> {
        // c / x == c * x^-1
        let inv = rhs.try_powf(-1.0).unwrap();
        inv.try_mul_scalar(self).unwrap()
    }
}

impl<T: TensorLike> Neg for &Variable<T> {
    type Output = Variable<T>;
    fn neg(self) -> Variable<T> {
        self.try_neg().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::NdArray;
    use crate::tests::*;

    fn var(vals: &[TestDtype]) -> Variable<NdArray<TestDtype>> {
        Variable::new(NdArray::from_vec(&[vals.len()], vals.to_vec()))
    }

    #[test]
    fn test_operator_results_are_graph_nodes() {
        let x = var(&[1.0, 2.0]);
        let y = var(&[3.0, 4.0]);
        let z = &x + &y;
        assert!(z.creator().is_some());
        assert_eq!(z.rank(), 1);
        assert_eq!(z.data().unwrap().as_slice(), &[4.0, 6.0]);
    }

    #[test]
    fn test_scalar_operands() {
        let x = var(&[2.0]);
        assert_eq!((&x + 3.0).data().unwrap().as_slice(), &[5.0]);
        assert_eq!((&x - 3.0).data().unwrap().as_slice(), &[-1.0]);
        assert_eq!((&x * 3.0).data().unwrap().as_slice(), &[6.0]);
        assert_eq!((&x / 4.0).data().unwrap().as_slice(), &[0.5]);
        assert_eq!((-&x).data().unwrap().as_slice(), &[-2.0]);
        assert_close!(
            x.powf(3.0).data().unwrap().clone(),
            NdArray::from_vec(&[1], vec![8.0])
        );
    }

    #[test]
    fn test_sub_and_div_gradients() {
        let a = var(&[6.0]);
        let b = var(&[2.0]);
        let y = &a - &b;
        y.backward().unwrap();
        assert_eq!(a.grad().unwrap().as_slice(), &[1.0]);
        assert_eq!(b.grad().unwrap().as_slice(), &[-1.0]);

        let a = var(&[6.0]);
        let b = var(&[2.0]);
        let y = &a / &b;
        y.backward().unwrap();
        assert_close!(a.grad().unwrap(), NdArray::from_vec(&[1], vec![0.5]));
        assert_close!(b.grad().unwrap(), NdArray::from_vec(&[1], vec![-1.5]));
    }

    #[test]
    fn test_pow_gradients() {
        let a = var(&[2.0]);
        let y = a.powf(3.0);
        y.backward().unwrap();
        assert_close!(a.grad().unwrap(), NdArray::from_vec(&[1], vec![12.0]));

        let a = var(&[2.0]);
        let b = var(&[3.0]);
        let y = a.pow(&b);
        y.backward().unwrap();
        assert_close!(a.grad().unwrap(), NdArray::from_vec(&[1], vec![12.0]));
        assert_close!(
            b.grad().unwrap(),
            NdArray::from_vec(&[1], vec![(2.0 as TestDtype).ln() * 8.0]),
            1e-5
        );
    }

    #[test]
    fn test_scalar_left_operands() {
        let x = var(&[2.0]);
        assert_eq!((3.0 + &x).data().unwrap().as_slice(), &[5.0]);
        assert_eq!((3.0 - &x).data().unwrap().as_slice(), &[1.0]);
        assert_eq!((3.0 * &x).data().unwrap().as_slice(), &[6.0]);
        assert_close!(
            (6.0 / &x).data().unwrap().clone(),
            NdArray::from_vec(&[1], vec![3.0])
        );

        let x = var(&[2.0]);
        let y = 3.0 - &x;
        y.backward().unwrap();
        assert_eq!(x.grad().unwrap().as_slice(), &[-1.0]);

        // d(6/x)/dx = -6 / x^2
        let x = var(&[2.0]);
        let y = 6.0 / &x;
        y.backward().unwrap();
        assert_close!(x.grad().unwrap(), NdArray::from_vec(&[1], vec![-1.5]));
    }

    #[test]
    fn test_single_element_operand_gradient_is_reduced() {
        // A [1] operand broadcast over a [3] one receives the summed
        // gradient instead of a shape error.
        let a = var(&[1.0, 2.0, 3.0]);
        let b = var(&[10.0]);
        let y = (&a + &b).sum();
        y.backward().unwrap();
        assert_eq!(a.grad().unwrap().as_slice(), &[1.0, 1.0, 1.0]);
        let gb = b.grad().unwrap();
        assert_eq!(gb.size(), 1);
        assert_eq!(gb.as_slice(), &[3.0]);

        let a = var(&[1.0, 2.0, 3.0]);
        let b = var(&[10.0]);
        let y = (&a * &b).sum();
        y.backward().unwrap();
        assert_eq!(a.grad().unwrap().as_slice(), &[10.0, 10.0, 10.0]);
        assert_eq!(b.grad().unwrap().as_slice(), &[6.0]);
    }

    #[test]
    fn test_sum_gradient_broadcasts() {
        let x = var(&[1.0, 2.0, 3.0]);
        let s = x.sum();
        assert_eq!(s.ndim().unwrap(), 0);
        assert_eq!(s.data().unwrap().as_slice(), &[6.0]);
        s.backward().unwrap();
        assert_eq!(x.grad().unwrap().as_slice(), &[1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_expression_over_temporaries() {
        // Intermediate variables are dropped; the backward chain keeps
        // their nodes alive through the functions' input references.
        let x = var(&[2.0]);
        let y = {
            let t = &x * &x;
            &t * 3.0
        };
        y.backward().unwrap();
        assert_close!(x.grad().unwrap(), NdArray::from_vec(&[1], vec![12.0]));
    }
}
