use crate::function::Function;
use crate::tensor::{Error, TensorLike};

fn check_arity(found: usize, expected: usize) -> Result<(), Error> {
    if found != expected {
        return Err(Error::ArityMismatch { expected, found });
    }
    Ok(())
}

/// Unary negation.
#[derive(Debug, Default, Clone, Copy)]
pub struct Neg;

impl<T: TensorLike> Function<T> for Neg {
    fn forward(&mut self, xs: &[&T]) -> Result<Vec<T>, Error> {
        check_arity(xs.len(), 1)?;
        Ok(vec![xs[0].negate()])
    }

    fn backward(&self, xs: &[Option<&T>], gys: &[Option<&T>]) -> Result<Vec<Option<T>>, Error> {
        let Some(gy) = gys[0] else {
            return Ok(vec![None; xs.len()]);
        };
        Ok(vec![Some(gy.negate())])
    }

    fn label(&self) -> &'static str {
        "-_"
    }

    fn inputs_to_retain(&self, _n_in: usize) -> Vec<usize> {
        Vec::new()
    }
}

/// Element-wise addition of two variables.
#[derive(Debug, Default, Clone, Copy)]
pub struct Add;

impl<T: TensorLike> Function<T> for Add {
    fn forward(&mut self, xs: &[&T]) -> Result<Vec<T>, Error> {
        check_arity(xs.len(), 2)?;
        Ok(vec![xs[0].try_add(xs[1])?])
    }

    fn backward(&self, xs: &[Option<&T>], gys: &[Option<&T>]) -> Result<Vec<Option<T>>, Error> {
        let Some(gy) = gys[0] else {
            return Ok(vec![None; xs.len()]);
        };
        Ok(vec![Some(gy.clone()), Some(gy.clone())])
    }

    fn label(&self) -> &'static str {
        "_ + _"
    }

    fn inputs_to_retain(&self, _n_in: usize) -> Vec<usize> {
        Vec::new()
    }
}

/// Addition of a plain scalar.
#[derive(Debug, Clone, Copy)]
pub struct AddConstant(pub f64);

impl<T: TensorLike> Function<T> for AddConstant {
    fn forward(&mut self, xs: &[&T]) -> Result<Vec<T>, Error> {
        check_arity(xs.len(), 1)?;
        Ok(vec![xs[0].add_scalar(self.0)])
    }

    fn backward(&self, xs: &[Option<&T>], gys: &[Option<&T>]) -> Result<Vec<Option<T>>, Error> {
        let Some(gy) = gys[0] else {
            return Ok(vec![None; xs.len()]);
        };
        Ok(vec![Some(gy.clone())])
    }

    fn label(&self) -> &'static str {
        "_ + c"
    }

    fn inputs_to_retain(&self, _n_in: usize) -> Vec<usize> {
        Vec::new()
    }
}

/// Element-wise subtraction.
#[derive(Debug, Default, Clone, Copy)]
pub struct Sub;

impl<T: TensorLike> Function<T> for Sub {
    fn forward(&mut self, xs: &[&T]) -> Result<Vec<T>, Error> {
        check_arity(xs.len(), 2)?;
        Ok(vec![xs[0].try_sub(xs[1])?])
    }

    fn backward(&self, xs: &[Option<&T>], gys: &[Option<&T>]) -> Result<Vec<Option<T>>, Error> {
        let Some(gy) = gys[0] else {
            return Ok(vec![None; xs.len()]);
        };
        Ok(vec![Some(gy.clone()), Some(gy.negate())])
    }

    fn label(&self) -> &'static str {
        "_ - _"
    }

    fn inputs_to_retain(&self, _n_in: usize) -> Vec<usize> {
        Vec::new()
    }
}

/// Element-wise multiplication.
#[derive(Debug, Default, Clone, Copy)]
pub struct Mul;

impl<T: TensorLike> Function<T> for Mul {
    fn forward(&mut self, xs: &[&T]) -> Result<Vec<T>, Error> {
        check_arity(xs.len(), 2)?;
        Ok(vec![xs[0].try_mul(xs[1])?])
    }

    fn backward(&self, xs: &[Option<&T>], gys: &[Option<&T>]) -> Result<Vec<Option<T>>, Error> {
        let Some(gy) = gys[0] else {
            return Ok(vec![None; xs.len()]);
        };
        let x0 = xs[0].ok_or(Error::NoData)?;
        let x1 = xs[1].ok_or(Error::NoData)?;
        Ok(vec![Some(gy.try_mul(x1)?), Some(gy.try_mul(x0)?)])
    }

    fn label(&self) -> &'static str {
        "_ * _"
    }
}

/// Multiplication by a plain scalar.
#[derive(Debug, Clone, Copy)]
pub struct MulConstant(pub f64);

impl<T: TensorLike> Function<T> for MulConstant {
    fn forward(&mut self, xs: &[&T]) -> Result<Vec<T>, Error> {
        check_arity(xs.len(), 1)?;
        Ok(vec![xs[0].mul_scalar(self.0)])
    }

    fn backward(&self, xs: &[Option<&T>], gys: &[Option<&T>]) -> Result<Vec<Option<T>>, Error> {
        let Some(gy) = gys[0] else {
            return Ok(vec![None; xs.len()]);
        };
        Ok(vec![Some(gy.mul_scalar(self.0))])
    }

    fn label(&self) -> &'static str {
        "_ * c"
    }

    fn inputs_to_retain(&self, _n_in: usize) -> Vec<usize> {
        Vec::new()
    }
}

/// Element-wise division.
#[derive(Debug, Default, Clone, Copy)]
pub struct Div;

impl<T: TensorLike> Function<T> for Div {
    fn forward(&mut self, xs: &[&T]) -> Result<Vec<T>, Error> {
        check_arity(xs.len(), 2)?;
        Ok(vec![xs[0].try_div(xs[1])?])
    }

    fn backward(&self, xs: &[Option<&T>], gys: &[Option<&T>]) -> Result<Vec<Option<T>>, Error> {
        let Some(gy) = gys[0] else {
            return Ok(vec![None; xs.len()]);
        };
        let x0 = xs[0].ok_or(Error::NoData)?;
        let x1 = xs[1].ok_or(Error::NoData)?;
        let gx0 = gy.try_div(x1)?;
        // d(x0/x1)/dx1 = -x0 / x1^2
        let gx1 = gy.try_mul(x0)?.negate().try_div(&x1.try_mul(x1)?)?;
        Ok(vec![Some(gx0), Some(gx1)])
    }

    fn label(&self) -> &'static str {
        "_ / _"
    }
}

/// Element-wise power with a variable exponent.
#[derive(Debug, Default, Clone, Copy)]
pub struct PowVarVar;

impl<T: TensorLike> Function<T> for PowVarVar {
    fn forward(&mut self, xs: &[&T]) -> Result<Vec<T>, Error> {
        check_arity(xs.len(), 2)?;
        Ok(vec![xs[0].try_pow(xs[1])?])
    }

    fn backward(&self, xs: &[Option<&T>], gys: &[Option<&T>]) -> Result<Vec<Option<T>>, Error> {
        let Some(gy) = gys[0] else {
            return Ok(vec![None; xs.len()]);
        };
        let x0 = xs[0].ok_or(Error::NoData)?;
        let x1 = xs[1].ok_or(Error::NoData)?;
        // d(x0^x1)/dx0 = x1 * x0^(x1-1); d(x0^x1)/dx1 = ln(x0) * x0^x1
        let gx0 = x1.try_mul(&x0.try_pow(&x1.add_scalar(-1.0))?)?.try_mul(gy)?;
        let gx1 = x0.ln().try_mul(&x0.try_pow(x1)?)?.try_mul(gy)?;
        Ok(vec![Some(gx0), Some(gx1)])
    }

    fn label(&self) -> &'static str {
        "_ ** _"
    }
}

/// Element-wise power with a constant exponent.
#[derive(Debug, Clone, Copy)]
pub struct PowVarConst(pub f64);

impl<T: TensorLike> Function<T> for PowVarConst {
    fn forward(&mut self, xs: &[&T]) -> Result<Vec<T>, Error> {
        check_arity(xs.len(), 1)?;
        Ok(vec![xs[0].powf(self.0)])
    }

    fn backward(&self, xs: &[Option<&T>], gys: &[Option<&T>]) -> Result<Vec<Option<T>>, Error> {
        let Some(gy) = gys[0] else {
            return Ok(vec![None; xs.len()]);
        };
        let x = xs[0].ok_or(Error::NoData)?;
        Ok(vec![Some(x.powf(self.0 - 1.0).mul_scalar(self.0).try_mul(gy)?)])
    }

    fn label(&self) -> &'static str {
        "_ ** c"
    }
}

/// Sum of all elements into a 0-d value.
#[derive(Debug, Default, Clone, Copy)]
pub struct Sum;

impl<T: TensorLike> Function<T> for Sum {
    fn forward(&mut self, xs: &[&T]) -> Result<Vec<T>, Error> {
        check_arity(xs.len(), 1)?;
        Ok(vec![xs[0].sum(None, false)])
    }

    fn backward(&self, xs: &[Option<&T>], gys: &[Option<&T>]) -> Result<Vec<Option<T>>, Error> {
        let Some(gy) = gys[0] else {
            return Ok(vec![None; xs.len()]);
        };
        let x = xs[0].ok_or(Error::NoData)?;
        // Broadcast the 0-d output gradient back over the input shape.
        Ok(vec![Some(x.ones_like().try_mul(gy)?)])
    }

    fn label(&self) -> &'static str {
        "sum"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::apply_single;
    use crate::tensor::NdArray;
    use crate::tests::*;
    use crate::variable::Variable;

    #[test]
    fn test_forward_arity_is_checked() {
        let x = Variable::new(NdArray::from_vec(&[1], vec![1.0 as TestDtype]));
        let r = apply_single(Add, &[&x]);
        assert!(matches!(r, Err(Error::ArityMismatch { expected: 2, found: 1 })));
    }

    #[test]
    fn test_neg_backward() {
        let x = Variable::new(NdArray::from_vec(&[2], vec![1.0 as TestDtype, -2.0]));
        let y = (-&x).sum();
        y.backward().unwrap();
        assert_eq!(x.grad().unwrap().as_slice(), &[-1.0, -1.0]);
    }

    #[test]
    fn test_mul_backward_uses_retained_inputs() {
        let a = Variable::new(NdArray::from_vec(&[1], vec![3.0 as TestDtype]));
        let b = Variable::new(NdArray::from_vec(&[1], vec![5.0 as TestDtype]));
        let y = &a * &b;
        y.backward().unwrap();
        assert_eq!(a.grad().unwrap().as_slice(), &[5.0]);
        assert_eq!(b.grad().unwrap().as_slice(), &[3.0]);
    }

    #[test]
    fn test_elementwise_add_over_vectors() {
        let a = Variable::new(NdArray::from_vec(&[3], vec![1.0 as TestDtype, 2.0, 3.0]));
        let b = Variable::new(NdArray::from_vec(&[3], vec![10.0 as TestDtype, 20.0, 30.0]));
        let y = (&a + &b).sum();
        y.backward().unwrap();
        assert_eq!(a.grad().unwrap().as_slice(), &[1.0, 1.0, 1.0]);
        assert_eq!(b.grad().unwrap().as_slice(), &[1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_pow_var_var_forward() {
        let a = Variable::new(NdArray::from_vec(&[2], vec![2.0 as TestDtype, 3.0]));
        let b = Variable::new(NdArray::from_vec(&[2], vec![2.0 as TestDtype, 2.0]));
        let y = a.pow(&b);
        assert_close!(
            y.data().unwrap().clone(),
            NdArray::from_vec(&[2], vec![4.0, 9.0])
        );
    }
}
