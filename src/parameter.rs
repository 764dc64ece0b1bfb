//! Trainable parameters with deferred initialization.
//!
//! A [Parameter] is a [Variable] that may start out without data. The shape
//! of a parameter is often unknown until the first forward pass (think of a
//! linear layer inferring its input width), so construction takes an
//! [Initializer] and [Parameter::init] materializes the data once a shape
//! is available. An optional grad initializer seeds the gradient at the
//! same time.

use std::ops::{Deref, DerefMut};

use crate::initializers::Initializer;
use crate::serializers::Serializer;
use crate::tensor::{Error, TensorLike};
use crate::variable::Variable;

/// Applies an optimizer step to one parameter.
///
/// Rules are attached per parameter so different parameters can run with
/// different hyperparameters, and [Parameter::update] dispatches through
/// the attached rule.
pub trait UpdateRule<T: TensorLike>: std::fmt::Debug {
    fn update(&mut self, param: &mut Parameter<T>) -> Result<(), Error>;
}

/// A variable with deferred, shape-driven initialization.
#[derive(Debug)]
pub struct Parameter<T: TensorLike> {
    variable: Variable<T>,
    initializer: Option<Box<dyn Initializer<T>>>,
    grad_initializer: Option<Box<dyn Initializer<T>>>,
    update_rule: Option<Box<dyn UpdateRule<T>>>,
}

impl<T: TensorLike> Deref for Parameter<T> {
    type Target = Variable<T>;
    fn deref(&self) -> &Variable<T> {
        &self.variable
    }
}

impl<T: TensorLike> DerefMut for Parameter<T> {
    fn deref_mut(&mut self) -> &mut Variable<T> {
        &mut self.variable
    }
}

impl<T: TensorLike> Parameter<T> {
    /// An uninitialized parameter. Data appears on the first
    /// [init](Parameter::init) call.
    pub fn new(initializer: impl Initializer<T> + 'static) -> Self {
        Self {
            variable: Variable::empty(),
            initializer: Some(Box::new(initializer)),
            grad_initializer: None,
            update_rule: None,
        }
    }

    /// A parameter that is already materialized.
    pub fn from_data(data: T) -> Self {
        Self {
            variable: Variable::new(data),
            initializer: None,
            grad_initializer: None,
            update_rule: None,
        }
    }

    /// Also seed the gradient when [init](Parameter::init) runs.
    pub fn with_grad_initializer(mut self, init: impl Initializer<T> + 'static) -> Self {
        self.grad_initializer = Some(Box::new(init));
        self
    }

    pub fn with_update_rule(mut self, rule: impl UpdateRule<T> + 'static) -> Self {
        self.update_rule = Some(Box::new(rule));
        self
    }

    pub fn is_initialized(&self) -> bool {
        self.variable.data().is_some()
    }

    /// Materialize the data (and optionally the gradient) for `shape`.
    pub fn init(&mut self, shape: &[usize]) -> Result<(), Error> {
        if let Some(init) = &self.initializer {
            let data = init.try_generate(shape)?;
            self.variable.set_data(data);
        }
        if let Some(init) = &self.grad_initializer {
            let grad = init.try_generate(shape)?;
            self.variable.try_set_grad(Some(grad))?;
        }
        Ok(())
    }

    /// Clear the gradient. On an uninitialized parameter this drops the
    /// pending grad initializer instead, so a later [init](Parameter::init)
    /// leaves the gradient unset.
    pub fn cleargrad(&mut self) {
        if self.is_initialized() {
            self.variable.cleargrad();
        } else {
            self.grad_initializer = None;
        }
    }

    /// Run the attached update rule, if any.
    pub fn update(&mut self) -> Result<(), Error> {
        let mut rule = self.update_rule.take();
        let result = match rule.as_mut() {
            Some(rule) => rule.update(self),
            None => Ok(()),
        };
        self.update_rule = rule;
        result
    }

    /// Exchange this parameter's data with a [Serializer] under `key`.
    ///
    /// A saver receives the current data and returns it unchanged; a loader
    /// returns replacement data, which is stored into the parameter.
    pub fn serialize(
        &mut self,
        key: &str,
        serializer: &mut dyn Serializer<T>,
    ) -> Result<(), Error> {
        let data = self.variable.data().cloned();
        if let Some(data) = serializer.call(key, data)? {
            self.variable.set_data(data);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::initializers::{Constant, Nan, Normal};
    use crate::tensor::NdArray;
    use crate::tests::*;
    use crate::variable::Variable;

    #[derive(Debug)]
    struct Sgd {
        lr: f64,
    }

    impl UpdateRule<NdArray<TestDtype>> for Sgd {
        fn update(&mut self, param: &mut Parameter<NdArray<TestDtype>>) -> Result<(), Error> {
            let Some(grad) = param.grad() else {
                return Ok(());
            };
            let data = param.data().ok_or(Error::NoData)?;
            let next = data.try_sub(&grad.mul_scalar(self.lr))?;
            param.set_data(next);
            Ok(())
        }
    }

    #[test]
    fn test_lazy_init() {
        let mut p: Parameter<NdArray<TestDtype>> = Parameter::new(Constant(1.5));
        assert!(!p.is_initialized());
        assert!(p.grad().is_none());
        p.init(&[2, 2]).unwrap();
        assert!(p.is_initialized());
        assert_eq!(p.shape().unwrap(), &[2, 2]);
        assert!(p.data().unwrap().as_slice().iter().all(|&v| v == 1.5));
    }

    #[test]
    fn test_grad_initializer_seeds_nan() {
        let mut p: Parameter<NdArray<TestDtype>> =
            Parameter::new(Normal::seeded(0.0, 0.1, 3)).with_grad_initializer(Nan);
        p.init(&[3]).unwrap();
        let g = p.grad().unwrap();
        assert!(g.as_slice().iter().all(|v| v.is_nan()));
    }

    #[test]
    fn test_cleargrad_before_init_drops_grad_initializer() {
        let mut p: Parameter<NdArray<TestDtype>> =
            Parameter::new(Constant(0.0)).with_grad_initializer(Nan);
        p.cleargrad();
        p.init(&[2]).unwrap();
        assert!(p.grad().is_none());
    }

    #[test]
    fn test_cleargrad_after_init_clears_grad() {
        let mut p = Parameter::from_data(NdArray::from_vec(&[1], vec![2.0 as TestDtype]));
        p.set_grad(Some(NdArray::from_vec(&[1], vec![5.0])));
        p.cleargrad();
        assert!(p.grad().is_none());
    }

    #[test]
    fn test_update_rule_applies_gradient() {
        let mut p = Parameter::from_data(NdArray::from_vec(&[2], vec![1.0 as TestDtype, 2.0]))
            .with_update_rule(Sgd { lr: 0.1 });
        p.set_grad(Some(NdArray::from_vec(&[2], vec![10.0, 10.0])));
        p.update().unwrap();
        assert_close!(
            p.data().unwrap().clone(),
            NdArray::from_vec(&[2], vec![0.0, 1.0])
        );
        // A second update with the same grad keeps moving.
        p.update().unwrap();
        assert_close!(
            p.data().unwrap().clone(),
            NdArray::from_vec(&[2], vec![-1.0, 0.0])
        );
    }

    #[test]
    fn test_parameter_participates_in_graphs() {
        let mut p: Parameter<NdArray<TestDtype>> = Parameter::new(Constant(3.0));
        p.init(&[1]).unwrap();
        let x = Variable::new(NdArray::from_vec(&[1], vec![4.0 as TestDtype]));
        let y = &*p * &x;
        y.backward().unwrap();
        assert_eq!(p.grad().unwrap().as_slice(), &[4.0]);
        assert_eq!(x.grad().unwrap().as_slice(), &[3.0]);
    }
}
