//! Strategies for filling freshly allocated tensors.
//!
//! An [Initializer] produces a tensor for a given shape. Initializers show
//! up in two places: [Parameter](crate::parameter::Parameter) defers data
//! creation until a shape is known, and a parameter's gradient can likewise
//! be seeded lazily through a grad initializer.

use rand::{prelude::StdRng, Rng, SeedableRng};

use crate::dtypes::Elem;
use crate::tensor::{Error, NdArray, TensorLike};

/// Produces tensor values for a shape chosen by the caller.
pub trait Initializer<T: TensorLike>: std::fmt::Debug {
    fn try_generate(&self, shape: &[usize]) -> Result<T, Error>;

    /// See [Initializer::try_generate]. Panics on failure.
    fn generate(&self, shape: &[usize]) -> T {
        self.try_generate(shape).unwrap()
    }
}

/// Fills every element with one value.
#[derive(Debug, Clone, Copy)]
pub struct Constant(pub f64);

impl<E: Elem> Initializer<NdArray<E>> for Constant {
    fn try_generate(&self, shape: &[usize]) -> Result<NdArray<E>, Error> {
        let fill = E::from_f64(self.0).ok_or_else(|| {
            Error::InvalidInitializer(format!("{} is not representable", self.0))
        })?;
        Ok(NdArray::full(shape, fill))
    }
}

/// Fills every element with NaN.
///
/// The default grad initializer for parameters, matching the convention
/// that an unset gradient reads as NaN rather than zero.
#[derive(Debug, Clone, Copy, Default)]
pub struct Nan;

impl<E: Elem> Initializer<NdArray<E>> for Nan {
    fn try_generate(&self, shape: &[usize]) -> Result<NdArray<E>, Error> {
        Ok(NdArray::full(shape, E::nan()))
    }
}

/// Samples elements from a normal distribution.
#[derive(Debug, Clone, Copy)]
pub struct Normal {
    pub mean: f64,
    pub stddev: f64,
    /// With a seed the draw is deterministic, otherwise the rng is seeded
    /// from entropy.
    pub seed: Option<u64>,
}

impl Normal {
    pub fn new(mean: f64, stddev: f64) -> Self {
        Self {
            mean,
            stddev,
            seed: None,
        }
    }

    pub fn seeded(mean: f64, stddev: f64, seed: u64) -> Self {
        Self {
            mean,
            stddev,
            seed: Some(seed),
        }
    }
}

impl<E: Elem> Initializer<NdArray<E>> for Normal {
    fn try_generate(&self, shape: &[usize]) -> Result<NdArray<E>, Error> {
        if !(self.stddev >= 0.0) {
            return Err(Error::InvalidInitializer(format!(
                "standard deviation must be non-negative, got {}",
                self.stddev
            )));
        }
        let dist = rand_distr::Normal::new(self.mean, self.stddev)
            .map_err(|e| Error::InvalidInitializer(e.to_string()))?;
        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let size = shape.iter().product::<usize>().max(1);
        let data = (0..size)
            .map(|_| {
                E::from_f64(rng.sample(dist)).ok_or_else(|| {
                    Error::InvalidInitializer("sample is not representable".into())
                })
            })
            .collect::<Result<Vec<E>, Error>>()?;
        NdArray::try_from_vec(shape, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::*;

    #[test]
    fn test_constant_fills_shape() {
        let t: NdArray<TestDtype> = Constant(0.5).generate(&[2, 3]);
        assert_eq!(t.shape(), &[2, 3]);
        assert!(t.as_slice().iter().all(|&v| v == 0.5));
    }

    #[test]
    fn test_nan_fill() {
        let t: NdArray<TestDtype> = Nan.generate(&[4]);
        assert!(t.as_slice().iter().all(|v| v.is_nan()));
    }

    #[test]
    fn test_seeded_normal_is_deterministic() {
        let a: NdArray<TestDtype> = Normal::seeded(0.0, 1.0, 7).generate(&[8]);
        let b: NdArray<TestDtype> = Normal::seeded(0.0, 1.0, 7).generate(&[8]);
        assert_eq!(a, b);
        assert_eq!(a.shape(), &[8]);
        // Not all draws land on the mean.
        assert!(a.as_slice().iter().any(|&v| v != 0.0));
    }

    #[test]
    fn test_invalid_stddev_is_an_error() {
        let r: Result<NdArray<TestDtype>, Error> = Normal::new(0.0, -1.0).try_generate(&[2]);
        assert!(matches!(r, Err(Error::InvalidInitializer(_))));
        let r: Result<NdArray<TestDtype>, Error> =
            Normal::new(0.0, f64::NAN).try_generate(&[2]);
        assert!(matches!(r, Err(Error::InvalidInitializer(_))));
    }
}
