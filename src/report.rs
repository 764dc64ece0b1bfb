//! Lightweight collection of named training observations.
//!
//! A [Reporter] gathers per-iteration values (losses, metrics) under string
//! keys, and [Summary] folds scalar streams into mean/std statistics across
//! iterations. Neither touches the autodiff graph: report the float out of
//! a loss variable's data, not the variable itself.

use std::collections::BTreeMap;

use crate::tensor::TensorLike;

/// One reported value.
#[derive(Debug, Clone, PartialEq)]
pub enum Observation<T> {
    Scalar(f64),
    Array(T),
}

/// Collects keyed observations for the current iteration.
#[derive(Debug, Default)]
pub struct Reporter<T: TensorLike> {
    observations: BTreeMap<String, Observation<T>>,
}

impl<T: TensorLike> Reporter<T> {
    pub fn new() -> Self {
        Self {
            observations: BTreeMap::new(),
        }
    }

    pub fn report_scalar(&mut self, key: &str, value: f64) {
        self.observations
            .insert(key.to_string(), Observation::Scalar(value));
    }

    pub fn report_array(&mut self, key: &str, value: T) {
        self.observations
            .insert(key.to_string(), Observation::Array(value));
    }

    pub fn get(&self, key: &str) -> Option<&Observation<T>> {
        self.observations.get(key)
    }

    pub fn observations(&self) -> &BTreeMap<String, Observation<T>> {
        &self.observations
    }

    /// Drop everything, typically at the start of an iteration.
    pub fn clear(&mut self) {
        self.observations.clear();
    }
}

/// Online mean and standard deviation of a scalar stream.
#[derive(Debug, Default, Clone, Copy)]
pub struct Summary {
    n: usize,
    sum: f64,
    sum_sq: f64,
}

impl Summary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, value: f64) {
        self.n += 1;
        self.sum += value;
        self.sum_sq += value * value;
    }

    pub fn count(&self) -> usize {
        self.n
    }

    pub fn mean(&self) -> Option<f64> {
        (self.n > 0).then(|| self.sum / self.n as f64)
    }

    /// Population standard deviation.
    pub fn std(&self) -> Option<f64> {
        let mean = self.mean()?;
        let var = (self.sum_sq / self.n as f64 - mean * mean).max(0.0);
        Some(var.sqrt())
    }
}
