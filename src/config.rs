//! Explicit per-call engine configuration.
//!
//! Instead of an ambient, globally mutable training-mode flag, callers pass
//! a [Config] value to the pieces that care: graph construction via
//! [apply_with_config](crate::function::apply_with_config), and any
//! [Function](crate::function::Function) whose statistics differ between
//! training and evaluation (such functions take a [Config] at construction).
//! This keeps the engine reentrant and testable in isolation.

/// Engine configuration for one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Whether functions should use training-time behavior.
    pub train: bool,
    /// Whether function applications build graph edges. With this off,
    /// forward results are produced as plain leaves.
    pub enable_backprop: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            train: true,
            enable_backprop: true,
        }
    }
}

impl Config {
    /// Evaluation mode: no training-time behavior, no graph construction.
    pub fn eval() -> Self {
        Self {
            train: false,
            enable_backprop: false,
        }
    }

    /// Training-time numerics without graph construction.
    pub fn no_backprop() -> Self {
        Self {
            train: true,
            enable_backprop: false,
        }
    }
}
