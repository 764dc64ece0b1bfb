//! # retrograd
//!
//! retrograd is a define-by-run reverse-mode automatic differentiation
//! engine written entirely in rust!
//!
//! There is no separate graph-building phase: running ordinary forward
//! computations on [`variable::Variable`]s records the computational graph
//! as a side effect, and calling [`variable::Variable::backward`] walks that
//! graph in reverse to fill in gradients.
//!
//! # Variables & gradients
//!
//! *See [variable] for more information.*
//!
//! ```rust
//! use retrograd::prelude::*;
//!
//! let x = Variable::new(NdArray::from_vec(&[1], vec![2.0f64]));
//! let y = &x * &x;
//! y.backward().unwrap();
//! assert_eq!(x.grad().unwrap().as_slice(), &[4.0]);
//! ```
//!
//! Gradients accumulate across backward passes until you call
//! [`variable::Variable::cleargrad`], which is what lets one leaf feed many
//! losses. Variables created with [`variable::Variable::constant`] never
//! require gradients and never extend the graph.
//!
//! # Functions
//!
//! *See [function] and [functions] for more information.*
//!
//! Every differentiable operation implements [`function::Function`]. The
//! catalog in [functions] backs the arithmetic operators on `&Variable`,
//! and user-defined functions plug into the engine through
//! [`function::apply`] exactly the same way.
//!
//! # Truncated backpropagation
//!
//! *See [`variable::Variable::unchain_backward`].*
//!
//! Recurrent computations can cut the recorded graph at a window boundary
//! with `unchain_backward`, so a later backward pass stops there instead of
//! walking the entire history.
//!
//! # Parameters & serialization
//!
//! *See [parameter], [initializers], and [serializers].*
//!
//! [`parameter::Parameter`] is a variable with deferred, shape-driven
//! initialization and an attached update rule. Parameters round-trip
//! through the [safetensors](https://docs.rs/safetensors) format.

pub mod config;
pub mod dtypes;
pub mod function;
pub mod functions;
pub mod initializers;
pub mod parameter;
pub mod report;
pub mod serializers;
pub mod tensor;
pub mod variable;

/// Contains everything you need for most use cases.
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::dtypes::{Dtype, Elem};
    pub use crate::function::{apply, apply_single, apply_with_config, Function};
    pub use crate::initializers::Initializer;
    pub use crate::parameter::{Parameter, UpdateRule};
    pub use crate::report::{Observation, Reporter, Summary};
    pub use crate::serializers::Serializer;
    pub use crate::tensor::{DataType, Error, NdArray, TensorLike};
    pub use crate::variable::Variable;
}
