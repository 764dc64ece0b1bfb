//! The [TensorLike] contract the graph engine is generic over, the built-in
//! CPU [NdArray] backend, and the crate-wide [Error] type.

mod cpu;
mod error;
mod tensorlike;

pub use cpu::NdArray;
pub use error::Error;
pub use tensorlike::{DataType, TensorLike};
