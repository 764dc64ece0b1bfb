use crate::dtypes::Dtype;

/// Represents the different errors that can occur while building the
/// computation graph, running a backward traversal, or creating arrays.
///
/// None of these are retried internally. Gradient checks and arity checks
/// surface the defect immediately with the offending shapes/dtypes; recovery
/// is strictly the caller's responsibility.
#[non_exhaustive]
#[derive(Debug)]
pub enum Error {
    /// A gradient's dtype disagreed with the dtype recorded for the data.
    TypeMismatch { expected: Dtype, found: Dtype },
    /// A gradient's shape disagreed with the shape recorded for the data.
    /// 0-d and single-element arrays are treated as compatible.
    ShapeMismatch {
        expected: Vec<usize>,
        found: Vec<usize>,
    },
    /// A function's backward returned a gradient sequence whose length
    /// differs from its input count. Defect in the function implementation.
    ArityMismatch { expected: usize, found: usize },
    /// An operation required data, but the variable's data was unset.
    NoData,
    /// Not enough elements were provided when creating an array.
    WrongNumElements,
    /// An initializer was constructed with invalid parameters, or a lazy
    /// parameter without an initializer was asked to materialize.
    InvalidInitializer(String),

    #[cfg(feature = "safetensors")]
    SafeTensors(safetensors::SafeTensorError),

    #[cfg(feature = "safetensors")]
    UnsupportedDtype(safetensors::Dtype),

    #[cfg(feature = "safetensors")]
    Io(std::io::Error),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

impl std::error::Error for Error {}

#[cfg(feature = "safetensors")]
impl From<safetensors::SafeTensorError> for Error {
    fn from(e: safetensors::SafeTensorError) -> Self {
        Self::SafeTensors(e)
    }
}

#[cfg(feature = "safetensors")]
impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}
