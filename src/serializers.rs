//! Moving parameter data in and out of the process.
//!
//! A [Serializer] is a sink or source keyed by parameter name. Saving and
//! loading are the same call from a parameter's point of view: it hands its
//! current data over under a key and stores whatever comes back. See
//! [Parameter::serialize](crate::parameter::Parameter::serialize).
//!
//! The concrete implementations here target the
//! [safetensors](https://docs.rs/safetensors) format and are gated behind
//! the default `safetensors` feature.

use crate::tensor::{Error, TensorLike};

/// Exchanges one keyed tensor per call.
///
/// Savers record `value` and return it unchanged. Loaders ignore `value`
/// and return the stored tensor for `key`.
pub trait Serializer<T: TensorLike> {
    fn call(&mut self, key: &str, value: Option<T>) -> Result<Option<T>, Error>;
}

#[cfg(feature = "safetensors")]
pub use self::st::{SafeTensorsLoader, SafeTensorsSaver};

#[cfg(feature = "safetensors")]
mod st {
    use std::path::{Path, PathBuf};

    use super::Serializer;
    use crate::dtypes::Elem;
    use crate::tensor::{Error, NdArray, TensorLike};

    /// Element types with a safetensors wire representation.
    pub trait SafeTensorsElem: Elem {
        const ST_DTYPE: safetensors::Dtype;
        const NUM_BYTES: usize;
        fn write_le_bytes(self, out: &mut Vec<u8>);
        fn read_le_bytes(bytes: &[u8]) -> Self;
    }

    impl SafeTensorsElem for f32 {
        const ST_DTYPE: safetensors::Dtype = safetensors::Dtype::F32;
        const NUM_BYTES: usize = 4;
        fn write_le_bytes(self, out: &mut Vec<u8>) {
            out.extend_from_slice(&self.to_le_bytes());
        }
        fn read_le_bytes(bytes: &[u8]) -> Self {
            Self::from_le_bytes(bytes.try_into().unwrap())
        }
    }

    impl SafeTensorsElem for f64 {
        const ST_DTYPE: safetensors::Dtype = safetensors::Dtype::F64;
        const NUM_BYTES: usize = 8;
        fn write_le_bytes(self, out: &mut Vec<u8>) {
            out.extend_from_slice(&self.to_le_bytes());
        }
        fn read_le_bytes(bytes: &[u8]) -> Self {
            Self::from_le_bytes(bytes.try_into().unwrap())
        }
    }

    /// Collects keyed tensors, then writes them as one safetensors file.
    #[derive(Debug, Default)]
    pub struct SafeTensorsSaver {
        entries: Vec<(String, safetensors::Dtype, Vec<usize>, Vec<u8>)>,
    }

    impl SafeTensorsSaver {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), Error> {
            let views = self
                .entries
                .iter()
                .map(|(k, dtype, shape, data)| {
                    let view =
                        safetensors::tensor::TensorView::new(dtype.clone(), shape.clone(), data)?;
                    Ok((k.clone(), view))
                })
                .collect::<Result<Vec<_>, safetensors::SafeTensorError>>()?;
            let data = views.iter().map(|i| (i.0.clone(), &i.1)).collect::<Vec<_>>();
            safetensors::serialize_to_file(data, &None, path.as_ref())?;
            Ok(())
        }
    }

    impl<E: SafeTensorsElem> Serializer<NdArray<E>> for SafeTensorsSaver {
        fn call(&mut self, key: &str, value: Option<NdArray<E>>) -> Result<Option<NdArray<E>>, Error> {
            let Some(value) = value else {
                return Ok(None);
            };
            let mut bytes = Vec::with_capacity(value.size() * E::NUM_BYTES);
            for &v in value.as_slice() {
                v.write_le_bytes(&mut bytes);
            }
            self.entries
                .push((key.to_string(), E::ST_DTYPE, value.shape().to_vec(), bytes));
            Ok(Some(value))
        }
    }

    /// Reads keyed tensors back out of a safetensors file.
    ///
    /// The file is memory mapped per lookup, so the loader holds no borrow
    /// between calls.
    #[derive(Debug)]
    pub struct SafeTensorsLoader {
        path: PathBuf,
    }

    impl SafeTensorsLoader {
        pub fn new<P: AsRef<Path>>(path: P) -> Self {
            Self {
                path: path.as_ref().to_path_buf(),
            }
        }
    }

    impl<E: SafeTensorsElem> Serializer<NdArray<E>> for SafeTensorsLoader {
        fn call(&mut self, key: &str, _value: Option<NdArray<E>>) -> Result<Option<NdArray<E>>, Error> {
            let f = std::fs::File::open(&self.path)?;
            let buffer = unsafe { memmap2::MmapOptions::new().map(&f)? };
            let tensors = safetensors::SafeTensors::deserialize(&buffer)?;
            let view = tensors.tensor(key)?;
            if view.dtype() != E::ST_DTYPE {
                return Err(Error::UnsupportedDtype(view.dtype()));
            }
            let raw = view.data();
            let data = raw
                .chunks_exact(E::NUM_BYTES)
                .map(E::read_le_bytes)
                .collect::<Vec<E>>();
            Ok(Some(NdArray::try_from_vec(view.shape(), data)?))
        }
    }
}
