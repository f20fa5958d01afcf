use std::collections::{BTreeMap, BTreeSet};

use ndarray::ArrayD;

use crate::{MlErr, Result};

/// A dense tensor of single precision floats.
pub type Tensor = ArrayD<f32>;

/// The serializable state of a module, keyed by parameter or buffer name.
///
/// Ordered so that iteration (and therefore the *first* key) is deterministic.
pub type StateDict = BTreeMap<String, Tensor>;

/// A trainable parameter and its accumulated gradient.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub value: Tensor,
    pub grad: Tensor,
}

impl Param {
    /// Creates a new `Param` with a zeroed gradient.
    ///
    /// # Arguments
    /// * `value` - The initial value of the parameter.
    ///
    /// # Returns
    /// A new `Param` instance.
    pub fn new(value: Tensor) -> Self {
        let grad = Tensor::zeros(value.raw_dim());
        Self { value, grad }
    }

    /// The amount of scalars held by this parameter.
    pub fn len(&self) -> usize {
        self.value.len()
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    pub fn shape(&self) -> &[usize] {
        self.value.shape()
    }

    pub fn zero_grad(&mut self) {
        self.grad.fill(0.);
    }
}

/// Copies `src` into `dst` after checking both tensors share a shape.
///
/// # Arguments
/// * `key` - The name of the tensor, used for error reporting.
/// * `dst` - The tensor to overwrite.
/// * `src` - The tensor to copy from.
///
/// # Errors
/// `MlErr::ShapeMismatch` if the shapes differ.
pub fn assign_checked(key: &str, dst: &mut Tensor, src: &Tensor) -> Result<()> {
    check_shape(key, src.shape(), dst.shape())?;
    dst.assign(src);
    Ok(())
}

/// Checks that `got` equals `expected`.
///
/// # Errors
/// `MlErr::ShapeMismatch` naming `key` if they differ.
pub fn check_shape(key: &str, got: &[usize], expected: &[usize]) -> Result<()> {
    if got != expected {
        return Err(MlErr::ShapeMismatch {
            key: key.to_string(),
            got: got.to_vec(),
            expected: expected.to_vec(),
        });
    }

    Ok(())
}

/// Verifies that `state` holds exactly the keys in `expected`, nothing more and nothing less.
///
/// # Arguments
/// * `state` - The incoming state dict.
/// * `expected` - The keys the receiving module owns.
///
/// # Errors
/// `MlErr::StateDictMismatch` listing every missing and unexpected key.
pub fn check_keys<'a, I>(state: &StateDict, expected: I) -> Result<()>
where
    I: IntoIterator<Item = &'a str>,
{
    let expected: BTreeSet<&str> = expected.into_iter().collect();
    let got: BTreeSet<&str> = state.keys().map(String::as_str).collect();

    let missing: Vec<String> = expected.difference(&got).map(|k| k.to_string()).collect();
    let unexpected: Vec<String> = got.difference(&expected).map(|k| k.to_string()).collect();

    if missing.is_empty() && unexpected.is_empty() {
        return Ok(());
    }

    Err(MlErr::StateDictMismatch {
        missing,
        unexpected,
    })
}

/// Flattens every tensor into one contiguous buffer, in iteration order.
pub fn flatten<'a, I>(tensors: I) -> Vec<f32>
where
    I: IntoIterator<Item = &'a Tensor>,
{
    tensors.into_iter().flat_map(|t| t.iter().copied()).collect()
}

/// Writes a flat buffer back into the given tensors, in iteration order.
///
/// # Errors
/// `MlErr::SizeMismatch` if the buffer length differs from the total tensor length.
pub fn unflatten<'a, I>(buf: &[f32], tensors: I) -> Result<()>
where
    I: IntoIterator<Item = &'a mut Tensor>,
{
    let mut offset = 0;

    for tensor in tensors {
        let len = tensor.len();
        let chunk = buf.get(offset..offset + len).ok_or(MlErr::SizeMismatch {
            what: "flat buffer",
            got: buf.len(),
            expected: offset + len,
        })?;

        tensor.iter_mut().zip(chunk).for_each(|(t, &v)| *t = v);
        offset += len;
    }

    if offset != buf.len() {
        return Err(MlErr::SizeMismatch {
            what: "flat buffer",
            got: buf.len(),
            expected: offset,
        });
    }

    Ok(())
}
