use ndarray::{Array3, ArrayView3, s};

use crate::{MlErr, Result, tensor::check_shape};

/// An image in one of the two representations metrics accept.
#[derive(Debug, Clone, Copy)]
pub enum Image<'a> {
    /// Raw pixels, `(height, width, channel)` in BGR order, valued in `[0, 255]`.
    Pixels(ArrayView3<'a, u8>),
    /// A normalized tensor, `(channel, height, width)` in RGB order, valued in `[0, 1]`.
    Tensor(ArrayView3<'a, f32>),
}

impl<'a> From<ArrayView3<'a, u8>> for Image<'a> {
    fn from(value: ArrayView3<'a, u8>) -> Self {
        Self::Pixels(value)
    }
}

impl<'a> From<&'a Array3<u8>> for Image<'a> {
    fn from(value: &'a Array3<u8>) -> Self {
        Self::Pixels(value.view())
    }
}

impl<'a> From<ArrayView3<'a, f32>> for Image<'a> {
    fn from(value: ArrayView3<'a, f32>) -> Self {
        Self::Tensor(value)
    }
}

impl<'a> From<&'a Array3<f32>> for Image<'a> {
    fn from(value: &'a Array3<f32>) -> Self {
        Self::Tensor(value.view())
    }
}

impl Image<'_> {
    /// The image as an RGB `(channel, height, width)` tensor valued in `[-1, 1]`.
    ///
    /// Pixels are reordered from BGR and mapped by `v / 127.5 - 1`, tensors by `2v - 1`.
    pub fn to_signed(&self) -> Array3<f32> {
        match self {
            Image::Pixels(px) => rgb_chw(*px).mapv(|v| v as f32 / 127.5 - 1.),
            Image::Tensor(t) => t.mapv(|v| 2. * v - 1.),
        }
    }

    /// The image as an RGB `(channel, height, width)` tensor valued in `[0, 1]`.
    pub fn to_unit(&self) -> Array3<f32> {
        match self {
            Image::Pixels(px) => rgb_chw(*px).mapv(|v| v as f32 / 255.),
            Image::Tensor(t) => t.to_owned(),
        }
    }

    fn is_pixels(&self) -> bool {
        matches!(self, Image::Pixels(_))
    }
}

fn rgb_chw(px: ArrayView3<'_, u8>) -> ArrayView3<'_, u8> {
    px.slice_move(s![.., .., ..;-1]).permuted_axes([2, 0, 1])
}

/// Converts both images with `convert` after checking they are comparable.
///
/// # Errors
/// `MlErr::RepresentationMismatch` if one image is pixels and the other a tensor,
/// `MlErr::ShapeMismatch` if their shapes differ and `MlErr::EmptyInput` if they are empty.
pub(super) fn pair<F>(
    reference: &Image<'_>,
    candidate: &Image<'_>,
    convert: F,
) -> Result<(Array3<f32>, Array3<f32>)>
where
    F: Fn(&Image<'_>) -> Array3<f32>,
{
    if reference.is_pixels() != candidate.is_pixels() {
        return Err(MlErr::RepresentationMismatch);
    }

    let a = convert(reference);
    let b = convert(candidate);
    check_shape("candidate image", b.shape(), a.shape())?;

    if a.is_empty() {
        return Err(MlErr::EmptyInput("image"));
    }

    Ok((a, b))
}
