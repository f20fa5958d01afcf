use std::{fs, path::Path};

use ndarray::{Array1, Array2, Array3, Array4, ArrayD, ArrayView3, Axis, Ix1, Ix4, IxDyn};
use rand::{SeedableRng, rngs::StdRng};
use safetensors::{Dtype, SafeTensors};

use super::PerceptualBackend;
use crate::{MlErr, Result, arch::init::Init, tensor::check_shape};

/// `(in channels, out channels, kernel, stride, padding, weight prefix)` of every convolution.
const CONVS: [(usize, usize, usize, usize, usize, &str); 5] = [
    (3, 64, 11, 4, 2, "features.0"),
    (64, 192, 5, 1, 2, "features.3"),
    (192, 384, 3, 1, 1, "features.6"),
    (384, 256, 3, 1, 1, "features.8"),
    (256, 256, 3, 1, 1, "features.10"),
];

/// Convolutions followed by a 3x3, stride 2 max pool.
const POOLED: [bool; 5] = [true, true, false, false, false];

/// The AlexNet feature stack, tapped after every ReLU.
pub struct AlexNet {
    convs: Vec<Conv2d>,
    heads: Vec<Array1<f32>>,
}

impl AlexNet {
    /// Reads the backbone and the linear heads from a safetensors file.
    ///
    /// Expects `features.{0,3,6,8,10}.{weight,bias}` and `lin{0..4}.model.1.weight`, all `f32`.
    ///
    /// # Errors
    /// If the file can't be read or a tensor is missing, misshaped or of another dtype.
    pub fn from_safetensors<P: AsRef<Path>>(path: P) -> Result<Self> {
        let bytes = fs::read(path)?;
        let tensors = SafeTensors::deserialize(&bytes)?;

        let mut convs = Vec::with_capacity(CONVS.len());
        let mut heads = Vec::with_capacity(CONVS.len());

        for (i, &(cin, cout, k, stride, padding, prefix)) in CONVS.iter().enumerate() {
            let weight = read(&tensors, &format!("{prefix}.weight"), &[cout, cin, k, k])?;
            let bias = read(&tensors, &format!("{prefix}.bias"), &[cout])?;
            let head = read(&tensors, &format!("lin{i}.model.1.weight"), &[1, cout, 1, 1])?;

            convs.push(Conv2d {
                weight: weight.into_dimensionality::<Ix4>()?,
                bias: bias.into_dimensionality::<Ix1>()?,
                stride,
                padding,
            });
            heads.push(head.into_shape_with_order(cout)?);
        }

        Ok(Self { convs, heads })
    }

    /// A randomly initialized backbone with equally weighted channels.
    ///
    /// The distances it yields are uncalibrated, only useful where no pretrained weights exist.
    pub fn seeded(seed: u64) -> Result<Self> {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut convs = Vec::with_capacity(CONVS.len());
        let mut heads = Vec::with_capacity(CONVS.len());

        for &(cin, cout, k, stride, padding, _) in CONVS.iter() {
            let fan_in = cin * k * k;
            let weight = Init::Kaiming.sample(&mut rng, &[cout, cin, k, k], fan_in, cout)?;

            convs.push(Conv2d {
                weight: weight.into_dimensionality::<Ix4>()?,
                bias: Array1::zeros(cout),
                stride,
                padding,
            });
            heads.push(Array1::from_elem(cout, 1. / cout as f32));
        }

        Ok(Self { convs, heads })
    }
}

impl PerceptualBackend for AlexNet {
    fn name(&self) -> &str {
        "alex"
    }

    fn features(&self, image: ArrayView3<f32>) -> Result<Vec<Array3<f32>>> {
        let mut taps = Vec::with_capacity(self.convs.len());
        let mut x = image.to_owned();

        for (conv, pooled) in self.convs.iter().zip(POOLED) {
            let a = conv.forward(x.view())?.mapv(|v| v.max(0.));
            x = if pooled { max_pool(&a, 3, 2)? } else { a.clone() };
            taps.push(a);
        }

        Ok(taps)
    }

    fn heads(&self) -> &[Array1<f32>] {
        &self.heads
    }
}

fn read(tensors: &SafeTensors<'_>, name: &str, shape: &[usize]) -> Result<ArrayD<f32>> {
    let view = tensors.tensor(name)?;
    if view.dtype() != Dtype::F32 {
        return Err(MlErr::InvalidState(format!(
            "`{name}` is {:?}, expected F32",
            view.dtype()
        )));
    }

    check_shape(name, view.shape(), shape)?;
    let data = view
        .data()
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();

    Ok(ArrayD::from_shape_vec(IxDyn(shape), data)?)
}

struct Conv2d {
    weight: Array4<f32>,
    bias: Array1<f32>,
    stride: usize,
    padding: usize,
}

impl Conv2d {
    /// Lowers the convolution to a single matrix product over the unrolled patches.
    fn forward(&self, x: ArrayView3<f32>) -> Result<Array3<f32>> {
        let (c, h, w) = x.dim();
        let (cout, cin, kh, kw) = self.weight.dim();
        let (s, p) = (self.stride, self.padding);

        if c != cin {
            return Err(MlErr::SizeMismatch {
                what: "convolution input channels",
                got: c,
                expected: cin,
            });
        }

        let side = h.min(w) + 2 * p;
        if side < kh {
            return Err(MlErr::SizeMismatch {
                what: "padded feature map side",
                got: side,
                expected: kh,
            });
        }

        let ho = (h + 2 * p - kh) / s + 1;
        let wo = (w + 2 * p - kw) / s + 1;
        let mut cols = Array2::<f32>::zeros((cin * kh * kw, ho * wo));

        for ci in 0..cin {
            for ki in 0..kh {
                for kj in 0..kw {
                    let row = (ci * kh + ki) * kw + kj;
                    for oy in 0..ho {
                        let Some(iy) = (oy * s + ki).checked_sub(p).filter(|&iy| iy < h) else {
                            continue;
                        };
                        for ox in 0..wo {
                            let Some(ix) = (ox * s + kj).checked_sub(p).filter(|&ix| ix < w)
                            else {
                                continue;
                            };
                            cols[[row, oy * wo + ox]] = x[[ci, iy, ix]];
                        }
                    }
                }
            }
        }

        let kernel = self
            .weight
            .view()
            .into_shape_with_order((cout, cin * kh * kw))?;
        let out = kernel.dot(&cols) + &self.bias.view().insert_axis(Axis(1));

        Ok(out.into_shape_with_order((cout, ho, wo))?)
    }
}

fn max_pool(x: &Array3<f32>, k: usize, s: usize) -> Result<Array3<f32>> {
    let (c, h, w) = x.dim();
    if h.min(w) < k {
        return Err(MlErr::SizeMismatch {
            what: "pooled feature map side",
            got: h.min(w),
            expected: k,
        });
    }

    let ho = (h - k) / s + 1;
    let wo = (w - k) / s + 1;

    Ok(Array3::from_shape_fn((c, ho, wo), |(ci, oy, ox)| {
        let window = x.slice(ndarray::s![ci, oy * s..oy * s + k, ox * s..ox * s + k]);
        window.fold(f32::NEG_INFINITY, |m, &v| m.max(v))
    }))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use ndarray::Array3;
    use safetensors::tensor::TensorView;

    use super::*;
    use crate::metrics::{Lpips, Metric};

    #[test]
    fn taps_shapes() {
        let net = AlexNet::seeded(0).unwrap();
        let image = Array3::zeros((3, 32, 32));

        let taps = net.features(image.view()).unwrap();
        let shapes: Vec<_> = taps.iter().map(|t| t.dim()).collect();

        assert_eq!(
            shapes,
            [
                (64, 7, 7),
                (192, 3, 3),
                (384, 1, 1),
                (256, 1, 1),
                (256, 1, 1)
            ]
        );
    }

    #[test]
    fn too_small_fails() {
        let net = AlexNet::seeded(0).unwrap();
        let image = Array3::zeros((3, 16, 16));

        assert!(net.features(image.view()).is_err());
    }

    #[test]
    fn seeded_lpips_separates_images() {
        let lpips = Lpips::new(Box::new(AlexNet::seeded(3).unwrap()));
        let a = Array3::from_shape_fn((3, 32, 32), |(c, y, x)| ((c + y * x) % 7) as f32 / 7.);
        let b = a.mapv(|v| 1. - v);

        assert_eq!(lpips.compute((&a).into(), (&a).into()).unwrap(), 0.);
        assert!(lpips.compute((&a).into(), (&b).into()).unwrap() > 0.);
    }

    #[test]
    fn loads_safetensors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alex.safetensors");

        let mut raw: HashMap<String, (Vec<u8>, Vec<usize>)> = HashMap::new();
        for (i, &(cin, cout, k, _, _, prefix)) in CONVS.iter().enumerate() {
            let w = vec![0.01f32; cout * cin * k * k];
            let b = vec![0f32; cout];
            let lin = vec![1f32; cout];
            raw.insert(format!("{prefix}.weight"), (bytes(&w), vec![cout, cin, k, k]));
            raw.insert(format!("{prefix}.bias"), (bytes(&b), vec![cout]));
            raw.insert(format!("lin{i}.model.1.weight"), (bytes(&lin), vec![1, cout, 1, 1]));
        }

        let views: Vec<(String, TensorView<'_>)> = raw
            .iter()
            .map(|(name, (data, shape))| {
                let view = TensorView::new(Dtype::F32, shape.clone(), data).unwrap();
                (name.clone(), view)
            })
            .collect();
        safetensors::serialize_to_file(views, &None, &path).unwrap();

        let net = AlexNet::from_safetensors(&path).unwrap();
        assert_eq!(net.heads().len(), 5);
        assert!(net.heads().iter().all(|h| h.iter().all(|&w| w == 1.)));
    }

    fn bytes(values: &[f32]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }
}
