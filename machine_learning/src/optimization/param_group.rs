use crate::{MlErr, Param, Result, Tensor, arch::Module, tensor::check_shape};

/// The shapes of the parameters an optimizer is built for, in module order.
///
/// Optimizer state is addressed by position in this group, never by parameter name, so it can be
/// moved between a wrapped and an unwrapped module.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParamGroup {
    shapes: Vec<Vec<usize>>,
}

impl ParamGroup {
    pub fn new(shapes: Vec<Vec<usize>>) -> Self {
        Self { shapes }
    }

    /// The parameter group of every parameter in `module`.
    pub fn of<M: Module + ?Sized>(module: &M) -> Self {
        let shapes = module
            .named_params()
            .into_iter()
            .map(|(_, p)| p.shape().to_vec())
            .collect();

        Self { shapes }
    }

    pub fn len(&self) -> usize {
        self.shapes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }

    /// A zeroed tensor per parameter, the usual starting point of optimizer buffers.
    pub fn zeros(&self) -> Vec<Tensor> {
        self.shapes
            .iter()
            .map(|shape| Tensor::zeros(shape.as_slice()))
            .collect()
    }

    /// Checks that `params` matches this group, one to one.
    ///
    /// # Errors
    /// `MlErr::SizeMismatch` if the amount of parameters differs, `MlErr::ShapeMismatch` if any
    /// shape does.
    pub fn check(&self, params: &[(String, &mut Param)]) -> Result<()> {
        if params.len() != self.shapes.len() {
            return Err(MlErr::SizeMismatch {
                what: "optimizer parameters",
                got: params.len(),
                expected: self.shapes.len(),
            });
        }

        for ((name, param), shape) in params.iter().zip(&self.shapes) {
            check_shape(name, param.shape(), shape)?;
        }

        Ok(())
    }

    /// Checks that `buffers` could have been allocated by this group.
    pub(super) fn check_buffers(&self, what: &str, buffers: &[Tensor]) -> Result<()> {
        if buffers.len() != self.shapes.len() {
            return Err(MlErr::InvalidState(format!(
                "`{what}` holds {} tensors but the optimizer has {} parameters",
                buffers.len(),
                self.shapes.len()
            )));
        }

        for (i, (buffer, shape)) in buffers.iter().zip(&self.shapes).enumerate() {
            check_shape(&format!("{what}[{i}]"), buffer.shape(), shape)?;
        }

        Ok(())
    }
}
