use machine_learning::arch::{
    Module, Sequential,
    activations::ActFn,
    init::Init,
    layers::{Activation, BatchNorm, Dense, Dropout, Layer},
};
use rand::{SeedableRng, rngs::StdRng};
use serde::Deserialize;
use serde_json::Value;

use crate::{
    bundle::Bundle,
    configs::{ActFnConfig, InitConfig, LayerConfig, ModelConfig, SequentialConfig},
    error::ConstructionError,
};

/// The named modules of a model, plus whatever notes its constructor wants printed with it.
#[derive(Default)]
pub struct Model {
    pub modules: Bundle<Box<dyn Module>>,
    pub notes: Vec<String>,
}

impl Model {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_module<M: Module + 'static>(mut self, name: &str, module: M) -> Self {
        self.modules.insert(name, Box::new(module));
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }
}

/// Builds a model from its JSON options.
pub trait ModelConstructor {
    /// # Arguments
    /// * `is_training` - Whether the model is built to be trained or only evaluated.
    /// * `options` - The model section of the configuration, as is.
    fn construct(&self, is_training: bool, options: &Value) -> Result<Model, ConstructionError>;
}

impl<F> ModelConstructor for F
where
    F: Fn(bool, &Value) -> Result<Model, ConstructionError>,
{
    fn construct(&self, is_training: bool, options: &Value) -> Result<Model, ConstructionError> {
        self(is_training, options)
    }
}

/// Builds one `Sequential` per entry of a [`ModelConfig`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SequentialConstructor;

impl ModelConstructor for SequentialConstructor {
    fn construct(&self, is_training: bool, options: &Value) -> Result<Model, ConstructionError> {
        let config = ModelConfig::deserialize(options)?;

        if config.modules.is_empty() {
            return Err("the model has no modules".into());
        }

        let mut model = Model::new();
        for (name, module) in &config.modules {
            let mut sequential = build_sequential(module)?;
            sequential.set_training(is_training);

            model = model
                .with_note(format!("{name}: {} layer(s)", module.layers.len()))
                .with_module(name, sequential);
        }

        Ok(model)
    }
}

fn build_sequential(config: &SequentialConfig) -> Result<Sequential, ConstructionError> {
    let mut rng = StdRng::seed_from_u64(config.seed);

    let layers = config
        .layers
        .iter()
        .enumerate()
        .map(|(i, layer)| build_layer(layer, config.seed.wrapping_add(i as u64), &mut rng))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Sequential::new(layers))
}

fn build_layer(
    config: &LayerConfig,
    seed: u64,
    rng: &mut StdRng,
) -> Result<Layer, ConstructionError> {
    let layer = match *config {
        LayerConfig::Dense { dim, init, act_fn } => {
            Layer::Dense(Dense::new(dim, act_fn.map(act_fn_of), init_of(init), rng)?)
        }
        LayerConfig::BatchNorm {
            features,
            eps,
            momentum,
        } => Layer::BatchNorm(BatchNorm::new(features, eps, momentum)),
        LayerConfig::Dropout { p } => Layer::Dropout(Dropout::new(p, seed)),
        LayerConfig::Activation { act_fn } => Layer::Activation(Activation::new(act_fn_of(act_fn))),
    };

    Ok(layer)
}

fn act_fn_of(config: ActFnConfig) -> ActFn {
    match config {
        ActFnConfig::Sigmoid { amp } => ActFn::sigmoid(amp),
        ActFnConfig::Relu => ActFn::Relu,
        ActFnConfig::LeakyRelu { slope } => ActFn::leaky_relu(slope),
        ActFnConfig::Tanh => ActFn::Tanh,
    }
}

fn init_of(config: InitConfig) -> Init {
    match config {
        InitConfig::Const { value } => Init::Const { value },
        InitConfig::Uniform { low, high } => Init::Uniform { low, high },
        InitConfig::Normal { mean, std_dev } => Init::Normal { mean, std_dev },
        InitConfig::XavierUniform => Init::XavierUniform,
        InitConfig::Xavier => Init::Xavier,
        InitConfig::Kaiming => Init::Kaiming,
        InitConfig::LecunUniform => Init::LecunUniform,
        InitConfig::Lecun => Init::Lecun,
    }
}
