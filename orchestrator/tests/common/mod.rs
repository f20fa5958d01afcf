#![allow(dead_code)]

use std::{collections::BTreeMap, sync::Arc};

use distributed::LocalGroup;
use machine_learning::device::{Device, FixedDevice};
use ndarray::Array2;
use orchestrator::{
    Algorithm, SequentialConstructor,
    configs::{OptimizersConfig, SchedulerConfig},
};
use serde_json::{Value, json};

pub fn model_options(gen_width: usize) -> Value {
    json!({
        "modules": {
            "gen": {
                "seed": 1,
                "layers": [
                    { "type": "dense", "dim": [2, gen_width], "act_fn": { "type": "relu" } },
                    { "type": "batch_norm", "features": gen_width },
                    { "type": "dense", "dim": [gen_width, 2] }
                ]
            },
            "dis": {
                "seed": 2,
                "layers": [
                    { "type": "dense", "dim": [2, 4], "act_fn": { "type": "leaky_relu", "slope": 0.2 } },
                    { "type": "dropout", "p": 0.5 },
                    { "type": "dense", "dim": [4, 1] }
                ]
            }
        }
    })
}

pub fn optimizers() -> OptimizersConfig {
    serde_json::from_value(json!({
        "gen": { "type": "Adam", "opts": { "lr": 0.01 } },
        "dis": { "type": "Adam", "opts": { "lr": 0.01 } }
    }))
    .unwrap()
}

pub fn schedulers() -> BTreeMap<String, SchedulerConfig> {
    serde_json::from_value(json!({
        "gen": { "type": "StepLR", "opts": { "step_size": 1, "gamma": 0.5 } },
        "dis": { "type": "ExponentialLR", "opts": { "gamma": 0.9 } }
    }))
    .unwrap()
}

pub fn single_device() -> Algorithm {
    Algorithm::single_device(&FixedDevice(Device::Cpu))
}

/// An algorithm wrapped over a group of a single rank.
pub fn wrapped() -> Algorithm {
    let group = LocalGroup::new_group(1).remove(0);
    Algorithm::distributed(&FixedDevice(Device::Cpu), Some(Arc::new(group)))
}

/// Creates the model, optimizers and schedulers.
pub fn build(algorithm: &mut Algorithm, gen_width: usize) {
    algorithm
        .create_model(&SequentialConstructor, true, &model_options(gen_width))
        .unwrap();
    let params = algorithm.param_groups();
    algorithm.create_optimizers(&params, &optimizers()).unwrap();
    algorithm.create_schedulers(&schedulers()).unwrap();
}

/// Moves every parameter, optimizer and scheduler away from its initial state.
pub fn train_step(algorithm: &mut Algorithm) {
    let x = Array2::from_shape_fn((4, 2), |(i, j)| (i + 2 * j) as f32 / 4.);

    for name in ["gen", "dis"] {
        let module = algorithm.module_mut(name).unwrap();
        let y = module.forward(x.view()).unwrap();
        module
            .backward(Array2::<f32>::ones(y.raw_dim()).view())
            .unwrap();
        algorithm.step_optimizer(name).unwrap();
    }

    algorithm.update_learning_rates().unwrap();
}
