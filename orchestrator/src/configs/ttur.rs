//! The two time-scale update rule.

use std::collections::BTreeMap;

use log::{debug, warn};
use serde_json::{Map, Value};

use super::{OptimizerConfig, OptimizersConfig};
use crate::{OrchestratorError, Result};

/// Resolves the per component optimizer configs, applying the rule when it is enabled.
///
/// The slow component's `lr` becomes half the rule's `lr` and the fast one's becomes twice it,
/// overriding whatever they were configured with. Any other component keeps its own rate. When
/// the rule is absent or disabled, the configs are returned as they are.
///
/// # Errors
/// `OrchestratorError::InvalidConfig` if the options of a slow or fast component aren't a JSON
/// object.
pub fn apply_ttur(config: &OptimizersConfig) -> Result<BTreeMap<String, OptimizerConfig>> {
    let mut resolved = config.components.clone();

    let Some(ttur) = config.ttur.as_ref().filter(|ttur| ttur.enabled) else {
        return Ok(resolved);
    };

    for (name, lr) in [(&ttur.slow, ttur.lr / 2.), (&ttur.fast, ttur.lr * 2.)] {
        let Some(optimizer) = resolved.get_mut(name) else {
            warn!(component = name.as_str(); "TTUR names a component without an optimizer");
            continue;
        };

        set_lr(name, optimizer, lr)?;
        debug!(component = name.as_str(), lr = lr; "TTUR learning rate");
    }

    for name in resolved.keys() {
        if *name != ttur.slow && *name != ttur.fast {
            warn!(component = name.as_str(); "TTUR leaves this optimizer at its own learning rate");
        }
    }

    Ok(resolved)
}

fn set_lr(name: &str, optimizer: &mut OptimizerConfig, lr: f32) -> Result<()> {
    let opts = optimizer
        .opts
        .get_or_insert_with(|| Value::Object(Map::new()));

    if opts.is_null() {
        *opts = Value::Object(Map::new());
    }

    let Value::Object(map) = opts else {
        return Err(OrchestratorError::InvalidConfig(format!(
            "options of optimizer `{name}` must be an object"
        )));
    };

    map.insert("lr".to_string(), Value::from(lr));
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::configs::TturConfig;

    fn optimizers(ttur: Option<TturConfig>) -> OptimizersConfig {
        let adam = |lr: f32| OptimizerConfig {
            kind: "Adam".to_string(),
            opts: Some(json!({ "lr": lr, "betas": [0.5, 0.999] })),
        };

        OptimizersConfig {
            ttur,
            components: BTreeMap::from([
                ("gen".to_string(), adam(0.1)),
                ("dis".to_string(), adam(0.3)),
            ]),
        }
    }

    fn ttur(enabled: bool) -> TturConfig {
        TturConfig {
            enabled,
            lr: 0.0002,
            slow: "gen".to_string(),
            fast: "dis".to_string(),
        }
    }

    fn lr(config: &OptimizerConfig) -> f64 {
        config.opts.as_ref().unwrap()["lr"].as_f64().unwrap()
    }

    #[test]
    fn halves_slow_and_doubles_fast() {
        let resolved = apply_ttur(&optimizers(Some(ttur(true)))).unwrap();

        assert_eq!(lr(&resolved["gen"]) as f32, 0.0001);
        assert_eq!(lr(&resolved["dis"]) as f32, 0.0004);
        assert_eq!(
            resolved["gen"].opts.as_ref().unwrap()["betas"],
            json!([0.5, 0.999])
        );
    }

    #[test]
    fn disabled_keeps_configured_rates() {
        let config = optimizers(Some(ttur(false)));
        assert_eq!(apply_ttur(&config).unwrap(), config.components);

        let config = optimizers(None);
        assert_eq!(apply_ttur(&config).unwrap(), config.components);
    }

    #[test]
    fn is_pure() {
        let config = optimizers(Some(ttur(true)));
        let before = config.clone();

        assert_eq!(apply_ttur(&config).unwrap(), apply_ttur(&config).unwrap());
        assert_eq!(config, before);
    }

    #[test]
    fn fills_missing_options() {
        let mut config = optimizers(Some(ttur(true)));
        config.components.get_mut("gen").unwrap().opts = None;

        let resolved = apply_ttur(&config).unwrap();
        assert_eq!(lr(&resolved["gen"]) as f32, 0.0001);
    }

    #[test]
    fn rejects_non_object_options() {
        let mut config = optimizers(Some(ttur(true)));
        config.components.get_mut("dis").unwrap().opts = Some(json!([1, 2]));

        assert!(matches!(
            apply_ttur(&config),
            Err(OrchestratorError::InvalidConfig(_))
        ));
    }
}
