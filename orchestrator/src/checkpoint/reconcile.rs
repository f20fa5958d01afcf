use distributed::PREFIX;
use log::debug;
use machine_learning::StateDict;
use serde::{Deserialize, Serialize};

use crate::{OrchestratorError, Result};

/// How a saved module state is judged to come from a wrapped module.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrefixDetection {
    /// Only the first key, in key order, is looked at.
    FirstKey,
    /// Every key must agree, a state mixing both forms is rejected.
    #[default]
    Uniform,
}

/// What has to happen to the keys of a saved state before loading it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Remap {
    AsIs,
    /// Drop the wrapper prefix.
    Strip,
    /// Add the wrapper prefix.
    Add,
}

impl Remap {
    /// # Arguments
    /// * `saved_wrapped` - Whether the saved keys carry the wrapper prefix.
    /// * `is_distributed` - Whether the live module is wrapped.
    pub fn between(saved_wrapped: bool, is_distributed: bool) -> Self {
        match (saved_wrapped, is_distributed) {
            (true, false) => Remap::Strip,
            (false, true) => Remap::Add,
            _ => Remap::AsIs,
        }
    }

    fn apply(self, state: StateDict) -> StateDict {
        match self {
            Remap::AsIs => state,
            Remap::Strip => state
                .into_iter()
                .map(|(k, v)| match k.strip_prefix(PREFIX) {
                    Some(bare) => (bare.to_string(), v),
                    None => (k, v),
                })
                .collect(),
            Remap::Add => state
                .into_iter()
                .map(|(k, v)| (format!("{PREFIX}{k}"), v))
                .collect(),
        }
    }
}

/// Rewrites the keys of a saved module state so they match a live module that is, or isn't,
/// wrapped for distributed training.
///
/// An empty state is returned as is.
///
/// # Arguments
/// * `item` - The checkpoint item the state was read from, for reporting.
/// * `state` - The saved state.
/// * `is_distributed` - Whether the live module is wrapped.
/// * `detection` - How to tell whether the saved state comes from a wrapped module.
///
/// # Errors
/// `OrchestratorError::MixedPrefixes` if `detection` is `Uniform` and the keys disagree.
pub fn reconcile(
    item: &str,
    state: StateDict,
    is_distributed: bool,
    detection: PrefixDetection,
) -> Result<StateDict> {
    let saved_wrapped = match detection {
        PrefixDetection::FirstKey => state.keys().next().is_some_and(|k| k.starts_with(PREFIX)),
        PrefixDetection::Uniform => {
            let prefixed = state.keys().filter(|k| k.starts_with(PREFIX)).count();
            let bare = state.len() - prefixed;

            if prefixed > 0 && bare > 0 {
                return Err(OrchestratorError::MixedPrefixes {
                    item: item.to_string(),
                    prefixed,
                    bare,
                });
            }

            prefixed > 0
        }
    };

    let remap = Remap::between(saved_wrapped, is_distributed);
    debug!(item = item, saved_wrapped = saved_wrapped, is_distributed = is_distributed; "{remap:?}");

    Ok(remap.apply(state))
}
