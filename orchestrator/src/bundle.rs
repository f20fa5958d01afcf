use std::collections::{BTreeMap, btree_map};

use machine_learning::{
    arch::{Module, loss::LossFn},
    metrics::Metric,
    optimization::{Optimizer, scheduler::Scheduler},
};

/// Components keyed by name, iterated in name order.
pub struct Bundle<T> {
    entries: BTreeMap<String, T>,
}

impl<T> Default for Bundle<T> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }
}

impl<T> Bundle<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `value` under `name`, returning whatever was there before.
    pub fn insert(&mut self, name: impl Into<String>, value: T) -> Option<T> {
        self.entries.insert(name.into(), value)
    }

    pub fn get(&self, name: &str) -> Option<&T> {
        self.entries.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut T> {
        self.entries.get_mut(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &T)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&str, &mut T)> {
        self.entries.iter_mut().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T> FromIterator<(String, T)> for Bundle<T> {
    fn from_iter<I: IntoIterator<Item = (String, T)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl<T> IntoIterator for Bundle<T> {
    type Item = (String, T);
    type IntoIter = btree_map::IntoIter<String, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// A loss function and the weight its value and gradient are scaled by.
pub struct WeightedLoss {
    pub weight: f32,
    pub loss: Box<dyn LossFn>,
}

/// A reporting metric and the unit its score is printed with.
pub struct Criterion {
    pub metric: Box<dyn Metric>,
    pub unit: String,
}

pub type ModuleBundle = Bundle<Box<dyn Module>>;
pub type LossBundle = Bundle<WeightedLoss>;
pub type OptimizerBundle = Bundle<Box<dyn Optimizer>>;
/// Schedulers share their name with the optimizer they drive.
pub type SchedulerBundle = Bundle<Box<dyn Scheduler>>;
pub type CriterionBundle = Bundle<Criterion>;
