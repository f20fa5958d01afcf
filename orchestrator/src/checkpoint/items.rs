use std::fmt;

const MODULE: &str = "module_";
const OPTIMIZER: &str = "optim_";
const SCHEDULER: &str = "sched_";

/// A checkpoint item name, split into the kind of component and the component's name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemName<'a> {
    Module(&'a str),
    Optimizer(&'a str),
    Scheduler(&'a str),
}

impl<'a> ItemName<'a> {
    /// Splits `item` on its kind prefix.
    ///
    /// # Returns
    /// `None` if `item` has none of the known prefixes or nothing after it.
    pub fn parse(item: &'a str) -> Option<Self> {
        let parsed = if let Some(name) = item.strip_prefix(MODULE) {
            Self::Module(name)
        } else if let Some(name) = item.strip_prefix(OPTIMIZER) {
            Self::Optimizer(name)
        } else if let Some(name) = item.strip_prefix(SCHEDULER) {
            Self::Scheduler(name)
        } else {
            return None;
        };

        (!parsed.component().is_empty()).then_some(parsed)
    }

    /// The name of the component this item belongs to.
    pub fn component(&self) -> &'a str {
        match *self {
            Self::Module(name) | Self::Optimizer(name) | Self::Scheduler(name) => name,
        }
    }
}

impl fmt::Display for ItemName<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Module(name) => write!(f, "{MODULE}{name}"),
            Self::Optimizer(name) => write!(f, "{OPTIMIZER}{name}"),
            Self::Scheduler(name) => write!(f, "{SCHEDULER}{name}"),
        }
    }
}
