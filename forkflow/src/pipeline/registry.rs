//! Registry of named forks attached to one pipeline.

use crate::errors::ArgumentError;
use crate::stages::SharedStage;
use std::collections::HashMap;

/// The stages configured for one fork.
pub(crate) struct ForkDefinition<T> {
    pub(crate) name: String,
    pub(crate) stages: Vec<SharedStage<T>>,
}

impl<T: Send + 'static> ForkDefinition<T> {
    /// Returns the configured stage names.
    pub(crate) fn stage_names(&self) -> Vec<String> {
        self.stages.iter().map(|s| s.name().to_string()).collect()
    }
}

/// Owns the named forks of a pipeline.
///
/// The registry itself does not know whether the pipeline is sealed; the
/// engine checks that before every mutation.
pub(crate) struct ForkRegistry<T> {
    /// Fork definitions keyed by name.
    forks: HashMap<String, ForkDefinition<T>>,
    /// Registration order, used for stable observer output.
    fork_order: Vec<String>,
}

impl<T> Default for ForkRegistry<T> {
    fn default() -> Self {
        Self {
            forks: HashMap::new(),
            fork_order: Vec::new(),
        }
    }
}

impl<T: Send + 'static> ForkRegistry<T> {
    /// Creates an empty registry.
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Registers a new fork.
    ///
    /// Duplicate names are rejected and leave the existing fork untouched.
    pub(crate) fn register(
        &mut self,
        name: String,
        stages: Vec<SharedStage<T>>,
    ) -> Result<(), ArgumentError> {
        if self.forks.contains_key(&name) {
            return Err(ArgumentError::duplicate_fork(name));
        }
        self.fork_order.push(name.clone());
        self.forks.insert(name.clone(), ForkDefinition { name, stages });
        Ok(())
    }

    /// Appends stages to an existing fork.
    pub(crate) fn extend(
        &mut self,
        name: &str,
        stages: Vec<SharedStage<T>>,
    ) -> Result<(), ArgumentError> {
        let fork = self
            .forks
            .get_mut(name)
            .ok_or_else(|| ArgumentError::unknown_fork(name))?;
        fork.stages.extend(stages);
        Ok(())
    }

    /// Returns true if a fork with this name exists.
    pub(crate) fn contains(&self, name: &str) -> bool {
        self.forks.contains_key(name)
    }

    /// Returns fork names in registration order.
    pub(crate) fn names(&self) -> &[String] {
        &self.fork_order
    }

    /// Iterates over forks in registration order.
    pub(crate) fn iter(&self) -> impl Iterator<Item = &ForkDefinition<T>> {
        self.fork_order.iter().filter_map(|name| self.forks.get(name))
    }

    /// Consumes the registry, yielding forks in registration order.
    pub(crate) fn into_ordered(mut self) -> Vec<ForkDefinition<T>> {
        self.fork_order
            .iter()
            .filter_map(|name| self.forks.remove(name))
            .collect()
    }
}
