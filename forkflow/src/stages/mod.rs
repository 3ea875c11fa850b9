//! Stage trait and implementations.
//!
//! Stages are the units of processing chained inside the base chain and
//! inside every fork. A stage consumes one item at a time and may emit zero
//! or more items downstream.

use async_trait::async_trait;
use std::fmt::Debug;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

/// Trait for pipeline stages.
///
/// The engine calls [`Stage::process`] once per upstream item, in upstream
/// order, and [`Stage::finish`] exactly once after the upstream is
/// exhausted. Returning an error from either reports the stage as failed.
#[async_trait]
pub trait Stage<T: Send + 'static>: Send + Sync + Debug {
    /// Returns the name of the stage.
    fn name(&self) -> &str;

    /// Processes one item, returning the items to pass downstream.
    async fn process(&self, item: T) -> anyhow::Result<Vec<T>>;

    /// Called once the upstream is exhausted.
    ///
    /// Stages that buffer items flush them here.
    async fn finish(&self) -> anyhow::Result<Vec<T>> {
        Ok(Vec::new())
    }
}

/// A stage shared between the topology and its running task.
pub type SharedStage<T> = Arc<dyn Stage<T>>;

/// Wraps a stage for use with the pipeline builder methods.
pub fn shared<T, S>(stage: S) -> SharedStage<T>
where
    T: Send + 'static,
    S: Stage<T> + 'static,
{
    Arc::new(stage)
}

/// A simple function-based stage.
pub struct FnStage<F> {
    name: String,
    func: F,
}

impl<F> FnStage<F> {
    /// Creates a new function-based stage.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F> Debug for FnStage<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnStage")
            .field("name", &self.name)
            .finish()
    }
}

#[async_trait]
impl<T, F> Stage<T> for FnStage<F>
where
    T: Send + 'static,
    F: Fn(T) -> anyhow::Result<Vec<T>> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn process(&self, item: T) -> anyhow::Result<Vec<T>> {
        (self.func)(item)
    }
}

/// An async function-based stage.
pub struct AsyncFnStage<F, Fut> {
    name: String,
    func: F,
    _phantom: PhantomData<fn() -> Fut>,
}

impl<F, Fut> AsyncFnStage<F, Fut> {
    /// Creates a new async function-based stage.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
            _phantom: PhantomData,
        }
    }
}

impl<F, Fut> Debug for AsyncFnStage<F, Fut> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncFnStage")
            .field("name", &self.name)
            .finish()
    }
}

#[async_trait]
impl<T, F, Fut> Stage<T> for AsyncFnStage<F, Fut>
where
    T: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Vec<T>>> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn process(&self, item: T) -> anyhow::Result<Vec<T>> {
        (self.func)(item).await
    }
}

/// A stage that observes every item and forwards it unchanged.
///
/// Useful as the terminal stage of a fork that writes items somewhere.
pub struct InspectStage<F> {
    name: String,
    func: F,
}

impl<F> InspectStage<F> {
    /// Creates a new inspecting stage.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F> Debug for InspectStage<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InspectStage")
            .field("name", &self.name)
            .finish()
    }
}

#[async_trait]
impl<T, F> Stage<T> for InspectStage<F>
where
    T: Send + 'static,
    F: Fn(&T) -> anyhow::Result<()> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn process(&self, item: T) -> anyhow::Result<Vec<T>> {
        (self.func)(&item)?;
        Ok(vec![item])
    }
}

/// Forwards every item untouched.
///
/// Substituted into forks registered without stages so they still report a
/// finish event.
#[derive(Debug, Clone)]
pub struct PassThroughStage {
    name: String,
}

impl PassThroughStage {
    /// Name given to substituted passthrough stages.
    pub const DEFAULT_NAME: &'static str = "passthrough";

    /// Creates a new passthrough stage.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Default for PassThroughStage {
    fn default() -> Self {
        Self::new(Self::DEFAULT_NAME)
    }
}

#[async_trait]
impl<T: Send + 'static> Stage<T> for PassThroughStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn process(&self, item: T) -> anyhow::Result<Vec<T>> {
        Ok(vec![item])
    }
}
