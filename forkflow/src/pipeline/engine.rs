//! The forking pipeline engine.
//!
//! A [`ForkingPipeline`] owns one producer, an optional chain of base stages
//! and any number of named forks. Nothing is pulled from the producer until
//! [`ForkingPipeline::start_pipeline`] wires every branch; from then on each
//! base-chain output is cloned into every fork.

use super::branch::Branch;
use super::channel::{link, Inlet, Outlet};
use super::coordinator::{run_coordinator, CoordinatorEvent, Outcome, StatusTable, BASE_BRANCH};
use super::registry::ForkRegistry;
use crate::cancellation::CancellationToken;
use crate::config::PipelineConfig;
use crate::core::PipelineStatus;
use crate::errors::{PipelineError, StructuralViolationError};
use crate::observability::PipelineSpanAttributes;
use crate::stages::{shared, PassThroughStage, SharedStage};
use futures::stream::{self, BoxStream};
use futures::{FutureExt, Stream, StreamExt};
use parking_lot::{Mutex, RwLock};
use std::any::Any;
use std::convert::Infallible;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, info_span, warn, Instrument, Span};
use uuid::Uuid;

/// Name of the producer entry in the base chain.
pub const PRODUCER_STAGE_NAME: &str = "producer";

type Producer<T> = BoxStream<'static, anyhow::Result<T>>;

/// Handle to a fork registered with [`ForkingPipeline::fork`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ForkHandle {
    name: String,
}

impl ForkHandle {
    /// Returns the fork name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl AsRef<str> for ForkHandle {
    fn as_ref(&self) -> &str {
        &self.name
    }
}

/// Mutable topology, only touched before the pipeline is sealed.
struct Topology<T> {
    producer: Option<Producer<T>>,
    base_stages: Vec<SharedStage<T>>,
    forks: ForkRegistry<T>,
}

impl<T: Send + 'static> Topology<T> {
    fn base_branch(&self) -> Branch {
        let mut names = vec![PRODUCER_STAGE_NAME.to_string()];
        names.extend(self.base_stages.iter().map(|s| s.name().to_string()));
        Branch::new(None, names)
    }

    fn fork_branches(&self) -> Vec<Branch> {
        self.forks
            .iter()
            .map(|fork| Branch::new(Some(fork.name.clone()), fork.stage_names()))
            .collect()
    }
}

/// Identifies the stage a task is driving.
#[derive(Debug, Clone, Copy)]
struct StageSlot {
    branch: usize,
    index: usize,
}

/// What a stage task observed when it stopped.
enum Flow {
    /// Upstream exhausted and output flushed.
    Finished,
    /// Cancelled, or the downstream went away.
    Stopped,
}

/// Per-run context shared by every task.
#[derive(Clone)]
struct RunContext {
    events: mpsc::UnboundedSender<CoordinatorEvent>,
    token: Arc<CancellationToken>,
}

impl RunContext {
    fn report(&self, slot: StageSlot, result: std::thread::Result<anyhow::Result<Flow>>) {
        let event = match result {
            Ok(Ok(Flow::Finished)) => CoordinatorEvent::StageFinished {
                branch: slot.branch,
                index: slot.index,
            },
            Ok(Ok(Flow::Stopped)) => return,
            Ok(Err(error)) => CoordinatorEvent::StageFailed {
                branch: slot.branch,
                index: slot.index,
                error,
            },
            Err(panic) => CoordinatorEvent::StageFailed {
                branch: slot.branch,
                index: slot.index,
                error: anyhow::anyhow!("stage panicked: {}", panic_message(&*panic)),
            },
        };
        let failed = matches!(event, CoordinatorEvent::StageFailed { .. });
        // The coordinator stops listening once the run settles.
        let _ = self.events.send(event);
        // Trip the token before the caller drops its outlet, so downstream
        // stages see cancellation rather than end of input.
        if failed {
            self.token.cancel(format!(
                "stage {} of branch {} failed",
                slot.index, slot.branch
            ));
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// A pipeline that replicates one producer across independent forks.
///
/// Topology (`add_streams`, `fork`, `add_streams_to_fork`) may only change
/// while the pipeline is unsealed. Calling [`start_pipeline`] or [`done`]
/// seals it.
///
/// Dropping the handle of a running pipeline fails the run.
///
/// [`start_pipeline`]: ForkingPipeline::start_pipeline
/// [`done`]: ForkingPipeline::done
pub struct ForkingPipeline<T> {
    config: PipelineConfig,
    run_id: Uuid,
    topology: Mutex<Topology<T>>,
    sealed: AtomicBool,
    started: AtomicBool,
    table: Arc<RwLock<StatusTable>>,
    events: Mutex<Option<mpsc::UnboundedSender<CoordinatorEvent>>>,
    outcome_tx: Mutex<Option<watch::Sender<Outcome>>>,
    outcome_rx: watch::Receiver<Outcome>,
}

impl<T> ForkingPipeline<T>
where
    T: Clone + Send + 'static,
{
    /// Creates a pipeline over a fallible producer stream.
    ///
    /// The stream is held and not polled until the pipeline starts.
    pub fn new<S, E>(producer: S) -> Self
    where
        S: Stream<Item = Result<T, E>> + Send + 'static,
        E: Into<anyhow::Error> + 'static,
    {
        Self::with_config(producer, PipelineConfig::default())
    }

    /// Creates a pipeline with an explicit configuration.
    pub fn with_config<S, E>(producer: S, config: PipelineConfig) -> Self
    where
        S: Stream<Item = Result<T, E>> + Send + 'static,
        E: Into<anyhow::Error> + 'static,
    {
        let producer: Producer<T> = producer.map(|item| item.map_err(Into::into)).boxed();
        let topology = Topology {
            producer: Some(producer),
            base_stages: Vec::new(),
            forks: ForkRegistry::new(),
        };
        let table = StatusTable::new(topology.base_branch(), Vec::new());
        let (outcome_tx, outcome_rx) = watch::channel(None);

        Self {
            config,
            run_id: Uuid::new_v4(),
            topology: Mutex::new(topology),
            sealed: AtomicBool::new(false),
            started: AtomicBool::new(false),
            table: Arc::new(RwLock::new(table)),
            events: Mutex::new(None),
            outcome_tx: Mutex::new(Some(outcome_tx)),
            outcome_rx,
        }
    }

    /// Creates a pipeline whose base chain starts with `stages`.
    pub fn with_base_stages<S, E>(
        producer: S,
        stages: impl IntoIterator<Item = SharedStage<T>>,
    ) -> Self
    where
        S: Stream<Item = Result<T, E>> + Send + 'static,
        E: Into<anyhow::Error> + 'static,
    {
        let pipeline = Self::new(producer);
        pipeline.topology.lock().base_stages.extend(stages);
        pipeline
    }

    /// Creates a pipeline over an in-memory set of items.
    #[allow(clippy::should_implement_trait)]
    pub fn from_iter<I>(items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        I::IntoIter: Send + 'static,
    {
        Self::new(stream::iter(items.into_iter().map(Ok::<T, Infallible>)))
    }

    /// Returns the pipeline configuration.
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Returns the unique id of this pipeline run.
    #[must_use]
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Appends stages to the base chain.
    pub fn add_streams(
        &self,
        stages: impl IntoIterator<Item = SharedStage<T>>,
    ) -> Result<(), PipelineError> {
        let mut topology = self.topology.lock();
        self.ensure_unsealed("add_streams")?;
        let before = topology.base_stages.len();
        topology.base_stages.extend(stages);
        debug!(
            pipeline = %self.config.name,
            added = topology.base_stages.len() - before,
            "Base stages added"
        );
        Ok(())
    }

    /// Registers a named fork fed by the base chain's output.
    ///
    /// A fork may be registered without stages; it then receives a
    /// passthrough stage at start so it still reports completion.
    pub fn fork(
        &self,
        name: impl Into<String>,
        stages: impl IntoIterator<Item = SharedStage<T>>,
    ) -> Result<ForkHandle, PipelineError> {
        let name = name.into();
        let mut topology = self.topology.lock();
        self.ensure_unsealed("fork")?;
        topology
            .forks
            .register(name.clone(), stages.into_iter().collect())?;
        debug!(pipeline = %self.config.name, fork = %name, "Fork registered");
        Ok(ForkHandle { name })
    }

    /// Appends stages to an existing fork.
    pub fn add_streams_to_fork(
        &self,
        name: impl AsRef<str>,
        stages: impl IntoIterator<Item = SharedStage<T>>,
    ) -> Result<(), PipelineError> {
        let name = name.as_ref();
        let mut topology = self.topology.lock();
        self.ensure_unsealed("add_streams_to_fork")?;
        topology.forks.extend(name, stages.into_iter().collect())?;
        debug!(pipeline = %self.config.name, fork = %name, "Fork stages added");
        Ok(())
    }

    /// Wires every branch and resumes the producer.
    ///
    /// Must be called from within a tokio runtime. May only be called once:
    /// a repeat call fails here and also fails the run observed by `done()`.
    pub fn start_pipeline(&self) -> Result<(), PipelineError> {
        let mut topology = self.topology.lock();

        if self.started.load(Ordering::SeqCst) {
            let err = StructuralViolationError::already_started();
            warn!(pipeline = %self.config.name, "start_pipeline() called twice");
            if let Some(events) = self.events.lock().as_ref() {
                let _ = events.send(CoordinatorEvent::Violation(err.clone()));
            }
            return Err(err.into());
        }

        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            StructuralViolationError::new("start_pipeline() must be called within a tokio runtime")
                .with_operation("start_pipeline")
        })?;
        let producer = topology.producer.take().ok_or_else(|| {
            StructuralViolationError::new("Pipeline producer already consumed")
                .with_operation("start_pipeline")
        })?;
        let Some(outcome_tx) = self.outcome_tx.lock().take() else {
            return Err(StructuralViolationError::dropped().into());
        };

        let base_stages = std::mem::take(&mut topology.base_stages);
        let mut forks = std::mem::take(&mut topology.forks).into_ordered();
        for fork in &mut forks {
            if fork.stages.is_empty() {
                fork.stages.push(shared(PassThroughStage::default()));
            }
        }

        let mut base_names = vec![PRODUCER_STAGE_NAME.to_string()];
        base_names.extend(base_stages.iter().map(|s| s.name().to_string()));
        let mut table = StatusTable::new(
            Branch::new(None, base_names),
            forks
                .iter()
                .map(|fork| Branch::new(Some(fork.name.clone()), fork.stage_names())),
        );
        table.start();
        *self.table.write() = table;
        self.started.store(true, Ordering::SeqCst);
        self.sealed.store(true, Ordering::SeqCst);

        let span = info_span!(
            "pipeline",
            pipeline = %self.config.name,
            run_id = %self.run_id,
        );
        let attributes = PipelineSpanAttributes::new()
            .with_pipeline_name(&self.config.name)
            .with_run_id(self.run_id.to_string())
            .with_base_stage_count(base_stages.len())
            .with_fork_names(forks.iter().map(|f| f.name.clone()));
        span.in_scope(|| {
            info!(attributes = ?attributes.to_otel_attributes(), "Pipeline started");
        });

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let token = Arc::new(CancellationToken::new());
        *self.events.lock() = Some(events_tx.clone());

        runtime.spawn(
            run_coordinator(self.table.clone(), events_rx, token.clone(), outcome_tx)
                .instrument(span.clone()),
        );

        let ctx = RunContext {
            events: events_tx,
            token,
        };
        let capacity = self.config.channel_capacity;

        // Producer feeds base stage 0; the last base stage feeds the tap.
        let (producer_outlet, mut inlet) = link(capacity);
        spawn(
            &runtime,
            &span,
            drive_producer(producer, producer_outlet, ctx.clone()),
        );
        for (i, stage) in base_stages.into_iter().enumerate() {
            let (outlet, next_inlet) = link(capacity);
            let slot = StageSlot {
                branch: BASE_BRANCH,
                index: i + 1,
            };
            spawn(
                &runtime,
                &span,
                drive_stage(stage, slot, inlet, outlet, ctx.clone()),
            );
            inlet = next_inlet;
        }

        let mut fork_inputs = Vec::with_capacity(forks.len());
        for (f, fork) in forks.into_iter().enumerate() {
            let (tx, rx) = mpsc::unbounded_channel();
            fork_inputs.push(tx);
            spawn_chain(
                &runtime,
                &span,
                fork.stages,
                f + 1,
                Inlet::Unbounded(rx),
                capacity,
                &ctx,
            );
        }
        spawn(&runtime, &span, drive_tap(inlet, fork_inputs, ctx.token.clone()));

        Ok(())
    }

    /// Returns a future settling with the pipeline's outcome.
    ///
    /// Resolves once every branch completes, or fails with a structural
    /// violation naming the failing branch (none for the base chain) and
    /// embedding the original error. Calling `done` seals the topology even
    /// if the pipeline has not started yet.
    pub fn done(&self) -> impl Future<Output = Result<(), PipelineError>> + Send + 'static {
        {
            let _topology = self.topology.lock();
            self.sealed.store(true, Ordering::SeqCst);
        }
        let mut rx = self.outcome_rx.clone();
        async move {
            match rx.wait_for(Option::is_some).await {
                Ok(outcome) => outcome
                    .clone()
                    .unwrap_or_else(|| Err(StructuralViolationError::dropped().into())),
                Err(_) => Err(StructuralViolationError::dropped().into()),
            }
        }
    }

    /// Returns the pipeline status.
    #[must_use]
    pub fn status(&self) -> PipelineStatus {
        self.table.read().status()
    }

    /// Returns true once `start_pipeline` has run.
    #[must_use]
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Returns true once every branch completed.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.status() == PipelineStatus::Complete
    }

    /// Returns true once any branch failed.
    #[must_use]
    pub fn is_errored(&self) -> bool {
        self.status() == PipelineStatus::Error
    }

    /// Returns true once the topology can no longer change.
    #[must_use]
    pub fn is_sealed(&self) -> bool {
        self.sealed.load(Ordering::SeqCst)
    }

    /// Returns a status view of the base chain.
    #[must_use]
    pub fn base_branch(&self) -> Branch {
        if self.is_started() {
            if let Some(branch) = self.table.read().branch(BASE_BRANCH) {
                return branch.clone();
            }
        }
        self.topology.lock().base_branch()
    }

    /// Returns a status view of a fork.
    #[must_use]
    pub fn fork_branch(&self, name: &str) -> Option<Branch> {
        self.branches()
            .into_iter()
            .find(|branch| branch.name() == Some(name))
    }

    /// Returns status views of every branch, base chain first.
    #[must_use]
    pub fn branches(&self) -> Vec<Branch> {
        if self.is_started() {
            return self.table.read().branches().to_vec();
        }
        let topology = self.topology.lock();
        let mut branches = vec![topology.base_branch()];
        branches.extend(topology.fork_branches());
        branches
    }

    /// Returns fork names in registration order.
    #[must_use]
    pub fn fork_names(&self) -> Vec<String> {
        if self.is_started() {
            return self
                .table
                .read()
                .branches()
                .iter()
                .filter_map(|b| b.name().map(str::to_string))
                .collect();
        }
        self.topology.lock().forks.names().to_vec()
    }

    /// Returns true if a fork with this name is registered.
    #[must_use]
    pub fn has_fork(&self, name: &str) -> bool {
        if self.is_started() {
            return self.fork_branch(name).is_some();
        }
        self.topology.lock().forks.contains(name)
    }

    fn ensure_unsealed(&self, operation: &str) -> Result<(), PipelineError> {
        if self.sealed.load(Ordering::SeqCst) {
            warn!(pipeline = %self.config.name, operation, "Topology change rejected");
            return Err(StructuralViolationError::sealed(operation).into());
        }
        Ok(())
    }
}

impl<T> Drop for ForkingPipeline<T> {
    fn drop(&mut self) {
        if let Some(events) = self.events.get_mut().take() {
            let _ = events.send(CoordinatorEvent::Violation(
                StructuralViolationError::dropped(),
            ));
        }
    }
}

impl<T> std::fmt::Debug for ForkingPipeline<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForkingPipeline")
            .field("name", &self.config.name)
            .field("run_id", &self.run_id)
            .field("status", &self.table.read().status())
            .field("sealed", &self.sealed.load(Ordering::SeqCst))
            .finish()
    }
}

fn spawn<F>(runtime: &tokio::runtime::Handle, span: &Span, task: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    runtime.spawn(task.instrument(span.clone()));
}

/// Spawns one task per stage of a fork, linked in order.
fn spawn_chain<T: Send + 'static>(
    runtime: &tokio::runtime::Handle,
    span: &Span,
    stages: Vec<SharedStage<T>>,
    branch: usize,
    first: Inlet<T>,
    capacity: usize,
    ctx: &RunContext,
) {
    let last = stages.len().saturating_sub(1);
    let mut inlet = first;
    for (index, stage) in stages.into_iter().enumerate() {
        let slot = StageSlot { branch, index };
        if index == last {
            spawn(
                runtime,
                span,
                drive_stage(stage, slot, inlet, Outlet::Discard, ctx.clone()),
            );
            return;
        }
        let (outlet, next_inlet) = link(capacity);
        spawn(
            runtime,
            span,
            drive_stage(stage, slot, inlet, outlet, ctx.clone()),
        );
        inlet = next_inlet;
    }
}

/// Pulls the producer and feeds the base chain.
async fn drive_producer<T: Send + 'static>(
    mut producer: Producer<T>,
    outlet: Outlet<T>,
    ctx: RunContext,
) {
    let slot = StageSlot {
        branch: BASE_BRANCH,
        index: 0,
    };
    let result = AssertUnwindSafe(pump_producer(&mut producer, &outlet, &ctx.token))
        .catch_unwind()
        .await;
    debug!(stage = PRODUCER_STAGE_NAME, "Producer stopped");
    // Report before the outlet closes so downstream events queue behind ours.
    ctx.report(slot, result);
    drop(outlet);
}

async fn pump_producer<T: Send + 'static>(
    producer: &mut Producer<T>,
    outlet: &Outlet<T>,
    token: &CancellationToken,
) -> anyhow::Result<Flow> {
    loop {
        let next = tokio::select! {
            biased;
            () = token.cancelled() => return Ok(Flow::Stopped),
            next = producer.next() => next,
        };
        match next {
            Some(Ok(item)) => {
                if !forward(outlet, vec![item], token).await {
                    return Ok(Flow::Stopped);
                }
            }
            Some(Err(err)) => return Err(err),
            None => return Ok(Flow::Finished),
        }
    }
}

/// Runs one stage until its upstream is exhausted, it fails or the run is
/// cancelled.
async fn drive_stage<T: Send + 'static>(
    stage: SharedStage<T>,
    slot: StageSlot,
    mut inlet: Inlet<T>,
    outlet: Outlet<T>,
    ctx: RunContext,
) {
    let result = AssertUnwindSafe(pump_stage(&stage, &mut inlet, &outlet, &ctx.token))
        .catch_unwind()
        .await;

    match &result {
        Ok(Ok(Flow::Finished)) => {
            debug!(branch = slot.branch, index = slot.index, stage = stage.name(), "Stage finished");
        }
        Ok(Err(err)) => {
            warn!(branch = slot.branch, index = slot.index, stage = stage.name(), error = %err, "Stage failed");
        }
        Err(_) => {
            warn!(branch = slot.branch, index = slot.index, stage = stage.name(), "Stage panicked");
        }
        Ok(Ok(Flow::Stopped)) => {}
    }
    ctx.report(slot, result);
    drop(outlet);
}

async fn pump_stage<T: Send + 'static>(
    stage: &SharedStage<T>,
    inlet: &mut Inlet<T>,
    outlet: &Outlet<T>,
    token: &CancellationToken,
) -> anyhow::Result<Flow> {
    loop {
        let item = tokio::select! {
            biased;
            () = token.cancelled() => return Ok(Flow::Stopped),
            item = inlet.recv() => item,
        };
        let Some(item) = item else {
            break;
        };
        let out = tokio::select! {
            biased;
            () = token.cancelled() => return Ok(Flow::Stopped),
            out = stage.process(item) => out?,
        };
        if !forward(outlet, out, token).await {
            return Ok(Flow::Stopped);
        }
    }
    let out = tokio::select! {
        biased;
        () = token.cancelled() => return Ok(Flow::Stopped),
        out = stage.finish() => out?,
    };
    if !forward(outlet, out, token).await {
        return Ok(Flow::Stopped);
    }
    Ok(Flow::Finished)
}

/// Sends items downstream, giving up on cancellation.
async fn forward<T>(outlet: &Outlet<T>, items: Vec<T>, token: &CancellationToken) -> bool {
    for item in items {
        let delivered = tokio::select! {
            biased;
            () = token.cancelled() => false,
            delivered = outlet.send(item) => delivered,
        };
        if !delivered {
            return false;
        }
    }
    true
}

/// Replicates the base chain's output into every fork.
async fn drive_tap<T: Clone + Send + 'static>(
    mut inlet: Inlet<T>,
    forks: Vec<mpsc::UnboundedSender<T>>,
    token: Arc<CancellationToken>,
) {
    loop {
        let item = tokio::select! {
            biased;
            () = token.cancelled() => return,
            item = inlet.recv() => item,
        };
        let Some(item) = item else {
            return;
        };
        if let Some((last, rest)) = forks.split_last() {
            for fork in rest {
                // A failed fork has dropped its receiver; the run is settling.
                let _ = fork.send(item.clone());
            }
            let _ = last.send(item);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::StageState;
    use crate::stages::FnStage;
    use crate::testing::{CountingStage, FailingStage};
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn stage(name: &str) -> SharedStage<u32> {
        shared(PassThroughStage::new(name))
    }

    #[test]
    fn test_new_pipeline_not_started() {
        let pipeline = ForkingPipeline::from_iter(vec![1_u32, 2, 3]);

        assert_eq!(pipeline.status(), PipelineStatus::NotStarted);
        assert!(!pipeline.is_started());
        assert!(!pipeline.is_sealed());
        assert_eq!(pipeline.base_branch().stages(), &[PRODUCER_STAGE_NAME]);
    }

    #[test]
    fn test_topology_observers_before_start() {
        let pipeline = ForkingPipeline::with_base_stages(
            stream::iter(vec![Ok::<u32, Infallible>(1)]),
            vec![stage("parse")],
        );
        pipeline.add_streams(vec![stage("validate")]).unwrap();
        let handle = pipeline.fork("archive", vec![stage("compress")]).unwrap();
        pipeline.add_streams_to_fork(&handle, vec![stage("upload")]).unwrap();

        assert_eq!(
            pipeline.base_branch().stages(),
            &["producer", "parse", "validate"]
        );
        let fork = pipeline.fork_branch("archive").unwrap();
        assert_eq!(fork.stages(), &["compress", "upload"]);
        assert_eq!(fork.status(), StageState::NotStarted);
        assert_eq!(pipeline.fork_names(), vec!["archive".to_string()]);
        assert!(pipeline.has_fork("archive"));
    }

    #[test]
    fn test_duplicate_fork_rejected() {
        let pipeline = ForkingPipeline::from_iter(vec![1_u32]);
        pipeline.fork("a", vec![stage("x")]).unwrap();

        let err = pipeline.fork("a", Vec::new()).unwrap_err();
        assert!(matches!(err, PipelineError::Argument(_)));
        assert_eq!(pipeline.fork_branch("a").unwrap().stages(), &["x"]);
    }

    #[test]
    fn test_add_streams_to_unknown_fork() {
        let pipeline = ForkingPipeline::from_iter(vec![1_u32]);

        let err = pipeline
            .add_streams_to_fork("missing", vec![stage("x")])
            .unwrap_err();
        assert!(matches!(err, PipelineError::Argument(_)));
    }

    #[test]
    fn test_done_seals_topology() {
        let pipeline = ForkingPipeline::from_iter(vec![1_u32]);
        let _pending = pipeline.done();

        assert!(pipeline.is_sealed());
        let err = pipeline.add_streams(vec![stage("late")]).unwrap_err();
        assert!(err.is_structural());
        let err = pipeline.fork("late", Vec::new()).unwrap_err();
        assert!(err.is_structural());
        assert_eq!(pipeline.base_branch().stages(), &[PRODUCER_STAGE_NAME]);
        assert!(pipeline.fork_names().is_empty());
    }

    #[test]
    fn test_start_outside_runtime_fails() {
        let pipeline = ForkingPipeline::from_iter(vec![1_u32]);

        let err = pipeline.start_pipeline().unwrap_err();
        assert!(err.is_structural());
        assert!(!pipeline.is_started());
    }

    #[tokio::test]
    async fn test_base_only_pipeline_completes() {
        let counter = CountingStage::new("count");
        let pipeline = ForkingPipeline::from_iter(0..5_u32);
        pipeline.add_streams(vec![counter.shared()]).unwrap();

        pipeline.start_pipeline().unwrap();
        pipeline.done().await.unwrap();

        assert_eq!(counter.count(), 5);
        assert!(pipeline.is_completed());
        assert_eq!(
            pipeline.base_branch().stage_statuses(),
            &[StageState::Complete, StageState::Complete]
        );
    }

    #[tokio::test]
    async fn test_empty_fork_gets_passthrough() {
        let pipeline = ForkingPipeline::from_iter(0..3_u32);
        pipeline.fork("empty", Vec::new()).unwrap();

        pipeline.start_pipeline().unwrap();
        pipeline.done().await.unwrap();

        let fork = pipeline.fork_branch("empty").unwrap();
        assert_eq!(fork.stages(), &[PassThroughStage::DEFAULT_NAME]);
        assert_eq!(fork.status(), StageState::Complete);
    }

    #[tokio::test]
    async fn test_producer_error_fails_base_chain() {
        let items = stream::iter(vec![Ok(1_u32), Err(anyhow::anyhow!("source offline"))]);
        let pipeline = ForkingPipeline::new(items);
        pipeline.fork("a", vec![stage("x")]).unwrap();

        pipeline.start_pipeline().unwrap();
        let err = pipeline.done().await.unwrap_err();

        assert!(err.is_structural());
        assert!(err.branch().is_none());
        assert!(err.to_string().contains("source offline"));
        assert_eq!(pipeline.base_branch().stage_statuses(), &[StageState::Error]);
        assert_eq!(
            pipeline.fork_branch("a").unwrap().status(),
            StageState::Cancelled
        );
    }

    #[tokio::test]
    async fn test_base_stage_failure_cancels_producer() {
        let pipeline = ForkingPipeline::new(stream::repeat_with(|| Ok::<u32, Infallible>(7)));
        pipeline
            .add_streams(vec![shared(FailingStage::on_item("reject", 3))])
            .unwrap();

        pipeline.start_pipeline().unwrap();
        let err = tokio::time::timeout(Duration::from_secs(5), pipeline.done())
            .await
            .expect("infinite producer should be cancelled")
            .unwrap_err();

        assert!(err.to_string().contains("reject"));
        assert_eq!(
            pipeline.base_branch().stage_statuses(),
            &[StageState::Cancelled, StageState::Error]
        );
    }

    #[tokio::test]
    async fn test_panicking_stage_reported_as_failure() {
        let pipeline = ForkingPipeline::from_iter(0..3_u32);
        let panicking = FnStage::new("explode", |_: u32| -> anyhow::Result<Vec<u32>> {
            panic!("kaboom")
        });
        pipeline.fork("boom", vec![shared(panicking)]).unwrap();

        pipeline.start_pipeline().unwrap();
        let err = pipeline.done().await.unwrap_err();

        assert_eq!(err.branch(), Some("boom"));
        assert!(err.to_string().contains("kaboom"));
    }

    #[tokio::test]
    async fn test_done_is_shared_between_waiters() {
        let pipeline = ForkingPipeline::from_iter(0..2_u32);
        pipeline.fork("a", vec![stage("x")]).unwrap();
        let first = pipeline.done();
        let second = pipeline.done();

        // done() seals topology but does not prevent starting.
        pipeline.start_pipeline().unwrap();

        first.await.unwrap();
        second.await.unwrap();
        assert!(pipeline.done().await.is_ok());
    }

    #[tokio::test]
    async fn test_dropped_pipeline_rejects_done() {
        let pipeline = ForkingPipeline::from_iter(0..2_u32);
        let pending = pipeline.done();
        drop(pipeline);

        let err = pending.await.unwrap_err();
        assert!(err.is_structural());
    }
}
