//! The engine facade.
//!
//! [`Engine`] owns every store, the handler registry and the worker pool.
//! Definitions are managed through typed [`DefinitionApi`] handles returned by
//! [`Engine::pipelines`] and [`Engine::workflows`]; executions, triggers and
//! artifacts through the engine itself.
//!
//! ```rust,ignore
//! let engine = Engine::builder()
//!     .config(EngineConfig::default().with_worker_count(2))
//!     .event_sink(Arc::new(LoggingEventSink::default()))
//!     .build()?;
//! engine.start();
//! ```

mod api;
mod gate;
mod queue;
mod recorder;
mod runner;


pub use api::DefinitionApi;

use crate::artifacts::ArtifactStore;
use crate::cancellation::TokenRegistry;
use crate::config::EngineConfig;
use crate::definition::{Definition, DefinitionKind, DefinitionStatus, Pipeline, Workflow};
use crate::errors::{EngineError, Result};
use crate::events::{names, EventSink, NoOpEventSink};
use crate::execution::{Execution, ExecutionFilter, ExecutionParams, LogLevel, TriggerSource};
use crate::executor::{HandlerRegistry, StepHandler};
use crate::store::RecordStore;
use crate::triggers::{params_from_event, trigger_matches, Event, EventEnvelope};
use queue::{EnqueueError, QueuedRun, WorkQueue};
use serde_json::json;
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};

/// Shared state behind an [`Engine`] handle.
pub(crate) struct EngineInner {
    pub(crate) config: EngineConfig,
    pub(crate) pipelines: RecordStore<Pipeline>,
    pub(crate) workflows: RecordStore<Workflow>,
    pub(crate) executions: Arc<RecordStore<Execution>>,
    pub(crate) artifacts: ArtifactStore,
    pub(crate) handlers: HandlerRegistry,
    pub(crate) tokens: TokenRegistry,
    pub(crate) queue: WorkQueue,
    pub(crate) event_sink: Arc<dyn EventSink>,
}

/// A definition that failed to start while handling an event.
#[derive(Debug)]
pub struct TriggerError {
    /// The definition whose trigger matched.
    pub definition_id: String,
    /// The matching trigger.
    pub trigger_id: String,
    /// Why the execution could not be submitted.
    pub error: EngineError,
}

/// Result of feeding one event to the trigger matcher.
///
/// Failures are per definition and never abort the rest of the evaluation.
#[derive(Debug, Default)]
pub struct TriggerOutcome {
    /// Executions spawned, one per matching trigger.
    pub executions: Vec<Execution>,
    /// Definitions that matched but could not be started.
    pub errors: Vec<TriggerError>,
}

impl TriggerOutcome {
    /// Returns true if nothing matched.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.executions.is_empty() && self.errors.is_empty()
    }
}

/// Builder for [`Engine`].
pub struct EngineBuilder {
    config: EngineConfig,
    event_sink: Option<Arc<dyn EventSink>>,
    handlers: Vec<(String, Arc<dyn StepHandler>)>,
}

impl std::fmt::Debug for EngineBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineBuilder")
            .field("config", &self.config)
            .field("has_event_sink", &self.event_sink.is_some())
            .field(
                "handlers",
                &self.handlers.iter().map(|(k, _)| k.as_str()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self {
            config: EngineConfig::default(),
            event_sink: None,
            handlers: Vec::new(),
        }
    }
}

impl EngineBuilder {
    /// Sets the engine configuration.
    #[must_use]
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the sink receiving lifecycle events.
    #[must_use]
    pub fn event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = Some(sink);
        self
    }

    /// Registers a step handler under `kind`, replacing any built-in.
    #[must_use]
    pub fn handler(mut self, kind: impl Into<String>, handler: Arc<dyn StepHandler>) -> Self {
        self.handlers.push((kind.into(), handler));
        self
    }

    /// Validates the configuration and builds a stopped engine.
    pub fn build(self) -> Result<Engine> {
        self.config.validate()?;

        let event_sink = self
            .event_sink
            .unwrap_or_else(|| Arc::new(NoOpEventSink));
        let mut handlers = HandlerRegistry::with_builtins(&self.config);
        for (kind, handler) in self.handlers {
            handlers.register(kind, handler);
        }

        let executions = Arc::new(RecordStore::new());
        let artifacts = ArtifactStore::new(
            executions.clone(),
            self.config.max_artifact_bytes,
            event_sink.clone(),
        );

        let inner = EngineInner {
            queue: WorkQueue::new(self.config.queue_capacity),
            pipelines: RecordStore::new(),
            workflows: RecordStore::new(),
            executions,
            artifacts,
            handlers,
            tokens: TokenRegistry::new(),
            event_sink,
            config: self.config,
        };
        debug!(
            workers = inner.config.worker_count,
            capacity = inner.config.queue_capacity,
            handlers = ?inner.handlers.kinds(),
            "Engine built"
        );
        Ok(Engine {
            inner: Arc::new(inner),
        })
    }
}

/// A pipeline and workflow execution engine.
///
/// Cheap to clone; clones share the same state. Dropping the last handle
/// closes the queue and lets the workers exit.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("pipelines", &self.inner.pipelines.len())
            .field("workflows", &self.inner.workflows.len())
            .field("executions", &self.inner.executions.len())
            .field("queue", &self.inner.queue)
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Returns a builder with default configuration.
    #[must_use]
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    /// Builds a stopped engine from a configuration.
    pub fn new(config: EngineConfig) -> Result<Self> {
        Self::builder().config(config).build()
    }

    /// Spawns the worker pool on the current tokio runtime.
    ///
    /// Calling it again does nothing. Must be called from within a runtime.
    pub fn start(&self) {
        let weak: Weak<EngineInner> = Arc::downgrade(&self.inner);
        self.inner
            .queue
            .start(self.inner.config.worker_count, move |run| {
                let weak = weak.clone();
                async move {
                    if let Some(inner) = weak.upgrade() {
                        runner::process(inner, run).await;
                    }
                }
            });
    }

    /// Returns true once [`start`](Self::start) has been called.
    #[must_use]
    pub fn is_started(&self) -> bool {
        self.inner.queue.is_started()
    }

    /// Closes the queue and waits for queued executions to finish.
    ///
    /// Later submissions fail with `EngineStopped`.
    pub async fn shutdown(&self) {
        info!("Engine shutting down");
        self.inner.queue.shutdown().await;
    }

    /// Executions waiting for a worker.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.inner.queue.pending()
    }

    /// The engine configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// The registered step handlers.
    #[must_use]
    pub fn handlers(&self) -> &HandlerRegistry {
        &self.inner.handlers
    }

    /// The artifact store.
    #[must_use]
    pub fn artifacts(&self) -> &ArtifactStore {
        &self.inner.artifacts
    }

    /// Pipeline definitions.
    #[must_use]
    pub fn pipelines(&self) -> DefinitionApi<'_, Pipeline> {
        DefinitionApi::new(&self.inner, &self.inner.pipelines)
    }

    /// Workflow definitions.
    #[must_use]
    pub fn workflows(&self) -> DefinitionApi<'_, Workflow> {
        DefinitionApi::new(&self.inner, &self.inner.workflows)
    }

    /// Returns a snapshot of an execution.
    pub fn get_execution(&self, id: &str) -> Result<Execution> {
        self.inner.executions.get(id)
    }

    /// Lists executions matching `filter`, newest first.
    #[must_use]
    pub fn list_executions(&self, filter: &ExecutionFilter) -> Vec<Execution> {
        let mut executions = self.inner.executions.filter(|e| filter.matches(e));
        executions.sort_by(|a, b| {
            b.started_at
                .cmp(&a.started_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        filter.page.apply(executions)
    }

    /// Cancels a pending or running execution.
    ///
    /// The record becomes `Cancelled` at once. A step already running is left
    /// to finish; nothing after it starts.
    pub fn cancel_execution(&self, id: &str) -> Result<Execution> {
        let reason = "cancelled by request";
        let execution = self.inner.executions.update(id, |exec| {
            exec.transition(crate::execution::ExecutionStatus::Cancelled)?;
            exec.log(LogLevel::Warn, format!("execution {reason}"));
            Ok::<_, EngineError>(exec.clone())
        })??;

        self.inner.tokens.cancel(id, reason);
        info!(execution_id = %id, "Execution cancelled");
        self.inner.event_sink.try_emit(
            names::EXECUTION_CANCELLED,
            Some(json!({
                "execution_id": id,
                "status": execution.status,
                "duration_ms": execution.duration_ms,
                "error": reason,
            })),
        );
        Ok(execution)
    }

    /// Starts a new execution with the same definition and parameters as a
    /// finished one. The original is not modified.
    pub fn retry_execution(&self, id: &str) -> Result<Execution> {
        let original = self.inner.executions.get(id)?;
        if !original.is_terminal() {
            return Err(EngineError::InvalidTransition {
                from: original.status.to_string(),
                to: "retry".to_string(),
            });
        }

        let params = original.params.clone().with_trigger(TriggerSource::Retry);
        let retry_of = Some(original.id.clone());
        let execution = match original.definition_kind {
            DefinitionKind::Pipeline => {
                self.inner
                    .start(&self.inner.pipelines, &original.definition_id, params, retry_of)?
            }
            DefinitionKind::Workflow => {
                self.inner
                    .start(&self.inner.workflows, &original.definition_id, params, retry_of)?
            }
        };
        info!(execution_id = %execution.id, retry_of = %id, "Execution retried");
        Ok(execution)
    }

    /// Deletes a finished execution. Its artifacts are kept.
    pub fn delete_execution(&self, id: &str) -> Result<Execution> {
        let status = self.inner.executions.read(id, |e| e.status)?;
        if !status.is_terminal() || self.inner.tokens.is_live(id) {
            return Err(EngineError::InvalidTransition {
                from: status.to_string(),
                to: "deleted".to_string(),
            });
        }
        let removed = self.inner.executions.remove(id)?;
        debug!(execution_id = %id, "Execution deleted");
        Ok(removed)
    }

    /// Starts every active pipeline with a trigger matching `event`.
    pub fn trigger_pipeline(&self, event: &Event) -> TriggerOutcome {
        self.inner.trigger(&self.inner.pipelines, event)
    }

    /// Starts every active workflow with a trigger matching `event`.
    pub fn trigger_workflow(&self, event: &Event) -> TriggerOutcome {
        self.inner.trigger(&self.inner.workflows, event)
    }
}

impl EngineInner {
    /// Looks up an active definition and submits a run of it.
    pub(crate) fn start<T: Definition>(
        &self,
        store: &RecordStore<T>,
        definition_id: &str,
        params: ExecutionParams,
        retry_of: Option<String>,
    ) -> Result<Execution> {
        let definition = store.get(definition_id)?;
        let status = definition.meta().status;
        if status != DefinitionStatus::Active {
            return Err(EngineError::InactiveDefinition {
                kind: T::DEFINITION_KIND.as_str(),
                id: definition_id.to_string(),
                status: status.to_string(),
            });
        }
        self.submit(definition, params, retry_of)
    }

    /// Creates a pending execution and hands it to the queue without waiting.
    ///
    /// A rejected enqueue leaves the execution stored as `Failure`.
    fn submit<T: Definition>(
        &self,
        definition: T,
        params: ExecutionParams,
        retry_of: Option<String>,
    ) -> Result<Execution> {
        let mut execution = Execution::new(T::DEFINITION_KIND, definition.meta(), params);
        if let Some(original) = &retry_of {
            execution.log(LogLevel::Info, format!("retry of execution {original}"));
        }
        execution.retry_of = retry_of;
        execution.log(LogLevel::Info, "execution queued");

        let execution_id = execution.id.clone();
        self.executions.insert(execution.clone())?;
        let token = self.tokens.register(&execution_id);
        self.event_sink.try_emit(
            names::EXECUTION_QUEUED,
            Some(json!({
                "execution_id": execution_id,
                "definition_id": execution.definition_id,
                "kind": execution.definition_kind,
            })),
        );

        let run = QueuedRun {
            execution_id: execution_id.clone(),
            plan: definition.into_plan(),
            token,
        };
        let reason = match self.queue.try_enqueue(run) {
            Ok(()) => {
                debug!(
                    execution_id = %execution_id,
                    pending = self.queue.pending(),
                    "Execution queued"
                );
                return Ok(execution);
            }
            Err((reason, _)) => reason,
        };

        self.tokens.release(&execution_id);
        let error = match reason {
            EnqueueError::Full => EngineError::QueueFull {
                execution_id: execution_id.clone(),
                capacity: self.queue.capacity(),
            },
            EnqueueError::Closed => EngineError::EngineStopped,
        };
        warn!(execution_id = %execution_id, error = %error, "Execution rejected");

        let message = error.to_string();
        match self.executions.update(&execution_id, |e| e.fail(message.clone())) {
            Ok(Ok(())) => {}
            Ok(Err(e)) | Err(e) => {
                warn!(
                    execution_id = %execution_id,
                    error = %e,
                    "Could not mark rejected execution"
                );
            }
        }
        self.event_sink.try_emit(
            names::EXECUTION_FAILED,
            Some(json!({ "execution_id": execution_id, "error": message })),
        );
        Err(error)
    }

    fn trigger<T: Definition>(&self, store: &RecordStore<T>, event: &Event) -> TriggerOutcome {
        let envelope = EventEnvelope::from(event);
        let mut definitions = store.filter(|d| {
            d.meta().status == DefinitionStatus::Active && !d.meta().triggers.is_empty()
        });
        definitions.sort_by(|a, b| {
            a.meta()
                .created_at
                .cmp(&b.meta().created_at)
                .then_with(|| a.meta().id.cmp(&b.meta().id))
        });

        let mut outcome = TriggerOutcome::default();
        for definition in definitions {
            let matching: Vec<_> = definition
                .meta()
                .triggers
                .iter()
                .filter(|t| trigger_matches(t, &envelope))
                .cloned()
                .collect();

            for trigger in matching {
                let params = params_from_event(event, &envelope, &trigger);
                let definition_id = definition.meta().id.clone();
                match self.submit(definition.clone(), params, None) {
                    Ok(execution) => {
                        debug!(
                            definition_id = %definition_id,
                            trigger_id = %trigger.id,
                            execution_id = %execution.id,
                            "Trigger matched"
                        );
                        outcome.executions.push(execution);
                    }
                    Err(error) => {
                        warn!(
                            definition_id = %definition_id,
                            trigger_id = %trigger.id,
                            error = %error,
                            "Triggered execution failed to start"
                        );
                        outcome.errors.push(TriggerError {
                            definition_id,
                            trigger_id: trigger.id.clone(),
                            error,
                        });
                    }
                }
            }
        }

        info!(
            event_type = %event.event_type,
            kind = %T::DEFINITION_KIND,
            started = outcome.executions.len(),
            failed = outcome.errors.len(),
            "Event evaluated"
        );
        outcome
    }
}
