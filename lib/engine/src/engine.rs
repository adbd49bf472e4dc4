//! The process-wide execution engine.
//!
//! The engine owns the map of active runners and bridges each runner's
//! event stream to persistence and to the subscribed event sink. All
//! collaborators (store, registry, gateway, configuration, sink) are
//! injected at construction; tests build an engine with fakes per case.

use crate::dispatch::NodeDispatcher;
use crate::error::EngineError;
use crate::runner::{DagRunner, RunOutcome};
use async_trait::async_trait;
use flowstone_ai::ModelGateway;
use flowstone_core::{AppConfig, ExecutionId, WorkflowId};
use flowstone_store::Store;
use flowstone_tools::ToolRegistry;
use flowstone_workflow::event::{EventEmitter, ExecutionEvent};
use flowstone_workflow::execution::{Execution, ExecutionUpdate, LogLine, NodeStatus};
use flowstone_workflow::graph::validate_workflow;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, broadcast, mpsc, watch};
use tokio_util::sync::CancellationToken;

/// Receives every event of every execution, tagged with its execution.
///
/// Delivery is at-least-once; sinks must be idempotent on (node id,
/// event name).
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Delivers one event.
    async fn deliver(&self, execution_id: ExecutionId, event: &ExecutionEvent);
}

/// A sink that drops every event.
pub struct NullSink;

#[async_trait]
impl EventSink for NullSink {
    async fn deliver(&self, _execution_id: ExecutionId, _event: &ExecutionEvent) {}
}

/// A sink fanning events out to broadcast subscribers.
pub struct BroadcastSink {
    tx: broadcast::Sender<(ExecutionId, ExecutionEvent)>,
}

impl BroadcastSink {
    /// Creates a sink with the given channel capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribes to the event stream.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<(ExecutionId, ExecutionEvent)> {
        self.tx.subscribe()
    }
}

#[async_trait]
impl EventSink for BroadcastSink {
    async fn deliver(&self, execution_id: ExecutionId, event: &ExecutionEvent) {
        // Send fails only when no subscriber exists, which is fine.
        let _ = self.tx.send((execution_id, event.clone()));
    }
}

struct ExecutionHandle {
    cancel: CancellationToken,
    done: watch::Receiver<bool>,
}

/// The engine: starts executions, tracks active runners, and owns the
/// event bridge.
pub struct Engine<S: Store + 'static> {
    store: Arc<S>,
    registry: Arc<ToolRegistry>,
    gateway: Arc<ModelGateway>,
    config: Arc<AppConfig>,
    sink: Arc<dyn EventSink>,
    active: Arc<Mutex<HashMap<ExecutionId, ExecutionHandle>>>,
}

impl<S: Store + 'static> Engine<S> {
    /// Creates an engine over the injected collaborators.
    #[must_use]
    pub fn new(
        store: Arc<S>,
        registry: Arc<ToolRegistry>,
        gateway: Arc<ModelGateway>,
        config: Arc<AppConfig>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            store,
            registry,
            gateway,
            config,
            sink,
            active: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Number of currently active executions.
    pub async fn active_count(&self) -> usize {
        self.active.lock().await.len()
    }

    /// Starts an execution of the named workflow and returns its record
    /// immediately (status `running`); the schedule proceeds in the
    /// background.
    ///
    /// # Errors
    ///
    /// `UnknownWorkflow` when the id is absent; a `Validation` error
    /// when the document is rejected (no Execution record is created);
    /// `Storage` when the initial persist fails; `TooManyExecutions`
    /// at the concurrency cap.
    pub async fn execute_workflow(
        &self,
        workflow_id: &WorkflowId,
        input: JsonValue,
    ) -> Result<Execution, EngineError> {
        {
            let active = self.active.lock().await;
            if active.len() >= self.config.max_concurrent_executions {
                return Err(EngineError::TooManyExecutions {
                    limit: self.config.max_concurrent_executions,
                });
            }
        }

        let workflow =
            self.store
                .get_workflow(workflow_id)
                .await?
                .ok_or_else(|| EngineError::UnknownWorkflow {
                    workflow_id: workflow_id.clone(),
                })?;
        let graph = validate_workflow(&workflow)?;

        let mut execution = Execution::new(workflow_id.clone(), input.clone());
        execution.start();
        self.store.create_execution(&execution).await?;

        let (emitter, events) = EventEmitter::channel();
        let dispatcher = Arc::new(NodeDispatcher::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.gateway),
        ));
        let runner = DagRunner::new(
            Arc::new(workflow),
            graph,
            execution.id,
            input,
            dispatcher,
            Arc::clone(&self.config),
            emitter,
        );
        let cancel = runner.cancel_token();
        let (done_tx, done_rx) = watch::channel(false);

        self.active.lock().await.insert(
            execution.id,
            ExecutionHandle {
                cancel,
                done: done_rx,
            },
        );

        let pump = tokio::spawn(pump_events(
            Arc::clone(&self.store),
            Arc::clone(&self.sink),
            execution.id,
            events,
        ));

        let store = Arc::clone(&self.store);
        let active = Arc::clone(&self.active);
        let execution_id = execution.id;
        tokio::spawn(async move {
            let outcome = runner.run().await;
            // `run` consumed the runner, so the emitter is gone and the
            // pump drains to completion before finalization.
            let _ = pump.await;
            finalize(store.as_ref(), execution_id, &outcome).await;
            // Deregister before signalling so that observers of `done`
            // never find a stale handle.
            active.lock().await.remove(&execution_id);
            let _ = done_tx.send(true);
        });

        Ok(execution)
    }

    /// Stops an active execution: signals cancellation, waits for the
    /// runner to drain, and leaves the store marked `stopped`.
    ///
    /// # Errors
    ///
    /// `UnknownExecution` when the id is not active.
    pub async fn stop_execution(&self, execution_id: ExecutionId) -> Result<(), EngineError> {
        let (cancel, done) = {
            let active = self.active.lock().await;
            let handle =
                active
                    .get(&execution_id)
                    .ok_or(EngineError::UnknownExecution { execution_id })?;
            (handle.cancel.clone(), handle.done.clone())
        };

        cancel.cancel();
        wait_done(done).await;
        Ok(())
    }

    /// Waits until the execution reaches a terminal status and returns
    /// its final record from the store.
    ///
    /// # Errors
    ///
    /// `UnknownExecution` when the id was never persisted.
    pub async fn wait_for(&self, execution_id: ExecutionId) -> Result<Execution, EngineError> {
        let done = {
            let active = self.active.lock().await;
            active.get(&execution_id).map(|h| h.done.clone())
        };
        if let Some(done) = done {
            wait_done(done).await;
        }

        self.store
            .get_execution(execution_id)
            .await?
            .ok_or(EngineError::UnknownExecution { execution_id })
    }
}

async fn wait_done(mut done: watch::Receiver<bool>) {
    loop {
        if *done.borrow() {
            return;
        }
        // A closed channel means the runner task is gone; done either way.
        if done.changed().await.is_err() {
            return;
        }
    }
}

/// Drains a runner's event stream: writes through to the store and
/// forwards to the sink.
async fn pump_events<S: Store>(
    store: Arc<S>,
    sink: Arc<dyn EventSink>,
    execution_id: ExecutionId,
    mut events: mpsc::UnboundedReceiver<ExecutionEvent>,
) {
    while let Some(event) = events.recv().await {
        persist_event(store.as_ref(), execution_id, &event).await;
        sink.deliver(execution_id, &event).await;
    }
}

async fn persist_event<S: Store + ?Sized>(
    store: &S,
    execution_id: ExecutionId,
    event: &ExecutionEvent,
) {
    let result = match event {
        ExecutionEvent::NodeStart { node_id, .. } => {
            store
                .update_execution_node_state(execution_id, node_id, NodeStatus::Running, None, None)
                .await
        }
        ExecutionEvent::NodeComplete { node_id, output } => {
            store
                .update_execution_node_state(
                    execution_id,
                    node_id,
                    NodeStatus::Completed,
                    Some(output.clone()),
                    None,
                )
                .await
        }
        ExecutionEvent::NodeError { node_id, error } => {
            store
                .update_execution_node_state(
                    execution_id,
                    node_id,
                    NodeStatus::Error,
                    None,
                    Some(error.clone()),
                )
                .await
        }
        ExecutionEvent::Log {
            level,
            node_id,
            message,
            timestamp,
            data,
        } => {
            let line = LogLine {
                timestamp: *timestamp,
                level: *level,
                node_id: node_id.clone(),
                message: message.clone(),
                data: data.clone(),
            };
            store.append_log(execution_id, line).await
        }
        ExecutionEvent::ExecutionComplete { output } => {
            store
                .update_execution(execution_id, ExecutionUpdate::completed(output.clone()))
                .await
        }
        ExecutionEvent::ExecutionError { error } => {
            store
                .update_execution(execution_id, ExecutionUpdate::failed(error.clone()))
                .await
        }
    };

    if let Err(error) = result {
        // Event-persistence failures are logged and suppressed; the
        // in-memory execution proceeds. Terminal writes get the louder
        // level because the persisted view stays behind the stream.
        match event {
            ExecutionEvent::ExecutionComplete { .. } | ExecutionEvent::ExecutionError { .. } => {
                tracing::error!(%execution_id, %error, "failed to persist terminal event");
            }
            _ => {
                tracing::warn!(%execution_id, %error, "failed to persist execution event");
            }
        }
    }
}

/// Terminal bookkeeping after the runner drains.
async fn finalize<S: Store + ?Sized>(store: &S, execution_id: ExecutionId, outcome: &RunOutcome) {
    if let RunOutcome::Stopped = outcome {
        // User-initiated stop emits no terminal event; the store row is
        // finalized here.
        if let Err(error) = store
            .update_execution(execution_id, ExecutionUpdate::stopped())
            .await
        {
            tracing::error!(%execution_id, %error, "failed to persist stopped status");
        }
    }

    if matches!(outcome, RunOutcome::Completed(_)) {
        return;
    }

    // Nodes still marked running were in flight when the execution
    // aborted; their discarded work is recorded as skipped. This is
    // what keeps start = complete + error + skipped accounting exact.
    match store.get_execution(execution_id).await {
        Ok(Some(execution)) => {
            for (node_id, state) in &execution.node_states {
                if state.status == NodeStatus::Running {
                    if let Err(error) = store
                        .update_execution_node_state(
                            execution_id,
                            node_id,
                            NodeStatus::Skipped,
                            None,
                            None,
                        )
                        .await
                    {
                        tracing::warn!(%execution_id, %node_id, %error, "failed to skip node state");
                    }
                }
            }
        }
        Ok(None) => {}
        Err(error) => {
            tracing::warn!(%execution_id, %error, "failed to load execution for finalization");
        }
    }
}
