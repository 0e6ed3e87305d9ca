use crate::assembler::{assemble, SpatialSnapshot};
use crate::qa::{QaResponse, QuestionDispatcher};
use crate::router::{CommandRouter, Intent, PlannedIntent};
use async_trait::async_trait;
use parking_lot::RwLock;
use scenegraph_agents::Orchestrator;
use scenegraph_core::{
    EventBatch, EventSink, Result, SceneConfig, SceneGraphError,
};
use scenegraph_graph::BootstrapDoc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::info;

/// Sink that logs every committed batch; the demo wires it in so pushed
/// events are visible without a subscriber.
pub struct LoggingSink;

#[async_trait]
impl EventSink for LoggingSink {
    async fn on_batch(&self, batch: &EventBatch) {
        for event in &batch.events {
            info!(tick = batch.tick, seq = event.seq, origin = %event.origin, "event");
        }
    }
}

/// Result of applying one intent through the runtime surface.
#[derive(Debug, Clone)]
pub enum IntentOutcome {
    Committed(EventBatch),
    Answered(QaResponse),
}

/// The thin programmatic surface over the core: load, tick, apply intents,
/// ask questions, snapshot, subscribe. The orchestrator behind the writer
/// lock is the single mutable resource; readers go through `snapshot`-style
/// copies between ticks.
pub struct SceneRuntime {
    core: RwLock<Orchestrator>,
    router: CommandRouter,
    events_tx: broadcast::Sender<EventBatch>,
    sinks: RwLock<Vec<Arc<dyn EventSink>>>,
    write_deadline: Duration,
}

impl SceneRuntime {
    pub fn new(config: SceneConfig) -> Self {
        let (events_tx, _) = broadcast::channel(256);
        Self {
            core: RwLock::new(Orchestrator::new(config.clone())),
            router: CommandRouter::new(config),
            events_tx,
            sinks: RwLock::new(Vec::new()),
            write_deadline: Duration::from_millis(250),
        }
    }

    pub fn with_write_deadline(mut self, deadline: Duration) -> Self {
        self.write_deadline = deadline;
        self
    }

    pub async fn load_bootstrap(&self, doc: &BootstrapDoc) -> Result<EventBatch> {
        let batch = self.write_core()?.load_bootstrap(doc)?;
        self.publish(&batch).await;
        Ok(batch)
    }

    pub async fn load_bootstrap_str(&self, raw: &str) -> Result<EventBatch> {
        self.load_bootstrap(&BootstrapDoc::from_str(raw)?).await
    }

    /// Advance one tick and push the committed batch to subscribers.
    pub async fn tick(&self) -> Result<EventBatch> {
        let batch = self.write_core()?.tick()?;
        self.publish(&batch).await;
        Ok(batch)
    }

    /// Apply one intent: mutations become patches on the store, queries go
    /// to the question dispatcher.
    pub async fn apply_intent(&self, intent: &Intent) -> Result<IntentOutcome> {
        let outcome = {
            let mut core = self.write_core()?;
            match self.router.plan(core.graph(), intent)? {
                PlannedIntent::Patch(patch) => IntentOutcome::Committed(core.commit_external(patch)?),
                PlannedIntent::Question(question) => {
                    let dispatcher =
                        QuestionDispatcher::new(core.graph(), core.support(), core.config());
                    IntentOutcome::Answered(dispatcher.ask(&question)?)
                }
            }
        };
        if let IntentOutcome::Committed(batch) = &outcome {
            self.publish(batch).await;
        }
        Ok(outcome)
    }

    /// Apply a batch atomically: every intent is validated against a scratch
    /// store before anything commits; one bad intent rejects them all.
    pub async fn apply_intents(&self, intents: &[Intent]) -> Result<Vec<IntentOutcome>> {
        let (outcomes, batches) = {
            let mut core = self.write_core()?;
            let planned = self.router.plan_batch(core.graph(), intents)?;
            let mut outcomes = Vec::with_capacity(planned.len());
            let mut batches = Vec::new();
            for plan in planned {
                match plan {
                    PlannedIntent::Patch(patch) => {
                        let batch = core.commit_external(patch)?;
                        batches.push(batch.clone());
                        outcomes.push(IntentOutcome::Committed(batch));
                    }
                    PlannedIntent::Question(question) => {
                        let dispatcher =
                            QuestionDispatcher::new(core.graph(), core.support(), core.config());
                        outcomes.push(IntentOutcome::Answered(dispatcher.ask(&question)?));
                    }
                }
            }
            (outcomes, batches)
        };
        for batch in &batches {
            self.publish(batch).await;
        }
        Ok(outcomes)
    }

    /// Answer a question from the current committed state.
    pub async fn ask(&self, question: &str) -> Result<QaResponse> {
        let core = self.core.read();
        let dispatcher = QuestionDispatcher::new(core.graph(), core.support(), core.config());
        dispatcher.ask(question)
    }

    /// Reproducible spatial snapshot of the current state.
    pub fn snapshot(&self) -> SpatialSnapshot {
        let core = self.core.read();
        assemble(core.graph(), core.support(), core.config())
    }

    /// Scene export in the bootstrap wire format.
    pub fn export(&self, scene_id: &str) -> BootstrapDoc {
        let core = self.core.read();
        BootstrapDoc::export(core.graph(), scene_id)
    }

    pub fn event_log_json(&self) -> Result<String> {
        self.core.read().graph().event_log_json()
    }

    /// Pull-style subscription: every committed batch, in commit order.
    pub fn subscribe(&self) -> broadcast::Receiver<EventBatch> {
        self.events_tx.subscribe()
    }

    /// Push-style subscription for sinks that want an async callback.
    pub fn add_sink(&self, sink: Arc<dyn EventSink>) {
        self.sinks.write().push(sink);
    }

    fn write_core(&self) -> Result<parking_lot::RwLockWriteGuard<'_, Orchestrator>> {
        self.core.try_write_for(self.write_deadline).ok_or_else(|| {
            SceneGraphError::Timeout(format!(
                "could not acquire the store write lock within {:?}",
                self.write_deadline
            ))
        })
    }

    async fn publish(&self, batch: &EventBatch) {
        if batch.events.is_empty() {
            return;
        }
        info!(tick = batch.tick, events = batch.events.len(), "publishing event batch");
        let _ = self.events_tx.send(batch.clone());
        let sinks: Vec<Arc<dyn EventSink>> = self.sinks.read().clone();
        for sink in sinks {
            sink.on_batch(batch).await;
        }
    }
}
