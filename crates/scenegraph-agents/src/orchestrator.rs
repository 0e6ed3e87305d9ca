use crate::agent::{Agent, AgentContext};
use crate::bus::MessageBus;
use scenegraph_core::{
    Event, EventBatch, EventKind, GraphPatch, LogicalClock, NodeId, PredicateRegistry, Result,
    SceneConfig, SceneGraphError,
};
use scenegraph_graph::{BootstrapDoc, SceneGraph, SupportSystem};
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::{info, warn};

/// Owns the tick loop and everything it touches: store, bus, agents,
/// support indices and the logical clock. Single-writer: external callers
/// serialize through the same instance that runs ticks.
pub struct Orchestrator {
    graph: SceneGraph,
    bus: MessageBus,
    agents: BTreeMap<NodeId, Agent>,
    support: SupportSystem,
    clock: LogicalClock,
    config: SceneConfig,
    registry: PredicateRegistry,
    tick_no: u64,
}

impl Orchestrator {
    pub fn new(config: SceneConfig) -> Self {
        Self::with_registry(config, PredicateRegistry::default())
    }

    pub fn with_registry(config: SceneConfig, registry: PredicateRegistry) -> Self {
        Self {
            graph: SceneGraph::new(),
            bus: MessageBus::new(),
            agents: BTreeMap::new(),
            support: SupportSystem::new(),
            clock: LogicalClock::new(),
            config,
            registry,
            tick_no: 0,
        }
    }

    pub fn graph(&self) -> &SceneGraph {
        &self.graph
    }

    pub fn support(&self) -> &SupportSystem {
        &self.support
    }

    pub fn config(&self) -> &SceneConfig {
        &self.config
    }

    pub fn tick_no(&self) -> u64 {
        self.tick_no
    }

    pub fn load_bootstrap(&mut self, doc: &BootstrapDoc) -> Result<EventBatch> {
        let ts = self.clock.next();
        let events = self.graph.load_bootstrap(doc, ts)?;
        self.sync_agents();
        self.support.rebuild(&self.graph);
        self.support.sync_poses(&self.graph);
        info!(
            nodes = self.graph.nodes().count(),
            agents = self.agents.len(),
            "bootstrap loaded"
        );
        Ok(EventBatch {
            tick: self.tick_no,
            events,
        })
    }

    /// Every non-room node gets an agent. A node added mid-tick is picked
    /// up here at the start of the next tick.
    fn sync_agents(&mut self) {
        let desired: BTreeMap<NodeId, String> = self
            .graph
            .nodes()
            .filter(|n| !n.is_room())
            .map(|n| (n.id.clone(), n.class.clone()))
            .collect();

        let stale: Vec<NodeId> = self
            .agents
            .keys()
            .filter(|id| !desired.contains_key(*id))
            .cloned()
            .collect();
        for id in stale {
            self.agents.remove(&id);
            self.bus.remove_queue(&id);
        }
        for (id, class) in desired {
            self.agents
                .entry(id.clone())
                .or_insert_with(|| Agent::new(id, class));
        }
    }

    /// One two-phase step. Phase A: every agent perceives and proposes (pure
    /// reads). Phase B: every agent drains its inbox and returns a patch.
    /// Patches commit in the deterministic agent order, followed by the
    /// support-system follow-ups at strictly later timestamps.
    pub fn tick(&mut self) -> Result<EventBatch> {
        let started = Instant::now();
        self.tick_no += 1;
        self.sync_agents();

        let order: Vec<NodeId> = self.agents.keys().cloned().collect();
        let mut agents = std::mem::take(&mut self.agents);

        let mut patches: Vec<GraphPatch> = Vec::new();
        {
            let ctx = AgentContext {
                graph: &self.graph,
                bus: &self.bus,
                config: &self.config,
                registry: &self.registry,
            };
            for id in &order {
                agents
                    .get_mut(id)
                    .expect("agent set is stable within a tick")
                    .perceive_and_propose(&ctx);
            }
            for id in &order {
                let patch = agents
                    .get_mut(id)
                    .expect("agent set is stable within a tick")
                    .handle_inbox(&ctx);
                if !patch.is_empty() {
                    patches.push(patch);
                }
            }
        }
        self.agents = agents;

        let mut events: Vec<Event> = Vec::new();
        for mut patch in patches {
            patch.ts = self.clock.next();
            match self.graph.apply_patch(&patch) {
                Ok(committed) => events.extend(committed),
                // A peer's patch can race a removal within the tick; that
                // patch is void, not a failed tick.
                Err(SceneGraphError::DanglingRef(reason))
                | Err(SceneGraphError::NotFound(reason)) => {
                    warn!(origin = %patch.origin, %reason, "agent patch skipped");
                }
                Err(other) => return Err(other),
            }
        }

        let follow_ups =
            self.support
                .process_commit(&mut self.graph, &mut self.clock, &self.config, &events)?;
        events.extend(follow_ups);

        let elapsed_ms = started.elapsed().as_millis() as u64;
        if elapsed_ms > self.config.tick_budget_ms {
            warn!(tick = self.tick_no, elapsed_ms, "tick overran its budget");
            events.push(self.graph.push_event(
                self.clock.next(),
                "orchestrator",
                EventKind::TickOverran {
                    tick: self.tick_no,
                    elapsed_ms,
                    budget_ms: self.config.tick_budget_ms,
                },
            ));
        }

        Ok(EventBatch {
            tick: self.tick_no,
            events,
        })
    }

    /// Commit a patch from outside the tick loop (command router). Runs the
    /// same support follow-ups and agent sync as a tick commit.
    pub fn commit_external(&mut self, mut patch: GraphPatch) -> Result<EventBatch> {
        patch.ts = self.clock.next();
        let mut events = self.graph.apply_patch(&patch)?;
        let follow_ups =
            self.support
                .process_commit(&mut self.graph, &mut self.clock, &self.config, &events)?;
        events.extend(follow_ups);
        self.sync_agents();
        Ok(EventBatch {
            tick: self.tick_no,
            events,
        })
    }
}
