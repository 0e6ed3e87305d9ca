use crate::bus::MessageBus;
use scenegraph_core::{
    AgentMessage, Decision, GraphPatch, MessageBody, NodeId, PredicateRegistry, Proposal,
    SceneConfig,
};
use scenegraph_graph::SceneGraph;
use std::collections::BTreeMap;
use tracing::debug;

/// Capability record handed to an agent for one turn: read access to the
/// store, a send capability on the bus, and the shared configuration and
/// predicate registry. Agents never mutate the store directly.
pub struct AgentContext<'a> {
    pub graph: &'a SceneGraph,
    pub bus: &'a MessageBus,
    pub config: &'a SceneConfig,
    pub registry: &'a PredicateRegistry,
}

/// Autonomous per-node agent. Per-class variation (perception radius) lives
/// in the configuration table, not in a type hierarchy.
pub struct Agent {
    pub id: NodeId,
    pub class: String,
    /// Top candidate per neighbor from this tick's perception, used by the
    /// supersede check in phase B.
    last_eval: BTreeMap<NodeId, Proposal>,
}

impl Agent {
    pub fn new(id: impl Into<NodeId>, class: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            class: class.into(),
            last_eval: BTreeMap::new(),
        }
    }

    /// Phase A: read the own node, evaluate the predicate kit against every
    /// neighbor, and propose the top candidate when it clears the proposal
    /// threshold. Pure read on the store.
    pub fn perceive_and_propose(&mut self, ctx: &AgentContext<'_>) {
        self.last_eval.clear();
        let Some(me) = ctx.graph.node(&self.id) else {
            // Removed mid-tick; nothing to perceive.
            return;
        };
        let radius = ctx.config.perception_radius_for(&self.class);
        let Ok(neighbors) = ctx.graph.neighbors(&self.id, radius) else {
            return;
        };

        for neighbor in neighbors {
            if neighbor.is_room() {
                continue;
            }
            let Some(proposal) = ctx.registry.best(me, neighbor, ctx.config) else {
                continue;
            };
            if proposal.relation.conf >= ctx.config.tau_propose {
                debug!(
                    agent = %self.id,
                    neighbor = %neighbor.id,
                    relation = %proposal.relation.kind,
                    conf = proposal.relation.conf,
                    "proposing relation"
                );
                ctx.bus.send(AgentMessage::propose(
                    self.id.clone(),
                    neighbor.id.clone(),
                    proposal.relation.clone(),
                    proposal.basis,
                ));
            }
            self.last_eval.insert(neighbor.id.clone(), proposal);
        }
    }

    /// Phase B: drain the inbox, acknowledge proposals, and build this
    /// turn's patch. The patch is returned to the orchestrator; the turn has
    /// no side effects on the store.
    pub fn handle_inbox(&mut self, ctx: &AgentContext<'_>) -> GraphPatch {
        let mut patch = GraphPatch::new(self.id.clone());

        for msg in ctx.bus.drain(&self.id) {
            if msg.receiver != self.id {
                continue;
            }
            match msg.body {
                MessageBody::RelationPropose { relation, .. } => {
                    let decision = if relation.conf >= ctx.config.tau_accept {
                        Decision::Accept
                    } else {
                        Decision::Reject
                    };
                    ctx.bus.send(AgentMessage::ack(
                        self.id.clone(),
                        msg.sender.clone(),
                        relation.clone(),
                        decision,
                    ));
                    if decision == Decision::Accept {
                        if let Some(inverse) = relation.inverse() {
                            patch = patch.add_relation(inverse);
                        }
                        patch = patch.add_relation(relation);
                    }
                }
                MessageBody::RelationAck { relation, decision } => {
                    // Idempotent with the acceptor's own add.
                    if decision == Decision::Accept {
                        if let Some(inverse) = relation.inverse() {
                            patch = patch.add_relation(inverse);
                        }
                        patch = patch.add_relation(relation);
                    }
                }
            }
        }

        self.supersede_contradicted(ctx, &mut patch);
        patch
    }

    /// Drop relations this agent holds that are contradicted by this tick's
    /// perception: the pair's top candidate changed kind with confidence at
    /// or above the supersede threshold.
    fn supersede_contradicted(&self, ctx: &AgentContext<'_>, patch: &mut GraphPatch) {
        for relation in ctx.graph.relations_of(&self.id) {
            if relation.a != self.id || !relation.kind.is_pairwise() {
                continue;
            }
            let Some(candidate) = self.last_eval.get(&relation.b) else {
                continue;
            };
            if candidate.relation.kind != relation.kind
                && candidate.relation.conf >= ctx.config.tau_supersede
            {
                debug!(
                    agent = %self.id,
                    old = %relation.kind,
                    new = %candidate.relation.kind,
                    peer = %relation.b,
                    "superseding contradicted relation"
                );
                let key = relation.key();
                if let Some(inverse) = key.inverse() {
                    patch.remove_relations.push(inverse);
                }
                patch.remove_relations.push(key);
            }
        }
    }
}
