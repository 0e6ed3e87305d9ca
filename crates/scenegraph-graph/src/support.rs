use crate::store::SceneGraph;
use scenegraph_core::{
    align_to_ground, Aabb, Event, EventKind, GraphPatch, LogicalClock, Mobility, NodeId,
    NodeUpdate, Quat, RelationKey, RelationType, Result, SceneConfig, SceneNode, Vec3,
    CONTACT_EPSILON,
};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

/// Radius of the blocked-neighbor scan in the accessibility score.
pub const R_ACC: f64 = 0.6;
/// Support chains deeper than this are flagged high-risk.
pub const TAU_CHAIN: usize = 3;

/// Derived support indices plus the pose cache that drives cascade moves.
/// Rebuilt from committed relations; never authoritative on its own.
#[derive(Debug, Clone, Default)]
pub struct SupportSystem {
    supported_by: BTreeMap<NodeId, NodeId>,
    dependents: BTreeMap<NodeId, BTreeSet<NodeId>>,
    positions: BTreeMap<NodeId, Vec3>,
    orientations: BTreeMap<NodeId, Quat>,
}

/// Outcome of a hypothetical removal, computed on a snapshot copy.
#[derive(Debug, Clone)]
pub struct WhatIfReport {
    pub removed: NodeId,
    /// Fixed dependents that keep their place.
    pub lost_support: Vec<NodeId>,
    /// Dependents that fall, with their landing positions.
    pub fell: Vec<(NodeId, Vec3)>,
    pub vanished_relations: Vec<RelationKey>,
    /// True when every affected node has `lom != fixed`.
    pub all_mobile: bool,
}

impl SupportSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recompute `supported_by`/`dependents` from the committed `on_top_of`
    /// relations. With several candidate supporters the highest confidence
    /// wins, ties broken by the lower node id.
    pub fn rebuild(&mut self, graph: &SceneGraph) {
        self.supported_by.clear();
        self.dependents.clear();

        let mut best: BTreeMap<NodeId, (f64, NodeId)> = BTreeMap::new();
        for relation in graph.relations() {
            if relation.kind != RelationType::OnTopOf {
                continue;
            }
            if !graph.contains(&relation.a) || !graph.contains(&relation.b) {
                continue;
            }
            let candidate = (relation.conf, relation.b.clone());
            best.entry(relation.a.clone())
                .and_modify(|current| {
                    let replace = candidate.0 > current.0
                        || (candidate.0 == current.0 && candidate.1 < current.1);
                    if replace {
                        *current = candidate.clone();
                    }
                })
                .or_insert(candidate);
        }

        for (supported, (_, supporter)) in best {
            self.dependents
                .entry(supporter.clone())
                .or_default()
                .insert(supported.clone());
            self.supported_by.insert(supported, supporter);
        }
    }

    /// Refresh the pose cache to the graph's current state.
    pub fn sync_poses(&mut self, graph: &SceneGraph) {
        self.positions = graph.nodes().map(|n| (n.id.clone(), n.pos)).collect();
        self.orientations = graph.nodes().map(|n| (n.id.clone(), n.ori)).collect();
    }

    pub fn supporter_of(&self, id: &str) -> Option<&NodeId> {
        self.supported_by.get(id)
    }

    pub fn supported_by_index(&self) -> &BTreeMap<NodeId, NodeId> {
        &self.supported_by
    }

    pub fn dependents_index(&self) -> &BTreeMap<NodeId, BTreeSet<NodeId>> {
        &self.dependents
    }

    pub fn dependents_of(&self, id: &str) -> BTreeSet<NodeId> {
        self.dependents.get(id).cloned().unwrap_or_default()
    }

    pub fn recursive_dependents(&self, id: &str) -> BTreeSet<NodeId> {
        let mut all = BTreeSet::new();
        let mut stack: Vec<NodeId> = self.dependents_of(id).into_iter().collect();
        while let Some(current) = stack.pop() {
            if all.insert(current.clone()) {
                stack.extend(self.dependents_of(&current));
            }
        }
        all
    }

    /// Hops from the node to the nearest unsupported ancestor.
    pub fn chain_depth(&self, id: &str) -> usize {
        let mut depth = 0;
        let mut visited = BTreeSet::new();
        let mut current = id.to_string();
        while let Some(supporter) = self.supported_by.get(&current) {
            if !visited.insert(current.clone()) {
                break;
            }
            depth += 1;
            current = supporter.clone();
        }
        depth
    }

    pub fn stability_risk(depth: usize) -> &'static str {
        if depth > TAU_CHAIN {
            "high"
        } else if depth >= 2 {
            "medium"
        } else {
            "low"
        }
    }

    /// Fixed, resting on something ground-stable, or sitting on the floor.
    pub fn is_ground_stable(&self, graph: &SceneGraph, id: &str) -> bool {
        let mut visited = BTreeSet::new();
        let mut current = id.to_string();
        loop {
            if !visited.insert(current.clone()) {
                return false;
            }
            let Some(node) = graph.node(&current) else {
                return false;
            };
            if node.lom == Mobility::Fixed {
                return true;
            }
            match self.supported_by.get(&current) {
                Some(supporter) => current = supporter.clone(),
                None => {
                    let floor = graph.floor_z();
                    return (node.aabb().bottom() - floor).abs() <= CONTACT_EPSILON * 2.0;
                }
            }
        }
    }

    /// Accessibility score in [0, 1] and its category.
    pub fn accessibility(
        &self,
        graph: &SceneGraph,
        cfg: &SceneConfig,
        id: &str,
    ) -> Option<(f64, &'static str)> {
        let node = graph.node(id)?;
        if node.is_room() {
            return None;
        }
        let viewer = Vec3::from(cfg.viewer_pose);

        let neighbors: Vec<&SceneNode> = graph
            .neighbors(id, R_ACC)
            .ok()?
            .into_iter()
            .filter(|n| !n.is_room())
            .collect();
        let blocked_fraction = if neighbors.is_empty() {
            0.0
        } else {
            let blocking = neighbors
                .iter()
                .filter(|n| n.aabb().intersects_segment(&viewer, &node.pos))
                .count();
            blocking as f64 / neighbors.len() as f64
        };

        let depth = self.chain_depth(id);
        let depth_penalty = (depth as f64 / TAU_CHAIN as f64).min(1.0);

        let score = 0.5 * node.lom.factor()
            + 0.3 * (1.0 - blocked_fraction)
            + 0.2 * (1.0 - depth_penalty);
        let category = if score >= 0.7 {
            "reachable"
        } else if score <= 0.3 {
            "blocked"
        } else {
            "limited"
        };
        Some((score, category))
    }

    /// React to a committed batch: resolve removals, cascade moves to
    /// dependents, then rebuild the indices under the same lock as the
    /// triggering patch. Returns the follow-up events.
    pub fn process_commit(
        &mut self,
        graph: &mut SceneGraph,
        clock: &mut LogicalClock,
        cfg: &SceneConfig,
        events: &[Event],
    ) -> Result<Vec<Event>> {
        let mut extra = Vec::new();

        let removed: Vec<NodeId> = events
            .iter()
            .filter_map(|e| match &e.kind {
                EventKind::NodeRemoved { id } => Some(id.clone()),
                _ => None,
            })
            .collect();

        if !removed.is_empty() {
            let mut landing = GraphPatch::new("support-cascade");
            for supporter in &removed {
                for dependent in self.dependents_of(supporter) {
                    let Some(node) = graph.node(&dependent).cloned() else {
                        continue;
                    };
                    if node.lom == Mobility::Fixed {
                        info!(id = %dependent, supporter = %supporter, "fixed dependent kept in place");
                        extra.push(graph.push_event(
                            clock.next(),
                            "support-cascade",
                            EventKind::LostSupport {
                                id: dependent.clone(),
                                supporter: supporter.clone(),
                            },
                        ));
                        continue;
                    }
                    let (target, unresolved) = self.find_landing(graph, &node);
                    if let Some(reason) = unresolved {
                        warn!(id = %dependent, reason = %reason, "cascade landing unresolved");
                        extra.push(graph.push_event(
                            clock.next(),
                            "support-cascade",
                            EventKind::CascadeUnresolved {
                                id: dependent.clone(),
                                reason,
                            },
                        ));
                    }
                    if target.distance(&node.pos) > 1e-9 {
                        landing = landing.update_node(dependent, NodeUpdate::position(target));
                    }
                }
            }
            if !landing.is_empty() {
                landing.ts = clock.next();
                extra.extend(graph.apply_patch(&landing)?);
            }
        }

        extra.extend(self.cascade_moves(graph, clock, cfg)?);

        self.rebuild(graph);
        self.sync_poses(graph);
        Ok(extra)
    }

    /// Apply the translation of every moved supporter to its recursive
    /// dependents, preserving relative offsets. The follow-up patch carries
    /// a strictly later timestamp so LWW orders it last.
    fn cascade_moves(
        &mut self,
        graph: &mut SceneGraph,
        clock: &mut LogicalClock,
        cfg: &SceneConfig,
    ) -> Result<Vec<Event>> {
        let mut extra = Vec::new();

        let movers: Vec<(NodeId, Vec3)> = self
            .dependents
            .keys()
            .filter_map(|id| {
                let node = graph.node(id)?;
                let cached = self.positions.get(id)?;
                let delta = node.pos.sub(cached);
                (delta.distance(&Vec3::ZERO) > 1e-9).then(|| (id.clone(), delta))
            })
            .collect();

        // A mover that itself rests on another mover follows its supporter;
        // only the topmost movers drive the cascade.
        let mover_ids: BTreeSet<&NodeId> = movers.iter().map(|(id, _)| id).collect();
        let mut patch = GraphPatch::new("support-cascade");
        for (mover, delta) in &movers {
            let nested = movers
                .iter()
                .any(|(other, _)| other != mover && self.recursive_dependents(other).contains(mover));
            if nested {
                continue;
            }
            for dependent in self.recursive_dependents(mover) {
                if mover_ids.contains(&dependent) {
                    continue;
                }
                let Some(cached) = self.positions.get(&dependent) else {
                    continue;
                };
                debug!(supporter = %mover, dependent = %dependent, "cascading move");
                patch = patch.update_node(dependent, NodeUpdate::position(cached.add(delta)));
            }
        }

        for (id, cached_ori) in &self.orientations {
            let Some(node) = graph.node(id) else { continue };
            if node.ori != *cached_ori
                && !self.dependents_of(id).is_empty()
                && !cfg.cascade_rotation
            {
                extra.push(graph.push_event(
                    clock.next(),
                    "support-cascade",
                    EventKind::CascadeUnresolved {
                        id: id.clone(),
                        reason: "rotation propagation not applied".to_string(),
                    },
                ));
            }
        }

        if !patch.is_empty() {
            patch.ts = clock.next();
            extra.extend(graph.apply_patch(&patch)?);
        }
        Ok(extra)
    }

    /// Landing position for a falling node: the highest ground-stable,
    /// support-capable surface under its footprint, else the room floor.
    /// Returns a warning reason when no collision-free spot exists.
    fn find_landing(&self, graph: &SceneGraph, falling: &SceneNode) -> (Vec3, Option<String>) {
        let footprint = falling.aabb();
        let surface = graph
            .nodes()
            .filter(|n| {
                n.id != falling.id
                    && !n.is_room()
                    && n.can_support()
                    && n.aabb().top() <= footprint.bottom() + CONTACT_EPSILON
                    && footprint.xy_overlap_fraction(&n.aabb()) >= 0.5
                    && self.is_ground_stable(graph, &n.id)
            })
            .max_by(|x, y| {
                x.aabb()
                    .top()
                    .total_cmp(&y.aabb().top())
                    .then_with(|| y.id.cmp(&x.id))
            });

        if let Some(surface) = surface {
            let target = Vec3::new(
                falling.pos.x,
                falling.pos.y,
                surface.aabb().top() + falling.size.z / 2.0,
            );
            if !self.collides(graph, falling, &target, Some(&surface.id)) {
                return (target, None);
            }
        }

        let floor = align_to_ground(&falling.pos, &falling.size, graph.floor_z());
        if self.collides(graph, falling, &floor, None) {
            (
                floor,
                Some("no collision-free landing spot, placed on floor".to_string()),
            )
        } else {
            (floor, None)
        }
    }

    fn collides(
        &self,
        graph: &SceneGraph,
        falling: &SceneNode,
        target: &Vec3,
        resting_on: Option<&str>,
    ) -> bool {
        let candidate = Aabb::new(*target, falling.size);
        // Things resting on the falling node move with it and cannot block.
        let entourage = self.recursive_dependents(&falling.id);
        graph.nodes().any(|n| {
            n.id != falling.id
                && Some(n.id.as_str()) != resting_on
                && !n.is_room()
                && !entourage.contains(&n.id)
                && n.aabb().overlaps(&candidate)
        })
    }

    /// Simulate "what if X is removed" without touching the live store:
    /// run the removal and its cascade on a snapshot copy.
    pub fn simulate_removal(
        &self,
        graph: &SceneGraph,
        cfg: &SceneConfig,
        id: &str,
    ) -> Result<WhatIfReport> {
        graph.get_node(id)?;
        let affected = self.recursive_dependents(id);
        let all_mobile = affected
            .iter()
            .all(|n| graph.node(n).map_or(true, |n| n.lom != Mobility::Fixed));
        let vanished_relations: Vec<RelationKey> =
            graph.relations_of(id).iter().map(|r| r.key()).collect();

        let mut sim_graph = graph.snapshot();
        let mut sim_support = self.clone();
        let mut clock = LogicalClock::new();
        clock.advance_past(graph.events().iter().map(|e| e.ts).max().unwrap_or(0));

        let mut patch = GraphPatch::new("what-if").remove_node(id.to_string());
        patch.ts = clock.next();
        let events = sim_graph.apply_patch(&patch)?;
        let follow_ups = sim_support.process_commit(&mut sim_graph, &mut clock, cfg, &events)?;

        let lost_support: Vec<NodeId> = follow_ups
            .iter()
            .filter_map(|e| match &e.kind {
                EventKind::LostSupport { id, .. } => Some(id.clone()),
                _ => None,
            })
            .collect();
        let fell: Vec<(NodeId, Vec3)> = affected
            .iter()
            .filter(|n| !lost_support.contains(n))
            .filter_map(|n| sim_graph.node(n).map(|node| (n.clone(), node.pos)))
            .collect();

        Ok(WhatIfReport {
            removed: id.to_string(),
            lost_support,
            fell,
            vanished_relations,
            all_mobile,
        })
    }
}
