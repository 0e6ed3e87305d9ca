use crate::bootstrap::BootstrapDoc;
use scenegraph_core::{
    Event, EventKind, GraphPatch, NodeId, Origin, Relation, RelationKey, RelationType, Result,
    SceneGraphError, SceneNode, Stamp, Timestamp, Vec3,
};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

/// The scene graph store: exclusive owner of nodes and relations, with an
/// append-only event log. All mutation goes through `apply_patch`.
#[derive(Debug, Clone, Default)]
pub struct SceneGraph {
    nodes: BTreeMap<NodeId, SceneNode>,
    relations: BTreeMap<RelationKey, Relation>,
    events: Vec<Event>,
    /// Per-field LWW stamps, keyed by `(node, field)`.
    field_stamps: BTreeMap<(NodeId, &'static str), Stamp>,
    relation_stamps: BTreeMap<RelationKey, Stamp>,
    seq: u64,
}

impl SceneGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically populate nodes and initial relations from a bootstrap
    /// document; emits a single `bootstrap` event.
    pub fn load_bootstrap(&mut self, doc: &BootstrapDoc, ts: Timestamp) -> Result<Vec<Event>> {
        let mut nodes = BTreeMap::new();
        for spec in doc.scene.rooms.iter().chain(doc.scene.objects.iter()) {
            let node = spec.to_node();
            node.validate()
                .map_err(|e| SceneGraphError::BadBootstrap(e.to_string()))?;
            if nodes.insert(node.id.clone(), node).is_some() {
                return Err(SceneGraphError::BadBootstrap(format!(
                    "duplicate node id {}",
                    spec.id
                )));
            }
        }

        let mut relations = BTreeMap::new();
        for spec in &doc.scene.relations {
            for endpoint in [&spec.a, &spec.b] {
                if !nodes.contains_key(endpoint) {
                    return Err(SceneGraphError::BadBootstrap(format!(
                        "relation {} references missing node {}",
                        spec.r, endpoint
                    )));
                }
            }
            let mut relation = spec.to_relation();
            relation.ts = ts;
            relations.insert(relation.key(), relation);
        }

        let stamp = Stamp::new(ts, "bootstrap");
        for (id, node) in &nodes {
            for field in ALL_NODE_FIELDS {
                self.field_stamps.insert((id.clone(), field), stamp.clone());
            }
            debug!(id = %id, class = %node.class, "bootstrap node");
        }
        for key in relations.keys() {
            self.relation_stamps.insert(key.clone(), stamp.clone());
        }

        let kind = EventKind::Bootstrap {
            nodes: nodes.len(),
            relations: relations.len(),
        };
        self.nodes = nodes;
        self.relations = relations;
        let event = self.push_event(ts, "bootstrap", kind);
        Ok(vec![event])
    }

    pub fn get_node(&self, id: &str) -> Result<&SceneNode> {
        self.nodes
            .get(id)
            .ok_or_else(|| SceneGraphError::NotFound(format!("node {}", id)))
    }

    pub fn node(&self, id: &str) -> Option<&SceneNode> {
        self.nodes.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &SceneNode> {
        self.nodes.values()
    }

    pub fn node_ids(&self) -> impl Iterator<Item = &NodeId> {
        self.nodes.keys()
    }

    pub fn relations(&self) -> impl Iterator<Item = &Relation> {
        self.relations.values()
    }

    pub fn relation(&self, key: &RelationKey) -> Option<&Relation> {
        self.relations.get(key)
    }

    /// Relations with the given node as either endpoint.
    pub fn relations_of(&self, id: &str) -> Vec<&Relation> {
        self.relations
            .values()
            .filter(|r| r.a == id || r.b == id)
            .collect()
    }

    /// All nodes within Euclidean radius `r` of the given node, self
    /// excluded.
    pub fn neighbors(&self, id: &str, radius: f64) -> Result<Vec<&SceneNode>> {
        let me = self.get_node(id)?;
        Ok(self
            .nodes
            .values()
            .filter(|other| other.id != id && me.pos.distance(&other.pos) <= radius)
            .collect())
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Canonical serialization of the event log, used by replay checks.
    pub fn event_log_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.events)?)
    }

    /// Floor height: the minimum room AABB z, or 0 without rooms.
    pub fn floor_z(&self) -> f64 {
        let lowest = self
            .nodes
            .values()
            .filter(|n| n.is_room())
            .map(|n| n.aabb().min().z)
            .fold(f64::INFINITY, f64::min);
        if lowest.is_finite() {
            lowest
        } else {
            0.0
        }
    }

    /// Deep copy for export, visualization and what-if simulation.
    pub fn snapshot(&self) -> SceneGraph {
        self.clone()
    }

    /// Record an event that is not tied to a patch (warnings, overruns).
    pub fn push_event(&mut self, ts: Timestamp, origin: impl Into<Origin>, kind: EventKind) -> Event {
        self.seq += 1;
        let event = Event {
            seq: self.seq,
            ts,
            origin: origin.into(),
            kind,
        };
        self.events.push(event.clone());
        event
    }

    /// Would inserting `on_top_of(a, b)` close a support cycle?
    fn closes_support_cycle(&self, a: &str, b: &str) -> bool {
        let mut current = b.to_string();
        let mut visited = BTreeSet::new();
        loop {
            if current == a {
                return true;
            }
            if !visited.insert(current.clone()) {
                return false;
            }
            let next = self.relations.iter().find_map(|(key, _)| {
                (key.kind == RelationType::OnTopOf && key.a == current).then(|| key.b.clone())
            });
            match next {
                Some(n) => current = n,
                None => return false,
            }
        }
    }

    /// Apply a patch atomically: validate every reference, then add nodes,
    /// update nodes (LWW per field), add relations, remove relations,
    /// remove nodes, appending events along the way. On any validation
    /// failure the store is unchanged.
    pub fn apply_patch(&mut self, patch: &GraphPatch) -> Result<Vec<Event>> {
        self.validate_patch(patch)?;

        let first_new = self.events.len();
        let stamp = Stamp::new(patch.ts, patch.origin.clone());

        for (id, node) in &patch.add_nodes {
            if self.nodes.contains_key(id) {
                // Re-adding an existing id is a whole-node write; it only
                // lands if this patch outranks every stamp on the node.
                let outranked = ALL_NODE_FIELDS.iter().any(|field| {
                    self.field_stamps
                        .get(&(id.clone(), *field))
                        .map_or(false, |s| *s > stamp)
                });
                if outranked {
                    debug!(id = %id, "stale node add skipped");
                    continue;
                }
            }
            self.nodes.insert(id.clone(), node.clone());
            for field in ALL_NODE_FIELDS {
                self.field_stamps.insert((id.clone(), field), stamp.clone());
            }
            self.push_event(
                patch.ts,
                patch.origin.clone(),
                EventKind::NodeAdded { id: id.clone() },
            );
        }

        for (id, update) in &patch.update_nodes {
            if update.is_empty() {
                continue;
            }
            let Some(node) = self.nodes.get_mut(id) else {
                // The node went away mid-tick; the update is moot.
                debug!(id = %id, "update for missing node skipped");
                continue;
            };
            let mut applied = Vec::new();
            for field in update.set_fields() {
                let key = (id.clone(), field);
                let current = self.field_stamps.get(&key);
                if current.map_or(false, |s| *s > stamp) {
                    continue;
                }
                match field {
                    "pos" => node.pos = update.pos.unwrap(),
                    "ori" => node.ori = update.ori.unwrap(),
                    "size" => node.size = update.size.unwrap(),
                    "name" => node.name = update.name.clone().unwrap(),
                    "affordances" => node.affordances = update.affordances.clone().unwrap(),
                    "lom" => node.lom = update.lom.unwrap(),
                    "conf" => node.conf = update.conf.unwrap(),
                    "state" => node.state = update.state.clone().unwrap(),
                    "meta" => node.meta = update.meta.clone().unwrap(),
                    _ => unreachable!("unknown node field {field}"),
                }
                self.field_stamps.insert(key, stamp.clone());
                applied.push(field.to_string());
            }
            if !applied.is_empty() {
                self.push_event(
                    patch.ts,
                    patch.origin.clone(),
                    EventKind::NodeUpdated {
                        id: id.clone(),
                        fields: applied,
                    },
                );
            }
        }

        for relation in &patch.add_relations {
            let key = relation.key();
            if let Some(existing) = self.relation_stamps.get(&key) {
                if *existing > stamp {
                    debug!(key = %key, "stale relation add skipped");
                    continue;
                }
            }
            if key.kind == RelationType::OnTopOf && self.closes_support_cycle(&key.a, &key.b) {
                warn!(key = %key, "relation would close a support cycle, dropped");
                continue;
            }
            let mut stored = relation.clone();
            stored.ts = patch.ts;
            let conf = stored.conf;
            self.relations.insert(key.clone(), stored);
            self.relation_stamps.insert(key.clone(), stamp.clone());
            self.push_event(
                patch.ts,
                patch.origin.clone(),
                EventKind::RelationUpserted { key, conf },
            );
        }

        for key in &patch.remove_relations {
            let Some(existing) = self.relations.get(key) else {
                continue;
            };
            // A remove only wins against what it has seen.
            if patch.ts < existing.ts {
                debug!(key = %key, "stale relation remove skipped");
                continue;
            }
            self.relations.remove(key);
            self.relation_stamps.remove(key);
            self.push_event(
                patch.ts,
                patch.origin.clone(),
                EventKind::RelationRemoved { key: key.clone() },
            );
        }

        for id in &patch.remove_nodes {
            self.nodes.remove(id);
            self.field_stamps.retain(|(node, _), _| node != id);
            let orphaned: Vec<RelationKey> = self
                .relations
                .keys()
                .filter(|key| key.a == *id || key.b == *id)
                .cloned()
                .collect();
            for key in orphaned {
                self.relations.remove(&key);
                self.relation_stamps.remove(&key);
                self.push_event(
                    patch.ts,
                    patch.origin.clone(),
                    EventKind::RelationRemoved { key },
                );
            }
            self.push_event(
                patch.ts,
                patch.origin.clone(),
                EventKind::NodeRemoved { id: id.clone() },
            );
        }

        Ok(self.events[first_new..].to_vec())
    }

    fn validate_patch(&self, patch: &GraphPatch) -> Result<()> {
        for node in patch.add_nodes.values() {
            node.validate()?;
        }
        for id in &patch.remove_nodes {
            if !self.nodes.contains_key(id) && !patch.add_nodes.contains_key(id) {
                return Err(SceneGraphError::NotFound(format!("node {}", id)));
            }
        }

        let removed: BTreeSet<&NodeId> = patch.remove_nodes.iter().collect();
        let exists = |id: &NodeId| {
            !removed.contains(id) && (self.nodes.contains_key(id) || patch.add_nodes.contains_key(id))
        };
        for relation in &patch.add_relations {
            if relation.a == relation.b && relation.kind.is_reserved() {
                return Err(SceneGraphError::BadIntent(format!(
                    "self-loop {} on {}",
                    relation.kind, relation.a
                )));
            }
            for endpoint in [&relation.a, &relation.b] {
                if !exists(endpoint) {
                    return Err(SceneGraphError::DanglingRef(format!(
                        "relation {} references missing node {}",
                        relation.key(),
                        endpoint
                    )));
                }
            }
        }
        Ok(())
    }

    /// Compact structure for external prompt builders: the top-k nearest
    /// objects around a viewer pose, the relations among them, and notices.
    pub fn as_context(&self, viewer_pose: Vec3, roi: &str, k: usize) -> SceneContext {
        let mut objects: Vec<&SceneNode> = self.nodes.values().filter(|n| !n.is_room()).collect();
        objects.sort_by(|a, b| {
            viewer_pose
                .distance(&a.pos)
                .total_cmp(&viewer_pose.distance(&b.pos))
                .then_with(|| a.id.cmp(&b.id))
        });
        objects.truncate(k);
        let top: BTreeSet<&str> = objects.iter().map(|n| n.id.as_str()).collect();

        let relations: Vec<Relation> = self
            .relations
            .values()
            .filter(|r| top.contains(r.a.as_str()) || top.contains(r.b.as_str()))
            .cloned()
            .collect();

        let mut notices = Vec::new();
        for node in &objects {
            if node.class == "stove" && node.state.get("power") == Some(&Value::from("on")) {
                notices.push("Stove is ON nearby.".to_string());
            }
        }

        SceneContext {
            frame: "map".to_string(),
            viewer_pose,
            roi: roi.to_string(),
            summary: format!("You are in {}. {} objects nearby.", roi, objects.len()),
            objects: objects.into_iter().cloned().collect(),
            relations,
            notices,
        }
    }
}

/// Every LWW-stamped node field, in update order.
const ALL_NODE_FIELDS: [&str; 9] = [
    "pos",
    "ori",
    "size",
    "name",
    "affordances",
    "lom",
    "conf",
    "state",
    "meta",
];

/// Compact scene view handed to external prompt builders.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SceneContext {
    pub frame: String,
    pub viewer_pose: Vec3,
    pub roi: String,
    pub summary: String,
    pub objects: Vec<SceneNode>,
    pub relations: Vec<Relation>,
    pub notices: Vec<String>,
}
