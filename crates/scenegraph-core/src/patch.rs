use crate::{
    Mobility, NodeId, Origin, Quat, Relation, RelationKey, SceneNode, Timestamp, Vec3,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Per-field delta for a node. Only set fields participate in LWW; each one
/// is stamped and resolved independently.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pos: Option<Vec3>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ori: Option<Quat>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<Vec3>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub affordances: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lom: Option<Mobility>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conf: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<BTreeMap<String, serde_json::Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<BTreeMap<String, serde_json::Value>>,
}

impl NodeUpdate {
    pub fn position(pos: Vec3) -> Self {
        Self {
            pos: Some(pos),
            ..Default::default()
        }
    }

    pub fn orientation(ori: Quat) -> Self {
        Self {
            ori: Some(ori),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.set_fields().is_empty()
    }

    /// Names of the fields this update touches, in a fixed order.
    pub fn set_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.pos.is_some() {
            fields.push("pos");
        }
        if self.ori.is_some() {
            fields.push("ori");
        }
        if self.size.is_some() {
            fields.push("size");
        }
        if self.name.is_some() {
            fields.push("name");
        }
        if self.affordances.is_some() {
            fields.push("affordances");
        }
        if self.lom.is_some() {
            fields.push("lom");
        }
        if self.conf.is_some() {
            fields.push("conf");
        }
        if self.state.is_some() {
            fields.push("state");
        }
        if self.meta.is_some() {
            fields.push("meta");
        }
        fields
    }
}

/// Transactional delta applied to the scene graph. Produced by agents and
/// the command router, consumed by the store in commit order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphPatch {
    pub ts: Timestamp,
    pub origin: Origin,
    #[serde(default)]
    pub add_nodes: BTreeMap<NodeId, SceneNode>,
    #[serde(default)]
    pub update_nodes: BTreeMap<NodeId, NodeUpdate>,
    #[serde(default)]
    pub remove_nodes: Vec<NodeId>,
    #[serde(default)]
    pub add_relations: Vec<Relation>,
    #[serde(default)]
    pub remove_relations: Vec<RelationKey>,
}

impl GraphPatch {
    pub fn new(origin: impl Into<Origin>) -> Self {
        Self {
            ts: 0,
            origin: origin.into(),
            add_nodes: BTreeMap::new(),
            update_nodes: BTreeMap::new(),
            remove_nodes: Vec::new(),
            add_relations: Vec::new(),
            remove_relations: Vec::new(),
        }
    }

    pub fn add_node(mut self, node: SceneNode) -> Self {
        self.add_nodes.insert(node.id.clone(), node);
        self
    }

    pub fn update_node(mut self, id: impl Into<NodeId>, update: NodeUpdate) -> Self {
        self.update_nodes.insert(id.into(), update);
        self
    }

    pub fn remove_node(mut self, id: impl Into<NodeId>) -> Self {
        self.remove_nodes.push(id.into());
        self
    }

    pub fn add_relation(mut self, relation: Relation) -> Self {
        self.add_relations.push(relation);
        self
    }

    pub fn remove_relation(mut self, key: RelationKey) -> Self {
        self.remove_relations.push(key);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.add_nodes.is_empty()
            && self.update_nodes.iter().all(|(_, u)| u.is_empty())
            && self.remove_nodes.is_empty()
            && self.add_relations.is_empty()
            && self.remove_relations.is_empty()
    }
}

/// Append-only record of a committed change. The event log is the source of
/// truth for replay and audit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub seq: u64,
    pub ts: Timestamp,
    pub origin: Origin,
    #[serde(flatten)]
    pub kind: EventKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    Bootstrap {
        nodes: usize,
        relations: usize,
    },
    NodeAdded {
        id: NodeId,
    },
    NodeUpdated {
        id: NodeId,
        fields: Vec<String>,
    },
    NodeRemoved {
        id: NodeId,
    },
    RelationUpserted {
        key: RelationKey,
        conf: f64,
    },
    RelationRemoved {
        key: RelationKey,
    },
    /// A fixed dependent kept its place when its supporter vanished.
    LostSupport {
        id: NodeId,
        supporter: NodeId,
    },
    /// A cascade could not fully resolve (rotation propagation skipped, or
    /// no collision-free landing spot).
    CascadeUnresolved {
        id: NodeId,
        reason: String,
    },
    TickOverran {
        tick: u64,
        elapsed_ms: u64,
        budget_ms: u64,
    },
}

impl EventKind {
    /// Whether this event can invalidate the support indices.
    pub fn touches_support(&self) -> bool {
        match self {
            EventKind::Bootstrap { .. }
            | EventKind::NodeAdded { .. }
            | EventKind::NodeUpdated { .. }
            | EventKind::NodeRemoved { .. } => true,
            EventKind::RelationUpserted { key, .. } | EventKind::RelationRemoved { key } => {
                matches!(
                    key.kind,
                    crate::RelationType::OnTopOf | crate::RelationType::Supports
                )
            }
            _ => false,
        }
    }
}

/// The events committed by one tick or one external apply, pushed to
/// subscribers as a unit. Observers see transactions, never partial patches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventBatch {
    pub tick: u64,
    pub events: Vec<Event>,
}
