use crate::{Mobility, NodeId, Quat, Result, SceneGraphError, Vec3};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A physical object or room in the scene graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneNode {
    pub id: NodeId,
    pub name: String,
    pub class: String,
    pub pos: Vec3,
    #[serde(default)]
    pub ori: Quat,
    /// Axis-aligned extent (w, d, h); the OBB is assumed axis-aligned for
    /// all relation tests.
    pub size: Vec3,
    #[serde(default)]
    pub affordances: Vec<String>,
    #[serde(default)]
    pub lom: Mobility,
    #[serde(default = "default_conf")]
    pub conf: f64,
    #[serde(default)]
    pub state: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub meta: BTreeMap<String, serde_json::Value>,
}

fn default_conf() -> f64 {
    1.0
}

impl SceneNode {
    pub fn new(id: impl Into<NodeId>, class: impl Into<String>, pos: Vec3, size: Vec3) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            class: class.into(),
            pos,
            ori: Quat::IDENTITY,
            size,
            affordances: Vec::new(),
            lom: Mobility::default(),
            conf: 1.0,
            state: BTreeMap::new(),
            meta: BTreeMap::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_ori(mut self, ori: Quat) -> Self {
        self.ori = ori;
        self
    }

    pub fn with_affordances<I, S>(mut self, affordances: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.affordances = affordances.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_lom(mut self, lom: Mobility) -> Self {
        self.lom = lom;
        self
    }

    pub fn with_conf(mut self, conf: f64) -> Self {
        self.conf = conf;
        self
    }

    pub fn with_state(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.state.insert(key.into(), value);
        self
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.meta.insert(key.into(), value);
        self
    }

    pub fn has_affordance(&self, tag: &str) -> bool {
        self.affordances.iter().any(|a| a == tag)
    }

    pub fn aabb(&self) -> crate::Aabb {
        crate::Aabb::new(self.pos, self.size)
    }

    pub fn is_room(&self) -> bool {
        self.class == "room"
    }

    /// Whether the node can carry something resting on it.
    pub fn can_support(&self) -> bool {
        self.has_affordance("support") || matches!(self.lom, Mobility::Fixed | Mobility::Low)
    }

    pub fn validate(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(SceneGraphError::BadIntent("node id must be non-empty".into()));
        }
        if !(self.size.x > 0.0 && self.size.y > 0.0 && self.size.z > 0.0) {
            return Err(SceneGraphError::BadIntent(format!(
                "node {}: size components must be positive",
                self.id
            )));
        }
        if !self.pos.is_finite() {
            return Err(SceneGraphError::BadIntent(format!(
                "node {}: position must be finite",
                self.id
            )));
        }
        if !(0.0..=1.0).contains(&self.conf) {
            return Err(SceneGraphError::BadIntent(format!(
                "node {}: confidence {} outside [0, 1]",
                self.id, self.conf
            )));
        }
        if !self.ori.is_normalized(1e-3) {
            return Err(SceneGraphError::BadIntent(format!(
                "node {}: orientation quaternion not normalized",
                self.id
            )));
        }
        Ok(())
    }
}
