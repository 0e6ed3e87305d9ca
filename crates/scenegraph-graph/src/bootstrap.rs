use crate::store::SceneGraph;
use scenegraph_core::{
    Mobility, Quat, Relation, RelationType, Result, SceneGraphError, SceneNode, Vec3,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Top-level bootstrap document. Unknown fields are ignored; missing
/// optional fields take the documented defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapDoc {
    pub scene: SceneSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneSpec {
    #[serde(default)]
    pub id: String,
    #[serde(default = "default_frame")]
    pub frame: String,
    #[serde(default)]
    pub rooms: Vec<ObjectSpec>,
    pub objects: Vec<ObjectSpec>,
    #[serde(default)]
    pub relations: Vec<RelationSpec>,
}

fn default_frame() -> String {
    "map".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectSpec {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub cls: String,
    pub pos: [f64; 3],
    #[serde(default = "default_ori")]
    pub ori: [f64; 4],
    pub bbox: BboxSpec,
    #[serde(default)]
    pub aff: Vec<String>,
    #[serde(default)]
    pub lom: Mobility,
    #[serde(default = "default_conf")]
    pub conf: f64,
    #[serde(default)]
    pub state: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub meta: BTreeMap<String, serde_json::Value>,
}

fn default_ori() -> [f64; 4] {
    [0.0, 0.0, 0.0, 1.0]
}

fn default_conf() -> f64 {
    1.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BboxSpec {
    #[serde(rename = "type", default = "default_bbox_type")]
    pub kind: String,
    pub xyz: [f64; 3],
}

fn default_bbox_type() -> String {
    "OBB".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationSpec {
    pub r: RelationType,
    pub a: String,
    pub b: String,
    #[serde(default = "default_conf")]
    pub conf: f64,
    #[serde(default)]
    pub props: BTreeMap<String, serde_json::Value>,
}

impl ObjectSpec {
    pub fn to_node(&self) -> SceneNode {
        let mut node = SceneNode::new(
            self.id.clone(),
            self.cls.clone(),
            Vec3::from(self.pos),
            Vec3::from(self.bbox.xyz),
        )
        .with_ori(Quat::from(self.ori))
        .with_affordances(self.aff.iter().cloned())
        .with_lom(self.lom)
        .with_conf(self.conf);
        if let Some(name) = &self.name {
            node = node.with_name(name.clone());
        }
        node.state = self.state.clone();
        node.meta = self.meta.clone();
        node
    }

    fn from_node(node: &SceneNode) -> Self {
        Self {
            id: node.id.clone(),
            name: (node.name != node.id).then(|| node.name.clone()),
            cls: node.class.clone(),
            pos: node.pos.into(),
            ori: node.ori.into(),
            bbox: BboxSpec {
                kind: "OBB".to_string(),
                xyz: node.size.into(),
            },
            aff: node.affordances.clone(),
            lom: node.lom,
            conf: node.conf,
            state: node.state.clone(),
            meta: node.meta.clone(),
        }
    }
}

impl RelationSpec {
    pub fn to_relation(&self) -> Relation {
        let mut relation = Relation::new(self.r.clone(), self.a.clone(), self.b.clone(), self.conf);
        relation.props = self.props.clone();
        relation
    }
}

impl BootstrapDoc {
    pub fn from_str(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|e| SceneGraphError::BadBootstrap(e.to_string()))
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_str(&raw)
    }

    /// Export the current nodes and relations back into wire format. Rooms
    /// and objects are partitioned by class; relation confidences are always
    /// included.
    pub fn export(graph: &SceneGraph, scene_id: impl Into<String>) -> Self {
        let (rooms, objects): (Vec<&SceneNode>, Vec<&SceneNode>) =
            graph.nodes().partition(|n| n.is_room());
        Self {
            scene: SceneSpec {
                id: scene_id.into(),
                frame: default_frame(),
                rooms: rooms.iter().map(|n| ObjectSpec::from_node(n)).collect(),
                objects: objects.iter().map(|n| ObjectSpec::from_node(n)).collect(),
                relations: graph
                    .relations()
                    .map(|r| RelationSpec {
                        r: r.kind.clone(),
                        a: r.a.clone(),
                        b: r.b.clone(),
                        conf: r.conf,
                        props: r.props.clone(),
                    })
                    .collect(),
            },
        }
    }
}
