use crate::templates::{builtin_templates, canonical_type, ObjectTemplate};
use scenegraph_core::{
    align_to_ground, place_on_surface, relate_support, Aabb, GraphPatch, NodeId, NodeUpdate,
    Relation, RelationType, Result, SceneConfig, SceneGraphError, SceneNode, Vec3,
};
use scenegraph_graph::SceneGraph;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

/// Structured intents produced by the external NL parser (closed set).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "intent", rename_all = "snake_case")]
pub enum Intent {
    AddObject {
        object_type: String,
        #[serde(default)]
        target: Option<NodeId>,
        #[serde(default)]
        relation: Option<String>,
        #[serde(default)]
        quantity: Option<u32>,
        #[serde(default)]
        pose: Option<[f64; 3]>,
    },
    MoveObject {
        id: NodeId,
        #[serde(default)]
        new_pos: Option<[f64; 3]>,
        #[serde(default)]
        relative_to: Option<NodeId>,
        #[serde(default)]
        offset: Option<[f64; 3]>,
    },
    RemoveObject {
        id: NodeId,
    },
    Query {
        question: String,
    },
}

/// What an intent turns into: a patch for the store, or a question for the
/// dispatcher.
#[derive(Debug, Clone)]
pub enum PlannedIntent {
    Patch(GraphPatch),
    Question(String),
}

const MAX_QUANTITY: u32 = 20;
const PLACEMENT_ATTEMPTS: usize = 20;

/// Translates intents into patches. Placement uses the geometry kit:
/// `on`-relations sit objects on the target's top face, everything else
/// searches deterministic angles around the target on the floor.
pub struct CommandRouter {
    templates: BTreeMap<&'static str, ObjectTemplate>,
    config: SceneConfig,
}

impl CommandRouter {
    pub fn new(config: SceneConfig) -> Self {
        Self {
            templates: builtin_templates(),
            config,
        }
    }

    pub fn plan(&self, graph: &SceneGraph, intent: &Intent) -> Result<PlannedIntent> {
        match intent {
            Intent::AddObject {
                object_type,
                target,
                relation,
                quantity,
                pose,
            } => self.plan_add(graph, object_type, target.as_deref(), relation.as_deref(), *quantity, *pose),
            Intent::MoveObject {
                id,
                new_pos,
                relative_to,
                offset,
            } => self.plan_move(graph, id, *new_pos, relative_to.as_deref(), *offset),
            Intent::RemoveObject { id } => {
                if !graph.contains(id) {
                    return Err(SceneGraphError::BadIntent(format!(
                        "cannot remove unknown object {}",
                        id
                    )));
                }
                Ok(PlannedIntent::Patch(
                    GraphPatch::new("command-router").remove_node(id.clone()),
                ))
            }
            Intent::Query { question } => Ok(PlannedIntent::Question(question.clone())),
        }
    }

    /// Plan a whole batch against a scratch copy of the store so later
    /// intents see earlier ones; any invalid intent rejects the batch.
    pub fn plan_batch(&self, graph: &SceneGraph, intents: &[Intent]) -> Result<Vec<PlannedIntent>> {
        let mut scratch = graph.snapshot();
        let mut ts = scratch.events().last().map(|e| e.ts).unwrap_or(0);
        let mut planned = Vec::with_capacity(intents.len());
        for intent in intents {
            let plan = self.plan(&scratch, intent)?;
            if let PlannedIntent::Patch(patch) = &plan {
                ts += 1;
                let mut staged = patch.clone();
                staged.ts = ts;
                scratch.apply_patch(&staged)?;
            }
            planned.push(plan);
        }
        Ok(planned)
    }

    fn template(&self, object_type: &str) -> Result<&ObjectTemplate> {
        self.templates
            .get(canonical_type(object_type))
            .ok_or_else(|| {
                SceneGraphError::BadIntent(format!("unknown object type {}", object_type))
            })
    }

    fn plan_add(
        &self,
        graph: &SceneGraph,
        object_type: &str,
        target: Option<&str>,
        relation: Option<&str>,
        quantity: Option<u32>,
        pose: Option<[f64; 3]>,
    ) -> Result<PlannedIntent> {
        let template = self.template(object_type)?;
        let quantity = quantity.unwrap_or(1);
        if quantity == 0 || quantity > MAX_QUANTITY {
            return Err(SceneGraphError::BadIntent(format!(
                "quantity {} outside 1..={}",
                quantity, MAX_QUANTITY
            )));
        }
        let anchor = match target {
            Some(t) => Some(graph.get_node(t).map_err(|_| {
                SceneGraphError::BadIntent(format!("unknown target {}", t))
            })?),
            None => None,
        };
        if anchor.is_none() && pose.is_none() {
            return Err(SceneGraphError::BadIntent(
                "add_object needs a target or an explicit pose".to_string(),
            ));
        }

        let on_target = matches!(relation, Some("on") | Some("onto") | Some("on_top_of"));
        let mut patch = GraphPatch::new("command-router");
        let mut placed: Vec<SceneNode> = Vec::new();

        for index in 0..quantity {
            let id = self.next_id(graph, &placed, canonical_type(object_type));
            let pos = match (pose, anchor) {
                (Some(pose), _) => Vec3::from(pose),
                (None, Some(anchor)) => {
                    if on_target {
                        self.place_on(graph, &placed, anchor, &template.size, index as usize)
                    } else {
                        self.place_near(graph, &placed, anchor, &template.size, index as usize)
                    }
                }
                (None, None) => unreachable!("validated above"),
            };

            let node = template.instantiate(id.clone(), pos);
            info!(id = %id, class = %node.class, x = pos.x, y = pos.y, z = pos.z, "placing object");

            if let (true, Some(anchor)) = (on_target, anchor) {
                if let Some(proposal) = relate_support(&node, anchor, &self.config) {
                    if let Some(inverse) = proposal.inverse {
                        patch = patch.add_relation(inverse);
                    }
                    patch = patch.add_relation(proposal.relation);
                }
            }
            for room in graph.nodes().filter(|n| n.is_room()) {
                if room.aabb().contains_point(&node.pos) {
                    patch = patch.add_relation(Relation::new(
                        RelationType::In,
                        node.id.clone(),
                        room.id.clone(),
                        1.0,
                    ));
                }
            }
            placed.push(node.clone());
            patch = patch.add_node(node);
        }
        Ok(PlannedIntent::Patch(patch))
    }

    fn plan_move(
        &self,
        graph: &SceneGraph,
        id: &str,
        new_pos: Option<[f64; 3]>,
        relative_to: Option<&str>,
        offset: Option<[f64; 3]>,
    ) -> Result<PlannedIntent> {
        if !graph.contains(id) {
            return Err(SceneGraphError::BadIntent(format!(
                "cannot move unknown object {}",
                id
            )));
        }
        let pos = match (new_pos, relative_to) {
            (Some(pos), None) => Vec3::from(pos),
            (None, Some(anchor_id)) => {
                let anchor = graph.get_node(anchor_id).map_err(|_| {
                    SceneGraphError::BadIntent(format!("unknown anchor {}", anchor_id))
                })?;
                anchor.pos.add(&Vec3::from(offset.unwrap_or([0.0, 0.0, 0.0])))
            }
            _ => {
                return Err(SceneGraphError::BadIntent(
                    "move_object needs exactly one of new_pos or relative_to".to_string(),
                ))
            }
        };
        Ok(PlannedIntent::Patch(
            GraphPatch::new("command-router").update_node(id.to_string(), NodeUpdate::position(pos)),
        ))
    }

    /// Smallest free numbered id for the type.
    fn next_id(&self, graph: &SceneGraph, placed: &[SceneNode], object_type: &str) -> NodeId {
        let taken = |candidate: &str| {
            graph.contains(candidate) || placed.iter().any(|n| n.id == candidate)
        };
        let mut n = 1;
        loop {
            let candidate = format!("{}_{}", object_type, n);
            if !taken(&candidate) {
                return candidate;
            }
            n += 1;
        }
    }

    /// Spot on the target's top face: surface center first, then a
    /// deterministic ring of offsets clamped to keep the footprint on the
    /// surface.
    fn place_on(
        &self,
        graph: &SceneGraph,
        placed: &[SceneNode],
        target: &SceneNode,
        size: &Vec3,
        salt: usize,
    ) -> Vec3 {
        let surface = target.aabb();
        let max_dx = (surface.half.x - size.x / 2.0).max(0.0);
        let max_dy = (surface.half.y - size.y / 2.0).max(0.0);

        for attempt in 0..PLACEMENT_ATTEMPTS {
            let step = attempt + salt;
            let offset = if step == 0 {
                (0.0, 0.0)
            } else {
                let angle = (step as f64) * std::f64::consts::TAU / (PLACEMENT_ATTEMPTS as f64);
                let radius = 0.08 * ((step as f64) / 2.0).ceil();
                (
                    (radius * angle.cos()).clamp(-max_dx, max_dx),
                    (radius * angle.sin()).clamp(-max_dy, max_dy),
                )
            };
            let candidate = place_on_surface(&surface, size, offset);
            if !self.occupied(graph, placed, &candidate, size, Some(&target.id)) {
                return candidate;
            }
        }
        place_on_surface(&surface, size, (0.0, 0.0))
    }

    /// Collision-free floor spot around the target: deterministic angles at
    /// slowly growing distance.
    fn place_near(
        &self,
        graph: &SceneGraph,
        placed: &[SceneNode],
        target: &SceneNode,
        size: &Vec3,
        salt: usize,
    ) -> Vec3 {
        let floor = graph.floor_z();
        for attempt in 0..PLACEMENT_ATTEMPTS {
            let step = attempt + salt;
            let angle = (step as f64) * std::f64::consts::TAU / (PLACEMENT_ATTEMPTS as f64);
            let distance = target.size.x.max(target.size.y) / 2.0 + 0.25 + 0.1 * (step as f64);
            let candidate = align_to_ground(
                &Vec3::new(
                    target.pos.x + distance * angle.cos(),
                    target.pos.y + distance * angle.sin(),
                    0.0,
                ),
                size,
                floor,
            );
            if !self.occupied(graph, placed, &candidate, size, None) {
                return candidate;
            }
        }
        align_to_ground(&target.pos, size, floor)
    }

    fn occupied(
        &self,
        graph: &SceneGraph,
        placed: &[SceneNode],
        candidate: &Vec3,
        size: &Vec3,
        ignore: Option<&str>,
    ) -> bool {
        let candidate = Aabb::new(*candidate, *size);
        graph
            .nodes()
            .filter(|n| !n.is_room() && Some(n.id.as_str()) != ignore)
            .map(|n| n.aabb())
            .chain(placed.iter().map(|n| n.aabb()))
            .any(|aabb| aabb.overlaps(&candidate))
    }
}
