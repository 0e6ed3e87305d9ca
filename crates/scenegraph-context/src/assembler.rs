use scenegraph_core::{Mobility, NodeId, RelationType, SceneConfig, Vec3};
use scenegraph_graph::{SceneGraph, SupportSystem};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

/// The single structured snapshot consumed by the question dispatcher and
/// external renderers. Pure function of the store and support indices.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpatialSnapshot {
    pub scene_summary: SceneSummary,
    pub objects: BTreeMap<NodeId, ObjectSummary>,
    pub relationships: Vec<RelationSummary>,
    pub support_dependencies: SupportSummary,
    pub spatial_clusters: Vec<Cluster>,
    pub accessibility: BTreeMap<NodeId, AccessibilityRecord>,
    pub stability: BTreeMap<NodeId, StabilityRecord>,
    pub insights: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneSummary {
    pub total_objects: usize,
    pub class_counts: BTreeMap<String, usize>,
    pub relation_counts: BTreeMap<String, usize>,
    pub scene_bounds: SceneBounds,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneBounds {
    pub x: (f64, f64),
    pub y: (f64, f64),
    pub z: (f64, f64),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectSummary {
    pub id: NodeId,
    pub name: String,
    pub class: String,
    pub pos: Vec3,
    pub size: Vec3,
    pub affordances: Vec<String>,
    pub lom: Mobility,
    pub confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationSummary {
    #[serde(rename = "type")]
    pub kind: RelationType,
    pub subject: NodeId,
    pub object: NodeId,
    pub properties: BTreeMap<String, serde_json::Value>,
    pub confidence: f64,
    /// "reserved" for the closed vocabulary, "custom" otherwise.
    pub type_source: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupportSummary {
    pub supported_by: BTreeMap<NodeId, NodeId>,
    pub dependents: BTreeMap<NodeId, Vec<NodeId>>,
    pub recursive_dependents: BTreeMap<NodeId, Vec<NodeId>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cluster {
    pub members: Vec<NodeId>,
    pub cluster_type: String,
    pub center: Vec3,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessibilityRecord {
    pub score: f64,
    pub category: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StabilityRecord {
    pub chain_depth: usize,
    pub risk: String,
}

/// Build the full spatial snapshot from the store and support indices.
pub fn assemble(graph: &SceneGraph, support: &SupportSystem, cfg: &SceneConfig) -> SpatialSnapshot {
    let objects: BTreeMap<NodeId, ObjectSummary> = graph
        .nodes()
        .filter(|n| !n.is_room())
        .map(|n| {
            (
                n.id.clone(),
                ObjectSummary {
                    id: n.id.clone(),
                    name: n.name.clone(),
                    class: n.class.clone(),
                    pos: n.pos,
                    size: n.size,
                    affordances: n.affordances.clone(),
                    lom: n.lom,
                    confidence: n.conf,
                },
            )
        })
        .collect();

    let relationships: Vec<RelationSummary> = graph
        .relations()
        .map(|r| RelationSummary {
            kind: r.kind.clone(),
            subject: r.a.clone(),
            object: r.b.clone(),
            properties: r.props.clone(),
            confidence: r.conf,
            type_source: if r.kind.is_reserved() {
                "reserved".to_string()
            } else {
                "custom".to_string()
            },
        })
        .collect();

    let mut class_counts: BTreeMap<String, usize> = BTreeMap::new();
    for node in graph.nodes() {
        *class_counts.entry(node.class.clone()).or_default() += 1;
    }
    let mut relation_counts: BTreeMap<String, usize> = BTreeMap::new();
    for relation in graph.relations() {
        *relation_counts.entry(relation.kind.to_string()).or_default() += 1;
    }

    let support_dependencies = SupportSummary {
        supported_by: support.supported_by_index().clone(),
        dependents: support
            .dependents_index()
            .iter()
            .map(|(k, v)| (k.clone(), v.iter().cloned().collect()))
            .collect(),
        recursive_dependents: support
            .dependents_index()
            .keys()
            .map(|k| {
                (
                    k.clone(),
                    support.recursive_dependents(k).into_iter().collect(),
                )
            })
            .collect(),
    };

    let accessibility: BTreeMap<NodeId, AccessibilityRecord> = objects
        .keys()
        .filter_map(|id| {
            support.accessibility(graph, cfg, id).map(|(score, category)| {
                (
                    id.clone(),
                    AccessibilityRecord {
                        score,
                        category: category.to_string(),
                    },
                )
            })
        })
        .collect();

    let stability: BTreeMap<NodeId, StabilityRecord> = objects
        .keys()
        .map(|id| {
            let depth = support.chain_depth(id);
            (
                id.clone(),
                StabilityRecord {
                    chain_depth: depth,
                    risk: SupportSystem::stability_risk(depth).to_string(),
                },
            )
        })
        .collect();

    let spatial_clusters = cluster(graph, cfg);
    let insights = derive_insights(graph, support, &relation_counts);

    SpatialSnapshot {
        scene_summary: SceneSummary {
            total_objects: objects.len(),
            class_counts,
            relation_counts,
            scene_bounds: bounds(graph),
        },
        objects,
        relationships,
        support_dependencies,
        spatial_clusters,
        accessibility,
        stability,
        insights,
    }
}

fn bounds(graph: &SceneGraph) -> SceneBounds {
    let mut b = SceneBounds {
        x: (f64::INFINITY, f64::NEG_INFINITY),
        y: (f64::INFINITY, f64::NEG_INFINITY),
        z: (f64::INFINITY, f64::NEG_INFINITY),
    };
    for node in graph.nodes() {
        let aabb = node.aabb();
        let (min, max) = (aabb.min(), aabb.max());
        b.x = (b.x.0.min(min.x), b.x.1.max(max.x));
        b.y = (b.y.0.min(min.y), b.y.1.max(max.y));
        b.z = (b.z.0.min(min.z), b.z.1.max(max.z));
    }
    if !b.x.0.is_finite() {
        b = SceneBounds {
            x: (0.0, 0.0),
            y: (0.0, 0.0),
            z: (0.0, 0.0),
        };
    }
    b
}

/// Connected components under near/on_top_of/beside, typed by the first
/// matching cluster rule.
fn cluster(graph: &SceneGraph, cfg: &SceneConfig) -> Vec<Cluster> {
    let ids: Vec<NodeId> = graph
        .nodes()
        .filter(|n| !n.is_room())
        .map(|n| n.id.clone())
        .collect();

    let mut adjacency: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    for relation in graph.relations() {
        if !matches!(
            relation.kind,
            RelationType::Near | RelationType::OnTopOf | RelationType::Beside
        ) {
            continue;
        }
        adjacency
            .entry(relation.a.as_str())
            .or_default()
            .insert(relation.b.as_str());
        adjacency
            .entry(relation.b.as_str())
            .or_default()
            .insert(relation.a.as_str());
    }

    let mut seen: BTreeSet<&str> = BTreeSet::new();
    let mut clusters = Vec::new();
    for id in &ids {
        if seen.contains(id.as_str()) {
            continue;
        }
        let mut members = Vec::new();
        let mut queue = VecDeque::from([id.as_str()]);
        seen.insert(id.as_str());
        while let Some(current) = queue.pop_front() {
            members.push(current.to_string());
            if let Some(linked) = adjacency.get(current) {
                for next in linked.iter().copied() {
                    if graph.contains(next) && seen.insert(next) {
                        queue.push_back(next);
                    }
                }
            }
        }
        members.sort();

        let classes: BTreeSet<&str> = members
            .iter()
            .filter_map(|m| graph.node(m).map(|n| n.class.as_str()))
            .collect();
        let cluster_type = if members.len() == 1 {
            "singleton".to_string()
        } else {
            cfg.cluster_rules
                .iter()
                .find(|rule| rule.class_tags.iter().any(|t| classes.contains(t.as_str())))
                .map(|rule| rule.cluster_type.clone())
                .unwrap_or_else(|| "object_group".to_string())
        };

        let mut center = Vec3::ZERO;
        for member in &members {
            if let Some(node) = graph.node(member) {
                center = center.add(&node.pos);
            }
        }
        let n = members.len().max(1) as f64;
        clusters.push(Cluster {
            members,
            cluster_type,
            center: Vec3::new(center.x / n, center.y / n, center.z / n),
        });
    }
    clusters
}

fn derive_insights(
    graph: &SceneGraph,
    support: &SupportSystem,
    relation_counts: &BTreeMap<String, usize>,
) -> Vec<String> {
    let mut insights = Vec::new();

    if let Some(stacked) = relation_counts.get("on_top_of") {
        insights.push(format!("Scene has {} stacking relationships", stacked));
    }
    let supported = support.supported_by_index().len();
    if supported > 0 {
        insights.push(format!("{} objects depend on others for support", supported));
    }
    for (supporter, dependents) in support.dependents_index() {
        insights.push(format!("{} objects depend on {}", dependents.len(), supporter));
    }
    let fixed = graph
        .nodes()
        .filter(|n| !n.is_room() && n.lom == Mobility::Fixed)
        .count();
    if fixed > 0 {
        insights.push(format!("{} objects are fixed in place", fixed));
    }
    insights
}
