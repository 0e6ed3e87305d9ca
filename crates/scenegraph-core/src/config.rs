use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Runtime configuration. Every field has a serde default so partial
/// config files work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneConfig {
    /// Euclidean radius within which an agent considers neighbors.
    #[serde(default = "SceneConfig::default_perception_radius")]
    pub perception_radius: f64,
    /// Per-class overrides of the perception radius.
    #[serde(default)]
    pub class_perception: BTreeMap<String, f64>,
    /// Distance under which two nodes count as `near`.
    #[serde(default = "SceneConfig::default_tau_near")]
    pub tau_near: f64,
    /// Maximum resting gap for `on_top_of`.
    #[serde(default = "SceneConfig::default_tau_contact")]
    pub tau_contact: f64,
    /// Minimum confidence before an agent proposes a relation.
    #[serde(default = "SceneConfig::default_tau_propose")]
    pub tau_propose: f64,
    /// Minimum confidence for a receiving agent to accept a proposal.
    #[serde(default = "SceneConfig::default_tau_accept")]
    pub tau_accept: f64,
    /// Minimum confidence of a contradicting relation before the old one is
    /// dropped.
    #[serde(default = "SceneConfig::default_tau_supersede")]
    pub tau_supersede: f64,
    #[serde(default = "SceneConfig::default_tick_budget_ms")]
    pub tick_budget_ms: u64,
    /// Rotation propagation for cascades; translations only when false.
    #[serde(default)]
    pub cascade_rotation: bool,
    /// Ordered cluster-typing heuristics; the first rule whose class tag
    /// matches a member names the cluster.
    #[serde(default = "SceneConfig::default_cluster_rules")]
    pub cluster_rules: Vec<ClusterRule>,
    /// Nominal viewer pose for accessibility and `as_context`.
    #[serde(default = "SceneConfig::default_viewer_pose")]
    pub viewer_pose: [f64; 3],
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterRule {
    pub class_tags: Vec<String>,
    pub cluster_type: String,
}

impl SceneConfig {
    fn default_perception_radius() -> f64 {
        1.5
    }
    fn default_tau_near() -> f64 {
        0.75
    }
    fn default_tau_contact() -> f64 {
        0.05
    }
    fn default_tau_propose() -> f64 {
        0.5
    }
    fn default_tau_accept() -> f64 {
        0.6
    }
    fn default_tau_supersede() -> f64 {
        0.55
    }
    fn default_tick_budget_ms() -> u64 {
        100
    }
    fn default_viewer_pose() -> [f64; 3] {
        [0.0, 0.0, 1.6]
    }

    fn default_cluster_rules() -> Vec<ClusterRule> {
        vec![
            ClusterRule {
                class_tags: vec!["table".into()],
                cluster_type: "table_group".into(),
            },
            ClusterRule {
                class_tags: vec!["stove".into(), "oven".into()],
                cluster_type: "cooking_area".into(),
            },
        ]
    }

    /// `far` fades in above this distance and saturates at `2 * tau_near`.
    pub fn tau_far(&self) -> f64 {
        2.0 * self.tau_near
    }

    pub fn perception_radius_for(&self, class: &str) -> f64 {
        self.class_perception
            .get(class)
            .copied()
            .unwrap_or(self.perception_radius)
    }
}

impl Default for SceneConfig {
    fn default() -> Self {
        serde_json::from_str("{}").expect("empty config deserializes from defaults")
    }
}
