use scenegraph_core::{Mobility, SceneNode, Vec3};
use std::collections::BTreeMap;

/// Blueprint for objects created through `add_object` intents: realistic
/// dimensions, affordances and mobility per object type.
#[derive(Debug, Clone)]
pub struct ObjectTemplate {
    pub class: &'static str,
    pub size: Vec3,
    pub affordances: &'static [&'static str],
    pub lom: Mobility,
    pub conf: f64,
    pub color: &'static str,
}

impl ObjectTemplate {
    pub fn instantiate(&self, id: impl Into<String>, pos: Vec3) -> SceneNode {
        SceneNode::new(id, self.class, pos, self.size)
            .with_affordances(self.affordances.iter().copied())
            .with_lom(self.lom)
            .with_conf(self.conf)
            .with_meta("color", serde_json::json!(self.color))
    }
}

macro_rules! template {
    ($class:expr, $w:expr, $d:expr, $h:expr, $aff:expr, $lom:expr, $conf:expr, $color:expr) => {
        ObjectTemplate {
            class: $class,
            size: Vec3 {
                x: $w,
                y: $d,
                z: $h,
            },
            affordances: $aff,
            lom: $lom,
            conf: $conf,
            color: $color,
        }
    };
}

/// Built-in object catalog, keyed by canonical type name.
pub fn builtin_templates() -> BTreeMap<&'static str, ObjectTemplate> {
    use Mobility::*;
    BTreeMap::from([
        (
            "coffee_cup",
            template!("cup", 0.08, 0.08, 0.10, &["hold_liquid", "portable"], High, 0.95, "white"),
        ),
        (
            "glass",
            template!("glass", 0.07, 0.07, 0.12, &["hold_liquid", "portable", "fragile"], High, 0.93, "transparent"),
        ),
        (
            "plate",
            template!("plate", 0.25, 0.25, 0.03, &["support", "portable"], Medium, 0.94, "white"),
        ),
        (
            "bowl",
            template!("bowl", 0.18, 0.18, 0.08, &["hold_food", "portable"], Medium, 0.92, "ceramic"),
        ),
        (
            "book",
            template!("book", 0.15, 0.23, 0.03, &["readable", "portable"], High, 0.96, "varied"),
        ),
        (
            "laptop",
            template!("laptop", 0.35, 0.25, 0.03, &["computing", "portable"], Medium, 0.98, "black"),
        ),
        (
            "phone",
            template!("phone", 0.07, 0.15, 0.01, &["communication", "portable"], High, 0.97, "black"),
        ),
        (
            "lamp",
            template!("lamp", 0.20, 0.20, 0.45, &["lighting"], Low, 0.94, "brass"),
        ),
        (
            "vase",
            template!("vase", 0.12, 0.12, 0.25, &["decorative", "hold_flowers"], Low, 0.91, "ceramic"),
        ),
        (
            "candle",
            template!("candle", 0.05, 0.05, 0.15, &["lighting", "decorative"], Medium, 0.89, "white"),
        ),
        (
            "apple",
            template!("fruit", 0.08, 0.08, 0.08, &["edible", "portable"], High, 0.88, "red"),
        ),
        (
            "bottle",
            template!("bottle", 0.08, 0.08, 0.25, &["hold_liquid", "portable"], High, 0.9, "green"),
        ),
        (
            "pen",
            template!("pen", 0.01, 0.14, 0.01, &["writing", "portable"], High, 0.85, "blue"),
        ),
        (
            "box",
            template!("box", 0.3, 0.3, 0.25, &["container", "support"], Medium, 0.9, "cardboard"),
        ),
    ])
}

/// Everyday synonyms accepted by the command router.
pub fn canonical_type(raw: &str) -> &str {
    match raw {
        "cup" | "mug" | "coffee_cup" => "coffee_cup",
        "dish" => "plate",
        "novel" => "book",
        "computer" => "laptop",
        "smartphone" => "phone",
        "light" => "lamp",
        "fruit" => "apple",
        "water_bottle" => "bottle",
        "pencil" => "pen",
        "crate" | "carton" => "box",
        other => other,
    }
}
