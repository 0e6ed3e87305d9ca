use crate::{clamp, Relation, RelationType, SceneConfig, SceneNode};
use std::collections::BTreeMap;

/// Numeric slack for resting-contact tests.
pub const CONTACT_EPSILON: f64 = 0.02;
/// Maximum center-height difference for `beside`.
pub const TAU_LEVEL: f64 = 0.15;
/// Maximum XY distance for `beside`.
pub const TAU_BESIDE: f64 = 1.2;

/// A candidate relation produced by a predicate. The caller decides whether
/// to propose it.
#[derive(Debug, Clone)]
pub struct Proposal {
    pub relation: Relation,
    /// Stored counterpart for directed relations (`supports` for
    /// `on_top_of`), carried so both ends commit together.
    pub inverse: Option<Relation>,
    /// Predicate name, sent as the provenance basis of a proposal.
    pub basis: &'static str,
}

impl Proposal {
    fn simple(relation: Relation, basis: &'static str) -> Self {
        Self {
            relation,
            inverse: None,
            basis,
        }
    }
}

pub type PredicateFn = fn(&SceneNode, &SceneNode, &SceneConfig) -> Option<Proposal>;

/// `near` within `tau_near`, `far` beyond it with a symmetric ramp that
/// saturates at `tau_far`.
pub fn relate_proximity(a: &SceneNode, b: &SceneNode, cfg: &SceneConfig) -> Option<Proposal> {
    let d = a.pos.distance(&b.pos);
    if d <= cfg.tau_near {
        let conf = clamp(1.0 - d / cfg.tau_near, 0.1, 1.0);
        let relation = Relation::new(RelationType::Near, a.id.clone(), b.id.clone(), conf)
            .with_prop("dist", d);
        Some(Proposal::simple(relation, "topology.relate_proximity"))
    } else {
        let conf = clamp((d - cfg.tau_near) / cfg.tau_near, 0.1, 1.0);
        let relation = Relation::new(RelationType::Far, a.id.clone(), b.id.clone(), conf)
            .with_prop("dist", d);
        Some(Proposal::simple(relation, "topology.relate_proximity"))
    }
}

/// Resting gap between `a`'s bottom face and `b`'s top face.
fn resting_gap(a: &SceneNode, b: &SceneNode) -> f64 {
    a.aabb().bottom() - b.aabb().top()
}

/// Does `a` rest on `b`? All three conditions must hold: footprint overlap
/// of at least half of `a`, a resting gap within tolerance, and a
/// support-capable `b`.
pub fn rests_on(a: &SceneNode, b: &SceneNode, cfg: &SceneConfig) -> bool {
    if !b.can_support() {
        return false;
    }
    if a.aabb().xy_overlap_fraction(&b.aabb()) < 0.5 {
        return false;
    }
    let g = resting_gap(a, b);
    (-CONTACT_EPSILON..=cfg.tau_contact).contains(&g)
}

/// `on_top_of(a, b)` plus its stored counterpart `supports(b, a)`.
pub fn relate_support(a: &SceneNode, b: &SceneNode, cfg: &SceneConfig) -> Option<Proposal> {
    if !rests_on(a, b, cfg) {
        return None;
    }
    let g = resting_gap(a, b);
    let conf = clamp(1.0 - g.abs() / cfg.tau_contact, 0.5, 0.99);
    let relation = Relation::new(RelationType::OnTopOf, a.id.clone(), b.id.clone(), conf)
        .with_prop("height_diff", b.pos.z - a.pos.z);
    let inverse = relation.inverse();
    Some(Proposal {
        relation,
        inverse,
        basis: "topology.relate_support",
    })
}

/// The supporter's view of a resting pair: `supports(a, b)` when `b` rests
/// on `a`. Without this the supporter's top candidate for the pair would be
/// `near`, which would contradict and supersede the support edge.
pub fn relate_supporting(a: &SceneNode, b: &SceneNode, cfg: &SceneConfig) -> Option<Proposal> {
    let p = relate_support(b, a, cfg)?;
    let relation = p.inverse?;
    Some(Proposal {
        relation,
        inverse: Some(p.relation),
        basis: "topology.relate_support",
    })
}

/// Side-by-side at the same level, and not a resting pair.
pub fn relate_beside(a: &SceneNode, b: &SceneNode, cfg: &SceneConfig) -> Option<Proposal> {
    if (a.pos.z - b.pos.z).abs() > TAU_LEVEL {
        return None;
    }
    let d_xy = a.pos.distance_xy(&b.pos);
    if d_xy > TAU_BESIDE {
        return None;
    }
    if rests_on(a, b, cfg) || rests_on(b, a, cfg) {
        return None;
    }
    let conf = clamp(1.0 - d_xy / TAU_BESIDE, 0.1, 1.0);
    let relation = Relation::new(RelationType::Beside, a.id.clone(), b.id.clone(), conf)
        .with_prop("dist", d_xy);
    Some(Proposal::simple(relation, "topology.relate_beside"))
}

/// Overlapping XY projections separated by more than the contact gap.
pub fn relate_vertical(a: &SceneNode, b: &SceneNode, cfg: &SceneConfig) -> Option<Proposal> {
    let (abox, bbox) = (a.aabb(), b.aabb());
    let fraction = abox.xy_overlap_fraction(&bbox);
    if fraction <= 0.0 {
        return None;
    }
    let conf = clamp(fraction, 0.1, 1.0);
    let kind = if abox.bottom() - bbox.top() > cfg.tau_contact {
        RelationType::Above
    } else if bbox.bottom() - abox.top() > cfg.tau_contact {
        RelationType::Below
    } else {
        return None;
    };
    let relation = Relation::new(kind, a.id.clone(), b.id.clone(), conf)
        .with_prop("height_diff", b.pos.z - a.pos.z);
    Some(Proposal::simple(relation, "topology.relate_vertical"))
}

/// Centroid containment in a room or a container-affordance node.
pub fn relate_containment(a: &SceneNode, b: &SceneNode, _cfg: &SceneConfig) -> Option<Proposal> {
    if !(b.is_room() || b.has_affordance("container")) {
        return None;
    }
    if !b.aabb().contains_point(&a.pos) {
        return None;
    }
    let relation = Relation::new(RelationType::In, a.id.clone(), b.id.clone(), 1.0);
    Some(Proposal::simple(relation, "topology.relate_containment"))
}

/// Predicate registry: tag to predicate function. Adding a relation kind
/// means registering, not subclassing.
#[derive(Clone)]
pub struct PredicateRegistry {
    predicates: BTreeMap<String, PredicateFn>,
}

impl PredicateRegistry {
    pub fn empty() -> Self {
        Self {
            predicates: BTreeMap::new(),
        }
    }

    pub fn register(&mut self, tag: impl Into<String>, predicate: PredicateFn) {
        self.predicates.insert(tag.into(), predicate);
    }

    /// Every candidate the registered predicates emit for the ordered pair.
    pub fn evaluate(&self, a: &SceneNode, b: &SceneNode, cfg: &SceneConfig) -> Vec<Proposal> {
        self.predicates
            .values()
            .filter_map(|predicate| predicate(a, b, cfg))
            .collect()
    }

    /// Highest-priority positive candidate for the pair; only this one is
    /// proposed per tick. Ties on priority go to the higher confidence.
    pub fn best(&self, a: &SceneNode, b: &SceneNode, cfg: &SceneConfig) -> Option<Proposal> {
        self.evaluate(a, b, cfg).into_iter().max_by(|x, y| {
            let px = x.relation.kind.priority();
            let py = y.relation.kind.priority();
            px.cmp(&py)
                .then(x.relation.conf.total_cmp(&y.relation.conf))
        })
    }
}

impl Default for PredicateRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register("proximity", relate_proximity);
        registry.register("support", relate_support);
        registry.register("supporting", relate_supporting);
        registry.register("beside", relate_beside);
        registry.register("vertical", relate_vertical);
        registry.register("containment", relate_containment);
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Mobility, Vec3};

    fn table() -> SceneNode {
        SceneNode::new(
            "table_1",
            "table",
            Vec3::new(1.5, 1.5, 0.375),
            Vec3::new(1.2, 0.8, 0.75),
        )
        .with_affordances(["support"])
        .with_lom(Mobility::Low)
    }

    fn cup_at(pos: Vec3) -> SceneNode {
        SceneNode::new("cup_1", "cup", pos, Vec3::new(0.08, 0.08, 0.10)).with_lom(Mobility::High)
    }

    fn cfg() -> SceneConfig {
        SceneConfig::default()
    }

    #[test]
    fn near_confidence_falls_off_with_distance() {
        let a = cup_at(Vec3::new(0.0, 0.0, 0.05));
        let b = SceneNode::new("cup_2", "cup", Vec3::new(0.3, 0.0, 0.05), Vec3::new(0.08, 0.08, 0.10));
        let p = relate_proximity(&a, &b, &cfg()).unwrap();
        assert_eq!(p.relation.kind, RelationType::Near);
        assert!((p.relation.conf - 0.6).abs() < 1e-9);
        assert!((p.relation.prop("dist").unwrap() - 0.3).abs() < 1e-9);
    }

    #[test]
    fn identical_positions_give_near_with_full_confidence() {
        let a = cup_at(Vec3::new(1.0, 1.0, 0.05));
        let b = SceneNode::new("cup_2", "cup", Vec3::new(1.0, 1.0, 0.05), Vec3::new(0.08, 0.08, 0.10));
        let p = relate_proximity(&a, &b, &cfg()).unwrap();
        assert_eq!(p.relation.kind, RelationType::Near);
        assert_eq!(p.relation.conf, 1.0);
        // Stacked in place they cannot rest on each other.
        assert!(relate_support(&a, &b, &cfg()).is_none());
    }

    #[test]
    fn far_ramps_up_past_tau_near() {
        let a = cup_at(Vec3::new(0.0, 0.0, 0.05));
        let b = SceneNode::new("cup_2", "cup", Vec3::new(1.4, 0.0, 0.05), Vec3::new(0.08, 0.08, 0.10));
        let p = relate_proximity(&a, &b, &cfg()).unwrap();
        assert_eq!(p.relation.kind, RelationType::Far);
        assert!(p.relation.conf > 0.8);
    }

    #[test]
    fn resting_cup_is_on_top_of_table() {
        // Table top at z = 0.75; cup half-height 0.05.
        let cup = cup_at(Vec3::new(1.5, 1.5, 0.80));
        let p = relate_support(&cup, &table(), &cfg()).unwrap();
        assert_eq!(p.relation.kind, RelationType::OnTopOf);
        assert!(p.relation.conf >= 0.9);
        let inv = p.inverse.unwrap();
        assert_eq!(inv.kind, RelationType::Supports);
        assert_eq!(inv.a, "table_1");
        assert_eq!(inv.conf, p.relation.conf);
    }

    #[test]
    fn hovering_cup_is_not_supported() {
        let cup = cup_at(Vec3::new(1.5, 1.5, 1.0));
        assert!(relate_support(&cup, &table(), &cfg()).is_none());
    }

    #[test]
    fn support_requires_capable_base() {
        let book = SceneNode::new(
            "book_1",
            "book",
            Vec3::new(1.5, 1.5, 0.765),
            Vec3::new(0.15, 0.23, 0.03),
        )
        .with_lom(Mobility::High);
        let cup = cup_at(Vec3::new(1.5, 1.5, 0.845));
        // A high-mobility book without the support affordance cannot carry.
        assert!(relate_support(&cup, &book, &cfg()).is_none());
    }

    #[test]
    fn beside_excludes_resting_pairs() {
        let chair = SceneNode::new(
            "chair_12",
            "chair",
            Vec3::new(1.0, 1.5, 0.45),
            Vec3::new(0.5, 0.5, 0.9),
        );
        let other = SceneNode::new(
            "chair_13",
            "chair",
            Vec3::new(1.6, 1.5, 0.45),
            Vec3::new(0.5, 0.5, 0.9),
        );
        assert!(relate_beside(&chair, &other, &cfg()).is_some());

        // A thin plate resting on a tray sits at nearly the same level but
        // must stay an on-top pair, not a beside pair.
        let tray = SceneNode::new(
            "tray_1",
            "tray",
            Vec3::new(2.0, 2.0, 0.015),
            Vec3::new(0.4, 0.3, 0.03),
        )
        .with_affordances(["support"]);
        let plate = SceneNode::new(
            "plate_1",
            "plate",
            Vec3::new(2.0, 2.0, 0.045),
            Vec3::new(0.25, 0.25, 0.03),
        );
        assert!(rests_on(&plate, &tray, &cfg()));
        assert!(relate_beside(&plate, &tray, &cfg()).is_none());
    }

    #[test]
    fn above_needs_xy_overlap_and_clearance() {
        let lamp = SceneNode::new(
            "lamp_1",
            "lamp",
            Vec3::new(1.5, 1.5, 2.0),
            Vec3::new(0.2, 0.2, 0.3),
        );
        let p = relate_vertical(&lamp, &table(), &cfg()).unwrap();
        assert_eq!(p.relation.kind, RelationType::Above);
        let p = relate_vertical(&table(), &lamp, &cfg()).unwrap();
        assert_eq!(p.relation.kind, RelationType::Below);
    }

    #[test]
    fn containment_only_applies_to_rooms_and_containers() {
        let kitchen = SceneNode::new(
            "kitchen",
            "room",
            Vec3::new(2.5, 2.5, 1.25),
            Vec3::new(5.0, 5.0, 2.5),
        )
        .with_lom(Mobility::Fixed);
        let cup = cup_at(Vec3::new(1.5, 1.5, 0.80));
        let p = relate_containment(&cup, &kitchen, &cfg()).unwrap();
        assert_eq!(p.relation.kind, RelationType::In);
        assert_eq!(p.relation.conf, 1.0);
        assert!(relate_containment(&cup, &table(), &cfg()).is_none());
    }

    #[test]
    fn registry_prefers_on_top_of_over_near() {
        let registry = PredicateRegistry::default();
        let cup = cup_at(Vec3::new(1.5, 1.5, 0.80));
        let best = registry.best(&cup, &table(), &cfg()).unwrap();
        assert_eq!(best.relation.kind, RelationType::OnTopOf);
    }

    #[test]
    fn supporter_sees_the_pair_as_supports() {
        let registry = PredicateRegistry::default();
        let cup = cup_at(Vec3::new(1.5, 1.5, 0.80));
        let best = registry.best(&table(), &cup, &cfg()).unwrap();
        assert_eq!(best.relation.kind, RelationType::Supports);
        assert_eq!(best.relation.a, "table_1");
        assert_eq!(best.inverse.unwrap().kind, RelationType::OnTopOf);
    }

    #[test]
    fn registry_accepts_custom_predicates() {
        fn always_linked(a: &SceneNode, b: &SceneNode, _cfg: &SceneConfig) -> Option<Proposal> {
            Some(Proposal::simple(
                Relation::new(
                    RelationType::Other("linked".into()),
                    a.id.clone(),
                    b.id.clone(),
                    0.4,
                ),
                "custom.always_linked",
            ))
        }
        let mut registry = PredicateRegistry::empty();
        registry.register("linked", always_linked);
        let found = registry.evaluate(&cup_at(Vec3::new(0.0, 0.0, 0.05)), &table(), &cfg());
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].relation.kind, RelationType::Other("linked".into()));
    }
}
