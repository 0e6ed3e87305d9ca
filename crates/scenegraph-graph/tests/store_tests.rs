use scenegraph_core::{
    GraphPatch, NodeUpdate, Relation, RelationKey, RelationType, SceneGraphError, SceneNode, Vec3,
};
use scenegraph_graph::{BootstrapDoc, SceneGraph};

const KITCHEN: &str = r#"{
  "scene": {
    "id": "kitchen_demo",
    "frame": "map",
    "rooms": [
      {"id": "kitchen", "cls": "room", "pos": [2.5, 2.5, 1.25],
       "bbox": {"type": "OBB", "xyz": [5.0, 5.0, 2.5]}, "lom": "fixed"}
    ],
    "objects": [
      {"id": "table_1", "cls": "table", "pos": [1.5, 1.5, 0.375],
       "bbox": {"type": "OBB", "xyz": [1.2, 0.8, 0.75]}, "aff": ["support"], "lom": "low"},
      {"id": "chair_12", "cls": "chair", "pos": [0.9, 1.6, 0.45],
       "bbox": {"type": "OBB", "xyz": [0.5, 0.5, 0.9]}},
      {"id": "stove", "cls": "stove", "pos": [3.5, 1.0, 0.45],
       "bbox": {"type": "OBB", "xyz": [0.6, 0.6, 0.9]}, "lom": "fixed",
       "state": {"power": "on"}}
    ],
    "relations": [
      {"r": "in", "a": "table_1", "b": "kitchen"},
      {"r": "in", "a": "chair_12", "b": "kitchen"},
      {"r": "in", "a": "stove", "b": "kitchen"}
    ]
  }
}"#;

fn kitchen() -> SceneGraph {
    let mut graph = SceneGraph::new();
    graph
        .load_bootstrap(&BootstrapDoc::from_str(KITCHEN).unwrap(), 1)
        .unwrap();
    graph
}

#[test]
fn bootstrap_populates_nodes_relations_and_one_event() {
    let graph = kitchen();
    assert_eq!(graph.nodes().count(), 4);
    assert_eq!(graph.relations().count(), 3);
    assert_eq!(graph.events().len(), 1);
    let chair = graph.get_node("chair_12").unwrap();
    assert_eq!(chair.lom, scenegraph_core::Mobility::Medium);
    assert_eq!(chair.conf, 1.0);
}

#[test]
fn bootstrap_rejects_missing_required_fields() {
    let raw = r#"{"scene": {"objects": [{"id": "x", "cls": "cup"}]}}"#;
    match BootstrapDoc::from_str(raw) {
        Err(SceneGraphError::BadBootstrap(_)) => {}
        other => panic!("expected BadBootstrap, got {:?}", other),
    }
}

#[test]
fn bootstrap_rejects_dangling_relations_atomically() {
    let raw = r#"{
      "scene": {
        "objects": [
          {"id": "cup_1", "cls": "cup", "pos": [0, 0, 0.05],
           "bbox": {"type": "OBB", "xyz": [0.08, 0.08, 0.1]}}
        ],
        "relations": [{"r": "near", "a": "cup_1", "b": "ghost"}]
      }
    }"#;
    let doc = BootstrapDoc::from_str(raw).unwrap();
    let mut graph = SceneGraph::new();
    assert!(matches!(
        graph.load_bootstrap(&doc, 1),
        Err(SceneGraphError::BadBootstrap(_))
    ));
    assert_eq!(graph.nodes().count(), 0);
    assert!(graph.events().is_empty());
}

#[test]
fn bootstrap_rejects_duplicate_ids() {
    let raw = r#"{
      "scene": {
        "objects": [
          {"id": "cup_1", "cls": "cup", "pos": [0, 0, 0.05],
           "bbox": {"type": "OBB", "xyz": [0.08, 0.08, 0.1]}},
          {"id": "cup_1", "cls": "cup", "pos": [1, 0, 0.05],
           "bbox": {"type": "OBB", "xyz": [0.08, 0.08, 0.1]}}
        ]
      }
    }"#;
    let doc = BootstrapDoc::from_str(raw).unwrap();
    let mut graph = SceneGraph::new();
    assert!(matches!(
        graph.load_bootstrap(&doc, 1),
        Err(SceneGraphError::BadBootstrap(_))
    ));
}

#[test]
fn get_node_surfaces_not_found() {
    let graph = kitchen();
    assert!(matches!(
        graph.get_node("fridge"),
        Err(SceneGraphError::NotFound(_))
    ));
}

#[test]
fn neighbors_respects_radius_and_excludes_self() {
    let graph = kitchen();
    let near_chair: Vec<_> = graph
        .neighbors("chair_12", 1.5)
        .unwrap()
        .iter()
        .map(|n| n.id.clone())
        .collect();
    assert!(near_chair.contains(&"table_1".to_string()));
    assert!(!near_chair.contains(&"chair_12".to_string()));
    assert!(!near_chair.contains(&"stove".to_string()));
}

#[test]
fn apply_patch_adds_updates_and_appends_events() {
    let mut graph = kitchen();
    let cup = SceneNode::new(
        "cup_1",
        "cup",
        Vec3::new(1.5, 1.5, 0.80),
        Vec3::new(0.08, 0.08, 0.10),
    );
    let mut patch = GraphPatch::new("command-router")
        .add_node(cup)
        .add_relation(
            Relation::new(RelationType::OnTopOf, "cup_1", "table_1", 0.95)
                .with_prop("height_diff", -0.425),
        );
    patch.ts = 2;
    let events = graph.apply_patch(&patch).unwrap();
    assert_eq!(events.len(), 2);
    assert!(graph.contains("cup_1"));
    let stored = graph
        .relation(&RelationKey::new(RelationType::OnTopOf, "cup_1", "table_1"))
        .unwrap();
    assert_eq!(stored.ts, 2);

    let mut update = GraphPatch::new("command-router")
        .update_node("cup_1", NodeUpdate::position(Vec3::new(1.6, 1.5, 0.80)));
    update.ts = 3;
    graph.apply_patch(&update).unwrap();
    assert_eq!(graph.get_node("cup_1").unwrap().pos.x, 1.6);
}

#[test]
fn lww_keeps_newer_field_values() {
    let mut graph = kitchen();
    let mut newer = GraphPatch::new("agent_b")
        .update_node("chair_12", NodeUpdate::position(Vec3::new(2.0, 1.0, 0.45)));
    newer.ts = 10;
    graph.apply_patch(&newer).unwrap();

    let mut older = GraphPatch::new("agent_a")
        .update_node("chair_12", NodeUpdate::position(Vec3::new(0.0, 0.0, 0.45)));
    older.ts = 5;
    let events = graph.apply_patch(&older).unwrap();
    assert!(events.is_empty());
    assert_eq!(graph.get_node("chair_12").unwrap().pos.x, 2.0);
}

#[test]
fn lww_breaks_timestamp_ties_by_origin() {
    let mut graph = kitchen();
    let mut first = GraphPatch::new("agent_b")
        .update_node("chair_12", NodeUpdate::position(Vec3::new(2.0, 1.0, 0.45)));
    first.ts = 10;
    graph.apply_patch(&first).unwrap();

    // Same timestamp, lexicographically smaller origin: loses.
    let mut rival = GraphPatch::new("agent_a")
        .update_node("chair_12", NodeUpdate::position(Vec3::new(9.0, 9.0, 0.45)));
    rival.ts = 10;
    graph.apply_patch(&rival).unwrap();
    assert_eq!(graph.get_node("chair_12").unwrap().pos.x, 2.0);

    // Same timestamp, greater origin: wins.
    let mut winner = GraphPatch::new("agent_c")
        .update_node("chair_12", NodeUpdate::position(Vec3::new(4.0, 4.0, 0.45)));
    winner.ts = 10;
    graph.apply_patch(&winner).unwrap();
    assert_eq!(graph.get_node("chair_12").unwrap().pos.x, 4.0);
}

#[test]
fn dangling_relation_rejects_whole_patch() {
    let mut graph = kitchen();
    let before = graph.events().len();
    let cup = SceneNode::new(
        "cup_1",
        "cup",
        Vec3::new(1.5, 1.5, 0.80),
        Vec3::new(0.08, 0.08, 0.10),
    );
    let mut patch = GraphPatch::new("command-router")
        .add_node(cup)
        .add_relation(Relation::new(RelationType::Near, "cup_1", "ghost", 0.9));
    patch.ts = 2;
    assert!(matches!(
        graph.apply_patch(&patch),
        Err(SceneGraphError::DanglingRef(_))
    ));
    // Atomic: the add did not land either.
    assert!(!graph.contains("cup_1"));
    assert_eq!(graph.events().len(), before);
}

#[test]
fn relation_remove_is_ignored_when_stale() {
    let mut graph = kitchen();
    let mut add = GraphPatch::new("agent_a")
        .add_relation(Relation::new(RelationType::Near, "chair_12", "table_1", 0.8));
    add.ts = 10;
    graph.apply_patch(&add).unwrap();

    let key = RelationKey::new(RelationType::Near, "chair_12", "table_1");
    let mut stale = GraphPatch::new("agent_b").remove_relation(key.clone());
    stale.ts = 5;
    graph.apply_patch(&stale).unwrap();
    assert!(graph.relation(&key).is_some());

    let mut fresh = GraphPatch::new("agent_b").remove_relation(key.clone());
    fresh.ts = 11;
    graph.apply_patch(&fresh).unwrap();
    assert!(graph.relation(&key).is_none());
}

#[test]
fn removing_a_node_drops_its_relations() {
    let mut graph = kitchen();
    let mut patch = GraphPatch::new("command-router").remove_node("chair_12");
    patch.ts = 2;
    let events = graph.apply_patch(&patch).unwrap();
    assert!(!graph.contains("chair_12"));
    assert!(graph.relations().all(|r| r.a != "chair_12" && r.b != "chair_12"));
    // in(chair_12, kitchen) removal plus the node removal itself.
    assert_eq!(events.len(), 2);
}

#[test]
fn self_loops_are_rejected() {
    let mut graph = kitchen();
    let mut patch = GraphPatch::new("agent_a")
        .add_relation(Relation::new(RelationType::Near, "chair_12", "chair_12", 0.9));
    patch.ts = 2;
    assert!(matches!(
        graph.apply_patch(&patch),
        Err(SceneGraphError::BadIntent(_))
    ));
}

#[test]
fn export_round_trips_nodes_and_relations() {
    let graph = kitchen();
    let exported = BootstrapDoc::export(&graph, "kitchen_demo");
    let raw = serde_json::to_string(&exported).unwrap();
    let mut reloaded = SceneGraph::new();
    reloaded
        .load_bootstrap(&BootstrapDoc::from_str(&raw).unwrap(), 1)
        .unwrap();

    assert_eq!(reloaded.nodes().count(), graph.nodes().count());
    assert_eq!(reloaded.relations().count(), graph.relations().count());
    for node in graph.nodes() {
        let twin = reloaded.get_node(&node.id).unwrap();
        assert_eq!(twin.class, node.class);
        assert_eq!(twin.pos, node.pos);
        assert_eq!(twin.size, node.size);
        assert_eq!(twin.lom, node.lom);
        assert_eq!(twin.affordances, node.affordances);
    }
}

#[test]
fn bootstrap_file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("scene.json");
    std::fs::write(&path, KITCHEN).unwrap();
    let doc = BootstrapDoc::from_path(&path).unwrap();
    assert_eq!(doc.scene.objects.len(), 3);
    assert_eq!(doc.scene.frame, "map");
}

#[test]
fn inverse_patch_restores_translated_position() {
    let mut graph = kitchen();
    let original = graph.get_node("chair_12").unwrap().pos;

    let mut forward = GraphPatch::new("command-router")
        .update_node("chair_12", NodeUpdate::position(Vec3::new(2.9, 1.0, 0.45)));
    forward.ts = 2;
    graph.apply_patch(&forward).unwrap();

    let mut inverse = GraphPatch::new("command-router")
        .update_node("chair_12", NodeUpdate::position(original));
    inverse.ts = 3;
    graph.apply_patch(&inverse).unwrap();
    assert_eq!(graph.get_node("chair_12").unwrap().pos, original);
}

#[test]
fn add_then_remove_relation_restores_store() {
    let mut graph = kitchen();
    let before: Vec<RelationKey> = graph.relations().map(|r| r.key()).collect();

    let key = RelationKey::new(RelationType::Near, "chair_12", "table_1");
    let mut add = GraphPatch::new("agent_a")
        .add_relation(Relation::new(RelationType::Near, "chair_12", "table_1", 0.8));
    add.ts = 2;
    graph.apply_patch(&add).unwrap();
    let mut remove = GraphPatch::new("agent_a").remove_relation(key);
    remove.ts = 3;
    graph.apply_patch(&remove).unwrap();

    let after: Vec<RelationKey> = graph.relations().map(|r| r.key()).collect();
    assert_eq!(before, after);
}

#[test]
fn context_returns_top_k_with_notices() {
    let graph = kitchen();
    let ctx = graph.as_context(Vec3::new(3.0, 1.0, 1.6), "kitchen", 2);
    assert_eq!(ctx.objects.len(), 2);
    // Viewer stands at the stove; it must be in the top-k.
    assert!(ctx.objects.iter().any(|o| o.id == "stove"));
    assert!(ctx.notices.iter().any(|n| n.contains("Stove is ON")));
    assert!(ctx.summary.contains("kitchen"));
}
