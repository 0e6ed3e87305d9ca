use scenegraph_agents::Orchestrator;
use scenegraph_context::{assemble, classify, QuestionDispatcher, QuestionType};
use scenegraph_core::SceneConfig;
use scenegraph_graph::BootstrapDoc;

/// Kitchen with a chair clear of the table, a cup and a book on the table,
/// and seeded relations so no negotiation ticks are needed.
const SCENE: &str = r#"{
  "scene": {
    "id": "qa_kitchen",
    "rooms": [
      {"id": "kitchen", "cls": "room", "pos": [2.5, 2.5, 1.25],
       "bbox": {"type": "OBB", "xyz": [5.0, 5.0, 2.5]}, "lom": "fixed"}
    ],
    "objects": [
      {"id": "table_1", "cls": "table", "pos": [1.5, 1.5, 0.375],
       "bbox": {"type": "OBB", "xyz": [1.2, 0.8, 0.75]}, "aff": ["support"], "lom": "low"},
      {"id": "chair_12", "cls": "chair", "pos": [0.7, 1.5, 0.45],
       "bbox": {"type": "OBB", "xyz": [0.5, 0.5, 0.9]}},
      {"id": "stove", "cls": "stove", "pos": [3.5, 1.0, 0.45],
       "bbox": {"type": "OBB", "xyz": [0.6, 0.6, 0.9]}, "aff": ["support"], "lom": "fixed"},
      {"id": "cup_1", "cls": "cup", "pos": [1.4, 1.5, 0.8],
       "bbox": {"type": "OBB", "xyz": [0.08, 0.08, 0.1]}, "lom": "high"},
      {"id": "book_1", "cls": "book", "pos": [1.7, 1.5, 0.765],
       "bbox": {"type": "OBB", "xyz": [0.15, 0.23, 0.03]}, "lom": "high"}
    ],
    "relations": [
      {"r": "in", "a": "table_1", "b": "kitchen"},
      {"r": "in", "a": "chair_12", "b": "kitchen"},
      {"r": "in", "a": "stove", "b": "kitchen"},
      {"r": "on_top_of", "a": "cup_1", "b": "table_1", "conf": 0.95},
      {"r": "supports", "a": "table_1", "b": "cup_1", "conf": 0.95},
      {"r": "on_top_of", "a": "book_1", "b": "table_1", "conf": 0.96},
      {"r": "supports", "a": "table_1", "b": "book_1", "conf": 0.96},
      {"r": "near", "a": "chair_12", "b": "table_1", "conf": 0.7},
      {"r": "near", "a": "table_1", "b": "chair_12", "conf": 0.7}
    ]
  }
}"#;

fn booted() -> Orchestrator {
    let mut orchestrator = Orchestrator::new(SceneConfig::default());
    orchestrator
        .load_bootstrap(&BootstrapDoc::from_str(SCENE).unwrap())
        .unwrap();
    orchestrator
}

#[test]
fn classification_follows_the_priority_order() {
    assert_eq!(classify("What if I remove the table?"), QuestionType::WhatIf);
    // "fall" alone is stability, but "what if" wins when both match.
    assert_eq!(classify("What if the stack falls over?"), QuestionType::WhatIf);
    assert_eq!(classify("Is the pile of books stable?"), QuestionType::Stability);
    assert_eq!(
        classify("Which objects can I easily reach?"),
        QuestionType::Accessibility
    );
    assert_eq!(classify("What is near the table?"), QuestionType::Relationship);
    assert_eq!(classify("Where is the cup?"), QuestionType::Location);
    assert_eq!(classify("Why is the cup up there?"), QuestionType::Complex);
    assert_eq!(classify("Describe the scene."), QuestionType::General);
}

#[test]
fn relationship_answers_report_min_confidence() {
    let orchestrator = booted();
    let dispatcher = QuestionDispatcher::new(
        orchestrator.graph(),
        orchestrator.support(),
        orchestrator.config(),
    );
    let answer = dispatcher.ask("What is on the table?").unwrap();
    assert_eq!(answer.question_type, QuestionType::Relationship);
    assert!(answer.answer_text.contains("cup_1"));
    assert!(answer.answer_text.contains("on_top_of"));
    // Minimum of the involved confidences: the near edges at 0.7.
    assert!((answer.confidence - 0.7).abs() < 1e-9);
}

#[test]
fn location_answers_include_cluster_membership() {
    let orchestrator = booted();
    let dispatcher = QuestionDispatcher::new(
        orchestrator.graph(),
        orchestrator.support(),
        orchestrator.config(),
    );
    let answer = dispatcher.ask("Where is the cup?").unwrap();
    assert_eq!(answer.question_type, QuestionType::Location);
    assert!(answer.answer_text.contains("cup_1"));
    assert!(answer.answer_text.contains("(1.40, 1.50, 0.80)"));
    assert!(answer.answer_text.contains("table_group"));
    assert_eq!(answer.confidence, 0.9);
}

#[test]
fn accessibility_matches_mobility_and_support_depth() {
    let orchestrator = booted();
    let snapshot = assemble(
        orchestrator.graph(),
        orchestrator.support(),
        orchestrator.config(),
    );

    assert_eq!(snapshot.accessibility["chair_12"].category, "reachable");
    assert_eq!(snapshot.accessibility["cup_1"].category, "reachable");
    assert_eq!(snapshot.accessibility["book_1"].category, "reachable");
    assert_eq!(snapshot.accessibility["stove"].category, "limited");
    assert_eq!(snapshot.accessibility["table_1"].category, "limited");
    assert!(snapshot
        .accessibility
        .values()
        .all(|record| record.category != "blocked"));
    assert!((snapshot.accessibility["stove"].score - 0.5).abs() < 1e-9);

    let dispatcher = QuestionDispatcher::new(
        orchestrator.graph(),
        orchestrator.support(),
        orchestrator.config(),
    );
    let answer = dispatcher.ask("Which objects can I easily reach?").unwrap();
    assert_eq!(answer.question_type, QuestionType::Accessibility);
    assert!(answer.answer_text.contains("3 objects are easily reachable"));
    assert!(answer.answer_text.contains("no objects are blocked"));
}

#[test]
fn stability_answers_list_recursive_dependents() {
    let orchestrator = booted();
    let dispatcher = QuestionDispatcher::new(
        orchestrator.graph(),
        orchestrator.support(),
        orchestrator.config(),
    );
    let answer = dispatcher.ask("What depends on the table?").unwrap();
    assert_eq!(answer.question_type, QuestionType::Stability);
    assert!(answer.answer_text.contains("table_1 supports 2 objects"));
    assert!(answer.answer_text.contains("removing table_1 would affect"));
    assert!(answer.answer_text.contains("cup_1"));
    assert!(answer.answer_text.contains("book_1"));
    assert_eq!(answer.confidence, 0.85);
}

#[test]
fn what_if_remove_table_reports_falls_without_mutating() {
    let orchestrator = booted();
    let dispatcher = QuestionDispatcher::new(
        orchestrator.graph(),
        orchestrator.support(),
        orchestrator.config(),
    );
    let answer = dispatcher.ask("What if I remove the table?").unwrap();
    assert_eq!(answer.question_type, QuestionType::WhatIf);
    assert_eq!(answer.confidence, 0.9);
    assert!(answer.answer_text.contains("cup_1 would fall to (1.40, 1.50, 0.05)"));
    assert!(answer.answer_text.contains("book_1 would fall to (1.70, 1.50, 0.01)"));

    let vanished = answer.evidence["vanished_relations"].as_array().unwrap();
    assert!(vanished.len() >= 6);

    // The live store is untouched.
    assert_eq!(orchestrator.graph().get_node("cup_1").unwrap().pos.z, 0.8);
    assert!(orchestrator.graph().contains("table_1"));
}

#[test]
fn general_answers_summarize_the_scene() {
    let orchestrator = booted();
    let dispatcher = QuestionDispatcher::new(
        orchestrator.graph(),
        orchestrator.support(),
        orchestrator.config(),
    );
    let answer = dispatcher.ask("Describe the scene.").unwrap();
    assert_eq!(answer.question_type, QuestionType::General);
    assert!(answer.answer_text.contains("5 objects"));
    assert!(answer
        .answer_text
        .contains("2 objects depend on others for support"));
}

#[test]
fn complex_answers_attach_the_snapshot_as_evidence() {
    let orchestrator = booted();
    let dispatcher = QuestionDispatcher::new(
        orchestrator.graph(),
        orchestrator.support(),
        orchestrator.config(),
    );
    let answer = dispatcher.ask("Why is the kitchen arranged this way?").unwrap();
    assert_eq!(answer.question_type, QuestionType::Complex);
    assert_eq!(answer.confidence, 0.3);
    assert!(answer.evidence.get("objects").is_some());
    assert!(answer.evidence.get("scene_summary").is_some());
}

#[test]
fn snapshots_are_reproducible() {
    let orchestrator = booted();
    let once = serde_json::to_string(&assemble(
        orchestrator.graph(),
        orchestrator.support(),
        orchestrator.config(),
    ))
    .unwrap();
    let twice = serde_json::to_string(&assemble(
        orchestrator.graph(),
        orchestrator.support(),
        orchestrator.config(),
    ))
    .unwrap();
    assert_eq!(once, twice);
}

#[test]
fn clusters_group_connected_objects_with_rule_types() {
    let orchestrator = booted();
    let snapshot = assemble(
        orchestrator.graph(),
        orchestrator.support(),
        orchestrator.config(),
    );

    let table_cluster = snapshot
        .spatial_clusters
        .iter()
        .find(|c| c.members.contains(&"table_1".to_string()))
        .unwrap();
    assert_eq!(table_cluster.cluster_type, "table_group");
    assert!(table_cluster.members.contains(&"cup_1".to_string()));
    assert!(table_cluster.members.contains(&"book_1".to_string()));
    assert!(table_cluster.members.contains(&"chair_12".to_string()));

    let stove_cluster = snapshot
        .spatial_clusters
        .iter()
        .find(|c| c.members.contains(&"stove".to_string()))
        .unwrap();
    assert_eq!(stove_cluster.cluster_type, "singleton");
}
