use crate::assembler::{assemble, SpatialSnapshot};
use scenegraph_core::{NodeId, Result, SceneConfig};
use scenegraph_graph::{SceneGraph, SupportSystem};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    WhatIf,
    Stability,
    Accessibility,
    Relationship,
    Location,
    General,
    Complex,
}

impl fmt::Display for QuestionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            QuestionType::WhatIf => "what_if",
            QuestionType::Stability => "stability",
            QuestionType::Accessibility => "accessibility",
            QuestionType::Relationship => "relationship",
            QuestionType::Location => "location",
            QuestionType::General => "general",
            QuestionType::Complex => "complex",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QaResponse {
    pub question: String,
    pub question_type: QuestionType,
    pub answer_text: String,
    pub confidence: f64,
    pub evidence: serde_json::Value,
}

/// Keyword sets per category, checked in priority order:
/// what_if > stability > accessibility > relationship > location; `complex`
/// keywords come last and `general` is the no-match fallback.
pub fn classify(question: &str) -> QuestionType {
    let q = question.to_lowercase();
    let matches = |words: &[&str]| words.iter().any(|w| q.contains(w));

    if matches(&["what if", "if i ", "would happen", "happen if", "happens if"]) {
        QuestionType::WhatIf
    } else if matches(&["stable", "stability", "collapse", "fall", "tip over", "depend"]) {
        QuestionType::Stability
    } else if matches(&["reach", "access", "grab", "blocked", "get to"]) {
        QuestionType::Accessibility
    } else if matches(&[
        "relationship",
        "related",
        "connected",
        " on ",
        "near",
        "beside",
        "next to",
        "support",
        "touching",
    ]) {
        QuestionType::Relationship
    } else if matches(&["where", "location", "position", "locate", "find"]) {
        QuestionType::Location
    } else if matches(&["why", "how", "explain", "reason"]) {
        QuestionType::Complex
    } else {
        QuestionType::General
    }
}

/// Rule-based question dispatcher over the spatial snapshot. Everything but
/// `complex` is answered locally; `complex` hands the snapshot to the
/// external NL layer.
pub struct QuestionDispatcher<'a> {
    graph: &'a SceneGraph,
    support: &'a SupportSystem,
    config: &'a SceneConfig,
}

impl<'a> QuestionDispatcher<'a> {
    pub fn new(graph: &'a SceneGraph, support: &'a SupportSystem, config: &'a SceneConfig) -> Self {
        Self {
            graph,
            support,
            config,
        }
    }

    pub fn ask(&self, question: &str) -> Result<QaResponse> {
        let snapshot = assemble(self.graph, self.support, self.config);
        let question_type = classify(question);
        debug!(%question_type, "dispatching question");

        let (answer_text, confidence, evidence) = match question_type {
            QuestionType::Relationship => self.answer_relationship(question, &snapshot),
            QuestionType::Location => self.answer_location(question, &snapshot),
            QuestionType::Accessibility => self.answer_accessibility(&snapshot),
            QuestionType::Stability => self.answer_stability(question, &snapshot),
            QuestionType::WhatIf => self.answer_what_if(question, &snapshot)?,
            QuestionType::General => self.answer_general(&snapshot),
            QuestionType::Complex => (
                "This question needs external reasoning; the spatial snapshot is attached."
                    .to_string(),
                0.3,
                serde_json::to_value(&snapshot)?,
            ),
        };

        Ok(QaResponse {
            question: question.to_string(),
            question_type,
            answer_text,
            confidence,
            evidence,
        })
    }

    /// Object ids whose id or class appears in the question text.
    fn mentioned_objects(&self, question: &str, snapshot: &SpatialSnapshot) -> Vec<NodeId> {
        let q = question.to_lowercase();
        snapshot
            .objects
            .values()
            .filter(|o| q.contains(&o.id.to_lowercase()) || q.contains(&o.class.to_lowercase()))
            .map(|o| o.id.clone())
            .collect()
    }

    fn answer_relationship(
        &self,
        question: &str,
        snapshot: &SpatialSnapshot,
    ) -> (String, f64, serde_json::Value) {
        let mentioned = self.mentioned_objects(question, snapshot);
        let relevant: Vec<_> = snapshot
            .relationships
            .iter()
            .filter(|r| mentioned.contains(&r.subject) || mentioned.contains(&r.object))
            .collect();

        if relevant.is_empty() {
            return (
                "No spatial relationships found for the mentioned objects.".to_string(),
                0.3,
                serde_json::json!([]),
            );
        }

        let mut text = String::from("Spatial relationships:\n");
        for r in &relevant {
            let subject_class = snapshot
                .objects
                .get(&r.subject)
                .map(|o| o.class.as_str())
                .unwrap_or("room");
            let object_class = snapshot
                .objects
                .get(&r.object)
                .map(|o| o.class.as_str())
                .unwrap_or("room");
            text.push_str(&format!(
                "- {} ({}) {} {} ({}) [confidence: {:.2}]\n",
                r.subject, subject_class, r.kind, r.object, object_class, r.confidence
            ));
        }
        let confidence = relevant
            .iter()
            .map(|r| r.confidence)
            .fold(f64::INFINITY, f64::min);
        let evidence = serde_json::json!(relevant);
        (text, confidence, evidence)
    }

    fn answer_location(
        &self,
        question: &str,
        snapshot: &SpatialSnapshot,
    ) -> (String, f64, serde_json::Value) {
        let mentioned = self.mentioned_objects(question, snapshot);
        if mentioned.is_empty() {
            return (
                "Could not identify an object in the question.".to_string(),
                0.4,
                serde_json::json!([]),
            );
        }

        let mut text = String::from("Object locations:\n");
        for id in &mentioned {
            let Some(object) = snapshot.objects.get(id) else {
                continue;
            };
            text.push_str(&format!(
                "- {} ({}) is at ({:.2}, {:.2}, {:.2})\n",
                object.id, object.class, object.pos.x, object.pos.y, object.pos.z
            ));
            if let Some(cluster) = snapshot
                .spatial_clusters
                .iter()
                .find(|c| c.members.contains(id))
            {
                text.push_str(&format!(
                    "  part of a {} with {} objects\n",
                    cluster.cluster_type,
                    cluster.members.len()
                ));
            }
        }
        (text, 0.9, serde_json::json!(mentioned))
    }

    fn answer_accessibility(&self, snapshot: &SpatialSnapshot) -> (String, f64, serde_json::Value) {
        let mut reachable = Vec::new();
        let mut blocked = Vec::new();
        let mut limited = Vec::new();
        for (id, record) in &snapshot.accessibility {
            match record.category.as_str() {
                "reachable" => reachable.push((id, record.score)),
                "blocked" => blocked.push((id, record.score)),
                _ => limited.push((id, record.score)),
            }
        }

        let mut text = String::from("Accessibility analysis:\n");
        text.push_str(&format!("- {} objects are easily reachable:\n", reachable.len()));
        for (id, score) in &reachable {
            text.push_str(&format!("  - {} [accessibility: {:.2}]\n", id, score));
        }
        if blocked.is_empty() {
            text.push_str("- no objects are blocked\n");
        } else {
            text.push_str(&format!("- {} objects are blocked:\n", blocked.len()));
            for (id, score) in &blocked {
                text.push_str(&format!("  - {} [accessibility: {:.2}]\n", id, score));
            }
        }
        if !limited.is_empty() {
            text.push_str(&format!("- {} objects have limited access\n", limited.len()));
        }
        (text, 0.8, serde_json::json!(snapshot.accessibility))
    }

    fn answer_stability(
        &self,
        question: &str,
        snapshot: &SpatialSnapshot,
    ) -> (String, f64, serde_json::Value) {
        let mut text = String::from("Stability analysis:\n");
        for (supporter, dependents) in &snapshot.support_dependencies.dependents {
            let risk = snapshot
                .stability
                .get(supporter)
                .map(|s| s.risk.as_str())
                .unwrap_or("low");
            text.push_str(&format!(
                "- {} supports {} objects [risk: {}]\n",
                supporter,
                dependents.len(),
                risk
            ));
        }
        let risky: Vec<&NodeId> = snapshot
            .stability
            .iter()
            .filter(|(_, s)| s.risk != "low")
            .map(|(id, _)| id)
            .collect();
        if !risky.is_empty() {
            text.push_str(&format!("- elevated risk: {:?}\n", risky));
        }

        for id in self.mentioned_objects(question, snapshot) {
            let dependents = self.support.recursive_dependents(&id);
            if !dependents.is_empty() {
                text.push_str(&format!(
                    "- removing {} would affect: {}\n",
                    id,
                    dependents.into_iter().collect::<Vec<_>>().join(", ")
                ));
            }
        }
        (text, 0.85, serde_json::json!(snapshot.stability))
    }

    fn answer_what_if(
        &self,
        question: &str,
        snapshot: &SpatialSnapshot,
    ) -> Result<(String, f64, serde_json::Value)> {
        let mentioned = self.mentioned_objects(question, snapshot);
        let Some(target) = mentioned.first() else {
            return Ok((
                "Could not identify which object the hypothetical refers to.".to_string(),
                0.4,
                serde_json::json!(null),
            ));
        };

        let report = self.support.simulate_removal(self.graph, self.config, target)?;
        let mut text = format!("If {} is removed:\n", target);
        if report.lost_support.is_empty() && report.fell.is_empty() {
            text.push_str("- no other objects would be affected\n");
        }
        for id in &report.lost_support {
            text.push_str(&format!("- {} is fixed and stays in place (support lost)\n", id));
        }
        for (id, pos) in &report.fell {
            text.push_str(&format!(
                "- {} would fall to ({:.2}, {:.2}, {:.2})\n",
                id, pos.x, pos.y, pos.z
            ));
        }
        text.push_str(&format!(
            "- {} relations would vanish\n",
            report.vanished_relations.len()
        ));

        let confidence = if report.all_mobile { 0.9 } else { 0.7 };
        let evidence = serde_json::json!({
            "removed": report.removed,
            "lost_support": report.lost_support,
            "fell": report.fell.iter().map(|(id, pos)| {
                serde_json::json!({"id": id, "pos": [pos.x, pos.y, pos.z]})
            }).collect::<Vec<_>>(),
            "vanished_relations": report.vanished_relations,
        });
        Ok((text, confidence, evidence))
    }

    fn answer_general(&self, snapshot: &SpatialSnapshot) -> (String, f64, serde_json::Value) {
        let summary = &snapshot.scene_summary;
        let mut text = format!(
            "Scene overview: {} objects ({}), {} relation kinds.\n",
            summary.total_objects,
            summary
                .class_counts
                .iter()
                .map(|(class, count)| format!("{} {}", count, class))
                .collect::<Vec<_>>()
                .join(", "),
            summary.relation_counts.len()
        );
        for insight in snapshot.insights.iter().take(5) {
            text.push_str(&format!("- {}\n", insight));
        }
        (text, 0.8, serde_json::json!(summary))
    }
}
