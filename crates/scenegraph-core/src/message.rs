use crate::{NodeId, Relation};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Whether a proposed relation was taken up by the receiving agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Accept,
    Reject,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageBody {
    RelationPropose {
        relation: Relation,
        /// Name of the predicate that produced the proposal.
        basis: String,
    },
    RelationAck {
        relation: Relation,
        decision: Decision,
    },
}

/// Agent-to-agent message. Messages live only until the receiving agent
/// drains its inbox; the wall-clock stamp is informational and never enters
/// the event log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentMessage {
    pub id: Uuid,
    pub sender: NodeId,
    pub receiver: NodeId,
    #[serde(flatten)]
    pub body: MessageBody,
    pub sent_at: DateTime<Utc>,
}

impl AgentMessage {
    pub fn propose(
        sender: impl Into<NodeId>,
        receiver: impl Into<NodeId>,
        relation: Relation,
        basis: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender: sender.into(),
            receiver: receiver.into(),
            body: MessageBody::RelationPropose {
                relation,
                basis: basis.into(),
            },
            sent_at: Utc::now(),
        }
    }

    pub fn ack(
        sender: impl Into<NodeId>,
        receiver: impl Into<NodeId>,
        relation: Relation,
        decision: Decision,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender: sender.into(),
            receiver: receiver.into(),
            body: MessageBody::RelationAck { relation, decision },
            sent_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RelationType;

    #[test]
    fn propose_carries_relation_and_basis() {
        let rel = Relation::new(RelationType::Near, "chair_12", "table_1", 0.8);
        let msg = AgentMessage::propose("chair_12", "table_1", rel, "topology.relate_near");
        assert_eq!(msg.sender, "chair_12");
        assert_eq!(msg.receiver, "table_1");
        match msg.body {
            MessageBody::RelationPropose { ref basis, .. } => {
                assert_eq!(basis, "topology.relate_near")
            }
            _ => panic!("expected propose"),
        }
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "RELATION_PROPOSE");
    }
}
