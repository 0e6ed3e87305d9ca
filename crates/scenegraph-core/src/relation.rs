use crate::{NodeId, RelationType, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Identity of a stored relation: the `(type, a, b)` triple.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RelationKey {
    pub kind: RelationType,
    pub a: NodeId,
    pub b: NodeId,
}

impl RelationKey {
    pub fn new(kind: RelationType, a: impl Into<NodeId>, b: impl Into<NodeId>) -> Self {
        Self {
            kind,
            a: a.into(),
            b: b.into(),
        }
    }

    /// Key of the stored counterpart, e.g. `on_top_of(a, b)` ↔ `supports(b, a)`.
    pub fn inverse(&self) -> Option<RelationKey> {
        self.kind
            .inverse()
            .map(|kind| RelationKey::new(kind, self.b.clone(), self.a.clone()))
    }
}

impl fmt::Display for RelationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({}, {})", self.kind, self.a, self.b)
    }
}

/// A directed spatial relation between two nodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relation {
    #[serde(rename = "r")]
    pub kind: RelationType,
    pub a: NodeId,
    pub b: NodeId,
    #[serde(default)]
    pub props: BTreeMap<String, serde_json::Value>,
    #[serde(default = "default_conf")]
    pub conf: f64,
    #[serde(default)]
    pub ts: Timestamp,
}

fn default_conf() -> f64 {
    1.0
}

impl Relation {
    pub fn new(kind: RelationType, a: impl Into<NodeId>, b: impl Into<NodeId>, conf: f64) -> Self {
        Self {
            kind,
            a: a.into(),
            b: b.into(),
            props: BTreeMap::new(),
            conf,
            ts: 0,
        }
    }

    pub fn with_prop(mut self, key: impl Into<String>, value: f64) -> Self {
        self.props.insert(key.into(), serde_json::json!(value));
        self
    }

    pub fn key(&self) -> RelationKey {
        RelationKey::new(self.kind.clone(), self.a.clone(), self.b.clone())
    }

    /// The stored counterpart relation, carrying the same confidence.
    pub fn inverse(&self) -> Option<Relation> {
        let kind = self.kind.inverse()?;
        Some(Relation {
            kind,
            a: self.b.clone(),
            b: self.a.clone(),
            props: self.props.clone(),
            conf: self.conf,
            ts: self.ts,
        })
    }

    pub fn prop(&self, key: &str) -> Option<f64> {
        self.props.get(key).and_then(|v| v.as_f64())
    }
}
