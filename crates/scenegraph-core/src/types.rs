use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Stable node identifier. Scene files address nodes by human-readable ids
/// (`table_1`, `chair_12`), and those ids flow through patches, events and
/// answers unchanged.
pub type NodeId = String;

/// Identifies who committed a patch: an agent id, `"command-router"`,
/// `"support-cascade"`, `"bootstrap"`.
pub type Origin = String;

/// Logical timestamp used for last-writer-wins ordering. Wall time never
/// enters the event log so replays stay byte-identical.
pub type Timestamp = u64;

/// Monotonic counter handing out LWW timestamps.
#[derive(Debug, Default, Clone)]
pub struct LogicalClock {
    now: Timestamp,
}

impl LogicalClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&mut self) -> Timestamp {
        self.now += 1;
        self.now
    }

    pub fn now(&self) -> Timestamp {
        self.now
    }

    /// Never hands out a timestamp at or below `floor` again.
    pub fn advance_past(&mut self, floor: Timestamp) {
        if self.now < floor {
            self.now = floor;
        }
    }
}

/// LWW stamp: timestamps first, origin breaks ties deterministically.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Stamp {
    pub ts: Timestamp,
    pub origin: Origin,
}

impl Stamp {
    pub fn new(ts: Timestamp, origin: impl Into<Origin>) -> Self {
        Self {
            ts,
            origin: origin.into(),
        }
    }
}

/// Reserved relation vocabulary plus a side door for custom tags.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RelationType {
    Near,
    Far,
    OnTopOf,
    Supports,
    Beside,
    Above,
    Below,
    In,
    Other(String),
}

impl RelationType {
    /// Tie-break order when several predicates fire for the same pair:
    /// on_top_of > beside > near > above/below > far. Containment outranks
    /// everything since it is the most specific claim.
    pub fn priority(&self) -> u8 {
        match self {
            RelationType::In => 6,
            RelationType::OnTopOf | RelationType::Supports => 5,
            RelationType::Beside => 4,
            RelationType::Near => 3,
            RelationType::Above | RelationType::Below => 2,
            RelationType::Far => 1,
            RelationType::Other(_) => 0,
        }
    }

    /// The stored counterpart of a directed asymmetric relation.
    pub fn inverse(&self) -> Option<RelationType> {
        match self {
            RelationType::OnTopOf => Some(RelationType::Supports),
            RelationType::Supports => Some(RelationType::OnTopOf),
            _ => None,
        }
    }

    pub fn is_reserved(&self) -> bool {
        !matches!(self, RelationType::Other(_))
    }

    /// Relation kinds an agent negotiates per neighbor pair; `in` edges come
    /// from bootstrap or containment checks, not the handshake.
    pub fn is_pairwise(&self) -> bool {
        matches!(
            self,
            RelationType::Near
                | RelationType::Far
                | RelationType::OnTopOf
                | RelationType::Supports
                | RelationType::Beside
                | RelationType::Above
                | RelationType::Below
        )
    }
}

impl fmt::Display for RelationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RelationType::Near => "near",
            RelationType::Far => "far",
            RelationType::OnTopOf => "on_top_of",
            RelationType::Supports => "supports",
            RelationType::Beside => "beside",
            RelationType::Above => "above",
            RelationType::Below => "below",
            RelationType::In => "in",
            RelationType::Other(s) => s.as_str(),
        };
        write!(f, "{}", s)
    }
}

impl FromStr for RelationType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "near" => Ok(RelationType::Near),
            "far" => Ok(RelationType::Far),
            "on_top_of" => Ok(RelationType::OnTopOf),
            "supports" => Ok(RelationType::Supports),
            "beside" => Ok(RelationType::Beside),
            "above" => Ok(RelationType::Above),
            "below" => Ok(RelationType::Below),
            "in" => Ok(RelationType::In),
            other => Ok(RelationType::Other(other.to_string())),
        }
    }
}

impl Serialize for RelationType {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for RelationType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Coarse level-of-mobility class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mobility {
    Fixed,
    Low,
    Medium,
    High,
}

impl Mobility {
    /// Weight used by the accessibility score.
    pub fn factor(&self) -> f64 {
        match self {
            Mobility::Fixed => 0.0,
            Mobility::Low => 0.25,
            Mobility::Medium => 0.6,
            Mobility::High => 1.0,
        }
    }
}

impl Default for Mobility {
    fn default() -> Self {
        Mobility::Medium
    }
}

impl fmt::Display for Mobility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Mobility::Fixed => "fixed",
            Mobility::Low => "low",
            Mobility::Medium => "medium",
            Mobility::High => "high",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for Mobility {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "fixed" => Ok(Mobility::Fixed),
            "low" => Ok(Mobility::Low),
            "medium" => Ok(Mobility::Medium),
            "high" => Ok(Mobility::High),
            other => Err(format!("unknown level of mobility: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relation_type_round_trips_through_strings() {
        for tag in [
            "near",
            "far",
            "on_top_of",
            "supports",
            "beside",
            "above",
            "below",
            "in",
        ] {
            let parsed: RelationType = tag.parse().unwrap();
            assert!(parsed.is_reserved());
            assert_eq!(parsed.to_string(), tag);
        }
        let custom: RelationType = "hangs_from".parse().unwrap();
        assert_eq!(custom, RelationType::Other("hangs_from".to_string()));
        assert!(!custom.is_reserved());
    }

    #[test]
    fn priority_order_matches_tie_break_rule() {
        assert!(RelationType::OnTopOf.priority() > RelationType::Beside.priority());
        assert!(RelationType::Beside.priority() > RelationType::Near.priority());
        assert!(RelationType::Near.priority() > RelationType::Above.priority());
        assert!(RelationType::Above.priority() > RelationType::Far.priority());
    }

    #[test]
    fn stamps_order_by_timestamp_then_origin() {
        let a = Stamp::new(5, "agent_a");
        let b = Stamp::new(5, "agent_b");
        let c = Stamp::new(6, "agent_a");
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn clock_is_strictly_monotonic() {
        let mut clock = LogicalClock::new();
        let a = clock.next();
        clock.advance_past(10);
        let b = clock.next();
        assert!(b > a);
        assert_eq!(b, 11);
    }
}
