//! Checkpoint and decision records.
//!
//! A checkpoint is the agent-produced synthesis that ends a round; a decision
//! is the operator's recorded choice to continue or close. Both live as
//! append-only sublists inside a loop record. Wire field names are camelCase
//! to match the persisted document and the operation surface.

use serde::{Deserialize, Deserializer, Serialize};

use crate::sanitize;

/// The agent's recommendation attached to a checkpoint.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    Continue,
    Stop,
    NeedsInput,
}

impl Recommendation {
    /// Get the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Recommendation::Continue => "continue",
            Recommendation::Stop => "stop",
            Recommendation::NeedsInput => "needs_input",
        }
    }

    /// Parse leniently; unknown values fall back to `needs_input`.
    pub fn parse(value: &str) -> Self {
        match value {
            "continue" => Recommendation::Continue,
            "stop" => Recommendation::Stop,
            _ => Recommendation::NeedsInput,
        }
    }
}

impl Default for Recommendation {
    fn default() -> Self {
        Recommendation::NeedsInput
    }
}

impl std::fmt::Display for Recommendation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// Lenient on load so a legacy record with an unknown recommendation repairs
// to the default instead of poisoning the whole document.
impl<'de> Deserialize<'de> for Recommendation {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        Ok(Recommendation::parse(&value))
    }
}

/// The operator's decision kind.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DecisionKind {
    Continue,
    Close,
}

impl DecisionKind {
    /// Get the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionKind::Continue => "continue",
            DecisionKind::Close => "close",
        }
    }
}

impl std::fmt::Display for DecisionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An agent-produced analysis checkpoint concluding one round.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct CheckpointRecord {
    /// Round this checkpoint concluded
    pub round: u32,

    /// Required synthesis of the round's findings
    pub summary: String,

    /// Self-critique of the analysis
    #[serde(skip_serializing_if = "Option::is_none")]
    pub critique: Option<String>,

    /// What the agent thinks should happen next
    pub recommendation: Recommendation,

    /// Follow-up tasks the agent proposes to delegate
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub proposed_tasks: Vec<String>,

    /// How much the topic matters, 1-5
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient_rating")]
    pub importance: Option<u8>,

    /// How time-sensitive it is, 1-5
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient_rating")]
    pub urgency: Option<u8>,

    /// The agent's confidence in its own analysis, 1-5
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient_rating")]
    pub confidence: Option<u8>,

    /// Strength of the evidence behind the summary, 1-5
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient_rating")]
    pub evidence_quality: Option<u8>,

    /// Supporting source links
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub citation_links: Vec<String>,

    /// Arguments against the summary's conclusion
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub counterpoints: Vec<String>,

    /// Why this matters right now
    #[serde(skip_serializing_if = "Option::is_none")]
    pub why_now: Option<String>,

    /// Derived 0-100 completeness heuristic
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis_quality_score: Option<u8>,

    /// Derived importance x urgency, 1-25
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient_rating_wide")]
    pub priority_score: Option<u8>,

    /// Unix timestamp in milliseconds
    pub created_at: i64,
}

impl Default for CheckpointRecord {
    fn default() -> Self {
        Self {
            round: 1,
            summary: String::new(),
            critique: None,
            recommendation: Recommendation::default(),
            proposed_tasks: Vec::new(),
            importance: None,
            urgency: None,
            confidence: None,
            evidence_quality: None,
            citation_links: Vec::new(),
            counterpoints: Vec::new(),
            why_now: None,
            analysis_quality_score: None,
            priority_score: None,
            created_at: 0,
        }
    }
}

impl CheckpointRecord {
    /// Number of citation links attached to this checkpoint.
    pub fn citation_count(&self) -> usize {
        self.citation_links.len()
    }
}

/// An operator decision recorded against a round.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DecisionRecord {
    /// Round the decision applied to (pre-increment for continues)
    pub round: u32,

    /// Continue or close
    pub decision: DecisionKind,

    /// Optional operator rationale
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub reason: Option<String>,

    /// Unix timestamp in milliseconds
    pub created_at: i64,
}

fn lenient_rating<'de, D>(deserializer: D) -> Result<Option<u8>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(sanitize::rating_from_value))
}

fn lenient_rating_wide<'de, D>(deserializer: D) -> Result<Option<u8>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value
        .as_ref()
        .and_then(serde_json::Value::as_f64)
        .filter(|v| v.is_finite() && *v >= 1.0 && *v <= 25.0)
        .map(|v| v.floor() as u8))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recommendation_as_str() {
        assert_eq!(Recommendation::Continue.as_str(), "continue");
        assert_eq!(Recommendation::Stop.as_str(), "stop");
        assert_eq!(Recommendation::NeedsInput.as_str(), "needs_input");
    }

    #[test]
    fn test_recommendation_parse_fallback() {
        assert_eq!(Recommendation::parse("continue"), Recommendation::Continue);
        assert_eq!(Recommendation::parse("stop"), Recommendation::Stop);
        assert_eq!(Recommendation::parse("needs_input"), Recommendation::NeedsInput);
        assert_eq!(Recommendation::parse("escalate"), Recommendation::NeedsInput);
        assert_eq!(Recommendation::parse(""), Recommendation::NeedsInput);
    }

    #[test]
    fn test_recommendation_serialization() {
        assert_eq!(serde_json::to_string(&Recommendation::Continue).unwrap(), "\"continue\"");
        assert_eq!(serde_json::to_string(&Recommendation::NeedsInput).unwrap(), "\"needs_input\"");
    }

    #[test]
    fn test_unknown_recommendation_deserializes_to_default() {
        let parsed: Recommendation = serde_json::from_str("\"bogus\"").unwrap();
        assert_eq!(parsed, Recommendation::NeedsInput);
    }

    #[test]
    fn test_checkpoint_camel_case_wire_names() {
        let checkpoint = CheckpointRecord {
            round: 2,
            summary: "findings".to_string(),
            proposed_tasks: vec!["dig deeper".to_string()],
            why_now: Some("launch window".to_string()),
            analysis_quality_score: Some(55),
            created_at: 1000,
            ..Default::default()
        };

        let json = serde_json::to_value(&checkpoint).unwrap();
        assert_eq!(json["proposedTasks"][0], "dig deeper");
        assert_eq!(json["whyNow"], "launch window");
        assert_eq!(json["analysisQualityScore"], 55);
        assert_eq!(json["createdAt"], 1000);
        // Empty optionals are omitted from the wire form
        assert!(json.get("critique").is_none());
        assert!(json.get("citationLinks").is_none());
    }

    #[test]
    fn test_non_numeric_rating_loads_as_none() {
        let parsed: CheckpointRecord =
            serde_json::from_str(r#"{"round":1,"summary":"s","importance":"high","urgency":3.9}"#).unwrap();
        assert_eq!(parsed.importance, None);
        assert_eq!(parsed.urgency, Some(3));
    }

    #[test]
    fn test_out_of_range_rating_clamps_on_load() {
        let parsed: CheckpointRecord =
            serde_json::from_str(r#"{"round":1,"summary":"s","confidence":9,"evidenceQuality":0}"#).unwrap();
        assert_eq!(parsed.confidence, Some(5));
        assert_eq!(parsed.evidence_quality, Some(1));
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let parsed: CheckpointRecord = serde_json::from_str(r#"{"summary":"bare"}"#).unwrap();
        assert_eq!(parsed.round, 1);
        assert_eq!(parsed.recommendation, Recommendation::NeedsInput);
        assert!(parsed.proposed_tasks.is_empty());
        assert_eq!(parsed.analysis_quality_score, None);
    }

    #[test]
    fn test_decision_record_roundtrip() {
        let decision = DecisionRecord {
            round: 3,
            decision: DecisionKind::Continue,
            reason: Some("promising lead".to_string()),
            created_at: 42,
        };

        let json = serde_json::to_string(&decision).unwrap();
        let parsed: DecisionRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, decision);
        assert!(json.contains("\"decision\":\"continue\""));
    }
}
