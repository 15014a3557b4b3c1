//! Loop record and lifecycle state machine.
//!
//! A loop tracks one research topic through a bounded sequence of rounds:
//! the agent checkpoints a round (`active` → `awaiting_decision`), an operator
//! either continues it (back to `active`, next round) or closes it. `closed`
//! is terminal. The registry never advances state on its own; every transition
//! here is driven by an explicit operation.

use serde::{Deserialize, Deserializer, Serialize};

use crate::domain::checkpoint::{CheckpointRecord, DecisionKind, DecisionRecord};
use crate::error::{RegistryError, Result};

/// Loop lifecycle states.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum LoopState {
    /// Agent is researching the current round
    Active,
    /// A checkpoint is recorded; waiting on an operator decision
    AwaitingDecision,
    /// Terminal
    Closed,
}

impl LoopState {
    /// Get the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            LoopState::Active => "active",
            LoopState::AwaitingDecision => "awaiting_decision",
            LoopState::Closed => "closed",
        }
    }

    /// Parse leniently; unknown values fall back to `active`.
    pub fn parse(value: &str) -> Self {
        match value {
            "awaiting_decision" => LoopState::AwaitingDecision,
            "closed" => LoopState::Closed,
            _ => LoopState::Active,
        }
    }

    /// Strict parse for query filters; unknown values yield `None`.
    pub fn from_filter(value: &str) -> Option<Self> {
        match value {
            "active" => Some(LoopState::Active),
            "awaiting_decision" => Some(LoopState::AwaitingDecision),
            "closed" => Some(LoopState::Closed),
            _ => None,
        }
    }

    /// Check if this is the terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, LoopState::Closed)
    }
}

impl std::fmt::Display for LoopState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl<'de> Deserialize<'de> for LoopState {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        Ok(LoopState::parse(&value))
    }
}

/// Operator-facing loop priority.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum LoopPriority {
    Low,
    Normal,
    High,
}

impl LoopPriority {
    /// Get the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            LoopPriority::Low => "low",
            LoopPriority::Normal => "normal",
            LoopPriority::High => "high",
        }
    }

    /// Parse leniently; unknown values fall back to `normal`.
    pub fn parse(value: &str) -> Self {
        match value {
            "low" => LoopPriority::Low,
            "high" => LoopPriority::High,
            _ => LoopPriority::Normal,
        }
    }
}

impl Default for LoopPriority {
    fn default() -> Self {
        LoopPriority::Normal
    }
}

impl std::fmt::Display for LoopPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl<'de> Deserialize<'de> for LoopPriority {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        Ok(LoopPriority::parse(&value))
    }
}

/// One research loop owned by a single agent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct LoopRecord {
    /// Unique identifier, generated at start; immutable
    pub loop_id: String,

    /// Free-form topic; immutable after start
    pub topic: String,

    /// Owning agent; the sole accessor, never rewritten
    pub owner_agent_id: String,

    /// Lifecycle state
    pub state: LoopState,

    /// Current round, 1-indexed, monotonically non-decreasing
    pub current_round: u32,

    /// Round cap, immutable after start
    pub max_rounds: u32,

    /// Operator priority
    pub priority: LoopPriority,

    /// Unix timestamp in milliseconds
    pub created_at: i64,

    /// Unix timestamp in milliseconds; advances on every mutation
    pub updated_at: i64,

    /// Session key captured at start
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_by_session_key: Option<String>,

    /// Set only once the loop closes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<i64>,

    /// Set only once the loop closes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub close_reason: Option<String>,

    /// Append-only while the loop lives
    pub checkpoints: Vec<CheckpointRecord>,

    /// Append-only
    pub decisions: Vec<DecisionRecord>,
}

impl Default for LoopRecord {
    fn default() -> Self {
        Self {
            loop_id: String::new(),
            topic: String::new(),
            owner_agent_id: String::new(),
            state: LoopState::Active,
            current_round: 1,
            max_rounds: 2,
            priority: LoopPriority::Normal,
            created_at: 0,
            updated_at: 0,
            started_by_session_key: None,
            closed_at: None,
            close_reason: None,
            checkpoints: Vec::new(),
            decisions: Vec::new(),
        }
    }
}

impl LoopRecord {
    /// Create a new loop in `active` at round 1.
    pub fn new(
        topic: String,
        owner_agent_id: String,
        session_key: Option<String>,
        priority: LoopPriority,
        max_rounds: u32,
        now: i64,
    ) -> Self {
        Self {
            loop_id: crate::id::generate_loop_id(),
            topic,
            owner_agent_id,
            state: LoopState::Active,
            current_round: 1,
            max_rounds,
            priority,
            created_at: now,
            updated_at: now,
            started_by_session_key: session_key,
            ..Default::default()
        }
    }

    /// Update the timestamp. Clamped so `updated_at` never moves backwards
    /// even if the wall clock does.
    pub fn touch(&mut self, now: i64) {
        self.updated_at = now.max(self.updated_at);
    }

    /// Check if the loop is closed.
    pub fn is_closed(&self) -> bool {
        self.state == LoopState::Closed
    }

    /// Check if another round is available under the cap.
    pub fn has_rounds_left(&self) -> bool {
        self.current_round < self.max_rounds
    }

    /// The most recent checkpoint, if any.
    pub fn latest_checkpoint(&self) -> Option<&CheckpointRecord> {
        self.checkpoints.last()
    }

    /// Record a checkpoint for the current round and move to
    /// `awaiting_decision`. Requires `active`.
    pub fn record_checkpoint(&mut self, mut checkpoint: CheckpointRecord, now: i64) -> Result<()> {
        match self.state {
            LoopState::Closed => return Err(RegistryError::LoopClosed),
            LoopState::AwaitingDecision => {
                return Err(RegistryError::NotActive(self.state.to_string()));
            }
            LoopState::Active => {}
        }

        checkpoint.round = self.current_round;
        checkpoint.created_at = now;
        self.checkpoints.push(checkpoint);
        self.state = LoopState::AwaitingDecision;
        self.touch(now);
        Ok(())
    }

    /// Apply an operator continue: record the decision against the
    /// pre-increment round, advance the round, return to `active`.
    /// Requires `awaiting_decision` and room under the cap.
    pub fn apply_continue(&mut self, reason: Option<String>, now: i64) -> Result<()> {
        match self.state {
            LoopState::Closed => return Err(RegistryError::LoopClosed),
            LoopState::Active => {
                return Err(RegistryError::NotAwaitingDecision(self.state.to_string()));
            }
            LoopState::AwaitingDecision => {}
        }

        if !self.has_rounds_left() {
            return Err(RegistryError::RoundCapReached(self.max_rounds));
        }

        self.decisions.push(DecisionRecord {
            round: self.current_round,
            decision: DecisionKind::Continue,
            reason,
            created_at: now,
        });
        self.current_round += 1;
        self.state = LoopState::Active;
        self.touch(now);
        Ok(())
    }

    /// Close the loop from any non-closed state. Returns `false` (and leaves
    /// the record untouched) when the loop was already closed.
    pub fn close(&mut self, reason: Option<String>, now: i64) -> bool {
        if self.is_closed() {
            return false;
        }

        self.decisions.push(DecisionRecord {
            round: self.current_round,
            decision: DecisionKind::Close,
            reason: reason.clone(),
            created_at: now,
        });
        self.state = LoopState::Closed;
        self.closed_at = Some(now);
        self.close_reason = reason;
        self.touch(now);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::checkpoint::Recommendation;

    fn test_loop() -> LoopRecord {
        LoopRecord::new(
            "Quantum error correction".to_string(),
            "agent-abc".to_string(),
            Some("sess-1".to_string()),
            LoopPriority::Normal,
            2,
            1_000,
        )
    }

    fn test_checkpoint(summary: &str) -> CheckpointRecord {
        CheckpointRecord {
            summary: summary.to_string(),
            recommendation: Recommendation::Continue,
            ..Default::default()
        }
    }

    #[test]
    fn test_loop_state_as_str() {
        assert_eq!(LoopState::Active.as_str(), "active");
        assert_eq!(LoopState::AwaitingDecision.as_str(), "awaiting_decision");
        assert_eq!(LoopState::Closed.as_str(), "closed");
    }

    #[test]
    fn test_loop_state_parse_fallback() {
        assert_eq!(LoopState::parse("closed"), LoopState::Closed);
        assert_eq!(LoopState::parse("running"), LoopState::Active);
    }

    #[test]
    fn test_loop_state_from_filter_is_strict() {
        assert_eq!(LoopState::from_filter("closed"), Some(LoopState::Closed));
        assert_eq!(LoopState::from_filter("running"), None);
        assert_eq!(LoopState::from_filter(""), None);
    }

    #[test]
    fn test_priority_parse_fallback() {
        assert_eq!(LoopPriority::parse("high"), LoopPriority::High);
        assert_eq!(LoopPriority::parse("urgent"), LoopPriority::Normal);
    }

    #[test]
    fn test_new_loop_starts_active_at_round_one() {
        let record = test_loop();
        assert_eq!(record.state, LoopState::Active);
        assert_eq!(record.current_round, 1);
        assert_eq!(record.max_rounds, 2);
        assert_eq!(record.created_at, record.updated_at);
        assert!(!record.loop_id.is_empty());
        assert!(record.checkpoints.is_empty());
        assert!(record.decisions.is_empty());
    }

    #[test]
    fn test_checkpoint_moves_to_awaiting_decision() {
        let mut record = test_loop();
        record.record_checkpoint(test_checkpoint("round one findings"), 2_000).unwrap();

        assert_eq!(record.state, LoopState::AwaitingDecision);
        assert_eq!(record.checkpoints.len(), 1);
        assert_eq!(record.checkpoints[0].round, 1);
        assert_eq!(record.checkpoints[0].created_at, 2_000);
        assert_eq!(record.updated_at, 2_000);
    }

    #[test]
    fn test_double_checkpoint_rejected() {
        let mut record = test_loop();
        record.record_checkpoint(test_checkpoint("first"), 2_000).unwrap();

        let err = record.record_checkpoint(test_checkpoint("second"), 3_000).unwrap_err();
        assert!(matches!(err, RegistryError::NotActive(_)));
        assert!(err.to_string().contains("awaiting_decision"));
        assert_eq!(record.checkpoints.len(), 1);
    }

    #[test]
    fn test_continue_advances_round_and_tags_pre_increment() {
        let mut record = test_loop();
        record.record_checkpoint(test_checkpoint("first"), 2_000).unwrap();
        record.apply_continue(Some("keep going".to_string()), 3_000).unwrap();

        assert_eq!(record.state, LoopState::Active);
        assert_eq!(record.current_round, 2);
        assert_eq!(record.decisions.len(), 1);
        assert_eq!(record.decisions[0].round, 1);
        assert_eq!(record.decisions[0].decision, DecisionKind::Continue);
    }

    #[test]
    fn test_continue_from_active_rejected() {
        let mut record = test_loop();
        let err = record.apply_continue(None, 2_000).unwrap_err();
        assert!(matches!(err, RegistryError::NotAwaitingDecision(_)));
        assert_eq!(record.current_round, 1);
    }

    #[test]
    fn test_continue_at_round_cap_rejected() {
        let mut record = test_loop();
        record.record_checkpoint(test_checkpoint("r1"), 2_000).unwrap();
        record.apply_continue(None, 3_000).unwrap();
        record.record_checkpoint(test_checkpoint("r2"), 4_000).unwrap();

        let err = record.apply_continue(None, 5_000).unwrap_err();
        assert!(matches!(err, RegistryError::RoundCapReached(2)));
        assert_eq!(record.current_round, 2);
        assert_eq!(record.state, LoopState::AwaitingDecision);
    }

    #[test]
    fn test_close_from_any_live_state() {
        let mut active = test_loop();
        assert!(active.close(Some("done".to_string()), 2_000));
        assert_eq!(active.state, LoopState::Closed);
        assert_eq!(active.closed_at, Some(2_000));
        assert_eq!(active.close_reason.as_deref(), Some("done"));
        assert_eq!(active.decisions.last().unwrap().decision, DecisionKind::Close);

        let mut awaiting = test_loop();
        awaiting.record_checkpoint(test_checkpoint("r1"), 2_000).unwrap();
        assert!(awaiting.close(None, 3_000));
        assert_eq!(awaiting.state, LoopState::Closed);
    }

    #[test]
    fn test_close_is_idempotent() {
        let mut record = test_loop();
        assert!(record.close(Some("done".to_string()), 2_000));
        let decisions_before = record.decisions.len();
        let updated_before = record.updated_at;

        assert!(!record.close(Some("again".to_string()), 9_000));
        assert_eq!(record.decisions.len(), decisions_before);
        assert_eq!(record.updated_at, updated_before);
        assert_eq!(record.close_reason.as_deref(), Some("done"));
    }

    #[test]
    fn test_mutation_after_close_rejected() {
        let mut record = test_loop();
        record.close(None, 2_000);

        assert!(matches!(
            record.record_checkpoint(test_checkpoint("late"), 3_000),
            Err(RegistryError::LoopClosed)
        ));
        assert!(matches!(record.apply_continue(None, 3_000), Err(RegistryError::LoopClosed)));
    }

    #[test]
    fn test_touch_never_moves_backwards() {
        let mut record = test_loop();
        record.touch(5_000);
        assert_eq!(record.updated_at, 5_000);
        record.touch(4_000);
        assert_eq!(record.updated_at, 5_000);
    }

    #[test]
    fn test_wire_names_are_camel_case() {
        let record = test_loop();
        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("loopId").is_some());
        assert!(json.get("ownerAgentId").is_some());
        assert!(json.get("currentRound").is_some());
        assert!(json.get("maxRounds").is_some());
        assert_eq!(json["state"], "active");
        assert_eq!(json["priority"], "normal");
    }

    #[test]
    fn test_legacy_record_with_unknown_state_repairs_to_active() {
        let parsed: LoopRecord = serde_json::from_str(
            r#"{"loopId":"x","topic":"t","ownerAgentId":"agent-1","state":"paused","priority":"urgent"}"#,
        )
        .unwrap();
        assert_eq!(parsed.state, LoopState::Active);
        assert_eq!(parsed.priority, LoopPriority::Normal);
        assert_eq!(parsed.current_round, 1);
        assert_eq!(parsed.max_rounds, 2);
    }

    #[test]
    fn test_serialization_roundtrip() {
        let mut record = test_loop();
        record.record_checkpoint(test_checkpoint("findings"), 2_000).unwrap();
        let json = serde_json::to_string(&record).expect("serialize");
        let parsed: LoopRecord = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(parsed, record);
    }
}
