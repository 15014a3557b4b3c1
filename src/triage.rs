//! Triage: derived review/spawn signals and the list query views.
//!
//! Everything here is computed from loaded records at read time. There is no
//! background sweeper; staleness is judged against the caller's clock.

use serde::Serialize;

use crate::domain::{LoopPriority, LoopRecord, LoopState, Recommendation};

/// Checkpoints scoring below this need a human look.
pub const REVIEW_QUALITY_FLOOR: u8 = 65;
/// Minimum quality before delegating a follow-up is worthwhile.
pub const SPAWN_QUALITY_FLOOR: u8 = 40;
/// Minimum priority score to justify a sub-agent.
pub const SPAWN_PRIORITY_FLOOR: u8 = 12;
/// At this confidence or above, a sub-agent adds little.
pub const SPAWN_CONFIDENCE_CEILING: u8 = 4;

const MS_PER_HOUR: i64 = 3_600_000;

/// Whether the latest checkpoint warrants operator review: low quality score,
/// no critique, or no citations. `false` when the loop has no checkpoints.
pub fn checkpoint_needs_review(record: &LoopRecord) -> bool {
    let Some(checkpoint) = record.latest_checkpoint() else {
        return false;
    };

    let quality = checkpoint.analysis_quality_score.unwrap_or(0);
    let missing_critique = checkpoint.critique.as_deref().map_or(true, |c| c.trim().is_empty());
    quality < REVIEW_QUALITY_FLOOR || missing_critique || checkpoint.citation_links.is_empty()
}

/// Advisory signal that delegating the first proposed task to a sub-agent is
/// worthwhile. Never auto-executed.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SpawnAdvice {
    pub should_spawn: bool,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_task: Option<String>,
}

impl SpawnAdvice {
    fn hold(reason: impl Into<String>) -> Self {
        Self {
            should_spawn: false,
            reason: reason.into(),
            suggested_task: None,
        }
    }
}

/// Evaluate the spawn conditions in priority order; the reason names the
/// first condition that failed.
pub fn spawn_advice(record: &LoopRecord, can_continue: bool) -> SpawnAdvice {
    let Some(checkpoint) = record.latest_checkpoint() else {
        return SpawnAdvice::hold("no checkpoint recorded yet");
    };

    if checkpoint.recommendation != Recommendation::Continue {
        return SpawnAdvice::hold(format!(
            "latest recommendation is {}, not continue",
            checkpoint.recommendation
        ));
    }

    if !can_continue {
        return SpawnAdvice::hold("loop has no further rounds available");
    }

    let Some(task) = checkpoint.proposed_tasks.first() else {
        return SpawnAdvice::hold("no proposed task to delegate");
    };

    let quality = checkpoint.analysis_quality_score.unwrap_or(0);
    if quality < SPAWN_QUALITY_FLOOR {
        return SpawnAdvice::hold(format!(
            "analysis quality score {} is below {}",
            quality, SPAWN_QUALITY_FLOOR
        ));
    }

    if let Some(confidence) = checkpoint.confidence {
        if confidence >= SPAWN_CONFIDENCE_CEILING {
            return SpawnAdvice::hold(format!(
                "confidence is already high ({}/5); a sub-agent is unlikely to add much",
                confidence
            ));
        }
    }

    let priority_ok = checkpoint.priority_score.is_some_and(|p| p >= SPAWN_PRIORITY_FLOOR)
        || record.priority == LoopPriority::High;
    if !priority_ok {
        return SpawnAdvice::hold("priority too low to justify a sub-agent");
    }

    SpawnAdvice {
        should_spawn: true,
        reason: "high-value continuation with a ready follow-up task".to_string(),
        suggested_task: Some(task.clone()),
    }
}

/// The five triage query views.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListView {
    All,
    NeedsDecision,
    NeedsReview,
    Hot,
    Stale,
}

impl ListView {
    /// Parse leniently; unknown views fall back to `all`.
    pub fn parse(value: &str) -> Self {
        match value {
            "needs_decision" => ListView::NeedsDecision,
            "needs_review" => ListView::NeedsReview,
            "hot" => ListView::Hot,
            "stale" => ListView::Stale,
            _ => ListView::All,
        }
    }

    /// Get the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            ListView::All => "all",
            ListView::NeedsDecision => "needs_decision",
            ListView::NeedsReview => "needs_review",
            ListView::Hot => "hot",
            ListView::Stale => "stale",
        }
    }
}

/// Apply a view's filter and sort to an already ownership-scoped set of
/// loops. `state_filter` applies before the view; `stale_hours` and `now`
/// only matter for the stale view.
pub fn filter_and_sort(
    mut loops: Vec<LoopRecord>,
    view: ListView,
    state_filter: Option<LoopState>,
    stale_hours: i64,
    now: i64,
) -> Vec<LoopRecord> {
    if let Some(state) = state_filter {
        loops.retain(|record| record.state == state);
    }

    match view {
        ListView::All => {}
        ListView::NeedsDecision => loops.retain(|record| record.state == LoopState::AwaitingDecision),
        ListView::NeedsReview => {
            loops.retain(|record| record.state == LoopState::AwaitingDecision && checkpoint_needs_review(record));
        }
        ListView::Hot => loops.retain(|record| record.state == LoopState::AwaitingDecision),
        ListView::Stale => {
            let cutoff = now - stale_hours.saturating_mul(MS_PER_HOUR);
            loops.retain(|record| record.state == LoopState::Active && record.updated_at <= cutoff);
        }
    }

    if view == ListView::Hot {
        loops.sort_by(|a, b| hot_key(b).cmp(&hot_key(a)));
    } else {
        loops.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
    }
    loops
}

/// Hot ordering key: priority score, then quality score, then recency.
/// Undefined scores sort as zero.
fn hot_key(record: &LoopRecord) -> (u8, u8, i64) {
    let checkpoint = record.latest_checkpoint();
    (
        checkpoint.and_then(|c| c.priority_score).unwrap_or(0),
        checkpoint.and_then(|c| c.analysis_quality_score).unwrap_or(0),
        record.updated_at,
    )
}

/// The per-loop projection returned by list.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LoopSummary {
    pub loop_id: String,
    pub topic: String,
    pub state: LoopState,
    pub current_round: u32,
    pub max_rounds: u32,
    pub priority: LoopPriority,
    pub updated_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_checkpoint_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_recommendation: Option<Recommendation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_analysis_quality_score: Option<u8>,
    pub last_citation_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_priority_score: Option<u8>,
    pub needs_review: bool,
}

/// Project a loop into its list row.
pub fn summarize(record: &LoopRecord) -> LoopSummary {
    let checkpoint = record.latest_checkpoint();
    LoopSummary {
        loop_id: record.loop_id.clone(),
        topic: record.topic.clone(),
        state: record.state,
        current_round: record.current_round,
        max_rounds: record.max_rounds,
        priority: record.priority,
        updated_at: record.updated_at,
        last_checkpoint_at: checkpoint.map(|c| c.created_at),
        last_recommendation: checkpoint.map(|c| c.recommendation),
        last_analysis_quality_score: checkpoint.and_then(|c| c.analysis_quality_score),
        last_citation_count: checkpoint.map(|c| c.citation_count()).unwrap_or(0),
        last_priority_score: checkpoint.and_then(|c| c.priority_score),
        needs_review: checkpoint_needs_review(record),
    }
}
