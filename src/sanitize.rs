//! Input normalization and stored-record repair.
//!
//! Every value crosses through here twice: once when an operation's
//! parameters arrive, and again when records are loaded from disk. All
//! functions are idempotent, so normalizing an already-normalized record is a
//! no-op.

use serde_json::Value;

use crate::domain::loop_record::LoopState;
use crate::domain::{scoring, LoopRecord};

/// Maximum proposed tasks per checkpoint.
pub const MAX_PROPOSED_TASKS: usize = 20;
/// Maximum characters per proposed task.
pub const MAX_TASK_CHARS: usize = 280;
/// Maximum citation links per checkpoint.
pub const MAX_CITATIONS: usize = 20;
/// Maximum characters per citation link.
pub const MAX_CITATION_CHARS: usize = 500;
/// Maximum counterpoints per checkpoint.
pub const MAX_COUNTERPOINTS: usize = 10;
/// Maximum characters per counterpoint.
pub const MAX_COUNTERPOINT_CHARS: usize = 280;
/// Maximum characters for the why-now note.
pub const MAX_WHY_NOW_CHARS: usize = 280;
/// Round cap bounds and default.
pub const MAX_ROUNDS_RANGE: (u32, u32) = (1, 20);
pub const DEFAULT_MAX_ROUNDS: u32 = 2;
/// List limit bounds and default.
pub const LIMIT_RANGE: (usize, usize) = (1, 100);
pub const DEFAULT_LIMIT: usize = 20;
/// Stale-hours bounds and default.
pub const STALE_HOURS_RANGE: (i64, i64) = (1, 720);
pub const DEFAULT_STALE_HOURS: i64 = 24;

/// Clamp a rating to [1, 5] via floor. Non-finite values are dropped.
pub fn clamp_rating(value: f64) -> Option<u8> {
    if !value.is_finite() {
        return None;
    }
    Some(value.floor().clamp(1.0, 5.0) as u8)
}

/// Extract a rating from a JSON value. Non-numeric values are dropped.
pub fn rating_from_value(value: &Value) -> Option<u8> {
    value.as_f64().and_then(clamp_rating)
}

/// Trim a free-text field, drop it when empty, truncate to `max_chars`.
pub fn clean_text(value: &str, max_chars: usize) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(truncate_chars(trimmed, max_chars))
}

/// Trim entries, drop empties, truncate each to `max_chars`, cap the list.
pub fn clean_list(items: &[String], max_items: usize, max_chars: usize) -> Vec<String> {
    items
        .iter()
        .filter_map(|item| clean_text(item, max_chars))
        .take(max_items)
        .collect()
}

/// Pull the string entries out of a JSON array parameter. Anything that is
/// not an array (or not a string entry) is dropped.
pub fn string_list_from_value(value: &Value) -> Vec<String> {
    match value.as_array() {
        Some(entries) => entries
            .iter()
            .filter_map(|entry| entry.as_str().map(str::to_string))
            .collect(),
        None => Vec::new(),
    }
}

/// Floor and clamp a round cap to [1, 20]; missing or non-numeric → 2.
pub fn clamp_max_rounds(value: Option<f64>) -> u32 {
    let (min, max) = MAX_ROUNDS_RANGE;
    match value {
        Some(v) if v.is_finite() => (v.floor() as i64).clamp(i64::from(min), i64::from(max)) as u32,
        _ => DEFAULT_MAX_ROUNDS,
    }
}

/// Floor and clamp a list limit to [1, 100]; missing or non-numeric → 20.
pub fn clamp_limit(value: Option<f64>) -> usize {
    let (min, max) = LIMIT_RANGE;
    match value {
        Some(v) if v.is_finite() => (v.floor() as i64).clamp(min as i64, max as i64) as usize,
        _ => DEFAULT_LIMIT,
    }
}

/// Floor and clamp stale hours to [1, 720]; missing or non-numeric → 24.
pub fn clamp_stale_hours(value: Option<f64>) -> i64 {
    let (min, max) = STALE_HOURS_RANGE;
    match value {
        Some(v) if v.is_finite() => (v.floor() as i64).clamp(min, max),
        _ => DEFAULT_STALE_HOURS,
    }
}

/// Repair a loop record in place: clamp every bounded field, re-cap lists,
/// and recompute derived scores that a legacy record may be missing.
pub fn normalize_loop(record: &mut LoopRecord) {
    let (min_rounds, max_rounds) = MAX_ROUNDS_RANGE;
    record.max_rounds = record.max_rounds.clamp(min_rounds, max_rounds);
    record.current_round = record.current_round.max(1);
    if record.state != LoopState::Closed {
        record.current_round = record.current_round.min(record.max_rounds);
    }
    record.updated_at = record.updated_at.max(record.created_at);
    record.close_reason = record.close_reason.as_deref().and_then(|r| clean_text(r, usize::MAX));

    for checkpoint in &mut record.checkpoints {
        checkpoint.summary = checkpoint.summary.trim().to_string();
        checkpoint.critique = checkpoint.critique.as_deref().and_then(|c| clean_text(c, usize::MAX));
        checkpoint.why_now = checkpoint.why_now.as_deref().and_then(|w| clean_text(w, MAX_WHY_NOW_CHARS));
        checkpoint.proposed_tasks = clean_list(&checkpoint.proposed_tasks, MAX_PROPOSED_TASKS, MAX_TASK_CHARS);
        checkpoint.citation_links = clean_list(&checkpoint.citation_links, MAX_CITATIONS, MAX_CITATION_CHARS);
        checkpoint.counterpoints = clean_list(&checkpoint.counterpoints, MAX_COUNTERPOINTS, MAX_COUNTERPOINT_CHARS);
        checkpoint.importance = checkpoint.importance.map(|v| v.clamp(1, 5));
        checkpoint.urgency = checkpoint.urgency.map(|v| v.clamp(1, 5));
        checkpoint.confidence = checkpoint.confidence.map(|v| v.clamp(1, 5));
        checkpoint.evidence_quality = checkpoint.evidence_quality.map(|v| v.clamp(1, 5));

        if checkpoint.analysis_quality_score.is_none() {
            checkpoint.analysis_quality_score = Some(scoring::analysis_quality_score(checkpoint));
        }
        if checkpoint.priority_score.is_none() {
            checkpoint.priority_score = scoring::priority_score(checkpoint.importance, checkpoint.urgency);
        }
    }

    for decision in &mut record.decisions {
        decision.reason = decision.reason.as_deref().and_then(|r| clean_text(r, usize::MAX));
    }
}

fn truncate_chars(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect()
}
