//! Checkpoint scoring.
//!
//! Both scores are pure functions of checkpoint inputs: no clock, no I/O, no
//! registry state. They are recomputed on load to heal legacy records, so
//! identical inputs must always produce identical outputs.

use crate::domain::checkpoint::CheckpointRecord;

/// Priority score: importance x urgency when both ratings are present.
/// Range [1, 25]; `None` when either rating is missing.
pub fn priority_score(importance: Option<u8>, urgency: Option<u8>) -> Option<u8> {
    match (importance, urgency) {
        (Some(imp), Some(urg)) => Some(imp * urg),
        _ => None,
    }
}

/// Analysis quality score: a 0-100 heuristic of the checkpoint's completeness
/// and evidentiary depth.
///
/// Weights: summary length tier (up to 20), critique (20), citations (up to
/// 25), counterpoints (up to 15), proposed tasks (up to 10), evidence quality
/// (2 per rating point), why-now (5). The raw sum can exceed 100; the result
/// is clamped.
pub fn analysis_quality_score(checkpoint: &CheckpointRecord) -> u8 {
    let mut score: i32 = 0;

    score += summary_tier(&checkpoint.summary);

    if checkpoint.critique.as_deref().is_some_and(|c| !c.trim().is_empty()) {
        score += 20;
    }

    score += match checkpoint.citation_links.len() {
        n if n >= 3 => 25,
        n if n >= 1 => 15,
        _ => 0,
    };

    score += match checkpoint.counterpoints.len() {
        n if n >= 2 => 15,
        1 => 10,
        _ => 0,
    };

    score += match checkpoint.proposed_tasks.len() {
        n if n >= 2 => 10,
        1 => 6,
        _ => 0,
    };

    if let Some(quality) = checkpoint.evidence_quality {
        score += 2 * i32::from(quality);
    }

    if checkpoint.why_now.as_deref().is_some_and(|w| !w.trim().is_empty()) {
        score += 5;
    }

    score.clamp(0, 100) as u8
}

fn summary_tier(summary: &str) -> i32 {
    match summary.chars().count() {
        n if n >= 160 => 20,
        n if n >= 80 => 16,
        n if n >= 40 => 12,
        n if n >= 20 => 8,
        _ => 0,
    }
}
