//! The registry service.
//!
//! `ResearchLoopRegistry` dispatches the six operations (start, checkpoint,
//! continue, status, list, close) for one agent identity. Mutating operations
//! run a full read-modify-write under the store lock; status and list read
//! without it and may observe a slightly stale (but never torn) snapshot.
//!
//! The public boundary never throws: `execute` folds every failure into a
//! `{"status":"error","error":...}` envelope.

use std::path::{Path, PathBuf};

use serde_json::{json, Value};

use crate::config::{Config, LockConfig};
use crate::domain::checkpoint::{CheckpointRecord, Recommendation};
use crate::domain::loop_record::{LoopPriority, LoopRecord, LoopState};
use crate::domain::scoring;
use crate::error::{RegistryError, Result};
use crate::id;
use crate::sanitize;
use crate::storage::{self, RegistryDocument, StoreLock};
use crate::triage::{self, ListView};

/// Agent-scoped handle on the research loop registry.
///
/// One instance per agent session: the session key resolves to the
/// `ownerAgentId` stamped onto every loop this handle starts, and every
/// lookup is filtered against it.
pub struct ResearchLoopRegistry {
    agent_id: String,
    session_key: Option<String>,
    store_path: PathBuf,
    lock_config: LockConfig,
}

impl ResearchLoopRegistry {
    /// Create a registry handle from configuration and the caller's session
    /// key.
    pub fn new(config: &Config, session_key: Option<&str>) -> Self {
        Self::at_path(config.storage.store_path(), config.lock.clone(), session_key)
    }

    /// Create a registry handle bound to an explicit store file, bypassing
    /// config and env resolution.
    pub fn at_path(store_path: PathBuf, lock_config: LockConfig, session_key: Option<&str>) -> Self {
        Self {
            agent_id: id::agent_id_from_session(session_key),
            session_key: session_key.map(str::to_string).filter(|k| !k.trim().is_empty()),
            store_path,
            lock_config,
        }
    }

    /// The agent id this handle is scoped to.
    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    /// Path of the backing store document.
    pub fn store_path(&self) -> &Path {
        &self.store_path
    }

    /// Execute one registry operation.
    ///
    /// `params` carries the `action` selector plus that action's fields.
    /// `tool_call_id` is echoed back in the envelope and used for logging
    /// only. Always returns an envelope; errors surface in-band.
    pub async fn execute(&self, tool_call_id: &str, params: Value) -> Value {
        let action = params
            .get("action")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        log::debug!("registry action={} agent={} toolCallId={}", action, self.agent_id, tool_call_id);

        let outcome = match action.as_str() {
            "start" => self.start(&params).await,
            "checkpoint" => self.checkpoint(&params).await,
            "continue" => self.continue_loop(&params).await,
            "status" => self.status(&params),
            "list" => self.list(&params),
            "close" => self.close(&params).await,
            other => Err(RegistryError::UnsupportedAction(other.to_string())),
        };

        match outcome {
            Ok(mut envelope) => {
                envelope["toolCallId"] = json!(tool_call_id);
                envelope
            }
            Err(e) => {
                log::debug!("registry action={} failed: {}", action, e);
                json!({
                    "status": "error",
                    "toolCallId": tool_call_id,
                    "error": e.to_string(),
                })
            }
        }
    }

    /// Run a mutation as a full read-modify-write under the store lock.
    /// The document is only written back when the mutation succeeds.
    async fn with_store<F>(&self, mutate: F) -> Result<Value>
    where
        F: FnOnce(&mut RegistryDocument) -> Result<Value>,
    {
        let mut lock = StoreLock::for_store(&self.store_path, self.lock_config.clone());
        lock.acquire().await?;

        let mut document = storage::load_document(&self.store_path);
        let outcome = mutate(&mut document)
            .and_then(|value| storage::save_document(&self.store_path, &mut document).map(|_| value));

        lock.release();
        outcome
    }

    async fn start(&self, params: &Value) -> Result<Value> {
        let topic = required_text(params, "topic")?;
        let priority = params
            .get("priority")
            .and_then(Value::as_str)
            .map(LoopPriority::parse)
            .unwrap_or_default();
        let max_rounds = sanitize::clamp_max_rounds(params.get("maxRounds").and_then(Value::as_f64));

        let record = LoopRecord::new(
            topic,
            self.agent_id.clone(),
            self.session_key.clone(),
            priority,
            max_rounds,
            id::now_ms(),
        );
        log::info!("starting research loop {} for {}", record.loop_id, self.agent_id);

        self.with_store(move |document| {
            let view = loop_view(&record)?;
            document.loops.insert(record.loop_id.clone(), record);
            Ok(json!({ "status": "started", "loop": view }))
        })
        .await
    }

    async fn checkpoint(&self, params: &Value) -> Result<Value> {
        let loop_id = required_text(params, "loopId")?;
        let summary = required_text(params, "summary")?;

        let mut checkpoint = CheckpointRecord {
            summary,
            critique: optional_text(params, "critique", usize::MAX),
            recommendation: params
                .get("recommendation")
                .and_then(Value::as_str)
                .map(Recommendation::parse)
                .unwrap_or_default(),
            proposed_tasks: list_param(
                params,
                "proposedTasks",
                sanitize::MAX_PROPOSED_TASKS,
                sanitize::MAX_TASK_CHARS,
            ),
            importance: rating_param(params, "importance"),
            urgency: rating_param(params, "urgency"),
            confidence: rating_param(params, "confidence"),
            evidence_quality: rating_param(params, "evidenceQuality"),
            citation_links: list_param(params, "citationLinks", sanitize::MAX_CITATIONS, sanitize::MAX_CITATION_CHARS),
            counterpoints: list_param(
                params,
                "counterpoints",
                sanitize::MAX_COUNTERPOINTS,
                sanitize::MAX_COUNTERPOINT_CHARS,
            ),
            why_now: optional_text(params, "whyNow", sanitize::MAX_WHY_NOW_CHARS),
            ..Default::default()
        };
        checkpoint.analysis_quality_score = Some(scoring::analysis_quality_score(&checkpoint));
        checkpoint.priority_score = scoring::priority_score(checkpoint.importance, checkpoint.urgency);

        let agent_id = self.agent_id.clone();
        self.with_store(move |document| {
            let record = owned_loop_mut(document, &loop_id, &agent_id)?;
            let recommends_continue = checkpoint.recommendation == Recommendation::Continue;
            record.record_checkpoint(checkpoint, id::now_ms())?;

            let can_continue = recommends_continue && record.has_rounds_left();
            let advice = triage::spawn_advice(record, can_continue);
            log::info!(
                "checkpointed research loop {} round {} (quality {:?})",
                loop_id,
                record.current_round,
                record.latest_checkpoint().and_then(|c| c.analysis_quality_score)
            );

            Ok(json!({
                "status": "checkpointed",
                "loop": loop_view(record)?,
                "canContinue": can_continue,
                "spawnAdvice": advice,
            }))
        })
        .await
    }

    async fn continue_loop(&self, params: &Value) -> Result<Value> {
        let loop_id = required_text(params, "loopId")?;
        let reason = optional_text(params, "reason", usize::MAX);

        let agent_id = self.agent_id.clone();
        self.with_store(move |document| {
            let record = owned_loop_mut(document, &loop_id, &agent_id)?;
            record.apply_continue(reason, id::now_ms())?;
            log::info!("continued research loop {} into round {}", loop_id, record.current_round);
            Ok(json!({ "status": "continued", "loop": loop_view(record)? }))
        })
        .await
    }

    async fn close(&self, params: &Value) -> Result<Value> {
        let loop_id = required_text(params, "loopId")?;
        let reason = optional_text(params, "reason", usize::MAX);

        let agent_id = self.agent_id.clone();
        self.with_store(move |document| {
            let record = owned_loop_mut(document, &loop_id, &agent_id)?;
            if record.close(reason, id::now_ms()) {
                log::info!("closed research loop {}", loop_id);
            }
            Ok(json!({ "status": "closed", "loop": loop_view(record)? }))
        })
        .await
    }

    /// Read-only; runs without the lock.
    fn status(&self, params: &Value) -> Result<Value> {
        let loop_id = required_text(params, "loopId")?;

        let document = storage::load_document(&self.store_path);
        let record = document
            .loops
            .get(&loop_id)
            .ok_or_else(|| RegistryError::LoopNotFound(loop_id.clone()))?;
        if record.owner_agent_id != self.agent_id {
            return Err(RegistryError::LoopNotAccessible(loop_id));
        }

        Ok(json!({ "status": "ok", "loop": loop_view(record)? }))
    }

    /// Read-only; runs without the lock.
    fn list(&self, params: &Value) -> Result<Value> {
        let view = params
            .get("view")
            .and_then(Value::as_str)
            .map(ListView::parse)
            .unwrap_or(ListView::All);
        let state_filter = params
            .get("state")
            .and_then(Value::as_str)
            .and_then(LoopState::from_filter);
        let stale_hours = sanitize::clamp_stale_hours(params.get("staleHours").and_then(Value::as_f64));
        let limit = sanitize::clamp_limit(params.get("limit").and_then(Value::as_f64));

        let document = storage::load_document(&self.store_path);
        let mine: Vec<LoopRecord> = document
            .loops
            .into_values()
            .filter(|record| record.owner_agent_id == self.agent_id)
            .collect();

        let mut matching = triage::filter_and_sort(mine, view, state_filter, stale_hours, id::now_ms());
        matching.truncate(limit);
        let rows: Vec<_> = matching.iter().map(triage::summarize).collect();

        Ok(json!({ "status": "ok", "loops": rows, "count": rows.len() }))
    }
}

/// Look up a loop and enforce ownership. Missing loops and loops owned by
/// another agent get distinct errors so owners can diagnose from logs while
/// other agents learn nothing they can act on.
fn owned_loop_mut<'a>(
    document: &'a mut RegistryDocument,
    loop_id: &str,
    agent_id: &str,
) -> Result<&'a mut LoopRecord> {
    let record = document
        .loops
        .get_mut(loop_id)
        .ok_or_else(|| RegistryError::LoopNotFound(loop_id.to_string()))?;
    if record.owner_agent_id != agent_id {
        return Err(RegistryError::LoopNotAccessible(loop_id.to_string()));
    }
    Ok(record)
}

fn loop_view(record: &LoopRecord) -> Result<Value> {
    Ok(serde_json::to_value(record)?)
}

fn required_text(params: &Value, field: &'static str) -> Result<String> {
    params
        .get(field)
        .and_then(Value::as_str)
        .and_then(|s| sanitize::clean_text(s, usize::MAX))
        .ok_or(RegistryError::MissingField(field))
}

fn optional_text(params: &Value, field: &str, max_chars: usize) -> Option<String> {
    params
        .get(field)
        .and_then(Value::as_str)
        .and_then(|s| sanitize::clean_text(s, max_chars))
}

fn rating_param(params: &Value, field: &str) -> Option<u8> {
    params.get(field).and_then(sanitize::rating_from_value)
}

fn list_param(params: &Value, field: &str, max_items: usize, max_chars: usize) -> Vec<String> {
    params
        .get(field)
        .map(|value| sanitize::clean_list(&sanitize::string_list_from_value(value), max_items, max_chars))
        .unwrap_or_default()
}
