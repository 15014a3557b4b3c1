//! ID and timestamp utilities for loopscope
//!
//! Provides loop id generation and the shared session-key → agent-id helper
//! used to scope every loop to its owning agent.

use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Agent id used when no session key was supplied.
pub const ANONYMOUS_AGENT_ID: &str = "agent-anonymous";

/// Get current timestamp in milliseconds since Unix epoch
pub fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// Generate a unique loop ID (version-4 UUID).
pub fn generate_loop_id() -> String {
    Uuid::new_v4().to_string()
}

/// Resolve a session key into a stable agent id.
///
/// Format: `agent-{first 12 hex chars of SHA-256(session key)}`. The same
/// session key always maps to the same agent id, so ownership survives
/// process restarts. Empty or missing keys resolve to [`ANONYMOUS_AGENT_ID`].
pub fn agent_id_from_session(session_key: Option<&str>) -> String {
    let key = match session_key {
        Some(k) if !k.trim().is_empty() => k,
        _ => return ANONYMOUS_AGENT_ID.to_string(),
    };

    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    let digest = hasher.finalize();

    format!("agent-{}", &hex::encode(&digest[..6]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_ms_returns_reasonable_timestamp() {
        let ts = now_ms();
        // Should be after 2020-01-01 and before 2100-01-01
        assert!(ts > 1577836800000); // 2020-01-01
        assert!(ts < 4102444800000); // 2100-01-01
    }

    #[test]
    fn test_generate_loop_id_is_uuid() {
        let id = generate_loop_id();
        assert_eq!(id.len(), 36);
        let parts: Vec<&str> = id.split('-').collect();
        assert_eq!(parts.len(), 5);
        // Version nibble is 4
        assert!(parts[2].starts_with('4'));
    }

    #[test]
    fn test_generate_loop_id_uniqueness() {
        let mut ids = std::collections::HashSet::new();
        for _ in 0..100 {
            assert!(ids.insert(generate_loop_id()), "generated duplicate ID");
        }
    }

    #[test]
    fn test_agent_id_is_deterministic() {
        let a = agent_id_from_session(Some("session-alpha"));
        let b = agent_id_from_session(Some("session-alpha"));
        assert_eq!(a, b);
    }

    #[test]
    fn test_agent_id_format() {
        let id = agent_id_from_session(Some("session-alpha"));
        assert!(id.starts_with("agent-"));
        let suffix = &id["agent-".len()..];
        assert_eq!(suffix.len(), 12);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_distinct_sessions_get_distinct_agents() {
        let a = agent_id_from_session(Some("session-alpha"));
        let b = agent_id_from_session(Some("session-beta"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_missing_session_is_anonymous() {
        assert_eq!(agent_id_from_session(None), ANONYMOUS_AGENT_ID);
        assert_eq!(agent_id_from_session(Some("")), ANONYMOUS_AGENT_ID);
        assert_eq!(agent_id_from_session(Some("   ")), ANONYMOUS_AGENT_ID);
    }
}
