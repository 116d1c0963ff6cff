//! Blocks automatic scheduling of agents that hit a usage limit.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, TimeDelta, Utc};

/// Per-agent "blocked until" instants. Expired entries disappear on read.
#[derive(Debug)]
pub struct UsageLimitGate {
    blocked: Mutex<HashMap<String, DateTime<Utc>>>,
    fallback: TimeDelta,
}

impl UsageLimitGate {
    /// `fallback` is the hold time when the limit message carried no reset time
    pub fn new(fallback: TimeDelta) -> Self {
        Self {
            blocked: Mutex::new(HashMap::new()),
            fallback,
        }
    }

    /// Block `agent_id` until `reset_at`, or `now + fallback` when unknown.
    /// A later existing block is kept.
    pub fn block(&self, agent_id: &str, reset_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> DateTime<Utc> {
        let until = reset_at.filter(|t| *t > now).unwrap_or(now + self.fallback);
        let mut blocked = self.blocked.lock().unwrap_or_else(|e| e.into_inner());
        let entry = blocked.entry(agent_id.to_string()).or_insert(until);
        if *entry < until {
            *entry = until;
        }
        tracing::warn!(agent = agent_id, until = %entry, "agent gated by usage limit");
        *entry
    }

    /// Instant until which `agent_id` is blocked, if still in the future
    pub fn blocked_until(&self, agent_id: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let mut blocked = self.blocked.lock().unwrap_or_else(|e| e.into_inner());
        match blocked.get(agent_id) {
            Some(until) if *until > now => Some(*until),
            Some(_) => {
                blocked.remove(agent_id);
                tracing::info!(agent = agent_id, "usage limit gate expired");
                None
            }
            None => None,
        }
    }

    pub fn is_blocked(&self, agent_id: &str, now: DateTime<Utc>) -> bool {
        self.blocked_until(agent_id, now).is_some()
    }

    pub fn clear(&self, agent_id: &str) {
        self.blocked
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(agent_id);
    }
}

impl Default for UsageLimitGate {
    fn default() -> Self {
        Self::new(TimeDelta::minutes(60))
    }
}
