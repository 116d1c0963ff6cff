//! Heuristic failure classification over free-form agent output.
//!
//! Every matcher lowercases its input and checks it against one of the keyword
//! tables below. Both the stream parser and the adapters' probes go through
//! these functions, so there is exactly one place where the vocabulary lives.

use chrono::{DateTime, Duration, Local, NaiveDateTime, NaiveTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::UsageLimitResult;

/// Transient throttling; retry soon
pub const RATE_LIMIT_PATTERNS: &[&str] = &[
    "rate limit",
    "rate_limit",
    "ratelimit",
    "rate-limited",
    "429",
    "overloaded",
    "too many requests",
];

/// Quota exhaustion; retry only after the reset
pub const USAGE_LIMIT_PATTERNS: &[&str] = &[
    "usage limit",
    "usage_limit",
    "quota exceeded",
    "quota exhausted",
    "exceeded your quota",
    "exceeded your current quota",
    "insufficient_quota",
    "out of credits",
    "credit balance is too low",
    "daily limit",
    "weekly limit",
    "monthly limit",
];

/// Credentials rejected; needs an interactive login
pub const AUTH_ERROR_PATTERNS: &[&str] = &[
    "401",
    "403",
    "unauthorized",
    "authentication failed",
    "authentication_error",
    "invalid api key",
    "invalid_api_key",
    "invalid x-api-key",
    "token expired",
    "token has expired",
    "oauth token has expired",
    "please log in",
    "please login",
    "please run /login",
    "not logged in",
    "login required",
];

/// Generic failure words used when a line is not structured
pub const GENERIC_ERROR_PATTERNS: &[&str] = &[
    "error",
    "fatal",
    "exception",
    "traceback",
    "panicked",
];

/// Outcome of classifying a piece of text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    UsageLimit,
    RateLimit,
    Auth,
    None,
}

fn contains_any(text: &str, patterns: &[&str]) -> bool {
    let lower = text.to_lowercase();
    patterns.iter().any(|p| lower.contains(p))
}

pub fn is_rate_limit(text: &str) -> bool {
    contains_any(text, RATE_LIMIT_PATTERNS)
}

pub fn is_usage_limit(text: &str) -> bool {
    contains_any(text, USAGE_LIMIT_PATTERNS)
}

pub fn is_auth_error(text: &str) -> bool {
    contains_any(text, AUTH_ERROR_PATTERNS)
}

pub fn is_generic_error(text: &str) -> bool {
    contains_any(text, GENERIC_ERROR_PATTERNS)
}

/// Classify with fixed precedence: usage limit, then rate limit, then auth.
pub fn classify(text: &str) -> ErrorClass {
    if is_usage_limit(text) {
        ErrorClass::UsageLimit
    } else if is_rate_limit(text) {
        ErrorClass::RateLimit
    } else if is_auth_error(text) {
        ErrorClass::Auth
    } else {
        ErrorClass::None
    }
}

/// Detect quota exhaustion and, when possible, when it resets.
pub fn detect_usage_limit(text: &str) -> UsageLimitResult {
    detect_usage_limit_at(text, Utc::now())
}

/// Same as [`detect_usage_limit`] with an explicit "now"
pub fn detect_usage_limit_at(text: &str, now: DateTime<Utc>) -> UsageLimitResult {
    if !is_usage_limit(text) {
        return UsageLimitResult::none();
    }
    UsageLimitResult {
        is_usage_limit: true,
        reset_at: extract_reset_time(text, now),
    }
}

static CLOCK_TIME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:at|resets?|until)\s+(\d{1,2})(?::(\d{2}))?\s*(am|pm)?\b")
        .expect("clock time regex is valid")
});

static RELATIVE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\bin\s+(?:about\s+|approximately\s+|~\s*)?(\d+)\s*(days?|d|hours?|hrs?|h|minutes?|mins?|m|seconds?|secs?|s)\b",
    )
    .expect("relative duration regex is valid")
});

static ISO_TIMESTAMP: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\d{4}-\d{2}-\d{2}[t ]\d{2}:\d{2}(?::\d{2}(?:\.\d+)?)?(?:z|[+-]\d{2}:?\d{2})?")
        .expect("iso timestamp regex is valid")
});

/// Three strategies in order, first hit wins: clock time, relative duration, ISO timestamp.
fn extract_reset_time(text: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    clock_time(text, now)
        .or_else(|| relative_duration(text, now))
        .or_else(|| iso_timestamp(text))
}

/// "resets at 3pm", "try again at 14:30". Interpreted in local time: today, or
/// tomorrow when that moment already passed.
fn clock_time(text: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    CLOCK_TIME.captures_iter(text).find_map(|caps| {
        let minutes = caps.get(2);
        let meridiem = caps.get(3).map(|m| m.as_str().to_lowercase());
        // A bare number ("resets 5") is too ambiguous to be a clock time.
        if minutes.is_none() && meridiem.is_none() {
            return None;
        }

        let mut hour: u32 = caps.get(1)?.as_str().parse().ok()?;
        let minute: u32 = minutes.map_or(Some(0), |m| m.as_str().parse().ok())?;
        match meridiem.as_deref() {
            Some("pm") if hour < 12 => hour += 12,
            Some("am") if hour == 12 => hour = 0,
            Some(_) if hour > 12 => return None,
            _ => {}
        }
        let time = NaiveTime::from_hms_opt(hour, minute, 0)?;

        let local_now = now.with_timezone(&Local);
        let today = local_now.date_naive().and_time(time);
        let candidate = Local
            .from_local_datetime(&today)
            .earliest()?
            .with_timezone(&Utc);
        if candidate <= now {
            Some(candidate + Duration::days(1))
        } else {
            Some(candidate)
        }
    })
}

/// "try again in 2 hours", "resets in 30 minutes"
fn relative_duration(text: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let caps = RELATIVE.captures(text)?;
    let amount: i64 = caps.get(1)?.as_str().parse().ok()?;
    let unit = caps.get(2)?.as_str().to_lowercase();
    let seconds = match unit.chars().next()? {
        'd' => 86_400,
        'h' => 3_600,
        'm' => 60,
        's' => 1,
        _ => return None,
    };
    Some(now + Duration::seconds(amount.checked_mul(seconds)?))
}

/// "2025-06-01T12:00:00Z" and friends; naive timestamps are taken as UTC
fn iso_timestamp(text: &str) -> Option<DateTime<Utc>> {
    let raw = ISO_TIMESTAMP.find(text)?.as_str().to_uppercase().replacen(' ', "T", 1);

    if let Ok(dt) = DateTime::parse_from_rfc3339(&raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%z") {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(&raw, fmt).ok())
        .map(|naive| naive.and_utc())
}
