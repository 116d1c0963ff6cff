//! Detects results that describe unfinished work.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::ContinuationHint;

/// Wording that marks a result as incomplete, checked case-insensitively in order
pub const CONTINUATION_PHRASES: &[&str] = &[
    "next steps",
    "remaining",
    "still need to",
    "not yet implemented",
    "todo",
];

/// Headings after which bullet lines are taken as suggested steps
const STEP_HEADINGS: &[&str] = &["next steps", "remaining"];

const MAX_NEXT_STEPS: usize = 5;

static BULLET: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(?:[-*•]|\d+[.)])\s+(.+?)\s*$").expect("bullet regex is valid"));

pub fn detect(result: &str) -> Option<ContinuationHint> {
    let lower = result.to_lowercase();
    let phrase = CONTINUATION_PHRASES.iter().find(|p| lower.contains(*p))?;
    Some(ContinuationHint {
        reason: format!("agent reported unfinished work (\"{}\")", phrase),
        next_steps: next_steps(result),
    })
}

fn next_steps(result: &str) -> Vec<String> {
    let mut lines = result.lines();
    let found_heading = lines
        .by_ref()
        .any(|line| {
            let lower = line.to_lowercase();
            STEP_HEADINGS.iter().any(|h| lower.contains(h))
        });
    if !found_heading {
        return Vec::new();
    }

    let mut steps = Vec::new();
    for line in lines {
        if line.trim().is_empty() {
            if steps.is_empty() {
                continue;
            }
            break;
        }
        match BULLET.captures(line) {
            Some(caps) => steps.push(caps[1].to_string()),
            None => break,
        }
        if steps.len() == MAX_NEXT_STEPS {
            break;
        }
    }
    steps
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_complete_result() {
        assert_eq!(detect("Implemented the parser and all tests pass."), None);
    }

    #[test]
    fn test_next_steps_are_collected() {
        let result = "Added the endpoint.\n\n## Next steps\n\n- Wire up auth\n* Add pagination\n1. Write docs\n\nThanks!";
        let hint = detect(result).expect("continuation");
        assert!(hint.reason.contains("next steps"));
        assert_eq!(hint.next_steps, vec!["Wire up auth", "Add pagination", "Write docs"]);
    }

    #[test]
    fn test_at_most_five_steps() {
        let bullets: String = (1..=8).map(|i| format!("- step {}\n", i)).collect();
        let hint = detect(&format!("Remaining work:\n{}", bullets)).unwrap();
        assert_eq!(hint.next_steps.len(), 5);
        assert_eq!(hint.next_steps[4], "step 5");
    }

    #[test]
    fn test_phrase_without_list() {
        let hint = detect("Caching is not yet implemented.").unwrap();
        assert!(hint.reason.contains("not yet implemented"));
        assert!(hint.next_steps.is_empty());

        assert!(detect("Left a TODO in main.rs").is_some());
    }
}
