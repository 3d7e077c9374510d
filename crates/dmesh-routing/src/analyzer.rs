use dmesh_core::types::{Level, Reversibility, TaskAttributes};
use std::collections::BTreeSet;

/// Derives [`TaskAttributes`] from raw request text by keyword heuristics
/// and length cues (§4.8's `analyze(text)`). Deliberately simple and
/// deterministic — no NLP model, just enumerated keyword sets, so the
/// same text always yields the same attributes.
pub struct TaskAnalyzer;

const HIGH_COMPLEXITY_KEYWORDS: &[&str] = &[
    "architecture", "migrate", "refactor", "redesign", "integrate", "orchestrate",
];
const MEDIUM_COMPLEXITY_KEYWORDS: &[&str] =
    &["implement", "build", "write", "add", "update", "fix"];

const HIGH_CRITICALITY_KEYWORDS: &[&str] =
    &["production", "payment", "security", "credential", "delete", "deploy"];
const MEDIUM_CRITICALITY_KEYWORDS: &[&str] = &["staging", "config", "migration"];

const VERIFIABLE_KEYWORDS: &[&str] = &["test", "check", "verify", "lint", "assert"];
const UNVERIFIABLE_KEYWORDS: &[&str] = &["design", "brainstorm", "explore", "consider"];

const LOW_REVERSIBILITY_KEYWORDS: &[&str] =
    &["delete", "drop", "irrevers", "destroy", "permanent", "force-push"];

/// Keywords that push a sub-task to a human reviewer regardless of
/// capability match (§4.7 rule 1).
pub const HUMAN_GATING_KEYWORDS: &[&str] = &["approve", "review", "decide", "subjective"];

const CAPABILITY_KEYWORDS: &[(&str, &str)] = &[
    ("shell", "shell-exec"),
    ("terminal", "shell-exec"),
    ("read file", "read-file"),
    ("read the file", "read-file"),
    ("write file", "write-file"),
    ("edit file", "write-file"),
    ("browser", "browser-automation"),
    ("deploy", "deploy"),
    ("database", "database-access"),
    ("sql", "database-access"),
];

impl TaskAnalyzer {
    /// `true` when `text` contains any of the human-gating keywords (spec
    /// §4.7 rule 1) — checked by the router before any capability
    /// matching is attempted.
    pub fn requires_human_gate(text: &str) -> bool {
        let lower = text.to_lowercase();
        HUMAN_GATING_KEYWORDS.iter().any(|kw| lower.contains(kw))
    }

    pub fn analyze(text: &str) -> TaskAttributes {
        let lower = text.to_lowercase();
        let word_count = text.split_whitespace().count();

        let complexity = if HIGH_COMPLEXITY_KEYWORDS.iter().any(|kw| lower.contains(kw)) || word_count > 80 {
            Level::High
        } else if MEDIUM_COMPLEXITY_KEYWORDS.iter().any(|kw| lower.contains(kw)) || word_count > 20 {
            Level::Medium
        } else {
            Level::Low
        };

        let criticality = if HIGH_CRITICALITY_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
            Level::High
        } else if MEDIUM_CRITICALITY_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
            Level::Medium
        } else {
            Level::Low
        };

        let verifiability = if VERIFIABLE_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
            Level::High
        } else if UNVERIFIABLE_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
            Level::Low
        } else {
            Level::Medium
        };

        let reversibility = if LOW_REVERSIBILITY_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
            Reversibility::Low
        } else {
            Reversibility::High
        };

        let required_capabilities: BTreeSet<String> = CAPABILITY_KEYWORDS
            .iter()
            .filter(|(kw, _)| lower.contains(kw))
            .map(|(_, cap)| cap.to_string())
            .collect();

        let (estimated_cost_usd, estimated_duration_ms, estimated_tokens) = match complexity {
            Level::Low => (0.02, 10_000, 500),
            Level::Medium => (0.10, 60_000, 3_000),
            Level::High => (0.50, 300_000, 15_000),
        };

        TaskAttributes {
            complexity,
            criticality,
            verifiability,
            reversibility,
            estimated_cost_usd,
            estimated_duration_ms,
            estimated_tokens,
            required_capabilities,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deploy_to_production_is_high_criticality() {
        let attrs = TaskAnalyzer::analyze("deploy the new service to production");
        assert_eq!(attrs.criticality, Level::High);
    }

    #[test]
    fn delete_is_low_reversibility() {
        let attrs = TaskAnalyzer::analyze("delete the stale backup directory");
        assert_eq!(attrs.reversibility, Reversibility::Low);
    }

    #[test]
    fn review_text_requires_human_gate() {
        assert!(TaskAnalyzer::requires_human_gate("please review and approve this PR"));
        assert!(!TaskAnalyzer::requires_human_gate("run the test suite"));
    }

    #[test]
    fn shell_keyword_adds_shell_exec_capability() {
        let attrs = TaskAnalyzer::analyze("open a shell and run the build");
        assert!(attrs.required_capabilities.contains("shell-exec"));
    }

    #[test]
    fn short_plain_text_is_low_complexity() {
        let attrs = TaskAnalyzer::analyze("say hello");
        assert_eq!(attrs.complexity, Level::Low);
    }
}
