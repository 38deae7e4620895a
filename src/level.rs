// Level selection for a picked-up task

use crate::workflow::{WorkflowConfig, DEVELOPER, TESTER};

const SENIOR_KEYWORDS: &[&str] = &[
    "architecture",
    "refactor",
    "migration",
    "migrate",
    "security",
    "redesign",
    "performance",
];

const JUNIOR_KEYWORDS: &[&str] = &["typo", "docs", "documentation", "rename", "minor", "simple", "css"];

const HANDS_ON_TEST_KEYWORDS: &[&str] = &["ui", "visual", "browser", "e2e", "screenshot"];

/// Level encoded in the task's labels, either as a bare level name or as `<role>:<level>`.
///
/// Only levels that belong to `role` count. A label naming a level of another
/// role is ignored so the caller falls back to the heuristic.
pub fn detect_level_from_labels(workflow: &WorkflowConfig, role: &str, labels: &[String]) -> Option<String> {
    let levels = workflow.levels_for(role);
    labels.iter().find_map(|label| {
        let label = label.trim();
        let candidate = match label.split_once(':') {
            Some((prefix, level)) if prefix.trim().eq_ignore_ascii_case(role) => level.trim(),
            Some(_) => return None,
            None => label,
        };
        levels
            .iter()
            .find(|level| level.eq_ignore_ascii_case(candidate))
            .cloned()
    })
}

fn mentions(text: &str, keywords: &[&str]) -> bool {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .any(|word| keywords.iter().any(|keyword| word.eq_ignore_ascii_case(keyword)))
}

/// Keyword heuristic over title and description
pub fn select_level(workflow: &WorkflowConfig, role: &str, title: &str, description: &str) -> String {
    let text = format!("{title}\n{description}");
    let levels = workflow.levels_for(role);
    let has = |level: &str| levels.iter().any(|known| known == level);

    let picked = match role {
        DEVELOPER if mentions(&text, SENIOR_KEYWORDS) && has("senior") => Some("senior"),
        DEVELOPER if mentions(&text, JUNIOR_KEYWORDS) && has("junior") => Some("junior"),
        TESTER if mentions(&text, HANDS_ON_TEST_KEYWORDS) && has("tester") => Some("tester"),
        _ => None,
    };

    picked
        .map(str::to_string)
        .or_else(|| workflow.default_level(role).map(str::to_string))
        .or_else(|| levels.first().cloned())
        .unwrap_or_else(|| "default".to_string())
}

/// Labels first, heuristic second
pub fn resolve_level(
    workflow: &WorkflowConfig,
    role: &str,
    labels: &[String],
    title: &str,
    description: &str,
) -> String {
    detect_level_from_labels(workflow, role, labels)
        .unwrap_or_else(|| select_level(workflow, role, title, description))
}
