//! Normalization of older state documents.
//!
//! Every read passes through [`migrate_document`] exactly once, so the rest of
//! the crate only ever sees a `workers` map with canonical level names.
//! Keys already inside `workers` are role names of the project's workflow and
//! are kept as written; only the flat `dev`/`qa` fields of the oldest layout
//! are renamed. Running it on an already-canonical document changes nothing.

use serde_json::{Map, Value};

/// Role fields that older documents stored directly on the project object
const LEGACY_ROLE_FIELDS: &[&str] = &["dev", "qa", "developer", "tester"];

pub fn canonical_role(role: &str) -> String {
    match role.to_lowercase().as_str() {
        "dev" => "developer".to_string(),
        "qa" => "tester".to_string(),
        other => other.to_string(),
    }
}

pub fn canonical_level(level: &str) -> String {
    match level.to_lowercase().as_str() {
        "jr" | "haiku" => "junior".to_string(),
        "mid" | "sonnet" => "medior".to_string(),
        "sr" | "opus" => "senior".to_string(),
        other => other.to_string(),
    }
}

/// Bring a raw document into canonical shape. Returns whether anything changed.
pub fn migrate_document(document: &mut Value) -> bool {
    let Some(root) = document.as_object_mut() else {
        return false;
    };
    let Some(projects) = root.get_mut("projects").and_then(Value::as_object_mut) else {
        return false;
    };

    let mut changed = false;
    for project in projects.values_mut() {
        if let Some(project) = project.as_object_mut() {
            changed |= migrate_project(project);
        }
    }
    changed
}

fn looks_like_worker(value: &Value) -> bool {
    value
        .as_object()
        .map(|worker| worker.contains_key("active"))
        .unwrap_or(false)
}

fn migrate_project(project: &mut Map<String, Value>) -> bool {
    let mut changed = false;

    let mut workers = match project.remove("workers") {
        Some(Value::Object(workers)) => workers,
        Some(_) | None => {
            changed = true;
            Map::new()
        }
    };

    for field in LEGACY_ROLE_FIELDS {
        if project.get(*field).map(looks_like_worker).unwrap_or(false) {
            if let Some(worker) = project.remove(*field) {
                changed = true;
                workers.entry(canonical_role(field)).or_insert(worker);
            }
        }
    }

    for worker in workers.values_mut() {
        if let Some(worker) = worker.as_object_mut() {
            changed |= migrate_worker(worker);
        }
    }

    project.insert("workers".to_string(), Value::Object(workers));
    changed
}

fn migrate_worker(worker: &mut Map<String, Value>) -> bool {
    let mut changed = false;

    if let Some(model) = worker.remove("model") {
        changed = true;
        let has_level = worker.get("level").map(|level| !level.is_null()).unwrap_or(false);
        if !has_level {
            worker.insert("level".to_string(), model);
        }
    }

    if let Some(level) = worker.get("level").and_then(Value::as_str).map(str::to_string) {
        let canonical = canonical_level(&level);
        if canonical != level {
            changed = true;
            worker.insert("level".to_string(), Value::String(canonical));
        }
    }

    let mut sessions = match worker.remove("sessions") {
        Some(Value::Object(sessions)) => sessions,
        Some(_) | None => {
            changed = true;
            Map::new()
        }
    };

    if let Some(session_id) = worker.remove("sessionId") {
        changed = true;
        let level = worker.get("level").and_then(Value::as_str).map(str::to_string);
        if let (Some(level), true) = (level, session_id.is_string()) {
            sessions.entry(level).or_insert(session_id);
        }
    }

    let mut canonical_sessions = Map::new();
    for (level, session) in sessions {
        let level_name = canonical_level(&level);
        if level_name != level {
            changed = true;
        }
        match canonical_sessions.get(&level_name) {
            Some(existing) if !existing.is_null() => {}
            _ => {
                canonical_sessions.insert(level_name, session);
            }
        }
    }
    worker.insert("sessions".to_string(), Value::Object(canonical_sessions));

    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn legacy_document() -> Value {
        json!({
            "projects": {
                "-100123": {
                    "name": "webshop",
                    "repo": "~/git/webshop",
                    "dev": {
                        "active": true,
                        "issueId": "42",
                        "model": "sonnet",
                        "sessionId": "agent:dev:sonnet",
                        "startTime": "2026-01-10T09:00:00Z"
                    },
                    "qa": {
                        "active": false,
                        "issueId": null,
                        "sessions": {"qa": null}
                    }
                },
                "-100456": {
                    "name": "blog",
                    "repo": "~/git/blog",
                    "workers": {
                        "dev": {"active": false, "level": "mid", "sessions": {"mid": "s-1", "senior": null}}
                    }
                }
            }
        })
    }

    #[test]
    fn flat_role_fields_fold_into_workers() {
        let mut doc = legacy_document();
        assert!(migrate_document(&mut doc));

        let webshop = &doc["projects"]["-100123"];
        assert!(webshop.get("dev").is_none());
        assert!(webshop.get("qa").is_none());

        let developer = &webshop["workers"]["developer"];
        assert_eq!(developer["active"], true);
        assert_eq!(developer["level"], "medior");
        assert!(developer.get("model").is_none());
        assert!(developer.get("sessionId").is_none());
        assert_eq!(developer["sessions"]["medior"], "agent:dev:sonnet");

        assert_eq!(webshop["workers"]["tester"]["active"], false);
    }

    #[test]
    fn workers_map_keeps_role_names_and_canonicalizes_levels() {
        let mut doc = legacy_document();
        migrate_document(&mut doc);

        let workers = doc["projects"]["-100456"]["workers"].as_object().unwrap();
        assert!(workers.get("developer").is_none());
        let developer = &workers["dev"];
        assert_eq!(developer["level"], "medior");
        assert_eq!(developer["sessions"]["medior"], "s-1");
        assert!(developer["sessions"].get("mid").is_none());
        assert!(developer["sessions"]["senior"].is_null());
    }

    #[test]
    fn migration_is_idempotent() {
        let mut once = legacy_document();
        migrate_document(&mut once);

        let mut twice = once.clone();
        let changed = migrate_document(&mut twice);

        assert_eq!(once, twice);
        assert!(!changed);
    }

    #[test]
    fn canonical_document_is_untouched() {
        let mut doc = json!({
            "projects": {
                "p": {
                    "name": "p",
                    "repo": "/p",
                    "workers": {"developer": {"active": false, "level": "senior", "sessions": {}}}
                }
            }
        });
        let before = doc.clone();
        assert!(!migrate_document(&mut doc));
        assert_eq!(doc, before);
    }

    #[test]
    fn flat_field_does_not_shadow_workers_entry() {
        let mut doc = json!({
            "projects": {
                "p": {
                    "name": "p",
                    "repo": "/p",
                    "dev": {"active": false, "sessions": {}},
                    "workers": {
                        "developer": {"active": true, "issueId": "1", "sessions": {}}
                    }
                }
            }
        });
        migrate_document(&mut doc);
        let workers = doc["projects"]["p"]["workers"].as_object().unwrap();
        assert_eq!(workers.len(), 1);
        assert_eq!(workers["developer"]["active"], true);
    }

    #[test]
    fn custom_role_names_survive_repeated_reads() {
        let mut doc = json!({
            "projects": {
                "p": {
                    "name": "p",
                    "repo": "/p",
                    "workers": {
                        "dev": {"active": true, "issueId": "42", "level": "senior", "sessions": {"senior": "s-42"}},
                        "qa": {"active": false, "sessions": {}}
                    }
                }
            }
        });
        let before = doc.clone();
        assert!(!migrate_document(&mut doc));
        assert_eq!(doc, before);
    }

    #[test]
    fn name_mappings() {
        assert_eq!(canonical_role("QA"), "tester");
        assert_eq!(canonical_role("reviewer"), "reviewer");
        assert_eq!(canonical_level("opus"), "senior");
        assert_eq!(canonical_level("haiku"), "junior");
        assert_eq!(canonical_level("tester"), "tester");
    }
}
