// File-backed state: legacy documents, concurrent writers, migration properties

use std::sync::Arc;

use labelflow::state::{canonical_level, migrate_document};
use labelflow::{ActivateParams, FileStateBackend, Project, ProjectStateStore};
use proptest::prelude::*;
use serde_json::{json, Value};

fn store_at(dir: &tempfile::TempDir) -> ProjectStateStore {
    ProjectStateStore::new(Arc::new(FileStateBackend::new(dir.path().join("state/projects.json"))))
}

#[tokio::test]
async fn legacy_file_is_read_and_rewritten_canonically() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state/projects.json");
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(
        &path,
        json!({
            "projects": {
                "-1001": {
                    "name": "webshop",
                    "repo": "~/git/webshop",
                    "dev": {
                        "active": true,
                        "issueId": "42",
                        "model": "sonnet",
                        "sessionId": "agent:dev:sonnet",
                        "startTime": "2026-01-10T09:00:00Z"
                    }
                }
            }
        })
        .to_string(),
    )
    .unwrap();

    let store = store_at(&dir);
    let worker = store.get_worker("-1001", "developer").await.unwrap();
    assert!(worker.active);
    assert_eq!(worker.level.as_deref(), Some("medior"));
    assert_eq!(worker.session_for("medior"), Some("agent:dev:sonnet"));

    store.deactivate_worker("-1001", "developer").await.unwrap();

    let raw: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    let project = &raw["projects"]["-1001"];
    assert!(project.get("dev").is_none());
    assert_eq!(project["workers"]["developer"]["active"], json!(false));
    assert_eq!(project["workers"]["developer"]["sessions"]["medior"], json!("agent:dev:sonnet"));
}

#[tokio::test]
async fn missing_file_reads_as_empty_and_leaves_no_temp_files() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_at(&dir);
    assert!(store.read_projects().await.unwrap().projects.is_empty());

    store
        .register_project("p1", Project::new("shop", "/src/shop"))
        .await
        .unwrap();
    store
        .activate_worker("p1", "tester", ActivateParams::new("9", "reviewer").with_session("s-9"))
        .await
        .unwrap();

    let entries: Vec<String> = std::fs::read_dir(dir.path().join("state"))
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    assert_eq!(entries, vec!["projects.json".to_string()]);

    let reopened = store_at(&dir);
    let worker = reopened.get_worker("p1", "tester").await.unwrap();
    assert_eq!(worker.issue_ids(), vec![9]);
    assert_eq!(worker.current_session(), Some("s-9"));
}

#[tokio::test]
async fn concurrent_updates_through_one_store_are_not_lost() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(store_at(&dir));
    for id in ["a", "b", "c", "d"] {
        store.register_project(id, Project::new(id, "/src")).await.unwrap();
    }

    let handles: Vec<_> = ["a", "b", "c", "d"]
        .into_iter()
        .enumerate()
        .map(|(n, id)| {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .activate_worker(id, "developer", ActivateParams::new(n.to_string(), "junior"))
                    .await
                    .unwrap();
            })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap();
    }

    let document = store.read_projects().await.unwrap();
    assert_eq!(document.projects.values().filter(|p| p.is_active()).count(), 4);
}

fn role_name() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("dev".to_string()),
        Just("qa".to_string()),
        Just("developer".to_string()),
        Just("tester".to_string()),
        "[a-z]{3,8}",
    ]
}

fn level_name() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("haiku".to_string()),
        Just("sonnet".to_string()),
        Just("opus".to_string()),
        Just("junior".to_string()),
        Just("senior".to_string()),
        "[a-z]{3,8}",
    ]
}

fn worker_value() -> impl Strategy<Value = Value> {
    (any::<bool>(), proptest::option::of(level_name()), proptest::option::of("[a-z0-9:]{4,12}"), any::<bool>())
        .prop_map(|(active, level, session, legacy_keys)| {
            let mut worker = json!({ "active": active, "issueId": if active { json!("7") } else { Value::Null } });
            match (level, legacy_keys) {
                (Some(level), true) => {
                    worker["model"] = json!(level);
                    if let Some(session) = session {
                        worker["sessionId"] = json!(session);
                    }
                }
                (Some(level), false) => {
                    let mut sessions = serde_json::Map::new();
                    sessions.insert(level.clone(), json!(session));
                    worker["sessions"] = Value::Object(sessions);
                    worker["level"] = json!(level);
                }
                (None, _) => {}
            }
            worker
        })
}

fn document_value() -> impl Strategy<Value = Value> {
    proptest::collection::btree_map(
        "[a-z]{1,6}",
        (proptest::collection::btree_map(role_name(), worker_value(), 0..3), any::<bool>()),
        0..4,
    )
    .prop_map(|projects| {
        let projects: serde_json::Map<String, Value> = projects
            .into_iter()
            .map(|(id, (workers, flat))| {
                let mut project = json!({ "name": id, "repo": "/src" });
                for (role, worker) in workers {
                    if flat && matches!(role.as_str(), "dev" | "qa" | "developer" | "tester") {
                        project[role] = worker;
                    } else {
                        project["workers"][role] = worker;
                    }
                }
                (id, project)
            })
            .collect();
        json!({ "projects": projects })
    })
}

proptest! {
    #[test]
    fn migration_is_idempotent(mut document in document_value()) {
        migrate_document(&mut document);
        let once = document.clone();
        prop_assert!(!migrate_document(&mut document));
        prop_assert_eq!(once, document);
    }

    #[test]
    fn migration_keeps_workflow_role_names(mut document in document_value()) {
        let before = document.clone();
        migrate_document(&mut document);
        for (id, project) in document["projects"].as_object().unwrap() {
            let workers = project["workers"].as_object().unwrap();
            if let Some(original) = before["projects"][id]["workers"].as_object() {
                for role in original.keys() {
                    prop_assert!(workers.contains_key(role));
                }
            }
            for field in ["dev", "qa", "developer", "tester"] {
                prop_assert!(project.get(field).is_none());
            }
            for worker in workers.values() {
                for level in worker["sessions"].as_object().unwrap().keys() {
                    prop_assert_eq!(&canonical_level(level), level);
                }
            }
        }
    }
}
