use std::collections::BTreeMap;

use super::types::{Action, RoleConfig, StateConfig, StateTable, StateType, TransitionTarget, WorkflowConfig};

pub const DEVELOPER: &str = "developer";
pub const TESTER: &str = "tester";

/// Planning → To Do → Doing → To Test → Testing → Done, with a rework loop
/// through To Improve and a shared Refining hold state.
impl Default for WorkflowConfig {
    fn default() -> Self {
        let mut states = StateTable::new();

        states.insert(
            "planning",
            StateConfig::new(StateType::Hold, "Planning").on("APPROVE", TransitionTarget::to("todo")),
        );
        states.insert(
            "todo",
            StateConfig::new(StateType::Queue, "To Do")
                .for_role(DEVELOPER)
                .with_priority(1)
                .on("PICKUP", TransitionTarget::to("doing")),
        );
        states.insert(
            "doing",
            StateConfig::new(StateType::Active, "Doing")
                .for_role(DEVELOPER)
                .on(
                    "COMPLETE",
                    TransitionTarget::with_actions("toTest", &[Action::GitPull, Action::DetectPr]),
                )
                .on("BLOCKED", TransitionTarget::to("refining")),
        );
        states.insert(
            "toTest",
            StateConfig::new(StateType::Queue, "To Test")
                .for_role(TESTER)
                .with_priority(2)
                .on("PICKUP", TransitionTarget::to("testing")),
        );
        states.insert(
            "testing",
            StateConfig::new(StateType::Active, "Testing")
                .for_role(TESTER)
                .on("PASS", TransitionTarget::with_actions("done", &[Action::CloseIssue]))
                .on(
                    "FAIL",
                    TransitionTarget::with_actions("toImprove", &[Action::ReopenIssue]),
                )
                .on("REFINE", TransitionTarget::to("refining"))
                .on("BLOCKED", TransitionTarget::to("refining")),
        );
        states.insert(
            "toImprove",
            StateConfig::new(StateType::Queue, "To Improve")
                .for_role(DEVELOPER)
                .with_priority(3)
                .on("PICKUP", TransitionTarget::to("doing")),
        );
        states.insert(
            "refining",
            StateConfig::new(StateType::Hold, "Refining").on("APPROVE", TransitionTarget::to("todo")),
        );
        states.insert("done", StateConfig::new(StateType::Terminal, "Done"));

        let mut roles = BTreeMap::new();
        roles.insert(
            DEVELOPER.to_string(),
            RoleConfig {
                levels: vec!["junior".to_string(), "medior".to_string(), "senior".to_string()],
                default_level: "medior".to_string(),
            },
        );
        roles.insert(
            TESTER.to_string(),
            RoleConfig {
                levels: vec!["reviewer".to_string(), "tester".to_string()],
                default_level: "reviewer".to_string(),
            },
        );

        Self {
            initial: "planning".to_string(),
            states,
            roles,
        }
    }
}
