// Pure derivations over the workflow graph. Nothing in here does I/O.

use std::collections::{HashSet, VecDeque};

use super::types::{CompletionRule, StateConfig, StateType, WorkflowConfig};
use crate::error::{CoreError, CoreResult};
use crate::state::migration::canonical_role;

/// Map a completion result onto the event name used in transition tables
pub fn result_event(result: &str) -> String {
    let result = result.trim();
    if result.eq_ignore_ascii_case("done") {
        "COMPLETE".to_string()
    } else {
        result.to_uppercase()
    }
}

impl WorkflowConfig {
    /// Roles in the order their active states are declared
    pub fn roles(&self) -> Vec<&str> {
        let mut roles: Vec<&str> = Vec::new();
        for (_, state) in self.states.iter() {
            if state.kind != StateType::Active {
                continue;
            }
            if let Some(role) = state.role.as_deref() {
                if !roles.contains(&role) {
                    roles.push(role);
                }
            }
        }
        roles
    }

    /// Resolve a user supplied role name (legacy aliases included) against the graph
    pub fn resolve_role(&self, input: &str) -> CoreResult<String> {
        let input = input.trim();
        if self.roles().contains(&input) {
            return Ok(input.to_string());
        }
        let canonical = canonical_role(input);
        if self.roles().contains(&canonical.as_str()) {
            Ok(canonical)
        } else {
            Err(CoreError::NotFound(format!(
                "role \"{input}\" (known roles: {})",
                self.roles().join(", ")
            )))
        }
    }

    /// Queue states owned by `role`, highest priority first, ties in declaration order
    pub fn queue_states(&self, role: &str) -> Vec<(&str, &StateConfig)> {
        let mut queues: Vec<(&str, &StateConfig)> = self
            .states
            .iter()
            .filter(|(_, state)| state.kind == StateType::Queue && state.owned_by(role))
            .collect();
        // sort_by is stable, which keeps declaration order on equal priority
        queues.sort_by(|a, b| b.1.priority.unwrap_or(0).cmp(&a.1.priority.unwrap_or(0)));
        queues
    }

    pub fn queue_labels(&self, role: &str) -> Vec<String> {
        self.queue_states(role)
            .into_iter()
            .map(|(_, state)| state.label.clone())
            .collect()
    }

    /// The queue of `role` that a task meets first when walking the graph from
    /// `initial`; the highest-priority queue when none is reachable
    pub fn entry_queue(&self, role: &str) -> Option<String> {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut pending: VecDeque<&str> = VecDeque::from([self.initial.as_str()]);
        while let Some(id) = pending.pop_front() {
            if !seen.insert(id) {
                continue;
            }
            let Some(state) = self.states.get(id) else {
                continue;
            };
            if state.kind == StateType::Queue && state.owned_by(role) {
                return Some(state.label.clone());
            }
            pending.extend(state.transitions.values().map(|transition| transition.target()));
        }
        self.queue_labels(role).into_iter().next()
    }

    pub fn active_state(&self, role: &str) -> CoreResult<(&str, &StateConfig)> {
        let active: Vec<(&str, &StateConfig)> = self
            .states
            .iter()
            .filter(|(_, state)| state.kind == StateType::Active && state.owned_by(role))
            .collect();

        match active.as_slice() {
            [single] => Ok(*single),
            [] => Err(CoreError::Config(format!(
                "role \"{role}\" has no active state"
            ))),
            many => Err(CoreError::Config(format!(
                "role \"{role}\" has {} active states ({}), expected exactly one",
                many.len(),
                many.iter().map(|(id, _)| *id).collect::<Vec<_>>().join(", ")
            ))),
        }
    }

    pub fn active_label(&self, role: &str) -> CoreResult<&str> {
        self.active_state(role).map(|(_, state)| state.label.as_str())
    }

    fn target_state(&self, from: &str, target: &str) -> CoreResult<&StateConfig> {
        self.states.get(target).ok_or_else(|| {
            CoreError::Config(format!(
                "state \"{from}\" transitions to unknown state \"{target}\""
            ))
        })
    }

    /// Rule for finishing `role`'s active task with `result`.
    ///
    /// `Ok(None)` means the result is not a legal way out of the active state.
    pub fn completion_rule(&self, role: &str, result: &str) -> CoreResult<Option<CompletionRule>> {
        let (active_id, active) = self.active_state(role)?;
        let event = result_event(result);

        let Some(transition) = active.transitions.get(&event) else {
            return Ok(None);
        };
        let target = self.target_state(active_id, transition.target())?;

        Ok(Some(CompletionRule {
            from: active.label.clone(),
            to: target.label.clone(),
            target_state: transition.target().to_string(),
            actions: transition.actions().to_vec(),
        }))
    }

    /// Events that are legal completions for `role`, for error messages
    pub fn completion_events(&self, role: &str) -> CoreResult<Vec<String>> {
        let (_, active) = self.active_state(role)?;
        Ok(active.transitions.keys().cloned().collect())
    }

    pub fn next_state_description(&self, role: &str, result: &str) -> CoreResult<Option<String>> {
        let Some(rule) = self.completion_rule(role, result)? else {
            return Ok(None);
        };
        let target = self.target_state(role, &rule.target_state)?;
        let owner = target.role.as_deref().unwrap_or(role);
        let description = match target.kind {
            StateType::Terminal => "done".to_string(),
            StateType::Hold => "awaiting decision".to_string(),
            StateType::Queue => format!("{owner} queue"),
            StateType::Active => format!("{owner} in progress"),
        };
        Ok(Some(description))
    }

    pub fn state_by_label(&self, label: &str) -> Option<(&str, &StateConfig)> {
        self.states.iter().find(|(_, state)| state.label == label)
    }

    /// Role owning the state that carries `label`, if any
    pub fn role_for_label(&self, label: &str) -> Option<&str> {
        self.state_by_label(label)
            .and_then(|(_, state)| state.role.as_deref())
    }

    /// Every label the tracker must know about
    pub fn all_labels(&self) -> Vec<&str> {
        self.states.iter().map(|(_, state)| state.label.as_str()).collect()
    }

    pub fn levels_for(&self, role: &str) -> &[String] {
        self.roles
            .get(role)
            .map(|config| config.levels.as_slice())
            .unwrap_or(&[])
    }

    pub fn default_level(&self, role: &str) -> Option<&str> {
        self.roles.get(role).map(|config| config.default_level.as_str())
    }

    /// Check every structural invariant of the graph up front
    pub fn validate(&self) -> CoreResult<()> {
        if self.states.is_empty() {
            return Err(CoreError::Config("workflow has no states".to_string()));
        }
        if !self.states.contains(&self.initial) {
            return Err(CoreError::Config(format!(
                "initial state \"{}\" does not exist",
                self.initial
            )));
        }

        let mut labels = HashSet::new();
        let mut roles = HashSet::new();
        for (id, state) in self.states.iter() {
            if !labels.insert(state.label.as_str()) {
                return Err(CoreError::Config(format!(
                    "label \"{}\" is used by more than one state",
                    state.label
                )));
            }
            match (state.kind, state.role.as_deref()) {
                (StateType::Queue | StateType::Active, None) => {
                    return Err(CoreError::Config(format!(
                        "{} state \"{id}\" must name a role",
                        state.kind
                    )));
                }
                (_, Some(role)) => {
                    roles.insert(role);
                }
                _ => {}
            }
            for transition in state.transitions.values() {
                self.target_state(id, transition.target())?;
            }
        }

        for role in roles {
            self.active_state(role)?;
        }

        for (role, config) in &self.roles {
            if !config.levels.contains(&config.default_level) {
                return Err(CoreError::Config(format!(
                    "default level \"{}\" of role \"{role}\" is not one of its levels ({})",
                    config.default_level,
                    config.levels.join(", ")
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::types::{Action, StateTable, TransitionTarget};

    fn workflow() -> WorkflowConfig {
        WorkflowConfig::default()
    }

    #[test]
    fn queue_labels_sorted_by_descending_priority() {
        let wf = workflow();
        for role in wf.roles() {
            let queues = wf.queue_states(role);
            assert!(!queues.is_empty(), "{role} has no queue");
            let priorities: Vec<i32> = queues.iter().map(|(_, s)| s.priority.unwrap_or(0)).collect();
            let mut sorted = priorities.clone();
            sorted.sort_by(|a, b| b.cmp(a));
            assert_eq!(priorities, sorted, "queues of {role} out of order");
        }
        assert_eq!(wf.queue_labels("developer"), vec!["To Improve", "To Do"]);
        assert_eq!(wf.queue_labels("tester"), vec!["To Test"]);
    }

    #[test]
    fn equal_priority_keeps_declaration_order() {
        let mut states = StateTable::new();
        states.insert("b", StateConfig::new(StateType::Queue, "B").for_role("dev").with_priority(1));
        states.insert("a", StateConfig::new(StateType::Queue, "A").for_role("dev").with_priority(1));
        states.insert("c", StateConfig::new(StateType::Queue, "C").for_role("dev").with_priority(5));
        states.insert("work", StateConfig::new(StateType::Active, "Work").for_role("dev"));
        let wf = WorkflowConfig {
            initial: "b".to_string(),
            states,
            roles: Default::default(),
        };
        assert_eq!(wf.queue_labels("dev"), vec!["C", "B", "A"]);
    }

    #[test]
    fn active_label_requires_exactly_one_active_state() {
        let wf = workflow();
        assert_eq!(wf.active_label("developer").unwrap(), "Doing");
        assert_eq!(wf.active_label("tester").unwrap(), "Testing");
        assert!(matches!(wf.active_label("designer"), Err(CoreError::Config(_))));

        let mut doubled = workflow();
        doubled.states.insert(
            "pairing",
            StateConfig::new(StateType::Active, "Pairing").for_role("developer"),
        );
        let err = doubled.active_label("developer").unwrap_err();
        assert!(err.to_string().contains("2 active states"));
    }

    #[test]
    fn completion_rules_follow_the_graph() {
        let wf = workflow();

        let rule = wf.completion_rule("developer", "done").unwrap().unwrap();
        assert_eq!(rule.from, "Doing");
        assert_eq!(rule.to, "To Test");
        assert!(rule.has_action(Action::GitPull));
        assert!(rule.has_action(Action::DetectPr));

        let rule = wf.completion_rule("tester", "pass").unwrap().unwrap();
        assert_eq!((rule.from.as_str(), rule.to.as_str()), ("Testing", "Done"));
        assert!(rule.has_action(Action::CloseIssue));

        let rule = wf.completion_rule("tester", "fail").unwrap().unwrap();
        assert_eq!(rule.to, "To Improve");
        assert!(rule.has_action(Action::ReopenIssue));
    }

    #[test]
    fn unreachable_results_have_no_rule() {
        let wf = workflow();
        for role in wf.roles() {
            let events = wf.completion_events(role).unwrap();
            for result in ["done", "pass", "fail", "refine", "blocked", "approve", "nonsense"] {
                let rule = wf.completion_rule(role, result).unwrap();
                assert_eq!(
                    rule.is_some(),
                    events.contains(&result_event(result)),
                    "{role}/{result}"
                );
            }
        }
        assert!(wf.completion_rule("developer", "pass").unwrap().is_none());
        assert!(wf.completion_rule("tester", "done").unwrap().is_none());
    }

    #[test]
    fn dangling_transition_fails_fast() {
        let mut wf = workflow();
        wf.states.insert(
            "doing",
            StateConfig::new(StateType::Active, "Doing")
                .for_role("developer")
                .on("COMPLETE", TransitionTarget::to("nowhere")),
        );
        assert!(matches!(wf.completion_rule("developer", "done"), Err(CoreError::Config(_))));
        assert!(matches!(wf.validate(), Err(CoreError::Config(_))));
    }

    #[test]
    fn next_state_descriptions() {
        let wf = workflow();
        assert_eq!(
            wf.next_state_description("developer", "done").unwrap().as_deref(),
            Some("tester queue")
        );
        assert_eq!(
            wf.next_state_description("developer", "blocked").unwrap().as_deref(),
            Some("awaiting decision")
        );
        assert_eq!(
            wf.next_state_description("tester", "pass").unwrap().as_deref(),
            Some("done")
        );
        assert_eq!(
            wf.next_state_description("tester", "fail").unwrap().as_deref(),
            Some("developer queue")
        );
    }

    #[test]
    fn several_active_states_share_one_hold_state() {
        let wf = workflow();
        let dev = wf.completion_rule("developer", "blocked").unwrap().unwrap();
        let tester = wf.completion_rule("tester", "blocked").unwrap().unwrap();
        assert_eq!(dev.to, "Refining");
        assert_eq!(tester.to, "Refining");
    }

    #[test]
    fn resolve_role_accepts_legacy_names() {
        let wf = workflow();
        assert_eq!(wf.resolve_role("dev").unwrap(), "developer");
        assert_eq!(wf.resolve_role("qa").unwrap(), "tester");
        assert!(matches!(wf.resolve_role("ops"), Err(CoreError::NotFound(_))));
    }

    #[test]
    fn labels_map_back_to_roles() {
        let wf = workflow();
        assert_eq!(wf.role_for_label("To Improve"), Some("developer"));
        assert_eq!(wf.role_for_label("Testing"), Some("tester"));
        assert_eq!(wf.role_for_label("Done"), None);
        assert_eq!(wf.role_for_label("bug"), None);
    }

    #[test]
    fn entry_queue_is_the_first_one_reached_from_initial() {
        let workflow = WorkflowConfig::default();
        assert_eq!(workflow.entry_queue("developer").as_deref(), Some("To Do"));
        assert_eq!(workflow.entry_queue("tester").as_deref(), Some("To Test"));
        assert_eq!(workflow.entry_queue("designer"), None);
    }

    #[test]
    fn entry_queue_falls_back_to_priority_when_unreachable() {
        let mut states = StateTable::new();
        states.insert("start", StateConfig::new(StateType::Hold, "Start"));
        states.insert("low", StateConfig::new(StateType::Queue, "Low").for_role("dev").with_priority(1));
        states.insert("high", StateConfig::new(StateType::Queue, "High").for_role("dev").with_priority(5));
        states.insert("work", StateConfig::new(StateType::Active, "Work").for_role("dev"));
        let workflow = WorkflowConfig {
            initial: "start".to_string(),
            states,
            roles: Default::default(),
        };
        assert_eq!(workflow.entry_queue("dev").as_deref(), Some("High"));
    }

    #[test]
    fn default_workflow_is_valid() {
        workflow().validate().unwrap();
    }

    #[test]
    fn queue_state_without_role_is_rejected() {
        let mut wf = workflow();
        wf.states.insert("orphan", StateConfig::new(StateType::Queue, "Orphan"));
        let err = wf.validate().unwrap_err();
        assert!(err.to_string().contains("must name a role"));
    }
}
