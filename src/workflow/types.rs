use serde::de::{self, MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateType {
    /// Tasks wait here until a worker of the owning role picks them up
    Queue,
    /// Exactly one per role: the task is being worked on
    Active,
    /// Waiting for a human decision
    Hold,
    Terminal,
}

impl fmt::Display for StateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StateType::Queue => "queue",
            StateType::Active => "active",
            StateType::Hold => "hold",
            StateType::Terminal => "terminal",
        };
        write!(f, "{name}")
    }
}

/// Side effects attached to a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Action {
    GitPull,
    DetectPr,
    CloseIssue,
    ReopenIssue,
}

/// A transition is either a bare target id or a target with actions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TransitionTarget {
    Target(String),
    WithActions {
        target: String,
        #[serde(default)]
        actions: Vec<Action>,
    },
}

impl TransitionTarget {
    pub fn to(target: &str) -> Self {
        TransitionTarget::Target(target.to_string())
    }

    pub fn with_actions(target: &str, actions: &[Action]) -> Self {
        TransitionTarget::WithActions {
            target: target.to_string(),
            actions: actions.to_vec(),
        }
    }

    pub fn target(&self) -> &str {
        match self {
            TransitionTarget::Target(target) => target,
            TransitionTarget::WithActions { target, .. } => target,
        }
    }

    pub fn actions(&self) -> &[Action] {
        match self {
            TransitionTarget::Target(_) => &[],
            TransitionTarget::WithActions { actions, .. } => actions,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateConfig {
    #[serde(rename = "type")]
    pub kind: StateType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i32>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub transitions: BTreeMap<String, TransitionTarget>,
}

impl StateConfig {
    pub fn new(kind: StateType, label: &str) -> Self {
        Self {
            kind,
            role: None,
            label: label.to_string(),
            priority: None,
            transitions: BTreeMap::new(),
        }
    }

    pub fn for_role(mut self, role: &str) -> Self {
        self.role = Some(role.to_string());
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn on(mut self, event: &str, target: TransitionTarget) -> Self {
        self.transitions.insert(event.to_string(), target);
        self
    }

    pub fn owned_by(&self, role: &str) -> bool {
        self.role.as_deref() == Some(role)
    }
}

/// State table that keeps declaration order.
///
/// Order matters: it is the tie-break between same-priority queues and the
/// order roles are scheduled in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateTable(Vec<(String, StateConfig)>);

impl StateTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a state, keeping its original position on replace
    pub fn insert(&mut self, id: &str, state: StateConfig) {
        match self.0.iter_mut().find(|(existing, _)| existing == id) {
            Some(slot) => slot.1 = state,
            None => self.0.push((id.to_string(), state)),
        }
    }

    pub fn get(&self, id: &str) -> Option<&StateConfig> {
        self.0
            .iter()
            .find(|(existing, _)| existing == id)
            .map(|(_, state)| state)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &StateConfig)> {
        self.0.iter().map(|(id, state)| (id.as_str(), state))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for StateTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.0.iter().map(|(id, state)| (id, state)))
    }
}

struct StateTableVisitor;

impl<'de> Visitor<'de> for StateTableVisitor {
    type Value = StateTable;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a map of state id to state definition")
    }

    fn visit_map<M: MapAccess<'de>>(self, mut access: M) -> Result<Self::Value, M::Error> {
        let mut states: Vec<(String, StateConfig)> = Vec::new();
        while let Some((id, state)) = access.next_entry::<String, StateConfig>()? {
            if states.iter().any(|(existing, _)| *existing == id) {
                return Err(de::Error::custom(format!("duplicate state id `{id}`")));
            }
            states.push((id, state));
        }
        Ok(StateTable(states))
    }
}

impl<'de> Deserialize<'de> for StateTable {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(StateTableVisitor)
    }
}

/// Levels a role can be dispatched at
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleConfig {
    pub levels: Vec<String>,
    pub default_level: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowConfig {
    pub initial: String,
    pub states: StateTable,
    #[serde(default)]
    pub roles: BTreeMap<String, RoleConfig>,
}

/// Label move and side effects for a `(role, result)` pair, derived from the graph
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRule {
    pub from: String,
    pub to: String,
    pub target_state: String,
    pub actions: Vec<Action>,
}

impl CompletionRule {
    pub fn has_action(&self, action: Action) -> bool {
        self.actions.contains(&action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_table_keeps_document_order() {
        let json = r#"{
            "zeta": {"type": "hold", "label": "Zeta"},
            "alpha": {"type": "terminal", "label": "Alpha"},
            "mid": {"type": "hold", "label": "Mid"}
        }"#;
        let table: StateTable = serde_json::from_str(json).unwrap();
        let ids: Vec<&str> = table.iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn duplicate_state_ids_are_rejected() {
        let json = r#"{"a": {"type": "hold", "label": "A"}, "a": {"type": "hold", "label": "B"}}"#;
        let err = serde_json::from_str::<StateTable>(json).unwrap_err();
        assert!(err.to_string().contains("duplicate state id `a`"));
    }

    #[test]
    fn transition_target_accepts_both_forms() {
        let json = r#"{
            "type": "active", "role": "developer", "label": "Doing",
            "transitions": {
                "BLOCKED": "refining",
                "COMPLETE": {"target": "toTest", "actions": ["gitPull", "detectPr"]}
            }
        }"#;
        let state: StateConfig = serde_json::from_str(json).unwrap();
        assert_eq!(state.transitions["BLOCKED"].target(), "refining");
        assert!(state.transitions["BLOCKED"].actions().is_empty());
        assert_eq!(state.transitions["COMPLETE"].target(), "toTest");
        assert_eq!(
            state.transitions["COMPLETE"].actions(),
            &[Action::GitPull, Action::DetectPr]
        );
    }
}
