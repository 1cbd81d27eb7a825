//! # Status Types
//!
//! Building blocks shared by every status struct.
//!
//! Conditions are named, typed fields on each status instead of an unordered
//! list keyed by type string, so "is this instance ready" is a field access.

use chrono::Utc;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Tri-state status of a condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

/// Observation of one aspect of a resource
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    pub status: ConditionStatus,
    /// Machine-readable reason, CamelCase
    pub reason: String,
    /// Human-readable detail
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// RFC3339 time of the last status flip
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

impl Condition {
    pub fn new(
        status: ConditionStatus,
        reason: impl Into<String>,
        message: Option<String>,
        generation: Option<i64>,
    ) -> Self {
        Self {
            status,
            reason: reason.into(),
            message,
            last_transition_time: Some(Utc::now().to_rfc3339()),
            observed_generation: generation,
        }
    }

    pub fn is_true(&self) -> bool {
        self.status == ConditionStatus::True
    }
}

/// Write `next` into `slot`, keeping the previous transition time if the status did not flip
pub fn set_condition(slot: &mut Option<Condition>, mut next: Condition) {
    if let Some(current) = slot.as_ref() {
        if current.status == next.status {
            next.last_transition_time.clone_from(&current.last_transition_time);
        }
    }
    *slot = Some(next);
}

/// True when the condition is present and `True`
pub fn condition_is_true(slot: Option<&Condition>) -> bool {
    slot.is_some_and(Condition::is_true)
}

/// The kind of broker operation a resource last started
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum LastOperationType {
    Create,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub enum LastOperationState {
    #[serde(rename = "initial")]
    Initial,
    #[serde(rename = "in progress")]
    InProgress,
    #[serde(rename = "succeeded")]
    Succeeded,
    #[serde(rename = "failed")]
    Failed,
}

impl LastOperationState {
    fn rank(self) -> u8 {
        match self {
            Self::Initial => 0,
            Self::InProgress => 1,
            Self::Succeeded | Self::Failed => 2,
        }
    }

    pub fn is_terminal(self) -> bool {
        self.rank() == 2
    }
}

/// Progress of the latest logical broker operation
///
/// Within one operation the state only moves forward; starting a different
/// operation type resets it to `initial`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LastOperation {
    pub r#type: LastOperationType,
    pub state: LastOperationState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl LastOperation {
    pub fn initial(r#type: LastOperationType) -> Self {
        Self {
            r#type,
            state: LastOperationState::Initial,
            description: None,
        }
    }

    /// Move to `state` unless that would go backwards or leave a terminal state
    ///
    /// Returns whether the state was applied.
    pub fn advance(&mut self, state: LastOperationState, description: Option<String>) -> bool {
        if self.state.is_terminal() || state.rank() < self.state.rank() {
            return false;
        }
        self.state = state;
        if description.is_some() {
            self.description = description;
        }
        true
    }
}

/// Begin (or continue) a logical operation of the given type
///
/// A different type, or no previous operation, starts over at `initial`.
pub fn begin_operation(slot: &mut Option<LastOperation>, r#type: LastOperationType) -> &mut LastOperation {
    if !matches!(slot, Some(op) if op.r#type == r#type) {
        *slot = Some(LastOperation::initial(r#type));
    }
    slot.get_or_insert_with(|| LastOperation::initial(r#type))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_operation_only_moves_forward() {
        let mut op = LastOperation::initial(LastOperationType::Create);
        assert!(op.advance(LastOperationState::InProgress, None));
        assert!(!op.advance(LastOperationState::Initial, None));
        assert_eq!(op.state, LastOperationState::InProgress);
        assert!(op.advance(LastOperationState::Succeeded, Some("done".into())));
        assert!(!op.advance(LastOperationState::Failed, None));
        assert_eq!(op.state, LastOperationState::Succeeded);
        assert_eq!(op.description.as_deref(), Some("done"));
    }

    #[test]
    fn new_operation_type_resets_to_initial() {
        let mut slot = Some(LastOperation {
            r#type: LastOperationType::Create,
            state: LastOperationState::Succeeded,
            description: None,
        });
        let op = begin_operation(&mut slot, LastOperationType::Delete);
        assert_eq!(op.state, LastOperationState::Initial);
        assert_eq!(op.r#type, LastOperationType::Delete);
    }

    #[test]
    fn same_operation_type_is_continued() {
        let mut slot = Some(LastOperation {
            r#type: LastOperationType::Delete,
            state: LastOperationState::InProgress,
            description: None,
        });
        begin_operation(&mut slot, LastOperationType::Delete);
        assert_eq!(slot.unwrap().state, LastOperationState::InProgress);
    }

    #[test]
    fn set_condition_keeps_transition_time_when_status_unchanged() {
        let mut slot = None;
        let mut first = Condition::new(ConditionStatus::False, "A", None, Some(1));
        first.last_transition_time = Some("2024-01-01T00:00:00+00:00".into());
        set_condition(&mut slot, first);

        set_condition(&mut slot, Condition::new(ConditionStatus::False, "B", None, Some(2)));
        let current = slot.clone().unwrap();
        assert_eq!(current.reason, "B");
        assert_eq!(
            current.last_transition_time.as_deref(),
            Some("2024-01-01T00:00:00+00:00")
        );

        set_condition(&mut slot, Condition::new(ConditionStatus::True, "C", None, Some(2)));
        assert_ne!(
            slot.unwrap().last_transition_time.as_deref(),
            Some("2024-01-01T00:00:00+00:00")
        );
    }

    #[test]
    fn last_operation_state_serializes_with_osbapi_spelling() {
        let json = serde_json::to_string(&LastOperationState::InProgress).unwrap();
        assert_eq!(json, "\"in progress\"");
    }
}
