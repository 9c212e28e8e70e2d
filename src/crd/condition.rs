//! Status conditions shared by all custom resources

use std::fmt::Debug;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Condition type reported when a reconciliation succeeded
pub const CONDITION_READY: &str = "Ready";

/// Condition type reported when a reconciliation failed
pub const CONDITION_NOT_READY: &str = "NotReady";

/// Status condition
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Condition type
    #[serde(rename = "type")]
    pub type_: String,

    /// Status (True, False, Unknown)
    pub status: String,

    /// Reason for the condition
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Human-readable message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Last transition time
    pub last_transition_time: DateTime<Utc>,
}

impl Condition {
    /// A `Ready=True` condition
    pub fn ready() -> Self {
        Self {
            type_: CONDITION_READY.to_string(),
            status: "True".to_string(),
            reason: None,
            message: None,
            last_transition_time: Utc::now(),
        }
    }

    /// A `NotReady=True` condition describing `error`
    pub fn not_ready(error: &Error) -> Self {
        Self {
            type_: CONDITION_NOT_READY.to_string(),
            status: "True".to_string(),
            reason: Some(error.reason().to_string()),
            message: Some(error.to_string()),
            last_transition_time: Utc::now(),
        }
    }

    /// Condition for the outcome of an operation
    pub fn from_outcome(error: Option<&Error>) -> Self {
        match error {
            Some(e) => Self::not_ready(e),
            None => Self::ready(),
        }
    }

    /// Whether both conditions describe the same state, ignoring when it was entered
    pub fn same_state(&self, other: &Condition) -> bool {
        self.type_ == other.type_
            && self.status == other.status
            && self.reason == other.reason
            && self.message == other.message
    }
}

/// Common shape of every status written by the operator
pub trait ResourceStatus:
    Clone + Default + Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Serialized fields that are omitted when unset
    const CLEARABLE_FIELDS: &'static [&'static str];

    /// Current conditions, in order
    fn conditions(&self) -> &[Condition];

    /// Mutable access to the conditions
    fn conditions_mut(&mut self) -> &mut Vec<Condition>;

    /// Generation the status was computed from
    fn observed_generation(&self) -> Option<i64>;
}

/// Resources with a status subresource
pub trait WithStatus {
    /// Status payload type
    type Status: ResourceStatus;

    /// Current status, if any
    fn status(&self) -> Option<&Self::Status>;

    /// Replace the status
    fn set_status(&mut self, status: Self::Status);
}

/// Keep the previous transition time of every condition whose state did not change
pub fn carry_transition_times(previous: &[Condition], next: &mut [Condition]) {
    for condition in next.iter_mut() {
        if let Some(old) = previous.iter().find(|old| old.same_state(condition)) {
            condition.last_transition_time = old.last_transition_time;
        }
    }
}
