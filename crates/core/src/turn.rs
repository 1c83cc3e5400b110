use serde::{Deserialize, Serialize};

use crate::entry::Entry;

/// Synthetic turn id used before the backend has announced a real turn.
pub const PENDING_TURN_ID: &str = "__pending__";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum TurnStatus {
    InProgress,
    Completed,
    Failed,
    Interrupted,
    #[default]
    Unknown,
}

impl TurnStatus {
    /// Unrecognized or missing values map to [`TurnStatus::Unknown`].
    pub fn parse(value: Option<&str>) -> Self {
        match value {
            Some("inProgress") => Self::InProgress,
            Some("completed") => Self::Completed,
            Some("failed") => Self::Failed,
            Some("interrupted") => Self::Interrupted,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::InProgress => "inProgress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Interrupted => "interrupted",
            Self::Unknown => "unknown",
        }
    }

    /// Position in the forward-only lifecycle `unknown < inProgress < terminal`.
    pub fn rank(self) -> u8 {
        match self {
            Self::Unknown => 0,
            Self::InProgress => 1,
            Self::Completed | Self::Failed | Self::Interrupted => 2,
        }
    }

    pub fn is_terminal(self) -> bool {
        self.rank() == 2
    }

    /// Whether moving from `self` to `next` goes forward.
    ///
    /// Terminal statuses may be replaced by another terminal status so a
    /// late `turn/completed` can correct an earlier guess.
    pub fn can_advance_to(self, next: Self) -> bool {
        next.rank() > self.rank() || (next.is_terminal() && self.is_terminal())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Turn {
    pub id: String,
    pub status: TurnStatus,
    #[serde(default)]
    pub entries: Vec<Entry>,
}

impl Turn {
    pub fn new(id: impl Into<String>, status: TurnStatus) -> Self {
        Self {
            id: id.into(),
            status,
            entries: Vec::new(),
        }
    }

    pub fn is_pending(&self) -> bool {
        self.id == PENDING_TURN_ID
    }

    pub fn is_in_progress(&self) -> bool {
        self.status == TurnStatus::InProgress
    }
}
