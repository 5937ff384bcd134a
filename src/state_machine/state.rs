//! Conversation status types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Conversation status. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConvStatus {
    /// Created, no input yet
    #[default]
    Open,
    /// A user message is waiting for its reply
    Pending,
    /// The latest user message has been answered
    Answered,
    Closed,
}

impl ConvStatus {
    pub const ALL: [ConvStatus; 4] = [
        ConvStatus::Open,
        ConvStatus::Pending,
        ConvStatus::Answered,
        ConvStatus::Closed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ConvStatus::Open => "open",
            ConvStatus::Pending => "pending",
            ConvStatus::Answered => "answered",
            ConvStatus::Closed => "closed",
        }
    }

    /// Whether a user message may be submitted in this status
    pub fn accepts_input(self) -> bool {
        matches!(self, ConvStatus::Open | ConvStatus::Answered)
    }

    pub fn is_terminal(self) -> bool {
        self == ConvStatus::Closed
    }
}

impl fmt::Display for ConvStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConvStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ConvStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                let valid: Vec<&str> = ConvStatus::ALL.iter().map(|st| st.as_str()).collect();
                format!("status must be one of: {}", valid.join(", "))
            })
    }
}

/// Snapshot read inside the critical section before a transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvContext {
    pub conversation_id: String,
    pub status: ConvStatus,
    /// Latest user message without a reply, if any
    pub unanswered_message_id: Option<String>,
}

impl ConvContext {
    pub fn new(conversation_id: impl Into<String>, status: ConvStatus) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            status,
            unanswered_message_id: None,
        }
    }

    #[cfg(test)]
    #[must_use]
    pub fn with_unanswered(mut self, message_id: impl Into<String>) -> Self {
        self.unanswered_message_id = Some(message_id.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trips_through_str() {
        for status in ConvStatus::ALL {
            assert_eq!(status.as_str().parse::<ConvStatus>().unwrap(), status);
        }
        assert_eq!("Pending".parse::<ConvStatus>().unwrap(), ConvStatus::Pending);
        assert!("replyed".parse::<ConvStatus>().unwrap_err().contains("open"));
    }

    #[test]
    fn test_only_open_and_answered_accept_input() {
        let accepting: Vec<ConvStatus> = ConvStatus::ALL
            .into_iter()
            .filter(|s| s.accepts_input())
            .collect();
        assert_eq!(accepting, vec![ConvStatus::Open, ConvStatus::Answered]);
        assert!(ConvStatus::Closed.is_terminal());
    }
}
