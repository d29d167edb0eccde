//! Command-channel replies.

use serde::{Deserialize, Serialize};

/// Reply sent by the daemon for every command-channel request.
///
/// Success replies carry `{"status":"success","message":...}`, failures
/// carry `{"error":...,"details":...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CommandReply {
    Success {
        status: String,
        message: String,
    },
    Failure {
        error: String,
        #[serde(default)]
        details: String,
    },
}

impl CommandReply {
    pub fn success(message: impl Into<String>) -> Self {
        Self::Success {
            status: "success".to_string(),
            message: message.into(),
        }
    }

    pub fn failure(error: impl Into<String>, details: impl Into<String>) -> Self {
        Self::Failure {
            error: error.into(),
            details: details.into(),
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { status, .. } if status == "success")
    }
}
