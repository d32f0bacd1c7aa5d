use serde::{Deserialize, Serialize};

/// `Pending -> Running -> {Complete, Error}`, or `Pending -> Skipped`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MicroplanStatus {
    Pending,
    Running,
    Complete,
    Error,
    Skipped,
}

impl MicroplanStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Error | Self::Skipped)
    }
}

impl std::fmt::Display for MicroplanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Complete => "COMPLETE",
            Self::Error => "ERROR",
            Self::Skipped => "SKIPPED",
        };
        f.write_str(s)
    }
}

/// Lifecycle notification for one microplan.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MicroplanEvent {
    Start { id: String, batch: usize },
    Complete { id: String, output: String },
    Error { id: String, error: String },
    Skipped { id: String, reason: String },
}

impl MicroplanEvent {
    pub fn id(&self) -> &str {
        match self {
            Self::Start { id, .. }
            | Self::Complete { id, .. }
            | Self::Error { id, .. }
            | Self::Skipped { id, .. } => id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_are_tagged() {
        let event = MicroplanEvent::Skipped {
            id: "c".into(),
            reason: "dependency failed".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "skipped");
        assert_eq!(json["reason"], "dependency failed");
        assert_eq!(event.id(), "c");
    }

    #[test]
    fn terminal_states() {
        assert!(!MicroplanStatus::Pending.is_terminal());
        assert!(!MicroplanStatus::Running.is_terminal());
        assert!(MicroplanStatus::Skipped.is_terminal());
        assert_eq!(MicroplanStatus::Error.to_string(), "ERROR");
    }
}
