//! Engine state as reported by the provisioning API

use serde::{Deserialize, Serialize};
use std::fmt;

/// Remote provisioning state of an engine
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EngineState {
    Requested,
    Provisioning,
    Provisioned,
    ProvisionFailed,
}

impl EngineState {
    /// Ready to accept transactions.
    pub fn is_ready(&self) -> bool {
        matches!(self, EngineState::Provisioned)
    }

    /// Provisioning has reached an end state, good or bad.
    pub fn is_settled(&self) -> bool {
        matches!(self, EngineState::Provisioned | EngineState::ProvisionFailed)
    }
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineState::Requested => write!(f, "REQUESTED"),
            EngineState::Provisioning => write!(f, "PROVISIONING"),
            EngineState::Provisioned => write!(f, "PROVISIONED"),
            EngineState::ProvisionFailed => write!(f, "PROVISION_FAILED"),
        }
    }
}

/// Engine description returned by the provisioning API
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EngineInfo {
    pub name: String,
    pub state: EngineState,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_readiness() {
        assert!(EngineState::Provisioned.is_ready());
        assert!(!EngineState::Provisioning.is_ready());
        assert!(!EngineState::Requested.is_ready());
        assert!(!EngineState::ProvisionFailed.is_ready());
    }

    #[test]
    fn test_settled() {
        assert!(EngineState::Provisioned.is_settled());
        assert!(EngineState::ProvisionFailed.is_settled());
        assert!(!EngineState::Provisioning.is_settled());
    }
}
