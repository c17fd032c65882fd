// ---------------------------------------------------------------------------
// Error types for configuration and scheduling
// ---------------------------------------------------------------------------

use std::fmt;

use crate::host::HostError;

/// Errors raised while handing work to the host scheduler.
///
/// `NoCompatibleMethod` and `SchedulerUnavailable` mean the work could not be
/// placed on the thread that owns its target. They must reach the caller: the
/// task has not run, and running it anywhere else would touch region-owned
/// state from a foreign thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    /// The target's scheduler object exposes none of the known submit shapes.
    NoCompatibleMethod { target: &'static str, class: String },
    /// The scheduler object for the target could not be obtained at all.
    SchedulerUnavailable { target: &'static str, reason: String },
    /// A matching submit method was found but the host rejected the call.
    Host(HostError),
}

impl SchedulerError {
    pub fn is_affinity_violation(&self) -> bool {
        matches!(
            self,
            SchedulerError::NoCompatibleMethod { .. } | SchedulerError::SchedulerUnavailable { .. }
        )
    }
}

impl fmt::Display for SchedulerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchedulerError::NoCompatibleMethod { target, class } => write!(
                f,
                "No compatible {target} scheduling method on {class}; refusing to run off-region"
            ),
            SchedulerError::SchedulerUnavailable { target, reason } => {
                write!(f, "No {target} scheduler available: {reason}")
            }
            SchedulerError::Host(e) => write!(f, "Scheduler call failed: {e}"),
        }
    }
}

impl std::error::Error for SchedulerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SchedulerError::Host(e) => Some(e),
            _ => None,
        }
    }
}

impl From<HostError> for SchedulerError {
    fn from(e: HostError) -> Self {
        SchedulerError::Host(e)
    }
}

/// Errors surfaced by the bridge's public entry points.
#[derive(Debug)]
pub enum BridgeError {
    /// Configuration could not be parsed or failed validation.
    InvalidConfig(String),
    /// Work could not be scheduled with the required thread affinity.
    Scheduler(SchedulerError),
    /// A host object lacked something the operation cannot do without.
    Host(HostError),
    /// The claim has no readable bounds.
    ClaimGeometry(String),
}

impl fmt::Display for BridgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BridgeError::InvalidConfig(msg) => write!(f, "Invalid bridge config: {msg}"),
            BridgeError::Scheduler(e) => write!(f, "{e}"),
            BridgeError::Host(e) => write!(f, "{e}"),
            BridgeError::ClaimGeometry(claim) => write!(f, "Claim {claim} has no readable bounds"),
        }
    }
}

impl std::error::Error for BridgeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BridgeError::Scheduler(e) => Some(e),
            BridgeError::Host(e) => Some(e),
            BridgeError::InvalidConfig(_) | BridgeError::ClaimGeometry(_) => None,
        }
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(e: serde_json::Error) -> Self {
        BridgeError::InvalidConfig(e.to_string())
    }
}

impl From<HostError> for BridgeError {
    fn from(e: HostError) -> Self {
        BridgeError::Host(e)
    }
}

impl From<SchedulerError> for BridgeError {
    fn from(e: SchedulerError) -> Self {
        BridgeError::Scheduler(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_affinity_violation_classification() {
        let missing = SchedulerError::NoCompatibleMethod {
            target: "location",
            class: "io.papermc.RegionScheduler".to_string(),
        };
        assert!(missing.is_affinity_violation());
        let host = SchedulerError::Host(HostError::Invocation("rejected".into()));
        assert!(!host.is_affinity_violation());
    }

    #[test]
    fn test_scheduler_error_display_names_target() {
        let err = SchedulerError::NoCompatibleMethod {
            target: "entity",
            class: "EntityScheduler".to_string(),
        };
        let msg = format!("{err}");
        assert!(msg.contains("entity"), "got: {msg}");
        assert!(msg.contains("EntityScheduler"), "got: {msg}");
    }

    #[test]
    fn test_bridge_error_wraps_scheduler_source() {
        let err: BridgeError = SchedulerError::SchedulerUnavailable {
            target: "global",
            reason: "null".to_string(),
        }
        .into();
        assert!(std::error::Error::source(&err).is_some());
        assert!(format!("{err}").contains("global"));
    }
}
