//! Build lifecycle states.

use serde::Serialize;
use std::fmt;

/// Working phases of a build, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildPhase {
    Configuring,
    Resolving,
    PreBundling,
    Transforming,
    Emitting,
}

impl BuildPhase {
    pub const ALL: [BuildPhase; 5] = [
        BuildPhase::Configuring,
        BuildPhase::Resolving,
        BuildPhase::PreBundling,
        BuildPhase::Transforming,
        BuildPhase::Emitting,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BuildPhase::Configuring => "configuring",
            BuildPhase::Resolving => "resolving",
            BuildPhase::PreBundling => "pre-bundling",
            BuildPhase::Transforming => "transforming",
            BuildPhase::Emitting => "emitting",
        }
    }

    /// The phase that follows this one, `None` after emitting.
    pub fn next(&self) -> Option<BuildPhase> {
        let idx = BuildPhase::ALL.iter().position(|p| p == self)?;
        BuildPhase::ALL.get(idx + 1).copied()
    }
}

impl fmt::Display for BuildPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Full build state machine.
///
/// `Failed` is reachable from every non-terminal state; `Succeeded` only
/// from `Emitting`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildState {
    Idle,
    Running(BuildPhase),
    Succeeded,
    Failed(BuildPhase),
}

impl BuildState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, BuildState::Succeeded | BuildState::Failed(_))
    }

    /// Whether the machine may move from `self` to `to`.
    pub fn can_transition(&self, to: BuildState) -> bool {
        match (*self, to) {
            (BuildState::Idle, BuildState::Running(BuildPhase::Configuring)) => true,
            (BuildState::Idle, BuildState::Failed(BuildPhase::Configuring)) => true,
            (BuildState::Running(from), BuildState::Running(next)) => from.next() == Some(next),
            (BuildState::Running(BuildPhase::Emitting), BuildState::Succeeded) => true,
            (BuildState::Running(from), BuildState::Failed(at)) => from == at,
            _ => false,
        }
    }
}

impl fmt::Display for BuildState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildState::Idle => f.write_str("idle"),
            BuildState::Running(phase) => write!(f, "{phase}"),
            BuildState::Succeeded => f.write_str("succeeded"),
            BuildState::Failed(phase) => write!(f, "failed during {phase}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phases_advance_in_order() {
        assert_eq!(BuildPhase::Configuring.next(), Some(BuildPhase::Resolving));
        assert_eq!(BuildPhase::Transforming.next(), Some(BuildPhase::Emitting));
        assert_eq!(BuildPhase::Emitting.next(), None);
    }

    #[test]
    fn transitions_follow_the_machine() {
        let resolving = BuildState::Running(BuildPhase::Resolving);
        assert!(BuildState::Idle.can_transition(BuildState::Running(BuildPhase::Configuring)));
        assert!(resolving.can_transition(BuildState::Running(BuildPhase::PreBundling)));
        assert!(resolving.can_transition(BuildState::Failed(BuildPhase::Resolving)));
        assert!(!resolving.can_transition(BuildState::Running(BuildPhase::Emitting)));
        assert!(!resolving.can_transition(BuildState::Succeeded));
        assert!(!BuildState::Succeeded.can_transition(BuildState::Idle));
        assert!(
            BuildState::Running(BuildPhase::Emitting).can_transition(BuildState::Succeeded)
        );
    }
}
