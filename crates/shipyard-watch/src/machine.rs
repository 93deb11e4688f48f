//! Per-service lifecycle state machine.
//!
//! The platform reports activities eventually and possibly out of order. A
//! service's state only moves along the edges of a transition table; anything
//! else is ignored, so a late or duplicated activity never moves a service
//! backwards.

use shipyard_core::ActivityType;
use shipyard_core::ActivityType::*;

/// Outcomes a deploy can end in.
const DEPLOY_OUTCOMES: &[ActivityType] = &[
    DeploySucceeded,
    DeployFailed,
    DeployCanceled,
    DeployTimeout,
    DeployRollback,
];

/// Allowed transitions over the whole build and deploy lifecycle.
pub const VALID_TRANSITIONS: &[(ActivityType, &[ActivityType])] = &[
    (
        BuildStarted,
        &[
            BuildPushed,
            BuildSucceeded,
            BuildFailed,
            DeployCreated,
            DeployPending,
            DeployStarted,
            DeploySucceeded,
            DeployFailed,
            DeployCanceled,
            DeployTimeout,
            DeployRollback,
        ],
    ),
    (
        BuildPushed,
        &[
            BuildSucceeded,
            BuildFailed,
            DeployCreated,
            DeployPending,
            DeployStarted,
            DeploySucceeded,
            DeployFailed,
            DeployCanceled,
            DeployTimeout,
            DeployRollback,
        ],
    ),
    (
        BuildSucceeded,
        &[
            DeployCreated,
            DeployPending,
            DeployStarted,
            DeploySucceeded,
            DeployFailed,
            DeployCanceled,
            DeployTimeout,
            DeployRollback,
        ],
    ),
    (
        BuildFailed,
        &[
            DeployCreated,
            DeployPending,
            DeployStarted,
            DeploySucceeded,
            DeployFailed,
            DeployCanceled,
            DeployTimeout,
            DeployRollback,
        ],
    ),
    (
        DeployCreated,
        &[
            DeployPending,
            DeployStarted,
            DeploySucceeded,
            DeployFailed,
            DeployCanceled,
            DeployTimeout,
            DeployRollback,
        ],
    ),
    (
        DeployPending,
        &[
            DeployStarted,
            DeploySucceeded,
            DeployFailed,
            DeployCanceled,
            DeployTimeout,
            DeployRollback,
        ],
    ),
    (DeployStarted, DEPLOY_OUTCOMES),
    // A failed deploy can still be retried into success.
    (DeployFailed, &[DeploySucceeded]),
    (DeployCanceled, &[DeploySucceeded]),
    (DeployTimeout, &[DeploySucceeded]),
    (DeployRollback, &[DeploySucceeded]),
    (DeploySucceeded, &[]),
];

/// Allowed transitions while only builds are watched.
pub const BUILD_TRANSITIONS: &[(ActivityType, &[ActivityType])] = &[
    (BuildStarted, &[BuildPushed, BuildSucceeded, BuildFailed]),
    (BuildPushed, &[BuildSucceeded, BuildFailed]),
    (BuildSucceeded, &[]),
    (BuildFailed, &[]),
];

/// How far into the lifecycle a watch follows each service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WatchMode {
    /// Follow services until their deploy ends.
    #[default]
    Full,
    /// Stop once the build ends.
    BuildOnly,
}

impl WatchMode {
    pub fn transitions(&self) -> &'static [(ActivityType, &'static [ActivityType])] {
        match self {
            WatchMode::Full => VALID_TRANSITIONS,
            WatchMode::BuildOnly => BUILD_TRANSITIONS,
        }
    }

    /// Whether a service in `state` needs no further watching.
    pub fn is_terminal(&self, state: Option<ActivityType>) -> bool {
        let Some(state) = state else {
            return false;
        };
        match self {
            // No deploy is scheduled after a failed build.
            WatchMode::Full => state.is_deploy_terminal() || state == BuildFailed,
            WatchMode::BuildOnly => matches!(state, BuildSucceeded | BuildFailed),
        }
    }
}

/// States reachable from `from` in `table`.
pub fn allowed(
    table: &'static [(ActivityType, &'static [ActivityType])],
    from: ActivityType,
) -> &'static [ActivityType] {
    table
        .iter()
        .find(|(state, _)| *state == from)
        .map(|(_, targets)| *targets)
        .unwrap_or(&[])
}

/// Apply an incoming activity type to a service's current state.
///
/// Returns the new state when the transition is accepted. The first known
/// activity for a service is always accepted; unknown types never are.
pub fn next_state(
    mode: WatchMode,
    current: Option<ActivityType>,
    incoming: ActivityType,
) -> Option<ActivityType> {
    if incoming == Unknown {
        return None;
    }
    match current {
        None => Some(incoming),
        Some(from) if allowed(mode.transitions(), from).contains(&incoming) => Some(incoming),
        Some(_) => None,
    }
}

/// Progress text shown for a state.
pub fn status_message(state: ActivityType) -> &'static str {
    match state {
        BuildStarted => "Building",
        BuildPushed => "Build pushed",
        BuildSucceeded => "Build succeeded",
        BuildFailed => "Build failed",
        DeployCreated => "Deploy created",
        DeployPending => "Deploy pending",
        DeployStarted => "Deploying",
        DeploySucceeded => "Deployed",
        DeployFailed => "Deploy failed",
        DeployCanceled => "Deploy canceled",
        DeployTimeout => "Deploy timed out",
        DeployRollback => "Deploy rolled back",
        Unknown => "Unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_observation_always_accepted() {
        for mode in [WatchMode::Full, WatchMode::BuildOnly] {
            for incoming in ActivityType::ALL {
                assert_eq!(next_state(mode, None, incoming), Some(incoming));
            }
        }
    }

    #[test]
    fn test_transitions_outside_table_are_ignored() {
        for from in ActivityType::ALL {
            let targets = allowed(VALID_TRANSITIONS, from);
            for incoming in ActivityType::ALL {
                let next = next_state(WatchMode::Full, Some(from), incoming);
                if targets.contains(&incoming) {
                    assert_eq!(next, Some(incoming), "{} -> {}", from, incoming);
                } else {
                    assert_eq!(next, None, "{} -> {}", from, incoming);
                }
            }
        }
    }

    #[test]
    fn test_unknown_is_ignored() {
        assert_eq!(next_state(WatchMode::Full, None, Unknown), None);
        assert_eq!(next_state(WatchMode::Full, Some(BuildStarted), Unknown), None);
    }

    #[test]
    fn test_every_state_has_a_row() {
        for state in ActivityType::ALL {
            assert!(
                VALID_TRANSITIONS.iter().any(|(s, _)| *s == state),
                "{} missing",
                state
            );
        }
    }

    #[test]
    fn test_deploy_succeeded_is_absorbing() {
        assert!(allowed(VALID_TRANSITIONS, DeploySucceeded).is_empty());
    }

    #[test]
    fn test_failed_deploys_only_retry_into_success() {
        for state in [DeployFailed, DeployCanceled, DeployTimeout, DeployRollback] {
            assert_eq!(allowed(VALID_TRANSITIONS, state), &[DeploySucceeded]);
        }
    }

    #[test]
    fn test_build_outcomes_reach_every_deploy_outcome() {
        for state in [BuildSucceeded, BuildFailed] {
            for outcome in DEPLOY_OUTCOMES {
                assert!(allowed(VALID_TRANSITIONS, state).contains(outcome));
            }
        }
    }

    #[test]
    fn test_build_table_agrees_with_full_table() {
        for (from, targets) in BUILD_TRANSITIONS {
            for to in *targets {
                assert!(
                    allowed(VALID_TRANSITIONS, *from).contains(to),
                    "{} -> {} is not a lifecycle transition",
                    from,
                    to
                );
            }
        }
    }

    #[test]
    fn test_terminal_states() {
        let full = WatchMode::Full;
        assert!(!full.is_terminal(None));
        for state in ActivityType::ALL {
            let expected = state.is_deploy_terminal() || state == BuildFailed;
            assert_eq!(full.is_terminal(Some(state)), expected, "{}", state);
        }

        let build = WatchMode::BuildOnly;
        assert!(build.is_terminal(Some(BuildSucceeded)));
        assert!(build.is_terminal(Some(BuildFailed)));
        assert!(!build.is_terminal(Some(BuildPushed)));
    }
}
