//! Feedback watch - follows a deployment until every service settles.
//!
//! The watch runs as its own task and is the only owner of the per-service
//! states. Progress reaches the caller as events over a channel.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use shipyard_core::{
    ActivitiesService, Activity, ActivityFilter, ActivityType, Error, GroupUid, Result,
};

use crate::header::{add_retry_counter, clear_retry_counter, has_retry_counter};
use crate::machine::{WatchMode, next_state, status_message};

/// Tuning for a watch.
#[derive(Debug, Clone, Copy)]
pub struct WatchOptions {
    pub mode: WatchMode,
    /// Minimum time between two activity requests.
    pub poll_interval: Duration,
    /// Limit for a single activity request.
    pub fetch_timeout: Duration,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            mode: WatchMode::Full,
            poll_interval: Duration::from_secs(1),
            fetch_timeout: Duration::from_secs(5),
        }
    }
}

/// Event emitted while watching a deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    /// The progress header changed.
    Header(String),
    /// A service moved to a new state.
    ServiceChanged {
        service_id: String,
        state: ActivityType,
        message: String,
        failed: bool,
    },
}

/// Final state of every watched service.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchReport {
    pub states: BTreeMap<String, Option<ActivityType>>,
}

impl WatchReport {
    /// Services that ended unsuccessfully, with the kind of failure.
    pub fn failures(&self) -> Vec<(&str, &'static str)> {
        self.states
            .iter()
            .filter_map(|(id, state)| {
                state
                    .and_then(|s| s.failure_kind())
                    .map(|kind| (id.as_str(), kind))
            })
            .collect()
    }

    /// Succeed when no service failed, otherwise one error naming every failure.
    pub fn into_result(self) -> Result<Self> {
        let failures = self.failures();
        if failures.is_empty() {
            return Ok(self);
        }
        let lines: Vec<String> = failures
            .iter()
            .map(|(id, kind)| format!("{}: {}", id, kind))
            .collect();
        Err(Error::DeploymentFailed(lines.join("\n")))
    }
}

/// Watches one deployment.
pub struct FeedbackWatch {
    client: Arc<dyn ActivitiesService>,
    project_id: String,
    group_uid: GroupUid,
    services: Vec<String>,
    options: WatchOptions,
}

impl FeedbackWatch {
    pub fn new(
        client: Arc<dyn ActivitiesService>,
        project_id: impl Into<String>,
        group_uid: GroupUid,
        services: Vec<String>,
        options: WatchOptions,
    ) -> Self {
        Self {
            client,
            project_id: project_id.into(),
            group_uid,
            services,
            options,
        }
    }

    /// Start watching, returning a channel of events and a handle to get the final result.
    ///
    /// The result is an error when the deployment cannot be found, the watch
    /// is cancelled, or any service failed.
    pub fn start(
        self,
        cancel: CancellationToken,
    ) -> (
        mpsc::Receiver<WatchEvent>,
        tokio::task::JoinHandle<Result<WatchReport>>,
    ) {
        let (tx, rx) = mpsc::channel(100);
        let handle = tokio::spawn(async move { self.run(cancel, tx).await });
        (rx, handle)
    }

    async fn run(
        self,
        cancel: CancellationToken,
        tx: mpsc::Sender<WatchEvent>,
    ) -> Result<WatchReport> {
        let mode = self.options.mode;
        let mut states: BTreeMap<String, Option<ActivityType>> =
            self.services.iter().map(|id| (id.clone(), None)).collect();

        let mut header = match mode {
            WatchMode::Full => format!("Deploying {}", self.project_id),
            WatchMode::BuildOnly => format!("Building {}", self.project_id),
        };
        let _ = tx.send(WatchEvent::Header(header.clone())).await;

        let filter = ActivityFilter::for_group(self.group_uid.clone());
        let mut ticker = tokio::time::interval(self.options.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(group_uid = %self.group_uid, services = ?self.services, "Watching deployment");

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                _ = ticker.tick() => {}
            }

            let fetched = tokio::time::timeout(
                self.options.fetch_timeout,
                self.client.list(&cancel, &self.project_id, &filter),
            )
            .await
            .unwrap_or_else(|_| Err(Error::Timeout("listing activities".to_string())));

            let mut activities = match fetched {
                Ok(activities) => activities,
                Err(e) if e.is_not_found() => {
                    return Err(Error::NotFound(format!("deployment {}", self.group_uid)));
                }
                Err(Error::Cancelled) => return Err(Error::Cancelled),
                Err(e) => {
                    warn!(error = %e, "Can't get deployment status, retrying");
                    header = add_retry_counter(&header);
                    let _ = tx.send(WatchEvent::Header(header.clone())).await;
                    continue;
                }
            };

            if has_retry_counter(&header) {
                header = clear_retry_counter(&header);
                let _ = tx.send(WatchEvent::Header(header.clone())).await;
            }

            // Newest first on the wire; replay oldest first.
            activities.reverse();
            for activity in &activities {
                if let Some(event) = apply(mode, &mut states, activity) {
                    let _ = tx.send(event).await;
                }
            }

            if states.values().all(|state| mode.is_terminal(*state)) {
                break;
            }
        }

        debug!(group_uid = %self.group_uid, "All services settled");
        WatchReport { states }.into_result()
    }
}

/// Apply one activity to the tracked states, returning the event to emit.
fn apply(
    mode: WatchMode,
    states: &mut BTreeMap<String, Option<ActivityType>>,
    activity: &Activity,
) -> Option<WatchEvent> {
    let service_id = activity.service_id()?;
    let current = states.get_mut(service_id)?;
    let next = next_state(mode, *current, activity.kind)?;
    *current = Some(next);

    debug!(service = %service_id, state = %next, "Service state changed");
    Some(WatchEvent::ServiceChanged {
        service_id: service_id.to_string(),
        state: next,
        message: status_message(next).to_string(),
        failed: next.failure_kind().is_some(),
    })
}
