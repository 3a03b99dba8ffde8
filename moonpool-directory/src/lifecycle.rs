//! Staged silo startup and shutdown.
//!
//! Components that need to run work when the silo starts or stops (start a
//! background task, drain a cache) subscribe an observer at a
//! [`LifecycleStage`]. [`SiloLifecycle::start`] runs observers stage by
//! stage in ascending order; [`SiloLifecycle::stop`] runs the started ones
//! in reverse.
//!
//! # Orleans Reference
//!
//! Corresponds to Orleans' `ISiloLifecycle` / `ILifecycleParticipant`.
//! Only the stages the directory takes part in are modelled.

use std::fmt;
use std::sync::Arc;

/// Error type returned by lifecycle observers.
pub type ObserverError = Box<dyn std::error::Error + Send + Sync>;

/// Ordered startup stages. Start runs low to high, stop high to low.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LifecycleStage {
    /// Core runtime pieces (membership feed, networking).
    RuntimeInitialize,
    /// Runtime services that depend on the core.
    RuntimeServices,
    /// Services grains depend on: directories and locators.
    RuntimeGrainServices,
    /// The silo announces itself as active.
    BecomeActive,
    /// The silo is serving traffic.
    Active,
}

impl fmt::Display for LifecycleStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RuntimeInitialize => write!(f, "RuntimeInitialize"),
            Self::RuntimeServices => write!(f, "RuntimeServices"),
            Self::RuntimeGrainServices => write!(f, "RuntimeGrainServices"),
            Self::BecomeActive => write!(f, "BecomeActive"),
            Self::Active => write!(f, "Active"),
        }
    }
}

/// Errors from running the lifecycle.
#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    /// An observer failed to start. Later stages were not run.
    #[error("{name} failed to start at stage {stage}: {reason}")]
    ParticipantFailed {
        /// Stage the observer was subscribed at.
        stage: LifecycleStage,
        /// Name the observer was subscribed under.
        name: String,
        /// Failure reported by the observer.
        reason: String,
    },
}

/// Work to run when the lifecycle reaches or leaves a stage.
#[async_trait::async_trait]
pub trait LifecycleObserver: Send + Sync + fmt::Debug {
    /// Called when the stage starts.
    async fn on_start(&self) -> Result<(), ObserverError>;

    /// Called when the stage stops. Must drain in-flight work.
    async fn on_stop(&self);
}

/// A component that subscribes itself to the silo lifecycle.
pub trait LifecycleParticipant {
    /// Subscribe observers on `lifecycle`.
    fn participate(self: &Arc<Self>, lifecycle: &mut SiloLifecycle);
}

#[derive(Debug)]
struct Subscription {
    name: String,
    stage: LifecycleStage,
    observer: Arc<dyn LifecycleObserver>,
}

/// Staged lifecycle subject.
///
/// Observers at the same stage start in subscription order and stop in
/// the reverse order.
#[derive(Debug, Default)]
pub struct SiloLifecycle {
    subscriptions: Vec<Subscription>,
    started: Vec<usize>,
}

impl SiloLifecycle {
    /// Create a lifecycle with no observers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe `observer` at `stage`.
    pub fn subscribe(
        &mut self,
        name: impl Into<String>,
        stage: LifecycleStage,
        observer: Arc<dyn LifecycleObserver>,
    ) {
        self.subscriptions.push(Subscription {
            name: name.into(),
            stage,
            observer,
        });
    }

    /// Highest stage with at least one started observer.
    pub fn highest_started_stage(&self) -> Option<LifecycleStage> {
        self.started
            .iter()
            .map(|&i| self.subscriptions[i].stage)
            .max()
    }

    /// Start every observer, stage by stage.
    ///
    /// # Errors
    ///
    /// Stops at the first failing observer and returns
    /// [`LifecycleError::ParticipantFailed`]. Observers started so far stay
    /// started; call [`stop`](Self::stop) to tear them down.
    pub async fn start(&mut self) -> Result<(), LifecycleError> {
        let mut order: Vec<usize> = (0..self.subscriptions.len())
            .filter(|i| !self.started.contains(i))
            .collect();
        order.sort_by_key(|&i| self.subscriptions[i].stage);

        for i in order {
            let sub = &self.subscriptions[i];
            tracing::debug!(name = %sub.name, stage = %sub.stage, "starting lifecycle observer");
            if let Err(e) = sub.observer.on_start().await {
                tracing::warn!(name = %sub.name, stage = %sub.stage, error = %e, "lifecycle start failed");
                return Err(LifecycleError::ParticipantFailed {
                    stage: sub.stage,
                    name: sub.name.clone(),
                    reason: e.to_string(),
                });
            }
            self.started.push(i);
        }
        tracing::info!(observers = self.started.len(), "silo lifecycle started");
        Ok(())
    }

    /// Stop every started observer in reverse start order.
    pub async fn stop(&mut self) {
        while let Some(i) = self.started.pop() {
            let sub = &self.subscriptions[i];
            tracing::debug!(name = %sub.name, stage = %sub.stage, "stopping lifecycle observer");
            sub.observer.on_stop().await;
        }
        tracing::info!("silo lifecycle stopped");
    }
}
