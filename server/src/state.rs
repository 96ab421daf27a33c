//! Shared handler state.

use crate::hub::{ResultsHub, SnapshotPayload};
use std::sync::Arc;
use topout_runtime::metrics::{MetricsServer, ResultsMetrics};
use topout_scoring::{CompetitionId, CompetitionRepository, RepositoryError, competition_results};

/// State cloned into every handler
#[derive(Clone)]
pub struct AppState {
    /// Ledger, start lists and competition structure
    pub repo: Arc<dyn CompetitionRepository>,
    /// Live result topics
    pub hub: ResultsHub,
    /// Prometheus recorder rendered at `/metrics`
    pub metrics: Arc<MetricsServer>,
}

impl AppState {
    /// State over `repo` with an unstarted metrics recorder
    #[must_use]
    pub fn new(repo: Arc<dyn CompetitionRepository>, hub: ResultsHub) -> Self {
        Self {
            repo,
            hub,
            metrics: Arc::new(MetricsServer::new()),
        }
    }

    /// Serve `metrics` at `/metrics`
    #[must_use]
    pub fn with_metrics(mut self, metrics: MetricsServer) -> Self {
        self.metrics = Arc::new(metrics);
        self
    }

    /// Current snapshot of `competition`, serialized for the live channel
    ///
    /// # Errors
    ///
    /// Returns the repository error if the ledger cannot be read.
    pub async fn snapshot(&self, competition: CompetitionId) -> Result<SnapshotPayload, RepositoryError> {
        let results = competition_results(self.repo.as_ref(), competition).await?;
        serde_json::to_string(&results)
            .map(Arc::from)
            .map_err(|e| RepositoryError::Unavailable(format!("snapshot encoding failed: {e}")))
    }

    /// Recompute the snapshot of `competition` and push it to observers.
    ///
    /// Called after a committed write. The write already succeeded, so a
    /// failure here is logged and observers catch up on the next publish.
    /// Publishes for one competition run one at a time, so the last snapshot
    /// sent always includes every write committed before it.
    pub async fn publish_results(&self, competition: CompetitionId) {
        let _turn = self.hub.publish_turn(competition).await;
        match self.snapshot(competition).await {
            Ok(payload) => {
                let receivers = self.hub.publish(competition, payload).await;
                ResultsMetrics::record_broadcast(receivers);
                tracing::debug!(competition_id = %competition, receivers, "Results published");
            },
            Err(error) => {
                tracing::warn!(competition_id = %competition, %error, "Results not published");
            },
        }
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("hub", &self.hub)
            .field("metrics", &self.metrics)
            .finish_non_exhaustive()
    }
}
