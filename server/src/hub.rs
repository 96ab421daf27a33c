//! Per-competition fan-out of result snapshots.
//!
//! Each competition is a topic with its own broadcast channel. Snapshots are
//! serialized once on publish and shared between observers as `Arc<str>`.
//! Publishers of one competition take turns through [`ResultsHub::publish_turn`]
//! so observers see snapshots in the order they were computed.
//!
//! ```text
//! write handler ──publish(c)──> ResultsHub ──topic c──> observer sockets
//!                                    │
//!                                    └──topic d──> ...
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock, broadcast};
use topout_runtime::HealthCheck;
use topout_scoring::CompetitionId;

/// Serialized `CompetitionResults` as pushed to observers
pub type SnapshotPayload = Arc<str>;

type Topics = Arc<RwLock<HashMap<CompetitionId, broadcast::Sender<SnapshotPayload>>>>;
type Turns = Arc<Mutex<HashMap<CompetitionId, Arc<Mutex<()>>>>>;

/// Broadcast topics keyed by competition
#[derive(Debug, Clone)]
pub struct ResultsHub {
    topics: Topics,
    turns: Turns,
    capacity: usize,
}

impl ResultsHub {
    /// Create a hub buffering `capacity` snapshots per topic
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            topics: Arc::new(RwLock::new(HashMap::new())),
            turns: Arc::new(Mutex::new(HashMap::new())),
            capacity: capacity.max(1),
        }
    }

    /// Push a snapshot to every observer of `competition`.
    ///
    /// Returns the number of observers reached. Publishing to a competition
    /// nobody watches does not create a topic.
    pub async fn publish(&self, competition: CompetitionId, payload: SnapshotPayload) -> usize {
        let topics = self.topics.read().await;
        topics
            .get(&competition)
            .and_then(|sender| sender.send(payload).ok())
            .unwrap_or(0)
    }

    /// Wait until no one else is publishing for `competition`.
    ///
    /// Hold the guard from reading the ledger until the snapshot is sent.
    pub async fn publish_turn(&self, competition: CompetitionId) -> OwnedMutexGuard<()> {
        let turn = Arc::clone(self.turns.lock().await.entry(competition).or_default());
        turn.lock_owned().await
    }

    /// Receive every snapshot published for `competition` from now on
    pub async fn subscribe(&self, competition: CompetitionId) -> broadcast::Receiver<SnapshotPayload> {
        let mut topics = self.topics.write().await;
        topics
            .entry(competition)
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Drop topics whose observers have all disconnected
    pub async fn prune(&self) {
        self.topics
            .write()
            .await
            .retain(|_, sender| sender.receiver_count() > 0);
    }

    /// Number of competitions with a topic
    pub async fn topic_count(&self) -> usize {
        self.topics.read().await.len()
    }

    /// Number of connected observers across all competitions
    pub async fn observer_count(&self) -> usize {
        self.topics
            .read()
            .await
            .values()
            .map(broadcast::Sender::receiver_count)
            .sum()
    }

    /// Health of the hub, with topic and observer counts
    pub async fn health(&self) -> HealthCheck {
        HealthCheck::healthy("results_hub")
            .with_metadata("topics", self.topic_count().await.to_string())
            .with_metadata("observers", self.observer_count().await.to_string())
    }
}

impl Default for ResultsHub {
    fn default() -> Self {
        Self::new(64)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn observers_receive_their_competition_only() {
        let hub = ResultsHub::new(8);
        let (a, b) = (CompetitionId::new(), CompetitionId::new());
        let mut watching_a = hub.subscribe(a).await;
        let mut watching_b = hub.subscribe(b).await;

        assert_eq!(hub.publish(a, Arc::from("[1]")).await, 1);

        assert_eq!(&*watching_a.recv().await.unwrap(), "[1]");
        assert!(watching_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn publish_turns_are_exclusive_per_competition() {
        let hub = ResultsHub::new(4);
        let (a, b) = (CompetitionId::new(), CompetitionId::new());

        let held = hub.publish_turn(a).await;
        let other = hub.publish_turn(b).await;
        let waiting = tokio::time::timeout(Duration::from_millis(50), hub.publish_turn(a)).await;
        assert!(waiting.is_err());

        drop(held);
        drop(other);
        tokio::time::timeout(Duration::from_secs(1), hub.publish_turn(a))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn publishing_without_observers_is_a_no_op() {
        let hub = ResultsHub::default();
        assert_eq!(hub.publish(CompetitionId::new(), Arc::from("[]")).await, 0);
        assert_eq!(hub.topic_count().await, 0);
    }

    #[tokio::test]
    async fn prune_drops_abandoned_topics() {
        let hub = ResultsHub::new(4);
        let kept = CompetitionId::new();
        let _observer = hub.subscribe(kept).await;
        drop(hub.subscribe(CompetitionId::new()).await);

        assert_eq!(hub.topic_count().await, 2);
        hub.prune().await;
        assert_eq!(hub.topic_count().await, 1);
        assert_eq!(hub.observer_count().await, 1);

        let health = hub.health().await;
        assert!(health.status.is_healthy());
        assert!(health.metadata.contains(&("topics".to_string(), "1".to_string())));
    }
}
