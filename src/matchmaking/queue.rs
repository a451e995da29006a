use std::sync::Arc;

use chrono::{Duration, Utc};
use log::{debug, info, warn};
use tokio::sync::Mutex;

use crate::error_handling::types::QueueError;
use crate::matchmaking::types::{QueueEntry, QueuePreferences, QueueStatus};
use crate::storage::storage_trait::Storage;

/// The matchmaking queue.
///
/// All queue state lives behind one mutex; enqueue, dequeue and pairing
/// run inside the same critical section, which is what guarantees that a
/// user is never selected into two simultaneous pairings and that a
/// paired user is invisible to subsequent reads. Entries are mirrored to
/// the durable store but the in-memory list is authoritative.
///
/// Expired entries are pruned lazily at the start of every operation.
pub struct MatchQueue {
    entries: Mutex<Vec<QueueEntry>>,
    storage: Arc<dyn Storage>,
    ttl: Duration,
}

impl MatchQueue {
    pub fn new(storage: Arc<dyn Storage>, ttl_secs: u64) -> Self {
        MatchQueue {
            entries: Mutex::new(Vec::new()),
            storage,
            ttl: Duration::seconds(ttl_secs as i64),
        }
    }

    /// Adds a user to the queue. The active-match check belongs to the
    /// duel service; this only enforces entry uniqueness.
    pub async fn enqueue(
        &self,
        user_id: i64,
        prefs: QueuePreferences,
    ) -> Result<QueueEntry, QueueError> {
        let mut entries = self.entries.lock().await;
        self.prune_locked(&mut entries).await;

        if entries.iter().any(|e| e.user_id == user_id) {
            return Err(QueueError::AlreadyQueued);
        }

        let now = Utc::now();
        let entry = QueueEntry {
            user_id,
            joined_at: now,
            status: QueueStatus::Waiting,
            preferred_difficulty: prefs.difficulty,
            preferred_challenge_type: prefs.challenge_type,
            expires_at: now + self.ttl,
        };
        entries.push(entry.clone());

        if let Err(e) = self.storage.insert_queue_entry(&entry).await {
            warn!("Failed to persist queue entry for user {}: {}", user_id, e);
        }
        info!("User {} joined the duel queue", user_id);
        Ok(entry)
    }

    /// Removes a user's entry. Idempotent; `false` when nothing was
    /// queued.
    pub async fn dequeue(&self, user_id: i64) -> bool {
        let mut entries = self.entries.lock().await;
        self.prune_locked(&mut entries).await;

        let before = entries.len();
        entries.retain(|e| e.user_id != user_id);
        let removed = entries.len() < before;
        if removed {
            self.delete_row(user_id).await;
            info!("User {} left the duel queue", user_id);
        }
        removed
    }

    pub async fn contains(&self, user_id: i64) -> bool {
        let mut entries = self.entries.lock().await;
        self.prune_locked(&mut entries).await;
        entries.iter().any(|e| e.user_id == user_id)
    }

    /// Attempts one pairing: the earliest-joined compatible pair wins.
    /// Both selected entries leave the queue before the lock is
    /// released.
    pub async fn attempt_match(&self) -> Option<(i64, i64)> {
        let mut entries = self.entries.lock().await;
        self.prune_locked(&mut entries).await;

        let (i, j) = find_compatible_pair(&entries)?;
        // Remove the later index first so the earlier one stays valid.
        let second = entries.remove(j);
        let first = entries.remove(i);

        self.delete_row(first.user_id).await;
        self.delete_row(second.user_id).await;

        info!(
            "Paired users {} and {} from the duel queue",
            first.user_id, second.user_id
        );
        Some((first.user_id, second.user_id))
    }

    /// Drops expired entries; exposed for the periodic sweep.
    pub async fn prune(&self) -> usize {
        let mut entries = self.entries.lock().await;
        self.prune_locked(&mut entries).await
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    async fn prune_locked(&self, entries: &mut Vec<QueueEntry>) -> usize {
        let now = Utc::now();
        let expired: Vec<i64> = entries
            .iter()
            .filter(|e| e.is_expired(now))
            .map(|e| e.user_id)
            .collect();
        entries.retain(|e| !e.is_expired(now));
        for user_id in &expired {
            debug!("Queue entry for user {} expired", user_id);
            self.delete_row(*user_id).await;
        }
        expired.len()
    }

    async fn delete_row(&self, user_id: i64) {
        if let Err(e) = self.storage.delete_queue_entry(user_id).await {
            warn!("Failed to delete queue row for user {}: {}", user_id, e);
        }
    }
}

/// Finds the first compatible pair in FIFO order: the earliest entry
/// that has any compatible partner, paired with its earliest partner.
fn find_compatible_pair(entries: &[QueueEntry]) -> Option<(usize, usize)> {
    for i in 0..entries.len() {
        for j in (i + 1)..entries.len() {
            if entries[i].compatible_with(&entries[j]) {
                return Some((i, j));
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matchmaking::types::Preference;
    use crate::storage::null_storage::NullStorage;

    fn queue() -> MatchQueue {
        MatchQueue::new(Arc::new(NullStorage), 300)
    }

    fn prefs(difficulty: &str, kind: &str) -> QueuePreferences {
        QueuePreferences {
            difficulty: Preference::new(difficulty),
            challenge_type: Preference::new(kind),
        }
    }

    #[tokio::test]
    async fn enqueue_is_unique_per_user() {
        let queue = queue();
        queue.enqueue(1, QueuePreferences::default()).await.unwrap();
        let err = queue.enqueue(1, QueuePreferences::default()).await;
        assert!(matches!(err, Err(QueueError::AlreadyQueued)));
        assert_eq!(queue.len().await, 1);
    }

    #[tokio::test]
    async fn dequeue_is_idempotent() {
        let queue = queue();
        queue.enqueue(1, QueuePreferences::default()).await.unwrap();
        assert!(queue.dequeue(1).await);
        assert!(!queue.dequeue(1).await);
        assert!(!queue.contains(1).await);
    }

    #[tokio::test]
    async fn pairing_is_fifo_within_compatible_buckets() {
        let queue = queue();
        queue.enqueue(1, prefs("hard", "web")).await.unwrap();
        queue.enqueue(2, prefs("easy", "pwn")).await.unwrap();
        queue.enqueue(3, prefs("any", "web")).await.unwrap();

        // User 2 is incompatible with user 1; users 1 and 3 pair first.
        let pair = queue.attempt_match().await.unwrap();
        assert_eq!(pair, (1, 3));
        assert!(queue.contains(2).await);
        assert!(queue.attempt_match().await.is_none());
    }

    #[tokio::test]
    async fn paired_users_vanish_from_queue_reads() {
        let queue = queue();
        queue.enqueue(1, QueuePreferences::default()).await.unwrap();
        queue.enqueue(2, QueuePreferences::default()).await.unwrap();

        assert!(queue.attempt_match().await.is_some());
        assert!(!queue.contains(1).await);
        assert!(!queue.contains(2).await);
        assert_eq!(queue.len().await, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn concurrent_pairing_yields_exactly_one_match() {
        let queue = Arc::new(queue());
        queue.enqueue(1, QueuePreferences::default()).await.unwrap();
        queue.enqueue(2, QueuePreferences::default()).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..16 {
            let queue = queue.clone();
            handles.push(tokio::spawn(async move { queue.attempt_match().await }));
        }

        let mut matches = 0;
        for handle in handles {
            if handle.await.unwrap().is_some() {
                matches += 1;
            }
        }
        assert_eq!(matches, 1);
        assert_eq!(queue.len().await, 0);
    }

    #[tokio::test]
    async fn expired_entries_are_pruned_lazily() {
        let queue = MatchQueue::new(Arc::new(NullStorage), 0);
        queue.enqueue(1, QueuePreferences::default()).await.unwrap();
        queue.enqueue(2, QueuePreferences::default()).await.unwrap();

        // Both entries are already past their TTL, so no pairing.
        assert!(queue.attempt_match().await.is_none());
        assert_eq!(queue.len().await, 0);
        assert!(!queue.contains(1).await);
    }
}
