use std::sync::Arc;

use chrono::{Duration, Utc};
use log::{error, info, warn};

use crate::container_management::container_manager::ContainerManager;
use crate::error_handling::types::{ChallengeError, MatchError, QueueError, StorageError};
use crate::matchmaking::queue::MatchQueue;
use crate::matchmaking::types::{
    ChallengeStatus, DuelChallenge, DuelMatch, JoinOutcome, MatchContainers, MatchStatus,
    Preference, QueuePreferences,
};
use crate::storage::storage_trait::Storage;

/// Drives duel matches through their lifecycle.
///
/// Matches are created from queue pairings or accepted challenges,
/// provisioned asynchronously (one container per player through the
/// lifecycle manager), and resolved by cancellation, a winner, or a
/// draw. State transitions are guarded in storage with conditional
/// updates, so a cancel racing a provisioning task cannot resurrect a
/// match and a repeated set-winner call is rejected.
#[derive(Clone)]
pub struct DuelService {
    storage: Arc<dyn Storage>,
    queue: Arc<MatchQueue>,
    containers: Arc<ContainerManager>,
    duel_image: String,
    default_score_change: i64,
    challenge_ttl: Duration,
}

impl DuelService {
    pub fn new(
        storage: Arc<dyn Storage>,
        queue: Arc<MatchQueue>,
        containers: Arc<ContainerManager>,
        duel_image: String,
        default_score_change: i64,
        challenge_ttl_secs: u64,
    ) -> Self {
        DuelService {
            storage,
            queue,
            containers,
            duel_image,
            default_score_change,
            challenge_ttl: Duration::seconds(challenge_ttl_secs as i64),
        }
    }

    /// Joins the matchmaking queue and immediately attempts a pairing.
    ///
    /// The caller may come back `Matched` (their own pairing) or
    /// `Queued`; a pairing between two *other* compatible users can
    /// also fall out of the attempt and is started all the same.
    pub async fn join_queue(
        &self,
        user_id: i64,
        prefs: QueuePreferences,
    ) -> Result<JoinOutcome, QueueError> {
        if let Some(active) = self.storage.active_match_for(user_id).await? {
            return Err(QueueError::AlreadyInMatch(active.id));
        }

        let entry = self.queue.enqueue(user_id, prefs).await?;

        if let Some((player1, player2)) = self.queue.attempt_match().await {
            let duel_match = self
                .start_match(player1, player2, "match created from queue pairing")
                .await?;
            if duel_match.is_participant(user_id) {
                return Ok(JoinOutcome::Matched(duel_match));
            }
        }

        Ok(JoinOutcome::Queued(entry))
    }

    /// Removes the caller from the queue. `false` when nothing was
    /// queued.
    pub async fn leave_queue(&self, user_id: i64) -> bool {
        self.queue.dequeue(user_id).await
    }

    pub async fn queue_status(
        &self,
        user_id: i64,
    ) -> Result<(bool, Option<DuelMatch>), StorageError> {
        let in_queue = self.queue.contains(user_id).await;
        let active = self.storage.active_match_for(user_id).await?;
        Ok((in_queue, active))
    }

    pub async fn get_match(&self, match_id: i64) -> Result<Option<DuelMatch>, StorageError> {
        self.storage.get_match(match_id).await
    }

    pub async fn matches_for(&self, user_id: i64) -> Result<Vec<DuelMatch>, StorageError> {
        self.storage.matches_for_user(user_id).await
    }

    /// Cancels the caller's active match.
    pub async fn cancel_active(&self, user_id: i64) -> Result<DuelMatch, MatchError> {
        let active = self
            .storage
            .active_match_for(user_id)
            .await?
            .ok_or(MatchError::NoActiveMatch)?;

        let line = format!("match cancelled by user {}", user_id);
        let updated = self
            .storage
            .update_match_status(
                active.id,
                &[MatchStatus::Preparing, MatchStatus::InProgress],
                MatchStatus::Cancelled,
                true,
                Some(&line),
            )
            .await?;
        if !updated {
            let current = self.current_status(active.id).await?;
            return Err(MatchError::NotCancellable(current));
        }

        // A cancelling user may still hold a queue entry from a direct
        // re-join attempt; clear it.
        self.queue.dequeue(user_id).await;

        let final_state = self.finish_match(active.id).await?;
        info!("Match {} cancelled by user {}", active.id, user_id);
        Ok(final_state)
    }

    /// Resolves a match with a winner. Valid only from `in_progress`;
    /// updates both players' ratings symmetrically (loser floored at
    /// zero) in the same storage transaction that flips the status.
    pub async fn set_winner(
        &self,
        match_id: i64,
        winner_id: i64,
        score_override: Option<i64>,
    ) -> Result<DuelMatch, MatchError> {
        let duel_match = self
            .storage
            .get_match(match_id)
            .await?
            .ok_or(MatchError::NotFound(match_id))?;

        if !duel_match.is_participant(winner_id) {
            return Err(MatchError::InvalidWinner);
        }
        let loser_id = duel_match
            .opponent_of(winner_id)
            .ok_or(MatchError::InvalidWinner)?;

        let to = if duel_match.player1_id == winner_id {
            MatchStatus::Player1Victory
        } else {
            MatchStatus::Player2Victory
        };
        let score_change = score_override.unwrap_or(self.default_score_change);

        let updated = self
            .storage
            .set_match_winner(match_id, winner_id, loser_id, score_change, to)
            .await?;
        if !updated {
            let current = self.current_status(match_id).await?;
            return Err(MatchError::WrongState(current));
        }

        let line = format!(
            "winner {} (+{}), loser {} (-{}, floored at 0)",
            winner_id, score_change, loser_id, score_change
        );
        if let Err(e) = self.storage.append_match_log(match_id, &line).await {
            warn!("Failed to append result log to match {}: {}", match_id, e);
        }

        let final_state = self.finish_match(match_id).await?;
        info!(
            "Match {} resolved: winner {} (+{} / -{})",
            match_id, winner_id, score_change, score_change
        );
        Ok(final_state)
    }

    /// Admin status override. Victory targets route through the winner
    /// path so ratings always move with the terminal state; every other
    /// target goes through the guarded transition table.
    pub async fn admin_override(
        &self,
        match_id: i64,
        status: MatchStatus,
        winner_id: Option<i64>,
        score_change: Option<i64>,
    ) -> Result<DuelMatch, MatchError> {
        match status {
            MatchStatus::Player1Victory | MatchStatus::Player2Victory => {
                let duel_match = self
                    .storage
                    .get_match(match_id)
                    .await?
                    .ok_or(MatchError::NotFound(match_id))?;
                let expected = if status == MatchStatus::Player1Victory {
                    duel_match.player1_id
                } else {
                    duel_match.player2_id
                };
                let winner = winner_id.ok_or(MatchError::InvalidWinner)?;
                if winner != expected {
                    return Err(MatchError::InvalidWinner);
                }
                self.set_winner(match_id, winner, score_change).await
            }
            MatchStatus::Draw => {
                self.guarded_transition(
                    match_id,
                    &[MatchStatus::InProgress],
                    MatchStatus::Draw,
                    true,
                    "match ended in a draw (admin)",
                )
                .await
            }
            MatchStatus::Cancelled => {
                let result = self
                    .guarded_transition(
                        match_id,
                        &[MatchStatus::Preparing, MatchStatus::InProgress],
                        MatchStatus::Cancelled,
                        true,
                        "match cancelled by admin",
                    )
                    .await?;
                Ok(result)
            }
            MatchStatus::InProgress => {
                self.guarded_transition(
                    match_id,
                    &[MatchStatus::Preparing],
                    MatchStatus::InProgress,
                    false,
                    "match forced in_progress by admin",
                )
                .await
            }
            MatchStatus::Preparing => Err(MatchError::WrongState("preparing".to_string())),
        }
    }

    /// Sends a direct challenge. At most one pending challenge may
    /// exist from a given challenger to a given opponent.
    pub async fn create_challenge(
        &self,
        challenger_id: i64,
        challenged_id: i64,
        difficulty: Preference,
    ) -> Result<DuelChallenge, ChallengeError> {
        if challenger_id == challenged_id {
            return Err(ChallengeError::SelfChallenge);
        }
        if let Some(existing) = self
            .storage
            .pending_challenge_between(challenger_id, challenged_id)
            .await?
        {
            return Err(ChallengeError::AlreadyPending(existing.id));
        }

        let challenge = self
            .storage
            .insert_challenge(
                challenger_id,
                challenged_id,
                &difficulty,
                Utc::now() + self.challenge_ttl,
            )
            .await?;
        info!(
            "User {} challenged user {} (challenge {})",
            challenger_id, challenged_id, challenge.id
        );
        Ok(challenge)
    }

    /// Accepts or rejects a pending challenge; acceptance spawns a new
    /// match in `preparing`.
    pub async fn respond_challenge(
        &self,
        challenge_id: i64,
        user_id: i64,
        accept: bool,
    ) -> Result<(DuelChallenge, Option<DuelMatch>), ChallengeError> {
        let challenge = self
            .storage
            .get_challenge(challenge_id)
            .await?
            .ok_or(ChallengeError::NotFound(challenge_id))?;

        if challenge.challenged_id != user_id {
            return Err(ChallengeError::NotAddressee);
        }
        if challenge.status != ChallengeStatus::Pending {
            return Err(ChallengeError::AlreadyResponded(
                challenge.status.as_str().to_string(),
            ));
        }
        if challenge.expires_at <= Utc::now() {
            let _ = self
                .storage
                .update_challenge_status(
                    challenge_id,
                    ChallengeStatus::Pending,
                    ChallengeStatus::Expired,
                )
                .await;
            return Err(ChallengeError::Expired);
        }

        let to = if accept {
            ChallengeStatus::Accepted
        } else {
            ChallengeStatus::Rejected
        };
        let updated = self
            .storage
            .update_challenge_status(challenge_id, ChallengeStatus::Pending, to)
            .await?;
        if !updated {
            let current = self
                .storage
                .get_challenge(challenge_id)
                .await?
                .map(|c| c.status.as_str().to_string())
                .unwrap_or_else(|| "unknown".to_string());
            return Err(ChallengeError::AlreadyResponded(current));
        }

        let challenge = self
            .storage
            .get_challenge(challenge_id)
            .await?
            .ok_or(ChallengeError::NotFound(challenge_id))?;

        if accept {
            let duel_match = self
                .start_match(
                    challenge.challenger_id,
                    challenge.challenged_id,
                    "match created from accepted challenge",
                )
                .await?;
            Ok((challenge, Some(duel_match)))
        } else {
            Ok((challenge, None))
        }
    }

    pub async fn challenges_for(
        &self,
        user_id: i64,
    ) -> Result<Vec<DuelChallenge>, StorageError> {
        self.storage.challenges_for_user(user_id).await
    }

    /// Creates a match in `preparing` and kicks off provisioning on its
    /// own task.
    async fn start_match(
        &self,
        player1_id: i64,
        player2_id: i64,
        origin: &str,
    ) -> Result<DuelMatch, StorageError> {
        let duel_match = self
            .storage
            .insert_match(player1_id, player2_id, origin)
            .await?;
        info!(
            "Match {} created ({} vs {})",
            duel_match.id, player1_id, player2_id
        );

        let service = self.clone();
        let to_provision = duel_match.clone();
        tokio::spawn(async move {
            service.provision(to_provision).await;
        });

        Ok(duel_match)
    }

    /// Provisions one container per player, then flips the match to
    /// `in_progress`. A player whose container could not be provisioned
    /// falls back to a simulated session; the match still starts. If
    /// the match was cancelled while we were provisioning, the guarded
    /// transition fails and the fresh containers are stopped again.
    async fn provision(&self, duel_match: DuelMatch) {
        let launch1 = self
            .containers
            .launch(&self.duel_image, duel_match.player1_id, duel_match.id)
            .await;
        let launch2 = self
            .containers
            .launch(&self.duel_image, duel_match.player2_id, duel_match.id)
            .await;

        let data = MatchContainers {
            player1_container: launch1.container.as_ref().map(|c| c.id.clone()),
            player1_address: launch1.container.as_ref().and_then(|c| c.ip_address.clone()),
            player2_container: launch2.container.as_ref().map(|c| c.id.clone()),
            player2_address: launch2.container.as_ref().and_then(|c| c.ip_address.clone()),
        };
        if let Err(e) = self.storage.set_container_data(duel_match.id, &data).await {
            warn!(
                "Failed to persist container data for match {}: {}",
                duel_match.id, e
            );
        }

        let mut line = String::from("containers provisioned");
        if launch1.simulated || launch2.simulated {
            line.push_str(" (simulated: ");
            line.push_str(match (launch1.simulated, launch2.simulated) {
                (true, true) => "both players",
                (true, false) => "player1",
                _ => "player2",
            });
            line.push(')');
        }

        match self
            .storage
            .update_match_status(
                duel_match.id,
                &[MatchStatus::Preparing],
                MatchStatus::InProgress,
                false,
                Some(&line),
            )
            .await
        {
            Ok(true) => info!("Match {} is now in progress", duel_match.id),
            Ok(false) => {
                warn!(
                    "Match {} left preparing before provisioning finished; releasing containers",
                    duel_match.id
                );
                for id in data.container_ids() {
                    self.containers.stop_container(id).await;
                }
            }
            Err(e) => error!(
                "Failed to start match {} after provisioning: {}",
                duel_match.id, e
            ),
        }
    }

    /// Guarded status transition plus the shared teardown tail.
    async fn guarded_transition(
        &self,
        match_id: i64,
        from: &[MatchStatus],
        to: MatchStatus,
        ended: bool,
        log_line: &str,
    ) -> Result<DuelMatch, MatchError> {
        let exists = self.storage.get_match(match_id).await?;
        if exists.is_none() {
            return Err(MatchError::NotFound(match_id));
        }

        let updated = self
            .storage
            .update_match_status(match_id, from, to, ended, Some(log_line))
            .await?;
        if !updated {
            let current = self.current_status(match_id).await?;
            return Err(MatchError::WrongState(current));
        }
        self.finish_match(match_id).await
    }

    /// Re-reads the final state and, for terminal states, best-effort
    /// stops any containers the match still references. Stops are
    /// idempotent, so a container already gone is not an error.
    async fn finish_match(&self, match_id: i64) -> Result<DuelMatch, MatchError> {
        let final_state = self
            .storage
            .get_match(match_id)
            .await?
            .ok_or(MatchError::NotFound(match_id))?;

        if final_state.status.is_terminal() {
            if let Some(data) = &final_state.container_data {
                for id in data.container_ids() {
                    self.containers.stop_container(id).await;
                }
            }
        }
        Ok(final_state)
    }

    async fn current_status(&self, match_id: i64) -> Result<String, MatchError> {
        Ok(self
            .storage
            .get_match(match_id)
            .await?
            .map(|m| m.status.as_str().to_string())
            .unwrap_or_else(|| "unknown".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container_management::tests::MockRuntime;
    use crate::matchmaking::types::QueuePreferences;
    use crate::session_management::session_registry::SessionRegistry;
    use crate::storage::database_storage::DatabaseStorage;
    use tempfile::TempDir;

    struct Harness {
        runtime: Arc<MockRuntime>,
        storage: Arc<dyn Storage>,
        service: DuelService,
    }

    async fn setup() -> Harness {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("duels.sqlite3");
        Box::leak(Box::new(dir));
        let storage: Arc<dyn Storage> =
            Arc::new(DatabaseStorage::new_file(path).await.unwrap());
        let runtime = Arc::new(MockRuntime::new());
        let sessions = Arc::new(SessionRegistry::new(storage.clone(), 3600));
        let containers = Arc::new(ContainerManager::new(
            runtime.clone(),
            sessions,
            "arena-test",
        ));
        let queue = Arc::new(MatchQueue::new(storage.clone(), 300));
        let service = DuelService::new(
            storage.clone(),
            queue,
            containers,
            "test:latest".to_string(),
            25,
            3600,
        );
        Harness {
            runtime,
            storage,
            service,
        }
    }

    fn prefs(difficulty: &str) -> QueuePreferences {
        QueuePreferences {
            difficulty: Preference::new(difficulty),
            challenge_type: Preference::any(),
        }
    }

    async fn wait_in_progress(service: &DuelService, match_id: i64) -> DuelMatch {
        for _ in 0..200 {
            let m = service.get_match(match_id).await.unwrap().unwrap();
            if m.status == MatchStatus::InProgress {
                return m;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        panic!("match {} never reached in_progress", match_id);
    }

    async fn paired_match(h: &Harness) -> DuelMatch {
        h.service
            .join_queue(1, QueuePreferences::default())
            .await
            .unwrap();
        match h
            .service
            .join_queue(2, QueuePreferences::default())
            .await
            .unwrap()
        {
            JoinOutcome::Matched(m) => m,
            JoinOutcome::Queued(_) => panic!("second join should pair"),
        }
    }

    #[tokio::test]
    async fn compatible_users_pair_into_a_shared_match() {
        let h = setup().await;

        let first = h
            .service
            .join_queue(1, QueuePreferences::default())
            .await
            .unwrap();
        assert!(matches!(first, JoinOutcome::Queued(_)));

        let m = paired_match_from(
            h.service
                .join_queue(2, QueuePreferences::default())
                .await
                .unwrap(),
        );
        assert_eq!(m.player1_id, 1);
        assert_eq!(m.player2_id, 2);
        assert_eq!(m.status, MatchStatus::Preparing);

        // both users now see the same active match and no queue entry
        let (in_queue, active) = h.service.queue_status(1).await.unwrap();
        assert!(!in_queue);
        assert_eq!(active.unwrap().id, m.id);
        let (in_queue, active) = h.service.queue_status(2).await.unwrap();
        assert!(!in_queue);
        assert_eq!(active.unwrap().id, m.id);

        // provisioning attaches two containers and starts the match
        let started = wait_in_progress(&h.service, m.id).await;
        let data = started.container_data.unwrap();
        assert!(data.player1_container.is_some());
        assert!(data.player2_container.is_some());
        assert!(started.logs.contains("containers provisioned"));
        assert_eq!(h.runtime.running_count().await, 2);
    }

    fn paired_match_from(outcome: JoinOutcome) -> DuelMatch {
        match outcome {
            JoinOutcome::Matched(m) => m,
            JoinOutcome::Queued(_) => panic!("expected a pairing"),
        }
    }

    #[tokio::test]
    async fn incompatible_preferences_keep_both_waiting() {
        let h = setup().await;
        assert!(matches!(
            h.service.join_queue(1, prefs("easy")).await.unwrap(),
            JoinOutcome::Queued(_)
        ));
        assert!(matches!(
            h.service.join_queue(2, prefs("hard")).await.unwrap(),
            JoinOutcome::Queued(_)
        ));
        let (in_queue, active) = h.service.queue_status(1).await.unwrap();
        assert!(in_queue);
        assert!(active.is_none());
    }

    #[tokio::test]
    async fn active_match_blocks_rejoining_the_queue() {
        let h = setup().await;
        let m = paired_match(&h).await;
        let err = h.service.join_queue(1, QueuePreferences::default()).await;
        assert!(matches!(err, Err(QueueError::AlreadyInMatch(id)) if id == m.id));
    }

    #[tokio::test]
    async fn cancel_tears_down_containers_and_is_final() {
        let h = setup().await;
        let m = paired_match(&h).await;
        let started = wait_in_progress(&h.service, m.id).await;
        let data = started.container_data.clone().unwrap();

        let cancelled = h.service.cancel_active(1).await.unwrap();
        assert_eq!(cancelled.status, MatchStatus::Cancelled);
        assert!(cancelled.ended_at.is_some());
        assert!(cancelled.logs.contains("cancelled by user 1"));

        for id in data.container_ids() {
            assert!(!h.runtime.contains(id).await);
        }

        assert!(matches!(
            h.service.cancel_active(1).await,
            Err(MatchError::NoActiveMatch)
        ));
        // a cancelled match cannot gain a winner
        assert!(matches!(
            h.service.set_winner(m.id, 1, None).await,
            Err(MatchError::WrongState(_))
        ));
    }

    #[tokio::test]
    async fn winner_applies_symmetric_rating_delta_once() {
        let h = setup().await;
        let m = paired_match(&h).await;
        wait_in_progress(&h.service, m.id).await;

        let resolved = h.service.set_winner(m.id, 1, None).await.unwrap();
        assert_eq!(resolved.status, MatchStatus::Player1Victory);
        assert_eq!(resolved.winner_id, Some(1));
        assert_eq!(resolved.score_change, Some(25));
        assert!(resolved.logs.contains("winner 1"));

        let winner = h.storage.get_stats(1).await.unwrap().unwrap();
        assert_eq!((winner.wins, winner.losses, winner.rating), (1, 0, 1025));
        let loser = h.storage.get_stats(2).await.unwrap().unwrap();
        assert_eq!((loser.wins, loser.losses, loser.rating), (0, 1, 975));

        // terminal state: repeated resolution attempts are rejected
        assert!(matches!(
            h.service.set_winner(m.id, 2, None).await,
            Err(MatchError::WrongState(_))
        ));
        assert!(matches!(
            h.service
                .admin_override(m.id, MatchStatus::Player2Victory, Some(2), None)
                .await,
            Err(MatchError::WrongState(_))
        ));
    }

    #[tokio::test]
    async fn winner_requires_in_progress_and_a_participant() {
        let h = setup().await;
        // inserted directly, so no provisioning task ever starts it
        let m = h.storage.insert_match(5, 6, "created").await.unwrap();

        assert!(matches!(
            h.service.set_winner(m.id, 5, None).await,
            Err(MatchError::WrongState(s)) if s == "preparing"
        ));
        assert!(matches!(
            h.service.set_winner(m.id, 7, None).await,
            Err(MatchError::InvalidWinner)
        ));
        assert!(matches!(
            h.service.set_winner(999, 5, None).await,
            Err(MatchError::NotFound(999))
        ));
    }

    #[tokio::test]
    async fn admin_draw_leaves_ratings_untouched() {
        let h = setup().await;
        let m = paired_match(&h).await;
        wait_in_progress(&h.service, m.id).await;

        let drawn = h
            .service
            .admin_override(m.id, MatchStatus::Draw, None, None)
            .await
            .unwrap();
        assert_eq!(drawn.status, MatchStatus::Draw);
        assert!(h.storage.get_stats(1).await.unwrap().is_none());
        assert!(h.storage.get_stats(2).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn provisioning_failure_degrades_to_simulated_match() {
        let h = setup().await;
        h.runtime.set_fail_create(true);

        let m = paired_match(&h).await;
        let started = wait_in_progress(&h.service, m.id).await;

        let data = started.container_data.unwrap();
        assert!(data.player1_container.is_none());
        assert!(data.player2_container.is_none());
        assert!(started.logs.contains("simulated"));
    }

    #[tokio::test]
    async fn challenge_flow_creates_match_on_accept() {
        let h = setup().await;

        assert!(matches!(
            h.service.create_challenge(1, 1, Preference::any()).await,
            Err(ChallengeError::SelfChallenge)
        ));

        let challenge = h
            .service
            .create_challenge(1, 2, Preference::new("medium"))
            .await
            .unwrap();
        assert!(matches!(
            h.service.create_challenge(1, 2, Preference::any()).await,
            Err(ChallengeError::AlreadyPending(id)) if id == challenge.id
        ));

        assert!(matches!(
            h.service.respond_challenge(challenge.id, 3, true).await,
            Err(ChallengeError::NotAddressee)
        ));

        let (responded, duel_match) = h
            .service
            .respond_challenge(challenge.id, 2, true)
            .await
            .unwrap();
        assert_eq!(responded.status, ChallengeStatus::Accepted);
        let m = duel_match.expect("acceptance spawns a match");
        assert_eq!((m.player1_id, m.player2_id), (1, 2));
        assert_eq!(m.status, MatchStatus::Preparing);

        assert!(matches!(
            h.service.respond_challenge(challenge.id, 2, true).await,
            Err(ChallengeError::AlreadyResponded(_))
        ));
    }

    #[tokio::test]
    async fn rejected_challenge_spawns_nothing() {
        let h = setup().await;
        let challenge = h
            .service
            .create_challenge(3, 4, Preference::any())
            .await
            .unwrap();
        let (responded, duel_match) = h
            .service
            .respond_challenge(challenge.id, 4, false)
            .await
            .unwrap();
        assert_eq!(responded.status, ChallengeStatus::Rejected);
        assert!(duel_match.is_none());
        assert!(h.storage.active_match_for(3).await.unwrap().is_none());
        // the pair is free to challenge again
        assert!(h.service.create_challenge(3, 4, Preference::any()).await.is_ok());
    }
}
