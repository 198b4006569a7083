//! Reward ledger: runs one quest attempt end to end against the store.
//!
//! Writes to a user document are serialized per user id through [`UserLocks`];
//! admin edits of a profile take the same lock as quest attempts. State is read
//! fresh under the lock, the completion record is written first and the user
//! second. If the user write fails, the previous completion record is put back
//! so a retry from the same inputs grants the reward again; the caller sees the
//! error and must not advance any cached profile.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex as SyncMutex, PoisonError},
    time::Duration,
};

use chrono::{DateTime, Local};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{error, info, instrument, warn};

use crate::domain::{Answer, QuestStatus};
use crate::engine::{unlock, Curriculum, ProgressionEngine, Transition};
use crate::error::{ServiceError, StoreError};
use crate::store::{guarded, Store};

/// Registry of per-user async locks. Entries live only while someone holds
/// or waits for them.
#[derive(Default)]
pub struct UserLocks {
    map: SyncMutex<HashMap<String, Arc<Mutex<()>>>>,
}

/// Exclusive hold on one user id. Dropping it releases the lock and forgets
/// the entry once nobody else is waiting.
pub struct UserGuard<'a> {
    locks: &'a UserLocks,
    user_id: String,
    lock: Arc<Mutex<()>>,
    held: Option<OwnedMutexGuard<()>>,
}

impl UserLocks {
    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<Mutex<()>>>> {
        self.map.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub async fn acquire(&self, user_id: &str) -> UserGuard<'_> {
        let lock = self.entries().entry(user_id.to_string()).or_default().clone();
        // Built before awaiting so a cancelled wait still cleans up.
        let mut guard = UserGuard { locks: self, user_id: user_id.to_string(), lock, held: None };
        guard.held = Some(guard.lock.clone().lock_owned().await);
        guard
    }

    #[cfg(test)]
    pub(crate) fn tracked(&self) -> usize {
        self.entries().len()
    }
}

impl Drop for UserGuard<'_> {
    fn drop(&mut self) {
        self.held.take();
        let mut map = self.locks.entries();
        let idle = map
            .get(&self.user_id)
            .is_some_and(|e| Arc::ptr_eq(e, &self.lock) && Arc::strong_count(&self.lock) == 2);
        if idle {
            map.remove(&self.user_id);
        }
    }
}

pub struct Ledger<S> {
    store: Arc<S>,
    engine: ProgressionEngine,
    timeout: Duration,
    locks: UserLocks,
}

impl<S: Store> Ledger<S> {
    pub fn new(store: Arc<S>, engine: ProgressionEngine, timeout: Duration) -> Self {
        Self { store, engine, timeout, locks: UserLocks::default() }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Single-writer section for `user_id`. Anything that saves or deletes a
    /// user document must hold this.
    pub async fn lock_user(&self, user_id: &str) -> UserGuard<'_> {
        self.locks.acquire(user_id).await
    }

    #[cfg(test)]
    pub(crate) fn locked_users(&self) -> usize {
        self.locks.tracked()
    }

    /// Grade and record one attempt. `now` supplies both the record timestamp
    /// and the local calendar day used for streaks.
    #[instrument(level = "info", skip(self, answers), fields(answers = answers.len()))]
    pub async fn complete_quest(
        &self,
        user_id: &str,
        quest_id: &str,
        answers: &[Answer],
        now: DateTime<Local>,
    ) -> Result<Transition, ServiceError> {
        let _serial = self.lock_user(user_id).await;

        let user = guarded(self.timeout, self.store.get_user(user_id))
            .await?
            .ok_or_else(|| ServiceError::not_found("user", user_id))?;
        let quest = guarded(self.timeout, self.store.get_quest(quest_id))
            .await?
            .ok_or_else(|| ServiceError::not_found("quest", quest_id))?;
        if quest.status == QuestStatus::Draft && !user.role.is_staff() {
            return Err(ServiceError::not_found("quest", quest_id));
        }

        let completions = guarded(self.timeout, self.store.get_completions(user_id)).await?;
        let chapters = guarded(self.timeout, self.store.get_chapters()).await?;
        let quests = guarded(self.timeout, self.store.get_quests(None)).await?;

        if !unlock::quest_accessible(&user, &quest, &quests, &completions) {
            return Err(ServiceError::Locked(format!("quest '{}' is not unlocked yet", quest.id)));
        }

        let curriculum = Curriculum { chapters: &chapters, quests: &quests };
        let transition = self.engine.attempt(&user, &quest, answers, &completions, curriculum, now)?;

        guarded(self.timeout, self.store.save_completion(&transition.record)).await?;

        if transition.user_changed() {
            if let Err(e) = guarded(self.timeout, self.store.save_user(&transition.user)).await {
                error!(target: "progression", %user_id, %quest_id, error = %e, "User write failed; restoring completion record");
                self.restore_completion(&transition).await;
                return Err(e.into());
            }
        }

        info!(
            target: "progression",
            %user_id,
            %quest_id,
            score = transition.grade.score,
            passed = transition.grade.passed,
            xp_awarded = transition.xp_awarded,
            xp = transition.user.xp,
            streak = transition.user.streak,
            unlocked = ?transition.newly_unlocked,
            "Quest attempt recorded"
        );
        Ok(transition)
    }

    async fn restore_completion(&self, t: &Transition) {
        let res: Result<(), StoreError> = match &t.previous {
            Some(prev) => guarded(self.timeout, self.store.save_completion(prev)).await,
            None => guarded(self.timeout, self.store.delete_completion(&t.record.user_id, &t.record.quest_id)).await,
        };
        if let Err(e) = res {
            warn!(
                target: "progression",
                user_id = %t.record.user_id,
                quest_id = %t.record.quest_id,
                error = %e,
                "Could not restore completion record"
            );
        }
    }
}


#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::domain::{Chapter, CompletionRecord, Quest, Question, SystemConfig, User};
    use crate::engine::EngineConfig;
    use crate::seeds::seed_if_empty;
    use crate::store::DocumentStore;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

    /// Store wrapper that can fail user writes, stall reads or slow down
    /// completion writes.
    #[derive(Default)]
    pub(crate) struct FlakyStore {
        pub inner: DocumentStore,
        pub fail_user_writes: AtomicBool,
        pub read_delay_ms: AtomicU64,
        pub completion_delay_ms: AtomicU64,
    }

    impl FlakyStore {
        async fn stall(&self) {
            let ms = self.read_delay_ms.load(Ordering::SeqCst);
            if ms > 0 {
                tokio::time::sleep(Duration::from_millis(ms)).await;
            }
        }
    }

    impl Store for FlakyStore {
        async fn get_user(&self, id: &str) -> Result<Option<User>, StoreError> {
            self.stall().await;
            self.inner.get_user(id).await
        }
        async fn find_user_by_credential(&self, credential: &str) -> Result<Option<User>, StoreError> {
            self.inner.find_user_by_credential(credential).await
        }
        async fn list_users(&self) -> Result<Vec<User>, StoreError> {
            self.inner.list_users().await
        }
        async fn save_user(&self, user: &User) -> Result<(), StoreError> {
            if self.fail_user_writes.load(Ordering::SeqCst) {
                return Err(StoreError::Unavailable("injected".into()));
            }
            self.inner.save_user(user).await
        }
        async fn delete_user(&self, id: &str) -> Result<(), StoreError> {
            self.inner.delete_user(id).await
        }
        async fn save_completion(&self, record: &CompletionRecord) -> Result<(), StoreError> {
            let ms = self.completion_delay_ms.load(Ordering::SeqCst);
            if ms > 0 {
                tokio::time::sleep(Duration::from_millis(ms)).await;
            }
            self.inner.save_completion(record).await
        }
        async fn delete_completion(&self, user_id: &str, quest_id: &str) -> Result<(), StoreError> {
            self.inner.delete_completion(user_id, quest_id).await
        }
        async fn get_completions(&self, user_id: &str) -> Result<Vec<CompletionRecord>, StoreError> {
            self.inner.get_completions(user_id).await
        }
        async fn get_chapters(&self) -> Result<Vec<Chapter>, StoreError> {
            self.inner.get_chapters().await
        }
        async fn save_chapter(&self, chapter: &Chapter) -> Result<(), StoreError> {
            self.inner.save_chapter(chapter).await
        }
        async fn get_quests(&self, chapter_id: Option<&str>) -> Result<Vec<Quest>, StoreError> {
            self.inner.get_quests(chapter_id).await
        }
        async fn get_quest(&self, id: &str) -> Result<Option<Quest>, StoreError> {
            self.inner.get_quest(id).await
        }
        async fn save_quest(&self, quest: &Quest) -> Result<(), StoreError> {
            self.inner.save_quest(quest).await
        }
        async fn delete_quest(&self, id: &str) -> Result<(), StoreError> {
            self.inner.delete_quest(id).await
        }
        async fn get_config(&self) -> Result<Option<SystemConfig>, StoreError> {
            self.inner.get_config().await
        }
        async fn save_config(&self, config: &SystemConfig) -> Result<(), StoreError> {
            self.inner.save_config(config).await
        }
    }

    pub(crate) fn correct_answers(quest: &Quest) -> Vec<Answer> {
        quest
            .questions
            .iter()
            .map(|q| match q {
                Question::MultipleChoice { correct_index, .. } => Answer::Choice(*correct_index),
                Question::TrueFalse { correct_boolean, .. } => Answer::Boolean(*correct_boolean),
            })
            .collect()
    }

    fn wrong_answers(quest: &Quest) -> Vec<Answer> {
        quest
            .questions
            .iter()
            .map(|q| match q {
                Question::MultipleChoice { correct_index, .. } => Answer::Choice(correct_index + 1),
                Question::TrueFalse { correct_boolean, .. } => Answer::Boolean(!correct_boolean),
            })
            .collect()
    }

    fn noon() -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 6, 10, 12, 0, 0).unwrap()
    }

    async fn setup() -> (Arc<FlakyStore>, Ledger<FlakyStore>) {
        let store = Arc::new(FlakyStore::default());
        seed_if_empty(&store.inner).await.unwrap();
        let ledger = Ledger::new(store.clone(), ProgressionEngine::new(EngineConfig::default()), Duration::from_millis(100));
        (store, ledger)
    }

    async fn quest(store: &FlakyStore, id: &str) -> Quest {
        store.get_quest(id).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn passing_attempt_persists_record_and_profile() {
        let (store, ledger) = setup().await;
        let q1 = quest(&store, "q1").await;
        let t = ledger.complete_quest("u3", "q1", &correct_answers(&q1), noon()).await.unwrap();
        assert_eq!(t.xp_awarded, 100);

        let user = store.get_user("u3").await.unwrap().unwrap();
        assert_eq!(user.xp, 100);
        assert_eq!(user.streak, 1);
        let records = store.get_completions("u3").await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].score, 100);
    }

    #[tokio::test]
    async fn failed_user_write_rolls_back_and_retry_rewards() {
        let (store, ledger) = setup().await;
        let q1 = quest(&store, "q1").await;
        store.fail_user_writes.store(true, Ordering::SeqCst);

        let err = ledger.complete_quest("u3", "q1", &correct_answers(&q1), noon()).await.unwrap_err();
        assert!(matches!(err, ServiceError::Persistence(_)));
        assert!(store.get_completions("u3").await.unwrap().is_empty());
        assert_eq!(store.get_user("u3").await.unwrap().unwrap().xp, 0);

        store.fail_user_writes.store(false, Ordering::SeqCst);
        let t = ledger.complete_quest("u3", "q1", &correct_answers(&q1), noon()).await.unwrap();
        assert_eq!(t.xp_awarded, 100);
        assert_eq!(store.get_user("u3").await.unwrap().unwrap().xp, 100);
    }

    #[tokio::test]
    async fn rollback_restores_the_previous_score() {
        let (store, ledger) = setup().await;
        let q1 = quest(&store, "q1").await;
        ledger.complete_quest("u3", "q1", &wrong_answers(&q1), noon()).await.unwrap();

        store.fail_user_writes.store(true, Ordering::SeqCst);
        assert!(ledger.complete_quest("u3", "q1", &correct_answers(&q1), noon()).await.is_err());

        let records = store.get_completions("u3").await.unwrap();
        assert_eq!(records[0].score, 0);
        assert!(records[0].passed_at.is_none());
    }

    #[tokio::test]
    async fn failing_attempt_is_not_an_error() {
        let (store, ledger) = setup().await;
        let q1 = quest(&store, "q1").await;
        store.fail_user_writes.store(true, Ordering::SeqCst);
        let t = ledger.complete_quest("u3", "q1", &wrong_answers(&q1), noon()).await.unwrap();
        assert!(!t.grade.passed);
        assert_eq!(store.get_completions("u3").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn slow_store_times_out() {
        let (store, ledger) = setup().await;
        let q1 = quest(&store, "q1").await;
        store.read_delay_ms.store(500, Ordering::SeqCst);
        let err = ledger.complete_quest("u3", "q1", &correct_answers(&q1), noon()).await.unwrap_err();
        assert!(matches!(err, ServiceError::Persistence(StoreError::Timeout(_))));
    }

    #[tokio::test]
    async fn gated_and_hidden_quests_are_rejected() {
        let (store, ledger) = setup().await;
        let q2 = quest(&store, "q2").await;
        let err = ledger.complete_quest("u3", "q2", &correct_answers(&q2), noon()).await.unwrap_err();
        assert!(matches!(err, ServiceError::Locked(_)));

        let mut draft = quest(&store, "q1").await;
        draft.status = QuestStatus::Draft;
        store.save_quest(&draft).await.unwrap();
        let err = ledger.complete_quest("u3", "q1", &correct_answers(&draft), noon()).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound { .. }));

        let err = ledger.complete_quest("u3", "q1", &[], noon()).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound { .. }));
    }

    #[tokio::test]
    async fn bad_answer_count_is_a_validation_error() {
        let (_store, ledger) = setup().await;
        let err = ledger.complete_quest("u3", "q1", &[Answer::Choice(0)], noon()).await.unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[tokio::test]
    async fn concurrent_attempts_reward_once() {
        let (store, ledger) = setup().await;
        let q1 = quest(&store, "q1").await;
        let answers = correct_answers(&q1);
        let (a, b) = tokio::join!(
            ledger.complete_quest("u3", "q1", &answers, noon()),
            ledger.complete_quest("u3", "q1", &answers, noon()),
        );
        assert_eq!(a.unwrap().xp_awarded + b.unwrap().xp_awarded, 100);
        assert_eq!(store.get_user("u3").await.unwrap().unwrap().xp, 100);
    }

    #[tokio::test]
    async fn finishing_a_chapter_unlocks_the_next() {
        let (store, ledger) = setup().await;
        for id in ["q1", "q2", "q3"] {
            let q = quest(&store, id).await;
            ledger.complete_quest("u3", id, &correct_answers(&q), noon()).await.unwrap();
        }
        let user = store.get_user("u3").await.unwrap().unwrap();
        assert!(user.has_unlocked("ch2"));
        assert!(!user.has_unlocked("ch3"));
        assert_eq!(user.xp, 300);
        assert_eq!(user.streak, 1);
    }

    async fn slow_setup() -> (Arc<FlakyStore>, Ledger<FlakyStore>) {
        let store = Arc::new(FlakyStore::default());
        seed_if_empty(&store.inner).await.unwrap();
        store.completion_delay_ms.store(150, Ordering::SeqCst);
        let ledger = Ledger::new(store.clone(), ProgressionEngine::new(EngineConfig::default()), Duration::from_secs(2));
        (store, ledger)
    }

    #[tokio::test]
    async fn admin_xp_adjustment_waits_for_an_attempt_in_flight() {
        let (store, ledger) = slow_setup().await;
        let q1 = quest(&store, "q1").await;
        let answers = correct_answers(&q1);
        let (attempt, adjusted) = tokio::join!(ledger.complete_quest("u3", "q1", &answers, noon()), async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            crate::accounts::adjust_xp(&ledger, "u1", "u3", 250).await
        });
        assert_eq!(attempt.unwrap().xp_awarded, 100);
        assert_eq!(adjusted.unwrap().xp, 350);
        assert_eq!(store.get_user("u3").await.unwrap().unwrap().xp, 350);
    }

    #[tokio::test]
    async fn deleted_user_is_not_written_back_by_an_attempt_in_flight() {
        let (store, ledger) = slow_setup().await;
        let q1 = quest(&store, "q1").await;
        let answers = correct_answers(&q1);
        let (attempt, deleted) = tokio::join!(ledger.complete_quest("u3", "q1", &answers, noon()), async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            crate::accounts::delete_user(&ledger, "u1", "u3").await
        });
        attempt.unwrap();
        deleted.unwrap();
        assert!(store.get_user("u3").await.unwrap().is_none());
        assert!(store.get_completions("u3").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn lock_entries_are_released_after_use() {
        let (store, ledger) = setup().await;
        for i in 0..20 {
            let err = ledger.complete_quest(&format!("ghost-{}", i), "q1", &[], noon()).await.unwrap_err();
            assert!(matches!(err, ServiceError::NotFound { kind: "user", .. }));
        }
        assert_eq!(ledger.locked_users(), 0);

        let q1 = quest(&store, "q1").await;
        ledger.complete_quest("u3", "q1", &correct_answers(&q1), noon()).await.unwrap();
        assert_eq!(ledger.locked_users(), 0);
    }

    #[tokio::test]
    async fn cancelled_wait_does_not_leak_a_lock_entry() {
        let (_store, ledger) = setup().await;
        let held = ledger.lock_user("u3").await;
        let waited = tokio::time::timeout(Duration::from_millis(20), ledger.lock_user("u3")).await;
        assert!(waited.is_err());
        assert_eq!(ledger.locked_users(), 1);
        drop(held);
        assert_eq!(ledger.locked_users(), 0);
    }

    #[tokio::test]
    async fn resubmitting_after_a_quest_is_retired_opens_the_next_chapter() {
        let (store, ledger) = setup().await;
        for id in ["q1", "q2"] {
            let q = quest(&store, id).await;
            ledger.complete_quest("u3", id, &correct_answers(&q), noon()).await.unwrap();
        }
        let mut q3 = quest(&store, "q3").await;
        q3.status = QuestStatus::Draft;
        store.save_quest(&q3).await.unwrap();

        let q1 = quest(&store, "q1").await;
        let t = ledger.complete_quest("u3", "q1", &correct_answers(&q1), noon()).await.unwrap();
        assert_eq!(t.xp_awarded, 0);
        assert_eq!(t.newly_unlocked, vec!["ch2".to_string()]);
        let user = store.get_user("u3").await.unwrap().unwrap();
        assert!(user.has_unlocked("ch2"));
        assert_eq!(user.xp, 200);
    }
}
