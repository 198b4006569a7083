//! Persistence: the `Store` trait the service talks to, and `DocumentStore`,
//! an in-memory document collection set with an optional JSON snapshot file.
//!
//! Collections mirror a document database: `users`, `chapters`, `quests`,
//! `progress` (keyed `{userId}_{questId}`, upsert semantics) and a singleton
//! `system_config`. Every write either lands completely (memory + snapshot)
//! or not at all.

use std::{collections::HashMap, future::Future, path::PathBuf, sync::Arc, time::Duration};

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, instrument};

use crate::domain::{Chapter, CompletionRecord, Quest, SystemConfig, User};
use crate::error::StoreError;

/// Document-store operations consumed by the service.
pub trait Store: Send + Sync {
    fn get_user(&self, id: &str) -> impl Future<Output = Result<Option<User>, StoreError>> + Send;
    fn find_user_by_credential(&self, credential: &str) -> impl Future<Output = Result<Option<User>, StoreError>> + Send;
    fn list_users(&self) -> impl Future<Output = Result<Vec<User>, StoreError>> + Send;
    /// Full-document upsert keyed by `user.id`.
    fn save_user(&self, user: &User) -> impl Future<Output = Result<(), StoreError>> + Send;
    /// Removes the user and every completion record they own.
    fn delete_user(&self, id: &str) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Upsert keyed by `(user_id, quest_id)`.
    fn save_completion(&self, record: &CompletionRecord) -> impl Future<Output = Result<(), StoreError>> + Send;
    fn delete_completion(&self, user_id: &str, quest_id: &str) -> impl Future<Output = Result<(), StoreError>> + Send;
    fn get_completions(&self, user_id: &str) -> impl Future<Output = Result<Vec<CompletionRecord>, StoreError>> + Send;

    /// Chapters sorted by `order`.
    fn get_chapters(&self) -> impl Future<Output = Result<Vec<Chapter>, StoreError>> + Send;
    fn save_chapter(&self, chapter: &Chapter) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Quests sorted by chapter then `order`, optionally restricted to one chapter.
    fn get_quests(&self, chapter_id: Option<&str>) -> impl Future<Output = Result<Vec<Quest>, StoreError>> + Send;
    fn get_quest(&self, id: &str) -> impl Future<Output = Result<Option<Quest>, StoreError>> + Send;
    fn save_quest(&self, quest: &Quest) -> impl Future<Output = Result<(), StoreError>> + Send;
    fn delete_quest(&self, id: &str) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn get_config(&self) -> impl Future<Output = Result<Option<SystemConfig>, StoreError>> + Send;
    fn save_config(&self, config: &SystemConfig) -> impl Future<Output = Result<(), StoreError>> + Send;
}

/// Run a store call under a fixed timeout; elapsing is a persistence failure.
pub async fn guarded<T>(
    timeout: Duration,
    call: impl Future<Output = Result<T, StoreError>>,
) -> Result<T, StoreError> {
    match tokio::time::timeout(timeout, call).await {
        Ok(res) => res,
        Err(_) => Err(StoreError::Timeout(timeout)),
    }
}

fn progress_key(user_id: &str, quest_id: &str) -> String {
    format!("{}_{}", user_id, quest_id)
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct Collections {
    #[serde(default)] users: HashMap<String, User>,
    #[serde(default)] chapters: HashMap<String, Chapter>,
    #[serde(default)] quests: HashMap<String, Quest>,
    #[serde(default)] progress: HashMap<String, CompletionRecord>,
    #[serde(default)] system_config: Option<SystemConfig>,
}

#[derive(Clone, Default)]
pub struct DocumentStore {
    docs: Arc<RwLock<Collections>>,
    snapshot: Option<PathBuf>,
}

impl DocumentStore {
    /// Purely in-memory store.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Open a store backed by a JSON snapshot. A missing file starts empty.
    #[instrument(level = "info")]
    pub async fn open(path: PathBuf) -> Result<Self, StoreError> {
        let docs = match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let docs: Collections = serde_json::from_slice(&bytes)?;
                info!(
                    target: "store",
                    path = %path.display(),
                    users = docs.users.len(),
                    quests = docs.quests.len(),
                    progress = docs.progress.len(),
                    "Loaded store snapshot"
                );
                docs
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(target: "store", path = %path.display(), "No snapshot yet; starting empty");
                Collections::default()
            }
            Err(e) => return Err(e.into()),
        };
        Ok(Self { docs: Arc::new(RwLock::new(docs)), snapshot: Some(path) })
    }

    /// True when no user, chapter or quest exists yet (first run).
    pub async fn is_empty(&self) -> bool {
        let docs = self.docs.read().await;
        docs.users.is_empty() && docs.chapters.is_empty() && docs.quests.is_empty()
    }

    /// Apply `change` to a copy, persist the copy, then publish it.
    async fn mutate<R>(&self, change: impl FnOnce(&mut Collections) -> R) -> Result<R, StoreError> {
        let mut docs = self.docs.write().await;
        let Some(path) = &self.snapshot else {
            return Ok(change(&mut docs));
        };

        let mut next = docs.clone();
        let out = change(&mut next);
        let bytes = serde_json::to_vec_pretty(&next)?;
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, path).await?;
        debug!(target: "store", path = %path.display(), bytes = bytes.len(), "Snapshot written");
        *docs = next;
        Ok(out)
    }
}

impl Store for DocumentStore {
    async fn get_user(&self, id: &str) -> Result<Option<User>, StoreError> {
        Ok(self.docs.read().await.users.get(id).cloned())
    }

    async fn find_user_by_credential(&self, credential: &str) -> Result<Option<User>, StoreError> {
        let docs = self.docs.read().await;
        Ok(docs.users.values().find(|u| u.credential_id == credential).cloned())
    }

    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        let mut users: Vec<User> = self.docs.read().await.users.values().cloned().collect();
        users.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(users)
    }

    async fn save_user(&self, user: &User) -> Result<(), StoreError> {
        let user = user.clone();
        self.mutate(move |d| {
            d.users.insert(user.id.clone(), user);
        })
        .await
    }

    async fn delete_user(&self, id: &str) -> Result<(), StoreError> {
        self.mutate(|d| {
            d.users.remove(id);
            d.progress.retain(|_, r| r.user_id != id);
        })
        .await
    }

    async fn save_completion(&self, record: &CompletionRecord) -> Result<(), StoreError> {
        let record = record.clone();
        self.mutate(move |d| {
            d.progress.insert(progress_key(&record.user_id, &record.quest_id), record);
        })
        .await
    }

    async fn delete_completion(&self, user_id: &str, quest_id: &str) -> Result<(), StoreError> {
        let key = progress_key(user_id, quest_id);
        self.mutate(move |d| {
            d.progress.remove(&key);
        })
        .await
    }

    async fn get_completions(&self, user_id: &str) -> Result<Vec<CompletionRecord>, StoreError> {
        let docs = self.docs.read().await;
        let mut out: Vec<CompletionRecord> = docs.progress.values().filter(|r| r.user_id == user_id).cloned().collect();
        out.sort_by(|a, b| a.completed_at.cmp(&b.completed_at));
        Ok(out)
    }

    async fn get_chapters(&self) -> Result<Vec<Chapter>, StoreError> {
        let mut out: Vec<Chapter> = self.docs.read().await.chapters.values().cloned().collect();
        out.sort_by_key(|c| c.order);
        Ok(out)
    }

    async fn save_chapter(&self, chapter: &Chapter) -> Result<(), StoreError> {
        let chapter = chapter.clone();
        self.mutate(move |d| {
            d.chapters.insert(chapter.id.clone(), chapter);
        })
        .await
    }

    async fn get_quests(&self, chapter_id: Option<&str>) -> Result<Vec<Quest>, StoreError> {
        let docs = self.docs.read().await;
        let mut out: Vec<Quest> = docs
            .quests
            .values()
            .filter(|q| chapter_id.map_or(true, |c| q.chapter_id == c))
            .cloned()
            .collect();
        out.sort_by(|a, b| (a.chapter_id.as_str(), a.order).cmp(&(b.chapter_id.as_str(), b.order)));
        Ok(out)
    }

    async fn get_quest(&self, id: &str) -> Result<Option<Quest>, StoreError> {
        Ok(self.docs.read().await.quests.get(id).cloned())
    }

    async fn save_quest(&self, quest: &Quest) -> Result<(), StoreError> {
        let quest = quest.clone();
        self.mutate(move |d| {
            d.quests.insert(quest.id.clone(), quest);
        })
        .await
    }

    async fn delete_quest(&self, id: &str) -> Result<(), StoreError> {
        self.mutate(|d| {
            d.quests.remove(id);
        })
        .await
    }

    async fn get_config(&self) -> Result<Option<SystemConfig>, StoreError> {
        Ok(self.docs.read().await.system_config.clone())
    }

    async fn save_config(&self, config: &SystemConfig) -> Result<(), StoreError> {
        let config = config.clone();
        self.mutate(move |d| {
            d.system_config = Some(config);
        })
        .await
    }
}
