//! First-run seeding of the default chat with a bundled example conversation.
//!
//! Seeding is gated by a per-chat flag persisted in `seed_status.json`, so
//! the example messages are injected at most once per data area. Only the
//! default chat is eligible, and a chat that already has a messages file is
//! never overwritten, even when the flag is lost.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crewchat_shared::constants::SEED_STATUS_FILE_NAME;
use crewchat_shared::ChatId;

use crate::error::Result;
use crate::models::Message;
use crate::storage::{read_json, write_json, StorageBackend};

const BUNDLED_SEED: &str = include_str!("../assets/seed_messages.json");

/// Where the example conversation comes from.
#[derive(Debug, Clone, Default)]
pub enum SeedSource {
    /// The set compiled into the binary.
    #[default]
    Bundled,
    /// A JSON file on disk, same shape as a messages file.
    File(PathBuf),
    /// Raw JSON text.
    Inline(String),
}

impl SeedSource {
    /// Load the seed set. Missing or corrupt data yields an empty set.
    async fn load(&self) -> Vec<Message> {
        let raw = match self {
            SeedSource::Bundled => BUNDLED_SEED.to_string(),
            SeedSource::Inline(json) => json.clone(),
            SeedSource::File(path) => match tokio::fs::read_to_string(path).await {
                Ok(raw) => raw,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "seed file unreadable, seeding nothing");
                    return Vec::new();
                }
            },
        };

        match serde_json::from_str(&raw) {
            Ok(messages) => messages,
            Err(e) => {
                warn!(error = %e, "seed data corrupt, seeding nothing");
                Vec::new()
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Seed status
// ---------------------------------------------------------------------------

/// Persisted `{chat id: seeded}` flags.
#[derive(Debug)]
pub struct SeedStatusStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl SeedStatusStore {
    pub fn new(base_path: &Path) -> Self {
        Self {
            path: base_path.join(SEED_STATUS_FILE_NAME),
            lock: Mutex::new(()),
        }
    }

    pub async fn is_seeded(&self, chat_id: &ChatId) -> bool {
        let _guard = self.lock.lock().await;
        self.load_flags()
            .await
            .get(chat_id.as_str())
            .copied()
            .unwrap_or(false)
    }

    pub async fn mark_seeded(&self, chat_id: &ChatId) -> Result<()> {
        self.set(chat_id, true).await
    }

    pub async fn clear(&self, chat_id: &ChatId) -> Result<()> {
        self.set(chat_id, false).await
    }

    async fn set(&self, chat_id: &ChatId, seeded: bool) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut flags = self.load_flags().await;
        if seeded {
            flags.insert(chat_id.to_string(), true);
        } else {
            flags.remove(chat_id.as_str());
        }
        write_json(&self.path, &flags).await
    }

    async fn load_flags(&self) -> BTreeMap<String, bool> {
        match read_json(&self.path).await {
            Ok(flags) => flags.unwrap_or_default(),
            Err(e) => {
                warn!(error = %e, "seed status unreadable, treating every chat as unseeded");
                BTreeMap::new()
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Seed loader
// ---------------------------------------------------------------------------

pub struct SeedLoader {
    storage: Arc<dyn StorageBackend>,
    status: SeedStatusStore,
    source: SeedSource,
    lock: Mutex<()>,
}

impl SeedLoader {
    pub fn new(storage: Arc<dyn StorageBackend>, status: SeedStatusStore, source: SeedSource) -> Self {
        Self {
            storage,
            status,
            source,
            lock: Mutex::new(()),
        }
    }

    /// Seed `chat_id` if it is the default chat and has not been seeded yet.
    ///
    /// Returns the persisted seed set on the seeding call and `None` on every
    /// other call. A failed write leaves the flag unset so a later open
    /// retries. If the chat already has stored messages the flag is
    /// restored and nothing is written.
    pub async fn seed_if_needed(&self, chat_id: &ChatId) -> Option<Vec<Message>> {
        if !chat_id.is_default() {
            return None;
        }

        let _guard = self.lock.lock().await;

        if self.status.is_seeded(chat_id).await {
            debug!(chat = %chat_id, "seed data already loaded, skipping");
            return None;
        }

        if self.storage.has_messages(chat_id).await {
            warn!(chat = %chat_id, "seed flag missing but chat has history, not seeding");
            if let Err(e) = self.status.mark_seeded(chat_id).await {
                error!(chat = %chat_id, error = %e, "failed to record seed status");
            }
            return None;
        }

        let messages = self.source.load().await;

        if let Err(e) = self.storage.write_messages(chat_id, &messages).await {
            error!(chat = %chat_id, error = %e, "failed to save seed messages");
            return None;
        }

        if let Err(e) = self.status.mark_seeded(chat_id).await {
            error!(chat = %chat_id, error = %e, "failed to record seed status");
        }

        info!(chat = %chat_id, count = messages.len(), "seeded chat");
        Some(messages)
    }

    /// Drop `chat_id`'s stored messages and its flag so the next
    /// [`seed_if_needed`](Self::seed_if_needed) seeds it again.
    pub async fn reset(&self, chat_id: &ChatId) -> Result<()> {
        let _guard = self.lock.lock().await;
        self.storage.delete_messages(chat_id).await?;
        self.status.clear(chat_id).await?;
        info!(chat = %chat_id, "seed status reset");
        Ok(())
    }

    pub fn status(&self) -> &SeedStatusStore {
        &self.status
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::models::{sort_by_timestamp, Chat};
    use crate::storage::FileStore;
    use async_trait::async_trait;
    use crewchat_shared::Sender;
    use tempfile::TempDir;

    async fn test_loader(source: SeedSource) -> (SeedLoader, Arc<FileStore>, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(FileStore::open_at(dir.path()).await.unwrap());
        let loader = SeedLoader::new(store.clone(), SeedStatusStore::new(dir.path()), source);
        (loader, store, dir)
    }

    struct ReadOnlyStore;

    #[async_trait]
    impl StorageBackend for ReadOnlyStore {
        async fn read_chats(&self) -> Result<Option<Vec<Chat>>> {
            Ok(None)
        }
        async fn write_chats(&self, _chats: &[Chat]) -> Result<()> {
            Err(StoreError::Io(std::io::Error::other("read-only")))
        }
        async fn read_messages(&self, _chat_id: &ChatId) -> Result<Vec<Message>> {
            Ok(Vec::new())
        }
        async fn write_messages(&self, _chat_id: &ChatId, _messages: &[Message]) -> Result<()> {
            Err(StoreError::Io(std::io::Error::other("read-only")))
        }
        async fn delete_messages(&self, _chat_id: &ChatId) -> Result<()> {
            Ok(())
        }
        async fn has_messages(&self, _chat_id: &ChatId) -> bool {
            false
        }
    }

    #[test]
    fn bundled_seed_is_valid_and_sorted() {
        let messages: Vec<Message> = serde_json::from_str(BUNDLED_SEED).unwrap();
        assert!(!messages.is_empty());
        assert!(messages.iter().any(|m| m.is_image()));
        assert!(messages
            .iter()
            .all(|m| m.is_image() == m.attachment.is_some()));

        let mut sorted = messages.clone();
        sort_by_timestamp(&mut sorted);
        assert_eq!(sorted, messages);
    }

    #[tokio::test]
    async fn test_default_chat_seeded_once() {
        let (loader, store, _dir) = test_loader(SeedSource::Bundled).await;
        let chat = ChatId::default_chat();

        let first = loader.seed_if_needed(&chat).await.expect("first call seeds");
        assert!(!first.is_empty());
        assert_eq!(store.read_messages(&chat).await.unwrap(), first);
        assert!(loader.status().is_seeded(&chat).await);

        assert!(loader.seed_if_needed(&chat).await.is_none());
        assert!(loader.seed_if_needed(&chat).await.is_none());
    }

    #[tokio::test]
    async fn test_flag_survives_restart() {
        let (loader, store, dir) = test_loader(SeedSource::Bundled).await;
        let chat = ChatId::default_chat();
        assert!(loader.seed_if_needed(&chat).await.is_some());

        let again = SeedLoader::new(store, SeedStatusStore::new(dir.path()), SeedSource::Bundled);
        assert!(again.seed_if_needed(&chat).await.is_none());
    }

    #[tokio::test]
    async fn test_other_chats_never_seeded() {
        let (loader, store, dir) = test_loader(SeedSource::Bundled).await;
        let chat = ChatId::from("weekend-in-goa");

        assert!(loader.seed_if_needed(&chat).await.is_none());
        assert!(loader.seed_if_needed(&chat).await.is_none());
        assert!(!store.has_messages(&chat).await);
        assert!(!dir.path().join(SEED_STATUS_FILE_NAME).exists());
    }

    #[tokio::test]
    async fn test_corrupt_seed_yields_empty_set() {
        let (loader, store, _dir) = test_loader(SeedSource::Inline("{oops".into())).await;
        let chat = ChatId::default_chat();

        assert_eq!(loader.seed_if_needed(&chat).await, Some(Vec::new()));
        assert!(store.read_messages(&chat).await.unwrap().is_empty());
        assert!(loader.seed_if_needed(&chat).await.is_none());
    }

    #[tokio::test]
    async fn test_missing_seed_file_yields_empty_set() {
        let (loader, _store, dir) =
            test_loader(SeedSource::File(PathBuf::from("/definitely/not/here.json"))).await;
        let chat = ChatId::default_chat();

        assert_eq!(loader.seed_if_needed(&chat).await, Some(Vec::new()));
        assert!(SeedStatusStore::new(dir.path()).is_seeded(&chat).await);
    }

    #[tokio::test]
    async fn test_failed_write_leaves_flag_unset() {
        let dir = TempDir::new().unwrap();
        let loader = SeedLoader::new(
            Arc::new(ReadOnlyStore),
            SeedStatusStore::new(dir.path()),
            SeedSource::Bundled,
        );
        let chat = ChatId::default_chat();

        assert!(loader.seed_if_needed(&chat).await.is_none());
        assert!(!loader.status().is_seeded(&chat).await);
    }

    #[tokio::test]
    async fn test_concurrent_calls_seed_once() {
        let (loader, _store, _dir) = test_loader(SeedSource::Bundled).await;
        let chat = ChatId::default_chat();

        let (a, b) = tokio::join!(loader.seed_if_needed(&chat), loader.seed_if_needed(&chat));
        assert_eq!(a.is_some() as u8 + b.is_some() as u8, 1);
    }

    #[tokio::test]
    async fn test_corrupt_status_keeps_history() {
        let (loader, store, dir) = test_loader(SeedSource::Bundled).await;
        let chat = ChatId::default_chat();
        let mut history = loader.seed_if_needed(&chat).await.unwrap();
        history.push(Message::text("my note", Sender::User, i64::MAX));
        store.write_messages(&chat, &history).await.unwrap();

        std::fs::write(dir.path().join(SEED_STATUS_FILE_NAME), "{garbage").unwrap();

        let reopened = SeedLoader::new(store.clone(), SeedStatusStore::new(dir.path()), SeedSource::Bundled);
        assert!(reopened.seed_if_needed(&chat).await.is_none());
        assert_eq!(store.read_messages(&chat).await.unwrap(), history);
        // the flag is written back
        assert!(reopened.status().is_seeded(&chat).await);
    }

    #[tokio::test]
    async fn test_unrecorded_flag_does_not_reseed() {
        let (loader, store, dir) = test_loader(SeedSource::Bundled).await;
        let chat = ChatId::default_chat();
        // a directory in place of the status file makes every flag write fail
        std::fs::create_dir(dir.path().join(SEED_STATUS_FILE_NAME)).unwrap();

        let seeded = loader.seed_if_needed(&chat).await.unwrap();
        assert!(!loader.status().is_seeded(&chat).await);

        let mut history = seeded;
        history.push(Message::text("kept", Sender::User, i64::MAX));
        store.write_messages(&chat, &history).await.unwrap();

        assert!(loader.seed_if_needed(&chat).await.is_none());
        assert_eq!(store.read_messages(&chat).await.unwrap(), history);
    }

    #[tokio::test]
    async fn test_reset_allows_reseed() {
        let (loader, store, _dir) = test_loader(SeedSource::Bundled).await;
        let chat = ChatId::default_chat();

        assert!(loader.seed_if_needed(&chat).await.is_some());
        loader.reset(&chat).await.unwrap();
        assert!(!store.has_messages(&chat).await);
        assert!(loader.seed_if_needed(&chat).await.is_some());
    }
}
