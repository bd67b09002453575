//! Chat list management.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crewchat_shared::constants::DEFAULT_CHAT_LABEL;
use crewchat_shared::ChatId;
use crewchat_store::{Chat, StorageBackend};

use crate::error::Result;

/// Loads, creates and persists the list of conversation threads.
pub struct ChatRegistry {
    storage: Arc<dyn StorageBackend>,
    // serializes read-modify-write of chats.json
    lock: Mutex<()>,
}

impl ChatRegistry {
    pub fn new(storage: Arc<dyn StorageBackend>) -> Self {
        Self {
            storage,
            lock: Mutex::new(()),
        }
    }

    /// Persisted chats, or a freshly persisted default chat when there are
    /// none.
    pub async fn load_or_create_default(&self) -> Vec<Chat> {
        let _guard = self.lock.lock().await;

        if let Some(chats) = self.load().await.filter(|c| !c.is_empty()) {
            return chats;
        }

        let default_chat = Chat::new(ChatId::default_chat(), DEFAULT_CHAT_LABEL);
        let chats = vec![default_chat];
        match self.storage.write_chats(&chats).await {
            Ok(()) => info!(chat = %chats[0].id, "created default chat"),
            Err(e) => error!(error = %e, "failed to save default chat"),
        }
        chats
    }

    /// Append a new chat with a fresh id and persist the whole list.
    pub async fn create(&self, label: impl Into<String>) -> Result<Chat> {
        let _guard = self.lock.lock().await;

        let mut chats = self.load().await.unwrap_or_default();
        let chat = Chat::new(ChatId::generate(), label);
        chats.push(chat.clone());

        self.storage.write_chats(&chats).await?;
        info!(chat = %chat.id, label = %chat.label, "created chat");
        Ok(chat)
    }

    /// Persisted chats without creating anything.
    pub async fn list(&self) -> Vec<Chat> {
        let _guard = self.lock.lock().await;
        self.load().await.unwrap_or_default()
    }

    async fn load(&self) -> Option<Vec<Chat>> {
        match self.storage.read_chats().await {
            Ok(chats) => chats,
            Err(e) => {
                warn!(error = %e, "failed to load chats");
                None
            }
        }
    }
}
