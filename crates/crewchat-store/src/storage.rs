//! JSON file storage for chats and per-chat message lists.
//!
//! Every collection lives in its own file inside the data area. Writes go
//! to a temp file in the same directory which is synced and renamed over
//! the target, so a crash leaves either the old or the new content, never
//! a torn file.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use directories::ProjectDirs;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crewchat_shared::constants::{messages_file_name, CHATS_FILE_NAME, IMAGES_DIR_NAME};
use crewchat_shared::ChatId;

use crate::error::{Result, StoreError};
use crate::models::{Chat, Message};

/// Durable key-based storage of the chat list and per-chat messages.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// `None` when no chat list has been written yet.
    async fn read_chats(&self) -> Result<Option<Vec<Chat>>>;

    async fn write_chats(&self, chats: &[Chat]) -> Result<()>;

    /// Empty when the chat has no messages file.
    async fn read_messages(&self, chat_id: &ChatId) -> Result<Vec<Message>>;

    async fn write_messages(&self, chat_id: &ChatId, messages: &[Message]) -> Result<()>;

    /// Removing a file that does not exist succeeds.
    async fn delete_messages(&self, chat_id: &ChatId) -> Result<()>;

    async fn has_messages(&self, chat_id: &ChatId) -> bool;
}

/// [`StorageBackend`] over a directory of pretty-printed JSON files.
#[derive(Debug, Clone)]
pub struct FileStore {
    base_path: PathBuf,
}

impl FileStore {
    /// Open (or create) the default data area.
    ///
    /// - Linux:   `~/.local/share/crewchat/`
    /// - macOS:   `~/Library/Application Support/com.crewchat.crewchat/`
    /// - Windows: `{FOLDERID_RoamingAppData}\crewchat\crewchat\data\`
    pub async fn open_default() -> Result<Self> {
        let project_dirs =
            ProjectDirs::from("com", "crewchat", "crewchat").ok_or(StoreError::NoDataDir)?;
        Self::open_at(project_dirs.data_dir()).await
    }

    /// Open (or create) a data area at an explicit path.
    pub async fn open_at(path: impl AsRef<Path>) -> Result<Self> {
        let base_path = path.as_ref().to_path_buf();
        tokio::fs::create_dir_all(base_path.join(IMAGES_DIR_NAME)).await?;

        info!(path = %base_path.display(), "opening data area");

        Ok(Self { base_path })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn images_dir(&self) -> PathBuf {
        self.base_path.join(IMAGES_DIR_NAME)
    }

    fn chats_path(&self) -> PathBuf {
        self.base_path.join(CHATS_FILE_NAME)
    }

    fn messages_path(&self, chat_id: &ChatId) -> Result<PathBuf> {
        validate_chat_id(chat_id)?;
        Ok(self.base_path.join(messages_file_name(chat_id.as_str())))
    }
}

#[async_trait]
impl StorageBackend for FileStore {
    async fn read_chats(&self) -> Result<Option<Vec<Chat>>> {
        read_json(&self.chats_path()).await
    }

    async fn write_chats(&self, chats: &[Chat]) -> Result<()> {
        write_json(&self.chats_path(), &chats).await?;
        info!(count = chats.len(), "saved chats");
        Ok(())
    }

    async fn read_messages(&self, chat_id: &ChatId) -> Result<Vec<Message>> {
        let path = self.messages_path(chat_id)?;
        match read_json::<Vec<Message>>(&path).await? {
            Some(messages) => {
                debug!(chat = %chat_id, count = messages.len(), "loaded messages");
                Ok(messages)
            }
            None => {
                debug!(chat = %chat_id, "no messages file");
                Ok(Vec::new())
            }
        }
    }

    async fn write_messages(&self, chat_id: &ChatId, messages: &[Message]) -> Result<()> {
        let path = self.messages_path(chat_id)?;
        write_json(&path, &messages).await?;
        info!(chat = %chat_id, count = messages.len(), "saved messages");
        Ok(())
    }

    async fn delete_messages(&self, chat_id: &ChatId) -> Result<()> {
        let path = self.messages_path(chat_id)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                info!(chat = %chat_id, "deleted messages");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn has_messages(&self, chat_id: &ChatId) -> bool {
        match self.messages_path(chat_id) {
            Ok(path) => tokio::fs::try_exists(&path).await.unwrap_or(false),
            Err(_) => false,
        }
    }
}

/// Reject ids that are unsafe as file name components.
pub fn validate_chat_id(chat_id: &ChatId) -> Result<()> {
    let id = chat_id.as_str();
    if id.is_empty() {
        return Err(StoreError::InvalidId("chat id cannot be empty".to_string()));
    }
    if id.contains('/') || id.contains('\\') || id.contains("..") {
        return Err(StoreError::InvalidId(format!(
            "chat id contains path characters: {id:?}"
        )));
    }
    if id.chars().any(|c| c.is_control()) {
        return Err(StoreError::InvalidId(format!(
            "chat id contains control characters: {id:?}"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// File helpers
// ---------------------------------------------------------------------------

/// Read and decode a JSON file. A missing file is `Ok(None)`.
pub(crate) async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|source| StoreError::Decode {
            path: path.to_path_buf(),
            source,
        })
}

pub(crate) async fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let content = serde_json::to_vec_pretty(value)?;
    write_atomic(path, &content).await?;
    Ok(())
}

/// Replace `path` with `data` via temp file + rename. On failure the temp
/// file is removed and the previous content is left as it was.
pub(crate) async fn write_atomic(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("data");
    let tmp_path = dir.join(format!(".{}.{}.tmp", file_name, uuid::Uuid::new_v4().simple()));

    let write_result = async {
        let mut file = tokio::fs::File::create(&tmp_path).await?;
        file.write_all(data).await?;
        file.flush().await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&tmp_path, path).await
    }
    .await;

    if let Err(e) = write_result {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(e);
    }
    Ok(())
}
