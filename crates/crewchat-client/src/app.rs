//! Application context shared by every screen.
//!
//! [`CrewChat`] owns the storage backend, the seed loader, the image store
//! and the responder, and hands out one [`ThreadHandle`] per chat. Opening
//! the same chat twice returns the same running controller. Only weak
//! references are kept, so a controller stops once its callers drop their
//! handles and its replies are stored.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::info;

use crewchat_shared::constants::APP_NAME;
use crewchat_shared::ChatId;
use crewchat_store::{
    Chat, FileStore, ImageStore, SeedLoader, SeedStatusStore, StorageBackend,
};

use crate::agent::{Responder, SimulatedResponder};
use crate::config::ClientConfig;
use crate::error::Result;
use crate::registry::ChatRegistry;
use crate::thread::{spawn_thread_after, ThreadHandle, ThreadServices, WeakThreadHandle};

pub struct CrewChat {
    store: Arc<FileStore>,
    registry: ChatRegistry,
    services: ThreadServices,
    threads: Mutex<HashMap<ChatId, WeakThreadHandle>>,
}

impl CrewChat {
    /// Open the data area from `config` with the simulated agent.
    pub async fn open(config: ClientConfig) -> Result<Self> {
        let responder = SimulatedResponder::new()
            .with_delay(config.reply_delay_min, config.reply_delay_max);
        Self::open_with_responder(config, Arc::new(responder)).await
    }

    pub async fn open_with_responder(
        config: ClientConfig,
        responder: Arc<dyn Responder>,
    ) -> Result<Self> {
        let store = match &config.data_dir {
            Some(dir) => FileStore::open_at(dir).await?,
            None => FileStore::open_default().await?,
        };
        let store = Arc::new(store);
        let storage: Arc<dyn StorageBackend> = store.clone();

        let seeder = SeedLoader::new(
            storage.clone(),
            SeedStatusStore::new(store.base_path()),
            config.seed_source(),
        );
        let images = ImageStore::new(store.base_path()).with_jpeg_quality(config.jpeg_quality);

        info!(app = APP_NAME, data_dir = %store.base_path().display(), "data area ready");

        Ok(Self {
            registry: ChatRegistry::new(storage.clone()),
            services: ThreadServices {
                storage,
                seeder: Arc::new(seeder),
                responder,
                images,
            },
            store,
            threads: Mutex::new(HashMap::new()),
        })
    }

    pub fn registry(&self) -> &ChatRegistry {
        &self.registry
    }

    /// The chat list, creating the default chat on first launch.
    pub async fn chats(&self) -> Vec<Chat> {
        self.registry.load_or_create_default().await
    }

    pub async fn create_chat(&self, label: impl Into<String>) -> Result<Chat> {
        self.registry.create(label).await
    }

    /// Controller for `chat_id`, spawning it if none is running.
    ///
    /// If the previous controller has lost its handles but is still storing
    /// replies, the new one loads only after it has finished.
    pub fn open_thread(&self, chat_id: &ChatId) -> ThreadHandle {
        let mut threads = self.threads.lock().unwrap_or_else(PoisonError::into_inner);
        threads.retain(|_, weak| weak.is_running());

        let previous = match threads.get(chat_id) {
            Some(weak) => match weak.upgrade() {
                Some(handle) => return handle,
                None => Some(weak.subscribe()),
            },
            None => None,
        };

        let handle = spawn_thread_after(chat_id.clone(), self.services.clone(), previous);
        threads.insert(chat_id.clone(), handle.downgrade());
        handle
    }

    /// Number of controllers still running.
    pub fn running_threads(&self) -> usize {
        let threads = self.threads.lock().unwrap_or_else(PoisonError::into_inner);
        threads.values().filter(|weak| weak.is_running()).count()
    }

    pub fn images(&self) -> &ImageStore {
        &self.services.images
    }

    pub fn seeder(&self) -> &SeedLoader {
        &self.services.seeder
    }

    pub fn data_dir(&self) -> &Path {
        self.store.base_path()
    }
}
