//! Per-thread message controller.
//!
//! Every open thread is a dedicated tokio task (actor) that exclusively owns
//! the in-memory message list. Callers talk to it through a clonable
//! [`ThreadHandle`]; all mutations are serialized on the actor, which
//! appends, re-sorts by timestamp and rewrites the thread's messages file
//! after each one.
//!
//! Agent replies run as separate tasks and post their result back to the
//! actor. The actor keeps running until every handle is dropped *and* no
//! reply is outstanding, so leaving a thread never loses a reply. A
//! [`WeakThreadHandle`] refers to an actor without keeping it alive.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};

use crewchat_shared::{now_millis, ChatId, Sender};
use crewchat_store::{
    sort_by_timestamp, Attachment, ImageStore, Message, SeedLoader, StorageBackend,
};

use crate::agent::Responder;
use crate::error::{ClientError, Result};
use crate::events::{emit_event, ThreadEvent, EVENT_CAPACITY};
use crate::state::{ThreadPhase, ThreadSnapshot};

const COMMAND_CAPACITY: usize = 64;

/// Collaborators injected into every thread actor.
#[derive(Clone)]
pub struct ThreadServices {
    pub storage: Arc<dyn StorageBackend>,
    pub seeder: Arc<SeedLoader>,
    pub responder: Arc<dyn Responder>,
    pub images: ImageStore,
}

// ---------------------------------------------------------------------------
// Command types
// ---------------------------------------------------------------------------

enum ThreadCommand {
    Load {
        reply: oneshot::Sender<usize>,
    },
    SendText {
        text: String,
        reply: oneshot::Sender<Option<SendReceipt>>,
    },
    SendImage {
        attachment: Attachment,
        caption: String,
        reply: oneshot::Sender<SendReceipt>,
    },
    DismissError,
}

/// A finished agent reply on its way back to the actor. `outcome` is
/// `None` when the responder task panicked.
struct AgentReply {
    outcome: Option<Message>,
    done: oneshot::Sender<Message>,
}

/// Outcome of a user send.
#[derive(Debug)]
pub struct SendReceipt {
    /// The message that was appended.
    pub message: Message,
    /// Whether the updated list reached storage. When `false` the message is
    /// still in memory and the thread carries an error notice.
    pub persisted: bool,
    /// Resolves once the agent's reply has been appended.
    pub reply: PendingReply,
}

/// Handle to an in-flight agent reply.
#[derive(Debug)]
pub struct PendingReply {
    rx: oneshot::Receiver<Message>,
}

impl PendingReply {
    /// Wait for the reply to be appended to the thread. `None` if no reply
    /// could be produced or the runtime shut down first.
    pub async fn wait(self) -> Option<Message> {
        self.rx.await.ok()
    }
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Front for one thread's actor.
#[derive(Clone)]
pub struct ThreadHandle {
    chat_id: ChatId,
    cmd_tx: mpsc::Sender<ThreadCommand>,
    state_rx: watch::Receiver<ThreadSnapshot>,
    events_tx: broadcast::Sender<ThreadEvent>,
    images: ImageStore,
}

impl ThreadHandle {
    pub fn chat_id(&self) -> &ChatId {
        &self.chat_id
    }

    /// Populate the thread (seeding the default chat on first open).
    /// A no-op once loaded. Returns the number of messages.
    pub async fn load(&self) -> Result<usize> {
        self.request(|reply| ThreadCommand::Load { reply }).await
    }

    /// Send a text message. Whitespace-only text is ignored (`Ok(None)`).
    pub async fn send_text(&self, text: impl Into<String>) -> Result<Option<SendReceipt>> {
        let text = text.into();
        self.request(|reply| ThreadCommand::SendText { text, reply }).await
    }

    /// Send an already stored image. The caption may be empty.
    pub async fn send_image(
        &self,
        path: impl Into<String>,
        byte_size: u64,
        caption: impl Into<String>,
    ) -> Result<SendReceipt> {
        self.send_attachment(Attachment::new(path, byte_size), caption)
            .await
    }

    pub async fn send_attachment(
        &self,
        attachment: Attachment,
        caption: impl Into<String>,
    ) -> Result<SendReceipt> {
        let caption = caption.into();
        self.request(|reply| ThreadCommand::SendImage {
            attachment,
            caption,
            reply,
        })
        .await
    }

    /// Save a picked image as JPEG and send it.
    ///
    /// If the image cannot be converted or saved, no message is created and
    /// the error is returned so the caller can keep the bytes for a retry.
    pub async fn attach_image(
        &self,
        bytes: &[u8],
        caption: impl Into<String>,
    ) -> Result<SendReceipt> {
        let saved = self.images.save_image(bytes).await?;
        self.send_attachment(saved.into(), caption).await
    }

    /// Clear the outstanding error notice.
    pub async fn dismiss_error(&self) -> Result<()> {
        self.cmd_tx
            .send(ThreadCommand::DismissError)
            .await
            .map_err(|_| ClientError::ThreadClosed)
    }

    /// Latest published state.
    pub fn snapshot(&self) -> ThreadSnapshot {
        self.state_rx.borrow().clone()
    }

    pub fn messages(&self) -> Vec<Message> {
        self.state_rx.borrow().messages.clone()
    }

    /// Watch channel that changes after every state transition.
    pub fn subscribe(&self) -> watch::Receiver<ThreadSnapshot> {
        self.state_rx.clone()
    }

    pub fn events(&self) -> broadcast::Receiver<ThreadEvent> {
        self.events_tx.subscribe()
    }

    /// Whether the actor has exited.
    pub fn is_closed(&self) -> bool {
        self.cmd_tx.is_closed()
    }

    pub fn downgrade(&self) -> WeakThreadHandle {
        WeakThreadHandle {
            chat_id: self.chat_id.clone(),
            cmd_tx: self.cmd_tx.downgrade(),
            state_rx: self.state_rx.clone(),
            events_tx: self.events_tx.clone(),
            images: self.images.clone(),
        }
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> ThreadCommand,
    ) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(make(tx))
            .await
            .map_err(|_| ClientError::ThreadClosed)?;
        rx.await.map_err(|_| ClientError::ThreadClosed)
    }
}

/// Non-owning reference to a thread actor.
#[derive(Clone)]
pub struct WeakThreadHandle {
    chat_id: ChatId,
    cmd_tx: mpsc::WeakSender<ThreadCommand>,
    state_rx: watch::Receiver<ThreadSnapshot>,
    events_tx: broadcast::Sender<ThreadEvent>,
    images: ImageStore,
}

impl WeakThreadHandle {
    /// A full handle, or `None` once every handle has been dropped.
    pub fn upgrade(&self) -> Option<ThreadHandle> {
        Some(ThreadHandle {
            chat_id: self.chat_id.clone(),
            cmd_tx: self.cmd_tx.upgrade()?,
            state_rx: self.state_rx.clone(),
            events_tx: self.events_tx.clone(),
            images: self.images.clone(),
        })
    }

    /// Whether the actor task is still alive. It can outlive its handles
    /// while replies are outstanding.
    pub fn is_running(&self) -> bool {
        self.state_rx.has_changed().is_ok()
    }

    pub fn subscribe(&self) -> watch::Receiver<ThreadSnapshot> {
        self.state_rx.clone()
    }
}

/// Spawn the actor for `chat_id` and return its handle.
///
/// Must be called from within a tokio runtime. At most one actor should
/// exist per chat id; [`crate::CrewChat::open_thread`] enforces that.
pub fn spawn_thread(chat_id: ChatId, services: ThreadServices) -> ThreadHandle {
    spawn_thread_after(chat_id, services, None)
}

/// Like [`spawn_thread`], but the new actor handles no command until the
/// actor behind `previous` (an earlier one for the same chat that is still
/// storing replies) has exited.
pub fn spawn_thread_after(
    chat_id: ChatId,
    services: ThreadServices,
    previous: Option<watch::Receiver<ThreadSnapshot>>,
) -> ThreadHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_CAPACITY);
    let (reply_tx, reply_rx) = mpsc::unbounded_channel();
    let (state_tx, state_rx) = watch::channel(ThreadSnapshot::new(chat_id.clone()));
    let (events_tx, _) = broadcast::channel(EVENT_CAPACITY);

    let images = services.images.clone();
    let actor = ThreadActor {
        chat_id: chat_id.clone(),
        services,
        messages: Vec::new(),
        phase: ThreadPhase::Idle,
        last_stamp: 0,
        replies_in_flight: 0,
        error: None,
        reply_tx,
        state_tx,
        events_tx: events_tx.clone(),
    };

    tokio::spawn(actor.run(cmd_rx, reply_rx, previous));
    debug!(chat = %chat_id, "thread actor spawned");

    ThreadHandle {
        chat_id,
        cmd_tx,
        state_rx,
        events_tx,
        images,
    }
}

// ---------------------------------------------------------------------------
// Actor
// ---------------------------------------------------------------------------

struct ThreadActor {
    chat_id: ChatId,
    services: ThreadServices,
    messages: Vec<Message>,
    phase: ThreadPhase,
    // newest timestamp in the thread; new messages are stamped after it
    last_stamp: i64,
    replies_in_flight: usize,
    error: Option<String>,
    reply_tx: mpsc::UnboundedSender<AgentReply>,
    state_tx: watch::Sender<ThreadSnapshot>,
    events_tx: broadcast::Sender<ThreadEvent>,
}

impl ThreadActor {
    async fn run(
        mut self,
        mut cmd_rx: mpsc::Receiver<ThreadCommand>,
        mut reply_rx: mpsc::UnboundedReceiver<AgentReply>,
        previous: Option<watch::Receiver<ThreadSnapshot>>,
    ) {
        if let Some(mut previous) = previous {
            debug!(chat = %self.chat_id, "waiting for previous thread actor to finish");
            // errors once the previous actor drops its state sender
            while previous.changed().await.is_ok() {}
        }

        let mut handles_open = true;

        loop {
            tokio::select! {
                cmd = cmd_rx.recv(), if handles_open => match cmd {
                    Some(cmd) => self.handle_command(cmd).await,
                    None => handles_open = false,
                },
                Some(reply) = reply_rx.recv() => self.on_agent_reply(reply).await,
            }

            if !handles_open && self.replies_in_flight == 0 {
                break;
            }
        }

        debug!(chat = %self.chat_id, "thread actor stopped");
    }

    async fn handle_command(&mut self, cmd: ThreadCommand) {
        match cmd {
            ThreadCommand::Load { reply } => {
                self.ensure_loaded().await;
                let _ = reply.send(self.messages.len());
            }
            ThreadCommand::SendText { text, reply } => {
                let trimmed = text.trim();
                if trimmed.is_empty() {
                    let _ = reply.send(None);
                    return;
                }
                self.ensure_loaded().await;
                let message = Message::text(trimmed, Sender::User, self.next_stamp());
                let _ = reply.send(Some(self.send_user_message(message).await));
            }
            ThreadCommand::SendImage {
                attachment,
                caption,
                reply,
            } => {
                self.ensure_loaded().await;
                let message = Message::image(caption, attachment, Sender::User, self.next_stamp());
                let _ = reply.send(self.send_user_message(message).await);
            }
            ThreadCommand::DismissError => {
                if self.error.take().is_some() {
                    self.publish();
                }
            }
        }
    }

    /// Load once; later calls (and mutations after the first load) do nothing.
    async fn ensure_loaded(&mut self) {
        if self.phase != ThreadPhase::Idle {
            return;
        }

        self.phase = ThreadPhase::Loading;
        self.publish();

        let mut messages = match self.services.seeder.seed_if_needed(&self.chat_id).await {
            Some(seeded) => seeded,
            None => match self.services.storage.read_messages(&self.chat_id).await {
                Ok(stored) => stored,
                Err(e) if e.is_recoverable() => {
                    warn!(chat = %self.chat_id, error = %e, "messages file unreadable, starting empty");
                    Vec::new()
                }
                Err(e) => {
                    error!(chat = %self.chat_id, error = %e, "failed to load messages, starting empty");
                    Vec::new()
                }
            },
        };
        sort_by_timestamp(&mut messages);
        self.last_stamp = messages.last().map_or(0, |m| m.timestamp).max(self.last_stamp);
        self.messages = messages;
        self.phase = ThreadPhase::Ready;

        info!(chat = %self.chat_id, count = self.messages.len(), "thread loaded");
        self.publish();
        emit_event(
            &self.events_tx,
            ThreadEvent::Loaded {
                chat_id: self.chat_id.clone(),
                count: self.messages.len(),
            },
        );
    }

    async fn send_user_message(&mut self, message: Message) -> SendReceipt {
        let persisted = self.append(message.clone()).await;
        let reply = self.spawn_reply();
        SendReceipt {
            message,
            persisted,
            reply,
        }
    }

    async fn on_agent_reply(&mut self, reply: AgentReply) {
        self.replies_in_flight = self.replies_in_flight.saturating_sub(1);

        let AgentReply { outcome, done } = reply;
        let Some(mut message) = outcome else {
            // dropping `done` resolves the pending reply to None
            self.publish();
            self.emit_typing();
            return;
        };

        // a reply never sorts ahead of the message that triggered it
        message.timestamp = message.timestamp.max(self.last_stamp + 1);
        self.last_stamp = message.timestamp;

        self.append(message.clone()).await;
        self.emit_typing();
        let _ = done.send(message);
    }

    /// Append, re-sort, persist the full list, publish. Returns whether the
    /// write succeeded; the in-memory append is kept either way.
    async fn append(&mut self, message: Message) -> bool {
        debug!(chat = %self.chat_id, id = %message.id, sender = ?message.sender, "appending message");
        self.messages.push(message.clone());
        sort_by_timestamp(&mut self.messages);

        let persisted = match self
            .services
            .storage
            .write_messages(&self.chat_id, &self.messages)
            .await
        {
            Ok(()) => true,
            Err(e) => {
                error!(chat = %self.chat_id, error = %e, "failed to persist messages");
                let notice = format!("Failed to save messages: {e}");
                self.error = Some(notice.clone());
                emit_event(
                    &self.events_tx,
                    ThreadEvent::PersistFailed {
                        chat_id: self.chat_id.clone(),
                        error: notice,
                    },
                );
                false
            }
        };

        self.publish();
        emit_event(
            &self.events_tx,
            ThreadEvent::MessageAppended {
                chat_id: self.chat_id.clone(),
                message,
            },
        );
        persisted
    }

    fn spawn_reply(&mut self) -> PendingReply {
        let (done, rx) = oneshot::channel();
        let responder = self.services.responder.clone();
        let reply_tx = self.reply_tx.clone();

        self.replies_in_flight += 1;
        self.publish();
        self.emit_typing();

        tokio::spawn(async move {
            // inner task, so a panicking responder still reports back
            let outcome = match tokio::spawn(async move { responder.respond().await }).await {
                Ok(message) => Some(message),
                Err(e) => {
                    error!(error = %e, "agent reply task failed");
                    None
                }
            };
            // only fails if the actor is gone, i.e. the runtime is shutting down
            let _ = reply_tx.send(AgentReply { outcome, done });
        });

        PendingReply { rx }
    }

    fn next_stamp(&mut self) -> i64 {
        let stamp = now_millis().max(self.last_stamp + 1);
        self.last_stamp = stamp;
        stamp
    }

    fn publish(&self) {
        self.state_tx.send_replace(ThreadSnapshot {
            chat_id: self.chat_id.clone(),
            phase: self.phase,
            messages: self.messages.clone(),
            replies_in_flight: self.replies_in_flight,
            error: self.error.clone(),
        });
    }

    fn emit_typing(&self) {
        emit_event(
            &self.events_tx,
            ThreadEvent::AgentTyping {
                chat_id: self.chat_id.clone(),
                in_flight: self.replies_in_flight,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use crewchat_store::{Chat, FileStore, SeedSource, SeedStatusStore, StoreError};
    use tempfile::TempDir;

    use crate::agent::SimulatedResponder;

    /// FileStore wrapper that counts writes and can be told to fail them.
    struct ProbeStore {
        inner: FileStore,
        writes: AtomicUsize,
        fail_writes: std::sync::atomic::AtomicBool,
    }

    #[async_trait]
    impl StorageBackend for ProbeStore {
        async fn read_chats(&self) -> crewchat_store::Result<Option<Vec<Chat>>> {
            self.inner.read_chats().await
        }
        async fn write_chats(&self, chats: &[Chat]) -> crewchat_store::Result<()> {
            self.inner.write_chats(chats).await
        }
        async fn read_messages(&self, chat_id: &ChatId) -> crewchat_store::Result<Vec<Message>> {
            self.inner.read_messages(chat_id).await
        }
        async fn write_messages(
            &self,
            chat_id: &ChatId,
            messages: &[Message],
        ) -> crewchat_store::Result<()> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(StoreError::Io(std::io::Error::other("disk full")));
            }
            self.inner.write_messages(chat_id, messages).await
        }
        async fn delete_messages(&self, chat_id: &ChatId) -> crewchat_store::Result<()> {
            self.inner.delete_messages(chat_id).await
        }
        async fn has_messages(&self, chat_id: &ChatId) -> bool {
            self.inner.has_messages(chat_id).await
        }
    }

    struct Fixture {
        store: Arc<ProbeStore>,
        services: ThreadServices,
        _dir: TempDir,
    }

    async fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(ProbeStore {
            inner: FileStore::open_at(dir.path()).await.unwrap(),
            writes: AtomicUsize::new(0),
            fail_writes: Default::default(),
        });
        let seeder = SeedLoader::new(
            store.clone(),
            SeedStatusStore::new(dir.path()),
            SeedSource::Bundled,
        );
        let responder = SimulatedResponder::new()
            .with_delay(Duration::from_millis(5), Duration::from_millis(25));
        let services = ThreadServices {
            storage: store.clone(),
            seeder: Arc::new(seeder),
            responder: Arc::new(responder),
            images: ImageStore::new(dir.path()),
        };
        Fixture {
            store,
            services,
            _dir: dir,
        }
    }

    fn assert_sorted(messages: &[Message]) {
        assert!(messages.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }

    #[tokio::test]
    async fn test_load_seeds_default_chat() {
        let fx = fixture().await;
        let thread = spawn_thread(ChatId::default_chat(), fx.services.clone());
        assert_eq!(thread.snapshot().phase, ThreadPhase::Idle);

        let count = thread.load().await.unwrap();
        assert!(count > 0);
        let snap = thread.snapshot();
        assert_eq!(snap.phase, ThreadPhase::Ready);
        assert_eq!(snap.messages.len(), count);
        assert_sorted(&snap.messages);

        // second load is a no-op
        assert_eq!(thread.load().await.unwrap(), count);
    }

    #[tokio::test]
    async fn test_load_sorts_stored_messages() {
        let fx = fixture().await;
        let chat = ChatId::from("unsorted");
        let stored = vec![
            Message::text("late", Sender::User, 300),
            Message::text("early", Sender::Agent, 100),
            Message::text("middle", Sender::User, 200),
        ];
        fx.store.write_messages(&chat, &stored).await.unwrap();

        let thread = spawn_thread(chat, fx.services.clone());
        thread.load().await.unwrap();
        let bodies: Vec<_> = thread.messages().into_iter().map(|m| m.body).collect();
        assert_eq!(bodies, ["early", "middle", "late"]);
    }

    #[tokio::test]
    async fn test_blank_text_is_ignored() {
        let fx = fixture().await;
        let thread = spawn_thread(ChatId::from("quiet"), fx.services.clone());
        thread.load().await.unwrap();

        for blank in ["", "   ", "\n\t "] {
            assert!(thread.send_text(blank).await.unwrap().is_none());
        }
        assert!(thread.messages().is_empty());
        assert_eq!(fx.store.writes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_send_trims_persists_and_gets_reply() {
        let fx = fixture().await;
        let chat = ChatId::from("chatty");
        let thread = spawn_thread(chat.clone(), fx.services.clone());

        let receipt = thread.send_text("  hi  ").await.unwrap().unwrap();
        assert!(receipt.persisted);
        assert_eq!(receipt.message.body, "hi");
        assert_eq!(receipt.message.sender, Sender::User);
        assert_eq!(thread.snapshot().replies_in_flight, 1);

        let reply = receipt.reply.wait().await.unwrap();
        assert_eq!(reply.sender, Sender::Agent);
        assert!(reply.timestamp > receipt.message.timestamp);

        let snap = thread.snapshot();
        assert_eq!(snap.messages.len(), 2);
        assert!(!snap.is_agent_typing());
        assert_eq!(fx.store.read_messages(&chat).await.unwrap(), snap.messages);
    }

    #[tokio::test]
    async fn test_send_before_load_keeps_history() {
        let fx = fixture().await;
        let chat = ChatId::from("history");
        let old = Message::text("old", Sender::User, 1);
        fx.store.write_messages(&chat, &[old.clone()]).await.unwrap();

        let thread = spawn_thread(chat.clone(), fx.services.clone());
        let receipt = thread.send_text("new").await.unwrap().unwrap();

        let stored = fx.store.read_messages(&chat).await.unwrap();
        assert_eq!(stored[0], old);
        assert_eq!(stored[1], receipt.message);
    }

    #[tokio::test]
    async fn test_rapid_sends_are_strictly_increasing() {
        let fx = fixture().await;
        let thread = spawn_thread(ChatId::from("rapid"), fx.services.clone());
        thread.load().await.unwrap();

        let first = thread.send_text("one").await.unwrap().unwrap();
        let second = thread.send_text("two").await.unwrap().unwrap();
        assert!(second.message.timestamp > first.message.timestamp);

        let (r1, r2) = tokio::join!(first.reply.wait(), second.reply.wait());
        assert!(r1.unwrap().timestamp > first.message.timestamp);
        assert!(r2.unwrap().timestamp > second.message.timestamp);

        let messages = thread.messages();
        assert_eq!(messages.len(), 4);
        assert_sorted(&messages);
    }

    #[tokio::test]
    async fn test_image_send() {
        let fx = fixture().await;
        let thread = spawn_thread(ChatId::from("pics"), fx.services.clone());

        let receipt = thread.send_image("Images/x.jpg", 1234, "").await.unwrap();
        assert!(receipt.message.is_image());
        assert_eq!(receipt.message.body, "");
        let att = receipt.message.attachment.as_ref().unwrap();
        assert_eq!(att.path, "Images/x.jpg");
        assert_eq!(att.byte_size, 1234);
    }

    #[tokio::test]
    async fn test_bad_image_creates_no_message() {
        let fx = fixture().await;
        let thread = spawn_thread(ChatId::from("pics"), fx.services.clone());
        thread.load().await.unwrap();

        let err = thread.attach_image(b"garbage", "caption").await.unwrap_err();
        assert!(matches!(
            err,
            ClientError::Store(StoreError::ImageEncode(_))
        ));
        assert!(thread.messages().is_empty());
        assert_eq!(fx.store.writes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_write_failure_keeps_message_and_sets_error() {
        let fx = fixture().await;
        let thread = spawn_thread(ChatId::from("flaky"), fx.services.clone());
        thread.load().await.unwrap();
        fx.store.fail_writes.store(true, Ordering::SeqCst);

        let receipt = thread.send_text("still here").await.unwrap().unwrap();
        assert!(!receipt.persisted);
        let snap = thread.snapshot();
        assert_eq!(snap.messages.len(), 1);
        assert!(snap.error.as_deref().unwrap().contains("disk full"));

        fx.store.fail_writes.store(false, Ordering::SeqCst);
        thread.dismiss_error().await.unwrap();
        receipt.reply.wait().await.unwrap();

        let snap = thread.snapshot();
        assert!(snap.error.is_none());
        // the reply's write carries the earlier message to disk too
        assert_eq!(fx.store.inner.read_messages(thread.chat_id()).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_reply_survives_dropped_handle() {
        let fx = fixture().await;
        let chat = ChatId::from("leave");
        let thread = spawn_thread(chat.clone(), fx.services.clone());

        let receipt = thread.send_text("bye").await.unwrap().unwrap();
        drop(thread);

        receipt.reply.wait().await.unwrap();
        let stored = fx.store.read_messages(&chat).await.unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[1].sender, Sender::Agent);
    }

    #[tokio::test]
    async fn test_actor_exits_after_last_handle() {
        let fx = fixture().await;
        let thread = spawn_thread(ChatId::from("short"), fx.services.clone());
        let mut state = thread.subscribe();
        thread.load().await.unwrap();
        drop(thread);

        // the watch sender lives in the actor; changed() errors once it stops
        while state.changed().await.is_ok() {}
    }

    #[tokio::test]
    async fn test_events_report_appends() {
        let fx = fixture().await;
        let thread = spawn_thread(ChatId::from("events"), fx.services.clone());
        let mut events = thread.events();

        let receipt = thread.send_text("ping").await.unwrap().unwrap();
        receipt.reply.wait().await.unwrap();

        let mut appended = 0;
        while let Ok(event) = events.try_recv() {
            if let ThreadEvent::MessageAppended { .. } = event {
                appended += 1;
            }
        }
        assert_eq!(appended, 2);
    }

    struct PanickingResponder;

    #[async_trait]
    impl Responder for PanickingResponder {
        async fn respond(&self) -> Message {
            panic!("responder blew up");
        }
    }

    #[tokio::test]
    async fn test_panicking_responder_stops_typing() {
        let mut fx = fixture().await;
        fx.services.responder = Arc::new(PanickingResponder);
        let thread = spawn_thread(ChatId::from("broken"), fx.services.clone());
        let mut state = thread.subscribe();

        let receipt = thread.send_text("anyone?").await.unwrap().unwrap();
        assert!(receipt.reply.wait().await.is_none());

        let snap = thread.snapshot();
        assert!(!snap.is_agent_typing());
        assert_eq!(snap.messages.len(), 1);

        drop(thread);
        while state.changed().await.is_ok() {}
    }

    #[tokio::test]
    async fn test_weak_handle_does_not_keep_actor_alive() {
        let fx = fixture().await;
        let thread = spawn_thread(ChatId::from("weak"), fx.services.clone());
        let weak = thread.downgrade();
        assert!(weak.upgrade().is_some());

        let mut state = weak.subscribe();
        drop(thread);
        while state.changed().await.is_ok() {}

        assert!(weak.upgrade().is_none());
        assert!(!weak.is_running());
    }

    #[tokio::test]
    async fn test_successor_waits_for_pending_reply() {
        let fx = fixture().await;
        let chat = ChatId::from("reopen");
        let thread = spawn_thread(chat.clone(), fx.services.clone());
        let receipt = thread.send_text("brb").await.unwrap().unwrap();
        let previous = thread.subscribe();
        drop(thread);

        let reopened = spawn_thread_after(chat.clone(), fx.services.clone(), Some(previous));
        assert_eq!(reopened.load().await.unwrap(), 2);
        let reply = receipt.reply.wait().await.unwrap();
        assert_eq!(reopened.messages()[1], reply);
    }
}
