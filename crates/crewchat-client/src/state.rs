//! Observable state of an open thread.
//!
//! Each thread actor publishes a [`ThreadSnapshot`] through a
//! `tokio::sync::watch` channel after every change. Renderers either poll
//! the latest value or await changes; the core never depends on how it is
//! drawn.

use serde::Serialize;

use crewchat_shared::ChatId;
use crewchat_store::Message;

/// Lifecycle of an opened thread.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ThreadPhase {
    /// Opened, nothing loaded yet.
    Idle,
    Loading,
    /// Messages loaded; stays here across sends and replies.
    Ready,
}

/// Point-in-time view of one thread.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ThreadSnapshot {
    pub chat_id: ChatId,
    pub phase: ThreadPhase,
    /// Sorted ascending by timestamp.
    pub messages: Vec<Message>,
    /// Agent replies currently being "typed".
    pub replies_in_flight: usize,
    /// The single outstanding error notice, if any.
    pub error: Option<String>,
}

impl ThreadSnapshot {
    pub fn new(chat_id: ChatId) -> Self {
        Self {
            chat_id,
            phase: ThreadPhase::Idle,
            messages: Vec::new(),
            replies_in_flight: 0,
            error: None,
        }
    }

    pub fn is_loading(&self) -> bool {
        self.phase == ThreadPhase::Loading
    }

    pub fn is_agent_typing(&self) -> bool {
        self.replies_in_flight > 0
    }
}
