//! Change notifications broadcast by thread actors.

use serde::Serialize;
use tokio::sync::broadcast;

use crewchat_shared::ChatId;
use crewchat_store::Message;

/// Buffered events per subscriber before the slowest one starts lagging.
pub const EVENT_CAPACITY: usize = 64;

/// Change notifications published by a thread actor.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum ThreadEvent {
    #[serde(rename_all = "camelCase")]
    Loaded { chat_id: ChatId, count: usize },

    #[serde(rename_all = "camelCase")]
    MessageAppended { chat_id: ChatId, message: Message },

    #[serde(rename_all = "camelCase")]
    AgentTyping { chat_id: ChatId, in_flight: usize },

    #[serde(rename_all = "camelCase")]
    PersistFailed { chat_id: ChatId, error: String },
}

pub(crate) fn emit_event(tx: &broadcast::Sender<ThreadEvent>, event: ThreadEvent) {
    // Err only means nobody is subscribed right now
    if tx.send(event).is_err() {
        tracing::trace!("thread event dropped, no subscribers");
    }
}
