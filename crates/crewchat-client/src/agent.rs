//! Simulated remote agent.
//!
//! There is no real counterpart: replies are canned strings delivered after
//! a random delay so the conversation feels live.

use std::time::Duration;

use async_trait::async_trait;
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::debug;

use crewchat_shared::constants::{REPLY_DELAY_MAX_MS, REPLY_DELAY_MIN_MS};
use crewchat_shared::{now_millis, Sender};
use crewchat_store::Message;

/// Produces the agent's reply to a user message.
#[async_trait]
pub trait Responder: Send + Sync {
    /// Always yields a message; there is no failure path.
    async fn respond(&self) -> Message;
}

pub const CANNED_RESPONSES: [&str; 20] = [
    "Thanks for reaching out! How can I help you today?",
    "I understand. Let me look into that for you.",
    "That's a great question! Here's what I found...",
    "I appreciate your patience. Is there anything else you'd like to know?",
    "Got it! I'll make a note of that.",
    "Happy to help! Feel free to ask me anything.",
    "Let me check that for you. One moment please.",
    "That's interesting! Tell me more about it.",
    "I see what you mean. Here's what I suggest...",
    "Thanks for sharing! I'll keep that in mind.",
    "Absolutely! I can definitely help with that.",
    "Let me clarify that for you right away.",
    "Great choice! I think that will work perfectly.",
    "I'm here to assist you. What else do you need?",
    "That makes sense. Let me provide some options...",
    "Sure thing! Here's the information you requested.",
    "I'd be happy to explain that in more detail.",
    "Perfect! Is there anything else I can do for you?",
    "Thanks for your message! Let me get back to you on that.",
    "I appreciate your feedback! It helps us improve.",
];

/// Used only if the pool was configured empty.
const FALLBACK_RESPONSE: &str = "An error occurred. Please try again later.";

/// [`Responder`] that sleeps a random delay and answers from a fixed pool.
#[derive(Debug, Clone)]
pub struct SimulatedResponder {
    min_delay: Duration,
    max_delay: Duration,
    pool: Vec<String>,
}

impl SimulatedResponder {
    pub fn new() -> Self {
        Self {
            min_delay: Duration::from_millis(REPLY_DELAY_MIN_MS),
            max_delay: Duration::from_millis(REPLY_DELAY_MAX_MS),
            pool: CANNED_RESPONSES.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Inverted bounds are swapped.
    pub fn with_delay(mut self, min: Duration, max: Duration) -> Self {
        self.min_delay = min.min(max);
        self.max_delay = max.max(min);
        self
    }

    pub fn with_pool(mut self, pool: Vec<String>) -> Self {
        self.pool = pool;
        self
    }

    fn pick_delay(&self) -> Duration {
        let min = self.min_delay.as_millis() as u64;
        let max = self.max_delay.as_millis() as u64;
        Duration::from_millis(rand::thread_rng().gen_range(min..=max))
    }

    fn pick_body(&self) -> String {
        self.pool
            .choose(&mut rand::thread_rng())
            .cloned()
            .unwrap_or_else(|| FALLBACK_RESPONSE.to_string())
    }
}

impl Default for SimulatedResponder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Responder for SimulatedResponder {
    async fn respond(&self) -> Message {
        let delay = self.pick_delay();
        debug!(delay_ms = delay.as_millis() as u64, "simulating agent reply");
        tokio::time::sleep(delay).await;

        Message::text(self.pick_body(), Sender::Agent, now_millis())
    }
}
