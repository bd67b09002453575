//! # crewchat-client
//!
//! Presentation-independent core of the CrewChat messaging client: the chat
//! registry, one controller task per open thread, and the simulated agent
//! that answers every user message.

pub mod agent;
pub mod app;
pub mod config;
pub mod events;
pub mod registry;
pub mod state;
pub mod thread;

mod error;

use tracing_subscriber::{fmt, EnvFilter};

pub use agent::{Responder, SimulatedResponder};
pub use app::CrewChat;
pub use config::ClientConfig;
pub use error::{ClientError, Result};
pub use events::ThreadEvent;
pub use registry::ChatRegistry;
pub use state::{ThreadPhase, ThreadSnapshot};
pub use thread::{PendingReply, SendReceipt, ThreadHandle, WeakThreadHandle};

/// Install the global `fmt` subscriber. `RUST_LOG` overrides the default
/// filter. Later calls are ignored.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("crewchat_client=debug,crewchat_store=info,warn"));

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init();
}
