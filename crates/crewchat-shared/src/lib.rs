//! Constants and small shared types used by every CrewChat crate.

pub mod constants;
pub mod types;

pub use types::{now_millis, ChatId, Sender};
