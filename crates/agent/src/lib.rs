//! Conversation memory for Threadmind.
//!
//! Each session keeps a token-bounded sliding window of recent turns. Every
//! turn is also embedded into a long-term store so older context can be
//! recalled by similarity. When a window grows past the summary trigger it
//! is compacted into a summary note plus its most recent turns.
//!
//! [`MemoryManager`] owns the session registry and coordinates the window,
//! summarizer, and store. [`ChatAgent`] runs a full conversational turn on
//! top of it.

pub mod chat;
pub mod manager;
pub mod registry;
pub mod retry;
pub mod setup;
pub mod summarizer;
pub mod window;

#[cfg(test)]
mod test_helpers;

pub use chat::{
    ChatAgent, ChatReply, ChatSettings, DEFAULT_PERSONA, MEMORY_HEADER, ReplyStream, StreamedReply, build_prompt,
};
pub use manager::{AssembledContext, ClearOutcome, MemoryManager, MemorySettings, RecordOutcome};
pub use registry::{Session, SessionHandle, SessionRegistry, WindowSettings};
pub use retry::{RetryPolicy, Retryable};
pub use setup::{build_chat_agent, build_memory_manager, build_store};
pub use summarizer::{SUMMARY_INSTRUCTION, Summarizer};
pub use window::SessionWindow;
