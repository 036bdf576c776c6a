//! `md2slack-llm` — model calls behind the daily report.
//!
//! Talks to Ollama, OpenAI-compatible and Anthropic endpoints, recovers JSON
//! from chatty replies, and drives the tool loops that turn commit facts
//! into a task list.
//!
//! # Architecture
//!
//! ```text
//! LlmOptions (provider, prompts, callbacks)
//!     │
//!     ▼
//! Llm ──────────► dyn ChatModel   ← HttpModel in production,
//!     │               │             scripted fakes in tests
//!     │               ▼
//!     │           Completion {text, tool_calls}
//!     │               │
//!     │               ▼
//!     │           json::decode_list / tool_parse   ← recovery fallbacks
//!     │               │
//!     ▼               ▼
//! pipeline ──────► tools::apply_tools   ← in-memory task list
//! agent    ──────► TaskTools            ← task store
//! ```

pub mod agent;
pub mod client;
pub mod error;
pub mod json;
pub mod pipeline;
pub mod prompts;
pub mod tool_parse;
pub mod tools;
pub mod types;

pub use agent::{chat_with_tools, ChatReply, TaskTools};
pub use client::{ChatModel, CompletionRequest, HttpModel, Llm};
pub use error::LlmError;
pub use pipeline::{Partial, TaskContext};
pub use tools::{apply_tools, ToolOutcome};
pub use types::{
    Callbacks, ChatMessage, Completion, LlmOptions, Provider, ToolCall, ToolSpec,
};

/// Convenience `Result` alias for this crate.
pub type Result<T> = std::result::Result<T, LlmError>;
