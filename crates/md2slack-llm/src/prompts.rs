use std::path::PathBuf;

use crate::error::LlmError;
use crate::Result;

pub const COMMIT_SUMMARIZER: &str = "commit_summarizer.txt";
pub const COMMIT_INTENT: &str = "commit_intent_extractor.txt";
pub const TASKS_GENERATE: &str = "task_tools_generate.txt";
pub const TASKS_REVIEW: &str = "task_tools_review.txt";
pub const TASKS_MANUAL: &str = "task_tools_manual.txt";
pub const TASK_REFINER: &str = "task_refiner.txt";
pub const TASK_EDITOR: &str = "task_editor.txt";
pub const NEXT_ACTIONS: &str = "next_actions.txt";
pub const TASK_GROUPER: &str = "task_grouper.txt";
pub const TASK_CHAT: &str = "task_chat.txt";

/// Placeholder in [`TASK_CHAT`] replaced with the current tasks as JSON.
pub const TASKS_JSON_PLACEHOLDER: &str = "{{TASKS_JSON}}";

/// First non-empty `name` found in `dirs`.
pub fn read_prompt(dirs: &[PathBuf], name: &str) -> Option<String> {
    dirs.iter()
        .filter_map(|dir| std::fs::read_to_string(dir.join(name)).ok())
        .find(|text| !text.trim().is_empty())
}

pub fn require_prompt(dirs: &[PathBuf], name: &str) -> Result<String> {
    read_prompt(dirs, name).ok_or_else(|| LlmError::PromptMissing(name.to_string()))
}
