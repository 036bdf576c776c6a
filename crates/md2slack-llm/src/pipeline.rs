//! Report synthesis: per-commit summaries, tool-driven task generation and
//! review, and the single-shot refine/edit/suggest/group calls.

use std::collections::{BTreeSet, HashMap};
use std::fmt::Write as _;

use md2slack_core::gitdiff::{Commit, CommitDiff, CommitSemantic, SemanticChange};
use md2slack_core::task::{prune_tasks, CommitChange, CommitSummary, GroupedTask, TaskChange};
use serde::Serialize;

use crate::client::Llm;
use crate::error::LlmError;
use crate::prompts::{self, read_prompt, require_prompt};
use crate::tools::{apply_tools, commit_list_text, task_tool_specs, tool_error_summary, TASK_TOOL_NAMES};
use crate::types::ChatMessage;
use crate::Result;

const GENERATE_TURNS: usize = 8;
const REVIEW_TURNS: usize = 8;
const MANUAL_TURNS: usize = 5;

/// Output of a multi-step operation together with the error that cut it
/// short, if any. The value holds everything produced before the failure.
#[derive(Debug)]
pub struct Partial<T> {
    pub value: T,
    pub error: Option<LlmError>,
}

impl<T> Partial<T> {
    fn ok(value: T) -> Self {
        Self { value, error: None }
    }

    fn failed(value: T, error: LlmError) -> Self {
        Self {
            value,
            error: Some(error),
        }
    }

    pub fn into_result(self) -> Result<T> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.value),
        }
    }
}

/// The day's commit facts as the task prompts present them.
#[derive(Debug, Clone, Copy)]
pub struct TaskContext<'a> {
    pub commits: &'a [Commit],
    pub summaries: &'a [CommitSummary],
    pub semantics: &'a [CommitSemantic],
    pub extra: &'a str,
    /// Hashes `add_commit_reference` may link.
    pub allowed: Option<&'a BTreeSet<String>>,
}

fn pretty<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "null".to_string())
}

// ---------------------------------------------------------------------------
// Commit summaries
// ---------------------------------------------------------------------------

pub async fn summarize_commit(
    llm: &Llm,
    commit: &Commit,
    diff: Option<&CommitDiff>,
    semantic: Option<&CommitSemantic>,
) -> Result<CommitSummary> {
    let system = require_prompt(&llm.opts.prompt_dirs, prompts::COMMIT_SUMMARIZER)?;
    let semantic = semantic.cloned().unwrap_or_default();
    let prompt = format!(
        "Commit: {}\nMessage: {}\nSemantic (JSON): {}\nRaw Diff:\n{}",
        commit.hash,
        commit.message,
        pretty(&semantic),
        diff.map(|d| d.diff.as_str()).unwrap_or_default()
    );
    let mut out: CommitSummary = llm.call_json(&system, &[ChatMessage::user(prompt)]).await?;
    if out.commit.is_empty() {
        out.commit = commit.hash.clone();
    }
    Ok(out)
}

/// Summarize each commit in order, stopping at the first failure.
pub async fn summarize_commits(
    llm: &Llm,
    commits: &[Commit],
    diffs: &[CommitDiff],
    semantics: &[CommitSemantic],
) -> Partial<Vec<CommitSummary>> {
    let diffs: HashMap<&str, &CommitDiff> = diffs.iter().map(|d| (d.commit.as_str(), d)).collect();
    let semantics: HashMap<&str, &CommitSemantic> =
        semantics.iter().map(|s| (s.commit.as_str(), s)).collect();

    let mut out = Vec::with_capacity(commits.len());
    for commit in commits {
        let hash = commit.hash.as_str();
        match summarize_commit(
            llm,
            commit,
            diffs.get(hash).copied(),
            semantics.get(hash).copied(),
        )
        .await
        {
            Ok(mut summary) => {
                summary.commit = commit.hash.clone();
                out.push(summary);
            }
            Err(e) => return Partial::failed(out, e),
        }
    }
    Partial::ok(out)
}

/// Classify one commit's intent from its grouped signals.
pub async fn extract_commit_intent(
    llm: &Llm,
    change: &SemanticChange,
    message: &str,
) -> Result<CommitChange> {
    let system = require_prompt(&llm.opts.prompt_dirs, prompts::COMMIT_INTENT)?;
    let signals = serde_json::to_string(&change.signals)?;
    let prompt = format!(
        "Commit: {}\nMessage: {message}\nSignals: {signals}",
        change.commit
    );
    let mut out: CommitChange = llm.call_json(&system, &[ChatMessage::user(prompt)]).await?;
    if out.commit.is_empty() {
        out.commit = change.commit.clone();
    }
    Ok(out)
}

/// One delivery task per non-empty summary.
pub fn fallback_tasks_from_summaries(summaries: &[CommitSummary]) -> Vec<TaskChange> {
    summaries
        .iter()
        .filter(|s| !s.summary.trim().is_empty())
        .map(|s| TaskChange {
            task_type: "delivery".into(),
            task_intent: s.summary.trim().to_string(),
            scope: s.area.clone(),
            commits: vec![s.commit.clone()],
            technical_why: s.impact.clone(),
            ..Default::default()
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tool loops
// ---------------------------------------------------------------------------

enum Feedback {
    /// Show the task list after each turn, then the closing instruction.
    State(&'static str),
    /// Tasks from the user's extra context; no state dump.
    Manual,
}

const GENERATE_CLOSING: &str = "\nContinue if more tasks need to be created, otherwise return [].";
const REVIEW_CLOSING: &str =
    "\nContinue reviewing until duplicates and discrepancies are resolved; return [] only when done.";
const MANUAL_CLOSING: &str =
    "\n\nContinue if more tasks need to be created from the extra context, otherwise return [].";

fn state_lines(tasks: &[TaskChange]) -> String {
    let mut out = String::new();
    for (i, t) in tasks.iter().enumerate() {
        let _ = writeln!(out, "[{i}] {} ({}) [{}]", t.task_intent, t.scope, t.task_type);
        if !t.technical_why.is_empty() {
            let _ = writeln!(out, "    Details: {}", t.technical_why);
        }
        let _ = writeln!(out, "    Commits: [{}]", t.commits.join(" "));
    }
    out
}

async fn run_tool_loop(
    llm: &Llm,
    system: &str,
    prompt: String,
    mut tasks: Vec<TaskChange>,
    allowed: Option<&BTreeSet<String>>,
    turns: usize,
    feedback: Feedback,
) -> Partial<Vec<TaskChange>> {
    let specs = task_tool_specs();
    let mut messages = vec![ChatMessage::user(prompt)];

    for turn in 0..turns {
        let calls = match llm.call_tools(system, &messages, &specs, TASK_TOOL_NAMES).await {
            Ok(calls) => calls,
            Err(e) => return Partial::failed(tasks, e),
        };
        if calls.is_empty() {
            break;
        }

        let outcome = apply_tools(&calls, tasks, allowed, &llm.opts.search_root);
        tasks = outcome.tasks;
        if matches!(feedback, Feedback::Manual) {
            for t in &mut tasks {
                t.is_manual = true;
            }
        }
        llm.callbacks().tool_updates(&outcome.log, &outcome.status);
        tracing::debug!(turn, calls = calls.len(), tasks = tasks.len(), "tool turn applied");

        let calls_json = serde_json::to_string(&calls).unwrap_or_default();
        messages.push(ChatMessage::assistant(calls_json));

        let mut fb = format!("Tool Execution Log:\n{}", outcome.log);
        let errors = tool_error_summary(&outcome.log);
        if !errors.is_empty() {
            fb.push_str("\n\nTool Errors:\n");
            fb.push_str(&errors);
        }
        match feedback {
            Feedback::State(closing) => {
                fb.push_str("\n\nCurrent Tasks (State):\n");
                fb.push_str(&state_lines(&tasks));
                fb.push_str(closing);
            }
            Feedback::Manual => fb.push_str(MANUAL_CLOSING),
        }
        messages.push(ChatMessage::user(fb));
    }
    Partial::ok(tasks)
}

fn facts_prompt(ctx: &TaskContext<'_>) -> String {
    format!(
        "Extra Context: {}\nValid Phase 1 Commits: {}\nCommits (JSON): {}\nCommit Summaries (JSON): {}\nSemantic (JSON): {}",
        ctx.extra,
        commit_list_text(ctx.allowed),
        pretty(ctx.commits),
        pretty(ctx.summaries),
        pretty(ctx.semantics)
    )
}

/// Let the model create tasks from the day's facts with up to eight rounds
/// of tool calls.
pub async fn generate_tasks_from_context(llm: &Llm, ctx: TaskContext<'_>) -> Partial<Vec<TaskChange>> {
    let system = match require_prompt(&llm.opts.prompt_dirs, prompts::TASKS_GENERATE) {
        Ok(s) => s,
        Err(e) => return Partial::failed(Vec::new(), e),
    };
    run_tool_loop(
        llm,
        &system,
        facts_prompt(&ctx),
        Vec::new(),
        ctx.allowed,
        GENERATE_TURNS,
        Feedback::State(GENERATE_CLOSING),
    )
    .await
}

/// Let the model merge duplicates and fix discrepancies in `tasks`.
pub async fn review_tasks(
    llm: &Llm,
    tasks: Vec<TaskChange>,
    ctx: TaskContext<'_>,
) -> Partial<Vec<TaskChange>> {
    let system = match require_prompt(&llm.opts.prompt_dirs, prompts::TASKS_REVIEW) {
        Ok(s) => s,
        Err(e) => return Partial::failed(tasks, e),
    };
    let prompt = format!("{}\nCurrent Tasks (JSON): {}", facts_prompt(&ctx), pretty(&tasks));
    run_tool_loop(
        llm,
        &system,
        prompt,
        tasks,
        ctx.allowed,
        REVIEW_TURNS,
        Feedback::State(REVIEW_CLOSING),
    )
    .await
}

/// Tasks described only in the user's extra context. They are marked manual
/// and may not reference commits.
pub async fn incorporate_extra_context(llm: &Llm, extra: &str) -> Partial<Vec<TaskChange>> {
    if extra.trim().is_empty() {
        return Partial::ok(Vec::new());
    }
    let system = match require_prompt(&llm.opts.prompt_dirs, prompts::TASKS_MANUAL) {
        Ok(s) => s,
        Err(e) => return Partial::failed(Vec::new(), e),
    };
    let prompt = format!(
        "USER EXTRA CONTEXT:\n{extra}\n\nPlease create initial tasks based ON THIS CONTEXT. Use the tools provided."
    );
    run_tool_loop(llm, &system, prompt, Vec::new(), None, MANUAL_TURNS, Feedback::Manual).await
}

// ---------------------------------------------------------------------------
// Single-shot edits
// ---------------------------------------------------------------------------

/// Polish the task list. Any failure, or a result that prunes to nothing,
/// keeps the input.
pub async fn refine_tasks(llm: &Llm, tasks: Vec<TaskChange>) -> Vec<TaskChange> {
    let prompt = format!("Current Task List:\n{}", pretty(&tasks));
    refine_with(llm, tasks, prompt).await
}

/// [`refine_tasks`] steered by a user request. A blank request is a plain
/// refine.
pub async fn refine_tasks_with_prompt(llm: &Llm, tasks: Vec<TaskChange>, request: &str) -> Vec<TaskChange> {
    let request = request.trim();
    if request.is_empty() {
        return refine_tasks(llm, tasks).await;
    }
    let prompt = format!(
        "User request:\n{request}\n\nCurrent Task List:\n{}",
        pretty(&tasks)
    );
    refine_with(llm, tasks, prompt).await
}

async fn refine_with(llm: &Llm, tasks: Vec<TaskChange>, prompt: String) -> Vec<TaskChange> {
    let Some(system) = read_prompt(&llm.opts.prompt_dirs, prompts::TASK_REFINER) else {
        return tasks;
    };
    match llm
        .call_list::<TaskChange>(&system, &[ChatMessage::user(prompt)])
        .await
    {
        Ok(out) => {
            let out = prune_tasks(out);
            if out.is_empty() && !tasks.is_empty() {
                tasks
            } else {
                out
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, "task refinement failed, using unrefined list");
            tasks
        }
    }
}

/// In-range, unique, ascending indices.
pub fn normalize_selected(selected: &[i64], len: usize) -> Vec<usize> {
    let set: BTreeSet<usize> = selected
        .iter()
        .filter_map(|&i| usize::try_from(i).ok())
        .filter(|&i| i < len)
        .collect();
    set.into_iter().collect()
}

/// Apply a Workspace action to the selected tasks.
///
/// A reply as long as the whole list replaces it. Otherwise the reply is
/// merged according to `action`; an unexpected shape leaves the list alone.
pub async fn edit_tasks_with_action(
    llm: &Llm,
    tasks: Vec<TaskChange>,
    action: &str,
    selected: &[i64],
) -> Result<Vec<TaskChange>> {
    let system = require_prompt(&llm.opts.prompt_dirs, prompts::TASK_EDITOR)?;
    let prompt = format!(
        "Action: {action}\nSelected Indices: {}\nTasks: {}",
        pretty(selected),
        pretty(&tasks)
    );
    let out: Vec<TaskChange> = llm.call_list(&system, &[ChatMessage::user(prompt)]).await?;
    Ok(merge_action_output(tasks, action, selected, out))
}

fn merge_action_output(
    tasks: Vec<TaskChange>,
    action: &str,
    selected: &[i64],
    out: Vec<TaskChange>,
) -> Vec<TaskChange> {
    let sel = normalize_selected(selected, tasks.len());
    if sel.is_empty() {
        return tasks;
    }
    if out.len() == tasks.len() {
        return out;
    }

    match action {
        "make_longer" | "make_shorter" | "improve_text" if out.len() == sel.len() => {
            let mut merged = tasks;
            for (&idx, task) in sel.iter().zip(out) {
                merged[idx] = task;
            }
            merged
        }
        "split_task" if sel.len() == 1 && out.len() >= 2 => {
            let idx = sel[0];
            let mut merged = tasks;
            merged.splice(idx..=idx, out);
            merged
        }
        "merge_tasks" if sel.len() >= 2 && out.len() == 1 => {
            let first = sel[0];
            let mut replacement = out.into_iter();
            let mut merged = Vec::with_capacity(tasks.len() - sel.len() + 1);
            for (i, task) in tasks.into_iter().enumerate() {
                if i == first {
                    merged.extend(replacement.next());
                }
                if sel.binary_search(&i).is_err() {
                    merged.push(task);
                }
            }
            merged
        }
        _ => tasks,
    }
}

#[derive(Serialize)]
struct TaskBrief<'a> {
    intent: &'a str,
    scope: &'a str,
    #[serde(rename = "type")]
    task_type: &'a str,
}

/// Short follow-up items for the report's "next" section.
pub async fn suggest_next_actions(llm: &Llm, tasks: &[TaskChange]) -> Result<Vec<String>> {
    let system = require_prompt(&llm.opts.prompt_dirs, prompts::NEXT_ACTIONS)?;
    let brief: Vec<TaskBrief<'_>> = tasks
        .iter()
        .map(|t| TaskBrief {
            intent: &t.task_intent,
            scope: &t.scope,
            task_type: &t.task_type,
        })
        .collect();
    let prompt = format!("Tasks synthesized for today:\n{}", pretty(&brief));
    let out: Vec<String> = llm.call_list(&system, &[ChatMessage::user(prompt)]).await?;
    if out.is_empty() {
        tracing::debug!(tasks = tasks.len(), "next actions came back empty");
    }
    Ok(out)
}

pub async fn group_tasks(llm: &Llm, tasks: &[TaskChange]) -> Result<Vec<GroupedTask>> {
    let system = require_prompt(&llm.opts.prompt_dirs, prompts::TASK_GROUPER)?;
    let prompt = format!("Tasks: {}", pretty(tasks));
    llm.call_list(&system, &[ChatMessage::user(prompt)]).await
}
