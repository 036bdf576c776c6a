//! Workspace chat: a short tool loop whose tools edit the day's task list
//! in the task store.

use std::sync::Arc;

use md2slack_core::cast;
use md2slack_core::storage::Store;
use md2slack_core::task::TaskChange;
use serde_json::{json, Map, Value};

use crate::client::Llm;
use crate::error::LlmError;
use crate::prompts::{self, require_prompt, TASKS_JSON_PLACEHOLDER};
use crate::tool_parse::{normalize_tool_params, parse_tool_calls};
use crate::types::{ChatMessage, ToolSpec};
use crate::Result;

const CHAT_TURNS: usize = 5;

pub const CHAT_TOOL_NAMES: &[&str] = &["create_task", "update_task", "delete_task"];

pub fn chat_tool_specs() -> Vec<ToolSpec> {
    vec![
        ToolSpec {
            name: "create_task",
            description: "Create a new task in the list.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "title": {"type": "string", "description": "The title of the task"},
                    "description": {"type": "string", "description": "Detailed description"},
                    "time_estimate": {"type": "string", "description": "Estimate like '2h', '30m'"},
                    "intent": {"type": "string", "description": "User intent"}
                },
                "required": ["intent"]
            }),
        },
        ToolSpec {
            name: "update_task",
            description: "Update an existing task.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "index": {"type": "integer", "description": "Index of task to update"},
                    "task_id": {"type": "string", "description": "Stable task id"},
                    "title": {"type": "string"},
                    "description": {"type": "string"},
                    "time_estimate": {"type": "string"},
                    "intent": {"type": "string"}
                },
                "required": []
            }),
        },
        ToolSpec {
            name: "delete_task",
            description: "Delete tasks from the list.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "indices": {
                        "type": "array",
                        "items": {"type": "integer"},
                        "description": "List of indices to delete"
                    },
                    "task_ids": {
                        "type": "array",
                        "items": {"type": "string"},
                        "description": "List of task_ids to delete"
                    }
                },
                "required": []
            }),
        },
    ]
}

/// Hours from estimates such as `2h`, `30m`, `1.5 hours` or a bare number.
pub fn parse_time_estimate(s: &str) -> Option<f64> {
    let s = s.trim().to_ascii_lowercase();
    let split = s
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(s.len());
    let (num, unit) = s.split_at(split);
    let n: f64 = num.parse().ok()?;
    match unit.trim() {
        "" | "h" | "hr" | "hrs" | "hour" | "hours" => Some(n),
        "m" | "min" | "mins" | "minute" | "minutes" => Some(n / 60.0),
        _ => None,
    }
}

/// Tools the chat agent may call, bound to one repo and day of the store.
pub struct TaskTools {
    store: Arc<Store>,
    repo: String,
    date: String,
    tasks: Vec<TaskChange>,
}

impl TaskTools {
    /// Write `current` to the store so every task has a stable id.
    pub fn new(
        store: Arc<Store>,
        repo: impl Into<String>,
        date: impl Into<String>,
        current: &[TaskChange],
    ) -> Result<Self> {
        let (repo, date) = (repo.into(), date.into());
        store.replace_tasks(&repo, &date, current)?;
        let tasks = store.load_tasks(&repo, &date)?;
        Ok(Self {
            store,
            repo,
            date,
            tasks,
        })
    }

    pub fn tasks(&self) -> &[TaskChange] {
        &self.tasks
    }

    pub fn into_tasks(self) -> Vec<TaskChange> {
        self.tasks
    }

    /// Run one tool and return its JSON result.
    pub fn call(&mut self, name: &str, params: &Map<String, Value>) -> Result<String> {
        let params = normalize_tool_params(name, params.clone());
        let out = match name {
            "create_task" => self.create(&params)?,
            "update_task" => self.update(&params)?,
            "delete_task" => self.delete(&params)?,
            other => return Err(LlmError::ToolNotFound(other.to_string())),
        };
        Ok(out.to_string())
    }

    fn create(&mut self, params: &Map<String, Value>) -> Result<Value> {
        let get = |k: &str| params.get(k).unwrap_or(&Value::Null);
        let mut task = TaskChange::new(cast::string(get("type")), cast::string(get("intent")));
        if task.task_type.is_empty() {
            task.task_type = "delivery".into();
        }
        task.title = cast::string(get("title"));
        task.details = first_text(params, &["details", "description"]).unwrap_or_default();
        task.scope = cast::string(get("scope"));
        task.commits = cast::string_list(get("commits"));
        task.estimated_hours = cast::float(get("estimated_hours"))
            .or_else(|| parse_time_estimate(&cast::string(get("time_estimate"))));

        let (id, tasks) = self.store.create_task(&self.repo, &self.date, task)?;
        let created = tasks.iter().find(|t| t.id == id).cloned();
        self.tasks = tasks;
        Ok(json!({"status": "created", "task_id": id, "task": created}))
    }

    fn update(&mut self, params: &Map<String, Value>) -> Result<Value> {
        let tasks = self.store.load_tasks(&self.repo, &self.date)?;
        let task_id = match (
            params.get("task_id").map(cast::string).filter(|s| !s.is_empty()),
            params.get("index").and_then(cast::int),
        ) {
            (Some(id), _) => id,
            (None, Some(idx)) => {
                let task = usize::try_from(idx).ok().and_then(|i| tasks.get(i));
                match task {
                    Some(t) => t.id.clone(),
                    None => return Err(out_of_bounds(idx, tasks.len())),
                }
            }
            (None, None) => return Err(LlmError::Tool("task_id or index is required".into())),
        };
        let Some(mut task) = tasks.into_iter().find(|t| t.id == task_id) else {
            return Err(LlmError::Tool(format!("task_id {task_id} not found")));
        };

        if let Some(title) = first_text(params, &["title"]) {
            task.title = title;
        }
        if let Some(details) = first_text(params, &["details", "description"]) {
            task.details = details;
        }
        if let Some(estimate) = first_text(params, &["time_estimate"]) {
            if let Some(h) = parse_time_estimate(&estimate) {
                task.estimated_hours = Some(h);
            }
        }
        if let Some(intent) = first_text(params, &["intent"]) {
            task.task_intent = intent;
        }

        self.tasks = self
            .store
            .update_task(&self.repo, &self.date, &task_id, task.clone())?;
        task.id = task_id.clone();
        Ok(json!({"status": "updated", "task_id": task_id, "task": task}))
    }

    fn delete(&mut self, params: &Map<String, Value>) -> Result<Value> {
        let tasks = self.store.load_tasks(&self.repo, &self.date)?;
        let mut ids = params
            .get("task_ids")
            .map(cast::string_list)
            .unwrap_or_default();
        if ids.is_empty() {
            let indices = params.get("indices").map(cast::int_list).unwrap_or_default();
            for idx in indices {
                match usize::try_from(idx).ok().and_then(|i| tasks.get(i)) {
                    Some(t) => ids.push(t.id.clone()),
                    None => return Err(out_of_bounds(idx, tasks.len())),
                }
            }
        }
        if ids.is_empty() {
            return Err(LlmError::Tool("no task_ids or indices provided".into()));
        }

        self.tasks = self.store.delete_tasks(&self.repo, &self.date, &ids)?;
        Ok(json!({"status": "deleted", "count": ids.len(), "task_ids": ids}))
    }
}

/// A present, non-null value under the first matching key.
fn first_text(params: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| params.get(*k))
        .find(|v| !v.is_null())
        .map(cast::string)
}

fn out_of_bounds(idx: i64, len: usize) -> LlmError {
    LlmError::Tool(format!("index {idx} out of bounds (0-{})", len as i64 - 1))
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatReply {
    pub text: String,
    pub tasks: Vec<TaskChange>,
    pub tools_used: bool,
}

/// Answer the latest turn of `history`, letting the model edit tasks through
/// `tools`. Store writes run on the blocking pool. Text streams to `on_stream_chunk`; every tool call is bracketed by
/// `on_tool_start`/`on_tool_end` and followed by `on_tasks_update`.
pub async fn chat_with_tools(
    llm: &Llm,
    history: &[ChatMessage],
    mut tools: TaskTools,
) -> Result<ChatReply> {
    let template = require_prompt(&llm.opts.prompt_dirs, prompts::TASK_CHAT)?;
    let tasks_json = serde_json::to_string_pretty(tools.tasks())?;
    let system = template.replacen(TASKS_JSON_PLACEHOLDER, &tasks_json, 1);
    let specs = chat_tool_specs();
    let cb = llm.callbacks();

    let mut messages = history.to_vec();
    let mut tools_used = false;

    for turn in 0..CHAT_TURNS {
        let completion = llm.complete(&system, &messages, &specs, true).await?;
        let mut calls = completion.tool_calls;
        if calls.is_empty() && !completion.text.is_empty() {
            calls = parse_tool_calls(&completion.text, CHAT_TOOL_NAMES);
        }
        tracing::debug!(turn = turn + 1, tool_calls = calls.len(), chars = completion.text.len(), "chat turn");

        if calls.is_empty() {
            return Ok(ChatReply {
                text: completion.text,
                tasks: tools.into_tasks(),
                tools_used,
            });
        }
        tools_used = true;

        let mut said = completion.text.trim().to_string();
        if !said.is_empty() {
            said.push('\n');
        }
        said.push_str(&serde_json::to_string(&calls)?);
        messages.push(ChatMessage::assistant(said));

        for call in &calls {
            let args = Value::Object(call.parameters.clone()).to_string();
            cb.tool_start(&call.tool, &args);
            let (name, params) = (call.tool.clone(), call.parameters.clone());
            let (back, outcome) = tokio::task::spawn_blocking(move || {
                let outcome = tools.call(&name, &params);
                (tools, outcome)
            })
            .await
            .map_err(|e| LlmError::Tool(format!("task join error: {e}")))?;
            tools = back;
            let result = match outcome {
                Ok(out) => out,
                Err(e) => {
                    tracing::warn!(tool = %call.tool, error = %e, "chat tool failed");
                    format!("Error executing tool: {e}")
                }
            };
            cb.tool_end(&call.tool, &result);
            cb.tasks_update(tools.tasks());
            messages.push(ChatMessage::tool(result));
        }
    }

    Ok(ChatReply {
        text: "Max turns reached".into(),
        tasks: tools.into_tasks(),
        tools_used,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::testing::ScriptedModel;
    use crate::types::{Callbacks, Completion, LlmOptions, ToolCall};
    use std::sync::Mutex;
    use tempfile::TempDir;

    fn tools_with(tasks: &[TaskChange]) -> TaskTools {
        let store = Arc::new(Store::in_memory().unwrap());
        TaskTools::new(store, "repo", "2026-01-05", tasks).unwrap()
    }

    fn params(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    fn chat_llm(model: Arc<ScriptedModel>, callbacks: Callbacks) -> (Llm, TempDir) {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(prompts::TASK_CHAT), "Tasks:\n{{TASKS_JSON}}").unwrap();
        let opts = LlmOptions {
            prompt_dirs: vec![dir.path().to_path_buf()],
            callbacks,
            ..Default::default()
        };
        (Llm::with_model(opts, model), dir)
    }

    #[test]
    fn time_estimates() {
        assert_eq!(parse_time_estimate("2h"), Some(2.0));
        assert_eq!(parse_time_estimate("30m"), Some(0.5));
        assert_eq!(parse_time_estimate(" 1.5 Hours"), Some(1.5));
        assert_eq!(parse_time_estimate("3"), Some(3.0));
        assert_eq!(parse_time_estimate("soon"), None);
        assert_eq!(parse_time_estimate("2 days"), None);
    }

    #[test]
    fn new_assigns_ids() {
        let tools = tools_with(&[TaskChange::new("delivery", "A")]);
        assert_eq!(tools.tasks().len(), 1);
        assert!(tools.tasks()[0].id.starts_with("task-"));
    }

    #[test]
    fn create_update_delete_round() {
        let mut tools = tools_with(&[TaskChange::new("fix", "Existing")]);

        let out: Value = serde_json::from_str(
            &tools
                .call("create_task", &params(json!({"intent": "Write docs", "time_estimate": "30m", "description": "API guide"})))
                .unwrap(),
        )
        .unwrap();
        assert_eq!(out["status"], "created");
        assert_eq!(out["task"]["task_intent"], "Write docs");
        assert_eq!(out["task"]["task_type"], "delivery");
        assert_eq!(out["task"]["details"], "API guide");
        assert_eq!(tools.tasks().len(), 2);
        assert_eq!(tools.tasks()[1].estimated_hours, Some(0.5));

        let out: Value = serde_json::from_str(
            &tools
                .call("update_task", &params(json!({"index": 0, "task_intent": "Renamed"})))
                .unwrap(),
        )
        .unwrap();
        assert_eq!(out["status"], "updated");
        assert_eq!(tools.tasks()[0].task_intent, "Renamed");
        assert_eq!(tools.tasks()[0].task_type, "fix");

        let id = tools.tasks()[1].id.clone();
        let out: Value = serde_json::from_str(
            &tools
                .call("delete_task", &params(json!({"task_ids": [id]})))
                .unwrap(),
        )
        .unwrap();
        assert_eq!(out["count"], 1);
        assert_eq!(tools.tasks().len(), 1);
    }

    #[test]
    fn tool_errors() {
        let mut tools = tools_with(&[TaskChange::new("delivery", "Only")]);
        let err = |tools: &mut TaskTools, name: &str, p: Value| {
            tools.call(name, &params(p)).unwrap_err().to_string()
        };
        assert_eq!(err(&mut tools, "update_task", json!({})), "task_id or index is required");
        assert_eq!(err(&mut tools, "update_task", json!({"index": 3})), "index 3 out of bounds (0-0)");
        assert_eq!(err(&mut tools, "update_task", json!({"task_id": "nope"})), "task_id nope not found");
        assert_eq!(err(&mut tools, "delete_task", json!({"indices": [0, 5]})), "index 5 out of bounds (0-0)");
        assert_eq!(err(&mut tools, "delete_task", json!({})), "no task_ids or indices provided");
        assert_eq!(err(&mut tools, "split_task", json!({})), "tool not found: split_task");
        assert_eq!(tools.tasks().len(), 1);
    }

    #[tokio::test]
    async fn chat_runs_tools_then_answers() {
        let model = ScriptedModel::new(vec![
            Ok(Completion {
                text: "Adding it.".into(),
                tool_calls: vec![
                    ToolCall::new("create_task", params(json!({"intent": "Plan sprint"}))),
                    ToolCall::new("rename_task", Map::new()),
                ],
            }),
            Ok(Completion {
                text: "Done, two tasks now.".into(),
                tool_calls: vec![],
            }),
        ]);
        let events = Arc::new(Mutex::new(Vec::new()));
        let (start, end, update) = (events.clone(), events.clone(), events.clone());
        let callbacks = Callbacks {
            on_tool_start: Some(Arc::new(move |t: &str, p: &str| {
                start.lock().unwrap().push(format!("start {t} {p}"))
            })),
            on_tool_end: Some(Arc::new(move |t: &str, r: &str| {
                end.lock().unwrap().push(format!("end {t} ok={}", !r.starts_with("Error")))
            })),
            on_tasks_update: Some(Arc::new(move |tasks: &[TaskChange]| {
                update.lock().unwrap().push(format!("tasks {}", tasks.len()))
            })),
            ..Default::default()
        };
        let (llm, _dir) = chat_llm(model.clone(), callbacks);
        let tools = tools_with(&[TaskChange::new("delivery", "Existing")]);

        let reply = chat_with_tools(&llm, &[ChatMessage::user("add sprint planning")], tools)
            .await
            .unwrap();
        assert_eq!(reply.text, "Done, two tasks now.");
        assert!(reply.tools_used);
        assert_eq!(reply.tasks.len(), 2);

        assert_eq!(
            *events.lock().unwrap(),
            vec![
                r#"start create_task {"intent":"Plan sprint"}"#.to_string(),
                "end create_task ok=true".to_string(),
                "tasks 2".to_string(),
                "start rename_task {}".to_string(),
                "end rename_task ok=false".to_string(),
                "tasks 2".to_string(),
            ]
        );

        let requests = model.requests.lock().unwrap();
        assert!(requests[0].0.starts_with("Tasks:\n[\n"));
        assert!(requests[0].0.contains("\"task_intent\": \"Existing\""));
        assert_eq!(requests[0].2, 3);
        let second = &requests[1].1;
        assert_eq!(second.len(), 4);
        assert!(second[1].content.starts_with("Adding it.\n[{\"tool\":\"create_task\""));
        assert_eq!(second[3].role, "tool");
        assert_eq!(second[3].content, "Error executing tool: tool not found: rename_task");
    }

    #[tokio::test]
    async fn chat_parses_text_calls_and_stops_after_five_turns() {
        let model = ScriptedModel::texts(&[r#"delete_task(indices=[0])"#, "update_task(index=0, intent=\"x\")"]);
        let (llm, _dir) = chat_llm(model.clone(), Callbacks::default());
        let tools = tools_with(&[TaskChange::new("delivery", "A")]);
        let reply = chat_with_tools(&llm, &[ChatMessage::user("hi")], tools).await.unwrap();
        // The script runs dry after two turns and the empty reply ends the chat.
        assert_eq!(reply.text, "");
        assert_eq!(model.request_count(), 3);

        let looping = ScriptedModel::texts(&["update_task(index=0, intent=\"again\")"; 6]);
        let (llm, _dir) = chat_llm(looping.clone(), Callbacks::default());
        let tools = tools_with(&[TaskChange::new("delivery", "A")]);
        let reply = chat_with_tools(&llm, &[ChatMessage::user("hi")], tools).await.unwrap();
        assert_eq!(reply.text, "Max turns reached");
        assert_eq!(reply.tasks[0].task_intent, "again");
        assert_eq!(looping.request_count(), CHAT_TURNS);
    }

    #[tokio::test]
    async fn chat_requires_prompt() {
        let llm = Llm::with_model(
            LlmOptions {
                prompt_dirs: vec![],
                ..Default::default()
            },
            ScriptedModel::texts(&[]),
        );
        let err = chat_with_tools(&llm, &[], tools_with(&[])).await.unwrap_err();
        assert_eq!(err.to_string(), "prompt file task_chat.txt not found");
    }
}
