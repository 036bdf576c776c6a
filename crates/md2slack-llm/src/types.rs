use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use md2slack_core::cast;
use md2slack_core::config::LlmConfig;
use md2slack_core::paths;
use md2slack_core::task::TaskChange;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

// ─── Messages ─────────────────────────────────────────────────────────────

/// One turn of a conversation, in the OpenAI `{role, content}` shape the
/// Workspace chat also uses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(default)]
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".into(),
            content: content.into(),
        }
    }

    pub fn tool(content: impl Into<String>) -> Self {
        Self {
            role: "tool".into(),
            content: content.into(),
        }
    }
}

/// `[i] ROLE:\ncontent\n` per message, as logged for model input.
pub fn format_messages(messages: &[ChatMessage]) -> String {
    messages
        .iter()
        .enumerate()
        .map(|(i, m)| format!("[{i}] {}:\n{}\n", m.role.to_uppercase(), m.content))
        .collect()
}

// ─── Tool calls ───────────────────────────────────────────────────────────

/// A tool invocation requested by the model.
///
/// Accepts both `{"tool": "x", "parameters": {...}}` and the flat form
/// `{"tool": "x", "index": 1}` where every key but `tool` is a parameter.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ToolCall {
    pub tool: String,
    pub parameters: Map<String, Value>,
}

impl ToolCall {
    pub fn new(tool: impl Into<String>, parameters: Map<String, Value>) -> Self {
        Self {
            tool: tool.into(),
            parameters,
        }
    }

    pub fn param(&self, key: &str) -> &Value {
        self.parameters.get(key).unwrap_or(&Value::Null)
    }
}

impl<'de> Deserialize<'de> for ToolCall {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let Value::Object(mut map) = Value::deserialize(deserializer)? else {
            return Err(serde::de::Error::custom("expected a tool call object"));
        };
        let tool = map.remove("tool").map(|v| cast::string(&v)).unwrap_or_default();
        let parameters = match map.remove("parameters") {
            Some(Value::Object(params)) => params,
            Some(Value::Null) | None => map,
            Some(other) => {
                return Err(serde::de::Error::custom(format!(
                    "tool parameters must be an object, got {other}"
                )))
            }
        };
        Ok(Self { tool, parameters })
    }
}

/// A function the model may call natively.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
    /// JSON schema of the parameters object.
    pub parameters: Value,
}

/// What a provider answered: free text plus any native tool calls.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Completion {
    pub text: String,
    pub tool_calls: Vec<ToolCall>,
}

// ─── Provider ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Ollama,
    OpenAi,
    Anthropic,
}

impl Provider {
    /// Unknown names fall back to Ollama.
    pub fn parse(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "openai" | "codex" => Self::OpenAi,
            "anthropic" => Self::Anthropic,
            _ => Self::Ollama,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ollama => "ollama",
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
        }
    }

    pub fn default_base_url(self) -> &'static str {
        match self {
            Self::Ollama => "http://127.0.0.1:11434",
            Self::OpenAi => "https://api.openai.com/v1",
            Self::Anthropic => "https://api.anthropic.com",
        }
    }
}

// ─── Callbacks ────────────────────────────────────────────────────────────

pub type LineFn = Arc<dyn Fn(&str) + Send + Sync>;
pub type ToolEventFn = Arc<dyn Fn(&str, &str) + Send + Sync>;
pub type TasksFn = Arc<dyn Fn(&[TaskChange]) + Send + Sync>;

const LLM_LOG_LIMIT: usize = 4000;

/// Progress sinks. Every field is optional; unset sinks drop their events.
#[derive(Clone, Default)]
pub struct Callbacks {
    /// Model input/output, one line per call.
    pub on_llm_log: Option<LineFn>,
    /// Tool execution log, one line per call.
    pub on_tool_log: Option<LineFn>,
    /// Latest tool status line.
    pub on_tool_status: Option<LineFn>,
    /// Raw text as it streams from the model during chat.
    pub on_stream_chunk: Option<LineFn>,
    /// `(tool name, parameters JSON)`
    pub on_tool_start: Option<ToolEventFn>,
    /// `(tool name, result text)`
    pub on_tool_end: Option<ToolEventFn>,
    pub on_tasks_update: Option<TasksFn>,
}

impl fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callbacks")
            .field("on_llm_log", &self.on_llm_log.is_some())
            .field("on_tool_log", &self.on_tool_log.is_some())
            .field("on_tool_status", &self.on_tool_status.is_some())
            .field("on_stream_chunk", &self.on_stream_chunk.is_some())
            .field("on_tool_start", &self.on_tool_start.is_some())
            .field("on_tool_end", &self.on_tool_end.is_some())
            .field("on_tasks_update", &self.on_tasks_update.is_some())
            .finish()
    }
}

impl Callbacks {
    /// Emit `label:` followed by `content` (truncated) line by line.
    pub fn llm_log(&self, label: &str, content: &str) {
        let Some(sink) = &self.on_llm_log else {
            return;
        };
        let msg = format!("{label}:\n{}", truncate_log(content, LLM_LOG_LIMIT));
        for line in msg.split('\n') {
            sink(line);
        }
    }

    /// Forward non-empty tool log lines and a non-blank status.
    pub fn tool_updates(&self, log: &str, status: &str) {
        if let Some(sink) = &self.on_tool_log {
            for line in log.split('\n').map(str::trim).filter(|l| !l.is_empty()) {
                sink(line);
            }
        }
        if let Some(sink) = &self.on_tool_status {
            if !status.trim().is_empty() {
                sink(status);
            }
        }
    }

    pub fn stream_chunk(&self, chunk: &str) {
        if let Some(sink) = &self.on_stream_chunk {
            sink(chunk);
        }
    }

    pub fn tool_start(&self, tool: &str, params: &str) {
        if let Some(sink) = &self.on_tool_start {
            sink(tool, params);
        }
    }

    pub fn tool_end(&self, tool: &str, result: &str) {
        if let Some(sink) = &self.on_tool_end {
            sink(tool, result);
        }
    }

    pub fn tasks_update(&self, tasks: &[TaskChange]) {
        if let Some(sink) = &self.on_tasks_update {
            sink(tasks);
        }
    }
}

/// Cut `s` to at most `max` bytes on a char boundary, marking the cut.
pub fn truncate_log(s: &str, max: usize) -> String {
    if max == 0 || s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}\n…(truncated)", &s[..end])
}

// ─── Options ──────────────────────────────────────────────────────────────

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Everything a model call needs: provider settings, where prompts live,
/// where codebase searches run, and the progress sinks.
#[derive(Debug, Clone)]
pub struct LlmOptions {
    pub provider: Provider,
    pub model: String,
    pub temperature: f64,
    pub top_p: f64,
    pub repeat_penalty: f64,
    pub context_size: u32,
    /// Blank selects the provider default.
    pub base_url: String,
    pub token: String,
    pub timeout: Duration,
    pub prompt_dirs: Vec<PathBuf>,
    /// Root for `get_codebase_context` searches.
    pub search_root: PathBuf,
    pub callbacks: Callbacks,
}

impl Default for LlmOptions {
    fn default() -> Self {
        Self::from_config(&LlmConfig::default(), Path::new("."))
    }
}

impl LlmOptions {
    pub fn from_config(cfg: &LlmConfig, cwd: &Path) -> Self {
        Self {
            provider: Provider::parse(&cfg.provider),
            model: cfg.model.clone(),
            temperature: cfg.temperature,
            top_p: cfg.top_p,
            repeat_penalty: cfg.repeat_penalty,
            context_size: cfg.context_size,
            base_url: cfg.base_url.clone(),
            token: cfg.token.clone(),
            timeout: DEFAULT_TIMEOUT,
            prompt_dirs: paths::prompt_dirs(cwd),
            search_root: cwd.to_path_buf(),
            callbacks: Callbacks::default(),
        }
    }

    pub fn base_url(&self) -> &str {
        let url = self.base_url.trim();
        if url.is_empty() {
            self.provider.default_base_url()
        } else {
            url.trim_end_matches('/')
        }
    }

    /// `base_url` joined with `path`, unless the configured URL already
    /// names that endpoint.
    pub fn endpoint(&self, path: &str) -> String {
        let base = self.base_url();
        if base.ends_with(path) {
            base.to_string()
        } else {
            format!("{base}{path}")
        }
    }
}
