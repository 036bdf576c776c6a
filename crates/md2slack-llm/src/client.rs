use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::error::LlmError;
use crate::json;
use crate::tool_parse::parse_tool_calls;
use crate::types::{format_messages, Callbacks, ChatMessage, Completion, LlmOptions, Provider, ToolCall, ToolSpec};
use crate::Result;

const ANTHROPIC_VERSION: &str = "2023-06-01";
const ANTHROPIC_MAX_TOKENS: u32 = 4096;

// ─── ChatModel ────────────────────────────────────────────────────────────

/// One model request.
#[derive(Debug, Clone, Copy)]
pub struct CompletionRequest<'a> {
    pub system: &'a str,
    pub messages: &'a [ChatMessage],
    pub tools: &'a [ToolSpec],
    /// Forward text to `on_stream_chunk` as it arrives.
    pub stream: bool,
}

/// A backend that turns a conversation into a [`Completion`].
///
/// [`HttpModel`] talks to the configured provider; tests substitute scripted
/// models.
pub trait ChatModel: Send + Sync {
    fn complete<'a>(
        &'a self,
        opts: &'a LlmOptions,
        req: CompletionRequest<'a>,
    ) -> BoxFuture<'a, Result<Completion>>;
}

// ─── HttpModel ────────────────────────────────────────────────────────────

/// Ollama, OpenAI-compatible and Anthropic chat endpoints over `reqwest`.
#[derive(Debug, Clone, Default)]
pub struct HttpModel {
    http: reqwest::Client,
}

impl HttpModel {
    pub fn new() -> Self {
        Self::default()
    }

    async fn ollama(&self, opts: &LlmOptions, req: CompletionRequest<'_>) -> Result<Completion> {
        let mut messages = Vec::with_capacity(req.messages.len() + 1);
        if !req.system.is_empty() {
            messages.push(json!({"role": "system", "content": req.system}));
        }
        messages.extend(
            req.messages
                .iter()
                .map(|m| json!({"role": m.role, "content": m.content})),
        );
        let mut body = json!({
            "model": opts.model,
            "messages": messages,
            "stream": req.stream,
            "options": {
                "temperature": opts.temperature,
                "top_p": opts.top_p,
                "repeat_penalty": opts.repeat_penalty,
                "num_ctx": opts.context_size,
            },
        });
        if !req.tools.is_empty() {
            body["tools"] = function_tools(req.tools);
        }

        let url = opts.endpoint("/api/chat");
        let resp = self.http.post(url).json(&body).send().await?;
        let resp = check_status(Provider::Ollama, resp).await?;

        let mut out = Completion::default();
        if !req.stream {
            let chunk: OllamaChunk = resp.json().await?;
            out.text = chunk.message.content;
            out.tool_calls = chunk.message.tool_calls.into_iter().map(Into::into).collect();
            return Ok(out);
        }

        let mut bytes = resp.bytes_stream();
        let mut buf: Vec<u8> = Vec::new();
        while let Some(piece) = bytes.next().await {
            buf.extend_from_slice(&piece?);
            while let Some(pos) = buf.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = buf.drain(..=pos).collect();
                absorb_ollama_line(&line, &mut out, &opts.callbacks)?;
            }
        }
        absorb_ollama_line(&buf, &mut out, &opts.callbacks)?;
        Ok(out)
    }

    async fn openai(&self, opts: &LlmOptions, req: CompletionRequest<'_>) -> Result<Completion> {
        let mut messages = Vec::with_capacity(req.messages.len() + 1);
        if !req.system.is_empty() {
            messages.push(json!({"role": "system", "content": req.system}));
        }
        messages.extend(req.messages.iter().map(|m| {
            let role = if m.role == "tool" { "user" } else { m.role.as_str() };
            json!({"role": role, "content": m.content})
        }));
        let mut body = json!({
            "model": opts.model,
            "messages": messages,
            "temperature": opts.temperature,
        });
        if opts.top_p > 0.0 && opts.top_p < 1.0 {
            body["top_p"] = json!(opts.top_p);
        }
        if !req.tools.is_empty() {
            body["tools"] = function_tools(req.tools);
        }

        let url = opts.endpoint("/chat/completions");
        let mut builder = self.http.post(url).json(&body);
        if !opts.token.is_empty() {
            builder = builder.bearer_auth(&opts.token);
        }
        let resp = check_status(Provider::OpenAi, builder.send().await?).await?;
        let parsed: OpenAiResponse = resp.json().await?;
        let choice = parsed.choices.into_iter().next().ok_or(LlmError::Empty)?;
        Ok(Completion {
            text: choice.message.content.unwrap_or_default(),
            tool_calls: choice.message.tool_calls.into_iter().map(Into::into).collect(),
        })
    }

    async fn anthropic(&self, opts: &LlmOptions, req: CompletionRequest<'_>) -> Result<Completion> {
        let messages: Vec<Value> = req
            .messages
            .iter()
            .map(|m| {
                let role = if m.role == "assistant" { "assistant" } else { "user" };
                json!({"role": role, "content": m.content})
            })
            .collect();
        let mut body = json!({
            "model": opts.model,
            "max_tokens": ANTHROPIC_MAX_TOKENS,
            "messages": messages,
        });
        if !req.system.is_empty() {
            body["system"] = json!(req.system);
        }
        // Temperature and top_p are mutually exclusive here.
        if opts.temperature > 0.0 {
            body["temperature"] = json!(opts.temperature);
        } else if opts.top_p > 0.0 && opts.top_p < 1.0 {
            body["top_p"] = json!(opts.top_p);
        }
        if !req.tools.is_empty() {
            body["tools"] = Value::Array(
                req.tools
                    .iter()
                    .map(|t| json!({"name": t.name, "description": t.description, "input_schema": t.parameters}))
                    .collect(),
            );
        }

        let url = opts.endpoint("/v1/messages");
        let resp = self
            .http
            .post(url)
            .header("x-api-key", &opts.token)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await?;
        let resp = check_status(Provider::Anthropic, resp).await?;
        let parsed: AnthropicResponse = resp.json().await?;
        if parsed.content.is_empty() {
            return Err(LlmError::Empty);
        }

        let mut out = Completion::default();
        for block in parsed.content {
            match block {
                AnthropicBlock::Text { text } => out.text.push_str(&text),
                AnthropicBlock::ToolUse { name, input } => {
                    out.tool_calls.push(ToolCall::new(name, arguments_map(input)))
                }
                AnthropicBlock::Other => {}
            }
        }
        Ok(out)
    }
}

impl ChatModel for HttpModel {
    fn complete<'a>(
        &'a self,
        opts: &'a LlmOptions,
        req: CompletionRequest<'a>,
    ) -> BoxFuture<'a, Result<Completion>> {
        Box::pin(async move {
            match opts.provider {
                Provider::Ollama => self.ollama(opts, req).await,
                provider => {
                    let out = match provider {
                        Provider::Anthropic => self.anthropic(opts, req).await?,
                        _ => self.openai(opts, req).await?,
                    };
                    // Non-streaming providers deliver the whole text as one chunk.
                    if req.stream && !out.text.is_empty() {
                        opts.callbacks.stream_chunk(&out.text);
                    }
                    Ok(out)
                }
            }
        })
    }
}

fn function_tools(tools: &[ToolSpec]) -> Value {
    Value::Array(
        tools
            .iter()
            .map(|t| {
                json!({
                    "type": "function",
                    "function": {"name": t.name, "description": t.description, "parameters": t.parameters},
                })
            })
            .collect(),
    )
}

async fn check_status(provider: Provider, resp: reqwest::Response) -> Result<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(LlmError::Status {
        provider: provider.as_str(),
        status: status.as_u16(),
        body: body.trim().to_string(),
    })
}

fn absorb_ollama_line(line: &[u8], out: &mut Completion, callbacks: &Callbacks) -> Result<()> {
    let line = String::from_utf8_lossy(line);
    let line = line.trim();
    if line.is_empty() {
        return Ok(());
    }
    let chunk: OllamaChunk = serde_json::from_str(line)?;
    if !chunk.message.content.is_empty() {
        callbacks.stream_chunk(&chunk.message.content);
        out.text.push_str(&chunk.message.content);
    }
    out.tool_calls
        .extend(chunk.message.tool_calls.into_iter().map(ToolCall::from));
    Ok(())
}

/// Tool arguments arrive as an object (Ollama, Anthropic) or as a JSON
/// string (OpenAI).
fn arguments_map(v: Value) -> Map<String, Value> {
    match v {
        Value::Object(map) => map,
        Value::String(s) => match serde_json::from_str(&s) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        },
        _ => Map::new(),
    }
}

// ─── Wire types ───────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
struct OllamaChunk {
    #[serde(default)]
    message: WireMessage,
}

#[derive(Debug, Default, Deserialize)]
struct WireMessage {
    #[serde(default)]
    content: String,
    #[serde(default)]
    tool_calls: Vec<WireToolCall>,
}

#[derive(Debug, Deserialize)]
struct WireToolCall {
    function: WireFunction,
}

#[derive(Debug, Deserialize)]
struct WireFunction {
    name: String,
    #[serde(default)]
    arguments: Value,
}

impl From<WireToolCall> for ToolCall {
    fn from(tc: WireToolCall) -> Self {
        ToolCall::new(tc.function.name, arguments_map(tc.function.arguments))
    }
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    #[serde(default)]
    choices: Vec<OpenAiChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAiMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<WireToolCall>,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    #[serde(default)]
    content: Vec<AnthropicBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AnthropicBlock {
    Text {
        text: String,
    },
    ToolUse {
        name: String,
        #[serde(default)]
        input: Value,
    },
    #[serde(other)]
    Other,
}

// ─── Llm ──────────────────────────────────────────────────────────────────

/// Options plus the model that serves them. Cheap to clone.
#[derive(Clone)]
pub struct Llm {
    pub opts: LlmOptions,
    model: Arc<dyn ChatModel>,
}

impl fmt::Debug for Llm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Llm").field("opts", &self.opts).finish_non_exhaustive()
    }
}

impl Llm {
    pub fn new(opts: LlmOptions) -> Self {
        Self::with_model(opts, Arc::new(HttpModel::new()))
    }

    pub fn with_model(opts: LlmOptions, model: Arc<dyn ChatModel>) -> Self {
        Self { opts, model }
    }

    /// Same model and settings, different progress sinks.
    pub fn with_callbacks(&self, callbacks: Callbacks) -> Self {
        let mut opts = self.opts.clone();
        opts.callbacks = callbacks;
        Self {
            opts,
            model: Arc::clone(&self.model),
        }
    }

    pub fn callbacks(&self) -> &Callbacks {
        &self.opts.callbacks
    }

    /// Send one request with input, status and output logging and the
    /// configured timeout.
    pub async fn complete(
        &self,
        system: &str,
        messages: &[ChatMessage],
        tools: &[ToolSpec],
        stream: bool,
    ) -> Result<Completion> {
        let cb = self.callbacks();
        let mut payload = format_messages(messages);
        if !system.is_empty() {
            payload = format!("SYSTEM: {system}\n{payload}");
        }
        cb.llm_log("LLM INPUT", &payload);
        cb.llm_log(
            "LLM STATUS",
            &format!(
                "request queued (provider={} model={})",
                self.opts.provider.as_str(),
                self.opts.model
            ),
        );

        let started = Instant::now();
        let req = CompletionRequest {
            system,
            messages,
            tools,
            stream,
        };
        let result = tokio::time::timeout(self.opts.timeout, self.model.complete(&self.opts, req))
            .await
            .unwrap_or_else(|_| Err(LlmError::Timeout(self.opts.timeout)));
        let elapsed = Duration::from_millis(started.elapsed().as_millis() as u64);

        let completion = match result {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(provider = self.opts.provider.as_str(), ?elapsed, error = %e, "model request failed");
                cb.llm_log("LLM STATUS", &format!("request error after {elapsed:?}: {e}"));
                return Err(e);
            }
        };
        tracing::debug!(
            provider = self.opts.provider.as_str(),
            ?elapsed,
            chars = completion.text.len(),
            tool_calls = completion.tool_calls.len(),
            "model request done"
        );
        cb.llm_log("LLM OUTPUT", &completion.text);
        if !completion.tool_calls.is_empty() {
            cb.llm_log(
                "LLM TOOL CALLS",
                &format!("{} calls", completion.tool_calls.len()),
            );
        }
        Ok(completion)
    }

    pub(crate) async fn call_json<T: DeserializeOwned>(
        &self,
        system: &str,
        messages: &[ChatMessage],
    ) -> Result<T> {
        let c = self.complete(system, messages, &[], false).await?;
        json::decode(&c.text)
    }

    pub(crate) async fn call_list<T: DeserializeOwned>(
        &self,
        system: &str,
        messages: &[ChatMessage],
    ) -> Result<Vec<T>> {
        let c = self.complete(system, messages, &[], false).await?;
        json::decode_list(&c.text)
    }

    /// Tool calls for one turn: native calls first, then a JSON list in the
    /// text, then `name(args)` forms naming one of `known`.
    pub(crate) async fn call_tools(
        &self,
        system: &str,
        messages: &[ChatMessage],
        tools: &[ToolSpec],
        known: &[&str],
    ) -> Result<Vec<ToolCall>> {
        let c = self.complete(system, messages, tools, false).await?;
        if !c.tool_calls.is_empty() {
            return Ok(c.tool_calls);
        }
        match json::decode_list::<ToolCall>(&c.text) {
            Ok(calls) => Ok(calls),
            Err(e) => {
                let parsed = parse_tool_calls(&c.text, known);
                if parsed.is_empty() {
                    Err(e)
                } else {
                    tracing::debug!(calls = parsed.len(), "parsed tool calls from text");
                    Ok(parsed)
                }
            }
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays canned completions in order and records every request.
    #[derive(Default)]
    pub struct ScriptedModel {
        replies: Mutex<VecDeque<Result<Completion>>>,
        pub requests: Mutex<Vec<(String, Vec<ChatMessage>, usize)>>,
    }

    impl ScriptedModel {
        pub fn new(replies: Vec<Result<Completion>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                requests: Mutex::default(),
            })
        }

        pub fn texts(texts: &[&str]) -> Arc<Self> {
            Self::new(
                texts
                    .iter()
                    .map(|t| {
                        Ok(Completion {
                            text: t.to_string(),
                            tool_calls: vec![],
                        })
                    })
                    .collect(),
            )
        }

        pub fn request_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }

        pub fn last_user_message(&self) -> String {
            let reqs = self.requests.lock().unwrap();
            let (_, messages, _) = reqs.last().expect("no requests recorded");
            messages.last().map(|m| m.content.clone()).unwrap_or_default()
        }
    }

    impl ChatModel for ScriptedModel {
        fn complete<'a>(
            &'a self,
            _opts: &'a LlmOptions,
            req: CompletionRequest<'a>,
        ) -> BoxFuture<'a, Result<Completion>> {
            self.requests.lock().unwrap().push((
                req.system.to_string(),
                req.messages.to_vec(),
                req.tools.len(),
            ));
            let next = self
                .replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(Completion::default()));
            Box::pin(async move { next })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::ScriptedModel;
    use super::*;
    use mockito::Matcher;
    use std::sync::Mutex;

    fn opts(provider: Provider, base: &str) -> LlmOptions {
        LlmOptions {
            provider,
            base_url: base.to_string(),
            token: "secret".into(),
            model: "test-model".into(),
            ..Default::default()
        }
    }

    fn collecting() -> (Callbacks, Arc<Mutex<Vec<String>>>) {
        let lines = Arc::new(Mutex::new(Vec::new()));
        let (log, chunks) = (lines.clone(), lines.clone());
        let cb = Callbacks {
            on_llm_log: Some(Arc::new(move |l: &str| log.lock().unwrap().push(l.to_string()))),
            on_stream_chunk: Some(Arc::new(move |c: &str| {
                chunks.lock().unwrap().push(format!("chunk:{c}"))
            })),
            ..Default::default()
        };
        (cb, lines)
    }

    #[tokio::test]
    async fn ollama_chat_with_native_tools() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/chat")
            .match_body(Matcher::PartialJson(json!({
                "model": "test-model",
                "stream": false,
                "options": {"num_ctx": 8192},
                "messages": [{"role": "system", "content": "sys"}, {"role": "user", "content": "hi"}],
            })))
            .with_body(
                r#"{"message":{"role":"assistant","content":"","tool_calls":[{"function":{"name":"add_time","arguments":{"index":0,"hours":2}}}]},"done":true}"#,
            )
            .create_async()
            .await;

        let llm = Llm::new(opts(Provider::Ollama, &server.url()));
        let specs = crate::tools::task_tool_specs();
        let out = llm
            .complete("sys", &[ChatMessage::user("hi")], &specs, false)
            .await
            .unwrap();
        mock.assert_async().await;
        assert_eq!(out.tool_calls.len(), 1);
        assert_eq!(out.tool_calls[0].tool, "add_time");
        assert_eq!(out.tool_calls[0].param("hours"), &json!(2));
    }

    #[tokio::test]
    async fn ollama_streams_chunks() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/api/chat")
            .match_body(Matcher::PartialJson(json!({"stream": true})))
            .with_body(
                "{\"message\":{\"content\":\"Hel\"},\"done\":false}\n{\"message\":{\"content\":\"lo\"},\"done\":false}\n{\"message\":{\"content\":\"\"},\"done\":true}\n",
            )
            .create_async()
            .await;

        let (cb, lines) = collecting();
        let mut o = opts(Provider::Ollama, &server.url());
        o.callbacks = cb;
        let out = Llm::new(o)
            .complete("", &[ChatMessage::user("hi")], &[], true)
            .await
            .unwrap();
        assert_eq!(out.text, "Hello");
        let lines = lines.lock().unwrap();
        assert!(lines.contains(&"chunk:Hel".to_string()));
        assert!(lines.contains(&"chunk:lo".to_string()));
    }

    #[tokio::test]
    async fn openai_uses_bearer_and_string_arguments() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer secret")
            .match_body(Matcher::PartialJson(json!({"top_p": 0.9})))
            .with_body(
                r#"{"choices":[{"message":{"content":null,"tool_calls":[{"id":"c1","type":"function","function":{"name":"create_task","arguments":"{\"intent\":\"Ship\"}"}}]}}]}"#,
            )
            .create_async()
            .await;

        let out = Llm::new(opts(Provider::OpenAi, &server.url()))
            .complete("", &[ChatMessage::user("go")], &[], false)
            .await
            .unwrap();
        assert_eq!(out.text, "");
        assert_eq!(out.tool_calls[0].param("intent"), &json!("Ship"));
    }

    #[tokio::test]
    async fn anthropic_sends_temperature_only() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/v1/messages")
            .match_header("x-api-key", "secret")
            .match_header("anthropic-version", ANTHROPIC_VERSION)
            .match_body(Matcher::PartialJson(json!({"temperature": 0.7, "system": "sys"})))
            .with_body(
                r#"{"content":[{"type":"text","text":"ok"},{"type":"tool_use","id":"t1","name":"delete_task","input":{"index":1}},{"type":"thinking","thinking":"x"}]}"#,
            )
            .create_async()
            .await;

        let out = Llm::new(opts(Provider::Anthropic, &server.url()))
            .complete("sys", &[ChatMessage::user("go")], &[], false)
            .await
            .unwrap();
        assert_eq!(out.text, "ok");
        assert_eq!(out.tool_calls[0].tool, "delete_task");
    }

    #[tokio::test]
    async fn full_endpoint_urls_are_used_as_is() {
        let mut server = mockito::Server::new_async().await;
        let cases = [
            (
                Provider::Anthropic,
                "/v1/messages",
                r#"{"content":[{"type":"text","text":"ok"}]}"#,
            ),
            (
                Provider::OpenAi,
                "/chat/completions",
                r#"{"choices":[{"message":{"content":"ok"}}]}"#,
            ),
            (
                Provider::Ollama,
                "/api/chat",
                r#"{"message":{"content":"ok"},"done":true}"#,
            ),
        ];
        for (provider, path, body) in cases {
            let mock = server
                .mock("POST", path)
                .with_body(body)
                .expect(1)
                .create_async()
                .await;
            let base = format!("{}{path}", server.url());
            let out = Llm::new(opts(provider, &base))
                .complete("", &[ChatMessage::user("hi")], &[], false)
                .await
                .unwrap();
            mock.assert_async().await;
            assert_eq!(out.text, "ok");
        }
    }

    #[test]
    fn endpoint_appends_path_to_plain_base() {
        let o = opts(Provider::Anthropic, "https://api.anthropic.com/");
        assert_eq!(o.endpoint("/v1/messages"), "https://api.anthropic.com/v1/messages");
        let o = opts(Provider::Anthropic, "https://api.anthropic.com/v1/messages");
        assert_eq!(o.endpoint("/v1/messages"), "https://api.anthropic.com/v1/messages");
        let o = opts(Provider::OpenAi, "");
        assert_eq!(o.endpoint("/chat/completions"), "https://api.openai.com/v1/chat/completions");
    }

    #[tokio::test]
    async fn error_status_is_logged() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/api/chat")
            .with_status(500)
            .with_body("model not loaded")
            .create_async()
            .await;

        let (cb, lines) = collecting();
        let mut o = opts(Provider::Ollama, &server.url());
        o.callbacks = cb;
        let err = Llm::new(o)
            .complete("", &[ChatMessage::user("hi")], &[], false)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "ollama returned 500: model not loaded");
        let lines = lines.lock().unwrap();
        assert_eq!(lines[0], "LLM INPUT:");
        assert!(lines.iter().any(|l| l == "request queued (provider=ollama model=test-model)"));
        assert!(lines.iter().any(|l| l.starts_with("request error after ")));
    }

    struct SlowModel;

    impl ChatModel for SlowModel {
        fn complete<'a>(
            &'a self,
            _opts: &'a LlmOptions,
            _req: CompletionRequest<'a>,
        ) -> BoxFuture<'a, Result<Completion>> {
            Box::pin(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(Completion::default())
            })
        }
    }

    #[tokio::test]
    async fn requests_time_out() {
        let o = LlmOptions {
            timeout: Duration::from_millis(20),
            ..Default::default()
        };
        let err = Llm::with_model(o, Arc::new(SlowModel))
            .complete("", &[], &[], false)
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::Timeout(_)));
    }

    #[tokio::test]
    async fn tool_calls_fall_back_to_text_forms() {
        let model = ScriptedModel::texts(&[
            "[{\"tool\": \"add_time\", \"index\": 0, \"hours\": 1}]",
            "Sure: create_task(intent=\"Write docs\")",
            "nothing to do",
        ]);
        let llm = Llm::with_model(LlmOptions::default(), model);
        let known = crate::tools::TASK_TOOL_NAMES;

        let json_calls = llm.call_tools("", &[], &[], known).await.unwrap();
        assert_eq!(json_calls[0].tool, "add_time");

        let text_calls = llm.call_tools("", &[], &[], known).await.unwrap();
        assert_eq!(text_calls[0].param("intent"), &json!("Write docs"));

        let err = llm.call_tools("", &[], &[], known).await.unwrap_err();
        assert!(matches!(err, LlmError::Unmarshal { .. }));
    }
}
