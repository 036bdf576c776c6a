use crate::error::Result;
use crate::paths;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

pub const PLACEHOLDER_BOT_TOKEN: &str = "YOUR_BOT_TOKEN_HERE";
pub const PLACEHOLDER_CHANNEL_ID: &str = "YOUR_CHANNEL_ID_HERE";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SlackConfig {
    pub client_id: String,
    pub bot_token: String,
    pub channel_id: String,
}

impl SlackConfig {
    /// True when both credentials are set to something other than the
    /// template placeholders.
    pub fn is_configured(&self) -> bool {
        !self.bot_token.is_empty()
            && !self.channel_id.is_empty()
            && self.bot_token != PLACEHOLDER_BOT_TOKEN
            && self.channel_id != PLACEHOLDER_CHANNEL_ID
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LlmConfig {
    pub provider: String,
    pub model: String,
    pub temperature: f64,
    pub top_p: f64,
    pub repeat_penalty: f64,
    pub context_size: u32,
    pub base_url: String,
    pub token: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            model: "llama3.2".to_string(),
            temperature: 0.7,
            top_p: 0.9,
            repeat_penalty: 1.1,
            context_size: 8192,
            base_url: String::new(),
            token: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub auto_increment_port: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            auto_increment_port: true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub slack: SlackConfig,
    pub llm: LlmConfig,
    pub server: ServerConfig,
}

impl Config {
    /// Load `config.ini` from `cwd`, falling back to `~/.md2slack/config.ini`.
    /// No file at either location yields the defaults.
    pub fn load(cwd: &Path) -> Result<Self> {
        for candidate in paths::config_candidates(cwd) {
            if candidate.is_file() {
                tracing::debug!(path = %candidate.display(), "loading config");
                return Self::load_from(&candidate);
            }
        }
        Ok(Self::default())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(Self::parse(&text))
    }

    pub fn parse(text: &str) -> Self {
        let ini = Ini::parse(text);
        let defaults = Self::default();

        let slack = SlackConfig {
            client_id: ini.string("slack", "client_id").unwrap_or_default(),
            bot_token: ini.string("slack", "bot_token").unwrap_or_default(),
            channel_id: ini.string("slack", "channel_id").unwrap_or_default(),
        };

        let llm = LlmConfig {
            provider: ini
                .string("llm", "provider")
                .filter(|s| !s.is_empty())
                .unwrap_or(defaults.llm.provider),
            model: ini
                .string("llm", "model")
                .filter(|s| !s.is_empty())
                .unwrap_or(defaults.llm.model),
            temperature: ini.parsed("llm", &["temperature"]).unwrap_or(defaults.llm.temperature),
            top_p: ini.parsed("llm", &["top_p"]).unwrap_or(defaults.llm.top_p),
            repeat_penalty: ini
                .parsed("llm", &["repeat_penalty"])
                .unwrap_or(defaults.llm.repeat_penalty),
            context_size: ini
                .parsed("llm", &["context_size", "num_ctx"])
                .unwrap_or(defaults.llm.context_size),
            base_url: ini.string("llm", "base_url").unwrap_or_default(),
            token: ini.string("llm", "token").unwrap_or_default(),
        };

        let server = ServerConfig {
            host: ini
                .string("server", "host")
                .filter(|s| !s.is_empty())
                .unwrap_or(defaults.server.host),
            port: ini.parsed("server", &["port"]).unwrap_or(defaults.server.port),
            auto_increment_port: ini
                .bool("server", "auto_increment_port")
                .unwrap_or(defaults.server.auto_increment_port),
        };

        Self { slack, llm, server }
    }
}

// ---------------------------------------------------------------------------
// Minimal INI reader
// ---------------------------------------------------------------------------

/// Section and key names are folded to lowercase without underscores so that
/// `[Slack] ClientID` and `[slack] client_id` resolve to the same entry.
fn fold(name: &str) -> String {
    name.trim()
        .chars()
        .filter(|c| *c != '_' && *c != '-')
        .flat_map(char::to_lowercase)
        .collect()
}

#[derive(Debug, Default)]
struct Ini {
    sections: HashMap<String, HashMap<String, String>>,
}

impl Ini {
    fn parse(text: &str) -> Self {
        let mut ini = Ini::default();
        let mut current = String::new();
        for raw in text.lines() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
                continue;
            }
            if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                current = fold(name);
                continue;
            }
            let Some((key, value)) = line.split_once('=').or_else(|| line.split_once(':')) else {
                continue;
            };
            let value = value.trim().trim_matches('"').trim_matches('\'').to_string();
            ini.sections
                .entry(current.clone())
                .or_default()
                .insert(fold(key), value);
        }
        ini
    }

    fn string(&self, section: &str, key: &str) -> Option<String> {
        self.sections
            .get(&fold(section))
            .and_then(|s| s.get(&fold(key)))
            .cloned()
    }

    fn parsed<T: std::str::FromStr>(&self, section: &str, keys: &[&str]) -> Option<T> {
        keys.iter()
            .filter_map(|k| self.string(section, k))
            .find_map(|v| v.parse().ok())
    }

    fn bool(&self, section: &str, key: &str) -> Option<bool> {
        match self.string(section, key)?.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Some(true),
            "0" | "false" | "no" | "off" => Some(false),
            _ => None,
        }
    }
}
