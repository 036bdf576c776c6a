//! Markdown to Slack `rich_text` conversion and `chat.postMessage` delivery.

use crate::config::SlackConfig;
use crate::error::{Md2SlackError, Result};
use pulldown_cmark::{Event, Parser, Tag, TagEnd};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use std::time::Duration;

pub const SLACK_API_BASE: &str = "https://slack.com/api";

// ---------------------------------------------------------------------------
// Block model
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RichTextBlock {
    RichTextSection {
        elements: Vec<Inline>,
    },
    RichTextList {
        style: ListStyle,
        indent: usize,
        elements: Vec<RichTextBlock>,
    },
    RichTextPreformatted {
        elements: Vec<Inline>,
    },
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ListStyle {
    Bullet,
    Ordered,
}

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct TextStyle {
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub bold: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub italic: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub code: bool,
}

impl TextStyle {
    fn is_plain(&self) -> bool {
        !self.bold && !self.italic && !self.code
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Inline {
    Text {
        text: String,
        #[serde(skip_serializing_if = "TextStyle::is_plain")]
        style: TextStyle,
    },
    Link {
        url: String,
        text: String,
        #[serde(skip_serializing_if = "TextStyle::is_plain")]
        style: TextStyle,
    },
    Emoji {
        name: String,
    },
}

fn section() -> RichTextBlock {
    RichTextBlock::RichTextSection {
        elements: Vec::new(),
    }
}

// ---------------------------------------------------------------------------
// Converter
// ---------------------------------------------------------------------------

struct OpenItem {
    style: ListStyle,
    indent: usize,
    /// Inline content not yet attached to its list block.
    pending: Option<Vec<Inline>>,
}

#[derive(Default)]
struct Converter {
    blocks: Vec<RichTextBlock>,
    lists: Vec<ListStyle>,
    items: Vec<OpenItem>,
    bold: usize,
    italic: usize,
    link: Option<String>,
    code_block: Option<String>,
}

impl Converter {
    fn style(&self, code: bool) -> TextStyle {
        TextStyle {
            bold: self.bold > 0,
            italic: self.italic > 0,
            code,
        }
    }

    /// The inline buffer text currently flows into.
    fn target(&mut self) -> &mut Vec<Inline> {
        if let Some(item) = self.items.last_mut() {
            return item.pending.get_or_insert_with(Vec::new);
        }
        if !matches!(self.blocks.last(), Some(RichTextBlock::RichTextSection { .. })) {
            self.blocks.push(section());
        }
        match self.blocks.last_mut() {
            Some(RichTextBlock::RichTextSection { elements }) => elements,
            _ => unreachable!("a section was just pushed"),
        }
    }

    fn push_text(&mut self, text: &str, code: bool) {
        if text.is_empty() {
            return;
        }
        let style = self.style(code);
        let link = self.link.clone();
        let target = self.target();
        let inline = match link {
            Some(url) => Inline::Link {
                url,
                text: text.to_string(),
                style,
            },
            None => Inline::Text {
                text: text.to_string(),
                style,
            },
        };
        // Adjacent runs with the same style are one element.
        match (target.last_mut(), &inline) {
            (
                Some(Inline::Text { text: prev, style: s }),
                Inline::Text { text: next, style: ns },
            ) if s == ns => prev.push_str(next),
            (
                Some(Inline::Link {
                    url: pu,
                    text: prev,
                    style: s,
                }),
                Inline::Link {
                    url: nu,
                    text: next,
                    style: ns,
                },
            ) if s == ns && pu == nu => prev.push_str(next),
            _ => target.push(inline),
        }
    }

    fn flush_item(&mut self) {
        let Some(item) = self.items.last_mut() else {
            return;
        };
        let Some(elements) = item.pending.take() else {
            return;
        };
        let (style, indent) = (item.style, item.indent);
        let entry = RichTextBlock::RichTextSection {
            elements: split_emoji(elements),
        };
        if let Some(RichTextBlock::RichTextList {
            style: s,
            indent: i,
            elements: list,
        }) = self.blocks.last_mut()
        {
            if *s == style && *i == indent {
                list.push(entry);
                return;
            }
        }
        self.blocks.push(RichTextBlock::RichTextList {
            style,
            indent,
            elements: vec![entry],
        });
    }

    fn event(&mut self, event: Event<'_>) {
        if let Some(code) = self.code_block.as_mut() {
            match event {
                Event::Text(t) => code.push_str(&t),
                Event::End(TagEnd::CodeBlock) => {
                    let text = self.code_block.take().unwrap_or_default();
                    self.blocks.push(RichTextBlock::RichTextPreformatted {
                        elements: vec![Inline::Text {
                            text,
                            style: TextStyle::default(),
                        }],
                    });
                }
                _ => {}
            }
            return;
        }

        match event {
            Event::Start(Tag::Paragraph) => match self.items.last_mut() {
                Some(item) => {
                    if item.pending.as_ref().is_some_and(|p| !p.is_empty()) {
                        self.push_text("\n", false);
                    }
                }
                None => self.blocks.push(section()),
            },
            Event::Start(Tag::Heading { .. }) => {
                if self.items.is_empty() {
                    self.blocks.push(section());
                }
                self.bold += 1;
            }
            Event::End(TagEnd::Heading(_)) => self.bold = self.bold.saturating_sub(1),
            Event::Start(Tag::Strong) => self.bold += 1,
            Event::End(TagEnd::Strong) => self.bold = self.bold.saturating_sub(1),
            Event::Start(Tag::Emphasis) => self.italic += 1,
            Event::End(TagEnd::Emphasis) => self.italic = self.italic.saturating_sub(1),
            Event::Start(Tag::Link { dest_url, .. }) => self.link = Some(dest_url.to_string()),
            Event::End(TagEnd::Link) => self.link = None,
            Event::Start(Tag::List(start)) => {
                self.flush_item();
                self.lists.push(if start.is_some() {
                    ListStyle::Ordered
                } else {
                    ListStyle::Bullet
                });
            }
            Event::End(TagEnd::List(_)) => {
                self.lists.pop();
            }
            Event::Start(Tag::Item) => {
                let style = self.lists.last().copied().unwrap_or(ListStyle::Bullet);
                self.items.push(OpenItem {
                    style,
                    indent: self.lists.len().saturating_sub(1),
                    pending: Some(Vec::new()),
                });
            }
            Event::End(TagEnd::Item) => {
                self.flush_item();
                self.items.pop();
            }
            Event::Start(Tag::CodeBlock(_)) => {
                self.flush_item();
                self.code_block = Some(String::new());
            }
            Event::Text(t) => self.push_text(&t, false),
            Event::Code(t) => self.push_text(&t, true),
            Event::SoftBreak | Event::HardBreak => self.push_text("\n", false),
            _ => {}
        }
    }

    fn finish(mut self) -> Vec<RichTextBlock> {
        while !self.items.is_empty() {
            self.flush_item();
            self.items.pop();
        }
        self.blocks
            .into_iter()
            .map(|block| match block {
                RichTextBlock::RichTextSection { elements } => RichTextBlock::RichTextSection {
                    elements: split_emoji(elements),
                },
                other => other,
            })
            .collect()
    }
}

fn emoji_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r":([a-z0-9_+-]+):").expect("static regex"))
}

/// Break `:name:` shortcodes in unstyled-code text into emoji elements.
fn split_emoji(elements: Vec<Inline>) -> Vec<Inline> {
    let mut out = Vec::with_capacity(elements.len());
    for el in elements {
        let Inline::Text { text, style } = &el else {
            out.push(el);
            continue;
        };
        if style.code || !emoji_re().is_match(text) {
            out.push(el);
            continue;
        }
        let mut last = 0;
        for caps in emoji_re().captures_iter(text) {
            let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            if whole.start() > last {
                out.push(Inline::Text {
                    text: text[last..whole.start()].to_string(),
                    style: *style,
                });
            }
            out.push(Inline::Emoji {
                name: name.as_str().to_string(),
            });
            last = whole.end();
        }
        if last < text.len() {
            out.push(Inline::Text {
                text: text[last..].to_string(),
                style: *style,
            });
        }
    }
    out
}

/// Convert Markdown into the `elements` of a single `rich_text` block.
pub fn convert_to_blocks(markdown: &str) -> Vec<RichTextBlock> {
    let mut converter = Converter::default();
    for event in Parser::new(markdown) {
        converter.event(event);
    }
    converter.finish()
}

// ---------------------------------------------------------------------------
// Delivery
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct PostMessage<'a> {
    channel: &'a str,
    blocks: [RichText; 1],
}

#[derive(Serialize)]
struct RichText {
    #[serde(rename = "type")]
    kind: &'static str,
    elements: Vec<RichTextBlock>,
}

#[derive(Deserialize)]
struct SlackResponse {
    ok: bool,
    #[serde(default)]
    error: String,
}

pub struct SlackClient {
    http: reqwest::Client,
    base_url: String,
}

impl Default for SlackClient {
    fn default() -> Self {
        Self::new(SLACK_API_BASE)
    }
}

impl SlackClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Convert `markdown` and post it to the configured channel.
    pub async fn send_markdown(&self, cfg: &SlackConfig, markdown: &str) -> Result<()> {
        if !cfg.is_configured() {
            return Err(Md2SlackError::SlackNotConfigured);
        }
        let body = PostMessage {
            channel: &cfg.channel_id,
            blocks: [RichText {
                kind: "rich_text",
                elements: convert_to_blocks(markdown),
            }],
        };
        let resp: SlackResponse = self
            .http
            .post(format!("{}/chat.postMessage", self.base_url))
            .bearer_auth(&cfg.bot_token)
            .json(&body)
            .send()
            .await?
            .json()
            .await?;
        if !resp.ok {
            tracing::warn!(error = %resp.error, channel = %cfg.channel_id, "slack rejected message");
            return Err(Md2SlackError::Slack(resp.error));
        }
        tracing::info!(channel = %cfg.channel_id, "report posted to slack");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cfg() -> SlackConfig {
        SlackConfig {
            client_id: String::new(),
            bot_token: "xoxb-test".into(),
            channel_id: "C123".into(),
        }
    }

    #[test]
    fn paragraph_with_styles_and_emoji() {
        let blocks = convert_to_blocks("Done **today** :check: see `code`");
        let v = serde_json::to_value(&blocks).unwrap();
        assert_eq!(
            v,
            json!([{
                "type": "rich_text_section",
                "elements": [
                    {"type": "text", "text": "Done "},
                    {"type": "text", "text": "today", "style": {"bold": true}},
                    {"type": "text", "text": " "},
                    {"type": "emoji", "name": "check"},
                    {"type": "text", "text": " see "},
                    {"type": "text", "text": "code", "style": {"code": true}}
                ]
            }])
        );
    }

    #[test]
    fn nested_lists_become_indented_blocks() {
        let md = "- Fix login\n  - Raised limit\n  - commits: `abc`\n- Ship docs\n";
        let blocks = convert_to_blocks(md);
        assert_eq!(blocks.len(), 3);
        match &blocks[0] {
            RichTextBlock::RichTextList { indent, elements, style } => {
                assert_eq!(*indent, 0);
                assert_eq!(*style, ListStyle::Bullet);
                assert_eq!(elements.len(), 1);
            }
            other => panic!("unexpected {other:?}"),
        }
        match &blocks[1] {
            RichTextBlock::RichTextList { indent, elements, .. } => {
                assert_eq!(*indent, 1);
                assert_eq!(elements.len(), 2);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(blocks[2], RichTextBlock::RichTextList { indent: 0, .. }));
    }

    #[test]
    fn ordered_list_and_link() {
        let blocks = convert_to_blocks("1. see [docs](https://example.com)\n2. two\n");
        let v = serde_json::to_value(&blocks).unwrap();
        assert_eq!(v[0]["style"], "ordered");
        assert_eq!(v[0]["elements"].as_array().unwrap().len(), 2);
        assert_eq!(
            v[0]["elements"][0]["elements"][1],
            json!({"type": "link", "url": "https://example.com", "text": "docs"})
        );
    }

    #[test]
    fn code_block_is_preformatted() {
        let blocks = convert_to_blocks("```\nlet x = 1;\n```\n");
        assert_eq!(
            serde_json::to_value(&blocks).unwrap(),
            json!([{"type": "rich_text_preformatted", "elements": [{"type": "text", "text": "let x = 1;\n"}]}])
        );
    }

    #[test]
    fn soft_breaks_stay_in_section() {
        let blocks = convert_to_blocks("**Any Blockers?**\nNo");
        let v = serde_json::to_value(&blocks).unwrap();
        assert_eq!(v.as_array().unwrap().len(), 1);
        assert_eq!(v[0]["elements"][1], json!({"type": "text", "text": "\nNo"}));
    }

    #[tokio::test]
    async fn placeholder_credentials_are_rejected() {
        let mut c = cfg();
        c.bot_token = crate::config::PLACEHOLDER_BOT_TOKEN.into();
        let err = SlackClient::new("http://127.0.0.1:9")
            .send_markdown(&c, "hi")
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "please configure bot_token and channel_id in config.ini"
        );
    }

    #[tokio::test]
    async fn posts_rich_text_with_bearer_token() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat.postMessage")
            .match_header("authorization", "Bearer xoxb-test")
            .match_body(mockito::Matcher::PartialJson(json!({
                "channel": "C123",
                "blocks": [{"type": "rich_text"}]
            })))
            .with_body(r#"{"ok": true}"#)
            .create_async()
            .await;
        SlackClient::new(server.url())
            .send_markdown(&cfg(), "hello")
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn slack_error_is_surfaced() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat.postMessage")
            .with_body(r#"{"ok": false, "error": "channel_not_found"}"#)
            .create_async()
            .await;
        let err = SlackClient::new(server.url())
            .send_markdown(&cfg(), "hello")
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "slack error: channel_not_found");
    }
}
