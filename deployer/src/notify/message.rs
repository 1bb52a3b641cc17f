//! Structured notification messages
//!
//! A [`Message`] is an ordered list of [`ContentBlock`]s rendered as a Slack
//! Block Kit payload (`{"blocks": [...]}`).

use serde::{Serialize, Serializer};
use serde_json::{json, Value};
use thiserror::Error;

const MAX_HEADER_LEN: usize = 150;
/// Longest section or context text the webhook accepts
pub const MAX_TEXT_LEN: usize = 3000;
const MAX_FIELD_LEN: usize = 2000;
const MAX_FIELDS: usize = 10;
const MAX_BUTTON_TITLE_LEN: usize = 75;

/// Why a block was rejected
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MessageError {
    #[error("{0} text must not be empty")]
    EmptyText(&'static str),

    #[error("{block} text is longer than {max} characters")]
    TextTooLong { block: &'static str, max: usize },

    #[error("Invalid URL '{0}'")]
    InvalidUrl(String),

    #[error("Fields block must have between 1 and 10 fields, got {0}")]
    FieldCount(usize),
}

/// Button appearance
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ButtonStyle {
    #[default]
    Default,
    Primary,
    Danger,
}

/// One block of a notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentBlock {
    Header(String),
    Section(String),
    Context(String),
    Fields(Vec<(String, String)>),
    Image { url: String, title: String },
    Button { url: String, title: String, style: ButtonStyle },
    Divider,
}

fn check_text(block: &'static str, text: &str, max: usize) -> Result<(), MessageError> {
    if text.trim().is_empty() {
        return Err(MessageError::EmptyText(block));
    }
    if text.chars().count() > max {
        return Err(MessageError::TextTooLong { block, max });
    }
    Ok(())
}

/// Shorten `text` to at most `max` characters, marking the cut with an ellipsis
pub fn clip(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut clipped: String = text.chars().take(max.saturating_sub(1)).collect();
    clipped.push('…');
    clipped
}

fn check_url(url: &str) -> Result<(), MessageError> {
    url::Url::parse(url)
        .map(|_| ())
        .map_err(|_| MessageError::InvalidUrl(url.to_string()))
}

impl ContentBlock {
    pub fn header(text: impl Into<String>) -> Result<Self, MessageError> {
        Self::Header(text.into()).validated()
    }

    pub fn section(text: impl Into<String>) -> Result<Self, MessageError> {
        Self::Section(text.into()).validated()
    }

    pub fn context(text: impl Into<String>) -> Result<Self, MessageError> {
        Self::Context(text.into()).validated()
    }

    /// Labelled fields; an empty label renders the text on its own
    pub fn fields<L, T>(fields: impl IntoIterator<Item = (L, T)>) -> Result<Self, MessageError>
    where
        L: Into<String>,
        T: Into<String>,
    {
        Self::Fields(
            fields
                .into_iter()
                .map(|(label, text)| (label.into(), text.into()))
                .collect(),
        )
        .validated()
    }

    pub fn image(url: impl Into<String>, title: impl Into<String>) -> Result<Self, MessageError> {
        Self::Image {
            url: url.into(),
            title: title.into(),
        }
        .validated()
    }

    pub fn button(
        url: impl Into<String>,
        title: impl Into<String>,
        style: ButtonStyle,
    ) -> Result<Self, MessageError> {
        Self::Button {
            url: url.into(),
            title: title.into(),
            style,
        }
        .validated()
    }

    fn validated(self) -> Result<Self, MessageError> {
        self.validate()?;
        Ok(self)
    }

    /// Check the block against the payload limits
    pub fn validate(&self) -> Result<(), MessageError> {
        match self {
            ContentBlock::Header(text) => check_text("Header", text, MAX_HEADER_LEN),
            ContentBlock::Section(text) => check_text("Section", text, MAX_TEXT_LEN),
            ContentBlock::Context(text) => check_text("Context", text, MAX_TEXT_LEN),
            ContentBlock::Fields(fields) => {
                if fields.is_empty() || fields.len() > MAX_FIELDS {
                    return Err(MessageError::FieldCount(fields.len()));
                }
                fields
                    .iter()
                    .try_for_each(|(_, text)| check_text("Field", text, MAX_FIELD_LEN))
            }
            ContentBlock::Image { url, title } => {
                check_url(url)?;
                check_text("Image title", title, MAX_TEXT_LEN)
            }
            ContentBlock::Button { url, title, .. } => {
                check_url(url)?;
                check_text("Button title", title, MAX_BUTTON_TITLE_LEN)
            }
            ContentBlock::Divider => Ok(()),
        }
    }

    /// Render as a Block Kit block
    pub fn to_json(&self) -> Value {
        match self {
            ContentBlock::Header(text) => json!({
                "type": "header",
                "text": { "type": "plain_text", "text": text },
            }),
            ContentBlock::Section(text) => json!({
                "type": "section",
                "text": { "type": "mrkdwn", "text": text },
            }),
            ContentBlock::Context(text) => json!({
                "type": "context",
                "elements": [{ "type": "mrkdwn", "text": text }],
            }),
            ContentBlock::Fields(fields) => {
                let fields: Vec<Value> = fields
                    .iter()
                    .map(|(label, text)| {
                        let text = if label.is_empty() {
                            text.clone()
                        } else {
                            format!("*{}:*\n{}", label, text)
                        };
                        json!({ "type": "mrkdwn", "text": text })
                    })
                    .collect();
                json!({ "type": "section", "fields": fields })
            }
            ContentBlock::Image { url, title } => json!({
                "type": "image",
                "title": { "type": "plain_text", "text": title },
                "image_url": url,
                "alt_text": title,
            }),
            ContentBlock::Button { url, title, style } => {
                let mut button = json!({
                    "type": "button",
                    "text": { "type": "plain_text", "text": title },
                    "action_id": title.to_lowercase().replace(' ', "_"),
                    "url": url,
                });
                match style {
                    ButtonStyle::Primary => button["style"] = json!("primary"),
                    ButtonStyle::Danger => button["style"] = json!("danger"),
                    ButtonStyle::Default => {}
                }
                json!({ "type": "actions", "elements": [button] })
            }
            ContentBlock::Divider => json!({ "type": "divider" }),
        }
    }
}

impl Serialize for ContentBlock {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

/// A notification message
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Message {
    blocks: Vec<ContentBlock>,
}

impl Message {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a block
    pub fn push(&mut self, block: ContentBlock) -> Result<&mut Self, MessageError> {
        block.validate()?;
        self.blocks.push(block);
        Ok(self)
    }

    pub fn blocks(&self) -> &[ContentBlock] {
        &self.blocks
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Serialize to the wire payload
    pub fn to_payload(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
