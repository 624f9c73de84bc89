//! Message payloads: per-type validation into typed content, and delivery.
//!
//! Wire envelope: `{ "content": { "type": ..., ...fields, "quickReply"? } }` posted to
//! `{apiBase}/bots/{botId}/users/{id}/messages` or `.../channels/{id}/messages`.

use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

use super::WorksClient;
use crate::error::GatewayError;
use crate::validate::{
    validate_action, validate_action_object, validate_image_url, validate_path_segment,
    validate_quick_reply, validate_string_param, validate_url, ValidationError,
};

const TEXT_MAX_LENGTH: usize = 2000;
const LINK_FIELD_MAX_LENGTH: usize = 1000;
const URL_MAX_LENGTH: usize = 1000;
const SUBTITLE_MAX_LENGTH: usize = 1000;
const FLEX_ALT_TEXT_MAX_LENGTH: usize = 400;
const MAX_COLUMNS: usize = 10;
const MAX_LIST_ELEMENTS: usize = 10;

/// Message recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    User(String),
    Channel(String),
}

impl Target {
    /// At least one id must be non-empty; `user_id` wins when both are given.
    pub fn from_ids(user_id: Option<&str>, channel_id: Option<&str>) -> Result<Self, ValidationError> {
        let user_id = user_id.map(str::trim).filter(|s| !s.is_empty());
        let channel_id = channel_id.map(str::trim).filter(|s| !s.is_empty());
        match (user_id, channel_id) {
            (Some(u), _) => Ok(Target::User(validate_path_segment(u, "userId")?.to_string())),
            (None, Some(c)) => Ok(Target::Channel(
                validate_path_segment(c, "channelId")?.to_string(),
            )),
            (None, None) => Err(ValidationError::new(
                "destination is not specified (userId or channelId)",
            )),
        }
    }

    /// Read `userId` / `channelId` from request params.
    pub fn from_params(params: &Map<String, Value>) -> Result<Self, ValidationError> {
        Self::from_ids(
            params.get("userId").and_then(Value::as_str),
            params.get("channelId").and_then(Value::as_str),
        )
    }

    pub fn messages_path(&self) -> String {
        self.path_segments().join("/")
    }

    /// Path segments under the bot, each id occupying exactly one segment.
    pub fn path_segments(&self) -> [&str; 3] {
        match self {
            Target::User(id) => ["users", id.as_str(), "messages"],
            Target::Channel(id) => ["channels", id.as_str(), "messages"],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Text,
    Sticker,
    Image,
    File,
    Link,
    ButtonTemplate,
    ListTemplate,
    Carousel,
    ImageCarousel,
    Flex,
}

impl MessageType {
    pub const ALL: [MessageType; 10] = [
        MessageType::Text,
        MessageType::Sticker,
        MessageType::Image,
        MessageType::File,
        MessageType::Link,
        MessageType::ButtonTemplate,
        MessageType::ListTemplate,
        MessageType::Carousel,
        MessageType::ImageCarousel,
        MessageType::Flex,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Text => "text",
            MessageType::Sticker => "sticker",
            MessageType::Image => "image",
            MessageType::File => "file",
            MessageType::Link => "link",
            MessageType::ButtonTemplate => "button_template",
            MessageType::ListTemplate => "list_template",
            MessageType::Carousel => "carousel",
            MessageType::ImageCarousel => "image_carousel",
            MessageType::Flex => "flex",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MessageType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown message type: {}", s))
    }
}

/// Where a file's bytes come from: a public URL or a previously uploaded attachment.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ContentSource {
    Url {
        #[serde(rename = "originalContentUrl")]
        original_content_url: String,
    },
    FileId {
        #[serde(rename = "fileId")]
        file_id: String,
    },
}

/// List template cover: background image by URL or by uploaded file id.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CoverBackground {
    ImageUrl {
        #[serde(rename = "backgroundImageUrl")]
        background_image_url: String,
    },
    FileId {
        #[serde(rename = "backgroundFileId")]
        background_file_id: String,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageAspectRatio {
    #[default]
    Rectangle,
    Square,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageSize {
    #[default]
    Cover,
    Contain,
}

/// Validated message content, serialized as the `content` object (minus quickReply).
/// Actions, elements, columns and flex contents are forwarded as given once validated.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum MessageContent {
    Text {
        text: String,
    },
    Sticker {
        package_id: String,
        sticker_id: String,
    },
    Image {
        #[serde(skip_serializing_if = "Option::is_none")]
        preview_image_url: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        original_content_url: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        file_id: Option<String>,
    },
    File(ContentSource),
    Link {
        content_text: String,
        link_text: String,
        link: String,
    },
    ButtonTemplate {
        content_text: String,
        actions: Value,
    },
    ListTemplate {
        #[serde(skip_serializing_if = "Option::is_none")]
        cover_data: Option<CoverBackground>,
        elements: Value,
        #[serde(skip_serializing_if = "Option::is_none")]
        actions: Option<Value>,
    },
    Carousel {
        image_aspect_ratio: ImageAspectRatio,
        image_size: ImageSize,
        columns: Value,
    },
    ImageCarousel {
        columns: Value,
    },
    Flex {
        alt_text: String,
        contents: Value,
    },
}

/// A param counts as given when it is neither null nor an empty string.
fn given<'a>(params: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    params.get(key).filter(|v| match v {
        Value::Null => false,
        Value::String(s) => !s.is_empty(),
        _ => true,
    })
}

fn required_array<'a>(
    params: &'a Map<String, Value>,
    key: &str,
    max_len: Option<usize>,
) -> Result<&'a Vec<Value>, ValidationError> {
    let items = match params.get(key) {
        Some(Value::Array(items)) if !items.is_empty() => items,
        _ => {
            return Err(ValidationError::new(format!(
                "parameter '{}' is required and must contain at least one item",
                key
            )))
        }
    };
    if let Some(max) = max_len {
        if items.len() > max {
            return Err(ValidationError::new(format!(
                "parameter '{}' accepts at most {} items",
                key, max
            )));
        }
    }
    Ok(items)
}

fn as_object<'a>(value: &'a Value, what: &str) -> Result<&'a Map<String, Value>, ValidationError> {
    value
        .as_object()
        .ok_or_else(|| ValidationError::new(format!("{} must be an object", what)))
}

impl MessageContent {
    /// Validate `params` for `kind` and build the typed content.
    pub fn from_params(kind: MessageType, params: &Map<String, Value>) -> Result<Self, ValidationError> {
        match kind {
            MessageType::Text => text(params),
            MessageType::Sticker => sticker(params),
            MessageType::Image => image(params),
            MessageType::File => file(params),
            MessageType::Link => link(params),
            MessageType::ButtonTemplate => button_template(params),
            MessageType::ListTemplate => list_template(params),
            MessageType::Carousel => carousel(params),
            MessageType::ImageCarousel => image_carousel(params),
            MessageType::Flex => flex(params),
        }
    }

    pub fn message_type(&self) -> MessageType {
        match self {
            MessageContent::Text { .. } => MessageType::Text,
            MessageContent::Sticker { .. } => MessageType::Sticker,
            MessageContent::Image { .. } => MessageType::Image,
            MessageContent::File(_) => MessageType::File,
            MessageContent::Link { .. } => MessageType::Link,
            MessageContent::ButtonTemplate { .. } => MessageType::ButtonTemplate,
            MessageContent::ListTemplate { .. } => MessageType::ListTemplate,
            MessageContent::Carousel { .. } => MessageType::Carousel,
            MessageContent::ImageCarousel { .. } => MessageType::ImageCarousel,
            MessageContent::Flex { .. } => MessageType::Flex,
        }
    }
}

fn text(params: &Map<String, Value>) -> Result<MessageContent, ValidationError> {
    let text = validate_string_param(params.get("text"), "text", Some(TEXT_MAX_LENGTH))?;
    Ok(MessageContent::Text { text: text.to_string() })
}

fn sticker(params: &Map<String, Value>) -> Result<MessageContent, ValidationError> {
    let package_id = validate_string_param(params.get("packageId"), "packageId", None)?;
    let sticker_id = validate_string_param(params.get("stickerId"), "stickerId", None)?;
    Ok(MessageContent::Sticker {
        package_id: package_id.to_string(),
        sticker_id: sticker_id.to_string(),
    })
}

fn image(params: &Map<String, Value>) -> Result<MessageContent, ValidationError> {
    let preview = given(params, "previewImageUrl");
    let original = given(params, "originalContentUrl");
    let file_id = given(params, "fileId");
    if preview.is_none() && original.is_none() && file_id.is_none() {
        return Err(ValidationError::new(
            "one of 'previewImageUrl', 'originalContentUrl' or 'fileId' is required",
        ));
    }
    let preview_image_url = preview
        .map(|v| validate_image_url(Some(v), "previewImageUrl"))
        .transpose()?;
    let original_content_url = original
        .map(|v| validate_image_url(Some(v), "originalContentUrl"))
        .transpose()?;
    let file_id = file_id
        .map(|v| validate_string_param(Some(v), "fileId", None))
        .transpose()?;
    Ok(MessageContent::Image {
        preview_image_url: preview_image_url.map(str::to_string),
        original_content_url: original_content_url.map(str::to_string),
        file_id: file_id.map(str::to_string),
    })
}

fn file(params: &Map<String, Value>) -> Result<MessageContent, ValidationError> {
    let source = match (given(params, "originalContentUrl"), given(params, "fileId")) {
        (Some(url), None) => ContentSource::Url {
            original_content_url: validate_url(Some(url), "originalContentUrl", Some(URL_MAX_LENGTH))?
                .to_string(),
        },
        (None, Some(id)) => ContentSource::FileId {
            file_id: validate_string_param(Some(id), "fileId", None)?.to_string(),
        },
        (Some(_), Some(_)) => {
            return Err(ValidationError::new(
                "specify only one of 'originalContentUrl' or 'fileId'",
            ))
        }
        (None, None) => {
            return Err(ValidationError::new(
                "one of 'originalContentUrl' or 'fileId' is required",
            ))
        }
    };
    Ok(MessageContent::File(source))
}

fn link(params: &Map<String, Value>) -> Result<MessageContent, ValidationError> {
    let content_text =
        validate_string_param(params.get("contentText"), "contentText", Some(LINK_FIELD_MAX_LENGTH))?;
    let link_text = validate_string_param(params.get("linkText"), "linkText", Some(LINK_FIELD_MAX_LENGTH))?;
    let link = validate_url(params.get("link"), "link", Some(URL_MAX_LENGTH))?;
    Ok(MessageContent::Link {
        content_text: content_text.to_string(),
        link_text: link_text.to_string(),
        link: link.to_string(),
    })
}

fn button_template(params: &Map<String, Value>) -> Result<MessageContent, ValidationError> {
    let content_text = validate_string_param(params.get("contentText"), "contentText", None)?;
    let actions = required_array(params, "actions", None)?;
    for (index, action) in actions.iter().enumerate() {
        validate_action(Some(action), false)
            .map_err(|e| e.context(format!("action {} is invalid", index + 1)))?;
    }
    Ok(MessageContent::ButtonTemplate {
        content_text: content_text.to_string(),
        actions: Value::Array(actions.clone()),
    })
}

fn cover_data(value: &Value) -> Result<CoverBackground, ValidationError> {
    let cover = as_object(value, "parameter 'coverData'")?;
    match (given(cover, "backgroundImageUrl"), given(cover, "backgroundFileId")) {
        (Some(url), None) => Ok(CoverBackground::ImageUrl {
            background_image_url: validate_image_url(Some(url), "coverData.backgroundImageUrl")?
                .to_string(),
        }),
        (None, Some(id)) => Ok(CoverBackground::FileId {
            background_file_id: validate_string_param(Some(id), "coverData.backgroundFileId", None)?
                .to_string(),
        }),
        _ => Err(ValidationError::new(
            "coverData requires exactly one of 'backgroundImageUrl' or 'backgroundFileId'",
        )),
    }
}

fn list_template(params: &Map<String, Value>) -> Result<MessageContent, ValidationError> {
    let elements = required_array(params, "elements", Some(MAX_LIST_ELEMENTS))?;
    let cover_data = given(params, "coverData").map(cover_data).transpose()?;

    for (index, element) in elements.iter().enumerate() {
        let path = format!("elements[{}]", index);
        let element = as_object(element, &path)?;
        validate_string_param(element.get("title"), &format!("{}.title", path), None)?;
        if let Some(subtitle) = given(element, "subtitle") {
            validate_string_param(Some(subtitle), &format!("{}.subtitle", path), Some(SUBTITLE_MAX_LENGTH))?;
        }
        if let Some(url) = given(element, "originalContentUrl") {
            validate_image_url(Some(url), &format!("{}.originalContentUrl", path))?;
        }
        if let Some(default_action) = given(element, "defaultAction") {
            validate_action_object(default_action, &format!("{}.defaultAction", path), true)?;
        }
        validate_action(given(element, "action"), false)
            .map_err(|e| e.context(format!("{}.action is invalid", path)))?;
    }

    let actions = given(params, "actions");
    validate_action(actions, true)?;

    Ok(MessageContent::ListTemplate {
        cover_data,
        elements: Value::Array(elements.clone()),
        actions: actions.cloned(),
    })
}

/// Columns must carry an image by URL or uploaded file id.
fn require_column_source(column: &Map<String, Value>, path: &str) -> Result<(), ValidationError> {
    let url = given(column, "originalContentUrl");
    if url.is_none() && given(column, "fileId").is_none() {
        return Err(ValidationError::new(format!(
            "{} requires 'originalContentUrl' or 'fileId'",
            path
        )));
    }
    if let Some(url) = url {
        validate_image_url(Some(url), &format!("{}.originalContentUrl", path))?;
    }
    Ok(())
}

fn parse_choice<T: Default>(
    params: &Map<String, Value>,
    key: &str,
    choices: &[(&str, T)],
) -> Result<T, ValidationError>
where
    T: Copy,
{
    let Some(value) = given(params, key) else {
        return Ok(T::default());
    };
    let names: Vec<&str> = choices.iter().map(|(name, _)| *name).collect();
    value
        .as_str()
        .and_then(|s| choices.iter().find(|(name, _)| *name == s).map(|(_, v)| *v))
        .ok_or_else(|| {
            ValidationError::new(format!(
                "parameter '{}' must be one of: {}",
                key,
                names.join(", ")
            ))
        })
}

fn carousel(params: &Map<String, Value>) -> Result<MessageContent, ValidationError> {
    let columns = required_array(params, "columns", Some(MAX_COLUMNS))?;
    let image_aspect_ratio = parse_choice(
        params,
        "imageAspectRatio",
        &[("rectangle", ImageAspectRatio::Rectangle), ("square", ImageAspectRatio::Square)],
    )?;
    let image_size = parse_choice(
        params,
        "imageSize",
        &[("cover", ImageSize::Cover), ("contain", ImageSize::Contain)],
    )?;

    for (index, column) in columns.iter().enumerate() {
        let path = format!("columns[{}]", index);
        let column = as_object(column, &path)?;
        require_column_source(column, &path)?;
        validate_string_param(column.get("text"), &format!("{}.text", path), None)?;
        let actions = column.get("actions").and_then(Value::as_array).ok_or_else(|| {
            ValidationError::new(format!("{}.actions must be an array", path))
        })?;
        if let Some(default_action) = given(column, "defaultAction") {
            validate_action_object(default_action, &format!("{}.defaultAction", path), true)?;
        }
        for (action_index, action) in actions.iter().enumerate() {
            validate_action(Some(action), false)
                .map_err(|e| e.context(format!("{}.actions[{}] is invalid", path, action_index)))?;
        }
    }

    Ok(MessageContent::Carousel {
        image_aspect_ratio,
        image_size,
        columns: Value::Array(columns.clone()),
    })
}

fn image_carousel(params: &Map<String, Value>) -> Result<MessageContent, ValidationError> {
    let columns = required_array(params, "columns", Some(MAX_COLUMNS))?;
    for (index, column) in columns.iter().enumerate() {
        let path = format!("columns[{}]", index);
        let column = as_object(column, &path)?;
        require_column_source(column, &path)?;
        validate_action(given(column, "action"), false)
            .map_err(|e| e.context(format!("{}.action is invalid", path)))?;
    }
    Ok(MessageContent::ImageCarousel {
        columns: Value::Array(columns.clone()),
    })
}

fn flex(params: &Map<String, Value>) -> Result<MessageContent, ValidationError> {
    let alt_text = validate_string_param(params.get("altText"), "altText", Some(FLEX_ALT_TEXT_MAX_LENGTH))?;
    let contents = match params.get("contents") {
        Some(v @ Value::Object(_)) => v.clone(),
        _ => {
            return Err(ValidationError::new(
                "parameter 'contents' is required and must be an object",
            ))
        }
    };
    Ok(MessageContent::Flex {
        alt_text: alt_text.to_string(),
        contents,
    })
}

/// A validated message ready to post.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    pub target: Target,
    pub content: MessageContent,
    pub quick_reply: Option<Value>,
}

impl OutboundMessage {
    /// `{ "content": { ...content, "quickReply"? } }`
    pub fn envelope(&self) -> Value {
        let mut content = serde_json::to_value(&self.content).unwrap_or(Value::Null);
        if let (Some(obj), Some(qr)) = (content.as_object_mut(), self.quick_reply.as_ref()) {
            obj.insert("quickReply".to_string(), qr.clone());
        }
        serde_json::json!({ "content": content })
    }
}

/// Validate content and optional quickReply for `target`. Makes no network calls.
pub fn prepare_message(
    target: Target,
    kind: MessageType,
    params: &Map<String, Value>,
) -> Result<OutboundMessage, ValidationError> {
    let content = MessageContent::from_params(kind, params)?;
    let quick_reply = match given(params, "quickReply") {
        Some(qr) => {
            validate_quick_reply(qr).map_err(|e| e.context("quick reply is invalid"))?;
            Some(qr.clone())
        }
        None => None,
    };
    Ok(OutboundMessage {
        target,
        content,
        quick_reply,
    })
}

impl WorksClient {
    /// POST the envelope to the target's messages endpoint.
    pub async fn post_message(&self, token: &str, message: &OutboundMessage) -> Result<(), GatewayError> {
        let url = self.bot_url(&message.target.path_segments());
        self.post_json(token, url, &message.envelope())
            .await
            .map_err(GatewayError::Upstream)?;
        log::debug!(
            "{} message delivered to {}",
            message.content.message_type(),
            message.target.messages_path()
        );
        Ok(())
    }

    /// Resolve the target from `userId`/`channelId` in `params`, validate, and send.
    /// Validation failures return before any request is made.
    pub async fn dispatch(
        &self,
        token: &str,
        kind: MessageType,
        params: &Map<String, Value>,
    ) -> Result<(), GatewayError> {
        let target = Target::from_params(params)?;
        let message = prepare_message(target, kind, params)?;
        self.post_message(token, &message).await
    }
}
