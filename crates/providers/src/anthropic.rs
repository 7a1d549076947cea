//! Anthropic messages API: named SSE events, `message_stop` closes.

use crate::config::AccessConfig;
use crate::dispatch::{self, DispatchRequest};
use intake_core::{
    error::{IntakeError, ParseError},
    llm::{ChatOpts, Message, Role},
    ops::NormalizedOp,
};
use serde_json::Value;
use std::collections::BTreeMap;

pub const API_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4096;

pub(crate) fn request(
    access: &AccessConfig,
    opts: &ChatOpts,
    history: &[Message],
) -> Result<DispatchRequest, IntakeError> {
    let key = dispatch::api_key(access)?;
    let model = dispatch::check_model(&opts.model)?;
    if !model.starts_with("claude-") {
        return Err(IntakeError::prepare(format!(
            "model '{model}' is not served by the anthropic dialect"
        )));
    }
    dispatch::check_conversation(history)?;
    let url = dispatch::endpoint(access, "messages")?;

    let system: Vec<&str> = history
        .iter()
        .filter(|m| m.role == Role::System)
        .map(|m| m.content.as_str())
        .collect();
    let messages: Vec<&Message> = history
        .iter()
        .filter(|m| m.role != Role::System && !m.content.trim().is_empty())
        .collect();
    if messages.first().map(|m| m.role) != Some(Role::User) {
        return Err(IntakeError::prepare(
            "anthropic history must start with a user message",
        ));
    }

    let mut body = serde_json::json!({
        "model": model,
        "max_tokens": opts.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        "messages": messages
            .iter()
            .map(|m| serde_json::json!({"role": m.role.as_str(), "content": m.content}))
            .collect::<Vec<_>>(),
        "stream": true,
    });
    if let Some(map) = body.as_object_mut() {
        if !system.is_empty() {
            map.insert("system".into(), Value::from(system.join("\n\n")));
        }
        if let Some(t) = opts.temperature {
            map.insert("temperature".into(), serde_json::json!(t));
        }
        if let Some(p) = opts.top_p {
            map.insert("top_p".into(), serde_json::json!(p));
        }
    }

    let mut headers = BTreeMap::new();
    headers.insert("x-api-key".to_string(), key.to_string());
    headers.insert("anthropic-version".to_string(), API_VERSION.to_string());
    headers.insert("accept".to_string(), "text/event-stream".to_string());
    DispatchRequest::json(url, headers, &body)
}

pub fn parse(data: &str, event: Option<&str>) -> Result<Vec<NormalizedOp>, ParseError> {
    let v: Value = serde_json::from_str(data)?;
    if !v.is_object() {
        return Err(ParseError::new("anthropic event is not a json object"));
    }
    let kind = match event.filter(|e| !e.is_empty()) {
        Some(e) => e,
        None => v["type"].as_str().unwrap_or(""),
    };

    let ops = match kind {
        "message_start" => match v["message"]["model"].as_str() {
            Some(m) => vec![NormalizedOp::field("model", Value::from(m))],
            None => vec![],
        },
        "content_block_start" => match v["content_block"]["text"].as_str() {
            Some(t) if !t.is_empty() && v["content_block"]["type"] == "text" => {
                vec![NormalizedOp::text(t)]
            }
            _ => vec![],
        },
        "content_block_delta" => match v["delta"]["type"].as_str() {
            Some("text_delta") => {
                match v["delta"]["text"].as_str() {
                    Some("") => vec![],
                    Some(text) => vec![NormalizedOp::text(text)],
                    None => return Err(ParseError::new("text_delta without text")),
                }
            }
            // tool input and thinking deltas have no client-visible effect
            Some(_) => vec![],
            None => return Err(ParseError::new("content_block_delta without a delta type")),
        },
        "message_delta" => {
            let mut ops = Vec::new();
            if let Some(stop) = v["delta"]["stop_reason"].as_str() {
                ops.push(NormalizedOp::field("finish_reason", Value::from(stop)));
            }
            if v["usage"].is_object() {
                ops.push(NormalizedOp::field("usage", v["usage"].clone()));
            }
            ops
        }
        "message_stop" => vec![NormalizedOp::Close],
        "error" => {
            let code = v["error"]["type"].as_str().unwrap_or("error");
            let message = v["error"]["message"].as_str().unwrap_or("upstream reported an error");
            vec![NormalizedOp::issue(code, message), NormalizedOp::Close]
        }
        // ping, content_block_stop and anything newer
        _ => vec![],
    };
    Ok(ops)
}
