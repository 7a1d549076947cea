//! OpenAI chat completions: SSE with a `[DONE]` sentinel.

use super::{error_parts, headers};
use crate::config::AccessConfig;
use crate::dispatch::{self, DispatchRequest};
use intake_core::{
    error::{IntakeError, ParseError},
    llm::{ChatOpts, Message},
    ops::NormalizedOp,
};
use serde_json::Value;

pub const DONE: &str = "[DONE]";

fn map_messages(msgs: &[Message]) -> Vec<Value> {
    msgs.iter()
        .map(|m| serde_json::json!({"role": m.role.as_str(), "content": m.content}))
        .collect()
}

pub(crate) fn request(
    access: &AccessConfig,
    opts: &ChatOpts,
    history: &[Message],
) -> Result<DispatchRequest, IntakeError> {
    let key = dispatch::api_key(access)?;
    let model = dispatch::check_model(&opts.model)?;
    dispatch::check_conversation(history)?;
    let url = dispatch::endpoint(access, "chat/completions")?;
    let mut body = serde_json::json!({
        "model": model,
        "messages": map_messages(history),
        "stream": true,
        "stream_options": { "include_usage": true },
    });
    dispatch::sampling(&mut body, opts, "max_tokens");
    DispatchRequest::json(url, headers(key), &body)
}

pub fn parse(data: &str, _event: Option<&str>) -> Result<Vec<NormalizedOp>, ParseError> {
    let v: Value = serde_json::from_str(data)?;
    if !v.is_object() {
        return Err(ParseError::new("chat chunk is not a json object"));
    }
    if v["error"].is_object() {
        let (code, message) = error_parts(&v["error"]);
        return Ok(vec![NormalizedOp::issue(code, message), NormalizedOp::Close]);
    }

    let mut ops = Vec::new();
    let choice = &v["choices"][0];
    if let Some(role) = choice["delta"]["role"].as_str() {
        ops.push(NormalizedOp::field("role", Value::from(role)));
    }
    match &choice["delta"]["content"] {
        Value::String(s) if !s.is_empty() => ops.push(NormalizedOp::text(s.as_str())),
        Value::String(_) | Value::Null => {}
        other => {
            return Err(ParseError::new(format!("delta content is not a string: {other}")));
        }
    }
    if let Some(fr) = choice["finish_reason"].as_str() {
        ops.push(NormalizedOp::field("finish_reason", Value::from(fr)));
    }
    if v["usage"].is_object() {
        ops.push(NormalizedOp::field("usage", v["usage"].clone()));
    }
    Ok(ops)
}
