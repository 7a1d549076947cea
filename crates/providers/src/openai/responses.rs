//! OpenAI Responses API: named SSE events, completion signalled by the parser.

use super::{error_parts, headers, normalize_gpt5};
use crate::config::AccessConfig;
use crate::dispatch::{self, DispatchRequest};
use intake_core::{
    error::{IntakeError, ParseError},
    llm::{ChatOpts, Message, Role},
    ops::NormalizedOp,
};
use serde_json::Value;

pub(crate) fn request(
    access: &AccessConfig,
    opts: &ChatOpts,
    history: &[Message],
) -> Result<DispatchRequest, IntakeError> {
    let key = dispatch::api_key(access)?;
    let (model, verbosity) = normalize_gpt5(dispatch::check_model(&opts.model)?);
    dispatch::check_conversation(history)?;
    let url = dispatch::endpoint(access, "responses")?;

    // Responses expects role/content items; prior model output is `output_text`.
    let input: Vec<Value> = history
        .iter()
        .filter(|m| !(m.role == Role::Assistant && m.content.trim().is_empty()))
        .map(|m| {
            let content_type = match m.role {
                Role::Assistant => "output_text",
                Role::User | Role::System => "input_text",
            };
            serde_json::json!({
                "role": m.role.as_str(),
                "content": [ { "type": content_type, "text": m.content } ]
            })
        })
        .collect();
    let mut body = serde_json::json!({
        "model": model,
        "input": input,
        "stream": true,
    });
    if let Some(v) = verbosity {
        if let Some(map) = body.as_object_mut() {
            map.insert("text".to_string(), serde_json::json!({ "verbosity": v }));
        }
    }
    dispatch::sampling(&mut body, opts, "max_output_tokens");
    DispatchRequest::json(url, headers(key), &body)
}

pub fn parse(data: &str, event: Option<&str>) -> Result<Vec<NormalizedOp>, ParseError> {
    let v: Value = serde_json::from_str(data)?;
    if !v.is_object() {
        return Err(ParseError::new("responses event is not a json object"));
    }
    // Fallback: without an explicit event header, infer from JSON `type`.
    let kind = match event.filter(|e| !e.is_empty()) {
        Some(e) => e,
        None => v["type"].as_str().unwrap_or(""),
    };

    let ops = match kind {
        "response.created" => match v["response"]["model"].as_str() {
            Some(m) => vec![NormalizedOp::field("model", Value::from(m))],
            None => vec![],
        },
        "response.output_text.delta" => {
            let delta = v["delta"]
                .as_str()
                .ok_or_else(|| ParseError::new("output_text.delta without a text delta"))?;
            if delta.is_empty() {
                vec![]
            } else {
                vec![NormalizedOp::text(delta)]
            }
        }
        "response.completed" => {
            let mut ops = Vec::new();
            if v["response"]["usage"].is_object() {
                ops.push(NormalizedOp::field("usage", v["response"]["usage"].clone()));
            }
            ops.push(NormalizedOp::Close);
            ops
        }
        "response.incomplete" => {
            let reason = v["response"]["incomplete_details"]["reason"]
                .as_str()
                .unwrap_or("incomplete");
            vec![
                NormalizedOp::field("finish_reason", Value::from(reason)),
                NormalizedOp::Close,
            ]
        }
        "response.failed" => {
            let (code, message) = error_parts(&v["response"]["error"]);
            vec![NormalizedOp::issue(code, message), NormalizedOp::Close]
        }
        "error" | "response.error" => {
            let (code, message) = if v["error"].is_object() {
                error_parts(&v["error"])
            } else {
                error_parts(&v)
            };
            vec![NormalizedOp::issue(code, message), NormalizedOp::Close]
        }
        _ => vec![],
    };
    Ok(ops)
}
